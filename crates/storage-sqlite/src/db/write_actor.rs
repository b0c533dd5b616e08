//! Dedicated writer actor.
//!
//! All mutations funnel through one thread holding one connection at a
//! time, each job wrapped in an immediate transaction. SQLite allows a
//! single writer; serializing here keeps busy-timeouts out of the request
//! path.

use std::sync::mpsc;
use std::thread;

use diesel::prelude::*;
use diesel::SqliteConnection;
use log::error;
use tokio::sync::oneshot;

use tracklet_core::errors::{DatabaseError, Error, Result};

use crate::errors::StorageError;

use super::DbPool;

type WriteJob = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Transaction-internal error: either the job's own failure or a
/// BEGIN/COMMIT failure from diesel.
enum TxError {
    Job(Error),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Diesel(err)
    }
}

/// Handle for submitting write jobs to the actor.
#[derive(Clone)]
pub struct WriteHandle {
    sender: mpsc::Sender<WriteJob>,
}

impl WriteHandle {
    /// Run `job` inside an immediate transaction on the writer thread. An
    /// `Err` from the job rolls the transaction back.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T>>();
        let wrapped: WriteJob = Box::new(move |conn| {
            let outcome = conn
                .immediate_transaction::<T, TxError, _>(|tx_conn| {
                    job(tx_conn).map_err(TxError::Job)
                })
                .map_err(|err| match err {
                    TxError::Job(inner) => inner,
                    TxError::Diesel(inner) => Error::from(StorageError::from(inner)),
                });
            let _ = tx.send(outcome);
        });

        self.sender.send(wrapped).map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Write actor is not running".to_string(),
            ))
        })?;
        rx.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Write job dropped before completion".to_string(),
            ))
        })?
    }
}

/// Spawn the writer thread and return its handle.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (sender, receiver) = mpsc::channel::<WriteJob>();
    thread::Builder::new()
        .name("tracklet-db-writer".to_string())
        .spawn(move || {
            while let Ok(job) = receiver.recv() {
                match pool.get() {
                    Ok(mut conn) => job(&mut conn),
                    // The job's oneshot sender is dropped with it; the
                    // caller observes the canceled job.
                    Err(err) => error!("[Storage] Writer could not acquire a connection: {}", err),
                }
            }
        })
        .expect("failed to spawn db writer thread");
    WriteHandle { sender }
}
