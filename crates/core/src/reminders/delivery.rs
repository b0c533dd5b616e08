//! Delivery listener: OS callbacks routed into the lifecycle manager.
//!
//! Fires arrive out-of-process (the app may be backgrounded or not running
//! when the OS shows the notification); the host shell replays them into
//! `dispatch` on next activation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

use super::reminders_service::ReminderServiceTrait;

/// Delivery-side callbacks observed at the OS boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DeliveryEvent {
    /// A local notification was shown or tapped.
    #[serde(rename_all = "camelCase")]
    NotificationOpened {
        reminder_id: String,
        scheduled_at: Option<DateTime<Utc>>,
    },

    /// A native exact alarm fired.
    #[serde(rename_all = "camelCase")]
    AlarmFired {
        reminder_id: String,
        scheduled_at: Option<DateTime<Utc>>,
    },

    /// The push channel delivered a server-broadcast reminder; treated as
    /// an already-fired one-time.
    #[serde(rename_all = "camelCase")]
    BroadcastDelivered { reminder_id: String },
}

pub struct DeliveryListener {
    service: Arc<dyn ReminderServiceTrait>,
}

impl DeliveryListener {
    pub fn new(service: Arc<dyn ReminderServiceTrait>) -> Self {
        Self { service }
    }

    pub async fn dispatch(&self, event: DeliveryEvent) -> Result<()> {
        debug!("[Delivery] {:?}", event);
        match event {
            DeliveryEvent::NotificationOpened {
                reminder_id,
                scheduled_at,
            }
            | DeliveryEvent::AlarmFired {
                reminder_id,
                scheduled_at,
            } => self.service.record_fired(&reminder_id, scheduled_at).await,
            DeliveryEvent::BroadcastDelivered { reminder_id } => {
                self.service.record_fired(&reminder_id, None).await
            }
        }
    }
}
