use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::reminder::Reminder;

/// Outgoing side of a dispatch, e.g. the WhatsApp gateway.
#[async_trait]
pub trait ReminderDeliveryChannel: Send + Sync + 'static {
    async fn send_reminder(
        &self,
        reminder: &Reminder,
        occurrence: NaiveDateTime,
    ) -> anyhow::Result<()>;
}

/// Writes reminders to the log instead of delivering them.
pub struct LogDeliveryChannel;

#[async_trait]
impl ReminderDeliveryChannel for LogDeliveryChannel {
    async fn send_reminder(
        &self,
        reminder: &Reminder,
        occurrence: NaiveDateTime,
    ) -> anyhow::Result<()> {
        log::info!(
            "[DELIVERY] user_id = {}, reminder_id = {}: {}",
            reminder.user_id,
            reminder.id,
            reminder_message_text(reminder, occurrence)
        );

        Ok(())
    }
}

pub fn reminder_message_text(reminder: &Reminder, occurrence: NaiveDateTime) -> String {
    format!(
        "⏰ Pengingat SILAKAN ({}): {}",
        occurrence.format("%d-%m-%Y %H:%M"),
        reminder.text
    )
}
