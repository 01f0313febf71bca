mod batch;
mod delivery;
mod poller;

pub use batch::{BatchDispatcher, DispatchReport};
pub use delivery::{LogDeliveryChannel, ReminderDeliveryChannel, reminder_message_text};
pub use poller::{PollerHandle, UserReminderPoller};

use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::{
    reminder::{Reminder, ReminderId},
    scheduling::resolve_due_occurrence,
    storage::{ReminderStorage, StorageError},
};

/// Shortest interval the dispatch loops accept.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    NotDue,
    /// Another caller claimed the occurrence between the snapshot and this dispatch.
    ClaimedElsewhere,
    Sent(NaiveDateTime),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Delivery failed for reminder {id}")]
    Delivery {
        id: ReminderId,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Sends the reminder if an occurrence is due at `now` and records the dispatch.
///
/// The dispatch is claimed in storage before delivery, so concurrent callers
/// working from the same snapshot send it once. A failed delivery releases the claim.
pub async fn dispatch_if_due(
    storage: &dyn ReminderStorage,
    delivery: &dyn ReminderDeliveryChannel,
    reminder: &Reminder,
    now: NaiveDateTime,
) -> Result<DispatchOutcome, DispatchError> {
    let Some(occurrence) = resolve_due_occurrence(reminder, now) else {
        return Ok(DispatchOutcome::NotDue);
    };

    log::info!(
        "[DISPATCH] Reminder {} is due. occurrence = {}, now = {}",
        reminder.id,
        occurrence,
        now
    );

    let claimed = storage
        .claim_dispatch(
            reminder.id,
            reminder.last_sent_at,
            now,
            reminder.recurrence.is_one_time(),
        )
        .await?;
    if !claimed {
        log::info!(
            "[DISPATCH] Reminder {} was already claimed by another caller",
            reminder.id
        );
        return Ok(DispatchOutcome::ClaimedElsewhere);
    }

    if let Err(source) = delivery.send_reminder(reminder, occurrence).await {
        storage
            .release_dispatch(reminder.id, now, reminder.last_sent_at)
            .await?;
        return Err(DispatchError::Delivery {
            id: reminder.id,
            source,
        });
    }

    Ok(DispatchOutcome::Sent(occurrence))
}
