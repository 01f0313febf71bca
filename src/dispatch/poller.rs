use std::{sync::Arc, time::Duration};

use chrono::NaiveDateTime;
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    reminder::UserId,
    scheduling::Clock,
    storage::{ReminderStorage, StorageError},
};

use super::{DispatchOutcome, MIN_INTERVAL, ReminderDeliveryChannel, dispatch_if_due};

/// Re-checks a single user's reminders on a fixed interval while the user is connected.
#[derive(Clone)]
pub struct UserReminderPoller {
    storage: Arc<dyn ReminderStorage>,
    delivery: Arc<dyn ReminderDeliveryChannel>,
    clock: Arc<dyn Clock>,
}

pub struct PollerHandle {
    task: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

impl PollerHandle {
    pub async fn stop(self, timeout: Duration) {
        self.cancellation_token.cancel();
        let _ = time::timeout(timeout, self.task).await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl UserReminderPoller {
    pub fn new(
        storage: Arc<dyn ReminderStorage>,
        delivery: Arc<dyn ReminderDeliveryChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            delivery,
            clock,
        }
    }

    /// Starts polling. Cancelling `shutdown` or calling [`PollerHandle::stop`] ends the loop.
    /// Intervals shorter than a second are raised to one second.
    pub fn spawn(
        &self,
        user_id: UserId,
        interval: Duration,
        shutdown: &CancellationToken,
    ) -> PollerHandle {
        let interval = interval.max(MIN_INTERVAL);
        let cancellation_token = shutdown.child_token();
        let task_cancellation_token = cancellation_token.clone();
        let poller = self.clone();

        let task = tokio::spawn(async move {
            poller
                .poll_user(user_id, interval, task_cancellation_token)
                .await
        });

        PollerHandle {
            task,
            cancellation_token,
        }
    }

    /// Dispatches every due reminder of the user, returning how many were sent.
    pub async fn check_user(
        &self,
        user_id: UserId,
        now: NaiveDateTime,
    ) -> Result<usize, StorageError> {
        let reminders = self.storage.get_all_user_reminders(user_id).await?;
        let mut sent = 0;

        for reminder in reminders.iter().filter(|reminder| reminder.is_active) {
            match dispatch_if_due(self.storage.as_ref(), self.delivery.as_ref(), reminder, now)
                .await
            {
                Ok(DispatchOutcome::Sent(_)) => sent += 1,
                Ok(DispatchOutcome::NotDue | DispatchOutcome::ClaimedElsewhere) => {}
                Err(error) => log::error!(
                    "Error dispatching reminder. error = {:#}, reminder_id = {}, user_id = {}",
                    anyhow::Error::from(error),
                    reminder.id,
                    user_id
                ),
            }
        }

        Ok(sent)
    }

    async fn poll_user(
        &self,
        user_id: UserId,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) {
        log::info!("[POLL] Watching reminders for user {}", user_id);
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    log::info!("[POLL] Stopped watching reminders for user {}", user_id);
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(error) = self.check_user(user_id, self.clock.now()).await {
                        log::error!("Could not load reminders for user {}: {}", user_id, error);
                    }
                }
            }
        }
    }
}
