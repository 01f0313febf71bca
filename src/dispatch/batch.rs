use std::{sync::Arc, time::Duration};

use chrono::NaiveDateTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    scheduling::Clock,
    storage::{ReminderStorage, StorageError},
};

use super::{DispatchOutcome, MIN_INTERVAL, ReminderDeliveryChannel, dispatch_if_due};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub checked: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Periodic scan over every active reminder.
pub struct BatchDispatcher {
    storage: Arc<dyn ReminderStorage>,
    delivery: Arc<dyn ReminderDeliveryChannel>,
    clock: Arc<dyn Clock>,
    scan_lock: Mutex<()>,
}

impl BatchDispatcher {
    pub fn new(
        storage: Arc<dyn ReminderStorage>,
        delivery: Arc<dyn ReminderDeliveryChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            delivery,
            clock,
            scan_lock: Mutex::new(()),
        }
    }

    /// Runs one scan. Overlapping calls wait for each other.
    pub async fn run_once(&self, now: NaiveDateTime) -> Result<DispatchReport, StorageError> {
        let _scan = self.scan_lock.lock().await;
        let reminders = self.storage.get_all().await?;
        let mut report = DispatchReport::default();

        for reminder in reminders.iter().filter(|reminder| reminder.is_active) {
            report.checked += 1;
            match dispatch_if_due(self.storage.as_ref(), self.delivery.as_ref(), reminder, now)
                .await
            {
                Ok(DispatchOutcome::Sent(_)) => report.sent += 1,
                Ok(DispatchOutcome::NotDue | DispatchOutcome::ClaimedElsewhere) => {}
                Err(error) => {
                    report.failed += 1;
                    log::error!(
                        "Error dispatching reminder. error = {:#}, reminder_id = {}",
                        anyhow::Error::from(error),
                        reminder.id
                    );
                }
            }
        }

        Ok(report)
    }

    pub async fn run(&self, interval: Duration, cancellation_token: CancellationToken) {
        let interval = interval.max(MIN_INTERVAL);
        log::info!("Starting batch reminder dispatcher. interval = {:?}", interval);
        loop {
            match self.run_once(self.clock.now()).await {
                Ok(report) if report.sent > 0 || report.failed > 0 => log::info!(
                    "[BATCH] checked = {}, sent = {}, failed = {}",
                    report.checked,
                    report.sent,
                    report.failed
                ),
                Ok(report) => log::debug!("[BATCH] checked = {}, nothing due", report.checked),
                Err(error) => log::error!("Could not load reminders for batch scan: {}", error),
            }

            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    log::info!("Batch reminder dispatcher shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}
