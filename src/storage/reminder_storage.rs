use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::reminder::{Reminder, ReminderId, UserId};

use super::model::{NewReminder, ReminderRecord};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Reminder {0} does not exist")]
    NotFound(ReminderId),
}

#[async_trait]
pub trait ReminderStorage: Send + Sync {
    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError>;
    async fn get_all(&self) -> Result<Vec<Reminder>, StorageError>;
    async fn get_all_user_reminders(&self, user_id: UserId) -> Result<Vec<Reminder>, StorageError>;
    async fn insert(&self, reminder: NewReminder) -> Result<Reminder, StorageError>;
    async fn update(&self, reminder: Reminder) -> Result<Reminder, StorageError>;

    /// Atomically records a dispatch at `sent_at`, but only while the reminder is
    /// active and its `last_sent_at` still equals `expected_last_sent_at`.
    /// Returns `false` when another caller got there first. `deactivate`
    /// switches one-time reminders off.
    async fn claim_dispatch(
        &self,
        id: ReminderId,
        expected_last_sent_at: Option<NaiveDateTime>,
        sent_at: NaiveDateTime,
        deactivate: bool,
    ) -> Result<bool, StorageError>;

    /// Undoes a claim made at `claimed_at` whose delivery failed.
    async fn release_dispatch(
        &self,
        id: ReminderId,
        claimed_at: NaiveDateTime,
        previous_last_sent_at: Option<NaiveDateTime>,
    ) -> Result<(), StorageError>;
}

struct InMemoryReminderStore {
    next_id: ReminderId,
    reminders: HashMap<ReminderId, Reminder>,
}

pub struct InMemoryReminderStorage {
    store: RwLock<InMemoryReminderStore>,
}

impl Default for InMemoryReminderStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryReminderStorage {
    pub fn new() -> Self {
        InMemoryReminderStorage {
            store: RwLock::new(InMemoryReminderStore {
                next_id: 1,
                reminders: HashMap::new(),
            }),
        }
    }

    /// Seeds the store from flat records, skipping the ones that cannot be decoded.
    pub fn from_records(records: impl IntoIterator<Item = ReminderRecord>) -> Self {
        let mut reminders = HashMap::new();
        for record in records {
            let id = record.id;
            match Reminder::try_from(record) {
                Ok(reminder) => {
                    reminders.insert(id, reminder);
                }
                Err(error) => log::warn!("Skipping reminder {}: {}", id, error),
            }
        }

        let next_id = reminders.keys().max().map_or(1, |max| max + 1);
        log::info!("Loaded {} reminders", reminders.len());

        InMemoryReminderStorage {
            store: RwLock::new(InMemoryReminderStore { next_id, reminders }),
        }
    }
}

#[async_trait]
impl ReminderStorage for InMemoryReminderStorage {
    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError> {
        let store = self.store.read().await;
        Ok(store.reminders.get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Reminder>, StorageError> {
        let store = self.store.read().await;
        let mut reminders: Vec<_> = store.reminders.values().cloned().collect();
        reminders.sort_by_key(|reminder| reminder.id);
        Ok(reminders)
    }

    async fn get_all_user_reminders(&self, user_id: UserId) -> Result<Vec<Reminder>, StorageError> {
        let store = self.store.read().await;
        let mut reminders: Vec<_> = store
            .reminders
            .values()
            .filter(|reminder| reminder.user_id == user_id)
            .cloned()
            .collect();
        reminders.sort_by_key(|reminder| reminder.id);
        Ok(reminders)
    }

    async fn insert(&self, reminder: NewReminder) -> Result<Reminder, StorageError> {
        let mut store = self.store.write().await;
        let id = store.next_id;
        let NewReminder {
            user_id,
            text,
            recurrence,
            fire_at,
            created_at,
        } = reminder;

        let created_reminder = Reminder {
            id,
            user_id,
            text,
            recurrence,
            fire_at,
            is_active: true,
            last_sent_at: None,
            created_at: Some(created_at),
        };

        store.reminders.insert(id, created_reminder.clone());
        store.next_id += 1;
        log::info!("Created reminder {} for user {}", id, user_id);

        Ok(created_reminder)
    }

    async fn update(&self, reminder: Reminder) -> Result<Reminder, StorageError> {
        let mut store = self.store.write().await;
        match store.reminders.get_mut(&reminder.id) {
            Some(existing) => {
                *existing = reminder.clone();
                Ok(reminder)
            }
            None => Err(StorageError::NotFound(reminder.id)),
        }
    }

    async fn claim_dispatch(
        &self,
        id: ReminderId,
        expected_last_sent_at: Option<NaiveDateTime>,
        sent_at: NaiveDateTime,
        deactivate: bool,
    ) -> Result<bool, StorageError> {
        let mut store = self.store.write().await;
        let reminder = store
            .reminders
            .get_mut(&id)
            .ok_or(StorageError::NotFound(id))?;

        if !reminder.is_active || reminder.last_sent_at != expected_last_sent_at {
            return Ok(false);
        }

        reminder.last_sent_at = Some(sent_at);
        if deactivate {
            reminder.is_active = false;
        }

        Ok(true)
    }

    async fn release_dispatch(
        &self,
        id: ReminderId,
        claimed_at: NaiveDateTime,
        previous_last_sent_at: Option<NaiveDateTime>,
    ) -> Result<(), StorageError> {
        let mut store = self.store.write().await;
        let reminder = store
            .reminders
            .get_mut(&id)
            .ok_or(StorageError::NotFound(id))?;

        if reminder.last_sent_at == Some(claimed_at) {
            reminder.last_sent_at = previous_last_sent_at;
            reminder.is_active = true;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::reminder::{Recurrence, ReminderFireTime};

    fn created_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn new_reminder(user_id: UserId) -> NewReminder {
        NewReminder {
            user_id,
            text: "Isi laporan".to_owned(),
            recurrence: Recurrence::Daily,
            fire_at: ReminderFireTime::new(NaiveTime::from_hms_opt(16, 0, 0).unwrap()),
            created_at: created_at(),
        }
    }

    fn record(id: ReminderId, recurrence_type: &str) -> ReminderRecord {
        ReminderRecord {
            id,
            user_id: 1,
            text: "Isi laporan".to_owned(),
            recurrence_type: recurrence_type.to_owned(),
            time_of_day: "16:00".to_owned(),
            days_of_week: Vec::new(),
            specific_date: None,
            is_active: true,
            last_sent_at: None,
            created_at: None,
        }
    }

    #[tokio::test]
    pub async fn insert_assigns_sequential_ids() {
        let storage = InMemoryReminderStorage::new();

        let first = storage.insert(new_reminder(1)).await.unwrap();
        let second = storage.insert(new_reminder(2)).await.unwrap();

        assert_eq!(first.id + 1, second.id);
        assert!(first.is_active);
        assert_eq!(first.created_at, Some(created_at()));
        assert_eq!(storage.get(second.id).await.unwrap(), Some(second));
    }

    #[tokio::test]
    pub async fn user_reminders_are_filtered_by_owner() {
        let storage = InMemoryReminderStorage::new();
        storage.insert(new_reminder(1)).await.unwrap();
        storage.insert(new_reminder(2)).await.unwrap();
        storage.insert(new_reminder(1)).await.unwrap();

        let reminders = storage.get_all_user_reminders(1).await.unwrap();

        assert_eq!(reminders.len(), 2);
        assert!(reminders.iter().all(|reminder| reminder.user_id == 1));
        assert_eq!(storage.get_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    pub async fn claim_records_dispatch_and_deactivates_on_request() {
        let storage = InMemoryReminderStorage::new();
        let reminder = storage.insert(new_reminder(1)).await.unwrap();
        let sent_at = created_at() + chrono::TimeDelta::hours(8);

        assert!(storage.claim_dispatch(reminder.id, None, sent_at, false).await.unwrap());
        let updated = storage.get(reminder.id).await.unwrap().unwrap();
        assert_eq!(updated.last_sent_at, Some(sent_at));
        assert!(updated.is_active);

        let later = sent_at + chrono::TimeDelta::days(1);
        assert!(
            storage
                .claim_dispatch(reminder.id, Some(sent_at), later, true)
                .await
                .unwrap()
        );
        assert!(!storage.get(reminder.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    pub async fn claim_from_stale_copy_is_refused() {
        let storage = InMemoryReminderStorage::new();
        let reminder = storage.insert(new_reminder(1)).await.unwrap();
        let sent_at = created_at() + chrono::TimeDelta::hours(8);

        assert!(storage.claim_dispatch(reminder.id, None, sent_at, false).await.unwrap());
        assert!(!storage.claim_dispatch(reminder.id, None, sent_at, false).await.unwrap());

        let stored = storage.get(reminder.id).await.unwrap().unwrap();
        assert_eq!(stored.last_sent_at, Some(sent_at));
    }

    #[tokio::test]
    pub async fn release_restores_state_before_the_claim() {
        let storage = InMemoryReminderStorage::new();
        let reminder = storage.insert(new_reminder(1)).await.unwrap();
        let sent_at = created_at() + chrono::TimeDelta::hours(8);

        storage.claim_dispatch(reminder.id, None, sent_at, true).await.unwrap();
        storage.release_dispatch(reminder.id, sent_at, None).await.unwrap();

        let stored = storage.get(reminder.id).await.unwrap().unwrap();
        assert_eq!(stored.last_sent_at, None);
        assert!(stored.is_active);
    }

    #[tokio::test]
    pub async fn missing_reminders_are_reported() {
        let storage = InMemoryReminderStorage::new();

        assert!(matches!(
            storage.claim_dispatch(42, None, created_at(), false).await,
            Err(StorageError::NotFound(42))
        ));

        let mut ghost = storage.insert(new_reminder(1)).await.unwrap();
        ghost.id = 99;
        assert!(matches!(
            storage.update(ghost).await,
            Err(StorageError::NotFound(99))
        ));
    }

    #[tokio::test]
    pub async fn seeding_skips_undecodable_records() {
        let storage = InMemoryReminderStorage::from_records([
            record(4, "daily"),
            record(5, "fortnightly"),
            record(8, "weekly"),
        ]);

        let ids: Vec<_> = storage
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|reminder| reminder.id)
            .collect();
        assert_eq!(ids, vec![4, 8]);

        let inserted = storage.insert(new_reminder(1)).await.unwrap();
        assert_eq!(inserted.id, 9);
    }
}
