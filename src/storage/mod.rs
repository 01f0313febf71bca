mod model;
mod reminder_storage;

pub use model::{NewReminder, RecordError, ReminderRecord};
pub use reminder_storage::{InMemoryReminderStorage, ReminderStorage, StorageError};
