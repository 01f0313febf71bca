use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;

use crate::storage::ReminderRecord;

#[derive(Deserialize, Debug)]
pub struct SchedulerSettings {
    pub timezone: String,
    pub batch_interval_secs: u64,
}

impl SchedulerSettings {
    pub fn timezone(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|error| anyhow::anyhow!("Invalid timezone {:?}: {}", self.timezone, error))
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.batch_interval_secs.max(1))
    }
}

#[derive(Deserialize, Debug)]
pub struct AppSettings {
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub reminders: Vec<ReminderRecord>,
}

impl AppSettings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("appsettings").required(true))
            .add_source(File::with_name("appsettings.local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("scheduler.timezone", "Asia/Jakarta")?
            .set_default("scheduler.batch_interval_secs", 60_i64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use config::{File, FileFormat};

    use super::*;
    use crate::storage::{InMemoryReminderStorage, ReminderStorage};

    fn from_toml(source: &str) -> AppSettings {
        AppSettings::builder()
            .unwrap()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    pub fn defaults_apply_when_scheduler_section_is_missing() {
        let settings = from_toml("");

        assert_eq!(settings.scheduler.timezone().unwrap(), Tz::Asia__Jakarta);
        assert_eq!(settings.scheduler.batch_interval(), Duration::from_secs(60));
        assert!(settings.reminders.is_empty());
    }

    #[test]
    pub fn reminders_are_read_from_configuration() {
        let settings = from_toml(
            r#"
            [scheduler]
            timezone = "Asia/Makassar"
            batch_interval_secs = 0

            [[reminders]]
            id = 1
            user_id = 10
            text = "Isi laporan kegiatan harian"
            recurrence_type = "weekly"
            time_of_day = "16:00"
            days_of_week = ["Monday", "Friday"]
            last_sent_at = "2025-01-03T16:00:05"
            "#,
        );

        assert_eq!(settings.scheduler.timezone().unwrap(), Tz::Asia__Makassar);
        assert_eq!(settings.scheduler.batch_interval(), Duration::from_secs(1));

        let record = &settings.reminders[0];
        assert_eq!(record.days_of_week, vec!["Monday", "Friday"]);
        assert!(record.is_active);
        assert_eq!(record.last_sent_at.as_deref(), Some("2025-01-03T16:00:05"));
        assert_eq!(record.specific_date, None);
    }

    #[tokio::test]
    pub async fn loose_timestamps_do_not_reject_configuration() {
        let settings = from_toml(
            r#"
            [[reminders]]
            id = 1
            user_id = 10
            text = "Isi laporan kegiatan harian"
            recurrence_type = "daily"
            time_of_day = "16:00"
            created_at = "2025-01-01 08:00:00"

            [[reminders]]
            id = 2
            user_id = 10
            text = "Unggah laporan bulanan"
            recurrence_type = "monthly"
            time_of_day = "09:00"
            last_sent_at = "sudah terkirim"

            [[reminders]]
            id = 3
            user_id = 10
            text = "Rekap tahunan"
            recurrence_type = "yearly"
            time_of_day = "09:00"
            "#,
        );

        let storage = InMemoryReminderStorage::from_records(settings.reminders);
        let reminders = storage.get_all().await.unwrap();

        assert_eq!(reminders.len(), 2);
        assert_eq!(
            reminders[0].created_at,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(8, 0, 0)
        );
        assert_eq!(reminders[1].last_sent_at, None);
    }

    #[test]
    pub fn unknown_timezone_is_an_error() {
        let settings = from_toml(
            r#"
            [scheduler]
            timezone = "Mars/Olympus_Mons"
            "#,
        );

        assert!(settings.scheduler.timezone().is_err());
    }
}
