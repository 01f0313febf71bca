use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::Deserialize;
use thiserror::Error;

use crate::reminder::{Recurrence, Reminder, ReminderFireTime, ReminderId, UserId};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Flat reminder row as stored by the portal. Which optional fields matter
/// depends on `recurrence_type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReminderRecord {
    pub id: ReminderId,
    pub user_id: UserId,
    pub text: String,
    pub recurrence_type: String,
    pub time_of_day: String,
    #[serde(default)]
    pub days_of_week: Vec<String>,
    #[serde(default)]
    pub specific_date: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub last_sent_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_active() -> bool {
    true
}

pub struct NewReminder {
    pub user_id: UserId,
    pub text: String,
    pub recurrence: Recurrence,
    pub fire_at: ReminderFireTime,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Unknown recurrence type {0:?}")]
    UnknownRecurrence(String),

    #[error("Invalid time of day {0:?}")]
    InvalidTimeOfDay(String),
}

impl TryFrom<ReminderRecord> for Reminder {
    type Error = RecordError;

    fn try_from(value: ReminderRecord) -> Result<Self, Self::Error> {
        let fire_at = parse_time_of_day(&value.time_of_day)
            .ok_or_else(|| RecordError::InvalidTimeOfDay(value.time_of_day.clone()))?;
        let recurrence = parse_recurrence(&value)?;

        Ok(Self {
            id: value.id,
            user_id: value.user_id,
            text: value.text,
            recurrence,
            fire_at: ReminderFireTime::new(fire_at),
            is_active: value.is_active,
            last_sent_at: parse_timestamp(value.id, "last_sent_at", value.last_sent_at.as_deref()),
            created_at: parse_timestamp(value.id, "created_at", value.created_at.as_deref()),
        })
    }
}

impl From<Reminder> for ReminderRecord {
    fn from(value: Reminder) -> Self {
        let (days_of_week, specific_date) = match &value.recurrence {
            Recurrence::Daily => (Vec::new(), None),
            Recurrence::Weekly { days } => (days.iter().map(ToString::to_string).collect(), None),
            Recurrence::Monthly { anchor_date: date } | Recurrence::Once { date } => {
                (Vec::new(), date.map(|date| date.format(DATE_FORMAT).to_string()))
            }
        };

        Self {
            id: value.id,
            user_id: value.user_id,
            text: value.text,
            recurrence_type: value.recurrence.kind().to_string(),
            time_of_day: value.fire_at.time().format(TIME_FORMATS[0]).to_string(),
            days_of_week,
            specific_date,
            is_active: value.is_active,
            last_sent_at: value.last_sent_at.map(format_timestamp),
            created_at: value.created_at.map(format_timestamp),
        }
    }
}

fn parse_recurrence(record: &ReminderRecord) -> Result<Recurrence, RecordError> {
    let recurrence = match record.recurrence_type.trim().to_ascii_lowercase().as_str() {
        "daily" => Recurrence::Daily,
        "weekly" => Recurrence::Weekly {
            days: parse_days(record.id, &record.days_of_week),
        },
        "monthly" => Recurrence::Monthly {
            anchor_date: parse_specific_date(record.id, record.specific_date.as_deref()),
        },
        "once" => Recurrence::Once {
            date: parse_specific_date(record.id, record.specific_date.as_deref()),
        },
        _ => return Err(RecordError::UnknownRecurrence(record.recurrence_type.clone())),
    };

    Ok(recurrence)
}

fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value.trim(), format).ok())
}

fn parse_days(id: ReminderId, days: &[String]) -> Vec<Weekday> {
    days.iter()
        .filter_map(|day| match day.trim().parse::<Weekday>() {
            Ok(weekday) => Some(weekday),
            Err(_) => {
                log::warn!("Ignoring unknown weekday {:?} for reminder {}", day, id);
                None
            }
        })
        .collect()
}

fn parse_specific_date(id: ReminderId, value: Option<&str>) -> Option<NaiveDate> {
    let value = value?.trim();
    let date = NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .or_else(|| parse_date_time(value).map(|dt| dt.date()));

    if date.is_none() {
        log::warn!("Ignoring unparseable date {:?} for reminder {}", value, id);
    }

    date
}

/// Missing or unreadable timestamps become absent rather than failing the record.
fn parse_timestamp(id: ReminderId, field: &str, value: Option<&str>) -> Option<NaiveDateTime> {
    let value = value?.trim();
    let timestamp = parse_date_time(value).or_else(|| {
        NaiveDate::parse_from_str(value, DATE_FORMAT)
            .ok()
            .map(|date| date.and_time(NaiveTime::MIN))
    });

    if timestamp.is_none() {
        log::warn!("Ignoring unparseable {} {:?} for reminder {}", field, value, id);
    }

    timestamp
}

fn parse_date_time(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMATS[0]).to_string()
}
