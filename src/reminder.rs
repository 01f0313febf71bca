use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

pub type ReminderId = i64;
pub type UserId = i64;

/// How often a reminder fires. Each variant only carries what it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recurrence {
    Daily,
    Weekly { days: Vec<Weekday> },
    /// `anchor_date` only contributes its day of month.
    Monthly { anchor_date: Option<NaiveDate> },
    Once { date: Option<NaiveDate> },
}

impl Recurrence {
    /// One-time reminders are deactivated by the caller after the first dispatch.
    pub fn is_one_time(&self) -> bool {
        matches!(self, Recurrence::Once { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Recurrence::Daily => "daily",
            Recurrence::Weekly { .. } => "weekly",
            Recurrence::Monthly { .. } => "monthly",
            Recurrence::Once { .. } => "once",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderFireTime(NaiveTime);

impl ReminderFireTime {
    pub fn new(inner: NaiveTime) -> Self {
        let normalized_time = inner.with_nanosecond(0).unwrap_or(inner);
        Self(normalized_time)
    }

    pub fn time(&self) -> &NaiveTime {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: ReminderId,
    pub user_id: UserId,
    pub text: String,
    pub recurrence: Recurrence,
    pub fire_at: ReminderFireTime,
    pub is_active: bool,
    pub last_sent_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
}
