//! Due-occurrence resolution for recurring reminders.
//!
//! Everything here is a pure function of the reminder and the supplied
//! instants. Instants are wall-clock times in the server's local zone.
//! Malformed recurrence data resolves to "no occurrence" instead of an error.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};

use crate::reminder::{Recurrence, Reminder};

/// A recomputed occurrence closer than this to the last dispatch counts as the same one.
pub const JITTER_TOLERANCE_MINUTES: i64 = 5;

const DAYS_IN_WEEK: i64 = 7;

/// Next firing instant strictly after `after`, if the reminder has one.
pub fn next_occurrence_after(reminder: &Reminder, after: NaiveDateTime) -> Option<NaiveDateTime> {
    if !reminder.is_active {
        return None;
    }

    let fire_at = *reminder.fire_at.time();
    match &reminder.recurrence {
        Recurrence::Daily => next_daily(fire_at, after),
        Recurrence::Weekly { days } => days
            .iter()
            .filter_map(|day| next_weekly(*day, fire_at, after))
            .min(),
        Recurrence::Monthly { anchor_date } => {
            let day = anchor_day(anchor_date.as_ref(), reminder.created_at.as_ref());
            next_monthly(day, fire_at, after)
        }
        Recurrence::Once { date } => {
            let candidate = date.as_ref()?.and_time(fire_at);
            (candidate > after).then_some(candidate)
        }
    }
}

/// Whether the last dispatch already covers the period `now` falls in.
pub fn was_already_dispatched(reminder: &Reminder, now: NaiveDateTime) -> bool {
    let Some(last_sent_at) = reminder.last_sent_at else {
        return false;
    };

    match &reminder.recurrence {
        Recurrence::Daily => last_sent_at.date() == now.date(),
        Recurrence::Weekly { .. } => {
            last_sent_at.weekday() == now.weekday()
                && now - last_sent_at < TimeDelta::days(DAYS_IN_WEEK)
        }
        Recurrence::Monthly { .. } => {
            last_sent_at.year() == now.year() && last_sent_at.month() == now.month()
        }
        Recurrence::Once { .. } => true,
    }
}

/// The occurrence that is due at `now` and has not been dispatched yet.
///
/// Callers dispatch when this returns `Some` and record `last_sent_at = now`.
pub fn resolve_due_occurrence(reminder: &Reminder, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let reference = reference_instant(reminder, now);
    let candidate = next_occurrence_after(reminder, reference)?;

    if candidate > now || was_already_dispatched(reminder, now) {
        return None;
    }

    if let Some(last_sent_at) = reminder.last_sent_at {
        if reminder.recurrence.is_one_time() || within_jitter_tolerance(candidate, last_sent_at) {
            return None;
        }
    }

    Some(candidate)
}

/// The instant occurrences are searched from: last dispatch, then creation, then `now`.
pub fn reference_instant(reminder: &Reminder, now: NaiveDateTime) -> NaiveDateTime {
    first_present([reminder.last_sent_at, reminder.created_at], now)
}

fn first_present<T>(candidates: impl IntoIterator<Item = Option<T>>, fallback: T) -> T {
    candidates.into_iter().flatten().next().unwrap_or(fallback)
}

fn within_jitter_tolerance(candidate: NaiveDateTime, last_sent_at: NaiveDateTime) -> bool {
    (candidate - last_sent_at).num_minutes().abs() < JITTER_TOLERANCE_MINUTES
}

fn next_daily(fire_at: NaiveTime, after: NaiveDateTime) -> Option<NaiveDateTime> {
    let today = after.date().and_time(fire_at);
    if today > after {
        return Some(today);
    }

    after.date().succ_opt().map(|date| date.and_time(fire_at))
}

fn next_weekly(day: Weekday, fire_at: NaiveTime, after: NaiveDateTime) -> Option<NaiveDateTime> {
    let days_ahead = (i64::from(day.num_days_from_monday())
        - i64::from(after.weekday().num_days_from_monday()))
    .rem_euclid(DAYS_IN_WEEK);

    let candidate = after
        .date()
        .checked_add_signed(TimeDelta::days(days_ahead))?
        .and_time(fire_at);

    if candidate > after {
        Some(candidate)
    } else {
        candidate.checked_add_signed(TimeDelta::days(DAYS_IN_WEEK))
    }
}

fn next_monthly(anchor_day: u32, fire_at: NaiveTime, after: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = (after.year(), after.month());
    let candidate = clamped_date(year, month, anchor_day)?.and_time(fire_at);
    if candidate > after {
        return Some(candidate);
    }

    let (year, month) = following_month(year, month);
    clamped_date(year, month, anchor_day).map(|date| date.and_time(fire_at))
}

fn anchor_day(anchor_date: Option<&NaiveDate>, created_at: Option<&NaiveDateTime>) -> u32 {
    anchor_date
        .map(|date| date.day())
        .or_else(|| created_at.map(|created_at| created_at.day()))
        .unwrap_or(1)
}

fn following_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

pub(crate) fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = following_month(year, month);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?
        .pred_opt()
        .map(|date| date.day())
}

/// `day` in the given month, pulled back to the month's last day when it overflows.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let day = day.clamp(1, last_day_of_month(year, month)?);
    NaiveDate::from_ymd_opt(year, month, day)
}
