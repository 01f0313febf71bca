mod clock;
mod occurrence;

pub use clock::{Clock, ZonedClock};
pub use occurrence::{
    JITTER_TOLERANCE_MINUTES, next_occurrence_after, reference_instant, resolve_due_occurrence,
    was_already_dispatched,
};
