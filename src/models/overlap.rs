//! Interval-overlap predicate for scheduled entities.
//!
//! The store uses this to reject schedules that would double-book: two
//! entities conflict when their `[start, start + duration)` intervals
//! intersect. Entities without a start time occupy no interval and never
//! conflict with anything.

use super::Timed;

/// Check whether the scheduled intervals of two entities intersect.
///
/// Intervals are inclusive-exclusive, so back-to-back entities (one ending
/// exactly when the other starts) do not cross. A missing duration is
/// treated as a zero-length interval, which crosses nothing - not even an
/// identical copy of itself, since the comparison is strict.
///
/// The predicate is pure and symmetric: `is_crossed(a, b) == is_crossed(b, a)`.
pub fn is_crossed(a: &impl Timed, b: &impl Timed) -> bool {
    let (Some(a_start), Some(b_start)) = (a.start_time(), b.start_time()) else {
        return false;
    };

    let a_end = a.end_time().unwrap_or(a_start);
    let b_end = b.end_time().unwrap_or(b_start);

    a_start < b_end && b_start < a_end
}
