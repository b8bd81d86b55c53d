// Calendar value objects
//
// Read-only event data the narrative generator and the intent processor
// consume. Events are never mutated after construction; analysis derives
// fresh aggregates per invocation.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::VoiceError;

/// Where an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    /// Device-local calendar
    Local,
    /// Subscribed (read-only) calendar
    Subscribed,
    /// External account (CalDAV, Exchange, ...)
    External,
}

/// A single calendar event over a concrete time range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub is_all_day: bool,
    pub location: Option<String>,
    pub source: EventSource,
}

impl CalendarEvent {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Strict range overlap: back-to-back events do not conflict.
    ///
    /// Symmetric by construction: `a.conflicts_with(b) == b.conflicts_with(a)`.
    pub fn conflicts_with(&self, other: &CalendarEvent) -> bool {
        self.end > other.start && other.end > self.start
    }

    /// Trimmed location, if one is set and non-empty
    pub fn location_trimmed(&self) -> Option<&str> {
        self.location
            .as_deref()
            .map(str::trim)
            .filter(|loc| !loc.is_empty())
    }
}

/// Half-open window of interest for queries and analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
}

impl TimeRange {
    pub fn new(start: DateTime<Local>, end: DateTime<Local>) -> Self {
        TimeRange { start, end }
    }

    pub fn contains(&self, instant: DateTime<Local>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Read-only calendar access for a given window
#[async_trait]
pub trait CalendarEventSupplier: Send + Sync {
    async fn events_between(&self, range: &TimeRange) -> Result<Vec<CalendarEvent>, VoiceError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    /// Build an event on a fixed test day (2026-03-10) at hour:minute spans
    pub fn event(id: &str, title: &str, start_hm: (u32, u32), end_hm: (u32, u32)) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: title.to_string(),
            start: Local
                .with_ymd_and_hms(2026, 3, 10, start_hm.0, start_hm.1, 0)
                .unwrap(),
            end: Local
                .with_ymd_and_hms(2026, 3, 10, end_hm.0, end_hm.1, 0)
                .unwrap(),
            is_all_day: false,
            location: None,
            source: EventSource::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::event;

    #[test]
    fn test_conflict_is_strict_overlap() {
        let a = event("1", "Standup", (9, 0), (9, 30));
        let b = event("2", "Review", (9, 15), (10, 0));
        let c = event("3", "Lunch", (9, 30), (10, 30));

        assert!(a.conflicts_with(&b));
        // Back-to-back is not a conflict
        assert!(!a.conflicts_with(&c));
    }

    #[test]
    fn test_conflict_is_symmetric() {
        let a = event("1", "Standup", (9, 0), (10, 0));
        let b = event("2", "Review", (9, 30), (11, 0));
        assert_eq!(a.conflicts_with(&b), b.conflicts_with(&a));

        let far = event("3", "Dinner", (18, 0), (19, 0));
        assert_eq!(a.conflicts_with(&far), far.conflicts_with(&a));
    }

    #[test]
    fn test_duration_minutes() {
        let a = event("1", "Workshop", (13, 0), (14, 30));
        assert_eq!(a.duration_minutes(), 90);
    }

    #[test]
    fn test_location_trimmed() {
        let mut a = event("1", "Standup", (9, 0), (9, 30));
        assert_eq!(a.location_trimmed(), None);
        a.location = Some("   ".to_string());
        assert_eq!(a.location_trimmed(), None);
        a.location = Some(" Room 4 ".to_string());
        assert_eq!(a.location_trimmed(), Some("Room 4"));
    }
}
