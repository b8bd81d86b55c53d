//! Schedule narrative generator
//!
//! Deterministic, side-effect-free transformation of calendar events into
//! spoken prose. Analysis first (conflicts, busy periods, gaps, tight
//! transitions, a qualitative character label), then per-intent response
//! builders that assemble a greeting/body/insight/follow-up tuple.
//!
//! All time-relative phrasing derives from an injected anchor timestamp, so
//! every narrative is reproducible under test with a fixed reference date.

use chrono::{DateTime, Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};

use crate::calendar::{CalendarEvent, TimeRange};

// Analysis thresholds. Kept together so tuning the narrative never means
// hunting magic numbers through the logic.
const BUSY_PERIOD_MIN_EVENTS: usize = 3;
const BUSY_PERIOD_MAX_GAP_MINUTES: i64 = 15;
const SIGNIFICANT_GAP_MINUTES: i64 = 30;
const TIGHT_TRANSITION_MINUTES: i64 = 15;
const TRAVEL_ESTIMATE_MINUTES: i64 = 15;

// Character classification thresholds: event count and total timed duration
const LIGHT_MAX_EVENTS: usize = 2;
const LIGHT_MAX_MINUTES: i64 = 2 * 60;
const MODERATE_MAX_EVENTS: usize = 4;
const MODERATE_MAX_MINUTES: i64 = 4 * 60;
const BUSY_MAX_EVENTS: usize = 6;
const BUSY_MAX_MINUTES: i64 = 6 * 60;

/// How many event titles a body spells out before summarizing the rest
const MAX_LISTED_EVENTS: usize = 4;

/// Qualitative label for a schedule over a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleCharacter {
    Clear,
    Light,
    Moderate,
    Busy,
    Packed,
}

impl ScheduleCharacter {
    fn classify(event_count: usize, timed_minutes: i64) -> Self {
        if event_count == 0 {
            ScheduleCharacter::Clear
        } else if event_count <= LIGHT_MAX_EVENTS && timed_minutes < LIGHT_MAX_MINUTES {
            ScheduleCharacter::Light
        } else if event_count <= MODERATE_MAX_EVENTS && timed_minutes < MODERATE_MAX_MINUTES {
            ScheduleCharacter::Moderate
        } else if event_count <= BUSY_MAX_EVENTS && timed_minutes < BUSY_MAX_MINUTES {
            ScheduleCharacter::Busy
        } else {
            ScheduleCharacter::Packed
        }
    }

    fn phrase(&self) -> &'static str {
        match self {
            ScheduleCharacter::Clear => "clear",
            ScheduleCharacter::Light => "light",
            ScheduleCharacter::Moderate => "moderate",
            ScheduleCharacter::Busy => "busy",
            ScheduleCharacter::Packed => "packed",
        }
    }
}

/// Maximal run of back-to-back events with small gaps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusyPeriod {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub event_count: usize,
}

/// Free window between two consecutive events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleGap {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub minutes: i64,
    pub significant: bool,
}

/// Hand-off between two consecutive events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from_title: String,
    pub to_title: String,
    pub gap_minutes: i64,
    pub tight: bool,
    /// Flat travel estimate when both events have distinct non-empty locations
    pub travel_minutes: Option<i64>,
}

/// Derived aggregates for one set of events; computed fresh per invocation
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAnalysis {
    pub event_count: usize,
    /// Total duration of timed (non-all-day) events
    pub timed_minutes: i64,
    pub character: ScheduleCharacter,
    pub busy_periods: Vec<BusyPeriod>,
    pub gaps: Vec<ScheduleGap>,
    pub transitions: Vec<Transition>,
    /// Overlapping pairs, by title, in chronological order
    pub conflicts: Vec<(String, String)>,
}

impl ScheduleAnalysis {
    /// Analyze a set of events. All-day events count toward `event_count`
    /// but are excluded from timed duration, clustering, gaps and
    /// transitions.
    pub fn of(events: &[CalendarEvent]) -> Self {
        let mut timed: Vec<&CalendarEvent> = events.iter().filter(|e| !e.is_all_day).collect();
        timed.sort_by_key(|e| (e.start, e.end));

        let timed_minutes: i64 = timed.iter().map(|e| e.duration_minutes()).sum();
        let character = ScheduleCharacter::classify(events.len(), timed_minutes);

        let mut conflicts = Vec::new();
        for (i, a) in timed.iter().enumerate() {
            for b in timed.iter().skip(i + 1) {
                if a.conflicts_with(b) {
                    conflicts.push((a.title.clone(), b.title.clone()));
                }
            }
        }

        let mut gaps = Vec::new();
        let mut transitions = Vec::new();
        for pair in timed.windows(2) {
            let (before, after) = (pair[0], pair[1]);
            let gap_minutes = (after.start - before.end).num_minutes();
            if gap_minutes > 0 {
                gaps.push(ScheduleGap {
                    start: before.end,
                    end: after.start,
                    minutes: gap_minutes,
                    significant: gap_minutes >= SIGNIFICANT_GAP_MINUTES,
                });
            }
            let travel_minutes = match (before.location_trimmed(), after.location_trimmed()) {
                (Some(from), Some(to)) if from != to => Some(TRAVEL_ESTIMATE_MINUTES),
                _ => None,
            };
            transitions.push(Transition {
                from_title: before.title.clone(),
                to_title: after.title.clone(),
                gap_minutes: gap_minutes.max(0),
                tight: gap_minutes < TIGHT_TRANSITION_MINUTES,
                travel_minutes,
            });
        }

        let busy_periods = cluster_busy_periods(&timed);

        ScheduleAnalysis {
            event_count: events.len(),
            timed_minutes,
            character,
            busy_periods,
            gaps,
            transitions,
            conflicts,
        }
    }
}

/// Maximal runs of >= 3 consecutive events whose gaps are <= 15 minutes;
/// shorter runs are discarded.
fn cluster_busy_periods(sorted_timed: &[&CalendarEvent]) -> Vec<BusyPeriod> {
    let mut periods = Vec::new();
    let mut run_start = 0;
    let mut run_end_time: Option<DateTime<Local>> = None;

    let mut flush = |start_idx: usize, end_idx: usize, end_time: Option<DateTime<Local>>| {
        let count = end_idx - start_idx;
        if count >= BUSY_PERIOD_MIN_EVENTS {
            if let Some(end) = end_time {
                periods.push(BusyPeriod {
                    start: sorted_timed[start_idx].start,
                    end,
                    event_count: count,
                });
            }
        }
    };

    for (index, event) in sorted_timed.iter().enumerate() {
        match run_end_time {
            Some(previous_end)
                if (event.start - previous_end).num_minutes() <= BUSY_PERIOD_MAX_GAP_MINUTES =>
            {
                run_end_time = Some(previous_end.max(event.end));
            }
            Some(_) => {
                flush(run_start, index, run_end_time);
                run_start = index;
                run_end_time = Some(event.end);
            }
            None => {
                run_start = index;
                run_end_time = Some(event.end);
            }
        }
    }
    flush(run_start, sorted_timed.len(), run_end_time);
    periods
}

/// Which conflicts a candidate event would create against an existing set
pub fn conflicting_titles(candidate: &CalendarEvent, existing: &[CalendarEvent]) -> Vec<String> {
    existing
        .iter()
        .filter(|e| e.id != candidate.id && !e.is_all_day && candidate.conflicts_with(e))
        .map(|e| e.title.clone())
        .collect()
}

/// The four-part spoken response. The full message is the non-empty parts
/// joined with single spaces, in fixed greeting-body-insight-follow-up order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeParts {
    pub greeting: String,
    pub body: String,
    pub insight: Option<String>,
    pub follow_up: Option<String>,
}

impl NarrativeParts {
    pub fn render(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(4);
        if !self.greeting.is_empty() {
            parts.push(&self.greeting);
        }
        if !self.body.is_empty() {
            parts.push(&self.body);
        }
        if let Some(insight) = self.insight.as_deref() {
            if !insight.is_empty() {
                parts.push(insight);
            }
        }
        if let Some(follow_up) = self.follow_up.as_deref() {
            if !follow_up.is_empty() {
                parts.push(follow_up);
            }
        }
        parts.join(" ")
    }
}

/// What the caller wants narrated
#[derive(Debug, Clone)]
pub enum NarrativeRequest<'a> {
    /// "What's my schedule" over a window
    Query {
        events: &'a [CalendarEvent],
        range: TimeRange,
    },
    /// A new event was (or is about to be) created
    Create {
        event: &'a CalendarEvent,
        existing: &'a [CalendarEvent],
    },
    /// An event was removed
    Delete {
        title: &'a str,
        when: DateTime<Local>,
    },
    /// Free-text search results
    Search {
        query: &'a str,
        matches: &'a [CalendarEvent],
    },
    /// "When am I free" over a window
    Availability {
        events: &'a [CalendarEvent],
        range: TimeRange,
    },
}

/// Stateless-per-invocation narrative builder anchored at a fixed reference
/// time.
pub struct NarrativeGenerator {
    anchor: DateTime<Local>,
}

impl NarrativeGenerator {
    pub fn new(anchor: DateTime<Local>) -> Self {
        NarrativeGenerator { anchor }
    }

    pub fn respond(&self, request: NarrativeRequest<'_>) -> NarrativeParts {
        match request {
            NarrativeRequest::Query { events, range } => self.build_query(events, range),
            NarrativeRequest::Create { event, existing } => self.build_create(event, existing),
            NarrativeRequest::Delete { title, when } => self.build_delete(title, when),
            NarrativeRequest::Search { query, matches } => self.build_search(query, matches),
            NarrativeRequest::Availability { events, range } => {
                self.build_availability(events, range)
            }
        }
    }

    fn build_query(&self, events: &[CalendarEvent], range: TimeRange) -> NarrativeParts {
        let analysis = ScheduleAnalysis::of(events);
        let day = self.day_phrase(range.start);

        let body = if events.is_empty() {
            format!("You have nothing scheduled {}.", day)
        } else {
            let mut sorted: Vec<&CalendarEvent> = events.iter().collect();
            sorted.sort_by_key(|e| (e.is_all_day, e.start));
            format!(
                "Your schedule {} is {}, with {}: {}.",
                day,
                analysis.character.phrase(),
                count_phrase(events.len(), "event"),
                listed_events(&sorted),
            )
        };

        let follow_up = if events.is_empty() {
            Some("Want me to find time for something?".to_string())
        } else {
            Some("Want more detail on any of these?".to_string())
        };

        NarrativeParts {
            greeting: self.time_of_day_greeting(),
            body,
            insight: self.schedule_insight(&analysis),
            follow_up,
        }
    }

    fn build_create(&self, event: &CalendarEvent, existing: &[CalendarEvent]) -> NarrativeParts {
        let day = self.day_phrase(event.start);
        let mut body = format!(
            "I've scheduled {} {} from {} to {}",
            event.title,
            day,
            clock_phrase(event.start),
            clock_phrase(event.end)
        );
        if let Some(location) = event.location_trimmed() {
            body.push_str(&format!(" at {}", location));
        }
        body.push('.');

        let conflicts = conflicting_titles(event, existing);
        let insight = if !conflicts.is_empty() {
            Some(format!("Heads up: it overlaps with {}.", listed(&conflicts)))
        } else {
            // No conflict: report the buffer around the new event when it
            // is comfortable
            let mut all: Vec<CalendarEvent> = existing.to_vec();
            all.push(event.clone());
            let analysis = ScheduleAnalysis::of(&all);
            let comfortable = analysis
                .transitions
                .iter()
                .filter(|t| t.from_title == event.title || t.to_title == event.title)
                .all(|t| t.gap_minutes >= SIGNIFICANT_GAP_MINUTES);
            if comfortable && !existing.is_empty() {
                Some("You have a good buffer around it.".to_string())
            } else {
                None
            }
        };

        NarrativeParts {
            greeting: "All set.".to_string(),
            body,
            insight,
            follow_up: Some("Anything else?".to_string()),
        }
    }

    fn build_delete(&self, title: &str, when: DateTime<Local>) -> NarrativeParts {
        NarrativeParts {
            greeting: "Done.".to_string(),
            body: format!(
                "I've removed {} from your calendar {}.",
                title,
                self.day_phrase(when)
            ),
            insight: None,
            follow_up: Some("Anything else?".to_string()),
        }
    }

    fn build_search(&self, query: &str, matches: &[CalendarEvent]) -> NarrativeParts {
        let body = if matches.is_empty() {
            format!("I couldn't find any events matching \"{}\".", query)
        } else {
            let mut sorted: Vec<&CalendarEvent> = matches.iter().collect();
            sorted.sort_by_key(|e| e.start);
            let described: Vec<String> = sorted
                .iter()
                .take(MAX_LISTED_EVENTS)
                .map(|e| {
                    format!(
                        "{} {} at {}",
                        e.title,
                        self.day_phrase(e.start),
                        clock_phrase(e.start)
                    )
                })
                .collect();
            let mut body = format!(
                "I found {} matching \"{}\": {}",
                count_phrase(matches.len(), "event"),
                query,
                listed(&described)
            );
            if matches.len() > MAX_LISTED_EVENTS {
                body.push_str(&format!(
                    ", and {} more",
                    matches.len() - MAX_LISTED_EVENTS
                ));
            }
            body.push('.');
            body
        };

        NarrativeParts {
            greeting: String::new(),
            body,
            insight: None,
            follow_up: if matches.is_empty() {
                None
            } else {
                Some("Want more detail on any of these?".to_string())
            },
        }
    }

    fn build_availability(&self, events: &[CalendarEvent], range: TimeRange) -> NarrativeParts {
        let analysis = ScheduleAnalysis::of(events);
        let day = self.day_phrase(range.start);

        let open_windows: Vec<String> = analysis
            .gaps
            .iter()
            .filter(|g| g.significant)
            .map(|g| {
                format!(
                    "from {} to {}",
                    clock_phrase(g.start),
                    clock_phrase(g.end)
                )
            })
            .collect();

        let body = if events.is_empty() {
            format!("You're completely free {}.", day)
        } else if open_windows.is_empty() {
            format!(
                "Your schedule {} is {}; there are no breaks of {} or more between events.",
                day,
                analysis.character.phrase(),
                duration_phrase(SIGNIFICANT_GAP_MINUTES)
            )
        } else {
            format!(
                "You have {} {}: {}.",
                count_phrase(open_windows.len(), "open window"),
                day,
                listed(&open_windows)
            )
        };

        NarrativeParts {
            greeting: self.time_of_day_greeting(),
            body,
            insight: self.schedule_insight(&analysis),
            follow_up: Some("Should I book something in one of those windows?".to_string())
                .filter(|_| !open_windows.is_empty()),
        }
    }

    /// One insight, selected by priority: a conflict warning beats a tight
    /// transition beats a busy stretch beats a good-buffer note.
    fn schedule_insight(&self, analysis: &ScheduleAnalysis) -> Option<String> {
        if let Some((first, second)) = analysis.conflicts.first() {
            return Some(format!(
                "Careful: {} overlaps with {}.",
                first, second
            ));
        }
        if let Some(tight) = analysis.transitions.iter().find(|t| t.tight) {
            let mut note = format!(
                "You only have {} between {} and {}",
                duration_phrase(tight.gap_minutes),
                tight.from_title,
                tight.to_title
            );
            if let Some(travel) = tight.travel_minutes {
                note.push_str(&format!(
                    ", and they're in different places, so allow about {} to get there",
                    duration_phrase(travel)
                ));
            }
            note.push('.');
            return Some(note);
        }
        if let Some(period) = analysis.busy_periods.first() {
            return Some(format!(
                "You have a busy stretch of {} back-to-back from {} to {}.",
                count_phrase(period.event_count, "event"),
                clock_phrase(period.start),
                clock_phrase(period.end)
            ));
        }
        if let Some(gap) = analysis.gaps.iter().find(|g| g.significant) {
            return Some(format!(
                "There's a good {} break after {}.",
                duration_phrase(gap.minutes),
                clock_phrase(gap.start)
            ));
        }
        None
    }

    fn time_of_day_greeting(&self) -> String {
        match self.anchor.hour() {
            5..=11 => "Good morning.".to_string(),
            12..=16 => "Good afternoon.".to_string(),
            _ => "Good evening.".to_string(),
        }
    }

    /// "today", "tomorrow", a weekday name within the coming week, or a
    /// month-and-day phrase beyond it. Same-day comparison uses calendar
    /// dates, not 24-hour offsets.
    fn day_phrase(&self, date: DateTime<Local>) -> String {
        let anchor_day = self.anchor.date_naive();
        let target_day = date.date_naive();
        let days_ahead = (target_day - anchor_day).num_days();
        match days_ahead {
            0 => "today".to_string(),
            1 => "tomorrow".to_string(),
            2..=6 => format!("on {}", date.format("%A")),
            _ => format!("on {} {}", date.format("%B"), target_day.day()),
        }
    }
}

/// "9 AM" on the hour, "9:30 AM" otherwise
pub fn clock_phrase(instant: DateTime<Local>) -> String {
    let (is_pm, hour) = instant.hour12();
    let suffix = if is_pm { "PM" } else { "AM" };
    if instant.minute() == 0 {
        format!("{} {}", hour, suffix)
    } else {
        format!("{}:{:02} {}", hour, instant.minute(), suffix)
    }
}

/// "45 minutes", "1 hour", "2 hours 15 minutes"
pub fn duration_phrase(minutes: i64) -> String {
    let minutes = minutes.max(0);
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, m) => format!("{} minute{}", m, plural(m)),
        (h, 0) => format!("{} hour{}", h, plural(h)),
        (h, m) => format!(
            "{} hour{} {} minute{}",
            h,
            plural(h),
            m,
            plural(m)
        ),
    }
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn count_phrase(count: usize, noun: &str) -> String {
    format!("{} {}{}", count, noun, if count == 1 { "" } else { "s" })
}

/// "A", "A and B", "A, B, and C"
fn listed(items: &[String]) -> String {
    match items.len() {
        0 => String::new(),
        1 => items[0].clone(),
        2 => format!("{} and {}", items[0], items[1]),
        _ => {
            let head = items[..items.len() - 1].join(", ");
            format!("{}, and {}", head, items[items.len() - 1])
        }
    }
}

/// Event list for a body: titles with times, capped, all-day events marked
fn listed_events(sorted: &[&CalendarEvent]) -> String {
    let described: Vec<String> = sorted
        .iter()
        .take(MAX_LISTED_EVENTS)
        .map(|e| {
            if e.is_all_day {
                format!("{} (all day)", e.title)
            } else {
                format!("{} at {}", e.title, clock_phrase(e.start))
            }
        })
        .collect();
    let mut text = listed(&described);
    if sorted.len() > MAX_LISTED_EVENTS {
        text.push_str(&format!(", and {} more", sorted.len() - MAX_LISTED_EVENTS));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::test_support::event;
    use crate::calendar::EventSource;
    use chrono::TimeZone;

    fn anchor() -> DateTime<Local> {
        // Tuesday 2026-03-10, 09:00
        Local.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    fn day_range() -> TimeRange {
        TimeRange::new(
            Local.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap(),
            Local.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn character_thresholds() {
        assert_eq!(
            ScheduleCharacter::classify(0, 0),
            ScheduleCharacter::Clear
        );
        assert_eq!(
            ScheduleCharacter::classify(2, 60),
            ScheduleCharacter::Light
        );
        assert_eq!(
            ScheduleCharacter::classify(4, 180),
            ScheduleCharacter::Moderate
        );
        assert_eq!(
            ScheduleCharacter::classify(6, 300),
            ScheduleCharacter::Busy
        );
        assert_eq!(
            ScheduleCharacter::classify(7, 420),
            ScheduleCharacter::Packed
        );
    }

    #[test]
    fn busy_period_clusters_small_gaps() {
        // Gaps of 5 and 10 minutes, both within the 15-minute limit
        let events = vec![
            event("1", "Standup", (9, 0), (9, 30)),
            event("2", "Planning", (9, 35), (10, 0)),
            event("3", "Review", (10, 10), (10, 40)),
        ];
        let analysis = ScheduleAnalysis::of(&events);
        assert_eq!(analysis.busy_periods.len(), 1);
        let period = &analysis.busy_periods[0];
        assert_eq!(period.event_count, 3);
        assert_eq!(period.start, events[0].start);
        assert_eq!(period.end, events[2].end);
    }

    #[test]
    fn busy_period_excludes_event_after_long_gap() {
        let events = vec![
            event("1", "Standup", (9, 0), (9, 30)),
            event("2", "Planning", (9, 35), (10, 0)),
            event("3", "Review", (10, 10), (10, 40)),
            // 50-minute gap: excluded from the cluster
            event("4", "Lunch", (11, 30), (12, 0)),
        ];
        let analysis = ScheduleAnalysis::of(&events);
        assert_eq!(analysis.busy_periods.len(), 1);
        assert_eq!(analysis.busy_periods[0].event_count, 3);
        assert_eq!(analysis.busy_periods[0].end, events[2].end);
    }

    #[test]
    fn runs_shorter_than_three_are_discarded() {
        let events = vec![
            event("1", "Standup", (9, 0), (9, 30)),
            event("2", "Planning", (9, 35), (10, 0)),
        ];
        let analysis = ScheduleAnalysis::of(&events);
        assert!(analysis.busy_periods.is_empty());
    }

    #[test]
    fn gaps_and_transitions() {
        let mut first = event("1", "Standup", (9, 0), (9, 30));
        let mut second = event("2", "Client call", (9, 40), (10, 30));
        first.location = Some("Office".to_string());
        second.location = Some("Cafe".to_string());
        let events = vec![first, second];

        let analysis = ScheduleAnalysis::of(&events);
        assert_eq!(analysis.gaps.len(), 1);
        assert_eq!(analysis.gaps[0].minutes, 10);
        assert!(!analysis.gaps[0].significant);

        assert_eq!(analysis.transitions.len(), 1);
        let transition = &analysis.transitions[0];
        assert!(transition.tight);
        assert_eq!(transition.travel_minutes, Some(TRAVEL_ESTIMATE_MINUTES));
    }

    #[test]
    fn no_travel_estimate_for_same_or_missing_location() {
        let mut first = event("1", "A", (9, 0), (9, 30));
        let mut second = event("2", "B", (9, 40), (10, 0));
        first.location = Some("Office".to_string());
        second.location = Some("Office".to_string());
        let analysis = ScheduleAnalysis::of(&[first.clone(), second.clone()]);
        assert_eq!(analysis.transitions[0].travel_minutes, None);

        second.location = None;
        let analysis = ScheduleAnalysis::of(&[first, second]);
        assert_eq!(analysis.transitions[0].travel_minutes, None);
    }

    #[test]
    fn conflicts_are_detected_in_analysis() {
        let events = vec![
            event("1", "Standup", (9, 0), (10, 0)),
            event("2", "Interview", (9, 30), (10, 30)),
        ];
        let analysis = ScheduleAnalysis::of(&events);
        assert_eq!(
            analysis.conflicts,
            vec![("Standup".to_string(), "Interview".to_string())]
        );
    }

    #[test]
    fn all_day_events_excluded_from_timed_analysis() {
        let mut holiday = event("1", "Company holiday", (0, 0), (23, 59));
        holiday.is_all_day = true;
        let events = vec![
            holiday,
            event("2", "Standup", (9, 0), (9, 30)),
            event("3", "Planning", (9, 35), (10, 0)),
        ];
        let analysis = ScheduleAnalysis::of(&events);
        assert_eq!(analysis.event_count, 3);
        assert_eq!(analysis.timed_minutes, 55);
        // The all-day event does not join a cluster or create gaps
        assert!(analysis.busy_periods.is_empty());
        assert_eq!(analysis.gaps.len(), 1);
    }

    #[test]
    fn clock_and_duration_phrasing() {
        let nine = Local.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let nine_thirty = Local.with_ymd_and_hms(2026, 3, 10, 21, 30, 0).unwrap();
        assert_eq!(clock_phrase(nine), "9 AM");
        assert_eq!(clock_phrase(nine_thirty), "9:30 PM");

        assert_eq!(duration_phrase(45), "45 minutes");
        assert_eq!(duration_phrase(60), "1 hour");
        assert_eq!(duration_phrase(135), "2 hours 15 minutes");
        assert_eq!(duration_phrase(1), "1 minute");
    }

    #[test]
    fn day_phrase_is_anchor_relative() {
        let generator = NarrativeGenerator::new(anchor());
        assert_eq!(generator.day_phrase(anchor()), "today");
        assert_eq!(
            generator.day_phrase(Local.with_ymd_and_hms(2026, 3, 11, 8, 0, 0).unwrap()),
            "tomorrow"
        );
        // 2026-03-13 is a Friday
        assert_eq!(
            generator.day_phrase(Local.with_ymd_and_hms(2026, 3, 13, 8, 0, 0).unwrap()),
            "on Friday"
        );
        assert_eq!(
            generator.day_phrase(Local.with_ymd_and_hms(2026, 3, 25, 8, 0, 0).unwrap()),
            "on March 25"
        );
    }

    #[test]
    fn query_narrative_for_empty_day() {
        let generator = NarrativeGenerator::new(anchor());
        let parts = generator.respond(NarrativeRequest::Query {
            events: &[],
            range: day_range(),
        });
        assert_eq!(parts.greeting, "Good morning.");
        assert_eq!(parts.body, "You have nothing scheduled today.");
        assert!(parts.insight.is_none());
        let rendered = parts.render();
        assert_eq!(
            rendered,
            "Good morning. You have nothing scheduled today. Want me to find time for something?"
        );
    }

    #[test]
    fn query_narrative_lists_events_concretely() {
        let generator = NarrativeGenerator::new(anchor());
        let events = vec![
            event("1", "Standup", (9, 0), (9, 30)),
            event("2", "Lunch", (12, 0), (13, 0)),
        ];
        let parts = generator.respond(NarrativeRequest::Query {
            events: &events,
            range: day_range(),
        });
        assert_eq!(
            parts.body,
            "Your schedule today is light, with 2 events: Standup at 9 AM and Lunch at 12 PM."
        );
    }

    #[test]
    fn conflict_insight_takes_priority_over_buffer() {
        let generator = NarrativeGenerator::new(anchor());
        let events = vec![
            event("1", "Standup", (9, 0), (10, 0)),
            event("2", "Interview", (9, 30), (10, 30)),
            event("3", "Dinner", (18, 0), (19, 0)),
        ];
        let parts = generator.respond(NarrativeRequest::Query {
            events: &events,
            range: day_range(),
        });
        assert_eq!(
            parts.insight.as_deref(),
            Some("Careful: Standup overlaps with Interview.")
        );
    }

    #[test]
    fn tight_transition_insight_mentions_travel() {
        let generator = NarrativeGenerator::new(anchor());
        let mut first = event("1", "Standup", (9, 0), (9, 30));
        let mut second = event("2", "Client call", (9, 40), (10, 30));
        first.location = Some("Office".to_string());
        second.location = Some("Downtown".to_string());
        let parts = generator.respond(NarrativeRequest::Query {
            events: &[first, second],
            range: day_range(),
        });
        let insight = parts.insight.unwrap();
        assert!(insight.contains("10 minutes between Standup and Client call"));
        assert!(insight.contains("different places"));
    }

    #[test]
    fn good_buffer_insight_when_nothing_worse() {
        let generator = NarrativeGenerator::new(anchor());
        let events = vec![
            event("1", "Standup", (9, 0), (9, 30)),
            event("2", "Lunch", (12, 0), (13, 0)),
        ];
        let parts = generator.respond(NarrativeRequest::Query {
            events: &events,
            range: day_range(),
        });
        assert_eq!(
            parts.insight.as_deref(),
            Some("There's a good 2 hours 30 minutes break after 9:30 AM.")
        );
    }

    #[test]
    fn create_narrative_warns_about_overlap() {
        let generator = NarrativeGenerator::new(anchor());
        let existing = vec![event("1", "Standup", (9, 0), (10, 0))];
        let candidate = event("9", "Dentist", (9, 30), (10, 30));
        let parts = generator.respond(NarrativeRequest::Create {
            event: &candidate,
            existing: &existing,
        });
        assert_eq!(parts.greeting, "All set.");
        assert_eq!(
            parts.body,
            "I've scheduled Dentist today from 9:30 AM to 10:30 AM."
        );
        assert_eq!(
            parts.insight.as_deref(),
            Some("Heads up: it overlaps with Standup.")
        );
    }

    #[test]
    fn create_narrative_notes_comfortable_buffer() {
        let generator = NarrativeGenerator::new(anchor());
        let existing = vec![event("1", "Standup", (9, 0), (9, 30))];
        let candidate = event("9", "Dentist", (11, 0), (12, 0));
        let parts = generator.respond(NarrativeRequest::Create {
            event: &candidate,
            existing: &existing,
        });
        assert_eq!(
            parts.insight.as_deref(),
            Some("You have a good buffer around it.")
        );
    }

    #[test]
    fn delete_narrative_is_concrete() {
        let generator = NarrativeGenerator::new(anchor());
        let parts = generator.respond(NarrativeRequest::Delete {
            title: "Dentist",
            when: Local.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap(),
        });
        assert_eq!(
            parts.render(),
            "Done. I've removed Dentist from your calendar tomorrow. Anything else?"
        );
    }

    #[test]
    fn search_narrative_handles_no_matches() {
        let generator = NarrativeGenerator::new(anchor());
        let parts = generator.respond(NarrativeRequest::Search {
            query: "yoga",
            matches: &[],
        });
        assert_eq!(parts.body, "I couldn't find any events matching \"yoga\".");
        assert!(parts.follow_up.is_none());
        // No greeting for search results
        assert!(parts.render().starts_with("I couldn't"));
    }

    #[test]
    fn availability_narrative_lists_open_windows() {
        let generator = NarrativeGenerator::new(anchor());
        let events = vec![
            event("1", "Standup", (9, 0), (9, 30)),
            event("2", "Lunch", (12, 0), (13, 0)),
        ];
        let parts = generator.respond(NarrativeRequest::Availability {
            events: &events,
            range: day_range(),
        });
        assert_eq!(
            parts.body,
            "You have 1 open window today: from 9:30 AM to 12 PM."
        );
        assert_eq!(
            parts.follow_up.as_deref(),
            Some("Should I book something in one of those windows?")
        );
    }

    #[test]
    fn availability_narrative_for_free_day() {
        let generator = NarrativeGenerator::new(anchor());
        let parts = generator.respond(NarrativeRequest::Availability {
            events: &[],
            range: day_range(),
        });
        assert_eq!(parts.body, "You're completely free today.");
        assert!(parts.follow_up.is_none());
    }

    #[test]
    fn render_skips_empty_parts_and_preserves_order() {
        let parts = NarrativeParts {
            greeting: String::new(),
            body: "Body.".to_string(),
            insight: Some(String::new()),
            follow_up: Some("Follow up?".to_string()),
        };
        assert_eq!(parts.render(), "Body. Follow up?");
    }

    #[test]
    fn source_is_preserved_on_events() {
        let mut e = event("1", "Standup", (9, 0), (9, 30));
        e.source = EventSource::External;
        let analysis = ScheduleAnalysis::of(&[e]);
        assert_eq!(analysis.event_count, 1);
    }
}
