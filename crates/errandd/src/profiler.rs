//! Per-request timelines of labeled monotonic events.

use std::time::{Duration, Instant};

/// Ordered multiset of (label, offset) events relative to a start instant.
///
/// Each pipeline stage records events into its own profiler; the responder
/// merges the worker's timeline into the request's with a disambiguating
/// label prefix before serializing.
#[derive(Debug, Clone)]
pub struct Profiler {
    start: Instant,
    events: Vec<(String, Duration)>,
}

impl Profiler {
    /// Starts a timeline at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            events: Vec::new(),
        }
    }

    /// Records an event at the current offset.
    pub fn event(&mut self, label: impl Into<String>) {
        self.events.push((label.into(), self.start.elapsed()));
    }

    /// Merges another timeline into this one, rebasing its offsets onto this
    /// profiler's start and prefixing every label.
    pub fn absorb(&mut self, prefix: &str, other: &Self) {
        let base = other.start.saturating_duration_since(self.start);
        for (label, offset) in &other.events {
            self.events.push((format!("{prefix}{label}"), base + *offset));
        }
    }

    /// Renders the timeline as (label, offset-in-seconds) pairs, ordered by
    /// offset.
    #[must_use]
    pub fn to_wire(&self) -> Vec<(String, f64)> {
        let mut events = self.events.clone();
        events.sort_by_key(|(_, offset)| *offset);
        events
            .into_iter()
            .map(|(label, offset)| (label, offset.as_secs_f64()))
            .collect()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}
