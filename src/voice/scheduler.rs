//! Gapless sequential playback scheduling
//!
//! Tracks the output-timeline cursor and the set of units still playing.

use std::collections::BTreeSet;

/// A decoded buffer placed on the output timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackUnit {
    /// Unit identifier, unique per scheduler
    pub id: u64,
    /// Start offset on the output timeline, in seconds
    pub start_at: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl PlaybackUnit {
    /// Timeline offset at which this unit ends
    #[must_use]
    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration
    }
}

/// Schedules received audio back-to-back on the output timeline
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start_time: f64,
    next_id: u64,
    live: BTreeSet<u64>,
}

impl PlaybackScheduler {
    /// Create an empty scheduler with the cursor at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a unit of `duration` seconds after everything already queued
    ///
    /// If the queue drained and the timeline moved past the cursor, the
    /// cursor snaps forward to `now` so playback never starts in the past.
    pub fn schedule(&mut self, duration: f64, now: f64) -> PlaybackUnit {
        if self.next_start_time < now {
            self.next_start_time = now;
        }

        let unit = PlaybackUnit {
            id: self.next_id,
            start_at: self.next_start_time,
            duration,
        };

        self.next_id += 1;
        self.next_start_time += duration;
        self.live.insert(unit.id);

        tracing::trace!(
            unit = unit.id,
            start_at = unit.start_at,
            duration,
            live = self.live.len(),
            "scheduled playback unit"
        );

        unit
    }

    /// Mark a unit as finished
    ///
    /// Returns `true` when this removal drained the live set, which is the
    /// signal that the assistant has finished speaking.
    pub fn complete(&mut self, id: u64) -> bool {
        self.live.remove(&id) && self.live.is_empty()
    }

    /// Drop all live units and rewind the cursor
    ///
    /// Unit ids keep increasing across resets, so a late end callback from a
    /// stopped unit can never complete a unit scheduled afterwards.
    pub fn reset(&mut self) {
        self.live.clear();
        self.next_start_time = 0.0;
    }

    /// Timeline offset where the next unit will start
    #[must_use]
    pub const fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Number of units currently playing or queued
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Whether any unit is still playing or queued
    #[must_use]
    pub fn is_playing(&self) -> bool {
        !self.live.is_empty()
    }
}
