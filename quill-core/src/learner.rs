//! Editing-pattern learner.
//!
//! An [`EditingSession`] accumulates telemetry while an editor is open:
//! keystrokes, backspaces, pauses and the word delta since the session
//! started. At teardown the session is summarized and merged into the
//! durable [`EditingPattern`].
//!
//! All time inputs are explicit `Instant`s so the learner has no clock of
//! its own.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::document::{char_count, plain_text, unix_now, word_count};
use crate::pattern::{EditingPattern, EditingStyle, SavePreference};

/// Learner thresholds. All durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Idle gap that counts as a pause (default: 5000)
    pub pause_threshold_ms: u64,
    /// Sessions shorter than this are not merged (default: 30000)
    pub min_session_ms: u64,
    /// More than one pause per this many seconds means `burst` (default: 30)
    pub burst_secs_per_pause: f64,
    /// Fewer than one pause per this many seconds means `continuous` (default: 120)
    pub continuous_secs_per_pause: f64,
    /// Manual saves closer together than this nudge toward `frequent` (default: 5000)
    pub frequent_gap_ms: u64,
    /// Manual saves further apart than this nudge toward `minimal` (default: 20000)
    pub minimal_gap_ms: u64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            pause_threshold_ms: 5_000,
            min_session_ms: 30_000,
            burst_secs_per_pause: 30.0,
            continuous_secs_per_pause: 120.0,
            frequent_gap_ms: 5_000,
            minimal_gap_ms: 20_000,
        }
    }
}

impl LearnerConfig {
    pub fn pause_threshold(&self) -> Duration {
        Duration::from_millis(self.pause_threshold_ms)
    }

    pub fn min_session(&self) -> Duration {
        Duration::from_millis(self.min_session_ms)
    }
}

/// Telemetry for one open editor.
#[derive(Debug, Clone)]
pub struct EditingSession {
    started_at: Instant,
    last_activity: Instant,
    start_words: usize,
    current_words: usize,
    last_chars: usize,
    keystrokes: u64,
    pauses: u64,
    backspaces: u64,
    pause_threshold: Duration,
}

impl EditingSession {
    /// Open a session over the content already in the editor.
    pub fn start(initial_content: &str, now: Instant, config: &LearnerConfig) -> Self {
        let words = word_count(&plain_text(initial_content));
        Self {
            started_at: now,
            last_activity: now,
            start_words: words,
            current_words: words,
            last_chars: char_count(initial_content),
            keystrokes: 0,
            pauses: 0,
            backspaces: 0,
            pause_threshold: config.pause_threshold(),
        }
    }

    /// Record one content change observed at `now`.
    pub fn record_change(&mut self, content: &str, now: Instant) {
        if now.saturating_duration_since(self.last_activity) >= self.pause_threshold {
            self.pauses += 1;
        }
        self.last_activity = now;

        let chars = char_count(content);
        let delta = chars.abs_diff(self.last_chars);
        self.keystrokes += delta.max(1) as u64;
        if chars < self.last_chars {
            self.backspaces += 1;
        }
        self.last_chars = chars;
        self.current_words = word_count(&plain_text(content));
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn words_added(&self) -> u64 {
        self.current_words.saturating_sub(self.start_words) as u64
    }

    pub fn word_count(&self) -> usize {
        self.current_words
    }

    pub fn keystrokes(&self) -> u64 {
        self.keystrokes
    }

    pub fn pauses(&self) -> u64 {
        self.pauses
    }

    pub fn backspaces(&self) -> u64 {
        self.backspaces
    }

    /// Words per minute since the session started.
    pub fn typing_speed(&self, now: Instant) -> f64 {
        typing_speed(self.words_added(), self.elapsed(now))
    }

    pub fn summarize(&self, now: Instant, config: &LearnerConfig) -> SessionSummary {
        let duration = self.elapsed(now);
        SessionSummary {
            duration,
            words_added: self.words_added(),
            speed_wpm: typing_speed(self.words_added(), duration),
            style: classify_style(duration, self.pauses, config),
            keystrokes: self.keystrokes,
            pauses: self.pauses,
            backspaces: self.backspaces,
        }
    }
}

/// Derived fragment of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub duration: Duration,
    pub words_added: u64,
    pub speed_wpm: f64,
    pub style: EditingStyle,
    pub keystrokes: u64,
    pub pauses: u64,
    pub backspaces: u64,
}

/// Classify rhythm from pause density.
pub fn classify_style(duration: Duration, pauses: u64, config: &LearnerConfig) -> EditingStyle {
    let secs = duration.as_secs_f64();
    if secs <= 0.0 {
        return EditingStyle::Mixed;
    }
    let pauses = pauses as f64;
    if pauses > secs / config.burst_secs_per_pause {
        EditingStyle::Burst
    } else if pauses < secs / config.continuous_secs_per_pause {
        EditingStyle::Continuous
    } else {
        EditingStyle::Mixed
    }
}

/// Words per minute; zero for an empty interval.
pub fn typing_speed(words_added: u64, elapsed: Duration) -> f64 {
    let minutes = elapsed.as_secs_f64() / 60.0;
    if minutes <= 0.0 {
        return 0.0;
    }
    (words_added as f64 / minutes).max(0.0)
}

/// Fold a finished session into the stored pattern.
///
/// Returns `None` when the session is too short to be meaningful. Speed,
/// style and duration are overwritten, the session counter is incremented
/// and the save preference is carried over.
pub fn merge_session(
    previous: Option<&EditingPattern>,
    summary: &SessionSummary,
    config: &LearnerConfig,
) -> Option<EditingPattern> {
    if summary.duration < config.min_session() {
        log::debug!(
            "session of {:.1}s below learning threshold, discarded",
            summary.duration.as_secs_f64()
        );
        return None;
    }

    let mut pattern = previous.cloned().unwrap_or_default();
    pattern.avg_speed_wpm = summary.speed_wpm.max(0.0);
    pattern.style = summary.style;
    pattern.avg_session_secs = summary.duration.as_secs_f64();
    pattern.session_count = pattern.session_count.saturating_add(1);
    pattern.last_updated = unix_now();
    Some(pattern)
}

/// Adjust the save preference from the gap between two manual saves.
///
/// With no previous save the preference is left as it is.
pub fn nudge_preference(
    current: SavePreference,
    gap_since_last_save: Option<Duration>,
    config: &LearnerConfig,
) -> SavePreference {
    match gap_since_last_save {
        Some(gap) if gap < Duration::from_millis(config.frequent_gap_ms) => current.more_frequent(),
        Some(gap) if gap > Duration::from_millis(config.minimal_gap_ms) => current.less_frequent(),
        _ => current,
    }
}
