//! Save interval policy.
//!
//! [`compute_interval`] maps a save mode and a learned pattern to the delay
//! between an edit and the scheduled save. It is a pure function of its
//! inputs so the scheduler stays reproducible under test.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::pattern::{EditingPattern, EditingStyle, SavePreference};

/// Active save-frequency policy for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// Short fixed interval
    Realtime,
    /// Long fixed interval
    Conservative,
    /// Never scheduled; only explicit saves persist
    Manual,
    /// Interval derived from the learned editing pattern
    #[default]
    Adaptive,
}

impl fmt::Display for SaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaveMode::Realtime => "realtime",
            SaveMode::Conservative => "conservative",
            SaveMode::Manual => "manual",
            SaveMode::Adaptive => "adaptive",
        };
        f.write_str(s)
    }
}

impl FromStr for SaveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "realtime" => Ok(SaveMode::Realtime),
            "conservative" => Ok(SaveMode::Conservative),
            "manual" => Ok(SaveMode::Manual),
            "adaptive" => Ok(SaveMode::Adaptive),
            other => Err(format!("unknown save mode: {other}")),
        }
    }
}

/// Interval constants. All durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalPolicy {
    /// Fixed interval for `realtime` (default: 2000)
    pub realtime_ms: u64,
    /// Fixed interval for `conservative` (default: 10000)
    pub conservative_ms: u64,
    /// Adaptive base interval per editing style
    pub burst_ms: u64,
    pub continuous_ms: u64,
    pub mixed_ms: u64,
    /// Typing speed above which the interval shrinks (default: 40 wpm)
    pub fast_wpm: f64,
    /// Typing speed below which the interval grows (default: 20 wpm)
    pub slow_wpm: f64,
    /// Fractional speed adjustment (default: 0.2, i.e. ±20%)
    pub speed_adjustment: f64,
    /// Save-preference multipliers
    pub frequent_factor: f64,
    pub moderate_factor: f64,
    pub minimal_factor: f64,
    /// Clamp bounds for adaptive mode
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self {
            realtime_ms: 2_000,
            conservative_ms: 10_000,
            burst_ms: 3_000,
            continuous_ms: 8_000,
            mixed_ms: 5_000,
            fast_wpm: 40.0,
            slow_wpm: 20.0,
            speed_adjustment: 0.2,
            frequent_factor: 0.7,
            moderate_factor: 1.0,
            minimal_factor: 1.5,
            min_ms: 2_000,
            max_ms: 15_000,
        }
    }
}

impl IntervalPolicy {
    fn base_ms(&self, style: EditingStyle) -> u64 {
        match style {
            EditingStyle::Burst => self.burst_ms,
            EditingStyle::Continuous => self.continuous_ms,
            EditingStyle::Mixed => self.mixed_ms,
        }
    }

    fn speed_factor(&self, wpm: f64) -> f64 {
        if wpm > self.fast_wpm {
            1.0 - self.speed_adjustment
        } else if wpm < self.slow_wpm {
            1.0 + self.speed_adjustment
        } else {
            1.0
        }
    }

    fn preference_factor(&self, preference: SavePreference) -> f64 {
        match preference {
            SavePreference::Frequent => self.frequent_factor,
            SavePreference::Moderate => self.moderate_factor,
            SavePreference::Minimal => self.minimal_factor,
        }
    }
}

/// Delay before a scheduled save, or `None` when nothing may be scheduled.
pub fn compute_interval(
    mode: SaveMode,
    pattern: &EditingPattern,
    policy: &IntervalPolicy,
) -> Option<Duration> {
    let ms = match mode {
        SaveMode::Manual => return None,
        SaveMode::Realtime => policy.realtime_ms,
        SaveMode::Conservative => policy.conservative_ms,
        SaveMode::Adaptive => adaptive_ms(pattern, policy),
    };
    Some(Duration::from_millis(ms))
}

fn adaptive_ms(pattern: &EditingPattern, policy: &IntervalPolicy) -> u64 {
    let base = policy.base_ms(pattern.style) as f64;
    let scaled = base
        * policy.speed_factor(pattern.avg_speed_wpm.max(0.0))
        * policy.preference_factor(pattern.save_preference);

    let lo = policy.min_ms.min(policy.max_ms);
    let hi = policy.max_ms.max(lo);
    if !scaled.is_finite() {
        return hi;
    }
    (scaled.round().max(0.0) as u64).clamp(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(style: EditingStyle, wpm: f64, pref: SavePreference) -> EditingPattern {
        EditingPattern {
            save_preference: pref,
            ..EditingPattern::with_style(style, wpm)
        }
    }

    fn ms(mode: SaveMode, p: &EditingPattern) -> Option<u64> {
        compute_interval(mode, p, &IntervalPolicy::default()).map(|d| d.as_millis() as u64)
    }

    #[test]
    fn test_fixed_modes() {
        let p = EditingPattern::default();
        assert_eq!(ms(SaveMode::Realtime, &p), Some(2_000));
        assert_eq!(ms(SaveMode::Conservative, &p), Some(10_000));
        assert_eq!(ms(SaveMode::Manual, &p), None);
    }

    #[test]
    fn test_burst_fast_typist() {
        let p = pattern(EditingStyle::Burst, 45.0, SavePreference::Moderate);
        assert_eq!(ms(SaveMode::Adaptive, &p), Some(2_400));
    }

    #[test]
    fn test_style_bases_at_neutral_speed() {
        for (style, expected) in [
            (EditingStyle::Burst, 3_000),
            (EditingStyle::Continuous, 8_000),
            (EditingStyle::Mixed, 5_000),
        ] {
            let p = pattern(style, 30.0, SavePreference::Moderate);
            assert_eq!(ms(SaveMode::Adaptive, &p), Some(expected), "{style}");
        }
    }

    #[test]
    fn test_slow_typist_and_preferences() {
        let p = pattern(EditingStyle::Mixed, 10.0, SavePreference::Moderate);
        assert_eq!(ms(SaveMode::Adaptive, &p), Some(6_000));

        let p = pattern(EditingStyle::Continuous, 10.0, SavePreference::Minimal);
        assert_eq!(ms(SaveMode::Adaptive, &p), Some(14_400));

        let p = pattern(EditingStyle::Continuous, 30.0, SavePreference::Frequent);
        assert_eq!(ms(SaveMode::Adaptive, &p), Some(5_600));
    }

    #[test]
    fn test_clamped_to_minimum() {
        // 3000 × 0.8 × 0.7 = 1680
        let p = pattern(EditingStyle::Burst, 60.0, SavePreference::Frequent);
        assert_eq!(ms(SaveMode::Adaptive, &p), Some(2_000));
    }

    #[test]
    fn test_clamped_to_maximum() {
        let policy = IntervalPolicy {
            continuous_ms: 20_000,
            ..IntervalPolicy::default()
        };
        let p = pattern(EditingStyle::Continuous, 5.0, SavePreference::Minimal);
        let d = compute_interval(SaveMode::Adaptive, &p, &policy).unwrap();
        assert_eq!(d, Duration::from_millis(15_000));
    }

    #[test]
    fn test_adaptive_always_in_range_and_deterministic() {
        let styles = [EditingStyle::Burst, EditingStyle::Continuous, EditingStyle::Mixed];
        let prefs = [SavePreference::Frequent, SavePreference::Moderate, SavePreference::Minimal];
        for style in styles {
            for pref in prefs {
                for wpm in [0.0, 19.9, 20.0, 40.0, 40.1, 250.0, f64::NAN] {
                    let p = pattern(style, wpm, pref);
                    let a = ms(SaveMode::Adaptive, &p).unwrap();
                    let b = ms(SaveMode::Adaptive, &p).unwrap();
                    assert_eq!(a, b);
                    assert!((2_000..=15_000).contains(&a), "{style} {pref} {wpm} -> {a}");
                }
            }
        }
    }

    #[test]
    fn test_mode_parse_display() {
        for mode in [SaveMode::Realtime, SaveMode::Conservative, SaveMode::Manual, SaveMode::Adaptive] {
            assert_eq!(mode.to_string().parse::<SaveMode>().unwrap(), mode);
        }
        assert!("sometimes".parse::<SaveMode>().is_err());
    }
}
