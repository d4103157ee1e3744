//! Time codes and time-sampled values.

use bif_math::Interval;

/// A time at which to evaluate the scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimeCode {
    /// The authored default value, ignoring time samples.
    Default,
    /// A frame time.
    Time(f64),
}

impl TimeCode {
    pub fn value(&self) -> Option<f64> {
        match self {
            TimeCode::Default => None,
            TimeCode::Time(t) => Some(*t),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, TimeCode::Default)
    }

    /// Numeric value, with the default time treated as 0.
    pub fn value_or_zero(&self) -> f64 {
        self.value().unwrap_or(0.0)
    }
}

impl From<f64> for TimeCode {
    fn from(t: f64) -> Self {
        TimeCode::Time(t)
    }
}

/// A value with an optional default and sorted time samples.
///
/// Samples use held interpolation: the sample at or before the query time
/// wins, and times before the first sample clamp to it.
#[derive(Clone, Debug)]
pub struct Sampled<T> {
    default: Option<T>,
    samples: Vec<(f64, T)>,
}

impl<T> Default for Sampled<T> {
    fn default() -> Self {
        Self {
            default: None,
            samples: Vec::new(),
        }
    }
}

impl<T> Sampled<T> {
    pub fn from_default(value: T) -> Self {
        Self {
            default: Some(value),
            samples: Vec::new(),
        }
    }

    pub fn set_default(&mut self, value: T) {
        self.default = Some(value);
    }

    /// Insert or replace the sample at `time`, keeping samples sorted.
    pub fn set_sample(&mut self, time: f64, value: T) {
        match self.samples.binary_search_by(|(t, _)| t.total_cmp(&time)) {
            Ok(idx) => self.samples[idx].1 = value,
            Err(idx) => self.samples.insert(idx, (time, value)),
        }
    }

    /// True when either a default or a sample is authored.
    pub fn has_value(&self) -> bool {
        self.default.is_some() || !self.samples.is_empty()
    }

    /// True when more than one sample is authored.
    pub fn might_be_time_varying(&self) -> bool {
        self.samples.len() > 1
    }

    pub fn get(&self, time: TimeCode) -> Option<&T> {
        let t = match time {
            TimeCode::Default => {
                return self
                    .default
                    .as_ref()
                    .or_else(|| self.samples.first().map(|(_, v)| v));
            }
            TimeCode::Time(t) => t,
        };
        if self.samples.is_empty() {
            return self.default.as_ref();
        }
        let idx = self.samples.partition_point(|(st, _)| *st <= t);
        let idx = idx.saturating_sub(1);
        self.samples.get(idx).map(|(_, v)| v)
    }

    /// Authored sample times inside `interval`.
    pub fn sample_times_in(&self, interval: Interval) -> Vec<f64> {
        self.samples
            .iter()
            .map(|(t, _)| *t)
            .filter(|t| interval.contains(*t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_only() {
        let value = Sampled::from_default(5);
        assert_eq!(value.get(TimeCode::Default), Some(&5));
        assert_eq!(value.get(TimeCode::Time(10.0)), Some(&5));
        assert!(!value.might_be_time_varying());
    }

    #[test]
    fn test_held_interpolation() {
        let mut value = Sampled::default();
        value.set_sample(10.0, "b");
        value.set_sample(1.0, "a");
        value.set_sample(20.0, "c");

        assert_eq!(value.get(TimeCode::Time(0.0)), Some(&"a"));
        assert_eq!(value.get(TimeCode::Time(1.0)), Some(&"a"));
        assert_eq!(value.get(TimeCode::Time(15.0)), Some(&"b"));
        assert_eq!(value.get(TimeCode::Time(99.0)), Some(&"c"));
        assert!(value.might_be_time_varying());
    }

    #[test]
    fn test_samples_override_default() {
        let mut value = Sampled::from_default(0);
        value.set_sample(5.0, 7);
        assert_eq!(value.get(TimeCode::Time(1.0)), Some(&7));
        assert_eq!(value.get(TimeCode::Default), Some(&0));
    }

    #[test]
    fn test_sample_times_in_interval() {
        let mut value = Sampled::default();
        for t in [1.0, 2.0, 3.0, 4.0] {
            value.set_sample(t, t);
        }
        assert_eq!(value.sample_times_in(Interval::new(1.5, 3.0)), vec![2.0, 3.0]);
    }

    #[test]
    fn test_unauthored() {
        let value: Sampled<i32> = Sampled::default();
        assert!(!value.has_value());
        assert_eq!(value.get(TimeCode::Time(1.0)), None);
    }
}
