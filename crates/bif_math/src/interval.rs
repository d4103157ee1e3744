/// A closed interval of time codes, used for motion-sample windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    /// Create a new interval given min and max values.
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// A degenerate interval holding a single time.
    pub fn at(time: f64) -> Self {
        Self::new(time, time)
    }

    /// Returns the size of the interval (max - min).
    pub fn size(&self) -> f64 {
        self.max - self.min
    }

    /// Returns true if the interval contains nothing.
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Returns true if t is within the interval [min, max] (inclusive).
    pub fn contains(&self, t: f64) -> bool {
        self.min <= t && t <= self.max
    }

    /// Shifts both bounds by the same offset.
    pub fn add_scalar(&self, displacement: f64) -> Interval {
        Interval::new(self.min + displacement, self.max + displacement)
    }

    /// Creates an interval that surrounds two other intervals.
    pub fn surrounding(a: &Interval, b: &Interval) -> Interval {
        Interval::new(a.min.min(b.min), a.max.max(b.max))
    }

    /// An empty interval (min > max, contains nothing).
    pub const EMPTY: Interval = Interval {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    /// A universe interval (contains everything).
    pub const UNIVERSE: Interval = Interval {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_contains_is_inclusive() {
        let interval = Interval::new(0.0, 10.0);

        assert!(interval.contains(0.0));
        assert!(interval.contains(10.0));
        assert!(interval.contains(5.0));

        assert!(!interval.contains(-0.1));
        assert!(!interval.contains(10.1));
    }

    #[test]
    fn test_interval_at_single_time() {
        let interval = Interval::at(24.0);
        assert_eq!(interval.size(), 0.0);
        assert!(interval.contains(24.0));
        assert!(!interval.is_empty());
    }

    #[test]
    fn test_interval_shutter_window() {
        // Shutter offsets around frame 12
        let window = Interval::new(-0.25, 0.25).add_scalar(12.0);
        assert_eq!(window.min, 11.75);
        assert_eq!(window.max, 12.25);
    }

    #[test]
    fn test_interval_surrounding() {
        let a = Interval::new(1.0, 2.0);
        let b = Interval::new(4.0, 5.0);
        let both = Interval::surrounding(&a, &b);
        assert_eq!(both, Interval::new(1.0, 5.0));
    }

    #[test]
    fn test_interval_empty_and_universe() {
        assert!(Interval::EMPTY.is_empty());
        assert!(!Interval::EMPTY.contains(0.0));
        assert!(Interval::UNIVERSE.contains(1e10));
        assert!(Interval::UNIVERSE.contains(-1e10));
    }
}
