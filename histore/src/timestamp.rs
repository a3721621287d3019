//! Timestamps are sets of snapshot (version) identifiers represented as a
//! sorted list of disjoint, non-adjacent closed integer intervals. A
//! timestamp records the set of versions in which some archive row, value,
//! or position was present.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CResult, Error};

/// A closed interval `[start, end]` of integers, `start <= end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: u64,
    pub end: u64,
}

impl TimeInterval {
    /// Creates a new interval, defaulting `end` to `start` for singletons.
    pub fn new(start: u64, end: u64) -> CResult<Self> {
        if end < start {
            return Err(Error::InvalidInterval(format!(
                "invalid interval [{},{}]",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// A singleton interval `[v, v]`.
    pub fn singleton(v: u64) -> Self {
        Self { start: v, end: v }
    }

    /// True if this interval fully contains the given interval.
    pub fn contains_interval(&self, other: &TimeInterval) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// True if this interval contains the given value.
    pub fn contains_value(&self, value: u64) -> bool {
        self.start <= value && value <= self.end
    }

    /// True if this interval overlaps the given interval (touching at an
    /// endpoint counts as overlap).
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True if this interval is immediately adjacent to (but not
    /// overlapping) the given interval, i.e. they should be coalesced.
    pub fn adjacent(&self, other: &TimeInterval) -> bool {
        self.end + 1 == other.start || other.end + 1 == self.start
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start < self.end {
            write!(f, "{}-{}", self.start, self.end)
        } else {
            write!(f, "{}", self.start)
        }
    }
}

/// A timestamp: a sorted list of disjoint, non-adjacent closed integer
/// intervals. Operations are pure and return new values; a `Timestamp` is
/// never mutated in place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    intervals: Vec<TimeInterval>,
}

impl Timestamp {
    /// The empty timestamp.
    pub fn new() -> Self {
        Self { intervals: Vec::new() }
    }

    /// Builds a timestamp from an explicit interval list. Fails if any two
    /// successive intervals overlap or are adjacent (they must be
    /// pre-coalesced by the caller), matching the invariant of spec.md §4.1.
    pub fn from_intervals(intervals: Vec<TimeInterval>) -> CResult<Self> {
        for pair in intervals.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a.end + 1 >= b.start {
                return Err(Error::InvalidInterval(format!(
                    "adjacent or overlapping intervals {} and {}",
                    a, b
                )));
            }
        }
        Ok(Self { intervals })
    }

    /// Borrow the underlying intervals, in ascending order.
    pub fn intervals(&self) -> &[TimeInterval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Appends `value` to the timestamp, returning a new timestamp. Fails
    /// with `NonMonotonic` if `value` does not strictly exceed the end of
    /// the last interval. Coalesces into the last interval when `value` is
    /// exactly one past its end.
    pub fn append(&self, value: u64) -> CResult<Timestamp> {
        match self.intervals.last() {
            None => Ok(Timestamp { intervals: vec![TimeInterval::singleton(value)] }),
            Some(last) => {
                if value <= last.end {
                    return Err(Error::NonMonotonic(format!(
                        "attempt to append value '{}' to timestamp ending at '{}'",
                        value, last.end
                    )));
                }
                let mut intervals = self.intervals.clone();
                if value == last.end + 1 {
                    let start = intervals.last().unwrap().start;
                    *intervals.last_mut().unwrap() = TimeInterval { start, end: value };
                } else {
                    intervals.push(TimeInterval::singleton(value));
                }
                Ok(Timestamp { intervals })
            }
        }
    }

    /// Returns true if the timestamp contains the given version. Scans from
    /// the most recent interval first, since reads skew towards recent
    /// versions.
    pub fn contains(&self, value: u64) -> bool {
        for interval in self.intervals.iter().rev() {
            if interval.contains_value(value) {
                return true;
            } else if interval.end < value {
                return false;
            }
        }
        false
    }

    /// Non-strict subset test: true iff every interval of `self` is
    /// contained in some interval of `other`. `t.is_subset_of(&t)` is true.
    pub fn is_subset_of(&self, other: &Timestamp) -> bool {
        let mut j = 0;
        for mine in &self.intervals {
            while j < other.intervals.len() && other.intervals[j].end < mine.start {
                j += 1;
            }
            match other.intervals.get(j) {
                Some(theirs) if theirs.contains_interval(mine) => continue,
                _ => return false,
            }
        }
        true
    }

    /// Strict subset test: `self` is a subset of `other` but not equal to it.
    /// Preserved separately because the original `histore` project's
    /// `is_subset_of` was strict; see DESIGN.md Open Question decisions.
    pub fn is_proper_subset_of(&self, other: &Timestamp) -> bool {
        self.is_subset_of(other) && self != other
    }

    /// True iff the two timestamps share at least one version.
    pub fn intersects(&self, other: &Timestamp) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.intervals.len() && j < other.intervals.len() {
            let a = &self.intervals[i];
            let b = &other.intervals[j];
            if a.overlaps(b) {
                return true;
            }
            if a.end < b.start {
                i += 1;
            } else {
                j += 1;
            }
        }
        false
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.intervals.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Parses the comma-separated `"s-e,s,...,s-e"` wire form of §6 back into a
/// `Timestamp`. The inverse of `Display`.
impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Timestamp::new());
        }
        let mut intervals = Vec::new();
        for part in s.split(',') {
            let interval = match part.split_once('-') {
                Some((start, end)) => {
                    let start: u64 = start
                        .parse()
                        .map_err(|_| Error::Encoding(format!("invalid timestamp interval '{}'", part)))?;
                    let end: u64 = end
                        .parse()
                        .map_err(|_| Error::Encoding(format!("invalid timestamp interval '{}'", part)))?;
                    TimeInterval::new(start, end)?
                }
                None => {
                    let v: u64 = part
                        .parse()
                        .map_err(|_| Error::Encoding(format!("invalid timestamp value '{}'", part)))?;
                    TimeInterval::singleton(v)
                }
            };
            intervals.push(interval);
        }
        Timestamp::from_intervals(intervals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_interval_coalescing() {
        let t = Timestamp::new().append(1).unwrap().append(2).unwrap().append(3).unwrap();
        assert_eq!(t.intervals().len(), 1);
        assert_eq!(t.to_string(), "1-3");

        let t5 = t.append(5).unwrap();
        assert_eq!(t5.to_string(), "1-3,5");

        let t4 = t.append(4).unwrap();
        assert_eq!(t4.to_string(), "1-4");
    }

    #[test]
    fn append_rejects_non_monotonic_values() {
        let t = Timestamp::new().append(5).unwrap();
        assert!(matches!(t.append(5), Err(Error::NonMonotonic(_))));
        assert!(matches!(t.append(3), Err(Error::NonMonotonic(_))));
    }

    #[test]
    fn contains_checks_every_appended_value_and_nothing_else() {
        let mut t = Timestamp::new();
        for v in [1u64, 2, 3, 5, 7, 8, 9, 14, 15, 16] {
            t = t.append(v).unwrap();
        }
        for v in [1u64, 2, 3, 5, 7, 8, 9, 14, 15, 16] {
            assert!(t.contains(v));
        }
        for v in [0u64, 4, 6, 10, 11, 12, 13, 17] {
            assert!(!t.contains(v));
        }
    }

    #[test]
    fn invalid_construction_rejects_overlap_and_adjacency() {
        assert!(Timestamp::from_intervals(vec![
            TimeInterval::new(1, 3).unwrap(),
            TimeInterval::new(3, 4).unwrap(),
        ])
        .is_err());
        assert!(Timestamp::from_intervals(vec![
            TimeInterval::new(1, 3).unwrap(),
            TimeInterval::new(4, 5).unwrap(),
        ])
        .is_err());
    }

    #[test]
    fn subset_semantics_match_spec_non_strict_and_proper_strict() {
        let t = Timestamp::from_intervals(vec![
            TimeInterval::new(1, 5).unwrap(),
            TimeInterval::new(7, 9).unwrap(),
            TimeInterval::new(14, 16).unwrap(),
        ])
        .unwrap();

        let subset = Timestamp::from_intervals(vec![
            TimeInterval::new(1, 5).unwrap(),
            TimeInterval::new(14, 14).unwrap(),
        ])
        .unwrap();
        assert!(subset.is_subset_of(&t));
        assert!(subset.is_proper_subset_of(&t));

        assert!(t.is_subset_of(&t));
        assert!(!t.is_proper_subset_of(&t));

        let not_subset = Timestamp::from_intervals(vec![
            TimeInterval::new(0, 5).unwrap(),
            TimeInterval::new(8, 8).unwrap(),
            TimeInterval::new(14, 16).unwrap(),
        ])
        .unwrap();
        assert!(!not_subset.is_subset_of(&t));
    }

    #[test]
    fn display_matches_comma_separated_interval_form() {
        let t = Timestamp::from_intervals(vec![
            TimeInterval::new(1, 5).unwrap(),
            TimeInterval::new(7, 9).unwrap(),
            TimeInterval::new(14, 16).unwrap(),
        ])
        .unwrap();
        assert_eq!(t.to_string(), "1-5,7-9,14-16");

        let t = Timestamp::from_intervals(vec![
            TimeInterval::new(1, 5).unwrap(),
            TimeInterval::new(7, 7).unwrap(),
            TimeInterval::new(14, 16).unwrap(),
        ])
        .unwrap();
        assert_eq!(t.to_string(), "1-5,7,14-16");
    }

    #[test]
    fn intersects_detects_shared_versions() {
        let a = Timestamp::from_intervals(vec![TimeInterval::new(0, 10).unwrap()]).unwrap();
        let b = Timestamp::from_intervals(vec![TimeInterval::new(11, 15).unwrap()]).unwrap();
        assert!(!a.intersects(&b));

        let c = Timestamp::from_intervals(vec![TimeInterval::new(9, 12).unwrap()]).unwrap();
        assert!(a.intersects(&c));
    }

    #[test]
    fn round_trips_through_serde_json() {
        let t = Timestamp::new().append(1).unwrap().append(2).unwrap().append(5).unwrap();
        let encoded = serde_json::to_string(&t).unwrap();
        let decoded: Timestamp = serde_json::from_str(&encoded).unwrap();
        assert_eq!(t, decoded);
    }

    #[test]
    fn property_2_random_strictly_increasing_appends_stay_well_formed() {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let mut appended = Vec::new();
            let mut t = Timestamp::new();
            let mut next = rng.gen_range(0u64..5);
            for _ in 0..rng.gen_range(1..40) {
                t = t.append(next).unwrap();
                appended.push(next);
                next += rng.gen_range(1..5);
            }

            let intervals = t.intervals();
            for pair in intervals.windows(2) {
                assert!(pair[0].end + 1 < pair[1].start, "intervals must stay disjoint and non-adjacent");
            }
            for &v in &appended {
                assert!(t.contains(v), "{} was appended but not contained", v);
            }
            let max = *appended.iter().max().unwrap();
            for probe in 0..=max + 3 {
                assert_eq!(t.contains(probe), appended.contains(&probe));
            }
        }
    }

    #[test]
    fn from_str_is_the_inverse_of_display() {
        let t = Timestamp::from_intervals(vec![
            TimeInterval::new(1, 5).unwrap(),
            TimeInterval::new(7, 7).unwrap(),
            TimeInterval::new(14, 16).unwrap(),
        ])
        .unwrap();
        let rendered = t.to_string();
        let parsed: Timestamp = rendered.parse().unwrap();
        assert_eq!(t, parsed);

        assert_eq!("".parse::<Timestamp>().unwrap(), Timestamp::new());
    }
}
