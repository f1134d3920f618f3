//! Parsing the report of bash's `time` keyword into samples.
//!
//! The report looks like this:
//!
//! ```text
//! real    4m1.419s
//! user    23m11.198s
//! sys     0m25.274s
//! ```
//!
//! Each line becomes a `time_<category>` sample in whole seconds. Fractions of a second are
//! truncated.

use log::info;

use regex::Regex;

use crate::error::BenchError;
use crate::sample::Sample;

/// The categories `time` reports.
pub const CATEGORIES: &[&str] = &["real", "user", "sys"];

pub struct TimingParser {
    duration: Regex,
}

impl TimingParser {
    pub fn new() -> Self {
        TimingParser {
            // minutes, then seconds; the fraction is dropped.
            duration: Regex::new(r"^(\d+)m(\d+)\.\d+s$").expect("valid regex"),
        }
    }

    /// Convert a duration like `200m1.419s` to whole seconds (here, 12001).
    pub fn as_seconds(&self, duration: &str) -> Result<u64, BenchError> {
        let malformed = || BenchError::MalformedTiming {
            line: duration.into(),
        };

        let caps = self.duration.captures(duration).ok_or_else(malformed)?;
        let minutes = caps[1].parse::<u64>().map_err(|_| malformed())?;
        let seconds = caps[2].parse::<u64>().map_err(|_| malformed())?;

        minutes
            .checked_mul(60)
            .and_then(|m| m.checked_add(seconds))
            .ok_or_else(malformed)
    }

    /// Parse a single line like `real    4m1.419s`.
    pub fn parse_line(&self, line: &str) -> Result<Sample, BenchError> {
        let malformed = || BenchError::MalformedTiming { line: line.into() };

        let mut fields = line.split_whitespace();
        let (category, duration) = match (fields.next(), fields.next(), fields.next()) {
            (Some(category), Some(duration), None) => (category, duration),
            _ => return Err(malformed()),
        };
        if !CATEGORIES.contains(&category) {
            return Err(malformed());
        }

        let seconds = self.as_seconds(duration).map_err(|_| malformed())?;
        info!(
            "Runtime of {} seconds from [{}, {}]",
            seconds, category, duration
        );

        Ok(Sample::new(
            format!("time_{}", category),
            seconds as f64,
            "seconds",
        ))
    }

    /// Parse every non-blank line of `output`, in order. A single malformed line fails the whole
    /// parse.
    pub fn parse(&self, output: &str) -> Result<Vec<Sample>, BenchError> {
        output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| self.parse_line(line))
            .collect()
    }
}

impl Default for TimingParser {
    fn default() -> Self {
        Self::new()
    }
}
