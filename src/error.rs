//! The ways a benchmark run can fail.
//!
//! Everything here is fatal to the run. Routines return `failure::Error`, and `main` downcasts to
//! `BenchError` to print a hint about what went wrong.

use failure_derive::Fail;

#[derive(Debug, Fail)]
pub enum BenchError {
    /// A default key is missing from its own template table.
    #[fail(display = "default {} `{}` is not in its table", table, key)]
    InconsistentTemplates { table: &'static str, key: &'static str },

    #[fail(display = "unknown {} `{}` (expected one of: {})", table, key, known)]
    UnknownTemplateKey {
        table: &'static str,
        key: String,
        known: String,
    },

    #[fail(
        display = "invalid dimensions `{}`: expected three positive integers",
        dimensions
    )]
    InvalidDimensions { dimensions: String },

    #[fail(display = "[{}] command failed: {}\n{}", host, cmd, cause)]
    RemoteCommandFailed {
        host: String,
        cmd: String,
        cause: String,
    },

    #[fail(display = "[{}] command timed out after {}s: {}", host, secs, cmd)]
    Timeout { host: String, cmd: String, secs: u64 },

    #[fail(display = "{} failed on {} host(s):\n{}", what, count, failures)]
    HostBatchFailed {
        what: String,
        count: usize,
        failures: String,
    },

    #[fail(
        display = "time `{}` does not match format `<category> <m>m<s>.<frac>s`",
        line
    )]
    MalformedTiming { line: String },

    #[fail(display = "could not probe {} version from output: {:?}", what, output)]
    VersionProbe { what: &'static str, output: String },

    #[fail(
        display = "delimiter `{}` occurs in pattern `{}` or replacement `{}`",
        delimiter, pattern, replacement
    )]
    DelimiterCollision {
        delimiter: char,
        pattern: String,
        replacement: String,
    },

    #[fail(display = "invalid pattern `{}`: {}", pattern, cause)]
    InvalidPattern { pattern: String, cause: String },

    #[fail(display = "pattern `{}` matched nothing in {}", pattern, path)]
    NoMatch { path: String, pattern: String },

    #[fail(display = "[{}] does not see the shared run directory {}", host, path)]
    SharedStorageMissing { host: String, path: String },

    #[fail(display = "asked for {} host(s) but only {} were given", wanted, given)]
    TooFewHosts { wanted: usize, given: usize },

    #[fail(display = "benchmark cannot go from {} to {}", from, to)]
    PhaseOrder { from: String, to: String },
}
