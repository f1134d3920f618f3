//! Where results go: a JSON file per run in a local results directory.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{offset::Local, DateTime};

use failure::ResultExt;

use serde::{Deserialize, Serialize};

use crate::config::{BenchmarkConfig, RunConfiguration};
use crate::sample::Sample;

/// When a benchmark was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Local>);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(Local::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d-%H-%M-%S"))
    }
}

/// Everything recorded about one run.
#[derive(Debug, Serialize)]
pub struct Results<'a> {
    pub config: &'a BenchmarkConfig,
    pub run: Option<&'a RunConfiguration>,
    pub samples: &'a [Sample],
    /// Wall-clock time of each benchmark phase, in seconds.
    pub timings: BTreeMap<&'a str, f64>,
}

impl<'a> Results<'a> {
    pub fn new(
        config: &'a BenchmarkConfig,
        run: Option<&'a RunConfiguration>,
        samples: &'a [Sample],
        timers: &[(&'a str, std::time::Duration)],
    ) -> Self {
        Results {
            config,
            run,
            samples,
            timings: timers
                .iter()
                .map(|(label, d)| (*label, d.as_secs_f64()))
                .collect(),
        }
    }

    /// `openfoam-<case>-<timestamp>.json`
    pub fn file_name(&self) -> String {
        format!(
            "openfoam-{}-{}.json",
            self.config.case, self.config.timestamp
        )
    }

    /// Write the results into `dir`, creating it if needed. Returns the path of the file.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, failure::Error> {
        std::fs::create_dir_all(dir)
            .with_context(|_| format!("creating results directory {}", dir.display()))?;

        let path = dir.join(self.file_name());
        let file =
            File::create(&path).with_context(|_| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;

        Ok(path)
    }
}
