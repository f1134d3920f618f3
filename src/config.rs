//! Benchmark configuration: what the user asked for (`BenchmarkConfig`), and what a run actually
//! does once the hosts are known (`RunConfiguration`).

use log::warn;

use serde::{Deserialize, Serialize};

use crate::error::BenchError;
use crate::output::Timestamp;
use crate::patch::MatchPolicy;
use crate::templates::{self, CaseDefinition};

/// The decomposition method written into `decomposeParDict`.
pub const DECOMPOSE_METHOD: &str = "scotch";

/// The default `mpirun --map-by` policy.
pub const DEFAULT_MPI_MAPPING: &str = "core:SPAN";

/// Everything the user chose. Built once from the command line and passed around by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// `[user@]address[:port]` of each host; the first one is the master.
    pub hosts: Vec<String>,
    pub username: String,
    /// Use only the first `num_hosts` hosts.
    pub num_hosts: Option<usize>,

    /// The case to run (a key of `templates::CASES`).
    pub case: String,
    /// Size preset for the motorbike case (a key of `templates::MOTORBIKE_DIMENSIONS`).
    pub motorbike_dimensions: Option<String>,
    /// Explicit mesh dimensions, `"X Y Z"`. Wins over the preset.
    pub dimensions: Option<String>,
    /// Number of subdomains (= MPI ranks). Defaults to half of the available CPUs.
    pub num_threads: Option<usize>,
    pub mpi_mapping: String,

    pub openfoam_version: String,
    pub skip_install: bool,
    pub patch_policy: MatchPolicy,

    /// Default timeout for every remote command, in seconds.
    pub command_timeout: Option<u64>,
    /// Timeout for the solver run itself, in seconds.
    pub run_timeout: Option<u64>,

    /// Local directory for result files.
    pub results_dir: String,

    pub timestamp: Timestamp,
}

impl BenchmarkConfig {
    /// A config with every default, for the given hosts.
    pub fn new(username: &str, hosts: Vec<String>) -> Self {
        BenchmarkConfig {
            hosts,
            username: username.into(),
            num_hosts: None,
            case: templates::DEFAULT_CASE.into(),
            motorbike_dimensions: None,
            dimensions: None,
            num_threads: None,
            mpi_mapping: DEFAULT_MPI_MAPPING.into(),
            openfoam_version: crate::openfoam::DEFAULT_VERSION.into(),
            skip_install: false,
            patch_policy: MatchPolicy::Warn,
            command_timeout: None,
            run_timeout: None,
            results_dir: "results".into(),
            timestamp: Timestamp::now(),
        }
    }

    /// The host specs this run uses.
    pub fn selected_hosts(&self) -> Result<&[String], BenchError> {
        let wanted = self.num_hosts.unwrap_or_else(|| self.hosts.len());
        if wanted == 0 || wanted > self.hosts.len() {
            return Err(BenchError::TooFewHosts {
                wanted: wanted.max(1),
                given: self.hosts.len(),
            });
        }
        Ok(&self.hosts[..wanted])
    }
}

/// The settings of one run, derived from a `BenchmarkConfig` and the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfiguration {
    #[serde(skip)]
    pub case: &'static CaseDefinition,
    pub dimensions: String,
    pub decompose_method: &'static str,
    /// Number of subdomains and MPI ranks.
    pub num_processes: usize,
    pub total_cpus_available: usize,
    pub mpi_mapping: String,
    pub host_count: usize,
}

impl RunConfiguration {
    /// `cpus_per_host` is the usable CPU count of the master; all hosts are assumed alike.
    pub fn resolve(
        cfg: &BenchmarkConfig,
        host_count: usize,
        cpus_per_host: usize,
    ) -> Result<Self, BenchError> {
        let case = templates::case(&cfg.case)?;
        let dimensions = resolve_dimensions(
            case,
            cfg.dimensions.as_deref(),
            cfg.motorbike_dimensions.as_deref(),
        )?;
        let total_cpus_available = host_count * cpus_per_host;

        Ok(RunConfiguration {
            case,
            dimensions,
            decompose_method: DECOMPOSE_METHOD,
            num_processes: num_processes(total_cpus_available, cfg.num_threads),
            total_cpus_available,
            mpi_mapping: cfg.mpi_mapping.clone(),
            host_count,
        })
    }

    pub fn uses_mpi(&self) -> bool {
        self.host_count > 1
    }
}

/// Mesh dimensions for a run. An explicit `dimensions` string wins; then the motorbike preset (only
/// for the motorbike case); then the default preset.
pub fn resolve_dimensions(
    case: &CaseDefinition,
    dimensions: Option<&str>,
    preset: Option<&str>,
) -> Result<String, BenchError> {
    if let Some(dimensions) = dimensions {
        return templates::parse_dimensions(dimensions);
    }

    match preset {
        Some(preset) if case.key == templates::MOTORBIKE => {
            Ok(templates::motorbike_dimensions(preset)?.to_owned())
        }
        Some(preset) => {
            warn!(
                "Ignoring motorbike dimensions `{}` for case `{}`",
                preset, case.key
            );
            Ok(templates::motorbike_dimensions(templates::DEFAULT_MOTORBIKE_DIMENSIONS)?.to_owned())
        }
        None => {
            Ok(templates::motorbike_dimensions(templates::DEFAULT_MOTORBIKE_DIMENSIONS)?.to_owned())
        }
    }
}

/// The number of processes to decompose into: the explicit count if there is one, else half of
/// the available CPUs (leaving headroom), but at least one.
pub fn num_processes(total_cpus_available: usize, explicit: Option<usize>) -> usize {
    explicit.unwrap_or_else(|| (total_cpus_available / 2).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motorbike() -> &'static CaseDefinition {
        templates::case("motorbike").unwrap()
    }

    #[test]
    fn half_the_cpus_by_default() {
        assert_eq!(num_processes(2 * 8, None), 8);
        assert_eq!(num_processes(1 * 8, None), 4);
        assert_eq!(num_processes(3 * 5, None), 7);
        assert_eq!(num_processes(1, None), 1);
        assert_eq!(num_processes(16, Some(3)), 3);
        assert_eq!(num_processes(16, Some(64)), 64);
    }

    #[test]
    fn override_wins_over_preset() {
        assert_eq!(
            resolve_dimensions(motorbike(), Some("10 4 4"), Some("large")).unwrap(),
            "10 4 4"
        );
    }

    #[test]
    fn preset_wins_over_default() {
        assert_eq!(
            resolve_dimensions(motorbike(), None, Some("medium")).unwrap(),
            "40 16 16"
        );
        assert_eq!(resolve_dimensions(motorbike(), None, None).unwrap(), "20 8 8");
    }

    #[test]
    fn preset_only_applies_to_motorbike() {
        let pipe = templates::case("pipe_cyclic").unwrap();
        assert_eq!(
            resolve_dimensions(pipe, None, Some("x-large")).unwrap(),
            "20 8 8"
        );
        assert_eq!(
            resolve_dimensions(pipe, Some("5 5 5"), None).unwrap(),
            "5 5 5"
        );
    }

    #[test]
    fn bad_inputs_are_errors() {
        assert!(resolve_dimensions(motorbike(), Some("5 5"), None).is_err());
        assert!(resolve_dimensions(motorbike(), None, Some("huge")).is_err());
    }

    #[test]
    fn run_configuration_from_defaults() {
        let cfg = BenchmarkConfig::new("markm", vec!["a".into(), "b".into()]);
        let run = RunConfiguration::resolve(&cfg, 2, 8).unwrap();
        assert_eq!(run.case.key, "motorbike");
        assert_eq!(run.dimensions, "20 8 8");
        assert_eq!(run.decompose_method, "scotch");
        assert_eq!(run.num_processes, 8);
        assert_eq!(run.total_cpus_available, 16);
        assert_eq!(run.mpi_mapping, "core:SPAN");
        assert!(run.uses_mpi());

        let run = RunConfiguration::resolve(&cfg, 1, 8).unwrap();
        assert!(!run.uses_mpi());
    }

    #[test]
    fn host_selection() {
        let mut cfg = BenchmarkConfig::new("markm", vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(cfg.selected_hosts().unwrap().len(), 3);

        cfg.num_hosts = Some(1);
        assert_eq!(cfg.selected_hosts().unwrap(), &["a".to_owned()][..]);

        cfg.num_hosts = Some(4);
        assert!(cfg.selected_hosts().is_err());

        cfg.num_hosts = Some(0);
        assert!(cfg.selected_hosts().is_err());
    }
}
