//! Run the OpenFOAM benchmark on one or more hosts.
//!
//! A run goes through a fixed sequence of phases on the cluster:
//!
//! 1. provision: install OpenFOAM, copy the case into the run directory, and for multi-host runs
//!    set up SSH trust, the machine file, and check that the run directory is shared;
//! 2. configure: patch the mesh dimensions into `blockMeshDict`;
//! 3. decompose: patch the decomposition method and subdomain count into `decomposeParDict`;
//! 4. prepare the run script: for multi-host runs, make `Allrun` use `mpirun` across the hosts;
//! 5. execute: run `Allclean` and then `Allrun` under `time`;
//! 6. parse: turn the `time` report into samples tagged with the run's metadata;
//! 7. cleanup.
//!
//! Everything except the final cleanup runs on the master, unless stated otherwise.

use std::path::Path;
use std::time::Duration;

use clap::{clap_app, Arg};

use log::{debug, info, warn};

use serde_json::json;

use crate::cli;
use crate::cluster::Cluster;
use crate::config::{BenchmarkConfig, RunConfiguration};
use crate::error::BenchError;
use crate::openfoam;
use crate::output::Results;
use crate::patch::replace_text;
use crate::paths::*;
use crate::remote::Host;
use crate::sample::{Metadata, Sample};
use crate::templates::{self, CaseDefinition};
use crate::timing::TimingParser;
use crate::{dump_sys_info, get_num_cores, get_user_home_dir, timings_str, Login};

pub fn cli_options() -> clap::App<'static, 'static> {
    fn is_dimensions(s: String) -> Result<(), String> {
        templates::parse_dimensions(&s)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    let app = clap_app! { openfoam =>
        (about: "Run the OpenFOAM benchmark on the given hosts. Requires `sudo` on the remotes.")
        (@setting ArgRequiredElseHelp)
        (@setting DisableVersion)
        (@arg SKIP_INSTALL: --skip_install
         "Assume OpenFOAM is already installed on every host.")
        (@arg STRICT_PATCHING: --strict_patching
         "Fail if a file edit matches nothing, instead of warning.")
    };

    cli::hosts::add_cli_options(app)
        .arg(
            Arg::with_name("CASE")
                .long("case")
                .takes_value(true)
                .possible_values(&templates::case_keys())
                .default_value(templates::DEFAULT_CASE)
                .help("The case to run."),
        )
        .arg(
            Arg::with_name("MOTORBIKE_DIMENSIONS")
                .long("motorbike_dimensions")
                .takes_value(true)
                .possible_values(&templates::preset_keys())
                .help("Mesh size preset of the motorbike case. Defaults to `small`."),
        )
        .arg(
            Arg::with_name("DIMENSIONS")
                .long("dimensions")
                .takes_value(true)
                .validator(is_dimensions)
                .help("Explicit mesh dimensions as \"X Y Z\". Overrides --motorbike_dimensions."),
        )
        .arg(
            Arg::with_name("NUM_THREADS")
                .long("num_threads")
                .takes_value(true)
                .validator(cli::is_positive_usize)
                .help(
                    "Number of subdomains and MPI processes. Defaults to half of the CPUs of \
                     all hosts.",
                ),
        )
        .arg(
            Arg::with_name("MPI_MAPPING")
                .long("mpi_mapping")
                .takes_value(true)
                .default_value(crate::config::DEFAULT_MPI_MAPPING)
                .help("The `mpirun --map-by` policy for multi-host runs."),
        )
        .arg(
            Arg::with_name("OPENFOAM_VERSION")
                .long("openfoam_version")
                .takes_value(true)
                .default_value(openfoam::DEFAULT_VERSION)
                .help("The OpenFOAM release to install and run."),
        )
        .arg(
            Arg::with_name("RUN_TIMEOUT")
                .long("run_timeout")
                .takes_value(true)
                .validator(cli::is_positive_usize)
                .help(
                    "Fail if the solver run takes longer than this many seconds. By default, the \
                     run may take forever, whatever --command_timeout says.",
                ),
        )
        .arg(
            Arg::with_name("RESULTS_DIR")
                .long("results_dir")
                .takes_value(true)
                .default_value("results")
                .help("Local directory to write the results file into."),
        )
}

pub fn run(sub_m: &clap::ArgMatches<'_>) -> Result<(), failure::Error> {
    let hosts = cli::hosts::parse_cli_options(sub_m);

    let mut cfg = BenchmarkConfig::new(&hosts.username, hosts.hosts);
    cfg.num_hosts = hosts.num_hosts;
    cfg.command_timeout = hosts.command_timeout;
    cfg.case = sub_m.value_of("CASE").unwrap().into();
    cfg.motorbike_dimensions = sub_m.value_of("MOTORBIKE_DIMENSIONS").map(Into::into);
    cfg.dimensions = sub_m.value_of("DIMENSIONS").map(Into::into);
    cfg.num_threads = cli::value_of_usize(sub_m, "NUM_THREADS");
    cfg.mpi_mapping = sub_m.value_of("MPI_MAPPING").unwrap().into();
    cfg.openfoam_version = sub_m.value_of("OPENFOAM_VERSION").unwrap().into();
    cfg.skip_install = sub_m.is_present("SKIP_INSTALL");
    if sub_m.is_present("STRICT_PATCHING") {
        cfg.patch_policy = crate::patch::MatchPolicy::Require;
    }
    cfg.run_timeout = cli::value_of_usize(sub_m, "RUN_TIMEOUT").map(|t| t as u64);
    cfg.results_dir = sub_m.value_of("RESULTS_DIR").unwrap().into();

    run_benchmark(&cfg)
}

/// Connect to the hosts of `cfg`, run the benchmark, and write the results file.
pub fn run_benchmark(cfg: &BenchmarkConfig) -> Result<(), failure::Error> {
    let timeout = cfg.command_timeout.map(Duration::from_secs);

    let mut hosts = vec![];
    for spec in cfg.selected_hosts()? {
        let login = Login::parse(spec, &cfg.username)?;
        hosts.push(Host::connect(&login, timeout)?);
    }

    let mut bench = Benchmark::new(cfg, Cluster::new(hosts)?)?;
    let samples = bench.run()?;

    let results = Results::new(cfg, bench.run_configuration(), &samples, &bench.timers);
    let path = results.write_to(Path::new(&cfg.results_dir))?;

    println!("{}", timings_str(&bench.timers));
    println!("RESULTS: {}", path.display());

    Ok(())
}

/// Where a benchmark is in its lifecycle. Each phase is entered when the step of the same name
/// has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Provisioned,
    Configured,
    Decomposed,
    Running,
    Parsed,
    Cleaned,
}

impl Phase {
    fn next(self) -> Option<Phase> {
        match self {
            Phase::Idle => Some(Phase::Provisioned),
            Phase::Provisioned => Some(Phase::Configured),
            Phase::Configured => Some(Phase::Decomposed),
            Phase::Decomposed => Some(Phase::Running),
            Phase::Running => Some(Phase::Parsed),
            Phase::Parsed => Some(Phase::Cleaned),
            Phase::Cleaned => None,
        }
    }
}

/// One benchmark run on a cluster.
pub struct Benchmark<'c> {
    cfg: &'c BenchmarkConfig,
    cluster: Cluster,
    case: &'static CaseDefinition,

    /// `$HOME/OpenFOAM/run` on the master.
    run_root: String,
    /// The case's directory under `run_root`.
    workdir: String,

    phase: Phase,
    run: Option<RunConfiguration>,

    /// How long each step took.
    pub timers: Vec<(&'static str, Duration)>,
}

impl<'c> Benchmark<'c> {
    pub fn new(cfg: &'c BenchmarkConfig, cluster: Cluster) -> Result<Self, failure::Error> {
        let case = templates::case(&cfg.case)?;
        let user_home = get_user_home_dir(cluster.master())?;
        let run_root = dir!(user_home, RUN_ROOT);
        let workdir = dir!(run_root, case.dir_name());

        Ok(Benchmark {
            cfg,
            cluster,
            case,
            run_root,
            workdir,
            phase: Phase::Idle,
            run: None,
            timers: vec![],
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Known once the benchmark is configured.
    pub fn run_configuration(&self) -> Option<&RunConfiguration> {
        self.run.as_ref()
    }

    /// Run every phase in order and return the samples.
    pub fn run(&mut self) -> Result<Vec<Sample>, failure::Error> {
        time!(self.timers, "Provision", self.provision())?;
        time!(self.timers, "Configure", self.configure())?;
        time!(self.timers, "Decompose", self.decompose())?;
        time!(self.timers, "Prepare run script", self.prepare_run_script())?;
        let output = time!(self.timers, "Run", self.execute())?;
        let samples = time!(self.timers, "Parse", self.parse(&output))?;
        self.cleanup()?;

        Ok(samples)
    }

    fn advance(&mut self, to: Phase) -> Result<(), BenchError> {
        if self.phase.next() != Some(to) {
            return Err(BenchError::PhaseOrder {
                from: format!("{:?}", self.phase),
                to: format!("{:?}", to),
            });
        }
        debug!("Benchmark phase: {:?} -> {:?}", self.phase, to);
        self.phase = to;
        Ok(())
    }

    fn expect_phase(&self, phase: Phase, doing: &str) -> Result<(), BenchError> {
        if self.phase != phase {
            return Err(BenchError::PhaseOrder {
                from: format!("{:?}", self.phase),
                to: doing.into(),
            });
        }
        Ok(())
    }

    fn run_config(&self) -> Result<&RunConfiguration, BenchError> {
        self.run.as_ref().ok_or_else(|| BenchError::PhaseOrder {
            from: format!("{:?}", self.phase),
            to: "a configured run".into(),
        })
    }

    /// Install OpenFOAM everywhere and lay out the case on the master.
    pub fn provision(&mut self) -> Result<(), failure::Error> {
        self.expect_phase(Phase::Idle, "provisioning")?;
        let cfg = self.cfg;

        dump_sys_info(self.cluster.master())?;

        if cfg.skip_install {
            info!("Skipping OpenFOAM installation");
        } else {
            crate::remote::fan_out(self.cluster.hosts_mut(), "installing OpenFOAM", |host| {
                openfoam::install(host, &cfg.openfoam_version)
            })?;
        }

        let template = dir!(openfoam::root(&cfg.openfoam_version), self.case.path);
        let master = self.cluster.master();
        with_shell! { master =>
            rcmd!("mkdir -p {}", self.run_root),
            rcmd!("cp -r {} {}", template, self.run_root),
        }

        if self.cluster.is_multi_host() {
            self.cluster.establish_trust()?;
            self.cluster.quiet_ssh()?;
            self.cluster
                .write_machine_file(&dir!(self.workdir, MACHINEFILE))?;
            self.cluster.verify_shared_run_dir(&self.run_root)?;
        }

        self.advance(Phase::Provisioned)?;
        Ok(())
    }

    /// Work out the run's settings and write the mesh dimensions into the case.
    pub fn configure(&mut self) -> Result<(), failure::Error> {
        self.expect_phase(Phase::Provisioned, "configuring")?;

        let cpus = get_num_cores(self.cluster.master())?;
        let run = RunConfiguration::resolve(self.cfg, self.cluster.len(), cpus)?;
        info!(
            "Running {} with dimensions `{}` on {} process(es) ({} CPUs on {} host(s))",
            run.case.key,
            run.dimensions,
            run.num_processes,
            run.total_cpus_available,
            run.host_count
        );

        replace_text(
            self.cluster.master(),
            r"(hex \(.*\) \().*(\) .* \(.*\))",
            &format!(r"\1{}\2", run.dimensions),
            &dir!(self.workdir, BLOCKMESH_DICT),
            '|',
            self.cfg.patch_policy,
        )?;

        self.run = Some(run);
        self.advance(Phase::Configured)?;
        Ok(())
    }

    /// Write the decomposition settings into the case.
    pub fn decompose(&mut self) -> Result<(), failure::Error> {
        self.expect_phase(Phase::Configured, "decomposing")?;
        let run = self.run_config()?;
        let master = self.cluster.master();
        let dict = dir!(self.workdir, DECOMPOSE_DICT);

        replace_text(
            master,
            "method.*",
            &format!("method {};", run.decompose_method),
            &dict,
            '/',
            self.cfg.patch_policy,
        )?;
        replace_text(
            master,
            "numberOfSubdomains.*",
            &format!("numberOfSubdomains {};", run.num_processes),
            &dict,
            '/',
            self.cfg.patch_policy,
        )?;

        self.advance(Phase::Decomposed)?;
        Ok(())
    }

    /// For multi-host runs, make the run script launch its parallel steps with `mpirun` on every
    /// host. Single-host runs use the script as it is.
    pub fn prepare_run_script(&mut self) -> Result<(), failure::Error> {
        self.expect_phase(Phase::Decomposed, "preparing the run script")?;
        let run = self.run_config()?;

        if run.uses_mpi() {
            let master = self.cluster.master();
            let runscript = dir!(self.workdir, RUNSCRIPT);
            let launcher = mpirun_command(
                &dir!(self.workdir, MACHINEFILE),
                &run.mpi_mapping,
                run.num_processes,
            );

            replace_text(
                master,
                "runParallel",
                &launcher,
                &runscript,
                '|',
                self.cfg.patch_policy,
            )?;
            replace_text(
                master,
                "^mpirun.*",
                "& -parallel",
                &runscript,
                '/',
                self.cfg.patch_policy,
            )?;
        }

        self.advance(Phase::Running)?;
        Ok(())
    }

    /// Run the case and return what `time` reported. Only `--run_timeout` bounds the run; the
    /// default command timeout does not apply.
    pub fn execute(&mut self) -> Result<String, failure::Error> {
        self.expect_phase(Phase::Running, "executing")?;

        let cmd = run_command(&self.cfg.openfoam_version, &self.workdir);
        let out = self.cluster.master().run(
            rcmd!("{}", cmd)
                .no_pty()
                .timeout(self.cfg.run_timeout.map(Duration::from_secs)),
        )?;

        debug!("Allrun output:\n{}", out.stdout);
        Ok(out.stderr)
    }

    /// Parse the output of `execute` into samples carrying the run's metadata.
    pub fn parse(&mut self, output: &str) -> Result<Vec<Sample>, failure::Error> {
        self.expect_phase(Phase::Running, "parsing")?;
        let run = self.run_config()?;
        let master = self.cluster.master();
        let version = &self.cfg.openfoam_version;

        let mut samples = TimingParser::new().parse(output)?;

        let mut metadata = Metadata::new();
        metadata.insert("case_name".into(), json!(run.case.key));
        metadata.insert("dimensions".into(), json!(run.dimensions));
        metadata.insert(
            "total_cpus_available".into(),
            json!(run.total_cpus_available),
        );
        metadata.insert("total_cpus_used".into(), json!(run.num_processes));
        metadata.insert(
            "openfoam_version".into(),
            json!(openfoam::solver_version(master, version)?),
        );
        metadata.insert(
            "openmpi_version".into(),
            json!(openfoam::mpi_version(master, version)?),
        );
        metadata.insert("mpi_mapping".into(), json!(run.mpi_mapping));

        for sample in samples.iter_mut() {
            sample.add_metadata(&metadata);
        }

        self.advance(Phase::Parsed)?;
        Ok(samples)
    }

    /// Tearing down the hosts is not supported; everything is left in place for inspection.
    pub fn cleanup(&mut self) -> Result<(), failure::Error> {
        self.expect_phase(Phase::Parsed, "cleaning up")?;
        warn!(
            "Cleanup is not implemented; {} and the SSH settings of the hosts are left as they are",
            self.run_root
        );
        self.advance(Phase::Cleaned)?;
        Ok(())
    }
}

/// The launcher that replaces `runParallel` in multi-host runs.
pub fn mpirun_command(machinefile: &str, mapping: &str, num_processes: usize) -> String {
    format!(
        "mpirun -hostfile {} -mca btl ^openib --map-by {} -np {}",
        machinefile, mapping, num_processes
    )
}

/// Clean the case and run it under `time`. The case's own output goes to stdout, so that stderr
/// holds only the `time` report.
pub fn run_command(version: &str, workdir: &str) -> String {
    format!(
        "{} cd {} && ./{} 2>&1 && time ./{} 2>&1",
        openfoam::env_prefix(version),
        workdir,
        CLEANSCRIPT,
        RUNSCRIPT
    )
}
