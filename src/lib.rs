//! A library of routines for benchmarking OpenFOAM on a set of remote machines.
//!
//! The benchmark is driven from this machine over SSH. The remote machines only need an SSH
//! server, `sudo`, and (for multi-host runs) a run directory on storage that they all share.

// Must be imported first because the other submodules use the macros defined therein.
#[macro_use]
mod macros;

pub mod bench;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod openfoam;
pub mod output;
pub mod parse_time;
pub mod patch;
pub mod remote;
pub mod sample;
pub mod templates;
pub mod timing;

use failure::ResultExt;

use log::info;

use remote::Host;

pub use error::BenchError;

/// Information needed to log into a remote machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Login {
    /// A network address for the host, including the port (e.g. `node0.cluster:22`).
    pub host: String,
    /// A human-readable address for the host, without user and port. Other hosts reach this one
    /// by this name, so it is what goes into the machine file.
    pub hostname: String,
    /// The username to log in as.
    pub username: String,
}

impl Login {
    /// Parse `[user@]address[:port]`. `default_username` is used when no user is given, and port
    /// 22 when no port is given.
    pub fn parse(spec: &str, default_username: &str) -> Result<Self, failure::Error> {
        let (username, addr) = match spec.rfind('@') {
            Some(at) => (&spec[..at], &spec[at + 1..]),
            None => (default_username, spec),
        };

        let (hostname, port) = match addr.rfind(':') {
            Some(colon) => (&addr[..colon], &addr[colon + 1..]),
            None => (addr, "22"),
        };

        if username.is_empty() || hostname.is_empty() {
            failure::bail!("Invalid host `{}`: expected [user@]address[:port]", spec);
        }
        let port = port
            .parse::<u16>()
            .with_context(|_| format!("parsing port of `{}`", spec))?;

        Ok(Login {
            host: format!("{}:{}", hostname, port),
            hostname: hostname.to_owned(),
            username: username.to_owned(),
        })
    }
}

/// Common paths.
pub mod paths {
    /// The run directory, relative to the master's home directory. For multi-host runs it must be
    /// on storage shared by all hosts.
    pub const RUN_ROOT: &str = "OpenFOAM/run";

    /// Host list for `mpirun --hostfile`, in the case's working directory.
    pub const MACHINEFILE: &str = "MACHINEFILE";

    /// The case's run script.
    pub const RUNSCRIPT: &str = "Allrun";

    /// The case's clean script.
    pub const CLEANSCRIPT: &str = "Allclean";

    /// Parallel decomposition settings of the case.
    pub const DECOMPOSE_DICT: &str = "system/decomposeParDict";

    /// Mesh definition of the case.
    pub const BLOCKMESH_DICT: &str = "system/blockMeshDict";

    /// Per-user SSH client config.
    pub const SSH_CONFIG: &str = "$HOME/.ssh/config";
}

/// Given an array of timings, generate a human-readable string.
pub fn timings_str(timings: &[(&str, std::time::Duration)]) -> String {
    let mut s = String::new();
    for (label, d) in timings.iter() {
        s.push_str(&format!("{}: {:?}\n", label, d));
    }
    s
}

/// Get the path of the user's home directory.
pub fn get_user_home_dir(host: &Host) -> Result<String, failure::Error> {
    let user_home = host.run(rcmd!("echo $HOME"))?.stdout.trim().to_owned();
    if user_home.is_empty() {
        Err(failure::format_err!("$HOME is empty"))
    } else {
        Ok(user_home)
    }
}

/// Returns the number of processor cores on the machine.
pub fn get_num_cores(host: &Host) -> Result<usize, failure::Error> {
    let nprocess = host.run(rcmd!("getconf _NPROCESSORS_ONLN"))?.stdout;
    let nprocess = nprocess.trim();

    let nprocess = nprocess
        .parse::<usize>()
        .context("parsing number of cores")?;

    Ok(nprocess)
}

/// Log some machine info, so that results can be matched to the hardware they came from.
pub fn dump_sys_info(host: &Host) -> Result<(), failure::Error> {
    for cmd in &["uname -a", "lscpu", "free -h"] {
        let out = host.run(rcmd!("{}", cmd))?;
        info!("[{}] {}:\n{}", host.name(), cmd, out.stdout.trim_end());
    }

    Ok(())
}

/// Quote `s` as a single bash word, keeping every character as it is. `s` must not contain a
/// newline: `spurs` escapes the whole command line, and an escaped newline is dropped.
pub fn quote_for_bash(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
