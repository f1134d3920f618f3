//! Installing OpenFOAM and asking hosts which versions of OpenFOAM and MPI they have.

use log::{info, warn};

use crate::error::BenchError;
use crate::remote::Host;

/// The OpenFOAM release installed when none is specified.
pub const DEFAULT_VERSION: &str = "7";

/// Where the OpenFOAM packages from `dl.openfoam.org` install to.
pub fn root(version: &str) -> String {
    format!("/opt/openfoam{}", version)
}

/// Prefix for commands that need the OpenFOAM environment (`WM_*` variables, solver binaries on
/// the `PATH`).
pub fn env_prefix(version: &str) -> String {
    format!("source {}/etc/bashrc &&", root(version))
}

/// Install OpenFOAM (and with it, Open MPI) from the OpenFOAM apt repository. Does nothing if it is
/// already installed. Requires `sudo`.
pub fn install(host: &Host, version: &str) -> Result<(), failure::Error> {
    let root = root(version);
    let installed = host
        .run(rcmd!("[ -d {} ] && echo yes || echo no", root))?
        .stdout;
    if installed.trim() == "yes" {
        info!("[{}] OpenFOAM {} already installed", host.name(), version);
        return Ok(());
    }

    info!("[{}] installing OpenFOAM {}", host.name(), version);
    with_shell! { host =>
        rcmd!("sudo sh -c 'wget -O - https://dl.openfoam.org/gpg.key | apt-key add -'"),
        rcmd!("sudo add-apt-repository -y http://dl.openfoam.org/ubuntu"),
        rcmd!("sudo apt-get update"),
        rcmd!("sudo DEBIAN_FRONTEND=noninteractive apt-get -y install openfoam{}", version),
    }

    Ok(())
}

/// The installed OpenFOAM version, from `$WM_PROJECT_VERSION`.
pub fn solver_version(host: &Host, version: &str) -> Result<String, failure::Error> {
    let out = host
        .run(rcmd!("{} echo $WM_PROJECT_VERSION", env_prefix(version)))?
        .stdout;
    let found = out.trim();
    if found.is_empty() {
        return Err(BenchError::VersionProbe {
            what: "OpenFOAM",
            output: out,
        }
        .into());
    }
    Ok(found.to_owned())
}

/// The installed Open MPI version, from `mpirun -version`.
pub fn mpi_version(host: &Host, version: &str) -> Result<String, failure::Error> {
    let out = host
        .run(rcmd!("{} mpirun -version", env_prefix(version)))?
        .stdout;
    Ok(parse_mpi_version(&out)?)
}

/// Pull the version out of the first line of `mpirun -version`, which looks like
/// `mpirun (Open MPI) 2.1.1`. This only knows Open MPI's format.
pub fn parse_mpi_version(output: &str) -> Result<String, BenchError> {
    let token = output
        .lines()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| line.split_whitespace().nth(3))
        .ok_or_else(|| BenchError::VersionProbe {
            what: "MPI",
            output: output.into(),
        })?;

    if !token.starts_with(|c: char| c.is_ascii_digit()) {
        warn!(
            "MPI version `{}` does not look like a version number; `mpirun -version` printed {:?}",
            token, output
        );
    }

    Ok(token.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::{lines, FakeShell};

    #[test]
    fn mpi_version_is_fourth_token() {
        let out = "mpirun (Open MPI) 2.1.1\r\n\r\nReport bugs to http://www.open-mpi.org/community/help/\r\n";
        assert_eq!(parse_mpi_version(out).unwrap(), "2.1.1");
    }

    #[test]
    fn short_mpi_version_output_is_an_error() {
        assert!(parse_mpi_version("mpirun 4.0\n").is_err());
        assert!(parse_mpi_version("").is_err());

        // MPICH's banner has only three words on its first line.
        let out = "HYDRA build details:\n    Version:                                 3.3a2\n";
        assert!(matches!(
            parse_mpi_version(out),
            Err(BenchError::VersionProbe { what: "MPI", .. })
        ));
    }

    #[test]
    fn unexpected_mpi_format_still_returns_token() {
        // Intel MPI puts a word where Open MPI has its version; we return what is there.
        let out = "Intel(R) MPI Library for Linux* OS, Version 2019 Update 8\n";
        assert_eq!(parse_mpi_version(out).unwrap(), "for");
    }

    #[test]
    fn solver_version_uses_openfoam_env() {
        let shell = FakeShell::new().respond("WM_PROJECT_VERSION", "7\r\n");
        let log = shell.log();
        let host = shell.into_host("node0");
        assert_eq!(solver_version(&host, "7").unwrap(), "7");
        assert!(lines(&log)[0].starts_with("source /opt/openfoam7/etc/bashrc &&"));

        let host = FakeShell::new().into_host("node0");
        assert!(solver_version(&host, "7").is_err());
    }

    #[test]
    fn install_is_skipped_when_present() {
        let shell = FakeShell::new().respond("[ -d /opt/openfoam7 ]", "yes\n");
        let log = shell.log();
        install(&shell.into_host("node0"), "7").unwrap();
        assert_eq!(lines(&log).len(), 1);
    }

    #[test]
    fn install_adds_repo_and_package() {
        let shell = FakeShell::new().respond("[ -d /opt/openfoam8 ]", "no\n");
        let log = shell.log();
        install(&shell.into_host("node0"), "8").unwrap();
        let lines = lines(&log);
        assert!(lines.iter().any(|l| l.contains("add-apt-repository")));
        assert!(lines.last().unwrap().ends_with("apt-get -y install openfoam8"));
    }
}
