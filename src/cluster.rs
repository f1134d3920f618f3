//! Turning a list of hosts into something `mpirun` can use: the hosts trust each other over SSH,
//! SSH stays quiet, and the master has a machine file listing everyone.

use log::info;

use rand::{distributions::Alphanumeric, Rng};

use spurs_util::escape_for_bash;

use crate::error::BenchError;
use crate::paths::SSH_CONFIG;
use crate::quote_for_bash;
use crate::remote::{fan_out, Host};

/// The hosts of one benchmark invocation. The first host is the master, where the benchmark is
/// driven from; the rest are workers.
#[derive(Debug)]
pub struct Cluster {
    hosts: Vec<Host>,
}

impl Cluster {
    pub fn new(hosts: Vec<Host>) -> Result<Self, BenchError> {
        if hosts.is_empty() {
            return Err(BenchError::TooFewHosts {
                wanted: 1,
                given: 0,
            });
        }
        Ok(Cluster { hosts })
    }

    pub fn master(&self) -> &Host {
        &self.hosts[0]
    }

    pub fn workers_mut(&mut self) -> &mut [Host] {
        &mut self.hosts[1..]
    }

    pub fn hosts_mut(&mut self) -> &mut [Host] {
        &mut self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_multi_host(&self) -> bool {
        self.hosts.len() > 1
    }

    pub fn names(&self) -> Vec<String> {
        self.hosts.iter().map(|h| h.name().to_owned()).collect()
    }

    /// Let every host SSH into every other host without a password or host key prompt, so that
    /// `mpirun` on the master can start ranks on the workers.
    pub fn establish_trust(&mut self) -> Result<(), failure::Error> {
        info!("Exchanging SSH keys between {} hosts", self.len());

        let keys = fan_out(&mut self.hosts, "generating SSH keys", |host| {
            let key = host
                .run(rcmd!(
                    "mkdir -p $HOME/.ssh && chmod 700 $HOME/.ssh && \
                     ([ -f $HOME/.ssh/id_rsa.pub ] || \
                      ssh-keygen -q -t rsa -N '' -f $HOME/.ssh/id_rsa) && \
                     cat $HOME/.ssh/id_rsa.pub"
                ))?
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| l.starts_with("ssh-"))
                .last()
                .map(str::to_owned);

            key.ok_or_else(|| failure::format_err!("[{}] no public key", host.name()))
        })?;

        let names: Vec<_> = self.names().iter().map(|n| escape_for_bash(n)).collect();
        fan_out(&mut self.hosts, "authorizing SSH keys", |host| {
            for key in keys.iter() {
                host.run(rcmd!("{}", authorize_key_command(key)))?;
            }
            host.run(rcmd!("chmod 600 $HOME/.ssh/authorized_keys"))?;

            for name in names.iter() {
                host.run(rcmd!("ssh-keygen -R {} -f $HOME/.ssh/known_hosts", name).allow_error())?;
            }
            host.run(rcmd!("ssh-keyscan -H {} >> $HOME/.ssh/known_hosts", names.join(" ")))?;

            Ok(())
        })?;

        Ok(())
    }

    /// Keep SSH from printing banners and warnings, which would end up in `mpirun`'s output.
    pub fn quiet_ssh(&mut self) -> Result<(), failure::Error> {
        fan_out(&mut self.hosts, "quieting SSH", |host| {
            host.run(rcmd!(
                "grep -qx 'LogLevel ERROR' {cfg} 2>/dev/null || echo 'LogLevel ERROR' >> {cfg}",
                cfg = SSH_CONFIG
            ))?;
            Ok(())
        })?;
        Ok(())
    }

    /// The machine file for `mpirun --hostfile`: one host per line.
    pub fn machine_file_contents(&self) -> String {
        let mut contents = self.names().join("\n");
        contents.push('\n');
        contents
    }

    /// Write the machine file on the master.
    pub fn write_machine_file(&self, path: &str) -> Result<(), failure::Error> {
        info!("Writing machine file {}", path);
        self.master().run(rcmd!("{}", self.machine_file_command(path)))?;
        Ok(())
    }

    fn machine_file_command(&self, path: &str) -> String {
        let names: Vec<_> = self.names().iter().map(|n| escape_for_bash(n)).collect();
        format!("printf '%s\\n' {} > {}", names.join(" "), path)
    }

    /// Check that every worker sees what the master writes to `dir`. Multi-host runs need the run
    /// directory on shared storage, because the solver's ranks on the workers read the case the
    /// master prepares.
    pub fn verify_shared_run_dir(&mut self, dir: &str) -> Result<(), failure::Error> {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let probe = dir!(dir, format!(".shared-{}", token));

        self.master()
            .run(rcmd!("echo {} > {}", token, probe))?;

        let result = fan_out(self.workers_mut(), "checking shared storage", |host| {
            let seen = host
                .run(rcmd!("cat {}", probe).allow_error())?
                .stdout;
            if seen.trim() == token {
                Ok(())
            } else {
                Err(BenchError::SharedStorageMissing {
                    host: host.name().into(),
                    path: dir.into(),
                }
                .into())
            }
        });

        self.master().run(rcmd!("rm -f {}", probe))?;

        result?;
        Ok(())
    }
}

/// Append `key` to `authorized_keys` unless it is already there.
fn authorize_key_command(key: &str) -> String {
    let key = quote_for_bash(key);
    format!(
        "grep -qxF -e {key} $HOME/.ssh/authorized_keys 2>/dev/null || \
         echo {key} >> $HOME/.ssh/authorized_keys",
        key = key
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::{lines, run_in_bash, FakeShell};

    fn key(n: usize) -> String {
        format!("ssh-rsa AAAAB3Nza{} user@node{}", n, n)
    }

    #[test]
    fn empty_cluster_is_rejected() {
        assert!(Cluster::new(vec![]).is_err());
    }

    #[test]
    fn machine_file_lists_hosts_in_order() {
        let cluster = Cluster::new(vec![
            FakeShell::new().into_host("node0"),
            FakeShell::new().into_host("10.0.0.2"),
            FakeShell::new().into_host("node2"),
        ])
        .unwrap();
        assert_eq!(cluster.machine_file_contents(), "node0\n10.0.0.2\nnode2\n");
        assert!(cluster.is_multi_host());
    }

    #[test]
    fn machine_file_is_written_on_master() {
        let master = FakeShell::new();
        let master_log = master.log();
        let worker = FakeShell::new();
        let worker_log = worker.log();
        let cluster =
            Cluster::new(vec![master.into_host("node0"), worker.into_host("node1")]).unwrap();

        cluster.write_machine_file("/run/motorBike/MACHINEFILE").unwrap();
        assert_eq!(
            lines(&master_log),
            vec![r"printf '%s\n' node0 node1 > /run/motorBike/MACHINEFILE"]
        );
        assert!(lines(&worker_log).is_empty());
    }

    #[test]
    fn machine_file_matches_its_contents_in_bash() {
        let home = tempfile::tempdir().unwrap();
        let cluster = Cluster::new(vec![
            FakeShell::new().into_host("node0.cluster"),
            FakeShell::new().into_host("10.0.0.2"),
        ])
        .unwrap();

        let path = home.path().join("MACHINEFILE");
        let path = path.to_str().unwrap();
        run_in_bash(&cluster.machine_file_command(path), home.path());

        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            cluster.machine_file_contents()
        );
        assert_eq!(cluster.machine_file_contents(), "node0.cluster\n10.0.0.2\n");
    }

    #[test]
    fn key_authorization_appends_each_key_once_in_bash() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir(home.path().join(".ssh")).unwrap();
        let keys = [key(0), "ssh-ed25519 AAAAC3Nz o'brien@laptop".to_owned()];

        for _ in 0..2 {
            for k in keys.iter() {
                run_in_bash(&authorize_key_command(k), home.path());
            }
        }

        let authorized =
            std::fs::read_to_string(home.path().join(".ssh/authorized_keys")).unwrap();
        assert_eq!(authorized, format!("{}\n{}\n", keys[0], keys[1]));
    }

    #[test]
    fn every_key_is_authorized_everywhere() {
        let shells: Vec<_> = (0..3)
            .map(|i| FakeShell::new().respond("id_rsa.pub", &format!("{}\r\n", key(i))))
            .collect();
        let logs: Vec<_> = shells.iter().map(|s| s.log()).collect();
        let hosts = shells
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.into_host(&format!("node{}", i)))
            .collect();
        let mut cluster = Cluster::new(hosts).unwrap();

        cluster.establish_trust().unwrap();

        for log in logs.iter() {
            let lines = lines(log);
            for i in 0..3 {
                assert!(
                    lines
                        .iter()
                        .any(|l| l.contains(&key(i)) && l.contains("authorized_keys")),
                    "key {} not authorized",
                    i
                );
            }
            assert!(lines
                .iter()
                .any(|l| l.starts_with("ssh-keyscan -H node0 node1 node2")));
        }
    }

    #[test]
    fn trust_fails_if_any_host_fails() {
        let hosts = vec![
            FakeShell::new()
                .respond("id_rsa.pub", &key(0))
                .into_host("node0"),
            FakeShell::new()
                .respond("id_rsa.pub", &key(1))
                .fail_on("ssh-keyscan")
                .into_host("node1"),
        ];
        let mut cluster = Cluster::new(hosts).unwrap();
        let err = cluster.establish_trust().unwrap_err();
        match err.downcast_ref::<BenchError>() {
            Some(BenchError::HostBatchFailed { count, failures, .. }) => {
                assert_eq!(*count, 1);
                assert!(failures.contains("node1"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn quiet_ssh_is_idempotent_append() {
        let shell = FakeShell::new();
        let log = shell.log();
        let mut cluster = Cluster::new(vec![shell.into_host("node0")]).unwrap();
        cluster.quiet_ssh().unwrap();
        assert_eq!(
            lines(&log),
            vec![
                "grep -qx 'LogLevel ERROR' $HOME/.ssh/config 2>/dev/null || \
                 echo 'LogLevel ERROR' >> $HOME/.ssh/config"
            ]
        );
    }

    #[test]
    fn unshared_run_dir_is_detected() {
        let master = FakeShell::new();
        let master_log = master.log();
        let hosts = vec![
            master.into_host("node0"),
            FakeShell::new().respond("cat", "").into_host("node1"),
        ];
        let mut cluster = Cluster::new(hosts).unwrap();

        let err = cluster.verify_shared_run_dir("/home/u/OpenFOAM/run").unwrap_err();
        match err.downcast_ref::<BenchError>() {
            Some(BenchError::HostBatchFailed { failures, .. }) => {
                assert!(failures.contains("node1"));
                assert!(failures.contains("shared run directory"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        // The probe file is cleaned up either way.
        assert!(lines(&master_log)
            .last()
            .unwrap()
            .starts_with("rm -f /home/u/OpenFOAM/run/.shared-"));
    }
}
