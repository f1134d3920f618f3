//! Running commands on the benchmark hosts.
//!
//! Everything the benchmark does on a host goes through `Host::run`, which wraps a `Remote` (in
//! practice a `spurs::SshShell`). Commands always run under `bash`.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use log::debug;

use spurs::{cmd, Execute, SshShell};

use crate::error::BenchError;
use crate::Login;

/// A command to run on a host. Build it with `rcmd!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCmd {
    pub line: String,
    pub cwd: Option<String>,
    /// Don't allocate a pty, so that stderr is reported separately from stdout.
    pub no_pty: bool,
    /// A non-zero exit is not an error.
    pub allow_error: bool,
    /// `None` means no limit.
    pub timeout: Option<Duration>,
    /// Use the host's default timeout instead of `timeout`.
    pub host_timeout: bool,
}

impl RemoteCmd {
    pub fn new(line: String) -> Self {
        RemoteCmd {
            line,
            cwd: None,
            no_pty: false,
            allow_error: false,
            timeout: None,
            host_timeout: true,
        }
    }

    pub fn cwd<P: AsRef<str>>(mut self, cwd: P) -> Self {
        self.cwd = Some(cwd.as_ref().to_owned());
        self
    }

    pub fn no_pty(mut self) -> Self {
        self.no_pty = true;
        self
    }

    pub fn allow_error(mut self) -> Self {
        self.allow_error = true;
        self
    }

    /// Overrides the host's default timeout. `None` lets the command run for as long as it takes.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self.host_timeout = false;
        self
    }
}

/// What a command printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Why a command did not produce output.
#[derive(Debug)]
pub enum ExecFailure {
    Failed(String),
    TimedOut(Duration),
}

/// Something that can run commands on a single machine.
pub trait Remote: Send {
    fn exec(&self, cmd: &RemoteCmd) -> Result<RemoteOutput, ExecFailure>;
}

impl Remote for SshShell {
    fn exec(&self, rc: &RemoteCmd) -> Result<RemoteOutput, ExecFailure> {
        let mut cmd = cmd!("{}", rc.line).use_bash();
        if let Some(cwd) = &rc.cwd {
            cmd = cmd.cwd(cwd);
        }
        if rc.no_pty {
            cmd = cmd.no_pty();
        }
        if rc.allow_error {
            cmd = cmd.allow_error();
        }

        let output = match rc.timeout {
            None => self.run(cmd),

            // Run the command on its own channel so that we can stop waiting for it. If it times
            // out, the waiting thread is left behind; the run is over anyway.
            Some(limit) => {
                let handle = self
                    .spawn(cmd)
                    .map_err(|err| ExecFailure::Failed(err.to_string()))?;
                let (tx, rx) = mpsc::channel();
                std::thread::spawn(move || {
                    let _ = tx.send(handle.join().1);
                });

                match rx.recv_timeout(limit) {
                    Ok(output) => output,
                    Err(RecvTimeoutError::Timeout) => return Err(ExecFailure::TimedOut(limit)),
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(ExecFailure::Failed(
                            "lost track of spawned command".into(),
                        ))
                    }
                }
            }
        };

        output
            .map(|out| RemoteOutput {
                stdout: out.stdout,
                stderr: out.stderr,
            })
            .map_err(|err| ExecFailure::Failed(err.to_string()))
    }
}

/// One machine taking part in the benchmark.
pub struct Host {
    /// The identifier of the host in the machine file and in logs.
    name: String,
    shell: Box<dyn Remote>,
    /// Applied to commands that don't set their own timeout.
    default_timeout: Option<Duration>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("name", &self.name)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl Host {
    /// Connect to the given login with the default SSH key.
    pub fn connect(login: &Login, default_timeout: Option<Duration>) -> Result<Self, failure::Error> {
        let shell = SshShell::with_default_key(&login.username, &login.host)?;
        Ok(Host::new(&login.hostname, Box::new(shell), default_timeout))
    }

    pub fn new(name: &str, shell: Box<dyn Remote>, default_timeout: Option<Duration>) -> Self {
        Host {
            name: name.to_owned(),
            shell,
            default_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a command, turning any failure into a `BenchError` that names this host.
    pub fn run(&self, cmd: RemoteCmd) -> Result<RemoteOutput, BenchError> {
        let cmd = if cmd.host_timeout {
            let timeout = self.default_timeout;
            cmd.timeout(timeout)
        } else {
            cmd
        };

        debug!("[{}] $ {}", self.name, cmd.line);

        self.shell.exec(&cmd).map_err(|failure| match failure {
            ExecFailure::Failed(cause) => BenchError::RemoteCommandFailed {
                host: self.name.clone(),
                cmd: cmd.line.clone(),
                cause,
            },
            ExecFailure::TimedOut(limit) => BenchError::Timeout {
                host: self.name.clone(),
                cmd: cmd.line.clone(),
                secs: limit.as_secs(),
            },
        })
    }
}

/// Run `f` on every host at the same time and wait for all of them. Results come back in host
/// order. If any host fails, the whole batch fails with every failure listed.
pub fn fan_out<T, F>(hosts: &mut [Host], what: &str, f: F) -> Result<Vec<T>, BenchError>
where
    T: Send,
    F: Fn(&mut Host) -> Result<T, failure::Error> + Sync,
{
    let f = &f;
    let results: Vec<(String, Result<T, failure::Error>)> = std::thread::scope(|s| {
        let handles: Vec<_> = hosts
            .iter_mut()
            .map(|host| {
                let name = host.name().to_owned();
                (name, s.spawn(move || f(host)))
            })
            .collect();

        handles
            .into_iter()
            .map(|(name, handle)| {
                let res = handle
                    .join()
                    .unwrap_or_else(|_| Err(failure::format_err!("thread panicked")));
                (name, res)
            })
            .collect()
    });

    let mut ok = Vec::with_capacity(results.len());
    let mut failures = vec![];
    for (name, res) in results {
        match res {
            Ok(v) => ok.push(v),
            Err(err) => failures.push(format!("  {}: {}", name, err)),
        }
    }

    if failures.is_empty() {
        Ok(ok)
    } else {
        Err(BenchError::HostBatchFailed {
            what: what.to_owned(),
            count: failures.len(),
            failures: failures.join("\n"),
        })
    }
}

#[cfg(test)]
pub mod testing {
    //! A scripted `Remote` for tests.

    use std::sync::{Arc, Mutex};

    use super::*;

    type Responder = Arc<dyn Fn(&RemoteCmd) -> RemoteOutput + Send + Sync>;

    /// Serves canned outputs to commands containing a given substring and records every command
    /// it sees.
    #[derive(Clone, Default)]
    pub struct FakeShell {
        log: Arc<Mutex<Vec<RemoteCmd>>>,
        responses: Vec<(String, Responder)>,
        failures: Vec<String>,
        hang: Vec<String>,
    }

    impl FakeShell {
        pub fn new() -> Self {
            Self::default()
        }

        /// Commands containing `needle` print `stdout`. The first matching needle wins.
        pub fn respond(self, needle: &str, stdout: &str) -> Self {
            self.respond_stderr(needle, stdout, "")
        }

        pub fn respond_stderr(self, needle: &str, stdout: &str, stderr: &str) -> Self {
            let output = RemoteOutput {
                stdout: stdout.into(),
                stderr: stderr.into(),
            };
            self.respond_with(needle, move |_| output.clone())
        }

        /// Commands containing `needle` print whatever `f` makes of them.
        pub fn respond_with<F>(mut self, needle: &str, f: F) -> Self
        where
            F: Fn(&RemoteCmd) -> RemoteOutput + Send + Sync + 'static,
        {
            self.responses.push((needle.into(), Arc::new(f)));
            self
        }

        /// Commands containing `needle` exit with an error.
        pub fn fail_on(mut self, needle: &str) -> Self {
            self.failures.push(needle.into());
            self
        }

        /// Commands containing `needle` never finish in time.
        pub fn hang_on(mut self, needle: &str) -> Self {
            self.hang.push(needle.into());
            self
        }

        /// A handle on the command log that outlives the shell.
        pub fn log(&self) -> Arc<Mutex<Vec<RemoteCmd>>> {
            self.log.clone()
        }

        pub fn into_host(self, name: &str) -> Host {
            Host::new(name, Box::new(self), None)
        }
    }

    impl Remote for FakeShell {
        fn exec(&self, cmd: &RemoteCmd) -> Result<RemoteOutput, ExecFailure> {
            self.log.lock().unwrap().push(cmd.clone());

            if self.hang.iter().any(|n| cmd.line.contains(n.as_str())) {
                return Err(ExecFailure::TimedOut(
                    cmd.timeout.unwrap_or_else(|| Duration::from_secs(0)),
                ));
            }
            if !cmd.allow_error && self.failures.iter().any(|n| cmd.line.contains(n.as_str())) {
                return Err(ExecFailure::Failed("exit code 1".into()));
            }

            Ok(self
                .responses
                .iter()
                .find(|(needle, _)| cmd.line.contains(needle.as_str()))
                .map(|(_, respond)| respond(cmd))
                .unwrap_or_default())
        }
    }

    /// Run `line` on this machine the way `spurs` runs a `use_bash` command on a remote, with
    /// `$HOME` pointing at `home`. Returns stdout.
    pub fn run_in_bash(line: &str, home: &std::path::Path) -> String {
        let out = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("bash -c {}", spurs_util::escape_for_bash(line)))
            .env("HOME", home)
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "`{}` failed: {}",
            line,
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8(out.stdout).unwrap()
    }

    /// Every command line run so far.
    pub fn lines(log: &Arc<Mutex<Vec<RemoteCmd>>>) -> Vec<String> {
        log.lock().unwrap().iter().map(|c| c.line.clone()).collect()
    }
}
