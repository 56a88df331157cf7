//! Child process supervisor
//!
//! Launches the configured command once, relays termination signals to it
//! while it runs, and reports its exit code. There is no restart policy and
//! no timeout: the supervisor lives exactly as long as the child.
//!
//! State machine: `Idle -> Launching -> Running -> Exited`.

use std::io;
use std::process::{Child, Command, ExitStatus};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Interval between child exit checks
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Offset added to a terminating signal's number to form the exit code
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// Supervisor errors
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("invalid exec: {0}")]
    InvalidExec(String),

    #[error("failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to install signal relay: {0}")]
    Relay(String),

    #[error("failed waiting for child: {0}")]
    Wait(#[source] io::Error),
}

/// The command to supervise
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecSpec {
    /// Run through `/bin/sh -c`
    Shell(String),
    /// Program and arguments, run directly
    Argv(Vec<String>),
}

impl ExecSpec {
    /// Parse an `exec` value; `null` and empty strings mean nothing to run
    pub fn from_value(value: &Value) -> Result<Option<Self>, SupervisorError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => Ok(Some(ExecSpec::Shell(s.clone()))),
            Value::Array(items) => {
                let argv = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s.clone()),
                        Value::Number(n) => Ok(n.to_string()),
                        other => Err(SupervisorError::InvalidExec(format!(
                            "argument must be a string, got {}",
                            other
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if argv.is_empty() {
                    return Err(SupervisorError::InvalidExec("empty argument list".to_string()));
                }
                Ok(Some(ExecSpec::Argv(argv)))
            }
            other => Err(SupervisorError::InvalidExec(format!(
                "expected a string or a list, got {}",
                other
            ))),
        }
    }

    /// Command configured for this run, unless `no_exec` is set
    pub fn from_config(config: &Config) -> Result<Option<Self>, SupervisorError> {
        Self::resolve(&ExecOverride::default(), config)
    }

    /// Command for this run; command-line values win over the configuration,
    /// including anything a data source's `common` block changed
    pub fn resolve(cli: &ExecOverride, config: &Config) -> Result<Option<Self>, SupervisorError> {
        if cli.no_exec || config.no_exec() {
            debug!("no_exec set, not launching a child");
            return Ok(None);
        }
        if let Some(exec) = &cli.exec {
            return Self::from_value(&Value::String(exec.clone()));
        }
        match config.get("exec") {
            Some(value) => Self::from_value(value),
            None => Ok(None),
        }
    }

    fn command(&self) -> Command {
        match self {
            ExecSpec::Shell(line) => {
                let mut command = Command::new("/bin/sh");
                command.arg("-c").arg(line);
                command
            }
            ExecSpec::Argv(argv) => {
                let mut command = Command::new(&argv[0]);
                command.args(&argv[1..]);
                command
            }
        }
    }

    fn display(&self) -> String {
        match self {
            ExecSpec::Shell(line) => line.clone(),
            ExecSpec::Argv(argv) => argv.join(" "),
        }
    }
}

/// Exec settings given on the command line
///
/// Kept apart from [`Config`] so that data-source `common` overrides cannot
/// replace them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOverride {
    pub exec: Option<String>,
    pub no_exec: bool,
}

/// Supervisor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Launching,
    Running { pid: u32 },
    Exited { code: i32 },
}

/// Launches and waits on one child
#[derive(Debug)]
pub struct Supervisor {
    exec: ExecSpec,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(exec: ExecSpec) -> Self {
        Self {
            exec,
            state: SupervisorState::Idle,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Launch the child and block until it exits, returning its exit code
    pub fn run(&mut self) -> Result<i32, SupervisorError> {
        self.state = SupervisorState::Launching;
        let command_line = self.exec.display();

        #[cfg(unix)]
        let mut relay = crate::signal::SignalRelay::install()
            .map_err(|e| SupervisorError::Relay(e.to_string()))?;

        let mut child = self
            .exec
            .command()
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                command: command_line.clone(),
                source,
            })?;
        let pid = child.id();
        self.state = SupervisorState::Running { pid };
        info!(pid, command = %command_line, "launched child");

        #[cfg(unix)]
        let status = {
            relay.attach(nix::unistd::Pid::from_raw(pid as i32));
            wait_relaying(&mut child, &relay)?
        };
        #[cfg(not(unix))]
        let status = wait_relaying(&mut child)?;

        let code = exit_code(status);
        self.state = SupervisorState::Exited { code };

        if status.success() {
            info!(pid, code, "child exited");
        } else {
            warn!(pid, code, status = %status, "child exited unsuccessfully");
        }
        Ok(code)
    }
}

#[cfg(unix)]
fn wait_relaying(
    child: &mut Child,
    relay: &crate::signal::SignalRelay,
) -> Result<ExitStatus, SupervisorError> {
    loop {
        let status = child.try_wait().map_err(SupervisorError::Wait)?;

        for signal in relay.take_relayed() {
            info!(pid = child.id(), signal = ?signal, "relayed signal to child");
        }

        match status {
            Some(status) => return Ok(status),
            None => std::thread::sleep(POLL_INTERVAL),
        }
    }
}

#[cfg(not(unix))]
fn wait_relaying(child: &mut Child) -> Result<ExitStatus, SupervisorError> {
    child.wait().map_err(SupervisorError::Wait)
}

/// Exit code for a child status; death by signal N maps to 128 + N
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return SIGNAL_EXIT_BASE + signal;
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exec_from_value() {
        assert_eq!(ExecSpec::from_value(&Value::Null).unwrap(), None);
        assert_eq!(ExecSpec::from_value(&json!("  ")).unwrap(), None);
        assert_eq!(
            ExecSpec::from_value(&json!("nginx -g 'daemon off;'")).unwrap(),
            Some(ExecSpec::Shell("nginx -g 'daemon off;'".to_string()))
        );
        assert_eq!(
            ExecSpec::from_value(&json!(["sleep", 5])).unwrap(),
            Some(ExecSpec::Argv(vec!["sleep".to_string(), "5".to_string()]))
        );
    }

    #[test]
    fn test_exec_invalid() {
        assert!(ExecSpec::from_value(&json!([])).is_err());
        assert!(ExecSpec::from_value(&json!(["a", {"b": 1}])).is_err());
        assert!(ExecSpec::from_value(&json!(42)).is_err());
    }

    #[test]
    fn test_exec_from_config() {
        let config = Config::from_value(json!({"exec": "true"}), None).unwrap();
        assert_eq!(
            ExecSpec::from_config(&config).unwrap(),
            Some(ExecSpec::Shell("true".to_string()))
        );

        let config = Config::from_value(json!({"exec": "true", "no_exec": true}), None).unwrap();
        assert_eq!(ExecSpec::from_config(&config).unwrap(), None);

        let config = Config::from_value(Value::Null, None).unwrap();
        assert_eq!(ExecSpec::from_config(&config).unwrap(), None);
    }

    #[test]
    fn test_cli_exec_beats_common_override() {
        let mut config = Config::from_value(json!({"exec": "exit 3"}), None).unwrap();
        let common = confstage_namespace::Namespace::from_value(json!({"exec": "exit 4"})).unwrap();
        config.merge_common(&common, "file");

        let cli = ExecOverride {
            exec: Some("exit 5".to_string()),
            no_exec: false,
        };
        assert_eq!(
            ExecSpec::resolve(&cli, &config).unwrap(),
            Some(ExecSpec::Shell("exit 5".to_string()))
        );
        assert_eq!(
            ExecSpec::resolve(&ExecOverride::default(), &config).unwrap(),
            Some(ExecSpec::Shell("exit 4".to_string()))
        );
    }

    #[test]
    fn test_cli_no_exec_beats_common_override() {
        let mut config = Config::from_value(json!({"exec": "exit 3"}), None).unwrap();
        let common = confstage_namespace::Namespace::from_value(json!({"no_exec": false})).unwrap();
        config.merge_common(&common, "file");

        let cli = ExecOverride {
            exec: Some("exit 5".to_string()),
            no_exec: true,
        };
        assert_eq!(ExecSpec::resolve(&cli, &config).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_mapping() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        // raw wait status of a process killed by SIGTERM
        assert_eq!(exit_code(ExitStatus::from_raw(libc::SIGTERM)), 128 + libc::SIGTERM);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_propagates_exit_code() {
        let _guard = crate::signal::TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut supervisor = Supervisor::new(ExecSpec::Shell("exit 3".to_string()));
        assert_eq!(supervisor.state(), SupervisorState::Idle);

        assert_eq!(supervisor.run().unwrap(), 3);
        assert_eq!(supervisor.state(), SupervisorState::Exited { code: 3 });
    }

    #[cfg(unix)]
    #[test]
    fn test_run_argv() {
        let _guard = crate::signal::TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut supervisor = Supervisor::new(ExecSpec::Argv(vec!["true".to_string()]));
        assert_eq!(supervisor.run().unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_failure() {
        let _guard = crate::signal::TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut supervisor = Supervisor::new(ExecSpec::Argv(vec![
            "/nonexistent/confstage-child".to_string(),
        ]));
        assert!(matches!(supervisor.run(), Err(SupervisorError::Spawn { .. })));
        assert_eq!(supervisor.state(), SupervisorState::Launching);
    }
}
