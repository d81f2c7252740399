// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OS process launcher for worker runs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use engyne_config::model::SupervisorConfig;
use engyne_core::{EngyneError, LaunchSpec, WorkerExit, WorkerHandle, WorkerLauncher};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Spawns `<program> <args..> <slots_root> <slot_id> <run_id>`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Use `worker_command` from config, or this executable's `worker` subcommand.
    ///
    /// With `config_path` set, self-launched workers get `--config <path>`
    /// so they read the same file as the supervising process.
    pub fn from_config(config: &SupervisorConfig, config_path: Option<&Path>) -> Result<Self, EngyneError> {
        match &config.worker_command {
            Some(command) => Ok(Self::new(command, config.worker_args.clone())),
            None => {
                let exe = std::env::current_exe().map_err(|e| EngyneError::Worker {
                    message: "cannot resolve current executable".into(),
                    source: Some(Box::new(e)),
                })?;
                let mut args = Vec::new();
                if let Some(path) = config_path {
                    let path = std::path::absolute(path)?;
                    args.push("--config".to_string());
                    args.push(path.to_string_lossy().into_owned());
                }
                args.push("worker".to_string());
                args.extend(config.worker_args.iter().cloned());
                Ok(Self::new(exe, args))
            }
        }
    }

    fn command_args(&self, spec: &LaunchSpec) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        args.push(spec.slots_root.clone().into_os_string());
        args.push(spec.slot_id.as_str().into());
        args.push(spec.run_id.as_str().into());
        args
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn WorkerHandle>, EngyneError> {
        let child = Command::new(&self.program)
            .args(self.command_args(spec))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngyneError::Worker {
                message: format!("failed to spawn {}", self.program.display()),
                source: Some(Box::new(e)),
            })?;
        debug!(slot = %spec.slot_id, run_id = %spec.run_id, pid = ?child.id(), "worker spawned");
        Ok(Box::new(ProcessHandle {
            pid: child.id(),
            child,
        }))
    }
}

pub struct ProcessHandle {
    pid: Option<u32>,
    child: Child,
}

fn exit_of(status: ExitStatus) -> WorkerExit {
    WorkerExit {
        code: status.code(),
    }
}

fn reap_error(e: std::io::Error) -> EngyneError {
    EngyneError::Worker {
        message: "failed to reap worker".into(),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl WorkerHandle for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_wait(&mut self) -> Result<Option<WorkerExit>, EngyneError> {
        Ok(self.child.try_wait().map_err(reap_error)?.map(exit_of))
    }

    async fn terminate(&mut self, grace: Duration) -> Result<WorkerExit, EngyneError> {
        if let Some(status) = self.child.try_wait().map_err(reap_error)? {
            return Ok(exit_of(status));
        }
        if let Some(pid) = self.pid {
            send_sigterm(pid);
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => Ok(exit_of(status.map_err(reap_error)?)),
            Err(_) => {
                warn!(pid = ?self.pid, ?grace, "worker ignored SIGTERM, killing");
                self.kill().await?;
                Ok(WorkerExit { code: None })
            }
        }
    }

    async fn kill(&mut self) -> Result<(), EngyneError> {
        self.child.kill().await.map_err(reap_error)
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    // SAFETY: signalling a child we spawned and have not yet reaped.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {}

/// Whether a process with `pid` exists. EPERM counts as alive.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only checks for existence.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use engyne_core::SlotId;

    use super::*;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            slot_id: SlotId::parse("s1").unwrap(),
            run_id: "r1".into(),
            slots_root: "/tmp".into(),
        }
    }

    #[tokio::test]
    async fn sigterm_stops_a_sleeping_child() {
        // `sh -c 'sleep 30' <root> <slot> <run>`: the trailing args become $0.. for sh.
        let launcher = ProcessLauncher::new("sh", vec!["-c".into(), "sleep 30".into()]);
        let mut handle = launcher.launch(&spec()).await.unwrap();
        let pid = handle.pid().unwrap();
        assert!(pid_alive(pid));
        assert_eq!(handle.try_wait().unwrap(), None);

        let exit = handle.terminate(Duration::from_secs(5)).await.unwrap();
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn child_ignoring_sigterm_is_killed_after_grace() {
        let launcher = ProcessLauncher::new("sh", vec!["-c".into(), "trap '' TERM; sleep 30".into()]);
        let mut handle = launcher.launch(&spec()).await.unwrap();
        // Let the shell install its trap before signalling.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let exit = handle.terminate(Duration::from_millis(300)).await.unwrap();
        assert_eq!(exit, WorkerExit { code: None });
        assert!(handle.try_wait().unwrap().is_some());
    }

    #[test]
    fn self_launch_forwards_config_path() {
        let config = SupervisorConfig {
            worker_command: None,
            worker_args: vec!["--verbose".into()],
            ..SupervisorConfig::default()
        };
        let launcher = ProcessLauncher::from_config(&config, Some(Path::new("/srv/engyne.toml"))).unwrap();
        let args: Vec<String> = launcher
            .command_args(&spec())
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            ["--config", "/srv/engyne.toml", "worker", "--verbose", "/tmp", "s1", "r1"]
        );

        let launcher = ProcessLauncher::from_config(&config, None).unwrap();
        assert_eq!(launcher.command_args(&spec())[0], OsString::from("worker"));
    }

    #[test]
    fn custom_worker_command_is_used_verbatim() {
        let config = SupervisorConfig {
            worker_command: Some("/opt/engyne/worker".into()),
            worker_args: vec!["-q".into()],
            ..SupervisorConfig::default()
        };
        let launcher = ProcessLauncher::from_config(&config, Some(Path::new("/srv/engyne.toml"))).unwrap();
        assert_eq!(launcher.program, PathBuf::from("/opt/engyne/worker"));
        assert_eq!(launcher.command_args(&spec()), ["-q", "/tmp", "s1", "r1"].map(OsString::from));
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let launcher = ProcessLauncher::new("sh", vec!["-c".into(), "exit 3".into()]);
        let mut handle = launcher.launch(&spec()).await.unwrap();
        let mut exit = None;
        for _ in 0..500 {
            exit = handle.try_wait().unwrap();
            if exit.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(exit, Some(WorkerExit { code: Some(3) }));
    }

    #[tokio::test]
    async fn missing_program_is_a_worker_error() {
        let launcher = ProcessLauncher::new("/nonexistent/engyne-worker", Vec::new());
        let err = launcher.launch(&spec()).await.err().unwrap();
        assert!(matches!(err, EngyneError::Worker { .. }));
    }
}
