// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Child process management.
//!
//! The wrapped server is bound to the gateway's lifetime: on Linux the
//! kernel kills it when the gateway dies, on Windows it lives in a
//! kill-on-close job object.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[cfg(windows)]
use win32job::Job;

use crate::engine_core::errors::GatewayError;
use crate::mcp::transport::{BoxedReader, BoxedWriter};

/// Piped standard streams of the child.
pub struct ChildIo {
    pub stdin: BoxedWriter,
    pub stdout: BoxedReader,
    pub stderr: Option<BoxedReader>,
}

pub struct ProcessSupervisor {
    child: Child,
    command: String,
    // Keep job object alive (Windows only)
    #[cfg(windows)]
    _job: Option<Job>,
}

impl ProcessSupervisor {
    pub fn spawn(cmd: &str, args: &[String]) -> Result<(Self, ChildIo), GatewayError> {
        debug!("ProcessSupervisor: spawning '{}' with args {:?}", cmd, args);
        let spawn_err = |reason: String| GatewayError::ChildProcessSpawn {
            command: cmd.to_string(),
            reason,
        };

        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "linux")]
        // SAFETY: prctl(PR_SET_PDEATHSIG) is async-signal-safe and touches no
        // memory shared with the parent.
        unsafe {
            command.pre_exec(|| {
                let ret = libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
                if ret != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        #[cfg(windows)]
        let job = {
            let job = Job::create().map_err(|e| spawn_err(format!("job object: {}", e)))?;
            let mut limits = job
                .query_extended_limit_info()
                .map_err(|e| spawn_err(format!("job object: {}", e)))?;
            limits.limit_kill_on_job_close();
            job.set_extended_limit_info(&limits)
                .map_err(|e| spawn_err(format!("job object: {}", e)))?;
            Some(job)
        };

        let mut child = command.spawn().map_err(|e| spawn_err(e.to_string()))?;

        #[cfg(windows)]
        if let Some(ref job) = job {
            if let Some(handle) = child.raw_handle() {
                job.assign_process(handle as isize)
                    .map_err(|e| spawn_err(format!("job assignment: {}", e)))?;
            }
        }

        let stdin = child
            .stdin
            .take()
            .map(|s| Box::new(s) as BoxedWriter)
            .ok_or_else(|| spawn_err("stdin was not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .map(|s| Box::new(s) as BoxedReader)
            .ok_or_else(|| spawn_err("stdout was not piped".to_string()))?;
        let stderr = child.stderr.take().map(|s| Box::new(s) as BoxedReader);

        info!(pid = child.id().unwrap_or(0), "Started server process '{}'", cmd);

        Ok((
            Self {
                child,
                command: cmd.to_string(),
                #[cfg(windows)]
                _job: job,
            },
            ChildIo {
                stdin,
                stdout,
                stderr,
            },
        ))
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Stop the child and reap it, returning its exit code.
    ///
    /// The caller has already closed the child's stdin. The child gets
    /// `grace` to exit on its own, then SIGTERM (Unix) and another `grace`,
    /// then it is killed.
    pub async fn shutdown(&mut self, grace: Duration) -> i32 {
        if let Some(code) = self.wait_for(grace).await {
            return code;
        }

        if self.terminate() {
            if let Some(code) = self.wait_for(grace).await {
                return code;
            }
        }

        warn!("Server process '{}' did not exit, killing it", self.command);
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill server process: {}", e);
        }
        match self.child.wait().await {
            Ok(status) => exit_code(status),
            Err(_) => 1,
        }
    }

    async fn wait_for(&mut self, grace: Duration) -> Option<i32> {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(?status, "Server process exited");
                Some(exit_code(status))
            }
            Ok(Err(e)) => {
                warn!("Failed to wait for server process: {}", e);
                Some(1)
            }
            Err(_) => None,
        }
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    fn terminate(&self) -> bool {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return false;
        };
        debug!(pid, "Sending SIGTERM to server process");
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn terminate(&self) -> bool {
        false
    }
}

/// Exit status as a process exit code; 1 when the child died from a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let err = ProcessSupervisor::spawn("/definitely/not/a/binary", &[])
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::ChildProcessSpawn { .. }));
    }

    #[tokio::test]
    async fn test_exit_code_is_propagated() {
        let (mut sup, io) =
            ProcessSupervisor::spawn("sh", &["-c".to_string(), "exit 3".to_string()]).unwrap();
        drop(io);
        assert_eq!(sup.shutdown(Duration::from_secs(5)).await, 3);
    }

    #[tokio::test]
    async fn test_stubborn_child_is_terminated() {
        let (mut sup, io) =
            ProcessSupervisor::spawn("sleep", &["30".to_string()]).unwrap();
        drop(io);
        assert_eq!(sup.shutdown(Duration::from_millis(100)).await, 1);
    }
}
