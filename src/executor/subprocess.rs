//! Direct execution of helper programs.
//!
//! Helpers are exec'd without a shell, optionally under another identity, and
//! both output streams are drained on background threads so a chatty helper
//! cannot stall on a full pipe.

use std::collections::HashMap;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::DaemonError;

/// Result of a subprocess execution.
#[derive(Debug, Clone)]
pub struct SubprocessResult {
    /// Whether the command exited successfully (exit code 0).
    pub success: bool,
    /// The exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Set when the process was killed for exceeding its timeout.
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl SubprocessResult {
    /// Stdout followed by stderr.
    pub fn combined_output(&self) -> String {
        let mut combined = self.stdout.clone();
        combined.push_str(&self.stderr);
        combined
    }
}

/// Builder for subprocess execution.
pub struct SubprocessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Option<Duration>,
    identity: Option<(u32, u32)>,
    clear_env: bool,
    /// If true, arguments will not be logged (for commands containing secrets)
    sensitive: bool,
}

impl SubprocessBuilder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout: None,
            identity: None,
            clear_env: false,
            sensitive: false,
        }
    }

    /// Mark this command as containing sensitive data (e.g., passwords).
    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Kill the process if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run as `uid`/`gid`. Ignored when it matches the daemon's own identity.
    pub fn identity(mut self, uid: u32, gid: u32) -> Self {
        self.identity = Some((uid, gid));
        self
    }

    /// Clear the environment before running (then add only specified env vars).
    pub fn clear_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    /// Spawn the process and wait for it to finish.
    ///
    /// Only a failure to start the process is an error; a non-zero exit or a
    /// timeout is reported through the result.
    pub fn run(self) -> Result<SubprocessResult, DaemonError> {
        if self.sensitive {
            debug!(
                program = %self.program.display(),
                args = "[REDACTED]",
                "Executing subprocess (sensitive)"
            );
        } else {
            debug!(
                program = %self.program.display(),
                args = ?self.args,
                "Executing subprocess"
            );
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        if self.clear_env {
            cmd.env_clear();
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some((uid, gid)) = self.identity {
            let current_uid = nix::unistd::geteuid().as_raw();
            let current_gid = nix::unistd::getegid().as_raw();
            if uid != current_uid || gid != current_gid {
                cmd.gid(gid);
                cmd.uid(uid);
            }
        }

        let start = Instant::now();
        let mut child = cmd.spawn()?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let mut timed_out = false;
        let status = match self.timeout {
            None => child.wait()?,
            Some(limit) => {
                let poll_interval = Duration::from_millis(50);
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if start.elapsed() > limit {
                        warn!(
                            program = %self.program.display(),
                            timeout_secs = limit.as_secs(),
                            "Process timed out, killing"
                        );
                        if let Err(e) = child.kill() {
                            warn!(error = %e, "Failed to kill timed-out process");
                        }
                        timed_out = true;
                        break child.wait()?;
                    }
                    thread::sleep(poll_interval);
                }
            }
        };

        let result = SubprocessResult {
            success: status.success() && !timed_out,
            exit_code: status.code(),
            timed_out,
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        debug!(
            success = result.success,
            exit_code = ?result.exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "Subprocess completed"
        );
        Ok(result)
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buffer) {
            warn!(error = %e, "Failed to read subprocess output");
        }
        buffer
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_echo() {
        let result = SubprocessBuilder::new("echo")
            .args(["hello", "world"])
            .run()
            .unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello world");
    }

    #[test]
    fn test_run_false_command() {
        let result = SubprocessBuilder::new("false").run().unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(1));
    }

    #[test]
    fn test_combined_output() {
        let result = SubprocessBuilder::new("sh")
            .args(["-c", "echo out; echo err >&2; exit 3"])
            .run()
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.combined_output(), "out\nerr\n");
    }

    #[test]
    fn test_clear_env() {
        let result = SubprocessBuilder::new("/bin/sh")
            .args(["-c", "echo \"[$AUTHD_TEST_VAR][$KEPT]\""])
            .clear_env()
            .env("KEPT", "yes")
            .run()
            .unwrap();
        assert_eq!(result.stdout.trim(), "[][yes]");
    }

    #[test]
    fn test_large_output_does_not_block() {
        let result = SubprocessBuilder::new("sh")
            .args(["-c", "i=0; while [ $i -lt 20000 ]; do echo line-$i >&2; i=$((i+1)); done"])
            .run()
            .unwrap();
        assert!(result.success);
        assert!(result.stderr.lines().count() >= 20000);
    }

    #[test]
    fn test_timeout_kills_process() {
        let result = SubprocessBuilder::new("sleep")
            .arg("5")
            .timeout(Some(Duration::from_millis(100)))
            .run()
            .unwrap();
        assert!(result.timed_out);
        assert!(!result.success);
    }

    #[test]
    fn test_same_identity_is_noop() {
        let uid = nix::unistd::geteuid().as_raw();
        let gid = nix::unistd::getegid().as_raw();
        let result = SubprocessBuilder::new("true").identity(uid, gid).run().unwrap();
        assert!(result.success);
    }

    #[test]
    fn test_identity_switch_drops_supplementary_groups() {
        if !nix::unistd::geteuid().is_root() {
            // Switching identity needs root.
            return;
        }
        let result = SubprocessBuilder::new("id")
            .arg("-G")
            .identity(65534, 65534)
            .run()
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "65534");
    }

    #[test]
    fn test_nonexistent_command() {
        let result = SubprocessBuilder::new("nonexistent_command_12345").run();
        assert!(matches!(result, Err(DaemonError::Io(_))));
    }
}
