//! Running helper scripts from the tools directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::accounts::UserDirectory;
use crate::error::{CommandResult, ErrorCode, Failure};
use crate::validation::is_safe_name;

use super::output::escape_output;
use super::subprocess::SubprocessBuilder;

const HELPER_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Spawns helper scripts under a chosen identity and interprets their exit.
pub struct ScriptRunner {
    tools_root: PathBuf,
    directory: Arc<dyn UserDirectory>,
    timeout: Option<Duration>,
}

impl ScriptRunner {
    pub fn new(
        tools_root: impl Into<PathBuf>,
        directory: Arc<dyn UserDirectory>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            tools_root: tools_root.into(),
            directory,
            timeout,
        }
    }

    /// Run `name` from the tools directory with `args`, as `user`.
    ///
    /// Returns the captured output on exit status 0.
    pub fn run(&self, name: &str, args: &[String], user: &str) -> CommandResult<String> {
        self.execute(name, args, user, false)
    }

    /// Same as [`run`](Self::run), but arguments are kept out of the logs.
    pub fn run_sensitive(&self, name: &str, args: &[String], user: &str) -> CommandResult<String> {
        self.execute(name, args, user, true)
    }

    fn execute(
        &self,
        name: &str,
        args: &[String],
        user: &str,
        sensitive: bool,
    ) -> CommandResult<String> {
        if !is_safe_name(name) {
            return Err(Failure::new(ErrorCode::InvalidScript, "Invalid script name"));
        }

        let path = self.tools_root.join(name);
        if !path.exists() {
            warn!(script = %name, path = %path.display(), "Helper script missing");
            return Err(Failure::not_found("Script file not found"));
        }

        let account = self
            .directory
            .user(user)
            .ok_or_else(|| Failure::not_found(format!("Unknown user: {}", user)))?;

        info!(script = %name, user = %user, argc = args.len(), "Running script");

        let mut builder = SubprocessBuilder::new(&path)
            .args(args)
            .identity(account.uid, account.gid)
            .clear_env()
            .env("PATH", HELPER_PATH)
            .env("HOME", &account.home.to_string_lossy())
            .env("USER", &account.name)
            .timeout(self.timeout)
            .sensitive(sensitive);
        if let Ok(lang) = std::env::var("LANG") {
            builder = builder.env("LANG", &lang);
        }

        let result = builder.run().map_err(|e| {
            warn!(script = %name, error = %e, "Failed to start script");
            Failure::command_failed(format!("Could not run script: {}", e))
        })?;

        if result.timed_out {
            return Err(Failure::new(
                ErrorCode::ScriptFailed,
                "Script timed out and was killed",
            ));
        }

        let output = result.combined_output();
        if !result.success {
            debug!(script = %name, exit_code = ?result.exit_code, "Script failed");
            return Err(Failure::new(ErrorCode::ScriptFailed, escape_output(&output)));
        }

        Ok(output)
    }
}
