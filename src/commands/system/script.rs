//! `runscript` and `runuserscript`.

use tracing::info;

use crate::error::{CommandResult, Failure};

use super::super::handler::CommandHandler;

impl CommandHandler {
    /// Run a script the module declares, as the identity its policy allows.
    pub(crate) fn run_module_script(&self, script: &str, args: &[String], user: &str) -> CommandResult {
        let run_as = self
            .ctx
            .engine
            .authorize_script(&self.module, script, user)
            .map_err(|denial| Failure::policy(denial.to_string()))?;

        info!(module = %self.module, script = %script, user = %run_as, "Running module script");
        self.ctx.runner.run(script, args, &run_as).map(|_| ())
    }
}
