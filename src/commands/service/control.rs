//! Start, stop and reload services, and toggle their start at boot.
//!
//! Service changes take effect immediately and are not part of the
//! transaction, so the helpers get no transaction id.

use tracing::info;

use crate::error::{CommandResult, Failure};
use crate::protocol::ServiceAction;

use super::super::handler::CommandHandler;

impl CommandHandler {
    fn authorize_service(&self, service: &str) -> CommandResult {
        self.ctx
            .engine
            .authorize_service(&self.module, service)
            .map_err(|denial| Failure::policy(denial.to_string()))
    }

    pub(crate) fn control_service(&self, action: ServiceAction, service: &str) -> CommandResult {
        self.authorize_service(service)?;

        info!(module = %self.module, service = %service, action = action.as_str(), "Controlling service");
        self.helper(
            "control-service",
            vec![action.as_str().to_string(), service.to_string()],
        )
    }

    pub(crate) fn set_on_boot(&self, service: &str, enabled: bool) -> CommandResult {
        self.authorize_service(service)?;

        info!(module = %self.module, service = %service, enabled = enabled, "Setting start at boot");
        let flag = if enabled { "1" } else { "0" };
        self.helper(
            "control-service-boot",
            vec![service.to_string(), flag.to_string()],
        )
    }
}
