//! Shared state every command handler works against.

use std::path::PathBuf;
use std::sync::Arc;

use crate::accounts::UserDirectory;
use crate::config::Settings;
use crate::executor::ScriptRunner;
use crate::policy::{PolicyEngine, PolicyStore};

/// Long-lived collaborators, built once and shared by all workers.
pub struct BrokerContext {
    pub engine: PolicyEngine,
    pub runner: ScriptRunner,
    pub directory: Arc<dyn UserDirectory>,
    /// Group whose members may receive files and directories in their home.
    pub panel_users_group: String,
    pub update_socket: PathBuf,
}

impl BrokerContext {
    pub fn new(settings: &Settings, directory: Arc<dyn UserDirectory>) -> Self {
        let store = Arc::new(PolicyStore::new(
            &settings.paths.module_root,
            settings.policy.cache_ttl(),
        ));
        let engine = PolicyEngine::new(
            store,
            Arc::clone(&directory),
            &settings.paths.staging_root,
            &settings.policy.staging_user,
            &settings.policy.staging_group,
        );
        let runner = ScriptRunner::new(
            &settings.paths.tools_root,
            Arc::clone(&directory),
            settings.limits.script_timeout(),
        );

        Self {
            engine,
            runner,
            directory,
            panel_users_group: settings.policy.panel_users_group.clone(),
            update_socket: settings.paths.update_socket.clone(),
        }
    }

    /// The policy cache behind the engine.
    pub fn policies(&self) -> &Arc<PolicyStore> {
        self.engine.store()
    }
}
