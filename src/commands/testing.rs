//! Scratch broker used by the command tests.
//!
//! Every helper script just appends its name and arguments to a log file, and
//! every account the tests use maps to the identity running the tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::accounts::StaticDirectory;
use crate::config::Settings;

use super::{BrokerContext, CommandHandler};

pub(crate) const MODULE: &str = "webmail";

const HELPERS: &[&str] = &[
    "install-single-file",
    "remove-single-file",
    "remove-directory",
    "end-transaction",
    "rollback-transaction",
    "create-system-user",
    "remove-system-user",
    "change-system-usershell",
    "change-user-password",
    "change-user-quota",
    "control-service",
    "control-service-boot",
    "reindex",
];

pub(crate) struct Fixture {
    temp: TempDir,
    pub settings: Settings,
    pub ctx: Arc<BrokerContext>,
}

impl Fixture {
    /// Build a broker whose `webmail` module carries `policy`.
    ///
    /// `@ROOT@` in the document is replaced with the scratch directory.
    pub fn new(policy: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let (uid, gid) = own_ids();

        let mut settings = Settings::default();
        settings.paths.module_root = root.join("modules");
        settings.paths.staging_root = root.join("staging");
        settings.paths.tools_root = root.join("tools");
        settings.paths.update_socket = root.join("swupd.sock");
        settings.audit.enabled = false;

        let module_dir = settings.paths.module_root.join(format!("{}.module", MODULE));
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(
            module_dir.join("module.xml"),
            policy.replace("@ROOT@", &root.to_string_lossy()),
        )
        .unwrap();
        std::fs::create_dir_all(settings.paths.staging_root.join(MODULE)).unwrap();
        std::fs::create_dir_all(&settings.paths.tools_root).unwrap();

        let log = root.join("helpers.log");
        for name in HELPERS {
            write_script(
                &settings.paths.tools_root.join(name),
                &format!("echo \"{} $*\" >> '{}'\n", name, log.display()),
            );
        }
        write_script(
            &settings.paths.tools_root.join("broken"),
            "echo \"boom: $1\"\nexit 3\n",
        );

        for user in ["alice", "bob"] {
            std::fs::create_dir_all(root.join("home").join(user)).unwrap();
        }

        let directory = StaticDirectory::new()
            .with_user("root", uid, gid, root.join("home/root"))
            .with_user("opencore", uid, gid, root.join("home/opencore"))
            .with_user("www", uid, gid, root.join("home/www"))
            .with_user("alice", uid, gid, root.join("home/alice"))
            .with_user("bob", uid, gid, root.join("home/bob"))
            .with_user("svc", 54321, 54321, root.join("home/svc"))
            .with_group("opencore", gid, &[])
            .with_group("paneluser", 4242, &["alice"]);

        let ctx = Arc::new(BrokerContext::new(&settings, Arc::new(directory)));
        Self {
            temp,
            settings,
            ctx,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn home(&self, user: &str) -> PathBuf {
        self.root().join("home").join(user)
    }

    pub fn own_ids(&self) -> (u32, u32) {
        own_ids()
    }

    pub fn handler(&self) -> CommandHandler {
        CommandHandler::new(Arc::clone(&self.ctx), MODULE)
    }

    /// Put a file into the module's staging area.
    pub fn stage(&self, name: &str, content: &str) -> PathBuf {
        let path = self.settings.paths.staging_root.join(MODULE).join(name);
        std::fs::write(&path, content).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        path
    }

    /// Lines written by helper scripts so far.
    pub fn helper_log(&self) -> Vec<String> {
        std::fs::read_to_string(self.root().join("helpers.log"))
            .map(|content| content.lines().map(String::from).collect())
            .unwrap_or_default()
    }
}

fn own_ids() -> (u32, u32) {
    (
        nix::unistd::geteuid().as_raw(),
        nix::unistd::getegid().as_raw(),
    )
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}
