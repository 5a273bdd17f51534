//! Per-session command dispatch and transaction bookkeeping.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CommandResult, Failure};
use crate::protocol::Request;

use super::context::BrokerContext;

/// What the session loop should do after a command succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Reply `+OK`.
    Done,
    /// Send the object bytes instead of a status line.
    Object(Vec<u8>),
    /// Reply `+OK` and end the session cleanly.
    Quit,
}

/// Executes requests for one connection under one transaction.
pub struct CommandHandler {
    pub(super) ctx: Arc<BrokerContext>,
    pub(super) module: String,
    transaction_id: Option<String>,
}

impl CommandHandler {
    /// Bind a new transaction to `module`.
    pub fn new(ctx: Arc<BrokerContext>, module: &str) -> Self {
        let transaction_id = Uuid::new_v4().to_string();
        info!(module = %module, transaction_id = %transaction_id, "Started transaction");
        Self {
            ctx,
            module: module.to_string(),
            transaction_id: Some(transaction_id),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn dispatch(&mut self, request: &Request) -> CommandResult<Outcome> {
        match request {
            Request::InstallFile { file, dest_dir } => self.install_file(file, dest_dir)?,
            Request::InstallUserFile {
                file,
                dest_path,
                user,
            } => self.install_user_file(file, dest_path, user)?,
            Request::DeleteFile { path } => self.delete_file(path)?,
            Request::DeleteDir { path } => self.delete_dir(path)?,
            Request::MakeDir { path } => self.make_dir(path)?,
            Request::MakeUserDir { user, mode, path } => self.make_user_dir(path, user, *mode)?,
            Request::CreateUser { user, password } => self.create_user(user, password)?,
            Request::DeleteUser { user } => self.delete_user(user)?,
            Request::SetUserShell { user, shell } => self.set_user_shell(user, shell)?,
            Request::SetUserPass { user, password } => self.set_user_pass(user, password)?,
            Request::SetQuota { user, soft, hard } => self.set_quota(user, *soft, *hard)?,
            Request::Service { action, service } => self.control_service(*action, service)?,
            Request::SetOnBoot { service, enabled } => self.set_on_boot(service, *enabled)?,
            Request::RunScript { script, args } => self.run_module_script(script, args, "root")?,
            Request::RunUserScript { user, script, args } => {
                self.run_module_script(script, args, user)?
            }
            Request::Rollback => self.rollback()?,
            Request::GetObject { alias } => return self.get_object(alias).map(Outcome::Object),
            Request::OsUpdate => self.trigger_update()?,
            Request::Quit => return Ok(Outcome::Quit),
        }
        Ok(Outcome::Done)
    }

    /// Commit: run `end-transaction` and forget the id.
    ///
    /// Does nothing once the transaction has been finished.
    pub fn finish(&mut self) {
        let Some(id) = self.transaction_id.take() else {
            return;
        };
        if let Err(failure) = self.helper("end-transaction", vec![id.clone()]) {
            warn!(
                module = %self.module,
                transaction_id = %id,
                error = %failure.message,
                "end-transaction failed"
            );
        }
        info!(module = %self.module, transaction_id = %id, "Closed transaction");
    }

    /// Undo the work done so far by running `rollback-transaction`.
    ///
    /// May be called more than once; fails with `NotFound` once the
    /// transaction has been finished.
    pub fn rollback(&mut self) -> CommandResult {
        let id = self
            .transaction_id
            .clone()
            .ok_or_else(|| Failure::not_found("No active transaction"))?;
        info!(module = %self.module, transaction_id = %id, "Rolling back transaction");
        self.helper("rollback-transaction", vec![id])
    }

    /// Argument vector starting with the transaction id.
    pub(super) fn transaction_args(&self, rest: &[&str]) -> Vec<String> {
        let mut args = Vec::with_capacity(rest.len() + 1);
        args.push(self.transaction_id.clone().unwrap_or_default());
        args.extend(rest.iter().map(|s| s.to_string()));
        args
    }

    /// Run a tools-directory helper as root, discarding its output.
    pub(super) fn helper(&self, script: &str, args: Vec<String>) -> CommandResult {
        self.ctx.runner.run(script, &args, "root").map(|_| ())
    }

    /// Like [`helper`](Self::helper), for arguments that must stay out of logs.
    pub(super) fn sensitive_helper(&self, script: &str, args: Vec<String>) -> CommandResult {
        self.ctx.runner.run_sensitive(script, &args, "root").map(|_| ())
    }
}
