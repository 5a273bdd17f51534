//! Brokered commands.
//!
//! A [`CommandHandler`] belongs to one session. It carries the module name
//! from the greeting and the transaction every helper call is tagged with.
//! The individual verbs live in the submodules, grouped by what they touch.

mod context;
mod handler;

mod file;
mod service;
mod system;
mod user;

#[cfg(test)]
pub(crate) mod testing;

pub use context::BrokerContext;
pub use file::{create_owned_dir, DirectoryError};
pub use handler::{CommandHandler, Outcome};
