//! Helper execution.
//!
//! Privileged mutations are never done by interpreting client input; they are
//! delegated to fixed-purpose scripts in the tools directory.

mod output;
mod scripts;
mod subprocess;

pub use output::escape_output;
pub use scripts::ScriptRunner;
pub use subprocess::{SubprocessBuilder, SubprocessResult};
