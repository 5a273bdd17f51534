//! Input checks shared by the policy engine and the command handlers.

mod names;
mod path;

pub use names::{is_safe_name, is_valid_password};
pub use path::{first_symlink_below, has_parent_component, has_parent_reference};
