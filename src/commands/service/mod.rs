//! Service control commands.

mod control;
