//! Module scripts, object reads and the software update trigger.

mod object;
mod script;
mod update;
