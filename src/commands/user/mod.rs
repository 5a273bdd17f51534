//! System account commands.

mod account;
