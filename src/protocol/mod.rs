//! Line protocol spoken on the broker socket.
//!
//! ## Wire Format
//!
//! ```text
//! C: hello <module>
//! S: +OK
//! C: installfile app.conf /etc/app
//! S: +OK
//! C: deletefile /etc/passwd
//! S: -ERR:4004:Destination file name does not match policy: ...
//! C: quit
//! S: +OK
//! ```

mod reply;
mod request;
mod tokenize;
mod wire;

pub use reply::Reply;
pub use request::{ParseError, Request, ServiceAction};
pub use tokenize::{split_quoted, TokenizeError};
pub use wire::{write_object, write_reply, LineEvent, LineReader};
