//! `osupdate`: ask the software update service to start a run.

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{CommandResult, Failure};

use super::super::handler::CommandHandler;

const UPDATE_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

impl CommandHandler {
    pub(crate) fn trigger_update(&self) -> CommandResult {
        self.ctx
            .engine
            .authorize_command(&self.module, "osupdate", "")
            .map_err(|denial| Failure::policy(denial.to_string()))?;

        let socket = &self.ctx.update_socket;
        info!(module = %self.module, socket = %socket.display(), "Triggering software update");

        match request_update(socket) {
            Ok(line) if line.starts_with('+') => Ok(()),
            Ok(line) => {
                warn!(reply = %line.trim_end(), "Update service refused the trigger");
                Err(Failure::command_failed("Software update trigger failed"))
            }
            Err(e) => {
                warn!(socket = %socket.display(), error = %e, "Could not reach update service");
                Err(Failure::command_failed("Software update trigger failed"))
            }
        }
    }
}

/// Send one `update` request and return the reply line.
fn request_update(socket: &Path) -> io::Result<String> {
    let mut stream = UnixStream::connect(socket)?;
    stream.set_read_timeout(Some(UPDATE_REPLY_TIMEOUT))?;
    stream.write_all(b"update\n")?;
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line)?;
    Ok(line)
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::UnixListener;
    use std::thread;

    use crate::commands::testing::Fixture;
    use crate::error::ErrorCode;

    const POLICY: &str = r#"<module><authdops>
        <commands><command id="osupdate"/></commands>
    </authdops></module>"#;

    fn serve_once(fixture: &Fixture, reply: &'static str) -> thread::JoinHandle<String> {
        let listener = UnixListener::bind(&fixture.settings.paths.update_socket).unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = String::new();
            BufReader::new(&stream).read_line(&mut request).unwrap();
            stream.write_all(reply.as_bytes()).unwrap();
            request
        })
    }

    #[test]
    fn test_update_accepted() {
        let fixture = Fixture::new(POLICY);
        let server = serve_once(&fixture, "+OK\n");
        fixture.handler().trigger_update().unwrap();
        assert_eq!(server.join().unwrap(), "update\n");
    }

    #[test]
    fn test_update_refused() {
        let fixture = Fixture::new(POLICY);
        let server = serve_once(&fixture, "-ERR busy\n");
        let failure = fixture.handler().trigger_update().unwrap_err();
        assert_eq!(failure.code, ErrorCode::CommandFailed);
        assert_eq!(failure.message, "Software update trigger failed");
        server.join().unwrap();
    }

    #[test]
    fn test_update_service_down() {
        let fixture = Fixture::new(POLICY);
        let failure = fixture.handler().trigger_update().unwrap_err();
        assert_eq!(failure.message, "Software update trigger failed");
    }

    #[test]
    fn test_update_requires_command() {
        let fixture = Fixture::new("<module><authdops></authdops></module>");
        let failure = fixture.handler().trigger_update().unwrap_err();
        assert_eq!(failure.code, ErrorCode::Policy);
    }
}
