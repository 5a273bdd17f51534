//! One client session, from greeting to commit or rollback.

use std::os::unix::net::UnixStream;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::audit::{sanitize_fields, AuditEntry, AuditLogger};
use crate::commands::{BrokerContext, CommandHandler, Outcome};
use crate::error::{DaemonError, Failure, ProtocolErrorKind};
use crate::protocol::{write_object, write_reply, LineEvent, LineReader, Reply, Request};

use super::metrics::ConnectionMetrics;
use super::peer::{peer_credentials, PeerInfo};

/// Everything a worker thread needs to serve connections.
pub(super) struct Shared {
    pub ctx: Arc<BrokerContext>,
    pub audit: Option<Arc<AuditLogger>>,
    pub metrics: Arc<ConnectionMetrics>,
    pub shutdown: Arc<AtomicBool>,
    pub read_timeout: Duration,
    pub idle_rounds: u32,
    pub max_line: usize,
}

/// Result of waiting for the next line.
enum Wait {
    Line(String),
    Closed,
    Timeout,
    Shutdown,
}

/// How a session with a live transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// `quit` or daemon shutdown: commit.
    Clean,
    /// The client went away or idled out: undo.
    Abandoned,
}

/// Serve one accepted connection to completion.
pub(super) fn serve_connection(stream: UnixStream, shared: &Shared) {
    shared.metrics.connection_opened();
    let peer = peer_credentials(&stream).unwrap_or_else(|e| {
        warn!(error = %e, "Could not read peer credentials");
        PeerInfo::default()
    });
    debug!(uid = peer.uid, gid = peer.gid, pid = peer.pid, "Connection accepted");

    match run_session(stream, shared, &peer) {
        Ok(()) => debug!(uid = peer.uid, "Connection closed"),
        Err(e) => warn!(uid = peer.uid, error = %e, "Connection ended with error"),
    }
    shared.metrics.connection_closed();
}

/// `hello <module>` yields the module name.
fn parse_greeting(line: &str) -> Option<&str> {
    let module = line.strip_prefix("hello ")?.trim();
    if module.is_empty() {
        None
    } else {
        Some(module)
    }
}

fn run_session(stream: UnixStream, shared: &Shared, peer: &PeerInfo) -> Result<(), DaemonError> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(shared.read_timeout))?;
    let mut reader = LineReader::new(stream, shared.max_line);

    let greeting = match await_line(&mut reader, shared)? {
        Wait::Line(line) => line,
        Wait::Closed => return Ok(()),
        Wait::Timeout => return Ok(write_reply(reader.get_mut(), &Reply::Timeout)?),
        Wait::Shutdown => return Ok(write_reply(reader.get_mut(), &Reply::Shutdown)?),
    };
    let Some(module) = parse_greeting(&greeting) else {
        debug!(line = %greeting, "Bad greeting");
        return Ok(write_reply(reader.get_mut(), &Reply::BadGreeting)?);
    };

    let mut handler = CommandHandler::new(Arc::clone(&shared.ctx), module);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        write_reply(reader.get_mut(), &Reply::Ok)
            .map_err(DaemonError::from)
            .and_then(|()| command_loop(&mut reader, &mut handler, shared, peer))
    }));
    let Ok(result) = outcome else {
        error!(module = %handler.module(), "Session panicked");
        abandon(&mut handler, shared);
        return Ok(());
    };

    match result {
        Ok(SessionEnd::Clean) => {
            handler.finish();
            Ok(())
        }
        Ok(SessionEnd::Abandoned) => {
            abandon(&mut handler, shared);
            Ok(())
        }
        Err(e) => {
            abandon(&mut handler, shared);
            Err(e)
        }
    }
}

fn abandon(handler: &mut CommandHandler, shared: &Shared) {
    info!(module = %handler.module(), "Session abandoned, rolling back");
    if let Err(failure) = handler.rollback() {
        warn!(module = %handler.module(), error = %failure.message, "Rollback failed");
    }
    shared.metrics.record_rollback();
}

fn command_loop(
    reader: &mut LineReader<UnixStream>,
    handler: &mut CommandHandler,
    shared: &Shared,
    peer: &PeerInfo,
) -> Result<SessionEnd, DaemonError> {
    loop {
        let line = match await_line(reader, shared)? {
            Wait::Line(line) => line,
            Wait::Closed => {
                debug!(module = %handler.module(), "Client disconnected without quit");
                return Ok(SessionEnd::Abandoned);
            }
            Wait::Timeout => {
                warn!(module = %handler.module(), rounds = shared.idle_rounds, "Session idle, dropping");
                write_reply(reader.get_mut(), &Reply::Timeout)?;
                return Err(DaemonError::Protocol {
                    kind: ProtocolErrorKind::IdleTimeout {
                        rounds: shared.idle_rounds,
                    },
                });
            }
            Wait::Shutdown => {
                if let Err(e) = write_reply(reader.get_mut(), &Reply::Shutdown) {
                    debug!(error = %e, "Could not announce shutdown");
                }
                return Ok(SessionEnd::Clean);
            }
        };

        let request = match Request::parse(&line) {
            Ok(request) => request,
            Err(e) => {
                debug!(module = %handler.module(), error = %e, "Unparseable request");
                write_reply(reader.get_mut(), &Reply::Err(Failure::syntax()))?;
                continue;
            }
        };

        let started = Instant::now();
        let result = handler.dispatch(&request);
        record(shared, handler, &request, peer, &result, started);

        match result {
            Ok(Outcome::Done) => write_reply(reader.get_mut(), &Reply::Ok)?,
            Ok(Outcome::Object(data)) => write_object(reader.get_mut(), &data)?,
            Ok(Outcome::Quit) => {
                if let Err(e) = write_reply(reader.get_mut(), &Reply::Ok) {
                    debug!(error = %e, "Could not acknowledge quit");
                }
                return Ok(SessionEnd::Clean);
            }
            Err(failure) => {
                info!(
                    module = %handler.module(),
                    verb = request.verb(),
                    code = failure.code.as_u32(),
                    error = %failure.message,
                    "Command failed"
                );
                write_reply(reader.get_mut(), &Reply::Err(failure))?;
            }
        }
    }
}

/// Book-keeping after every dispatched command.
fn record(
    shared: &Shared,
    handler: &CommandHandler,
    request: &Request,
    peer: &PeerInfo,
    result: &Result<Outcome, Failure>,
    started: Instant,
) {
    shared.metrics.record_command(result.is_ok());
    if matches!((request, result), (Request::Rollback, Ok(_))) {
        shared.metrics.record_rollback();
    }

    let Some(audit) = &shared.audit else {
        return;
    };
    let duration_ms = started.elapsed().as_millis() as u64;
    let entry = AuditEntry::new(
        handler.module(),
        handler.transaction_id(),
        request.verb(),
        sanitize_fields(&request.audit_fields()),
        peer,
    );
    let entry = match result {
        Ok(_) => entry.succeeded(duration_ms),
        Err(failure) => entry.failed(failure, duration_ms),
    };
    audit.record(&entry);
}

/// Wait for a non-empty line, counting idle read timeouts.
///
/// The shutdown flag is checked whenever a read times out.
fn await_line(reader: &mut LineReader<UnixStream>, shared: &Shared) -> Result<Wait, DaemonError> {
    let mut idle = 0u32;
    loop {
        match reader.next_event()? {
            LineEvent::Line(line) if line.trim().is_empty() => continue,
            LineEvent::Line(line) => return Ok(Wait::Line(line)),
            LineEvent::Closed => return Ok(Wait::Closed),
            LineEvent::Idle => {
                if shared.shutdown.load(Ordering::SeqCst) {
                    return Ok(Wait::Shutdown);
                }
                idle += 1;
                if idle >= shared.idle_rounds {
                    return Ok(Wait::Timeout);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{GroupEntry, StaticDirectory, UserDirectory, UserEntry};
    use crate::commands::testing::Fixture;
    use std::io::{BufRead, BufReader, Write};
    use std::thread;

    const POLICY: &str = r#"<module><authdops>
        <commandclasses><commandclass id="user"/></commandclasses>
    </authdops></module>"#;

    struct Session {
        client: BufReader<UnixStream>,
        server: thread::JoinHandle<()>,
    }

    impl Session {
        fn send(&mut self, line: &str) -> String {
            writeln!(self.client.get_mut(), "{}", line).unwrap();
            self.read()
        }

        fn read(&mut self) -> String {
            let mut reply = String::new();
            self.client.read_line(&mut reply).unwrap();
            reply.trim_end().to_string()
        }
    }

    fn exchange(client: &mut BufReader<UnixStream>, line: &str) -> String {
        writeln!(client.get_mut(), "{}", line).unwrap();
        let mut reply = String::new();
        client.read_line(&mut reply).unwrap();
        reply.trim_end().to_string()
    }

    fn shared(fixture: &Fixture, idle_rounds: u32) -> Arc<Shared> {
        shared_with(Arc::clone(&fixture.ctx), idle_rounds)
    }

    fn shared_with(ctx: Arc<BrokerContext>, idle_rounds: u32) -> Arc<Shared> {
        Arc::new(Shared {
            ctx,
            audit: None,
            metrics: Arc::new(ConnectionMetrics::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            read_timeout: Duration::from_millis(20),
            idle_rounds,
            max_line: 256,
        })
    }

    fn start(shared: &Arc<Shared>) -> Session {
        let (client, server) = UnixStream::pair().unwrap();
        let shared = Arc::clone(shared);
        let server = thread::spawn(move || serve_connection(server, &shared));
        Session {
            client: BufReader::new(client),
            server,
        }
    }

    #[test]
    fn test_greeting() {
        assert_eq!(parse_greeting("hello webmail"), Some("webmail"));
        assert_eq!(parse_greeting("hello "), None);
        assert_eq!(parse_greeting("helo webmail"), None);
        assert_eq!(parse_greeting("hellowebmail"), None);
    }

    #[test]
    fn test_quit_commits() {
        let fixture = Fixture::new(POLICY);
        let shared = shared(&fixture, 500);
        let mut session = start(&shared);

        assert_eq!(session.send("hello webmail"), "+OK");
        // Blank lines get no reply.
        session.client.get_mut().write_all(b"\n  \n").unwrap();
        assert_eq!(session.send("deleteuser jdoe"), "+OK");
        assert_eq!(session.send("bogus"), "-ERR:1:Unknown command");
        assert_eq!(session.send("deleteuser"), "-ERR:1:Unknown command");
        assert_eq!(session.send("quit"), "+OK");
        session.server.join().unwrap();

        let log = fixture.helper_log();
        assert_eq!(log.len(), 2);
        assert!(log[0].starts_with("remove-system-user "));
        assert!(log[1].starts_with("end-transaction "));
        assert_eq!(shared.metrics.commands_ok(), 2);
        assert_eq!(shared.metrics.active(), 0);
        assert_eq!(shared.metrics.rollbacks(), 0);
    }

    #[test]
    fn test_disconnect_rolls_back() {
        let fixture = Fixture::new(POLICY);
        let shared = shared(&fixture, 500);
        let mut session = start(&shared);

        assert_eq!(session.send("hello webmail"), "+OK");
        assert_eq!(session.send("createuser jdoe pw"), "+OK");
        drop(session.client);
        session.server.join().unwrap();

        let log = fixture.helper_log();
        assert!(log[0].starts_with("create-system-user "));
        assert!(log[1].starts_with("rollback-transaction "));
        assert_eq!(shared.metrics.rollbacks(), 1);
    }

    #[test]
    fn test_bad_greeting_closes() {
        let fixture = Fixture::new(POLICY);
        let shared = shared(&fixture, 500);
        let mut session = start(&shared);

        assert_eq!(session.send("hi there"), "-WTF?");
        assert_eq!(session.read(), "");
        session.server.join().unwrap();
        assert!(fixture.helper_log().is_empty());
    }

    #[test]
    fn test_idle_timeout_rolls_back() {
        let fixture = Fixture::new(POLICY);
        let shared = shared(&fixture, 3);
        let mut session = start(&shared);

        assert_eq!(session.send("hello webmail"), "+OK");
        assert_eq!(session.read(), "-TIMEOUT");
        session.server.join().unwrap();

        let log = fixture.helper_log();
        assert_eq!(log.len(), 1);
        assert!(log[0].starts_with("rollback-transaction "));
    }

    #[test]
    fn test_shutdown_commits() {
        let fixture = Fixture::new(POLICY);
        let shared = shared(&fixture, 500);
        let mut session = start(&shared);

        assert_eq!(session.send("hello webmail"), "+OK");
        shared.shutdown.store(true, Ordering::SeqCst);
        assert_eq!(session.read(), "-SHUTDOWN");
        session.server.join().unwrap();

        let log = fixture.helper_log();
        assert_eq!(log.len(), 1);
        assert!(log[0].starts_with("end-transaction "));
    }

    #[test]
    fn test_overlong_line_is_fault() {
        let fixture = Fixture::new(POLICY);
        let shared = shared(&fixture, 500);
        let mut session = start(&shared);

        assert_eq!(session.send("hello webmail"), "+OK");
        let long = format!("deletefile {}\n", "x".repeat(400));
        session.client.get_mut().write_all(long.as_bytes()).unwrap();
        session.server.join().unwrap();

        // The server hangs up without replying.
        let mut rest = String::new();
        let _ = session.client.read_line(&mut rest);
        assert!(rest.is_empty());

        assert!(fixture.helper_log()[0].starts_with("rollback-transaction "));
    }

    /// Delegates to a fixed directory but blows up on one user name.
    struct ExplodingDirectory(StaticDirectory);

    impl UserDirectory for ExplodingDirectory {
        fn user(&self, name: &str) -> Option<UserEntry> {
            if name == "kaboom" {
                panic!("lookup of {} failed", name);
            }
            self.0.user(name)
        }

        fn group(&self, name: &str) -> Option<GroupEntry> {
            self.0.group(name)
        }

        fn group_by_gid(&self, gid: u32) -> Option<GroupEntry> {
            self.0.group_by_gid(gid)
        }
    }

    #[test]
    fn test_panic_rolls_back_and_next_session_is_served() {
        let fixture = Fixture::new(
            r#"<module><authdops><scripts><script id="reindex"/></scripts></authdops></module>"#,
        );
        let (uid, gid) = fixture.own_ids();
        let directory = ExplodingDirectory(
            StaticDirectory::new().with_user("root", uid, gid, fixture.home("root")),
        );
        let ctx = Arc::new(BrokerContext::new(&fixture.settings, Arc::new(directory)));
        let shared = shared_with(ctx, 500);

        let (first, first_server) = UnixStream::pair().unwrap();
        let (second, second_server) = UnixStream::pair().unwrap();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || {
            serve_connection(first_server, &worker_shared);
            serve_connection(second_server, &worker_shared);
        });

        let mut first = BufReader::new(first);
        assert_eq!(exchange(&mut first, "hello webmail"), "+OK");
        assert_eq!(exchange(&mut first, "runuserscript kaboom reindex"), "");

        let mut second = BufReader::new(second);
        assert_eq!(exchange(&mut second, "hello webmail"), "+OK");
        assert_eq!(exchange(&mut second, "quit"), "+OK");
        worker.join().unwrap();

        let log = fixture.helper_log();
        assert_eq!(log.len(), 2);
        assert!(log[0].starts_with("rollback-transaction "));
        assert!(log[1].starts_with("end-transaction "));
        assert_eq!(shared.metrics.rollbacks(), 1);
        assert_eq!(shared.metrics.active(), 0);
    }
}
