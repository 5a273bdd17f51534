//! Typed client requests.

use std::fmt;

use crate::policy::parse_perms;

use super::tokenize::split_quoted;

/// Service control actions understood by `control-service`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Reload,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Reload => "reload",
        }
    }
}

/// One command line after the greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    InstallFile { file: String, dest_dir: String },
    InstallUserFile { file: String, dest_path: String, user: String },
    DeleteFile { path: String },
    DeleteDir { path: String },
    MakeDir { path: String },
    MakeUserDir { user: String, mode: u32, path: String },
    CreateUser { user: String, password: String },
    DeleteUser { user: String },
    SetUserShell { user: String, shell: String },
    SetUserPass { user: String, password: String },
    SetQuota { user: String, soft: u64, hard: u64 },
    Service { action: ServiceAction, service: String },
    SetOnBoot { service: String, enabled: bool },
    RunScript { script: String, args: Vec<String> },
    RunUserScript { user: String, script: String, args: Vec<String> },
    Rollback,
    GetObject { alias: String },
    OsUpdate,
    Quit,
}

/// A line that does not form a known request.
///
/// Unknown verbs, wrong argument counts, untypable arguments and broken
/// quoting are all reported the same way on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub verb: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized request '{}'", self.verb)
    }
}

impl std::error::Error for ParseError {}

impl Request {
    /// Parse a non-empty command line.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let fail = |verb: &str| ParseError {
            verb: verb.to_string(),
        };

        let mut tokens = split_quoted(line).map_err(|_| fail(first_word(line)))?;
        if tokens.is_empty() {
            return Err(fail(""));
        }
        let verb = tokens.remove(0);
        let args = tokens;

        let exact = |n: usize| -> Result<(), ParseError> {
            if args.len() == n {
                Ok(())
            } else {
                Err(fail(&verb))
            }
        };

        let request = match verb.as_str() {
            "installfile" => {
                exact(2)?;
                let [file, dest_dir] = take::<2>(args);
                Request::InstallFile { file, dest_dir }
            }
            "installuserfile" => {
                exact(3)?;
                let [file, dest_path, user] = take::<3>(args);
                Request::InstallUserFile {
                    file,
                    dest_path,
                    user,
                }
            }
            "deletefile" => {
                exact(1)?;
                let [path] = take::<1>(args);
                Request::DeleteFile { path }
            }
            "deletedir" => {
                exact(1)?;
                let [path] = take::<1>(args);
                Request::DeleteDir { path }
            }
            "makedir" => {
                exact(1)?;
                let [path] = take::<1>(args);
                Request::MakeDir { path }
            }
            "makeuserdir" => {
                exact(3)?;
                let [user, mode, path] = take::<3>(args);
                let mode = parse_perms(&mode).ok_or_else(|| fail(&verb))?;
                Request::MakeUserDir { user, mode, path }
            }
            "createuser" => {
                exact(2)?;
                let [user, password] = take::<2>(args);
                Request::CreateUser { user, password }
            }
            "deleteuser" => {
                exact(1)?;
                let [user] = take::<1>(args);
                Request::DeleteUser { user }
            }
            "setusershell" => {
                exact(2)?;
                let [user, shell] = take::<2>(args);
                Request::SetUserShell { user, shell }
            }
            "setuserpass" => {
                exact(2)?;
                let [user, password] = take::<2>(args);
                Request::SetUserPass { user, password }
            }
            "setquota" => {
                exact(3)?;
                let [user, soft, hard] = take::<3>(args);
                let soft = soft.parse().map_err(|_| fail(&verb))?;
                let hard = hard.parse().map_err(|_| fail(&verb))?;
                Request::SetQuota { user, soft, hard }
            }
            "startservice" | "stopservice" | "reloadservice" => {
                exact(1)?;
                let action = match verb.as_str() {
                    "startservice" => ServiceAction::Start,
                    "stopservice" => ServiceAction::Stop,
                    _ => ServiceAction::Reload,
                };
                let [service] = take::<1>(args);
                Request::Service { action, service }
            }
            "setonboot" => {
                exact(2)?;
                let [service, flag] = take::<2>(args);
                Request::SetOnBoot {
                    service,
                    enabled: flag == "1",
                }
            }
            "runscript" => {
                if args.is_empty() {
                    return Err(fail(&verb));
                }
                let mut args = args;
                let script = args.remove(0);
                Request::RunScript { script, args }
            }
            "runuserscript" => {
                if args.len() < 2 {
                    return Err(fail(&verb));
                }
                let mut args = args;
                let user = args.remove(0);
                let script = args.remove(0);
                Request::RunUserScript { user, script, args }
            }
            "rollback" => {
                exact(0)?;
                Request::Rollback
            }
            "getobject" => {
                exact(1)?;
                let [alias] = take::<1>(args);
                Request::GetObject { alias }
            }
            "osupdate" => {
                exact(0)?;
                Request::OsUpdate
            }
            "quit" => {
                exact(0)?;
                Request::Quit
            }
            _ => return Err(fail(&verb)),
        };

        Ok(request)
    }

    /// The wire verb.
    pub fn verb(&self) -> &'static str {
        match self {
            Request::InstallFile { .. } => "installfile",
            Request::InstallUserFile { .. } => "installuserfile",
            Request::DeleteFile { .. } => "deletefile",
            Request::DeleteDir { .. } => "deletedir",
            Request::MakeDir { .. } => "makedir",
            Request::MakeUserDir { .. } => "makeuserdir",
            Request::CreateUser { .. } => "createuser",
            Request::DeleteUser { .. } => "deleteuser",
            Request::SetUserShell { .. } => "setusershell",
            Request::SetUserPass { .. } => "setuserpass",
            Request::SetQuota { .. } => "setquota",
            Request::Service {
                action: ServiceAction::Start,
                ..
            } => "startservice",
            Request::Service {
                action: ServiceAction::Stop,
                ..
            } => "stopservice",
            Request::Service {
                action: ServiceAction::Reload,
                ..
            } => "reloadservice",
            Request::SetOnBoot { .. } => "setonboot",
            Request::RunScript { .. } => "runscript",
            Request::RunUserScript { .. } => "runuserscript",
            Request::Rollback => "rollback",
            Request::GetObject { .. } => "getobject",
            Request::OsUpdate => "osupdate",
            Request::Quit => "quit",
        }
    }

    /// Arguments as `(name, value)` pairs for the audit trail.
    pub fn audit_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Request::InstallFile { file, dest_dir } => {
                vec![("file", file.clone()), ("dest_dir", dest_dir.clone())]
            }
            Request::InstallUserFile {
                file,
                dest_path,
                user,
            } => vec![
                ("file", file.clone()),
                ("dest_path", dest_path.clone()),
                ("user", user.clone()),
            ],
            Request::DeleteFile { path }
            | Request::DeleteDir { path }
            | Request::MakeDir { path } => vec![("path", path.clone())],
            Request::MakeUserDir { user, mode, path } => vec![
                ("user", user.clone()),
                ("mode", format!("{:o}", mode)),
                ("path", path.clone()),
            ],
            Request::CreateUser { user, password } | Request::SetUserPass { user, password } => {
                vec![("user", user.clone()), ("password", password.clone())]
            }
            Request::DeleteUser { user } => vec![("user", user.clone())],
            Request::SetUserShell { user, shell } => {
                vec![("user", user.clone()), ("shell", shell.clone())]
            }
            Request::SetQuota { user, soft, hard } => vec![
                ("user", user.clone()),
                ("soft", soft.to_string()),
                ("hard", hard.to_string()),
            ],
            Request::Service { service, .. } => vec![("service", service.clone())],
            Request::SetOnBoot { service, enabled } => {
                vec![("service", service.clone()), ("enabled", enabled.to_string())]
            }
            Request::RunScript { script, args } => {
                vec![("script", script.clone()), ("args", args.join(" "))]
            }
            Request::RunUserScript { user, script, args } => vec![
                ("user", user.clone()),
                ("script", script.clone()),
                ("args", args.join(" ")),
            ],
            Request::GetObject { alias } => vec![("alias", alias.clone())],
            Request::Rollback | Request::OsUpdate | Request::Quit => Vec::new(),
        }
    }
}

fn first_word(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

/// Move a vector whose length was already checked into an array.
fn take<const N: usize>(args: Vec<String>) -> [String; N] {
    let mut iter = args.into_iter();
    std::array::from_fn(|_| iter.next().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installfile() {
        assert_eq!(
            Request::parse("installfile app.conf /etc/app").unwrap(),
            Request::InstallFile {
                file: "app.conf".to_string(),
                dest_dir: "/etc/app".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_quoted_password() {
        assert_eq!(
            Request::parse("createuser bob \"two words\"").unwrap(),
            Request::CreateUser {
                user: "bob".to_string(),
                password: "two words".to_string(),
            }
        );
    }

    #[test]
    fn test_wrong_argument_count() {
        assert!(Request::parse("installfile app.conf").is_err());
        assert!(Request::parse("deletefile a b").is_err());
        assert!(Request::parse("quit now").is_err());
        assert!(Request::parse("rollback 1").is_err());
        assert!(Request::parse("runscript").is_err());
        assert!(Request::parse("runuserscript bob").is_err());
    }

    #[test]
    fn test_unknown_verb() {
        let err = Request::parse("format /dev/sda").unwrap_err();
        assert_eq!(err.verb, "format");
    }

    #[test]
    fn test_typed_arguments() {
        assert_eq!(
            Request::parse("setquota bob 100 200").unwrap(),
            Request::SetQuota {
                user: "bob".to_string(),
                soft: 100,
                hard: 200,
            }
        );
        assert!(Request::parse("setquota bob lots 200").is_err());
        assert_eq!(
            Request::parse("makeuserdir bob 0750 public_html/img").unwrap(),
            Request::MakeUserDir {
                user: "bob".to_string(),
                mode: 0o750,
                path: "public_html/img".to_string(),
            }
        );
        assert!(Request::parse("makeuserdir bob rwx public_html").is_err());
    }

    #[test]
    fn test_setonboot_flag() {
        assert_eq!(
            Request::parse("setonboot nginx 1").unwrap(),
            Request::SetOnBoot {
                service: "nginx".to_string(),
                enabled: true,
            }
        );
        assert_eq!(
            Request::parse("setonboot nginx yes").unwrap(),
            Request::SetOnBoot {
                service: "nginx".to_string(),
                enabled: false,
            }
        );
    }

    #[test]
    fn test_scripts() {
        assert_eq!(
            Request::parse("runscript rebuild --all \"a b\"").unwrap(),
            Request::RunScript {
                script: "rebuild".to_string(),
                args: vec!["--all".to_string(), "a b".to_string()],
            }
        );
        assert_eq!(
            Request::parse("runuserscript www sync").unwrap(),
            Request::RunUserScript {
                user: "www".to_string(),
                script: "sync".to_string(),
                args: Vec::new(),
            }
        );
    }

    #[test]
    fn test_service_verbs() {
        let request = Request::parse("reloadservice nginx").unwrap();
        assert_eq!(request.verb(), "reloadservice");
        assert_eq!(
            request,
            Request::Service {
                action: ServiceAction::Reload,
                service: "nginx".to_string(),
            }
        );
    }

    #[test]
    fn test_broken_quoting() {
        let err = Request::parse("createuser bob \"unterminated").unwrap_err();
        assert_eq!(err.verb, "createuser");
    }
}
