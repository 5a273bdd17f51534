//! Account helpers: create, delete, shell, password and quota.
//!
//! Every verb is allowed either by name or through the `user` command class.

use tracing::info;

use crate::error::{CommandResult, Failure};
use crate::validation::{is_safe_name, is_valid_password};

use super::super::handler::CommandHandler;

const USER_CLASS: &str = "user";

impl CommandHandler {
    fn authorize_account(&self, verb: &str, user: &str) -> CommandResult {
        self.ctx
            .engine
            .authorize_command(&self.module, verb, USER_CLASS)
            .map_err(|denial| Failure::policy(denial.to_string()))?;
        if !is_safe_name(user) {
            return Err(Failure::policy("Invalid username"));
        }
        Ok(())
    }

    fn check_password(password: &str) -> CommandResult {
        if is_valid_password(password) {
            Ok(())
        } else {
            Err(Failure::policy("Invalid password format"))
        }
    }

    pub(crate) fn create_user(&self, user: &str, password: &str) -> CommandResult {
        self.authorize_account("createuser", user)?;
        Self::check_password(password)?;

        info!(module = %self.module, user = %user, "Creating user");
        let args = self.transaction_args(&[user, password]);
        self.sensitive_helper("create-system-user", args)
    }

    pub(crate) fn delete_user(&self, user: &str) -> CommandResult {
        self.authorize_account("deleteuser", user)?;

        info!(module = %self.module, user = %user, "Deleting user");
        let args = self.transaction_args(&[user]);
        self.helper("remove-system-user", args)
    }

    pub(crate) fn set_user_shell(&self, user: &str, shell: &str) -> CommandResult {
        self.authorize_account("setusershell", user)?;

        info!(module = %self.module, user = %user, shell = %shell, "Changing user shell");
        let args = self.transaction_args(&[user, shell]);
        self.helper("change-system-usershell", args)
    }

    pub(crate) fn set_user_pass(&self, user: &str, password: &str) -> CommandResult {
        self.authorize_account("setuserpass", user)?;
        Self::check_password(password)?;

        info!(module = %self.module, user = %user, "Changing user password");
        let args = self.transaction_args(&[user, password]);
        self.sensitive_helper("change-user-password", args)
    }

    pub(crate) fn set_quota(&self, user: &str, soft: u64, hard: u64) -> CommandResult {
        self.authorize_account("setquota", user)?;

        info!(module = %self.module, user = %user, soft = soft, hard = hard, "Changing quota");
        let args = self.transaction_args(&[user, &soft.to_string(), &hard.to_string()]);
        self.helper("change-user-quota", args)
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::testing::Fixture;
    use crate::error::ErrorCode;

    const BY_CLASS: &str = r#"<module><authdops>
        <commandclasses><commandclass id="user"/></commandclasses>
    </authdops></module>"#;

    const BY_NAME: &str = r#"<module><authdops>
        <commands><command id="setquota"/></commands>
    </authdops></module>"#;

    #[test]
    fn test_account_helpers_by_class() {
        let fixture = Fixture::new(BY_CLASS);
        let handler = fixture.handler();
        let tid = handler.transaction_id().unwrap().to_string();

        handler.create_user("jdoe", "S3cret!").unwrap();
        handler.set_user_shell("jdoe", "/bin/bash").unwrap();
        handler.set_user_pass("jdoe", "N3w pass").unwrap();
        handler.set_quota("jdoe", 1000, 2000).unwrap();
        handler.delete_user("jdoe").unwrap();

        assert_eq!(
            fixture.helper_log(),
            vec![
                format!("create-system-user {} jdoe S3cret!", tid),
                format!("change-system-usershell {} jdoe /bin/bash", tid),
                format!("change-user-password {} jdoe N3w pass", tid),
                format!("change-user-quota {} jdoe 1000 2000", tid),
                format!("remove-system-user {} jdoe", tid),
            ]
        );
    }

    #[test]
    fn test_account_by_name_only() {
        let fixture = Fixture::new(BY_NAME);
        let handler = fixture.handler();

        handler.set_quota("jdoe", 1, 2).unwrap();
        let failure = handler.delete_user("jdoe").unwrap_err();
        assert_eq!(failure.code, ErrorCode::Policy);
        assert_eq!(
            failure.message,
            "Command or command class not defined in module.xml"
        );
    }

    #[test]
    fn test_invalid_username_and_password() {
        let fixture = Fixture::new(BY_CLASS);
        let handler = fixture.handler();

        let failure = handler.create_user("bad/name", "pw").unwrap_err();
        assert_eq!(failure.code, ErrorCode::Policy);
        assert_eq!(failure.message, "Invalid username");

        let failure = handler.create_user("jdoe", "tab\there").unwrap_err();
        assert_eq!(failure.message, "Invalid password format");

        let failure = handler.set_user_pass("jdoe", "").unwrap_err();
        assert_eq!(failure.message, "Invalid password format");

        assert!(fixture.helper_log().is_empty());
    }
}
