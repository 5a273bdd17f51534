//! Character-set checks for names that end up in paths or helper arguments.

/// Characters allowed in passwords besides ASCII letters and digits.
const PASSWORD_PUNCTUATION: &str = "!@#$%^&*()+=<>,./?;:'|{}[]-_\\`~ ";

/// Module, script, user and service names: `[A-Za-z0-9_.-]+`.
///
/// Names made only of dots are refused since they would act as path
/// components.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
        && !name.chars().all(|c| c == '.')
}

/// Passwords handed to the account helpers.
pub fn is_valid_password(password: &str) -> bool {
    !password.is_empty()
        && password
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || PASSWORD_PUNCTUATION.contains(c))
}
