use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};

use crate::error::AppError;

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 50;
pub const NAME_MAX_LEN: usize = 30;
pub const EMAIL_MAX_LEN: usize = 50;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// True when the credential changed after the token was issued.
/// Compared at second precision, the resolution of `iat`.
pub fn was_password_changed_after(changed_at: Option<OffsetDateTime>, issued_at: i64) -> bool {
    changed_at.is_some_and(|at| at.unix_timestamp() > issued_at)
}

/// Timestamp to record for a credential change. Backdated one second so a
/// token signed right after the change still has `iat` >= this value.
pub fn password_changed_now() -> OffsetDateTime {
    OffsetDateTime::now_utc() - Duration::seconds(1)
}

pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(AppError::validation(format!(
            "Password must be between {PASSWORD_MIN_LEN} and {PASSWORD_MAX_LEN} characters"
        )));
    }
    if password != confirm {
        return Err(AppError::validation("Passwords do not match"));
    }
    Ok(())
}

/// Trims and lower-cases, then checks shape and length.
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::validation("Please provide your email"));
    }
    if email.chars().count() > EMAIL_MAX_LEN || !is_valid_email(&email) {
        return Err(AppError::validation("Please provide a valid email"));
    }
    Ok(email)
}

pub fn validate_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::validation("Please tell us your name"));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(AppError::validation(format!(
            "A name must have at most {NAME_MAX_LEN} characters"
        )));
    }
    Ok(name.to_string())
}
