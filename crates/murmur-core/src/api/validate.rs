//! Input checks applied before a mutation is sent
//!
//! These mirror the server's own rules so that obviously bad input fails
//! fast with the same message the server would have produced.

use crate::error::{ApiError, ApiResult};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 20;
pub const PASSWORD_MIN: usize = 6;
pub const MESSAGE_MAX: usize = 2000;
pub const AVATAR_MAX: usize = 2_000_000;

/// Trimmed username, 3-20 chars, no whitespace
pub fn username(raw: &str) -> ApiResult<&str> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(ApiError::Invalid("Username must be 3-20 chars".to_string()));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ApiError::Invalid("No spaces in username".to_string()));
    }
    Ok(name)
}

pub fn password(raw: &str) -> ApiResult<&str> {
    if raw.chars().count() < PASSWORD_MIN {
        return Err(ApiError::Invalid("Password too short".to_string()));
    }
    Ok(raw)
}

/// Trimmed message content, 1-2000 chars
pub fn message_content(raw: &str) -> ApiResult<&str> {
    let content = raw.trim();
    let len = content.chars().count();
    if len == 0 || len > MESSAGE_MAX {
        return Err(ApiError::Invalid("Invalid message length".to_string()));
    }
    Ok(content)
}

pub fn avatar(data_url: &str) -> ApiResult<&str> {
    if !data_url.starts_with("data:image/") {
        return Err(ApiError::Invalid("Invalid avatar".to_string()));
    }
    if data_url.len() > AVATAR_MAX {
        return Err(ApiError::Invalid("Avatar too large".to_string()));
    }
    Ok(data_url)
}
