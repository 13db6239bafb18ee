//! Call id validation for the media stream path.
//!
//! Call ids arrive as a URL path segment and are used as registry keys and
//! log fields, so only characters that survive a URL unescaped are accepted.

use thiserror::Error;

/// Characters that would need escaping in a URL path or query.
const FORBIDDEN: &[char] = &[
    '!', '@', '#', '$', '%', '^', '&', '*', '(', ')', '[', ']', '{', '}', ';', ':', ',', '.', '/',
    '<', '>', '?', '\\', '|', '`', '~',
];

/// Longest accepted call id.
pub const MAX_CALL_ID_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallIdError {
    #[error("call id is empty")]
    Empty,

    #[error("call id is longer than {MAX_CALL_ID_LEN} characters")]
    TooLong,

    #[error("call id contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Accept ids such as Twilio `CA…` sids or database ids; reject anything
/// with whitespace, control or URL-reserved characters.
pub fn validate_call_id(call_id: &str) -> Result<&str, CallIdError> {
    if call_id.is_empty() {
        return Err(CallIdError::Empty);
    }
    if call_id.chars().count() > MAX_CALL_ID_LEN {
        return Err(CallIdError::TooLong);
    }
    if let Some(c) = call_id
        .chars()
        .find(|c| FORBIDDEN.contains(c) || c.is_whitespace() || c.is_control())
    {
        return Err(CallIdError::InvalidCharacter(c));
    }
    Ok(call_id)
}
