// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::byte_array::ByteArrayError;
use crate::error::EncodeError;

/// Generate a random alphanumeric string, used to mint Client Identifiers
/// when a Client connects with an empty `client_id` and `clean_session` set.
#[must_use]
pub fn random_client_id(len: usize) -> String {
    thread_rng().sample_iter(&Alphanumeric).take(len).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    TooLong,
    InvalidUtf8,
    ContainsNullChar,
    ContainsSurrogate,
}

impl From<StringError> for ByteArrayError {
    fn from(_e: StringError) -> Self {
        Self::InvalidString(StringError::InvalidUtf8)
    }
}

/// Maximum length of a length-prefixed string/binary field, in bytes.
pub const MAX_TWO_BYTE_LEN: usize = u16::MAX as usize;

/// Validate a `ClientId` per [MQTT-3.1.3-4]/[MQTT-3.1.3-5]: any UTF-8 string
/// is allowed; the Server may reject it, but the codec only enforces length.
///
/// # Errors
///
/// Returns error if `client_id` is too long to fit the two-byte length prefix.
pub fn validate_client_id(client_id: &str) -> Result<(), EncodeError> {
    if client_id.len() > MAX_TWO_BYTE_LEN {
        return Err(EncodeError::InvalidClientId);
    }
    Ok(())
}

/// Validate a UTF-8 Encoded String per [MQTT-1.5.4-1]/[MQTT-1.5.4-2]: no
/// null character, no UTF-16 surrogate code points, and the two-byte length
/// prefix must be able to hold it.
///
/// # Errors
///
/// Returns error if the string is malformed or too long.
pub fn validate_utf8_string(s: &str) -> Result<(), StringError> {
    if s.len() > MAX_TWO_BYTE_LEN {
        return Err(StringError::TooLong);
    }
    if s.contains('\u{0000}') {
        return Err(StringError::ContainsNullChar);
    }
    // `char` in Rust can never hold a surrogate half, so a successful parse
    // below already rules out [MQTT-1.5.4-1] violations of that kind; the
    // check exists in case `s` was built from already-decoded bytes.
    if s.chars().any(|c| ('\u{D800}'..='\u{DFFF}').contains(&c)) {
        return Err(StringError::ContainsSurrogate);
    }
    Ok(())
}

/// Decode raw bytes as a UTF-8 Encoded String, applying the same validation
/// as [`validate_utf8_string`].
///
/// # Errors
///
/// Returns error if `bytes` is not valid UTF-8 or violates MQTT string rules.
pub fn to_utf8_string(bytes: &[u8]) -> Result<String, StringError> {
    let s = String::from_utf8(bytes.to_vec()).map_err(|_e| StringError::InvalidUtf8)?;
    validate_utf8_string(&s)?;
    Ok(s)
}

/// Validate binary data against the two-byte length prefix limit.
///
/// # Errors
///
/// Returns error if `data` is too long.
pub fn validate_two_bytes_data(data: &[u8]) -> Result<(), EncodeError> {
    if data.len() > MAX_TWO_BYTE_LEN {
        return Err(EncodeError::InvalidTopic);
    }
    Ok(())
}
