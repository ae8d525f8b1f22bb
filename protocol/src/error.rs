// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::fmt;

use mqtt_codec::{DecodeError, EncodeError};

/// Which of the three error classes a failure belongs to.
///
/// This grouping is what drives engine behavior, not the specific variant:
/// malformed input always closes the connection, a disallowed local action
/// is always returned to the caller without touching connection state, and
/// a transport loss always tears down in-memory state while preserving the
/// store for a session that may resume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bytes received from the peer could not be parsed, or parsed into a
    /// packet that violates a MUST in the wire protocol. Always fatal to
    /// the connection.
    MalformedInput,

    /// The host asked the engine to do something the protocol or current
    /// state does not allow (e.g. sending PUBLISH before CONNACK). Never
    /// touches connection state; the caller just gets the error back.
    DisallowedAction,

    /// The transport reported a loss (EOF, reset, keep-alive timeout).
    /// In-memory connection state is torn down; stored QoS 1/2 state
    /// survives for session resumption.
    TransportLoss,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Self::new(ErrorKind::MalformedInput, format!("{err:?}"))
    }
}

impl From<EncodeError> for Error {
    fn from(err: EncodeError) -> Self {
        Self::new(ErrorKind::DisallowedAction, format!("{err:?}"))
    }
}
