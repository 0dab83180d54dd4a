// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Failures surfaced by the session core.
///
/// A logout that arrives while another one is still cooling down is not an
/// error: [`crate::session::SessionManager::logout`] just returns `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Token present but its payload segment could not be decoded.
    MalformedToken(String),
    /// The refresh call failed or returned no usable access token.
    RefreshFailure(String),
    /// `login` was handed a result without a usable token pair.
    InvalidCredentialsResponse(String),
    /// A persistence backend failed to read or write.
    Storage(String),
}

impl SessionError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) => "MALFORMED_TOKEN",
            Self::RefreshFailure(_) => "REFRESH_FAILURE",
            Self::InvalidCredentialsResponse(_) => "INVALID_CREDENTIALS_RESPONSE",
            Self::Storage(_) => "STORAGE",
        }
    }

    fn detail(&self) -> &str {
        match self {
            Self::MalformedToken(msg)
            | Self::RefreshFailure(msg)
            | Self::InvalidCredentialsResponse(msg)
            | Self::Storage(msg) => msg,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.as_str(), self.detail())
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
