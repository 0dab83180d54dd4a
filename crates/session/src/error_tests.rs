// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    malformed = { SessionError::MalformedToken("bad segment".into()), "MALFORMED_TOKEN: bad segment" },
    refresh = { SessionError::RefreshFailure("401".into()), "REFRESH_FAILURE: 401" },
    credentials = { SessionError::InvalidCredentialsResponse("no tokens".into()), "INVALID_CREDENTIALS_RESPONSE: no tokens" },
    storage = { SessionError::Storage("disk full".into()), "STORAGE: disk full" },
)]
fn display_includes_code_and_detail(error: SessionError, expected: &str) {
    assert_eq!(error.to_string(), expected);
}

#[test]
fn converts_into_anyhow() {
    let err: anyhow::Error = SessionError::RefreshFailure("timeout".into()).into();
    assert!(err.downcast_ref::<SessionError>().is_some());
}
