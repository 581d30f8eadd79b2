//! Outcome codes shared by every response shape.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Codes strictly below this value count as success.
pub const SUCCESS_THRESHOLD: u16 = 300;

/// Closed set of outcomes a handler may report.
///
/// Discriminants follow HTTP status semantics so a transport layer can map
/// them one-to-one. Whether a code is a success is derived from the numeric
/// value via [`ResultCode::succeeded`], never stored alongside it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum ResultCode {
    #[default]
    Success = 200,
    SuccessCreated = 201,
    SuccessAccepted = 202,
    SuccessNoContent = 204,
    FailureBadRequest = 400,
    FailureUnauthorized = 401,
    FailureForbidden = 403,
    FailureNotFound = 404,
}

impl ResultCode {
    /// All variants in ascending numeric order.
    pub const ALL: [ResultCode; 8] = [
        ResultCode::Success,
        ResultCode::SuccessCreated,
        ResultCode::SuccessAccepted,
        ResultCode::SuccessNoContent,
        ResultCode::FailureBadRequest,
        ResultCode::FailureUnauthorized,
        ResultCode::FailureForbidden,
        ResultCode::FailureNotFound,
    ];

    /// Numeric value of this code.
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Returns `true` for the success family (`2xx`).
    #[must_use]
    pub const fn succeeded(self) -> bool {
        self.code() < SUCCESS_THRESHOLD
    }

    /// Looks up the variant carrying the given numeric value.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|rc| rc.code() == code)
    }

    fn as_str(self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::SuccessCreated => "success_created",
            ResultCode::SuccessAccepted => "success_accepted",
            ResultCode::SuccessNoContent => "success_no_content",
            ResultCode::FailureBadRequest => "failure_bad_request",
            ResultCode::FailureUnauthorized => "failure_unauthorized",
            ResultCode::FailureForbidden => "failure_forbidden",
            ResultCode::FailureNotFound => "failure_not_found",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `true` maps to `Success`, `false` to `FailureBadRequest`.
impl From<bool> for ResultCode {
    fn from(success: bool) -> Self {
        if success {
            ResultCode::Success
        } else {
            ResultCode::FailureBadRequest
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn success_family_is_below_threshold() {
        assert!(ResultCode::Success.succeeded());
        assert!(ResultCode::SuccessCreated.succeeded());
        assert!(ResultCode::SuccessAccepted.succeeded());
        assert!(ResultCode::SuccessNoContent.succeeded());
        assert!(!ResultCode::FailureBadRequest.succeeded());
        assert!(!ResultCode::FailureUnauthorized.succeeded());
        assert!(!ResultCode::FailureForbidden.succeeded());
        assert!(!ResultCode::FailureNotFound.succeeded());
    }

    #[test]
    fn from_bool_picks_success_or_bad_request() {
        assert_eq!(ResultCode::from(true), ResultCode::Success);
        assert_eq!(ResultCode::from(false), ResultCode::FailureBadRequest);
    }

    #[test]
    fn unknown_code_has_no_variant() {
        assert_eq!(ResultCode::from_code(404), Some(ResultCode::FailureNotFound));
        assert_eq!(ResultCode::from_code(500), None);
    }

    #[test]
    fn serializes_as_snake_case_name() {
        let json = serde_json::to_string(&ResultCode::FailureNotFound).unwrap();
        assert_eq!(json, "\"failure_not_found\"");
        assert_eq!(ResultCode::FailureNotFound.to_string(), "failure_not_found");
    }

    proptest! {
        #[test]
        fn succeeded_matches_numeric_threshold(code in 0u16..1000) {
            if let Some(rc) = ResultCode::from_code(code) {
                prop_assert_eq!(rc.succeeded(), code < SUCCESS_THRESHOLD);
                prop_assert_eq!(rc.code(), code);
            }
        }
    }
}
