//! Wire envelopes.
//!
//! Successful `/query` responses are the bare row array; everything else
//! that is not a success uses [`ErrorBody`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error envelope: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_string(&ErrorBody::new("Unauthorized")).unwrap();
        assert_eq!(body, r#"{"error":"Unauthorized"}"#);
    }
}
