//! Shared-secret verification for the ingestion boundary.
//!
//! This boundary has no per-user identity - only one pipeline-wide secret
//! presented in a header by the scrape provider's webhook.

use sha2::{Digest, Sha256};

/// Header the scrape provider sends the shared secret in.
pub const SECRET_HEADER: &str = "x-webhook-secret";

/// Compare a provided secret against the expected one.
///
/// Both sides are hashed first so the comparison does not leak length or
/// prefix information. A missing configured secret rejects everything
/// (fail closed).
pub fn verify_secret(expected: Option<&str>, provided: Option<&str>) -> bool {
    let (Some(expected), Some(provided)) = (expected, provided) else {
        return false;
    };
    Sha256::digest(expected.as_bytes()) == Sha256::digest(provided.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_secrets_pass() {
        assert!(verify_secret(Some("s3cret"), Some("s3cret")));
    }

    #[test]
    fn mismatched_secrets_fail() {
        assert!(!verify_secret(Some("s3cret"), Some("guess")));
        assert!(!verify_secret(Some("s3cret"), Some("")));
    }

    #[test]
    fn missing_either_side_fails_closed() {
        assert!(!verify_secret(Some("s3cret"), None));
        assert!(!verify_secret(None, Some("s3cret")));
        assert!(!verify_secret(None, None));
    }
}
