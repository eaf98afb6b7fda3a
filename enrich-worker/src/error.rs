use enrich_common::CustomRedisError;
use thiserror::Error;

/// Enumeration of everything that can go wrong while processing one change
/// event. Errors are raised with `?` wherever they occur and consumed exactly
/// once by `classify` at the delivery boundary.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to decode change event payload: {0}")]
    Decode(String),
    #[error("{0}")]
    Validation(String),
    #[error("response schema error: {0}")]
    Schema(String),
    #[error("unauthenticated: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("transient network error: {0}")]
    Network(String),
    #[error("upstream server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error(transparent)]
    Cache(#[from] CustomRedisError),
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl PipelineError {
    /// Stable kind name recorded in failure audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Decode(_) => "decode",
            PipelineError::Validation(_) => "validation",
            PipelineError::Schema(_) => "schema",
            PipelineError::Auth(_) => "auth",
            PipelineError::NotFound(_) => "not-found",
            PipelineError::BadRequest(_) => "bad-request",
            PipelineError::Network(_) => "network",
            PipelineError::Server { .. } => "server",
            PipelineError::Cache(_) => "cache",
            PipelineError::Unknown(_) => "unknown",
        }
    }

    /// Map a non-2xx response status from an outbound call to an error.
    pub fn from_status(status: http::StatusCode, context: &str) -> PipelineError {
        match status {
            http::StatusCode::NOT_FOUND => PipelineError::NotFound(context.to_owned()),
            http::StatusCode::UNAUTHORIZED => PipelineError::Auth(context.to_owned()),
            http::StatusCode::BAD_REQUEST => PipelineError::BadRequest(context.to_owned()),
            status if status.is_server_error() => PipelineError::Server {
                status: status.as_u16(),
                message: context.to_owned(),
            },
            status => {
                PipelineError::Unknown(format!("{context}: unexpected status {status}"))
            }
        }
    }

    /// Map a transport-level `reqwest` failure to an error. Timeouts,
    /// connection failures and dropped connections are the recognized
    /// transient conditions.
    pub fn from_reqwest(error: reqwest::Error, context: &str) -> PipelineError {
        if error.is_timeout() || error.is_connect() || is_connection_dropped(&error) {
            PipelineError::Network(format!("{context}: {error}"))
        } else if error.is_decode() {
            PipelineError::Schema(format!("{context}: {error}"))
        } else {
            PipelineError::Unknown(format!("{context}: {error}"))
        }
    }
}

/// A reset mid-transfer does not show up in `reqwest::Error`'s own
/// predicates; it is buried as an `io::Error` somewhere down the source
/// chain.
fn is_connection_dropped(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = error.source();

    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io_error.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
            ) {
                return true;
            }
        }
        source = cause.source();
    }

    false
}

/// The retry decision for a failed event, consumed by the delivery surface:
/// retryable failures propagate so the broker redelivers, terminal failures
/// are absorbed, recorded and acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub retryable: bool,
    pub reason: &'static str,
}

impl Classification {
    const fn terminal(reason: &'static str) -> Self {
        Classification {
            retryable: false,
            reason,
        }
    }

    const fn retryable(reason: &'static str) -> Self {
        Classification {
            retryable: true,
            reason,
        }
    }
}

/// Classify a pipeline failure as retryable or terminal.
///
/// The precedence here is fixed and order matters: a 404 raised while
/// fetching test data must classify as test-data, not not-found. Anything
/// unrecognized is terminal so unknown errors never retry forever.
pub fn classify(error: &PipelineError, subject: &str) -> Classification {
    if matches!(error, PipelineError::Validation(_)) {
        return Classification::terminal("validation");
    }

    if is_test_data(error, subject) {
        return Classification::terminal("test-data");
    }

    match error {
        PipelineError::NotFound(_) => Classification::terminal("not-found"),
        PipelineError::Auth(_) => Classification::terminal("unauthenticated"),
        PipelineError::BadRequest(_) => Classification::terminal("bad-request"),
        PipelineError::Network(_) => Classification::retryable("network"),
        PipelineError::Cache(CustomRedisError::Timeout)
        | PipelineError::Cache(CustomRedisError::Redis(_)) => {
            Classification::retryable("network")
        }
        PipelineError::Server { .. } => Classification::retryable("server-error"),
        _ => Classification::terminal("unhandled"),
    }
}

/// Test fixtures carry identifier values like `test-parent-001`; any event
/// whose subject or error message contains the marker is dropped as test data.
fn is_test_data(error: &PipelineError, subject: &str) -> bool {
    const TEST_MARKER: &str = "test";

    subject.contains(TEST_MARKER) || error.to_string().contains(TEST_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_terminal() {
        let error = PipelineError::Validation("missing childId".to_string());
        let classification = classify(&error, "children/c1");

        assert!(!classification.retryable);
        assert_eq!(classification.reason, "validation");
    }

    #[test]
    fn test_validation_wins_over_test_marker() {
        let error = PipelineError::Validation("missing childId".to_string());
        let classification = classify(&error, "children/test-child-001");

        assert_eq!(classification.reason, "validation");
    }

    #[test]
    fn test_404_with_test_subject_is_test_data_not_not_found() {
        let error = PipelineError::NotFound("profile lookup".to_string());
        let classification = classify(&error, "children/test-child-001");

        assert!(!classification.retryable);
        assert_eq!(classification.reason, "test-data");
    }

    #[test]
    fn test_test_marker_in_message() {
        let error = PipelineError::NotFound("no record for test-parent-042".to_string());
        let classification = classify(&error, "children/c1");

        assert_eq!(classification.reason, "test-data");
    }

    #[test]
    fn test_status_precedence() {
        assert_eq!(
            classify(&PipelineError::NotFound("x".into()), "children/c1").reason,
            "not-found"
        );
        assert_eq!(
            classify(&PipelineError::Auth("x".into()), "children/c1").reason,
            "unauthenticated"
        );
        assert_eq!(
            classify(&PipelineError::BadRequest("x".into()), "children/c1").reason,
            "bad-request"
        );
    }

    #[test]
    fn test_network_and_server_errors_are_retryable() {
        let network = classify(
            &PipelineError::Network("connection refused".into()),
            "children/c1",
        );
        assert!(network.retryable);
        assert_eq!(network.reason, "network");

        let server = classify(
            &PipelineError::Server {
                status: 503,
                message: "summary lookup".into(),
            },
            "children/c1",
        );
        assert!(server.retryable);
        assert_eq!(server.reason, "server-error");
    }

    #[test]
    fn test_cache_store_failures_are_retryable() {
        let classification = classify(
            &PipelineError::Cache(CustomRedisError::Timeout),
            "children/c1",
        );

        assert!(classification.retryable);
        assert_eq!(classification.reason, "network");
    }

    #[test]
    fn test_schema_and_decode_fall_through_to_terminal() {
        let schema = classify(
            &PipelineError::Schema("profile missing dateOfBirth".into()),
            "children/c1",
        );
        assert!(!schema.retryable);
        assert_eq!(schema.reason, "unhandled");

        let decode = classify(
            &PipelineError::Decode("no known encoding applies".into()),
            "children/c1",
        );
        assert!(!decode.retryable);
    }

    #[derive(Debug)]
    struct TransferFailed(std::io::Error);

    impl std::fmt::Display for TransferFailed {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "transfer failed")
        }
    }

    impl std::error::Error for TransferFailed {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_connection_reset_in_source_chain_is_detected() {
        let reset = TransferFailed(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(is_connection_dropped(&reset));

        let aborted = TransferFailed(std::io::Error::from(std::io::ErrorKind::ConnectionAborted));
        assert!(is_connection_dropped(&aborted));

        let refused = TransferFailed(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(!is_connection_dropped(&refused));

        let bare = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        // The walk starts at the source, so the top-level error itself is
        // never inspected.
        assert!(!is_connection_dropped(&bare));
        assert!(is_connection_dropped(&TransferFailed(bare)));
    }

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            PipelineError::from_status(http::StatusCode::NOT_FOUND, "profile"),
            PipelineError::NotFound(_)
        ));
        assert!(matches!(
            PipelineError::from_status(http::StatusCode::UNAUTHORIZED, "token"),
            PipelineError::Auth(_)
        ));
        assert!(matches!(
            PipelineError::from_status(http::StatusCode::BAD_REQUEST, "summary"),
            PipelineError::BadRequest(_)
        ));
        assert!(matches!(
            PipelineError::from_status(http::StatusCode::BAD_GATEWAY, "summary"),
            PipelineError::Server { status: 502, .. }
        ));
        assert!(matches!(
            PipelineError::from_status(http::StatusCode::IM_A_TEAPOT, "summary"),
            PipelineError::Unknown(_)
        ));
    }
}
