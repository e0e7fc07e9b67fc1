//! Error types for the Strimzi Schema Registry operator
//!
//! Errors are structured with fields to aid debugging in production. The
//! variants classify failures for the controller's error policy: each one is
//! either retryable (the event layer requeues it quickly) or permanent (it
//! needs a configuration or environment fix first).

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A source object confirmed absent by the API server (404)
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Resource kind (e.g., "Secret", "KafkaUser")
        kind: String,
        /// Namespace that was searched
        namespace: String,
        /// Name of the missing object
        name: String,
    },

    /// A source object exists but lacks an expected field
    #[error("malformed source {object}: {message}")]
    MalformedSource {
        /// Object reference (e.g., "Secret events/events-cluster-ca-cert")
        object: String,
        /// Description of what is missing or invalid
        message: String,
    },

    /// An external transform tool exited unsuccessfully or could not be spawned
    #[error("{program} failed (exit status {}): {}", status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()), stderr.trim())]
    ExternalToolFailure {
        /// The program that was invoked
        program: String,
        /// Exit status, `None` when terminated by a signal or never started
        status: Option<i32>,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// A tool reported success but its output artifact is missing or unusable
    #[error("{artifact} was not produced: {message}")]
    StoreNotProduced {
        /// The artifact that should have been written (e.g., "truststore")
        artifact: String,
        /// Description of what was found instead
        message: String,
    },

    /// No listener in the Kafka status matched the requested name
    #[error("could not find address of listener '{listener}'; available: [{}]", available.join(", "))]
    ListenerNotFound {
        /// The requested listener name or type
        listener: String,
        /// Listener names/types actually present in the status
        available: Vec<String>,
    },

    /// Upstream state has not converged yet (e.g., Kafka status not populated)
    #[error("upstream not ready: {message}")]
    TemporaryUpstream {
        /// Description of what is not ready
        message: String,
    },

    /// Another writer created the derived object concurrently (409)
    #[error("conflict publishing {namespace}/{name}: object was created concurrently")]
    ConflictOnPublish {
        /// Namespace of the conflicting object
        namespace: String,
        /// Name of the conflicting object
        name: String,
    },

    /// Validation error for CRD specs or configuration
    #[error("validation error for {registry}: {message}")]
    Validation {
        /// Name of the registry with invalid configuration
        registry: String,
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "synthesizer", "watcher")
        context: String,
    },
}

impl Error {
    /// Create a not-found error for the given object
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a malformed-source error
    pub fn malformed(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedSource {
            object: object.into(),
            message: msg.into(),
        }
    }

    /// Create a store-not-produced error
    pub fn store_not_produced(artifact: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StoreNotProduced {
            artifact: artifact.into(),
            message: msg.into(),
        }
    }

    /// Create a temporary-upstream error
    pub fn temporary_upstream(msg: impl Into<String>) -> Self {
        Self::TemporaryUpstream {
            message: msg.into(),
        }
    }

    /// Create a validation error with registry context
    pub fn validation_for(registry: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            registry: registry.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Create an internal error without specific context
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::internal_with_context(UNKNOWN_CONTEXT, msg)
    }

    /// Check if this error is retryable
    ///
    /// Malformed sources, missing store artifacts and validation errors
    /// need a human to fix something and are not
    /// retried quickly. Everything else may resolve on its own as upstream
    /// state converges.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => ae.code == 409 || ae.code == 429 || ae.code >= 500,
                _ => true,
            },
            Error::NotFound { .. } => true,
            Error::MalformedSource { .. } => false,
            Error::ExternalToolFailure { .. } => true,
            Error::StoreNotProduced { .. } => false,
            Error::ListenerNotFound { .. } => true,
            Error::TemporaryUpstream { .. } => true,
            Error::ConflictOnPublish { .. } => true,
            Error::Validation { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Whether this error is a confirmed not-found, either ours or a 404 from the API
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube { source } => crate::kube_utils::is_not_found(source),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {code}"),
            reason: "Test".to_string(),
            code,
        })
    }

    /// Story: a KafkaUser Secret that Strimzi has not created yet is retried
    ///
    /// Strimzi's user operator creates the client Secret asynchronously, so a
    /// registry created at the same time as its KafkaUser will briefly see a
    /// missing Secret. That must requeue, not park the registry.
    #[test]
    fn story_missing_source_is_retried() {
        let err = Error::not_found("Secret", "events", "registry");
        assert!(err.is_retryable());
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Secret events/registry not found");
    }

    /// Story: version skew between Strimzi and the operator is surfaced, not hammered
    #[test]
    fn story_malformed_source_is_permanent() {
        let err = Error::malformed("Secret events/registry", "missing data key user.key");
        assert!(!err.is_retryable());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("user.key"));
    }

    #[test]
    fn external_tool_failure_carries_captured_output() {
        let err = Error::ExternalToolFailure {
            program: "keytool".to_string(),
            status: Some(1),
            stdout: String::new(),
            stderr: "keytool error: java.lang.Exception: Input not an X.509 certificate\n"
                .to_string(),
        };
        assert!(err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("keytool failed (exit status 1)"));
        assert!(msg.contains("Input not an X.509 certificate"));

        let err = Error::ExternalToolFailure {
            program: "openssl".to_string(),
            status: None,
            stdout: String::new(),
            stderr: "No such file or directory".to_string(),
        };
        assert!(err.to_string().contains("exit status none"));
    }

    #[test]
    fn store_not_produced_is_permanent() {
        let err = Error::store_not_produced("keystore", "keytool exited 0 without output");
        assert!(!err.is_retryable());
        assert!(err.to_string().starts_with("keystore was not produced"));
    }

    #[test]
    fn listener_not_found_lists_available_listeners() {
        let err = Error::ListenerNotFound {
            listener: "external".to_string(),
            available: vec!["plain".to_string(), "tls".to_string()],
        };
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "could not find address of listener 'external'; available: [plain, tls]"
        );
    }

    #[test]
    fn kube_errors_classified_by_status_code() {
        assert!(Error::from(api_error(500)).is_retryable());
        assert!(Error::from(api_error(409)).is_retryable());
        assert!(Error::from(api_error(429)).is_retryable());
        assert!(!Error::from(api_error(403)).is_retryable());
        assert!(!Error::from(api_error(422)).is_retryable());

        assert!(Error::from(api_error(404)).is_not_found());
        assert!(!Error::from(api_error(500)).is_not_found());
    }

    #[test]
    fn conflict_and_upstream_errors_are_retryable() {
        let err = Error::ConflictOnPublish {
            namespace: "events".to_string(),
            name: "registry-jks".to_string(),
        };
        assert!(err.is_retryable());
        assert!(Error::temporary_upstream("status.listeners missing").is_retryable());
    }

    #[test]
    fn validation_errors_are_permanent() {
        let err = Error::validation_for("registry", "replicas must not be negative");
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "validation error for registry: replicas must not be negative"
        );
    }

    #[test]
    fn internal_error_context() {
        let err = Error::internal_with_context("synthesizer", "tempdir unavailable");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("[synthesizer]"));
        assert!(Error::internal("x").to_string().contains("[unknown]"));
    }
}
