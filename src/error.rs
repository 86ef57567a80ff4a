//! Domain-specific error types for session and control-loop operations.
//!
//! Typed errors enable callers to match on specific failure modes
//! rather than parsing error message strings.

/// Errors surfaced by the orchestrator and the control-loop registry.
///
/// Failures inside a single control-loop cycle are deliberately absent:
/// those are logged by the engine and the loop continues.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No session (or controller) is registered under the given id.
    #[error("session not found: {id}")]
    NotFound { id: String },

    /// Every port in the configured range is held by a live session.
    #[error("no free port in range {start}-{end}")]
    ResourceExhausted { start: u16, end: u16 },

    /// The runtime adapter failed while provisioning a sandbox.
    #[error("failed to provision sandbox: {message}")]
    ProvisioningFailed { message: String },

    /// The browser endpoint could not be reached when starting an engine.
    #[error("failed to connect to browser endpoint: {message}")]
    ConnectionFailed { message: String },

    /// A controller is already registered for the given session.
    #[error("controller already exists for session: {id}")]
    AlreadyExists { id: String },

    /// Injected instruction text was empty or whitespace-only.
    #[error("instructions must not be empty")]
    EmptyInstructions,
}

impl Error {
    /// Creates a `NotFound` error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a `ResourceExhausted` error for the given port range.
    pub fn resource_exhausted(start: u16, end: u16) -> Self {
        Self::ResourceExhausted { start, end }
    }

    /// Creates a `ProvisioningFailed` error.
    pub fn provisioning_failed(message: impl Into<String>) -> Self {
        Self::ProvisioningFailed {
            message: message.into(),
        }
    }

    /// Creates a `ConnectionFailed` error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Creates an `AlreadyExists` error.
    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    /// Returns true if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a port-exhaustion error.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }

    /// Returns true if this is a provisioning error.
    pub fn is_provisioning_failed(&self) -> bool {
        matches!(self, Self::ProvisioningFailed { .. })
    }

    /// Returns true if this is a connection error.
    pub fn is_connection_failed(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. })
    }

    /// Returns true if this is a duplicate-controller error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}
