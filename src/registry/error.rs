//! Hub error types
//!
//! Error types for submitting requests to the hub and for outbound delivery.

/// Error type for hub operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// The dispatcher or the target queue is gone
    Closed,
    /// The queue was full and the policy drops new items
    Full,
    /// The queue stayed full for the whole timeout
    Timeout,
}

impl std::fmt::Display for HubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubError::Closed => write!(f, "Queue closed"),
            HubError::Full => write!(f, "Queue full, payload dropped"),
            HubError::Timeout => write!(f, "Timed out waiting for queue capacity"),
        }
    }
}

impl std::error::Error for HubError {}
