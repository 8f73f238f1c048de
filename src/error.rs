//! Error types for the service container

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while registering, resolving or compiling services
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// Requested id is not registered, not even through an alias
    #[error("unknown service: {id}")]
    UnknownService { id: String },

    /// Requested parameter name is not registered
    #[error("unknown parameter: {name}")]
    UnknownParameter { name: String },

    /// Service reference chain loops back on itself
    #[error("circular service reference: {}", chain.join(" -> "))]
    CircularReference { chain: Vec<String> },

    /// Parameter interpolation loops back on itself
    #[error("circular parameter reference: {}", chain.join(" -> "))]
    CircularParameter { chain: Vec<String> },

    /// Alias chain loops back on itself
    #[error("circular alias: {}", chain.join(" -> "))]
    CircularAlias { chain: Vec<String> },

    /// Configurator declaration has an unusable shape
    #[error("invalid configurator for service {id}: {reason}")]
    InvalidConfigurator { id: String, reason: String },

    /// Service ids must be non-empty
    #[error("service id must not be empty")]
    EmptyServiceId,

    /// Parameter value cannot be used where it was referenced
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Class name has no entry in the class registry
    #[error("unknown class: {class}")]
    UnknownClass { class: String },

    /// Class has no static factory with that name
    #[error("unknown factory method {class}::{method}")]
    UnknownFactory { class: String, method: String },

    /// Class has no method with that name
    #[error("unknown method {class}::{method}")]
    UnknownMethod { class: String, method: String },

    /// No free function registered under that name
    #[error("unknown function: {name}")]
    UnknownFunction { name: String },

    /// No include hook registered for that path
    #[error("no include hook registered for {}", path.display())]
    UnknownFile { path: PathBuf },

    /// A constructor, factory, method or include hook failed
    #[error("failed to build {class}: {reason}")]
    CreationFailed { class: String, reason: String },

    /// Configuration input could not be loaded
    #[cfg(feature = "yaml")]
    #[error("configuration error: {0}")]
    Config(String),
}

impl DiError {
    /// Create an UnknownService error
    #[inline]
    pub fn unknown_service(id: impl Into<String>) -> Self {
        Self::UnknownService { id: id.into() }
    }

    /// Create an UnknownParameter error
    #[inline]
    pub fn unknown_parameter(name: impl Into<String>) -> Self {
        Self::UnknownParameter { name: name.into() }
    }

    /// Create a CircularReference error from the in-progress id chain
    #[inline]
    pub fn circular(chain: Vec<String>) -> Self {
        Self::CircularReference { chain }
    }

    /// Create an InvalidConfigurator error
    #[inline]
    pub fn invalid_configurator(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfigurator {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            class: class.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_reference_lists_full_chain() {
        let err = DiError::circular(vec!["a".into(), "b".into(), "c".into(), "a".into()]);
        assert_eq!(
            err.to_string(),
            "circular service reference: a -> b -> c -> a"
        );
    }

    #[test]
    fn unknown_service_names_the_id() {
        let err = DiError::unknown_service("mailer");
        assert_eq!(err.to_string(), "unknown service: mailer");
    }
}
