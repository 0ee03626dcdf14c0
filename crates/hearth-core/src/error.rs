//! Error types for the Hearth container.
//!
//! Configuration errors signal a setup defect (an unknown dependency name, a
//! cycle, a route without context) rather than a request-time condition.
//! They are meant to fail fast and loud, ideally during application start-up.

use thiserror::Error;

/// Boxed, thread-safe error returned by factories and hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Setup defects detected while registering, validating or resolving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A factory was registered twice under the same name.
    #[error("dependency '{0}' is already registered")]
    DuplicateName(String),

    /// A name was resolved that no factory provides.
    #[error("dependent object '{0}' not found")]
    DependencyNotFound(String),

    /// A factory declares a dependency that is not registered.
    #[error("factory '{factory}' depends on unregistered name '{dependency}'")]
    UnknownDependency {
        /// The factory declaring the dependency.
        factory: String,
        /// The missing dependency name.
        dependency: String,
    },

    /// A name transitively depends on itself.
    #[error("circular reference detected: {chain}")]
    CircularDependency {
        /// The resolution chain, rendered as `a -> b -> a`.
        chain: String,
    },

    /// Dependency injection was attempted without a request context.
    #[error("request context is not set, this indicates a configuration bug")]
    MissingContext,

    /// A route was built without its mandatory fallback error handler.
    #[error("route '{endpoint}' has no fallback error handler")]
    MissingFallbackHandler {
        /// The endpoint label of the offending route.
        endpoint: String,
    },
}

impl ConfigurationError {
    /// Renders a circular-dependency error from the in-progress chain plus
    /// the name that closed the loop.
    pub fn circular<'a>(chain: impl IntoIterator<Item = &'a str>, repeated: &str) -> Self {
        let mut names: Vec<&str> = chain.into_iter().collect();
        names.push(repeated);
        Self::CircularDependency {
            chain: names.join(" -> "),
        }
    }
}

// =============================================================================
// Container Errors
// =============================================================================

/// Errors produced while resolving instances.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The registry or request setup is inconsistent.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A factory returned an error. Nothing is cached for it.
    #[error("factory '{name}' failed: {source}")]
    Factory {
        /// The name being created.
        name: String,
        /// The error returned by the factory.
        #[source]
        source: BoxError,
    },

    /// An instance exists under `name` but is not of the requested type.
    #[error("instance '{name}' is not a '{expected}'")]
    TypeMismatch {
        /// The registered name.
        name: String,
        /// The requested Rust type.
        expected: &'static str,
    },
}

impl ContainerError {
    /// Returns the configuration error, if this is one.
    pub fn as_configuration(&self) -> Option<&ConfigurationError> {
        match self {
            Self::Configuration(e) => Some(e),
            _ => None,
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for registration and validation.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// Result type for resolution.
pub type ContainerResult<T> = Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_chain_is_rendered_in_order() {
        let err = ConfigurationError::circular(["a", "b"], "a");
        assert_eq!(
            err.to_string(),
            "circular reference detected: a -> b -> a"
        );
    }

    #[test]
    fn configuration_errors_pass_through_transparently() {
        let err: ContainerError = ConfigurationError::DependencyNotFound("db".into()).into();
        assert_eq!(err.to_string(), "dependent object 'db' not found");
        assert!(err.as_configuration().is_some());
    }
}
