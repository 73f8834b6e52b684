//=========================================================================
// Errors
//=========================================================================
//
// Error types returned by the fallible parts of the framework.
//
// Only lookups that are explicitly "or-error" and exclusive insertions
// fail. Everything else (duplicate ids, dangling index entries, deferred
// mutation) degrades gracefully and is reported through `log`.
//
//=========================================================================

//=== Registry Errors =====================================================

/// Errors raised by [`crate::core::registry::ServiceRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No service of the requested type exists anywhere in the scope chain.
    #[error("service not found: {type_name}")]
    NotFound { type_name: &'static str },

    /// No tagged service of the requested type and tag exists in the scope chain.
    #[error("tagged service not found: {type_name}[{tag}]")]
    TaggedNotFound { type_name: &'static str, tag: String },

    /// An exclusive insertion found an existing local service.
    #[error("service already registered: {type_name}")]
    AlreadyRegistered { type_name: &'static str },

    /// A non-overwriting tagged insertion found an existing local entry.
    #[error("tagged service already registered: {type_name}[{tag}]")]
    TaggedAlreadyRegistered { type_name: &'static str, tag: String },

    /// Tags must contain at least one non-whitespace character.
    #[error("tag cannot be empty or whitespace")]
    EmptyTag,
}

//=== Index Errors ========================================================

/// Errors raised by the or-error query variants of
/// [`crate::core::index::SceneEntityIndex`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("no connector registered with id {0}")]
    IdNotFound(u32),

    #[error("no connector registered with tag '{0}'")]
    TagNotFound(String),

    #[error("no connector of kind {0} registered")]
    ConnectorNotFound(&'static str),

    #[error("no node of type {0} registered")]
    NodeNotFound(&'static str),
}

//=== Config Errors =======================================================

/// Errors raised while loading a [`crate::config::FrameworkConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

//=== Crate Error =========================================================

/// Umbrella error for callers that do not care which subsystem failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_missing_type_and_tag() {
        let err = RegistryError::TaggedNotFound {
            type_name: "Spawner",
            tag: "Hero".to_string(),
        };
        assert_eq!(err.to_string(), "tagged service not found: Spawner[Hero]");
        assert_eq!(IndexError::IdNotFound(7).to_string(), "no connector registered with id 7");
    }

    #[test]
    fn crate_error_wraps_subsystem_errors() {
        let err: Error = RegistryError::EmptyTag.into();
        assert!(matches!(err, Error::Registry(RegistryError::EmptyTag)));
        assert_eq!(err.to_string(), "tag cannot be empty or whitespace");
    }
}
