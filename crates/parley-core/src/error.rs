use thiserror::Error;

/// Top-level error type for the parley system.
///
/// Subsystem crates define their own error types and wrap `ParleyError` via
/// `#[from]` so that the `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Domain error: {0}")]
    Domain(String),

    #[error("{}", describe_duplicates(.groups))]
    DuplicateNames { groups: Vec<DuplicateGroup> },

    #[error("Domain schema violation: {0}")]
    Schema(String),

    #[error(
        "Can not access action '{name}', as that name is not a registered action for this domain. \
         Available actions are: {}",
        .available.join(", ")
    )]
    UnknownAction { name: String, available: Vec<String> },

    #[error("Can not access action at index {index}. Domain has {count} actions.")]
    ActionIndexOutOfRange { index: usize, count: usize },

    #[error(
        "Domain specification has changed. You MUST retrain the policy. \
         Detected mismatch in domain specification. The following features have been \
         removed: {}; the following features have been added: {}",
        .removed.join(", "),
        .added.join(", ")
    )]
    SpecificationMismatch {
        removed: Vec<String>,
        added: Vec<String>,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Names of one kind (actions, intents, slots, entities) that occur more
/// than once in a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub kind: &'static str,
    pub names: Vec<String>,
}

fn describe_duplicates(groups: &[DuplicateGroup]) -> String {
    groups
        .iter()
        .map(|g| {
            format!(
                "Duplicate {0} in domain. These {0} occur more than once in the domain: {1}",
                g.kind,
                g.names.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<toml::de::Error> for ParleyError {
    fn from(err: toml::de::Error) -> Self {
        ParleyError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ParleyError {
    fn from(err: toml::ser::Error) -> Self {
        ParleyError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(err: serde_json::Error) -> Self {
        ParleyError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ParleyError {
    fn from(err: serde_yaml::Error) -> Self {
        ParleyError::Schema(err.to_string())
    }
}

/// A specialized `Result` type for parley operations.
pub type Result<T> = std::result::Result<T, ParleyError>;
