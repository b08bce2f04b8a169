use thiserror::Error;

/// Failures that must stay distinguishable across the translation
/// pipeline. Recoverable-local conditions (unknown block types,
/// unresolved lift references) are diagnostics, not errors, and never
/// appear here.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("malformed OPC container: {0}")]
    ContainerMalformed(String),

    #[error("malformed XML in {path}: {message}")]
    XmlMalformed { path: String, message: String },

    #[error("malformed endpoint '{0}'")]
    EndpointMalformed(String),

    #[error("system '{0}' not found in model")]
    SystemNotFound(String),

    #[error("unbreakable cycle in system '{system}' involving blocks {blocks:?}")]
    UnbreakableCycle {
        system: String,
        blocks: Vec<String>,
    },

    #[error("transfer function order {0} is not supported")]
    UnsupportedOrder(usize),

    #[error("metadata error: {0}")]
    Metadata(String),
}

pub type Result<T> = std::result::Result<T, TranslateError>;
