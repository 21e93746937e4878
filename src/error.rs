use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetaError {
    /// Something was used before it was bound (entity without a table, dropped registry, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Raised by domain-level `validate` hooks; the core never produces it.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type MetaResult<T> = std::result::Result<T, MetaError>;

impl MetaError {
    pub fn unbound(what: &str) -> Self {
        Self::Configuration(format!("{} is not bound to a table", what))
    }

    pub fn unknown_field(class: &str, field: &str) -> Self {
        Self::Configuration(format!("Class '{}' has no field '{}'", class, field))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
