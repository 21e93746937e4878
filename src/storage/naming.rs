//! Identifier checks and quoting for dynamically generated SQL.
//!
//! Values always travel as bound parameters; only table and column names are
//! spliced into statements, and only after passing [`validate_ident`].

use crate::domain::model::{DELETED_COLUMN, IDENTITY_COLUMN};
use crate::error::{MetaError, MetaResult};

pub fn validate_ident(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn ensure_ident(ident: &str) -> MetaResult<()> {
    if validate_ident(ident) {
        Ok(())
    } else {
        Err(MetaError::Configuration(format!("Invalid identifier '{}'", ident)))
    }
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `identity` and `deleted` are managed by the record layer, never by a field set.
pub fn is_reserved(column: &str) -> bool {
    column == IDENTITY_COLUMN || column == DELETED_COLUMN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers_only() {
        assert!(validate_ident("f_port"));
        assert!(validate_ident("_setting"));
        assert!(!validate_ident("1abc"));
        assert!(!validate_ident("name; DROP TABLE x"));
        assert!(!validate_ident(""));
        assert!(ensure_ident("a-b").is_err());
    }

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(quote_ident("ports"), "\"ports\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
