//! Input validation for store operations
//!
//! Everything in this module runs before the driver is called, so a rejected
//! input never reaches the server.
//!
//! # Checks
//! - Collection and database names (no system collections, no operators)
//! - Field names in records and update patches (no operator injection)
//! - Query documents (no server-side JavaScript operators)

use crate::Result;
use bson::{Bson, Document};
use shelter_common::ShelterError;

/// Maximum allowed length for collection names (MongoDB limit is 255, we're more conservative)
const MAX_COLLECTION_NAME_LENGTH: usize = 120;

/// Maximum allowed length for database names
const MAX_DATABASE_NAME_LENGTH: usize = 64;

/// Maximum allowed length for field names
const MAX_FIELD_NAME_LENGTH: usize = 1024;

/// Characters MongoDB rejects in database names
const INVALID_DATABASE_CHARS: &[char] = &['/', '\\', '.', ' ', '"', '$', '\0'];

/// Operators that execute JavaScript on the server
const DANGEROUS_OPERATORS: &[&str] = &["$where", "$function", "$accumulator"];

/// Checks a collection name
///
/// - Not empty
/// - At most 120 characters
/// - No null bytes
/// - No "system." prefix
/// - No $ characters
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ShelterError::Validation(
            "Collection name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_COLLECTION_NAME_LENGTH {
        return Err(ShelterError::Validation(format!(
            "Collection name exceeds maximum length of {} characters: '{}'",
            MAX_COLLECTION_NAME_LENGTH, name
        )));
    }

    if name.contains('\0') {
        return Err(ShelterError::Validation(
            "Collection name cannot contain null bytes".to_string(),
        ));
    }

    if name.starts_with("system.") {
        return Err(ShelterError::Validation(format!(
            "Collection name cannot start with 'system.' (reserved): '{}'",
            name
        )));
    }

    if name.contains('$') {
        return Err(ShelterError::Validation(format!(
            "Collection name cannot contain '$' character: '{}'",
            name
        )));
    }

    Ok(())
}

/// Checks a database name against the server's naming rules
pub fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ShelterError::Validation(
            "Database name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_DATABASE_NAME_LENGTH {
        return Err(ShelterError::Validation(format!(
            "Database name exceeds maximum length of {} characters: '{}'",
            MAX_DATABASE_NAME_LENGTH, name
        )));
    }

    if let Some(c) = name.chars().find(|c| INVALID_DATABASE_CHARS.contains(c)) {
        return Err(ShelterError::Validation(format!(
            "Database name cannot contain {:?}: '{}'",
            c, name
        )));
    }

    Ok(())
}

/// Checks a field name in a record or update patch
///
/// Operators are never legal here: records are stored as given and patches
/// are always wrapped in `$set`.
pub fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ShelterError::Validation(
            "Field name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_FIELD_NAME_LENGTH {
        return Err(ShelterError::Validation(format!(
            "Field name exceeds maximum length of {} characters",
            MAX_FIELD_NAME_LENGTH
        )));
    }

    if name.contains('\0') {
        return Err(ShelterError::Validation(
            "Field name cannot contain null bytes".to_string(),
        ));
    }

    if name.starts_with('$') {
        return Err(ShelterError::Validation(format!(
            "Field name cannot start with '$' (reserved for operators): '{}'",
            name
        )));
    }

    Ok(())
}

/// Validates every top-level key of `doc` as a field name
pub fn validate_field_names(doc: &Document) -> Result<()> {
    for key in doc.keys() {
        validate_field_name(key)?;
    }
    Ok(())
}

/// Rejects an empty document, naming it in the error as `what`
pub fn require_non_empty(doc: &Document, what: &str) -> Result<()> {
    if doc.is_empty() {
        return Err(ShelterError::Validation(format!("{} cannot be empty", what)));
    }
    Ok(())
}

/// Validates a query document for dangerous operators
///
/// The query is otherwise opaque; operator semantics are left to the server.
///
/// # Errors
/// Returns a validation error if `$where`, `$function` or `$accumulator`
/// appears at any depth.
pub fn validate_query(query: &Bson) -> Result<()> {
    match query {
        Bson::Document(doc) => {
            for (key, value) in doc.iter() {
                if DANGEROUS_OPERATORS.contains(&key.as_str()) {
                    return Err(ShelterError::Validation(format!(
                        "Dangerous operator '{}' is not allowed for security reasons",
                        key
                    )));
                }
                validate_query(value)?;
            }
            Ok(())
        }
        Bson::Array(arr) => {
            for item in arr {
                validate_query(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
