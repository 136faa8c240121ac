//! Parsing of presentation documents into typed inputs.
//!
//! Forms submit JSON objects with camelCase keys, and HTML number inputs
//! arrive as strings. Numbers and ids therefore accept either a JSON number or
//! a numeric string; blank strings count as absent.

use crate::errors::{Error, Result};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt::Display;
use std::str::FromStr;

/// Deserializes `document` into `T`, rejecting any key listed in `protected`
/// with a message naming the field. Every failure is a validation error.
pub(crate) fn parse_document<T>(kind: &str, document: Value, protected: &[&str]) -> Result<T>
where
    T: DeserializeOwned,
{
    let Value::Object(fields) = &document else {
        return Err(Error::validation(format!(
            "{kind} document must be a JSON object"
        )));
    };
    if let Some(field) = protected.iter().find(|field| fields.contains_key(**field)) {
        return Err(Error::validation(format!(
            "{field} is maintained by the fleet and cannot be set on a {kind}"
        )));
    }
    serde_json::from_value(document)
        .map_err(|e| Error::validation(format!("Invalid {kind} document: {e}")))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText<T> {
    Number(T),
    Text(String),
}

/// `deserialize_with` helper for optional numeric fields.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: Display,
{
    match Option::<NumberOrText<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(value)) => Ok(Some(value)),
        Some(NumberOrText::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse()
                .map(Some)
                .map_err(|e| D::Error::custom(format!("expected a number, found {text:?}: {e}")))
        }
    }
}

/// `deserialize_with` helper for numeric patch fields that can be cleared.
/// Pair it with `#[serde(default)]`: an absent key stays `None`, while a
/// blank or null value becomes `Some(None)`.
pub(crate) fn clearable<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: Display,
{
    lenient(deserializer).map(Some)
}

/// Trims a required text field, rejecting missing or blank values.
pub(crate) fn required_text(value: Option<String>, field: &str) -> Result<String> {
    optional_text(value).ok_or_else(|| Error::validation(format!("{field} is required")))
}

/// Trims an optional text field; blank becomes `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Rejects NaN, infinities and negative amounts.
pub(crate) fn non_negative(value: f64, field: &str) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::validation(format!(
            "{field} must be a non-negative number, got {value}"
        )))
    }
}

/// Like [`non_negative`] for optional fields.
pub(crate) fn optional_non_negative(value: Option<f64>, field: &str) -> Result<Option<f64>> {
    value.map(|v| non_negative(v, field)).transpose()
}
