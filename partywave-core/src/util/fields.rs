use std::{collections::HashMap, str::FromStr};

use crate::{StoreError, StoreResult};

/// Reads a required field out of a stored hash.
pub fn required_field<'a>(
    key: &str,
    fields: &'a HashMap<String, String>,
    name: &'static str,
) -> StoreResult<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            field: name,
            value: String::new(),
        })
}

/// Reads and parses a required field out of a stored hash.
pub fn parse_field<T>(key: &str, fields: &HashMap<String, String>, name: &'static str) -> StoreResult<T>
where
    T: FromStr,
{
    let raw = required_field(key, fields, name)?;

    raw.parse().map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        field: name,
        value: raw.to_string(),
    })
}

/// Parses a value that is not part of a hash, such as a set member.
pub fn parse_value<T>(key: &str, field: &'static str, raw: &str) -> StoreResult<T>
where
    T: FromStr,
{
    raw.parse().map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        field,
        value: raw.to_string(),
    })
}
