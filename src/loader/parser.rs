use serde::de::DeserializeOwned;
use std::fs;

use crate::error::Result;

/// Parses a JSON file into a given type `T`, converting IO/deserialize
/// failures into [`crate::error::Error`] the same way every other input
/// path into the engine does.
pub fn parse_json_file<T: DeserializeOwned>(file_path: &str) -> Result<T> {
    let data = fs::read_to_string(file_path)?;
    let parsed: T = serde_json::from_str(&data)?;
    Ok(parsed)
}
