//! JSON parsing helper for the VK API client.

use anyhow::Result;

/// Attempt to parse JSON and, on failure, report the serde path to the
/// offending value alongside the underlying error. API payloads here are
/// deeply nested, so a bare "invalid type at line 1 column 5812" is useless
/// without the path.
pub fn parse_json_with_path<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    match serde_path_to_error::deserialize(jd) {
        Ok(value) => Ok(value),
        Err(err) => {
            let path = err.path().to_string();
            let inner = err.into_inner();
            if path.is_empty() || path == "." {
                Err(anyhow::anyhow!(inner))
            } else {
                Err(anyhow::anyhow!("at path '{path}': {inner}"))
            }
        }
    }
}
