//! Small text and JSON helpers shared across parsing and scoring.

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use serde_json::Value;

/// Characters stripped from free-form list fields before splitting.
const STRIPPED: &[char] = &['"', '^', ';', '!', '/', '|', '(', ')', '«', '»'];

/// Normalizes a free-form comma/newline separated field into lowercase
/// trimmed tokens. An empty input yields a single empty token, which keeps
/// token lists alignable with their source fields.
pub fn normalize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| !STRIPPED.contains(c))
        .map(|c| if c == '\n' { ',' } else { c })
        .collect();

    cleaned
        .split(',')
        .map(|part| part.trim().to_lowercase())
        .collect()
}

/// Counts distinct values present in both slices.
pub fn common<T: Eq + Hash>(a: &[T], b: &[T]) -> usize {
    let left: HashSet<&T> = a.iter().collect();
    let right: HashSet<&T> = b.iter().collect();
    left.intersection(&right).count()
}

/// Flattens one level of object nesting into dotted keys, so a provider
/// payload like `{"personal": {"smoking": 1}}` can be addressed as
/// `personal.smoking` by field maps. Deeper nesting is left as-is.
pub fn flatten(value: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = value {
        for (key, inner) in map {
            match inner {
                Value::Object(nested) => {
                    for (subkey, subvalue) in nested {
                        out.insert(format!("{key}.{subkey}"), subvalue.clone());
                    }
                }
                other => {
                    out.insert(key.clone(), other.clone());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn normalize_splits_and_lowercases() {
        assert_eq!(
            normalize("Rock; Jazz\nClassical (live)"),
            vec!["rock jazz", "classical live"]
        );
        assert_eq!(normalize("One, Two ,  THREE"), vec!["one", "two", "three"]);
    }

    #[test]
    fn normalize_empty_yields_single_empty_token() {
        assert_eq!(normalize(""), vec![""]);
    }

    #[test]
    fn normalize_strips_quotes_and_brackets() {
        assert_eq!(normalize("\"Dune\", «Alien»"), vec!["dune", "alien"]);
    }

    #[test]
    fn common_counts_distinct_shared_values() {
        let a = vec!["a".to_string(), "b".to_string(), "b".to_string()];
        let b = vec!["b".to_string(), "c".to_string()];
        assert_eq!(common(&a, &b), 1);
        assert_eq!(common::<i64>(&[], &[1, 2]), 0);
    }

    #[test]
    fn flatten_one_level() {
        let value = json!({
            "id": 5,
            "personal": {"smoking": 1, "alcohol": 2},
            "city": {"id": 99, "title": "Omsk"},
        });
        let flat = flatten(&value);
        assert_eq!(flat["id"], json!(5));
        assert_eq!(flat["personal.smoking"], json!(1));
        assert_eq!(flat["city.id"], json!(99));
        assert!(!flat.contains_key("personal"));
    }
}
