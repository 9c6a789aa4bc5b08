//! Application configuration, layered from `vkinder.toml` and
//! `VKINDER_`-prefixed environment variables.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::profile::Sex;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub access_token: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How many matches a single `next` call pops.
    #[serde(default = "default_output_amount")]
    pub output_amount: u32,
    /// Search result count requested from the provider.
    #[serde(default = "default_search_count")]
    pub search_count: u32,
    /// How many candidates each enrichment batch covers.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Half-width of the candidate age window around the user's age.
    #[serde(default = "default_age_bound")]
    pub age_bound: i64,
    /// Sex to search for when the user's profile does not specify one.
    #[serde(default)]
    pub default_target_sex: Sex,
    /// Directory exported match lists are written to.
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default)]
    pub fields: FieldMaps,
}

/// Per-component multipliers applied by the scoring engine. Per-field
/// defaults let a deployment override one weight without restating the
/// rest.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub interests: i64,
    pub personal: i64,
    pub friends: i64,
    pub groups: i64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            interests: 10,
            personal: 20,
            friends: 30,
            groups: 10,
        }
    }
}

/// Mapping from provider field names (dotted for one level of nesting) to
/// canonical attribute names. The enumeration is fixed here; deployments
/// override individual entries, not the schema shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldMaps {
    pub general_user: IndexMap<String, String>,
    pub general_match: IndexMap<String, String>,
    pub interests: IndexMap<String, String>,
    pub personal: IndexMap<String, String>,
}

fn map(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for FieldMaps {
    fn default() -> Self {
        Self {
            general_user: map(&[
                ("id", "uid"),
                ("first_name", "name"),
                ("last_name", "surname"),
                ("sex", "sex"),
                ("bdate", "age"),
                ("city.id", "city"),
            ]),
            general_match: map(&[
                ("id", "uid"),
                ("first_name", "name"),
                ("last_name", "surname"),
                ("common_count", "common_friends"),
            ]),
            interests: map(&[
                ("interests", "interests"),
                ("music", "music"),
                ("movies", "movies"),
                ("tv", "tv"),
                ("books", "books"),
                ("games", "games"),
            ]),
            personal: map(&[
                ("personal.political", "political"),
                ("personal.religion", "religion"),
                ("personal.life_main", "life_main"),
                ("personal.people_main", "people_main"),
                ("personal.smoking", "smoking"),
                ("personal.alcohol", "alcohol"),
            ]),
        }
    }
}

fn default_api_url() -> String {
    "https://api.vk.com".to_string()
}

fn default_api_version() -> String {
    "5.131".to_string()
}

fn default_database_url() -> String {
    "sqlite://vkinder.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_amount() -> u32 {
    10
}

fn default_search_count() -> u32 {
    1000
}

fn default_batch_size() -> usize {
    12
}

fn default_age_bound() -> i64 {
    5
}

fn default_export_dir() -> String {
    "data".to_string()
}

impl Config {
    /// Loads configuration with environment variables taking precedence
    /// over the TOML file. Nested keys use `__`, e.g.
    /// `VKINDER_WEIGHTS__FRIENDS=50`.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("vkinder.toml"))
            .merge(Env::prefixed("VKINDER_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(toml: &str) -> Config {
        Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .expect("config should extract")
    }

    #[test]
    fn defaults_cover_everything_but_the_token() {
        let config = extract(r#"access_token = "secret""#);
        assert_eq!(config.output_amount, 10);
        assert_eq!(config.batch_size, 12);
        assert_eq!(config.weights.friends, 30);
        assert_eq!(config.default_target_sex, Sex::Female);
        assert_eq!(
            config.fields.general_user.get("bdate").map(String::as_str),
            Some("age")
        );
    }

    #[test]
    fn partial_overrides_keep_sibling_defaults() {
        let config = extract(
            r#"
            access_token = "secret"
            output_amount = 3
            default_target_sex = "male"

            [weights]
            interests = 7
            "#,
        );
        assert_eq!(config.weights.interests, 7);
        assert_eq!(config.weights.personal, 20);
        assert_eq!(config.output_amount, 3);
        assert_eq!(config.default_target_sex, Sex::Male);
    }
}
