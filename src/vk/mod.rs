//! VK API client: a thin HTTP wrapper with the retry policy the API
//! documents, plus the [`Provider`] trait the rest of the crate programs
//! against.

pub mod errors;
pub mod json;
pub mod models;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

pub use errors::VkApiError;
use models::{ItemList, RawCandidate, RawPhoto, SearchCriteria, VkEnvelope};

/// Delay before retrying a rate-limited call. Rate limiting is retried
/// indefinitely; the API lifts it within a few hundred milliseconds.
pub const RATE_LIMIT_DELAY: Duration = Duration::from_millis(300);

/// How many times a server-side error is retried before giving up.
pub const SERVER_ERROR_RETRIES: u32 = 5;

pub const CODE_RATE_LIMITED: i64 = 6;
pub const CODE_INTERNAL: i64 = 10;
pub const CODE_INVALID_USER: i64 = 113;

/// Profile fields requested for the current user and for match candidates.
pub const PROFILE_FIELDS: &str =
    "bdate,city,sex,common_count,games,music,movies,interests,tv,books,personal";

/// Extra fields requested from `users.search` so the sifter can filter
/// without further round-trips.
pub const SEARCH_FIELDS: &str = "blacklisted,blacklisted_by_me,relation";

/// Everything the matching pipeline needs from the remote API. Implemented
/// by [`VkApi`] for production and by in-memory fakes in tests.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Searches for candidate profiles around the given criteria.
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<RawCandidate>, VkApiError>;

    /// Fetches one full profile by numeric id or screen name.
    async fn get_profile(&self, ident: &str) -> Result<Value, VkApiError>;

    /// Fetches full profiles for a batch of numeric ids.
    async fn get_profiles(&self, ids: &[String]) -> Result<Vec<Value>, VkApiError>;

    /// Group ids the given user is a member of.
    async fn get_groups(&self, uid: i64) -> Result<Vec<i64>, VkApiError>;

    /// Resolves a city name to its id, if the API knows it.
    async fn find_city(&self, name: &str) -> Result<Option<i64>, VkApiError>;

    /// Fetches groups and profile photos for a batch of users in a single
    /// server-side scripted call. Results are positional: `groups[i]` and
    /// `photos[i]` belong to `ids[i]`. Users whose data is inaccessible get
    /// empty entries rather than failing the batch.
    async fn enrich(
        &self,
        ids: &[String],
    ) -> Result<(Vec<Vec<i64>>, Vec<Vec<RawPhoto>>), VkApiError>;
}

/// HTTP client for the VK REST API.
pub struct VkApi {
    http: reqwest::Client,
    base_url: String,
    version: String,
    token: String,
}

impl VkApi {
    pub fn new(base_url: &str, version: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            version: version.to_string(),
            token: token.to_string(),
        }
    }

    /// Performs one API method call, applying the retry policy: rate limits
    /// are waited out indefinitely, server errors are retried a bounded
    /// number of times, anything else propagates immediately.
    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, VkApiError> {
        let url = format!("{}/method/{}", self.base_url, method);
        let mut server_retries = 0u32;

        loop {
            let body = self
                .http
                .get(&url)
                .query(&[
                    ("access_token", self.token.as_str()),
                    ("v", self.version.as_str()),
                ])
                .query(params)
                .send()
                .await?
                .text()
                .await?;

            let envelope: VkEnvelope =
                json::parse_json_with_path(&body).map_err(|source| VkApiError::ParseFailed {
                    method: method.to_string(),
                    source,
                })?;

            if let Some(error) = envelope.error {
                match error.error_code {
                    CODE_RATE_LIMITED => {
                        debug!(method, "rate limited, backing off");
                        tokio::time::sleep(RATE_LIMIT_DELAY).await;
                        continue;
                    }
                    CODE_INTERNAL => {
                        server_retries += 1;
                        if server_retries >= SERVER_ERROR_RETRIES {
                            return Err(VkApiError::InternalServer {
                                method: method.to_string(),
                                message: error.error_msg,
                            });
                        }
                        warn!(
                            method,
                            attempt = server_retries,
                            "server error, retrying"
                        );
                        tokio::time::sleep(RATE_LIMIT_DELAY).await;
                        continue;
                    }
                    CODE_INVALID_USER => {
                        return Err(VkApiError::InvalidUserId(error.error_msg));
                    }
                    code => {
                        return Err(VkApiError::Api {
                            code,
                            message: error.error_msg,
                        });
                    }
                }
            }

            return envelope.response.ok_or_else(|| VkApiError::ParseFailed {
                method: method.to_string(),
                source: anyhow::anyhow!("envelope has neither response nor error"),
            });
        }
    }

    fn parse_response<T: serde::de::DeserializeOwned>(
        method: &str,
        value: Value,
    ) -> Result<T, VkApiError> {
        serde_json::from_value(value).map_err(|err| VkApiError::ParseFailed {
            method: method.to_string(),
            source: anyhow::Error::new(err),
        })
    }
}

#[async_trait]
impl Provider for VkApi {
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<RawCandidate>, VkApiError> {
        let params = [
            ("city", criteria.city.to_string()),
            ("sex", criteria.sex.to_string()),
            ("age_from", criteria.age_from.to_string()),
            ("age_to", criteria.age_to.to_string()),
            ("has_photo", criteria.has_photo.to_string()),
            ("count", criteria.count.to_string()),
            ("fields", SEARCH_FIELDS.to_string()),
        ];
        let response = self.call("users.search", &params).await?;
        let list: ItemList<RawCandidate> = Self::parse_response("users.search", response)?;
        Ok(list.items)
    }

    async fn get_profile(&self, ident: &str) -> Result<Value, VkApiError> {
        let params = [
            ("user_ids", ident.to_string()),
            ("fields", PROFILE_FIELDS.to_string()),
        ];
        let response = self.call("users.get", &params).await?;
        let mut profiles: Vec<Value> = Self::parse_response("users.get", response)?;
        if profiles.is_empty() {
            return Err(VkApiError::InvalidUserId(ident.to_string()));
        }
        Ok(profiles.swap_remove(0))
    }

    async fn get_profiles(&self, ids: &[String]) -> Result<Vec<Value>, VkApiError> {
        let params = [
            ("user_ids", ids.join(",")),
            ("fields", PROFILE_FIELDS.to_string()),
        ];
        let response = self.call("users.get", &params).await?;
        Self::parse_response("users.get", response)
    }

    async fn get_groups(&self, uid: i64) -> Result<Vec<i64>, VkApiError> {
        let params = [("user_id", uid.to_string())];
        let response = self.call("groups.get", &params).await?;
        let list: ItemList<i64> = Self::parse_response("groups.get", response)?;
        Ok(list.items)
    }

    async fn find_city(&self, name: &str) -> Result<Option<i64>, VkApiError> {
        let params = [("q", name.to_string()), ("count", "1".to_string())];
        let response = self.call("database.getCities", &params).await?;
        #[derive(serde::Deserialize)]
        struct City {
            id: i64,
        }
        let list: ItemList<City> = Self::parse_response("database.getCities", response)?;
        Ok(list.items.first().map(|city| city.id))
    }

    async fn enrich(
        &self,
        ids: &[String],
    ) -> Result<(Vec<Vec<i64>>, Vec<Vec<RawPhoto>>), VkApiError> {
        let code = build_enrich_script(ids);
        let response = self.call("execute", &[("code", code)]).await?;
        Ok(parse_enrich_response(ids.len(), &response))
    }
}

/// Builds the VKScript batch that fetches groups and profile photos for
/// every id in one `execute` call. The script must stay within the API's
/// 25-embedded-calls limit, so callers chunk ids before invoking this.
fn build_enrich_script(ids: &[String]) -> String {
    let list = ids.join(",");
    format!(
        "var ids = [{list}];\
         var groups = [];\
         var photos = [];\
         var i = 0;\
         while (i < ids.length) {{\
           groups.push(API.groups.get({{\"user_id\": ids[i]}}).items);\
           photos.push(API.photos.get({{\"owner_id\": ids[i], \"album_id\": \"profile\", \"extended\": 1}}).items);\
           i = i + 1;\
         }}\
         return [groups, photos];"
    )
}

/// Decodes the `[groups, photos]` pair an enrich script returns. Inner
/// entries are `false` when the target's data is closed off; those become
/// empty lists so positional alignment with the input ids is preserved.
fn parse_enrich_response(expected: usize, response: &Value) -> (Vec<Vec<i64>>, Vec<Vec<RawPhoto>>) {
    let parts = response.as_array();
    let raw_groups = parts
        .and_then(|p| p.first())
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let raw_photos = parts
        .and_then(|p| p.get(1))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut groups: Vec<Vec<i64>> = raw_groups
        .into_iter()
        .map(|entry| serde_json::from_value(entry).unwrap_or_default())
        .collect();
    let mut photos: Vec<Vec<RawPhoto>> = raw_photos
        .into_iter()
        .map(|entry| serde_json::from_value(entry).unwrap_or_default())
        .collect();

    groups.resize_with(expected, Vec::new);
    photos.resize_with(expected, Vec::new);
    (groups, photos)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn enrich_script_embeds_all_ids() {
        let ids = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        let code = build_enrich_script(&ids);
        assert!(code.contains("var ids = [1,2,3];"));
        assert!(code.contains("API.groups.get"));
        assert!(code.contains("API.photos.get"));
    }

    #[test]
    fn enrich_response_tolerates_closed_entries() {
        let response = json!([
            [[10, 20], false],
            [
                [{"likes": {"count": 5}, "sizes": [{"type": "x", "url": "u"}]}],
                false
            ]
        ]);
        let (groups, photos) = parse_enrich_response(2, &response);
        assert_eq!(groups, vec![vec![10, 20], vec![]]);
        assert_eq!(photos[0].len(), 1);
        assert!(photos[1].is_empty());
    }

    #[test]
    fn enrich_response_pads_to_expected_len() {
        let (groups, photos) = parse_enrich_response(3, &json!([[], []]));
        assert_eq!(groups.len(), 3);
        assert_eq!(photos.len(), 3);
    }
}
