//! Wire types for the VK API surface this crate touches.

use serde::Deserialize;
use serde_json::Value;

/// Minimal candidate record returned by `users.search`. Only the fields the
/// sifter needs are typed; everything else is dropped at deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCandidate {
    pub id: i64,
    #[serde(default)]
    pub blacklisted: i64,
    #[serde(default)]
    pub blacklisted_by_me: i64,
    #[serde(default)]
    pub relation: Option<i64>,
    #[serde(default)]
    pub is_closed: bool,
    #[serde(default)]
    pub deactivated: Option<String>,
}

/// Parameters for a `users.search` call, derived from the current user's
/// profile plus the configured search options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    pub city: i64,
    /// VK sex code: 0 any, 1 female, 2 male.
    pub sex: i64,
    pub age_from: i64,
    pub age_to: i64,
    pub has_photo: i64,
    pub count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LikesCount {
    pub count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// A profile-album photo with its like count and available renditions.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPhoto {
    pub likes: LikesCount,
    #[serde(default)]
    pub sizes: Vec<PhotoSize>,
}

/// VK size types ordered smallest to largest.
const SIZE_RANK: &[&str] = &["s", "m", "x", "o", "p", "q", "r", "y", "z", "w"];

impl RawPhoto {
    /// URL of the largest available rendition, if the photo has any.
    pub fn largest_link(&self) -> Option<&str> {
        self.sizes
            .iter()
            .max_by_key(|size| {
                SIZE_RANK
                    .iter()
                    .position(|rank| *rank == size.kind)
                    .unwrap_or(0)
            })
            .map(|size| size.url.as_str())
    }
}

/// Top-level VK response envelope: exactly one of `response` or `error`
/// is present.
#[derive(Debug, Deserialize)]
pub struct VkEnvelope {
    pub response: Option<Value>,
    pub error: Option<VkErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct VkErrorBody {
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
}

/// Standard `{"count": N, "items": [...]}` list wrapper.
#[derive(Debug, Deserialize)]
pub struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}
