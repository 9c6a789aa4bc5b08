//! Profile domain types and the schema-driven parser that turns raw
//! provider payloads into them.

use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::sync::LazyLock;

use chrono::{Datelike, Local, NaiveDate};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::FieldMaps;
use crate::utils::{flatten, normalize};
use crate::vk::models::SearchCriteria;

/// Age assumed when a birth date cannot be parsed even after a corrective
/// prompt.
pub const DEFAULT_AGE: i64 = 18;

/// Lower bound the search age window is clamped to.
const MIN_SEARCH_AGE: i64 = 18;

/// Age window half-width used when age filtering is disabled.
const UNBOUNDED_AGE_RANGE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Unknown,
    #[default]
    Female,
    Male,
}

impl Sex {
    /// VK wire code: 0 unspecified, 1 female, 2 male.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Sex::Female,
            2 => Sex::Male,
            _ => Sex::Unknown,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Sex::Unknown => 0,
            Sex::Female => 1,
            Sex::Male => 2,
        }
    }

    /// Sex to search for. An unspecified own sex falls back to `assumed`
    /// before the same/opposite rule is applied.
    pub fn target(self, same_sex: bool, assumed: Sex) -> Sex {
        let own = if self == Sex::Unknown { assumed } else { self };
        if same_sex {
            own
        } else {
            match own {
                Sex::Female => Sex::Male,
                Sex::Male => Sex::Female,
                Sex::Unknown => Sex::Unknown,
            }
        }
    }
}

/// The current user, as parsed from their profile. Every attribute named by
/// the field mapping is present as a key, even when its value is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: i64,
    pub name: String,
    pub surname: String,
    pub sex: Sex,
    pub age: i64,
    pub city: i64,
    pub personal: IndexMap<String, String>,
    pub interests: IndexMap<String, Vec<String>>,
    pub groups: BTreeSet<i64>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }

    /// Search parameters centered on this user's profile.
    pub fn search_criteria(
        &self,
        age_bound: i64,
        count: u32,
        ignore_city: bool,
        ignore_age: bool,
        same_sex: bool,
        assumed_sex: Sex,
    ) -> SearchCriteria {
        let bound = if ignore_age {
            UNBOUNDED_AGE_RANGE
        } else {
            age_bound
        };
        SearchCriteria {
            city: if ignore_city { 0 } else { self.city },
            sex: self.sex.target(same_sex, assumed_sex).code(),
            age_from: (self.age - bound).max(MIN_SEARCH_AGE),
            age_to: self.age + bound,
            has_photo: 1,
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub likes: i64,
    pub link: String,
}

/// A scored match candidate. The total score is always recomputed from the
/// components; it is never stored independently in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub uid: i64,
    pub name: String,
    pub surname: String,
    pub common_friends: i64,
    pub personal: IndexMap<String, String>,
    pub interests: IndexMap<String, Vec<String>>,
    pub groups: BTreeSet<i64>,
    pub photos: Vec<Photo>,
    /// Reserved for future scoring signals, always 0 for now.
    pub base_score: i64,
    pub interests_score: i64,
    pub personal_score: i64,
    pub friends_score: i64,
    pub groups_score: i64,
}

impl Match {
    pub fn total_score(&self) -> i64 {
        self.base_score
            + self.interests_score
            + self.personal_score
            + self.friends_score
            + self.groups_score
    }

    pub fn profile_url(&self) -> String {
        format!("https://vk.com/id{}", self.uid)
    }
}

/// Provider-field to canonical-attribute mappings, fixed at startup from
/// configuration.
#[derive(Debug, Clone)]
pub struct Schema {
    general_user: IndexMap<String, String>,
    general_match: IndexMap<String, String>,
    interests: IndexMap<String, String>,
    personal: IndexMap<String, String>,
}

impl Schema {
    pub fn from_config(maps: &FieldMaps) -> Self {
        Self {
            general_user: maps.general_user.clone(),
            general_match: maps.general_match.clone(),
            interests: maps.interests.clone(),
            personal: maps.personal.clone(),
        }
    }
}

/// Supplies values for profile fields the provider left empty.
pub trait FieldResolver: Send + Sync {
    fn resolve(&self, attr: &str) -> String;
}

/// Asks on stdin. Used by the interactive binary.
pub struct PromptResolver;

impl FieldResolver for PromptResolver {
    fn resolve(&self, attr: &str) -> String {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "Your profile has no `{attr}`, please enter it: ");
        let _ = stdout.flush();
        let mut answer = String::new();
        let _ = std::io::stdin().lock().read_line(&mut answer);
        answer.trim().to_string()
    }
}

/// Resolves everything to an empty string. Used where prompting is
/// impossible or undesired.
pub struct DefaultResolver;

impl FieldResolver for DefaultResolver {
    fn resolve(&self, _attr: &str) -> String {
        String::new()
    }
}

static BDATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}\.\d{1,2}\.\d{4}$").expect("valid regex"));

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_i64() == Some(0),
        _ => false,
    }
}

/// Resolver answers are plain text; digit-only answers are coerced so they
/// can fill numeric slots like city or sex codes.
fn coerce_answer(answer: &str) -> Value {
    if !answer.is_empty() && answer.chars().all(|c| c.is_ascii_digit()) {
        answer
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(answer))
    } else {
        Value::from(answer)
    }
}

fn age_from_bdate(text: &str) -> Option<i64> {
    if !BDATE_RE.is_match(text) {
        return None;
    }
    let birth = NaiveDate::parse_from_str(text, "%d.%m.%Y").ok()?;
    let today = Local::now().date_naive();
    let mut age = i64::from(today.year()) - i64::from(birth.year());
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    Some(age)
}

fn age_from_value(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return (n > 0).then_some(n);
    }
    value.as_str().and_then(age_from_bdate)
}

/// Turns a birth-date (or directly entered age) value into years, asking
/// the resolver once for a correction before falling back to the default.
fn derive_age(value: &Value, resolver: &dyn FieldResolver) -> i64 {
    if let Some(age) = age_from_value(value) {
        return age;
    }
    let answer = coerce_answer(&resolver.resolve("birth date (dd.mm.yyyy)"));
    match age_from_value(&answer) {
        Some(age) => age,
        None => {
            warn!(age = DEFAULT_AGE, "could not determine age, using default");
            DEFAULT_AGE
        }
    }
}

fn string_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Schema-driven parser for raw profile payloads.
pub struct ProfileParser {
    schema: Schema,
}

impl ProfileParser {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    /// Parses the current user's profile. Missing mapped values are filled
    /// through the resolver; the birth date gets one corrective attempt
    /// before defaulting.
    pub fn parse_user(&self, raw: &Value, groups: Vec<i64>, resolver: &dyn FieldResolver) -> User {
        let flat = flatten(raw);

        let mut general: IndexMap<&str, Value> = IndexMap::new();
        let mut age_value = Value::Null;
        for (field, attr) in &self.schema.general_user {
            let mut value = flat.get(field).cloned().unwrap_or(Value::Null);
            if is_missing(&value) && attr != "age" {
                value = coerce_answer(&resolver.resolve(attr));
            }
            if attr == "age" {
                age_value = value;
            } else {
                general.insert(attr.as_str(), value);
            }
        }

        let mut personal = IndexMap::new();
        for (field, attr) in &self.schema.personal {
            let mut value = flat.get(field).cloned().unwrap_or(Value::Null);
            if is_missing(&value) {
                value = coerce_answer(&resolver.resolve(attr));
            }
            personal.insert(attr.clone(), string_of(&value));
        }

        let mut interests = IndexMap::new();
        for (field, attr) in &self.schema.interests {
            let mut value = flat.get(field).cloned().unwrap_or(Value::Null);
            if is_missing(&value) {
                value = Value::from(resolver.resolve(attr));
            }
            interests.insert(attr.clone(), normalize(&string_of(&value)));
        }

        User {
            uid: general.get("uid").and_then(Value::as_i64).unwrap_or(0),
            name: general.get("name").map(string_of).unwrap_or_default(),
            surname: general.get("surname").map(string_of).unwrap_or_default(),
            sex: Sex::from_code(general.get("sex").and_then(Value::as_i64).unwrap_or(0)),
            age: derive_age(&age_value, resolver),
            city: general.get("city").and_then(Value::as_i64).unwrap_or(0),
            personal,
            interests,
            groups: groups.into_iter().collect(),
        }
    }

    /// Parses a match candidate. Never prompts: missing values degrade to
    /// empty strings or zero.
    pub fn parse_match(&self, raw: &Value, groups: Vec<i64>, photos: Vec<Photo>) -> Match {
        let flat = flatten(raw);

        let mut general: IndexMap<&str, Value> = IndexMap::new();
        for (field, attr) in &self.schema.general_match {
            general.insert(
                attr.as_str(),
                flat.get(field).cloned().unwrap_or(Value::Null),
            );
        }

        let mut personal = IndexMap::new();
        for (field, attr) in &self.schema.personal {
            let value = flat.get(field).cloned().unwrap_or(Value::Null);
            personal.insert(attr.clone(), string_of(&value));
        }

        let mut interests = IndexMap::new();
        for (field, attr) in &self.schema.interests {
            let value = flat.get(field).cloned().unwrap_or(Value::Null);
            interests.insert(attr.clone(), normalize(&string_of(&value)));
        }

        Match {
            uid: general.get("uid").and_then(Value::as_i64).unwrap_or(0),
            name: general.get("name").map(string_of).unwrap_or_default(),
            surname: general.get("surname").map(string_of).unwrap_or_default(),
            common_friends: general
                .get("common_friends")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            personal,
            interests,
            groups: groups.into_iter().collect(),
            photos,
            base_score: 0,
            interests_score: 0,
            personal_score: 0,
            friends_score: 0,
            groups_score: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    struct CannedResolver(&'static str);

    impl FieldResolver for CannedResolver {
        fn resolve(&self, _attr: &str) -> String {
            self.0.to_string()
        }
    }

    fn parser() -> ProfileParser {
        ProfileParser::new(Schema::from_config(&FieldMaps::default()))
    }

    #[test]
    fn parse_user_maps_general_and_interest_fields() {
        let raw = json!({
            "id": 101,
            "first_name": "Ira",
            "last_name": "Volkova",
            "sex": 1,
            "bdate": "2.11.1998",
            "city": {"id": 2, "title": "Saint Petersburg"},
            "music": "Rock, Jazz",
            "personal": {"smoking": 1},
        });
        let user = parser().parse_user(&raw, vec![5, 7], &DefaultResolver);
        assert_eq!(user.uid, 101);
        assert_eq!(user.sex, Sex::Female);
        assert_eq!(user.city, 2);
        assert_eq!(user.interests["music"], vec!["rock", "jazz"]);
        assert_eq!(user.personal["smoking"], "1");
        assert!(user.groups.contains(&7));
        // Unmapped-but-empty attributes still appear as keys.
        assert_eq!(user.interests["books"], vec![""]);
        assert_eq!(user.personal["religion"], "");
    }

    #[test]
    fn parse_user_age_defaults_after_failed_correction() {
        let raw = json!({"id": 1, "first_name": "A", "last_name": "B", "sex": 2});
        let user = parser().parse_user(&raw, vec![], &DefaultResolver);
        assert_eq!(user.age, DEFAULT_AGE);
    }

    #[test]
    fn parse_user_age_from_corrective_answer() {
        let raw = json!({"id": 1, "first_name": "A", "last_name": "B", "sex": 2, "bdate": "2.11"});
        let user = parser().parse_user(&raw, vec![], &CannedResolver("25"));
        assert_eq!(user.age, 25);
    }

    #[test]
    fn age_accounts_for_birthday_not_yet_reached() {
        let today = Local::now().date_naive();
        let upcoming = today + Duration::days(30);
        let bdate = format!(
            "{}.{}.{}",
            upcoming.day(),
            upcoming.month(),
            upcoming.year() - 30
        );
        // The 30th birthday is a month away, so only 29 full years passed.
        assert_eq!(age_from_bdate(&bdate), Some(29));
    }

    #[test]
    fn parse_match_never_prompts_and_zeroes_missing() {
        let raw = json!({"id": 7, "first_name": "C", "last_name": "D"});
        let m = parser().parse_match(&raw, vec![], vec![]);
        assert_eq!(m.common_friends, 0);
        assert_eq!(m.total_score(), 0);
        assert_eq!(m.profile_url(), "https://vk.com/id7");
    }

    #[test]
    fn target_sex_rules() {
        assert_eq!(Sex::Female.target(false, Sex::Female), Sex::Male);
        assert_eq!(Sex::Male.target(true, Sex::Female), Sex::Male);
        assert_eq!(Sex::Unknown.target(false, Sex::Female), Sex::Male);
        assert_eq!(Sex::Unknown.target(true, Sex::Male), Sex::Male);
    }

    #[test]
    fn search_criteria_clamps_and_widens() {
        let user = User {
            uid: 1,
            name: "A".into(),
            surname: "B".into(),
            sex: Sex::Male,
            age: 20,
            city: 99,
            personal: IndexMap::new(),
            interests: IndexMap::new(),
            groups: BTreeSet::new(),
        };
        let criteria = user.search_criteria(5, 1000, false, false, false, Sex::Female);
        assert_eq!(criteria.age_from, 18); // 20 - 5 clamped
        assert_eq!(criteria.age_to, 25);
        assert_eq!(criteria.city, 99);
        assert_eq!(criteria.sex, Sex::Female.code());

        let wide = user.search_criteria(5, 1000, true, true, false, Sex::Female);
        assert_eq!(wide.city, 0);
        assert_eq!(wide.age_to, 120);
        assert_eq!(wide.age_from, 18);
    }
}
