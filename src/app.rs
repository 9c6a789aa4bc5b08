//! Application orchestrator: wires the provider, parser, scorer, and
//! storage into the user-facing operations.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::config::Config;
use crate::data::matches::{self, StoredMatch};
use crate::data::users::{self, UserSummary};
use crate::error::AppError;
use crate::matching;
use crate::profile::{FieldResolver, Photo, ProfileParser, Schema, User};
use crate::vk::{Provider, VkApiError};

/// How often candidate processing reports progress.
const PROGRESS_EVERY: usize = 100;

/// Knobs for one match run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub ignore_city: bool,
    pub ignore_age: bool,
    pub same_sex: bool,
}

pub struct App {
    provider: Arc<dyn Provider>,
    pool: SqlitePool,
    config: Config,
    parser: ProfileParser,
    current_user: Option<User>,
}

impl App {
    pub fn new(provider: Arc<dyn Provider>, pool: SqlitePool, config: Config) -> Self {
        let parser = ProfileParser::new(Schema::from_config(&config.fields));
        Self {
            provider,
            pool,
            config,
            parser,
            current_user: None,
        }
    }

    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    /// Sets the current user by id or screen name. A previously stored
    /// profile is loaded from the database; otherwise the provider profile
    /// is parsed (resolving missing fields) and persisted.
    pub async fn set_user(
        &mut self,
        ident: &str,
        resolver: &dyn FieldResolver,
    ) -> Result<UserSummary, AppError> {
        let mut raw = match self.provider.get_profile(ident).await {
            Ok(raw) => raw,
            Err(VkApiError::InvalidUserId(_)) => {
                return Err(AppError::UserNotFound(ident.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        if unavailable(&raw) {
            return Err(AppError::UserUnavailable);
        }

        let uid = raw
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| AppError::UserNotFound(ident.to_string()))?;

        if let Some(user) = users::get(&self.pool, uid).await? {
            info!(uid, name = %user.full_name(), "user loaded from the database");
            let summary = summarize(&user);
            self.current_user = Some(user);
            return Ok(summary);
        }

        if raw.pointer("/city/id").is_none() {
            let answer = resolver.resolve("city");
            if !answer.is_empty()
                && let Some(city_id) = self.provider.find_city(&answer).await?
            {
                raw["city"] = json!({ "id": city_id });
            }
        }

        let groups = self.provider.get_groups(uid).await?;
        let user = self.parser.parse_user(&raw, groups, resolver);
        users::insert(&self.pool, &user).await?;
        info!(uid, name = %user.full_name(), "user loaded from the API");

        let summary = summarize(&user);
        self.current_user = Some(user);
        Ok(summary)
    }

    /// Runs the full pipeline for the current user: search, sift,
    /// bulk-fetch, batched enrichment, parse, score, upsert. Returns the
    /// number of candidates processed; zero is a valid outcome and distinct
    /// from having no current user.
    pub async fn spawn_matches(&self, options: &SearchOptions) -> Result<usize, AppError> {
        let user = self.current_user.as_ref().ok_or(AppError::NoCurrentUser)?;

        let criteria = user.search_criteria(
            self.config.age_bound,
            self.config.search_count,
            options.ignore_city,
            options.ignore_age,
            options.same_sex,
            self.config.default_target_sex,
        );
        let candidates = self.provider.search(&criteria).await?;
        let ids = matching::sift(&candidates);
        if ids.is_empty() {
            info!("no candidates survived sifting");
            return Ok(0);
        }

        let profiles = self.provider.get_profiles(&ids).await?;

        // Enrichment batches run strictly one after another; each scripted
        // call covers batch_size candidates.
        let mut groups = Vec::with_capacity(ids.len());
        let mut photos = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.config.batch_size) {
            let (chunk_groups, chunk_photos) = self.provider.enrich(chunk).await?;
            groups.extend(chunk_groups);
            photos.extend(chunk_photos);
        }

        for (index, raw) in profiles.iter().enumerate() {
            let candidate_groups = groups.get(index).cloned().unwrap_or_default();
            let candidate_photos = top_photos(photos.get(index).map(Vec::as_slice).unwrap_or(&[]));

            let mut m = self.parser.parse_match(raw, candidate_groups, candidate_photos);
            matching::score(&mut m, user, &self.config.weights);
            matches::upsert(&self.pool, &m, user.uid).await?;

            if (index + 1) % PROGRESS_EVERY == 0 {
                debug!(processed = index + 1, total = profiles.len(), "scoring candidates");
            }
        }

        info!(
            uid = user.uid,
            count = profiles.len(),
            "match run complete"
        );
        Ok(profiles.len())
    }

    /// Pops the next page of unseen matches for a stored user, optionally
    /// exporting it as JSON.
    pub async fn next_matches(
        &self,
        uid: i64,
        export: bool,
    ) -> Result<Vec<StoredMatch>, AppError> {
        if users::get(&self.pool, uid).await?.is_none() {
            return Err(AppError::UserNotFound(uid.to_string()));
        }
        let page = matches::pop_next(&self.pool, uid, self.config.output_amount).await?;
        if export && !page.is_empty() {
            self.export_page(uid, &page).map_err(AppError::Export)?;
        }
        Ok(page)
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>, AppError> {
        Ok(users::list(&self.pool).await?)
    }

    /// Removes a stored user and everything cascaded from them. Clears the
    /// current user if it was the one removed.
    pub async fn delete_user(&mut self, uid: i64) -> Result<bool, AppError> {
        let deleted = users::delete(&self.pool, uid).await?;
        if deleted && self.current_user.as_ref().is_some_and(|u| u.uid == uid) {
            self.current_user = None;
        }
        Ok(deleted)
    }

    fn export_page(&self, uid: i64, page: &[StoredMatch]) -> anyhow::Result<()> {
        let dir = Path::new(&self.config.export_dir);
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(format!("{uid}_matches.json"));
        let body = serde_json::to_vec_pretty(page).context("failed to serialize matches")?;
        fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
        info!(uid, path = %path.display(), count = page.len(), "exported matches");
        Ok(())
    }
}

/// A profile is unusable when it is deactivated (banned/deleted) or closed
/// to the token's owner.
fn unavailable(raw: &Value) -> bool {
    let deactivated = raw
        .get("deactivated")
        .is_some_and(|value| !value.is_null());
    let closed = raw.get("is_closed").and_then(Value::as_bool).unwrap_or(false)
        && !raw
            .get("can_access_closed")
            .and_then(Value::as_bool)
            .unwrap_or(false);
    deactivated || closed
}

fn summarize(user: &User) -> UserSummary {
    UserSummary {
        uid: user.uid,
        name: user.name.clone(),
        surname: user.surname.clone(),
        age: user.age,
    }
}

/// Up to three photos, most liked first, skipping photos with no usable
/// rendition.
fn top_photos(raw: &[crate::vk::models::RawPhoto]) -> Vec<Photo> {
    let mut photos: Vec<Photo> = raw
        .iter()
        .filter_map(|photo| {
            photo.largest_link().map(|link| Photo {
                likes: photo.likes.count,
                link: link.to_string(),
            })
        })
        .collect();
    photos.sort_by(|a, b| b.likes.cmp(&a.likes));
    photos.truncate(3);
    photos
}

#[cfg(test)]
mod tests {
    use crate::vk::models::RawPhoto;
    use serde_json::json;

    use super::*;

    fn photo(likes: i64, url: &str) -> RawPhoto {
        serde_json::from_value(json!({
            "likes": {"count": likes},
            "sizes": [{"type": "x", "url": url}]
        }))
        .unwrap()
    }

    #[test]
    fn top_photos_keeps_three_most_liked() {
        let raw = vec![
            photo(1, "a"),
            photo(9, "b"),
            photo(4, "c"),
            photo(7, "d"),
        ];
        let picked = top_photos(&raw);
        let links: Vec<&str> = picked.iter().map(|p| p.link.as_str()).collect();
        assert_eq!(links, vec!["b", "d", "c"]);
    }

    #[test]
    fn top_photos_skips_entries_without_sizes() {
        let raw: Vec<RawPhoto> = vec![
            serde_json::from_value(json!({"likes": {"count": 10}, "sizes": []})).unwrap(),
            photo(1, "a"),
        ];
        let picked = top_photos(&raw);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].link, "a");
    }

    #[test]
    fn closed_profile_is_unavailable_unless_accessible() {
        assert!(unavailable(&json!({"id": 1, "is_closed": true})));
        assert!(!unavailable(
            &json!({"id": 1, "is_closed": true, "can_access_closed": true})
        ));
        assert!(unavailable(&json!({"id": 1, "deactivated": "banned"})));
        assert!(!unavailable(&json!({"id": 1})));
    }
}
