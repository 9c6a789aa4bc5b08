//! Stored match results and the seen/unseen paging over them.

use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::profile::Match;

/// A match as read back from storage, ready for display or export.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoredMatch {
    pub uid: i64,
    pub name: String,
    pub surname: String,
    pub profile: String,
    pub total_score: i64,
    pub photos: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct MatchRow {
    id: i64,
    uid: i64,
    name: String,
    surname: String,
    profile: String,
    total_score: i64,
}

/// Inserts or refreshes one match for the given owner, replacing photo
/// links positionally: existing rows are updated in id order, trailing
/// links inserted, surplus rows deleted. The whole write is one
/// transaction, so a failure leaves the previous state intact.
pub async fn upsert(pool: &SqlitePool, m: &Match, owner_uid: i64) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO matches (uid, user_uid, name, surname, profile, total_score)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(uid, user_uid) DO UPDATE SET
            name = excluded.name,
            surname = excluded.surname,
            profile = excluded.profile,
            total_score = excluded.total_score
        "#,
    )
    .bind(m.uid)
    .bind(owner_uid)
    .bind(&m.name)
    .bind(&m.surname)
    .bind(m.profile_url())
    .bind(m.total_score())
    .execute(&mut *tx)
    .await?;

    let (match_id,): (i64,) =
        sqlx::query_as("SELECT id FROM matches WHERE uid = ? AND user_uid = ?")
            .bind(m.uid)
            .bind(owner_uid)
            .fetch_one(&mut *tx)
            .await?;

    let existing: Vec<(i64,)> =
        sqlx::query_as("SELECT id FROM photos WHERE match_id = ? ORDER BY id")
            .bind(match_id)
            .fetch_all(&mut *tx)
            .await?;

    for (index, photo) in m.photos.iter().enumerate() {
        match existing.get(index) {
            Some((photo_id,)) => {
                sqlx::query("UPDATE photos SET link = ? WHERE id = ?")
                    .bind(&photo.link)
                    .bind(photo_id)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                sqlx::query("INSERT INTO photos (match_id, link) VALUES (?, ?)")
                    .bind(match_id)
                    .bind(&photo.link)
                    .execute(&mut *tx)
                    .await?;
            }
        }
    }
    for (photo_id,) in existing.iter().skip(m.photos.len()) {
        sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(photo_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await
}

async fn photo_links(
    tx: &mut Transaction<'_, Sqlite>,
    match_id: i64,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT link FROM photos WHERE match_id = ? ORDER BY id")
            .bind(match_id)
            .fetch_all(&mut **tx)
            .await?;
    Ok(rows.into_iter().map(|(link,)| link).collect())
}

/// All not-yet-shown matches for the owner, best first. Does not mark
/// anything as seen.
pub async fn get_unseen(pool: &SqlitePool, owner_uid: i64) -> Result<Vec<StoredMatch>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let rows: Vec<MatchRow> = sqlx::query_as(
        "SELECT id, uid, name, surname, profile, total_score FROM matches \
         WHERE user_uid = ? AND seen = 0 ORDER BY total_score DESC, uid ASC",
    )
    .bind(owner_uid)
    .fetch_all(&mut *tx)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let photos = photo_links(&mut tx, row.id).await?;
        out.push(StoredMatch {
            uid: row.uid,
            name: row.name,
            surname: row.surname,
            profile: row.profile,
            total_score: row.total_score,
            photos,
        });
    }
    tx.commit().await?;
    Ok(out)
}

/// Returns up to `count` unseen matches, best first, marking each returned
/// row as seen within the same transaction. Repeated calls drain the unseen
/// set; an empty result means there is nothing left.
pub async fn pop_next(
    pool: &SqlitePool,
    owner_uid: i64,
    count: u32,
) -> Result<Vec<StoredMatch>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let rows: Vec<MatchRow> = sqlx::query_as(
        "SELECT id, uid, name, surname, profile, total_score FROM matches \
         WHERE user_uid = ? AND seen = 0 ORDER BY total_score DESC, uid ASC LIMIT ?",
    )
    .bind(owner_uid)
    .bind(i64::from(count))
    .fetch_all(&mut *tx)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let photos = photo_links(&mut tx, row.id).await?;
        sqlx::query("UPDATE matches SET seen = 1 WHERE id = ?")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        out.push(StoredMatch {
            uid: row.uid,
            name: row.name,
            surname: row.surname,
            profile: row.profile,
            total_score: row.total_score,
            photos,
        });
    }
    tx.commit().await?;
    Ok(out)
}
