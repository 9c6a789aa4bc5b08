//! Stored user profiles.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sqlx::SqlitePool;

use crate::profile::{Sex, User};

/// Wrapper for JSON columns so their layout can evolve without guessing at
/// what an old row contains.
#[derive(Serialize, Deserialize)]
struct VersionedDoc<T> {
    v: u32,
    data: T,
}

const DOC_VERSION: u32 = 1;

fn encode<T: Serialize>(data: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(&VersionedDoc {
        v: DOC_VERSION,
        data,
    })
    .map_err(|err| sqlx::Error::Encode(Box::new(err)))
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, sqlx::Error> {
    let doc: VersionedDoc<T> =
        serde_json::from_str(raw).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
    Ok(doc.data)
}

/// Row shape for user listings.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserSummary {
    pub uid: i64,
    pub name: String,
    pub surname: String,
    pub age: i64,
}

pub async fn insert(pool: &SqlitePool, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (uid, name, surname, sex, age, city, interests, personal, group_ids)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(uid) DO UPDATE SET
            name = excluded.name,
            surname = excluded.surname,
            sex = excluded.sex,
            age = excluded.age,
            city = excluded.city,
            interests = excluded.interests,
            personal = excluded.personal,
            group_ids = excluded.group_ids
        "#,
    )
    .bind(user.uid)
    .bind(&user.name)
    .bind(&user.surname)
    .bind(user.sex.code())
    .bind(user.age)
    .bind(user.city)
    .bind(encode(&user.interests)?)
    .bind(encode(&user.personal)?)
    .bind(encode(&user.groups)?)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &SqlitePool, uid: i64) -> Result<Option<User>, sqlx::Error> {
    #[derive(sqlx::FromRow)]
    struct Row {
        uid: i64,
        name: String,
        surname: String,
        sex: i64,
        age: i64,
        city: i64,
        interests: String,
        personal: String,
        group_ids: String,
    }

    let row: Option<Row> = sqlx::query_as(
        "SELECT uid, name, surname, sex, age, city, interests, personal, group_ids \
         FROM users WHERE uid = ?",
    )
    .bind(uid)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(User {
            uid: row.uid,
            name: row.name,
            surname: row.surname,
            sex: Sex::from_code(row.sex),
            age: row.age,
            city: row.city,
            interests: decode::<IndexMap<String, Vec<String>>>(&row.interests)?,
            personal: decode::<IndexMap<String, String>>(&row.personal)?,
            groups: decode::<BTreeSet<i64>>(&row.group_ids)?,
        })
    })
    .transpose()
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<UserSummary>, sqlx::Error> {
    sqlx::query_as("SELECT uid, name, surname, age FROM users ORDER BY uid")
        .fetch_all(pool)
        .await
}

/// Deletes a user, cascading their matches and photos. Returns whether a
/// row existed.
pub async fn delete(pool: &SqlitePool, uid: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE uid = ?")
        .bind(uid)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::connect;

    fn sample_user() -> User {
        let mut interests = IndexMap::new();
        interests.insert("music".to_string(), vec!["rock".to_string()]);
        let mut personal = IndexMap::new();
        personal.insert("smoking".to_string(), "1".to_string());
        User {
            uid: 42,
            name: "Ira".into(),
            surname: "Volkova".into(),
            sex: Sex::Female,
            age: 27,
            city: 2,
            personal,
            interests,
            groups: BTreeSet::from([10, 20]),
        }
    }

    #[tokio::test]
    async fn round_trips_a_user() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let user = sample_user();
        insert(&pool, &user).await.unwrap();

        let loaded = get(&pool, 42).await.unwrap().unwrap();
        assert_eq!(loaded, user);
        assert!(get(&pool, 43).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_overwrites_existing_row() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let mut user = sample_user();
        insert(&pool, &user).await.unwrap();
        user.age = 28;
        insert(&pool, &user).await.unwrap();

        let listed = list(&pool).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].age, 28);
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let pool = connect("sqlite::memory:").await.unwrap();
        insert(&pool, &sample_user()).await.unwrap();
        assert!(delete(&pool, 42).await.unwrap());
        assert!(!delete(&pool, 42).await.unwrap());
    }
}
