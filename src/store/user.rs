use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Sqlite;

use crate::error::VoteError;

/// Enrolled voter record. Append-only from the protocol's perspective: the
/// voting flow never mutates a voter.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Voter {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub public_key: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_voter<'e, E>(
    ex: E,
    username: &str,
    display_name: Option<&str>,
    password_hash: &str,
    public_key: Option<&str>,
    is_admin: bool,
    now: DateTime<Utc>,
) -> Result<Voter, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, display_name, password_hash, public_key, is_admin, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(username)
    .bind(display_name)
    .bind(password_hash)
    .bind(public_key)
    .bind(is_admin)
    .bind(now)
    .execute(ex)
    .await?;

    Ok(Voter {
        id: result.last_insert_rowid(),
        username: username.to_string(),
        display_name: display_name.map(str::to_string),
        password_hash: password_hash.to_string(),
        public_key: public_key.map(str::to_string),
        is_admin,
        created_at: now,
    })
}

pub async fn voter_by_id<'e, E>(ex: E, id: i64) -> Result<Option<Voter>, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Voter>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(ex)
        .await?)
}

pub async fn voter_by_username<'e, E>(
    ex: E,
    username: &str,
) -> Result<Option<Voter>, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, Voter>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(ex)
            .await?,
    )
}

pub async fn is_admin<'e, E>(ex: E, voter_id: i64) -> Result<bool, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(voter_by_id(ex, voter_id).await?.is_some_and(|v| v.is_admin))
}
