use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Sqlite;

use crate::error::VoteError;

/// Election record. `signing_key` is the PKCS#8 PEM of the institutional
/// RSA key; it is excluded from every serialized view.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Election {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub signing_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ElectionOption {
    pub id: i64,
    pub election_id: i64,
    pub option_text: String,
    pub option_order: i64,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_election<'e, E>(
    ex: E,
    title: &str,
    description: Option<&str>,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    is_active: bool,
    signing_key: &str,
    now: DateTime<Utc>,
) -> Result<i64, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO elections
        (title, description, start_at, end_at, is_active, signing_key, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(start_at)
    .bind(end_at)
    .bind(is_active)
    .bind(signing_key)
    .bind(now)
    .execute(ex)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_option<'e, E>(
    ex: E,
    election_id: i64,
    option_text: &str,
    option_order: i64,
    now: DateTime<Utc>,
) -> Result<i64, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO options (election_id, option_text, option_order, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(election_id)
    .bind(option_text)
    .bind(option_order)
    .bind(now)
    .execute(ex)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn election_by_id<'e, E>(ex: E, id: i64) -> Result<Option<Election>, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, Election>("SELECT * FROM elections WHERE id = ?")
            .bind(id)
            .fetch_optional(ex)
            .await?,
    )
}

/// Options of an election in ballot order.
pub async fn options_of<'e, E>(
    ex: E,
    election_id: i64,
) -> Result<Vec<ElectionOption>, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, ElectionOption>(
        "SELECT * FROM options WHERE election_id = ? ORDER BY option_order",
    )
    .bind(election_id)
    .fetch_all(ex)
    .await?)
}

pub async fn option_in_election<'e, E>(
    ex: E,
    option_id: i64,
    election_id: i64,
) -> Result<bool, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query("SELECT 1 FROM options WHERE id = ? AND election_id = ?")
            .bind(option_id)
            .bind(election_id)
            .fetch_optional(ex)
            .await?
            .is_some(),
    )
}

/// Elections whose kill-switch is on and whose window contains `now`,
/// ordered by opening time.
pub async fn active_elections<'e, E>(
    ex: E,
    now: DateTime<Utc>,
) -> Result<Vec<Election>, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Election>(
        r#"
        SELECT * FROM elections
        WHERE is_active = 1 AND start_at <= ? AND end_at >= ?
        ORDER BY start_at
        "#,
    )
    .bind(now)
    .bind(now)
    .fetch_all(ex)
    .await?)
}

pub async fn update_signing_key<'e, E>(
    ex: E,
    election_id: i64,
    signing_key: &str,
) -> Result<bool, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE elections SET signing_key = ? WHERE id = ?")
        .bind(signing_key)
        .bind(election_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_election_active<'e, E>(
    ex: E,
    election_id: i64,
    active: bool,
) -> Result<bool, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE elections SET is_active = ? WHERE id = ?")
        .bind(active)
        .bind(election_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Administrative purge; foreign keys cascade to options, tokens, votes,
/// and receipts.
pub async fn delete_election<'e, E>(ex: E, election_id: i64) -> Result<bool, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM elections WHERE id = ?")
        .bind(election_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}
