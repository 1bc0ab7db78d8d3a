use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Sqlite;

use crate::error::VoteError;

/// Lifecycle states of a blind token. Transitions are monotonic:
/// UNSIGNED → SIGNED → USED, each visited at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenState {
    Unsigned,
    Signed,
    Used,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlindToken {
    pub id: i64,
    pub voter_id: i64,
    pub election_id: i64,
    pub blinded_token: String,
    pub signed_token: Option<String>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl BlindToken {
    pub fn state(&self) -> TokenState {
        if self.is_used {
            TokenState::Used
        } else if self.signed_token.is_some() {
            TokenState::Signed
        } else {
            TokenState::Unsigned
        }
    }
}

/// Anonymous ballot row. No column references a voter.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Ballot {
    pub id: i64,
    pub election_id: i64,
    pub option_id: i64,
    pub unblinded_signature: String,
    pub vote_hash: String,
    pub encrypted_vote: String,
    pub created_at: DateTime<Utc>,
}

/// Participation witness: proves the voter voted without recording what for.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Receipt {
    pub id: i64,
    pub voter_id: i64,
    pub election_id: i64,
    pub receipt_hash: String,
    pub digital_signature: String,
    pub voted_at: DateTime<Utc>,
}

pub async fn token_for<'e, E>(
    ex: E,
    voter_id: i64,
    election_id: i64,
) -> Result<Option<BlindToken>, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, BlindToken>(
        "SELECT * FROM blind_tokens WHERE voter_id = ? AND election_id = ?",
    )
    .bind(voter_id)
    .bind(election_id)
    .fetch_optional(ex)
    .await?)
}

pub async fn token_by_id<'e, E>(ex: E, id: i64) -> Result<Option<BlindToken>, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, BlindToken>("SELECT * FROM blind_tokens WHERE id = ?")
            .bind(id)
            .fetch_optional(ex)
            .await?,
    )
}

/// Insert an UNSIGNED token. The unique (voter, election) index is the
/// authoritative guard against a concurrent duplicate request.
pub async fn insert_token<'e, E>(
    ex: E,
    voter_id: i64,
    election_id: i64,
    blinded_token: &str,
    now: DateTime<Utc>,
) -> Result<i64, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO blind_tokens (voter_id, election_id, blinded_token, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(voter_id)
    .bind(election_id)
    .bind(blinded_token)
    .bind(now)
    .execute(ex)
    .await?;
    Ok(result.last_insert_rowid())
}

/// UNSIGNED → SIGNED. Affects no rows when the token is already signed.
pub async fn store_signed_token<'e, E>(
    ex: E,
    token_id: i64,
    signed_token: &str,
) -> Result<u64, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE blind_tokens SET signed_token = ? WHERE id = ? AND signed_token IS NULL",
    )
    .bind(signed_token)
    .bind(token_id)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

/// SIGNED → USED. Affects no rows unless the token is signed and unspent.
pub async fn mark_token_used<'e, E>(
    ex: E,
    token_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE blind_tokens SET is_used = 1, used_at = ?
        WHERE id = ? AND is_used = 0 AND signed_token IS NOT NULL
        "#,
    )
    .bind(now)
    .bind(token_id)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

pub async fn pending_tokens<'e, E>(
    ex: E,
    election_id: Option<i64>,
) -> Result<Vec<BlindToken>, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let tokens = match election_id {
        Some(id) => {
            sqlx::query_as::<_, BlindToken>(
                r#"
                SELECT * FROM blind_tokens
                WHERE election_id = ? AND signed_token IS NULL
                ORDER BY created_at
                "#,
            )
            .bind(id)
            .fetch_all(ex)
            .await?
        }
        None => {
            sqlx::query_as::<_, BlindToken>(
                "SELECT * FROM blind_tokens WHERE signed_token IS NULL ORDER BY created_at",
            )
            .fetch_all(ex)
            .await?
        }
    };
    Ok(tokens)
}

pub async fn receipt_for<'e, E>(
    ex: E,
    voter_id: i64,
    election_id: i64,
) -> Result<Option<Receipt>, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Receipt>(
        "SELECT * FROM voting_receipts WHERE voter_id = ? AND election_id = ?",
    )
    .bind(voter_id)
    .bind(election_id)
    .fetch_optional(ex)
    .await?)
}

/// The `vote_hash` column is unique across the entire store.
pub async fn vote_hash_exists<'e, E>(ex: E, vote_hash: &str) -> Result<bool, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query("SELECT 1 FROM votes WHERE vote_hash = ?")
        .bind(vote_hash)
        .fetch_optional(ex)
        .await?
        .is_some())
}

pub async fn insert_vote<'e, E>(
    ex: E,
    election_id: i64,
    option_id: i64,
    unblinded_signature: &str,
    vote_hash: &str,
    encrypted_vote: &str,
    now: DateTime<Utc>,
) -> Result<i64, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO votes
        (election_id, option_id, unblinded_signature, vote_hash, encrypted_vote, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(election_id)
    .bind(option_id)
    .bind(unblinded_signature)
    .bind(vote_hash)
    .bind(encrypted_vote)
    .bind(now)
    .execute(ex)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_receipt<'e, E>(
    ex: E,
    voter_id: i64,
    election_id: i64,
    receipt_hash: &str,
    digital_signature: &str,
    now: DateTime<Utc>,
) -> Result<i64, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO voting_receipts
        (voter_id, election_id, receipt_hash, digital_signature, voted_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(voter_id)
    .bind(election_id)
    .bind(receipt_hash)
    .bind(digital_signature)
    .bind(now)
    .execute(ex)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Per-option ballot counts for one election.
pub async fn vote_counts<'e, E>(
    ex: E,
    election_id: i64,
) -> Result<Vec<(i64, i64)>, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT option_id, COUNT(*) FROM votes
        WHERE election_id = ?
        GROUP BY option_id
        "#,
    )
    .bind(election_id)
    .fetch_all(ex)
    .await?)
}

pub async fn count_ballots<'e, E>(ex: E, election_id: i64) -> Result<i64, VoteError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM votes WHERE election_id = ?")
            .bind(election_id)
            .fetch_one(ex)
            .await?;
    Ok(count)
}
