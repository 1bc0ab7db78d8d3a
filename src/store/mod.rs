/*!  store — typed repositories over a transactional SQLite store.
The schema carries the uniqueness constraints the protocol leans on:
one token and one receipt per (voter, election), globally unique vote
and receipt hashes, and cascading deletes from elections downward. */

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

use crate::error::VoteError;

pub mod election;
pub mod user;
pub mod voting;

pub use election::{Election, ElectionOption};
pub use user::Voter;
pub use voting::{Ballot, BlindToken, Receipt, TokenState};

/// Database connection pool
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open the store and create tables on first use.
    pub async fn connect(database_url: &str) -> Result<Self, VoteError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(VoteError::from)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Store { pool };
        store.create_tables().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a write transaction holding the write lock from the first
    /// statement. Concurrent casts serialize here instead of failing on a
    /// snapshot upgrade; the caller must finish with [`commit_tx`] or
    /// [`rollback_tx`].
    pub(crate) async fn begin_immediate(&self) -> Result<PoolConnection<Sqlite>, VoteError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(conn)
    }

    /// Create database tables if they don't exist
    async fn create_tables(&self) -> Result<(), VoteError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                display_name TEXT,
                password_hash TEXT NOT NULL,
                public_key TEXT,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS elections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                signing_key TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS options (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                election_id INTEGER NOT NULL
                    REFERENCES elections(id) ON DELETE CASCADE,
                option_text TEXT NOT NULL,
                option_order INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(election_id, option_order)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blind_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                voter_id INTEGER NOT NULL
                    REFERENCES users(id) ON DELETE CASCADE,
                election_id INTEGER NOT NULL
                    REFERENCES elections(id) ON DELETE CASCADE,
                blinded_token TEXT NOT NULL,
                signed_token TEXT,
                is_used INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                used_at TEXT,
                UNIQUE(voter_id, election_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Votes carry no voter reference, by construction.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS votes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                election_id INTEGER NOT NULL
                    REFERENCES elections(id) ON DELETE CASCADE,
                option_id INTEGER NOT NULL
                    REFERENCES options(id) ON DELETE CASCADE,
                unblinded_signature TEXT NOT NULL,
                vote_hash TEXT NOT NULL UNIQUE,
                encrypted_vote TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS voting_receipts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                voter_id INTEGER NOT NULL
                    REFERENCES users(id) ON DELETE CASCADE,
                election_id INTEGER NOT NULL
                    REFERENCES elections(id) ON DELETE CASCADE,
                receipt_hash TEXT NOT NULL UNIQUE,
                digital_signature TEXT NOT NULL,
                voted_at TEXT NOT NULL,
                UNIQUE(voter_id, election_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for idx in [
            "CREATE INDEX IF NOT EXISTS idx_blind_tokens_election ON blind_tokens(election_id)",
            "CREATE INDEX IF NOT EXISTS idx_votes_election ON votes(election_id)",
            "CREATE INDEX IF NOT EXISTS idx_votes_option ON votes(option_id)",
            "CREATE INDEX IF NOT EXISTS idx_receipts_election ON voting_receipts(election_id)",
        ] {
            sqlx::query(idx).execute(&self.pool).await?;
        }

        log::info!("Database tables created successfully");
        Ok(())
    }
}

pub(crate) async fn commit_tx(conn: &mut SqliteConnection) -> Result<(), VoteError> {
    sqlx::query("COMMIT").execute(conn).await?;
    Ok(())
}

pub(crate) async fn rollback_tx(conn: &mut SqliteConnection) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(conn).await {
        log::error!("Rollback failed: {e}");
    }
}
