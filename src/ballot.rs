/*!  ballot.rs — atomic ballot submission engine.
One transaction runs the whole precondition pipeline and the three-row
mutation: insert the anonymous ballot, insert the voter-linked receipt,
and burn the blind token. Any failure rolls everything back, so a voter
who hits a transient error can retry with the same token and the same
vote hash. */

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::crypto;
use crate::election::window_open;
use crate::error::VoteError;
use crate::store::{self, Ballot, Receipt, Store, TokenState};
use crate::util::is_sha256_hex;

/// The eight fields of a complete cast request. The voter identity arrives
/// already authenticated; everything else is voter-supplied material.
#[derive(Debug, Clone)]
pub struct CastBallot {
    pub voter_id: i64,
    pub election_id: i64,
    pub option_id: i64,
    pub unblinded_signature: String,
    pub vote_hash: String,
    pub encrypted_payload: String,
    pub receipt_hash: String,
    pub receipt_signature: String,
}

#[derive(Debug, Serialize)]
pub struct CastOutcome {
    pub ballot: Ballot,
    pub receipt: Receipt,
}

#[derive(Clone)]
pub struct BallotEngine {
    store: Store,
}

impl BallotEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Cast a ballot. On success a Ballot, a Receipt, and the token's USED
    /// transition all exist; on failure none do.
    pub async fn cast_ballot(&self, req: CastBallot) -> Result<CastOutcome, VoteError> {
        validate_formats(&req)?;

        // One clock sample per transaction.
        let now = Utc::now();
        let mut conn = self.store.begin_immediate().await?;
        let result = cast_in_tx(&mut conn, &req, now).await;
        match result {
            Ok(outcome) => {
                store::commit_tx(&mut conn).await?;
                log::info!(
                    "Ballot recorded for election {} (receipt {})",
                    req.election_id,
                    outcome.receipt.id
                );
                Ok(outcome)
            }
            Err(e) => {
                store::rollback_tx(&mut conn).await;
                Err(e)
            }
        }
    }

    /// Whether the voter holds a receipt for this election. Receipts, not
    /// ballots, are the "has voted" oracle; ballots are never queried per
    /// voter.
    pub async fn has_voted(&self, voter_id: i64, election_id: i64) -> Result<bool, VoteError> {
        Ok(
            store::voting::receipt_for(self.store.pool(), voter_id, election_id)
                .await?
                .is_some(),
        )
    }

    pub async fn receipt_of(&self, voter_id: i64, election_id: i64) -> Result<Receipt, VoteError> {
        store::voting::receipt_for(self.store.pool(), voter_id, election_id)
            .await?
            .ok_or(VoteError::NotFound("receipt"))
    }
}

fn validate_formats(req: &CastBallot) -> Result<(), VoteError> {
    if !is_sha256_hex(&req.vote_hash) {
        return Err(VoteError::BadInput(
            "vote hash must be 64 lowercase hex characters".to_string(),
        ));
    }
    if !is_sha256_hex(&req.receipt_hash) {
        return Err(VoteError::BadInput(
            "receipt hash must be 64 lowercase hex characters".to_string(),
        ));
    }
    for (name, value) in [
        ("unblinded signature", &req.unblinded_signature),
        ("encrypted payload", &req.encrypted_payload),
        ("receipt signature", &req.receipt_signature),
    ] {
        if value.is_empty() || general_purpose::STANDARD.decode(value).is_err() {
            return Err(VoteError::BadInput(format!("{name} must be base64")));
        }
    }
    Ok(())
}

async fn cast_in_tx(
    conn: &mut SqliteConnection,
    req: &CastBallot,
    now: DateTime<Utc>,
) -> Result<CastOutcome, VoteError> {
    // 1–2. The election exists and its window is open.
    let election = store::election::election_by_id(&mut *conn, req.election_id)
        .await?
        .ok_or(VoteError::NotFound("election"))?;
    if !window_open(&election, now) {
        return Err(VoteError::Closed);
    }

    // 3. The voter holds a SIGNED, unspent token.
    let token = store::voting::token_for(&mut *conn, req.voter_id, req.election_id)
        .await?
        .ok_or(VoteError::NoToken)?;
    match token.state() {
        TokenState::Unsigned => return Err(VoteError::TokenUnsigned),
        TokenState::Used => {
            // A re-cast after success reads better as "already voted" when
            // the receipt confirms it; a burnt token without one is spent.
            let voted = store::voting::receipt_for(&mut *conn, req.voter_id, req.election_id)
                .await?
                .is_some();
            return Err(if voted {
                VoteError::AlreadyVoted
            } else {
                VoteError::TokenSpent
            });
        }
        TokenState::Signed => {}
    }

    // 4. No prior receipt for (voter, election).
    if store::voting::receipt_for(&mut *conn, req.voter_id, req.election_id)
        .await?
        .is_some()
    {
        return Err(VoteError::AlreadyVoted);
    }

    // 5. The vote hash is globally unused.
    if store::voting::vote_hash_exists(&mut *conn, &req.vote_hash).await? {
        return Err(VoteError::DuplicateBallot);
    }

    // 6. The option belongs to this election.
    if !store::election::option_in_election(&mut *conn, req.option_id, req.election_id).await? {
        return Err(VoteError::BadOption);
    }

    // 7. The unblinded signature verifies against the election key.
    let pub_pem =
        crypto::public_key_pem(&election.signing_key).map_err(|_| VoteError::KeyMaterial)?;
    if !crypto::verify_blind_signature(&req.vote_hash, &req.unblinded_signature, &pub_pem) {
        log::warn!(
            "Rejected ballot with invalid signature for election {}",
            req.election_id
        );
        return Err(VoteError::InvalidSignature);
    }

    // 8. Anonymous ballot; no voter reference.
    let ballot_id = store::voting::insert_vote(
        &mut *conn,
        req.election_id,
        req.option_id,
        &req.unblinded_signature,
        &req.vote_hash,
        &req.encrypted_payload,
        now,
    )
    .await?;

    // 9. Participation receipt. The unique (voter, election) index
    // serializes simultaneous submissions: exactly one commits.
    let receipt_id = store::voting::insert_receipt(
        &mut *conn,
        req.voter_id,
        req.election_id,
        &req.receipt_hash,
        &req.receipt_signature,
        now,
    )
    .await?;

    // 10. Burn the token.
    if store::voting::mark_token_used(&mut *conn, token.id, now).await? != 1 {
        return Err(VoteError::TokenSpent);
    }

    Ok(CastOutcome {
        ballot: Ballot {
            id: ballot_id,
            election_id: req.election_id,
            option_id: req.option_id,
            unblinded_signature: req.unblinded_signature.clone(),
            vote_hash: req.vote_hash.clone(),
            encrypted_vote: req.encrypted_payload.clone(),
            created_at: now,
        },
        receipt: Receipt {
            id: receipt_id,
            voter_id: req.voter_id,
            election_id: req.election_id,
            receipt_hash: req.receipt_hash.clone(),
            digital_signature: req.receipt_signature.clone(),
            voted_at: now,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn cast_requires_wellformed_fields() {
        let fx = testutil::fixture().await;
        let base = CastBallot {
            voter_id: 1,
            election_id: 1,
            option_id: 1,
            unblinded_signature: "c2ln".to_string(),
            vote_hash: "a".repeat(64),
            encrypted_payload: "cGF5bG9hZA==".to_string(),
            receipt_hash: "b".repeat(64),
            receipt_signature: "c2ln".to_string(),
        };

        let mut bad_hash = base.clone();
        bad_hash.vote_hash = "A".repeat(64);
        let err = fx.engine.cast_ballot(bad_hash).await.unwrap_err();
        assert_eq!(err.kind(), "bad_input");

        let mut short_receipt = base.clone();
        short_receipt.receipt_hash = "ab".to_string();
        let err = fx.engine.cast_ballot(short_receipt).await.unwrap_err();
        assert_eq!(err.kind(), "bad_input");

        let mut bad_sig = base.clone();
        bad_sig.unblinded_signature = "!!!".to_string();
        let err = fx.engine.cast_ballot(bad_sig).await.unwrap_err();
        assert_eq!(err.kind(), "bad_input");

        // Well-formed fields against a missing election.
        let err = fx.engine.cast_ballot(base).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn cast_rejects_closed_and_tokenless() {
        let fx = testutil::fixture().await;
        let voter = testutil::enroll(&fx.store, "ana", false).await;

        let closed = testutil::closed_election(&fx.registry).await;
        let req = testutil::dummy_cast(voter.id, closed.election.id, closed.options[0].id);
        let err = fx.engine.cast_ballot(req).await.unwrap_err();
        assert_eq!(err.kind(), "closed");

        let open = testutil::open_election(&fx.registry).await;
        let req = testutil::dummy_cast(voter.id, open.election.id, open.options[0].id);
        let err = fx.engine.cast_ballot(req).await.unwrap_err();
        assert_eq!(err.kind(), "no_token");
    }

    #[tokio::test]
    async fn cast_rejects_unsigned_token() {
        let fx = testutil::fixture().await;
        let voter = testutil::enroll(&fx.store, "ana", false).await;
        let open = testutil::open_election(&fx.registry).await;

        crate::store::voting::insert_token(
            fx.store.pool(),
            voter.id,
            open.election.id,
            "abcd",
            Utc::now(),
        )
        .await
        .unwrap();

        let req = testutil::dummy_cast(voter.id, open.election.id, open.options[0].id);
        let err = fx.engine.cast_ballot(req).await.unwrap_err();
        assert_eq!(err.kind(), "token_unsigned");
    }

    #[tokio::test]
    async fn cast_rejects_foreign_option() {
        let fx = testutil::fixture().await;
        let voter = testutil::enroll(&fx.store, "ana", false).await;
        let open = testutil::open_election(&fx.registry).await;
        let other = testutil::open_election(&fx.registry).await;

        let mut req = testutil::prepare_vote(&fx, voter.id, &open, 0).await;
        req.option_id = other.options[0].id;
        let err = fx.engine.cast_ballot(req).await.unwrap_err();
        assert_eq!(err.kind(), "bad_option");
    }

    #[tokio::test]
    async fn invalid_signature_is_a_hard_reject_with_no_writes() {
        let fx = testutil::fixture().await;
        let voter = testutil::enroll(&fx.store, "ana", false).await;
        let open = testutil::open_election(&fx.registry).await;

        let mut req = testutil::prepare_vote(&fx, voter.id, &open, 0).await;
        // A validly-encoded signature that does not verify.
        req.unblinded_signature = general_purpose::STANDARD.encode([0u8; 256]);

        let err = fx.engine.cast_ballot(req.clone()).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_signature");

        // Nothing was written and the token survives.
        assert!(!fx.engine.has_voted(voter.id, open.election.id).await.unwrap());
        let token = fx
            .authority
            .token_of(voter.id, open.election.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.state(), TokenState::Signed);
        assert_eq!(
            crate::store::voting::count_ballots(fx.store.pool(), open.election.id)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn receipt_reads_follow_the_receipt_table() {
        let fx = testutil::fixture().await;
        let voter = testutil::enroll(&fx.store, "ana", false).await;
        let open = testutil::open_election(&fx.registry).await;

        let err = fx
            .engine
            .receipt_of(voter.id, open.election.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let req = testutil::prepare_vote(&fx, voter.id, &open, 0).await;
        let outcome = fx.engine.cast_ballot(req.clone()).await.unwrap();

        assert!(fx.engine.has_voted(voter.id, open.election.id).await.unwrap());
        let receipt = fx
            .engine
            .receipt_of(voter.id, open.election.id)
            .await
            .unwrap();
        assert_eq!(receipt.id, outcome.receipt.id);
        assert_eq!(receipt.receipt_hash, req.receipt_hash);
    }
}
