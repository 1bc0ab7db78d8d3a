/*!  token.rs — blind-token authority.
Accepts a blinded message from an enrolled voter, signs it with the
election key, and tracks the token through its UNSIGNED → SIGNED → USED
lifecycle. The unique (voter, election) index is the authoritative guard
against concurrent duplicate requests. */

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::crypto::{self, CryptoError};
use crate::election::window_open;
use crate::error::VoteError;
use crate::store::{self, BlindToken, Store, TokenState};
use crate::util::is_lowercase_hex;

/// Owner- or admin-visible view of a token's lifecycle position.
#[derive(Debug, Serialize)]
pub struct TokenStatus {
    pub token_id: i64,
    pub signed: bool,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenAuthority {
    store: Store,
}

impl TokenAuthority {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Issue a signed token for `(voter, election)`.
    ///
    /// Inserts the UNSIGNED row first, then signs on the blocking pool and
    /// stores the blob. If signing fails the row stays UNSIGNED, where
    /// `pending_for` surfaces it and [`TokenAuthority::sign_token`] can
    /// complete it administratively.
    pub async fn request_token(
        &self,
        voter_id: i64,
        election_id: i64,
        blinded_hex: &str,
    ) -> Result<BlindToken, VoteError> {
        if !is_lowercase_hex(blinded_hex) {
            return Err(VoteError::BadInput(
                "blinded token must be lowercase hex".to_string(),
            ));
        }

        let election = store::election::election_by_id(self.store.pool(), election_id)
            .await?
            .ok_or(VoteError::NotFound("election"))?;
        if !window_open(&election, Utc::now()) {
            return Err(VoteError::Closed);
        }

        if store::voting::token_for(self.store.pool(), voter_id, election_id)
            .await?
            .is_some()
        {
            return Err(VoteError::DuplicateToken);
        }

        let token_id = store::voting::insert_token(
            self.store.pool(),
            voter_id,
            election_id,
            blinded_hex,
            Utc::now(),
        )
        .await?;

        let signing_key = election.signing_key;
        let blinded = blinded_hex.to_string();
        let signed_blob = tokio::task::spawn_blocking(move || {
            crypto::blind_sign(&blinded, &signing_key)
        })
        .await
        .map_err(|e| VoteError::Internal(e.into()))?
        .map_err(|e| match e {
            CryptoError::Key => VoteError::KeyMaterial,
            CryptoError::Sign => VoteError::BadInput(
                "blinded token does not match the election key".to_string(),
            ),
            other => other.into(),
        })?;

        store::voting::store_signed_token(self.store.pool(), token_id, &signed_blob).await?;
        log::info!("Blind signature issued for election {election_id}");

        store::voting::token_by_id(self.store.pool(), token_id)
            .await?
            .ok_or(VoteError::NotFound("token"))
    }

    /// Administrative override: attach a signature to a token that is still
    /// UNSIGNED. Re-signing is rejected.
    pub async fn sign_token(
        &self,
        token_id: i64,
        signed_blob: &str,
    ) -> Result<BlindToken, VoteError> {
        if signed_blob.is_empty()
            || general_purpose::STANDARD.decode(signed_blob).is_err()
        {
            return Err(VoteError::BadInput(
                "signed token must be base64".to_string(),
            ));
        }
        let token = store::voting::token_by_id(self.store.pool(), token_id)
            .await?
            .ok_or(VoteError::NotFound("token"))?;
        if token.state() != TokenState::Unsigned {
            return Err(VoteError::DuplicateToken);
        }
        if store::voting::store_signed_token(self.store.pool(), token_id, signed_blob).await? != 1 {
            return Err(VoteError::DuplicateToken);
        }
        store::voting::token_by_id(self.store.pool(), token_id)
            .await?
            .ok_or(VoteError::NotFound("token"))
    }

    /// SIGNED → USED. A second call fails cleanly with `TokenSpent`.
    pub async fn mark_used(&self, token_id: i64) -> Result<BlindToken, VoteError> {
        let token = store::voting::token_by_id(self.store.pool(), token_id)
            .await?
            .ok_or(VoteError::NotFound("token"))?;
        match token.state() {
            TokenState::Unsigned => return Err(VoteError::TokenUnsigned),
            TokenState::Used => return Err(VoteError::TokenSpent),
            TokenState::Signed => {}
        }
        if store::voting::mark_token_used(self.store.pool(), token_id, Utc::now()).await? != 1 {
            return Err(VoteError::TokenSpent);
        }
        store::voting::token_by_id(self.store.pool(), token_id)
            .await?
            .ok_or(VoteError::NotFound("token"))
    }

    /// Tokens still waiting for a signature, optionally per election.
    pub async fn pending_for(
        &self,
        election_id: Option<i64>,
    ) -> Result<Vec<BlindToken>, VoteError> {
        store::voting::pending_tokens(self.store.pool(), election_id).await
    }

    /// Lifecycle status of a token, visible only to its owner or an admin.
    /// Anyone else learns nothing, not even that the token exists.
    pub async fn status(
        &self,
        token_id: i64,
        requester_id: i64,
    ) -> Result<TokenStatus, VoteError> {
        let token = store::voting::token_by_id(self.store.pool(), token_id)
            .await?
            .ok_or(VoteError::NotFound("token"))?;
        if token.voter_id != requester_id
            && !store::user::is_admin(self.store.pool(), requester_id).await?
        {
            return Err(VoteError::NotFound("token"));
        }
        Ok(TokenStatus {
            token_id: token.id,
            signed: token.signed_token.is_some(),
            used: token.is_used,
            created_at: token.created_at,
        })
    }

    /// The voter's own token for an election, if any.
    pub async fn token_of(
        &self,
        voter_id: i64,
        election_id: i64,
    ) -> Result<Option<BlindToken>, VoteError> {
        store::voting::token_for(self.store.pool(), voter_id, election_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn request_returns_a_signed_token() {
        let fx = testutil::fixture().await;
        let voter = testutil::enroll(&fx.store, "ana", false).await;
        let election = testutil::open_election(&fx.registry).await;

        let blinded = testutil::blind_message(&fx, election.election.id, &[7u8; 32]).await;
        let token = fx
            .authority
            .request_token(voter.id, election.election.id, &blinded.blinded_hex)
            .await
            .unwrap();

        assert_eq!(token.state(), TokenState::Signed);
        assert!(token.signed_token.is_some());
        assert!(!token.is_used);
        assert!(token.used_at.is_none());
    }

    #[tokio::test]
    async fn second_request_is_a_duplicate() {
        let fx = testutil::fixture().await;
        let voter = testutil::enroll(&fx.store, "ana", false).await;
        let election = testutil::open_election(&fx.registry).await;

        let blinded = testutil::blind_message(&fx, election.election.id, &[7u8; 32]).await;
        fx.authority
            .request_token(voter.id, election.election.id, &blinded.blinded_hex)
            .await
            .unwrap();

        let again = testutil::blind_message(&fx, election.election.id, &[8u8; 32]).await;
        let err = fx
            .authority
            .request_token(voter.id, election.election.id, &again.blinded_hex)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "duplicate_token");
    }

    #[tokio::test]
    async fn request_respects_window_and_existence() {
        let fx = testutil::fixture().await;
        let voter = testutil::enroll(&fx.store, "ana", false).await;

        let err = fx
            .authority
            .request_token(voter.id, 424_242, "abcd")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let closed = testutil::closed_election(&fx.registry).await;
        let err = fx
            .authority
            .request_token(voter.id, closed.election.id, "abcd")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "closed");
    }

    #[tokio::test]
    async fn request_rejects_malformed_hex() {
        let fx = testutil::fixture().await;
        let voter = testutil::enroll(&fx.store, "ana", false).await;
        let election = testutil::open_election(&fx.registry).await;

        for bad in ["ABCD", "abc", "", "zzzz"] {
            let err = fx
                .authority
                .request_token(voter.id, election.election.id, bad)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "bad_input", "input {bad:?}");
        }
    }

    #[tokio::test]
    async fn lifecycle_is_monotonic() {
        let fx = testutil::fixture().await;
        let voter = testutil::enroll(&fx.store, "ana", false).await;
        let election = testutil::open_election(&fx.registry).await;

        let blinded = testutil::blind_message(&fx, election.election.id, &[7u8; 32]).await;
        let token = fx
            .authority
            .request_token(voter.id, election.election.id, &blinded.blinded_hex)
            .await
            .unwrap();

        // Signed tokens cannot be re-signed.
        let err = fx.authority.sign_token(token.id, "c2ln").await.unwrap_err();
        assert_eq!(err.kind(), "duplicate_token");

        let used = fx.authority.mark_used(token.id).await.unwrap();
        assert_eq!(used.state(), TokenState::Used);
        assert!(used.used_at.is_some());

        let err = fx.authority.mark_used(token.id).await.unwrap_err();
        assert_eq!(err.kind(), "token_spent");
    }

    #[tokio::test]
    async fn unsigned_tokens_cannot_be_spent() {
        let fx = testutil::fixture().await;
        let voter = testutil::enroll(&fx.store, "ana", false).await;
        let election = testutil::open_election(&fx.registry).await;

        // Insert an UNSIGNED row directly, as if signing had failed.
        let token_id = crate::store::voting::insert_token(
            fx.store.pool(),
            voter.id,
            election.election.id,
            "abcd",
            Utc::now(),
        )
        .await
        .unwrap();

        let err = fx.authority.mark_used(token_id).await.unwrap_err();
        assert_eq!(err.kind(), "token_unsigned");

        let pending = fx
            .authority
            .pending_for(Some(election.election.id))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, token_id);

        // The administrative override completes it.
        let signed = fx.authority.sign_token(token_id, "c2lnbmVk").await.unwrap();
        assert_eq!(signed.state(), TokenState::Signed);
        assert!(fx.authority.pending_for(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_is_restricted_to_owner_or_admin() {
        let fx = testutil::fixture().await;
        let owner = testutil::enroll(&fx.store, "ana", false).await;
        let other = testutil::enroll(&fx.store, "bruno", false).await;
        let admin = testutil::enroll(&fx.store, "root", true).await;
        let election = testutil::open_election(&fx.registry).await;

        let blinded = testutil::blind_message(&fx, election.election.id, &[7u8; 32]).await;
        let token = fx
            .authority
            .request_token(owner.id, election.election.id, &blinded.blinded_hex)
            .await
            .unwrap();

        let mine = fx.authority.status(token.id, owner.id).await.unwrap();
        assert!(mine.signed && !mine.used);

        let theirs = fx.authority.status(token.id, admin.id).await.unwrap();
        assert!(theirs.signed);

        let err = fx.authority.status(token.id, other.id).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
