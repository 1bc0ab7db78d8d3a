use thiserror::Error;

/// Business errors surfaced by the protocol core.
///
/// Every precondition failure inside the cast transaction maps to one of
/// these kinds and rolls the transaction back before any write. The external
/// layer translates kinds to HTTP statuses via [`VoteError::status_code`].
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("voting window is closed")]
    Closed,
    #[error("voter already holds a token for this election")]
    DuplicateToken,
    #[error("no token issued for this election")]
    NoToken,
    #[error("token has not been signed")]
    TokenUnsigned,
    #[error("token already spent")]
    TokenSpent,
    #[error("voter already cast a ballot in this election")]
    AlreadyVoted,
    #[error("ballot hash already recorded")]
    DuplicateBallot,
    #[error("signature does not verify against the election key")]
    InvalidSignature,
    #[error("option does not belong to this election")]
    BadOption,
    #[error("malformed input: {0}")]
    BadInput(String),
    #[error("election signing key missing or malformed")]
    KeyMaterial,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl VoteError {
    /// Stable kind identifier reported to callers instead of free-form text.
    pub fn kind(&self) -> &'static str {
        match self {
            VoteError::NotFound(_) => "not_found",
            VoteError::Closed => "closed",
            VoteError::DuplicateToken => "duplicate_token",
            VoteError::NoToken => "no_token",
            VoteError::TokenUnsigned => "token_unsigned",
            VoteError::TokenSpent => "token_spent",
            VoteError::AlreadyVoted => "already_voted",
            VoteError::DuplicateBallot => "duplicate_ballot",
            VoteError::InvalidSignature => "invalid_signature",
            VoteError::BadOption => "bad_option",
            VoteError::BadInput(_) => "bad_input",
            VoteError::KeyMaterial => "key_material",
            VoteError::Internal(_) => "internal",
        }
    }

    /// HTTP status the external layer reports for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            VoteError::NotFound(_) => 404,
            VoteError::KeyMaterial | VoteError::Internal(_) => 500,
            _ => 400,
        }
    }
}

/// Translate store-level unique-constraint violations into business kinds.
///
/// The unique indexes are the last-resort defense against concurrent
/// duplicates: the losing inserter surfaces here instead of as a raw
/// database error.
impl From<sqlx::Error> for VoteError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let msg = db.message();
            if msg.contains("UNIQUE constraint failed") {
                if msg.contains("voting_receipts.receipt_hash") {
                    return VoteError::DuplicateBallot;
                }
                if msg.contains("voting_receipts.") {
                    return VoteError::AlreadyVoted;
                }
                if msg.contains("votes.vote_hash") {
                    return VoteError::DuplicateBallot;
                }
                if msg.contains("blind_tokens.") {
                    return VoteError::DuplicateToken;
                }
                if msg.contains("users.username") {
                    return VoteError::BadInput("username already enrolled".to_string());
                }
                if msg.contains("options.") {
                    return VoteError::BadInput("duplicate option order".to_string());
                }
            }
        }
        VoteError::Internal(err.into())
    }
}

impl From<crate::crypto::CryptoError> for VoteError {
    fn from(err: crate::crypto::CryptoError) -> Self {
        use crate::crypto::CryptoError;
        match err {
            CryptoError::Hex | CryptoError::Base64 | CryptoError::Payload => {
                VoteError::BadInput(err.to_string())
            }
            CryptoError::Key => VoteError::KeyMaterial,
            other => VoteError::Internal(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_spec_statuses() {
        assert_eq!(VoteError::NotFound("election").status_code(), 404);
        assert_eq!(VoteError::Closed.status_code(), 400);
        assert_eq!(VoteError::TokenSpent.status_code(), 400);
        assert_eq!(VoteError::InvalidSignature.status_code(), 400);
        assert_eq!(VoteError::KeyMaterial.status_code(), 500);
        assert_eq!(
            VoteError::Internal(anyhow::anyhow!("boom")).status_code(),
            500
        );
    }

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(VoteError::AlreadyVoted.kind(), "already_voted");
        assert_eq!(VoteError::DuplicateBallot.kind(), "duplicate_ballot");
        assert_eq!(VoteError::BadOption.kind(), "bad_option");
    }
}
