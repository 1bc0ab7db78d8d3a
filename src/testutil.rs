//! Shared fixtures for the service and protocol tests: a temp-file store,
//! enrolled voters, elections under a shared test keypair, and the
//! client-side blinding flow a real voter would run.

use base64::{Engine as _, engine::general_purpose};
use blind_rsa_signatures::{BlindSignature, PublicKey, Secret};
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use serde_json::json;
use std::sync::OnceLock;
use tempfile::NamedTempFile;

use crate::ballot::{BallotEngine, CastBallot};
use crate::crypto;
use crate::election::{ElectionRegistry, ElectionWithOptions, NewElection, NewOption};
use crate::store::{Store, Voter};
use crate::tally::ResultsAggregator;
use crate::token::TokenAuthority;

pub(crate) struct Fixture {
    pub store: Store,
    pub registry: ElectionRegistry,
    pub authority: TokenAuthority,
    pub engine: BallotEngine,
    pub aggregator: ResultsAggregator,
    _tmp: NamedTempFile,
}

/// One RSA-2048 keypair shared across tests that do not rotate keys;
/// keygen is too slow to repeat per test.
pub(crate) fn shared_keys() -> &'static (String, String) {
    static KEYS: OnceLock<(String, String)> = OnceLock::new();
    KEYS.get_or_init(|| crypto::generate_signing_keys().unwrap())
}

pub(crate) async fn open_store() -> (Store, NamedTempFile) {
    let tmp = NamedTempFile::new().unwrap();
    let url = format!("sqlite://{}", tmp.path().display());
    (Store::connect(&url).await.unwrap(), tmp)
}

pub(crate) async fn fixture() -> Fixture {
    let (store, tmp) = open_store().await;
    Fixture {
        registry: ElectionRegistry::new(store.clone()),
        authority: TokenAuthority::new(store.clone()),
        engine: BallotEngine::new(store.clone()),
        aggregator: ResultsAggregator::new(store.clone()),
        store,
        _tmp: tmp,
    }
}

pub(crate) async fn enroll(store: &Store, username: &str, is_admin: bool) -> Voter {
    let phc = crypto::hash_password("correct horse").unwrap();
    crate::store::user::insert_voter(
        store.pool(),
        username,
        Some("Test Voter"),
        &phc,
        None,
        is_admin,
        Utc::now(),
    )
    .await
    .unwrap()
}

async fn make_election(
    registry: &ElectionRegistry,
    start_offset_min: i64,
    end_offset_min: i64,
) -> ElectionWithOptions {
    let now = Utc::now();
    registry
        .create_election(
            NewElection {
                title: "General assembly".to_string(),
                description: None,
                start_at: now + Duration::minutes(start_offset_min),
                end_at: now + Duration::minutes(end_offset_min),
                is_active: true,
                signing_key: Some(shared_keys().0.clone()),
            },
            vec![
                NewOption {
                    option_text: "Yes".to_string(),
                    option_order: 1,
                },
                NewOption {
                    option_text: "No".to_string(),
                    option_order: 2,
                },
            ],
        )
        .await
        .unwrap()
}

pub(crate) async fn open_election(registry: &ElectionRegistry) -> ElectionWithOptions {
    make_election(registry, -5, 60).await
}

pub(crate) async fn closed_election(registry: &ElectionRegistry) -> ElectionWithOptions {
    make_election(registry, -120, -1).await
}

pub(crate) struct BlindedPackage {
    pub msg: Vec<u8>,
    pub blinded_hex: String,
    pub secret: Secret,
    pub public_key_pem: String,
}

/// Client-side blinding: the authority only ever sees `blinded_hex`.
pub(crate) async fn blind_message(
    fx: &Fixture,
    election_id: i64,
    msg: &[u8],
) -> BlindedPackage {
    let public_key_pem = fx.registry.public_key_of(election_id).await.unwrap();
    let pk = PublicKey::from_pem(&public_key_pem).unwrap();
    let result = pk
        .blind(&mut OsRng, msg, false, &crypto::pss_options())
        .unwrap();
    BlindedPackage {
        msg: msg.to_vec(),
        blinded_hex: hex::encode(&result.blind_msg),
        secret: result.secret,
        public_key_pem,
    }
}

/// Client-side unblinding of the authority's blind signature.
pub(crate) fn finalize_signature(pkg: &BlindedPackage, signed_b64: &str) -> String {
    let blind_sig = general_purpose::STANDARD.decode(signed_b64).unwrap();
    let pk = PublicKey::from_pem(&pkg.public_key_pem).unwrap();
    let sig = pk
        .finalize(
            &BlindSignature(blind_sig),
            &pkg.secret,
            None,
            &pkg.msg,
            &crypto::pss_options(),
        )
        .unwrap();
    general_purpose::STANDARD.encode(&sig)
}

/// Run the full client-side flow for one vote: pick a timestamp, compute the
/// vote hash, obtain a blind-signed token over it, unblind, seal the ballot.
pub(crate) async fn prepare_vote(
    fx: &Fixture,
    voter_id: i64,
    election: &ElectionWithOptions,
    option_idx: usize,
) -> CastBallot {
    let election_id = election.election.id;
    let option = &election.options[option_idx];
    let timestamp = Utc::now().to_rfc3339();

    let vote_hash = crypto::hash_vote(election_id, option.id, &timestamp);
    let pkg = blind_message(fx, election_id, &hex::decode(&vote_hash).unwrap()).await;
    let token = fx
        .authority
        .request_token(voter_id, election_id, &pkg.blinded_hex)
        .await
        .unwrap();
    let unblinded_signature =
        finalize_signature(&pkg, token.signed_token.as_deref().unwrap());

    let payload = json!({
        "election_id": election_id,
        "option_id": option.id,
        "timestamp": timestamp,
        "vote_hash": vote_hash,
    });
    let (encrypted_payload, _aes_key) = crypto::encrypt_ballot(&payload).unwrap();

    CastBallot {
        voter_id,
        election_id,
        option_id: option.id,
        unblinded_signature,
        vote_hash,
        encrypted_payload,
        receipt_hash: crypto::hash_receipt(voter_id, election_id, &timestamp),
        receipt_signature: general_purpose::STANDARD.encode(b"voter receipt signature"),
    }
}

/// Well-formed but cryptographically meaningless cast request, for tests
/// that fail before the signature check.
pub(crate) fn dummy_cast(voter_id: i64, election_id: i64, option_id: i64) -> CastBallot {
    CastBallot {
        voter_id,
        election_id,
        option_id,
        unblinded_signature: general_purpose::STANDARD.encode([1u8; 256]),
        vote_hash: "ab".repeat(32),
        encrypted_payload: general_purpose::STANDARD.encode(b"sealed"),
        receipt_hash: "cd".repeat(32),
        receipt_signature: general_purpose::STANDARD.encode(b"sig"),
    }
}
