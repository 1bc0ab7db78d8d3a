use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory to store application data and keys
    #[arg(short, long, default_value = "")]
    pub dir: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an election with its options
    CreateElection {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Voting window opens (RFC 3339, e.g. 2026-03-01T08:00:00Z)
        #[arg(long)]
        starts: String,
        /// Voting window closes (RFC 3339)
        #[arg(long)]
        ends: String,
        /// Option text, repeatable, in ballot order
        #[arg(long = "option", required = true)]
        options: Vec<String>,
        /// PKCS#8 PEM file with the signing key; generated when omitted
        #[arg(long)]
        signing_key_file: Option<PathBuf>,
    },
    /// List elections currently open for voting
    ListActive,
    /// Show one election with its options
    Show { election_id: i64 },
    /// Flip the administrative kill-switch
    SetActive {
        election_id: i64,
        #[arg(long)]
        active: bool,
    },
    /// Rotate the election signing keypair (invalidates issued signatures)
    RegenerateKey { election_id: i64 },
    /// Print the election's public key PEM
    PublicKey { election_id: i64 },
    /// Count ballots per option
    Tally { election_id: i64 },
    /// Tokens still waiting for a signature
    PendingTokens {
        #[arg(long)]
        election_id: Option<i64>,
    },
    /// Lifecycle status of one token, as seen by a requesting voter
    TokenStatus {
        token_id: i64,
        #[arg(long)]
        requester_id: i64,
    },
    /// Whether a voter holds a receipt for an election
    HasVoted { voter_id: i64, election_id: i64 },
    /// Show a voter's participation receipt
    Receipt { voter_id: i64, election_id: i64 },
    /// Enroll a voter (administrative seeding)
    EnrollVoter {
        username: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        password: String,
        #[arg(long)]
        admin: bool,
        /// PEM file with the voter's published public key
        #[arg(long)]
        public_key_file: Option<PathBuf>,
    },
    /// Delete an election before it opens (cascades to all dependent rows)
    DeleteElection { election_id: i64 },
}
