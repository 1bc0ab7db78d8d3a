mod cli;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use urna::ballot::BallotEngine;
use urna::config::Settings;
use urna::crypto;
use urna::election::{ElectionRegistry, NewElection, NewOption};
use urna::store::Store;
use urna::tally::ResultsAggregator;
use urna::token::TokenAuthority;
use urna::util::setup_logger;

use crate::cli::{Args, Command};

fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Determine the application directory
    let app_dir = if args.dir.is_empty() {
        // Use default directory: $HOME/.urna/
        let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home_dir).join(".urna")
    } else {
        PathBuf::from(&args.dir)
    };

    if !app_dir.exists() {
        fs::create_dir_all(&app_dir)?;
        println!("Created directory: {}", app_dir.display());
    }

    // Initialize logger
    setup_logger(log::LevelFilter::Info, app_dir.join("app.log"))
        .expect("Can't initialize logger");
    log::info!("Urna voting authority started");
    log::info!("Using directory: {}", app_dir.display());

    // Configuration is read once and threaded through construction.
    let default_db_url = format!("sqlite://{}", app_dir.join("urna.db").display());
    let settings = Settings::from_env(&default_db_url);

    let store = Store::connect(&settings.database_url).await?;
    log::info!("Database initialized successfully");

    let registry = ElectionRegistry::new(store.clone());
    let authority = TokenAuthority::new(store.clone());
    let engine = BallotEngine::new(store.clone());
    let aggregator = ResultsAggregator::new(store.clone());

    match args.command {
        Command::CreateElection {
            title,
            description,
            starts,
            ends,
            options,
            signing_key_file,
        } => {
            let signing_key = match signing_key_file {
                Some(path) => Some(fs::read_to_string(path)?),
                None => None,
            };
            let meta = NewElection {
                title,
                description,
                start_at: parse_instant(&starts)?,
                end_at: parse_instant(&ends)?,
                is_active: true,
                signing_key,
            };
            let options = options
                .into_iter()
                .enumerate()
                .map(|(i, option_text)| NewOption {
                    option_text,
                    option_order: (i + 1) as i64,
                })
                .collect();
            let created = registry.create_election(meta, options).await?;
            println!("🗳️ Election {} created", created.election.id);
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        Command::ListActive => {
            let elections = registry.list_active().await?;
            println!("{}", serde_json::to_string_pretty(&elections)?);
        }
        Command::Show { election_id } => {
            let election = registry.get_with_options(election_id).await?;
            println!("{}", serde_json::to_string_pretty(&election)?);
        }
        Command::SetActive {
            election_id,
            active,
        } => {
            registry.set_active(election_id, active).await?;
            println!("Election {election_id} is_active set to {active}");
        }
        Command::RegenerateKey { election_id } => {
            let rotation = registry.regenerate_key(election_id).await?;
            println!("{}", serde_json::to_string_pretty(&rotation)?);
            println!("⚠️ Signatures issued under the previous key can no longer be used.");
        }
        Command::PublicKey { election_id } => {
            println!("{}", registry.public_key_of(election_id).await?);
        }
        Command::Tally { election_id } => {
            let results = aggregator.tally(election_id).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::PendingTokens { election_id } => {
            let pending = authority.pending_for(election_id).await?;
            println!("{}", serde_json::to_string_pretty(&pending)?);
        }
        Command::TokenStatus {
            token_id,
            requester_id,
        } => {
            let status = authority.status(token_id, requester_id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::HasVoted {
            voter_id,
            election_id,
        } => {
            println!("{}", engine.has_voted(voter_id, election_id).await?);
        }
        Command::Receipt {
            voter_id,
            election_id,
        } => {
            let receipt = engine.receipt_of(voter_id, election_id).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::EnrollVoter {
            username,
            display_name,
            password,
            admin,
            public_key_file,
        } => {
            let public_key = match public_key_file {
                Some(path) => Some(fs::read_to_string(path)?),
                None => None,
            };
            let password_hash =
                tokio::task::spawn_blocking(move || crypto::hash_password(&password)).await??;
            let voter = urna::store::user::insert_voter(
                store.pool(),
                &username,
                display_name.as_deref(),
                &password_hash,
                public_key.as_deref(),
                admin,
                Utc::now(),
            )
            .await?;
            println!("🔑 Enrolled voter {} (id {})", voter.username, voter.id);
        }
        Command::DeleteElection { election_id } => {
            registry.delete_election(election_id).await?;
            println!("Election {election_id} deleted");
        }
    }

    Ok(())
}
