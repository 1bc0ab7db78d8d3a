/*!  tally.rs — results aggregator.
Counts ballots per option for one election. No per-voter data is
involved; the query is safe on completed elections and, with the usual
live-read caveats, on open ones. */

use serde::Serialize;
use std::collections::HashMap;

use crate::error::VoteError;
use crate::store::{self, Store};

#[derive(Debug, Serialize)]
pub struct OptionTally {
    pub option_id: i64,
    pub option_text: String,
    pub option_order: i64,
    pub vote_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ElectionResults {
    pub election_id: i64,
    pub title: String,
    pub total_votes: i64,
    pub options: Vec<OptionTally>,
}

#[derive(Clone)]
pub struct ResultsAggregator {
    store: Store,
}

impl ResultsAggregator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Ballot counts per option in ballot order; zero-count options are
    /// present with count 0.
    pub async fn tally(&self, election_id: i64) -> Result<ElectionResults, VoteError> {
        let election = store::election::election_by_id(self.store.pool(), election_id)
            .await?
            .ok_or(VoteError::NotFound("election"))?;

        let options = store::election::options_of(self.store.pool(), election_id).await?;
        let counts: HashMap<i64, i64> = store::voting::vote_counts(self.store.pool(), election_id)
            .await?
            .into_iter()
            .collect();

        let mut total_votes = 0;
        let options = options
            .into_iter()
            .map(|o| {
                let vote_count = counts.get(&o.id).copied().unwrap_or(0);
                total_votes += vote_count;
                OptionTally {
                    option_id: o.id,
                    option_text: o.option_text,
                    option_order: o.option_order,
                    vote_count,
                }
            })
            .collect();

        Ok(ElectionResults {
            election_id,
            title: election.title,
            total_votes,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn tally_of_unknown_election_is_not_found() {
        let fx = testutil::fixture().await;
        let err = fx.aggregator.tally(99).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn zero_count_options_are_reported() {
        let fx = testutil::fixture().await;
        let election = testutil::open_election(&fx.registry).await;

        let results = fx.aggregator.tally(election.election.id).await.unwrap();
        assert_eq!(results.total_votes, 0);
        assert_eq!(results.options.len(), 2);
        assert!(results.options.iter().all(|o| o.vote_count == 0));
    }

    #[tokio::test]
    async fn counts_group_by_option_in_ballot_order() {
        let fx = testutil::fixture().await;
        let election = testutil::open_election(&fx.registry).await;

        for (name, option_idx) in [("ana", 0), ("bruno", 0), ("carla", 1)] {
            let voter = testutil::enroll(&fx.store, name, false).await;
            let req = testutil::prepare_vote(&fx, voter.id, &election, option_idx).await;
            fx.engine.cast_ballot(req).await.unwrap();
        }

        let results = fx.aggregator.tally(election.election.id).await.unwrap();
        assert_eq!(results.total_votes, 3);
        assert_eq!(results.options[0].vote_count, 2);
        assert_eq!(results.options[1].vote_count, 1);
        assert!(results.options[0].option_order < results.options[1].option_order);

        // The sum of per-option counts equals the ballots on record.
        let ballots =
            crate::store::voting::count_ballots(fx.store.pool(), election.election.id)
                .await
                .unwrap();
        assert_eq!(results.total_votes, ballots);
    }
}
