use std::collections::HashMap;

use super::topology::TopologyCandidate;

/// Vote counts observed so far, returned from [`Election::vote_received`].
#[derive(Debug, Clone)]
pub struct Metrics {
    pub candidate_vote_counts: HashMap<TopologyCandidate, usize>,
    pub winner: Option<TopologyCandidate>,
}

/// Majority-vote election over competing [`TopologyCandidate`]s (spec
/// §4.5). A voter holds exactly one vote at a time; once a candidate
/// reaches `floor(N/2)+1` votes (`N` = that candidate's node count) it
/// latches as the winner and later votes cannot overturn it, though they
/// still count.
#[derive(Debug, Default)]
pub struct Election {
    votes_by_voter: HashMap<String, TopologyCandidate>,
    vote_counts: HashMap<TopologyCandidate, usize>,
    winner: Option<TopologyCandidate>,
}

impl Election {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn winner(&self) -> Option<&TopologyCandidate> {
        self.winner.as_ref()
    }

    /// Records `voter_id`'s vote for `topology`, vacating any previous vote
    /// by the same voter, and returns the updated [`Metrics`].
    pub fn vote_received(&mut self, topology: TopologyCandidate, voter_id: &str) -> Metrics {
        if let Some(previous) = self.votes_by_voter.get(voter_id) {
            if previous == &topology {
                return self.metrics();
            }
            if let Some(count) = self.vote_counts.get_mut(previous) {
                *count -= 1;
                if *count == 0 {
                    self.vote_counts.remove(previous);
                }
            }
        }

        self.votes_by_voter
            .insert(voter_id.to_string(), topology.clone());
        let count = *self
            .vote_counts
            .entry(topology.clone())
            .and_modify(|c| *c += 1)
            .or_insert(1);

        if self.winner.is_none() {
            let threshold = topology.node_count() / 2 + 1;
            if count >= threshold {
                self.winner = Some(topology);
            }
        }

        self.metrics()
    }

    fn metrics(&self) -> Metrics {
        Metrics {
            candidate_vote_counts: self.vote_counts.clone(),
            winner: self.winner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::topology::{Health, Role, Shard, ShardNode};

    fn three_node_topology(tag: &str) -> TopologyCandidate {
        let node = |endpoint: &str, role, health| ShardNode {
            id: format!("{endpoint}-{tag}"),
            ip: None,
            hostname: None,
            endpoint: endpoint.into(),
            port: 6379,
            tls_port: None,
            role,
            replication_offset: 0,
            health,
        };
        let shard = Shard {
            slots: vec![0..=16383],
            nodes: vec![
                node(&format!("primary-{tag}"), Role::Primary, Health::Online),
                node("replica1", Role::Replica, Health::Online),
                node("replica2", Role::Replica, Health::Online),
            ],
        };
        TopologyCandidate::canonicalize(&[shard]).unwrap()
    }

    #[test]
    fn vote_vacates_previous_vote_from_same_voter() {
        let mut election = Election::new();
        let t = three_node_topology("t");
        let t_prime = three_node_topology("t-prime");

        election.vote_received(t_prime.clone(), "voter1");
        let metrics = election.vote_received(t.clone(), "voter1");
        assert_eq!(metrics.candidate_vote_counts.get(&t_prime), None);
        assert_eq!(metrics.candidate_vote_counts.get(&t), Some(&1));
    }

    #[test]
    fn majority_threshold_elects_winner() {
        let mut election = Election::new();
        let t = three_node_topology("t");
        let t_prime = three_node_topology("t-prime");

        election.vote_received(t_prime, "voter1");
        election.vote_received(t.clone(), "voter1");
        let metrics = election.vote_received(t.clone(), "voter2");

        assert_eq!(metrics.candidate_vote_counts.get(&t), Some(&2));
        assert_eq!(metrics.winner, Some(t));
    }

    #[test]
    fn winner_is_not_overturned_by_later_votes() {
        let mut election = Election::new();
        let t = three_node_topology("t");
        let t_prime = three_node_topology("t-prime");

        election.vote_received(t.clone(), "voter1");
        election.vote_received(t.clone(), "voter2");
        assert_eq!(election.winner(), Some(&t));

        election.vote_received(t_prime.clone(), "voter3");
        election.vote_received(t_prime, "voter1");
        assert_eq!(election.winner(), Some(&t));
    }
}
