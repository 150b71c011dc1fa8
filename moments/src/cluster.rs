//! Vote aggregation into timed clusters.

use std::collections::HashSet;

use crate::vote::{MomentKind, MomentVote};

/// All votes about one target within one time window on one map. The
/// target snapshot always reflects the most recent vote; the center
/// timestamp is the running mean of every contributing vote.
#[derive(Debug, Clone)]
pub struct MomentCluster {
    pub cluster_id: u64,
    pub map_name: String,
    pub kind: MomentKind,
    /// Identity key the cluster was created for, fixed at creation.
    pub target_key: String,
    pub target_name: String,
    pub target_steam_id: String,
    pub target_slot: i64,
    pub target_team: i64,
    pub target_frags: i64,
    pub target_deaths: i64,
    pub round_number: i64,
    pub map_timeleft_sec: i64,
    pub map_elapsed_sec: i64,
    pub first_event_unix: i64,
    pub last_event_unix: i64,
    pub center_event_unix: i64,
    pub stars: u32,
    pub voters: HashSet<String>,
    pub voter_names: Vec<String>,
    /// Handle of the chat message rendering this cluster, once posted.
    pub message_handle: Option<u64>,
    pub demo_url: Option<String>,
}

impl MomentCluster {
    pub fn from_vote(cluster_id: u64, vote: &MomentVote) -> Self {
        MomentCluster {
            cluster_id,
            map_name: vote.map_name.clone(),
            kind: vote.kind,
            target_key: vote.target_key(),
            target_name: vote.target_name.clone(),
            target_steam_id: vote.target_steam_id.clone(),
            target_slot: vote.target_slot,
            target_team: vote.target_team,
            target_frags: vote.target_frags,
            target_deaths: vote.target_deaths,
            round_number: vote.round_number,
            map_timeleft_sec: vote.map_timeleft_sec,
            map_elapsed_sec: vote.map_elapsed_sec,
            first_event_unix: vote.event_unix,
            last_event_unix: vote.event_unix,
            center_event_unix: vote.event_unix,
            stars: 1,
            voters: HashSet::new(),
            voter_names: Vec::new(),
            message_handle: None,
            demo_url: None,
        }
    }

    pub fn has_voter(&self, voter_key: &str) -> bool {
        self.voters.contains(voter_key)
    }

    /// Folds one more vote in: the star count grows, the center moves to
    /// the running mean of all vote timestamps and the target snapshot
    /// takes the vote's values. Voter bookkeeping is the caller's job.
    pub fn apply_vote(&mut self, vote: &MomentVote) {
        self.stars += 1;
        self.last_event_unix = vote.event_unix;
        let carried = self.center_event_unix * (self.stars as i64 - 1);
        self.center_event_unix =
            ((carried + vote.event_unix) as f64 / self.stars as f64).round() as i64;
        self.target_name = vote.target_name.clone();
        self.target_steam_id = vote.target_steam_id.clone();
        self.target_slot = vote.target_slot;
        self.target_team = vote.target_team;
        self.target_frags = vote.target_frags;
        self.target_deaths = vote.target_deaths;
        self.map_timeleft_sec = vote.map_timeleft_sec;
        self.map_elapsed_sec = vote.map_elapsed_sec;
        self.round_number = vote.round_number;
    }
}
