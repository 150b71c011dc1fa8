//! Process-wide clustering session: one map, one set of live clusters.

use chrono::Utc;
use log::{debug, info};

use crate::cluster::MomentCluster;
use crate::mapname::normalize_map_name;
use crate::vote::MomentVote;

/// Outcome of feeding one vote through the state machine. The cluster is a
/// snapshot taken after the vote was applied (or rejected as duplicate).
#[derive(Debug, Clone)]
pub struct MomentProcessResult {
    pub cluster: MomentCluster,
    pub created: bool,
    pub duplicate_vote: bool,
    pub session_reset: bool,
}

/// Session context for the clustering engine. A session spans one map run;
/// map changes, round regressions and idle gaps discard all live clusters.
pub struct MomentState {
    window_sec: i64,
    session_idle_sec: i64,
    map_name: String,
    map_norm_name: String,
    last_round_number: i64,
    last_event_unix: i64,
    clusters: Vec<MomentCluster>,
    next_cluster_id: u64,
}

impl MomentState {
    pub fn new(window_sec: i64, session_idle_sec: i64) -> Self {
        MomentState {
            window_sec: window_sec.max(1),
            session_idle_sec: session_idle_sec.max(60),
            map_name: String::new(),
            map_norm_name: String::new(),
            last_round_number: 0,
            last_event_unix: 0,
            clusters: Vec::new(),
            next_cluster_id: 1,
        }
    }

    /// Discards every live cluster and forgets the current map. Cluster ids
    /// restart from 1.
    pub fn reset(&mut self) {
        self.map_name.clear();
        self.map_norm_name.clear();
        self.last_round_number = 0;
        self.last_event_unix = 0;
        self.clusters.clear();
        self.next_cluster_id = 1;
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Feeds an out-of-band status snapshot in. Detects map changes and
    /// round regressions and resets the session when one occurs; never
    /// creates clusters. Returns whether a reset happened.
    pub fn touch_info(&mut self, map_name: &str, round_number: i64, event_unix: Option<i64>) -> bool {
        let now = event_unix
            .filter(|&ts| ts != 0)
            .unwrap_or_else(|| Utc::now().timestamp());
        let map_name = map_name.trim();
        let map_norm = normalize_map_name(map_name);
        let round_number = round_number.max(0);
        if map_name.is_empty() {
            return false;
        }

        let mut should_reset = false;
        if !self.map_norm_name.is_empty() && map_norm != self.map_norm_name {
            should_reset = true;
        } else if self.map_norm_name == map_norm
            && self.last_round_number >= 3
            && round_number > 0
            && round_number + 2 < self.last_round_number
        {
            should_reset = true;
        }

        if should_reset {
            info!(
                "moment session reset by status snapshot (map {} round {})",
                map_name, round_number
            );
            self.reset();
        }

        self.map_name = map_name.to_string();
        self.map_norm_name = map_norm;
        self.last_round_number = round_number;
        self.last_event_unix = now;
        should_reset
    }

    fn should_reset_for_vote(&self, vote: &MomentVote) -> bool {
        let vote_map_norm = normalize_map_name(&vote.map_name);
        if self.map_norm_name.is_empty() {
            return false;
        }

        if vote_map_norm != self.map_norm_name {
            return true;
        }

        if self.last_event_unix != 0
            && (vote.event_unix - self.last_event_unix) > self.session_idle_sec
        {
            return true;
        }

        self.last_round_number >= 3
            && vote.round_number > 0
            && vote.round_number + 2 < self.last_round_number
    }

    fn find_cluster_index(&self, vote: &MomentVote) -> Option<usize> {
        let vote_map_norm = normalize_map_name(&vote.map_name);
        let target_key = vote.target_key();
        let mut best: Option<(usize, i64)> = None;

        for (index, cluster) in self.clusters.iter().enumerate() {
            if normalize_map_name(&cluster.map_name) != vote_map_norm {
                continue;
            }
            if cluster.target_key != target_key {
                continue;
            }
            let distance = (cluster.center_event_unix - vote.event_unix).abs();
            if distance > self.window_sec {
                continue;
            }
            // strict comparison keeps the first cluster found on ties
            if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                best = Some((index, distance));
            }
        }

        best.map(|(index, _)| index)
    }

    /// Runs the full per-vote state machine: reset detection, session
    /// bookkeeping, then cluster matching and merge-or-create.
    pub fn process_vote(&mut self, vote: &MomentVote) -> MomentProcessResult {
        let mut session_reset = false;
        if self.should_reset_for_vote(vote) {
            info!(
                "moment session reset by vote (map {} round {})",
                vote.map_name, vote.round_number
            );
            self.reset();
            session_reset = true;
        }

        self.map_name = vote.map_name.clone();
        self.map_norm_name = normalize_map_name(&vote.map_name);
        self.last_round_number = vote.round_number;
        self.last_event_unix = vote.event_unix;

        let voter_key = vote.voter_key();
        if let Some(index) = self.find_cluster_index(vote) {
            let cluster = &mut self.clusters[index];
            if cluster.has_voter(&voter_key) {
                debug!(
                    "duplicate vote from {} on cluster {}",
                    vote.voter_name, cluster.cluster_id
                );
                return MomentProcessResult {
                    cluster: cluster.clone(),
                    created: false,
                    duplicate_vote: true,
                    session_reset,
                };
            }

            cluster.voters.insert(voter_key);
            cluster.voter_names.push(vote.voter_name.clone());
            cluster.apply_vote(vote);
            return MomentProcessResult {
                cluster: cluster.clone(),
                created: false,
                duplicate_vote: false,
                session_reset,
            };
        }

        let mut cluster = MomentCluster::from_vote(self.next_cluster_id, vote);
        cluster.voters.insert(voter_key);
        cluster.voter_names.push(vote.voter_name.clone());
        self.next_cluster_id += 1;

        let snapshot = cluster.clone();
        self.clusters.push(cluster);
        MomentProcessResult {
            cluster: snapshot,
            created: true,
            duplicate_vote: false,
            session_reset,
        }
    }

    /// Records the chat message handle presenting a cluster.
    pub fn set_message_handle(&mut self, cluster_id: u64, handle: u64) -> bool {
        match self.cluster_mut(cluster_id) {
            Some(cluster) => {
                cluster.message_handle = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Attaches a resolved demo URL to a live cluster. Returns false when
    /// the cluster was already discarded by a session reset.
    pub fn set_demo_url(&mut self, cluster_id: u64, url: &str) -> bool {
        match self.cluster_mut(cluster_id) {
            Some(cluster) => {
                cluster.demo_url = Some(url.to_string());
                true
            }
            None => false,
        }
    }

    pub fn cluster_snapshot(&self, cluster_id: u64) -> Option<MomentCluster> {
        self.clusters
            .iter()
            .find(|cluster| cluster.cluster_id == cluster_id)
            .cloned()
    }

    fn cluster_mut(&mut self, cluster_id: u64) -> Option<&mut MomentCluster> {
        self.clusters
            .iter_mut()
            .find(|cluster| cluster.cluster_id == cluster_id)
    }
}
