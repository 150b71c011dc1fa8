//! Glue between the moment engine, the demo resolver and the event bus.
//!
//! Votes and status snapshots mutate the shared `MomentState` under one
//! lock; cluster transitions go out as bus events carrying a rendered
//! summary. Every freshly created cluster gets its own background task that
//! chases a demo URL until it resolves or the retry window runs out.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, Duration, Instant};

use moments::render::format_cluster_summary;
use moments::{
    DemoResolveResult, DemoResolver, MomentCluster, MomentState, MomentVote, ResolveReason,
};

use crate::events::{BridgeEvent, EventBus};

pub struct MomentService {
    state: Arc<Mutex<MomentState>>,
    resolver: Arc<DemoResolver>,
    bus: Arc<EventBus>,
    retry_interval: Duration,
    retry_window: Duration,
    shutdown: watch::Receiver<bool>,
}

impl MomentService {
    pub fn new(
        state: MomentState,
        resolver: Arc<DemoResolver>,
        bus: Arc<EventBus>,
        retry_interval: Duration,
        retry_window: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        MomentService {
            state: Arc::new(Mutex::new(state)),
            resolver,
            bus,
            retry_interval,
            retry_window,
            shutdown,
        }
    }

    /// Feeds map and round bookkeeping from a status snapshot into the
    /// engine. A detected map change or round regression resets the session
    /// and announces it.
    pub async fn touch_info(&self, map_name: &str, round_number: i64, event_unix: Option<i64>) {
        let reset = {
            let mut state = self.state.lock().await;
            state.touch_info(map_name, round_number, event_unix)
        };

        if reset {
            self.bus.notify(BridgeEvent::SessionReset).await;
        }
    }

    /// Runs one vote through the engine and announces the outcome. A new
    /// cluster additionally kicks off demo resolution for its map.
    pub async fn handle_vote(&self, vote: MomentVote) {
        let result = {
            let mut state = self.state.lock().await;
            state.process_vote(&vote)
        };

        if result.session_reset {
            self.bus.notify(BridgeEvent::SessionReset).await;
        }

        if result.duplicate_vote {
            debug!(
                "duplicate vote from {} for cluster {} ignored",
                vote.voter_name, result.cluster.cluster_id
            );
            return;
        }

        let summary = format_cluster_summary(&result.cluster);
        if result.created {
            self.bus
                .notify(BridgeEvent::ClusterCreated {
                    cluster: result.cluster.clone(),
                    summary,
                })
                .await;
            self.spawn_demo_resolution(&result.cluster);
        } else {
            self.bus
                .notify(BridgeEvent::ClusterUpdated {
                    cluster: result.cluster,
                    summary,
                })
                .await;
        }
    }

    /// Remembers the outbound message a cluster is rendered into, so later
    /// updates can edit it in place.
    pub async fn attach_message_handle(&self, cluster_id: u64, handle: u64) -> bool {
        let mut state = self.state.lock().await;
        state.set_message_handle(cluster_id, handle)
    }

    pub async fn cluster_snapshot(&self, cluster_id: u64) -> Option<MomentCluster> {
        let state = self.state.lock().await;
        state.cluster_snapshot(cluster_id)
    }

    pub async fn cluster_count(&self) -> usize {
        let state = self.state.lock().await;
        state.cluster_count()
    }

    /// Resolves the demo for a newly created cluster on its own task. The
    /// first lookup may be served from cache; afterwards the task polls with
    /// forced refreshes until the demo resolves, the retry window closes, or
    /// a mismatch turns into a different terminal answer.
    fn spawn_demo_resolution(&self, cluster: &MomentCluster) {
        if !self.resolver.enabled() {
            debug!(
                "demo resolve: resolver disabled, skipping cluster {}",
                cluster.cluster_id
            );
            return;
        }

        let state = Arc::clone(&self.state);
        let resolver = Arc::clone(&self.resolver);
        let bus = Arc::clone(&self.bus);
        let retry_interval = self.retry_interval;
        let retry_window = self.retry_window;
        let mut shutdown = self.shutdown.clone();
        let cluster_id = cluster.cluster_id;
        let map_name = cluster.map_name.clone();

        tokio::spawn(async move {
            let initial = resolver.resolve_demo(&map_name, false).await;
            if attach_demo_url(&state, &bus, cluster_id, &initial).await {
                return;
            }
            if initial.reason == ResolveReason::ResolverDisabled {
                return;
            }

            let initial_reason = initial.reason;
            let deadline = Instant::now() + retry_window;

            while Instant::now() < deadline {
                tokio::select! {
                    _ = sleep(retry_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return;
                        }
                        continue;
                    }
                }

                let result = resolver.resolve_demo(&map_name, true).await;
                if attach_demo_url(&state, &bus, cluster_id, &result).await {
                    return;
                }
                if result.reason == ResolveReason::ResolverDisabled {
                    return;
                }
                if initial_reason == ResolveReason::MapMismatch
                    && result.reason != ResolveReason::MapMismatch
                {
                    info!(
                        "demo resolve: cluster {} stopped retrying, reason changed from {} to {}",
                        cluster_id,
                        initial_reason.as_str(),
                        result.reason.as_str()
                    );
                    return;
                }
            }

            warn!(
                "demo resolve: cluster {} still without a demo after {}s ({})",
                cluster_id,
                retry_window.as_secs(),
                initial_reason.as_str()
            );
        });
    }
}

/// Stores a resolved demo URL on the cluster and announces the update.
/// Returns true when the resolution task is finished, either because the
/// URL stuck or because the cluster is gone.
async fn attach_demo_url(
    state: &Arc<Mutex<MomentState>>,
    bus: &Arc<EventBus>,
    cluster_id: u64,
    result: &DemoResolveResult,
) -> bool {
    let Some(url) = result.demo_url.as_deref() else {
        return false;
    };

    let snapshot = {
        let mut state = state.lock().await;
        if !state.set_demo_url(cluster_id, url) {
            info!(
                "demo resolve: cluster {} vanished before its demo was attached",
                cluster_id
            );
            return true;
        }
        state.cluster_snapshot(cluster_id)
    };

    if let Some(cluster) = snapshot {
        let summary = format_cluster_summary(&cluster);
        bus.notify(BridgeEvent::ClusterUpdated { cluster, summary }).await;
    }

    true
}
