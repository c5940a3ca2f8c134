/*
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

//! # Arbiter
//!
//! Wires the resolved configuration into a running peer: local storage, the ring,
//! the routing core, and the leader checker background task, then waits for a
//! termination signal and shuts everything down on one broadcast channel.

use crate::autosharded::{AutoshardedStorage, MtPositionGenerator};
use crate::config::Config;
use crate::dht::node::LocalNode;
use crate::dht::ServerInstance;
use crate::leader::{HeartbeatClock, LeaderChecker, LeaderManager};
use crate::localstore::LhpeStore;
use chrono::Utc;
use log::info;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// A [`LeaderManager`] that just flips a flag and logs; real election/reconciliation
/// is explicitly outside this core's scope (`SPEC_FULL.md` §4.7).
struct LoggingManager {
    took_leadership: AtomicBool,
}

impl LeaderManager for LoggingManager {
    fn became_leader(&self) {
        self.took_leadership.store(true, Ordering::SeqCst);
        info!("this peer is taking leadership; handing off to the election protocol");
    }
}

/// Everything `run` spun up, handed back so a caller (or a test) can inspect or
/// drive it directly instead of only through the background tasks.
pub struct Peer {
    pub storage: Arc<AutoshardedStorage>,
    pub server: Arc<ServerInstance>,
    shutdown: broadcast::Sender<()>,
}

impl Peer {
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

/// Build a peer from a resolved configuration: local store, ring, routing core, and
/// the leader checker task (not yet started — see [`Peer::run_leader_checker`]).
pub fn build(config: &Config) -> Peer {
    let (signal, _) = broadcast::channel(1);

    let store = Arc::new(LhpeStore::with_initial_directory_size(config.initial_directory_size));
    let local = Arc::new(LocalNode::new(config.node_id, store.clone()));
    let server = Arc::new(ServerInstance::new(local));

    let mut undistributed_ids = HashSet::new();
    for name in &config.undistributed_clusters {
        let id = store
            .cluster_id_for_name(name)
            .unwrap_or_else(|| store.add_cluster(name).expect("fresh cluster name"));
        undistributed_ids.insert(id);
    }

    let storage = Arc::new(AutoshardedStorage::new(
        store,
        server.clone(),
        undistributed_ids,
        Arc::new(MtPositionGenerator::from_entropy()),
    ));

    info!(
        "peer {} listening on {} ({} undistributed clusters)",
        storage.storage_id(),
        config.bind,
        config.undistributed_clusters.len()
    );

    Peer {
        storage,
        server,
        shutdown: signal,
    }
}

impl Peer {
    /// Spawn the leader checker, racing its tick against this peer's shutdown
    /// broadcast, exactly like this crate's other background services.
    pub fn spawn_leader_checker(&self, heartbeat_delay: Duration) -> tokio::task::JoinHandle<()> {
        let clock = HeartbeatClock::new(Utc::now());
        let checker = Arc::new(LeaderChecker::new(clock, heartbeat_delay));
        let manager = Arc::new(LoggingManager {
            took_leadership: AtomicBool::new(false),
        });
        let rx = self.shutdown.subscribe();
        tokio::spawn(checker.run(manager, Duration::from_millis(250), rx))
    }
}

/// Start a peer and run it until a termination signal arrives.
pub async fn run(config: Config) -> crate::TResult<()> {
    let peer = build(&config);
    let _leader_handle = peer.spawn_leader_checker(config.heartbeat_delay);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }
    peer.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config::from_str("node:\n  bind: \"127.0.0.1:9999\"\n  id_seed: 7\n").unwrap()
    }

    #[test]
    fn build_produces_a_self_resolving_ring() {
        let peer = build(&test_config());
        let successor = peer.server.find_successor(123).unwrap();
        assert!(successor.is_local());
    }

    #[tokio::test(start_paused = true)]
    async fn leader_checker_stops_on_shutdown() {
        let peer = build(&test_config());
        let handle = peer.spawn_leader_checker(Duration::from_secs(3600));
        peer.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("leader checker task must exit promptly on shutdown")
            .unwrap();
    }
}
