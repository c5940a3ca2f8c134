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

//! # Leader checker
//!
//! A per-peer periodic task that watches a heartbeat timestamp and triggers a
//! takeover transition at most once. Driven the same way as this crate's other
//! background services: a fixed tick racing a broadcast shutdown signal.

use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;

/// The state machine's two observable states. `TAKING_LEADERSHIP` -> `LEADER` or
/// `-> FOLLOWER` is the manager's own responsibility, outside this checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderState {
    Follower,
    TakingLeadership,
}

/// What the checker calls, exactly once, on timeout.
pub trait LeaderManager: Send + Sync {
    fn became_leader(&self);
}

/// Shared, mutable last-seen heartbeat timestamp for the peer being watched. A real
/// deployment updates this from whatever transport carries heartbeats; this core only
/// consumes it.
#[derive(Clone)]
pub struct HeartbeatClock {
    last_heartbeat: Arc<RwLock<DateTime<Utc>>>,
}

impl HeartbeatClock {
    pub fn new(initial: DateTime<Utc>) -> Self {
        Self {
            last_heartbeat: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn record_heartbeat(&self, at: DateTime<Utc>) {
        *self.last_heartbeat.write() = at;
    }

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        *self.last_heartbeat.read()
    }
}

/// Watches one peer's [`HeartbeatClock`] and fires [`LeaderManager::became_leader`]
/// exactly once if it goes stale past `heartbeat_delay * 1.3`.
pub struct LeaderChecker {
    clock: HeartbeatClock,
    heartbeat_delay: Duration,
    state: RwLock<LeaderState>,
    fired: AtomicBool,
}

impl LeaderChecker {
    /// `heartbeat_delay` is the configured base interval; this checker applies the
    /// 30% grace period itself.
    pub fn new(clock: HeartbeatClock, heartbeat_delay: Duration) -> Self {
        Self {
            clock,
            heartbeat_delay,
            state: RwLock::new(LeaderState::Follower),
            fired: AtomicBool::new(false),
        }
    }

    fn timeout(&self) -> Duration {
        self.heartbeat_delay.mul_f64(1.3)
    }

    pub fn state(&self) -> LeaderState {
        *self.state.read()
    }

    /// Evaluate one tick: if the gap since the last heartbeat exceeds the grace
    /// period, transition to `TakingLeadership` and call `manager.became_leader()`.
    /// Returns `true` iff this call triggered the transition (it can trigger it at
    /// most once per `LeaderChecker` instance).
    fn tick(&self, manager: &dyn LeaderManager) -> bool {
        if self.fired.load(Ordering::Acquire) {
            return false;
        }
        let gap = Utc::now().signed_duration_since(self.clock.last_heartbeat());
        let gap = gap.to_std().unwrap_or(Duration::ZERO);
        if gap <= self.timeout() {
            return false;
        }
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        *self.state.write() = LeaderState::TakingLeadership;
        warn!("peer heartbeat stale by {gap:?}, taking leadership");
        manager.became_leader();
        true
    }

    /// Run the periodic task until `shutdown` fires or a timeout transition happens.
    /// Mirrors the "race a tick against a broadcast shutdown" shape this crate's
    /// other background services use.
    pub async fn run(
        self: Arc<Self>,
        manager: Arc<dyn LeaderManager>,
        tick_period: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = interval(tick_period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.tick(manager.as_ref()) {
                        info!("leader checker: timeout transition fired, exiting");
                        return;
                    }
                }
                _ = shutdown.recv() => {
                    info!("leader checker: shutdown signal received, exiting");
                    return;
                }
            }
        }
    }
}
