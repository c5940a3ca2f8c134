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

//! # Autosharded storage
//!
//! The routing core: wraps an embedded [`LocalStore`] and intercepts every record
//! operation, sending it to whichever peer [`ServerInstance::find_successor`] names as
//! owner, short-circuiting to the wrapped store when that peer is this process.

pub mod error;

use crate::dht::ServerInstance;
use crate::localstore::LocalStore;
use crate::rid::{
    ClusterId, ClusterPosition, FetchPlan, OperationResult, RawBuffer, RecordType,
    RecordVersion, Rid, WriteMode,
};
use error::{AutoshardedError, AutoshardedResult};
use log::{error, warn};
use parking_lot::Mutex;
use rand_mt::Mt64;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The storage type string this layer reports. Preserves a misspelling carried over
/// from the format this crate is compatible with; any metadata already written with
/// that string must keep matching it.
pub const STORAGE_TYPE: &str = "autoshareded";

/// One create attempt plus nine redraws; the eleventh failure is surfaced.
const MAX_CREATE_ATTEMPTS: u32 = 11;

/// Draws the random cluster positions the create path assigns to new records.
pub trait PositionGenerator: Send + Sync {
    fn next_position(&self) -> ClusterPosition;
}

/// The production generator: a single Mersenne-Twister instance behind a mutex (the
/// source shares one unsynchronized instance across create calls; this reimplements
/// that sharing safely rather than removing it, since routing correctness only
/// depends on uniform distribution, not generator identity).
pub struct MtPositionGenerator {
    rng: Mutex<Mt64>,
}

impl MtPositionGenerator {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(Mt64::new(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        use rand::Rng;
        let seed = rand::thread_rng().gen::<u64>();
        Self::from_seed(seed)
    }
}

impl PositionGenerator for MtPositionGenerator {
    fn next_position(&self) -> ClusterPosition {
        use rand_core::RngCore;
        let draw = self.rng.lock().next_u64() as i64;
        // i64::MIN has no positive representation; wrapping_abs keeps this infallible.
        draw.wrapping_abs()
    }
}

/// Wraps an embedded [`LocalStore`] and routes every record operation through the DHT.
pub struct AutoshardedStorage {
    local_store: Arc<dyn LocalStore>,
    server: Arc<ServerInstance>,
    undistributed: HashSet<ClusterId>,
    generator: Arc<dyn PositionGenerator>,
    create_retries: AtomicU64,
}

impl AutoshardedStorage {
    pub fn new(
        local_store: Arc<dyn LocalStore>,
        server: Arc<ServerInstance>,
        undistributed: HashSet<ClusterId>,
        generator: Arc<dyn PositionGenerator>,
    ) -> Self {
        Self {
            local_store,
            server,
            undistributed,
            generator,
            create_retries: AtomicU64::new(0),
        }
    }

    /// This process's node id, reported unchanged as the storage id (§8 property 8).
    pub fn storage_id(&self) -> crate::dht::ring::NodeId {
        self.server.local_node().node_id()
    }

    pub const fn storage_type(&self) -> &'static str {
        STORAGE_TYPE
    }

    /// Retries issued by create-path collisions, scoped to this instance (kept
    /// separate from `crate::registry`'s process-wide counter so a single test can
    /// assert the exact retry bound without cross-test interference).
    pub fn create_retry_count(&self) -> u64 {
        self.create_retries.load(Ordering::Relaxed)
    }

    fn resolve(&self, routing_key: u64) -> AutoshardedResult<Arc<dyn crate::dht::node::Node>> {
        self.server.find_successor(routing_key).ok_or_else(|| {
            AutoshardedError::RemoteRpcError(crate::dht::error::DhtError::Transport(
                "ring has no members".to_owned(),
            ))
        })
    }

    /// Create path: generates a position for a pending RID, redrawing up to
    /// [`MAX_CREATE_ATTEMPTS`] times on a duplicate-key rejection from the owning peer
    /// (local or remote). A RID that already carries a position is routed once with no
    /// redraw (e.g. a replay/restore path) — there is nothing to redraw against.
    pub fn create_record(
        &self,
        rid: &mut Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
        mode: WriteMode,
    ) -> AutoshardedResult<OperationResult<crate::rid::PhysicalPosition>> {
        if self.undistributed.contains(&rid.cluster_id) {
            return Ok(self
                .local_store
                .create_record(rid, content, version, record_type, mode)?);
        }
        if !rid.is_pending() {
            return self.dispatch_create(rid, content, version, record_type, mode);
        }
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            rid.cluster_position = self.generator.next_position();
            match self.dispatch_create(rid, content.clone(), version, record_type, mode) {
                Ok(result) => return Ok(result),
                Err(AutoshardedError::RecordDuplicated) if attempt < MAX_CREATE_ATTEMPTS => {
                    self.create_retries.fetch_add(1, Ordering::Relaxed);
                    crate::registry::note_create_retry();
                    warn!(
                        "cluster {}: position {} collided (attempt {attempt}/{MAX_CREATE_ATTEMPTS})",
                        rid.cluster_id, rid.cluster_position
                    );
                    continue;
                }
                Err(AutoshardedError::RecordDuplicated) => {
                    error!(
                        "cluster {}: exhausted {MAX_CREATE_ATTEMPTS} create attempts",
                        rid.cluster_id
                    );
                    return Err(AutoshardedError::RecordDuplicated);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn dispatch_create(
        &self,
        rid: &mut Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
        mode: WriteMode,
    ) -> AutoshardedResult<OperationResult<crate::rid::PhysicalPosition>> {
        let node = self.resolve(rid.routing_key())?;
        if node.is_local() {
            Ok(self
                .local_store
                .create_record(rid, content, version, record_type, mode)?)
        } else {
            crate::registry::note_remote_dispatch();
            let pp = node.create_record("default", *rid, content, version, record_type)?;
            Ok(OperationResult::remote(pp))
        }
    }

    pub fn read_record(
        &self,
        rid: Rid,
        fetch_plan: FetchPlan,
        ignore_cache: bool,
    ) -> AutoshardedResult<OperationResult<RawBuffer>> {
        if self.undistributed.contains(&rid.cluster_id) {
            return Ok(self.local_store.read_record(rid, fetch_plan, ignore_cache)?);
        }
        let node = self.resolve(rid.routing_key())?;
        if node.is_local() {
            Ok(self.local_store.read_record(rid, fetch_plan, ignore_cache)?)
        } else {
            crate::registry::note_remote_dispatch();
            Ok(OperationResult::remote(node.read_record("default", rid)?))
        }
    }

    pub fn update_record(
        &self,
        rid: Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
        mode: WriteMode,
    ) -> AutoshardedResult<OperationResult<RecordVersion>> {
        if self.undistributed.contains(&rid.cluster_id) {
            return Ok(self
                .local_store
                .update_record(rid, content, version, record_type, mode)?);
        }
        let node = self.resolve(rid.routing_key())?;
        if node.is_local() {
            Ok(self
                .local_store
                .update_record(rid, content, version, record_type, mode)?)
        } else {
            crate::registry::note_remote_dispatch();
            let updated = node.update_record("default", rid, content, version, record_type)?;
            Ok(OperationResult::remote(updated))
        }
    }

    /// `forwarded` marks this call as the terminal, already-routed side of another
    /// peer's delete: it always delegates straight to the wrapped storage rather than
    /// resolving a successor again, which is what stops a delete from forwarding
    /// forever between peers with divergent ring views. External callers always pass
    /// `false`.
    pub fn delete_record(
        &self,
        rid: Rid,
        version: RecordVersion,
        mode: WriteMode,
        forwarded: bool,
    ) -> AutoshardedResult<OperationResult<bool>> {
        if forwarded || self.undistributed.contains(&rid.cluster_id) {
            return Ok(self.local_store.delete_record(rid, version, mode)?);
        }
        let node = self.resolve(rid.routing_key())?;
        if node.is_local() {
            Ok(self.local_store.delete_record(rid, version, mode)?)
        } else {
            crate::registry::note_remote_dispatch();
            let deleted = node.delete_record("default", rid, version, true)?;
            Ok(OperationResult::remote(deleted))
        }
    }

    /// Always refused: no distributed-transaction coordinator exists in this core.
    pub fn commit(&self) -> AutoshardedResult<()> {
        Err(AutoshardedError::DistributedUnavailable)
    }

    /// Always refused, for the same reason as [`Self::commit`].
    pub fn rollback(&self) -> AutoshardedResult<()> {
        Err(AutoshardedError::DistributedUnavailable)
    }

    pub fn exists(&self, rid: Rid) -> bool {
        self.local_store.exists(rid)
    }

    pub fn add_cluster(&self, name: &str) -> AutoshardedResult<ClusterId> {
        Ok(self.local_store.add_cluster(name)?)
    }

    pub fn drop_cluster(&self, id: ClusterId) -> AutoshardedResult<()> {
        Ok(self.local_store.drop_cluster(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::error::{DhtError, DhtResult};
    use crate::dht::node::{LocalNode, Node};
    use crate::dht::ring::NodeId;
    use crate::localstore::LhpeStore;
    use crate::rid::PhysicalPosition;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    fn node_id(high: u8) -> NodeId {
        let mut bytes = [0u8; 20];
        bytes[0] = high;
        NodeId::from_bytes(bytes)
    }

    struct ScriptedGenerator {
        values: Mutex<std::vec::IntoIter<i64>>,
    }
    impl ScriptedGenerator {
        fn new(values: Vec<i64>) -> Self {
            Self {
                values: Mutex::new(values.into_iter()),
            }
        }
    }
    impl PositionGenerator for ScriptedGenerator {
        fn next_position(&self) -> ClusterPosition {
            self.values.lock().next().expect("script exhausted")
        }
    }

    fn single_node_harness(
        undistributed: HashSet<ClusterId>,
        generator: Arc<dyn PositionGenerator>,
    ) -> AutoshardedStorage {
        let store = Arc::new(LhpeStore::new());
        store.add_cluster("c").unwrap();
        let local = Arc::new(LocalNode::new(node_id(1), store.clone()));
        let server = Arc::new(ServerInstance::new(local));
        AutoshardedStorage::new(store, server, undistributed, generator)
    }

    #[test]
    fn undistributed_cluster_bypasses_routing() {
        let mut undistributed = HashSet::new();
        undistributed.insert(0);
        let storage = single_node_harness(
            undistributed,
            Arc::new(ScriptedGenerator::new(vec![])),
        );
        let mut rid = Rid::new_pending(0);
        let result = storage
            .create_record(&mut rid, Bytes::from_static(b"x"), RecordVersion(1), 0, WriteMode::default())
            .unwrap();
        assert!(!result.from_remote);
        assert!(!rid.is_pending());
    }

    #[test]
    fn local_successor_delegates_without_remote_dispatch() {
        let storage = single_node_harness(
            HashSet::new(),
            Arc::new(ScriptedGenerator::new(vec![42])),
        );
        let mut rid = Rid::new_pending(0);
        let result = storage
            .create_record(&mut rid, Bytes::from_static(b"x"), RecordVersion(1), 0, WriteMode::default())
            .unwrap();
        assert!(!result.from_remote);
        assert_eq!(rid.cluster_position, 42);
    }

    /// A stand-in remote peer whose create path rejects a configured number of
    /// positions as duplicates before accepting.
    struct FlakyPeer {
        id: NodeId,
        rejects_remaining: AtomicUsize,
        calls: AtomicU64,
    }
    impl Node for FlakyPeer {
        fn node_id(&self) -> NodeId {
            self.id
        }
        fn is_local(&self) -> bool {
            false
        }
        fn create_record(
            &self,
            _storage_name: &str,
            rid: Rid,
            _content: RawBuffer,
            _version: RecordVersion,
            _record_type: RecordType,
        ) -> DhtResult<PhysicalPosition> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.rejects_remaining.load(Ordering::Relaxed) > 0 {
                self.rejects_remaining.fetch_sub(1, Ordering::Relaxed);
                return Err(DhtError::DuplicateKey);
            }
            Ok(PhysicalPosition {
                data_segment_id: 0,
                data_segment_pos: rid.cluster_position,
                record_type: 0,
                record_version: RecordVersion(0),
            })
        }
        fn read_record(&self, _: &str, _: Rid) -> DhtResult<RawBuffer> {
            unimplemented!()
        }
        fn update_record(
            &self,
            _: &str,
            _: Rid,
            _: RawBuffer,
            _: RecordVersion,
            _: RecordType,
        ) -> DhtResult<RecordVersion> {
            unimplemented!()
        }
        fn delete_record(&self, _: &str, _: Rid, _: RecordVersion, _: bool) -> DhtResult<bool> {
            unimplemented!()
        }
    }

    fn two_node_harness(rejects: usize) -> (AutoshardedStorage, Arc<FlakyPeer>) {
        let store = Arc::new(LhpeStore::new());
        store.add_cluster("c").unwrap();
        let local = Arc::new(LocalNode::new(node_id(0), store.clone()));
        let server = Arc::new(ServerInstance::new(local));
        let peer = Arc::new(FlakyPeer {
            id: node_id(255),
            rejects_remaining: AtomicUsize::new(rejects),
            calls: AtomicU64::new(0),
        });
        server.join(Arc::new(crate::dht::node::RemoteNode::new(peer.clone())));
        let generator = Arc::new(ScriptedGenerator::new((1..=20).map(|_| i64::MAX).collect()));
        (
            AutoshardedStorage::new(store, server, HashSet::new(), generator),
            peer,
        )
    }

    #[test]
    fn remote_create_dispatches_exactly_once_when_accepted() {
        let (storage, peer) = two_node_harness(0);
        let mut rid = Rid::new_pending(0);
        let result = storage
            .create_record(&mut rid, Bytes::new(), RecordVersion(1), 0, WriteMode::default())
            .unwrap();
        assert!(result.from_remote);
        assert_eq!(peer.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn duplicate_retry_succeeds_within_bound() {
        let (storage, peer) = two_node_harness(2);
        let mut rid = Rid::new_pending(0);
        storage
            .create_record(&mut rid, Bytes::new(), RecordVersion(1), 0, WriteMode::default())
            .unwrap();
        assert_eq!(peer.calls.load(Ordering::Relaxed), 3);
        assert_eq!(storage.create_retry_count(), 2);
    }

    #[test]
    fn create_exhaustion_caps_at_eleven_rpcs() {
        let (storage, peer) = two_node_harness(usize::MAX);
        let mut rid = Rid::new_pending(0);
        let err = storage
            .create_record(&mut rid, Bytes::new(), RecordVersion(1), 0, WriteMode::default())
            .unwrap_err();
        assert!(matches!(err, AutoshardedError::RecordDuplicated));
        assert_eq!(peer.calls.load(Ordering::Relaxed), MAX_CREATE_ATTEMPTS as u64);
    }

    #[test]
    fn commit_and_rollback_always_refused() {
        let storage = single_node_harness(HashSet::new(), Arc::new(ScriptedGenerator::new(vec![])));
        assert!(matches!(
            storage.commit().unwrap_err(),
            AutoshardedError::DistributedUnavailable
        ));
        assert!(matches!(
            storage.rollback().unwrap_err(),
            AutoshardedError::DistributedUnavailable
        ));
    }

    #[test]
    fn storage_id_is_stable() {
        let storage = single_node_harness(HashSet::new(), Arc::new(ScriptedGenerator::new(vec![])));
        let id = storage.storage_id();
        assert_eq!(storage.storage_id(), id);
        assert_eq!(storage.storage_type(), "autoshareded");
    }

    #[test]
    fn forwarded_delete_skips_routing() {
        // a single-node ring where the only peer is remote: a non-forwarded delete
        // would dispatch an RPC, but forwarded=true must always go straight to the
        // wrapped store instead.
        let store = Arc::new(LhpeStore::new());
        let cid = store.add_cluster("c").unwrap();
        let local = Arc::new(LocalNode::new(node_id(0), store.clone()));
        let server = Arc::new(ServerInstance::new(local));
        let peer = Arc::new(FlakyPeer {
            id: node_id(255),
            rejects_remaining: AtomicUsize::new(0),
            calls: AtomicU64::new(0),
        });
        server.join(Arc::new(crate::dht::node::RemoteNode::new(peer.clone())));
        let storage = AutoshardedStorage::new(
            store.clone(),
            server,
            HashSet::new(),
            Arc::new(ScriptedGenerator::new(vec![])),
        );
        let rid = Rid::new(cid, 999);
        let result = storage
            .delete_record(rid, RecordVersion(0), WriteMode::default(), true)
            .unwrap();
        assert!(!result.from_remote);
        assert_eq!(peer.calls.load(Ordering::Relaxed), 0);
    }
}
