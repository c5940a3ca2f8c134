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

//! # Local cluster storage
//!
//! The embedded store that backs one peer: a named collection of clusters, each an
//! [`LhpeCluster`](cluster::ClusterState)-style linear-hashing bucket directory. This
//! is what [`crate::autosharded::AutoshardedStorage`] wraps and delegates to whenever
//! a record's routing key resolves to the local node.

pub mod cluster;
pub mod error;

use crate::bucket::WritebackList;
use crate::rid::{
    ClusterId, FetchPlan, OperationResult, PhysicalPosition, RawBuffer, RecordType,
    RecordVersion, Rid, WriteMode,
};
use cluster::{ClusterState, DEFAULT_INITIAL_DIRECTORY_SIZE};
use error::{LocalStoreError, LocalStoreResult};
use log::{info, trace};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// The contract `AutoshardedStorage` wraps. Mirrors the shape of a real embedded
/// engine's callInLock-guarded CRUD surface, minus the data-segment and secondary-index
/// machinery this core leaves out of scope.
pub trait LocalStore: Send + Sync {
    fn create_record(
        &self,
        rid: &mut Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
        mode: WriteMode,
    ) -> LocalStoreResult<OperationResult<PhysicalPosition>>;

    fn read_record(
        &self,
        rid: Rid,
        fetch_plan: FetchPlan,
        ignore_cache: bool,
    ) -> LocalStoreResult<OperationResult<RawBuffer>>;

    fn update_record(
        &self,
        rid: Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
        mode: WriteMode,
    ) -> LocalStoreResult<OperationResult<RecordVersion>>;

    fn delete_record(
        &self,
        rid: Rid,
        version: RecordVersion,
        mode: WriteMode,
    ) -> LocalStoreResult<OperationResult<bool>>;

    fn is_lh_clusters_used(&self) -> bool;

    fn open(&self) -> LocalStoreResult<()>;
    fn close(&self) -> LocalStoreResult<()>;
    fn exists(&self, rid: Rid) -> bool;

    fn add_cluster(&self, name: &str) -> LocalStoreResult<ClusterId>;
    fn drop_cluster(&self, id: ClusterId) -> LocalStoreResult<()>;
    fn cluster_id_for_name(&self, name: &str) -> Option<ClusterId>;
    fn cluster_name_for_id(&self, id: ClusterId) -> Option<String>;
    fn cluster_record_count(&self, id: ClusterId) -> LocalStoreResult<usize>;

    /// Raw bytes of one bucket in `id`'s directory, for capturing a snapshot to
    /// later reload with [`Self::restore_bucket`].
    fn snapshot_bucket(&self, id: ClusterId, is_overflow: bool, index: usize) -> LocalStoreResult<Vec<u8>>;

    /// Reload one bucket in `id`'s directory in place from a previously captured
    /// snapshot, rehydrating its transient decode state from the raw bytes instead
    /// of rebuilding it from scratch.
    fn restore_bucket(
        &self,
        id: ClusterId,
        is_overflow: bool,
        index: usize,
        buffer: &[u8],
    ) -> LocalStoreResult<()>;
}

struct DirtyCounter {
    main: AtomicU64,
    overflow: AtomicU64,
}

impl WritebackList for DirtyCounter {
    fn mark_dirty(&self, bucket_position: u64, is_overflow: bool) {
        trace!(
            "bucket {} ({}) marked dirty",
            bucket_position,
            if is_overflow { "overflow" } else { "main" }
        );
        if is_overflow {
            self.overflow.fetch_add(1, Ordering::Relaxed);
        } else {
            self.main.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A concrete [`LocalStore`]: an in-process directory of LHPE clusters.
pub struct LhpeStore {
    clusters: RwLock<HashMap<ClusterId, ClusterState>>,
    names: RwLock<HashMap<String, ClusterId>>,
    next_cluster_id: AtomicI64,
    dirty: Arc<DirtyCounter>,
    initial_directory_size: usize,
}

impl LhpeStore {
    pub fn new() -> Self {
        Self::with_initial_directory_size(DEFAULT_INITIAL_DIRECTORY_SIZE)
    }

    /// Like [`Self::new`], but every cluster's bucket directory starts at
    /// `initial_directory_size` main buckets instead of the built-in default —
    /// the resolved configuration's `storage.initial_directory_size` knob.
    pub fn with_initial_directory_size(initial_directory_size: usize) -> Self {
        Self {
            clusters: RwLock::new(HashMap::new()),
            names: RwLock::new(HashMap::new()),
            next_cluster_id: AtomicI64::new(0),
            dirty: Arc::new(DirtyCounter {
                main: AtomicU64::new(0),
                overflow: AtomicU64::new(0),
            }),
            initial_directory_size,
        }
    }

    /// Total bucket mutations observed so far (main, overflow), for diagnostics.
    pub fn dirty_counts(&self) -> (u64, u64) {
        (
            self.dirty.main.load(Ordering::Relaxed),
            self.dirty.overflow.load(Ordering::Relaxed),
        )
    }
}

impl Default for LhpeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for LhpeStore {
    fn create_record(
        &self,
        rid: &mut Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
        _mode: WriteMode,
    ) -> LocalStoreResult<OperationResult<PhysicalPosition>> {
        let mut clusters = self.clusters.write();
        let cluster = clusters
            .get_mut(&rid.cluster_id)
            .ok_or(LocalStoreError::NoSuchCluster)?;
        let key = (rid.cluster_id, rid.cluster_position);
        if cluster.key_exists(key) {
            return Err(LocalStoreError::DuplicateKey);
        }
        let data_segment_pos = cluster.store_content(content);
        let pp = PhysicalPosition {
            data_segment_id: 0,
            data_segment_pos,
            record_type,
            record_version: version,
        };
        cluster.insert(key, pp);
        info!(
            "cluster {}: created record at position {}",
            rid.cluster_id, rid.cluster_position
        );
        Ok(OperationResult::local(pp))
    }

    fn read_record(
        &self,
        rid: Rid,
        _fetch_plan: FetchPlan,
        _ignore_cache: bool,
    ) -> LocalStoreResult<OperationResult<RawBuffer>> {
        let clusters = self.clusters.read();
        let cluster = clusters
            .get(&rid.cluster_id)
            .ok_or(LocalStoreError::NoSuchCluster)?;
        let key = (rid.cluster_id, rid.cluster_position);
        let pp = cluster.get(key).ok_or(LocalStoreError::RecordNotFound)?;
        let content = cluster
            .content(pp.data_segment_pos)
            .ok_or(LocalStoreError::RecordNotFound)?;
        Ok(OperationResult::local(content))
    }

    fn update_record(
        &self,
        rid: Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
        _mode: WriteMode,
    ) -> LocalStoreResult<OperationResult<RecordVersion>> {
        let mut clusters = self.clusters.write();
        let cluster = clusters
            .get_mut(&rid.cluster_id)
            .ok_or(LocalStoreError::NoSuchCluster)?;
        let key = (rid.cluster_id, rid.cluster_position);
        let existing = cluster.get(key).ok_or(LocalStoreError::RecordNotFound)?;
        let pp = PhysicalPosition {
            record_type,
            record_version: version,
            ..existing
        };
        cluster.replace_content(existing.data_segment_pos, content);
        let updated = cluster.set_value(key, pp);
        debug_assert!(updated, "presence already confirmed via cluster.get");
        Ok(OperationResult::local(version))
    }

    fn delete_record(
        &self,
        rid: Rid,
        _version: RecordVersion,
        _mode: WriteMode,
    ) -> LocalStoreResult<OperationResult<bool>> {
        let mut clusters = self.clusters.write();
        let cluster = clusters
            .get_mut(&rid.cluster_id)
            .ok_or(LocalStoreError::NoSuchCluster)?;
        let key = (rid.cluster_id, rid.cluster_position);
        let Some(pp) = cluster.get(key) else {
            return Ok(OperationResult::local(false));
        };
        cluster.drop_content(pp.data_segment_pos);
        let removed = cluster.remove(key);
        Ok(OperationResult::local(removed))
    }

    fn is_lh_clusters_used(&self) -> bool {
        true
    }

    fn open(&self) -> LocalStoreResult<()> {
        Ok(())
    }

    fn close(&self) -> LocalStoreResult<()> {
        Ok(())
    }

    fn exists(&self, rid: Rid) -> bool {
        self.clusters
            .read()
            .get(&rid.cluster_id)
            .is_some_and(|c| c.key_exists((rid.cluster_id, rid.cluster_position)))
    }

    fn add_cluster(&self, name: &str) -> LocalStoreResult<ClusterId> {
        let mut names = self.names.write();
        if names.contains_key(name) {
            return Err(LocalStoreError::ClusterAlreadyExists);
        }
        let id = self.next_cluster_id.fetch_add(1, Ordering::Relaxed) as ClusterId;
        self.clusters.write().insert(
            id,
            ClusterState::new(id, name.to_owned(), self.dirty.clone(), self.initial_directory_size),
        );
        names.insert(name.to_owned(), id);
        info!("cluster '{name}' created with id {id}");
        Ok(id)
    }

    fn drop_cluster(&self, id: ClusterId) -> LocalStoreResult<()> {
        let cluster = self
            .clusters
            .write()
            .remove(&id)
            .ok_or(LocalStoreError::NoSuchCluster)?;
        self.names.write().remove(&cluster.name);
        info!("cluster '{}' (id {id}) dropped", cluster.name);
        Ok(())
    }

    fn cluster_id_for_name(&self, name: &str) -> Option<ClusterId> {
        self.names.read().get(name).copied()
    }

    fn cluster_name_for_id(&self, id: ClusterId) -> Option<String> {
        self.clusters.read().get(&id).map(|c| c.name.clone())
    }

    fn cluster_record_count(&self, id: ClusterId) -> LocalStoreResult<usize> {
        self.clusters
            .read()
            .get(&id)
            .map(ClusterState::record_count)
            .ok_or(LocalStoreError::NoSuchCluster)
    }

    fn snapshot_bucket(&self, id: ClusterId, is_overflow: bool, index: usize) -> LocalStoreResult<Vec<u8>> {
        let clusters = self.clusters.read();
        let cluster = clusters.get(&id).ok_or(LocalStoreError::NoSuchCluster)?;
        Ok(cluster.bucket_raw(is_overflow, index).to_vec())
    }

    fn restore_bucket(
        &self,
        id: ClusterId,
        is_overflow: bool,
        index: usize,
        buffer: &[u8],
    ) -> LocalStoreResult<()> {
        let mut clusters = self.clusters.write();
        let cluster = clusters.get_mut(&id).ok_or(LocalStoreError::NoSuchCluster)?;
        cluster.restore_bucket(is_overflow, index, buffer)?;
        trace!("cluster {id}: bucket ({is_overflow}, {index}) rehydrated from a snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn store_with_cluster() -> (LhpeStore, ClusterId) {
        let store = LhpeStore::new();
        let id = store.add_cluster("people").unwrap();
        (store, id)
    }

    #[test]
    fn create_read_update_delete_round_trip() {
        let (store, cid) = store_with_cluster();
        let mut rid = Rid::new(cid, 42);
        let result = store
            .create_record(
                &mut rid,
                Bytes::from_static(b"hello"),
                RecordVersion(1),
                b'd' as i8,
                WriteMode::default(),
            )
            .unwrap();
        assert!(!result.from_remote);

        let read = store
            .read_record(rid, FetchPlan::default(), false)
            .unwrap();
        assert_eq!(read.payload, Bytes::from_static(b"hello"));

        store
            .update_record(
                rid,
                Bytes::from_static(b"world"),
                RecordVersion(2),
                b'd' as i8,
                WriteMode::default(),
            )
            .unwrap();
        let read = store
            .read_record(rid, FetchPlan::default(), false)
            .unwrap();
        assert_eq!(read.payload, Bytes::from_static(b"world"));

        let deleted = store
            .delete_record(rid, RecordVersion(2), WriteMode::default())
            .unwrap();
        assert!(deleted.payload);
        assert!(!store.exists(rid));
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let (store, cid) = store_with_cluster();
        let mut rid = Rid::new(cid, 7);
        store
            .create_record(&mut rid, Bytes::new(), RecordVersion(1), 0, WriteMode::default())
            .unwrap();
        let mut rid2 = Rid::new(cid, 7);
        let err = store
            .create_record(&mut rid2, Bytes::new(), RecordVersion(1), 0, WriteMode::default())
            .unwrap_err();
        assert!(matches!(err, LocalStoreError::DuplicateKey));
    }

    #[test]
    fn read_missing_record_is_an_error() {
        let (store, cid) = store_with_cluster();
        let err = store
            .read_record(Rid::new(cid, 1), FetchPlan::default(), false)
            .unwrap_err();
        assert!(matches!(err, LocalStoreError::RecordNotFound));
    }

    #[test]
    fn bucket_snapshot_and_restore_round_trip() {
        let (store, cid) = store_with_cluster();
        let mut rid = Rid::new(cid, 0);
        store
            .create_record(&mut rid, Bytes::from_static(b"a"), RecordVersion(1), 0, WriteMode::default())
            .unwrap();
        let snapshot = store.snapshot_bucket(cid, false, 0).unwrap();

        let mut rid2 = Rid::new(cid, 4);
        store
            .create_record(&mut rid2, Bytes::from_static(b"b"), RecordVersion(1), 0, WriteMode::default())
            .unwrap();
        assert!(store.exists(rid2));

        store.restore_bucket(cid, false, 0, &snapshot).unwrap();
        assert!(store.exists(rid));
        assert!(!store.exists(rid2), "reload discards what the snapshot predates");
    }

    #[test]
    fn cluster_administration() {
        let store = LhpeStore::new();
        let id = store.add_cluster("orders").unwrap();
        assert_eq!(store.cluster_id_for_name("orders"), Some(id));
        assert_eq!(store.cluster_name_for_id(id), Some("orders".to_owned()));
        assert!(matches!(
            store.add_cluster("orders").unwrap_err(),
            LocalStoreError::ClusterAlreadyExists
        ));
        store.drop_cluster(id).unwrap();
        assert_eq!(store.cluster_id_for_name("orders"), None);
    }
}
