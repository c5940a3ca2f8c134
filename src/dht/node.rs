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

use super::error::DhtResult;
use super::ring::NodeId;
use crate::localstore::LocalStore;
use crate::rid::{PhysicalPosition, RawBuffer, RecordType, RecordVersion, Rid};
use std::sync::Arc;

/// An abstract peer. Both the local node and every remote peer this process knows
/// about implement the same RPC surface; `is_local()` is what lets
/// `crate::autosharded::AutoshardedStorage` short-circuit instead of dispatching.
///
/// `storage_name` threads through every RPC because a deployment may host more than
/// one named storage per node; this core's own [`LocalNode`] hosts exactly one
/// [`LocalStore`] and ignores it beyond logging.
pub trait Node: Send + Sync {
    fn node_id(&self) -> NodeId;
    fn is_local(&self) -> bool;

    fn create_record(
        &self,
        storage_name: &str,
        rid: Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
    ) -> DhtResult<PhysicalPosition>;

    fn read_record(&self, storage_name: &str, rid: Rid) -> DhtResult<RawBuffer>;

    fn update_record(
        &self,
        storage_name: &str,
        rid: Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
    ) -> DhtResult<RecordVersion>;

    /// `forwarded` is `true` when this call is itself the remote side of a delete
    /// another peer is already forwarding — threaded explicitly rather than carried
    /// in thread-local state (see the crate's design notes on avoiding ambient flags
    /// that can be left set across unrelated calls).
    fn delete_record(
        &self,
        storage_name: &str,
        rid: Rid,
        version: RecordVersion,
        forwarded: bool,
    ) -> DhtResult<bool>;
}

/// This process's own node: every RPC call is a direct dispatch into the wrapped
/// [`LocalStore`], never leaving the process.
pub struct LocalNode {
    id: NodeId,
    store: Arc<dyn LocalStore>,
}

impl LocalNode {
    pub fn new(id: NodeId, store: Arc<dyn LocalStore>) -> Self {
        Self { id, store }
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }
}

impl Node for LocalNode {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_local(&self) -> bool {
        true
    }

    fn create_record(
        &self,
        _storage_name: &str,
        mut rid: Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
    ) -> DhtResult<PhysicalPosition> {
        let result = self
            .store
            .create_record(&mut rid, content, version, record_type, Default::default())?;
        Ok(result.payload)
    }

    fn read_record(&self, _storage_name: &str, rid: Rid) -> DhtResult<RawBuffer> {
        let result = self
            .store
            .read_record(rid, Default::default(), false)?;
        Ok(result.payload)
    }

    fn update_record(
        &self,
        _storage_name: &str,
        rid: Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
    ) -> DhtResult<RecordVersion> {
        let result = self
            .store
            .update_record(rid, content, version, record_type, Default::default())?;
        Ok(result.payload)
    }

    fn delete_record(
        &self,
        _storage_name: &str,
        rid: Rid,
        version: RecordVersion,
        _forwarded: bool,
    ) -> DhtResult<bool> {
        let result = self.store.delete_record(rid, version, Default::default())?;
        Ok(result.payload)
    }
}

/// A peer reached over the RPC transport. This core leaves the concrete transport out
/// of scope (`crate::SPEC_FULL.md` §1); `RemoteNode` wraps any in-process stand-in that
/// implements [`Node`] so the routing core in `crate::autosharded` can be exercised
/// end-to-end without a real network.
pub struct RemoteNode {
    id: NodeId,
    peer: Arc<dyn Node>,
}

impl RemoteNode {
    pub fn new(peer: Arc<dyn Node>) -> Self {
        Self {
            id: peer.node_id(),
            peer,
        }
    }
}

impl Node for RemoteNode {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_local(&self) -> bool {
        false
    }

    fn create_record(
        &self,
        storage_name: &str,
        rid: Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
    ) -> DhtResult<PhysicalPosition> {
        self.peer
            .create_record(storage_name, rid, content, version, record_type)
    }

    fn read_record(&self, storage_name: &str, rid: Rid) -> DhtResult<RawBuffer> {
        self.peer.read_record(storage_name, rid)
    }

    fn update_record(
        &self,
        storage_name: &str,
        rid: Rid,
        content: RawBuffer,
        version: RecordVersion,
        record_type: RecordType,
    ) -> DhtResult<RecordVersion> {
        self.peer
            .update_record(storage_name, rid, content, version, record_type)
    }

    fn delete_record(
        &self,
        storage_name: &str,
        rid: Rid,
        version: RecordVersion,
        forwarded: bool,
    ) -> DhtResult<bool> {
        self.peer.delete_record(storage_name, rid, version, forwarded)
    }
}
