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

//! # Record identity
//!
//! Small, fixed-shape identifier types shared by every layer above the bucket format:
//! the record id itself, its on-disk locator, and the opaque bits (version, type,
//! fetch plan) that the wrapped local storage and the DHT RPC surface pass around
//! without interpreting.

use core::fmt;

/// The numeric id of a cluster (a logical collection of records sharing one local
/// storage stream).
pub type ClusterId = i16;

/// An intra-cluster record index. Doubles as the DHT routing key: `findSuccessor` is
/// always called with a `ClusterPosition` reinterpreted as `u64` (see
/// [`ClusterPosition::as_routing_key`]).
pub type ClusterPosition = i64;

/// A record identifier: `(clusterId, clusterPosition)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid {
    pub cluster_id: ClusterId,
    pub cluster_position: ClusterPosition,
}

impl Rid {
    /// A RID with no cluster position assigned yet; `autosharded::AutoshardedStorage`
    /// recognizes this as "new" on the create path and fills in `cluster_position`
    /// once a position has been successfully reserved.
    pub const UNASSIGNED_POSITION: ClusterPosition = -1;

    pub const fn new_pending(cluster_id: ClusterId) -> Self {
        Self {
            cluster_id,
            cluster_position: Self::UNASSIGNED_POSITION,
        }
    }

    pub const fn new(cluster_id: ClusterId, cluster_position: ClusterPosition) -> Self {
        Self {
            cluster_id,
            cluster_position,
        }
    }

    pub const fn is_pending(&self) -> bool {
        self.cluster_position == Self::UNASSIGNED_POSITION
    }

    /// The 64-bit routing key used to resolve this record's owning peer.
    pub const fn routing_key(&self) -> u64 {
        self.cluster_position as u64
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cluster_id, self.cluster_position)
    }
}

/// The record type byte. The original taxonomy (document/raw/flat) is opaque to this
/// core; only its width (1 byte) matters for the bucket layout.
pub type RecordType = i8;

/// A monotonically comparable record version. Out of scope is *how* a version is
/// produced (that's the entity-mapping layer's job); this core only needs it to be a
/// fixed-width, copyable token it can store in a bucket value slot and hand back
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct RecordVersion(pub u64);

impl RecordVersion {
    pub const SIZE: usize = 8;

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }
}

/// The on-disk locator for a record: which data segment, what offset within it, the
/// record type, and its version. This is what a bucket value slot stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalPosition {
    pub data_segment_id: i32,
    pub data_segment_pos: i64,
    pub record_type: RecordType,
    pub record_version: RecordVersion,
}

/// Raw, undecoded record bytes as returned by a read. The entity-mapping layer
/// (out of scope here) is responsible for interpreting the contents.
pub type RawBuffer = bytes::Bytes;

/// What to fetch alongside a record read. The secondary-index/graph traversal layers
/// that would populate this are out of scope; this core treats it as an opaque token
/// it passes through unchanged to the wrapped local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchPlan {
    pub depth: u8,
}

/// Per-operation write mode, passed through unchanged to the wrapped storage's own
/// `callInLock`-style locking (out of scope here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Synchronous,
    Buffered,
}

/// The result of any record operation: the payload plus whether it was served by a
/// remote peer (`true`) or the local wrapped storage decided its own answer
/// (`false` for a purely local store).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationResult<T> {
    pub payload: T,
    pub from_remote: bool,
}

impl<T> OperationResult<T> {
    pub const fn local(payload: T) -> Self {
        Self {
            payload,
            from_remote: false,
        }
    }

    pub const fn remote(payload: T) -> Self {
        Self {
            payload,
            from_remote: true,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        OperationResult {
            payload: f(self.payload),
            from_remote: self.from_remote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_rid_recognized() {
        let rid = Rid::new_pending(3);
        assert!(rid.is_pending());
        let rid = Rid::new(3, 42);
        assert!(!rid.is_pending());
    }

    #[test]
    fn version_roundtrip() {
        let v = RecordVersion(0xdead_beef_cafe_u64);
        assert_eq!(RecordVersion::from_bytes(v.to_bytes()), v);
    }
}
