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

//! The Chord-style ring: 160-bit node identities, a 64-bit projection for routing
//! against the 64-bit cluster positions records carry, and successor resolution.

use super::node::Node;
use core::fmt;
use std::sync::Arc;

/// A 160-bit node identifier, stored big-endian so lexicographic byte comparison
/// matches numeric comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId([u8; 20]);

impl NodeId {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 20] {
        self.0
    }

    /// The 64-bit ring key used for routing: the high 8 bytes of the 160-bit id.
    /// Records only carry a 64-bit `clusterPosition`, so this is the projection the
    /// autosharded layer actually searches the ring against (see `SPEC_FULL.md` §3,
    /// §12 Open Questions).
    pub fn ring_key(&self) -> u64 {
        let mut high = [0u8; 8];
        high.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(high)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// The known membership of the ring, ordered by [`NodeId::ring_key`].
pub struct Ring {
    members: Vec<Arc<dyn Node>>,
}

impl Ring {
    pub fn new() -> Self {
        Self { members: Vec::new() }
    }

    pub fn with_members(members: Vec<Arc<dyn Node>>) -> Self {
        let mut ring = Self { members };
        ring.members.sort_by_key(|n| n.node_id().ring_key());
        ring
    }

    pub fn join(&mut self, node: Arc<dyn Node>) {
        let pos = self
            .members
            .partition_point(|n| n.node_id().ring_key() < node.node_id().ring_key());
        self.members.insert(pos, node);
    }

    pub fn leave(&mut self, id: NodeId) {
        self.members.retain(|n| n.node_id() != id);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The first node whose ring key is `>= key`, wrapping around to the lowest-keyed
    /// node if `key` is past every member (the standard Chord successor rule).
    pub fn find_successor(&self, key: u64) -> Option<Arc<dyn Node>> {
        if self.members.is_empty() {
            return None;
        }
        let idx = self.members.partition_point(|n| n.node_id().ring_key() < key);
        let idx = if idx == self.members.len() { 0 } else { idx };
        Some(self.members[idx].clone())
    }
}

impl Default for Ring {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::error::DhtResult;
    use crate::rid::{PhysicalPosition, RawBuffer, RecordType, RecordVersion, Rid};

    struct StubNode {
        id: NodeId,
    }
    impl Node for StubNode {
        fn node_id(&self) -> NodeId {
            self.id
        }
        fn is_local(&self) -> bool {
            false
        }
        fn create_record(
            &self,
            _: &str,
            _: Rid,
            _: RawBuffer,
            _: RecordVersion,
            _: RecordType,
        ) -> DhtResult<PhysicalPosition> {
            unimplemented!()
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

    fn id(high_byte: u8) -> NodeId {
        let mut bytes = [0u8; 20];
        bytes[0] = high_byte;
        NodeId::from_bytes(bytes)
    }

    #[test]
    fn ring_key_projection_matches_high_byte() {
        assert_eq!(id(0x42).ring_key() >> 56, 0x42);
    }

    #[test]
    fn successor_picks_first_geq_and_wraps() {
        let mut ring = Ring::new();
        ring.join(Arc::new(StubNode { id: id(10) }));
        ring.join(Arc::new(StubNode { id: id(50) }));
        ring.join(Arc::new(StubNode { id: id(90) }));

        let key_at = |b: u8| (b as u64) << 56;

        assert_eq!(ring.find_successor(key_at(20)).unwrap().node_id(), id(50));
        assert_eq!(ring.find_successor(key_at(50)).unwrap().node_id(), id(50));
        // past every member: wraps to the lowest-keyed node
        assert_eq!(ring.find_successor(key_at(200)).unwrap().node_id(), id(10));
    }

    #[test]
    fn empty_ring_has_no_successor() {
        let ring = Ring::new();
        assert!(ring.find_successor(0).is_none());
    }

    #[test]
    fn leave_removes_member() {
        let mut ring = Ring::new();
        ring.join(Arc::new(StubNode { id: id(1) }));
        ring.join(Arc::new(StubNode { id: id(2) }));
        ring.leave(id(1));
        assert_eq!(ring.len(), 1);
    }
}
