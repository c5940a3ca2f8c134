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

//! # DHT
//!
//! The ring of peers records are placed on: node identity, successor resolution, and
//! the abstract per-record RPC surface every peer (local or remote) answers to.

pub mod error;
pub mod node;
pub mod ring;

use log::info;
use node::{LocalNode, Node};
use parking_lot::RwLock;
use ring::{NodeId, Ring};
use std::sync::Arc;

/// Thin façade a peer process owns: its own node plus the ring it resolves successors
/// against. This is the injection point `crate::autosharded::AutoshardedStorage` uses
/// to reach the ring without knowing anything about membership management.
pub struct ServerInstance {
    local: Arc<LocalNode>,
    ring: RwLock<Ring>,
}

impl ServerInstance {
    pub fn new(local: Arc<LocalNode>) -> Self {
        let mut ring = Ring::new();
        ring.join(local.clone());
        Self {
            local,
            ring: RwLock::new(ring),
        }
    }

    pub fn local_node(&self) -> Arc<LocalNode> {
        self.local.clone()
    }

    pub fn join(&self, node: Arc<dyn Node>) {
        let id = node.node_id();
        self.ring.write().join(node);
        info!("ring membership: node {id} joined");
    }

    pub fn leave(&self, id: NodeId) {
        self.ring.write().leave(id);
        info!("ring membership: node {id} left");
    }

    pub fn find_successor(&self, key: u64) -> Option<Arc<dyn Node>> {
        self.ring.read().find_successor(key)
    }

    pub fn member_count(&self) -> usize {
        self.ring.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localstore::LhpeStore;

    #[test]
    fn a_lone_node_is_always_its_own_successor() {
        let store = Arc::new(LhpeStore::new());
        let local = Arc::new(LocalNode::new(NodeId::from_bytes([1; 20]), store));
        let server = ServerInstance::new(local.clone());
        let successor = server.find_successor(12345).unwrap();
        assert!(successor.is_local());
        assert_eq!(successor.node_id(), local.node_id());
    }
}
