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

//! A single linear-hashing extensible cluster: a directory of main buckets, each
//! optionally chained to one overflow bucket, plus the in-memory content map that
//! stands in for a real data segment (out of scope per the top-level spec).
//!
//! A main/overflow chain is considered "full end-to-end" once both its main bucket
//! *and* its overflow bucket (if it has one) report no free slot; at that point the
//! directory doubles and every live record is rehashed, rather than growing the chain
//! with a second overflow bucket. This keeps chain walks bounded at two hops.

use crate::bucket::{Bucket, WritebackList};
use crate::rid::{ClusterId, ClusterPosition, PhysicalPosition, RawBuffer};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

fn main_index(position: ClusterPosition, directory_len: usize) -> usize {
    (position as u64 as usize) % directory_len
}

/// One named local cluster: a bucket directory plus its record content.
pub struct ClusterState {
    pub id: ClusterId,
    pub name: String,
    directory: Vec<Bucket>,
    overflow: Vec<Bucket>,
    content: HashMap<i64, RawBuffer>,
    next_content_pos: i64,
    owner: Arc<dyn WritebackList>,
}

/// Fallback directory size for callers that don't have a configured value on hand
/// (e.g. test harnesses); `LhpeStore` normally passes through the resolved
/// configuration's `initial_directory_size` instead of relying on this default.
pub const DEFAULT_INITIAL_DIRECTORY_SIZE: usize = 4;

impl ClusterState {
    pub fn new(
        id: ClusterId,
        name: String,
        owner: Arc<dyn WritebackList>,
        initial_directory_size: usize,
    ) -> Self {
        let initial_directory_size = initial_directory_size.max(1);
        let directory = (0..initial_directory_size)
            .map(|i| Bucket::new(i as u64, false, Some(owner.clone())))
            .collect();
        Self {
            id,
            name,
            directory,
            overflow: Vec::new(),
            content: HashMap::new(),
            next_content_pos: 0,
            owner,
        }
    }

    /// Does any slot in this cluster already hold `key`?
    pub fn key_exists(&self, key: (ClusterId, ClusterPosition)) -> bool {
        self.locate(key).is_some()
    }

    /// Find the (bucket-kind, bucket-index, slot-index) holding `key`, if any.
    fn locate(&self, key: (ClusterId, ClusterPosition)) -> Option<(bool, usize, u8)> {
        let idx = main_index(key.1, self.directory.len());
        let main = &self.directory[idx];
        for slot in 0..main.size() {
            if main.key_at(slot).ok()? == key {
                return Some((false, idx, slot));
            }
        }
        let overflow_idx = main.overflow_bucket();
        if overflow_idx >= 0 {
            let overflow = &self.overflow[overflow_idx as usize];
            for slot in 0..overflow.size() {
                if overflow.key_at(slot).ok()? == key {
                    return Some((true, overflow_idx as usize, slot));
                }
            }
        }
        None
    }

    fn bucket_mut(&mut self, is_overflow: bool, index: usize) -> &mut Bucket {
        if is_overflow {
            &mut self.overflow[index]
        } else {
            &mut self.directory[index]
        }
    }

    fn bucket(&self, is_overflow: bool, index: usize) -> &Bucket {
        if is_overflow {
            &self.overflow[index]
        } else {
            &self.directory[index]
        }
    }

    /// Insert `(key, pp)`, doubling the directory and rehashing as many times as
    /// needed until the target chain has room.
    pub fn insert(&mut self, key: (ClusterId, ClusterPosition), pp: PhysicalPosition) {
        loop {
            if self.try_insert(key, pp) {
                return;
            }
            self.double_and_rehash();
        }
    }

    fn try_insert(&mut self, key: (ClusterId, ClusterPosition), pp: PhysicalPosition) -> bool {
        let idx = main_index(key.1, self.directory.len());
        if self.directory[idx].size() as usize != crate::bucket::BUCKET_CAPACITY {
            self.directory[idx].add_physical_position(key, pp).expect("checked capacity");
            return true;
        }
        let overflow_idx = self.directory[idx].overflow_bucket();
        if overflow_idx >= 0 {
            let overflow = &mut self.overflow[overflow_idx as usize];
            if overflow.size() as usize != crate::bucket::BUCKET_CAPACITY {
                overflow.add_physical_position(key, pp).expect("checked capacity");
                return true;
            }
            return false;
        }
        let new_idx = self.overflow.len() as u64;
        let mut new_overflow = Bucket::new(new_idx, true, Some(self.owner.clone()));
        new_overflow.add_physical_position(key, pp).expect("fresh bucket has room");
        self.overflow.push(new_overflow);
        self.directory[idx].set_overflow_bucket(new_idx as i64);
        true
    }

    fn double_and_rehash(&mut self) {
        let old_len = self.directory.len();
        let new_len = old_len * 2;
        debug!(
            "cluster {} ({}): directory full end-to-end, doubling {} -> {}",
            self.id, self.name, old_len, new_len
        );
        let mut live = Vec::new();
        for bucket in self.directory.iter().chain(self.overflow.iter()) {
            for slot in 0..bucket.size() {
                let key = bucket.key_at(slot).expect("slot within size");
                let pp = bucket.physical_position(slot).expect("slot within size");
                live.push((key, pp));
            }
        }
        self.directory = (0..new_len)
            .map(|i| Bucket::new(i as u64, false, Some(self.owner.clone())))
            .collect();
        self.overflow.clear();
        for (key, pp) in live {
            let inserted = self.try_insert(key, pp);
            debug_assert!(inserted, "fresh double-width directory must accept every live record");
        }
    }

    pub fn get(&self, key: (ClusterId, ClusterPosition)) -> Option<PhysicalPosition> {
        let (is_overflow, index, slot) = self.locate(key)?;
        self.bucket(is_overflow, index).physical_position(slot).ok()
    }

    pub fn set_value(&mut self, key: (ClusterId, ClusterPosition), pp: PhysicalPosition) -> bool {
        match self.locate(key) {
            Some((is_overflow, index, slot)) => {
                self.bucket_mut(is_overflow, index)
                    .set_physical_position(slot, pp)
                    .expect("slot located by key_at is in range");
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: (ClusterId, ClusterPosition)) -> bool {
        match self.locate(key) {
            Some((is_overflow, index, slot)) => {
                self.bucket_mut(is_overflow, index)
                    .remove_physical_position(slot)
                    .expect("slot located by key_at is in range");
                true
            }
            None => false,
        }
    }

    pub fn store_content(&mut self, content: RawBuffer) -> i64 {
        let pos = self.next_content_pos;
        self.next_content_pos += 1;
        self.content.insert(pos, content);
        pos
    }

    pub fn content(&self, data_segment_pos: i64) -> Option<RawBuffer> {
        self.content.get(&data_segment_pos).cloned()
    }

    pub fn replace_content(&mut self, data_segment_pos: i64, content: RawBuffer) {
        self.content.insert(data_segment_pos, content);
    }

    pub fn drop_content(&mut self, data_segment_pos: i64) {
        self.content.remove(&data_segment_pos);
    }

    pub fn record_count(&self) -> usize {
        self.content.len()
    }

    /// Raw bytes of one bucket (main or overflow) in this cluster's directory, for
    /// capturing a snapshot to later reload with [`Self::restore_bucket`].
    pub fn bucket_raw(&self, is_overflow: bool, index: usize) -> &[u8] {
        self.bucket(is_overflow, index).raw_buffer()
    }

    /// Reload one bucket in place from previously-persisted bytes — the in-place
    /// counterpart to allocating a fresh bucket, used when this cluster's buckets
    /// are rehydrated from a snapshot instead of being rebuilt from scratch.
    pub fn restore_bucket(
        &mut self,
        is_overflow: bool,
        index: usize,
        buffer: &[u8],
    ) -> crate::bucket::error::BucketResult<()> {
        self.bucket_mut(is_overflow, index).deserialize_from(buffer)
    }
}
