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

//! # Bucket
//!
//! The fixed-size on-disk slot array behind each local cluster: a byte-exact layout
//! (`size` byte, key area, value area, overflow pointer) with dirty-slot tracking so a
//! containing [`crate::localstore`] cluster can flush only what changed.
//!
//! The buffer is always the source of truth (see [`crate::binconv`]): every mutator
//! writes through it immediately, and a small decode cache exists only to avoid
//! re-parsing a slot that was just written. Dirty flags track which slots have changed
//! *since the last [`Bucket::serialize`]*, not whether the buffer is internally
//! consistent — it always is.

pub mod error;

use crate::binconv;
use crate::rid::{ClusterId, ClusterPosition, PhysicalPosition, RecordVersion};
use error::{BucketResult, SerializationError};
use std::cell::RefCell;
use std::sync::Arc;

/// Slots per bucket.
pub const BUCKET_CAPACITY: usize = 64;
/// Bytes reserved per key slot. The routing key (`ClusterId` + `ClusterPosition`) only
/// needs 10 of these; the rest mirrors the upstream format's room for a larger
/// composite index key and is left zeroed here.
pub const KEY_SIZE: usize = 192;
/// `dataSegmentId(i32) + dataSegmentPos(i64) + recordType(i8)`.
pub const VALUE_FIXED_SIZE: usize = 4 + 8 + 1;
/// Fixed part plus the serialized [`RecordVersion`].
pub const VALUE_SIZE: usize = VALUE_FIXED_SIZE + RecordVersion::SIZE;

const KEY_AREA_START: usize = 1;
/// Offset of the first value slot.
pub const FIRST_VALUE_POS: usize = KEY_AREA_START + BUCKET_CAPACITY * KEY_SIZE;
/// Offset of the overflow pointer (an `i64`, stored biased by +1).
pub const OVERFLOW_POS: usize = FIRST_VALUE_POS + BUCKET_CAPACITY * VALUE_SIZE;
/// Total on-disk size of one bucket.
pub const BUCKET_SIZE_IN_BYTES: usize = OVERFLOW_POS + 8;

fn key_offset(index: usize) -> usize {
    KEY_AREA_START + index * KEY_SIZE
}

fn value_offset(index: usize) -> usize {
    FIRST_VALUE_POS + index * VALUE_SIZE
}

fn encode_key(cluster_id: ClusterId, cluster_position: ClusterPosition) -> [u8; KEY_SIZE] {
    let mut out = [0u8; KEY_SIZE];
    binconv::put_i16(&mut out, 0, cluster_id);
    binconv::put_i64(&mut out, 2, cluster_position);
    out
}

fn decode_key(buf: &[u8]) -> (ClusterId, ClusterPosition) {
    (binconv::get_i16(buf, 0), binconv::get_i64(buf, 2))
}

fn encode_value(pp: PhysicalPosition) -> [u8; VALUE_SIZE] {
    let mut out = [0u8; VALUE_SIZE];
    binconv::put_i32(&mut out, 0, pp.data_segment_id);
    binconv::put_i64(&mut out, 4, pp.data_segment_pos);
    binconv::put_i8(&mut out, 12, pp.record_type);
    out[VALUE_FIXED_SIZE..].copy_from_slice(&pp.record_version.to_bytes());
    out
}

fn decode_value(buf: &[u8]) -> PhysicalPosition {
    let mut version_bytes = [0u8; RecordVersion::SIZE];
    version_bytes.copy_from_slice(&buf[VALUE_FIXED_SIZE..VALUE_SIZE]);
    PhysicalPosition {
        data_segment_id: binconv::get_i32(buf, 0),
        data_segment_pos: binconv::get_i64(buf, 4),
        record_type: binconv::get_i8(buf, 12),
        record_version: RecordVersion::from_bytes(version_bytes),
    }
}

/// A patch emitted by [`Bucket::serialize`]: a contiguous byte range that changed
/// since the previous call and must be persisted by the owning store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyPatch {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

/// Something a [`Bucket`] registers itself with whenever it's mutated, so the
/// containing local cluster knows which bucket (main or overflow) needs flushing.
pub trait WritebackList: Send + Sync {
    fn mark_dirty(&self, bucket_position: u64, is_overflow: bool);
}

/// A fixed-size record container: capacity 64, one key + value slot pair each, plus an
/// overflow pointer. See the module docs for the dirty-tracking/writeback contract.
pub struct Bucket {
    buf: Box<[u8]>,
    position: u64,
    is_overflow: bool,
    owner: Option<Arc<dyn WritebackList>>,
    value_cache: RefCell<[Option<PhysicalPosition>; BUCKET_CAPACITY]>,
    overflow_cache: RefCell<Option<i64>>,
    keys_dirty: RefCell<[bool; BUCKET_CAPACITY]>,
    values_dirty: RefCell<[bool; BUCKET_CAPACITY]>,
    overflow_dirty: RefCell<bool>,
}

impl Bucket {
    /// Allocate a fresh, zeroed bucket. `position` is this bucket's own index within
    /// the owning cluster's bucket file (main or overflow list, per `is_overflow`).
    pub fn new(position: u64, is_overflow: bool, owner: Option<Arc<dyn WritebackList>>) -> Self {
        Self {
            buf: vec![0u8; BUCKET_SIZE_IN_BYTES].into_boxed_slice(),
            position,
            is_overflow,
            owner,
            value_cache: RefCell::new([None; BUCKET_CAPACITY]),
            overflow_cache: RefCell::new(None),
            keys_dirty: RefCell::new([false; BUCKET_CAPACITY]),
            values_dirty: RefCell::new([false; BUCKET_CAPACITY]),
            overflow_dirty: RefCell::new(false),
        }
    }

    /// Load a bucket from a previously persisted buffer (e.g. read back off disk).
    pub fn from_raw(
        buf: Vec<u8>,
        position: u64,
        is_overflow: bool,
        owner: Option<Arc<dyn WritebackList>>,
    ) -> BucketResult<Self> {
        if buf.len() != BUCKET_SIZE_IN_BYTES {
            return Err(SerializationError::BadBufferLength {
                expected: BUCKET_SIZE_IN_BYTES,
                got: buf.len(),
            });
        }
        let size = buf[0];
        if size as usize > BUCKET_CAPACITY {
            return Err(SerializationError::SizeOutOfRange(size));
        }
        Ok(Self {
            buf: buf.into_boxed_slice(),
            position,
            is_overflow,
            owner,
            value_cache: RefCell::new([None; BUCKET_CAPACITY]),
            overflow_cache: RefCell::new(None),
            keys_dirty: RefCell::new([false; BUCKET_CAPACITY]),
            values_dirty: RefCell::new([false; BUCKET_CAPACITY]),
            overflow_dirty: RefCell::new(false),
        })
    }

    /// Reload this bucket's buffer and transient decode state in place from `buffer`
    /// (e.g. after a simulated disk reload in tests, or when a local cluster
    /// rehydrates a bucket from a previously captured snapshot), rather than
    /// allocating a fresh [`Bucket`] the way [`Self::from_raw`] does. `buffer`
    /// becomes the new source of truth, so every dirty flag is cleared: nothing is
    /// pending a writeback immediately after a reload.
    pub fn deserialize_from(&mut self, buffer: &[u8]) -> BucketResult<()> {
        if buffer.len() != BUCKET_SIZE_IN_BYTES {
            return Err(SerializationError::BadBufferLength {
                expected: BUCKET_SIZE_IN_BYTES,
                got: buffer.len(),
            });
        }
        let size = buffer[0];
        if size as usize > BUCKET_CAPACITY {
            return Err(SerializationError::SizeOutOfRange(size));
        }
        self.buf.copy_from_slice(buffer);
        *self.value_cache.borrow_mut() = [None; BUCKET_CAPACITY];
        *self.overflow_cache.borrow_mut() = None;
        *self.keys_dirty.borrow_mut() = [false; BUCKET_CAPACITY];
        *self.values_dirty.borrow_mut() = [false; BUCKET_CAPACITY];
        *self.overflow_dirty.borrow_mut() = false;
        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_overflow_bucket(&self) -> bool {
        self.is_overflow
    }

    /// The raw on-disk bytes. Always authoritative: every mutator writes through it.
    pub fn raw_buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Number of live slots.
    pub fn size(&self) -> u8 {
        self.buf[0]
    }

    fn set_size(&mut self, size: u8) {
        self.buf[0] = size;
    }

    /// The index of this bucket's overflow bucket, or `-1` if it has none.
    pub fn overflow_bucket(&self) -> i64 {
        if let Some(cached) = *self.overflow_cache.borrow() {
            return cached;
        }
        let stored = binconv::get_i64(&self.buf, OVERFLOW_POS);
        let value = stored - 1;
        *self.overflow_cache.borrow_mut() = Some(value);
        value
    }

    /// Link this bucket to an overflow bucket at `idx` (or clear the link for
    /// `idx < 0`). Registers with the owning writeback list.
    pub fn set_overflow_bucket(&mut self, idx: i64) {
        binconv::put_i64(&mut self.buf, OVERFLOW_POS, idx + 1);
        *self.overflow_cache.borrow_mut() = Some(idx);
        *self.overflow_dirty.borrow_mut() = true;
        self.add_to_store_list();
    }

    /// Append `(key, pp)` at the next free slot.
    ///
    /// # Errors
    /// [`SerializationError::BucketFull`] if `size() == BUCKET_CAPACITY`; the caller
    /// must allocate (or follow) an overflow bucket instead.
    pub fn add_physical_position(
        &mut self,
        key: (ClusterId, ClusterPosition),
        pp: PhysicalPosition,
    ) -> BucketResult<u8> {
        let size = self.size();
        if size as usize == BUCKET_CAPACITY {
            return Err(SerializationError::BucketFull);
        }
        let idx = size as usize;
        let key_bytes = encode_key(key.0, key.1);
        let value_bytes = encode_value(pp);
        self.buf[key_offset(idx)..key_offset(idx) + KEY_SIZE].copy_from_slice(&key_bytes);
        self.buf[value_offset(idx)..value_offset(idx) + VALUE_SIZE].copy_from_slice(&value_bytes);
        self.value_cache.borrow_mut()[idx] = Some(pp);
        self.keys_dirty.borrow_mut()[idx] = true;
        self.values_dirty.borrow_mut()[idx] = true;
        self.set_size(size + 1);
        self.add_to_store_list();
        Ok(idx as u8)
    }

    /// Overwrite the value half of an already-live slot in place (the key is left
    /// untouched). Used by a containing store's `update_record` path, which never
    /// changes a record's routing key.
    pub fn set_physical_position(&mut self, index: u8, pp: PhysicalPosition) -> BucketResult<()> {
        let size = self.size();
        if index >= size {
            return Err(SerializationError::SlotOutOfRange { index, size });
        }
        let idx = index as usize;
        let value_bytes = encode_value(pp);
        self.buf[value_offset(idx)..value_offset(idx) + VALUE_SIZE].copy_from_slice(&value_bytes);
        self.value_cache.borrow_mut()[idx] = Some(pp);
        self.values_dirty.borrow_mut()[idx] = true;
        self.add_to_store_list();
        Ok(())
    }

    /// Remove the slot at `index` by swapping the last live slot into its place and
    /// decrementing `size` (the upstream no-op is fixed per this crate's design notes;
    /// see `SPEC_FULL.md` §9/§12).
    pub fn remove_physical_position(&mut self, index: u8) -> BucketResult<()> {
        let size = self.size();
        if index >= size {
            return Err(SerializationError::SlotOutOfRange { index, size });
        }
        let last = size - 1;
        if index != last {
            let (li, lu) = (last as usize, index as usize);
            let last_key = self.buf[key_offset(li)..key_offset(li) + KEY_SIZE].to_vec();
            let last_value = self.buf[value_offset(li)..value_offset(li) + VALUE_SIZE].to_vec();
            self.buf[key_offset(lu)..key_offset(lu) + KEY_SIZE].copy_from_slice(&last_key);
            self.buf[value_offset(lu)..value_offset(lu) + VALUE_SIZE].copy_from_slice(&last_value);
            self.value_cache.borrow_mut()[lu] = self.value_cache.borrow()[li];
            self.keys_dirty.borrow_mut()[lu] = true;
            self.values_dirty.borrow_mut()[lu] = true;
        }
        self.value_cache.borrow_mut()[last as usize] = None;
        self.keys_dirty.borrow_mut()[last as usize] = true;
        self.values_dirty.borrow_mut()[last as usize] = true;
        self.set_size(last);
        self.add_to_store_list();
        Ok(())
    }

    /// The routing key stored at `index`.
    pub fn key_at(&self, index: u8) -> BucketResult<(ClusterId, ClusterPosition)> {
        let size = self.size();
        if index >= size {
            return Err(SerializationError::SlotOutOfRange { index, size });
        }
        let off = key_offset(index as usize);
        Ok(decode_key(&self.buf[off..off + KEY_SIZE]))
    }

    /// The physical position stored at `index`, from the decode cache if present,
    /// otherwise decoded from the buffer (and cached).
    pub fn physical_position(&self, index: u8) -> BucketResult<PhysicalPosition> {
        let size = self.size();
        if index >= size {
            return Err(SerializationError::SlotOutOfRange { index, size });
        }
        let idx = index as usize;
        if let Some(cached) = self.value_cache.borrow()[idx] {
            return Ok(cached);
        }
        let off = value_offset(idx);
        let decoded = decode_value(&self.buf[off..off + VALUE_SIZE]);
        self.value_cache.borrow_mut()[idx] = Some(decoded);
        Ok(decoded)
    }

    /// Walk the dirty bitmap, emit a patch per dirty slot/overflow pointer, and clear
    /// all flags. Idempotent: calling this twice in a row with no intervening mutation
    /// returns an empty `Vec` the second time.
    pub fn serialize(&mut self) -> Vec<DirtyPatch> {
        let mut patches = Vec::new();
        {
            let mut keys_dirty = self.keys_dirty.borrow_mut();
            for (idx, dirty) in keys_dirty.iter_mut().enumerate() {
                if *dirty {
                    let off = key_offset(idx);
                    patches.push(DirtyPatch {
                        offset: off,
                        bytes: self.buf[off..off + KEY_SIZE].to_vec(),
                    });
                    *dirty = false;
                }
            }
        }
        {
            let mut values_dirty = self.values_dirty.borrow_mut();
            for (idx, dirty) in values_dirty.iter_mut().enumerate() {
                if *dirty {
                    let off = value_offset(idx);
                    patches.push(DirtyPatch {
                        offset: off,
                        bytes: self.buf[off..off + VALUE_SIZE].to_vec(),
                    });
                    *dirty = false;
                }
            }
        }
        if *self.overflow_dirty.borrow() {
            patches.push(DirtyPatch {
                offset: OVERFLOW_POS,
                bytes: self.buf[OVERFLOW_POS..OVERFLOW_POS + 8].to_vec(),
            });
            *self.overflow_dirty.borrow_mut() = false;
        }
        patches
    }

    fn add_to_store_list(&self) {
        if let Some(owner) = &self.owner {
            owner.mark_dirty(self.position, self.is_overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rid::RecordVersion;

    fn pp(n: i64) -> PhysicalPosition {
        PhysicalPosition {
            data_segment_id: 0,
            data_segment_pos: n,
            record_type: b'd' as i8,
            record_version: RecordVersion(n as u64),
        }
    }

    #[test]
    fn fresh_bucket_reports_no_overflow() {
        let b = Bucket::new(0, false, None);
        assert_eq!(b.overflow_bucket(), -1);
        assert_eq!(b.size(), 0);
    }

    #[test]
    fn overflow_sentinel_roundtrip() {
        let mut b = Bucket::new(0, false, None);
        b.set_overflow_bucket(7);
        assert_eq!(b.overflow_bucket(), 7);
        b.set_overflow_bucket(0);
        assert_eq!(b.overflow_bucket(), 0);
    }

    #[test]
    fn add_and_read_back() {
        let mut b = Bucket::new(0, false, None);
        for i in 0..5i64 {
            b.add_physical_position((3, i), pp(i)).unwrap();
        }
        assert_eq!(b.size(), 5);
        for i in 0..5i64 {
            assert_eq!(b.key_at(i as u8).unwrap(), (3, i));
            assert_eq!(b.physical_position(i as u8).unwrap(), pp(i));
        }
    }

    #[test]
    fn fill_to_capacity_then_reject() {
        let mut b = Bucket::new(0, false, None);
        for i in 0..BUCKET_CAPACITY as i64 {
            b.add_physical_position((1, i), pp(i)).unwrap();
        }
        assert_eq!(b.size() as usize, BUCKET_CAPACITY);
        let err = b.add_physical_position((1, 999), pp(999)).unwrap_err();
        assert!(matches!(err, SerializationError::BucketFull));
    }

    #[test]
    fn round_trip_through_raw_buffer() {
        let mut b = Bucket::new(0, false, None);
        let expected: Vec<_> = (0..10i64).map(pp).collect();
        for (i, p) in expected.iter().enumerate() {
            b.add_physical_position((2, i as i64), *p).unwrap();
        }
        b.serialize();
        let raw = b.raw_buffer().to_vec();
        let reloaded = Bucket::from_raw(raw, 0, false, None).unwrap();
        assert_eq!(reloaded.size() as usize, expected.len());
        for (i, p) in expected.iter().enumerate() {
            assert_eq!(reloaded.physical_position(i as u8).unwrap(), *p);
        }
    }

    #[test]
    fn serialize_is_idempotent_when_clean() {
        let mut b = Bucket::new(0, false, None);
        b.add_physical_position((1, 1), pp(1)).unwrap();
        let first = b.serialize();
        assert!(!first.is_empty());
        let second = b.serialize();
        assert!(second.is_empty());
    }

    #[test]
    fn remove_swaps_last_slot_into_hole() {
        let mut b = Bucket::new(0, false, None);
        for i in 0..4i64 {
            b.add_physical_position((1, i), pp(i)).unwrap();
        }
        b.remove_physical_position(1).unwrap();
        assert_eq!(b.size(), 3);
        // slot 1 now holds what used to be the last slot (index 3 / position 3)
        assert_eq!(b.key_at(1).unwrap(), (1, 3));
        assert_eq!(b.physical_position(1).unwrap(), pp(3));
        // the other untouched slots are unaffected
        assert_eq!(b.key_at(0).unwrap(), (1, 0));
        assert_eq!(b.key_at(2).unwrap(), (1, 2));
    }

    #[test]
    fn deserialize_from_reloads_in_place() {
        let mut source = Bucket::new(0, false, None);
        source.add_physical_position((2, 9), pp(9)).unwrap();
        source.serialize();
        let snapshot = source.raw_buffer().to_vec();

        let mut target = Bucket::new(0, false, None);
        target.add_physical_position((1, 1), pp(1)).unwrap();
        target.deserialize_from(&snapshot).unwrap();

        assert_eq!(target.size(), 1);
        assert_eq!(target.key_at(0).unwrap(), (2, 9));
        assert_eq!(target.physical_position(0).unwrap(), pp(9));
        assert!(target.serialize().is_empty(), "a freshly reloaded bucket has nothing dirty");
    }

    #[test]
    fn deserialize_from_rejects_wrong_length() {
        let mut b = Bucket::new(0, false, None);
        let err = b.deserialize_from(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, SerializationError::BadBufferLength { .. }));
    }

    struct RecordingOwner {
        calls: std::sync::Mutex<Vec<(u64, bool)>>,
    }
    impl WritebackList for RecordingOwner {
        fn mark_dirty(&self, bucket_position: u64, is_overflow: bool) {
            self.calls.lock().unwrap().push((bucket_position, is_overflow));
        }
    }

    #[test]
    fn mutators_register_with_writeback_list() {
        let owner = Arc::new(RecordingOwner {
            calls: std::sync::Mutex::new(Vec::new()),
        });
        let mut b = Bucket::new(4, true, Some(owner.clone()));
        b.add_physical_position((1, 1), pp(1)).unwrap();
        b.set_overflow_bucket(2);
        let calls = owner.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(pos, overflow)| *pos == 4 && *overflow));
    }
}
