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

//! # Binary converter
//!
//! Endian-explicit accessors over a byte buffer. The on-disk byte order for this
//! crate's bucket format is fixed to little-endian (see [`DISK_ORDER_IS_LE`]); when the
//! host is also little-endian, the decode/encode calls below degenerate to a plain
//! `copy_from_slice`, which is what [`native_acceleration_used`] reports.
//!
//! Callers use [`native_acceleration_used`] to decide whether they can treat the byte
//! buffer as authoritative on every access (the accelerated path) or whether they need
//! a small decode cache that they reconcile explicitly on flush (see [`crate::bucket`]).

/// The on-disk byte order this crate persists bucket data in.
pub const DISK_ORDER_IS_LE: bool = true;

/// True when the host's native byte order already matches [`DISK_ORDER_IS_LE`], i.e.
/// no shuffle is needed between the in-memory value and its on-disk representation.
#[inline(always)]
pub const fn native_acceleration_used() -> bool {
    cfg!(target_endian = "little") == DISK_ORDER_IS_LE
}

macro_rules! impl_get_put {
    ($get:ident, $put:ident, $ty:ty, $n:literal) => {
        #[doc = concat!("Read a `", stringify!($ty), "` at `offset` from `buf`.")]
        ///
        /// # Panics
        /// Panics if `offset + size_of::<T>()` exceeds `buf.len()`; offsets are the
        /// caller's contract per the binary converter specification.
        #[inline]
        pub fn $get(buf: &[u8], offset: usize) -> $ty {
            let mut scratch = [0u8; $n];
            scratch.copy_from_slice(&buf[offset..offset + $n]);
            if DISK_ORDER_IS_LE {
                <$ty>::from_le_bytes(scratch)
            } else {
                <$ty>::from_be_bytes(scratch)
            }
        }

        #[doc = concat!("Write a `", stringify!($ty), "` at `offset` into `buf`.")]
        ///
        /// # Panics
        /// Panics if `offset + size_of::<T>()` exceeds `buf.len()`.
        #[inline]
        pub fn $put(buf: &mut [u8], offset: usize, value: $ty) {
            let bytes = if DISK_ORDER_IS_LE {
                value.to_le_bytes()
            } else {
                value.to_be_bytes()
            };
            buf[offset..offset + $n].copy_from_slice(&bytes);
        }
    };
}

impl_get_put!(get_i8, put_i8, i8, 1);
impl_get_put!(get_u8, put_u8, u8, 1);
impl_get_put!(get_i16, put_i16, i16, 2);
impl_get_put!(get_u16, put_u16, u16, 2);
impl_get_put!(get_i32, put_i32, i32, 4);
impl_get_put!(get_u32, put_u32, u32, 4);
impl_get_put!(get_i64, put_i64, i64, 8);
impl_get_put!(get_u64, put_u64, u64, 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_i64() {
        let mut buf = [0u8; 16];
        put_i64(&mut buf, 4, -9_223_372_036_854_775_800);
        assert_eq!(get_i64(&buf, 4), -9_223_372_036_854_775_800);
    }

    #[test]
    fn roundtrip_i32() {
        let mut buf = [0u8; 8];
        put_i32(&mut buf, 0, i32::MIN);
        assert_eq!(get_i32(&buf, 0), i32::MIN);
    }

    #[test]
    fn native_acceleration_matches_disk_order_check() {
        // on little-endian hosts (the overwhelming majority of CI/deploy targets)
        // this must be true; on a big-endian host it must be false.
        assert_eq!(native_acceleration_used(), cfg!(target_endian = "little"));
    }
}
