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

use core::fmt;

pub type BucketResult<T> = Result<T, SerializationError>;

/// Errors raised while decoding a bucket's byte buffer. Should be impossible given
/// the fixed layout and a validated `size` byte; raised only on corruption.
#[derive(Debug)]
pub enum SerializationError {
    /// The buffer handed to [`super::Bucket::from_raw`] isn't `BUCKET_SIZE_IN_BYTES`
    /// long.
    BadBufferLength { expected: usize, got: usize },
    /// The `size` byte exceeds [`super::BUCKET_CAPACITY`].
    SizeOutOfRange(u8),
    /// The bucket is full; the caller must allocate (or follow) an overflow bucket.
    BucketFull,
    /// An index passed to [`super::Bucket::physical_position`] or
    /// [`super::Bucket::remove_physical_position`] isn't a live slot.
    SlotOutOfRange { index: u8, size: u8 },
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadBufferLength { expected, got } => {
                write!(f, "bad bucket buffer length: expected {expected}, got {got}")
            }
            Self::SizeOutOfRange(size) => {
                write!(f, "bucket size byte {size} exceeds capacity")
            }
            Self::BucketFull => write!(f, "bucket is full; allocate an overflow bucket"),
            Self::SlotOutOfRange { index, size } => {
                write!(f, "slot index {index} is not live (size is {size})")
            }
        }
    }
}

impl std::error::Error for SerializationError {}
