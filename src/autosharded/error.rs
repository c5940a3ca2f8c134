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

use crate::bucket::error::SerializationError;
use crate::dht::error::DhtError;
use crate::localstore::error::LocalStoreError;
use core::fmt;

pub type AutoshardedResult<T> = Result<T, AutoshardedError>;

/// The error taxonomy for the routing core, one variant per kind (§7 of this crate's
/// design notes), each with a `From` conversion at the boundary it crosses.
#[derive(Debug)]
pub enum AutoshardedError {
    /// The create path exhausted its 10 redraws against a position that kept
    /// colliding at the owning peer.
    RecordDuplicated,
    /// `commit`/`rollback` are always refused in sharded mode.
    DistributedUnavailable,
    /// A peer RPC failed for a reason other than a duplicate key.
    RemoteRpcError(DhtError),
    /// The wrapped local storage reported an error on the local-delegation path.
    LocalStorageError(LocalStoreError),
    /// A bucket failed to decode; should be impossible outside corruption.
    SerializationError(SerializationError),
}

impl fmt::Display for AutoshardedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordDuplicated => write!(f, "record position collided after 10 retries"),
            Self::DistributedUnavailable => {
                write!(f, "transactions are not supported in a distributed environment")
            }
            Self::RemoteRpcError(e) => write!(f, "remote RPC error: {e}"),
            Self::LocalStorageError(e) => write!(f, "local storage error: {e}"),
            Self::SerializationError(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl std::error::Error for AutoshardedError {}

impl From<LocalStoreError> for AutoshardedError {
    fn from(e: LocalStoreError) -> Self {
        match e {
            LocalStoreError::DuplicateKey => Self::RecordDuplicated,
            other => Self::LocalStorageError(other),
        }
    }
}

impl From<DhtError> for AutoshardedError {
    fn from(e: DhtError) -> Self {
        match e {
            DhtError::DuplicateKey => Self::RecordDuplicated,
            other => Self::RemoteRpcError(other),
        }
    }
}

impl From<SerializationError> for AutoshardedError {
    fn from(e: SerializationError) -> Self {
        Self::SerializationError(e)
    }
}
