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

use crate::localstore::error::LocalStoreError;
use core::fmt;

pub type DhtResult<T> = Result<T, DhtError>;

/// Errors surfaced by a [`super::node::Node`] RPC. The routing core
/// (`crate::autosharded`) distinguishes [`DhtError::DuplicateKey`] from everything
/// else: only that variant drives the create-path retry loop.
#[derive(Debug)]
pub enum DhtError {
    /// The position this create targeted is already occupied on the owning peer.
    DuplicateKey,
    /// No record at the given RID.
    NotFound,
    /// The RPC transport itself failed (timeout, connection refused, ...). This core
    /// does not implement a concrete transport; a real one plugs in its own variant
    /// data where this placeholder carries a message.
    Transport(String),
    /// The owning peer's local storage rejected the operation for a reason other than
    /// a duplicate key.
    LocalStore(LocalStoreError),
}

impl fmt::Display for DhtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey => write!(f, "duplicate key at owning peer"),
            Self::NotFound => write!(f, "no record at the given position"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::LocalStore(e) => write!(f, "local storage error: {e}"),
        }
    }
}

impl std::error::Error for DhtError {}

impl From<LocalStoreError> for DhtError {
    fn from(e: LocalStoreError) -> Self {
        match e {
            LocalStoreError::DuplicateKey => Self::DuplicateKey,
            LocalStoreError::RecordNotFound => Self::NotFound,
            other => Self::LocalStore(other),
        }
    }
}
