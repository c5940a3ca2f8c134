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
use core::fmt;

pub type LocalStoreResult<T> = Result<T, LocalStoreError>;

/// Errors raised by a [`super::LocalStore`] implementation.
#[derive(Debug)]
pub enum LocalStoreError {
    /// `create_record` was asked to place a key that's already present in this
    /// cluster. The autosharded routing core (`crate::autosharded`) treats this
    /// specially: it's the signal to redraw a position and retry.
    DuplicateKey,
    /// No record found at the given RID.
    RecordNotFound,
    /// The named cluster doesn't exist.
    NoSuchCluster,
    /// A cluster with that name already exists.
    ClusterAlreadyExists,
    /// The underlying bucket layout rejected an operation.
    Bucket(SerializationError),
}

impl fmt::Display for LocalStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey => write!(f, "a record already occupies this position"),
            Self::RecordNotFound => write!(f, "no record at the given position"),
            Self::NoSuchCluster => write!(f, "no such cluster"),
            Self::ClusterAlreadyExists => write!(f, "cluster already exists"),
            Self::Bucket(e) => write!(f, "bucket error: {e}"),
        }
    }
}

impl std::error::Error for LocalStoreError {}

impl From<SerializationError> for LocalStoreError {
    fn from(e: SerializationError) -> Self {
        Self::Bucket(e)
    }
}
