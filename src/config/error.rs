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
use std::io;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration is surfaced as a typed error before the server starts; malformed
/// input is never a panic.
#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_yaml::Error),
    /// `node.id` wasn't 40 hex characters (a 160-bit id).
    InvalidNodeId(String),
    /// `storage.disk_byte_order` named something other than `"little"` (the only
    /// choice this crate implements; see `binconv::DISK_ORDER_IS_LE`).
    InvalidByteOrder(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "could not read configuration file: {e}"),
            Self::Parse(e) => write!(f, "could not parse configuration: {e}"),
            Self::InvalidNodeId(s) => write!(f, "node.id must be 40 hex characters, got {s:?}"),
            Self::InvalidByteOrder(s) => {
                write!(f, "storage.disk_byte_order must be \"little\", got {s:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Parse(e)
    }
}
