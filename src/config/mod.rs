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

//! # Configuration
//!
//! A layered YAML configuration surface, deserialized with `serde` + `serde_yaml` in
//! the same `ConfigFile` -> resolved-`Config` shape this codebase's own config loader
//! uses: a raw, mostly-`Option` file representation, resolved against documented
//! defaults into a concrete [`Config`] the rest of the crate consumes.

pub mod error;
pub mod file;

use crate::dht::ring::NodeId;
use error::{ConfigError, ConfigResult};
use file::ConfigFile;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HEARTBEAT_DELAY_MILLIS: u64 = 2_000;
pub const DEFAULT_INITIAL_DIRECTORY_SIZE: usize = 4;

/// The resolved configuration every other module reads from, with all defaults
/// applied and the node id already derived.
#[derive(Debug, Clone)]
pub struct Config {
    pub node_id: NodeId,
    pub bind: SocketAddr,
    pub undistributed_clusters: Vec<String>,
    pub heartbeat_delay: Duration,
    pub initial_directory_size: usize,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_str(&raw)
    }

    pub fn from_str(raw: &str) -> ConfigResult<Self> {
        let file: ConfigFile = serde_yaml::from_str(raw)?;
        Self::resolve(file)
    }

    fn resolve(file: ConfigFile) -> ConfigResult<Self> {
        let node_id = match &file.node.id {
            Some(hex) => parse_node_id(hex)?,
            None => derive_node_id(file.node.id_seed.unwrap_or_default()),
        };
        let cluster = file.cluster.unwrap_or_default();
        let storage = file.storage.unwrap_or_default();

        if let Some(order) = &storage.disk_byte_order {
            if order != "little" {
                return Err(ConfigError::InvalidByteOrder(order.clone()));
            }
        }

        Ok(Self {
            node_id,
            bind: file.node.bind,
            undistributed_clusters: cluster.undistributed_clusters.unwrap_or_default(),
            heartbeat_delay: Duration::from_millis(
                cluster
                    .heartbeat_delay_millis
                    .unwrap_or(DEFAULT_HEARTBEAT_DELAY_MILLIS),
            ),
            initial_directory_size: storage
                .initial_directory_size
                .unwrap_or(DEFAULT_INITIAL_DIRECTORY_SIZE),
        })
    }
}

fn parse_node_id(hex: &str) -> ConfigResult<NodeId> {
    if hex.len() != 40 {
        return Err(ConfigError::InvalidNodeId(hex.to_owned()));
    }
    let mut bytes = [0u8; 20];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let chunk = hex
            .get(i * 2..i * 2 + 2)
            .ok_or_else(|| ConfigError::InvalidNodeId(hex.to_owned()))?;
        *byte = u8::from_str_radix(chunk, 16)
            .map_err(|_| ConfigError::InvalidNodeId(hex.to_owned()))?;
    }
    Ok(NodeId::from_bytes(bytes))
}

/// Deterministically expands a 64-bit seed into a 160-bit node id via a splitmix64
/// stream, so operators can pin a reproducible id across restarts with a single
/// number instead of hand-writing 40 hex characters.
fn derive_node_id(seed: u64) -> NodeId {
    let mut bytes = [0u8; 20];
    let mut state = seed;
    for chunk in bytes.chunks_mut(8) {
        state = state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^= z >> 31;
        let z_bytes = z.to_be_bytes();
        chunk.copy_from_slice(&z_bytes[..chunk.len()]);
    }
    NodeId::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_resolves_to_documented_defaults() {
        let cfg = Config::from_str("node:\n  bind: \"127.0.0.1:9999\"\n  id_seed: 1\n").unwrap();
        assert_eq!(cfg.heartbeat_delay, Duration::from_millis(DEFAULT_HEARTBEAT_DELAY_MILLIS));
        assert_eq!(cfg.initial_directory_size, DEFAULT_INITIAL_DIRECTORY_SIZE);
        assert!(cfg.undistributed_clusters.is_empty());
    }

    #[test]
    fn explicit_hex_node_id_is_used_verbatim() {
        let hex = "11".repeat(20);
        let yaml = format!("node:\n  bind: \"127.0.0.1:9999\"\n  id: \"{hex}\"\n");
        let cfg = Config::from_str(&yaml).unwrap();
        assert_eq!(cfg.node_id.bytes(), [0x11; 20]);
    }

    #[test]
    fn malformed_node_id_is_a_typed_error() {
        let yaml = "node:\n  bind: \"127.0.0.1:9999\"\n  id: \"not-hex\"\n";
        let err = Config::from_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNodeId(_)));
    }

    #[test]
    fn unsupported_byte_order_is_a_typed_error() {
        let yaml = "node:\n  bind: \"127.0.0.1:9999\"\n  id_seed: 1\nstorage:\n  disk_byte_order: \"big\"\n";
        let err = Config::from_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidByteOrder(_)));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error_not_a_panic() {
        let err = Config::from_str("not: valid: yaml: [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        assert_eq!(derive_node_id(42).bytes(), derive_node_id(42).bytes());
        assert_ne!(derive_node_id(42).bytes(), derive_node_id(43).bytes());
    }

    #[test]
    fn undistributed_clusters_and_heartbeat_are_read() {
        let yaml = "node:\n  bind: \"127.0.0.1:9999\"\n  id_seed: 1\ncluster:\n  undistributed_clusters: [\"config\", \"metadata\"]\n  heartbeat_delay_millis: 500\n";
        let cfg = Config::from_str(yaml).unwrap();
        assert_eq!(cfg.undistributed_clusters, vec!["config", "metadata"]);
        assert_eq!(cfg.heartbeat_delay, Duration::from_millis(500));
    }
}
