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

use serde::Deserialize;
use std::net::SocketAddr;

/// Object representation of the YAML configuration file.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// The `node` key: this peer's own identity.
    pub node: ConfigKeyNode,
    /// The `cluster` key: ring/routing tunables. Absent entirely means "no
    /// undistributed clusters, default heartbeat".
    pub cluster: Option<ConfigKeyCluster>,
    /// The `storage` key: bucket-directory and on-disk-format tunables.
    pub storage: Option<ConfigKeyStorage>,
}

/// The `node` section: identity and bind address.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConfigKeyNode {
    /// 40 hex characters (160 bits). If absent, `id_seed` derives one.
    pub id: Option<String>,
    /// A seed used to derive a `NodeId` when `id` isn't given directly.
    pub id_seed: Option<u64>,
    /// Listening/bind identity for peer RPC traffic.
    pub bind: SocketAddr,
}

/// The `cluster` section: routing tunables.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ConfigKeyCluster {
    /// Cluster names always served locally, bypassing the DHT.
    pub undistributed_clusters: Option<Vec<String>>,
    /// Base heartbeat interval; the leader checker applies its own 30% grace.
    pub heartbeat_delay_millis: Option<u64>,
}

/// The `storage` section: bucket-layer tunables.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ConfigKeyStorage {
    /// Initial bucket-directory size for newly created clusters.
    pub initial_directory_size: Option<usize>,
    /// On-disk byte order used when native acceleration doesn't apply. Only
    /// `"little"` is implemented; see `binconv::DISK_ORDER_IS_LE`.
    pub disk_byte_order: Option<String>,
}
