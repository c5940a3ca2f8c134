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

//! # shardd
//!
//! The autosharded record storage core: a consistent-hashing ring over DHT peers,
//! per-record routing with local short-circuiting, leader heartbeat/failover
//! supervision, and the fixed-layout bucket format used by the local storage behind
//! each shard.

pub mod arbiter;
pub mod autosharded;
pub mod binconv;
pub mod bucket;
pub mod config;
pub mod dht;
pub mod leader;
pub mod localstore;
pub mod registry;
pub mod rid;

/// A generic result alias for top-level plumbing, mirroring the rest of this crate's
/// modules which each define their own narrower `Result` alias around a typed error.
pub type TResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
