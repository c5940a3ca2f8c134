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

//! # System-wide registry
//!
//! Process-global, lock-free counters and flags that are cheap to read on every
//! request and don't warrant a full lock.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const ORD_ACQ: Ordering = Ordering::Acquire;
const ORD_REL: Ordering = Ordering::Release;

static GLOBAL_STATE: AtomicBool = AtomicBool::new(true);
static CREATE_RETRIES: AtomicU64 = AtomicU64::new(0);
static REMOTE_DISPATCHES: AtomicU64 = AtomicU64::new(0);

/// Whether the process considers itself healthy enough to keep serving.
pub fn state_okay() -> bool {
    GLOBAL_STATE.load(ORD_ACQ)
}

pub fn poison() {
    GLOBAL_STATE.store(false, ORD_REL)
}

pub fn unpoison() {
    GLOBAL_STATE.store(true, ORD_REL)
}

/// Record one more create-path retry (a redraw after a duplicate-key rejection).
pub fn note_create_retry() {
    CREATE_RETRIES.fetch_add(1, Ordering::Relaxed);
}

pub fn create_retry_count() -> u64 {
    CREATE_RETRIES.load(Ordering::Relaxed)
}

/// Record one RPC dispatched to a remote peer.
pub fn note_remote_dispatch() {
    REMOTE_DISPATCHES.fetch_add(1, Ordering::Relaxed);
}

pub fn remote_dispatch_count() -> u64 {
    REMOTE_DISPATCHES.load(Ordering::Relaxed)
}
