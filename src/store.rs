// Copyright 2025 Blobsink Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

/// The default maximum size of one appended block, matching the append-blob
/// block limit of common object stores.
pub const DEFAULT_MAX_BLOCK_BYTES: usize = 4 * 1024 * 1024;

/// The content type set on newly created append targets.
pub(crate) const TARGET_CONTENT_TYPE: &str = "text/plain";

/// An error returned by an [`AppendStore`].
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The target has reached the store's structural limits (maximum block
    /// count or total size), or a single block exceeded the block size limit.
    #[error("append target has reached the store's block or size limit")]
    PayloadTooLarge,
    /// A transient transport, auth, or throttling failure. The flush cycle
    /// ends early and the scheduler retries on the next firing.
    #[error("remote store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

/// The remote append-only object store consumed by the sink.
///
/// All three operations are expected to be idempotent from the caller's point
/// of view: creating a container or target that already exists is a no-op.
/// Only the flush worker thread calls into the store, so implementations need
/// interior mutability but no further synchronization.
pub trait AppendStore: Send + 'static {
    /// Creates the container if it does not exist yet.
    fn create_container_if_absent(&self, container: &str) -> Result<(), SinkError>;

    /// Creates the append target if it does not exist yet.
    fn create_target_if_absent(
        &self,
        container: &str,
        target: &str,
        content_type: &str,
    ) -> Result<(), SinkError>;

    /// Appends one block of bytes to the end of the target.
    fn append_block(&self, container: &str, target: &str, bytes: &[u8]) -> Result<(), SinkError>;

    /// The maximum size of one appended block. Batches never exceed this,
    /// except for a single entry that is itself oversized.
    fn max_block_bytes(&self) -> usize {
        DEFAULT_MAX_BLOCK_BYTES
    }
}

/// A kind of failure a [`MemoryStore`] can be told to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    PayloadTooLarge,
    Unavailable,
}

#[derive(Debug, Default)]
struct MemoryStoreState {
    containers: Vec<String>,
    container_creates: usize,
    targets: HashMap<String, Vec<Vec<u8>>>,
    target_creates: Vec<String>,
    append_failures: VecDeque<InjectedFailure>,
    max_blocks_per_target: Option<usize>,
    max_block_bytes: usize,
}

/// An in-memory [`AppendStore`] that records every call, for use in tests.
///
/// Cloning yields another handle onto the same state, so a test can hand one
/// clone to a sink and inspect the other after flushing. Outputs are
/// suppressed entirely; nothing leaves the process.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryStoreState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            state: Arc::new(Mutex::new(MemoryStoreState {
                max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caps the number of blocks a single target accepts; further appends
    /// fail with [`SinkError::PayloadTooLarge`].
    pub fn set_max_blocks_per_target(&self, max_blocks: usize) {
        self.lock().max_blocks_per_target = Some(max_blocks);
    }

    /// Overrides the block size limit reported to the sink.
    pub fn set_max_block_bytes(&self, max_bytes: usize) {
        self.lock().max_block_bytes = max_bytes;
    }

    /// Queues a failure to be returned by the next `append_block` call.
    /// Multiple queued failures are consumed in order.
    pub fn fail_next_append(&self, failure: InjectedFailure) {
        self.lock().append_failures.push_back(failure);
    }

    /// All appended blocks grouped by target in creation order, as
    /// `(target, bytes)` pairs.
    pub fn appends(&self) -> Vec<(String, Vec<u8>)> {
        let state = self.lock();
        let mut appends = Vec::new();
        let mut seen = Vec::new();
        for target in &state.target_creates {
            if seen.contains(target) {
                continue;
            }
            seen.push(target.clone());
            if let Some(blocks) = state.targets.get(target) {
                for block in blocks {
                    appends.push((target.clone(), block.clone()));
                }
            }
        }
        appends
    }

    /// The concatenated contents of one target.
    pub fn target_contents(&self, target: &str) -> Vec<u8> {
        let state = self.lock();
        state
            .targets
            .get(target)
            .map(|blocks| blocks.concat())
            .unwrap_or_default()
    }

    /// Distinct targets in creation order.
    pub fn created_targets(&self) -> Vec<String> {
        let state = self.lock();
        let mut targets = Vec::new();
        for target in &state.target_creates {
            if !targets.contains(target) {
                targets.push(target.clone());
            }
        }
        targets
    }

    /// How many create-if-absent calls were made for targets, including
    /// redundant ones.
    pub fn target_create_calls(&self) -> usize {
        self.lock().target_creates.len()
    }

    pub fn container_create_calls(&self) -> usize {
        self.lock().container_creates
    }

    pub fn block_count(&self, target: &str) -> usize {
        self.lock().targets.get(target).map_or(0, Vec::len)
    }
}

impl AppendStore for MemoryStore {
    fn create_container_if_absent(&self, container: &str) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.container_creates += 1;
        if !state.containers.iter().any(|c| c == container) {
            state.containers.push(container.to_string());
        }
        Ok(())
    }

    fn create_target_if_absent(
        &self,
        container: &str,
        target: &str,
        _content_type: &str,
    ) -> Result<(), SinkError> {
        let mut state = self.lock();
        if !state.containers.iter().any(|c| c == container) {
            return Err(SinkError::Unavailable(anyhow::anyhow!(
                "container {container} does not exist"
            )));
        }
        state.target_creates.push(target.to_string());
        state.targets.entry(target.to_string()).or_default();
        Ok(())
    }

    fn append_block(&self, container: &str, target: &str, bytes: &[u8]) -> Result<(), SinkError> {
        let mut state = self.lock();
        if let Some(failure) = state.append_failures.pop_front() {
            return match failure {
                InjectedFailure::PayloadTooLarge => Err(SinkError::PayloadTooLarge),
                InjectedFailure::Unavailable => Err(SinkError::Unavailable(anyhow::anyhow!(
                    "injected transport failure"
                ))),
            };
        }
        if !state.containers.iter().any(|c| c == container) {
            return Err(SinkError::Unavailable(anyhow::anyhow!(
                "container {container} does not exist"
            )));
        }
        if bytes.len() > state.max_block_bytes {
            return Err(SinkError::PayloadTooLarge);
        }
        let max_blocks = state.max_blocks_per_target;
        let Some(blocks) = state.targets.get_mut(target) else {
            return Err(SinkError::Unavailable(anyhow::anyhow!(
                "target {target} does not exist"
            )));
        };
        if max_blocks.is_some_and(|max| blocks.len() >= max) {
            return Err(SinkError::PayloadTooLarge);
        }
        blocks.push(bytes.to_vec());
        Ok(())
    }

    fn max_block_bytes(&self) -> usize {
        self.lock().max_block_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_appends_in_order() {
        let store = MemoryStore::new();
        store.create_container_if_absent("logs").unwrap();
        store
            .create_target_if_absent("logs", "a.log", TARGET_CONTENT_TYPE)
            .unwrap();
        store.append_block("logs", "a.log", b"one").unwrap();
        store.append_block("logs", "a.log", b"two").unwrap();

        assert_eq!(store.target_contents("a.log"), b"onetwo");
        assert_eq!(store.block_count("a.log"), 2);
    }

    #[test]
    fn test_memory_store_rejects_unknown_target() {
        let store = MemoryStore::new();
        store.create_container_if_absent("logs").unwrap();
        let err = store.append_block("logs", "missing.log", b"x").unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }

    #[test]
    fn test_memory_store_block_limit_trips_payload_too_large() {
        let store = MemoryStore::new();
        store.set_max_blocks_per_target(1);
        store.create_container_if_absent("logs").unwrap();
        store
            .create_target_if_absent("logs", "a.log", TARGET_CONTENT_TYPE)
            .unwrap();
        store.append_block("logs", "a.log", b"one").unwrap();

        let err = store.append_block("logs", "a.log", b"two").unwrap_err();
        assert!(matches!(err, SinkError::PayloadTooLarge));
    }

    #[test]
    fn test_memory_store_oversized_block_is_rejected() {
        let store = MemoryStore::new();
        store.set_max_block_bytes(4);
        store.create_container_if_absent("logs").unwrap();
        store
            .create_target_if_absent("logs", "a.log", TARGET_CONTENT_TYPE)
            .unwrap();

        let err = store.append_block("logs", "a.log", b"12345").unwrap_err();
        assert!(matches!(err, SinkError::PayloadTooLarge));
    }
}
