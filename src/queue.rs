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

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

/// A FIFO of pending messages shared between producer threads and the flush
/// worker.
///
/// Each entry already carries its line terminator, so the byte size used for
/// batching is stable between the size check and the append. The depth bound
/// is enforced under the queue lock: check and push are one critical section,
/// so the queue never holds more than `max_depth` entries.
#[derive(Debug)]
pub(crate) struct MessageQueue {
    entries: Mutex<VecDeque<String>>,
    max_depth: usize,
}

/// One drained batch, plus how much was left behind.
#[derive(Debug)]
pub(crate) struct Batch {
    pub(crate) bytes: Vec<u8>,
    pub(crate) drained: usize,
    pub(crate) remaining: usize,
}

impl Batch {
    pub(crate) fn is_empty(&self) -> bool {
        self.drained == 0
    }
}

impl MessageQueue {
    pub(crate) fn new(max_depth: usize) -> MessageQueue {
        MessageQueue {
            entries: Mutex::new(VecDeque::new()),
            max_depth,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an entry to the tail. Returns `false` when the queue is at its
    /// depth bound and the entry was dropped instead; no backpressure is
    /// signalled beyond that.
    pub(crate) fn enqueue(&self, entry: String) -> bool {
        let mut entries = self.lock();
        if entries.len() >= self.max_depth {
            return false;
        }
        entries.push_back(entry);
        true
    }

    /// Removes entries from the head, stopping before an entry that would
    /// push the accumulated byte size over `max_bytes` or once `max_count`
    /// entries are taken.
    ///
    /// An entry whose own size exceeds `max_bytes` is still taken when the
    /// batch is empty; otherwise it would block the queue forever. The store
    /// is expected to reject the resulting block as too large.
    pub(crate) fn drain_up_to(&self, max_bytes: usize, max_count: usize) -> Batch {
        let mut entries = self.lock();
        let mut bytes = Vec::new();
        let mut drained = 0;

        while drained < max_count {
            let fits = match entries.front() {
                Some(front) => bytes.is_empty() || bytes.len() + front.len() <= max_bytes,
                None => break,
            };
            if !fits {
                break;
            }
            if let Some(entry) = entries.pop_front() {
                bytes.extend_from_slice(entry.as_bytes());
                drained += 1;
            }
            if bytes.len() >= max_bytes {
                break;
            }
        }

        Batch {
            bytes,
            drained,
            remaining: entries.len(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
