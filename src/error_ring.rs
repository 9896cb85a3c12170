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
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// A capped FIFO of diagnostics produced by the sink itself.
///
/// Failures inside the flush path cannot be logged through the normal path,
/// so they land here instead. Recording never fails and performs no I/O.
/// Once the cap is reached the oldest entries are evicted first.
#[derive(Debug)]
pub(crate) struct ErrorRing {
    messages: Mutex<VecDeque<String>>,
    max_to_keep: usize,
    count: AtomicU64,
}

impl ErrorRing {
    pub(crate) fn new(max_to_keep: usize) -> ErrorRing {
        ErrorRing {
            messages: Mutex::new(VecDeque::new()),
            max_to_keep,
            count: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record(&self, message: String) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let mut messages = self.lock();
        messages.push_back(message);
        while messages.len() > self.max_to_keep {
            messages.pop_front();
        }
    }

    /// The number of errors recorded over the sink's lifetime, including
    /// evicted ones.
    pub(crate) fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    /// Removes and returns the buffered messages, oldest first. Used by the
    /// error persistence cycle.
    pub(crate) fn take_all(&self) -> Vec<String> {
        self.lock().drain(..).collect()
    }
}
