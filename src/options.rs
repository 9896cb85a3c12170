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

use std::time::Duration;

pub(crate) const DEFAULT_MAX_QUEUE_DEPTH: usize = 10_000;
pub(crate) const DEFAULT_MAX_ERRORS_TO_KEEP: usize = 20;
pub(crate) const DEFAULT_FILENAME_FORMAT: &str = "%Y/%m/%d/%H.log";
pub(crate) const DEFAULT_ERROR_FILENAME_FORMAT: &str = "%Y/%m/%d/%H.errors.log";
pub(crate) const DEFAULT_STEADY_INTERVAL: Duration = Duration::from_millis(4000);
pub(crate) const DEFAULT_ACCELERATED_INTERVAL: Duration = Duration::from_millis(200);

/// Configuration for a sink, immutable once the sink is built.
#[derive(Debug, Clone)]
pub(crate) struct BlobSinkOptions {
    /// Entries written while the queue holds this many are dropped.
    pub(crate) max_queue_depth: usize,
    /// Cap on the in-memory error ring.
    pub(crate) max_errors_to_keep: usize,
    /// strftime pattern deriving the target name; its granularity is the
    /// rotation granularity.
    pub(crate) filename_format: String,
    /// Delay between flush cycles when the previous cycle drained the queue.
    pub(crate) steady_interval: Duration,
    /// Delay used while backlog remains after a cycle. Clamped to the steady
    /// interval at schedule time.
    pub(crate) accelerated_interval: Duration,
    /// Periodically persist the error ring to its own target.
    pub(crate) append_errors_to_remote: bool,
    /// strftime pattern for the error target.
    pub(crate) error_filename_format: String,
    /// Suppresses timer-driven cycles; the worker then only reacts to
    /// explicit flushes. For testing purposes only.
    pub(crate) disable_rescheduling: bool,
}

impl Default for BlobSinkOptions {
    fn default() -> Self {
        BlobSinkOptions {
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            max_errors_to_keep: DEFAULT_MAX_ERRORS_TO_KEEP,
            filename_format: DEFAULT_FILENAME_FORMAT.to_string(),
            steady_interval: DEFAULT_STEADY_INTERVAL,
            accelerated_interval: DEFAULT_ACCELERATED_INTERVAL,
            append_errors_to_remote: false,
            error_filename_format: DEFAULT_ERROR_FILENAME_FORMAT.to_string(),
            disable_rescheduling: false,
        }
    }
}
