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

use jiff::Zoned;
use jiff::fmt::strtime;

/// Derives the current append target name from the clock and a strftime
/// pattern, and caches readiness so a warm target costs no remote round trip.
///
/// The pattern granularity is the rotation granularity: the default hourly
/// pattern makes every batch within one hour land in the same target. When a
/// target fills up (`PayloadTooLarge`), [`rotate`](ObjectNamer::rotate) bumps
/// an overflow sequence so appends resume under a fresh name immediately
/// instead of stalling until the bucket rolls over. The sequence resets when
/// the bucket changes.
///
/// Owned exclusively by the flush worker; no locking.
#[derive(Debug)]
pub(crate) struct ObjectNamer {
    pattern: String,
    bucket: Option<String>,
    overflow_seq: u32,
    ready: Option<String>,
}

impl ObjectNamer {
    pub(crate) fn new(pattern: impl Into<String>) -> ObjectNamer {
        ObjectNamer {
            pattern: pattern.into(),
            bucket: None,
            overflow_seq: 0,
            ready: None,
        }
    }

    /// Renders the target name for `now`. Pure in the clock and pattern,
    /// apart from the overflow sequence.
    pub(crate) fn current_name(&mut self, now: &Zoned) -> Result<String, jiff::Error> {
        let bucket = strtime::format(&self.pattern, now)?;
        if self.bucket.as_deref() != Some(bucket.as_str()) {
            self.bucket = Some(bucket.clone());
            self.overflow_seq = 0;
        }
        if self.overflow_seq == 0 {
            Ok(bucket)
        } else {
            Ok(format!("{bucket}.{}", self.overflow_seq))
        }
    }

    /// Whether the target still needs a create-if-absent call.
    pub(crate) fn needs_create(&self, name: &str) -> bool {
        self.ready.as_deref() != Some(name)
    }

    pub(crate) fn mark_ready(&mut self, name: String) {
        self.ready = Some(name);
    }

    /// Moves on to the next overflow target within the current bucket.
    pub(crate) fn rotate(&mut self) {
        self.overflow_seq += 1;
        self.ready = None;
    }
}
