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

//! Bridge from the `log` crate facade into a [`BlobSink`].

use jiff::Timestamp;

use crate::BlobSink;

/// A [`log::Log`] implementation that forwards records to a [`BlobSink`].
///
/// Records are rendered as `timestamp LEVEL target: message`, one line each.
/// Level filtering is left to `log::set_max_level`; the sink persists
/// whatever reaches it.
#[derive(Debug)]
pub struct BlobLogger {
    sink: BlobSink,
}

impl BlobLogger {
    pub fn new(sink: BlobSink) -> BlobLogger {
        BlobLogger { sink }
    }

    /// The wrapped sink, for health checks.
    pub fn sink(&self) -> &BlobSink {
        &self.sink
    }
}

impl log::Log for BlobLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        self.sink.write_line(&format!(
            "{} {} {}: {}",
            Timestamp::now(),
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {
        self.sink.flush();
    }
}

/// Sets up the log crate global logger to write into the given sink.
///
/// This should be called early in the execution of a Rust program; log events
/// that occur before it are ignored. The global maximum level is set to
/// `Trace`; call [`log::set_max_level`] afterwards to lower it.
///
/// # Errors
///
/// Returns an error if the log crate global logger has already been set.
pub fn try_setup_log_crate(sink: BlobSink) -> Result<(), log::SetLoggerError> {
    let logger = Box::leak(Box::new(BlobLogger::new(sink)));
    log::set_logger(logger)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

/// Sets up the log crate global logger to write into the given sink.
///
/// # Panics
///
/// Panics if the log crate global logger has already been set.
pub fn setup_log_crate(sink: BlobSink) {
    try_setup_log_crate(sink)
        .expect("blobsink::setup_log_crate must be called before the log crate global logger is initialized");
}
