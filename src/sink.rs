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

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::SendTimeoutError;
use crossbeam_channel::Sender;
use crossbeam_channel::bounded;
use crossbeam_channel::unbounded;
use jiff::fmt::strtime;

use crate::clock::Clock;
use crate::error_ring::ErrorRing;
use crate::options::BlobSinkOptions;
use crate::queue::MessageQueue;
use crate::store::AppendStore;
use crate::worker::Command;
use crate::worker::Worker;

/// The terminator appended by [`BlobSink::write_line`] and carried into the
/// persisted payload. Fixed so that every block written to one target uses
/// the same framing.
pub(crate) const LINE_TERMINATOR: &str = "\r\n";

const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(100);

/// A log sink that buffers messages in memory and batch-appends them to a
/// remote append-only object store from a background flush thread.
///
/// Writes never block on I/O and never surface errors to the caller; under
/// sustained overload or a dead backend, messages are dropped by design and
/// the loss is visible through [`error_count`](BlobSink::error_count) and
/// [`errors`](BlobSink::errors). Messages still buffered when the process
/// dies are lost.
///
/// Dropping the sink stops the flush timer, performs one final best-effort
/// flush, and joins the flush thread.
#[derive(Debug)]
pub struct BlobSink {
    queue: Arc<MessageQueue>,
    errors: Arc<ErrorRing>,
    overflowed: AtomicBool,
    sender: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl BlobSink {
    /// Creates a new [`BlobSinkBuilder`] over the given store and container.
    ///
    /// # Examples
    ///
    /// ```
    /// use blobsink::BlobSink;
    /// use blobsink::MemoryStore;
    ///
    /// let store = MemoryStore::new();
    /// let sink = BlobSink::builder(store, "logs").build().unwrap();
    /// sink.write_line("hello");
    /// sink.flush();
    /// ```
    pub fn builder<S: AppendStore>(store: S, container: impl Into<String>) -> BlobSinkBuilder<S> {
        BlobSinkBuilder {
            store,
            container: container.into(),
            options: BlobSinkOptions::default(),
            clock: Clock::System,
        }
    }

    /// Buffers a message as-is.
    pub fn write(&self, message: &str) {
        self.enqueue(message.to_string());
    }

    /// Buffers a message followed by a line terminator.
    pub fn write_line(&self, message: &str) {
        let mut entry = String::with_capacity(message.len() + LINE_TERMINATOR.len());
        entry.push_str(message);
        entry.push_str(LINE_TERMINATOR);
        self.enqueue(entry);
    }

    fn enqueue(&self, entry: String) {
        if self.queue.enqueue(entry) {
            self.overflowed.store(false, Ordering::Relaxed);
        } else if !self.overflowed.swap(true, Ordering::Relaxed) {
            // record once per contiguous run of drops so an overloaded
            // producer cannot flood the ring
            self.errors
                .record("message dropped: queue is full".to_string());
        }
    }

    /// Synchronously appends all buffered messages to the store.
    ///
    /// This blocks until the flush thread has drained the queue or stopped
    /// making progress, and should be used sparingly; buffered messages are
    /// flushed periodically and when the sink is dropped.
    pub fn flush(&self) {
        let (ack, done) = bounded(0);
        if self.sender.send(Command::Flush(ack)).is_ok() {
            let _ = done.recv();
        }
    }

    /// The number of errors the sink has recorded over its lifetime.
    pub fn error_count(&self) -> u64 {
        self.errors.count()
    }

    /// A snapshot of the most recent error messages, oldest first.
    pub fn errors(&self) -> Vec<String> {
        self.errors.snapshot()
    }

    /// The number of messages currently buffered.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for BlobSink {
    fn drop(&mut self) {
        match self.sender.send_timeout(Command::Shutdown, SHUTDOWN_TIMEOUT) {
            Ok(()) | Err(SendTimeoutError::Disconnected(_)) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                eprintln!("blobsink: failed to signal shutdown to the flush thread");
            }
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A builder for configuring a [`BlobSink`].
#[derive(Debug)]
pub struct BlobSinkBuilder<S> {
    store: S,
    container: String,
    options: BlobSinkOptions,
    clock: Clock,
}

impl<S: AppendStore> BlobSinkBuilder<S> {
    /// Sets the number of messages the queue holds before new writes are
    /// dropped.
    #[must_use]
    pub fn max_queue_depth(mut self, depth: usize) -> Self {
        self.options.max_queue_depth = depth;
        self
    }

    /// Sets the cap on the in-memory error ring.
    #[must_use]
    pub fn max_errors_to_keep(mut self, n: usize) -> Self {
        self.options.max_errors_to_keep = n;
        self
    }

    /// Sets the strftime pattern that derives the target name from the
    /// current UTC time. The pattern's granularity is the rotation
    /// granularity.
    #[must_use]
    pub fn filename_format(mut self, pattern: impl Into<String>) -> Self {
        self.options.filename_format = pattern.into();
        self
    }

    /// Sets the delay between flush cycles when the queue was drained.
    #[must_use]
    pub fn steady_interval(mut self, interval: Duration) -> Self {
        self.options.steady_interval = interval;
        self
    }

    /// Sets the delay used while backlog remains after a cycle. Never
    /// lengthens the schedule beyond the steady interval.
    #[must_use]
    pub fn accelerated_interval(mut self, interval: Duration) -> Self {
        self.options.accelerated_interval = interval;
        self
    }

    /// Also persists the error ring to its own target. Failures of that path
    /// go to stderr, never back into the ring.
    #[must_use]
    pub fn append_errors_to_remote(mut self, enabled: bool) -> Self {
        self.options.append_errors_to_remote = enabled;
        self
    }

    /// Sets the strftime pattern for the error target.
    #[must_use]
    pub fn error_filename_format(mut self, pattern: impl Into<String>) -> Self {
        self.options.error_filename_format = pattern.into();
        self
    }

    /// Suppresses timer-driven flushes; only explicit flushes and shutdown
    /// drain the queue. For testing purposes only.
    #[must_use]
    pub fn disable_rescheduling(mut self) -> Self {
        self.options.disable_rescheduling = true;
        self
    }

    /// Replaces the clock that target names are derived from. For testing
    /// purposes only.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the [`BlobSink`] and starts its flush thread.
    pub fn build(self) -> anyhow::Result<BlobSink> {
        let Self {
            store,
            container,
            options,
            clock,
        } = self;

        let now = clock.now();
        strtime::format(&options.filename_format, &now).context("invalid filename format")?;
        strtime::format(&options.error_filename_format, &now)
            .context("invalid error filename format")?;

        let queue = Arc::new(MessageQueue::new(options.max_queue_depth));
        let errors = Arc::new(ErrorRing::new(options.max_errors_to_keep));
        let (sender, receiver) = unbounded();

        let worker = Worker::new(
            store,
            container,
            queue.clone(),
            errors.clone(),
            clock,
            options,
            receiver,
        );
        let handle = std::thread::Builder::new()
            .name("blobsink-flush".to_string())
            .spawn(move || worker.run())
            .context("failed to spawn the blobsink flush thread")?;

        Ok(BlobSink {
            queue,
            errors,
            overflowed: AtomicBool::new(false),
            sender,
            handle: Some(handle),
        })
    }
}
