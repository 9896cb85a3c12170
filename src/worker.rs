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

use std::cmp::min;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::Sender;
use jiff::Zoned;

use crate::clock::Clock;
use crate::error_ring::ErrorRing;
use crate::namer::ObjectNamer;
use crate::options::BlobSinkOptions;
use crate::queue::MessageQueue;
use crate::sink::LINE_TERMINATOR;
use crate::store::AppendStore;
use crate::store::SinkError;
use crate::store::TARGET_CONTENT_TYPE;

/// Bounds how long the queue lock is held by a single drain.
const MAX_ENTRIES_PER_APPEND: usize = 10_000;

#[derive(Debug)]
pub(crate) enum Command {
    /// Drain the queue synchronously, then ack.
    Flush(Sender<()>),
    Shutdown,
}

/// The flush worker: a dedicated thread that owns the store handle and all
/// naming/readiness state, and is the only code that performs remote I/O.
///
/// Running every cycle on one thread is what serializes them; a timer firing
/// cannot overlap an explicit flush, so the destructive drain never races.
/// No error may escape [`run`](Worker::run) - an escaping fault would kill
/// all future scheduled flushes.
pub(crate) struct Worker<S> {
    store: S,
    container: String,
    container_ready: bool,
    namer: ObjectNamer,
    errors_namer: ObjectNamer,
    queue: Arc<MessageQueue>,
    errors: Arc<ErrorRing>,
    clock: Clock,
    options: BlobSinkOptions,
    receiver: Receiver<Command>,
}

impl<S: AppendStore> Worker<S> {
    pub(crate) fn new(
        store: S,
        container: String,
        queue: Arc<MessageQueue>,
        errors: Arc<ErrorRing>,
        clock: Clock,
        options: BlobSinkOptions,
        receiver: Receiver<Command>,
    ) -> Worker<S> {
        let namer = ObjectNamer::new(options.filename_format.clone());
        let errors_namer = ObjectNamer::new(options.error_filename_format.clone());
        Worker {
            store,
            container,
            container_ready: false,
            namer,
            errors_namer,
            queue,
            errors,
            clock,
            options,
            receiver,
        }
    }

    pub(crate) fn run(mut self) {
        let mut delay = self.options.steady_interval;
        loop {
            let command = if self.options.disable_rescheduling {
                self.receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected)
            } else {
                self.receiver.recv_timeout(delay)
            };
            match command {
                Ok(Command::Flush(ack)) => {
                    self.drain_fully();
                    let _ = ack.send(());
                    delay = self.options.steady_interval;
                }
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    // best-effort final drain
                    self.drain_fully();
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    let items_remain = self.run_cycle();
                    delay = self.next_delay(items_remain);
                }
            }
        }
    }

    fn next_delay(&self, items_remain: bool) -> Duration {
        if items_remain {
            min(
                self.options.accelerated_interval,
                self.options.steady_interval,
            )
        } else {
            self.options.steady_interval
        }
    }

    /// One flush cycle. Returns whether entries remain in the queue.
    fn run_cycle(&mut self) -> bool {
        let items_remain = match self.flush_once() {
            Ok(items_remain) => items_remain,
            Err(err) => {
                self.errors.record(format!("flush cycle failed: {err}"));
                !self.queue.is_empty()
            }
        };
        if self.options.append_errors_to_remote {
            self.persist_errors();
        }
        items_remain
    }

    /// Repeats flush cycles until the queue is empty or a cycle stops making
    /// progress. Serves both the blocking `flush()` and shutdown.
    fn drain_fully(&mut self) {
        loop {
            let depth_before = self.queue.len();
            let items_remain = self.run_cycle();
            if !items_remain {
                return;
            }
            if self.queue.len() >= depth_before {
                // the store is refusing work; give up rather than spin
                return;
            }
        }
    }

    fn flush_once(&mut self) -> Result<bool, SinkError> {
        if self.queue.is_empty() {
            return Ok(false);
        }

        self.ensure_container()?;
        let now = self.clock.now();
        let name = ensure_target(&self.store, &self.container, &mut self.namer, &now)?;

        let batch = self
            .queue
            .drain_up_to(self.store.max_block_bytes(), MAX_ENTRIES_PER_APPEND);
        if batch.is_empty() {
            return Ok(false);
        }

        match self.store.append_block(&self.container, &name, &batch.bytes) {
            Ok(()) => {}
            Err(SinkError::PayloadTooLarge) => {
                // The drained entries are lost; re-queuing would reorder and
                // duplicate. Rotate so the next batch lands on a fresh target
                // instead of failing until the bucket rolls over.
                self.errors.record(format!(
                    "append to {name} rejected as too large, {} entries lost, rotating",
                    batch.drained
                ));
                self.namer.rotate();
            }
            Err(SinkError::Unavailable(err)) => {
                self.errors.record(format!(
                    "append to {name} failed, {} entries lost: {err}",
                    batch.drained
                ));
            }
        }

        Ok(batch.remaining > 0)
    }

    fn ensure_container(&mut self) -> Result<(), SinkError> {
        if !self.container_ready {
            self.store.create_container_if_absent(&self.container)?;
            self.container_ready = true;
        }
        Ok(())
    }

    /// Persists the error ring to its own target, structurally the same cycle
    /// as the message path but with an independent namer.
    fn persist_errors(&mut self) {
        let messages = self.errors.take_all();
        if messages.is_empty() {
            return;
        }
        if let Err(err) = self.append_error_messages(&messages) {
            // Reporting this into the ring would feed the very cycle that
            // just failed. Process diagnostic output is the only safe sink.
            eprintln!(
                "blobsink: failed to persist {} sink errors: {err}",
                messages.len()
            );
        }
    }

    fn append_error_messages(&mut self, messages: &[String]) -> Result<(), SinkError> {
        self.ensure_container()?;
        let now = self.clock.now();
        let name = ensure_target(&self.store, &self.container, &mut self.errors_namer, &now)?;

        let mut bytes = Vec::new();
        for message in messages {
            bytes.extend_from_slice(message.as_bytes());
            bytes.extend_from_slice(LINE_TERMINATOR.as_bytes());
        }
        self.store.append_block(&self.container, &name, &bytes)
    }
}

/// Renders the target name for `now` and performs the create-if-absent call
/// unless the namer already confirmed readiness for that name.
fn ensure_target<S: AppendStore>(
    store: &S,
    container: &str,
    namer: &mut ObjectNamer,
    now: &Zoned,
) -> Result<String, SinkError> {
    let name = namer
        .current_name(now)
        .map_err(|err| SinkError::Unavailable(err.into()))?;
    if namer.needs_create(&name) {
        store.create_target_if_absent(container, &name, TARGET_CONTENT_TYPE)?;
        namer.mark_ready(name.clone());
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crossbeam_channel::unbounded;

    use super::*;
    use crate::clock::ManualClock;
    use crate::store::InjectedFailure;
    use crate::store::MemoryStore;

    fn test_worker(store: MemoryStore, options: BlobSinkOptions) -> (Worker<MemoryStore>, Clock) {
        let clock = ManualClock::new(Zoned::from_str("2024-08-10T17:00:00[UTC]").unwrap());
        let clock = Clock::Manual(clock);
        let queue = Arc::new(MessageQueue::new(options.max_queue_depth));
        let errors = Arc::new(ErrorRing::new(options.max_errors_to_keep));
        let (_sender, receiver) = unbounded();
        let worker = Worker::new(
            store,
            "logs".to_string(),
            queue,
            errors,
            clock.clone(),
            options,
            receiver,
        );
        (worker, clock)
    }

    #[test]
    fn test_backlog_accelerates_reschedule() {
        let (worker, _clock) = test_worker(MemoryStore::new(), BlobSinkOptions::default());
        assert_eq!(worker.next_delay(false), worker.options.steady_interval);
        assert_eq!(worker.next_delay(true), worker.options.accelerated_interval);
    }

    #[test]
    fn test_accelerated_delay_never_exceeds_steady() {
        let options = BlobSinkOptions {
            steady_interval: Duration::from_millis(100),
            accelerated_interval: Duration::from_millis(200),
            ..Default::default()
        };
        let (worker, _clock) = test_worker(MemoryStore::new(), options);
        assert_eq!(worker.next_delay(true), Duration::from_millis(100));
    }

    #[test]
    fn test_cycle_appends_one_batch_and_reuses_target() {
        let store = MemoryStore::new();
        let (mut worker, _clock) = test_worker(store.clone(), BlobSinkOptions::default());
        worker.queue.enqueue("a\r\n".to_string());
        worker.queue.enqueue("b\r\n".to_string());

        assert!(!worker.run_cycle());
        worker.queue.enqueue("c\r\n".to_string());
        assert!(!worker.run_cycle());

        assert_eq!(store.container_create_calls(), 1);
        assert_eq!(store.target_create_calls(), 1);
        assert_eq!(store.target_contents("2024/08/10/17.log"), b"a\r\nb\r\nc\r\n");
    }

    #[test]
    fn test_cycle_reports_backlog_when_batch_is_size_limited() {
        let store = MemoryStore::new();
        store.set_max_block_bytes(8);
        let (mut worker, _clock) = test_worker(store.clone(), BlobSinkOptions::default());
        worker.queue.enqueue("aaaa".to_string());
        worker.queue.enqueue("bbbb".to_string());
        worker.queue.enqueue("cccc".to_string());

        assert!(worker.run_cycle());
        assert!(!worker.run_cycle());
        assert_eq!(store.target_contents("2024/08/10/17.log"), b"aaaabbbbcccc");
        assert_eq!(store.block_count("2024/08/10/17.log"), 2);
    }

    #[test]
    fn test_payload_too_large_rotates_without_requeueing() {
        let store = MemoryStore::new();
        store.set_max_blocks_per_target(1);
        let (mut worker, _clock) = test_worker(store.clone(), BlobSinkOptions::default());

        worker.queue.enqueue("first\r\n".to_string());
        assert!(!worker.run_cycle());

        worker.queue.enqueue("lost\r\n".to_string());
        assert!(!worker.run_cycle());
        assert_eq!(worker.errors.count(), 1);
        let errors = worker.errors.snapshot();
        assert!(errors[0].contains("too large"));

        // the lost batch is not retried; the next batch lands on the rotated
        // target
        worker.queue.enqueue("next\r\n".to_string());
        assert!(!worker.run_cycle());
        assert_eq!(store.target_contents("2024/08/10/17.log"), b"first\r\n");
        assert_eq!(store.target_contents("2024/08/10/17.log.1"), b"next\r\n");
    }

    #[test]
    fn test_unavailable_store_records_error_and_cycle_continues() {
        let store = MemoryStore::new();
        store.fail_next_append(InjectedFailure::Unavailable);
        let (mut worker, _clock) = test_worker(store.clone(), BlobSinkOptions::default());

        worker.queue.enqueue("gone\r\n".to_string());
        assert!(!worker.run_cycle());
        assert_eq!(worker.errors.count(), 1);

        worker.queue.enqueue("kept\r\n".to_string());
        assert!(!worker.run_cycle());
        assert_eq!(store.target_contents("2024/08/10/17.log"), b"kept\r\n");
    }

    #[test]
    fn test_bucket_rollover_creates_new_target() {
        let store = MemoryStore::new();
        let (mut worker, clock) = test_worker(store.clone(), BlobSinkOptions::default());

        worker.queue.enqueue("early\r\n".to_string());
        assert!(!worker.run_cycle());

        if let Clock::Manual(manual) = &clock {
            manual.set_now(Zoned::from_str("2024-08-10T18:00:01[UTC]").unwrap());
        }
        worker.queue.enqueue("late\r\n".to_string());
        assert!(!worker.run_cycle());

        assert_eq!(store.target_contents("2024/08/10/17.log"), b"early\r\n");
        assert_eq!(store.target_contents("2024/08/10/18.log"), b"late\r\n");
    }

    #[test]
    fn test_error_ring_is_persisted_to_its_own_target() {
        let store = MemoryStore::new();
        store.fail_next_append(InjectedFailure::Unavailable);
        let options = BlobSinkOptions {
            append_errors_to_remote: true,
            ..Default::default()
        };
        let (mut worker, _clock) = test_worker(store.clone(), options);

        worker.queue.enqueue("doomed\r\n".to_string());
        assert!(!worker.run_cycle());

        let errors = store.target_contents("2024/08/10/17.errors.log");
        assert!(!errors.is_empty());
        assert!(String::from_utf8(errors).unwrap().contains("entries lost"));
        // the ring was drained into the store
        assert!(worker.errors.snapshot().is_empty());
    }

    #[test]
    fn test_error_persistence_failure_does_not_feed_the_ring() {
        let store = MemoryStore::new();
        // first failure eats the message append, second eats the error append
        store.fail_next_append(InjectedFailure::Unavailable);
        store.fail_next_append(InjectedFailure::Unavailable);
        let options = BlobSinkOptions {
            append_errors_to_remote: true,
            ..Default::default()
        };
        let (mut worker, _clock) = test_worker(store.clone(), options);

        worker.queue.enqueue("doomed\r\n".to_string());
        assert!(!worker.run_cycle());

        // one error was recorded for the lost batch, none for the failed
        // persistence attempt
        assert_eq!(worker.errors.count(), 1);
        assert!(worker.errors.snapshot().is_empty());
    }
}
