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
use std::time::Instant;

use blobsink::BlobSink;
use blobsink::MemoryStore;

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn timer_flushes_without_an_explicit_flush() {
    let store = MemoryStore::new();
    let sink = BlobSink::builder(store.clone(), "logs")
        .steady_interval(Duration::from_millis(50))
        .build()
        .unwrap();

    sink.write_line("scheduled");

    assert!(wait_until(Duration::from_secs(5), || {
        !store.appends().is_empty()
    }));
    assert_eq!(sink.error_count(), 0);
}

#[test]
fn backlog_is_drained_at_the_accelerated_interval() {
    let store = MemoryStore::new();
    // each batch holds only a few entries, so clearing the queue takes many
    // cycles; at the steady interval alone this would exceed the deadline
    store.set_max_block_bytes(32);
    let sink = BlobSink::builder(store.clone(), "logs")
        .steady_interval(Duration::from_secs(2))
        .accelerated_interval(Duration::from_millis(20))
        .build()
        .unwrap();

    for i in 0..40 {
        sink.write_line(&format!("message {i:02}"));
    }

    let expected = 40 * "message 00\r\n".len();
    assert!(wait_until(Duration::from_secs(6), || {
        let total: usize = store.appends().iter().map(|(_, bytes)| bytes.len()).sum();
        total == expected
    }));
    assert_eq!(sink.queue_depth(), 0);
}

#[test]
fn disabled_rescheduling_never_fires_the_timer() {
    let store = MemoryStore::new();
    let sink = BlobSink::builder(store.clone(), "logs")
        .steady_interval(Duration::from_millis(10))
        .disable_rescheduling()
        .build()
        .unwrap();

    sink.write_line("waiting");
    std::thread::sleep(Duration::from_millis(200));
    assert!(store.appends().is_empty());
    assert_eq!(sink.queue_depth(), 1);

    sink.flush();
    assert!(!store.appends().is_empty());
}
