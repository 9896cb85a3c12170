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

//! Blobsink is a buffering log sink that batch-appends log messages to a
//! remote append-only object store.
//!
//! # Overview
//!
//! Application threads hand messages to a [`BlobSink`] and return
//! immediately; a background flush thread periodically drains the buffer into
//! size-bounded batches and appends them to a time-bucketed target in the
//! store. The write path never blocks on I/O and never raises: under
//! sustained overload or backend failure, messages are dropped and the loss
//! is surfaced through an error counter and a capped ring of recent
//! diagnostics.
//!
//! The store itself is a capability, abstracted by [`AppendStore`]; an
//! in-memory [`MemoryStore`] ships for tests.
//!
//! # Examples
//!
//! ```
//! use blobsink::BlobSink;
//! use blobsink::MemoryStore;
//!
//! let store = MemoryStore::new();
//! let sink = BlobSink::builder(store.clone(), "logs").build().unwrap();
//!
//! sink.write_line("application started");
//! sink.flush();
//!
//! assert!(!store.appends().is_empty());
//! ```
//!
//! To route the `log` crate facade into a sink:
//!
//! ```
//! use blobsink::BlobSink;
//! use blobsink::MemoryStore;
//!
//! let sink = BlobSink::builder(MemoryStore::new(), "logs").build().unwrap();
//! blobsink::bridge::setup_log_crate(sink);
//!
//! log::info!("this message is buffered for the next flush");
//! ```

pub mod bridge;
mod clock;
mod error_ring;
mod namer;
mod options;
mod queue;
mod sink;
mod store;
mod worker;

pub use clock::Clock;
pub use clock::ManualClock;
pub use sink::BlobSink;
pub use sink::BlobSinkBuilder;
pub use store::AppendStore;
pub use store::DEFAULT_MAX_BLOCK_BYTES;
pub use store::InjectedFailure;
pub use store::MemoryStore;
pub use store::SinkError;
