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
use std::sync::Mutex;
use std::sync::PoisonError;

use jiff::Timestamp;
use jiff::Zoned;
use jiff::tz::TimeZone;

/// A source of the current time for object naming.
///
/// Object names are always derived from UTC so that the same wall-clock
/// instant maps to the same target name on every host.
#[derive(Debug, Clone)]
pub enum Clock {
    /// The system clock.
    System,
    /// A clock whose time is set by hand. Intended for tests that need to
    /// roll a time bucket without waiting for it.
    Manual(ManualClock),
}

impl Clock {
    pub fn now(&self) -> Zoned {
        match self {
            Clock::System => Timestamp::now().to_zoned(TimeZone::UTC),
            Clock::Manual(clock) => clock.now(),
        }
    }
}

/// The time can be reset from outside while a sink is running.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Zoned>>,
}

impl ManualClock {
    pub fn new(now: Zoned) -> ManualClock {
        ManualClock {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn now(&self) -> Zoned {
        self.now
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_now(&self, now: Zoned) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }
}
