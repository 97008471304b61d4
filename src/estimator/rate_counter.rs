// Copyright (c) 2025 The RTC-BWE Authors.
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

/// The meter reports no rate until its samples span at least this much
/// wall-clock time.
const MIN_WINDOW_SPAN_MS: i64 = 500;

/// Minimum number of occupied slots before a rate is reported.
const MIN_OCCUPIED_SLOTS: usize = 2;

/// Sliding-window throughput meter.
///
/// Bytes are accumulated into millisecond slots; the rate is the window
/// total scaled to bits per second. Slots older than the window are
/// evicted lazily on access.
pub struct RateCounter {
    window_size_ms: i64,
    buckets: Vec<usize>,
    accumulated_bytes: usize,
    occupied_slots: usize,
    oldest_time_ms: i64,
    oldest_index: usize,
    initialized: bool,
}

impl RateCounter {
    pub fn new(window_size_ms: i64) -> Self {
        Self {
            window_size_ms,
            buckets: vec![0; window_size_ms as usize],
            accumulated_bytes: 0,
            occupied_slots: 0,
            oldest_time_ms: 0,
            oldest_index: 0,
            initialized: false,
        }
    }

    /// Account `size_bytes` at `now_ms`.
    pub fn update(&mut self, size_bytes: usize, now_ms: i64) {
        if !self.initialized {
            self.oldest_time_ms = now_ms;
            self.initialized = true;
        }
        self.erase_old(now_ms);

        // Arrivals behind the retained window are folded into its oldest
        // slot rather than dropped.
        let now_ms = now_ms.max(self.oldest_time_ms);
        let offset = (now_ms - self.oldest_time_ms) as usize;
        let index = (self.oldest_index + offset) % self.buckets.len();
        if self.buckets[index] == 0 {
            self.occupied_slots += 1;
        }
        self.buckets[index] += size_bytes;
        self.accumulated_bytes += size_bytes;
    }

    /// Throughput over the active window in bits per second, once enough
    /// of the window has been observed.
    pub fn rate(&mut self, now_ms: i64) -> Option<u32> {
        if !self.initialized {
            return None;
        }
        self.erase_old(now_ms);

        let active_window_ms = now_ms - self.oldest_time_ms + 1;
        if self.occupied_slots < MIN_OCCUPIED_SLOTS || active_window_ms < MIN_WINDOW_SPAN_MS {
            return None;
        }
        Some((self.accumulated_bytes as f64 * 8000.0 / active_window_ms as f64 + 0.5) as u32)
    }

    fn erase_old(&mut self, now_ms: i64) {
        let new_oldest_time_ms = now_ms - self.window_size_ms + 1;
        if new_oldest_time_ms <= self.oldest_time_ms {
            return;
        }
        if new_oldest_time_ms - self.oldest_time_ms >= self.window_size_ms
            || self.accumulated_bytes == 0
        {
            // The whole retained window is stale.
            self.buckets.iter_mut().for_each(|b| *b = 0);
            self.accumulated_bytes = 0;
            self.occupied_slots = 0;
            self.oldest_index = 0;
            self.oldest_time_ms = new_oldest_time_ms;
            return;
        }
        while self.oldest_time_ms < new_oldest_time_ms {
            let bucket = &mut self.buckets[self.oldest_index];
            if *bucket > 0 {
                self.accumulated_bytes -= *bucket;
                self.occupied_slots -= 1;
                *bucket = 0;
            }
            self.oldest_index = (self.oldest_index + 1) % self.buckets.len();
            self.oldest_time_ms += 1;
        }
    }
}
