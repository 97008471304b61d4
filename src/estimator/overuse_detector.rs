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

use super::BandwidthUsage;

/// Gain applied when the modified offset is above the threshold.
const K_UP: f64 = 0.0087;

/// Gain applied when the modified offset is below the threshold.
const K_DOWN: f64 = 0.039;

/// The detector only flags overuse after the offset has stayed above the
/// threshold for this long.
const OVERUSING_TIME_THRESHOLD_MS: f64 = 10.0;

/// Offsets further above the threshold than this are treated as latency
/// spikes and do not adapt the threshold.
const MAX_ADAPT_OFFSET_MS: f64 = 15.0;

/// Threshold adaptation is skipped when detector calls are further apart
/// than this.
const MAX_TIME_DELTA_MS: i64 = 100;

const MIN_NUM_DELTAS: u32 = 60;

const INITIAL_THRESHOLD: f64 = 12.5;
const MIN_THRESHOLD: f64 = 6.0;
const MAX_THRESHOLD: f64 = 600.0;

/// Hysteretic three-state classifier over the estimated delay gradient.
///
/// The raw offset is scaled by the number of deltas seen so far (capped),
/// compared against an adaptive threshold, and required to stay above it
/// for a minimum time before overuse is signalled.
pub struct OveruseDetector {
    threshold: f64,
    last_update_ms: i64,
    prev_offset: f64,
    time_over_using: f64,
    overuse_counter: u32,
    hypothesis: BandwidthUsage,
}

impl OveruseDetector {
    pub fn new() -> Self {
        Self {
            threshold: INITIAL_THRESHOLD,
            last_update_ms: -1,
            prev_offset: 0.0,
            time_over_using: -1.0,
            overuse_counter: 0,
            hypothesis: BandwidthUsage::Normal,
        }
    }

    /// Current hypothesis.
    pub fn state(&self) -> BandwidthUsage {
        self.hypothesis
    }

    /// Classify the latest offset sample.
    ///
    /// `offset` is the estimator output, `ts_delta_ms` the send time delta
    /// of the group pair it came from, `num_of_deltas` the estimator's
    /// delta counter.
    pub fn detect(
        &mut self,
        offset: f64,
        ts_delta_ms: f64,
        num_of_deltas: u32,
        now_ms: i64,
    ) -> BandwidthUsage {
        if num_of_deltas < 2 {
            return BandwidthUsage::Normal;
        }

        let t = num_of_deltas.min(MIN_NUM_DELTAS) as f64 * offset;
        if t > self.threshold {
            if self.time_over_using == -1.0 {
                // Initialize the timer; assume overuse for half of the
                // time since the previous sample.
                self.time_over_using = ts_delta_ms / 2.0;
            } else {
                self.time_over_using += ts_delta_ms;
            }
            self.overuse_counter += 1;
            if self.time_over_using > OVERUSING_TIME_THRESHOLD_MS
                && self.overuse_counter > 1
                && offset >= self.prev_offset
            {
                self.time_over_using = 0.0;
                self.overuse_counter = 0;
                self.hypothesis = BandwidthUsage::Overusing;
            }
        } else if t < -self.threshold {
            self.time_over_using = -1.0;
            self.overuse_counter = 0;
            self.hypothesis = BandwidthUsage::Underusing;
        } else {
            self.time_over_using = -1.0;
            self.overuse_counter = 0;
            self.hypothesis = BandwidthUsage::Normal;
        }

        self.prev_offset = offset;
        self.update_threshold(t, now_ms);

        self.hypothesis
    }

    fn update_threshold(&mut self, modified_offset: f64, now_ms: i64) {
        if self.last_update_ms == -1 {
            self.last_update_ms = now_ms;
        }

        if modified_offset.abs() > self.threshold + MAX_ADAPT_OFFSET_MS {
            // Do not adapt towards large latency spikes such as a sudden
            // capacity drop.
            self.last_update_ms = now_ms;
            return;
        }

        let time_delta_ms = now_ms - self.last_update_ms;
        if time_delta_ms > MAX_TIME_DELTA_MS {
            // Too long since the last sample for the integration step to
            // be meaningful.
            self.last_update_ms = now_ms;
            return;
        }

        let k = if modified_offset.abs() < self.threshold {
            K_DOWN
        } else {
            K_UP
        };
        self.threshold += k * (modified_offset.abs() - self.threshold) * time_delta_ms as f64;
        self.threshold = self.threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD);
        self.last_update_ms = now_ms;
    }
}
