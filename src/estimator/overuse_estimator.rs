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

use std::collections::VecDeque;

use super::BandwidthUsage;

/// Cap on the delta counter; keeps the detector's scaling bounded.
const DELTA_COUNTER_MAX: u32 = 1000;

/// History length for the minimum frame period estimate.
const MIN_FRAME_PERIOD_HISTORY_LENGTH: usize = 60;

const INITIAL_SLOPE: f64 = 8.0 / 512.0;
const INITIAL_OFFSET: f64 = 0.0;
const INITIAL_AVG_NOISE: f64 = 0.0;
const INITIAL_VAR_NOISE: f64 = 50.0;

/// Initial state covariance.
const INITIAL_E: [[f64; 2]; 2] = [[100.0, 0.0], [0.0, 1e-1]];

/// Process noise for (slope, offset).
const PROCESS_NOISE: [f64; 2] = [1e-13, 1e-3];

/// Recursive estimator of the one-way-delay gradient.
///
/// A two-state Kalman filter over (slope, offset): `slope` absorbs the
/// size-proportional serialization delay, `offset` tracks how much the
/// inter-arrival time of a group exceeds its inter-departure time. A
/// positive offset means a queue is building at the bottleneck.
pub struct OveruseEstimator {
    num_of_deltas: u32,
    slope: f64,
    offset: f64,
    prev_offset: f64,
    e: [[f64; 2]; 2],
    process_noise: [f64; 2],
    avg_noise: f64,
    var_noise: f64,
    ts_delta_hist: VecDeque<f64>,
}

impl OveruseEstimator {
    pub fn new() -> Self {
        Self {
            num_of_deltas: 0,
            slope: INITIAL_SLOPE,
            offset: INITIAL_OFFSET,
            prev_offset: INITIAL_OFFSET,
            e: INITIAL_E,
            process_noise: PROCESS_NOISE,
            avg_noise: INITIAL_AVG_NOISE,
            var_noise: INITIAL_VAR_NOISE,
            ts_delta_hist: VecDeque::new(),
        }
    }

    /// Update the filter with one group delta triple. `current_hypothesis`
    /// is the detector state from the previous round.
    pub fn update(
        &mut self,
        t_delta_ms: i64,
        ts_delta_ms: f64,
        size_delta: isize,
        current_hypothesis: BandwidthUsage,
    ) {
        let min_frame_period = self.update_min_frame_period(ts_delta_ms);
        let t_ts_delta = t_delta_ms as f64 - ts_delta_ms;
        let fs_delta = size_delta as f64;

        self.num_of_deltas += 1;
        if self.num_of_deltas > DELTA_COUNTER_MAX {
            self.num_of_deltas = DELTA_COUNTER_MAX;
        }

        // Prediction step: add process noise.
        self.e[0][0] += self.process_noise[0];
        self.e[1][1] += self.process_noise[1];
        if (current_hypothesis == BandwidthUsage::Overusing && self.offset < self.prev_offset)
            || (current_hypothesis == BandwidthUsage::Underusing
                && self.offset > self.prev_offset)
        {
            self.e[1][1] += 10.0 * self.process_noise[1];
        }

        let h = [fs_delta, 1.0];
        let eh = [
            self.e[0][0] * h[0] + self.e[0][1] * h[1],
            self.e[1][0] * h[0] + self.e[1][1] * h[1],
        ];

        let residual = t_ts_delta - self.slope * h[0] - self.offset;

        let in_stable_state = current_hypothesis == BandwidthUsage::Normal;
        let max_residual = 3.0 * self.var_noise.sqrt();
        // Clamp the residual fed into the noise estimate to keep periodic
        // key frames and other outliers from poisoning it.
        if residual.abs() < max_residual {
            self.update_noise_estimate(residual, min_frame_period, in_stable_state);
        } else {
            let clamped = if residual < 0.0 {
                -max_residual
            } else {
                max_residual
            };
            self.update_noise_estimate(clamped, min_frame_period, in_stable_state);
        }

        let denom = self.var_noise + h[0] * eh[0] + h[1] * eh[1];
        let k = [eh[0] / denom, eh[1] / denom];

        let ikh = [
            [1.0 - k[0] * h[0], -k[0] * h[1]],
            [-k[1] * h[0], 1.0 - k[1] * h[1]],
        ];
        let e00 = self.e[0][0];
        let e01 = self.e[0][1];

        self.e[0][0] = e00 * ikh[0][0] + self.e[1][0] * ikh[0][1];
        self.e[0][1] = e01 * ikh[0][0] + self.e[1][1] * ikh[0][1];
        self.e[1][0] = e00 * ikh[1][0] + self.e[1][0] * ikh[1][1];
        self.e[1][1] = e01 * ikh[1][0] + self.e[1][1] * ikh[1][1];

        // The covariance matrix must stay positive semi-definite.
        debug_assert!(
            self.e[0][0] + self.e[1][1] >= 0.0
                && self.e[0][0] * self.e[1][1] - self.e[0][1] * self.e[1][0] >= 0.0
                && self.e[0][0] >= 0.0
        );

        self.slope += k[0] * residual;
        self.prev_offset = self.offset;
        self.offset += k[1] * residual;
    }

    /// Current offset estimate, in milliseconds of queue growth per group.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Current noise variance estimate.
    pub fn var_noise(&self) -> f64 {
        self.var_noise
    }

    /// Number of deltas consumed so far, capped at 1000.
    pub fn num_of_deltas(&self) -> u32 {
        self.num_of_deltas
    }

    fn update_min_frame_period(&mut self, ts_delta_ms: f64) -> f64 {
        if self.ts_delta_hist.len() >= MIN_FRAME_PERIOD_HISTORY_LENGTH {
            self.ts_delta_hist.pop_front();
        }
        let mut min_frame_period = ts_delta_ms;
        for old in &self.ts_delta_hist {
            min_frame_period = min_frame_period.min(*old);
        }
        self.ts_delta_hist.push_back(ts_delta_ms);
        min_frame_period
    }

    fn update_noise_estimate(&mut self, residual: f64, ts_delta_ms: f64, stable_state: bool) {
        if !stable_state {
            return;
        }
        // Faster filter during startup to adapt to the jitter level of the
        // path. The filter constant is tuned for 30 frames per second and
        // rescaled by the actual frame period.
        let mut alpha: f64 = 0.01;
        if self.num_of_deltas > 10 * 30 {
            alpha = 0.002;
        }
        let beta = (1.0 - alpha).powf(ts_delta_ms * 30.0 / 1000.0);
        self.avg_noise = beta * self.avg_noise + (1.0 - beta) * residual;
        self.var_noise = beta * self.var_noise
            + (1.0 - beta) * (self.avg_noise - residual) * (self.avg_noise - residual);
        if self.var_noise < 1.0 {
            self.var_noise = 1.0;
        }
    }
}
