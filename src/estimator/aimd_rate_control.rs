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

use log::*;

use super::BandwidthUsage;
use super::RateControlInput;

/// Backoff factor applied to the measured throughput on overuse.
const BETA: f64 = 0.85;

const DEFAULT_RTT_MS: i64 = 200;

/// Ceiling on any estimate the controller produces.
const MAX_CONFIGURED_BITRATE_BPS: u32 = 30_000_000;

/// Without probes the controller adopts the measured incoming rate once
/// throughput estimates have been available this long.
const INITIALIZATION_TIME_MS: i64 = 5000;

/// Headroom allowed above the measured incoming rate while increasing.
const INCREASE_HEADROOM_BPS: u32 = 10_000;

const MIN_FEEDBACK_INTERVAL_MS: i64 = 200;
const MAX_FEEDBACK_INTERVAL_MS: i64 = 1000;

/// EMA constant for the max-bitrate statistics.
const MAX_BITRATE_SMOOTHING_ALPHA: f64 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RateControlState {
    Hold,
    Increase,
    Decrease,
}

/// Where the current bitrate sits relative to the largest throughput the
/// path has delivered. Near the known maximum the controller probes
/// carefully with additive increase; with the maximum unknown it ramps up
/// multiplicatively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RateControlRegion {
    NearMax,
    AboveMax,
    MaxUnknown,
}

/// Multiplicative-increase / additive-decrease rate controller.
///
/// Consumes the detector hypothesis and the measured incoming rate and
/// produces the target bitrate. Overuse always drops the target to a
/// fraction of the measured throughput; normal operation grows it either
/// multiplicatively (capacity unknown) or additively (close to a
/// previously observed maximum).
pub struct AimdRateControl {
    min_configured_bitrate_bps: u32,
    max_configured_bitrate_bps: u32,
    current_bitrate_bps: u32,
    /// Average of the incoming rate at decrease time, in kbps; negative
    /// when invalid.
    avg_max_bitrate_kbps: f64,
    /// Variance of the max bitrate, normalized by the average.
    var_max_bitrate_kbps: f64,
    rate_control_state: RateControlState,
    rate_control_region: RateControlRegion,
    time_last_bitrate_change_ms: i64,
    time_last_decrease_ms: i64,
    time_first_incoming_estimate_ms: i64,
    bitrate_is_initialized: bool,
    beta: f64,
    rtt_ms: i64,
}

impl AimdRateControl {
    pub fn new(min_bitrate_bps: u32) -> Self {
        Self {
            min_configured_bitrate_bps: min_bitrate_bps,
            max_configured_bitrate_bps: MAX_CONFIGURED_BITRATE_BPS,
            current_bitrate_bps: MAX_CONFIGURED_BITRATE_BPS,
            avg_max_bitrate_kbps: -1.0,
            var_max_bitrate_kbps: 0.4,
            rate_control_state: RateControlState::Hold,
            rate_control_region: RateControlRegion::MaxUnknown,
            time_last_bitrate_change_ms: -1,
            time_last_decrease_ms: -1,
            time_first_incoming_estimate_ms: -1,
            bitrate_is_initialized: false,
            beta: BETA,
            rtt_ms: DEFAULT_RTT_MS,
        }
    }

    /// True once the controller has produced a meaningful estimate.
    pub fn valid_estimate(&self) -> bool {
        self.bitrate_is_initialized
    }

    pub fn latest_estimate(&self) -> u32 {
        self.current_bitrate_bps
    }

    pub fn set_rtt(&mut self, rtt_ms: i64) {
        self.rtt_ms = rtt_ms;
    }

    pub fn set_min_bitrate(&mut self, min_bitrate_bps: u32) {
        self.min_configured_bitrate_bps = min_bitrate_bps;
        self.current_bitrate_bps = self.current_bitrate_bps.max(min_bitrate_bps);
    }

    /// Force the estimate, e.g. from a validated probe cluster.
    pub fn set_estimate(&mut self, bitrate_bps: u32, now_ms: i64) {
        self.bitrate_is_initialized = true;
        self.current_bitrate_bps = self.clamp_bitrate(bitrate_bps);
        self.time_last_bitrate_change_ms = now_ms;
    }

    /// Minimum spacing between controller updates. Shrinks as the bitrate
    /// grows so high-rate flows are steered with fresher feedback.
    pub fn feedback_interval_ms(&self) -> i64 {
        let interval =
            (500.0 * (400_000.0 / self.current_bitrate_bps as f64).ln() + 500.0) as i64;
        interval.clamp(MIN_FEEDBACK_INTERVAL_MS, MAX_FEEDBACK_INTERVAL_MS)
    }

    /// Whether a further decrease is warranted while overuse persists.
    pub fn time_to_reduce_further(&self, now_ms: i64, incoming_bitrate_bps: u32) -> bool {
        now_ms - self.time_last_decrease_ms >= self.feedback_interval_ms() / 2
            && self.current_bitrate_bps as f64
                > 1.5 * incoming_bitrate_bps as f64 + INCREASE_HEADROOM_BPS as f64
    }

    /// Run one controller tick and return the (possibly unchanged) target.
    pub fn update(&mut self, input: &RateControlInput, now_ms: i64) -> u32 {
        if !self.bitrate_is_initialized {
            // Adopt the incoming rate as the starting point once
            // throughput has been measurable for a while.
            if self.time_first_incoming_estimate_ms < 0 {
                if input.incoming_bitrate_bps.is_some() {
                    self.time_first_incoming_estimate_ms = now_ms;
                }
            } else if now_ms - self.time_first_incoming_estimate_ms > INITIALIZATION_TIME_MS {
                if let Some(incoming_bitrate_bps) = input.incoming_bitrate_bps {
                    self.current_bitrate_bps = incoming_bitrate_bps;
                    self.bitrate_is_initialized = true;
                }
            }
        }

        self.change_bitrate(input, now_ms);
        self.current_bitrate_bps
    }

    fn change_bitrate(&mut self, input: &RateControlInput, now_ms: i64) {
        // An overuse always acts, even before the first estimate exists;
        // acting on it is what produces a valid estimate.
        if !self.bitrate_is_initialized && input.bw_state != BandwidthUsage::Overusing {
            return;
        }

        self.change_state(input.bw_state, now_ms);

        let incoming_bitrate_bps = input
            .incoming_bitrate_bps
            .unwrap_or(self.current_bitrate_bps);
        let incoming_bitrate_kbps = incoming_bitrate_bps as f64 / 1000.0;
        let std_max_bitrate_kbps =
            (self.var_max_bitrate_kbps * self.avg_max_bitrate_kbps).sqrt();

        match self.rate_control_state {
            RateControlState::Hold => {}
            RateControlState::Increase => {
                if self.avg_max_bitrate_kbps >= 0.0
                    && incoming_bitrate_kbps
                        > self.avg_max_bitrate_kbps + 3.0 * std_max_bitrate_kbps
                {
                    // Throughput has outgrown the previously observed
                    // maximum; it no longer tells us anything.
                    self.rate_control_region = RateControlRegion::MaxUnknown;
                    self.avg_max_bitrate_kbps = -1.0;
                }

                let mut new_bitrate_bps = match self.rate_control_region {
                    RateControlRegion::NearMax => self.current_bitrate_bps.saturating_add(
                        self.additive_rate_increase(now_ms, self.time_last_bitrate_change_ms),
                    ),
                    _ => self.current_bitrate_bps.saturating_add(
                        self.multiplicative_rate_increase(
                            now_ms,
                            self.time_last_bitrate_change_ms,
                        ),
                    ),
                };
                if let Some(incoming) = input.incoming_bitrate_bps {
                    // Never run far ahead of what is actually arriving.
                    let increase_limit =
                        (1.5 * incoming as f64) as u32 + INCREASE_HEADROOM_BPS;
                    new_bitrate_bps = new_bitrate_bps.min(increase_limit);
                }
                self.current_bitrate_bps = self.clamp_bitrate(new_bitrate_bps);
                self.time_last_bitrate_change_ms = now_ms;
            }
            RateControlState::Decrease => {
                self.bitrate_is_initialized = true;
                let mut new_bitrate_bps;
                if incoming_bitrate_bps < self.min_configured_bitrate_bps {
                    new_bitrate_bps = self.min_configured_bitrate_bps;
                } else {
                    // Back off below the measured throughput to drain any
                    // self-induced queue.
                    new_bitrate_bps = (self.beta * incoming_bitrate_bps as f64 + 0.5) as u32;
                    if new_bitrate_bps > self.current_bitrate_bps {
                        // Avoid increasing the rate while over-using.
                        if self.rate_control_region != RateControlRegion::MaxUnknown {
                            new_bitrate_bps =
                                (self.beta * self.avg_max_bitrate_kbps * 1000.0 + 0.5) as u32;
                        }
                        new_bitrate_bps = new_bitrate_bps.min(self.current_bitrate_bps);
                    }
                    self.rate_control_region = RateControlRegion::NearMax;

                    if incoming_bitrate_kbps
                        < self.avg_max_bitrate_kbps - 3.0 * std_max_bitrate_kbps
                    {
                        self.avg_max_bitrate_kbps = -1.0;
                    }
                    self.update_max_bitrate_estimate(incoming_bitrate_kbps);
                }
                self.current_bitrate_bps = self.clamp_bitrate(new_bitrate_bps);
                // Stay on hold until the pipes are cleared.
                self.rate_control_state = RateControlState::Hold;
                self.time_last_bitrate_change_ms = now_ms;
                self.time_last_decrease_ms = now_ms;
                trace!(
                    "backing off to {} bps (incoming {} bps)",
                    self.current_bitrate_bps,
                    incoming_bitrate_bps
                );
            }
        }
    }

    fn change_state(&mut self, bw_state: BandwidthUsage, now_ms: i64) {
        match bw_state {
            BandwidthUsage::Normal => {
                if self.rate_control_state == RateControlState::Hold {
                    self.time_last_bitrate_change_ms = now_ms;
                    self.rate_control_state = RateControlState::Increase;
                }
            }
            BandwidthUsage::Overusing => {
                if self.rate_control_state != RateControlState::Decrease {
                    self.rate_control_state = RateControlState::Decrease;
                }
            }
            BandwidthUsage::Underusing => {
                self.rate_control_state = RateControlState::Hold;
            }
        }
    }

    /// Careful probing close to a known path capacity: at most one average
    /// packet per response time.
    fn additive_rate_increase(&self, now_ms: i64, last_ms: i64) -> u32 {
        // Approximate the over-use estimator delay with 100 ms.
        let response_time_ms = (self.rtt_ms + 100) as f64;
        let mut fraction = 0.0;
        if last_ms > 0 {
            fraction = ((now_ms - last_ms) as f64 / response_time_ms).min(1.0);
        }
        let bits_per_frame = self.current_bitrate_bps as f64 / 30.0;
        let packets_per_frame = (bits_per_frame / (8.0 * 1200.0)).ceil();
        let avg_packet_size_bits = bits_per_frame / packets_per_frame;
        f64::max(1000.0, fraction * avg_packet_size_bits) as u32
    }

    /// Fast ramp-up while the path capacity is unknown: 8% per second.
    fn multiplicative_rate_increase(&self, now_ms: i64, last_ms: i64) -> u32 {
        let mut alpha = 1.08f64;
        if last_ms > -1 {
            let time_since_last_update_ms = ((now_ms - last_ms) as f64).min(1000.0);
            alpha = alpha.powf(time_since_last_update_ms / 1000.0);
        }
        f64::max(self.current_bitrate_bps as f64 * (alpha - 1.0), 1000.0) as u32
    }

    fn update_max_bitrate_estimate(&mut self, incoming_bitrate_kbps: f64) {
        let alpha = MAX_BITRATE_SMOOTHING_ALPHA;
        if self.avg_max_bitrate_kbps == -1.0 {
            self.avg_max_bitrate_kbps = incoming_bitrate_kbps;
        } else {
            self.avg_max_bitrate_kbps =
                (1.0 - alpha) * self.avg_max_bitrate_kbps + alpha * incoming_bitrate_kbps;
        }
        // Norm-scale the variance so it is comparable across bitrates.
        let norm = self.avg_max_bitrate_kbps.max(1.0);
        self.var_max_bitrate_kbps = (1.0 - alpha) * self.var_max_bitrate_kbps
            + alpha * (self.avg_max_bitrate_kbps - incoming_bitrate_kbps)
                * (self.avg_max_bitrate_kbps - incoming_bitrate_kbps)
                / norm;
        // 0.4 ~= 14 kbit/s at 500 kbit/s, 2.5 ~= 35 kbit/s at 500 kbit/s.
        self.var_max_bitrate_kbps = self.var_max_bitrate_kbps.clamp(0.4, 2.5);
    }

    fn clamp_bitrate(&self, new_bitrate_bps: u32) -> u32 {
        new_bitrate_bps.clamp(
            self.min_configured_bitrate_bps,
            self.max_configured_bitrate_bps,
        )
    }
}
