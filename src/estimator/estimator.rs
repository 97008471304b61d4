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

//! Delay-based receive-side bandwidth estimation.
//!
//! The estimator consumes per-packet feedback (absolute send time, arrival
//! time, payload size) and continuously computes the maximum throughput the
//! path can sustain without building a persistent queue. Packets are
//! aggregated into send-time groups, the one-way-delay gradient between
//! groups is tracked by a Kalman filter, a hysteretic detector classifies
//! the gradient into under-use/normal/over-use, and an AIMD loop turns the
//! detector signal plus the measured incoming rate into a target bitrate.
//! A burst-probing analyzer bootstraps the loop at call start.

pub use self::delay_based_bwe::DelayBasedBwe;
pub use self::probe_analyzer::ProbeResult;

/// Number of fractional bits in the 24 bit absolute-send-time field
/// (6.18 fixed-point seconds).
pub(crate) const ABS_SEND_TIME_FRACTION: u32 = 18;

/// Absolute send times are shifted up to use the full 32 bits that
/// inter-arrival grouping works with, so wrap-around arithmetic stays
/// correct.
pub(crate) const ABS_SEND_TIME_INTER_ARRIVAL_UPSHIFT: u32 = 8;

/// Fractional bits of the internal send timestamp representation.
pub(crate) const INTER_ARRIVAL_SHIFT: u32 =
    ABS_SEND_TIME_FRACTION + ABS_SEND_TIME_INTER_ARRIVAL_UPSHIFT;

/// Milliseconds per internal send timestamp tick.
pub(crate) const TIMESTAMP_TO_MS: f64 = 1000.0 / (1u64 << INTER_ARRIVAL_SHIFT) as f64;

/// Width of a send timestamp group.
pub(crate) const TIMESTAMP_GROUP_LENGTH_MS: i64 = 5;

/// Window of the incoming bitrate meter.
pub(crate) const BITRATE_WINDOW_MS: i64 = 1000;

/// Probes are only considered during the first part of a call, before the
/// rate controller has converged.
pub(crate) const INITIAL_PROBING_INTERVAL_MS: i64 = 2000;

/// Only packets larger than this are assumed to have been paced by the
/// sender and are eligible as probes.
pub(crate) const MIN_PROBE_PACKET_SIZE: usize = 200;

/// A stream is dropped from the active set after this long without packets.
pub(crate) const DEFAULT_STREAM_TIMEOUT_MS: i64 = 2000;

/// Marker for packets that do not belong to a probe cluster.
pub const NOT_A_PROBE: i32 = -1;

/// Bandwidth usage hypothesis produced by the overuse detector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BandwidthUsage {
    /// The one-way-delay gradient is flat; the path keeps up.
    #[default]
    Normal,

    /// The delay gradient is falling; a queue is draining.
    Underusing,

    /// The delay gradient is rising; a queue is building up.
    Overusing,
}

/// Input to one tick of the AIMD rate controller.
#[derive(Clone, Copy, Debug)]
pub struct RateControlInput {
    /// Current detector hypothesis.
    pub bw_state: BandwidthUsage,

    /// Measured incoming bitrate, when the meter window has filled.
    pub incoming_bitrate_bps: Option<u32>,

    /// Noise variance reported by the delay gradient filter.
    pub noise_var: f64,
}

/// Per-packet feedback consumed by the estimator.
#[derive(Clone, Copy, Debug)]
pub struct PacketFeedback {
    /// Local time the packet arrived, in milliseconds.
    pub arrival_time_ms: i64,

    /// Remote send time in milliseconds; converted internally to the
    /// 24 bit absolute-send-time representation.
    pub send_time_ms: i64,

    /// RTP payload size in bytes.
    pub payload_size: usize,

    /// Stream the packet belongs to.
    pub ssrc: u32,

    /// Probe cluster tag, or [`NOT_A_PROBE`].
    pub probe_cluster_id: i32,
}

/// Observer notified whenever the estimate is updated.
///
/// The callback is invoked outside the estimator's internal lock, so an
/// implementation may call back into the estimator without deadlocking.
pub trait RemoteBitrateObserver: Send + Sync {
    /// Called with the full set of active SSRCs and the new target
    /// bitrate. `bitrate_bps` is zero when the active set is empty.
    fn on_receive_bitrate_changed(&self, ssrcs: &[u32], bitrate_bps: u32);
}

/// Inert observer for callers that only poll `latest_estimate`.
#[derive(Debug, Default)]
pub struct NullRemoteBitrateObserver;

impl RemoteBitrateObserver for NullRemoteBitrateObserver {
    fn on_receive_bitrate_changed(&self, _ssrcs: &[u32], _bitrate_bps: u32) {}
}

/// Convert a millisecond send time to the 24 bit 6.18 fixed-point
/// representation carried by the absolute-send-time header extension.
pub(crate) fn convert_ms_to_24bits(time_ms: i64) -> u32 {
    ((((time_ms as u64) << ABS_SEND_TIME_FRACTION) + 500) / 1000) as u32 & 0x00FF_FFFF
}


mod aimd_rate_control;
mod delay_based_bwe;
mod inter_arrival;
mod overuse_detector;
mod overuse_estimator;
mod probe_analyzer;
mod rate_counter;
