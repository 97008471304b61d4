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

//! RTC-BWE is a delay-based receive-side bandwidth estimator for real-time
//! media transport.
//!
//! Given per-packet feedback carrying an absolute send time, an arrival
//! time and a payload size, the estimator continuously computes the
//! maximum throughput the network path can sustain without building a
//! persistent queue, and reports it through an observer callback.
//!
//! ## Overview
//!
//! * **Inter-arrival grouping** collects packets into 5 ms send-time
//!   groups and computes send/arrival/size deltas across group
//!   boundaries, tolerating timestamp wrap-around, bursty delivery and
//!   reordering.
//! * **Overuse detection** runs a Kalman filter over the delay gradient
//!   and classifies it against an adaptive threshold into under-use,
//!   normal, and over-use.
//! * **AIMD rate control** grows the target bitrate multiplicatively
//!   while the path capacity is unknown, additively near a known maximum,
//!   and backs off to a fraction of the measured throughput on overuse.
//! * **Probe analysis** measures the dispersion of tagged packet bursts
//!   at call start and seeds the rate controller before the AIMD loop has
//!   converged.
//!
//! An RTP/RTCP header parser ([`rtp`]) is included for extracting the
//! absolute-send-time extension and the other one-byte header extensions
//! from raw packets.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use rtc_bwe::{Config, DelayBasedBwe, NullRemoteBitrateObserver, PacketFeedback, NOT_A_PROBE};
//!
//! let config = Config::new()?;
//! let bwe = DelayBasedBwe::new(&config, Arc::new(NullRemoteBitrateObserver));
//! bwe.on_packet_feedback_vector(&[PacketFeedback {
//!     arrival_time_ms: 10,
//!     send_time_ms: 0,
//!     payload_size: 1200,
//!     ssrc: 0x1234,
//!     probe_cluster_id: NOT_A_PROBE,
//! }]);
//! # Ok::<(), rtc_bwe::error::Error>(())
//! ```

#![allow(unused_imports)]
#![allow(dead_code)]

use crate::error::Error;

/// A specialized `Result` type for bandwidth estimation operations.
pub type Result<T> = std::result::Result<T, Error>;

pub use crate::estimator::BandwidthUsage;
pub use crate::estimator::DelayBasedBwe;
pub use crate::estimator::NullRemoteBitrateObserver;
pub use crate::estimator::PacketFeedback;
pub use crate::estimator::RemoteBitrateObserver;
pub use crate::estimator::NOT_A_PROBE;

/// Default lower bound of the target bitrate.
const DEFAULT_MIN_BITRATE_BPS: u32 = 10_000;

/// Configuration of the bandwidth estimator.
///
/// Algorithm constants (group length, detector thresholds, filter gains)
/// are fixed at compile time; the configuration only carries deployment
/// level knobs.
#[derive(Clone, Debug)]
pub struct Config {
    /// Lower bound of the target bitrate.
    pub(crate) min_bitrate_bps: u32,

    /// Silence after which a stream is dropped from the active set.
    pub(crate) stream_timeout_ms: i64,
}

impl Config {
    /// Create default configuration.
    ///
    /// The configuration may be customized by calling related set methods.
    pub fn new() -> Result<Self> {
        Ok(Self {
            min_bitrate_bps: DEFAULT_MIN_BITRATE_BPS,
            stream_timeout_ms: estimator::DEFAULT_STREAM_TIMEOUT_MS,
        })
    }

    /// Set the lower bound of the target bitrate.
    pub fn set_min_bitrate(&mut self, min_bitrate_bps: u32) {
        self.min_bitrate_bps = min_bitrate_bps;
    }

    /// Set the stream timeout in milliseconds. Zero is invalid.
    pub fn set_stream_timeout(&mut self, stream_timeout_ms: i64) -> Result<()> {
        if stream_timeout_ms <= 0 {
            return Err(Error::InvalidConfig(format!(
                "invalid stream timeout {}",
                stream_timeout_ms
            )));
        }
        self.stream_timeout_ms = stream_timeout_ms;
        Ok(())
    }
}


#[path = "estimator/estimator.rs"]
pub mod estimator;

mod codec;
pub mod error;
pub mod rtp;
