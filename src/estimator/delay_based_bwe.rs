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

use std::sync::Arc;
use std::sync::Mutex;
use std::thread::ThreadId;

use log::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::aimd_rate_control::AimdRateControl;
use super::convert_ms_to_24bits;
use super::inter_arrival::InterArrival;
use super::overuse_detector::OveruseDetector;
use super::overuse_estimator::OveruseEstimator;
use super::probe_analyzer::Probe;
use super::probe_analyzer::ProbeAnalyzer;
use super::rate_counter::RateCounter;
use super::BandwidthUsage;
use super::PacketFeedback;
use super::ProbeResult;
use super::RateControlInput;
use super::RemoteBitrateObserver;
use super::ABS_SEND_TIME_INTER_ARRIVAL_UPSHIFT;
use super::BITRATE_WINDOW_MS;
use super::INITIAL_PROBING_INTERVAL_MS;
use super::INTER_ARRIVAL_SHIFT;
use super::MIN_PROBE_PACKET_SIZE;
use super::NOT_A_PROBE;
use super::TIMESTAMP_GROUP_LENGTH_MS;
use super::TIMESTAMP_TO_MS;
use crate::Config;

/// Group length expressed in internal send timestamp ticks.
const TIMESTAMP_GROUP_LENGTH_TICKS: u32 =
    ((TIMESTAMP_GROUP_LENGTH_MS << INTER_ARRIVAL_SHIFT) / 1000) as u32;

/// The estimator is event driven; the periodic process hook is disabled.
const DISABLED_MODULE_TIME_MS: i64 = 1000;

/// Estimator state guarded by the coordinator's single lock.
struct EstimatorState {
    inter_arrival: InterArrival,
    estimator: OveruseEstimator,
    detector: OveruseDetector,
    remote_rate: AimdRateControl,
    incoming_bitrate: RateCounter,
    probe_analyzer: ProbeAnalyzer,
    /// SSRC to last-seen arrival time.
    ssrcs: FxHashMap<u32, i64>,
    stream_timeout_ms: i64,
    first_packet_time_ms: i64,
    last_update_ms: i64,
    network_thread: Option<ThreadId>,
}

impl EstimatorState {
    fn new(config: &Config) -> Self {
        Self {
            inter_arrival: InterArrival::new(TIMESTAMP_GROUP_LENGTH_TICKS),
            estimator: OveruseEstimator::new(),
            detector: OveruseDetector::new(),
            remote_rate: AimdRateControl::new(config.min_bitrate_bps),
            incoming_bitrate: RateCounter::new(BITRATE_WINDOW_MS),
            probe_analyzer: ProbeAnalyzer::new(),
            ssrcs: FxHashMap::default(),
            stream_timeout_ms: config.stream_timeout_ms,
            first_packet_time_ms: -1,
            last_update_ms: -1,
            network_thread: None,
        }
    }

    /// Drop silent streams. When none remain, the grouping and gradient
    /// state belongs to a dead call and is rebuilt; the probing clock is
    /// deliberately left alone since probing only happens at call start.
    fn timeout_streams(&mut self, now_ms: i64) {
        let timeout_ms = self.stream_timeout_ms;
        self.ssrcs.retain(|_, last_seen_ms| now_ms - *last_seen_ms <= timeout_ms);
        if self.ssrcs.is_empty() {
            self.inter_arrival = InterArrival::new(TIMESTAMP_GROUP_LENGTH_TICKS);
            self.estimator = OveruseEstimator::new();
        }
    }

    fn sorted_ssrcs(&self) -> SmallVec<[u32; 8]> {
        let mut ssrcs: SmallVec<[u32; 8]> = self.ssrcs.keys().copied().collect();
        ssrcs.sort_unstable();
        ssrcs
    }

    /// Ingress is expected on one network thread; pin the first caller in
    /// debug builds.
    fn check_network_thread(&mut self) {
        #[cfg(debug_assertions)]
        {
            let current = std::thread::current().id();
            let pinned = *self.network_thread.get_or_insert(current);
            debug_assert_eq!(
                pinned, current,
                "packet ingress must stay on a single thread"
            );
        }
    }
}

/// Receive-side delay-based bandwidth estimator.
///
/// Owns the whole component graph (grouping, gradient filter, detector,
/// rate controller, throughput meter, probe analyzer) behind one lock and
/// drives it per incoming packet. The observer is invoked outside the
/// lock with a snapshot of the active SSRCs and the target bitrate.
pub struct DelayBasedBwe {
    observer: Arc<dyn RemoteBitrateObserver>,
    state: Mutex<EstimatorState>,
}

impl DelayBasedBwe {
    pub fn new(config: &Config, observer: Arc<dyn RemoteBitrateObserver>) -> Self {
        // NOTE! Downstream tests rely on this EXACT log line.
        info!("RemoteBitrateEstimatorAbsSendTime: Instantiating.");
        Self {
            observer,
            state: Mutex::new(EstimatorState::new(config)),
        }
    }

    /// Feed one received RTP packet. Packets without the
    /// absolute-send-time extension cannot be used and are dropped.
    pub fn on_packet(
        &self,
        arrival_time_ms: i64,
        payload_size: usize,
        header: &crate::rtp::RtpHeader,
        probe_cluster_id: i32,
    ) {
        let Some(send_time_24bits) = header.extension.absolute_send_time else {
            // NOTE! Downstream tests rely on this EXACT log line.
            warn!(
                "RemoteBitrateEstimatorAbsSendTime: Incoming packet is missing absolute send time extension!"
            );
            return;
        };
        self.incoming_packet_info(
            arrival_time_ms,
            send_time_24bits,
            payload_size,
            header.ssrc,
            probe_cluster_id,
        );
    }

    /// Feed a batch of transport feedback, in order.
    pub fn on_packet_feedback_vector(&self, packet_feedbacks: &[PacketFeedback]) {
        for feedback in packet_feedbacks {
            self.incoming_packet_info(
                feedback.arrival_time_ms,
                convert_ms_to_24bits(feedback.send_time_ms),
                feedback.payload_size,
                feedback.ssrc,
                feedback.probe_cluster_id,
            );
        }
    }

    fn incoming_packet_info(
        &self,
        arrival_time_ms: i64,
        send_time_24bits: u32,
        payload_size: usize,
        ssrc: u32,
        probe_cluster_id: i32,
    ) {
        debug_assert!(send_time_24bits < (1 << 24));
        // Shift up the send time to use the full 32 bits the grouping
        // arithmetic works with, so wrapping stays correct.
        let timestamp = send_time_24bits << ABS_SEND_TIME_INTER_ARRIVAL_UPSHIFT;
        let send_time_ms = (timestamp as f64 * TIMESTAMP_TO_MS) as i64;
        let now_ms = arrival_time_ms;

        let mut update_estimate = false;
        let mut probe_updated = false;
        let mut target_bitrate_bps: u32 = 0;
        let mut ssrcs: SmallVec<[u32; 8]> = SmallVec::new();
        {
            let mut guard = self.state.lock().unwrap();
            let state = &mut *guard;
            state.check_network_thread();

            state.timeout_streams(now_ms);
            if state.first_packet_time_ms == -1 {
                state.first_packet_time_ms = arrival_time_ms;
            }
            state.ssrcs.insert(ssrc, now_ms);
            state.incoming_bitrate.update(payload_size, now_ms);

            // Probes are only analyzed while no converged estimate exists
            // and only for packets large enough to have been paced.
            if probe_cluster_id != NOT_A_PROBE
                && payload_size > MIN_PROBE_PACKET_SIZE
                && (!state.remote_rate.valid_estimate()
                    || now_ms - state.first_packet_time_ms < INITIAL_PROBING_INTERVAL_MS)
            {
                let probe = Probe {
                    send_time_ms,
                    recv_time_ms: arrival_time_ms,
                    payload_size,
                    cluster_id: probe_cluster_id,
                };
                // A probe that moved the bitrate must reach the observer
                // right away.
                if state
                    .probe_analyzer
                    .on_probe_packet(probe, now_ms, &mut state.remote_rate)
                    == ProbeResult::BitrateUpdated
                {
                    probe_updated = true;
                    update_estimate = true;
                }
            }

            if let Some((ts_delta, t_delta_ms, size_delta)) =
                state
                    .inter_arrival
                    .compute_deltas(timestamp, arrival_time_ms, payload_size)
            {
                let ts_delta_ms =
                    (1000.0 * ts_delta as f64) / (1u64 << INTER_ARRIVAL_SHIFT) as f64;
                state.estimator.update(
                    t_delta_ms,
                    ts_delta_ms,
                    size_delta,
                    state.detector.state(),
                );
                state.detector.detect(
                    state.estimator.offset(),
                    ts_delta_ms,
                    state.estimator.num_of_deltas(),
                    arrival_time_ms,
                );
            }

            if !update_estimate {
                // Periodic update, or an immediate one when overuse holds
                // and the target runs far above the measured rate.
                if state.last_update_ms == -1
                    || now_ms - state.last_update_ms > state.remote_rate.feedback_interval_ms()
                {
                    update_estimate = true;
                } else if state.detector.state() == BandwidthUsage::Overusing {
                    if let Some(incoming_rate) = state.incoming_bitrate.rate(now_ms) {
                        if state.remote_rate.time_to_reduce_further(now_ms, incoming_rate) {
                            update_estimate = true;
                        }
                    }
                }
            }

            if update_estimate {
                if probe_updated {
                    // The probe already placed the estimate this tick; a
                    // controller tick on top of it would distort the
                    // measured rate before it ever reaches the observer.
                    target_bitrate_bps = state.remote_rate.latest_estimate();
                } else {
                    let input = RateControlInput {
                        bw_state: state.detector.state(),
                        incoming_bitrate_bps: state.incoming_bitrate.rate(now_ms),
                        noise_var: state.estimator.var_noise(),
                    };
                    target_bitrate_bps = state.remote_rate.update(&input, now_ms);
                }
                update_estimate = state.remote_rate.valid_estimate();
            }

            if update_estimate {
                state.last_update_ms = now_ms;
                ssrcs = state.sorted_ssrcs();
            }
        }
        // The callback runs outside the lock so the observer may call
        // back into the estimator.
        if update_estimate {
            self.observer
                .on_receive_bitrate_changed(&ssrcs, target_bitrate_bps);
        }
    }

    /// Latest RTT measurement from the feedback channel.
    pub fn on_rtt_update(&self, avg_rtt_ms: i64, _max_rtt_ms: i64) {
        let mut state = self.state.lock().unwrap();
        state.remote_rate.set_rtt(avg_rtt_ms);
    }

    /// Forget a stream immediately.
    pub fn remove_stream(&self, ssrc: u32) {
        let mut state = self.state.lock().unwrap();
        state.ssrcs.remove(&ssrc);
    }

    /// Latest estimate with the active SSRC set, if one exists yet. The
    /// bitrate is zero when the active set is empty.
    pub fn latest_estimate(&self) -> Option<(Vec<u32>, u32)> {
        let state = self.state.lock().unwrap();
        if !state.remote_rate.valid_estimate() {
            return None;
        }
        let ssrcs = state.sorted_ssrcs();
        let bitrate_bps = if ssrcs.is_empty() {
            0
        } else {
            state.remote_rate.latest_estimate()
        };
        Some((ssrcs.to_vec(), bitrate_bps))
    }

    /// Lower bound for the rate controller.
    pub fn set_min_bitrate(&self, min_bitrate_bps: u32) {
        let mut state = self.state.lock().unwrap();
        state.remote_rate.set_min_bitrate(min_bitrate_bps);
    }

    /// Periodic processing hook. The estimator is purely event driven, so
    /// this does nothing.
    pub fn process(&self) {}

    /// Interval until [`process`](Self::process) should run again. Returns
    /// the disabled-module interval; see `process`.
    pub fn time_until_next_process(&self) -> i64 {
        DISABLED_MODULE_TIME_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::RtpHeader;

    const PROBE_SSRC: u32 = 0x1234;

    #[derive(Default)]
    struct TestObserver {
        updates: Mutex<Vec<(Vec<u32>, u32)>>,
    }

    impl TestObserver {
        fn updates(&self) -> Vec<(Vec<u32>, u32)> {
            self.updates.lock().unwrap().clone()
        }
    }

    impl RemoteBitrateObserver for TestObserver {
        fn on_receive_bitrate_changed(&self, ssrcs: &[u32], bitrate_bps: u32) {
            self.updates
                .lock()
                .unwrap()
                .push((ssrcs.to_vec(), bitrate_bps));
        }
    }

    fn make_bwe() -> (Arc<TestObserver>, DelayBasedBwe) {
        let _ = env_logger::builder().is_test(true).try_init();
        let observer = Arc::new(TestObserver::default());
        let config = Config::new().unwrap();
        let bwe = DelayBasedBwe::new(&config, observer.clone());
        (observer, bwe)
    }

    fn feed(
        bwe: &DelayBasedBwe,
        arrival_time_ms: i64,
        send_time_ms: i64,
        payload_size: usize,
        ssrc: u32,
        probe_cluster_id: i32,
    ) {
        bwe.on_packet_feedback_vector(&[PacketFeedback {
            arrival_time_ms,
            send_time_ms,
            payload_size,
            ssrc,
            probe_cluster_id,
        }]);
    }

    #[test]
    fn no_estimate_before_any_input() {
        let (observer, bwe) = make_bwe();
        assert_eq!(bwe.latest_estimate(), None);
        assert!(observer.updates().is_empty());
        assert_eq!(bwe.time_until_next_process(), 1000);
        bwe.process();
    }

    #[test]
    fn probe_cluster_seeds_estimate() {
        let (observer, bwe) = make_bwe();
        // Five probes, 1200 bytes, sent 5 ms apart and received 6 ms
        // apart: the receive side bottlenecks at 1.6 Mbps.
        for i in 0..5i64 {
            feed(&bwe, 10 + i * 6, i * 5, 1200, PROBE_SSRC, 0);
        }
        let updates = observer.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, vec![PROBE_SSRC]);
        // The measured probe rate reaches the observer untouched.
        assert_eq!(updates[0].1, 1_600_000);

        let (ssrcs, bitrate_bps) = bwe.latest_estimate().unwrap();
        assert_eq!(ssrcs, vec![PROBE_SSRC]);
        assert_eq!(bitrate_bps, 1_600_000);
    }

    #[test]
    fn dispersed_probe_cluster_is_ignored() {
        let (observer, bwe) = make_bwe();
        // Received 12 ms apart against 5 ms send spacing: the cluster
        // fails its dispersion check and must not move the estimate.
        for i in 0..5i64 {
            feed(&bwe, 10 + i * 12, i * 5, 1200, PROBE_SSRC, 0);
        }
        assert!(observer.updates().is_empty());
        assert_eq!(bwe.latest_estimate(), None);
    }

    #[test]
    fn small_probe_packets_are_not_analyzed() {
        let (observer, bwe) = make_bwe();
        // Same timing as a valid cluster, but the payloads are below the
        // pacing threshold.
        for i in 0..5i64 {
            feed(&bwe, 10 + i * 5, i * 5, 200, PROBE_SSRC, 0);
        }
        assert!(observer.updates().is_empty());
    }

    #[test]
    fn missing_absolute_send_time_drops_packet() {
        let (observer, bwe) = make_bwe();
        let header = RtpHeader {
            ssrc: PROBE_SSRC,
            ..RtpHeader::default()
        };
        bwe.on_packet(10, 1200, &header, NOT_A_PROBE);
        assert!(observer.updates().is_empty());
        assert_eq!(bwe.latest_estimate(), None);

        // A header carrying the extension is consumed normally.
        let mut header = RtpHeader::default();
        header.ssrc = PROBE_SSRC;
        header.extension.absolute_send_time = Some(convert_ms_to_24bits(0));
        bwe.on_packet(20, 1200, &header, NOT_A_PROBE);
        let state = bwe.state.lock().unwrap();
        assert_eq!(state.ssrcs.len(), 1);
    }

    #[test]
    fn steady_stream_converges_and_never_decreases() {
        let (observer, bwe) = make_bwe();
        bwe.on_rtt_update(100, 200);
        // 1000 bytes every 2 ms is a steady 4 Mbps with a constant 10 ms
        // one-way delay.
        for t in (0..8000i64).step_by(2) {
            feed(&bwe, t + 10, t, 1000, 1, NOT_A_PROBE);
        }
        let updates = observer.updates();
        assert!(!updates.is_empty());
        for (ssrcs, bitrate_bps) in &updates {
            assert_eq!(*ssrcs, vec![1]);
            assert!(*bitrate_bps >= 3_900_000, "bitrate {}", bitrate_bps);
            assert!(*bitrate_bps <= 6_010_000, "bitrate {}", bitrate_bps);
        }
        for pair in updates.windows(2) {
            assert!(pair[1].1 >= pair[0].1);
        }
    }

    #[test]
    fn growing_queue_backs_off_the_estimate() {
        let (observer, bwe) = make_bwe();
        // 7 seconds of clean 4 Mbps.
        for t in (0..7000i64).step_by(2) {
            feed(&bwe, t + 10, t, 1000, 1, NOT_A_PROBE);
        }
        let peak = observer
            .updates()
            .iter()
            .map(|(_, bps)| *bps)
            .max()
            .unwrap();
        assert!(peak >= 4_000_000);

        // Then the queue grows by 1 ms every 10 ms of send time.
        for t in (7000..10_000i64).step_by(2) {
            feed(&bwe, t + 10 + (t - 7000) / 10, t, 1000, 1, NOT_A_PROBE);
        }
        let updates = observer.updates();
        let min_after = updates.iter().map(|(_, bps)| *bps).min().unwrap();
        assert!(
            (min_after as f64) < 0.9 * peak as f64,
            "no backoff: min {} vs peak {}",
            min_after,
            peak
        );
        let (_, final_bps) = updates.last().unwrap();
        assert!(*final_bps >= 2_500_000, "final {}", final_bps);
        assert!(*final_bps <= 3_600_000, "final {}", final_bps);
    }

    #[test]
    fn silent_stream_times_out() {
        let (_observer, bwe) = make_bwe();
        // Stream 1 talks for one second, stream 2 keeps going.
        for t in (0..1000i64).step_by(10) {
            feed(&bwe, t + 10, t, 1000, 1, NOT_A_PROBE);
            feed(&bwe, t + 15, t + 5, 1000, 2, NOT_A_PROBE);
        }
        for t in (1000..6000i64).step_by(10) {
            feed(&bwe, t + 15, t + 5, 1000, 2, NOT_A_PROBE);
        }
        let (ssrcs, bitrate_bps) = bwe.latest_estimate().unwrap();
        assert_eq!(ssrcs, vec![2]);
        assert!(bitrate_bps > 0);

        // Removing the last stream empties the set; the estimate reports
        // zero for an empty set.
        bwe.remove_stream(2);
        assert_eq!(bwe.latest_estimate(), Some((vec![], 0)));
    }

    #[test]
    fn min_bitrate_is_respected() {
        let (observer, bwe) = make_bwe();
        bwe.set_min_bitrate(2_000_000);
        // The probe measures 1.6 Mbps, below the configured floor.
        for i in 0..5i64 {
            feed(&bwe, 10 + i * 6, i * 5, 1200, PROBE_SSRC, 0);
        }
        let updates = observer.updates();
        assert!(!updates.is_empty());
        for (_, bitrate_bps) in &updates {
            assert!(*bitrate_bps >= 2_000_000);
        }
    }

    #[test]
    fn send_time_wrap_around_is_neutral() {
        // Identical relative timing started 32 s apart; the second run
        // crosses the 64 s wrap of the absolute send time. The offset is
        // an exact multiple of the 24 bit quantization so both runs see
        // bitwise identical deltas.
        fn run(base_send_ms: i64) -> Vec<(Vec<u32>, u32)> {
            let (observer, bwe) = make_bwe();
            for i in 0..5i64 {
                feed(&bwe, 1000 + i * 5, base_send_ms + i * 5, 1200, 7, 0);
            }
            for t in (25..2000i64).step_by(10) {
                feed(&bwe, 1000 + t, base_send_ms + t, 1000, 7, NOT_A_PROBE);
            }
            observer.updates()
        }

        let straight = run(31_000);
        let wrapping = run(63_000);
        assert!(!straight.is_empty());
        assert_eq!(straight, wrapping);
    }
}
