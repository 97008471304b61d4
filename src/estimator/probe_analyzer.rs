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

use log::*;

use super::aimd_rate_control::AimdRateControl;

/// A cluster needs at least this many accumulated deltas to be analyzed.
const MIN_CLUSTER_SIZE: u32 = 4;

/// Cap on retained probe packets.
const MAX_PROBE_PACKETS: usize = 15;

/// Once this many clusters have formed, the probing phase is over.
const EXPECTED_NUMBER_OF_PROBES: usize = 3;

/// One received probe packet.
#[derive(Clone, Copy, Debug)]
pub struct Probe {
    pub send_time_ms: i64,
    pub recv_time_ms: i64,
    pub payload_size: usize,
    pub cluster_id: i32,
}

/// Dispersion statistics for one probe cluster.
#[derive(Clone, Copy, Debug, Default)]
struct Cluster {
    send_mean_ms: f64,
    recv_mean_ms: f64,
    mean_size_bytes: usize,
    count: u32,
    num_above_min_delta: u32,
}

impl Cluster {
    fn send_bitrate_bps(&self) -> f64 {
        self.mean_size_bytes as f64 * 8.0 * 1000.0 / self.send_mean_ms
    }

    fn recv_bitrate_bps(&self) -> f64 {
        self.mean_size_bytes as f64 * 8.0 * 1000.0 / self.recv_mean_ms
    }
}

/// Outcome of feeding one probe packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeResult {
    /// A qualifying cluster moved the rate controller.
    BitrateUpdated,
    NoUpdate,
}

/// Groups initial probe packets into clusters, validates their send/recv
/// dispersion, and seeds the rate controller with the achievable rate
/// measured by the best cluster.
pub struct ProbeAnalyzer {
    probes: VecDeque<Probe>,
}

impl ProbeAnalyzer {
    pub fn new() -> Self {
        Self {
            probes: VecDeque::new(),
        }
    }

    /// Feed one probe-tagged packet and re-evaluate the clusters.
    pub fn on_probe_packet(
        &mut self,
        probe: Probe,
        now_ms: i64,
        remote_rate: &mut AimdRateControl,
    ) -> ProbeResult {
        if self.probes.len() < MAX_PROBE_PACKETS {
            let (send_delta_ms, recv_delta_ms) = match self.probes.back() {
                Some(last) => (
                    probe.send_time_ms - last.send_time_ms,
                    probe.recv_time_ms - last.recv_time_ms,
                ),
                None => (-1, -1),
            };
            debug!(
                "probe packet received: send time={} ms, recv time={} ms, send delta={} ms, recv delta={} ms",
                probe.send_time_ms, probe.recv_time_ms, send_delta_ms, recv_delta_ms
            );
        }
        self.probes.push_back(probe);
        self.process_clusters(now_ms, remote_rate)
    }

    fn process_clusters(
        &mut self,
        now_ms: i64,
        remote_rate: &mut AimdRateControl,
    ) -> ProbeResult {
        let clusters = self.compute_clusters();
        if clusters.is_empty() {
            // The probe list is full and has produced nothing; make room.
            if self.probes.len() >= MAX_PROBE_PACKETS {
                self.probes.pop_front();
            }
            return ProbeResult::NoUpdate;
        }

        if let Some(best) = find_best_cluster(&clusters) {
            let probe_bitrate_bps =
                best.send_bitrate_bps().min(best.recv_bitrate_bps()) as u32;
            // A probe sent at a lower rate than the estimate must not pull
            // the estimate down.
            if is_bitrate_improving(probe_bitrate_bps, remote_rate) {
                info!(
                    "probe successful, sent at {} bps, received at {} bps, mean send delta {} ms, mean recv delta {} ms, num probes {}",
                    best.send_bitrate_bps() as u32,
                    best.recv_bitrate_bps() as u32,
                    best.send_mean_ms,
                    best.recv_mean_ms,
                    best.count
                );
                remote_rate.set_estimate(probe_bitrate_bps, now_ms);
                return ProbeResult::BitrateUpdated;
            }
        }

        if clusters.len() >= EXPECTED_NUMBER_OF_PROBES {
            // Done with this round of probing.
            self.probes.clear();
        }
        ProbeResult::NoUpdate
    }

    /// Fold the probe list into per-cluster dispersion statistics.
    ///
    /// Deltas are taken between consecutive probes in arrival order; a
    /// cluster is emitted when the cluster id changes or the list ends,
    /// provided enough deltas accumulated.
    fn compute_clusters(&self) -> Vec<Cluster> {
        let mut clusters = Vec::new();
        let mut current = Cluster::default();
        let mut prev_send_time_ms: i64 = -1;
        let mut prev_recv_time_ms: i64 = -1;
        let mut last_cluster_id: i32 = -1;

        for probe in &self.probes {
            if last_cluster_id == -1 {
                last_cluster_id = probe.cluster_id;
            }
            if prev_send_time_ms >= 0 {
                let send_delta_ms = probe.send_time_ms - prev_send_time_ms;
                let recv_delta_ms = probe.recv_time_ms - prev_recv_time_ms;
                if send_delta_ms >= 1 && recv_delta_ms >= 1 {
                    current.num_above_min_delta += 1;
                }
                if probe.cluster_id != last_cluster_id {
                    if current.count >= MIN_CLUSTER_SIZE {
                        add_cluster(&mut clusters, current);
                    }
                    current = Cluster::default();
                }
                current.send_mean_ms += send_delta_ms as f64;
                current.recv_mean_ms += recv_delta_ms as f64;
                current.mean_size_bytes += probe.payload_size;
                current.count += 1;
                last_cluster_id = probe.cluster_id;
            }
            prev_send_time_ms = probe.send_time_ms;
            prev_recv_time_ms = probe.recv_time_ms;
        }
        if current.count >= MIN_CLUSTER_SIZE {
            add_cluster(&mut clusters, current);
        }
        clusters
    }
}

/// Turn accumulated sums into means and append.
fn add_cluster(clusters: &mut Vec<Cluster>, mut cluster: Cluster) {
    cluster.send_mean_ms /= cluster.count as f64;
    cluster.recv_mean_ms /= cluster.count as f64;
    cluster.mean_size_bytes /= cluster.count as usize;
    clusters.push(cluster);
}

/// Pick the qualifying cluster with the highest achievable rate.
///
/// Scanning stops at the first non-qualifying cluster; later clusters are
/// never considered.
fn find_best_cluster(clusters: &[Cluster]) -> Option<&Cluster> {
    let mut highest_probe_bitrate_bps = 0.0;
    let mut best: Option<&Cluster> = None;
    for cluster in clusters {
        if cluster.send_mean_ms == 0.0 || cluster.recv_mean_ms == 0.0 {
            continue;
        }
        if cluster.num_above_min_delta > cluster.count / 2
            && cluster.recv_mean_ms - cluster.send_mean_ms <= 2.0
            && cluster.send_mean_ms - cluster.recv_mean_ms <= 5.0
        {
            let probe_bitrate_bps = cluster
                .send_bitrate_bps()
                .min(cluster.recv_bitrate_bps());
            if probe_bitrate_bps > highest_probe_bitrate_bps {
                highest_probe_bitrate_bps = probe_bitrate_bps;
                best = Some(cluster);
            }
        } else {
            info!(
                "probe failed, sent at {} bps, received at {} bps, mean send delta {} ms, mean recv delta {} ms, num probes {}",
                cluster.send_bitrate_bps() as u32,
                cluster.recv_bitrate_bps() as u32,
                cluster.send_mean_ms,
                cluster.recv_mean_ms,
                cluster.count
            );
            break;
        }
    }
    best
}

fn is_bitrate_improving(new_bitrate_bps: u32, remote_rate: &AimdRateControl) -> bool {
    let initial_probe = !remote_rate.valid_estimate() && new_bitrate_bps > 0;
    let bitrate_above_estimate =
        remote_rate.valid_estimate() && new_bitrate_bps > remote_rate.latest_estimate();
    initial_probe || bitrate_above_estimate
}
