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

/// A group of packets whose send timestamps fall within one group window.
///
/// Send timestamps are unsigned 32 bit with wrap-around; all comparisons
/// go through wrap-aware subtraction.
#[derive(Clone, Copy, Debug)]
struct TimestampGroup {
    size: usize,
    first_timestamp: u32,
    /// Latest send timestamp seen in the group.
    complete_timestamp: u32,
    first_arrival_ms: i64,
    /// Latest arrival time seen in the group.
    complete_arrival_ms: i64,
    last_system_ms: i64,
}

impl TimestampGroup {
    fn is_first_packet(&self) -> bool {
        self.complete_arrival_ms == -1
    }
}

impl Default for TimestampGroup {
    fn default() -> Self {
        Self {
            size: 0,
            first_timestamp: 0,
            complete_timestamp: 0,
            first_arrival_ms: -1,
            complete_arrival_ms: -1,
            last_system_ms: -1,
        }
    }
}

/// Computes send-time, arrival-time and size deltas between adjacent
/// complete timestamp groups.
///
/// A group is all packets whose send timestamp is at most
/// `group_length_ticks` newer than the first timestamp of the group.
/// Deltas are produced when a group closes and a previously completed
/// group exists.
pub struct InterArrival {
    group_length_ticks: u32,
    current: TimestampGroup,
    prev: TimestampGroup,
}

impl InterArrival {
    /// Packets arriving within this of the newest arrival in the group are
    /// treated as part of the current burst.
    const BURST_DELTA_THRESHOLD_MS: i64 = 5;

    /// A burst never extends a group past this much arrival time.
    const MAX_BURST_DURATION_MS: i64 = 100;

    /// Arrivals earlier than the group completion time by more than this
    /// are considered reordered on the path from the socket.
    const REORDER_TOLERANCE_MS: i64 = 5;

    /// Wall-clock silence after which grouping state is discarded.
    const ARRIVAL_GAP_RESET_MS: i64 = 3000;

    pub fn new(group_length_ticks: u32) -> Self {
        Self {
            group_length_ticks,
            current: TimestampGroup::default(),
            prev: TimestampGroup::default(),
        }
    }

    /// Feed one packet. Returns `(timestamp_delta, arrival_delta_ms,
    /// size_delta)` when this packet completed a group and a prior
    /// complete group exists.
    pub fn compute_deltas(
        &mut self,
        timestamp: u32,
        arrival_time_ms: i64,
        packet_size: usize,
    ) -> Option<(u32, i64, isize)> {
        if !self.current.is_first_packet()
            && arrival_time_ms - self.current.last_system_ms > Self::ARRIVAL_GAP_RESET_MS
        {
            debug!(
                "no packets for {} ms, resetting inter-arrival groups",
                arrival_time_ms - self.current.last_system_ms
            );
            self.reset();
        }

        let mut deltas = None;
        if self.current.is_first_packet() {
            self.current.first_timestamp = timestamp;
            self.current.complete_timestamp = timestamp;
            self.current.first_arrival_ms = arrival_time_ms;
        } else if !self.packet_in_order(timestamp) {
            return None;
        } else if self.arrival_reordered(arrival_time_ms) {
            // A late arrival never opens a new group. Fold it into the
            // current group if its send time fits, drop it otherwise.
            if !self.within_group_window(timestamp) {
                return None;
            }
            self.current.complete_timestamp =
                latest_timestamp(self.current.complete_timestamp, timestamp);
        } else if self.new_timestamp_group(arrival_time_ms, timestamp) {
            // First packet of a later group; the previous pair of groups
            // is ready.
            if self.prev.complete_arrival_ms >= 0 {
                let timestamp_delta = self
                    .current
                    .complete_timestamp
                    .wrapping_sub(self.prev.complete_timestamp);
                let arrival_delta_ms =
                    self.current.complete_arrival_ms - self.prev.complete_arrival_ms;
                let size_delta = self.current.size as isize - self.prev.size as isize;
                deltas = Some((timestamp_delta, arrival_delta_ms, size_delta));
            }
            self.prev = self.current;
            self.current.first_timestamp = timestamp;
            self.current.complete_timestamp = timestamp;
            self.current.first_arrival_ms = arrival_time_ms;
            self.current.complete_arrival_ms = arrival_time_ms;
            self.current.size = 0;
        } else {
            self.current.complete_timestamp =
                latest_timestamp(self.current.complete_timestamp, timestamp);
        }

        self.current.size += packet_size;
        self.current.complete_arrival_ms = self.current.complete_arrival_ms.max(arrival_time_ms);
        self.current.last_system_ms = arrival_time_ms;

        deltas
    }

    /// A send timestamp more than half the 32 bit range older than the
    /// group start must be due to reordering.
    fn packet_in_order(&self, timestamp: u32) -> bool {
        timestamp.wrapping_sub(self.current.first_timestamp) < 0x8000_0000
    }

    fn within_group_window(&self, timestamp: u32) -> bool {
        timestamp.wrapping_sub(self.current.first_timestamp) <= self.group_length_ticks
    }

    fn arrival_reordered(&self, arrival_time_ms: i64) -> bool {
        self.current.complete_arrival_ms - arrival_time_ms > Self::REORDER_TOLERANCE_MS
    }

    fn new_timestamp_group(&self, arrival_time_ms: i64, timestamp: u32) -> bool {
        if self.belongs_to_burst(arrival_time_ms) {
            return false;
        }
        !self.within_group_window(timestamp)
    }

    /// Packets delivered back to back by a lower layer are kept in one
    /// group regardless of their send timestamps.
    fn belongs_to_burst(&self, arrival_time_ms: i64) -> bool {
        arrival_time_ms - self.current.complete_arrival_ms < Self::BURST_DELTA_THRESHOLD_MS
            && arrival_time_ms - self.current.first_arrival_ms < Self::MAX_BURST_DURATION_MS
    }

    fn reset(&mut self) {
        self.current = TimestampGroup::default();
        self.prev = TimestampGroup::default();
    }
}

/// Wrap-aware maximum of two 32 bit timestamps.
fn latest_timestamp(a: u32, b: u32) -> u32 {
    if b.wrapping_sub(a) < 0x8000_0000 {
        b
    } else {
        a
    }
}
