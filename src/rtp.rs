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

//! RTP/RTCP header parsing.
//!
//! Only header level information is extracted: fixed header fields, the
//! CSRC list, and the RFC 5285 one-byte header extensions used by the
//! bandwidth estimator (most importantly absolute-send-time). Payloads are
//! never touched.

use log::*;
use smallvec::SmallVec;

use crate::codec::Decoder;
use crate::error::Error;
use crate::Result;

const RTP_EXPECTED_VERSION: u8 = 2;
const RTP_MIN_PARSE_LEN: usize = 12;

const RTCP_MIN_HEADER_LEN: usize = 4;
const RTCP_MIN_PARSE_LEN: usize = 8;

/// Profile id announcing a one-byte extension block.
/// See RFC 5285 Section 4.2.
const ONE_BYTE_EXTENSION_PROFILE_ID: u16 = 0xBEDE;

/// Granularity of the playout-delay extension values.
const PLAYOUT_DELAY_GRANULARITY_MS: i32 = 10;

/// Extension ids are 4 bits; id 0 is padding and id 15 is reserved.
const MAX_EXTENSION_ID: u8 = 14;

/// Video rotation communicated by the coordination-of-video-orientation
/// extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoRotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl VideoRotation {
    /// Map the two rotation bits of the CVO byte.
    fn from_cvo_byte(b: u8) -> Self {
        match b & 0x03 {
            0 => VideoRotation::Deg0,
            1 => VideoRotation::Deg90,
            2 => VideoRotation::Deg180,
            _ => VideoRotation::Deg270,
        }
    }
}

/// Audio level extension payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioLevel {
    /// Voice activity flag.
    pub voice_activity: bool,

    /// Audio level in negative decibels relative to full scale.
    pub level: u8,
}

/// Playout delay limits in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayoutDelay {
    pub min_ms: i32,
    pub max_ms: i32,
}

/// Frame marking extension payload.
///
/// The compact one-byte form carries only the frame boundary flags; the
/// three-byte form adds the scalability fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameMarking {
    pub start_of_frame: bool,
    pub end_of_frame: bool,
    pub independent: bool,
    pub discardable: bool,
    pub base_layer_sync: bool,
    pub temporal_layer_id: u8,
    pub spatial_layer_id: u8,
    pub tl0_pic_idx: u8,
}

/// One-byte header extensions recognized by the parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RtpExtensionType {
    TransmissionTimeOffset,
    AbsoluteSendTime,
    AudioLevel,
    VideoRotation,
    TransportSequenceNumber,
    PlayoutDelay,
    FrameMarking,
}

/// Registry mapping negotiated extension ids (1..=14) to extension types.
///
/// Ids are assigned by session signaling, so the parser cannot hardcode
/// them; callers register the negotiated mapping once and pass it to
/// [`parse`].
#[derive(Clone, Debug, Default)]
pub struct RtpExtensionMap {
    types: [Option<RtpExtensionType>; MAX_EXTENSION_ID as usize + 1],
}

impl RtpExtensionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ext` under the wire id `id`.
    pub fn register(&mut self, id: u8, ext: RtpExtensionType) -> Result<()> {
        if id == 0 || id > MAX_EXTENSION_ID {
            return Err(Error::InvalidConfig(format!(
                "invalid extension id {}",
                id
            )));
        }
        self.types[id as usize] = Some(ext);
        Ok(())
    }

    /// Look up the type registered for `id`, if any.
    pub fn lookup(&self, id: u8) -> Option<RtpExtensionType> {
        if id == 0 || id > MAX_EXTENSION_ID {
            return None;
        }
        self.types[id as usize]
    }
}

/// Parsed header extension values. Absent extensions are `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RtpHeaderExtension {
    /// Transmission time offset, signed 24 bits.
    pub transmission_time_offset: Option<i32>,

    /// Absolute send time, 24 bits of 6.18 fixed-point seconds.
    pub absolute_send_time: Option<u32>,

    /// Audio level and voice activity.
    pub audio_level: Option<AudioLevel>,

    /// Coordination of video orientation.
    pub video_rotation: Option<VideoRotation>,

    /// Transport-wide sequence number.
    pub transport_sequence_number: Option<u16>,

    /// Playout delay limits.
    pub playout_delay: Option<PlayoutDelay>,

    /// Frame marking flags.
    pub frame_marking: Option<FrameMarking>,
}

/// Parsed RTP header.
///
/// For RTCP packets only `payload_type`, `ssrc` and `header_length` are
/// meaningful.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrcs: SmallVec<[u32; 4]>,
    pub padding_length: usize,
    pub header_length: usize,
    pub extension: RtpHeaderExtension,
}

/// Check whether `data` looks like an RTCP packet.
///
/// Payload types 72..=76 are reserved for RTCP compound packets in the RTP
/// range; 192 (FIR) and 195..=207 are recognized here. 193 (NACK, RFC 2032)
/// is deliberately not recognized so the data is reconsidered as RTP.
pub fn is_rtcp(data: &[u8]) -> bool {
    if data.len() < RTCP_MIN_HEADER_LEN {
        return false;
    }
    if data[0] >> 6 != RTP_EXPECTED_VERSION {
        return false;
    }
    matches!(data[1], 192 | 195 | 200..=207)
}

/// Parse the leading RTCP header, enough to demultiplex by SSRC.
pub fn parse_rtcp(data: &[u8]) -> Option<RtpHeader> {
    let mut buf = data;
    if data.len() < RTCP_MIN_PARSE_LEN {
        return None;
    }

    let b0 = buf.read_u8().ok()?;
    if b0 >> 6 != RTP_EXPECTED_VERSION {
        return None;
    }
    let payload_type = buf.read_u8().ok()?;
    let length_words = buf.read_u16().ok()? as usize;
    let ssrc = buf.read_u32().ok()?;

    Some(RtpHeader {
        payload_type,
        ssrc,
        header_length: 4 + (length_words << 2),
        ..RtpHeader::default()
    })
}

/// Parse an RTP fixed header plus any one-byte extension block.
///
/// Returns `None` if the buffer is truncated, the version is wrong, or the
/// declared header and padding overrun the buffer.
pub fn parse(data: &[u8], extensions: &RtpExtensionMap) -> Option<RtpHeader> {
    let mut buf = data;
    if data.len() < RTP_MIN_PARSE_LEN {
        return None;
    }

    let b0 = buf.read_u8().ok()?;
    let version = b0 >> 6;
    if version != RTP_EXPECTED_VERSION {
        return None;
    }
    let has_padding = (b0 & 0x20) != 0;
    let has_extension = (b0 & 0x10) != 0;
    let csrc_count = b0 & 0x0f;

    let b1 = buf.read_u8().ok()?;
    let marker = (b1 & 0x80) != 0;
    let payload_type = b1 & 0x7f;

    let sequence_number = buf.read_u16().ok()?;
    let timestamp = buf.read_u32().ok()?;
    let ssrc = buf.read_u32().ok()?;

    let mut csrcs = SmallVec::new();
    for _ in 0..csrc_count {
        csrcs.push(buf.read_u32().ok()?);
    }

    let padding_length = if has_padding {
        *data.last()? as usize
    } else {
        0
    };

    let mut header_length = RTP_MIN_PARSE_LEN + csrc_count as usize * 4;
    let mut extension = RtpHeaderExtension::default();

    if has_extension {
        // RTP header extension, RFC 3550 Section 5.3.1: a 16 bit profile
        // id followed by the extension length in 32 bit words.
        let profile = buf.read_u16().ok()?;
        let extension_len = (buf.read_u16().ok()? as usize) << 2;
        header_length += 4;

        let block = buf.read(extension_len).ok()?;
        if profile == ONE_BYTE_EXTENSION_PROFILE_ID {
            parse_one_byte_extensions(&block, extensions, &mut extension);
        }
        header_length += extension_len;
    }

    if header_length + padding_length > data.len() {
        return None;
    }

    Some(RtpHeader {
        marker,
        payload_type,
        sequence_number,
        timestamp,
        ssrc,
        csrcs,
        padding_length,
        header_length,
        extension,
    })
}

/// Walk a one-byte extension block.
///
/// Id 0 is a padding byte, id 15 terminates the block. An element whose
/// declared length does not match its type is skipped; parsing continues
/// with the next element.
fn parse_one_byte_extensions(
    block: &[u8],
    map: &RtpExtensionMap,
    out: &mut RtpHeaderExtension,
) {
    let mut buf = block;
    while let Ok(b) = buf.read_u8() {
        let id = b >> 4;
        // The len field is the element length minus one.
        let len = (b & 0x0f) as usize;

        if id == 0 {
            // Padding byte, skip ignoring len.
            continue;
        }
        if id == 15 {
            trace!("extension id 15 encountered, terminating parsing");
            return;
        }

        let element = match buf.read(len + 1) {
            Ok(v) => v,
            Err(_) => {
                warn!(
                    "incorrect one-byte extension len: {}, bytes left in buffer: {}",
                    len + 1,
                    buf.len()
                );
                return;
            }
        };

        let Some(ext_type) = map.lookup(id) else {
            // Unknown extensions are skipped.
            warn!("failed to find extension id: {}", id);
            continue;
        };

        match ext_type {
            RtpExtensionType::TransmissionTimeOffset => {
                if len != 2 {
                    warn!("incorrect transmission time offset len: {}", len);
                    continue;
                }
                let mut e = &element[..];
                out.transmission_time_offset = e.read_i24().ok();
            }
            RtpExtensionType::AbsoluteSendTime => {
                if len != 2 {
                    warn!("incorrect absolute send time len: {}", len);
                    continue;
                }
                let mut e = &element[..];
                out.absolute_send_time = e.read_u24().ok();
            }
            RtpExtensionType::AudioLevel => {
                if len != 0 {
                    warn!("incorrect audio level len: {}", len);
                    continue;
                }
                out.audio_level = Some(AudioLevel {
                    voice_activity: (element[0] & 0x80) != 0,
                    level: element[0] & 0x7f,
                });
            }
            RtpExtensionType::VideoRotation => {
                if len != 0 {
                    warn!("incorrect video rotation len: {}", len);
                    continue;
                }
                out.video_rotation = Some(VideoRotation::from_cvo_byte(element[0]));
            }
            RtpExtensionType::TransportSequenceNumber => {
                if len != 1 {
                    warn!("incorrect transport sequence number len: {}", len);
                    continue;
                }
                let mut e = &element[..];
                out.transport_sequence_number = e.read_u16().ok();
            }
            RtpExtensionType::PlayoutDelay => {
                if len != 2 {
                    warn!("incorrect playout delay len: {}", len);
                    continue;
                }
                // Two 12 bit values: | min delay | max delay |
                let min = ((element[0] as i32) << 4) | ((element[1] as i32) >> 4);
                let max = (((element[1] as i32) & 0x0f) << 8) | (element[2] as i32);
                out.playout_delay = Some(PlayoutDelay {
                    min_ms: min * PLAYOUT_DELAY_GRANULARITY_MS,
                    max_ms: max * PLAYOUT_DELAY_GRANULARITY_MS,
                });
            }
            RtpExtensionType::FrameMarking => {
                if len != 0 && len != 2 {
                    warn!("incorrect frame marking len: {}", len);
                    continue;
                }
                let mut marks = FrameMarking {
                    start_of_frame: (element[0] & 0x80) != 0,
                    end_of_frame: (element[0] & 0x40) != 0,
                    independent: (element[0] & 0x20) != 0,
                    discardable: (element[0] & 0x10) != 0,
                    ..FrameMarking::default()
                };
                if len == 2 {
                    // Scalable form carries layer information.
                    marks.base_layer_sync = (element[0] & 0x08) != 0;
                    marks.temporal_layer_id = element[0] & 0x07;
                    marks.spatial_layer_id = element[1];
                    marks.tl0_pic_idx = element[2];
                }
                out.frame_marking = Some(marks);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoder;

    const ABS_SEND_TIME_ID: u8 = 3;
    const TIME_OFFSET_ID: u8 = 2;
    const AUDIO_LEVEL_ID: u8 = 1;
    const VIDEO_ROTATION_ID: u8 = 4;
    const TRANSPORT_SEQ_ID: u8 = 5;
    const PLAYOUT_DELAY_ID: u8 = 6;
    const FRAME_MARKING_ID: u8 = 7;

    fn test_extension_map() -> RtpExtensionMap {
        let mut map = RtpExtensionMap::new();
        map.register(TIME_OFFSET_ID, RtpExtensionType::TransmissionTimeOffset)
            .unwrap();
        map.register(ABS_SEND_TIME_ID, RtpExtensionType::AbsoluteSendTime)
            .unwrap();
        map.register(AUDIO_LEVEL_ID, RtpExtensionType::AudioLevel)
            .unwrap();
        map.register(VIDEO_ROTATION_ID, RtpExtensionType::VideoRotation)
            .unwrap();
        map.register(TRANSPORT_SEQ_ID, RtpExtensionType::TransportSequenceNumber)
            .unwrap();
        map.register(PLAYOUT_DELAY_ID, RtpExtensionType::PlayoutDelay)
            .unwrap();
        map.register(FRAME_MARKING_ID, RtpExtensionType::FrameMarking)
            .unwrap();
        map
    }

    /// Build an RTP packet with the given CSRCs and raw one-byte extension
    /// block (padded to a word boundary by the caller).
    fn build_packet(ssrc: u32, csrcs: &[u32], ext_block: Option<&[u8]>) -> Vec<u8> {
        let ext_len = ext_block.map(|b| 4 + b.len()).unwrap_or(0);
        let total = 12 + csrcs.len() * 4 + ext_len + 10;
        let mut data = vec![0u8; total];
        let mut buf = &mut data[..];

        let mut b0 = 0x80 | (csrcs.len() as u8);
        if ext_block.is_some() {
            b0 |= 0x10;
        }
        buf.write_u8(b0).unwrap();
        // Marker bit set, payload type 96.
        buf.write_u8(0x80 | 96).unwrap();
        buf.write_u16(0x1234).unwrap();
        buf.write_u32(0xdeadbeef).unwrap();
        buf.write_u32(ssrc).unwrap();
        for csrc in csrcs {
            buf.write_u32(*csrc).unwrap();
        }
        if let Some(block) = ext_block {
            assert_eq!(block.len() % 4, 0);
            buf.write_u16(ONE_BYTE_EXTENSION_PROFILE_ID).unwrap();
            buf.write_u16((block.len() / 4) as u16).unwrap();
            buf.write(block).unwrap();
        }
        data
    }

    #[test]
    fn parse_fixed_header() {
        let data = build_packet(0x11223344, &[], None);
        let header = parse(&data, &test_extension_map()).unwrap();

        assert!(header.marker);
        assert_eq!(header.payload_type, 96);
        assert_eq!(header.sequence_number, 0x1234);
        assert_eq!(header.timestamp, 0xdeadbeef);
        assert_eq!(header.ssrc, 0x11223344);
        assert!(header.csrcs.is_empty());
        assert_eq!(header.header_length, 12);
        assert_eq!(header.padding_length, 0);
        assert_eq!(header.extension, RtpHeaderExtension::default());
    }

    #[test]
    fn parse_csrc_list() {
        let data = build_packet(1, &[10, 20, 30], None);
        let header = parse(&data, &test_extension_map()).unwrap();

        assert_eq!(header.csrcs.as_slice(), &[10, 20, 30]);
        assert_eq!(header.header_length, 12 + 3 * 4);
    }

    #[test]
    fn parse_truncated_or_bad_version() {
        let map = test_extension_map();
        assert!(parse(&[0x80; 11], &map).is_none());

        let mut data = build_packet(1, &[], None);
        data[0] = 0x40 | (data[0] & 0x3f); // version 1
        assert!(parse(&data, &map).is_none());

        // Declared CSRC count beyond the buffer.
        let mut data = build_packet(1, &[], None);
        data[0] |= 0x0f;
        data.truncate(14);
        assert!(parse(&data, &map).is_none());
    }

    #[test]
    fn parse_padding() {
        let mut data = build_packet(1, &[], None);
        data[0] |= 0x20;
        let total = data.len();
        *data.last_mut().unwrap() = 4;
        let header = parse(&data, &test_extension_map()).unwrap();
        assert_eq!(header.padding_length, 4);

        // Padding that overruns the buffer fails the final length check.
        *data.last_mut().unwrap() = total as u8;
        assert!(parse(&data, &test_extension_map()).is_none());
    }

    #[test]
    fn parse_absolute_send_time() {
        let block = [(ABS_SEND_TIME_ID << 4) | 2, 0x12, 0x34, 0x56];
        let data = build_packet(1, &[], Some(&block));
        let header = parse(&data, &test_extension_map()).unwrap();

        assert_eq!(header.extension.absolute_send_time, Some(0x123456));
        assert_eq!(header.header_length, 12 + 4 + 4);
    }

    #[test]
    fn parse_transmission_time_offset() {
        let block = [(TIME_OFFSET_ID << 4) | 2, 0xFF, 0xFF, 0xFE];
        let data = build_packet(1, &[], Some(&block));
        let header = parse(&data, &test_extension_map()).unwrap();

        assert_eq!(header.extension.transmission_time_offset, Some(-2));
    }

    #[test]
    fn parse_audio_level() {
        let block = [(AUDIO_LEVEL_ID << 4), 0x80 | 0x35, 0, 0];
        let data = build_packet(1, &[], Some(&block));
        let header = parse(&data, &test_extension_map()).unwrap();

        assert_eq!(
            header.extension.audio_level,
            Some(AudioLevel {
                voice_activity: true,
                level: 0x35
            })
        );
    }

    #[test]
    fn parse_video_rotation() {
        let block = [(VIDEO_ROTATION_ID << 4), 0x02, 0, 0];
        let data = build_packet(1, &[], Some(&block));
        let header = parse(&data, &test_extension_map()).unwrap();

        assert_eq!(
            header.extension.video_rotation,
            Some(VideoRotation::Deg180)
        );
    }

    #[test]
    fn parse_transport_sequence_number() {
        let block = [(TRANSPORT_SEQ_ID << 4) | 1, 0xAB, 0xCD, 0];
        let data = build_packet(1, &[], Some(&block));
        let header = parse(&data, &test_extension_map()).unwrap();

        assert_eq!(header.extension.transport_sequence_number, Some(0xABCD));
    }

    #[test]
    fn parse_playout_delay() {
        let block = [(PLAYOUT_DELAY_ID << 4) | 2, 0x12, 0x34, 0x56];
        let data = build_packet(1, &[], Some(&block));
        let header = parse(&data, &test_extension_map()).unwrap();

        // min = 0x123, max = 0x456, both in 10 ms granularity.
        assert_eq!(
            header.extension.playout_delay,
            Some(PlayoutDelay {
                min_ms: 0x123 * 10,
                max_ms: 0x456 * 10
            })
        );
    }

    #[test]
    fn parse_frame_marking_compact() {
        let block = [(FRAME_MARKING_ID << 4), 0xA0, 0, 0];
        let data = build_packet(1, &[], Some(&block));
        let header = parse(&data, &test_extension_map()).unwrap();

        let marks = header.extension.frame_marking.unwrap();
        assert!(marks.start_of_frame);
        assert!(!marks.end_of_frame);
        assert!(marks.independent);
        assert!(!marks.discardable);
        assert_eq!(marks.temporal_layer_id, 0);
    }

    #[test]
    fn parse_frame_marking_scalable() {
        let block = [(FRAME_MARKING_ID << 4) | 2, 0xCD, 0x07, 0x2A];
        let data = build_packet(1, &[], Some(&block));
        let header = parse(&data, &test_extension_map()).unwrap();

        let marks = header.extension.frame_marking.unwrap();
        assert!(marks.start_of_frame);
        assert!(marks.end_of_frame);
        assert!(!marks.independent);
        assert!(marks.base_layer_sync);
        assert_eq!(marks.temporal_layer_id, 5);
        assert_eq!(marks.spatial_layer_id, 0x07);
        assert_eq!(marks.tl0_pic_idx, 0x2A);
    }

    #[test]
    fn parse_length_mismatch_skips_single_extension() {
        // Audio level with a wrong length, followed by a valid absolute
        // send time. The bad element is skipped and parsing continues.
        let block = [
            (AUDIO_LEVEL_ID << 4) | 2,
            0,
            0,
            0,
            (ABS_SEND_TIME_ID << 4) | 2,
            0x01,
            0x02,
            0x03,
        ];
        let data = build_packet(1, &[], Some(&block));
        let header = parse(&data, &test_extension_map()).unwrap();

        assert_eq!(header.extension.audio_level, None);
        assert_eq!(header.extension.absolute_send_time, Some(0x010203));
    }

    #[test]
    fn parse_extension_id_15_terminates() {
        let block = [
            0xF0,
            (ABS_SEND_TIME_ID << 4) | 2,
            0x01,
            0x02,
            0x03,
            0,
            0,
            0,
        ];
        let data = build_packet(1, &[], Some(&block));
        let header = parse(&data, &test_extension_map()).unwrap();

        assert_eq!(header.extension.absolute_send_time, None);
    }

    #[test]
    fn parse_extension_padding_and_unknown_id() {
        // Leading padding bytes, an unregistered id, then a valid element.
        let block = [
            0x00,
            0x00,
            (9 << 4) | 1,
            0xFF,
            0xFF,
            (ABS_SEND_TIME_ID << 4) | 2,
            0x01,
            0x02,
            0x03,
            0x00,
            0x00,
            0x00,
        ];
        let data = build_packet(1, &[], Some(&block));
        let header = parse(&data, &test_extension_map()).unwrap();

        assert_eq!(header.extension.absolute_send_time, Some(0x010203));
    }

    #[test]
    fn parse_extension_element_overruns_block() {
        // Element declares 4 bytes but only 2 remain; parsing of the block
        // aborts without failing the whole header.
        let block = [0x00, 0x00, (ABS_SEND_TIME_ID << 4) | 3, 0x01];
        let data = build_packet(1, &[], Some(&block));
        let header = parse(&data, &test_extension_map()).unwrap();

        assert_eq!(header.extension.absolute_send_time, None);
    }

    #[test]
    fn extension_map_rejects_bad_ids() {
        let mut map = RtpExtensionMap::new();
        assert!(map.register(0, RtpExtensionType::AudioLevel).is_err());
        assert!(map.register(15, RtpExtensionType::AudioLevel).is_err());
        assert!(map.register(14, RtpExtensionType::AudioLevel).is_ok());
        assert_eq!(map.lookup(14), Some(RtpExtensionType::AudioLevel));
        assert_eq!(map.lookup(13), None);
        assert_eq!(map.lookup(15), None);
    }

    #[test]
    fn rtcp_recognition() {
        for pt in [192u8, 195, 200, 201, 202, 203, 204, 205, 206, 207] {
            assert!(is_rtcp(&[0x80, pt, 0, 1]), "pt {}", pt);
        }
        // NACK is deliberately not treated as RTCP.
        assert!(!is_rtcp(&[0x80, 193, 0, 1]));
        assert!(!is_rtcp(&[0x80, 96, 0, 1]));
        assert!(!is_rtcp(&[0x40, 200, 0, 1]));
        assert!(!is_rtcp(&[0x80, 200]));
    }

    #[test]
    fn rtcp_header() {
        let mut data = vec![0u8; 8];
        let mut buf = &mut data[..];
        buf.write_u8(0x80).unwrap();
        buf.write_u8(201).unwrap();
        buf.write_u16(1).unwrap();
        buf.write_u32(0xCAFEBABE).unwrap();

        let header = parse_rtcp(&data).unwrap();
        assert_eq!(header.payload_type, 201);
        assert_eq!(header.ssrc, 0xCAFEBABE);
        assert_eq!(header.header_length, 8);

        assert!(parse_rtcp(&data[..7]).is_none());
        data[0] = 0x40;
        assert!(parse_rtcp(&data).is_none());
    }
}
