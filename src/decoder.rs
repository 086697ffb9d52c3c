//! Binary telemetry frame decoder.
//!
//! The flight unit writes one continuous byte stream of concatenated frames.
//! Each frame starts with a one-byte header and has a fixed body length:
//!
//! | Header | Kind     | Body                                         |
//! |--------|----------|----------------------------------------------|
//! | `0x54` | high-rate| accel x,y,z + gyro x,y,z, BE `i16` (12 bytes) |
//! | `0x8A` | low-rate | pressure, temperature, BE `i24` (6 bytes)     |
//!
//! There is no length field or checksum. Anything that is not a complete
//! frame starting at the cursor is skipped one byte at a time until the
//! stream lines up with a header again.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::calibration::Sensitivity;
use crate::config::SampleRates;
use crate::types::{HighRateSample, LowRateSample, RawHighRate, RawLowRate};

pub const HIGHRES_ID: u8 = 0x54;
pub const LOWRES_ID: u8 = 0x8A;

/// Header + body
pub const HIGHRES_FRAME_LEN: usize = 13;
pub const LOWRES_FRAME_LEN: usize = 7;

/// Below this many remaining bytes nothing can be decoded.
const MIN_FRAME_LEN: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    HighRes,
    LowRes,
}

impl FrameKind {
    pub fn from_header(byte: u8) -> Option<Self> {
        match byte {
            HIGHRES_ID => Some(FrameKind::HighRes),
            LOWRES_ID => Some(FrameKind::LowRes),
            _ => None,
        }
    }

    pub fn frame_len(self) -> usize {
        match self {
            FrameKind::HighRes => HIGHRES_FRAME_LEN,
            FrameKind::LowRes => LOWRES_FRAME_LEN,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Frame {
    HighRes(RawHighRate),
    LowRes(RawLowRate),
}

/// Result of one decode attempt at a cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A complete frame; advance by `consumed`.
    Decoded { frame: Frame, consumed: usize },
    /// Header byte not recognised, or fewer than two bytes left. Advance by one.
    Unrecognized,
    /// Recognised header whose body runs past the end of the buffer.
    /// Advance by one; the partial body is never consumed.
    Truncated(FrameKind),
}

impl FrameOutcome {
    pub fn advance(&self) -> usize {
        match self {
            FrameOutcome::Decoded { consumed, .. } => *consumed,
            FrameOutcome::Unrecognized | FrameOutcome::Truncated(_) => 1,
        }
    }
}

fn be_i16(bytes: &[u8]) -> i16 {
    i16::from_be_bytes([bytes[0], bytes[1]])
}

fn be_i24(bytes: &[u8]) -> i32 {
    let unsigned = (i32::from(bytes[0]) << 16) | (i32::from(bytes[1]) << 8) | i32::from(bytes[2]);
    // sign-extend bit 23
    (unsigned << 8) >> 8
}

fn parse_high(body: &[u8]) -> RawHighRate {
    RawHighRate {
        accel: [be_i16(&body[0..2]), be_i16(&body[2..4]), be_i16(&body[4..6])],
        gyro: [be_i16(&body[6..8]), be_i16(&body[8..10]), be_i16(&body[10..12])],
    }
}

fn parse_low(body: &[u8]) -> RawLowRate {
    RawLowRate {
        pressure: be_i24(&body[0..3]),
        temperature: be_i24(&body[3..6]),
    }
}

/// Attempt to decode exactly one frame starting at `cursor`.
pub fn read_frame(buf: &[u8], cursor: usize) -> FrameOutcome {
    let remaining = buf.get(cursor..).unwrap_or(&[]);
    if remaining.len() < MIN_FRAME_LEN {
        return FrameOutcome::Unrecognized;
    }

    let Some(kind) = FrameKind::from_header(remaining[0]) else {
        return FrameOutcome::Unrecognized;
    };

    let len = kind.frame_len();
    if remaining.len() < len {
        return FrameOutcome::Truncated(kind);
    }

    let body = &remaining[1..len];
    let frame = match kind {
        FrameKind::HighRes => Frame::HighRes(parse_high(body)),
        FrameKind::LowRes => Frame::LowRes(parse_low(body)),
    };
    FrameOutcome::Decoded {
        frame,
        consumed: len,
    }
}

/// Bookkeeping for one pass over a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeStats {
    pub total_bytes: usize,
    pub high_frames: usize,
    pub low_frames: usize,
    /// Bytes skipped while resynchronising (includes truncated headers).
    pub skipped_bytes: usize,
    /// Recognised headers whose body ran past the end of the buffer.
    pub truncated_frames: usize,
}

/// Iterator over the complete frames of a buffer, resynchronising on garbage.
pub struct Frames<'a> {
    buf: &'a [u8],
    cursor: usize,
    stats: DecodeStats,
}

impl<'a> Frames<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            cursor: 0,
            stats: DecodeStats {
                total_bytes: buf.len(),
                ..DecodeStats::default()
            },
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        while self.cursor < self.buf.len() {
            let outcome = read_frame(self.buf, self.cursor);
            self.cursor += outcome.advance();
            match outcome {
                FrameOutcome::Decoded { frame, .. } => {
                    match frame {
                        Frame::HighRes(_) => self.stats.high_frames += 1,
                        Frame::LowRes(_) => self.stats.low_frames += 1,
                    }
                    return Some(frame);
                }
                FrameOutcome::Unrecognized => self.stats.skipped_bytes += 1,
                FrameOutcome::Truncated(_) => {
                    self.stats.skipped_bytes += 1;
                    self.stats.truncated_frames += 1;
                }
            }
        }
        None
    }
}

/// Decoded and scaled sample sequences for one recording.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DecodedStream {
    pub high_rate: Vec<HighRateSample>,
    pub low_rate: Vec<LowRateSample>,
    pub stats: DecodeStats,
}

/// Decode a whole recording. Timestamps are `index × period` per tier.
pub fn decode(buf: &[u8], sensitivity: &Sensitivity, rates: &SampleRates) -> DecodedStream {
    let high_dt = rates.high_period();
    let low_dt = rates.low_period();

    let mut high_rate = Vec::with_capacity(buf.len() / HIGHRES_FRAME_LEN);
    let mut low_rate = Vec::new();

    let mut frames = Frames::new(buf);
    for frame in frames.by_ref() {
        match frame {
            Frame::HighRes(raw) => {
                let t = high_rate.len() as f64 * high_dt;
                high_rate.push(sensitivity.scale_high(&raw, t));
            }
            Frame::LowRes(raw) => {
                let t = low_rate.len() as f64 * low_dt;
                low_rate.push(sensitivity.scale_low(&raw, t));
            }
        }
    }

    let stats = frames.stats();
    debug!(
        "decoded {} bytes: {} high-rate, {} low-rate frames",
        stats.total_bytes, stats.high_frames, stats.low_frames
    );
    if stats.skipped_bytes > 0 {
        warn!("resync skipped {} bytes", stats.skipped_bytes);
    }
    if stats.truncated_frames > 0 {
        warn!("dropped {} truncated frame(s)", stats.truncated_frames);
    }

    DecodedStream {
        high_rate,
        low_rate,
        stats,
    }
}
