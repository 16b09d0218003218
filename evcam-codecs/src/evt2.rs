//! EVT 2.0 decoder.
//!
//! EVT 2.0 encodes events as self-contained 32-bit little-endian words: a
//! 4-bit type code, the six time LSBs inside each event word, and a 28-bit
//! TIME_HIGH word carrying the upper timestamp bits.

use crate::decoder::{reached, EventDecoder};
use crate::sink::EventSink;

const MAX_TIMESTAMP_BASE: u64 = ((1u64 << 28) - 1) << 6;
const TIME_LOOP: u64 = MAX_TIMESTAMP_BASE + (1 << 6);
const LOOP_THRESHOLD: u64 = 10 << 6;

/// EVT 2.0 word types (bits 31:28). The CD type code doubles as the
/// event polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum WordType {
    CdOff = 0x0,
    CdOn = 0x1,
    TimeHigh = 0x8,
    ExtTrigger = 0xA,
    Others = 0xE,
    Continued = 0xF,
}

impl WordType {
    #[inline]
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::CdOff),
            0x1 => Some(Self::CdOn),
            0x8 => Some(Self::TimeHigh),
            0xA => Some(Self::ExtTrigger),
            0xE => Some(Self::Others),
            0xF => Some(Self::Continued),
            _ => None,
        }
    }
}

#[inline]
fn get_event_type(word: u32) -> u8 {
    ((word >> 28) & 0xF) as u8
}

/// Six time LSBs, present in CD and trigger words (bits 27:22).
#[inline]
fn get_timestamp(word: u32) -> u32 {
    (word >> 22) & 0x3F
}

#[inline]
fn cd_get_x(word: u32) -> u16 {
    ((word >> 11) & 0x7FF) as u16 // bits 21:11
}

#[inline]
fn cd_get_y(word: u32) -> u16 {
    (word & 0x7FF) as u16 // bits 10:0
}

#[inline]
fn time_high_get_value(word: u32) -> u32 {
    word & 0x0FFF_FFFF // bits 27:0
}

#[inline]
fn ext_trigger_get_id(word: u32) -> u8 {
    ((word >> 8) & 0x1F) as u8 // bits 12:8
}

#[inline]
fn ext_trigger_get_value(word: u32) -> u8 {
    (word & 0x1) as u8 // bit 0
}

/// Stateful EVT 2.0 decoder.
///
/// Same stream conventions as the EVT 3.0 decoder: words before the first
/// TIME_HIGH are skipped and TIME_HIGH wrap-arounds are unrolled into a
/// monotonic 64-bit timestamp.
#[derive(Debug)]
pub struct Evt2Decoder {
    time_base: u64,
    n_time_high_loops: u64,
    first_time_base_set: bool,
    time_multiplier: u64,
    resume_word: usize,
}

impl Default for Evt2Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Evt2Decoder {
    pub fn new() -> Self {
        Self {
            time_base: 0,
            n_time_high_loops: 0,
            first_time_base_set: false,
            time_multiplier: 1,
            resume_word: 0,
        }
    }

    /// The stream carries absolute sensor time, so the base is ignored.
    pub fn set_time_base(&mut self, _time_base: u64) {}

    pub fn set_time_multiplier(&mut self, multiplier: u32) {
        self.time_multiplier = multiplier as u64;
    }

    pub fn has_sensor_time_since_epoch(&self) -> bool {
        false
    }

    pub fn decode<S: EventSink>(&mut self, buf: &[u8], sink: &mut S) {
        self.process_words(buf, sink, 0, None);
        self.resume_word = 0;
        sink.finished();
    }

    pub fn decode_until<S: EventSink>(
        &mut self,
        buf: &[u8],
        sink: &mut S,
        until_time: u64,
    ) -> Option<u64> {
        let start = self.resume_word;
        match self.process_words(buf, sink, start, Some(until_time)) {
            Some((word, next_time)) => {
                self.resume_word = word;
                Some(next_time)
            }
            None => {
                self.resume_word = 0;
                sink.finished();
                None
            }
        }
    }

    pub fn find_first_sensor_time(&self, buf: &[u8]) -> Option<u64> {
        for chunk in buf.chunks_exact(4) {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if get_event_type(word) == WordType::TimeHigh as u8 {
                return Some(((time_high_get_value(word) as u64) << 6) * self.time_multiplier);
            }
        }
        None
    }

    #[inline]
    fn process_time_high(&mut self, word: u32) {
        let mut new_time_base =
            ((time_high_get_value(word) as u64) << 6) + self.n_time_high_loops * TIME_LOOP;

        // Detect a wrap of the 28-bit TIME_HIGH counter.
        if self.time_base > new_time_base
            && (self.time_base - new_time_base) >= (MAX_TIMESTAMP_BASE - LOOP_THRESHOLD)
        {
            new_time_base += TIME_LOOP;
            self.n_time_high_loops += 1;
        }

        self.time_base = new_time_base;
    }

    /// Same walking contract as the EVT 3.0 engine: the stopping word is
    /// left for the next bounded call and may be re-processed safely.
    fn process_words<S: EventSink>(
        &mut self,
        buf: &[u8],
        sink: &mut S,
        start: usize,
        until: Option<u64>,
    ) -> Option<(usize, u64)> {
        let skip = (start * 4).min(buf.len());
        for (offset, chunk) in buf[skip..].chunks_exact(4).enumerate() {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let index = start + offset;

            if !self.first_time_base_set {
                if get_event_type(word) == WordType::TimeHigh as u8 {
                    self.time_base = (time_high_get_value(word) as u64) << 6;
                    self.first_time_base_set = true;
                    let t = self.time_base * self.time_multiplier;
                    if reached(t, until) {
                        return Some((index, t));
                    }
                }
                continue;
            }

            match WordType::from_u8(get_event_type(word)) {
                Some(WordType::CdOff) | Some(WordType::CdOn) => {
                    let t = (self.time_base + get_timestamp(word) as u64) * self.time_multiplier;
                    if reached(t, until) {
                        return Some((index, t));
                    }
                    sink.cd_event(t, cd_get_x(word), cd_get_y(word), get_event_type(word));
                }

                Some(WordType::TimeHigh) => {
                    self.process_time_high(word);
                    let t = self.time_base * self.time_multiplier;
                    if reached(t, until) {
                        return Some((index, t));
                    }
                }

                Some(WordType::ExtTrigger) => {
                    let t = (self.time_base + get_timestamp(word) as u64) * self.time_multiplier;
                    if reached(t, until) {
                        return Some((index, t));
                    }
                    sink.ext_trigger_event(t, ext_trigger_get_value(word), ext_trigger_get_id(word));
                }

                Some(WordType::Others) | Some(WordType::Continued) => {
                    // Not used for CD data, skipped.
                }

                None => {
                    // Reserved word type, skipped.
                }
            }
        }
        None
    }
}

impl<S: EventSink> EventDecoder<S> for Evt2Decoder {
    fn set_time_base(&mut self, time_base: u64) {
        Evt2Decoder::set_time_base(self, time_base);
    }

    fn set_time_multiplier(&mut self, multiplier: u32) {
        Evt2Decoder::set_time_multiplier(self, multiplier);
    }

    fn has_sensor_time_since_epoch(&self) -> bool {
        Evt2Decoder::has_sensor_time_since_epoch(self)
    }

    fn decode(&mut self, buf: &[u8], sink: &mut S) {
        Evt2Decoder::decode(self, buf, sink);
    }

    fn decode_until(&mut self, buf: &[u8], sink: &mut S, until_time: u64) -> Option<u64> {
        Evt2Decoder::decode_until(self, buf, sink, until_time)
    }

    fn find_first_sensor_time(&self, buf: &[u8]) -> Option<u64> {
        Evt2Decoder::find_first_sensor_time(self, buf)
    }
}
