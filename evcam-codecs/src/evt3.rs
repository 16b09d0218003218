#![allow(clippy::unusual_byte_groupings)]
//! EVT 3.0 decoder.
//!
//! EVT 3.0 encodes events as 16-bit little-endian words with a 4-bit type
//! field in the MSBs. Coordinates, polarity, and timestamp are carried by
//! separate words; the decoder tracks that state across words and reports
//! complete events through the [`EventSink`] callbacks.

use crate::decoder::{reached, EventDecoder};
use crate::sink::EventSink;

/// Constants for timestamp handling.
const MAX_TIMESTAMP_BASE: u64 = ((1u64 << 12) - 1) << 12; // 16773120us
const TIME_LOOP: u64 = MAX_TIMESTAMP_BASE + (1 << 12); // 16777216us
const LOOP_THRESHOLD: u64 = 10 << 12;

/// EVT 3.0 word types (bits 15:12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum WordType {
    /// Y coordinate and system type (0x0)
    AddrY = 0x0,
    /// Single valid event with X coordinate and polarity (0x2)
    AddrX = 0x2,
    /// Base X coordinate for subsequent vector events (0x3)
    VectBaseX = 0x3,
    /// Vector event with 12 validity bits (0x4)
    Vect12 = 0x4,
    /// Vector event with 8 validity bits (0x5)
    Vect8 = 0x5,
    /// Lower 12 bits of the timestamp (0x6)
    TimeLow = 0x6,
    /// Continued event with 4 bits of data (0x7)
    Continued4 = 0x7,
    /// Upper 12 bits of the timestamp (0x8)
    TimeHigh = 0x8,
    /// External trigger event (0xA)
    ExtTrigger = 0xA,
    /// Extension event type (0xE)
    Others = 0xE,
    /// Continued event with 12 bits of data (0xF)
    Continued12 = 0xF,
}

impl WordType {
    #[inline]
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::AddrY),
            0x2 => Some(Self::AddrX),
            0x3 => Some(Self::VectBaseX),
            0x4 => Some(Self::Vect12),
            0x5 => Some(Self::Vect8),
            0x6 => Some(Self::TimeLow),
            0x7 => Some(Self::Continued4),
            0x8 => Some(Self::TimeHigh),
            0xA => Some(Self::ExtTrigger),
            0xE => Some(Self::Others),
            0xF => Some(Self::Continued12),
            _ => None,
        }
    }
}

// Field extraction. Payloads sit in the low 12 bits of each word.

#[inline]
fn get_event_type(word: u16) -> u8 {
    ((word >> 12) & 0xF) as u8
}

#[inline]
fn addr_y_get_y(word: u16) -> u16 {
    word & 0x07FF // bits 10:0
}

#[inline]
fn addr_x_get_x(word: u16) -> u16 {
    word & 0x07FF // bits 10:0
}

#[inline]
fn addr_x_get_polarity(word: u16) -> u8 {
    ((word >> 11) & 0x1) as u8 // bit 11
}

#[inline]
fn vect_base_x_get_x(word: u16) -> u16 {
    word & 0x07FF
}

#[inline]
fn vect_base_x_get_polarity(word: u16) -> u8 {
    ((word >> 11) & 0x1) as u8
}

#[inline]
fn vect_12_get_valid(word: u16) -> u16 {
    word & 0x0FFF // bits 11:0
}

#[inline]
fn vect_8_get_valid(word: u16) -> u8 {
    (word & 0x00FF) as u8 // bits 7:0
}

#[inline]
fn time_get_value(word: u16) -> u16 {
    word & 0x0FFF // bits 11:0
}

#[inline]
fn ext_trigger_get_id(word: u16) -> u8 {
    ((word >> 8) & 0x0F) as u8 // bits 11:8
}

#[inline]
fn ext_trigger_get_value(word: u16) -> u8 {
    (word & 0x01) as u8 // bit 0
}

/// Stateful EVT 3.0 decoder.
///
/// Words preceding the first TIME_HIGH of a stream are skipped, since
/// their time base is undefined. Wrap-arounds of the 12-bit TIME_HIGH
/// counter are detected and unrolled into a monotonically increasing
/// 64-bit timestamp.
#[derive(Debug)]
pub struct Evt3Decoder {
    // Timestamp state
    time_base: u64,
    time_low: u64,
    current_time: u64,
    n_time_high_loops: u64,
    first_time_base_set: bool,

    // Address state shared between words
    current_y: u16,
    current_base_x: u16,
    current_polarity: u8,

    // Output scaling and bounded-decode position
    time_multiplier: u64,
    resume_word: usize,
}

impl Default for Evt3Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Evt3Decoder {
    pub fn new() -> Self {
        Self {
            time_base: 0,
            time_low: 0,
            current_time: 0,
            n_time_high_loops: 0,
            first_time_base_set: false,
            current_y: 0,
            current_base_x: 0,
            current_polarity: 0,
            time_multiplier: 1,
            resume_word: 0,
        }
    }

    /// The stream carries absolute sensor time, so the base is ignored.
    pub fn set_time_base(&mut self, _time_base: u64) {}

    /// Sets the factor applied to sensor time before events are reported.
    pub fn set_time_multiplier(&mut self, multiplier: u32) {
        self.time_multiplier = multiplier as u64;
    }

    pub fn has_sensor_time_since_epoch(&self) -> bool {
        false
    }

    /// Decodes an entire buffer, reporting events to `sink`.
    pub fn decode<S: EventSink>(&mut self, buf: &[u8], sink: &mut S) {
        self.process_words(buf, sink, 0, None);
        self.resume_word = 0;
        sink.finished();
    }

    /// Decodes until the first event whose time would reach `until_time`;
    /// see [`EventDecoder::decode_until`] for the full contract.
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

    /// Returns the scaled time of the first TIME_HIGH word in the buffer.
    pub fn find_first_sensor_time(&self, buf: &[u8]) -> Option<u64> {
        for chunk in buf.chunks_exact(2) {
            let word = u16::from_le_bytes([chunk[0], chunk[1]]);
            if get_event_type(word) == WordType::TimeHigh as u8 {
                return Some(((time_get_value(word) as u64) << 12) * self.time_multiplier);
            }
        }
        None
    }

    #[inline]
    fn output_time(&self) -> u64 {
        self.current_time * self.time_multiplier
    }

    /// Processes a TIME_HIGH word with wrap-around detection.
    #[inline]
    fn process_time_high(&mut self, word: u16) {
        let time_val = time_get_value(word);
        let mut new_time_base = ((time_val as u64) << 12) + self.n_time_high_loops * TIME_LOOP;

        // Detect a wrap of the 12-bit TIME_HIGH counter.
        if self.time_base > new_time_base
            && (self.time_base - new_time_base) >= (MAX_TIMESTAMP_BASE - LOOP_THRESHOLD)
        {
            new_time_base += TIME_LOOP;
            self.n_time_high_loops += 1;
        }

        self.time_base = new_time_base;
        self.current_time = self.time_base;
    }

    /// Expands a VECT_12 or VECT_8 validity mask into CD events.
    #[inline]
    fn process_vector_events<S: EventSink>(
        &mut self,
        mut valid: u32,
        count: u16,
        time: u64,
        sink: &mut S,
    ) {
        let end_x = self.current_base_x + count;

        for x in self.current_base_x..end_x {
            if valid & 0x1 != 0 {
                sink.cd_event(time, x, self.current_y, self.current_polarity);
            }
            valid >>= 1;
        }

        self.current_base_x = end_x;
    }

    /// Walks the buffer from word index `start`, stopping before the first
    /// event that would reach `until`. Returns the stopping word index and
    /// time, or `None` once the end of the buffer is reached.
    ///
    /// Re-processing the stopping word on a later call is harmless: the
    /// limit check runs before any event is emitted, and a TIME_HIGH word
    /// equal to the committed time base never counts as a second wrap.
    fn process_words<S: EventSink>(
        &mut self,
        buf: &[u8],
        sink: &mut S,
        start: usize,
        until: Option<u64>,
    ) -> Option<(usize, u64)> {
        let skip = (start * 2).min(buf.len());
        for (offset, chunk) in buf[skip..].chunks_exact(2).enumerate() {
            let word = u16::from_le_bytes([chunk[0], chunk[1]]);
            let index = start + offset;

            // Skip until the first TIME_HIGH establishes the time base.
            if !self.first_time_base_set {
                if get_event_type(word) == WordType::TimeHigh as u8 {
                    self.time_base = (time_get_value(word) as u64) << 12;
                    self.current_time = self.time_base;
                    self.first_time_base_set = true;
                    let t = self.output_time();
                    if reached(t, until) {
                        return Some((index, t));
                    }
                }
                continue;
            }

            match WordType::from_u8(get_event_type(word)) {
                Some(WordType::AddrX) => {
                    let t = self.output_time();
                    if reached(t, until) {
                        return Some((index, t));
                    }
                    sink.cd_event(
                        t,
                        addr_x_get_x(word),
                        self.current_y,
                        addr_x_get_polarity(word),
                    );
                }

                Some(WordType::Vect12) => {
                    let t = self.output_time();
                    if reached(t, until) {
                        return Some((index, t));
                    }
                    self.process_vector_events(vect_12_get_valid(word) as u32, 12, t, sink);
                }

                Some(WordType::Vect8) => {
                    let t = self.output_time();
                    if reached(t, until) {
                        return Some((index, t));
                    }
                    self.process_vector_events(vect_8_get_valid(word) as u32, 8, t, sink);
                }

                Some(WordType::AddrY) => {
                    self.current_y = addr_y_get_y(word);
                }

                Some(WordType::VectBaseX) => {
                    self.current_base_x = vect_base_x_get_x(word);
                    self.current_polarity = vect_base_x_get_polarity(word);
                }

                Some(WordType::TimeHigh) => {
                    self.process_time_high(word);
                    let t = self.output_time();
                    if reached(t, until) {
                        return Some((index, t));
                    }
                }

                Some(WordType::TimeLow) => {
                    self.time_low = time_get_value(word) as u64;
                    self.current_time = self.time_base + self.time_low;
                    let t = self.output_time();
                    if reached(t, until) {
                        return Some((index, t));
                    }
                }

                Some(WordType::ExtTrigger) => {
                    let t = self.output_time();
                    if reached(t, until) {
                        return Some((index, t));
                    }
                    sink.ext_trigger_event(t, ext_trigger_get_value(word), ext_trigger_get_id(word));
                }

                Some(WordType::Continued4)
                | Some(WordType::Others)
                | Some(WordType::Continued12) => {
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

impl<S: EventSink> EventDecoder<S> for Evt3Decoder {
    fn set_time_base(&mut self, time_base: u64) {
        Evt3Decoder::set_time_base(self, time_base);
    }

    fn set_time_multiplier(&mut self, multiplier: u32) {
        Evt3Decoder::set_time_multiplier(self, multiplier);
    }

    fn has_sensor_time_since_epoch(&self) -> bool {
        Evt3Decoder::has_sensor_time_since_epoch(self)
    }

    fn decode(&mut self, buf: &[u8], sink: &mut S) {
        Evt3Decoder::decode(self, buf, sink);
    }

    fn decode_until(&mut self, buf: &[u8], sink: &mut S, until_time: u64) -> Option<u64> {
        Evt3Decoder::decode_until(self, buf, sink, until_time)
    }

    fn find_first_sensor_time(&self, buf: &[u8]) -> Option<u64> {
        Evt3Decoder::find_first_sensor_time(self, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::Collector;

    fn bytes(words: &[u16]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_word_field_extraction() {
        // type=2 (ADDR_X), polarity=1, x=300
        let word: u16 = 0b0010_1_00100101100;
        assert_eq!(get_event_type(word), 0x2);
        assert_eq!(addr_x_get_x(word), 300);
        assert_eq!(addr_x_get_polarity(word), 1);

        // type=4 (VECT_12), valid=0b101010101010
        let vect: u16 = 0b0100_101010101010;
        assert_eq!(get_event_type(vect), 0x4);
        assert_eq!(vect_12_get_valid(vect), 0b101010101010);

        // type=A (EXT_TRIGGER), id=2, value=1
        let trigger: u16 = 0b1010_0010_0000000_1;
        assert_eq!(ext_trigger_get_id(trigger), 2);
        assert_eq!(ext_trigger_get_value(trigger), 1);
    }

    #[test]
    fn test_decode_simple_sequence() {
        let mut decoder = Evt3Decoder::new();
        let mut sink = Collector::default();

        // TIME_HIGH 0, TIME_LOW 100, ADDR_Y 50, ADDR_X x=100 pol=1
        let buf = bytes(&[0x8000, 0x6064, 0x0032, 0x2864]);
        decoder.decode(&buf, &mut sink);

        assert_eq!(sink.cd, vec![(100, 100, 50, 1)]);
        assert_eq!(sink.finished_calls, 1);
    }

    #[test]
    fn test_decode_vector_events() {
        let mut decoder = Evt3Decoder::new();
        let mut sink = Collector::default();

        // TIME_HIGH 0, TIME_LOW 200, ADDR_Y 100, VECT_BASE_X x=0 pol=0,
        // VECT_12 valid=0b111000111000
        let buf = bytes(&[0x8000, 0x60C8, 0x0064, 0x3000, 0x4E38]);
        decoder.decode(&buf, &mut sink);

        let xs: Vec<u16> = sink.cd.iter().map(|&(_, x, _, _)| x).collect();
        assert_eq!(xs, vec![3, 4, 5, 9, 10, 11]);
        for &(t, _, y, p) in &sink.cd {
            assert_eq!((t, y, p), (200, 100, 0));
        }
    }

    #[test]
    fn test_words_before_first_time_high_are_skipped() {
        let mut decoder = Evt3Decoder::new();
        let mut sink = Collector::default();

        // ADDR_Y/ADDR_X before any TIME_HIGH must not produce events.
        let buf = bytes(&[0x0032, 0x2864, 0x8000, 0x6001, 0x0032, 0x2864]);
        decoder.decode(&buf, &mut sink);

        assert_eq!(sink.cd, vec![(1, 100, 50, 1)]);
    }

    #[test]
    fn test_time_high_wrap_detection() {
        let mut decoder = Evt3Decoder::new();
        let mut sink = Collector::default();

        // Top of the 12-bit TIME_HIGH range, then a wrap to zero.
        let buf = bytes(&[0x8FFF, 0x6000, 0x0001, 0x2002, 0x8000, 0x6000, 0x0001, 0x2002]);
        decoder.decode(&buf, &mut sink);

        assert_eq!(sink.cd.len(), 2);
        assert_eq!(sink.cd[0].0, MAX_TIMESTAMP_BASE);
        assert_eq!(sink.cd[1].0, TIME_LOOP);
        assert!(sink.cd[1].0 > sink.cd[0].0);
    }

    #[test]
    fn test_trigger_events() {
        let mut decoder = Evt3Decoder::new();
        let mut sink = Collector::default();

        // TIME_HIGH 0, TIME_LOW 5, EXT_TRIGGER id=3 value=1
        let buf = bytes(&[0x8000, 0x6005, 0xA301]);
        decoder.decode(&buf, &mut sink);

        assert_eq!(sink.triggers, vec![(5, 1, 3)]);
    }

    #[test]
    fn test_decode_until_stops_before_the_limit() {
        let mut decoder = Evt3Decoder::new();
        let mut sink = Collector::default();

        // Events at t=10 and t=20.
        let buf = bytes(&[0x8000, 0x600A, 0x0005, 0x2001, 0x6014, 0x2002]);
        let next = decoder.decode_until(&buf, &mut sink, 20);

        assert_eq!(next, Some(20));
        assert_eq!(sink.cd, vec![(10, 1, 5, 0)]);
        assert_eq!(sink.finished_calls, 0);
    }

    #[test]
    fn test_decode_until_resumes_where_it_stopped() {
        let mut decoder = Evt3Decoder::new();
        let mut sink = Collector::default();

        let buf = bytes(&[
            0x8000, 0x600A, 0x0005, 0x2001, 0x6014, 0x2002, 0x601E, 0x2003,
        ]);
        assert_eq!(decoder.decode_until(&buf, &mut sink, 20), Some(20));
        assert_eq!(sink.cd.len(), 1);

        // The second call picks up at the stopping word.
        assert_eq!(decoder.decode_until(&buf, &mut sink, 1_000), None);
        assert_eq!(sink.cd, vec![(10, 1, 5, 0), (20, 2, 5, 0), (30, 3, 5, 0)]);
        assert_eq!(sink.finished_calls, 1);
    }

    #[test]
    fn test_find_first_sensor_time() {
        let decoder = Evt3Decoder::new();

        let buf = bytes(&[0x2864, 0x8005, 0x6000]);
        assert_eq!(decoder.find_first_sensor_time(&buf), Some(5 << 12));

        let no_time = bytes(&[0x2864, 0x0032]);
        assert_eq!(decoder.find_first_sensor_time(&no_time), None);
    }

    #[test]
    fn test_time_multiplier_scales_reported_times() {
        let mut decoder = Evt3Decoder::new();
        decoder.set_time_multiplier(1_000);
        let mut sink = Collector::default();

        let buf = bytes(&[0x8000, 0x6064, 0x0032, 0x2864]);
        decoder.decode(&buf, &mut sink);

        assert_eq!(sink.cd, vec![(100_000, 100, 50, 1)]);
    }

    #[test]
    fn test_odd_trailing_byte_is_ignored() {
        let mut decoder = Evt3Decoder::new();
        let mut sink = Collector::default();

        let mut buf = bytes(&[0x8000, 0x6064, 0x0032, 0x2864]);
        buf.push(0xAB);
        decoder.decode(&buf, &mut sink);

        assert_eq!(sink.cd.len(), 1);
    }
}
