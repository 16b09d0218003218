//! The decoder façade: codec resolution, accumulation epochs, retrieval.

use evcam_codecs::DecoderFactory;

use crate::accumulator::{Accumulate, Accumulator};
use crate::error::DecodeError;
use crate::events::{EventCd, EventExtTrig};
use crate::unique::UniqueAccumulator;

/// Factor applied to sensor time before events are stored. Sensor time is
/// in microseconds and stays in microseconds.
pub const OUTPUT_TIME_MULTIPLIER: u32 = 1;

/// Decoder façade over one accumulation strategy.
///
/// Owns a codec cache (one instance per `(encoding, width, height)`) and
/// one accumulator. Every decode call opens a fresh accumulation epoch:
/// whatever the previous epoch buffered and nobody retrieved is
/// discarded. Retrieval moves buffers out without copying; a second
/// retrieval in the same epoch returns empty data. The cumulative ON/OFF
/// and rising/falling counters survive every epoch.
///
/// The façade is single-threaded by design; wrap it in a lock to share
/// it across threads.
pub struct Decoder<A: Accumulate = Accumulator> {
    factory: DecoderFactory<A>,
    accumulator: A,
    start_time: u64,
}

/// Façade over the spatially de-duplicating accumulator. Constructed
/// with `UniqueDecoder::default()`.
pub type UniqueDecoder = Decoder<UniqueAccumulator>;

impl<A: Accumulate> Default for Decoder<A> {
    fn default() -> Self {
        Self {
            factory: DecoderFactory::new(),
            accumulator: A::default(),
            start_time: 0,
        }
    }
}

impl Decoder<Accumulator> {
    /// Creates a façade with the plain accumulation strategy.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<A: Accumulate> Decoder<A> {
    /// Decodes an entire buffer of encoded events.
    ///
    /// Resolves (or lazily constructs) the codec for the key, opens a
    /// fresh accumulation epoch, and feeds the whole buffer through the
    /// codec into the accumulator. On error nothing is decoded and
    /// previously buffered events are untouched.
    pub fn decode(
        &mut self,
        encoding: &str,
        width: u16,
        height: u16,
        time_base: u64,
        buf: &[u8],
    ) -> Result<(), DecodeError> {
        let codec = self
            .factory
            .get_instance(encoding, width, height)
            .ok_or_else(|| DecodeError::UnknownEncoding(encoding.to_string()))?;
        self.accumulator.initialize(width, height)?;
        self.accumulator.reset_stored_events();
        codec.set_time_base(time_base);
        codec.set_time_multiplier(OUTPUT_TIME_MULTIPLIER);
        if codec.has_sensor_time_since_epoch() && self.start_time == 0 {
            self.start_time = time_base;
        }
        codec.decode(buf, &mut self.accumulator);
        Ok(())
    }

    /// Bounded decode: stops before the first event whose time would
    /// reach `until_time` (exclusive).
    ///
    /// Returns `Some(next_time)` when the limit was reached and `None`
    /// when the buffer was consumed first. The codec keeps its parse
    /// position between bounded calls, so repeated calls with a raised
    /// limit walk one buffer to exhaustion. Accumulation still restarts
    /// on every call; retrieve events between calls or lose them.
    pub fn decode_until(
        &mut self,
        encoding: &str,
        width: u16,
        height: u16,
        time_base: u64,
        buf: &[u8],
        until_time: u64,
    ) -> Result<Option<u64>, DecodeError> {
        let codec = self
            .factory
            .get_instance(encoding, width, height)
            .ok_or_else(|| DecodeError::UnknownEncoding(encoding.to_string()))?;
        self.accumulator.initialize(width, height)?;
        self.accumulator.reset_stored_events();
        codec.set_time_base(time_base);
        codec.set_time_multiplier(OUTPUT_TIME_MULTIPLIER);
        if codec.has_sensor_time_since_epoch() && self.start_time == 0 {
            self.start_time = time_base;
        }
        Ok(codec.decode_until(buf, &mut self.accumulator, until_time))
    }

    /// Scans for the first sensor time in the buffer without opening an
    /// accumulation epoch or disturbing the codec's decode state.
    pub fn find_first_sensor_time(
        &mut self,
        encoding: &str,
        width: u16,
        height: u16,
        buf: &[u8],
    ) -> Result<Option<u64>, DecodeError> {
        let codec = self
            .factory
            .get_instance(encoding, width, height)
            .ok_or_else(|| DecodeError::UnknownEncoding(encoding.to_string()))?;
        Ok(codec.find_first_sensor_time(buf))
    }

    /// Start-time offset for sensors that report time since the Unix
    /// epoch; zero for sensors timed from power-up.
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Moves the decoded CD events out; empty on a second call.
    pub fn take_cd_events(&mut self) -> Vec<EventCd> {
        self.accumulator.take_cd_events()
    }

    /// Moves the decoded trigger events out; empty on a second call.
    pub fn take_ext_trig_events(&mut self) -> Vec<EventExtTrig> {
        self.accumulator.take_ext_trig_events()
    }

    /// Moves the decoded CD packets out, oldest first; empty on a second
    /// call.
    pub fn take_cd_event_packets(&mut self) -> Vec<Vec<EventCd>> {
        self.accumulator.take_cd_event_packets()
    }

    /// Moves the decoded trigger packets out; empty on a second call.
    pub fn take_ext_trig_event_packets(&mut self) -> Vec<Vec<EventExtTrig>> {
        self.accumulator.take_ext_trig_event_packets()
    }

    /// Cumulative number of ON events decoded by this façade.
    pub fn num_cd_on(&self) -> u64 {
        self.accumulator.num_cd_on()
    }

    /// Cumulative number of OFF events.
    pub fn num_cd_off(&self) -> u64 {
        self.accumulator.num_cd_off()
    }

    /// Cumulative number of rising-edge trigger events.
    pub fn num_trigger_rising(&self) -> u64 {
        self.accumulator.num_trigger_rising()
    }

    /// Cumulative number of falling-edge trigger events.
    pub fn num_trigger_falling(&self) -> u64 {
        self.accumulator.num_trigger_falling()
    }
}
