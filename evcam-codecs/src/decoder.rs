//! The decoder contract shared by all codecs.

use crate::sink::EventSink;

/// A stateful decoder for one event-camera wire format.
///
/// The trait is generic over the sink so that per-event callbacks
/// dispatch statically; only codec selection (see [`DecoderFactory`])
/// goes through a trait object.
///
/// [`DecoderFactory`]: crate::factory::DecoderFactory
pub trait EventDecoder<S: EventSink> {
    /// Sets the caller's reference time base. EVT 2.0 and EVT 3.0 streams
    /// carry absolute sensor time in-stream, so those codecs ignore it.
    fn set_time_base(&mut self, time_base: u64);

    /// Sets the factor applied to sensor time before events are reported
    /// (1 keeps microseconds).
    fn set_time_multiplier(&mut self, multiplier: u32);

    /// True if the sensor reports time since the Unix epoch rather than
    /// since power-up.
    fn has_sensor_time_since_epoch(&self) -> bool;

    /// Decodes the whole buffer, reporting every event to `sink` and
    /// calling `sink.finished()` at the end.
    fn decode(&mut self, buf: &[u8], sink: &mut S);

    /// Decodes until the first event whose time would reach `until_time`.
    ///
    /// Returns `Some(next_time)` when the limit was hit; the stopping word
    /// is left unconsumed and the next `decode_until` call on the same
    /// buffer resumes there. Returns `None` when the buffer was fully
    /// consumed without reaching the limit; the parse position is re-armed
    /// to the start and `sink.finished()` is called.
    fn decode_until(&mut self, buf: &[u8], sink: &mut S, until_time: u64) -> Option<u64>;

    /// Scans for the first time marker in the buffer without touching the
    /// decode state. `None` if the buffer holds no time marker.
    fn find_first_sensor_time(&self, buf: &[u8]) -> Option<u64>;
}

/// True when a bounded decode has hit its exclusive time limit.
#[inline]
pub(crate) fn reached(time: u64, until: Option<u64>) -> bool {
    match until {
        Some(limit) => time >= limit,
        None => false,
    }
}
