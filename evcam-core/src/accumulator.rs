//! Event accumulation with move-out retrieval.

use evcam_codecs::EventSink;

use crate::error::DecodeError;
use crate::events::{EventCd, EventExtTrig};

/// Accumulation strategy driven by the decoder façade.
///
/// An implementation is an [`EventSink`] plus the buffer lifecycle: every
/// decode call opens a fresh accumulation epoch, retrieval moves buffers
/// out and leaves the accumulator empty, and the cumulative event
/// counters survive every epoch.
pub trait Accumulate: EventSink + Default {
    /// Prepares the accumulator for a sensor geometry. Called by the
    /// façade before every decode.
    fn initialize(&mut self, width: u16, height: u16) -> Result<(), DecodeError>;

    /// Discards all buffered events and opens a fresh accumulation epoch.
    fn reset_stored_events(&mut self);

    /// Moves the buffered CD events out. Returns an empty buffer on the
    /// second call of an epoch.
    fn take_cd_events(&mut self) -> Vec<EventCd>;

    /// Moves the buffered trigger events out; empty on the second call.
    fn take_ext_trig_events(&mut self) -> Vec<EventExtTrig>;

    /// Moves the buffered CD packets out, oldest first; empty on the
    /// second call. Only packetizing strategies produce packets.
    fn take_cd_event_packets(&mut self) -> Vec<Vec<EventCd>>;

    /// Moves the buffered trigger packets out; empty on the second call.
    fn take_ext_trig_event_packets(&mut self) -> Vec<Vec<EventExtTrig>>;

    /// Cumulative number of ON events seen by this accumulator.
    fn num_cd_on(&self) -> u64;

    /// Cumulative number of OFF events.
    fn num_cd_off(&self) -> u64;

    /// Cumulative number of rising-edge trigger events.
    fn num_trigger_rising(&self) -> u64;

    /// Cumulative number of falling-edge trigger events.
    fn num_trigger_falling(&self) -> u64;
}

/// The plain accumulation strategy: every event of an epoch goes into one
/// growing buffer per event kind.
///
/// Fresh epoch buffers are pre-reserved to the largest length previously
/// observed for their kind, which amortizes reallocation across repeated
/// decode cycles.
#[derive(Debug, Default)]
pub struct Accumulator {
    num_cd: [u64; 2],
    num_ext_trig: [u64; 2],
    cd_events: Option<Vec<EventCd>>,
    ext_trig_events: Option<Vec<EventExtTrig>>,
    max_size_cd: usize,
    max_size_ext_trig: usize,
}

impl EventSink for Accumulator {
    fn cd_event(&mut self, sensor_time: u64, x: u16, y: u16, polarity: u8) {
        let events = self.cd_events.get_or_insert_with(Vec::new);
        events.push(EventCd::new(x, y, polarity as i8, sensor_time as i32));
        self.max_size_cd = self.max_size_cd.max(events.len());
        self.num_cd[polarity.min(1) as usize] += 1;
    }

    fn ext_trigger_event(&mut self, sensor_time: u64, edge: u8, id: u8) {
        let events = self.ext_trig_events.get_or_insert_with(Vec::new);
        events.push(EventExtTrig::new(edge as i16, sensor_time as i64, id as i16));
        self.max_size_ext_trig = self.max_size_ext_trig.max(events.len());
        self.num_ext_trig[edge.min(1) as usize] += 1;
    }
}

impl Accumulate for Accumulator {
    fn initialize(&mut self, _width: u16, _height: u16) -> Result<(), DecodeError> {
        Ok(())
    }

    fn reset_stored_events(&mut self) {
        // Any buffer nobody retrieved is dropped here.
        self.cd_events = Some(Vec::with_capacity(self.max_size_cd));
        self.ext_trig_events = Some(Vec::with_capacity(self.max_size_ext_trig));
    }

    fn take_cd_events(&mut self) -> Vec<EventCd> {
        self.cd_events.take().unwrap_or_default()
    }

    fn take_ext_trig_events(&mut self) -> Vec<EventExtTrig> {
        self.ext_trig_events.take().unwrap_or_default()
    }

    fn take_cd_event_packets(&mut self) -> Vec<Vec<EventCd>> {
        Vec::new()
    }

    fn take_ext_trig_event_packets(&mut self) -> Vec<Vec<EventExtTrig>> {
        Vec::new()
    }

    fn num_cd_on(&self) -> u64 {
        self.num_cd[1]
    }

    fn num_cd_off(&self) -> u64 {
        self.num_cd[0]
    }

    fn num_trigger_rising(&self) -> u64 {
        self.num_ext_trig[1]
    }

    fn num_trigger_falling(&self) -> u64 {
        self.num_ext_trig[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_append_in_order_and_count() {
        let mut acc = Accumulator::default();
        acc.reset_stored_events();
        acc.cd_event(100, 10, 20, 1);
        acc.cd_event(101, 11, 21, 0);
        acc.cd_event(102, 12, 22, 1);
        acc.ext_trigger_event(103, 1, 0);

        assert_eq!(acc.num_cd_on(), 2);
        assert_eq!(acc.num_cd_off(), 1);
        assert_eq!(acc.num_trigger_rising(), 1);
        assert_eq!(acc.num_trigger_falling(), 0);

        let events = acc.take_cd_events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], EventCd::new(10, 20, 1, 100));
        assert_eq!(events[2], EventCd::new(12, 22, 1, 102));
    }

    #[test]
    fn test_take_is_empty_on_second_call() {
        let mut acc = Accumulator::default();
        acc.reset_stored_events();
        acc.cd_event(1, 2, 3, 1);
        acc.ext_trigger_event(2, 1, 0);

        assert_eq!(acc.take_cd_events().len(), 1);
        assert!(acc.take_cd_events().is_empty());
        assert_eq!(acc.take_ext_trig_events().len(), 1);
        assert!(acc.take_ext_trig_events().is_empty());
    }

    #[test]
    fn test_counters_survive_reset_and_take() {
        let mut acc = Accumulator::default();
        acc.reset_stored_events();
        acc.cd_event(1, 2, 3, 1);
        acc.take_cd_events();
        acc.reset_stored_events();
        acc.cd_event(2, 2, 3, 0);

        assert_eq!(acc.num_cd_on(), 1);
        assert_eq!(acc.num_cd_off(), 1);
    }

    #[test]
    fn test_reset_discards_unretrieved_events() {
        let mut acc = Accumulator::default();
        acc.reset_stored_events();
        acc.cd_event(1, 2, 3, 1);
        acc.reset_stored_events();

        assert!(acc.take_cd_events().is_empty());
    }

    #[test]
    fn test_reset_preserves_high_water_capacity() {
        let mut acc = Accumulator::default();
        acc.reset_stored_events();
        for i in 0..100 {
            acc.cd_event(i, 0, 0, 1);
        }
        acc.take_cd_events();
        acc.reset_stored_events();

        assert!(acc.cd_events.as_ref().is_some_and(|v| v.capacity() >= 100));
    }

    #[test]
    fn test_events_accepted_before_first_reset() {
        let mut acc = Accumulator::default();
        acc.cd_event(1, 2, 3, 1);

        assert_eq!(acc.take_cd_events().len(), 1);
    }

    #[test]
    fn test_out_of_range_polarity_counts_as_on() {
        let mut acc = Accumulator::default();
        acc.reset_stored_events();
        acc.cd_event(1, 0, 0, 7);

        assert_eq!(acc.num_cd_on(), 1);
        assert_eq!(acc.num_cd_off(), 0);
    }

    #[test]
    fn test_packet_retrieval_is_empty_for_this_strategy() {
        let mut acc = Accumulator::default();
        acc.reset_stored_events();
        acc.cd_event(1, 2, 3, 1);

        assert!(acc.take_cd_event_packets().is_empty());
        assert!(acc.take_ext_trig_event_packets().is_empty());
    }
}
