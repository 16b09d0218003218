//! The sink contract a codec drives while parsing a buffer.

/// Receiver for decoded events.
///
/// A codec invokes these callbacks synchronously, in stream order, from
/// within a `decode` or `decode_until` call. None of the operations can
/// fail; an implementation must accept whatever the codec reports,
/// including coordinates outside the nominal sensor geometry.
pub trait EventSink {
    /// Called for every change-detection event.
    ///
    /// `sensor_time` is in output time units (sensor microseconds scaled
    /// by the configured time multiplier). `polarity` is 0 for OFF and 1
    /// for ON.
    fn cd_event(&mut self, sensor_time: u64, x: u16, y: u16, polarity: u8);

    /// Called for every external trigger event. `edge` is 0 for a falling
    /// and 1 for a rising edge; `id` is the trigger channel.
    fn ext_trigger_event(&mut self, sensor_time: u64, edge: u8, id: u8);

    /// Called once the end of the buffer has been reached.
    fn finished(&mut self) {}

    /// Hook for codecs that hand through unparsed raw chunks. The built-in
    /// codecs never call it.
    fn raw_data(&mut self, _bytes: &[u8]) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::EventSink;

    /// Records every callback for test assertions.
    #[derive(Debug, Default)]
    pub(crate) struct Collector {
        pub cd: Vec<(u64, u16, u16, u8)>,
        pub triggers: Vec<(u64, u8, u8)>,
        pub finished_calls: usize,
    }

    impl EventSink for Collector {
        fn cd_event(&mut self, sensor_time: u64, x: u16, y: u16, polarity: u8) {
            self.cd.push((sensor_time, x, y, polarity));
        }

        fn ext_trigger_event(&mut self, sensor_time: u64, edge: u8, id: u8) {
            self.triggers.push((sensor_time, edge, id));
        }

        fn finished(&mut self) {
            self.finished_calls += 1;
        }
    }
}
