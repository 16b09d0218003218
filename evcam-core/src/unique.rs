//! Spatially de-duplicated packet accumulation.

use std::mem;

use evcam_codecs::EventSink;

use crate::accumulator::Accumulate;
use crate::error::DecodeError;
use crate::events::{EventCd, EventExtTrig};

/// Accumulates CD events into packets that never contain two events at
/// the same pixel.
///
/// A per-pixel presence bitmap records which pixels already contributed
/// to the open packet. When an event revisits a marked pixel, the bitmap
/// is cleared and a new packet is opened, so every retrieved packet can
/// be rendered as one event frame without read-after-write hazards.
/// Trigger events have no spatial policy and share a single packet per
/// epoch.
///
/// Single-buffer retrieval ([`Accumulate::take_cd_events`] and
/// [`Accumulate::take_ext_trig_events`]) always returns empty buffers for
/// this strategy; packetized retrieval is the only delivery path.
#[derive(Debug, Default)]
pub struct UniqueAccumulator {
    num_cd: [u64; 2],
    num_ext_trig: [u64; 2],
    cd_packets: Vec<Vec<EventCd>>,
    ext_trig_packets: Vec<Vec<EventExtTrig>>,
    max_size_cd: usize,
    max_size_ext_trig: usize,
    image: Vec<u8>,
    width: u16,
    height: u16,
}

impl UniqueAccumulator {
    /// Linear bit index of the pixel; `None` outside the configured
    /// geometry, so stray coordinates never alias a real pixel's bit.
    #[inline]
    fn pixel_index(&self, x: u16, y: u16) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    #[inline]
    fn pixel_is_set(&self, x: u16, y: u16) -> bool {
        match self.pixel_index(x, y) {
            Some(index) => (self.image[index / 8] >> (index % 8)) & 1 != 0,
            None => false,
        }
    }

    #[inline]
    fn set_pixel(&mut self, x: u16, y: u16) {
        if let Some(index) = self.pixel_index(x, y) {
            self.image[index / 8] |= 1 << (index % 8);
        }
    }

    fn clear_image(&mut self) {
        self.image.fill(0);
    }
}

impl EventSink for UniqueAccumulator {
    fn cd_event(&mut self, sensor_time: u64, x: u16, y: u16, polarity: u8) {
        if self.pixel_is_set(x, y) {
            // The pixel already fired within the open packet: close it and
            // start a new one.
            self.clear_image();
            self.cd_packets.push(Vec::with_capacity(self.max_size_cd));
        } else if self.cd_packets.is_empty() {
            self.cd_packets.push(Vec::new());
        }
        self.set_pixel(x, y);
        if let Some(packet) = self.cd_packets.last_mut() {
            packet.push(EventCd::new(x, y, polarity as i8, sensor_time as i32));
            self.max_size_cd = self.max_size_cd.max(packet.len());
        }
        self.num_cd[polarity.min(1) as usize] += 1;
    }

    fn ext_trigger_event(&mut self, sensor_time: u64, edge: u8, id: u8) {
        if self.ext_trig_packets.is_empty() {
            self.ext_trig_packets
                .push(Vec::with_capacity(self.max_size_ext_trig));
        }
        if let Some(packet) = self.ext_trig_packets.last_mut() {
            packet.push(EventExtTrig::new(edge as i16, sensor_time as i64, id as i16));
            self.max_size_ext_trig = self.max_size_ext_trig.max(packet.len());
        }
        self.num_ext_trig[edge.min(1) as usize] += 1;
    }
}

impl Accumulate for UniqueAccumulator {
    /// Sizes the presence bitmap on first use. The geometry is fixed for
    /// the lifetime of the accumulator; a different one is rejected.
    fn initialize(&mut self, width: u16, height: u16) -> Result<(), DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidResolution { width, height });
        }
        if self.image.is_empty() {
            self.width = width;
            self.height = height;
            self.image = vec![0u8; (width as usize * height as usize + 7) / 8];
        } else if width != self.width || height != self.height {
            return Err(DecodeError::ResolutionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                width,
                height,
            });
        }
        Ok(())
    }

    fn reset_stored_events(&mut self) {
        self.cd_packets.clear();
        self.ext_trig_packets.clear();
        self.clear_image();
    }

    fn take_cd_events(&mut self) -> Vec<EventCd> {
        Vec::new()
    }

    fn take_ext_trig_events(&mut self) -> Vec<EventExtTrig> {
        Vec::new()
    }

    fn take_cd_event_packets(&mut self) -> Vec<Vec<EventCd>> {
        // The open packet leaves with the rest, so its dedup marks go too.
        self.clear_image();
        mem::take(&mut self.cd_packets)
    }

    fn take_ext_trig_event_packets(&mut self) -> Vec<Vec<EventExtTrig>> {
        mem::take(&mut self.ext_trig_packets)
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
    use std::collections::HashSet;

    fn initialized(width: u16, height: u16) -> UniqueAccumulator {
        let mut acc = UniqueAccumulator::default();
        acc.initialize(width, height).unwrap();
        acc
    }

    #[test]
    fn test_revisit_splits_the_packet() {
        let mut acc = initialized(16, 16);
        acc.cd_event(1, 3, 4, 1);
        acc.cd_event(2, 5, 6, 0);
        acc.cd_event(3, 3, 4, 1); // same pixel again
        acc.cd_event(4, 7, 8, 1);

        let packets = acc.take_cd_event_packets();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].len(), 2);
        assert_eq!(packets[1].len(), 2);
        assert_eq!(packets[1][0], EventCd::new(3, 4, 1, 3));
    }

    #[test]
    fn test_no_pixel_repeats_within_a_packet() {
        let mut acc = initialized(8, 8);
        for i in 0..32u64 {
            acc.cd_event(i, (i % 3) as u16, (i % 2) as u16, 1);
        }

        for packet in acc.take_cd_event_packets() {
            let mut seen = HashSet::new();
            for event in &packet {
                assert!(seen.insert((event.x, event.y)), "pixel repeated within a packet");
            }
        }
    }

    #[test]
    fn test_bit_indexing_is_linear_when_width_is_not_byte_aligned() {
        // With a 3-wide sensor the rows pack tightly into shared bytes;
        // distinct pixels must still never force a packet boundary.
        let mut acc = initialized(3, 3);
        acc.cd_event(1, 0, 0, 1);
        acc.cd_event(2, 0, 1, 1);
        acc.cd_event(3, 1, 1, 1);
        acc.cd_event(4, 2, 2, 1);

        assert_eq!(acc.take_cd_event_packets().len(), 1);
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let mut acc = UniqueAccumulator::default();
        assert!(matches!(
            acc.initialize(0, 480),
            Err(DecodeError::InvalidResolution { .. })
        ));
        assert!(matches!(
            acc.initialize(640, 0),
            Err(DecodeError::InvalidResolution { .. })
        ));
    }

    #[test]
    fn test_mismatched_reinitialize_rejected() {
        let mut acc = initialized(640, 480);
        assert!(acc.initialize(640, 480).is_ok());
        assert!(matches!(
            acc.initialize(1280, 720),
            Err(DecodeError::ResolutionMismatch { .. })
        ));
    }

    #[test]
    fn test_single_buffer_retrieval_stays_empty() {
        let mut acc = initialized(8, 8);
        acc.cd_event(1, 1, 1, 1);
        acc.ext_trigger_event(2, 1, 0);

        assert!(acc.take_cd_events().is_empty());
        assert!(acc.take_ext_trig_events().is_empty());
        assert_eq!(acc.take_cd_event_packets().len(), 1);
        assert_eq!(acc.take_ext_trig_event_packets().len(), 1);
    }

    #[test]
    fn test_retrieval_clears_dedup_state() {
        let mut acc = initialized(8, 8);
        acc.cd_event(1, 1, 1, 1);
        acc.take_cd_event_packets();

        // The same pixel after retrieval opens a fresh packet, not a split.
        acc.cd_event(2, 1, 1, 1);
        acc.cd_event(3, 2, 2, 1);
        assert_eq!(acc.take_cd_event_packets().len(), 1);
    }

    #[test]
    fn test_reset_discards_packets_and_dedup_state() {
        let mut acc = initialized(8, 8);
        acc.cd_event(1, 1, 1, 1);
        acc.reset_stored_events();
        acc.cd_event(2, 1, 1, 1);

        let packets = acc.take_cd_event_packets();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 1);
        assert_eq!(packets[0][0].t, 2);
    }

    #[test]
    fn test_triggers_share_one_packet() {
        let mut acc = initialized(8, 8);
        acc.ext_trigger_event(1, 0, 0);
        acc.ext_trigger_event(2, 1, 0);
        acc.ext_trigger_event(3, 0, 1);

        let packets = acc.take_ext_trig_event_packets();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 3);
        assert_eq!(acc.num_trigger_rising(), 1);
        assert_eq!(acc.num_trigger_falling(), 2);
    }

    #[test]
    fn test_out_of_geometry_coordinates_never_split_or_panic() {
        let mut acc = initialized(4, 4);
        acc.cd_event(1, 100, 100, 1);
        acc.cd_event(2, 100, 100, 1);

        let packets = acc.take_cd_event_packets();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 2);
    }

    #[test]
    fn test_counters_accumulate_across_epochs() {
        let mut acc = initialized(8, 8);
        acc.cd_event(1, 1, 1, 1);
        acc.take_cd_event_packets();
        acc.reset_stored_events();
        acc.cd_event(2, 2, 2, 0);

        assert_eq!(acc.num_cd_on(), 1);
        assert_eq!(acc.num_cd_off(), 1);
    }
}
