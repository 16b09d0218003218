//! Codec instance cache keyed by encoding and sensor geometry.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::decoder::EventDecoder;
use crate::evt2::Evt2Decoder;
use crate::evt3::Evt3Decoder;
use crate::sink::EventSink;

/// Lazily constructs and caches one codec per `(encoding, width, height)`.
///
/// Cached instances keep their stream state (time base, parse position)
/// between calls, which bounded decoding relies on. Unknown encodings
/// yield `None` and are never cached. Instances live as long as the
/// factory; nothing is evicted.
pub struct DecoderFactory<S: EventSink> {
    instances: HashMap<(String, u16, u16), Box<dyn EventDecoder<S> + Send>>,
}

impl<S: EventSink> DecoderFactory<S> {
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
        }
    }

    /// Returns the cached codec for the key, constructing it on first use.
    /// Encoding names are exact and lowercase: `"evt2"` or `"evt3"`.
    pub fn get_instance(
        &mut self,
        encoding: &str,
        width: u16,
        height: u16,
    ) -> Option<&mut dyn EventDecoder<S>> {
        match self.instances.entry((encoding.to_string(), width, height)) {
            Entry::Occupied(entry) => Some(entry.into_mut().as_mut()),
            Entry::Vacant(entry) => {
                let codec = new_codec(encoding)?;
                Some(entry.insert(codec).as_mut())
            }
        }
    }
}

impl<S: EventSink> Default for DecoderFactory<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn new_codec<S: EventSink>(encoding: &str) -> Option<Box<dyn EventDecoder<S> + Send>> {
    match encoding {
        "evt2" => Some(Box::new(Evt2Decoder::new())),
        "evt3" => Some(Box::new(Evt3Decoder::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::Collector;

    #[test]
    fn test_unknown_encoding_is_not_cached() {
        let mut factory: DecoderFactory<Collector> = DecoderFactory::new();

        assert!(factory.get_instance("not-a-real-codec", 640, 480).is_none());
        assert!(factory.instances.is_empty());

        assert!(factory.get_instance("evt3", 640, 480).is_some());
        assert_eq!(factory.instances.len(), 1);
    }

    #[test]
    fn test_instances_cached_per_key() {
        let mut factory: DecoderFactory<Collector> = DecoderFactory::new();

        factory.get_instance("evt2", 640, 480);
        factory.get_instance("evt2", 640, 480);
        factory.get_instance("evt2", 1280, 720);
        factory.get_instance("evt3", 640, 480);

        assert_eq!(factory.instances.len(), 3);
    }

    #[test]
    fn test_encoding_names_are_exact() {
        let mut factory: DecoderFactory<Collector> = DecoderFactory::new();

        assert!(factory.get_instance("EVT3", 640, 480).is_none());
        assert!(factory.get_instance("evt3 ", 640, 480).is_none());
    }

    #[test]
    fn test_cached_instance_keeps_stream_state() {
        let mut factory: DecoderFactory<Collector> = DecoderFactory::new();
        let mut sink = Collector::default();

        // The first buffer only establishes the time base.
        let first = (0x8u32 << 28 | 100).to_le_bytes();
        if let Some(codec) = factory.get_instance("evt2", 640, 480) {
            codec.decode(&first, &mut sink);
        }

        // The second buffer has no TIME_HIGH; events reuse the cached base.
        let second = ((0x1u32 << 28) | (3 << 22) | (10 << 11) | 4).to_le_bytes();
        if let Some(codec) = factory.get_instance("evt2", 640, 480) {
            codec.decode(&second, &mut sink);
        }

        assert_eq!(sink.cd, vec![(100 * 64 + 3, 10, 4, 1)]);
    }
}
