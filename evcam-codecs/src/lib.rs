//! Event-camera codec state machines.
//!
//! This crate decodes the Prophesee EVT 2.0 and EVT 3.0 raw wire formats.
//! A codec parses a byte buffer and reports every decoded event through
//! the [`EventSink`] callbacks, so the caller decides how events are
//! stored. Codec instances are obtained from a [`DecoderFactory`], which
//! caches one instance per `(encoding, width, height)` triple and keeps
//! its stream state alive between buffers.
//!
//! # Example
//!
//! ```
//! use evcam_codecs::{DecoderFactory, EventDecoder, EventSink};
//!
//! struct Counter {
//!     cd: usize,
//! }
//!
//! impl EventSink for Counter {
//!     fn cd_event(&mut self, _time: u64, _x: u16, _y: u16, _polarity: u8) {
//!         self.cd += 1;
//!     }
//!     fn ext_trigger_event(&mut self, _time: u64, _edge: u8, _id: u8) {}
//! }
//!
//! // An EVT 2.0 buffer: a TIME_HIGH word, then one ON event at (x=2, y=7).
//! let mut bytes = Vec::new();
//! bytes.extend_from_slice(&(0x8u32 << 28).to_le_bytes());
//! bytes.extend_from_slice(&((0x1u32 << 28) | (2 << 11) | 7).to_le_bytes());
//!
//! let mut factory = DecoderFactory::new();
//! let mut sink = Counter { cd: 0 };
//! if let Some(codec) = factory.get_instance("evt2", 640, 480) {
//!     codec.decode(&bytes, &mut sink);
//! }
//! assert_eq!(sink.cd, 1);
//! ```
//!
//! # Features
//!
//! - Full EVT 2.0 and EVT 3.0 word coverage, including vector events and
//!   external triggers
//! - Timestamp wrap-around detection producing monotonic 64-bit times
//! - Bounded decoding with a resumable parse position
//! - Callback-based output with no buffering in the codec itself

pub mod decoder;
pub mod evt2;
pub mod evt3;
pub mod factory;
pub mod sink;

// Re-export commonly used types
pub use decoder::EventDecoder;
pub use evt2::Evt2Decoder;
pub use evt3::Evt3Decoder;
pub use factory::DecoderFactory;
pub use sink::EventSink;
