//! Event-camera decoding with accumulation and zero-copy hand-off.
//!
//! This crate turns raw event-camera byte streams into structured event
//! records. The codec state machines live in `evcam-codecs`; this crate
//! owns the buffers they fill. A [`Decoder`] façade resolves the codec
//! for an `(encoding, width, height)` triple, drives it over a whole
//! buffer or up to a time limit, and stores the decoded events in one of
//! two accumulation strategies:
//!
//! - [`Accumulator`]: one growing buffer per event kind per decode call.
//! - [`UniqueAccumulator`]: CD events split into packets such that no
//!   packet holds two events at the same pixel.
//!
//! Retrieval moves the buffers to the caller without copying and leaves
//! the accumulator empty until the next decode call.
//!
//! # Example
//!
//! ```
//! use evcam_core::Decoder;
//!
//! // An EVT 2.0 buffer: TIME_HIGH, then one ON event at t=16, x=5, y=3.
//! let mut bytes = Vec::new();
//! bytes.extend_from_slice(&(0x8u32 << 28).to_le_bytes());
//! bytes.extend_from_slice(&((0x1u32 << 28) | (16 << 22) | (5 << 11) | 3).to_le_bytes());
//!
//! let mut decoder = Decoder::new();
//! decoder.decode("evt2", 640, 480, 0, &bytes)?;
//!
//! let events = decoder.take_cd_events();
//! assert_eq!(events.len(), 1);
//! assert_eq!((events[0].x, events[0].y, events[0].p, events[0].t), (5, 3, 1, 16));
//! # Ok::<(), evcam_core::DecodeError>(())
//! ```

pub mod accumulator;
pub mod decoder;
pub mod error;
pub mod events;
pub mod unique;

// Re-export commonly used types
pub use accumulator::{Accumulate, Accumulator};
pub use decoder::{Decoder, UniqueDecoder, OUTPUT_TIME_MULTIPLIER};
pub use error::DecodeError;
pub use events::{EventCd, EventExtTrig};
pub use evcam_codecs::EventSink;
pub use unique::UniqueAccumulator;
