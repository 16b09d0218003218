//! Structured event record types.
//!
//! Field layouts match the Metavision SDK's `EventCD` and `EventExtTrig`
//! records, so buffers of them can be viewed by downstream consumers
//! without conversion.

/// A decoded change-detection (CD) event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct EventCd {
    /// Pixel column
    pub x: u16,
    /// Pixel row
    pub y: u16,
    /// Polarity: 0 = OFF (brightness decrease), 1 = ON (increase)
    pub p: i8,
    /// Time in microseconds, narrowed from the 64-bit sensor time. Wraps
    /// after about 35 minutes of stream time.
    pub t: i32,
}

impl EventCd {
    #[inline]
    pub fn new(x: u16, y: u16, p: i8, t: i32) -> Self {
        Self { x, y, p, t }
    }
}

/// An external trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct EventExtTrig {
    /// Edge polarity: 0 = falling, 1 = rising
    pub p: i16,
    /// Time in microseconds
    pub t: i64,
    /// Trigger channel id
    pub id: i16,
}

impl EventExtTrig {
    #[inline]
    pub fn new(p: i16, t: i64, id: i16) -> Self {
        Self { p, t, id }
    }
}
