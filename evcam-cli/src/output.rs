//! Output writers for decoded events.

use std::io::{self, BufWriter, Write};
use std::str::FromStr;

use byteorder::{LittleEndian, WriteBytesExt};
use evcam_core::{EventCd, EventExtTrig};
use thiserror::Error;

use crate::raw::RawHeader;

/// Magic bytes identifying the binary event format.
const BINARY_MAGIC: &[u8; 8] = b"EVCAMBIN";

/// Binary event format version.
const BINARY_VERSION: u32 = 1;

/// Errors from writing decoded events.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid field order: {0}")]
    InvalidFieldOrder(String),
}

/// Column order for CSV output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrder {
    /// x, y, polarity, timestamp (default)
    XYPT,
    /// timestamp, x, y, polarity
    TXYP,
    /// x, y, timestamp, polarity
    XYTP,
    /// Arbitrary permutation of the four fields
    Custom([usize; 4]),
}

impl FromStr for FieldOrder {
    type Err = OutputError;

    /// Parses a comma-separated field list such as `"x,y,p,t"`. The names
    /// `p`/`pol`/`polarity` and `t`/`time`/`timestamp` are equivalent;
    /// every field must appear exactly once.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(|p| p.trim()).collect();
        if parts.len() != 4 {
            return Err(OutputError::InvalidFieldOrder(s.to_string()));
        }

        let mut indices = [0usize; 4];
        let mut seen = [false; 4];
        for (slot, part) in indices.iter_mut().zip(&parts) {
            let index = match *part {
                "x" => 0,
                "y" => 1,
                "p" | "pol" | "polarity" => 2,
                "t" | "time" | "timestamp" => 3,
                _ => return Err(OutputError::InvalidFieldOrder(s.to_string())),
            };
            if seen[index] {
                return Err(OutputError::InvalidFieldOrder(s.to_string()));
            }
            seen[index] = true;
            *slot = index;
        }

        Ok(match indices {
            [0, 1, 2, 3] => FieldOrder::XYPT,
            [3, 0, 1, 2] => FieldOrder::TXYP,
            [0, 1, 3, 2] => FieldOrder::XYTP,
            other => FieldOrder::Custom(other),
        })
    }
}

/// Streams CD events to CSV, one event per line.
pub struct CsvWriter<W: Write> {
    writer: BufWriter<W>,
    field_order: FieldOrder,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(inner: W, field_order: FieldOrder) -> Self {
        Self {
            writer: BufWriter::new(inner),
            field_order,
        }
    }

    /// Writes the geometry comment line.
    pub fn write_header(&mut self, header: &RawHeader) -> Result<(), OutputError> {
        writeln!(self.writer, "%geometry:{},{}", header.width, header.height)?;
        Ok(())
    }

    pub fn write_events(&mut self, events: &[EventCd]) -> Result<(), OutputError> {
        for event in events {
            self.write_event(event)?;
        }
        Ok(())
    }

    #[inline]
    fn write_event(&mut self, event: &EventCd) -> Result<(), OutputError> {
        match self.field_order {
            FieldOrder::XYPT => {
                writeln!(self.writer, "{},{},{},{}", event.x, event.y, event.p, event.t)?
            }
            FieldOrder::TXYP => {
                writeln!(self.writer, "{},{},{},{}", event.t, event.x, event.y, event.p)?
            }
            FieldOrder::XYTP => {
                writeln!(self.writer, "{},{},{},{}", event.x, event.y, event.t, event.p)?
            }
            FieldOrder::Custom(order) => {
                let fields = [
                    event.x as i64,
                    event.y as i64,
                    event.p as i64,
                    event.t as i64,
                ];
                writeln!(
                    self.writer,
                    "{},{},{},{}",
                    fields[order[0]], fields[order[1]], fields[order[2]], fields[order[3]]
                )?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Streams external trigger events to CSV as `p,id,t` lines.
pub struct TriggerCsvWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> TriggerCsvWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: BufWriter::new(inner),
        }
    }

    pub fn write_events(&mut self, events: &[EventExtTrig]) -> Result<(), OutputError> {
        for event in events {
            writeln!(self.writer, "{},{},{}", event.p, event.id, event.t)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Streams CD events to a compact binary file.
///
/// Layout, all little-endian:
///
/// - magic `b"EVCAMBIN"` (8 bytes)
/// - format version (u32)
/// - sensor width (u32)
/// - sensor height (u32)
/// - records of x (u16), y (u16), p (i8), 3 pad bytes, t (i32) until the
///   end of the file
///
/// Each record is 12 bytes and mirrors the in-memory [`EventCd`] layout,
/// so the record count is `(file size - 20) / 12`.
pub struct BinaryWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> BinaryWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: BufWriter::new(inner),
        }
    }

    pub fn write_header(&mut self, header: &RawHeader) -> Result<(), OutputError> {
        self.writer.write_all(BINARY_MAGIC)?;
        self.writer.write_u32::<LittleEndian>(BINARY_VERSION)?;
        self.writer.write_u32::<LittleEndian>(header.width as u32)?;
        self.writer.write_u32::<LittleEndian>(header.height as u32)?;
        Ok(())
    }

    pub fn write_events(&mut self, events: &[EventCd]) -> Result<(), OutputError> {
        for event in events {
            self.writer.write_u16::<LittleEndian>(event.x)?;
            self.writer.write_u16::<LittleEndian>(event.y)?;
            self.writer.write_i8(event.p)?;
            self.writer.write_all(&[0u8; 3])?;
            self.writer.write_i32::<LittleEndian>(event.t)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}
