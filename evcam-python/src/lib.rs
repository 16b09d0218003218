//! Python bindings for the event-camera decoder.
//!
//! Exposes `Decoder` and `UniqueDecoder` classes. Decoded events come
//! back as structured numpy arrays whose backing storage is moved out of
//! Rust without copying, so retrieval empties the decoder until the next
//! decode call.

use std::mem::{offset_of, size_of, ManuallyDrop};

use numpy::{Element, IntoPyArray, PyArray1, PyArrayDescr, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::sync::GILOnceCell;
use pyo3::types::{PyBytes, PyDict};

use evcam_core::{Accumulator, EventCd, EventExtTrig, UniqueAccumulator};

/// CD event record exposed to numpy with the Metavision `EventCD` dtype.
#[repr(transparent)]
#[derive(Clone, Copy)]
struct CdRecord(EventCd);

/// Trigger event record exposed to numpy with the Metavision
/// `EventExtTrigger` dtype.
#[repr(transparent)]
#[derive(Clone, Copy)]
struct TrigRecord(EventExtTrig);

fn record_dtype(
    py: Python<'_>,
    names: &[&str],
    formats: &[&str],
    offsets: &[usize],
    itemsize: usize,
) -> PyResult<Py<PyArrayDescr>> {
    let fields = PyDict::new(py);
    fields.set_item("names", names.to_vec())?;
    fields.set_item("formats", formats.to_vec())?;
    fields.set_item("offsets", offsets.to_vec())?;
    fields.set_item("itemsize", itemsize)?;
    Ok(PyArrayDescr::new(py, fields)?.into())
}

unsafe impl Element for CdRecord {
    const IS_COPY: bool = true;

    fn get_dtype(py: Python<'_>) -> &PyArrayDescr {
        static DTYPE: GILOnceCell<Py<PyArrayDescr>> = GILOnceCell::new();
        DTYPE
            .get_or_init(py, || {
                record_dtype(
                    py,
                    &["x", "y", "p", "t"],
                    &["u2", "u2", "i1", "i4"],
                    &[
                        offset_of!(EventCd, x),
                        offset_of!(EventCd, y),
                        offset_of!(EventCd, p),
                        offset_of!(EventCd, t),
                    ],
                    size_of::<EventCd>(),
                )
                .expect("EventCD dtype")
            })
            .as_ref(py)
    }
}

unsafe impl Element for TrigRecord {
    const IS_COPY: bool = true;

    fn get_dtype(py: Python<'_>) -> &PyArrayDescr {
        static DTYPE: GILOnceCell<Py<PyArrayDescr>> = GILOnceCell::new();
        DTYPE
            .get_or_init(py, || {
                record_dtype(
                    py,
                    &["p", "t", "id"],
                    &["i2", "i8", "i2"],
                    &[
                        offset_of!(EventExtTrig, p),
                        offset_of!(EventExtTrig, t),
                        offset_of!(EventExtTrig, id),
                    ],
                    size_of::<EventExtTrig>(),
                )
                .expect("EventExtTrigger dtype")
            })
            .as_ref(py)
    }
}

fn cd_records(events: Vec<EventCd>) -> Vec<CdRecord> {
    let mut events = ManuallyDrop::new(events);
    // SAFETY: CdRecord is a repr(transparent) wrapper around EventCd, so
    // pointer, length, and capacity describe the same allocation.
    unsafe { Vec::from_raw_parts(events.as_mut_ptr().cast(), events.len(), events.capacity()) }
}

fn trig_records(events: Vec<EventExtTrig>) -> Vec<TrigRecord> {
    let mut events = ManuallyDrop::new(events);
    // SAFETY: TrigRecord is a repr(transparent) wrapper around
    // EventExtTrig, so pointer, length, and capacity describe the same
    // allocation.
    unsafe { Vec::from_raw_parts(events.as_mut_ptr().cast(), events.len(), events.capacity()) }
}

/// Pulls the decode parameters and event buffer out of a message object
/// carrying `encoding`, `width`, `height`, `time_base`, and `events`
/// attributes, then runs `f` on them. The buffer may be `bytes` or a 1-D
/// uint8 array.
fn with_message<R>(
    msg: &PyAny,
    f: impl FnOnce(&str, u16, u16, u64, &[u8]) -> PyResult<R>,
) -> PyResult<R> {
    let encoding: String = msg.getattr("encoding")?.extract()?;
    let width: u16 = msg.getattr("width")?.extract()?;
    let height: u16 = msg.getattr("height")?.extract()?;
    let time_base: u64 = msg.getattr("time_base")?.extract()?;
    let events = msg.getattr("events")?;

    if let Ok(bytes) = events.downcast::<PyBytes>() {
        f(&encoding, width, height, time_base, bytes.as_bytes())
    } else {
        let array: PyReadonlyArray1<'_, u8> = events.extract()?;
        let buf = array
            .as_slice()
            .map_err(|_| PyValueError::new_err("events buffer must be contiguous"))?;
        f(&encoding, width, height, time_base, buf)
    }
}

fn decode_error(err: evcam_core::DecodeError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

macro_rules! declare_decoder {
    ($(#[$docs:meta])* $name:ident, $accumulator:ty) => {
        $(#[$docs])*
        #[pyclass]
        pub struct $name {
            decoder: evcam_core::Decoder<$accumulator>,
        }

        #[pymethods]
        impl $name {
            #[new]
            fn new() -> Self {
                Self {
                    decoder: evcam_core::Decoder::<$accumulator>::default(),
                }
            }

            /// Decodes the event buffer carried by a message object.
            ///
            /// Args:
            ///     msg: Object with ``encoding``, ``width``, ``height``,
            ///         ``time_base``, and ``events`` attributes, e.g. an
            ///         event_camera_msgs EventPacket message.
            fn decode(&mut self, msg: &PyAny) -> PyResult<()> {
                with_message(msg, |encoding, width, height, time_base, buf| {
                    self.decoder
                        .decode(encoding, width, height, time_base, buf)
                        .map_err(decode_error)
                })
            }

            /// Decodes a ``bytes`` buffer of encoded events.
            ///
            /// Args:
            ///     encoding: Encoding name, "evt2" or "evt3".
            ///     width: Sensor width in pixels.
            ///     height: Sensor height in pixels.
            ///     time_base: Reference time for codecs whose streams do
            ///         not carry absolute sensor time.
            ///     buffer: Bytes with encoded events.
            fn decode_bytes(
                &mut self,
                encoding: &str,
                width: u16,
                height: u16,
                time_base: u64,
                buffer: &[u8],
            ) -> PyResult<()> {
                self.decoder
                    .decode(encoding, width, height, time_base, buffer)
                    .map_err(decode_error)
            }

            /// Decodes a 1-D uint8 numpy array of encoded events; other
            /// shapes and dtypes are rejected.
            fn decode_array(
                &mut self,
                encoding: &str,
                width: u16,
                height: u16,
                time_base: u64,
                buffer: PyReadonlyArray1<'_, u8>,
            ) -> PyResult<()> {
                let buf = buffer
                    .as_slice()
                    .map_err(|_| PyValueError::new_err("events buffer must be contiguous"))?;
                self.decoder
                    .decode(encoding, width, height, time_base, buf)
                    .map_err(decode_error)
            }

            /// Decodes the message's buffer only up to a time limit.
            ///
            /// Stops before the first event whose time reaches
            /// ``until_time`` (exclusive) and keeps the parse position, so
            /// the next call on the same buffer resumes there.
            ///
            /// Returns:
            ///     tuple: flag (True if the time limit has been reached)
            ///     and the time following the limit. The time is only
            ///     valid if the flag is True.
            fn decode_until(&mut self, msg: &PyAny, until_time: u64) -> PyResult<(bool, u64)> {
                with_message(msg, |encoding, width, height, time_base, buf| {
                    let next = self
                        .decoder
                        .decode_until(encoding, width, height, time_base, buf, until_time)
                        .map_err(decode_error)?;
                    Ok((next.is_some(), next.unwrap_or(0)))
                })
            }

            /// Time of the first event in the message's buffer, or
            /// ``None`` if the buffer carries no time marker.
            fn find_first_sensor_time(&mut self, msg: &PyAny) -> PyResult<Option<u64>> {
                with_message(msg, |encoding, width, height, _time_base, buf| {
                    self.decoder
                        .find_first_sensor_time(encoding, width, height, buf)
                        .map_err(decode_error)
                })
            }

            /// Start time offset for sensors that report time since the
            /// Unix epoch; zero for sensors timed from power-up.
            fn get_start_time(&self) -> u64 {
                self.decoder.start_time()
            }

            /// Fetches the decoded CD events as a structured array with
            /// fields ``x``, ``y``, ``p``, ``t``.
            ///
            /// Moves the events out without copying: call at most once
            /// per decode, a second call returns an empty array. Events
            /// never fetched are dropped by the next decode call.
            fn get_cd_events<'py>(&mut self, py: Python<'py>) -> &'py PyArray1<CdRecord> {
                cd_records(self.decoder.take_cd_events()).into_pyarray(py)
            }

            /// Fetches the decoded trigger events as a structured array
            /// with fields ``p``, ``t``, ``id``. Same move-out contract
            /// as ``get_cd_events``.
            fn get_ext_trig_events<'py>(&mut self, py: Python<'py>) -> &'py PyArray1<TrigRecord> {
                trig_records(self.decoder.take_ext_trig_events()).into_pyarray(py)
            }

            /// Fetches the CD event packets as a list of structured
            /// arrays, oldest first. Same move-out contract as
            /// ``get_cd_events``.
            fn get_cd_event_packets<'py>(
                &mut self,
                py: Python<'py>,
            ) -> Vec<&'py PyArray1<CdRecord>> {
                self.decoder
                    .take_cd_event_packets()
                    .into_iter()
                    .map(|packet| cd_records(packet).into_pyarray(py))
                    .collect()
            }

            /// Fetches the trigger event packets as a list of structured
            /// arrays. Same move-out contract as ``get_cd_events``.
            fn get_ext_trig_event_packets<'py>(
                &mut self,
                py: Python<'py>,
            ) -> Vec<&'py PyArray1<TrigRecord>> {
                self.decoder
                    .take_ext_trig_event_packets()
                    .into_iter()
                    .map(|packet| trig_records(packet).into_pyarray(py))
                    .collect()
            }

            /// Cumulative number of ON events.
            fn get_num_cd_on(&self) -> u64 {
                self.decoder.num_cd_on()
            }

            /// Cumulative number of OFF events.
            fn get_num_cd_off(&self) -> u64 {
                self.decoder.num_cd_off()
            }

            /// Cumulative number of rising-edge trigger events.
            fn get_num_trigger_rising(&self) -> u64 {
                self.decoder.num_trigger_rising()
            }

            /// Cumulative number of falling-edge trigger events.
            fn get_num_trigger_falling(&self) -> u64 {
                self.decoder.num_trigger_falling()
            }
        }
    };
}

declare_decoder!(
    /// Decoder with one growing event buffer per decode call.
    Decoder,
    Accumulator
);

declare_decoder!(
    /// Decoder that splits CD events into spatially unique packets:
    /// within each packet no pixel occurs twice. Use the packet
    /// retrieval methods; the single-array getters always return empty
    /// arrays for this class.
    UniqueDecoder,
    UniqueAccumulator
);

/// Event-camera decoding with zero-copy numpy hand-off.
#[pymodule]
fn evcam(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_class::<Decoder>()?;
    m.add_class::<UniqueDecoder>()?;
    Ok(())
}
