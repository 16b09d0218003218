//! Error type for decode configuration failures.

use thiserror::Error;

/// Errors surfaced by the decoder façade and the accumulators.
///
/// All of these are configuration errors raised before any stream byte is
/// parsed; a failed call leaves counters and buffered events untouched.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The encoding string did not match any known codec.
    #[error("no decoder found for encoding '{0}'")]
    UnknownEncoding(String),

    /// A zero sensor dimension was passed.
    #[error("bad sensor resolution {width}x{height}")]
    InvalidResolution { width: u16, height: u16 },

    /// The sensor resolution changed after the pixel bitmap was sized.
    #[error(
        "sensor resolution {width}x{height} does not match configured {expected_width}x{expected_height}"
    )]
    ResolutionMismatch {
        expected_width: u16,
        expected_height: u16,
        width: u16,
        height: u16,
    },
}
