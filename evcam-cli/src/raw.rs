//! Prophesee `.raw` file access: percent-header parsing and payload
//! streaming.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Values carried by the `%`-prefixed text header of a `.raw` recording.
///
/// Headers look like:
///
/// ```text
/// % evt 3.0
/// % format EVT3;height=720;width=1280
/// % geometry 1280x720
/// % end
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    /// Codec encoding name ("evt2" or "evt3")
    pub encoding: String,
    /// Sensor width in pixels
    pub width: u16,
    /// Sensor height in pixels
    pub height: u16,
}

impl Default for RawHeader {
    fn default() -> Self {
        // Gen4 sensor geometry, EVT 3.0 encoding.
        Self {
            encoding: "evt3".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Opens a `.raw` file and parses its header. The returned reader is
/// positioned at the first payload byte.
pub fn open_raw(path: &Path) -> std::io::Result<(RawHeader, BufReader<File>)> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = read_header(&mut reader)?;
    Ok((header, reader))
}

/// Consumes the text header from the front of `reader`. Files without a
/// header yield the defaults.
pub fn read_header<R: BufRead>(reader: &mut R) -> std::io::Result<RawHeader> {
    let mut header = RawHeader::default();

    loop {
        let peeked = reader.fill_buf()?;
        if peeked.is_empty() || peeked[0] != b'%' {
            break;
        }

        let mut line = String::new();
        reader.read_line(&mut line)?;

        if line.starts_with("% end") {
            break;
        }
        parse_header_line(&mut header, &line);
    }

    Ok(header)
}

/// Applies one header line to the parsed values. Unknown lines are
/// ignored.
fn parse_header_line(header: &mut RawHeader, line: &str) {
    let line = line.trim_end();

    if let Some(format_str) = line.strip_prefix("% format ") {
        // "% format EVT3;height=720;width=1280"
        for (i, part) in format_str.split(';').enumerate() {
            if i == 0 {
                header.encoding = part.trim().to_lowercase();
                continue;
            }
            if let Some(idx) = part.find('=') {
                let value = &part[idx + 1..];
                match &part[..idx] {
                    "width" => {
                        if let Ok(width) = value.parse() {
                            header.width = width;
                        }
                    }
                    "height" => {
                        if let Ok(height) = value.parse() {
                            header.height = height;
                        }
                    }
                    _ => {}
                }
            }
        }
    } else if let Some(geometry) = line.strip_prefix("% geometry ") {
        // "% geometry 1280x720"
        if let Some(idx) = geometry.find('x') {
            if let (Ok(width), Ok(height)) =
                (geometry[..idx].parse(), geometry[idx + 1..].trim().parse())
            {
                header.width = width;
                header.height = height;
            }
        }
    } else if let Some(version) = line.strip_prefix("% evt ") {
        // "% evt 3.0"
        match version.trim() {
            "2.0" | "2.1" => header.encoding = "evt2".to_string(),
            "3.0" => header.encoding = "evt3".to_string(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_parse_format_line() {
        let mut header = RawHeader::default();
        parse_header_line(&mut header, "% format EVT2;height=480;width=640");

        assert_eq!(header.encoding, "evt2");
        assert_eq!(header.width, 640);
        assert_eq!(header.height, 480);
    }

    #[test]
    fn test_parse_geometry_line() {
        let mut header = RawHeader::default();
        parse_header_line(&mut header, "% geometry 320x240");

        assert_eq!((header.width, header.height), (320, 240));
    }

    #[test]
    fn test_parse_evt_version_line() {
        let mut header = RawHeader::default();
        parse_header_line(&mut header, "% evt 2.0");
        assert_eq!(header.encoding, "evt2");

        parse_header_line(&mut header, "% evt 3.0");
        assert_eq!(header.encoding, "evt3");
    }

    #[test]
    fn test_unknown_header_lines_are_ignored() {
        let mut header = RawHeader::default();
        parse_header_line(&mut header, "% camera_integrator_name Prophesee");

        assert_eq!(header, RawHeader::default());
    }

    #[test]
    fn test_header_consumed_up_to_payload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "% evt 3.0\n% geometry 640x480\n% end\n").unwrap();
        file.write_all(&[0xAA, 0xBB, 0xCC, 0xDD]).unwrap();
        file.flush().unwrap();

        let (header, mut reader) = open_raw(file.path()).unwrap();
        assert_eq!(header.encoding, "evt3");
        assert_eq!((header.width, header.height), (640, 480));

        let mut payload = Vec::new();
        reader.read_to_end(&mut payload).unwrap();
        assert_eq!(payload, vec![0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn test_headerless_file_yields_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x00, 0x80]).unwrap();
        file.flush().unwrap();

        let (header, mut reader) = open_raw(file.path()).unwrap();
        assert_eq!(header, RawHeader::default());

        let mut payload = Vec::new();
        reader.read_to_end(&mut payload).unwrap();
        assert_eq!(payload.len(), 2);
    }
}
