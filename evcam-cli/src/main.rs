//! Command-line decoder for event-camera `.raw` recordings.

mod output;
mod raw;

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use evcam_core::{Decoder, EventCd};
use indicatif::{ProgressBar, ProgressStyle};

use crate::output::{BinaryWriter, CsvWriter, FieldOrder, OutputError, TriggerCsvWriter};

/// Payload chunk size; a multiple of both codec word sizes.
const CHUNK_SIZE: usize = 4 << 20;

/// Event-camera raw file decoder.
///
/// Decodes `.raw` recordings in EVT 2.0 or EVT 3.0 format to CSV or a
/// compact binary format.
#[derive(Parser, Debug)]
#[command(name = "evcam")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input .raw file path
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file path (.csv, .bin)
    ///
    /// The output format is determined by the file extension:
    /// - .csv: Comma-separated values (human-readable)
    /// - .bin: Binary format (efficient, for programmatic access)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Field order for CSV output
    ///
    /// Comma-separated field names, e.g. "x,y,p,t" or "t,x,y,p".
    #[arg(short, long, default_value = "x,y,p,t")]
    format: String,

    /// Output file for trigger events (optional)
    #[arg(short, long, value_name = "PATH")]
    triggers: Option<PathBuf>,

    /// Codec to use, overriding the file header (evt2, evt3)
    #[arg(short, long)]
    encoding: Option<String>,

    /// Sensor width in pixels, overriding the file header
    #[arg(long)]
    width: Option<u16>,

    /// Sensor height in pixels, overriding the file header
    #[arg(long)]
    height: Option<u16>,

    /// Stop decoding at this sensor time in microseconds (exclusive)
    #[arg(long, value_name = "TIME")]
    until: Option<u64>,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

enum EventWriter {
    Csv(CsvWriter<File>),
    Binary(BinaryWriter<File>),
}

impl EventWriter {
    fn write_events(&mut self, events: &[EventCd]) -> Result<(), OutputError> {
        match self {
            Self::Csv(writer) => writer.write_events(events),
            Self::Binary(writer) => writer.write_events(events),
        }
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        match self {
            Self::Csv(writer) => writer.flush(),
            Self::Binary(writer) => writer.flush(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let field_order = FieldOrder::from_str(&args.format)
        .context("Invalid field format. Use comma-separated names: x,y,p,t")?;

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb
    };

    let start = Instant::now();

    let (mut header, mut reader) =
        raw::open_raw(&args.input).with_context(|| format!("Failed to open {:?}", args.input))?;
    if let Some(encoding) = &args.encoding {
        header.encoding = encoding.to_lowercase();
    }
    if let Some(width) = args.width {
        header.width = width;
    }
    if let Some(height) = args.height {
        header.height = height;
    }

    progress.set_message(format!(
        "Decoding {:?} ({}, {}x{})...",
        args.input.file_name().unwrap_or_default(),
        header.encoding,
        header.width,
        header.height
    ));

    let output_ext = args
        .output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("csv")
        .to_lowercase();

    let mut cd_writer = match output_ext.as_str() {
        "csv" => {
            let file = File::create(&args.output)
                .with_context(|| format!("Failed to create {:?}", args.output))?;
            let mut writer = CsvWriter::new(file, field_order);
            writer.write_header(&header)?;
            EventWriter::Csv(writer)
        }
        "bin" => {
            let file = File::create(&args.output)
                .with_context(|| format!("Failed to create {:?}", args.output))?;
            let mut writer = BinaryWriter::new(file);
            writer.write_header(&header)?;
            EventWriter::Binary(writer)
        }
        _ => anyhow::bail!("Unsupported output format: .{}. Use .csv or .bin", output_ext),
    };

    let mut trigger_writer = match &args.triggers {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {:?}", path))?;
            Some(TriggerCsvWriter::new(file))
        }
        None => None,
    };

    let mut decoder = Decoder::new();
    let mut total_cd: u64 = 0;
    let mut total_triggers: u64 = 0;
    let mut stopped_at: Option<u64> = None;
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = read_chunk(&mut reader, &mut buf).context("Failed to read input")?;
        if n == 0 {
            break;
        }

        match args.until {
            Some(until) => {
                stopped_at = decoder
                    .decode_until(
                        &header.encoding,
                        header.width,
                        header.height,
                        0,
                        &buf[..n],
                        until,
                    )
                    .context("Decode failed")?;
            }
            None => {
                decoder
                    .decode(&header.encoding, header.width, header.height, 0, &buf[..n])
                    .context("Decode failed")?;
            }
        }

        let events = decoder.take_cd_events();
        total_cd += events.len() as u64;
        cd_writer
            .write_events(&events)
            .context("Failed to write events")?;

        let triggers = decoder.take_ext_trig_events();
        total_triggers += triggers.len() as u64;
        if let Some(writer) = trigger_writer.as_mut() {
            writer
                .write_events(&triggers)
                .context("Failed to write trigger events")?;
        }

        if !args.quiet {
            progress.set_message(format!("Decoded {} events...", total_cd));
        }
        if stopped_at.is_some() {
            break;
        }
    }

    cd_writer.flush()?;
    if let Some(writer) = trigger_writer.as_mut() {
        writer.flush()?;
    }

    let duration = start.elapsed();
    progress.finish_with_message(format!(
        "Done! Decoded {} events in {:.2}s",
        total_cd,
        duration.as_secs_f64()
    ));

    if !args.quiet {
        let events_per_sec = total_cd as f64 / duration.as_secs_f64();
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Input:        {:?}", args.input);
        eprintln!("  Output:       {:?}", args.output);
        eprintln!("  Encoding:     {}", header.encoding);
        eprintln!("  Sensor:       {}x{}", header.width, header.height);
        eprintln!(
            "  CD events:    {} ({} on, {} off)",
            total_cd,
            decoder.num_cd_on(),
            decoder.num_cd_off()
        );
        eprintln!(
            "  Triggers:     {} ({} rising, {} falling)",
            total_triggers,
            decoder.num_trigger_rising(),
            decoder.num_trigger_falling()
        );
        if let Some(next_time) = stopped_at {
            eprintln!("  Stopped at:   {} us", next_time);
        }
        eprintln!("  Duration:     {:.3}s", duration.as_secs_f64());
        eprintln!("  Throughput:   {:.0} events/s", events_per_sec);
    }

    Ok(())
}

/// Fills `buf` as far as the reader allows; short only at end of file, so
/// chunk boundaries never drop a partial codec word mid-stream.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
