//! I/O utilities for reading and writing delimited records.
//!
//! - **Delimiter resolution**: explicit flags win; otherwise a `.tsv`
//!   extension selects tab and everything else defaults to comma.
//! - **Encoding**: input fields are decoded and output is transcoded via
//!   `encoding_rs`, defaulting to UTF-8.
//! - **stdin/stdout**: a missing path or `-` routes through standard streams.
//! - **Shape**: readers are flexible so that rows of differing width reach the
//!   projector, which reports width problems itself.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

fn delimiter_for_extension(path: Option<&Path>) -> Option<u8> {
    let ext = path?.extension()?.to_str()?;
    if ext.eq_ignore_ascii_case("tsv") {
        Some(DEFAULT_TSV_DELIMITER)
    } else if ext.eq_ignore_ascii_case("csv") {
        Some(DEFAULT_CSV_DELIMITER)
    } else {
        None
    }
}

pub fn resolve_input_delimiter(path: Option<&Path>, provided: Option<u8>) -> u8 {
    provided
        .or_else(|| delimiter_for_extension(path))
        .unwrap_or(DEFAULT_CSV_DELIMITER)
}

/// The output delimiter never inherits the input delimiter; only the flag or
/// the output file's extension change it.
pub fn resolve_output_delimiter(path: Option<&Path>, provided: Option<u8>) -> u8 {
    resolve_input_delimiter(path, provided)
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: Option<&Path>,
    delimiter: u8,
) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = match path {
        Some(p) if !is_dash(p) => Box::new(BufReader::new(
            File::open(p).with_context(|| format!("Opening input file {p:?}"))?,
        )),
        _ => Box::new(io::stdin().lock()),
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn open_csv_writer<W>(writer: W, delimiter: u8) -> csv::Writer<W>
where
    W: Write,
{
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .flexible(true)
        .from_writer(writer)
}

pub fn open_csv_writer_to_path(
    path: Option<&Path>,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let writer: Box<dyn Write> = if encoding == UTF_8 {
        base
    } else {
        Box::new(TranscodingWriter::new(base, encoding))
    };
    Ok(open_csv_writer(writer, delimiter))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Re-encodes the UTF-8 produced by the CSV writer into a target encoding.
/// Multi-byte sequences split across `write` calls are held back until they
/// are complete.
pub struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    pending: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    pub fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            pending: Vec::new(),
        }
    }

    fn drain_complete(&mut self) -> io::Result<()> {
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(err) if err.error_len().is_some() => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Invalid UTF-8 sequence in output stream",
                ));
            }
            Err(err) => err.valid_up_to(),
        };
        if complete == 0 {
            return Ok(());
        }
        let rest = self.pending.split_off(complete);
        let chunk = std::mem::replace(&mut self.pending, rest);
        let text = String::from_utf8(chunk)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let (encoded, _, had_errors) = self.encoding.encode(&text);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to encode text using {}", self.encoding.name()),
            ));
        }
        self.inner.write_all(&encoded)
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.drain_complete()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain_complete()?;
        if !self.pending.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Incomplete UTF-8 sequence at end of output stream",
            ));
        }
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn delimiters_follow_flags_then_extensions() {
        let tsv = PathBuf::from("data.TSV");
        let csv = PathBuf::from("data.csv");
        assert_eq!(resolve_input_delimiter(Some(tsv.as_path()), None), b'\t');
        assert_eq!(resolve_input_delimiter(Some(tsv.as_path()), Some(b';')), b';');
        assert_eq!(resolve_input_delimiter(None, None), b',');
        assert_eq!(resolve_output_delimiter(Some(csv.as_path()), None), b',');
        assert_eq!(resolve_output_delimiter(None, None), b',');
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        assert!(resolve_encoding(Some("klingon")).is_err());
        assert_eq!(resolve_encoding(Some("latin1")).unwrap().name(), "windows-1252");
    }

    #[test]
    fn transcoding_writer_handles_split_sequences() {
        let encoding = resolve_encoding(Some("latin1")).unwrap();
        let mut writer = TranscodingWriter::new(Vec::new(), encoding);
        let bytes = "café".as_bytes();
        writer.write_all(&bytes[..4]).unwrap();
        writer.write_all(&bytes[4..]).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.inner, vec![b'c', b'a', b'f', 0xE9]);
    }

    #[test]
    fn transcoding_writer_rejects_truncated_output() {
        let encoding = resolve_encoding(Some("latin1")).unwrap();
        let mut writer = TranscodingWriter::new(Vec::new(), encoding);
        writer.write_all(&"é".as_bytes()[..1]).unwrap();
        assert!(writer.flush().is_err());
    }
}
