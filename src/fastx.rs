//! Streaming FASTA/FASTQ reader and writer.
//!
//! The reader yields [`SeqItem`]s holding the raw framing lines of each
//! record, so a read/write round trip reproduces the input byte for byte.
//! FASTA sequences may wrap over any number of lines; FASTQ records are
//! strict four-line records.

use crate::error::{Error, Result};
use crate::record::{SeqFormat, SeqItem};
use memchr::memchr;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

/// A streaming FASTA/FASTQ reader.
pub struct FastxReader<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
    /// Header line already consumed while scanning the previous record.
    peeked: Option<String>,
}

impl FastxReader<File> {
    /// Open a sequence file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read> FastxReader<R> {
    /// Create a new reader from any readable source.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
            peeked: None,
        }
    }

    /// Read one line, trimming the trailing newline. `None` at end of input.
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut buffer = String::with_capacity(128);
        let bytes_read = self.reader.read_line(&mut buffer)?;
        if bytes_read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        while buffer.ends_with('\n') || buffer.ends_with('\r') {
            buffer.pop();
        }
        Ok(Some(buffer))
    }

    fn parse_error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            line: self.line_number,
            message: message.into(),
        }
    }

    /// Read the next record.
    pub fn read_record(&mut self) -> Result<Option<SeqItem>> {
        let header = match self.take_header()? {
            Some(line) => line,
            None => return Ok(None),
        };

        match header.as_bytes().first() {
            Some(b'>') => self.read_fasta_record(header),
            Some(b'@') => self.read_fastq_record(header),
            _ => Err(self.parse_error(format!(
                "Expected '>' or '@' at record start, got {:?}",
                header.chars().next()
            ))),
        }
    }

    /// Iterate over all records.
    pub fn records(self) -> Records<R> {
        Records {
            reader: self,
            done: false,
        }
    }

    /// Next header line, skipping blanks.
    fn take_header(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.peeked.take() {
            return Ok(Some(line));
        }
        loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(line)),
            }
        }
    }

    fn read_fasta_record(&mut self, header: String) -> Result<Option<SeqItem>> {
        let name = header_name(&header);
        let mut lines = vec![header];

        loop {
            match self.next_line()? {
                None => break,
                Some(line) if line.starts_with('>') => {
                    self.peeked = Some(line);
                    break;
                }
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => lines.push(line),
            }
        }

        if lines.len() < 2 {
            return Err(self.parse_error(format!("Record '{}' has no sequence", name)));
        }
        Ok(Some(SeqItem::new(name, lines, SeqFormat::Fasta)))
    }

    fn read_fastq_record(&mut self, header: String) -> Result<Option<SeqItem>> {
        let name = header_name(&header);
        let sequence = self
            .next_line()?
            .ok_or_else(|| self.parse_error(format!("Record '{}' truncated at sequence", name)))?;
        let separator = self
            .next_line()?
            .ok_or_else(|| self.parse_error(format!("Record '{}' truncated at separator", name)))?;
        if !separator.starts_with('+') {
            return Err(self.parse_error(format!(
                "Record '{}': expected '+' separator, got '{}'",
                name, separator
            )));
        }
        let qualities = self
            .next_line()?
            .ok_or_else(|| self.parse_error(format!("Record '{}' truncated at qualities", name)))?;
        if qualities.len() != sequence.len() {
            return Err(self.parse_error(format!(
                "Record '{}': {} quality values for {} bases",
                name,
                qualities.len(),
                sequence.len()
            )));
        }

        let lines = vec![header, sequence, separator, qualities];
        Ok(Some(SeqItem::new(name, lines, SeqFormat::Fastq)))
    }
}

/// Iterator over the records of a [`FastxReader`].
pub struct Records<R: Read> {
    reader: FastxReader<R>,
    done: bool,
}

impl<R: Read> Iterator for Records<R> {
    type Item = Result<SeqItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Record name: the header text up to the first space, marker stripped.
fn header_name(header: &str) -> String {
    let body = &header.as_bytes()[1..];
    let end = memchr(b' ', body).unwrap_or(body.len());
    String::from_utf8_lossy(&body[..end]).into_owned()
}

/// Detect the framing of a sequence file from its first record marker.
pub fn detect_format<P: AsRef<Path>>(path: P) -> Result<SeqFormat> {
    let file = File::open(&path)?;
    let reader = BufReader::new(file);
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return match trimmed.as_bytes()[0] {
            b'>' => Ok(SeqFormat::Fasta),
            b'@' => Ok(SeqFormat::Fastq),
            _ => Err(Error::IncompatibleFormat(format!(
                "{}: unrecognized record marker",
                path.as_ref().display()
            ))),
        };
    }
    Err(Error::IncompatibleFormat(format!(
        "{}: empty file",
        path.as_ref().display()
    )))
}

/// Chain the records of several sequence files into one stream.
///
/// Files are opened eagerly so missing paths fail before any sorting starts.
pub fn read_seq_files(paths: &[impl AsRef<Path>]) -> Result<impl Iterator<Item = Result<SeqItem>>> {
    let mut readers = Vec::with_capacity(paths.len());
    for path in paths {
        readers.push(FastxReader::from_path(path)?);
    }
    Ok(readers.into_iter().flat_map(FastxReader::records))
}

/// Write one record, reproducing its framing lines.
pub fn write_record<W: Write>(writer: &mut W, record: &SeqItem) -> io::Result<()> {
    for line in &record.lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
