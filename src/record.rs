//! Sequence record representations.
//!
//! Two in-memory representations exist: [`SeqItem`] keeps the raw text lines
//! of a record exactly as framed on disk, [`AnnotatedRecord`] carries parsed
//! fields and per-base qualities. The ordering components are generic over
//! the [`SequenceRecord`] accessor trait and never inspect the concrete
//! variant.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Text framing of a sequence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeqFormat {
    /// Header line plus one or more sequence lines.
    Fasta,
    /// Four-line records: header, sequence, separator, qualities.
    Fastq,
    /// FASTQ with sequence and qualities wrapped over several lines.
    FastqMultiline,
}

impl SeqFormat {
    /// True for the FASTA family.
    #[inline]
    pub fn is_fasta(&self) -> bool {
        matches!(self, SeqFormat::Fasta)
    }

    /// True for the FASTQ family.
    #[inline]
    pub fn is_fastq(&self) -> bool {
        matches!(self, SeqFormat::Fastq | SeqFormat::FastqMultiline)
    }
}

impl fmt::Display for SeqFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeqFormat::Fasta => "fasta",
            SeqFormat::Fastq => "fastq",
            SeqFormat::FastqMultiline => "fastq-multiline",
        };
        f.write_str(name)
    }
}

impl FromStr for SeqFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "fasta" => Ok(SeqFormat::Fasta),
            "fastq" => Ok(SeqFormat::Fastq),
            "fastq-multiline" => Ok(SeqFormat::FastqMultiline),
            other => Err(Error::IncompatibleFormat(other.to_string())),
        }
    }
}

/// Accessor capabilities shared by every record representation.
pub trait SequenceRecord {
    /// Record name (the first word of the header).
    fn name(&self) -> &str;

    /// Header text after the name, if any.
    fn description(&self) -> Option<&str>;

    /// The sequence as a single contiguous string.
    fn sequence(&self) -> String;

    /// Sequence length in bases.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Framing of the source the record came from.
    fn format(&self) -> SeqFormat;
}

/// Minimal line-based record: the raw text lines plus a format tag.
///
/// `lines[0]` is the full header including its marker character; the
/// remaining lines carry sequence (and, for FASTQ, separator and qualities)
/// without trailing newlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqItem {
    pub name: String,
    pub lines: Vec<String>,
    pub format: SeqFormat,
}

impl SeqItem {
    pub fn new(name: impl Into<String>, lines: Vec<String>, format: SeqFormat) -> Self {
        Self {
            name: name.into(),
            lines,
            format,
        }
    }

    /// Lines holding sequence text, honoring the format's framing.
    fn sequence_lines(&self) -> &[String] {
        match self.format {
            SeqFormat::Fastq => self.lines.get(1..2).unwrap_or(&[]),
            SeqFormat::Fasta | SeqFormat::FastqMultiline => {
                let body = self.lines.get(1..).unwrap_or(&[]);
                let end = body
                    .iter()
                    .position(|l| l.starts_with('+'))
                    .unwrap_or(body.len());
                &body[..end]
            }
        }
    }
}

impl SequenceRecord for SeqItem {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        let header = self.lines.first()?;
        let (_, desc) = header.split_once(' ')?;
        let desc = desc.trim_end();
        if desc.is_empty() {
            None
        } else {
            Some(desc)
        }
    }

    fn sequence(&self) -> String {
        self.sequence_lines().concat()
    }

    fn len(&self) -> usize {
        self.sequence_lines().iter().map(|l| l.len()).sum()
    }

    fn format(&self) -> SeqFormat {
        self.format
    }
}

/// Rich record with parsed fields and optional per-base qualities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedRecord {
    pub id: String,
    pub description: Option<String>,
    pub sequence: String,
    /// Phred quality scores, one per base.
    pub qualities: Option<Vec<u8>>,
    pub format: SeqFormat,
}

impl AnnotatedRecord {
    pub fn new(id: impl Into<String>, sequence: impl Into<String>, format: SeqFormat) -> Self {
        Self {
            id: id.into(),
            description: None,
            sequence: sequence.into(),
            qualities: None,
            format,
        }
    }
}

impl SequenceRecord for AnnotatedRecord {
    fn name(&self) -> &str {
        &self.id
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn sequence(&self) -> String {
        self.sequence.clone()
    }

    fn len(&self) -> usize {
        self.sequence.len()
    }

    fn format(&self) -> SeqFormat {
        self.format
    }
}
