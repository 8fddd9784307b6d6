//! Minimal SAM text reading and conversion back into sequence records.
//!
//! Only the columns the ordering pipeline needs are modeled. Header lines
//! are skipped; alignment lines are tab-separated with eleven mandatory
//! fields.

use crate::error::{Error, Result};
use crate::record::{SeqFormat, SeqItem};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// One alignment line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamRecord {
    pub qname: String,
    pub flag: u16,
    pub rname: String,
    /// 1-based leftmost mapping position, 0 for unmapped.
    pub pos: u64,
    pub seq: String,
    /// Phred qualities as ASCII, `*` when absent.
    pub qual: String,
}

impl SamRecord {
    /// Parse one alignment line.
    pub fn parse(line: &str, line_number: usize) -> Result<Self> {
        let mut fields = line.split('\t');
        let mut field = |name: &str| {
            fields.next().ok_or_else(|| Error::Parse {
                line: line_number,
                message: format!("Missing SAM field: {}", name),
            })
        };

        let qname = field("qname")?.to_string();
        let flag = field("flag")?.parse::<u16>().map_err(|_| Error::Parse {
            line: line_number,
            message: "Invalid flag field".to_string(),
        })?;
        let rname = field("rname")?.to_string();
        let pos = field("pos")?.parse::<u64>().map_err(|_| Error::Parse {
            line: line_number,
            message: "Invalid position field".to_string(),
        })?;
        let _mapq = field("mapq")?;
        let _cigar = field("cigar")?;
        let _rnext = field("rnext")?;
        let _pnext = field("pnext")?;
        let _tlen = field("tlen")?;
        let seq = field("seq")?.to_string();
        let qual = field("qual")?.to_string();

        Ok(Self {
            qname,
            flag,
            rname,
            pos,
            seq,
            qual,
        })
    }

    /// True when the read did not map to any reference.
    #[inline]
    pub fn is_unmapped(&self) -> bool {
        self.flag & 0x4 != 0
    }
}

/// Streaming SAM reader; header lines are skipped.
pub struct SamReader<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
}

impl SamReader<File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read> SamReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
        }
    }

    /// Read the next alignment record.
    pub fn read_record(&mut self) -> Result<Option<SamRecord>> {
        let mut buffer = String::with_capacity(256);
        loop {
            buffer.clear();
            let bytes_read = self.reader.read_line(&mut buffer)?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = buffer.trim_end_matches(['\n', '\r']);
            if line.is_empty() || line.starts_with('@') {
                continue;
            }
            return SamRecord::parse(line, self.line_number).map(Some);
        }
    }

    /// Iterate over all alignment records.
    pub fn records(self) -> SamRecords<R> {
        SamRecords {
            reader: self,
            done: false,
        }
    }
}

pub struct SamRecords<R: Read> {
    reader: SamReader<R>,
    done: bool,
}

impl<R: Read> Iterator for SamRecords<R> {
    type Item = Result<SamRecord>;

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

/// Convert an alignment back into a sequence record with the framing of
/// `format`.
///
/// FASTA-family output is a two-line record; FASTQ-family output is a
/// four-line record and requires the alignment to carry qualities.
pub fn aligned_to_record(aligned: &SamRecord, format: SeqFormat) -> Result<SeqItem> {
    let lines = if format.is_fasta() {
        vec![format!(">{}", aligned.qname), aligned.seq.clone()]
    } else if format.is_fastq() {
        if aligned.qual == "*" {
            return Err(Error::IncompatibleFormat(format!(
                "Alignment '{}' carries no qualities for {} output",
                aligned.qname, format
            )));
        }
        vec![
            format!("@{}", aligned.qname),
            aligned.seq.clone(),
            "+".to_string(),
            aligned.qual.clone(),
        ]
    } else {
        return Err(Error::IncompatibleFormat(format.to_string()));
    };

    Ok(SeqItem::new(aligned.qname.clone(), lines, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SequenceRecord;

    const SAM: &str = "@HD\tVN:1.6\tSO:coordinate\n\
        @SQ\tSN:ref1\tLN:1000\n\
        read1\t0\tref1\t10\t60\t4M\t*\t0\t0\tACGT\tIIII\n\
        read2\t4\t*\t0\t0\t*\t*\t0\t0\tGGCC\t*\n";

    #[test]
    fn test_reader_skips_headers() {
        let records: Vec<_> = SamReader::new(SAM.as_bytes())
            .records()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].qname, "read1");
        assert_eq!(records[0].rname, "ref1");
        assert_eq!(records[0].pos, 10);
        assert!(!records[0].is_unmapped());
        assert!(records[1].is_unmapped());
    }

    #[test]
    fn test_short_line_is_parse_error() {
        let result = SamRecord::parse("read1\t0\tref1", 7);
        assert!(matches!(result, Err(Error::Parse { line: 7, .. })));
    }

    #[test]
    fn test_adapt_to_fasta_framing() {
        let aligned = SamRecord::parse("read1\t0\tref1\t10\t60\t4M\t*\t0\t0\tACGT\tIIII", 1).unwrap();
        let record = aligned_to_record(&aligned, SeqFormat::Fasta).unwrap();

        assert_eq!(record.lines, vec![">read1".to_string(), "ACGT".to_string()]);
        assert_eq!(record.sequence(), "ACGT");
    }

    #[test]
    fn test_adapt_to_fastq_framing() {
        let aligned = SamRecord::parse("read1\t0\tref1\t10\t60\t4M\t*\t0\t0\tACGT\tIIII", 1).unwrap();
        let record = aligned_to_record(&aligned, SeqFormat::Fastq).unwrap();

        assert_eq!(
            record.lines,
            vec![
                "@read1".to_string(),
                "ACGT".to_string(),
                "+".to_string(),
                "IIII".to_string()
            ]
        );
    }

    #[test]
    fn test_missing_qualities_cannot_become_fastq() {
        let aligned = SamRecord::parse("read2\t4\t*\t0\t0\t*\t*\t0\t0\tGGCC\t*", 1).unwrap();
        let result = aligned_to_record(&aligned, SeqFormat::Fastq);
        assert!(matches!(result, Err(Error::IncompatibleFormat(_))));
    }
}
