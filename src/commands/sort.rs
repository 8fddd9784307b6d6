//! Sort command implementation.
//!
//! Dispatches on the ordering key: content and name keys run the record
//! stream through the external merge-sort engine; the coordinate key runs
//! the input files through the aligner pipeline and reconstitutes records
//! from the sorted alignment stream.

use crate::config::ToolConfig;
use crate::error::{Error, Result};
use crate::extsort::ExternalSorter;
use crate::fastx::{read_seq_files, write_record};
use crate::pipeline::sort_by_coordinate;
use crate::record::{SeqItem, SequenceRecord};
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

/// Records held in memory per sort run unless the caller says otherwise.
pub const DEFAULT_MAX_ITEMS_IN_MEMORY: usize = 500_000;

/// Ordering key selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Lexicographic on the sequence text.
    Sequence,
    /// Lexicographic on the record name.
    Name,
    /// Position in a reference, via the aligner pipeline.
    Coordinate,
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "seq" => Ok(SortKey::Sequence),
            "name" => Ok(SortKey::Name),
            "coordinate" => Ok(SortKey::Coordinate),
            other => Err(Error::usage(format!("Non-supported sorting key: {}", other))),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortKey::Sequence => "seq",
            SortKey::Name => "name",
            SortKey::Coordinate => "coordinate",
        };
        f.write_str(name)
    }
}

/// Sort command configuration.
#[derive(Debug, Clone)]
pub struct SortCommand {
    pub key: SortKey,
    /// Reference to map against; required for the coordinate key.
    pub reference: Option<PathBuf>,
    /// Directory the aligner index is materialized under.
    pub index_dir: Option<PathBuf>,
    /// Item-count budget for in-memory sort runs.
    pub max_in_memory: usize,
}

impl SortCommand {
    pub fn new(key: SortKey) -> Self {
        Self {
            key,
            reference: None,
            index_dir: None,
            max_in_memory: DEFAULT_MAX_ITEMS_IN_MEMORY,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<PathBuf>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.index_dir = Some(dir.into());
        self
    }

    pub fn with_memory_budget(mut self, max_items: usize) -> Self {
        self.max_in_memory = max_items;
        self
    }

    /// Ordered record stream over the given input files.
    pub fn sorted_records(
        &self,
        config: &ToolConfig,
        inputs: &[PathBuf],
    ) -> Result<Box<dyn Iterator<Item = Result<SeqItem>>>> {
        match self.key {
            SortKey::Sequence => {
                let records = read_seq_files(inputs)?;
                let sorter = ExternalSorter::new(self.max_in_memory)
                    .with_scratch_dir(&config.scratch_dir);
                Ok(Box::new(
                    sorter.sort_results(records, |r: &SeqItem| r.sequence())?,
                ))
            }
            SortKey::Name => {
                let records = read_seq_files(inputs)?;
                let sorter = ExternalSorter::new(self.max_in_memory)
                    .with_scratch_dir(&config.scratch_dir);
                Ok(Box::new(
                    sorter.sort_results(records, |r: &SeqItem| r.name().to_string())?,
                ))
            }
            SortKey::Coordinate => {
                let reference = self.reference.as_deref().ok_or_else(|| {
                    Error::usage("Sorting by coordinate requires a reference file")
                })?;
                Ok(Box::new(sort_by_coordinate(
                    config,
                    inputs,
                    reference,
                    self.index_dir.as_deref(),
                )?))
            }
        }
    }

    /// Sort the inputs and write the ordered records.
    pub fn run<W: Write>(
        &self,
        config: &ToolConfig,
        inputs: &[PathBuf],
        output: &mut W,
    ) -> Result<()> {
        let records = self.sorted_records(config, inputs)?;
        let mut out = BufWriter::with_capacity(256 * 1024, output);
        for record in records {
            write_record(&mut out, &record?)?;
        }
        out.flush()?;
        Ok(())
    }
}
