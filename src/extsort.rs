//! External merge sort for record streams.
//!
//! Records are collected into runs bounded by an explicit item-count budget.
//! Each full run is sorted in memory (rayon) and spilled to a scratch file;
//! the output stream performs a k-way merge over the spilled runs plus the
//! final in-memory run. When the whole input fits in one run, nothing
//! touches disk.
//!
//! Ordering is fully deterministic: the merge comparator is
//! `(key, input ordinal)`, so records with equal keys come out in their
//! original stream order even across run boundaries.
//!
//! All spill files live in one temporary directory owned by the returned
//! stream; it is removed when the stream is dropped, whether the caller
//! exhausted it, abandoned it early, or hit an error.

use crate::error::{Error, Result};
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::env;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Write};
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::debug;

/// Disk-spilling sorter parameterized by a key-extraction function.
#[derive(Debug, Clone)]
pub struct ExternalSorter {
    /// Records held in memory before a run is spilled.
    max_items: usize,
    /// Directory for spill files.
    scratch_dir: PathBuf,
}

impl ExternalSorter {
    /// Create a sorter that spills once a run reaches `max_items` records.
    pub fn new(max_items: usize) -> Self {
        Self {
            max_items: max_items.max(1),
            scratch_dir: env::temp_dir(),
        }
    }

    /// Set the directory spill files are written under.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Sort an infallible record stream.
    pub fn sort<I, R, K, F>(&self, records: I, key: F) -> Result<SortedRecords<R, K, F>>
    where
        I: IntoIterator<Item = R>,
        R: Serialize + DeserializeOwned + Send,
        K: Ord + Send,
        F: Fn(&R) -> K,
    {
        self.sort_results(records.into_iter().map(Ok), key)
    }

    /// Sort a fallible record stream; the first input error aborts the sort.
    pub fn sort_results<I, R, K, F>(&self, records: I, key: F) -> Result<SortedRecords<R, K, F>>
    where
        I: IntoIterator<Item = Result<R>>,
        R: Serialize + DeserializeOwned + Send,
        K: Ord + Send,
        F: Fn(&R) -> K,
    {
        let mut scratch: Option<TempDir> = None;
        let mut runs: Vec<PathBuf> = Vec::new();
        let mut run: Vec<(u64, R)> = Vec::new();

        for (ordinal, record) in records.into_iter().enumerate() {
            run.push((ordinal as u64, record?));
            if run.len() >= self.max_items {
                if scratch.is_none() {
                    scratch = Some(
                        tempfile::Builder::new()
                            .prefix("seqorder-sort-")
                            .tempdir_in(&self.scratch_dir)?,
                    );
                }
                let dir = scratch.as_ref().expect("scratch dir was just created");
                let path = dir.path().join(format!("run_{}.bin", runs.len()));
                let sorted = sort_run(std::mem::take(&mut run), &key);
                debug!(run = runs.len(), items = sorted.len(), "spilling sorted run");
                spill_run(&sorted, &path)?;
                runs.push(path);
            }
        }

        if runs.is_empty() {
            // Whole input fit in one run: sort and serve from memory.
            let sorted = sort_run(run, &key);
            return Ok(SortedRecords {
                state: State::Memory(
                    sorted
                        .into_iter()
                        .map(|(_, r)| r)
                        .collect::<Vec<_>>()
                        .into_iter(),
                ),
            });
        }

        let mut sources: Vec<RunSource<R>> = Vec::with_capacity(runs.len() + 1);
        for path in &runs {
            sources.push(RunSource::Disk(BufReader::new(File::open(path)?)));
        }
        if !run.is_empty() {
            sources.push(RunSource::Mem(sort_run(run, &key).into_iter()));
        }

        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (index, source) in sources.iter_mut().enumerate() {
            if let Some((ordinal, record)) = source.next_entry()? {
                heap.push(Reverse(HeapEntry {
                    key: key(&record),
                    ordinal,
                    source: index,
                    record,
                }));
            }
        }

        Ok(SortedRecords {
            state: State::Merge {
                sources,
                heap,
                key,
                _scratch: scratch.expect("spilled runs imply a scratch dir"),
            },
        })
    }
}

/// Sort one run by `(key, ordinal)` with keys computed once per record.
fn sort_run<R, K, F>(run: Vec<(u64, R)>, key: &F) -> Vec<(u64, R)>
where
    R: Send,
    K: Ord + Send,
    F: Fn(&R) -> K,
{
    let mut decorated: Vec<(K, u64, R)> = run
        .into_iter()
        .map(|(ordinal, record)| (key(&record), ordinal, record))
        .collect();
    decorated.par_sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    decorated
        .into_iter()
        .map(|(_, ordinal, record)| (ordinal, record))
        .collect()
}

fn spill_run<R: Serialize>(run: &[(u64, R)], path: &PathBuf) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for entry in run {
        bincode::serialize_into(&mut writer, entry).map_err(from_bincode)?;
    }
    writer.flush()?;
    Ok(())
}

fn from_bincode(err: bincode::Error) -> Error {
    match *err {
        bincode::ErrorKind::Io(io_err) => Error::Io(io_err),
        other => Error::Io(io::Error::new(ErrorKind::InvalidData, other.to_string())),
    }
}

/// One open run in the merge frontier.
enum RunSource<R> {
    Disk(BufReader<File>),
    Mem(std::vec::IntoIter<(u64, R)>),
}

impl<R: DeserializeOwned> RunSource<R> {
    fn next_entry(&mut self) -> Result<Option<(u64, R)>> {
        match self {
            RunSource::Mem(iter) => Ok(iter.next()),
            RunSource::Disk(reader) => match bincode::deserialize_from(reader) {
                Ok(entry) => Ok(Some(entry)),
                Err(err) => {
                    if let bincode::ErrorKind::Io(ref io_err) = *err {
                        if io_err.kind() == ErrorKind::UnexpectedEof {
                            return Ok(None);
                        }
                    }
                    Err(from_bincode(err))
                }
            },
        }
    }
}

/// Head record of one run, ordered by `(key, ordinal)`.
struct HeapEntry<K, R> {
    key: K,
    ordinal: u64,
    source: usize,
    record: R,
}

impl<K: Ord, R> PartialEq for HeapEntry<K, R> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.ordinal == other.ordinal
    }
}

impl<K: Ord, R> Eq for HeapEntry<K, R> {}

impl<K: Ord, R> PartialOrd for HeapEntry<K, R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, R> Ord for HeapEntry<K, R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.ordinal.cmp(&other.ordinal))
    }
}

enum State<R, K, F> {
    /// Single in-memory run, already sorted.
    Memory(std::vec::IntoIter<R>),
    /// K-way merge over spilled runs plus any final in-memory run.
    Merge {
        sources: Vec<RunSource<R>>,
        heap: BinaryHeap<Reverse<HeapEntry<K, R>>>,
        key: F,
        _scratch: TempDir,
    },
    /// A merge error ended iteration.
    Failed,
}

/// Lazily consumable, fully ordered record stream.
pub struct SortedRecords<R, K, F> {
    state: State<R, K, F>,
}

impl<R, K, F> Iterator for SortedRecords<R, K, F>
where
    R: DeserializeOwned,
    K: Ord,
    F: Fn(&R) -> K,
{
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = match &mut self.state {
            State::Memory(iter) => return iter.next().map(Ok),
            State::Failed => return None,
            State::Merge {
                sources, heap, key, ..
            } => {
                let Reverse(entry) = heap.pop()?;
                match sources[entry.source].next_entry() {
                    Ok(Some((ordinal, record))) => {
                        let next_key = key(&record);
                        heap.push(Reverse(HeapEntry {
                            key: next_key,
                            ordinal,
                            source: entry.source,
                            record,
                        }));
                        Ok(entry.record)
                    }
                    Ok(None) => Ok(entry.record),
                    Err(err) => Err(err),
                }
            }
        };

        match step {
            Ok(record) => Some(Ok(record)),
            Err(err) => {
                self.state = State::Failed;
                Some(Err(err))
            }
        }
    }
}
