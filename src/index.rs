//! Aligner index management.
//!
//! An index is a fixed set of artifact files next to the reference; the
//! presence of the `.bwt` signature file implies the whole set is complete.
//! Construction is idempotent: a second call on the same reference finds the
//! signature and runs nothing.

use crate::config::ToolConfig;
use crate::error::{Error, Result};
use memchr::memchr_iter;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Extension of the artifact whose presence marks an index as complete.
const INDEX_SIGNATURE_EXT: &str = "bwt";

/// References above this record count are indexed with the algorithm
/// variant tuned for many short sequences.
const LARGE_REFERENCE_RECORDS: usize = 10_000;

/// Check whether an index already exists for the given path.
pub fn index_exists(index_path: &Path) -> bool {
    signature_path(index_path).exists()
}

fn signature_path(index_path: &Path) -> PathBuf {
    let mut name = index_path.as_os_str().to_os_string();
    name.push(".");
    name.push(INDEX_SIGNATURE_EXT);
    PathBuf::from(name)
}

/// Ensure an aligner index exists for `reference`, building it if missing.
///
/// Without `target_dir` the index lands next to the reference file. With
/// `target_dir` the index is materialized there under the reference's base
/// name; the reference content is never copied, a symlink stands in for it.
/// When the destination already holds a same-named file that is not yet an
/// index, the build happens in an isolated scratch directory and only the
/// new index artifacts are copied over.
pub fn get_or_create_index(
    config: &ToolConfig,
    reference: &Path,
    target_dir: Option<&Path>,
) -> Result<PathBuf> {
    let reference = reference.canonicalize()?;
    let index_path = match target_dir {
        Some(dir) => dir.join(reference.file_name().ok_or_else(|| {
            Error::usage(format!("Reference has no file name: {}", reference.display()))
        })?),
        None => reference.clone(),
    };

    if index_exists(&index_path) {
        debug!(index = %index_path.display(), "reusing existing aligner index");
        return Ok(index_path);
    }

    if index_path.exists() {
        // A same-named file occupies the destination: build in isolation and
        // copy only the new artifacts, never the reference itself.
        let scratch = tempfile::Builder::new()
            .prefix("seqorder-index-")
            .tempdir_in(&config.scratch_dir)?;
        let basename = index_path
            .file_name()
            .expect("index path has a file name");
        let scratch_index = scratch.path().join(basename);
        symlink(&reference, &scratch_index)?;
        build_index(config, &scratch_index)?;

        let dest_dir = index_path
            .parent()
            .ok_or_else(|| Error::usage("Index path has no parent directory".to_string()))?;
        for entry in fs::read_dir(scratch.path())? {
            let entry = entry?;
            if entry.file_name() == basename {
                continue;
            }
            fs::copy(entry.path(), dest_dir.join(entry.file_name()))?;
        }
    } else {
        symlink(&reference, &index_path)?;
        build_index(config, &index_path)?;
    }

    Ok(index_path)
}

/// Run the index-build subprocess for the reference at `index_path`.
fn build_index(config: &ToolConfig, index_path: &Path) -> Result<()> {
    let records = count_fasta_records(index_path)?;
    let algorithm = if records > LARGE_REFERENCE_RECORDS {
        "bwtsw"
    } else {
        "is"
    };
    let binary = config.binary("bwa");
    info!(
        reference = %index_path.display(),
        records,
        algorithm,
        "building aligner index"
    );

    let output = Command::new(&binary)
        .arg("index")
        .arg("-a")
        .arg(algorithm)
        .arg(index_path)
        .output()
        .map_err(|source| Error::Spawn {
            tool: "bwa index",
            binary: binary.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(Error::Tool {
            tool: "bwa index",
            status: output.status,
            diagnostics: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

/// Number of records in a FASTA reference (count of `>` header lines).
fn count_fasta_records(path: &Path) -> Result<usize> {
    let data = {
        let mut buf = Vec::new();
        fs::File::open(path)?.read_to_end(&mut buf)?;
        buf
    };
    let mut count = usize::from(data.first() == Some(&b'>'));
    for pos in memchr_iter(b'\n', &data) {
        if data.get(pos + 1) == Some(&b'>') {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(original, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn symlink(original: &Path, link: &Path) -> Result<()> {
    // Zero-copy references are unavailable: fall back to a copy.
    fs::copy(original, link)?;
    Ok(())
}
