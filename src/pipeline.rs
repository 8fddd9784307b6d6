//! Subprocess pipeline for coordinate ordering.
//!
//! The aligner's stdout is an OS pipe that becomes the coordinate sorter's
//! stdin. Back-pressure is the pipe itself: a stalled sorter blocks the
//! aligner's writes once the buffer fills. After the sorter spawns, this
//! process holds no copy of the pipe's write end, so an early sorter exit
//! reaches the aligner as a broken pipe instead of leaving it blocked.
//!
//! Each stage's stderr is always captured to a file; on failure its content
//! and location are embedded in the returned error.

use crate::config::ToolConfig;
use crate::error::{Error, Result};
use crate::fastx::detect_format;
use crate::index::get_or_create_index;
use crate::record::{SeqFormat, SeqItem};
use crate::sam::{aligned_to_record, SamReader, SamRecords};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Read-group header tags the aligner accepts.
pub const READ_GROUP_TAGS: [&str; 4] = ["ID", "LB", "SM", "PL"];

/// Stderr of one pipeline stage, captured to a file.
struct StderrCapture {
    path: PathBuf,
    _guard: Option<NamedTempFile>,
}

impl StderrCapture {
    /// Open the capture target: the caller's log path, or a scratch file.
    fn create(
        log_path: Option<&Path>,
        scratch_dir: &Path,
        prefix: &str,
    ) -> Result<(File, StderrCapture)> {
        match log_path {
            Some(path) => {
                let file = File::create(path)?;
                Ok((
                    file,
                    StderrCapture {
                        path: path.to_path_buf(),
                        _guard: None,
                    },
                ))
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix(prefix)
                    .suffix(".stderr")
                    .tempfile_in(scratch_dir)?;
                let file = temp.as_file().try_clone()?;
                Ok((
                    file,
                    StderrCapture {
                        path: temp.path().to_path_buf(),
                        _guard: Some(temp),
                    },
                ))
            }
        }
    }

    /// Captured diagnostics with the log location appended.
    fn read(&self) -> String {
        let content = std::fs::read_to_string(&self.path).unwrap_or_default();
        format!(
            "{}\n(stderr log: {})",
            content.trim_end(),
            self.path.display()
        )
    }
}

/// One running subprocess of the pipeline.
pub struct PipelineStage {
    tool: &'static str,
    child: Child,
    stderr: StderrCapture,
}

impl PipelineStage {
    /// Location of this stage's captured stderr.
    pub fn stderr_path(&self) -> &Path {
        &self.stderr.path
    }

    /// Transfer ownership of this stage's stdout to a downstream consumer.
    pub fn take_stdout(&mut self) -> Result<ChildStdout> {
        self.child
            .stdout
            .take()
            .ok_or_else(|| Error::usage(format!("{} output was already taken", self.tool)))
    }

    /// Wait for the stage and check its exit code.
    pub fn wait(mut self) -> Result<()> {
        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Tool {
                tool: self.tool,
                status,
                diagnostics: self.stderr.read(),
            })
        }
    }

    /// Terminate the stage without checking its exit code.
    fn abort(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// The aligner invocation: `bwa mem` over one index and a set of inputs.
#[derive(Debug, Clone, Default)]
pub struct AlignCommand {
    index: PathBuf,
    unpaired: Vec<PathBuf>,
    paired: Option<(PathBuf, PathBuf)>,
    read_group: Vec<(String, String)>,
    extra_args: Vec<String>,
    log_path: Option<PathBuf>,
}

impl AlignCommand {
    pub fn new(index: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
            ..Self::default()
        }
    }

    /// Map a set of unpaired input files.
    pub fn unpaired_inputs(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.unpaired.extend(paths);
        self
    }

    /// Map one pair of paired-end input files.
    pub fn paired_inputs(mut self, forward: impl Into<PathBuf>, reverse: impl Into<PathBuf>) -> Self {
        self.paired = Some((forward.into(), reverse.into()));
        self
    }

    /// Add a read-group header tag.
    pub fn read_group_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.read_group.push((key.into(), value.into()));
        self
    }

    /// Pass an extra option through to the aligner.
    pub fn extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Capture the aligner's stderr at a fixed path instead of scratch.
    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Check the input invariants. Runs before any subprocess spawns.
    fn validate(&self) -> Result<()> {
        if self.unpaired.is_empty() && self.paired.is_none() {
            return Err(Error::usage("At least one file to map is required"));
        }
        if !self.unpaired.is_empty() && self.paired.is_some() {
            return Err(Error::usage(
                "Unpaired and paired reads can not be mapped together",
            ));
        }
        for (key, _) in &self.read_group {
            if !READ_GROUP_TAGS.contains(&key.as_str()) {
                return Err(Error::usage(format!(
                    "The readgroup header tag is not valid: {}",
                    key
                )));
            }
        }
        if !self.read_group.is_empty() && !self.read_group.iter().any(|(k, _)| k == "ID") {
            return Err(Error::usage("A read group requires the ID tag"));
        }
        Ok(())
    }

    /// Render the `@RG` header line, ID tag first.
    fn read_group_header(&self) -> Option<String> {
        if self.read_group.is_empty() {
            return None;
        }
        let mut line = String::from("@RG");
        for (key, value) in self
            .read_group
            .iter()
            .filter(|(k, _)| k == "ID")
            .chain(self.read_group.iter().filter(|(k, _)| k != "ID"))
        {
            line.push_str("\\t");
            line.push_str(key);
            line.push(':');
            line.push_str(value);
        }
        Some(line)
    }

    /// Spawn the aligner with its stdout piped.
    pub fn spawn(&self, config: &ToolConfig) -> Result<PipelineStage> {
        self.validate()?;

        let binary = config.binary("bwa");
        let mut cmd = Command::new(&binary);
        cmd.arg("mem").arg("-t").arg(config.threads.to_string());
        if let Some(read_group) = self.read_group_header() {
            cmd.arg("-R").arg(read_group);
        }
        cmd.args(&self.extra_args);
        cmd.arg(&self.index);
        if let Some((forward, reverse)) = &self.paired {
            cmd.arg(forward).arg(reverse);
        }
        cmd.args(&self.unpaired);

        let (stderr_file, stderr) =
            StderrCapture::create(self.log_path.as_deref(), &config.scratch_dir, "bwa-mem-")?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr_file));

        let input_count = self.unpaired.len() + if self.paired.is_some() { 2 } else { 0 };
        info!(index = %self.index.display(), inputs = input_count, "spawning aligner");
        let child = cmd.spawn().map_err(|source| Error::Spawn {
            tool: "bwa mem",
            binary: binary.clone(),
            source,
        })?;

        Ok(PipelineStage {
            tool: "bwa mem",
            child,
            stderr,
        })
    }
}

/// The coordinate-sort invocation: Picard `SortSam` reading the upstream
/// stage's stdout.
#[derive(Debug, Clone)]
pub struct CoordinateSortCommand {
    output: PathBuf,
    sort_key: String,
    lenient: bool,
    log_path: Option<PathBuf>,
}

impl CoordinateSortCommand {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            sort_key: "coordinate".to_string(),
            lenient: true,
            log_path: None,
        }
    }

    /// Sort by a different key than `coordinate`.
    pub fn sort_key(mut self, key: impl Into<String>) -> Self {
        self.sort_key = key.into();
        self
    }

    /// Fail on records the sorter would otherwise tolerate.
    pub fn strict(mut self) -> Self {
        self.lenient = false;
        self
    }

    /// Capture the sorter's stderr at a fixed path instead of scratch.
    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Take over `upstream`'s output, sort it, and wait for both stages.
    pub fn run(&self, config: &ToolConfig, mut upstream: PipelineStage) -> Result<()> {
        let upstream_out = match upstream.take_stdout() {
            Ok(out) => out,
            Err(err) => {
                upstream.abort();
                return Err(err);
            }
        };

        let binary = config.binary("picard");
        let (stderr_file, stderr) =
            StderrCapture::create(self.log_path.as_deref(), &config.scratch_dir, "sortsam-")?;
        let stringency = if self.lenient { "LENIENT" } else { "STRICT" };

        let mut cmd = Command::new(&binary);
        cmd.arg("SortSam")
            .arg("I=/dev/stdin")
            .arg(format!("O={}", self.output.display()))
            .arg(format!("SORT_ORDER={}", self.sort_key))
            .arg(format!("TMP_DIR={}", config.scratch_dir.display()))
            .arg(format!("VALIDATION_STRINGENCY={}", stringency))
            .stdin(Stdio::from(upstream_out))
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file));

        debug!(output = %self.output.display(), key = %self.sort_key, "spawning coordinate sorter");
        let mut sorter = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                upstream.abort();
                return Err(Error::Spawn {
                    tool: "picard SortSam",
                    binary: binary.clone(),
                    source,
                });
            }
        };
        // From here the sorter owns the pipe's read end and this process
        // holds no write end.

        let status = match sorter.wait() {
            Ok(status) => status,
            Err(err) => {
                upstream.abort();
                return Err(err.into());
            }
        };
        if !status.success() {
            upstream.abort();
            return Err(Error::Tool {
                tool: "picard SortSam",
                status,
                diagnostics: stderr.read(),
            });
        }
        upstream.wait()
    }
}

/// Ordered records reconstituted from a sorted alignment file.
pub struct SortedAlignments {
    records: SamRecords<File>,
    format: SeqFormat,
    _sorted: NamedTempFile,
}

impl Iterator for SortedAlignments {
    type Item = Result<SeqItem>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.records.next()? {
            Ok(aligned) => Some(aligned_to_record(&aligned, self.format)),
            Err(err) => Some(Err(err)),
        }
    }
}

/// Order sequence files by position in a reference.
///
/// Builds (or reuses) the aligner index, streams the inputs through the
/// aligner into the coordinate sorter, and reconstitutes records in their
/// original framing from the sorted alignment stream.
pub fn sort_by_coordinate(
    config: &ToolConfig,
    inputs: &[PathBuf],
    reference: &Path,
    index_dir: Option<&Path>,
) -> Result<SortedAlignments> {
    if inputs.is_empty() {
        return Err(Error::usage("At least one input file is required"));
    }
    // The output framing must be known before anything spawns.
    let format = detect_format(&inputs[0])?;

    let index_path = get_or_create_index(config, reference, index_dir)?;
    let aligner = AlignCommand::new(&index_path)
        .unpaired_inputs(inputs.to_vec())
        .spawn(config)?;
    debug!(aligner_log = %aligner.stderr_path().display(), "alignment pipeline started");

    let sorted = tempfile::Builder::new()
        .prefix("seqorder-aligned-")
        .suffix(".sam")
        .tempfile_in(&config.scratch_dir)?;
    CoordinateSortCommand::new(sorted.path()).run(config, aligner)?;

    let reader = SamReader::from_path(sorted.path())?;
    Ok(SortedAlignments {
        records: reader.records(),
        format,
        _sorted: sorted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_requires_some_input() {
        let cmd = AlignCommand::new("ref.fa");
        assert!(matches!(cmd.validate(), Err(Error::Usage(_))));
    }

    #[test]
    fn test_paired_and_unpaired_are_exclusive() {
        let cmd = AlignCommand::new("ref.fa")
            .unpaired_inputs([PathBuf::from("a.fq")])
            .paired_inputs("r1.fq", "r2.fq");
        assert!(matches!(cmd.validate(), Err(Error::Usage(_))));
    }

    #[test]
    fn test_unknown_read_group_tag_fails_before_spawn() {
        // The configured binary does not exist; a Usage error proves the
        // validation ran first.
        let config = ToolConfig::new().with_binary("bwa", "/nonexistent/bwa");
        let result = AlignCommand::new("ref.fa")
            .unpaired_inputs([PathBuf::from("a.fq")])
            .read_group_tag("ID", "grp1")
            .read_group_tag("XX", "bad")
            .spawn(&config);

        match result {
            Err(Error::Usage(message)) => assert!(message.contains("XX")),
            other => panic!("expected usage error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_read_group_requires_id() {
        let cmd = AlignCommand::new("ref.fa")
            .unpaired_inputs([PathBuf::from("a.fq")])
            .read_group_tag("SM", "sample1");
        assert!(matches!(cmd.validate(), Err(Error::Usage(_))));
    }

    #[test]
    fn test_read_group_header_puts_id_first() {
        let cmd = AlignCommand::new("ref.fa")
            .unpaired_inputs([PathBuf::from("a.fq")])
            .read_group_tag("SM", "sample1")
            .read_group_tag("ID", "grp1");

        assert_eq!(
            cmd.read_group_header().unwrap(),
            "@RG\\tID:grp1\\tSM:sample1"
        );
    }

    #[test]
    fn test_missing_aligner_binary_is_spawn_error() {
        let scratch = tempfile::tempdir().unwrap();
        let config = ToolConfig::new()
            .with_binary("bwa", "/nonexistent/bwa")
            .with_scratch_dir(scratch.path());
        let result = AlignCommand::new("ref.fa")
            .unpaired_inputs([PathBuf::from("a.fq")])
            .spawn(&config);

        assert!(matches!(result, Err(Error::Spawn { tool: "bwa mem", .. })));
    }
}
