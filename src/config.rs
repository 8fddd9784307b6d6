//! Runtime configuration for external tools and scratch storage.
//!
//! Every component that shells out or spills to disk takes a [`ToolConfig`]
//! at the call site. There is no process-global settings lookup: callers
//! construct one configuration and pass it down.

use rustc_hash::FxHashMap;
use std::env;
use std::path::PathBuf;
use std::thread;

/// Explicit configuration for the ordering components.
///
/// Holds the external binary locations, the scratch directory used for
/// spilled sort runs and subprocess temp files, and the thread count handed
/// to external tools.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Overrides for external binary locations, keyed by tool name.
    binaries: FxHashMap<String, PathBuf>,
    /// Directory for spilled runs, stderr captures and index scratch space.
    pub scratch_dir: PathBuf,
    /// Thread count passed to external tools.
    pub threads: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binaries: FxHashMap::default(),
            scratch_dir: env::temp_dir(),
            threads: thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

impl ToolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the location of an external binary.
    pub fn with_binary(mut self, tool: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.binaries.insert(tool.into(), path.into());
        self
    }

    /// Set the scratch directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Set the thread count handed to external tools.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Resolve a tool name to the binary to execute.
    ///
    /// Unconfigured tools resolve to their bare name, deferring to `PATH`.
    pub fn binary(&self, tool: &str) -> PathBuf {
        self.binaries
            .get(tool)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(tool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_unconfigured_tool_uses_path_lookup() {
        let config = ToolConfig::new();
        assert_eq!(config.binary("bwa"), Path::new("bwa"));
    }

    #[test]
    fn test_binary_override() {
        let config = ToolConfig::new().with_binary("bwa", "/opt/bio/bwa");
        assert_eq!(config.binary("bwa"), Path::new("/opt/bio/bwa"));
        assert_eq!(config.binary("picard"), Path::new("picard"));
    }

    #[test]
    fn test_threads_never_zero() {
        let config = ToolConfig::new().with_threads(0);
        assert_eq!(config.threads, 1);
    }
}
