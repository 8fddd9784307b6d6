//! seqorder: external-memory ordering for biological sequence records.
//!
//! This library turns unordered streams of FASTA/FASTQ records into ordered
//! streams under memory and process constraints.
//!
//! # Features
//!
//! - **Disk-spilling sort**: a generic merge-sort engine with an explicit
//!   memory budget, keyed by any record-derived value
//! - **Coordinate ordering**: index management and a piped
//!   aligner → coordinate-sorter subprocess pipeline
//! - **Packet pipeline**: bounded-parallelism batch processing with
//!   order-preserving or relaxed scheduling
//!
//! # Example
//!
//! ```rust,no_run
//! use seqorder::commands::{SortCommand, SortKey};
//! use seqorder::config::ToolConfig;
//!
//! let config = ToolConfig::new();
//! let cmd = SortCommand::new(SortKey::Sequence);
//! let mut out = std::io::stdout();
//! cmd.run(&config, &["reads.fq".into()], &mut out).unwrap();
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod extsort;
pub mod fastx;
pub mod index;
pub mod packets;
pub mod pipeline;
pub mod record;
pub mod sam;
pub mod transform;

// Re-export commonly used types
pub use config::ToolConfig;
pub use error::{Error, Result};
pub use extsort::ExternalSorter;
pub use record::{AnnotatedRecord, SeqFormat, SeqItem, SequenceRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::commands::{SortCommand, SortKey};
    pub use crate::config::ToolConfig;
    pub use crate::error::{Error, Result};
    pub use crate::extsort::ExternalSorter;
    pub use crate::fastx::{FastxReader, write_record};
    pub use crate::packets::PacketPipeline;
    pub use crate::record::{AnnotatedRecord, SeqFormat, SeqItem, SequenceRecord};
}
