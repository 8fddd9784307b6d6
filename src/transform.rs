//! Ready-made batch transformations for the packet pipeline.

use crate::packets::Stage;
use crate::record::{SeqFormat, SeqItem};

/// Case transformation applied to sequence text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseAction {
    Uppercase,
    Lowercase,
    Swapcase,
}

/// Changes the sequence case of every record in a packet.
///
/// Only sequence lines are touched; headers, separators and qualities keep
/// their framing.
#[derive(Debug, Clone, Copy)]
pub struct ChangeCase {
    action: CaseAction,
}

impl ChangeCase {
    pub fn new(action: CaseAction) -> Self {
        Self { action }
    }

    pub fn apply(&self, packet: Vec<SeqItem>) -> Vec<SeqItem> {
        packet
            .into_iter()
            .map(|mut record| {
                for line in sequence_lines_mut(&mut record) {
                    *line = self.transform(line);
                }
                record
            })
            .collect()
    }

    /// Package this transformation as a pipeline stage.
    pub fn into_stage(self) -> Stage<SeqItem> {
        Box::new(move |packet| self.apply(packet))
    }

    fn transform(&self, text: &str) -> String {
        match self.action {
            CaseAction::Uppercase => text.to_uppercase(),
            CaseAction::Lowercase => text.to_lowercase(),
            CaseAction::Swapcase => text
                .chars()
                .map(|c| {
                    if c.is_uppercase() {
                        c.to_ascii_lowercase()
                    } else if c.is_lowercase() {
                        c.to_ascii_uppercase()
                    } else {
                        c
                    }
                })
                .collect(),
        }
    }
}

/// Mutable view of the lines holding sequence text.
fn sequence_lines_mut(record: &mut SeqItem) -> &mut [String] {
    match record.format {
        SeqFormat::Fastq => record.lines.get_mut(1..2).unwrap_or(&mut []),
        SeqFormat::Fasta | SeqFormat::FastqMultiline => {
            let body = record.lines.get_mut(1..).unwrap_or(&mut []);
            let end = body
                .iter()
                .position(|l| l.starts_with('+'))
                .unwrap_or(body.len());
            &mut body[..end]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::PacketPipeline;
    use crate::record::SequenceRecord;

    fn fastq_item(name: &str, seq: &str, qual: &str) -> SeqItem {
        SeqItem::new(
            name,
            vec![
                format!("@{}", name),
                seq.to_string(),
                "+".to_string(),
                qual.to_string(),
            ],
            SeqFormat::Fastq,
        )
    }

    #[test]
    fn test_uppercase_leaves_qualities_alone() {
        let change = ChangeCase::new(CaseAction::Uppercase);
        let out = change.apply(vec![fastq_item("r1", "acgt", "iiii")]);

        assert_eq!(out[0].sequence(), "ACGT");
        assert_eq!(out[0].lines[3], "iiii");
    }

    #[test]
    fn test_swapcase() {
        let change = ChangeCase::new(CaseAction::Swapcase);
        let item = SeqItem::new(
            "r1",
            vec![">r1".to_string(), "acGT".to_string()],
            SeqFormat::Fasta,
        );
        let out = change.apply(vec![item]);

        assert_eq!(out[0].sequence(), "ACgt");
    }

    #[test]
    fn test_as_packet_stage() {
        let packets = vec![
            vec![fastq_item("r1", "acgt", "IIII")],
            vec![fastq_item("r2", "ggcc", "IIII")],
        ];
        let pipeline = PacketPipeline::new(2);
        let out: Vec<_> = pipeline
            .run(
                packets,
                vec![ChangeCase::new(CaseAction::Uppercase).into_stage()],
            )
            .collect();

        assert_eq!(out[0][0].sequence(), "ACGT");
        assert_eq!(out[1][0].sequence(), "GGCC");
    }
}
