// src/alignment_stats.rs

use std::path::Path;

use ahash::AHashMap;

use crate::error::{Result, TreeError};
use crate::reader::read_data_lines;
use crate::tree::{TaxonomyTree, TreeState};
use crate::types::{Sample, SampleSet};

/// Totals from one per-sample alignment-stat file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentTotals {
    pub sample: Sample,
    pub total_reads: u64,
    pub aligned_reads: u64,
}

/// Parses an alignment-stat file in the format:
/// ```text
/// <header>
/// <total> <aligned> <other>
/// ```
/// Only the first data line is read. The sample is resolved from the file
/// name.
pub fn parse_alignment_stat_file<P: AsRef<Path>>(
    path: P,
    samples: &SampleSet,
) -> Result<AlignmentTotals> {
    let path = path.as_ref();
    let sample = samples.resolve_filename(path)?;
    let (_header, lines) = read_data_lines(path)?;
    let (line_no, line) = lines
        .first()
        .ok_or_else(|| TreeError::format(path, 2, "missing totals line"))?;

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 3 {
        return Err(TreeError::format(
            path,
            *line_no,
            format!("expected 3 columns (total, aligned, other), found {}", fields.len()),
        ));
    }
    let parse = |s: &str| {
        s.parse::<u64>().map_err(|_| {
            TreeError::format(path, *line_no, format!("'{}' is not a read count", s))
        })
    };

    Ok(AlignmentTotals {
        sample,
        total_reads: parse(fields[0])?,
        aligned_reads: parse(fields[1])?,
    })
}

/// Reads of one sample split by the rank they stopped aligning at.
#[derive(Debug, Clone)]
pub struct SampleAlignmentSummary {
    pub sample: Sample,
    pub total_reads: u64,
    /// `(rank, top-aligned reads)` in rank order.
    pub by_rank: Vec<(String, u64)>,
    /// Reads not placed at any rank.
    pub unassigned: u64,
}

impl SampleAlignmentSummary {
    pub fn assigned(&self) -> u64 {
        self.by_rank.iter().map(|(_, n)| n).sum()
    }
}

/// Sums top-aligned counts of each rank bucket per sample, and derives the
/// unassigned reads from each sample's total.
///
/// Samples without an entry in `totals` are skipped.
pub fn summarize_alignment(
    tree: &TaxonomyTree,
    samples: &SampleSet,
    totals: &AHashMap<Sample, u64>,
) -> Result<Vec<SampleAlignmentSummary>> {
    tree.require_at_least(TreeState::TopAlignedComputed, "summarize alignment statistics")?;

    let mut rows = Vec::new();
    for sample in samples {
        let Some(&total_reads) = totals.get(sample) else {
            log::debug!("No alignment totals for sample '{}'", sample);
            continue;
        };

        let by_rank: Vec<(String, u64)> = tree
            .ranks()
            .iter()
            .map(|rank| {
                let n: u64 = tree
                    .nodes_at_rank(rank)
                    .iter()
                    .map(|&id| tree.node(id).top_aligned_count(sample))
                    .sum();
                (rank.clone(), n)
            })
            .collect();

        let assigned: u64 = by_rank.iter().map(|(_, n)| n).sum();
        let unassigned = total_reads
            .checked_sub(assigned)
            .ok_or_else(|| TreeError::UnassignedUnderflow {
                sample: sample.name().to_string(),
                total: total_reads,
                assigned,
            })?;

        rows.push(SampleAlignmentSummary {
            sample: sample.clone(),
            total_reads,
            by_rank,
            unassigned,
        });
    }
    Ok(rows)
}

/// Renders summaries as a tab-separated table, one row per sample.
pub fn alignment_report(tree: &TaxonomyTree, rows: &[SampleAlignmentSummary]) -> String {
    let mut output = String::new();
    output.push_str("sample\tcondition\ttotal");
    for rank in tree.ranks() {
        output.push('\t');
        output.push_str(rank);
    }
    output.push_str("\tunassigned\n");

    for row in rows {
        let mut fields = vec![
            row.sample.name().to_string(),
            row.sample.condition().to_string(),
            row.total_reads.to_string(),
        ];
        fields.extend(row.by_rank.iter().map(|(_, n)| n.to_string()));
        fields.push(row.unassigned.to_string());
        output.push_str(&format!("{}\n", fields.join("\t")));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::test_util::write_file;
    use crate::seq_counts::SequenceCountAggregator;
    use crate::tree::test_util::small_tree;

    fn setup() -> (tempfile::TempDir, SampleSet, TaxonomyTree) {
        let dir = tempfile::tempdir().unwrap();
        let samples = SampleSet::from_names(&["S1-control", "S2-treated"], "-", 1).unwrap();
        let files = vec![
            write_file(dir.path(), "S1-control.phylum.tsv", "taxon\tcount\nFirmicutes\t100\nBacteroidetes\t20\n"),
            write_file(dir.path(), "S1-control.class.tsv", "taxon\tcount\nClostridia\t60\n"),
            write_file(dir.path(), "S1-control.order.tsv", "taxon\tcount\nClostridiales\t50\n"),
            write_file(dir.path(), "S1-control.family.tsv", "taxon\tcount\nLachnospiraceae\t30\n"),
            write_file(dir.path(), "S1-control.genus.tsv", "taxon\tcount\nBlautia\t25\n"),
        ];
        let mut tree = small_tree();
        let names = vec!["NA".to_string()];
        SequenceCountAggregator::new(&samples, &names, 2)
            .aggregate(&mut tree, &files)
            .unwrap();
        (dir, samples, tree)
    }

    #[test]
    fn test_parse_alignment_stat_file() {
        let (dir, samples, _) = setup();
        let path = write_file(
            dir.path(),
            "S2-treated.metaphlan.align_stats.tsv",
            "total\taligned\tother\n5000 4200 800\n",
        );
        let totals = parse_alignment_stat_file(&path, &samples).unwrap();
        assert_eq!(totals.sample.name(), "S2-treated");
        assert_eq!(totals.total_reads, 5000);
        assert_eq!(totals.aligned_reads, 4200);
    }

    #[test]
    fn test_summary_sums_rank_buckets() {
        let (_dir, samples, tree) = setup();
        let s1 = samples.get("S1-control").unwrap().clone();
        let totals: AHashMap<Sample, u64> = [(s1.clone(), 1000)].into_iter().collect();

        let rows = summarize_alignment(&tree, &samples, &totals).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        let by_rank: AHashMap<&str, u64> =
            row.by_rank.iter().map(|(r, n)| (r.as_str(), *n)).collect();
        // Firmicutes 100-60, Bacteroidetes 20
        assert_eq!(by_rank["phylum"], 60);
        assert_eq!(by_rank["class"], 10);
        assert_eq!(by_rank["order"], 20);
        assert_eq!(by_rank["family"], 5);
        assert_eq!(by_rank["genus"], 25);
        assert_eq!(by_rank["species"], 0);
        assert_eq!(row.assigned(), 120);
        assert_eq!(row.unassigned, 880);

        let report = alignment_report(&tree, &rows);
        let mut lines = report.lines();
        assert_eq!(
            lines.next().unwrap(),
            "sample\tcondition\ttotal\tphylum\tclass\torder\tfamily\tgenus\tspecies\tunassigned"
        );
        assert_eq!(lines.next().unwrap(), "S1-control\tcontrol\t1000\t60\t10\t20\t5\t25\t0\t880");
    }

    #[test]
    fn test_more_assigned_than_total_is_error() {
        let (_dir, samples, tree) = setup();
        let s1 = samples.get("S1-control").unwrap().clone();
        let totals: AHashMap<Sample, u64> = [(s1, 100)].into_iter().collect();
        match summarize_alignment(&tree, &samples, &totals) {
            Err(TreeError::UnassignedUnderflow { total, assigned, .. }) => {
                assert_eq!(total, 100);
                assert_eq!(assigned, 120);
            }
            other => panic!("expected underflow, got {:?}", other.map(|r| r.len())),
        }
    }
}
