// src/lib.rs
pub mod abundance;
pub mod alignment_stats;
pub mod config;
pub mod error;
pub mod norm_counts;
pub mod reader;
pub mod seq_counts;
pub mod taxdb;
pub mod tree;
pub mod types;

use std::path::Path;

use ahash::AHashMap;

pub use crate::config::RunConfig;
pub use crate::error::{Result, TreeError};
pub use crate::norm_counts::NormalizedAbundanceAggregator;
pub use crate::seq_counts::SequenceCountAggregator;
pub use crate::tree::{NodeId, TaxonNode, TaxonomyTree, TreeState};
pub use crate::types::{Sample, SampleSet};

use crate::alignment_stats::{parse_alignment_stat_file, summarize_alignment, SampleAlignmentSummary};

/// A fully aggregated phylogeny together with the samples it was built for.
pub struct PhylogenyRun {
    pub config: RunConfig,
    pub samples: SampleSet,
    pub tree: TaxonomyTree,
}

impl PhylogenyRun {
    /// Per-sample alignment breakdown, with totals read from alignment-stat
    /// files.
    pub fn alignment_summary<P: AsRef<Path>>(
        &self,
        stat_files: &[P],
    ) -> Result<Vec<SampleAlignmentSummary>> {
        let mut totals = AHashMap::new();
        for path in stat_files {
            let stats = parse_alignment_stat_file(path, &self.samples)?;
            totals.insert(stats.sample, stats.total_reads);
        }
        summarize_alignment(&self.tree, &self.samples, &totals)
    }

    /// Indented lineage dump of the whole tree.
    pub fn get_tree_text(&self) -> String {
        self.tree.to_string()
    }
}

/// Builds the taxonomy from `hierarchy_path`, then runs the raw-count pass
/// (including top-aligned counts) and the normalized-abundance pass.
pub fn build_phylogeny<P, Q, R>(
    config: RunConfig,
    hierarchy_path: P,
    count_files: &[Q],
    norm_tables: &[R],
) -> Result<PhylogenyRun>
where
    P: AsRef<Path>,
    Q: AsRef<Path> + Sync,
    R: AsRef<Path> + Sync,
{
    // 1. Validate metadata and samples
    config.validate()?;
    let samples = config.sample_set()?;

    // 2. Build the tree
    let mut tree = TaxonomyTree::from_hierarchy_file(hierarchy_path, &config)?;

    // 3. Raw counts and top-aligned counts
    SequenceCountAggregator::new(
        &samples,
        &config.placeholder_names,
        config.min_top_aligned_height,
    )
    .aggregate(&mut tree, count_files)?;

    // 4. Normalized abundances
    NormalizedAbundanceAggregator::new(&samples, config.pseudocount)
        .aggregate(&mut tree, norm_tables)?;

    Ok(PhylogenyRun {
        config,
        samples,
        tree,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::test_util::{write_file, write_gz};

    const HIERARCHY: &str = "kingdom\tphylum\tclass\torder\tfamily\tgenus\tspecies\n\
        Bacteria\tFirmicutes\tClostridia\tClostridiales\tLachnospiraceae\tBlautia\tBlautia_obeum\n\
        Bacteria\tBacteroidetes\tBacteroidia\tBacteroidales\tBacteroidaceae\tBacteroides\tNA\n";

    fn config() -> RunConfig {
        RunConfig::from_toml_str(
            r#"
samples = ["S1-control", "S2-treated"]
taxa_hierarchy = ["phylum", "class", "order", "family", "genus", "species"]
taxa_offset = 2
pseudocount = 1e-6
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_build_phylogeny_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let hierarchy = write_gz(dir.path(), "taxa_tree.tsv.gz", HIERARCHY);
        let counts = vec![
            write_file(dir.path(), "S1-control.phylum.counts.tsv", "taxon\tcount\nFirmicutes\t100\nBacteroidetes\t40\n"),
            write_file(dir.path(), "S1-control.class.counts.tsv", "taxon\tcount\nClostridia\t60\n"),
            write_gz(dir.path(), "S2-treated.phylum.counts.tsv.gz", "taxon\tcount\nFirmicutes\t10\n"),
        ];
        let norm = vec![write_file(
            dir.path(),
            "phylum.norm_counts.tsv",
            "S1.control_count\tS2.treated_count\ttaxa\n4.2\t1.5\tFirmicutes\n3.3\t0\tBacteroidetes\n",
        )];
        let stats = vec![
            write_file(dir.path(), "S1-control.align_stats.tsv", "total aligned other\n500 140 360\n"),
            write_file(dir.path(), "S2-treated.align_stats.tsv", "total aligned other\n50 10 40\n"),
        ];

        let run = build_phylogeny(config(), &hierarchy, &counts, &norm).unwrap();
        assert_eq!(run.tree.state(), TreeState::NormalizedPopulated);

        let s1 = run.samples.get("S1-control").unwrap();
        let s2 = run.samples.get("S2-treated").unwrap();
        let firmicutes = run.tree.get("Firmicutes").unwrap();
        assert_eq!(firmicutes.top_aligned_count(s1), 40);
        assert_eq!(firmicutes.top_aligned_count(s2), 10);
        assert_eq!(run.tree.get("Bacteroidetes").unwrap().norm_count(s2), Some(1e-6));

        let summary = run.alignment_summary(&stats).unwrap();
        assert_eq!(summary.len(), 2);
        // Firmicutes 40 + Bacteroidetes 40 + Clostridia 60
        assert_eq!(summary[0].assigned(), 140);
        assert_eq!(summary[0].unassigned, 360);
        assert_eq!(summary[1].assigned(), 10);

        assert!(run.get_tree_text().starts_with("ROOT;\n\tBacteria;ROOT;\n"));
    }

    #[test]
    fn test_build_phylogeny_surfaces_unknown_taxon() {
        let dir = tempfile::tempdir().unwrap();
        let hierarchy = write_file(dir.path(), "taxa_tree.tsv", HIERARCHY);
        let counts = vec![write_file(
            dir.path(),
            "S1-control.genus.counts.tsv",
            "taxon\tcount\nUnknownia\t3\n",
        )];
        let err = build_phylogeny::<_, _, &Path>(config(), &hierarchy, &counts, &[])
            .err()
            .unwrap();
        assert!(err.to_string().contains("Unknownia"), "{err}");
    }

    #[test]
    fn test_malformed_hierarchy_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let hierarchy = write_file(
            dir.path(),
            "taxa_tree.tsv",
            "header\nBacteria\tFirmicutes\n",
        );
        let err = build_phylogeny::<_, &Path, &Path>(config(), &hierarchy, &[], &[])
            .err()
            .unwrap();
        assert!(matches!(err, TreeError::Format { line: 2, .. }));
    }
}
