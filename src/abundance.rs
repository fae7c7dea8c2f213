// src/abundance.rs
//! Per-condition views over normalized abundances, as used for tree-map
//! charts: box size is the mean abundance of a condition, colour is how far
//! that mean sits from the mean over all samples.

use std::borrow::Cow;

use crate::error::Result;
use crate::tree::{NodeId, TaxonNode, TaxonomyTree, TreeState};
use crate::types::{is_placeholder, Sample};

/// Mean normalized abundance of `node` over `samples`.
/// Cells never set count as zero; an empty group yields 0.0.
pub fn mean_abundance(node: &TaxonNode, samples: &[Sample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: f64 = samples
        .iter()
        .map(|s| node.norm_count(s).unwrap_or(0.0))
        .sum();
    total / samples.len() as f64
}

/// Mean normalized abundance of `node` over every sample it holds.
pub fn overall_mean(node: &TaxonNode) -> f64 {
    if node.norm_counts.is_empty() {
        return 0.0;
    }
    node.norm_counts.values().sum::<f64>() / node.norm_counts.len() as f64
}

/// `log2(group mean / overall mean)`; positive when the group is enriched.
pub fn condition_log_ratio(node: &TaxonNode, samples: &[Sample]) -> f64 {
    (mean_abundance(node, samples) / overall_mean(node)).log2()
}

/// Chart label for a node. Placeholder names become `Unknown_<rank>`, or
/// `Unknown_High_Taxon` / `Unknown_Low_Taxon` outside the configured ranks.
pub fn display_name<'a>(tree: &'a TaxonomyTree, id: NodeId, placeholders: &[String]) -> Cow<'a, str> {
    let node = tree.node(id);
    if !is_placeholder(&node.name, placeholders) {
        return Cow::Borrowed(node.name.as_str());
    }
    match node.height.checked_sub(tree.root_offset()) {
        None => Cow::Borrowed("Unknown_High_Taxon"),
        Some(i) => match tree.ranks().get(i) {
            Some(rank) => Cow::Owned(format!("Unknown_{}", rank)),
            None => Cow::Borrowed("Unknown_Low_Taxon"),
        },
    }
}

/// One tree-map cell for one condition.
#[derive(Debug, Clone)]
pub struct AbundanceCell {
    pub id: NodeId,
    pub label: String,
    pub depth: usize,
    pub mean: f64,
    pub log_ratio: f64,
}

/// Pre-order cells of every ranked node for the sample group `samples`.
///
/// Nodes whose group mean and overall mean are both below `min_abundance`
/// are dropped together with their subtrees.
pub fn condition_cells(
    tree: &TaxonomyTree,
    samples: &[Sample],
    placeholders: &[String],
    min_abundance: f64,
) -> Result<Vec<AbundanceCell>> {
    tree.require(TreeState::NormalizedPopulated, "build abundance cells")?;

    let mut cells = Vec::new();
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        let node = tree.node(id);
        let mean = mean_abundance(node, samples);
        let overall = overall_mean(node);
        if id != tree.root() && mean < min_abundance && overall < min_abundance {
            continue;
        }
        stack.extend(node.children.iter().rev().copied());

        if tree.rank_of(id).is_none() {
            continue;
        }
        cells.push(AbundanceCell {
            id,
            label: display_name(tree, id, placeholders).into_owned(),
            depth: node.height - tree.root_offset(),
            mean,
            log_ratio: (mean / overall).log2(),
        });
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::norm_counts::NormalizedAbundanceAggregator;
    use crate::reader::test_util::write_file;
    use crate::seq_counts::SequenceCountAggregator;
    use crate::tree::test_util::{lineage, small_tree};
    use crate::types::SampleSet;
    use std::path::PathBuf;

    fn placeholders() -> Vec<String> {
        vec!["NA".to_string()]
    }

    fn populated(samples: &SampleSet) -> (tempfile::TempDir, TaxonomyTree) {
        let dir = tempfile::tempdir().unwrap();
        let table = write_file(
            dir.path(),
            "phylum.norm.tsv",
            "S1.control_count\tS2.treated_count\tS3.treated_count\ttaxa\n\
             10\t40\t40\tFirmicutes\n\
             30\t0.5\t0.5\tBacteroidetes\n",
        );
        let mut tree = small_tree();
        let names = placeholders();
        SequenceCountAggregator::new(samples, &names, 2)
            .aggregate::<PathBuf>(&mut tree, &[])
            .unwrap();
        NormalizedAbundanceAggregator::new(samples, 1e-6)
            .aggregate(&mut tree, &[table])
            .unwrap();
        (dir, tree)
    }

    #[test]
    fn test_means_and_ratio() {
        let samples =
            SampleSet::from_names(&["S1-control", "S2-treated", "S3-treated"], "-", 1).unwrap();
        let (_dir, tree) = populated(&samples);
        let groups = samples.conditions();
        let treated = &groups[1].1;

        let firmicutes = tree.get("Firmicutes").unwrap();
        assert_eq!(mean_abundance(firmicutes, treated), 40.0);
        assert_eq!(overall_mean(firmicutes), 30.0);
        assert!(condition_log_ratio(firmicutes, treated) > 0.0);

        let bacteroidetes = tree.get("Bacteroidetes").unwrap();
        assert!(condition_log_ratio(bacteroidetes, treated) < 0.0);
        assert_eq!(mean_abundance(bacteroidetes, &[]), 0.0);
    }

    #[test]
    fn test_condition_cells_prune_low_subtrees() {
        let samples =
            SampleSet::from_names(&["S1-control", "S2-treated", "S3-treated"], "-", 1).unwrap();
        let (_dir, tree) = populated(&samples);
        let groups = samples.conditions();
        let cells = condition_cells(&tree, &groups[0].1, &placeholders(), 2.0).unwrap();
        let labels: Vec<&str> = cells.iter().map(|c| c.label.as_str()).collect();
        // Bacteria (height 1) keeps its pseudocount-only abundance, so it is
        // pruned along with everything below it.
        assert!(labels.is_empty());

        let cells = condition_cells(&tree, &groups[0].1, &placeholders(), 0.0).unwrap();
        assert_eq!(cells.len(), tree.iter().filter(|n| n.height >= 2).count());
        assert_eq!(cells[0].label, "Firmicutes");
        assert_eq!(cells[0].depth, 0);
        assert!(cells.iter().any(|c| c.label == "Unknown_species"));
    }

    #[test]
    fn test_display_name_for_placeholders() {
        let lines = vec![
            lineage(&["NA", "NA", "NA"]),
            lineage(&["Bacteria", "Firmicutes", "Clostridia"]),
        ];
        let ranks = vec!["phylum".to_string(), "class".to_string()];
        let tree = TaxonomyTree::from_lineages(&lines, &ranks, 2).unwrap();
        let names = placeholders();

        let path: Vec<NodeId> = tree.preorder().skip(1).take(3).collect();
        assert_eq!(display_name(&tree, path[0], &names), "Unknown_High_Taxon");
        assert_eq!(display_name(&tree, path[1], &names), "Unknown_phylum");
        assert_eq!(display_name(&tree, path[2], &names), "Unknown_class");
        let clostridia = tree.id_of("Clostridia").unwrap();
        assert_eq!(display_name(&tree, clostridia, &names), "Clostridia");
    }
}
