//src/seq_counts.rs

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{Result, TreeError};
use crate::reader::read_data_lines;
use crate::tree::{TaxonomyTree, TreeState};
use crate::types::{is_placeholder, resolve_rank, Sample, SampleSet};

/// Raw counts of one `(sample, rank)` count file, as parsed.
#[derive(Debug, Clone)]
pub struct SampleCounts {
    pub path: PathBuf,
    pub sample: Sample,
    /// `(taxon, count, line)` in file order.
    pub counts: Vec<(String, u64, usize)>,
}

/// Parses a raw count file:
/// ```text
/// <header>
/// <taxon> <count>
/// ```
/// Fields are whitespace separated. The sample is resolved from the file name;
/// the rank is resolved when the counts are applied to a tree.
pub fn parse_count_file<P: AsRef<Path>>(path: P, samples: &SampleSet) -> Result<SampleCounts> {
    let path = path.as_ref();
    let sample = samples.resolve_filename(path)?;
    let (_header, lines) = read_data_lines(path)?;

    let mut counts = Vec::with_capacity(lines.len());
    for (line_no, line) in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 2 {
            return Err(TreeError::format(
                path,
                line_no,
                format!("expected 2 columns (taxon, count), found {}", fields.len()),
            ));
        }
        let count: u64 = fields[1].parse().map_err(|_| {
            TreeError::format(
                path,
                line_no,
                format!("count '{}' for taxon '{}' is not a non-negative integer", fields[1], fields[0]),
            )
        })?;
        counts.push((fields[0].to_string(), count, line_no));
    }

    Ok(SampleCounts {
        path: path.to_path_buf(),
        sample,
        counts,
    })
}

/// Fills every node's raw per-sample read counts and derives top-aligned
/// counts from them.
pub struct SequenceCountAggregator<'a> {
    samples: &'a SampleSet,
    placeholder_names: &'a [String],
    min_height: usize,
}

impl<'a> SequenceCountAggregator<'a> {
    /// `placeholder_names` mark unclassified taxa; nodes with those names or
    /// shallower than `min_height` get a top-aligned count of zero.
    pub fn new(samples: &'a SampleSet, placeholder_names: &'a [String], min_height: usize) -> Self {
        Self {
            samples,
            placeholder_names,
            min_height,
        }
    }

    /// Runs the raw-count pass over `files`, fills absent cells with zero and
    /// computes top-aligned counts.
    ///
    /// Files are parsed in parallel and applied in the order given. The tree
    /// must be freshly constructed.
    pub fn aggregate<P: AsRef<Path> + Sync>(&self, tree: &mut TaxonomyTree, files: &[P]) -> Result<()> {
        tree.require(TreeState::Constructed, "aggregate raw sequence counts")?;

        // 1. Parse all count files
        let parsed: Vec<SampleCounts> = files
            .par_iter()
            .map(|f| parse_count_file(f, self.samples))
            .collect::<Result<Vec<_>>>()?;

        // 2. Apply them to the tree
        for file in &parsed {
            self.apply(tree, file)?;
        }

        // 3. Absent taxon/sample pairs observed zero reads
        let order: Vec<_> = tree.preorder().collect();
        for &id in &order {
            let node = tree.node_mut(id);
            for sample in self.samples {
                node.seq_counts.entry(sample.clone()).or_insert(0);
            }
        }
        tree.advance(
            TreeState::Constructed,
            TreeState::RawCountsPopulated,
            "aggregate raw sequence counts",
        )?;

        log::info!(
            "Populated raw counts from {} files over {} nodes and {} samples",
            parsed.len(),
            tree.len(),
            self.samples.len()
        );

        // 4. Reads that stop at each node
        self.compute_top_aligned(tree)
    }

    /// Taxa are looked up among the nodes of the rank the file is named after,
    /// so a placeholder line lands on the placeholder at that rank. Files
    /// naming no rank fall back to the flat index.
    fn apply(&self, tree: &mut TaxonomyTree, file: &SampleCounts) -> Result<()> {
        let rank = resolve_rank(&file.path, tree.ranks()).map(str::to_string);
        for (taxon, count, line_no) in &file.counts {
            let id = tree
                .lookup(rank.as_deref(), taxon)
                .ok_or_else(|| TreeError::UnknownTaxon {
                    name: taxon.clone(),
                    path: file.path.clone(),
                })?;
            let node = tree.node_mut(id);
            if let Some(previous) = node.seq_counts.insert(file.sample.clone(), *count) {
                if previous != *count {
                    log::warn!(
                        "{}:{}: taxon '{}' in sample '{}' overwrites count {} with {}",
                        file.path.display(),
                        line_no,
                        taxon,
                        file.sample,
                        previous,
                        count
                    );
                }
            }
        }
        log::debug!(
            "Applied {} {} counts for sample '{}' from {}",
            file.counts.len(),
            rank.as_deref().unwrap_or("unranked"),
            file.sample,
            file.path.display()
        );
        Ok(())
    }

    /// Derives `top_aligned[s] = seq_count[s] - Σ child.seq_count[s]` for every
    /// node and sample.
    ///
    /// Placeholders and nodes shallower than the minimum height get zero.
    /// A child total above the parent's count is a fatal inconsistency.
    pub fn compute_top_aligned(&self, tree: &mut TaxonomyTree) -> Result<()> {
        tree.require(TreeState::RawCountsPopulated, "compute top-aligned counts")?;

        let order: Vec<_> = tree.preorder().collect();
        for &id in &order {
            let node = tree.node(id);
            let skip = node.height < self.min_height
                || is_placeholder(&node.name, self.placeholder_names);

            let mut top_aligned = ahash::AHashMap::with_capacity(self.samples.len());
            for sample in self.samples {
                if skip {
                    top_aligned.insert(sample.clone(), 0);
                    continue;
                }
                let count = node.seq_count(sample);
                let child_sum: u64 = tree.children(id).map(|c| c.seq_count(sample)).sum();
                let remaining = count.checked_sub(child_sum).ok_or_else(|| {
                    TreeError::NegativeTopAligned {
                        node: node.name.clone(),
                        sample: sample.name().to_string(),
                        count,
                        child_sum,
                    }
                })?;
                top_aligned.insert(sample.clone(), remaining);
            }
            tree.node_mut(id).top_aligned = top_aligned;
        }

        tree.advance(
            TreeState::RawCountsPopulated,
            TreeState::TopAlignedComputed,
            "compute top-aligned counts",
        )?;
        log::info!("Computed top-aligned counts for {} nodes", order.len());
        Ok(())
    }
}
