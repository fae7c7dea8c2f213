//src/norm_counts.rs

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{Result, TreeError};
use crate::reader::read_data_lines;
use crate::tree::{TaxonomyTree, TreeState};
use crate::types::{resolve_rank, Sample, SampleSet};

/// Header column naming the taxon of each row.
pub const TAXA_COLUMN: &str = "taxa";

/// One parsed normalized-abundance table (one taxonomic rank).
#[derive(Debug, Clone)]
pub struct NormTable {
    pub path: PathBuf,
    /// Sample of each value column, in header order.
    pub columns: Vec<Sample>,
    /// `(taxon, values, line)`; `values` lines up with `columns`.
    pub rows: Vec<(String, Vec<f64>, usize)>,
}

/// Applies the column-naming transform of the normalization step: quotes
/// stripped, `.` replaced by `_` and a trailing `_count` removed.
pub fn clean_column_name(raw: &str) -> String {
    let name = raw.trim().trim_matches('"').replace('.', "_");
    match name.strip_suffix("_count") {
        Some(stripped) => stripped.to_string(),
        None => name,
    }
}

/// Maps a cleaned column name back onto a known sample.
///
/// The transform turned `-` into `_`, so the reversed name is tried first;
/// otherwise every sample name is pushed through the forward transform and
/// compared.
pub fn resolve_column(column: &str, samples: &SampleSet) -> Option<Sample> {
    if let Some(sample) = samples.get(column) {
        return Some(sample.clone());
    }
    let reversed = column.replace('_', "-");
    if let Some(sample) = samples.get(&reversed) {
        return Some(sample.clone());
    }
    samples
        .iter()
        .find(|s| s.name().replace(['-', '.'], "_") == column)
        .cloned()
}

fn split_fields(line: &str) -> Vec<&str> {
    if line.contains('\t') {
        line.split('\t').map(|f| f.trim()).collect()
    } else {
        line.split_whitespace().collect()
    }
}

/// Parses a normalized count table:
/// ```text
/// S1.control_count  S2.treated_count  taxa
/// 12.5              0.75              Firmicutes
/// ```
/// The last column must be `taxa`; every other column must name a known
/// sample. Values must be finite and non-negative.
pub fn parse_norm_table<P: AsRef<Path>>(path: P, samples: &SampleSet) -> Result<NormTable> {
    let path = path.as_ref();
    let (header, lines) = read_data_lines(path)?;

    let header: Vec<String> = split_fields(&header)
        .into_iter()
        .map(clean_column_name)
        .collect();
    match header.last() {
        Some(last) if last == TAXA_COLUMN => {}
        _ => {
            return Err(TreeError::format(
                path,
                1,
                format!("last header column must be '{}'", TAXA_COLUMN),
            ))
        }
    }

    let columns = header[..header.len() - 1]
        .iter()
        .map(|col| {
            resolve_column(col, samples).ok_or_else(|| TreeError::UnknownSample {
                name: col.clone(),
                context: format!("column header in {}", path.display()),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::with_capacity(lines.len());
    for (line_no, line) in lines {
        let fields = split_fields(&line);
        if fields.len() != header.len() {
            return Err(TreeError::format(
                path,
                line_no,
                format!("expected {} columns, found {}", header.len(), fields.len()),
            ));
        }
        let (taxon, values) = match fields.split_last() {
            Some((taxon, values)) => (taxon.trim_matches('"'), values),
            None => continue,
        };

        let mut parsed = Vec::with_capacity(values.len());
        for raw in values {
            let value: f64 = raw.trim_matches('"').parse().map_err(|_| {
                TreeError::format(path, line_no, format!("value '{}' is not a number", raw))
            })?;
            if !value.is_finite() || value < 0.0 {
                return Err(TreeError::format(
                    path,
                    line_no,
                    format!("abundance {} for taxon '{}' must be finite and non-negative", value, taxon),
                ));
            }
            parsed.push(value);
        }
        rows.push((taxon.to_string(), parsed, line_no));
    }

    Ok(NormTable {
        path: path.to_path_buf(),
        columns,
        rows,
    })
}

/// Fills every node's normalized abundance per sample.
pub struct NormalizedAbundanceAggregator<'a> {
    samples: &'a SampleSet,
    pseudocount: f64,
}

impl<'a> NormalizedAbundanceAggregator<'a> {
    pub fn new(samples: &'a SampleSet, pseudocount: f64) -> Self {
        Self {
            samples,
            pseudocount,
        }
    }

    /// Runs the normalized pass over one table per rank.
    ///
    /// Absent cells and explicit zeros become the pseudocount, so every cell
    /// is strictly positive afterwards. Requires top-aligned counts.
    pub fn aggregate<P: AsRef<Path> + Sync>(&self, tree: &mut TaxonomyTree, tables: &[P]) -> Result<()> {
        tree.require(TreeState::TopAlignedComputed, "aggregate normalized abundances")?;

        let parsed: Vec<NormTable> = tables
            .par_iter()
            .map(|t| parse_norm_table(t, self.samples))
            .collect::<Result<Vec<_>>>()?;

        for table in &parsed {
            let rank = resolve_rank(&table.path, tree.ranks()).map(str::to_string);
            for (taxon, values, _line) in &table.rows {
                let id = tree
                    .lookup(rank.as_deref(), taxon)
                    .ok_or_else(|| TreeError::UnknownTaxon {
                        name: taxon.clone(),
                        path: table.path.clone(),
                    })?;
                let node = tree.node_mut(id);
                for (sample, &value) in table.columns.iter().zip(values) {
                    let value = if value == 0.0 { self.pseudocount } else { value };
                    node.norm_counts.insert(sample.clone(), value);
                }
            }
            log::debug!(
                "Applied {} normalized {} rows from {}",
                table.rows.len(),
                rank.as_deref().unwrap_or("unranked"),
                table.path.display()
            );
        }

        let order: Vec<_> = tree.preorder().collect();
        let mut filled = 0usize;
        for &id in &order {
            let node = tree.node_mut(id);
            for sample in self.samples {
                if !node.norm_counts.contains_key(sample) {
                    node.norm_counts.insert(sample.clone(), self.pseudocount);
                    filled += 1;
                }
            }
        }

        tree.advance(
            TreeState::TopAlignedComputed,
            TreeState::NormalizedPopulated,
            "aggregate normalized abundances",
        )?;
        log::info!(
            "Populated normalized abundances from {} tables ({} cells set to pseudocount {})",
            parsed.len(),
            filled,
            self.pseudocount
        );
        Ok(())
    }
}
