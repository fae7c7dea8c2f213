//src/types.rs

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{Result, TreeError};

/// One sequenced specimen and the experimental condition it belongs to.
///
/// Equality and hashing only look at the name. Both fields are shared
/// `Arc<str>`, so the per-node sample maps clone keys without allocating.
#[derive(Debug, Clone)]
pub struct Sample {
    name: Arc<str>,
    condition: Arc<str>,
}

impl Sample {
    pub fn new(name: &str, condition: &str) -> Self {
        Self {
            name: Arc::from(name),
            condition: Arc::from(condition),
        }
    }

    /// Builds a sample whose condition is field `field` of `name` split on
    /// `delimiter`, e.g. `S1-control` -> `control`.
    pub fn from_name(name: &str, delimiter: &str, field: usize) -> Option<Self> {
        let condition = name.split(delimiter).nth(field)?;
        if condition.is_empty() {
            return None;
        }
        Some(Self::new(name, condition))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Sample {}

impl Hash for Sample {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The known samples of one analysis run, in metadata order.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    samples: Vec<Sample>,
    by_name: AHashMap<Arc<str>, usize>,
}

impl SampleSet {
    /// Builds the set from sample names, deriving each condition from the name.
    pub fn from_names<S: AsRef<str>>(names: &[S], delimiter: &str, field: usize) -> Result<Self> {
        let mut set = SampleSet::default();
        for name in names {
            let name = name.as_ref();
            let sample = Sample::from_name(name, delimiter, field).ok_or_else(|| {
                TreeError::Config(format!(
                    "sample '{}' has no condition at field {} when split on '{}'",
                    name, field, delimiter
                ))
            })?;
            set.insert(sample)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, sample: Sample) -> Result<()> {
        if self.by_name.contains_key(sample.name()) {
            return Err(TreeError::Config(format!(
                "sample '{}' is listed more than once",
                sample.name()
            )));
        }
        self.by_name.insert(sample.name.clone(), self.samples.len());
        self.samples.push(sample);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Sample> {
        self.by_name.get(name).map(|&i| &self.samples[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Groups samples by condition. Conditions and their members keep the
    /// order in which they were first seen.
    pub fn conditions(&self) -> Vec<(String, Vec<Sample>)> {
        let mut groups: Vec<(String, Vec<Sample>)> = Vec::new();
        for sample in &self.samples {
            match groups.iter_mut().find(|(c, _)| c.as_str() == sample.condition()) {
                Some((_, members)) => members.push(sample.clone()),
                None => groups.push((sample.condition().to_string(), vec![sample.clone()])),
            }
        }
        groups
    }

    /// Finds the sample a pipeline output file belongs to.
    ///
    /// The longest sample name contained in the file name wins, so `S1`
    /// never claims `S10.genus.counts.tsv`.
    pub fn resolve_filename<P: AsRef<Path>>(&self, path: P) -> Result<Sample> {
        let path = path.as_ref();
        let file_name = file_name_of(path);
        self.samples
            .iter()
            .filter(|s| file_name.contains(s.name()))
            .max_by_key(|s| s.name().len())
            .cloned()
            .ok_or_else(|| TreeError::UnknownSample {
                name: file_name.to_string(),
                context: format!("no known sample name occurs in file {}", path.display()),
            })
    }
}

impl<'a> IntoIterator for &'a SampleSet {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// Whether `name` is one of the configured placeholder names for an
/// unclassified taxon.
pub fn is_placeholder(name: &str, placeholders: &[String]) -> bool {
    placeholders.iter().any(|p| p == name)
}

/// Returns the rank label a pipeline output file is named after, if any.
/// Longest match wins, so `subspecies` beats `species`.
pub fn resolve_rank<'a, P: AsRef<Path>>(path: P, ranks: &'a [String]) -> Option<&'a str> {
    let file_name = file_name_of(path.as_ref());
    ranks
        .iter()
        .filter(|r| file_name.contains(r.as_str()))
        .max_by_key(|r| r.len())
        .map(|r| r.as_str())
}

fn file_name_of(path: &Path) -> std::borrow::Cow<'_, str> {
    path.file_name()
        .map(|f| f.to_string_lossy())
        .unwrap_or_else(|| path.to_string_lossy())
}
