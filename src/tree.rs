//src/tree.rs

use std::fmt;
use std::path::Path;

use ahash::{AHashMap, AHashSet};

use crate::config::RunConfig;
use crate::error::{Result, TreeError};
use crate::taxdb::parse_hierarchy;
use crate::types::Sample;

/// Index of a node inside its `TaxonomyTree`.
pub type NodeId = usize;

/// Name of the synthetic node every lineage hangs from.
pub const ROOT_NAME: &str = "ROOT";

/// Aggregation progress of a tree. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TreeState {
    Constructed,
    RawCountsPopulated,
    TopAlignedComputed,
    NormalizedPopulated,
}

impl fmt::Display for TreeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TreeState::Constructed => "constructed",
            TreeState::RawCountsPopulated => "populated with raw counts",
            TreeState::TopAlignedComputed => "populated with top-aligned counts",
            TreeState::NormalizedPopulated => "populated with normalized abundances",
        };
        f.write_str(s)
    }
}

/// One taxon at one level of the hierarchy, with its per-sample aggregates.
#[derive(Debug, Clone)]
pub struct TaxonNode {
    pub name: String,
    /// Upward link only; children are owned through the tree's arena.
    pub parent: Option<NodeId>,
    /// Children in insertion order.
    pub children: Vec<NodeId>,
    /// Depth from the root (root = 0).
    pub height: usize,

    /// Raw reads classified to this taxon or any descendant.
    pub seq_counts: AHashMap<Sample, u64>,
    /// Reads that stop at this taxon and are not carried by any child.
    pub top_aligned: AHashMap<Sample, u64>,
    /// Normalized abundance; absent cells are filled with the pseudocount.
    pub norm_counts: AHashMap<Sample, f64>,

    child_lookup: AHashMap<String, NodeId>,
}

impl TaxonNode {
    fn new(name: &str, parent: Option<NodeId>, height: usize) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            height,
            seq_counts: AHashMap::new(),
            top_aligned: AHashMap::new(),
            norm_counts: AHashMap::new(),
            child_lookup: AHashMap::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.child_lookup.get(name).copied()
    }

    pub fn seq_count(&self, sample: &Sample) -> u64 {
        self.seq_counts.get(sample).copied().unwrap_or(0)
    }

    pub fn top_aligned_count(&self, sample: &Sample) -> u64 {
        self.top_aligned.get(sample).copied().unwrap_or(0)
    }

    pub fn norm_count(&self, sample: &Sample) -> Option<f64> {
        self.norm_counts.get(sample).copied()
    }
}

/// A rooted taxonomy built from hierarchy lines.
///
/// Nodes live in one arena vector; `NodeId`s are stable for the lifetime of
/// the tree. The tree keeps a flat name index and per-rank buckets derived
/// from node height.
///
/// A name seen in several subtrees (typically the `NA` placeholder) keeps its
/// first node in the flat index. Inside one rank the last node in pre-order
/// owns the name, so rank-qualified lookups land on the deepest placeholder
/// chain rather than the first one created.
#[derive(Debug, Clone)]
pub struct TaxonomyTree {
    nodes: Vec<TaxonNode>,
    index: AHashMap<String, NodeId>,
    ranks: Vec<String>,
    rank_buckets: Vec<Vec<NodeId>>,
    rank_index: Vec<AHashMap<String, NodeId>>,
    shadowed: Vec<String>,
    root_offset: usize,
    state: TreeState,
}

impl TaxonomyTree {
    /// Builds a tree from ancestor chains and buckets its nodes by rank.
    ///
    /// `ranks[i]` labels nodes at height `root_offset + i`. Nodes above
    /// `root_offset` are kept in the tree and index but belong to no rank.
    pub fn from_lineages<L: AsRef<[String]>>(
        lineages: &[L],
        ranks: &[String],
        root_offset: usize,
    ) -> Result<Self> {
        let mut tree = TaxonomyTree {
            nodes: vec![TaxonNode::new(ROOT_NAME, None, 0)],
            index: AHashMap::new(),
            ranks: ranks.to_vec(),
            rank_buckets: vec![Vec::new(); ranks.len()],
            rank_index: vec![AHashMap::new(); ranks.len()],
            shadowed: Vec::new(),
            root_offset,
            state: TreeState::Constructed,
        };
        tree.index.insert(ROOT_NAME.to_string(), 0);

        let mut warned = AHashSet::new();
        for lineage in lineages {
            tree.insert_lineage(lineage.as_ref(), &mut warned);
        }
        tree.bucket_ranks()?;

        log::info!(
            "Built taxonomy tree: {} nodes, {} leaves, {} ranks",
            tree.len(),
            tree.nodes.iter().filter(|n| n.is_leaf()).count(),
            tree.ranks.len()
        );
        Ok(tree)
    }

    /// Parses the hierarchy file named by `path` and builds the tree with the
    /// ranks and offset of `config`.
    pub fn from_hierarchy_file<P: AsRef<Path>>(path: P, config: &RunConfig) -> Result<Self> {
        let lineages = parse_hierarchy(path, config.hierarchy_columns)?;
        Self::from_lineages(&lineages, &config.taxa_hierarchy, config.taxa_offset)
    }

    /// Walks from the root down `lineage`, creating each missing child.
    /// Shared prefixes resolve to the same nodes.
    fn insert_lineage(&mut self, lineage: &[String], warned: &mut AHashSet<String>) {
        let mut current = self.root();
        for name in lineage {
            current = match self.nodes[current].child(name) {
                Some(existing) => existing,
                None => self.add_child(current, name, warned),
            };
        }
    }

    fn add_child(&mut self, parent: NodeId, name: &str, warned: &mut AHashSet<String>) -> NodeId {
        let id = self.nodes.len();
        let height = self.nodes[parent].height + 1;
        self.nodes.push(TaxonNode::new(name, Some(parent), height));

        let parent_node = &mut self.nodes[parent];
        parent_node.children.push(id);
        parent_node.child_lookup.insert(name.to_string(), id);

        // first registration keeps the flat-index entry
        if self.index.contains_key(name) {
            if warned.insert(name.to_string()) {
                log::warn!(
                    "Taxon name '{}' occurs more than once in the hierarchy; \
                     unranked lookups resolve to the first occurrence",
                    name
                );
                self.shadowed.push(name.to_string());
            }
        } else {
            self.index.insert(name.to_string(), id);
        }
        id
    }

    fn bucket_ranks(&mut self) -> Result<()> {
        let order: Vec<NodeId> = self.preorder().collect();
        for id in order {
            let node = &self.nodes[id];
            let Some(rank_index) = node.height.checked_sub(self.root_offset) else {
                continue;
            };
            if rank_index >= self.ranks.len() {
                return Err(TreeError::RankOutOfRange {
                    node: node.name.clone(),
                    height: node.height,
                    ranks: self.ranks.len(),
                    offset: self.root_offset,
                });
            }
            self.rank_buckets[rank_index].push(id);
            // later namesakes in pre-order take over the rank entry
            self.rank_index[rank_index].insert(node.name.clone(), id);
        }
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> &TaxonNode {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TaxonNode {
        &mut self.nodes[id]
    }

    /// Looks a taxon up by name in the flat index.
    pub fn get(&self, name: &str) -> Option<&TaxonNode> {
        self.id_of(name).map(|id| &self.nodes[id])
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    /// Looks a taxon up among the nodes of `rank` only.
    pub fn id_at_rank(&self, rank: &str, name: &str) -> Option<NodeId> {
        let i = self.rank_position(rank)?;
        self.rank_index[i].get(name).copied()
    }

    /// Rank-qualified lookup when `rank` is one of the tree's ranks, the flat
    /// index otherwise.
    pub fn lookup(&self, rank: Option<&str>, name: &str) -> Option<NodeId> {
        match rank.and_then(|r| self.rank_position(r)) {
            Some(i) => self.rank_index[i].get(name).copied(),
            None => self.id_of(name),
        }
    }

    /// Names that label more than one node, in the order first seen twice.
    pub fn shadowed_names(&self) -> &[String] {
        &self.shadowed
    }

    fn rank_position(&self, rank: &str) -> Option<usize> {
        self.ranks.iter().position(|r| r == rank)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &TaxonNode> + '_ {
        self.nodes[id].children.iter().map(move |&c| &self.nodes[c])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Node ids from `id` up to and including the root.
    pub fn lineage(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = id;
        while let Some(p) = self.nodes[current].parent {
            path.push(p);
            current = p;
        }
        path
    }

    /// Depth-first pre-order walk over every node, children in insertion
    /// order. Each call starts a fresh walk.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: vec![self.root()],
        }
    }

    /// Pre-order walk yielding nodes instead of ids.
    pub fn iter(&self) -> impl Iterator<Item = &TaxonNode> + '_ {
        self.preorder().map(move |id| &self.nodes[id])
    }

    pub fn ranks(&self) -> &[String] {
        &self.ranks
    }

    pub fn root_offset(&self) -> usize {
        self.root_offset
    }

    /// Rank label of a node, or `None` above the first rank of interest.
    pub fn rank_of(&self, id: NodeId) -> Option<&str> {
        let rank_index = self.nodes[id].height.checked_sub(self.root_offset)?;
        self.ranks.get(rank_index).map(|r| r.as_str())
    }

    /// Every node bucketed under `rank`, in pre-order. Unknown ranks yield an
    /// empty slice.
    pub fn nodes_at_rank(&self, rank: &str) -> &[NodeId] {
        self.rank_position(rank)
            .map(|i| self.rank_buckets[i].as_slice())
            .unwrap_or(&[])
    }

    pub fn state(&self) -> TreeState {
        self.state
    }

    /// Moves the tree from `expected` to `next`, or reports `operation` as out
    /// of order.
    pub(crate) fn advance(
        &mut self,
        expected: TreeState,
        next: TreeState,
        operation: &'static str,
    ) -> Result<()> {
        self.require(expected, operation)?;
        self.state = next;
        Ok(())
    }

    pub(crate) fn require(&self, expected: TreeState, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(TreeError::OutOfOrder {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    pub(crate) fn require_at_least(&self, minimum: TreeState, operation: &'static str) -> Result<()> {
        if self.state < minimum {
            return Err(TreeError::OutOfOrder {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }
}

/// Explicit-stack pre-order traversal; see [`TaxonomyTree::preorder`].
pub struct Preorder<'a> {
    tree: &'a TaxonomyTree,
    stack: Vec<NodeId>,
}

impl Iterator for Preorder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        // reversed so the first child is visited first
        self.stack
            .extend(self.tree.nodes[id].children.iter().rev().copied());
        Some(id)
    }
}

/// One line per node: indentation by height, then the lineage up to the root,
/// e.g. `\t\tFirmicutes;Bacteria;ROOT;`.
impl fmt::Display for TaxonomyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.preorder() {
            for _ in 0..self.nodes[id].height {
                f.write_str("\t")?;
            }
            for ancestor in self.lineage(id) {
                write!(f, "{};", self.nodes[ancestor].name)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
