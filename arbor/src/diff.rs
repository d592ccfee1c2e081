//! Edit scripts between two data trees.
//!
//! Nodes correspond when they instantiate the same schema node and, for list
//! and leaf-list instances, agree on keys or value (see
//! [`crate::tree::same_instance`]). A node matched once is not matched again,
//! so repeated state instances are counted.
//!
//! The script is produced in two passes: a depth-first walk of the second
//! tree (siblings before children) reports creations, value changes and, for
//! user-ordered groups, moves; a residual walk of the first tree reports
//! every unmatched node as deleted. Subtrees are reported at their root only.

use core::fmt;

use bough::indextree::NodeId;
use bough::{Matching, plan_moves};

use crate::debug;
use crate::diag::Diagnostics;
use crate::error::Error;
use crate::schema::SchemaId;
use crate::tree::{DataTree, NodeKind};

/// Diff behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffOptions {
    /// Report default nodes and compare default flags.
    pub with_defaults: bool,
}

/// One edit. `first`/`second` are nodes of the respective tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    /// Subtree present only in the second tree.
    Created { second: NodeId },
    /// Subtree present only in the first tree.
    Deleted { first: NodeId },
    /// Leaf or anydata value (or default flag) differs.
    Changed { first: NodeId, second: NodeId },
    /// A user-ordered instance moves; `after` is the first-tree sibling it
    /// follows afterwards, `None` when it becomes first of its group.
    Moved {
        first: NodeId,
        second: NodeId,
        after: Option<NodeId>,
    },
}

impl fmt::Display for DiffOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffOp::Created { second } => write!(f, "Created(b:{})", usize::from(*second)),
            DiffOp::Deleted { first } => write!(f, "Deleted(a:{})", usize::from(*first)),
            DiffOp::Changed { first, second } => write!(
                f,
                "Changed(a:{} -> b:{})",
                usize::from(*first),
                usize::from(*second)
            ),
            DiffOp::Moved {
                first,
                second,
                after,
            } => {
                write!(f, "Moved(a:{} b:{} ", usize::from(*first), usize::from(*second))?;
                match after {
                    Some(a) => write!(f, "after a:{})", usize::from(*a)),
                    None => write!(f, "to front)"),
                }
            }
        }
    }
}

/// An ordered edit script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    ops: Vec<DiffOp>,
}

impl Diff {
    pub fn ops(&self) -> &[DiffOp] {
        &self.ops
    }

    pub fn iter(&self) -> core::slice::Iter<'_, DiffOp> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn push(&mut self, op: DiffOp) {
        debug!(%op, "emit");
        self.ops.push(op);
    }

    /// One line per operation, with data paths and values.
    pub fn describe(&self, first: Option<&DataTree>, second: Option<&DataTree>) -> Vec<String> {
        let path = |tree: Option<&DataTree>, id: NodeId| {
            tree.map_or_else(|| format!("#{}", usize::from(id)), |t| t.path(id))
        };
        let value = |tree: Option<&DataTree>, id: NodeId| {
            tree.and_then(|t| t.value_str(id)).unwrap_or("").to_string()
        };
        self.ops
            .iter()
            .map(|op| match *op {
                DiffOp::Created { second: s } => format!("created {}", path(second, s)),
                DiffOp::Deleted { first: f } => format!("deleted {}", path(first, f)),
                DiffOp::Changed {
                    first: f,
                    second: s,
                } => format!(
                    "changed {}: '{}' -> '{}'",
                    path(second, s),
                    value(first, f),
                    value(second, s)
                ),
                DiffOp::Moved {
                    second: s, after, ..
                } => match after {
                    Some(a) => format!("moved {} after {}", path(second, s), path(first, a)),
                    None => format!("moved {} to the front", path(second, s)),
                },
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = &'a DiffOp;
    type IntoIter = core::slice::Iter<'a, DiffOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

/// Diff two trees. An absent first tree makes every top-level instance of
/// the second one created; an absent second tree makes everything deleted.
pub fn diff(
    first: Option<&DataTree>,
    second: Option<&DataTree>,
    opts: &DiffOptions,
    diag: &mut Diagnostics,
) -> Result<Diff, Error> {
    let mut out = Diff::default();
    match (first, second) {
        (None, None) => {}
        (None, Some(second)) => {
            for s in second.top_level() {
                if opts.with_defaults || !second.is_default(s) {
                    out.push(DiffOp::Created { second: s });
                }
            }
        }
        (Some(first), None) => {
            for f in first.top_level() {
                if opts.with_defaults || !first.is_default(f) {
                    out.push(DiffOp::Deleted { first: f });
                }
            }
        }
        (Some(first), Some(second)) => {
            let mut differ = Differ::new(first, second, *opts, diag);
            differ.children(first.root(), second.root())?;
            differ.deletions(first.root());
            out = differ.out;
        }
    }
    Ok(out)
}

/// Diff one explicitly paired node of each tree, which must instantiate the
/// same schema node.
pub fn diff_nodes(
    first: &DataTree,
    f: NodeId,
    second: &DataTree,
    s: NodeId,
    opts: &DiffOptions,
    diag: &mut Diagnostics,
) -> Result<Diff, Error> {
    let (Some(sf), Some(ss)) = (first.schema(f), second.schema(s)) else {
        return diff(Some(first), Some(second), opts, diag);
    };
    if !crate::tree::same_schema(first.ctx(), sf, second.ctx(), ss) {
        return Err(Error::argument(format!(
            "cannot diff {} against {}",
            first.path(f),
            second.path(s)
        )));
    }
    let mut differ = Differ::new(first, second, *opts, diag);
    differ.matching.pair(f, s);
    differ.compare(f, s);
    differ.children(f, s)?;
    differ.deletions(f);
    Ok(differ.out)
}

struct Differ<'a> {
    first: &'a DataTree,
    second: &'a DataTree,
    opts: DiffOptions,
    matching: Matching,
    out: Diff,
}

impl<'a> Differ<'a> {
    fn new(
        first: &'a DataTree,
        second: &'a DataTree,
        opts: DiffOptions,
        diag: &mut Diagnostics,
    ) -> Self {
        if !core::ptr::eq(&**first.ctx(), &**second.ctx()) {
            diag.warn("trees use different schema contexts, matching by name", None);
        }
        Self {
            first,
            second,
            opts,
            matching: Matching::with_capacity(first.arena.len(), second.arena.len()),
            out: Diff::default(),
        }
    }

    fn reported(&self, tree: &DataTree, id: NodeId) -> bool {
        self.opts.with_defaults || !tree.is_default(id)
    }

    /// Match the children of a matched pair, then recurse into matched inner nodes.
    fn children(&mut self, f_parent: NodeId, s_parent: NodeId) -> Result<(), Error> {
        let (first, second) = (self.first, self.second);
        let mut inner_pairs = Vec::new();
        for s in second.children(s_parent) {
            let matching = &self.matching;
            let found =
                first.find_instance_where(f_parent, second, s, |c| !matching.is_first_matched(c));
            match found {
                Some(f) => {
                    self.matching.pair(f, s);
                    self.compare(f, s);
                    if first.get(f).inner().is_some() {
                        inner_pairs.push((f, s));
                    }
                }
                None if self.reported(second, s) => self.out.push(DiffOp::Created { second: s }),
                None => {}
            }
        }
        self.moves(f_parent, s_parent)?;
        for (f, s) in inner_pairs {
            self.children(f, s)?;
        }
        Ok(())
    }

    fn compare(&mut self, f: NodeId, s: NodeId) {
        let (first, second) = (self.first, self.second);
        let changed = match (&first.get(f).kind, &second.get(s).kind) {
            (NodeKind::Term { value: a, .. }, NodeKind::Term { value: b, .. }) => {
                a.canonical != b.canonical
            }
            (NodeKind::Any { value: a, .. }, NodeKind::Any { value: b, .. }) => {
                !a.same_content(b)
            }
            _ => return,
        };
        let flag_changed = self.opts.with_defaults && first.is_default(f) != second.is_default(s);
        if changed || flag_changed {
            self.out.push(DiffOp::Changed {
                first: f,
                second: s,
            });
        }
    }

    /// Moves inside each user-ordered group of matched siblings.
    fn moves(&mut self, f_parent: NodeId, s_parent: NodeId) -> Result<(), Error> {
        let (first, second) = (self.first, self.second);
        let mut groups: Vec<SchemaId> = Vec::new();
        for s in second.children(s_parent) {
            if let Some(schema) = second.schema(s)
                && second.ctx().node(schema).is_user_ordered()
                && !groups.contains(&schema)
            {
                groups.push(schema);
            }
        }

        for schema in groups {
            let second_order: Vec<NodeId> = second
                .instances(s_parent, schema)
                .filter(|&s| self.matching.is_second_matched(s))
                .collect();
            if second_order.len() < 2 {
                continue;
            }
            let targets = self
                .matching
                .group_targets(first.children(f_parent), &second_order);
            let planned = plan_moves(&targets).map_err(|e| Error::internal(e.to_string()))?;
            for m in planned {
                let s = second_order[m.element];
                let Some(f) = self.matching.first_of(s) else {
                    return Err(Error::internal("moved node lost its match"));
                };
                let after = m
                    .after
                    .and_then(|t| self.matching.first_of(second_order[t]));
                self.out.push(DiffOp::Moved {
                    first: f,
                    second: s,
                    after,
                });
            }
        }
        Ok(())
    }

    /// Unmatched nodes of the first tree below matched ones.
    fn deletions(&mut self, f_parent: NodeId) {
        let first = self.first;
        for f in first.children(f_parent) {
            if self.matching.is_first_matched(f) {
                self.deletions(f);
            } else if self.reported(first, f) {
                self.out.push(DiffOp::Deleted { first: f });
            }
        }
    }
}
