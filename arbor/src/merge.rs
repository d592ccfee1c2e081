//! Merging one data tree into another.
//!
//! Source and target are matched with the same correspondence rule as
//! [`crate::diff`]. Matched leaves and anydata take the source payload,
//! matched inner nodes are merged child by child, matched leaf-list
//! instances stay as they are. Unmatched source subtrees are copied into the
//! target, re-resolving schema nodes by name when the two trees use
//! different contexts.
//!
//! Target nodes claimed by a match carry [`Validity::IN_USE`] so repeated
//! source instances do not match the same target twice; a final sweep clears
//! the marks.

use bough::indextree::NodeId;
use rapidhash::RapidHashMap;

use crate::diag::Diagnostics;
use crate::error::Error;
use crate::schema::SchemaId;
use crate::tree::{DataTree, NodeFlags, NodeKind, Validity, map_schema};
use crate::{debug, trace};

/// Merge behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOptions {
    /// A default source leaf never overwrites an explicit target leaf.
    pub explicit: bool,
}

/// Merge every top-level instance of `source` into `target`.
pub fn merge(
    target: &mut DataTree,
    source: DataTree,
    opts: &MergeOptions,
    diag: &mut Diagnostics,
) -> Result<(), Error> {
    let root = target.root();
    let mut merger = Merger {
        target,
        source: &source,
        opts: *opts,
        diag,
    };
    let result = merger.children(root, source.root());
    merger.sweep(root);
    result
}

/// Merge the subtree `source_node` of `source` below `target_parent`.
///
/// Non-presence containers between `target_parent` and the data parent of
/// `source_node` are created in the target when missing.
pub fn merge_into(
    target: &mut DataTree,
    target_parent: NodeId,
    source: DataTree,
    source_node: NodeId,
    opts: &MergeOptions,
    diag: &mut Diagnostics,
) -> Result<(), Error> {
    let s_schema = source
        .try_get(source_node)
        .and_then(|n| n.schema())
        .ok_or_else(|| Error::argument("source node is not a data node"))?;
    let mapped = map_schema(source.ctx(), s_schema, target.ctx()).ok_or_else(|| {
        Error::argument(format!(
            "{} has no counterpart in the target context",
            source.ctx().schema_path(s_schema)
        ))
    })?;
    target.checked(target_parent)?;

    let mut merger = Merger {
        target,
        source: &source,
        opts: *opts,
        diag,
    };
    let result = merger
        .ancestors(target_parent, mapped)
        .and_then(|parent| merger.sibling(parent, source_node, &mut RapidHashMap::default()));
    merger.sweep(target_parent);
    result
}

struct Merger<'a> {
    target: &'a mut DataTree,
    source: &'a DataTree,
    opts: MergeOptions,
    diag: &'a mut Diagnostics,
}

impl Merger<'_> {
    /// Find or create the non-presence containers leading from
    /// `target_parent` to the data parent of `schema`.
    fn ancestors(&mut self, target_parent: NodeId, schema: SchemaId) -> Result<NodeId, Error> {
        let ctx = self.target.ctx().clone();
        let stop = self.target.schema(target_parent);
        let mut chain = Vec::new();
        let mut cur = ctx.data_parent(schema);
        while cur != stop {
            let Some(s) = cur else {
                return Err(Error::SchemaMismatch {
                    parent: self.target.path(target_parent),
                    node: ctx.schema_path(schema),
                });
            };
            chain.push(s);
            cur = ctx.data_parent(s);
        }

        let mut parent = target_parent;
        for &s in chain.iter().rev() {
            if !ctx.node(s).is_np_container() {
                return Err(Error::argument(format!(
                    "missing ancestor {} is not a non-presence container",
                    ctx.schema_path(s)
                )));
            }
            parent = match self.target.find_child(parent, s) {
                Some(existing) => existing,
                None => {
                    let created = self.target.new_inner(s)?;
                    self.target.insert_child(parent, created, self.diag)?;
                    debug!(container = %self.target.path(created), "synthesised merge ancestor");
                    created
                }
            };
        }
        Ok(parent)
    }

    fn children(&mut self, t_parent: NodeId, s_parent: NodeId) -> Result<(), Error> {
        let source = self.source;
        let mut last_in_group = RapidHashMap::default();
        for s in source.children(s_parent) {
            self.sibling(t_parent, s, &mut last_in_group)?;
        }
        Ok(())
    }

    /// Merge one source node under `t_parent`. `last_in_group` tracks the
    /// last target node handled per user-ordered group.
    fn sibling(
        &mut self,
        t_parent: NodeId,
        s: NodeId,
        last_in_group: &mut RapidHashMap<SchemaId, NodeId>,
    ) -> Result<(), Error> {
        let source = self.source;
        let target = &*self.target;
        let found = target.find_instance_where(t_parent, source, s, |c| {
            !target.validity(c).contains(Validity::IN_USE)
        });

        let t = match found {
            Some(t) => {
                trace!(node = %self.target.path(t), "merge match");
                self.claim(t);
                self.merge_payload(t, s)?;
                if source.get(s).inner().is_some() {
                    self.children(t, s)?;
                }
                t
            }
            None => {
                let copy = self.target.dup_into(source, s)?;
                if let Err(err) = self.place(t_parent, copy, last_in_group) {
                    self.target.free(copy)?;
                    return Err(err);
                }
                debug!(node = %self.target.path(copy), "merge copy");
                self.claim(copy);
                copy
            }
        };
        if let Some(schema) = self.target.schema(t)
            && self.target.ctx().node(schema).is_user_ordered()
        {
            last_in_group.insert(schema, t);
        }
        Ok(())
    }

    /// Insert a copied node, keeping user-ordered groups in source order.
    fn place(
        &mut self,
        t_parent: NodeId,
        copy: NodeId,
        last_in_group: &RapidHashMap<SchemaId, NodeId>,
    ) -> Result<(), Error> {
        let schema = self.target.schema_of(copy)?;
        if !self.target.ctx().node(schema).is_user_ordered() {
            return self.target.insert_child(t_parent, copy, self.diag);
        }
        if let Some(&prev) = last_in_group.get(&schema) {
            return self.target.insert_after(prev, copy, self.diag);
        }
        let first = self.target.instances(t_parent, schema).next();
        match first {
            Some(first) => self.target.insert_before(first, copy, self.diag),
            None => self.target.insert_child(t_parent, copy, self.diag),
        }
    }

    fn claim(&mut self, t: NodeId) {
        self.target.get_mut(t).validity.insert(Validity::IN_USE);
    }

    /// Source value of a matched leaf or anydata onto its target.
    fn merge_payload(&mut self, t: NodeId, s: NodeId) -> Result<(), Error> {
        let source = self.source;
        let s_default = source.is_default(s);
        let t_default = self.target.is_default(t);
        if s_default && !t_default && self.opts.explicit {
            return Ok(());
        }
        match &source.get(s).kind {
            NodeKind::Term { value, .. } => {
                if self.target.schema_node(t).is_some_and(|n| n.is_leaf_list()) {
                    return Ok(());
                }
                let same = self.target.value_str(t) == Some(value.canonical.as_str());
                if same && s_default == t_default {
                    return Ok(());
                }
                self.target.change_term(t, &value.canonical)?;
                if s_default {
                    self.set_default(t);
                }
            }
            NodeKind::Any { value, .. } => {
                if let NodeKind::Any { value: target_value, .. } = &mut self.target.get_mut(t).kind {
                    *target_value = value.clone();
                }
                if s_default {
                    self.set_default(t);
                } else {
                    self.target.mark_explicit(t);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn set_default(&mut self, t: NodeId) {
        self.target.get_mut(t).flags.insert(NodeFlags::DEFAULT);
        if let Some(parent) = self.target.parent(t) {
            self.target.refresh_default_containers(parent);
        }
    }

    /// Clear claims in the document and in the (possibly detached) tree
    /// holding `from`.
    fn sweep(&mut self, from: NodeId) {
        let mut top = from;
        while let Some(p) = self.target.parent(top) {
            top = p;
        }
        let mut nodes: Vec<NodeId> = self.target.iter().collect();
        if top != self.target.root() {
            nodes.extend(self.target.descendants(top));
        }
        for id in nodes {
            self.target.get_mut(id).validity.remove(Validity::IN_USE);
        }
    }
}
