//! Insertion, unlinking and freeing.
//!
//! Every insertion goes through the same steps: schema check, collection of
//! the nodes the new one displaces (other choice cases, default instances),
//! position selection, linking, then bookkeeping (child count, index,
//! dependent hashes, validity and default flags). All checks run before the
//! first mutation, so a failed insertion leaves the tree untouched.

use bough::indextree::NodeId;

use super::{DataTree, NodeKind, Validity};
use crate::diag::Diagnostics;
use crate::error::Error;
use crate::schema::SchemaId;
use crate::{debug, trace};

/// Where a node goes among its new siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Append,
    First,
    Before(NodeId),
    After(NodeId),
}

impl DataTree {
    /// Insert `node` as a child of `parent` (use [`DataTree::root`] for
    /// top-level nodes).
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        node: NodeId,
        diag: &mut Diagnostics,
    ) -> Result<(), Error> {
        let schema = self.check_insert(parent, node)?;
        let displaced = self.displaced_by(parent, node, schema)?;
        // key order failures surface before anything is removed
        let mut slot = self.slot_for(parent, schema, diag)?;
        if !displaced.is_empty() {
            self.remove_all(&displaced)?;
            slot = self.slot_for(parent, schema, &mut Diagnostics::new())?;
        }
        self.link(parent, node, slot)
    }

    /// Insert `node` as a top-level instance.
    pub fn insert(&mut self, node: NodeId, diag: &mut Diagnostics) -> Result<(), Error> {
        self.insert_child(self.root(), node, diag)
    }

    /// Insert `node` right before `anchor`.
    pub fn insert_before(
        &mut self,
        anchor: NodeId,
        node: NodeId,
        diag: &mut Diagnostics,
    ) -> Result<(), Error> {
        self.insert_sibling(anchor, node, Slot::Before(anchor), diag)
    }

    /// Insert `node` right after `anchor`.
    pub fn insert_after(
        &mut self,
        anchor: NodeId,
        node: NodeId,
        diag: &mut Diagnostics,
    ) -> Result<(), Error> {
        self.insert_sibling(anchor, node, Slot::After(anchor), diag)
    }

    fn insert_sibling(
        &mut self,
        anchor: NodeId,
        node: NodeId,
        slot: Slot,
        diag: &mut Diagnostics,
    ) -> Result<(), Error> {
        self.checked(anchor)?;
        if anchor == node {
            return Err(Error::argument("a node cannot be its own sibling anchor"));
        }
        let parent = self
            .parent(anchor)
            .ok_or_else(|| Error::argument("anchor is not linked into the tree"))?;
        let schema = self.check_insert(parent, node)?;

        if self.ctx().node(schema).is_key {
            return Err(Error::Conflict(format!(
                "key {} is positioned automatically",
                self.ctx().node(schema).name
            )));
        }
        let is_key = |tree: &DataTree, id: Option<NodeId>| {
            id.and_then(|id| tree.schema_node(id)).is_some_and(|s| s.is_key)
        };
        let breaks_keys = match slot {
            Slot::Before(a) => is_key(self, Some(a)),
            Slot::After(a) => is_key(self, self.next_sibling(a)),
            _ => false,
        };
        if breaks_keys {
            return Err(Error::Conflict(format!(
                "{} would be placed before the keys of {}",
                self.ctx().node(schema).name,
                self.path(parent)
            )));
        }

        let in_operation = self.schema_node(parent).is_some_and(|s| s.is_operation());
        if in_operation {
            let wanted = self.slot_for(parent, schema, diag)?;
            if self.follower(parent, wanted) != self.follower(parent, slot) {
                return Err(Error::Conflict(format!(
                    "children of {} must stay in schema order",
                    self.path(parent)
                )));
            }
        }

        let displaced = self.displaced_by(parent, node, schema)?;
        if displaced.contains(&anchor) {
            return Err(Error::Conflict(format!(
                "anchor {} would be replaced by the inserted node",
                self.path(anchor)
            )));
        }
        self.remove_all(&displaced)?;
        self.link(parent, node, slot)
    }

    /// Link a node under `parent` without any schema rule. Used when copying
    /// subtrees whose shape is already valid.
    pub(crate) fn attach_raw(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        parent.checked_append(child, &mut self.arena)?;
        if let Some(inner) = self.get_mut(parent).inner_mut() {
            inner.child_count += 1;
        }
        self.index_child(parent, child);
        Ok(())
    }

    /// Detach `node` from its parent and siblings. Detaching a detached node
    /// is a no-op.
    pub fn unlink(&mut self, node: NodeId) -> Result<(), Error> {
        self.checked(node)?;
        if self.is_document(node) {
            return Err(Error::argument("the document node cannot be unlinked"));
        }
        let Some(parent) = self.parent(node) else {
            node.detach(&mut self.arena);
            return Ok(());
        };
        trace!(node = %self.path(node), "unlink");
        let was_key = self.schema_node(node).is_some_and(|s| s.is_key);
        if let Some(inner) = self.get_mut(parent).inner_mut() {
            inner.child_count -= 1;
        }
        self.unindex_child(parent, node);
        node.detach(&mut self.arena);

        self.rehash_ancestors(Some(parent), was_key);
        self.invalidate_ancestors(parent);
        self.refresh_default_containers(parent);
        Ok(())
    }

    /// Release a detached subtree.
    pub fn free(&mut self, node: NodeId) -> Result<(), Error> {
        self.checked(node)?;
        if self.is_document(node) {
            return Err(Error::argument("the document node cannot be freed"));
        }
        if self.is_linked(node) {
            return Err(Error::StillLinked(self.path(node)));
        }
        node.remove_subtree(&mut self.arena);
        Ok(())
    }

    /// Unlink and free.
    pub fn remove(&mut self, node: NodeId) -> Result<(), Error> {
        self.unlink(node)?;
        self.free(node)
    }

    fn remove_all(&mut self, nodes: &[NodeId]) -> Result<(), Error> {
        for &n in nodes {
            debug!(node = %self.path(n), "removing displaced node");
            self.remove(n)?;
        }
        Ok(())
    }

    /// Argument checks shared by all insertions. Returns the node's schema.
    fn check_insert(&self, parent: NodeId, node: NodeId) -> Result<SchemaId, Error> {
        let schema = self.schema_of(node)?;
        let parent_data = self.checked(parent)?;
        if self.is_linked(node) {
            return Err(Error::argument(format!(
                "{} is already linked into the tree",
                self.path(node)
            )));
        }
        if node.ancestors(&self.arena).any(|a| a == parent)
            || parent.ancestors(&self.arena).any(|a| a == node)
        {
            return Err(Error::argument("cannot insert a node into its own subtree"));
        }
        let expected = match &parent_data.kind {
            NodeKind::Document(_) => None,
            NodeKind::Inner { schema, .. } => Some(*schema),
            _ => {
                return Err(Error::SchemaMismatch {
                    parent: self.path(parent),
                    node: self.ctx().schema_path(schema),
                });
            }
        };
        if self.ctx().data_parent(schema) != expected {
            return Err(Error::SchemaMismatch {
                parent: match expected {
                    Some(p) => self.ctx().schema_path(p),
                    None => "/".to_string(),
                },
                node: self.ctx().schema_path(schema),
            });
        }
        Ok(schema)
    }

    /// Existing children that `node` replaces: instances of other cases of
    /// the same choices and default instances it supersedes. Fails when an
    /// explicit instance already occupies the slot.
    fn displaced_by(
        &self,
        parent: NodeId,
        node: NodeId,
        schema: SchemaId,
    ) -> Result<Vec<NodeId>, Error> {
        let ctx = self.ctx();
        let snode = ctx.node(schema);
        let node_default = self.is_default(node);
        let chain = ctx.choice_chain(schema);
        let mut out = Vec::new();

        for child in self.children(parent) {
            let Some(cs) = self.schema(child) else {
                continue;
            };
            let other_case = chain.iter().any(|&(choice, case)| {
                ctx.is_schema_descendant(cs, choice) && !ctx.is_schema_descendant(cs, case)
            });
            if other_case {
                out.push(child);
                continue;
            }
            if cs != schema {
                continue;
            }
            let child_default = self.is_default(child);
            if snode.is_single_instance() {
                if child_default {
                    out.push(child);
                } else {
                    return Err(Error::Duplicate {
                        path: self.path(child),
                    });
                }
            } else if snode.is_leaf_list() {
                if child_default && !node_default {
                    out.push(child);
                } else if snode.config
                    && !node_default
                    && self.value_str(child) == self.value_str(node)
                {
                    return Err(Error::Duplicate {
                        path: self.path(child),
                    });
                }
            }
        }

        if snode.is_list()
            && snode.config
            && !snode.is_keyless_list()
            && self.hash(node).is_some()
            && let Some(existing) = self.find_instance(parent, self, node)
        {
            return Err(Error::Duplicate {
                path: self.path(existing),
            });
        }
        Ok(out)
    }

    /// Position rules: list keys first in declared order, children of
    /// operations in schema order, everything else appended.
    fn slot_for(
        &self,
        parent: NodeId,
        schema: SchemaId,
        diag: &mut Diagnostics,
    ) -> Result<Slot, Error> {
        let ctx = self.ctx();
        let snode = ctx.node(schema);
        let Some(parent_schema) = self.schema(parent) else {
            return Ok(Slot::Append);
        };

        if snode.is_key {
            let index = ctx.key_index(parent_schema, schema).unwrap_or(0);
            let mut after = None;
            let mut misplaced = false;
            for child in self.children(parent) {
                let Some(cs) = self.schema(child) else {
                    continue;
                };
                match ctx.key_index(parent_schema, cs) {
                    Some(i) if i < index => after = Some(child),
                    Some(_) => misplaced = true,
                    None => {}
                }
            }
            if misplaced {
                if self.options().strict_key_order {
                    return Err(Error::KeyOrder {
                        list: self.path(parent),
                        key: snode.name.to_string(),
                    });
                }
                diag.warn(
                    format!("key \"{}\" supplied out of order, repositioned", snode.name),
                    Some(self.path(parent)),
                );
            }
            return Ok(after.map_or(Slot::First, Slot::After));
        }

        if ctx.node(parent_schema).is_operation() {
            let position = ctx.schema_position(schema);
            let mut after = None;
            for child in self.children(parent) {
                if self
                    .schema(child)
                    .is_some_and(|cs| ctx.schema_position(cs) <= position)
                {
                    after = Some(child);
                }
            }
            return Ok(after.map_or(Slot::First, Slot::After));
        }

        Ok(Slot::Append)
    }

    /// The sibling that ends up right after a node placed at `slot`.
    fn follower(&self, parent: NodeId, slot: Slot) -> Option<NodeId> {
        match slot {
            Slot::Append => None,
            Slot::First => self.first_child(parent),
            Slot::Before(a) => Some(a),
            Slot::After(a) => self.next_sibling(a),
        }
    }

    fn link(&mut self, parent: NodeId, node: NodeId, slot: Slot) -> Result<(), Error> {
        trace!(parent = %self.path(parent), node = self.name(node), ?slot, "link");
        match self.follower(parent, slot) {
            Some(next) => next.checked_insert_before(node, &mut self.arena)?,
            None => parent.checked_append(node, &mut self.arena)?,
        }
        if let Some(inner) = self.get_mut(parent).inner_mut() {
            inner.child_count += 1;
        }
        self.index_child(parent, node);
        self.rehash_after_change(node);

        let subtree: Vec<NodeId> = self.descendants(node).collect();
        for id in subtree {
            let data = self.get_mut(id);
            data.validity = Validity::UNCHECKED | (data.validity & Validity::IN_USE);
        }
        self.invalidate_ancestors(parent);
        if self.is_default(node) {
            self.refresh_default_containers(parent);
        } else {
            self.mark_explicit(node);
        }
        Ok(())
    }

    /// Ancestors need their mandatory checks redone after a child changes.
    fn invalidate_ancestors(&mut self, from: NodeId) {
        let mut cur = Some(from);
        while let Some(p) = cur {
            if self.is_document(p) {
                break;
            }
            self.get_mut(p).validity |= Validity::MANDATORY;
            cur = self.parent(p);
        }
    }

    /// Re-derive the default flag of non-presence containers from their
    /// children, walking up while the chain is made of such containers.
    pub(crate) fn refresh_default_containers(&mut self, from: NodeId) {
        let mut cur = Some(from);
        while let Some(p) = cur {
            if !self.schema_node(p).is_some_and(|s| s.is_np_container()) {
                break;
            }
            let all_default = self.children(p).all(|c| self.is_default(c));
            self.set_default_flag(p, all_default);
            cur = self.parent(p);
        }
    }
}
