//! Copying subtrees, within one tree or between trees.
//!
//! A copy is taken in two passes: the source subtree is snapshotted into a
//! flat list (pre-order, each entry pointing at its parent's slot), then the
//! list is materialised as a detached subtree of the destination. Trees on
//! different contexts get their schema nodes resolved by name and their
//! values re-canonicalised.

use bough::indextree::NodeId;
use rapidhash::RapidHashMap;

use super::{DataTree, HASH_THRESHOLD, Inner, NodeData, NodeFlags, NodeKind, Validity, compute_hash};
use crate::error::Error;
use crate::schema::{Context, SchemaId};

struct Entry {
    parent: Option<usize>,
    kind: NodeKind,
    flags: NodeFlags,
}

fn snapshot(tree: &DataTree, node: NodeId) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut slots: RapidHashMap<NodeId, usize> = RapidHashMap::default();
    for id in tree.descendants(node) {
        let parent = if id == node {
            None
        } else {
            tree.parent(id).and_then(|p| slots.get(&p).copied())
        };
        let data = tree.get(id);
        let kind = match &data.kind {
            NodeKind::Inner { schema, .. } => NodeKind::Inner {
                schema: *schema,
                inner: Inner::default(),
            },
            other => other.clone(),
        };
        slots.insert(id, entries.len());
        entries.push(Entry {
            parent,
            kind,
            flags: data.flags,
        });
    }
    entries
}

/// The schema node of `dst` corresponding to `schema` of `src`, found by
/// module and node names along the data ancestry.
pub fn map_schema(src: &Context, schema: SchemaId, dst: &Context) -> Option<SchemaId> {
    if core::ptr::eq(src, dst) {
        return Some(schema);
    }
    let parent = match src.data_parent(schema) {
        Some(p) => Some(map_schema(src, p, dst)?),
        None => None,
    };
    let module = dst.module_by_name(src.module_name(schema))?;
    dst.find_data_child(parent, Some(module), &src.node(schema).name)
}

impl DataTree {
    /// Detached deep copy of `node` in this tree.
    pub fn dup(&mut self, node: NodeId) -> Result<NodeId, Error> {
        self.schema_of(node)?;
        let entries = snapshot(self, node);
        let ctx = self.ctx().clone();
        self.materialize(entries, &ctx)
    }

    /// Detached deep copy of `node` from `src` into this tree.
    pub fn dup_into(&mut self, src: &DataTree, node: NodeId) -> Result<NodeId, Error> {
        src.schema_of(node)?;
        let entries = snapshot(src, node);
        self.materialize(entries, src.ctx())
    }

    fn materialize(&mut self, entries: Vec<Entry>, src_ctx: &Context) -> Result<NodeId, Error> {
        let mut schemas: RapidHashMap<SchemaId, SchemaId> = RapidHashMap::default();
        let mut ids: Vec<NodeId> = Vec::with_capacity(entries.len());
        for entry in entries {
            let kind = match self.translate(entry.kind, src_ctx, &mut schemas) {
                Ok(kind) => kind,
                Err(err) => {
                    if let Some(&top) = ids.first() {
                        top.remove_subtree(&mut self.arena);
                    }
                    return Err(err);
                }
            };
            let id = self.arena.new_node(NodeData {
                kind,
                flags: entry.flags,
                validity: Validity::UNCHECKED,
                hash: None,
            });
            if let Some(p) = entry.parent {
                self.attach_raw(ids[p], id)?;
            }
            ids.push(id);
        }

        // children before parents: list and keyless hashes depend on them
        for &id in ids.iter().rev() {
            let hash = compute_hash(self, id);
            self.get_mut(id).hash = hash;
        }
        for &id in &ids {
            if self.child_count(id) >= HASH_THRESHOLD {
                self.rebuild_index(id);
            }
        }
        ids.first()
            .copied()
            .ok_or_else(|| Error::internal("empty subtree snapshot"))
    }

    fn translate(
        &self,
        kind: NodeKind,
        src_ctx: &Context,
        cache: &mut RapidHashMap<SchemaId, SchemaId>,
    ) -> Result<NodeKind, Error> {
        let dst_ctx = self.ctx();
        if core::ptr::eq(src_ctx, &**dst_ctx) {
            return Ok(kind);
        }
        let mut map = |schema: SchemaId| -> Result<SchemaId, Error> {
            if let Some(&mapped) = cache.get(&schema) {
                return Ok(mapped);
            }
            let mapped = map_schema(src_ctx, schema, dst_ctx).ok_or_else(|| {
                Error::argument(format!(
                    "{} has no counterpart in the target context",
                    src_ctx.schema_path(schema)
                ))
            })?;
            cache.insert(schema, mapped);
            Ok(mapped)
        };
        Ok(match kind {
            NodeKind::Document(inner) => NodeKind::Document(inner),
            NodeKind::Inner { schema, inner } => NodeKind::Inner {
                schema: map(schema)?,
                inner,
            },
            NodeKind::Any { schema, value } => NodeKind::Any {
                schema: map(schema)?,
                value,
            },
            NodeKind::Term { schema, value } => {
                let mapped = map(schema)?;
                let canonical = dst_ctx
                    .canonicalize(mapped, &value.canonical)
                    .map_err(|reason| Error::InvalidValue {
                        node: dst_ctx.schema_path(mapped),
                        value: value.canonical.to_string(),
                        reason,
                    })?;
                NodeKind::Term {
                    schema: mapped,
                    value: super::TermValue {
                        canonical: canonical.canonical,
                        typed: canonical.typed,
                        flags: canonical.flags,
                    },
                }
            }
        })
    }
}
