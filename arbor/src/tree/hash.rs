//! Structural hashes and the per-parent child index.
//!
//! A node's hash covers its schema identity plus whatever decides instance
//! identity: the key values of a list, the value of a leaf-list, and for
//! keyless lists a fingerprint of all descendant leaf values. Hashes are
//! computed from names, not schema ids, so trees built on different
//! contexts hash alike.

use core::hash::{Hash, Hasher};

use bough::indextree::NodeId;
use rapidhash::{RapidHashMap, RapidHasher};
use smallvec::SmallVec;

use super::{DataTree, NodeKind};
use crate::schema::SchemaKind;

/// Child count at which an inner node starts keeping a [`HashIndex`].
pub const HASH_THRESHOLD: usize = 4;

/// Children of one parent bucketed by hash.
#[derive(Debug, Clone, Default)]
pub struct HashIndex {
    buckets: RapidHashMap<u32, SmallVec<[NodeId; 2]>>,
    len: usize,
}

impl HashIndex {
    pub fn insert(&mut self, hash: u32, id: NodeId) {
        self.buckets.entry(hash).or_default().push(id);
        self.len += 1;
    }

    pub fn remove(&mut self, hash: u32, id: NodeId) -> bool {
        let Some(bucket) = self.buckets.get_mut(&hash) else {
            return false;
        };
        let Some(pos) = bucket.iter().position(|&n| n == id) else {
            return false;
        };
        bucket.remove(pos);
        if bucket.is_empty() {
            self.buckets.remove(&hash);
        }
        self.len -= 1;
        true
    }

    /// Nodes registered under `hash`, in registration order.
    pub fn candidates(&self, hash: u32) -> &[NodeId] {
        self.buckets.get(&hash).map_or(&[], |b| b.as_slice())
    }

    pub fn contains(&self, hash: u32, id: NodeId) -> bool {
        self.candidates(hash).contains(&id)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn fold(h: u64) -> u32 {
    (h ^ (h >> 32)) as u32
}

/// Hash of `id` as it would be stored in the node.
///
/// `None` for the document node and for keyed list instances that are still
/// missing one of their keys.
pub fn compute_hash(tree: &DataTree, id: NodeId) -> Option<u32> {
    let schema = tree.schema(id)?;
    let ctx = tree.ctx();
    let snode = ctx.node(schema);
    let module = ctx.module_name(schema).as_str();

    match &snode.kind {
        SchemaKind::LeafList(_) => Some(identity_hash(module, &snode.name, &[tree.value_str(id)?])),
        SchemaKind::List(info) if info.keys.is_empty() => {
            let mut prints: Vec<u32> = keyless_entries(tree, id)
                .map(|(depth, module, name, value)| {
                    let mut h = RapidHasher::default();
                    depth.hash(&mut h);
                    module.hash(&mut h);
                    name.hash(&mut h);
                    value.hash(&mut h);
                    fold(h.finish())
                })
                .collect();
            prints.sort_unstable();
            let mut hasher = RapidHasher::default();
            module.hash(&mut hasher);
            snode.name.as_str().hash(&mut hasher);
            prints.hash(&mut hasher);
            Some(fold(hasher.finish()))
        }
        SchemaKind::List(_) => {
            let keys = tree.key_values(id)?;
            Some(identity_hash(module, &snode.name, &keys))
        }
        _ => Some(identity_hash(module, &snode.name, &[])),
    }
}

/// Hash of a node identified by schema names and identity values (list keys
/// in declared order, or a leaf-list value). Matches [`compute_hash`].
pub(crate) fn identity_hash(module: &str, name: &str, values: &[&str]) -> u32 {
    let mut hasher = RapidHasher::default();
    module.hash(&mut hasher);
    name.hash(&mut hasher);
    for v in values {
        v.hash(&mut hasher);
    }
    fold(hasher.finish())
}

/// `(depth, module, name, value)` of every term below a keyless list instance.
pub(crate) fn keyless_entries(
    tree: &DataTree,
    id: NodeId,
) -> impl Iterator<Item = (usize, &str, &str, &str)> + '_ {
    let ctx = tree.ctx();
    tree.descendants(id).skip(1).filter_map(move |d| {
        let NodeKind::Term { schema, value } = &tree.get(d).kind else {
            return None;
        };
        Some((
            depth_below(tree, d, id),
            ctx.module_name(*schema).as_str(),
            ctx.node(*schema).name.as_str(),
            value.canonical.as_str(),
        ))
    })
}

fn depth_below(tree: &DataTree, id: NodeId, top: NodeId) -> usize {
    id.ancestors(&tree.arena)
        .skip(1)
        .position(|a| a == top)
        .map_or(0, |p| p + 1)
}

impl DataTree {
    /// Register `child` in `parent`'s index, creating the index when the
    /// child count reaches [`HASH_THRESHOLD`].
    pub(crate) fn index_child(&mut self, parent: NodeId, child: NodeId) {
        let count = self.child_count(parent);
        let has_index = self
            .get(parent)
            .inner()
            .is_some_and(|i| i.index.is_some());
        if has_index {
            if let Some(hash) = self.get(child).hash
                && let Some(index) = self.index_mut(parent)
            {
                index.insert(hash, child);
            }
        } else if count >= HASH_THRESHOLD {
            self.rebuild_index(parent);
        }
    }

    /// Drop `child` from `parent`'s index, discarding the index when the
    /// child count falls below [`HASH_THRESHOLD`].
    pub(crate) fn unindex_child(&mut self, parent: NodeId, child: NodeId) {
        let hash = self.get(child).hash;
        let count = self.child_count(parent);
        let Some(inner) = self.get_mut(parent).inner_mut() else {
            return;
        };
        if count < HASH_THRESHOLD {
            inner.index = None;
        } else if let (Some(index), Some(hash)) = (inner.index.as_mut(), hash) {
            index.remove(hash, child);
        }
    }

    fn index_mut(&mut self, parent: NodeId) -> Option<&mut HashIndex> {
        self.get_mut(parent).inner_mut()?.index.as_mut()
    }

    pub(crate) fn rebuild_index(&mut self, parent: NodeId) {
        let mut index = HashIndex::default();
        for child in self.children(parent) {
            if let Some(hash) = self.get(child).hash {
                index.insert(hash, child);
            }
        }
        if let Some(inner) = self.get_mut(parent).inner_mut() {
            inner.index = Some(index);
        }
    }

    /// Recompute the hash of `id`, moving its entry in the parent's index.
    pub(crate) fn rehash_node(&mut self, id: NodeId) {
        let old = self.get(id).hash;
        let new = compute_hash(self, id);
        if old == new {
            return;
        }
        self.get_mut(id).hash = new;
        if let Some(parent) = self.parent(id)
            && let Some(index) = self.index_mut(parent)
        {
            if let Some(old) = old {
                index.remove(old, id);
            }
            if let Some(new) = new {
                index.insert(new, id);
            }
        }
    }

    /// Refresh hashes that depend on `changed`: the list it keys, and every
    /// keyless list above it.
    pub(crate) fn rehash_after_change(&mut self, changed: NodeId) {
        let is_key = self.schema_node(changed).is_some_and(|s| s.is_key);
        self.rehash_ancestors(self.parent(changed), is_key);
    }

    /// Same as [`DataTree::rehash_after_change`], for a child that already left `parent`.
    pub(crate) fn rehash_ancestors(&mut self, parent: Option<NodeId>, key_changed: bool) {
        let mut cur = parent;
        let mut first = true;
        while let Some(p) = cur {
            let Some(snode) = self.schema_node(p) else {
                break;
            };
            if snode.is_keyless_list() || (first && key_changed && snode.is_list()) {
                self.rehash_node(p);
            }
            first = false;
            cur = self.parent(p);
        }
    }

    /// Verify child counts and every index against a linear scan.
    pub fn check_index_consistency(&self) -> Result<(), String> {
        for id in self.descendants(self.root()) {
            let Some(inner) = self.get(id).inner() else {
                continue;
            };
            let actual = self.children(id).count();
            if inner.child_count != actual {
                return Err(format!(
                    "{}: child count {} but {actual} children",
                    self.path(id),
                    inner.child_count
                ));
            }
            match &inner.index {
                None if actual >= HASH_THRESHOLD => {
                    return Err(format!("{}: {actual} children but no index", self.path(id)));
                }
                Some(_) if actual < HASH_THRESHOLD => {
                    return Err(format!("{}: index kept below threshold", self.path(id)));
                }
                Some(index) => {
                    let mut hashed = 0;
                    for child in self.children(id) {
                        let stored = self.get(child).hash;
                        if stored != compute_hash(self, child) {
                            return Err(format!("{}: stale hash", self.path(child)));
                        }
                        if let Some(hash) = stored {
                            hashed += 1;
                            if !index.contains(hash, child) {
                                return Err(format!("{}: missing from index", self.path(child)));
                            }
                        }
                    }
                    if hashed != index.len() {
                        return Err(format!(
                            "{}: index holds {} entries for {hashed} hashed children",
                            self.path(id),
                            index.len()
                        ));
                    }
                }
                None => {}
            }
        }
        Ok(())
    }
}
