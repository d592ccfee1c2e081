//! Arena-based data tree.
//!
//! All nodes of a tree live in one `indextree` arena. The tree owns an
//! invisible document node whose children are the top-level instances;
//! nodes that were created but not inserted are detached roots in the same
//! arena. Sibling links come from indextree: O(1) append and O(1) access to
//! the last sibling through the parent.
//!
//! Inner nodes count their children and, once that count reaches
//! [`HASH_THRESHOLD`], keep a [`HashIndex`] of them.

mod dup;
mod find;
mod hash;
mod insert;

pub use dup::map_schema;
pub use find::same_instance;
pub(crate) use find::same_schema;
pub use hash::{HASH_THRESHOLD, HashIndex, compute_hash};

use std::sync::Arc;

use bitflags::bitflags;
use bough::indextree::{Arena, NodeId};

use crate::error::Error;
use crate::intern::IStr;
use crate::schema::{Context, SchemaId, SchemaKind, SchemaNode, Value, ValueFlags};

bitflags! {
    /// Per-node state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u8 {
        /// Value or presence was synthesised rather than supplied.
        const DEFAULT = 1 << 0;
    }
}

bitflags! {
    /// "Not yet checked" markers, one per constraint axis.
    ///
    /// A node is valid for an axis only when the bit is clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Validity: u8 {
        /// Leafref / instance-identifier target not resolved.
        const UNRES_REF = 1 << 0;
        /// Mandatory children and cardinality not checked.
        const MANDATORY = 1 << 1;
        /// Unique constraints not checked.
        const UNIQUE = 1 << 2;
        /// May duplicate a sibling instance.
        const DUP = 1 << 3;
        /// When condition pending evaluation.
        const WHEN = 1 << 4;
        /// When condition evaluated true.
        const WHEN_TRUE = 1 << 5;
        /// When condition evaluated false.
        const WHEN_FALSE = 1 << 6;
        /// Temporarily claimed by a matching algorithm.
        const IN_USE = 1 << 7;

        const UNCHECKED = Self::UNRES_REF.bits()
            | Self::MANDATORY.bits()
            | Self::UNIQUE.bits()
            | Self::DUP.bits()
            | Self::WHEN.bits();
    }
}

/// Child bookkeeping of document and inner nodes.
#[derive(Debug, Clone, Default)]
pub struct Inner {
    pub(crate) child_count: usize,
    pub(crate) index: Option<HashIndex>,
}

impl Inner {
    pub fn child_count(&self) -> usize {
        self.child_count
    }

    pub fn index(&self) -> Option<&HashIndex> {
        self.index.as_ref()
    }
}

/// Value of a leaf or leaf-list instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermValue {
    pub canonical: IStr,
    pub typed: Value,
    pub flags: ValueFlags,
}

/// Payload of an anydata/anyxml instance.
#[derive(Debug, Clone)]
pub enum AnyValue {
    Tree(Box<DataTree>),
    Xml(String),
    Json(String),
    Str(String),
}

impl AnyValue {
    /// Content equality; trees compare structurally.
    pub fn same_content(&self, other: &AnyValue) -> bool {
        match (self, other) {
            (AnyValue::Tree(a), AnyValue::Tree(b)) => a.content_eq(b),
            (AnyValue::Xml(a), AnyValue::Xml(b))
            | (AnyValue::Json(a), AnyValue::Json(b))
            | (AnyValue::Str(a), AnyValue::Str(b)) => a == b,
            _ => false,
        }
    }
}

/// Node variants.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The invisible root holding top-level instances.
    Document(Inner),
    /// container, list, rpc, action or notification instance
    Inner { schema: SchemaId, inner: Inner },
    /// leaf or leaf-list instance
    Term { schema: SchemaId, value: TermValue },
    /// anydata or anyxml instance
    Any { schema: SchemaId, value: AnyValue },
}

/// What each arena slot holds.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    pub flags: NodeFlags,
    pub validity: Validity,
    /// Structural hash; `None` for lists missing a key.
    pub hash: Option<u32>,
}

impl NodeData {
    pub fn schema(&self) -> Option<SchemaId> {
        match &self.kind {
            NodeKind::Document(_) => None,
            NodeKind::Inner { schema, .. }
            | NodeKind::Term { schema, .. }
            | NodeKind::Any { schema, .. } => Some(*schema),
        }
    }

    pub fn inner(&self) -> Option<&Inner> {
        match &self.kind {
            NodeKind::Document(inner) | NodeKind::Inner { inner, .. } => Some(inner),
            _ => None,
        }
    }

    pub(crate) fn inner_mut(&mut self) -> Option<&mut Inner> {
        match &mut self.kind {
            NodeKind::Document(inner) | NodeKind::Inner { inner, .. } => Some(inner),
            _ => None,
        }
    }

    pub fn term(&self) -> Option<&TermValue> {
        match &self.kind {
            NodeKind::Term { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn any(&self) -> Option<&AnyValue> {
        match &self.kind {
            NodeKind::Any { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.flags.contains(NodeFlags::DEFAULT)
    }
}

/// Insertion behaviour of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeOptions {
    /// Reject list keys supplied out of declared order instead of
    /// repositioning them with a warning.
    pub strict_key_order: bool,
}

/// A data tree bound to a schema context.
#[derive(Debug, Clone)]
pub struct DataTree {
    ctx: Arc<Context>,
    pub(crate) arena: Arena<NodeData>,
    root: NodeId,
    options: TreeOptions,
}

impl DataTree {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self::with_options(ctx, TreeOptions::default())
    }

    pub fn with_options(ctx: Arc<Context>, options: TreeOptions) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(NodeData {
            kind: NodeKind::Document(Inner::default()),
            flags: NodeFlags::empty(),
            validity: Validity::empty(),
            hash: None,
        });
        Self {
            ctx,
            arena,
            root,
            options,
        }
    }

    pub fn ctx(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// The document node; top-level instances are its children.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn options(&self) -> TreeOptions {
        self.options
    }

    pub fn set_options(&mut self, options: TreeOptions) {
        self.options = options;
    }

    /// Get immutable reference to node data
    pub fn get(&self, id: NodeId) -> &NodeData {
        self.arena[id].get()
    }

    /// Get mutable reference to node data
    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut NodeData {
        self.arena[id].get_mut()
    }

    /// Checked access; `None` for ids that are out of range or removed.
    pub fn try_get(&self, id: NodeId) -> Option<&NodeData> {
        self.arena
            .get(id)
            .filter(|n| !n.is_removed())
            .map(|n| n.get())
    }

    pub(crate) fn checked(&self, id: NodeId) -> Result<&NodeData, Error> {
        self.try_get(id)
            .ok_or_else(|| Error::argument(format!("node {} does not exist", usize::from(id))))
    }

    pub fn schema(&self, id: NodeId) -> Option<SchemaId> {
        self.get(id).schema()
    }

    pub fn schema_node(&self, id: NodeId) -> Option<&SchemaNode> {
        self.schema(id).map(|s| self.ctx.node(s))
    }

    pub(crate) fn schema_of(&self, id: NodeId) -> Result<SchemaId, Error> {
        self.checked(id)?
            .schema()
            .ok_or_else(|| Error::argument("the document node has no schema"))
    }

    pub fn is_document(&self, id: NodeId) -> bool {
        id == self.root
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id].parent()
    }

    /// Parent, unless that is the document node.
    pub fn data_parent(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|&p| p != self.root)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id].first_child()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id].last_child()
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id].next_sibling()
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id].previous_sibling()
    }

    /// First sibling (possibly `id` itself).
    pub fn first_sibling(&self, id: NodeId) -> NodeId {
        match self.parent(id).and_then(|p| self.first_child(p)) {
            Some(first) => first,
            None => {
                let mut cur = id;
                while let Some(prev) = self.prev_sibling(cur) {
                    cur = prev;
                }
                cur
            }
        }
    }

    /// Last sibling (possibly `id` itself), O(1) through the parent.
    pub fn last_sibling(&self, id: NodeId) -> NodeId {
        match self.parent(id).and_then(|p| self.last_child(p)) {
            Some(last) => last,
            None => {
                let mut cur = id;
                while let Some(next) = self.next_sibling(cur) {
                    cur = next;
                }
                cur
            }
        }
    }

    /// Iterate children of a node
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    /// Top-level instances.
    pub fn top_level(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children(self.root)
    }

    /// `id` and everything below it, depth-first, pre-order.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.descendants(&self.arena)
    }

    /// Every data node of the tree, depth-first, pre-order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants(self.root).skip(1)
    }

    /// Number of children, O(1) for inner nodes.
    pub fn child_count(&self, id: NodeId) -> usize {
        self.get(id).inner().map_or(0, |i| i.child_count)
    }

    /// Linked under a parent or to siblings.
    pub fn is_linked(&self, id: NodeId) -> bool {
        let node = &self.arena[id];
        node.parent().is_some() || node.previous_sibling().is_some() || node.next_sibling().is_some()
    }

    pub fn value(&self, id: NodeId) -> Option<&TermValue> {
        self.get(id).term()
    }

    /// Canonical value of a leaf or leaf-list.
    pub fn value_str(&self, id: NodeId) -> Option<&str> {
        self.value(id).map(|v| v.canonical.as_str())
    }

    pub fn any_value(&self, id: NodeId) -> Option<&AnyValue> {
        self.get(id).any()
    }

    pub fn is_default(&self, id: NodeId) -> bool {
        self.get(id).is_default()
    }

    pub fn validity(&self, id: NodeId) -> Validity {
        self.get(id).validity
    }

    pub fn hash(&self, id: NodeId) -> Option<u32> {
        self.get(id).hash
    }

    /// Name of the node's schema, for messages.
    pub fn name(&self, id: NodeId) -> &str {
        match self.schema(id) {
            Some(s) => self.ctx.node(s).name.as_str(),
            None => "/",
        }
    }

    /// True when neither tree has top-level content.
    pub fn is_empty(&self) -> bool {
        self.first_child(self.root).is_none()
    }

    // ---- construction ------------------------------------------------

    fn alloc(&mut self, kind: NodeKind, flags: NodeFlags) -> NodeId {
        let id = self.arena.new_node(NodeData {
            kind,
            flags,
            validity: Validity::UNCHECKED,
            hash: None,
        });
        let hash = compute_hash(self, id);
        self.get_mut(id).hash = hash;
        id
    }

    /// New detached container, list, rpc, action or notification instance.
    ///
    /// Non-presence containers start out default until they get explicit content.
    pub fn new_inner(&mut self, schema: SchemaId) -> Result<NodeId, Error> {
        let node = self
            .ctx
            .get(schema)
            .ok_or_else(|| Error::argument(format!("unknown {schema}")))?;
        if !node.is_inner() {
            return Err(Error::argument(format!(
                "{} is not a container, list or operation",
                self.ctx.schema_path(schema)
            )));
        }
        let flags = if node.is_np_container() {
            NodeFlags::DEFAULT
        } else {
            NodeFlags::empty()
        };
        Ok(self.alloc(
            NodeKind::Inner {
                schema,
                inner: Inner::default(),
            },
            flags,
        ))
    }

    /// New detached leaf or leaf-list instance with an explicit value.
    pub fn new_term(&mut self, schema: SchemaId, value: &str) -> Result<NodeId, Error> {
        self.new_term_flagged(schema, value, NodeFlags::empty())
    }

    pub(crate) fn new_term_flagged(
        &mut self,
        schema: SchemaId,
        value: &str,
        flags: NodeFlags,
    ) -> Result<NodeId, Error> {
        if self.ctx.get(schema).is_none_or(|n| !n.is_term()) {
            return Err(Error::argument(format!("{schema} is not a leaf or leaf-list")));
        }
        let canonical = self
            .ctx
            .canonicalize(schema, value)
            .map_err(|reason| Error::InvalidValue {
                node: self.ctx.schema_path(schema),
                value: value.to_string(),
                reason,
            })?;
        Ok(self.alloc(
            NodeKind::Term {
                schema,
                value: TermValue {
                    canonical: canonical.canonical,
                    typed: canonical.typed,
                    flags: canonical.flags,
                },
            },
            flags,
        ))
    }

    /// New detached anydata/anyxml instance.
    pub fn new_any(&mut self, schema: SchemaId, value: AnyValue) -> Result<NodeId, Error> {
        if self.ctx.get(schema).is_none_or(|n| !n.is_any()) {
            return Err(Error::argument(format!("{schema} is not anydata or anyxml")));
        }
        Ok(self.alloc(NodeKind::Any { schema, value }, NodeFlags::empty()))
    }

    /// New detached list instance with its key leaves, given in declared key order.
    pub fn new_list(&mut self, schema: SchemaId, keys: &[&str]) -> Result<NodeId, Error> {
        let key_schemas = match &self.ctx.node(schema).kind {
            SchemaKind::List(info) => info.keys.clone(),
            _ => {
                return Err(Error::argument(format!(
                    "{} is not a list",
                    self.ctx.schema_path(schema)
                )));
            }
        };
        if key_schemas.len() != keys.len() {
            return Err(Error::argument(format!(
                "{} takes {} keys, got {}",
                self.ctx.schema_path(schema),
                key_schemas.len(),
                keys.len()
            )));
        }
        let list = self.new_inner(schema)?;
        for (&key_schema, value) in key_schemas.iter().zip(keys) {
            let key = match self.new_term(key_schema, value) {
                Ok(key) => key,
                Err(err) => {
                    self.discard(list);
                    return Err(err);
                }
            };
            self.attach_raw(list, key)?;
        }
        self.rehash_node(list);
        Ok(list)
    }

    /// Replace the value of a leaf or leaf-list.
    ///
    /// Returns `false` when the canonical value is unchanged and the node was
    /// already explicit.
    pub fn change_term(&mut self, id: NodeId, value: &str) -> Result<bool, Error> {
        let schema = self.schema_of(id)?;
        if self.get(id).term().is_none() {
            return Err(Error::argument(format!("{} is not a term node", self.path(id))));
        }
        let canonical = self
            .ctx
            .canonicalize(schema, value)
            .map_err(|reason| Error::InvalidValue {
                node: self.path(id),
                value: value.to_string(),
                reason,
            })?;
        let data = self.get_mut(id);
        let unchanged = data.term().is_some_and(|t| t.canonical == canonical.canonical);
        if unchanged && !data.is_default() {
            return Ok(false);
        }
        if let NodeKind::Term { value, .. } = &mut data.kind {
            *value = TermValue {
                canonical: canonical.canonical,
                typed: canonical.typed,
                flags: canonical.flags,
            };
        }
        data.validity = Validity::UNCHECKED;
        if !unchanged {
            self.rehash_node(id);
            self.rehash_after_change(id);
        }
        self.mark_explicit(id);
        Ok(true)
    }

    /// Free a detached node that never made it into the tree.
    fn discard(&mut self, id: NodeId) {
        id.remove_subtree(&mut self.arena);
    }

    /// Clear the default flag on `id` and on the non-presence containers above it.
    pub(crate) fn mark_explicit(&mut self, id: NodeId) {
        self.get_mut(id).flags.remove(NodeFlags::DEFAULT);
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            let np = self.schema_node(p).is_some_and(|s| s.is_np_container());
            if np {
                self.get_mut(p).flags.remove(NodeFlags::DEFAULT);
            }
            cur = self.parent(p);
        }
    }

    pub(crate) fn set_default_flag(&mut self, id: NodeId, default: bool) {
        self.get_mut(id).flags.set(NodeFlags::DEFAULT, default);
    }

    /// Structural and value equality of two whole trees (top-level order
    /// ignored for unordered siblings).
    pub fn content_eq(&self, other: &DataTree) -> bool {
        find::subtree_eq(self, self.root, other, other.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::schema::{ContextBuilder, LeafType, NodeDef};

    struct Ids {
        top: SchemaId,
        name: SchemaId,
        item: SchemaId,
        k1: SchemaId,
        k2: SchemaId,
        value: SchemaId,
        tags: SchemaId,
        port: SchemaId,
        socket: SchemaId,
        reset: SchemaId,
        delay: SchemaId,
        force: SchemaId,
    }

    fn fixture() -> (Arc<Context>, Ids) {
        let mut b = ContextBuilder::new();
        let m = b.module("m");
        let top = b.add(m, None, "top", NodeDef::container()).unwrap();
        let name = b
            .add(m, Some(top), "name", NodeDef::leaf(LeafType::String).default("anon"))
            .unwrap();
        let item = b.add(m, Some(top), "item", NodeDef::list(&["k1", "k2"])).unwrap();
        let k1 = b.add(m, Some(item), "k1", NodeDef::leaf(LeafType::String)).unwrap();
        let k2 = b.add(m, Some(item), "k2", NodeDef::leaf(LeafType::integer())).unwrap();
        let value = b.add(m, Some(item), "value", NodeDef::leaf(LeafType::String)).unwrap();
        let tags = b.add(m, Some(top), "tags", NodeDef::leaf_list(LeafType::String)).unwrap();
        let transport = b.add(m, Some(top), "transport", NodeDef::choice()).unwrap();
        let tcp = b.add(m, Some(transport), "tcp", NodeDef::case()).unwrap();
        let port = b.add(m, Some(tcp), "port", NodeDef::leaf(LeafType::integer())).unwrap();
        let socket = b
            .add(m, Some(transport), "socket", NodeDef::leaf(LeafType::String))
            .unwrap();
        let reset = b.add(m, None, "reset", NodeDef::rpc()).unwrap();
        let input = b.add(m, Some(reset), "input", NodeDef::input()).unwrap();
        let delay = b.add(m, Some(input), "delay", NodeDef::leaf(LeafType::integer())).unwrap();
        let force = b.add(m, Some(input), "force", NodeDef::leaf(LeafType::Boolean)).unwrap();
        let ctx = b.build().unwrap();
        (
            ctx,
            Ids {
                top,
                name,
                item,
                k1,
                k2,
                value,
                tags,
                port,
                socket,
                reset,
                delay,
                force,
            },
        )
    }

    fn with_top(ctx: &Arc<Context>, ids: &Ids) -> (DataTree, NodeId) {
        let mut tree = DataTree::new(ctx.clone());
        let top = tree.new_inner(ids.top).unwrap();
        tree.insert(top, &mut Diagnostics::new()).unwrap();
        (tree, top)
    }

    #[test]
    fn test_np_container_default_until_content() {
        let (ctx, ids) = fixture();
        let (mut tree, top) = with_top(&ctx, &ids);
        assert!(tree.is_default(top));

        let name = tree.new_term(ids.name, "x").unwrap();
        tree.insert_child(top, name, &mut Diagnostics::new()).unwrap();
        assert!(!tree.is_default(top));

        tree.remove(name).unwrap();
        assert!(tree.is_default(top));
    }

    #[test]
    fn test_keys_repositioned_in_declared_order() {
        let (ctx, ids) = fixture();
        let (mut tree, top) = with_top(&ctx, &ids);
        let mut diag = Diagnostics::new();
        let item = tree.new_inner(ids.item).unwrap();
        tree.insert_child(top, item, &mut diag).unwrap();

        let value = tree.new_term(ids.value, "v").unwrap();
        tree.insert_child(item, value, &mut diag).unwrap();
        let k2 = tree.new_term(ids.k2, "7").unwrap();
        tree.insert_child(item, k2, &mut diag).unwrap();
        assert!(diag.is_empty());
        let k1 = tree.new_term(ids.k1, "a").unwrap();
        tree.insert_child(item, k1, &mut diag).unwrap();

        assert_eq!(tree.children(item).collect::<Vec<_>>(), vec![k1, k2, value]);
        assert_eq!(diag.warnings().count(), 1);
        assert_eq!(tree.path(item), "/m:top/item[k1='a'][k2='7']");
        tree.check_index_consistency().unwrap();
    }

    #[test]
    fn test_keys_out_of_order_strict() {
        let (ctx, ids) = fixture();
        let mut tree = DataTree::with_options(
            ctx.clone(),
            TreeOptions {
                strict_key_order: true,
            },
        );
        let mut diag = Diagnostics::new();
        let item = tree.new_inner(ids.item).unwrap();
        let k2 = tree.new_term(ids.k2, "7").unwrap();
        tree.insert_child(item, k2, &mut diag).unwrap();
        let k1 = tree.new_term(ids.k1, "a").unwrap();
        let err = tree.insert_child(item, k1, &mut diag).unwrap_err();
        assert!(matches!(err, Error::KeyOrder { .. }));
        assert!(!tree.is_linked(k1));
        assert_eq!(tree.child_count(item), 1);
    }

    #[test]
    fn test_explicit_duplicates_rejected() {
        let (ctx, ids) = fixture();
        let (mut tree, top) = with_top(&ctx, &ids);
        let mut diag = Diagnostics::new();

        let a = tree.new_term(ids.name, "a").unwrap();
        tree.insert_child(top, a, &mut diag).unwrap();
        let b = tree.new_term(ids.name, "b").unwrap();
        assert!(matches!(
            tree.insert_child(top, b, &mut diag),
            Err(Error::Duplicate { .. })
        ));

        let t1 = tree.new_term(ids.tags, "x").unwrap();
        tree.insert_child(top, t1, &mut diag).unwrap();
        let t2 = tree.new_term(ids.tags, "x").unwrap();
        assert!(matches!(
            tree.insert_child(top, t2, &mut diag),
            Err(Error::Duplicate { .. })
        ));

        let i1 = tree.new_list(ids.item, &["a", "1"]).unwrap();
        tree.insert_child(top, i1, &mut diag).unwrap();
        let i2 = tree.new_list(ids.item, &["a", "01"]).unwrap();
        assert!(matches!(
            tree.insert_child(top, i2, &mut diag),
            Err(Error::Duplicate { .. })
        ));
        assert_eq!(tree.child_count(top), 3);
    }

    #[test]
    fn test_default_leaf_replaced_by_explicit() {
        let (ctx, ids) = fixture();
        let (mut tree, top) = with_top(&ctx, &ids);
        let mut diag = Diagnostics::new();
        let d = tree
            .new_term_flagged(ids.name, "anon", NodeFlags::DEFAULT)
            .unwrap();
        tree.insert_child(top, d, &mut diag).unwrap();
        assert!(tree.is_default(top));

        let e = tree.new_term(ids.name, "bob").unwrap();
        tree.insert_child(top, e, &mut diag).unwrap();
        assert!(tree.try_get(d).is_none());
        assert_eq!(tree.children(top).collect::<Vec<_>>(), vec![e]);
        assert!(!tree.is_default(top));
    }

    #[test]
    fn test_choice_case_replaced() {
        let (ctx, ids) = fixture();
        let (mut tree, top) = with_top(&ctx, &ids);
        let mut diag = Diagnostics::new();
        let port = tree.new_term(ids.port, "80").unwrap();
        tree.insert_child(top, port, &mut diag).unwrap();
        let socket = tree.new_term(ids.socket, "/run/s").unwrap();
        tree.insert_child(top, socket, &mut diag).unwrap();
        assert_eq!(tree.children(top).collect::<Vec<_>>(), vec![socket]);
    }

    #[test]
    fn test_schema_mismatch_and_self_insert() {
        let (ctx, ids) = fixture();
        let mut tree = DataTree::new(ctx.clone());
        let mut diag = Diagnostics::new();
        let port = tree.new_term(ids.port, "80").unwrap();
        assert!(matches!(
            tree.insert(port, &mut diag),
            Err(Error::SchemaMismatch { .. })
        ));
        let item = tree.new_list(ids.item, &["a", "1"]).unwrap();
        assert!(tree.insert_child(item, item, &mut diag).is_err());
        assert!(matches!(tree.free(tree.root()), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_index_follows_threshold() {
        let (ctx, ids) = fixture();
        let (mut tree, top) = with_top(&ctx, &ids);
        let mut diag = Diagnostics::new();
        let mut items = Vec::new();
        for (i, k) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            let k2 = i.to_string();
            let item = tree.new_list(ids.item, &[k, k2.as_str()]).unwrap();
            tree.insert_child(top, item, &mut diag).unwrap();
            items.push(item);
        }
        assert_eq!(tree.child_count(top), 5);
        assert!(tree.get(top).inner().unwrap().index().is_some());
        tree.check_index_consistency().unwrap();
        assert_eq!(tree.find_list(top, ids.item, &["d", "3"]).unwrap(), Some(items[3]));
        assert_eq!(tree.find_list(top, ids.item, &["d", "4"]).unwrap(), None);

        // a key change moves the instance to another bucket
        let k2 = tree.children(items[3]).nth(1).unwrap();
        tree.change_term(k2, "40").unwrap();
        tree.check_index_consistency().unwrap();
        assert_eq!(tree.find_list(top, ids.item, &["d", "40"]).unwrap(), Some(items[3]));

        tree.remove(items[0]).unwrap();
        tree.remove(items[1]).unwrap();
        assert!(tree.get(top).inner().unwrap().index().is_none());
        tree.check_index_consistency().unwrap();
        assert_eq!(tree.find_list(top, ids.item, &["e", "4"]).unwrap(), Some(items[4]));
    }

    #[test]
    fn test_find_instance_agrees_with_linear_scan() {
        let (ctx, ids) = fixture();
        let (mut tree, top) = with_top(&ctx, &ids);
        let mut diag = Diagnostics::new();
        for v in ["x", "y", "z", "w", "v", "u"] {
            let t = tree.new_term(ids.tags, v).unwrap();
            tree.insert_child(top, t, &mut diag).unwrap();
        }
        let mut probe_tree = DataTree::new(ctx.clone());
        for v in ["w", "q"] {
            let probe = probe_tree.new_term(ids.tags, v).unwrap();
            let hashed = tree.find_instance(top, &probe_tree, probe);
            let linear = tree
                .children(top)
                .find(|&c| same_instance(&tree, c, &probe_tree, probe));
            assert_eq!(hashed, linear);
        }
        assert_eq!(
            tree.find_leaf_list(top, ids.tags, "w").unwrap().and_then(|n| tree.value_str(n)),
            Some("w")
        );
    }

    #[test]
    fn test_paths() {
        let (ctx, ids) = fixture();
        let mut tree = DataTree::new(ctx.clone());
        let mut diag = Diagnostics::new();
        let value = tree
            .new_path("/m:top/item[k1='a'][k2='2']/value", Some("hello"), &mut diag)
            .unwrap();
        assert_eq!(tree.path(value), "/m:top/item[k1='a'][k2='2']/value");
        assert_eq!(tree.find_path("/m:top/item[k2='2'][k1='a']/value").unwrap(), Some(value));
        assert_eq!(tree.find_path("/m:top/item[k1='b'][k2='2']").unwrap(), None);
        let tag = tree.new_path("/m:top/tags[.='t']", None, &mut diag).unwrap();
        assert_eq!(tree.path(tag), "/m:top/tags[.='t']");
        assert_eq!(tree.path(tree.root()), "/");

        assert!(matches!(
            tree.find_path("/m:top/nope"),
            Err(Error::InvalidPath { .. })
        ));
        // the partially created item is rolled back on failure
        assert!(tree
            .new_path("/m:top/item[k1='b'][k2='3']/nope", Some("v"), &mut diag)
            .is_err());
        assert_eq!(tree.find_path("/m:top/item[k1='b']").unwrap(), None);

        let odd = tree.new_list(ids.item, &[r#"a"b'c"#, "1"]).unwrap();
        let top = tree.find_path("/m:top").unwrap().unwrap();
        tree.insert_child(top, odd, &mut diag).unwrap();
        let printed = tree.path(odd);
        assert_eq!(printed, r#"/m:top/item[k1='a"b''c'][k2='1']"#);
        assert_eq!(tree.find_path(&printed).unwrap(), Some(odd));
    }

    #[test]
    fn test_operation_children_in_schema_order() {
        let (ctx, ids) = fixture();
        let mut tree = DataTree::new(ctx.clone());
        let mut diag = Diagnostics::new();
        let reset = tree.new_inner(ids.reset).unwrap();
        tree.insert(reset, &mut diag).unwrap();
        let force = tree.new_term(ids.force, "true").unwrap();
        tree.insert_child(reset, force, &mut diag).unwrap();
        let delay = tree.new_term(ids.delay, "5").unwrap();
        tree.insert_child(reset, delay, &mut diag).unwrap();
        assert_eq!(tree.children(reset).collect::<Vec<_>>(), vec![delay, force]);

        tree.unlink(delay).unwrap();
        assert!(matches!(
            tree.insert_after(force, delay, &mut diag),
            Err(Error::Conflict(_))
        ));
        tree.insert_before(force, delay, &mut diag).unwrap();
        assert_eq!(tree.children(reset).collect::<Vec<_>>(), vec![delay, force]);
    }

    #[test]
    fn test_key_leaf_cannot_be_placed_explicitly() {
        let (ctx, ids) = fixture();
        let (mut tree, top) = with_top(&ctx, &ids);
        let mut diag = Diagnostics::new();
        let item = tree.new_list(ids.item, &["a", "1"]).unwrap();
        tree.insert_child(top, item, &mut diag).unwrap();
        let k1 = tree.first_child(item).unwrap();
        let value = tree.new_term(ids.value, "v").unwrap();
        assert!(matches!(
            tree.insert_before(k1, value, &mut diag),
            Err(Error::Conflict(_))
        ));
        tree.insert_after(tree.last_child(item).unwrap(), value, &mut diag)
            .unwrap();
        assert_eq!(tree.last_child(item), Some(value));
    }

    #[test]
    fn test_dup_is_detached_copy() {
        let (ctx, ids) = fixture();
        let mut tree = DataTree::new(ctx.clone());
        let mut diag = Diagnostics::new();
        let value = tree
            .new_path("/m:top/item[k1='a'][k2='1']/value", Some("v"), &mut diag)
            .unwrap();
        let item = tree.parent(value).unwrap();
        let copy = tree.dup(item).unwrap();
        assert!(!tree.is_linked(copy));
        assert_eq!(tree.child_count(copy), 3);
        assert_eq!(tree.hash(copy), tree.hash(item));
        assert!(find::subtree_eq(&tree, item, &tree, copy));

        let top = tree.parent(item).unwrap();
        assert!(matches!(
            tree.insert_child(top, copy, &mut diag),
            Err(Error::Duplicate { .. })
        ));
        tree.free(copy).unwrap();
        assert!(tree.try_get(copy).is_none());
    }

    #[test]
    fn test_dup_into_other_context() {
        let (ctx_a, ids) = fixture();
        let (ctx_b, _) = fixture();
        let mut a = DataTree::new(ctx_a);
        let mut diag = Diagnostics::new();
        let value = a
            .new_path("/m:top/item[k1='a'][k2='1']/value", Some("v"), &mut diag)
            .unwrap();
        let top = a.find_path("/m:top").unwrap().unwrap();

        let mut b = DataTree::new(ctx_b);
        let copy = b.dup_into(&a, top).unwrap();
        b.insert(copy, &mut diag).unwrap();
        assert!(a.content_eq(&b));
        assert_eq!(
            b.find_path("/m:top/item[k1='a'][k2='1']/value").unwrap().map(|n| b.path(n)),
            Some(a.path(value))
        );
        assert!(!core::ptr::eq(&**a.ctx(), &**b.ctx()));
        assert_eq!(a.schema(value), Some(ids.value));
    }
}
