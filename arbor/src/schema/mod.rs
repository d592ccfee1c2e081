//! Schema context.
//!
//! The tree engine treats schemas as an external, read-only collaborator:
//! it only needs node lookup by name, per-node cardinality/default metadata,
//! feature state and interned names. This module provides exactly that
//! as an in-memory [`Context`], assembled with a [`ContextBuilder`].
//!
//! Schema nodes live in one flat vector and are addressed by [`SchemaId`].
//! `choice`, `case`, `uses`, `input` and `output` are *transparent*: they never
//! have data instances, and data children are looked up straight through them.

mod builder;
mod types;

pub use builder::{ContextBuilder, NodeDef};
pub use types::{Canonical, LeafType, Value, ValueFlags};

use core::fmt;
use rapidhash::RapidHashSet;

use crate::intern::{IStr, intern};

/// Index of a schema node inside its [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(pub(crate) u32);

impl SchemaId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a module inside its [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) u32);

/// A module: a namespace for top-level schema nodes and features.
#[derive(Debug)]
pub struct Module {
    pub name: IStr,
    /// Top-level schema nodes in definition order.
    pub top: Vec<SchemaId>,
    enabled_features: RapidHashSet<IStr>,
}

impl Module {
    pub fn feature_enabled(&self, feature: &str) -> bool {
        self.enabled_features.contains(feature)
    }
}

/// List-specific metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListInfo {
    /// Key leaves in declared order.
    pub keys: Vec<SchemaId>,
    pub user_ordered: bool,
    pub min: u32,
    pub max: Option<u32>,
    /// Each entry is one `unique` statement: descendant leaves that must not
    /// share a value combination across instances.
    pub unique: Vec<Vec<SchemaId>>,
}

/// Leaf-specific metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafInfo {
    pub ty: LeafType,
    /// Canonical default value.
    pub default: Option<IStr>,
    pub mandatory: bool,
}

/// Leaf-list-specific metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafListInfo {
    pub ty: LeafType,
    /// Canonical default values.
    pub defaults: Vec<IStr>,
    pub min: u32,
    pub max: Option<u32>,
    pub user_ordered: bool,
}

/// Choice-specific metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChoiceInfo {
    /// The case (or shorthand data node) instantiated when nothing else is.
    pub default_case: Option<SchemaId>,
    pub mandatory: bool,
}

/// Kind of a schema node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaKind {
    Container { presence: bool },
    List(ListInfo),
    Leaf(LeafInfo),
    LeafList(LeafListInfo),
    /// anydata (`xml == false`) or anyxml.
    Any { mandatory: bool, xml: bool },
    Choice(ChoiceInfo),
    Case,
    Uses,
    Rpc,
    Action,
    Input,
    Output,
    Notification,
}

/// One schema node.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub name: IStr,
    pub module: ModuleId,
    pub kind: SchemaKind,
    pub parent: Option<SchemaId>,
    /// Children in schema order.
    pub children: Vec<SchemaId>,
    /// Configuration (writable) data, inherited from the parent.
    pub config: bool,
    /// Condition deciding whether the node may exist.
    pub when: Option<IStr>,
    pub if_features: Vec<IStr>,
    /// Set on leaves that are keys of their parent list.
    pub is_key: bool,
}

impl SchemaNode {
    /// Choice, case, uses, input and output never have instances.
    pub fn is_transparent(&self) -> bool {
        matches!(
            self.kind,
            SchemaKind::Choice(_)
                | SchemaKind::Case
                | SchemaKind::Uses
                | SchemaKind::Input
                | SchemaKind::Output
        )
    }

    /// Instances own children.
    pub fn is_inner(&self) -> bool {
        matches!(
            self.kind,
            SchemaKind::Container { .. }
                | SchemaKind::List(_)
                | SchemaKind::Rpc
                | SchemaKind::Action
                | SchemaKind::Notification
        )
    }

    /// Leaf or leaf-list.
    pub fn is_term(&self) -> bool {
        matches!(self.kind, SchemaKind::Leaf(_) | SchemaKind::LeafList(_))
    }

    pub fn is_any(&self) -> bool {
        matches!(self.kind, SchemaKind::Any { .. })
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, SchemaKind::List(_))
    }

    pub fn is_leaf_list(&self) -> bool {
        matches!(self.kind, SchemaKind::LeafList(_))
    }

    /// rpc, action or notification
    pub fn is_operation(&self) -> bool {
        matches!(
            self.kind,
            SchemaKind::Rpc | SchemaKind::Action | SchemaKind::Notification
        )
    }

    pub fn is_np_container(&self) -> bool {
        matches!(self.kind, SchemaKind::Container { presence: false })
    }

    /// At most one instance may exist under a given parent.
    pub fn is_single_instance(&self) -> bool {
        !matches!(self.kind, SchemaKind::List(_) | SchemaKind::LeafList(_))
    }

    /// Lists and leaf-lists whose order is significant.
    pub fn is_user_ordered(&self) -> bool {
        match &self.kind {
            SchemaKind::List(info) => info.user_ordered,
            SchemaKind::LeafList(info) => info.user_ordered,
            _ => false,
        }
    }

    pub fn list_info(&self) -> Option<&ListInfo> {
        match &self.kind {
            SchemaKind::List(info) => Some(info),
            _ => None,
        }
    }

    /// A list instance's identity comes from its keys; keyless lists compare by content.
    pub fn is_keyless_list(&self) -> bool {
        self.list_info().is_some_and(|info| info.keys.is_empty())
    }
}

/// An immutable, shareable schema context.
#[derive(Debug)]
pub struct Context {
    modules: Vec<Module>,
    nodes: Vec<SchemaNode>,
}

impl Context {
    pub fn intern(&self, s: &str) -> IStr {
        intern(s)
    }

    pub fn node(&self, id: SchemaId) -> &SchemaNode {
        &self.nodes[id.index()]
    }

    /// Checked variant of [`Context::node`].
    pub fn get(&self, id: SchemaId) -> Option<&SchemaNode> {
        self.nodes.get(id.index())
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0 as usize]
    }

    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, m)| (ModuleId(i as u32), m))
    }

    pub fn module_by_name(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| m.name.as_str() == name)
            .map(|i| ModuleId(i as u32))
    }

    /// Name of the module owning `id`.
    pub fn module_name(&self, id: SchemaId) -> &IStr {
        &self.module(self.node(id).module).name
    }

    /// Nearest ancestor that can have instances; `None` for top-level nodes.
    pub fn data_parent(&self, id: SchemaId) -> Option<SchemaId> {
        let mut cur = self.node(id).parent;
        while let Some(p) = cur {
            let node = self.node(p);
            if !node.is_transparent() {
                return Some(p);
            }
            cur = node.parent;
        }
        None
    }

    /// Schema children with instances, flattened through transparent nodes,
    /// in schema order. `None` lists every module's top-level nodes.
    pub fn data_children(&self, parent: Option<SchemaId>) -> Vec<SchemaId> {
        let mut out = Vec::new();
        match parent {
            Some(p) => self.collect_data_children(&self.node(p).children, &mut out),
            None => {
                for module in &self.modules {
                    self.collect_data_children(&module.top, &mut out);
                }
            }
        }
        out
    }

    fn collect_data_children(&self, ids: &[SchemaId], out: &mut Vec<SchemaId>) {
        for &id in ids {
            let node = self.node(id);
            if node.is_transparent() {
                self.collect_data_children(&node.children, out);
            } else {
                out.push(id);
            }
        }
    }

    /// Find a data child by name (and module, if given).
    pub fn find_data_child(
        &self,
        parent: Option<SchemaId>,
        module: Option<ModuleId>,
        name: &str,
    ) -> Option<SchemaId> {
        self.data_children(parent).into_iter().find(|&id| {
            let node = self.node(id);
            node.name.as_str() == name && module.is_none_or(|m| node.module == m)
        })
    }

    /// Like [`Context::find_data_child`] but with the module given by name.
    pub fn find_data_child_by_name(
        &self,
        parent: Option<SchemaId>,
        module: Option<&str>,
        name: &str,
    ) -> Option<SchemaId> {
        let module = match module {
            Some(m) => Some(self.module_by_name(m)?),
            None => None,
        };
        self.find_data_child(parent, module, name)
    }

    /// Type of a leaf or leaf-list.
    pub fn leaf_type(&self, id: SchemaId) -> Option<&LeafType> {
        match &self.node(id).kind {
            SchemaKind::Leaf(info) => Some(&info.ty),
            SchemaKind::LeafList(info) => Some(&info.ty),
            _ => None,
        }
    }

    /// Position of `leaf` among the keys of `list`.
    pub fn key_index(&self, list: SchemaId, leaf: SchemaId) -> Option<usize> {
        self.node(list)
            .list_info()?
            .keys
            .iter()
            .position(|&k| k == leaf)
    }

    /// True when `id` and every schema ancestor pass their if-feature checks.
    pub fn is_enabled(&self, id: SchemaId) -> bool {
        self.disabling_feature(id).is_none()
    }

    /// The first if-feature that disables `id` or one of its ancestors.
    pub fn disabling_feature(&self, id: SchemaId) -> Option<IStr> {
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = self.node(c);
            for feature in &node.if_features {
                let (module, name) = match feature.split_once(':') {
                    Some((prefix, name)) => match self.module_by_name(prefix) {
                        Some(m) => (m, name),
                        None => return Some(feature.clone()),
                    },
                    None => (node.module, feature.as_str()),
                };
                if !self.module(module).feature_enabled(name) {
                    return Some(feature.clone());
                }
            }
            cur = node.parent;
        }
        None
    }

    /// The choice `id` sits under (below its data parent), with the case
    /// branch it belongs to. Shorthand cases are the data node itself.
    pub fn choice_case(&self, id: SchemaId) -> Option<(SchemaId, SchemaId)> {
        let mut branch = id;
        let mut cur = self.node(id).parent;
        while let Some(p) = cur {
            let node = self.node(p);
            match node.kind {
                SchemaKind::Choice(_) => return Some((p, branch)),
                SchemaKind::Case | SchemaKind::Uses => {
                    branch = p;
                    cur = node.parent;
                }
                _ => return None,
            }
        }
        None
    }

    /// Every `(choice, case)` pair between `id` and its data parent, innermost first.
    pub fn choice_chain(&self, id: SchemaId) -> Vec<(SchemaId, SchemaId)> {
        let mut out = Vec::new();
        let mut cur = id;
        while let Some((choice, case)) = self.choice_case(cur) {
            out.push((choice, case));
            cur = choice;
        }
        out
    }

    /// True when `id` is `ancestor` or lies beneath it in the schema tree.
    pub fn is_schema_descendant(&self, id: SchemaId, ancestor: SchemaId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.node(c).parent;
        }
        false
    }

    /// The `input` or `output` node `id` sits under, if any.
    pub fn operation_partition(&self, id: SchemaId) -> Option<SchemaId> {
        let mut cur = self.node(id).parent;
        while let Some(p) = cur {
            let node = self.node(p);
            match node.kind {
                SchemaKind::Input | SchemaKind::Output => return Some(p),
                SchemaKind::Rpc | SchemaKind::Action | SchemaKind::Notification => return None,
                _ => cur = node.parent,
            }
        }
        None
    }

    /// Index of `id` in the depth-first schema order of its data parent's
    /// children (transparent nodes flattened).
    pub fn schema_position(&self, id: SchemaId) -> usize {
        self.data_children(self.data_parent(id))
            .iter()
            .position(|&c| c == id)
            .unwrap_or(usize::MAX)
    }

    /// Nodes whose `when` applies to instances of `id`: its own and those of
    /// transparent ancestors up to the data parent, innermost first.
    pub fn when_conditions(&self, id: SchemaId) -> Vec<(SchemaId, IStr)> {
        let mut out = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = self.node(c);
            if c != id && !node.is_transparent() {
                break;
            }
            if let Some(expr) = &node.when {
                out.push((c, expr.clone()));
            }
            cur = node.parent;
        }
        out
    }

    /// `/module:a/b/c` schema path, for messages.
    pub fn schema_path(&self, id: SchemaId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            parts.push(c);
            cur = self.node(c).parent;
        }
        let mut out = String::new();
        let mut last_module = None;
        for &c in parts.iter().rev() {
            let node = self.node(c);
            out.push('/');
            if last_module != Some(node.module) {
                out.push_str(&self.module(node.module).name);
                out.push(':');
                last_module = Some(node.module);
            }
            out.push_str(&node.name);
        }
        out
    }

    /// Resolve a leafref path relative to `from` (a leaf schema node).
    pub fn resolve_schema_path(&self, from: SchemaId, path: &str) -> Option<SchemaId> {
        let (mut cur, rest) = match path.strip_prefix('/') {
            Some(rest) => (None, rest),
            None => (Some(from), path),
        };
        let mut module: Option<ModuleId> = None;
        for step in rest.split('/').filter(|s| !s.is_empty()) {
            match step {
                "." => {}
                ".." => cur = self.data_parent(cur?),
                _ => {
                    let (prefix, name) = match step.split_once(':') {
                        Some((p, n)) => (Some(p), n),
                        None => (None, step),
                    };
                    if let Some(p) = prefix {
                        module = Some(self.module_by_name(p)?);
                    }
                    let found = self
                        .find_data_child(cur, module, name)
                        .or_else(|| self.find_data_child(cur, None, name))?;
                    module = Some(self.node(found).module);
                    cur = Some(found);
                }
            }
        }
        cur
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema#{}", self.0)
    }
}
