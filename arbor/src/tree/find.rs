//! Instance correspondence, lookups and data paths.

use bough::indextree::NodeId;
use smallvec::SmallVec;

use super::hash::identity_hash;
use super::{AnyValue, DataTree, NodeKind};
use crate::diag::Diagnostics;
use crate::error::Error;
use crate::path::{DataPath, PathStep, Predicate};
use crate::schema::{Context, ModuleId, SchemaId, SchemaKind};

/// Whether `a` in `ta` and `b` in `tb` denote the same instance.
///
/// Same schema node, plus: equal keys for list instances, equal value for
/// leaf-list instances, equal content for keyless lists (and for keyed list
/// instances that are missing a key). Trees on different contexts match
/// schema nodes by module and name.
pub fn same_instance(ta: &DataTree, a: NodeId, tb: &DataTree, b: NodeId) -> bool {
    let (Some(sa), Some(sb)) = (ta.schema(a), tb.schema(b)) else {
        return ta.is_document(a) && tb.is_document(b);
    };
    if !same_schema(ta.ctx(), sa, tb.ctx(), sb) {
        return false;
    }
    match &ta.ctx().node(sa).kind {
        SchemaKind::LeafList(_) => ta.value_str(a) == tb.value_str(b),
        SchemaKind::List(info) if !info.keys.is_empty() => {
            match (ta.key_values(a), tb.key_values(b)) {
                (Some(ka), Some(kb)) => ka == kb,
                _ => subtree_eq(ta, a, tb, b),
            }
        }
        SchemaKind::List(_) => subtree_eq(ta, a, tb, b),
        _ => true,
    }
}

pub(crate) fn same_schema(ca: &Context, sa: SchemaId, cb: &Context, sb: SchemaId) -> bool {
    if core::ptr::eq(ca, cb) {
        return sa == sb;
    }
    let (na, nb) = (ca.node(sa), cb.node(sb));
    na.name == nb.name && ca.module_name(sa) == cb.module_name(sb)
}

/// Deep equality: schema, values and children, ignoring sibling order.
pub(crate) fn subtree_eq(ta: &DataTree, a: NodeId, tb: &DataTree, b: NodeId) -> bool {
    match (ta.schema(a), tb.schema(b)) {
        (Some(sa), Some(sb)) if same_schema(ta.ctx(), sa, tb.ctx(), sb) => {}
        (None, None) => {}
        _ => return false,
    }
    match (&ta.get(a).kind, &tb.get(b).kind) {
        (NodeKind::Term { value: va, .. }, NodeKind::Term { value: vb, .. }) => {
            va.canonical == vb.canonical
        }
        (NodeKind::Any { value: va, .. }, NodeKind::Any { value: vb, .. }) => va.same_content(vb),
        (
            NodeKind::Document(ia) | NodeKind::Inner { inner: ia, .. },
            NodeKind::Document(ib) | NodeKind::Inner { inner: ib, .. },
        ) => {
            if ia.child_count != ib.child_count {
                return false;
            }
            let mut used: SmallVec<[NodeId; 16]> = SmallVec::new();
            ta.children(a).all(|ca| {
                let found = tb
                    .children(b)
                    .find(|cb| !used.contains(cb) && subtree_eq(ta, ca, tb, *cb));
                found.map(|cb| used.push(cb)).is_some()
            })
        }
        _ => false,
    }
}

impl DataTree {
    /// Canonical key values of a list instance in declared key order;
    /// `None` when a key is missing or `id` is not a keyed list.
    pub fn key_values(&self, id: NodeId) -> Option<SmallVec<[&str; 4]>> {
        let info = self.schema_node(id)?.list_info()?;
        if info.keys.is_empty() {
            return None;
        }
        info.keys
            .iter()
            .map(|&key| {
                self.children(id)
                    .find(|&c| self.schema(c) == Some(key))
                    .and_then(|c| self.value_str(c))
            })
            .collect()
    }

    /// The child of `parent` that is the same instance as `probe` in
    /// `probe_tree` (which may be `self`).
    pub fn find_instance(
        &self,
        parent: NodeId,
        probe_tree: &DataTree,
        probe: NodeId,
    ) -> Option<NodeId> {
        self.find_instance_where(parent, probe_tree, probe, |_| true)
    }

    /// [`DataTree::find_instance`] restricted to children `accept` allows.
    pub(crate) fn find_instance_where(
        &self,
        parent: NodeId,
        probe_tree: &DataTree,
        probe: NodeId,
        accept: impl Fn(NodeId) -> bool,
    ) -> Option<NodeId> {
        let matches = |c: NodeId| accept(c) && same_instance(self, c, probe_tree, probe);
        match (self.index_of(parent), probe_tree.hash(probe)) {
            (Some(index), Some(hash)) => {
                let mut found = index.candidates(hash).iter().copied().filter(|&c| matches(c));
                let first = found.next()?;
                if found.next().is_none() {
                    return Some(first);
                }
                // repeated instances: the first in sibling order wins
                self.children(parent).find(|&c| matches(c))
            }
            _ => self.children(parent).find(|&c| matches(c)),
        }
    }

    fn index_of(&self, parent: NodeId) -> Option<&super::HashIndex> {
        self.get(parent).inner()?.index()
    }

    /// First child of `parent` instantiating `schema`.
    pub fn find_child(&self, parent: NodeId, schema: SchemaId) -> Option<NodeId> {
        let snode = self.ctx().node(schema);
        if let (Some(index), true) = (self.index_of(parent), snode.is_single_instance()) {
            let hash = identity_hash(self.ctx().module_name(schema), &snode.name, &[]);
            return index
                .candidates(hash)
                .iter()
                .copied()
                .find(|&c| self.schema(c) == Some(schema));
        }
        self.children(parent).find(|&c| self.schema(c) == Some(schema))
    }

    /// All children of `parent` instantiating `schema`, in order.
    pub fn instances(
        &self,
        parent: NodeId,
        schema: SchemaId,
    ) -> impl Iterator<Item = NodeId> + '_ {
        self.children(parent)
            .filter(move |&c| self.schema(c) == Some(schema))
    }

    /// The list instance with the given keys (in declared order).
    pub fn find_list(
        &self,
        parent: NodeId,
        schema: SchemaId,
        keys: &[&str],
    ) -> Result<Option<NodeId>, Error> {
        let info = self
            .ctx()
            .node(schema)
            .list_info()
            .ok_or_else(|| Error::argument(format!("{} is not a list", self.ctx().schema_path(schema))))?;
        if info.keys.len() != keys.len() {
            return Err(Error::argument(format!(
                "{} takes {} keys, got {}",
                self.ctx().schema_path(schema),
                info.keys.len(),
                keys.len()
            )));
        }
        let mut canonical: SmallVec<[_; 4]> = SmallVec::new();
        for (&key, raw) in info.keys.iter().zip(keys) {
            canonical.push(self.canonical(key, raw)?);
        }
        let values: SmallVec<[&str; 4]> = canonical.iter().map(|c| c.as_str()).collect();
        let matches = |c: NodeId| {
            self.schema(c) == Some(schema)
                && self.key_values(c).is_some_and(|k| k.as_slice() == values.as_slice())
        };
        Ok(match self.index_of(parent) {
            Some(index) => {
                let hash = identity_hash(self.ctx().module_name(schema), &self.ctx().node(schema).name, &values);
                index.candidates(hash).iter().copied().find(|&c| matches(c))
            }
            None => self.children(parent).find(|&c| matches(c)),
        })
    }

    /// The leaf-list instance with the given value.
    pub fn find_leaf_list(
        &self,
        parent: NodeId,
        schema: SchemaId,
        value: &str,
    ) -> Result<Option<NodeId>, Error> {
        if !self.ctx().node(schema).is_leaf_list() {
            return Err(Error::argument(format!(
                "{} is not a leaf-list",
                self.ctx().schema_path(schema)
            )));
        }
        let canonical = self.canonical(schema, value)?;
        let matches =
            |c: NodeId| self.schema(c) == Some(schema) && self.value_str(c) == Some(canonical.as_str());
        Ok(match self.index_of(parent) {
            Some(index) => {
                let hash = identity_hash(
                    self.ctx().module_name(schema),
                    &self.ctx().node(schema).name,
                    &[canonical.as_str()],
                );
                index.candidates(hash).iter().copied().find(|&c| matches(c))
            }
            None => self.children(parent).find(|&c| matches(c)),
        })
    }

    fn canonical(&self, schema: SchemaId, raw: &str) -> Result<crate::intern::IStr, Error> {
        self.ctx()
            .canonicalize(schema, raw)
            .map(|c| c.canonical)
            .map_err(|reason| Error::InvalidValue {
                node: self.ctx().schema_path(schema),
                value: raw.to_string(),
                reason,
            })
    }

    /// Data path of `id`, e.g. `/m:top/list[name='a']/value`.
    pub fn data_path(&self, id: NodeId) -> DataPath {
        let mut chain: Vec<NodeId> = id
            .ancestors(&self.arena)
            .filter(|&n| !self.is_document(n))
            .collect();
        chain.reverse();

        let ctx = self.ctx();
        let mut path = DataPath::default();
        let mut last_module: Option<ModuleId> = None;
        for n in chain {
            let Some(schema) = self.schema(n) else {
                continue;
            };
            let snode = ctx.node(schema);
            let module = (last_module != Some(snode.module)).then(|| ctx.module_name(schema).as_str());
            last_module = Some(snode.module);
            let mut step = PathStep::new(module, &snode.name);
            match &snode.kind {
                SchemaKind::List(info) => {
                    for &key in &info.keys {
                        if let Some(value) = self
                            .children(n)
                            .find(|&c| self.schema(c) == Some(key))
                            .and_then(|c| self.value_str(c))
                        {
                            step.predicates.push(Predicate::Key {
                                name: ctx.node(key).name.to_string(),
                                value: value.to_string(),
                            });
                        }
                    }
                }
                SchemaKind::LeafList(_) => {
                    if let Some(value) = self.value_str(n) {
                        step.predicates.push(Predicate::Value(value.to_string()));
                    }
                }
                _ => {}
            }
            path.steps.push(step);
        }
        path
    }

    /// [`DataTree::data_path`] as a string; `/` for the document node.
    pub fn path(&self, id: NodeId) -> String {
        let path = self.data_path(id);
        if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        }
    }

    /// Resolve a data path. `Ok(None)` when the path is well-formed but no
    /// such node exists.
    pub fn find_path(&self, path: &str) -> Result<Option<NodeId>, Error> {
        let parsed = DataPath::parse(path)?;
        let mut cur = self.root();
        let mut walker = SchemaWalker::new(path);
        for step in &parsed.steps {
            let schema = walker.step(self.ctx(), step)?;
            match self.find_step(cur, schema, step, path)? {
                Some(n) => cur = n,
                None => return Ok(None),
            }
        }
        Ok(Some(cur))
    }

    /// Resolve a data path, creating every missing node on the way. `value`
    /// is used for a final leaf, leaf-list or anydata step; an existing final
    /// leaf gets its value changed. Returns the last node of the path.
    pub fn new_path(
        &mut self,
        path: &str,
        value: Option<&str>,
        diag: &mut Diagnostics,
    ) -> Result<NodeId, Error> {
        let parsed = DataPath::parse(path)?;
        let mut created: Option<NodeId> = None;
        let result = self.new_path_steps(&parsed, path, value, &mut created, diag);
        if result.is_err()
            && let Some(top) = created
        {
            self.remove(top)?;
        }
        result
    }

    fn new_path_steps(
        &mut self,
        parsed: &DataPath,
        path: &str,
        value: Option<&str>,
        created: &mut Option<NodeId>,
        diag: &mut Diagnostics,
    ) -> Result<NodeId, Error> {
        let mut cur = self.root();
        let mut walker = SchemaWalker::new(path);
        let last = parsed.steps.len() - 1;
        for (i, step) in parsed.steps.iter().enumerate() {
            let schema = walker.step(self.ctx(), step)?;
            let is_last = i == last;
            if let Some(existing) = self.find_step(cur, schema, step, path)? {
                if is_last
                    && let Some(v) = value
                    && matches!(self.ctx().node(schema).kind, SchemaKind::Leaf(_))
                {
                    self.change_term(existing, v)?;
                }
                cur = existing;
                continue;
            }

            let node = self.create_step(schema, step, is_last.then_some(value).flatten(), is_last, path)?;
            if let Err(err) = self.insert_child(cur, node, diag) {
                self.free(node)?;
                return Err(err);
            }
            created.get_or_insert(node);
            cur = node;
        }
        Ok(cur)
    }

    fn create_step(
        &mut self,
        schema: SchemaId,
        step: &PathStep,
        value: Option<&str>,
        is_last: bool,
        path: &str,
    ) -> Result<NodeId, Error> {
        let invalid = |reason: String| Error::InvalidPath {
            path: path.to_string(),
            reason,
        };
        let snode = self.ctx().node(schema).clone();
        match &snode.kind {
            SchemaKind::List(info) => {
                let mut keys = Vec::with_capacity(info.keys.len());
                for &key in &info.keys {
                    let name = &self.ctx().node(key).name;
                    keys.push(step.key(name).ok_or_else(|| {
                        invalid(format!("missing key \"{name}\" for {}", snode.name))
                    })?);
                }
                self.new_list(schema, &keys)
            }
            SchemaKind::LeafList(_) => {
                let v = step
                    .value()
                    .or(value)
                    .ok_or_else(|| invalid(format!("no value for leaf-list {}", snode.name)))?;
                self.new_term(schema, v)
            }
            SchemaKind::Leaf(_) => {
                if !is_last {
                    return Err(invalid(format!("leaf {} must be the last step", snode.name)));
                }
                self.new_term(schema, value.unwrap_or(""))
            }
            SchemaKind::Any { .. } => {
                self.new_any(schema, AnyValue::Str(value.unwrap_or_default().to_string()))
            }
            _ => self.new_inner(schema),
        }
    }

    /// The child of `parent` a path step selects.
    fn find_step(
        &self,
        parent: NodeId,
        schema: SchemaId,
        step: &PathStep,
        path: &str,
    ) -> Result<Option<NodeId>, Error> {
        let snode = self.ctx().node(schema);
        match &snode.kind {
            SchemaKind::List(info) => {
                if step.predicates.is_empty() {
                    return Ok(self.find_child_linear(parent, schema));
                }
                let mut keys = Vec::with_capacity(info.keys.len());
                for &key in &info.keys {
                    match step.key(&self.ctx().node(key).name) {
                        Some(v) => keys.push(v),
                        None => break,
                    }
                }
                if keys.len() == info.keys.len() && keys.len() == step.predicates.len() {
                    return self.find_list(parent, schema, &keys);
                }
                // partial keys: first instance agreeing on every given predicate
                let mut wanted = Vec::new();
                for p in &step.predicates {
                    let Predicate::Key { name, value } = p else {
                        return Err(Error::InvalidPath {
                            path: path.to_string(),
                            reason: format!("value predicate on list {}", snode.name),
                        });
                    };
                    let key = info
                        .keys
                        .iter()
                        .copied()
                        .find(|&k| self.ctx().node(k).name.as_str() == name)
                        .ok_or_else(|| Error::InvalidPath {
                            path: path.to_string(),
                            reason: format!("{name} is not a key of {}", snode.name),
                        })?;
                    wanted.push((key, self.canonical(key, value)?));
                }
                Ok(self.instances(parent, schema).find(|&c| {
                    wanted.iter().all(|(key, value)| {
                        self.children(c)
                            .find(|&k| self.schema(k) == Some(*key))
                            .and_then(|k| self.value_str(k))
                            == Some(value.as_str())
                    })
                }))
            }
            SchemaKind::LeafList(_) => match step.value() {
                Some(v) => self.find_leaf_list(parent, schema, v),
                None => Ok(self.find_child_linear(parent, schema)),
            },
            _ if !step.predicates.is_empty() => Err(Error::InvalidPath {
                path: path.to_string(),
                reason: format!("predicates on single-instance node {}", snode.name),
            }),
            _ => Ok(self.find_child(parent, schema)),
        }
    }

    fn find_child_linear(&self, parent: NodeId, schema: SchemaId) -> Option<NodeId> {
        self.instances(parent, schema).next()
    }
}

/// Tracks the schema parent and inherited module while walking path steps.
struct SchemaWalker<'p> {
    path: &'p str,
    parent: Option<SchemaId>,
    module: Option<ModuleId>,
}

impl<'p> SchemaWalker<'p> {
    fn new(path: &'p str) -> Self {
        Self {
            path,
            parent: None,
            module: None,
        }
    }

    fn step(&mut self, ctx: &Context, step: &PathStep) -> Result<SchemaId, Error> {
        let invalid = |reason: String| Error::InvalidPath {
            path: self.path.to_string(),
            reason,
        };
        if let Some(m) = &step.module {
            self.module = Some(
                ctx.module_by_name(m)
                    .ok_or_else(|| invalid(format!("unknown module \"{m}\"")))?,
            );
        }
        let schema = ctx
            .find_data_child(self.parent, self.module, &step.name)
            .ok_or_else(|| invalid(format!("no schema node \"{}\"", step.name)))?;
        self.parent = Some(schema);
        self.module = Some(ctx.node(schema).module);
        Ok(schema)
    }
}
