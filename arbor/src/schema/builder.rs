//! Assembling a [`Context`].

use std::sync::Arc;

use rapidhash::RapidHashSet;

use super::{
    ChoiceInfo, Context, LeafInfo, LeafListInfo, LeafType, ListInfo, Module, ModuleId, SchemaId,
    SchemaKind, SchemaNode,
};
use crate::error::Error;
use crate::intern::{IStr, intern};

/// Description of one schema node, before names are resolved.
#[derive(Debug, Clone)]
pub struct NodeDef {
    kind: DefKind,
    config: Option<bool>,
    when: Option<String>,
    if_features: Vec<String>,
    defaults: Vec<String>,
    mandatory: bool,
    min: u32,
    max: Option<u32>,
    user_ordered: bool,
    unique: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
enum DefKind {
    Container { presence: bool },
    List { keys: Vec<String> },
    Leaf(LeafType),
    LeafList(LeafType),
    Any { xml: bool },
    Choice,
    Case,
    Uses,
    Rpc,
    Action,
    Input,
    Output,
    Notification,
}

impl NodeDef {
    fn new(kind: DefKind) -> Self {
        Self {
            kind,
            config: None,
            when: None,
            if_features: Vec::new(),
            defaults: Vec::new(),
            mandatory: false,
            min: 0,
            max: None,
            user_ordered: false,
            unique: Vec::new(),
        }
    }

    /// Non-presence container.
    pub fn container() -> Self {
        Self::new(DefKind::Container { presence: false })
    }

    pub fn presence_container() -> Self {
        Self::new(DefKind::Container { presence: true })
    }

    /// List keyed by the named child leaves (empty for a keyless list).
    pub fn list(keys: &[&str]) -> Self {
        Self::new(DefKind::List {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        })
    }

    pub fn leaf(ty: LeafType) -> Self {
        Self::new(DefKind::Leaf(ty))
    }

    pub fn leaf_list(ty: LeafType) -> Self {
        Self::new(DefKind::LeafList(ty))
    }

    pub fn anydata() -> Self {
        Self::new(DefKind::Any { xml: false })
    }

    pub fn anyxml() -> Self {
        Self::new(DefKind::Any { xml: true })
    }

    pub fn choice() -> Self {
        Self::new(DefKind::Choice)
    }

    pub fn case() -> Self {
        Self::new(DefKind::Case)
    }

    pub fn uses() -> Self {
        Self::new(DefKind::Uses)
    }

    pub fn rpc() -> Self {
        Self::new(DefKind::Rpc)
    }

    pub fn action() -> Self {
        Self::new(DefKind::Action)
    }

    pub fn input() -> Self {
        Self::new(DefKind::Input)
    }

    pub fn output() -> Self {
        Self::new(DefKind::Output)
    }

    pub fn notification() -> Self {
        Self::new(DefKind::Notification)
    }

    /// Leaf default, one more leaf-list default, or the default case of a choice.
    pub fn default(mut self, value: &str) -> Self {
        self.defaults.push(value.to_string());
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn min_elements(mut self, min: u32) -> Self {
        self.min = min;
        self
    }

    pub fn max_elements(mut self, max: u32) -> Self {
        self.max = Some(max);
        self
    }

    pub fn ordered_by_user(mut self) -> Self {
        self.user_ordered = true;
        self
    }

    /// Add a `unique` constraint over descendant leaves (relative paths).
    pub fn unique(mut self, leaves: &[&str]) -> Self {
        self.unique
            .push(leaves.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn config(mut self, config: bool) -> Self {
        self.config = Some(config);
        self
    }

    pub fn when(mut self, expr: &str) -> Self {
        self.when = Some(expr.to_string());
        self
    }

    pub fn if_feature(mut self, feature: &str) -> Self {
        self.if_features.push(feature.to_string());
        self
    }
}

/// Per-node names that can only be resolved once the whole schema is known.
#[derive(Debug, Default)]
struct Pending {
    keys: Vec<String>,
    unique: Vec<Vec<String>>,
    defaults: Vec<String>,
}

/// Builds a [`Context`].
///
/// ```
/// use arbor::schema::{ContextBuilder, LeafType, NodeDef};
///
/// let mut b = ContextBuilder::new();
/// let m = b.module("example");
/// let top = b.add(m, None, "top", NodeDef::container()).unwrap();
/// b.add(m, Some(top), "name", NodeDef::leaf(LeafType::String).default("x")).unwrap();
/// let ctx = b.build().unwrap();
/// assert_eq!(ctx.schema_path(ctx.find_data_child(Some(top), None, "name").unwrap()),
///            "/example:top/name");
/// ```
#[derive(Debug, Default)]
pub struct ContextBuilder {
    modules: Vec<Module>,
    nodes: Vec<SchemaNode>,
    pending: Vec<Pending>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, s: &str) -> IStr {
        intern(s)
    }

    /// Declare a module (or return the existing one of that name).
    pub fn module(&mut self, name: &str) -> ModuleId {
        if let Some(i) = self.modules.iter().position(|m| m.name.as_str() == name) {
            return ModuleId(i as u32);
        }
        self.modules.push(Module {
            name: intern(name),
            top: Vec::new(),
            enabled_features: RapidHashSet::default(),
        });
        ModuleId((self.modules.len() - 1) as u32)
    }

    /// Enable a feature of `module`. Features are disabled until enabled.
    pub fn enable_feature(&mut self, module: ModuleId, feature: &str) {
        let name = intern(feature);
        self.modules[module.0 as usize].enabled_features.insert(name);
    }

    /// Add a schema node under `parent` (or at the top of `module`).
    pub fn add(
        &mut self,
        module: ModuleId,
        parent: Option<SchemaId>,
        name: &str,
        def: NodeDef,
    ) -> Result<SchemaId, Error> {
        if module.0 as usize >= self.modules.len() {
            return Err(Error::InvalidSchema(format!("unknown module for {name}")));
        }
        let parent_node = match parent {
            Some(p) => Some(
                self.nodes
                    .get(p.index())
                    .ok_or_else(|| Error::InvalidSchema(format!("unknown parent of {name}")))?,
            ),
            None => None,
        };
        check_placement(&def.kind, parent_node.map(|n| &n.kind), name)?;

        let parent_config = parent_node.map_or(true, |p| p.config);
        let in_operation = parent_node.is_some_and(|p| {
            p.is_operation() || matches!(p.kind, SchemaKind::Input | SchemaKind::Output)
        });
        let config = match (def.config, &def.kind) {
            (_, DefKind::Rpc | DefKind::Action | DefKind::Notification) => false,
            _ if in_operation => false,
            (Some(true), _) if !parent_config => {
                return Err(Error::InvalidSchema(format!(
                    "config node {name} under a state node"
                )));
            }
            (Some(c), _) => c,
            (None, _) => parent_config,
        };

        let kind = match &def.kind {
            DefKind::Container { presence } => SchemaKind::Container {
                presence: *presence,
            },
            DefKind::List { .. } => SchemaKind::List(ListInfo {
                keys: Vec::new(),
                user_ordered: def.user_ordered,
                min: def.min,
                max: def.max,
                unique: Vec::new(),
            }),
            DefKind::Leaf(ty) => SchemaKind::Leaf(LeafInfo {
                ty: self.intern_type(ty),
                default: None,
                mandatory: def.mandatory,
            }),
            DefKind::LeafList(ty) => SchemaKind::LeafList(LeafListInfo {
                ty: self.intern_type(ty),
                defaults: Vec::new(),
                min: def.min,
                max: def.max,
                user_ordered: def.user_ordered,
            }),
            DefKind::Any { xml } => SchemaKind::Any {
                mandatory: def.mandatory,
                xml: *xml,
            },
            DefKind::Choice => SchemaKind::Choice(ChoiceInfo {
                default_case: None,
                mandatory: def.mandatory,
            }),
            DefKind::Case => SchemaKind::Case,
            DefKind::Uses => SchemaKind::Uses,
            DefKind::Rpc => SchemaKind::Rpc,
            DefKind::Action => SchemaKind::Action,
            DefKind::Input => SchemaKind::Input,
            DefKind::Output => SchemaKind::Output,
            DefKind::Notification => SchemaKind::Notification,
        };

        let id = SchemaId(self.nodes.len() as u32);
        self.nodes.push(SchemaNode {
            name: intern(name),
            module,
            kind,
            parent,
            children: Vec::new(),
            config,
            when: def.when.as_deref().map(|w| intern(w)),
            if_features: def
                .if_features
                .iter()
                .map(|f| intern(f))
                .collect(),
            is_key: false,
        });
        self.pending.push(Pending {
            keys: match def.kind {
                DefKind::List { keys } => keys,
                _ => Vec::new(),
            },
            unique: def.unique,
            defaults: def.defaults,
        });
        match parent {
            Some(p) => self.nodes[p.index()].children.push(id),
            None => self.modules[module.0 as usize].top.push(id),
        }
        Ok(id)
    }

    fn intern_type(&self, ty: &LeafType) -> LeafType {
        match ty {
            LeafType::Leafref {
                path,
                require_instance,
                ..
            } => LeafType::Leafref {
                path: intern(path),
                target: None,
                require_instance: *require_instance,
            },
            LeafType::Typedef { name, base } => LeafType::Typedef {
                name: intern(name),
                base: Box::new(self.intern_type(base)),
            },
            other => other.clone(),
        }
    }

    /// Resolve names, check the schema and freeze it.
    pub fn build(self) -> Result<Arc<Context>, Error> {
        let ContextBuilder {
            modules,
            nodes,
            pending,
        } = self;
        let mut ctx = Context {
            modules,
            nodes,
        };

        for i in 0..ctx.nodes.len() {
            let id = SchemaId(i as u32);
            check_sibling_names(&ctx, id)?;
            resolve_keys(&mut ctx, id, &pending[i])?;
        }
        for i in 0..ctx.nodes.len() {
            resolve_leafref(&mut ctx, SchemaId(i as u32))?;
        }
        for i in 0..ctx.nodes.len() {
            let id = SchemaId(i as u32);
            resolve_unique(&mut ctx, id, &pending[i].unique)?;
            resolve_defaults(&mut ctx, id, &pending[i].defaults)?;
        }
        Ok(Arc::new(ctx))
    }
}

fn check_placement(kind: &DefKind, parent: Option<&SchemaKind>, name: &str) -> Result<(), Error> {
    let bad = |why: &str| Err(Error::InvalidSchema(format!("{name}: {why}")));
    match parent {
        Some(SchemaKind::Leaf(_) | SchemaKind::LeafList(_) | SchemaKind::Any { .. }) => {
            return bad("terminal nodes have no children");
        }
        Some(SchemaKind::Choice(_)) if matches!(kind, DefKind::Choice | DefKind::Input) => {
            return bad("not allowed directly under a choice");
        }
        _ => {}
    }
    match kind {
        DefKind::Case if !matches!(parent, Some(SchemaKind::Choice(_))) => {
            bad("case outside of a choice")
        }
        DefKind::Input | DefKind::Output
            if !matches!(parent, Some(SchemaKind::Rpc | SchemaKind::Action)) =>
        {
            bad("input/output outside of an operation")
        }
        DefKind::Rpc if parent.is_some() => bad("rpc must be top-level"),
        DefKind::Action
            if !matches!(
                parent,
                Some(SchemaKind::Container { .. } | SchemaKind::List(_))
            ) =>
        {
            bad("action must be inside a container or list")
        }
        _ => Ok(()),
    }
}

fn check_sibling_names(ctx: &Context, id: SchemaId) -> Result<(), Error> {
    let node = ctx.node(id);
    if node.is_transparent() {
        return Ok(());
    }
    let clash = ctx
        .data_children(ctx.data_parent(id))
        .into_iter()
        .filter(|&c| {
            let other = ctx.node(c);
            other.name == node.name && other.module == node.module
        })
        .count();
    if clash > 1 {
        return Err(Error::InvalidSchema(format!(
            "duplicate data node {}",
            ctx.schema_path(id)
        )));
    }
    Ok(())
}

fn resolve_keys(ctx: &mut Context, id: SchemaId, pending: &Pending) -> Result<(), Error> {
    if !ctx.node(id).is_list() {
        return Ok(());
    }
    let mut keys = Vec::with_capacity(pending.keys.len());
    for key in &pending.keys {
        let leaf = ctx
            .node(id)
            .children
            .iter()
            .copied()
            .find(|&c| ctx.node(c).name.as_str() == key)
            .ok_or_else(|| {
                Error::InvalidSchema(format!("key {key} of {} not found", ctx.schema_path(id)))
            })?;
        match &ctx.node(leaf).kind {
            SchemaKind::Leaf(info) if info.ty.base() != &LeafType::Empty => {}
            _ => {
                return Err(Error::InvalidSchema(format!(
                    "key {} must be a non-empty leaf",
                    ctx.schema_path(leaf)
                )));
            }
        }
        if ctx.node(leaf).when.is_some() || !ctx.node(leaf).if_features.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "key {} cannot be conditional",
                ctx.schema_path(leaf)
            )));
        }
        keys.push(leaf);
    }
    for &k in &keys {
        ctx.nodes[k.index()].is_key = true;
    }
    if let SchemaKind::List(info) = &mut ctx.nodes[id.index()].kind {
        info.keys = keys;
    }
    Ok(())
}

fn resolve_leafref(ctx: &mut Context, id: SchemaId) -> Result<(), Error> {
    fn resolve(ctx: &Context, id: SchemaId, ty: &LeafType) -> Result<LeafType, Error> {
        Ok(match ty {
            LeafType::Leafref {
                path,
                require_instance,
                ..
            } => {
                let target = ctx
                    .resolve_schema_path(id, path)
                    .filter(|&t| ctx.node(t).is_term())
                    .ok_or_else(|| {
                        Error::InvalidSchema(format!(
                            "leafref {} of {} does not point at a leaf",
                            path,
                            ctx.schema_path(id)
                        ))
                    })?;
                LeafType::Leafref {
                    path: path.clone(),
                    target: Some(target),
                    require_instance: *require_instance,
                }
            }
            LeafType::Typedef { name, base } => LeafType::Typedef {
                name: name.clone(),
                base: Box::new(resolve(ctx, id, base)?),
            },
            other => other.clone(),
        })
    }

    let Some(ty) = ctx.leaf_type(id) else {
        return Ok(());
    };
    if !ty.needs_resolution() {
        return Ok(());
    }
    let resolved = resolve(ctx, id, ty)?;
    match &mut ctx.nodes[id.index()].kind {
        SchemaKind::Leaf(info) => info.ty = resolved,
        SchemaKind::LeafList(info) => info.ty = resolved,
        _ => {}
    }
    Ok(())
}

fn resolve_unique(ctx: &mut Context, id: SchemaId, unique: &[Vec<String>]) -> Result<(), Error> {
    if unique.is_empty() {
        return Ok(());
    }
    if !ctx.node(id).is_list() {
        return Err(Error::InvalidSchema(format!(
            "unique on non-list {}",
            ctx.schema_path(id)
        )));
    }
    let mut resolved = Vec::new();
    for group in unique {
        let mut leaves = Vec::new();
        for path in group {
            let leaf = ctx
                .resolve_schema_path(id, path)
                .filter(|&l| matches!(ctx.node(l).kind, SchemaKind::Leaf(_)))
                .ok_or_else(|| {
                    Error::InvalidSchema(format!(
                        "unique leaf {path} of {} not found",
                        ctx.schema_path(id)
                    ))
                })?;
            leaves.push(leaf);
        }
        resolved.push(leaves);
    }
    if let SchemaKind::List(info) = &mut ctx.nodes[id.index()].kind {
        info.unique = resolved;
    }
    Ok(())
}

fn resolve_defaults(ctx: &mut Context, id: SchemaId, defaults: &[String]) -> Result<(), Error> {
    if defaults.is_empty() {
        return Ok(());
    }
    let path = ctx.schema_path(id);
    match &ctx.node(id).kind {
        SchemaKind::Leaf(_) => {
            if defaults.len() > 1 {
                return Err(Error::InvalidSchema(format!("{path}: leaf has one default")));
            }
            if ctx.node(id).is_key {
                return Err(Error::InvalidSchema(format!("{path}: key with a default")));
            }
            let value = ctx
                .canonicalize(id, &defaults[0])
                .map_err(|reason| Error::InvalidSchema(format!("{path}: default {reason}")))?;
            if let SchemaKind::Leaf(info) = &mut ctx.nodes[id.index()].kind {
                info.default = Some(value.canonical);
            }
        }
        SchemaKind::LeafList(_) => {
            let mut values = Vec::new();
            for d in defaults {
                let value = ctx
                    .canonicalize(id, d)
                    .map_err(|reason| Error::InvalidSchema(format!("{path}: default {reason}")))?;
                values.push(value.canonical);
            }
            if let SchemaKind::LeafList(info) = &mut ctx.nodes[id.index()].kind {
                info.defaults = values;
            }
        }
        SchemaKind::Choice(_) => {
            let name = &defaults[0];
            let case = ctx
                .node(id)
                .children
                .iter()
                .copied()
                .find(|&c| ctx.node(c).name.as_str() == name.as_str())
                .ok_or_else(|| {
                    Error::InvalidSchema(format!("{path}: default case {name} not found"))
                })?;
            if let SchemaKind::Choice(info) = &mut ctx.nodes[id.index()].kind {
                if info.mandatory {
                    return Err(Error::InvalidSchema(format!(
                        "{path}: mandatory choice with a default case"
                    )));
                }
                info.default_case = Some(case);
            }
        }
        _ => {
            return Err(Error::InvalidSchema(format!(
                "{path}: default on a node that takes none"
            )));
        }
    }
    Ok(())
}
