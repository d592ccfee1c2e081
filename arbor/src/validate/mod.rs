//! Validation of a data tree against its schema.
//!
//! One call runs these passes in order, aborting on the first failure:
//!
//! 1. instance scan: state data, disabled features, operation shape
//! 2. default synthesis (when [`ValidationOptions::add_defaults`] is set)
//! 3. `when` evaluation: false removes default nodes and fails explicit ones
//! 4. mandatory nodes, choices and min/max-elements
//! 5. leafref and instance-identifier resolution
//! 6. duplicate instances and `unique` constraints
//!
//! On success every check bit of every node is cleared. A failed pass leaves
//! the tree as far as synthesis got; run it on a [`DataTree::dup`] copy when
//! that matters.

mod defaults;
mod mandatory;
mod resolve;
mod unique;
mod when;

pub use when::{AlwaysTrue, WhenContext, WhenEvaluator};

use std::sync::Arc;

use bough::indextree::NodeId;

use crate::diag::Diagnostics;
use crate::error::{Error, ValidationError, ValidationKind};
use crate::schema::{Context, SchemaId, SchemaKind};
use crate::tree::{DataTree, Validity};
use crate::{debug, trace};

/// Which subset of constraints a pass applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// A complete datastore, configuration and state.
    #[default]
    Data,
    /// Configuration only; state data is an error.
    Config,
    /// A retrieval result: mandatory nodes and min-elements are not enforced.
    Get,
    /// An rpc or action request (input partition).
    Rpc,
    /// An rpc or action reply (output partition).
    RpcReply,
    /// A notification.
    Notification,
}

impl ValidationMode {
    fn is_operation(self) -> bool {
        matches!(
            self,
            ValidationMode::Rpc | ValidationMode::RpcReply | ValidationMode::Notification
        )
    }
}

/// Options of a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOptions {
    pub mode: ValidationMode,
    /// Synthesise missing default nodes.
    pub add_defaults: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Data,
            add_defaults: true,
        }
    }
}

impl ValidationOptions {
    pub fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// Validate `tree`, synthesising defaults as configured.
///
/// The failure, if any, is also recorded in `diag`.
pub fn validate(
    tree: &mut DataTree,
    opts: &ValidationOptions,
    when: &dyn WhenEvaluator,
    diag: &mut Diagnostics,
) -> Result<(), Error> {
    let result = Validator {
        ctx: tree.ctx().clone(),
        root: tree.root(),
        tree,
        opts: *opts,
        when,
        diag: &mut *diag,
    }
    .run();
    result.map_err(|err| diag.fail(err))
}

pub(crate) struct Validator<'a> {
    ctx: Arc<Context>,
    tree: &'a mut DataTree,
    opts: ValidationOptions,
    when: &'a dyn WhenEvaluator,
    diag: &'a mut Diagnostics,
    /// Document node, or the operation instance in operation modes.
    root: NodeId,
}

fn fail(kind: ValidationKind, path: impl Into<String>) -> Error {
    Error::Validation(ValidationError::new(kind, path))
}

impl Validator<'_> {
    fn run(mut self) -> Result<(), Error> {
        debug!(mode = ?self.opts.mode, "validating");
        self.scan()?;
        if self.opts.add_defaults {
            self.add_defaults()?;
        }
        self.eval_whens()?;
        self.check_mandatory()?;
        self.resolve_references()?;
        self.check_uniqueness()?;
        self.mark_checked();
        Ok(())
    }

    /// Nodes of the validated scope, depth-first.
    fn scope_nodes(&self) -> Vec<NodeId> {
        let skip = usize::from(self.root == self.tree.root());
        self.tree.descendants(self.root).skip(skip).collect()
    }

    /// Schema children the walks start from.
    fn root_schema_children(&self) -> Vec<SchemaId> {
        match self.tree.schema(self.root) {
            Some(op) => self.ctx.node(op).children.clone(),
            None => self
                .ctx
                .modules()
                .flat_map(|(_, m)| m.top.iter().copied())
                .collect(),
        }
    }

    /// Whether the walks look at schema node `id` at all.
    fn in_scope(&self, id: SchemaId) -> bool {
        let node = self.ctx.node(id);
        if !self.ctx.is_enabled(id) {
            return false;
        }
        match node.kind {
            SchemaKind::Rpc | SchemaKind::Action | SchemaKind::Notification => return false,
            SchemaKind::Input => return self.opts.mode == ValidationMode::Rpc,
            SchemaKind::Output => return self.opts.mode == ValidationMode::RpcReply,
            _ => {}
        }
        self.opts.mode != ValidationMode::Config || node.config
    }

    /// Instance scan: per-node checks and location of the operation.
    fn scan(&mut self) -> Result<(), Error> {
        let mode = self.opts.mode;
        let mut operations = Vec::new();
        for id in self.tree.iter() {
            let Some(schema) = self.tree.schema(id) else {
                continue;
            };
            let snode = self.ctx.node(schema);
            if snode.is_operation() {
                operations.push(id);
            }
            if !self.ctx.is_enabled(schema) {
                return Err(fail(ValidationKind::DisabledByFeature, self.tree.path(id)));
            }
            if mode == ValidationMode::Config && !snode.config {
                return Err(fail(ValidationKind::StateData, self.tree.path(id)));
            }
            let partition = self
                .ctx
                .operation_partition(schema)
                .map(|p| self.ctx.node(p).kind.clone());
            let wrong = match (mode, partition) {
                (ValidationMode::Rpc, Some(SchemaKind::Output)) => true,
                (ValidationMode::RpcReply, Some(SchemaKind::Input)) => true,
                _ => false,
            };
            if wrong {
                return Err(fail(ValidationKind::WrongPartition, self.tree.path(id)));
            }
        }

        if !mode.is_operation() {
            if let Some(&op) = operations.first() {
                return Err(fail(
                    ValidationKind::WrongOperation {
                        expected: "data, not an operation".into(),
                    },
                    self.tree.path(op),
                ));
            }
            return Ok(());
        }

        let expected = match mode {
            ValidationMode::Notification => "exactly one notification",
            _ => "exactly one rpc or action",
        };
        let wrong_op = |path: String| {
            fail(
                ValidationKind::WrongOperation {
                    expected: expected.into(),
                },
                path,
            )
        };
        let &[op] = operations.as_slice() else {
            let at = operations.get(1).map_or("/".to_string(), |&n| self.tree.path(n));
            return Err(wrong_op(at));
        };
        let kind_ok = match self.tree.schema_node(op).map(|s| &s.kind) {
            Some(SchemaKind::Notification) => mode == ValidationMode::Notification,
            Some(SchemaKind::Rpc | SchemaKind::Action) => mode != ValidationMode::Notification,
            _ => false,
        };
        if !kind_ok {
            return Err(wrong_op(self.tree.path(op)));
        }
        trace!(operation = %self.tree.path(op), "operation scope");
        self.root = op;
        Ok(())
    }

    /// Clear every check bit in scope after a successful pass.
    fn mark_checked(&mut self) {
        for id in self.scope_nodes() {
            self.tree.get_mut(id).validity.remove(Validity::UNCHECKED);
        }
    }

    /// Data path of a place: an existing anchor plus virtual steps below it.
    fn place_path(&self, anchor: NodeId, pending: &[SchemaId]) -> String {
        let mut path = self.tree.path(anchor);
        if path == "/" {
            path.clear();
        }
        let mut last_module = self.tree.schema(anchor).map(|s| self.ctx.node(s).module);
        for &s in pending {
            let node = self.ctx.node(s);
            path.push('/');
            if last_module != Some(node.module) {
                path.push_str(self.ctx.module_name(s));
                path.push(':');
                last_module = Some(node.module);
            }
            path.push_str(&node.name);
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }
}

impl Validator<'_> {
    /// The case (or shorthand node) of `choice` instantiated under `parent`.
    fn active_case(&self, parent: NodeId, choice: SchemaId) -> Option<SchemaId> {
        self.tree.children(parent).find_map(|c| {
            let schema = self.tree.schema(c)?;
            self.ctx
                .choice_chain(schema)
                .into_iter()
                .find(|&(ch, _)| ch == choice)
                .map(|(_, case)| case)
        })
    }

    /// Schema nodes a choice branch contributes: a case's children, or the
    /// shorthand node itself.
    fn branch_children(&self, branch: SchemaId) -> Vec<SchemaId> {
        let node = self.ctx.node(branch);
        match node.kind {
            SchemaKind::Case => node.children.clone(),
            _ => vec![branch],
        }
    }
}
