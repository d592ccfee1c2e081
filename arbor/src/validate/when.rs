//! Evaluation of `when` conditions.
//!
//! Expressions are opaque to the engine; a caller-supplied [`WhenEvaluator`]
//! decides them. The evaluator gets a [`WhenContext`] whose context node is
//! either a real node of the tree or a *virtual* one: an instance that does
//! not exist yet, described by an existing anchor plus the schema nodes that
//! would be created below it. Nothing is spliced into the tree.

use bough::indextree::NodeId;

use super::{Validator, fail};
use crate::error::{Error, ValidationKind};
use crate::schema::SchemaId;
use crate::trace;
use crate::tree::{DataTree, Validity};

/// Decides `when` expressions.
pub trait WhenEvaluator {
    fn evaluate(&self, ctx: &WhenContext<'_>, expr: &str) -> Result<bool, Error>;
}

impl<F> WhenEvaluator for F
where
    F: Fn(&WhenContext<'_>, &str) -> Result<bool, Error>,
{
    fn evaluate(&self, ctx: &WhenContext<'_>, expr: &str) -> Result<bool, Error> {
        self(ctx, expr)
    }
}

/// Treats every condition as satisfied.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysTrue;

impl WhenEvaluator for AlwaysTrue {
    fn evaluate(&self, _ctx: &WhenContext<'_>, _expr: &str) -> Result<bool, Error> {
        Ok(true)
    }
}

/// A step position while resolving a path: a real node, or the virtual
/// node at `pending[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Real(NodeId),
    Virtual(usize),
}

/// Context node handed to a [`WhenEvaluator`].
#[derive(Debug, Clone, Copy)]
pub struct WhenContext<'a> {
    tree: &'a DataTree,
    anchor: NodeId,
    pending: &'a [SchemaId],
    condition: SchemaId,
}

impl<'a> WhenContext<'a> {
    /// Context node `node`, which exists in `tree`.
    pub fn real(tree: &'a DataTree, node: NodeId, condition: SchemaId) -> Self {
        Self {
            tree,
            anchor: node,
            pending: &[],
            condition,
        }
    }

    /// Context node that would be created at `pending` (outermost first)
    /// below the existing `anchor`.
    pub fn virtual_node(
        tree: &'a DataTree,
        anchor: NodeId,
        pending: &'a [SchemaId],
        condition: SchemaId,
    ) -> Self {
        Self {
            tree,
            anchor,
            pending,
            condition,
        }
    }

    pub fn tree(&self) -> &'a DataTree {
        self.tree
    }

    /// The context node, unless it is virtual.
    pub fn node(&self) -> Option<NodeId> {
        self.pending.is_empty().then_some(self.anchor)
    }

    pub fn is_virtual(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Schema of the context node; `None` for the document.
    pub fn schema(&self) -> Option<SchemaId> {
        match self.pending.last() {
            Some(&s) => Some(s),
            None => self.tree.schema(self.anchor),
        }
    }

    /// Schema node carrying the condition being evaluated.
    pub fn condition_schema(&self) -> SchemaId {
        self.condition
    }

    fn start(&self) -> Cursor {
        match self.pending.len() {
            0 => Cursor::Real(self.anchor),
            n => Cursor::Virtual(n - 1),
        }
    }

    /// Real nodes selected by a simple location path: `/`-separated steps of
    /// `.`, `..` and `[prefix:]name`, relative to the context node or
    /// absolute when starting with `/`.
    pub fn select(&self, path: &str) -> Result<Vec<NodeId>, Error> {
        let (mut set, rest) = match path.strip_prefix('/') {
            Some(rest) => (vec![Cursor::Real(self.tree.root())], rest),
            None => (vec![self.start()], path),
        };
        for step in rest.split('/').map(str::trim).filter(|s| !s.is_empty()) {
            let mut next = Vec::new();
            for cur in set {
                match step {
                    "." => next.push(cur),
                    ".." => next.extend(self.parent(cur)),
                    _ => self.children_named(cur, step, &mut next)?,
                }
            }
            next.dedup();
            set = next;
        }
        Ok(set
            .into_iter()
            .filter_map(|c| match c {
                Cursor::Real(n) => Some(n),
                Cursor::Virtual(_) => None,
            })
            .collect())
    }

    /// Canonical value of the first selected leaf or leaf-list.
    pub fn value(&self, path: &str) -> Result<Option<&'a str>, Error> {
        let tree = self.tree;
        Ok(self
            .select(path)?
            .into_iter()
            .find_map(|n| tree.value_str(n)))
    }

    /// Whether the path selects at least one real node.
    pub fn exists(&self, path: &str) -> Result<bool, Error> {
        Ok(!self.select(path)?.is_empty())
    }

    fn parent(&self, cur: Cursor) -> Option<Cursor> {
        match cur {
            Cursor::Real(n) => self.tree.parent(n).map(Cursor::Real),
            Cursor::Virtual(0) => Some(Cursor::Real(self.anchor)),
            Cursor::Virtual(i) => Some(Cursor::Virtual(i - 1)),
        }
    }

    fn children_named(&self, cur: Cursor, step: &str, out: &mut Vec<Cursor>) -> Result<(), Error> {
        let (module, name) = match step.split_once(':') {
            Some((m, n)) => (Some(m), n),
            None => (None, step),
        };
        if name.is_empty() || name.contains(['[', ']', '(', ')', '=']) {
            return Err(Error::argument(format!("unsupported path step \"{step}\"")));
        }
        let ctx = self.tree.ctx();
        let matches = |schema: SchemaId| {
            ctx.node(schema).name.as_str() == name
                && module.is_none_or(|m| ctx.module_name(schema).as_str() == m)
        };
        match cur {
            Cursor::Real(n) => {
                out.extend(
                    self.tree
                        .children(n)
                        .filter(|&c| self.tree.schema(c).is_some_and(matches))
                        .map(Cursor::Real),
                );
                if n == self.anchor
                    && let Some(&first) = self.pending.first()
                    && matches(first)
                {
                    out.push(Cursor::Virtual(0));
                }
            }
            Cursor::Virtual(i) => {
                if let Some(&next) = self.pending.get(i + 1)
                    && matches(next)
                {
                    out.push(Cursor::Virtual(i + 1));
                }
            }
        }
        Ok(())
    }
}

impl Validator<'_> {
    /// Evaluate the conditions of every conditional node in document order.
    pub(super) fn eval_whens(&mut self) -> Result<(), Error> {
        let queue: Vec<NodeId> = self
            .scope_nodes()
            .into_iter()
            .filter(|&n| {
                self.tree
                    .schema(n)
                    .is_some_and(|s| !self.ctx.when_conditions(s).is_empty())
            })
            .collect();

        for id in queue {
            // gone with a default ancestor whose condition was false
            if self.tree.try_get(id).is_none() {
                continue;
            }
            let Some(schema) = self.tree.schema(id) else {
                continue;
            };
            let mut false_expr = None;
            for (owner, expr) in self.ctx.when_conditions(schema) {
                let context = if owner == schema {
                    id
                } else {
                    self.tree.parent(id).unwrap_or(id)
                };
                let ctx = WhenContext::real(self.tree, context, owner);
                if !self.when.evaluate(&ctx, &expr)? {
                    false_expr = Some(expr);
                    break;
                }
            }
            match false_expr {
                None => {
                    let validity = &mut self.tree.get_mut(id).validity;
                    validity.remove(Validity::WHEN | Validity::WHEN_FALSE);
                    validity.insert(Validity::WHEN_TRUE);
                }
                Some(_) if self.tree.is_default(id) => {
                    trace!(node = %self.tree.path(id), "condition false, removing default");
                    self.tree.remove(id)?;
                }
                Some(expr) => {
                    self.tree.get_mut(id).validity.insert(Validity::WHEN_FALSE);
                    return Err(fail(
                        ValidationKind::WhenFalse {
                            expr: expr.to_string(),
                        },
                        self.tree.path(id),
                    ));
                }
            }
        }
        Ok(())
    }
}
