//! Default synthesis.
//!
//! Walks the schema below every existing instance and creates what has a
//! declared default but no instance: leaves, leaf-lists, and non-presence
//! containers that end up holding a default. Choices contribute their
//! instantiated case, or the default case when none is.

use bough::indextree::NodeId;

use super::Validator;
use crate::error::Error;
use crate::schema::{SchemaId, SchemaKind};
use crate::trace;
use crate::tree::NodeFlags;

impl Validator<'_> {
    pub(super) fn add_defaults(&mut self) -> Result<(), Error> {
        let children = self.root_schema_children();
        self.defaults_in(self.root, &children)
    }

    fn defaults_in(&mut self, parent: NodeId, schema_children: &[SchemaId]) -> Result<(), Error> {
        let ctx = self.ctx.clone();
        for &sc in schema_children {
            if !self.in_scope(sc) {
                continue;
            }
            let snode = ctx.node(sc);
            match &snode.kind {
                SchemaKind::Choice(info) => {
                    if let Some(branch) = self.active_case(parent, sc).or(info.default_case) {
                        let children = self.branch_children(branch);
                        self.defaults_in(parent, &children)?;
                    }
                }
                SchemaKind::Case | SchemaKind::Uses | SchemaKind::Input | SchemaKind::Output => {
                    self.defaults_in(parent, &snode.children)?;
                }
                SchemaKind::Leaf(info) => {
                    if let Some(default) = &info.default
                        && self.tree.find_child(parent, sc).is_none()
                    {
                        self.add_default_term(parent, sc, default)?;
                    }
                }
                SchemaKind::LeafList(info) => {
                    if !info.defaults.is_empty() && self.tree.instances(parent, sc).next().is_none() {
                        for default in &info.defaults {
                            self.add_default_term(parent, sc, default)?;
                        }
                    }
                }
                SchemaKind::Container { presence: false } => match self.tree.find_child(parent, sc) {
                    Some(existing) => self.defaults_in(existing, &snode.children)?,
                    None => {
                        let container = self.tree.new_inner(sc)?;
                        self.defaults_in(container, &snode.children)?;
                        if self.tree.child_count(container) == 0 {
                            self.tree.free(container)?;
                        } else {
                            trace!(container = %snode.name, "synthesised default container");
                            self.tree.insert_child(parent, container, self.diag)?;
                        }
                    }
                },
                SchemaKind::Container { presence: true } | SchemaKind::List(_) => {
                    let instances: Vec<NodeId> = self.tree.instances(parent, sc).collect();
                    for instance in instances {
                        self.defaults_in(instance, &snode.children)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn add_default_term(&mut self, parent: NodeId, schema: SchemaId, value: &str) -> Result<(), Error> {
        let node = self
            .tree
            .new_term_flagged(schema, value, NodeFlags::DEFAULT)?;
        if let Err(err) = self.tree.insert_child(parent, node, self.diag) {
            self.tree.free(node)?;
            return Err(Error::internal(format!(
                "cannot place default {}: {err}",
                self.ctx.schema_path(schema)
            )));
        }
        trace!(node = %self.tree.path(node), "synthesised default");
        Ok(())
    }
}
