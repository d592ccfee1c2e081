//! Mandatory nodes, choices and cardinality.
//!
//! The walk follows the schema below every instance. Where an instance is
//! missing but could hold mandatory descendants (a non-presence container),
//! the walk continues on a virtual place: the nearest existing anchor plus
//! the schema chain that would be created under it. Conditions of missing
//! nodes are evaluated on that virtual place.

use bough::indextree::NodeId;

use super::{ValidationMode, Validator, WhenContext, fail};
use crate::error::{Error, ValidationKind};
use crate::schema::{LeafInfo, LeafListInfo, ListInfo, SchemaId, SchemaKind};

impl Validator<'_> {
    pub(super) fn check_mandatory(&mut self) -> Result<(), Error> {
        let children = self.root_schema_children();
        self.mandatory_in(self.root, &mut Vec::new(), &children)
    }

    /// Whether the conditions of the missing node `schema` at the given
    /// place allow it to exist.
    fn when_allows(
        &self,
        anchor: NodeId,
        pending: &[SchemaId],
        schema: SchemaId,
    ) -> Result<bool, Error> {
        let conditions = self.ctx.when_conditions(schema);
        if conditions.is_empty() {
            return Ok(true);
        }
        let mut chain = pending.to_vec();
        chain.push(schema);
        for (owner, expr) in conditions {
            let place = if owner == schema { &chain[..] } else { pending };
            let ctx = WhenContext::virtual_node(self.tree, anchor, place, owner);
            if !self.when.evaluate(&ctx, &expr)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn mandatory_in(
        &mut self,
        anchor: NodeId,
        pending: &mut Vec<SchemaId>,
        schema_children: &[SchemaId],
    ) -> Result<(), Error> {
        let ctx = self.ctx.clone();
        let lenient = self.opts.mode == ValidationMode::Get;
        let real = pending.is_empty();

        for &sc in schema_children {
            if !self.in_scope(sc) {
                continue;
            }
            let snode = ctx.node(sc);
            match &snode.kind {
                SchemaKind::Choice(info) => {
                    let active = if real { self.active_case(anchor, sc) } else { None };
                    match active.or(info.default_case) {
                        Some(branch) => {
                            let children = self.branch_children(branch);
                            self.mandatory_in(anchor, pending, &children)?;
                        }
                        None if info.mandatory && !lenient => {
                            if self.when_allows(anchor, pending, sc)? {
                                return Err(fail(
                                    ValidationKind::MissingChoice {
                                        choice: snode.name.to_string(),
                                    },
                                    self.place_path(anchor, pending),
                                ));
                            }
                        }
                        None => {}
                    }
                }
                SchemaKind::Case | SchemaKind::Uses | SchemaKind::Input | SchemaKind::Output => {
                    self.mandatory_in(anchor, pending, &snode.children)?;
                }
                SchemaKind::Leaf(LeafInfo { mandatory: true, .. })
                | SchemaKind::Any {
                    mandatory: true, ..
                } => {
                    let present = real && self.tree.find_child(anchor, sc).is_some();
                    if !present && !lenient && self.when_allows(anchor, pending, sc)? {
                        return Err(fail(
                            ValidationKind::MissingMandatory {
                                name: snode.name.to_string(),
                            },
                            self.place_path(anchor, pending),
                        ));
                    }
                }
                SchemaKind::List(ListInfo { min, max, .. })
                | SchemaKind::LeafList(LeafListInfo { min, max, .. }) => {
                    let instances: Vec<NodeId> = if real {
                        self.tree.instances(anchor, sc).collect()
                    } else {
                        Vec::new()
                    };
                    let count = instances.len();
                    if !lenient
                        && count < *min as usize
                        && (count > 0 || self.when_allows(anchor, pending, sc)?)
                    {
                        return Err(fail(
                            ValidationKind::TooFew {
                                name: snode.name.to_string(),
                                min: *min,
                                count,
                            },
                            self.place_path(anchor, pending),
                        ));
                    }
                    if let Some(max) = *max
                        && count > max as usize
                    {
                        return Err(fail(
                            ValidationKind::TooMany {
                                name: snode.name.to_string(),
                                max,
                                count,
                            },
                            self.tree.path(instances[max as usize]),
                        ));
                    }
                    if let SchemaKind::List(info) = &snode.kind {
                        for instance in instances {
                            self.check_keys(instance, &info.keys)?;
                            self.mandatory_in(instance, &mut Vec::new(), &snode.children)?;
                        }
                    }
                }
                SchemaKind::Container { presence } => {
                    let existing = if real { self.tree.find_child(anchor, sc) } else { None };
                    match existing {
                        Some(container) => {
                            self.mandatory_in(container, &mut Vec::new(), &snode.children)?;
                        }
                        None if !presence && self.when_allows(anchor, pending, sc)? => {
                            pending.push(sc);
                            let result = self.mandatory_in(anchor, pending, &snode.children);
                            pending.pop();
                            result?;
                        }
                        None => {}
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Every key of a list instance is present.
    fn check_keys(&self, instance: NodeId, keys: &[SchemaId]) -> Result<(), Error> {
        for &key in keys {
            if self.tree.find_child(instance, key).is_none() {
                return Err(fail(
                    ValidationKind::MissingMandatory {
                        name: self.ctx.node(key).name.to_string(),
                    },
                    self.tree.path(instance),
                ));
            }
        }
        Ok(())
    }
}
