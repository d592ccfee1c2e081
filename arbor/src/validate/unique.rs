//! Duplicate instances and `unique` constraints.

use bough::indextree::NodeId;
use rapidhash::{RapidHashMap, RapidHashSet};
use smallvec::SmallVec;

use super::{Validator, fail};
use crate::error::{Error, ValidationKind};
use crate::schema::{SchemaId, SchemaKind};

impl Validator<'_> {
    pub(super) fn check_uniqueness(&self) -> Result<(), Error> {
        let mut parents = self.scope_nodes();
        if self.root == self.tree.root() {
            parents.insert(0, self.root);
        }
        for parent in parents {
            if self.tree.get(parent).inner().is_none() {
                continue;
            }
            let mut groups: RapidHashMap<SchemaId, Vec<NodeId>> = RapidHashMap::default();
            let mut order = Vec::new();
            for child in self.tree.children(parent) {
                let Some(schema) = self.tree.schema(child) else {
                    continue;
                };
                if !self.ctx.node(schema).is_single_instance() {
                    groups
                        .entry(schema)
                        .or_insert_with(|| {
                            order.push(schema);
                            Vec::new()
                        })
                        .push(child);
                }
            }
            for schema in order {
                self.check_group(schema, &groups[&schema])?;
            }
        }
        Ok(())
    }

    fn check_group(&self, schema: SchemaId, instances: &[NodeId]) -> Result<(), Error> {
        let snode = self.ctx.node(schema);
        match &snode.kind {
            SchemaKind::LeafList(_) if snode.config => {
                let mut seen = RapidHashSet::default();
                for &n in instances {
                    if !seen.insert(self.tree.value_str(n)) {
                        return Err(fail(ValidationKind::DuplicateInstance, self.tree.path(n)));
                    }
                }
            }
            SchemaKind::List(info) => {
                if snode.config && !info.keys.is_empty() {
                    let mut seen = RapidHashSet::default();
                    for &n in instances {
                        if let Some(keys) = self.tree.key_values(n)
                            && !seen.insert(keys)
                        {
                            return Err(fail(ValidationKind::DuplicateInstance, self.tree.path(n)));
                        }
                    }
                }
                for leaves in &info.unique {
                    let mut seen = RapidHashSet::default();
                    for &n in instances {
                        let values: Option<SmallVec<[&str; 4]>> = leaves
                            .iter()
                            .map(|&leaf| self.descendant_value(n, schema, leaf))
                            .collect();
                        // an instance missing one of the leaves is exempt
                        if let Some(values) = values
                            && !seen.insert(values)
                        {
                            let names: Vec<&str> =
                                leaves.iter().map(|&l| self.ctx.node(l).name.as_str()).collect();
                            return Err(fail(
                                ValidationKind::NotUnique {
                                    leaves: names.join(" "),
                                },
                                self.tree.path(n),
                            ));
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Value of the descendant leaf `leaf` of list instance `instance`.
    fn descendant_value(&self, instance: NodeId, list: SchemaId, leaf: SchemaId) -> Option<&str> {
        let mut chain = Vec::new();
        let mut cur = leaf;
        while cur != list {
            chain.push(cur);
            cur = self.ctx.data_parent(cur)?;
        }
        let mut node = instance;
        for &s in chain.iter().rev() {
            node = self.tree.find_child(node, s)?;
        }
        self.tree.value_str(node)
    }
}
