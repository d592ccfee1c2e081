//! Leafref and instance-identifier resolution.

use rapidhash::{RapidHashMap, RapidHashSet};

use super::{Validator, fail};
use crate::error::{Error, ValidationKind};
use crate::intern::IStr;
use crate::schema::{LeafType, SchemaId, ValueFlags};
use crate::tree::{NodeKind, Validity};

impl Validator<'_> {
    pub(super) fn resolve_references(&mut self) -> Result<(), Error> {
        let mut targets: RapidHashMap<SchemaId, RapidHashSet<IStr>> = RapidHashMap::default();
        for id in self.scope_nodes() {
            let Some(schema) = self.tree.schema(id) else {
                continue;
            };
            let Some(ty) = self.ctx.leaf_type(schema) else {
                continue;
            };
            let Some(value) = self.tree.value_str(id) else {
                continue;
            };
            let resolved = match ty.base() {
                LeafType::Leafref {
                    require_instance: false,
                    ..
                }
                | LeafType::InstanceIdentifier {
                    require_instance: false,
                } => true,
                LeafType::Leafref { target, .. } => {
                    let target = target.ok_or_else(|| {
                        Error::internal(format!(
                            "leafref {} has no resolved target",
                            self.ctx.schema_path(schema)
                        ))
                    })?;
                    let tree = &*self.tree;
                    targets
                        .entry(target)
                        .or_insert_with(|| {
                            tree.iter()
                                .filter(|&n| tree.schema(n) == Some(target))
                                .filter_map(|n| tree.value(n).map(|v| v.canonical.clone()))
                                .collect()
                        })
                        .contains(value)
                }
                LeafType::InstanceIdentifier { .. } => {
                    matches!(self.tree.find_path(value), Ok(Some(_)))
                }
                _ => continue,
            };
            if !resolved {
                return Err(fail(
                    ValidationKind::UnresolvedReference {
                        value: value.to_string(),
                    },
                    self.tree.path(id),
                ));
            }
            let data = self.tree.get_mut(id);
            data.validity.remove(Validity::UNRES_REF);
            if let NodeKind::Term { value, .. } = &mut data.kind {
                value.flags.remove(ValueFlags::UNRESOLVED);
            }
        }
        Ok(())
    }
}
