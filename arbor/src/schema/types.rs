//! Leaf types, typed values and canonicalisation.

use bitflags::bitflags;

use super::{Context, SchemaId};
use crate::intern::IStr;
use crate::path::DataPath;

/// Type of a leaf or leaf-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafType {
    String,
    Integer { min: i64, max: i64 },
    Boolean,
    Empty,
    Enumeration(Vec<IStr>),
    /// Value must equal the value of some instance of the target leaf.
    Leafref {
        /// Schema path as written, absolute (`/m:a/b`) or relative (`../b`).
        path: IStr,
        /// Resolved when the context is built.
        target: Option<SchemaId>,
        require_instance: bool,
    },
    /// Value is a data path that must point at an existing node.
    InstanceIdentifier { require_instance: bool },
    /// Named user-defined type.
    Typedef { name: IStr, base: Box<LeafType> },
}

impl LeafType {
    /// Full-range integer.
    pub fn integer() -> Self {
        LeafType::Integer {
            min: i64::MIN,
            max: i64::MAX,
        }
    }

    /// Peel typedefs off until a built-in type is reached.
    pub fn base(&self) -> &LeafType {
        match self {
            LeafType::Typedef { base, .. } => base.base(),
            other => other,
        }
    }

    /// Leafrefs and instance-identifiers are resolved after the tree is walked.
    pub fn needs_resolution(&self) -> bool {
        matches!(
            self.base(),
            LeafType::Leafref { .. } | LeafType::InstanceIdentifier { .. }
        )
    }

    fn is_user_defined(&self) -> bool {
        matches!(self, LeafType::Typedef { .. })
    }
}

/// Parsed value of a leaf or leaf-list instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(IStr),
    Int(i64),
    Bool(bool),
    Empty,
    Enum(IStr),
    /// Canonical data path of an instance-identifier.
    InstanceId(IStr),
}

bitflags! {
    /// Value-specific flags of a term node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ValueFlags: u8 {
        /// The leaf type is a typedef.
        const USER_TYPE = 1 << 0;
        /// The value is a reference whose target has not been checked yet.
        const UNRESOLVED = 1 << 1;
    }
}

/// A canonicalised value ready to be stored in a term node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical {
    pub canonical: IStr,
    pub typed: Value,
    pub flags: ValueFlags,
}

impl Context {
    /// Parse `raw` against the type of the leaf/leaf-list `schema`.
    pub fn canonicalize(&self, schema: SchemaId, raw: &str) -> Result<Canonical, String> {
        let ty = self
            .leaf_type(schema)
            .ok_or_else(|| format!("{} is not a leaf or leaf-list", self.node(schema).name))?;
        let (canonical, typed) = self.canonicalize_type(ty, raw, 0)?;
        let mut flags = ValueFlags::empty();
        if ty.is_user_defined() {
            flags |= ValueFlags::USER_TYPE;
        }
        if ty.needs_resolution() {
            flags |= ValueFlags::UNRESOLVED;
        }
        Ok(Canonical {
            canonical,
            typed,
            flags,
        })
    }

    fn canonicalize_type(
        &self,
        ty: &LeafType,
        raw: &str,
        depth: usize,
    ) -> Result<(IStr, Value), String> {
        if depth > 16 {
            return Err("leafref chain too long".to_string());
        }
        match ty {
            LeafType::String => {
                let s = self.intern(raw);
                Ok((s.clone(), Value::String(s)))
            }
            LeafType::Integer { min, max } => {
                let n: i64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| "not an integer".to_string())?;
                if n < *min || n > *max {
                    return Err(format!("{n} is outside {min}..={max}"));
                }
                Ok((self.intern(&n.to_string()), Value::Int(n)))
            }
            LeafType::Boolean => match raw {
                "true" => Ok((self.intern("true"), Value::Bool(true))),
                "false" => Ok((self.intern("false"), Value::Bool(false))),
                _ => Err("not a boolean".to_string()),
            },
            LeafType::Empty => {
                if raw.is_empty() {
                    Ok((self.intern(""), Value::Empty))
                } else {
                    Err("empty type takes no value".to_string())
                }
            }
            LeafType::Enumeration(names) => names
                .iter()
                .find(|n| n.as_str() == raw)
                .map(|n| (n.clone(), Value::Enum(n.clone())))
                .ok_or_else(|| "not a member of the enumeration".to_string()),
            LeafType::Leafref { target, .. } => {
                let target = target.ok_or_else(|| "unresolved leafref target".to_string())?;
                let target_ty = self
                    .leaf_type(target)
                    .ok_or_else(|| "leafref target is not a leaf".to_string())?;
                self.canonicalize_type(target_ty, raw, depth + 1)
            }
            LeafType::InstanceIdentifier { .. } => {
                let path = DataPath::parse(raw).map_err(|e| e.to_string())?;
                let s = self.intern(&path.to_string());
                Ok((s.clone(), Value::InstanceId(s)))
            }
            LeafType::Typedef { base, .. } => self.canonicalize_type(base, raw, depth),
        }
    }
}
