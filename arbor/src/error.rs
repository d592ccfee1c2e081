//! Error types shared by every entry point.

use bough::indextree;
use core::fmt;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Invalid or contradictory caller input; nothing was mutated.
    Argument,
    /// A named schema constraint is violated by the data.
    Validation,
    /// Allocation or schema/data inconsistency; fatal to the current call.
    Internal,
}

/// Errors reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// contradictory or malformed caller input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// the schema itself is malformed
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// value does not fit the leaf type
    #[error("invalid value \"{value}\" for {node}: {reason}")]
    InvalidValue {
        node: String,
        value: String,
        reason: String,
    },

    /// node and parent schemas disagree
    #[error("{node} cannot be a child of {parent}")]
    SchemaMismatch { parent: String, node: String },

    /// an instance that must be unique already exists
    #[error("duplicate instance of {path}")]
    Duplicate { path: String },

    /// list keys supplied out of their declared order (strict mode)
    #[error("key {key} of {list} is out of order")]
    KeyOrder { list: String, key: String },

    /// the requested placement contradicts the schema
    #[error("conflict: {0}")]
    Conflict(String),

    /// the node is still linked under a parent
    #[error("node {0} is still linked into the tree")]
    StillLinked(String),

    /// no node at the given path
    #[error("no node at {0}")]
    NotFound(String),

    /// malformed data path
    #[error("invalid path \"{path}\": {reason}")]
    InvalidPath { path: String, reason: String },

    /// schema constraint violation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// unreachable state for a well-formed schema
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Which of the three error classes this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Validation(_) => ErrorClass::Validation,
            Error::Internal(_) => ErrorClass::Internal,
            _ => ErrorClass::Argument,
        }
    }

    /// The validation failure, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

impl From<indextree::NodeError> for Error {
    fn from(err: indextree::NodeError) -> Self {
        Error::Internal(err.to_string())
    }
}

/// A constraint violation together with the data path of the offending node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} ({path})")]
pub struct ValidationError {
    /// What went wrong
    pub kind: ValidationKind,
    /// Data path of the offending node (or of the parent a node is missing from)
    pub path: String,
}

impl ValidationError {
    pub(crate) fn new(kind: ValidationKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// The constraint that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationKind {
    /// A mandatory leaf or anydata has no instance.
    MissingMandatory { name: String },
    /// A mandatory choice has no instantiated case.
    MissingChoice { choice: String },
    /// Fewer instances than min-elements.
    TooFew { name: String, min: u32, count: usize },
    /// More instances than max-elements.
    TooMany { name: String, max: u32, count: usize },
    /// A when-condition of an explicit node is false.
    WhenFalse { expr: String },
    /// A leafref or instance-identifier has no target.
    UnresolvedReference { value: String },
    /// Two instances share the same keys or value where that is forbidden.
    DuplicateInstance,
    /// Two list instances collide on a unique constraint.
    NotUnique { leaves: String },
    /// State data in a configuration-only pass.
    StateData,
    /// The node's schema is disabled by an if-feature.
    DisabledByFeature,
    /// An operation tree is missing or has the wrong shape for the mode.
    WrongOperation { expected: String },
    /// An input child in a reply, or an output child in a request.
    WrongPartition,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationKind::MissingMandatory { name } => {
                write!(f, "missing mandatory node \"{name}\"")
            }
            ValidationKind::MissingChoice { choice } => {
                write!(f, "no case of mandatory choice \"{choice}\" is present")
            }
            ValidationKind::TooFew { name, min, count } => {
                write!(f, "too few \"{name}\" instances: {count} < {min}")
            }
            ValidationKind::TooMany { name, max, count } => {
                write!(f, "too many \"{name}\" instances: {count} > {max}")
            }
            ValidationKind::WhenFalse { expr } => write!(f, "when condition \"{expr}\" is false"),
            ValidationKind::UnresolvedReference { value } => {
                write!(f, "reference \"{value}\" has no target")
            }
            ValidationKind::DuplicateInstance => write!(f, "duplicate instance"),
            ValidationKind::NotUnique { leaves } => {
                write!(f, "unique constraint \"{leaves}\" violated")
            }
            ValidationKind::StateData => write!(f, "state data in configuration"),
            ValidationKind::DisabledByFeature => write!(f, "node is disabled by if-feature"),
            ValidationKind::WrongOperation { expected } => {
                write!(f, "expected {expected}")
            }
            ValidationKind::WrongPartition => {
                write!(f, "node belongs to the other operation partition")
            }
        }
    }
}
