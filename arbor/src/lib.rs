//! # Arbor
//!
//! Schema-governed in-memory data trees.
//!
//! arbor provides:
//! - **Schema contexts**: modules, containers, lists, leaves, choices,
//!   operations and notifications, built with [`ContextBuilder`]
//! - **Data trees**: arena-backed instance trees whose sibling order follows
//!   the schema, with a hash index over large sibling sets
//! - **Validation**: defaults, `when` conditions, mandatory nodes,
//!   cardinality, references and uniqueness
//! - **Diff**: create/delete/change/move edit scripts between two trees
//! - **Merge**: folding one tree into another
//!
//! # Example
//!
//! ```rust
//! use arbor::schema::{ContextBuilder, LeafType, NodeDef};
//! use arbor::{DataTree, Diagnostics, DiffOptions, ValidationOptions, AlwaysTrue};
//!
//! let mut b = ContextBuilder::new();
//! let m = b.module("shop");
//! let stock = b.add(m, None, "stock", NodeDef::container()).unwrap();
//! let item = b.add(m, Some(stock), "item", NodeDef::list(&["sku"])).unwrap();
//! b.add(m, Some(item), "sku", NodeDef::leaf(LeafType::String)).unwrap();
//! b.add(m, Some(item), "count", NodeDef::leaf(LeafType::integer()).default("0")).unwrap();
//! let ctx = b.build().unwrap();
//!
//! let mut diag = Diagnostics::new();
//! let mut tree = DataTree::new(ctx.clone());
//! tree.new_path("/shop:stock/item[sku='apple']", None, &mut diag).unwrap();
//! arbor::validate(&mut tree, &ValidationOptions::default(), &AlwaysTrue, &mut diag).unwrap();
//! assert_eq!(
//!     tree.find_path("/shop:stock/item[sku='apple']/count").unwrap().and_then(|n| tree.value_str(n)),
//!     Some("0")
//! );
//!
//! let copy = tree.clone();
//! let d = arbor::diff(Some(&tree), Some(&copy), &DiffOptions::default(), &mut diag).unwrap();
//! assert!(d.is_empty());
//! ```

mod tracing_macros;
pub(crate) use tracing_macros::{debug, trace};

pub mod diag;
pub mod diff;
pub mod error;
pub mod intern;
pub mod merge;
pub mod path;
pub mod schema;
pub mod tree;
pub mod validate;

pub use bough::indextree::NodeId;

pub use diag::{Diagnostic, Diagnostics, Level};
pub use diff::{Diff, DiffOp, DiffOptions, diff, diff_nodes};
pub use error::{Error, ErrorClass, ValidationError, ValidationKind};
pub use merge::{MergeOptions, merge, merge_into};
pub use path::DataPath;
pub use schema::{Context, ContextBuilder, SchemaId};
pub use tree::{AnyValue, DataTree, NodeFlags, NodeKind, TreeOptions, Validity};
pub use validate::{
    AlwaysTrue, ValidationMode, ValidationOptions, WhenContext, WhenEvaluator, validate,
};
