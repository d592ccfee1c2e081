//! # Bough
//!
//! Sibling alignment primitives for arena-backed trees.
//!
//! A bough is the branch siblings hang from. This crate knows nothing about
//! schemas or values: it records which node of one tree corresponds to which
//! node of another, and it plans the single-element moves that reorder an
//! explicitly-ordered sibling group from one order into another.
//!
//! ## Move planning
//!
//! Given a permutation (element at current position `i` must end up at
//! `targets[i]`), [`plan_moves`] repeatedly picks the element with the largest
//! displacement, moves it to its target, and re-derives every remaining
//! displacement as if the move had been applied. Ties go to the element with
//! the smaller target position. The loop ends when every displacement is zero.
//!
//! ```
//! use bough::plan_moves;
//!
//! // [a, b, c] -> [b, c, a]: a is displaced by +2, b and c by -1
//! let moves = plan_moves(&[2, 0, 1]).unwrap();
//! assert_eq!(moves.len(), 1);
//! assert_eq!((moves[0].from, moves[0].to), (0, 2));
//! ```

#![warn(missing_docs)]
#![warn(clippy::std_instead_of_core)]

pub use indextree;

mod tracing_macros;
pub(crate) use tracing_macros::{debug, trace};

/// Correspondence between the nodes of two arenas
pub mod matching;
/// Largest-displacement-first move planning
pub mod moves;

pub use matching::Matching;
pub use moves::{IndexMove, PlanError, plan_moves};
