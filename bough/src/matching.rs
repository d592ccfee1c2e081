//! Node correspondence between two arenas.
//!
//! Ids from the two sides are never mixed up: every query names the side it
//! asks about. Matching is one-to-one, and a node keeps the partner it was
//! first paired with.

use indextree::NodeId;
use rapidhash::RapidHashMap;

use crate::trace;

/// One-to-one pairing of "first" tree nodes with "second" tree nodes.
#[derive(Debug, Default, Clone)]
pub struct Matching {
    forward: RapidHashMap<NodeId, NodeId>,
    backward: RapidHashMap<NodeId, NodeId>,
}

impl Matching {
    /// Create an empty matching.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty matching with room for the given node counts.
    pub fn with_capacity(first_len: usize, second_len: usize) -> Self {
        let mut m = Self::default();
        m.forward.reserve(first_len.min(second_len));
        m.backward.reserve(first_len.min(second_len));
        m
    }

    /// Pair `first` with `second`. Refused when either is already paired.
    pub fn pair(&mut self, first: NodeId, second: NodeId) -> bool {
        if self.forward.contains_key(&first) || self.backward.contains_key(&second) {
            return false;
        }
        self.forward.insert(first, second);
        self.backward.insert(second, first);
        true
    }

    /// Partner of a first-tree node.
    pub fn second_of(&self, first: NodeId) -> Option<NodeId> {
        self.forward.get(&first).copied()
    }

    /// Partner of a second-tree node.
    pub fn first_of(&self, second: NodeId) -> Option<NodeId> {
        self.backward.get(&second).copied()
    }

    /// Whether a first-tree node is paired.
    pub fn is_first_matched(&self, first: NodeId) -> bool {
        self.forward.contains_key(&first)
    }

    /// Whether a second-tree node is paired.
    pub fn is_second_matched(&self, second: NodeId) -> bool {
        self.backward.contains_key(&second)
    }

    /// Align one sibling group.
    ///
    /// `first_group` is the group in first-tree order, `second_group` the
    /// matched members in second-tree order. The result holds, for every
    /// first-tree member whose partner is in `second_group`, that partner's
    /// position, in first-tree order. It is a permutation of
    /// `0..second_group.len()` exactly when both sides pair the same nodes,
    /// which is the input [`crate::plan_moves`] expects.
    pub fn group_targets(
        &self,
        first_group: impl IntoIterator<Item = NodeId>,
        second_group: &[NodeId],
    ) -> Vec<usize> {
        let position: RapidHashMap<NodeId, usize> = second_group
            .iter()
            .enumerate()
            .map(|(i, &s)| (s, i))
            .collect();
        let targets: Vec<usize> = first_group
            .into_iter()
            .filter_map(|f| self.second_of(f))
            .filter_map(|s| position.get(&s).copied())
            .collect();
        trace!(group = second_group.len(), aligned = targets.len(), "group targets");
        targets
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// True when nothing is paired.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indextree::Arena;

    #[test]
    fn test_pairing_is_one_to_one() {
        let mut first: Arena<u8> = Arena::new();
        let mut second: Arena<u8> = Arena::new();
        let a = first.new_node(1);
        let b = first.new_node(2);
        let x = second.new_node(1);

        let mut matching = Matching::with_capacity(2, 1);
        assert!(matching.pair(a, x));
        assert!(!matching.pair(b, x), "second-tree node already taken");
        assert!(!matching.pair(a, x));
        assert_eq!(matching.second_of(a), Some(x));
        assert_eq!(matching.first_of(x), Some(a));
        assert!(!matching.is_first_matched(b));
        assert_eq!(matching.len(), 1);
    }

    #[test]
    fn test_group_targets_follow_first_order() {
        let mut first: Arena<&str> = Arena::new();
        let mut second: Arena<&str> = Arena::new();
        let (fa, fb, fc, fd) = (
            first.new_node("a"),
            first.new_node("b"),
            first.new_node("c"),
            first.new_node("d"),
        );
        let (sb, sc, sa) = (second.new_node("b"), second.new_node("c"), second.new_node("a"));

        let mut matching = Matching::new();
        matching.pair(fa, sa);
        matching.pair(fb, sb);
        matching.pair(fc, sc);

        // d is unmatched and drops out
        let targets = matching.group_targets([fa, fb, fc, fd], &[sb, sc, sa]);
        assert_eq!(targets, vec![2, 0, 1]);
        assert_eq!(crate::plan_moves(&targets).unwrap().len(), 1);
    }
}
