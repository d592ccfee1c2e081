//! Move planning for explicitly-ordered sibling groups.
//!
//! The planner works on positions only. Element identity is the element's
//! *target* position, so callers map results back to their own nodes through
//! the order they passed in.

use crate::{debug, trace};

/// One planned single-element move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexMove {
    /// Target position of the moved element (its identity).
    pub element: usize,
    /// Position the element is taken from, in the order before this move.
    pub from: usize,
    /// Position the element ends up at, in the order after this move.
    pub to: usize,
    /// Identity of the element it now follows, `None` when it becomes first.
    pub after: Option<usize>,
}

/// Errors reported by [`plan_moves`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// The input is not a permutation of `0..len`.
    #[error("targets are not a permutation: position {position} maps to {target}")]
    NotAPermutation {
        /// Offending current position
        position: usize,
        /// Its target
        target: usize,
    },
}

/// Plan the moves that reorder a group into its target order.
///
/// `targets[i]` is the final position of the element currently at `i`.
pub fn plan_moves(targets: &[usize]) -> Result<Vec<IndexMove>, PlanError> {
    check_permutation(targets)?;

    let len = targets.len();
    let mut current: Vec<usize> = targets.to_vec();
    let mut moves = Vec::new();

    // Each round settles one element; the cap only guards the greedy order.
    let cap = len.saturating_mul(len).max(1);
    let mut rounds = 0;
    while rounds < cap {
        rounds += 1;
        let Some((from, to)) = largest_displacement(&current) else {
            debug!(moves = moves.len(), "move planning converged");
            return Ok(moves);
        };
        moves.push(apply_move(&mut current, from, to));
    }

    // Greedy did not converge in time: settle the rest left to right.
    debug!(moves = moves.len(), "move planning falling back to sequential settle");
    for to in 0..len {
        let from = current.iter().position(|&t| t == to).unwrap_or(to);
        if from != to {
            moves.push(apply_move(&mut current, from, to));
        }
    }
    Ok(moves)
}

fn check_permutation(targets: &[usize]) -> Result<(), PlanError> {
    let mut seen = vec![false; targets.len()];
    for (position, &target) in targets.iter().enumerate() {
        match seen.get_mut(target) {
            Some(slot) if !*slot => *slot = true,
            _ => return Err(PlanError::NotAPermutation { position, target }),
        }
    }
    Ok(())
}

/// Current position and target of the element with the largest displacement.
fn largest_displacement(current: &[usize]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, usize)> = None;
    for (position, &target) in current.iter().enumerate() {
        let magnitude = position.abs_diff(target);
        if magnitude == 0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_mag, _, best_target)) => {
                magnitude > best_mag || (magnitude == best_mag && target < best_target)
            }
        };
        if better {
            best = Some((magnitude, position, target));
        }
    }
    best.map(|(_, position, target)| (position, target))
}

fn apply_move(current: &mut Vec<usize>, from: usize, to: usize) -> IndexMove {
    let element = current.remove(from);
    current.insert(to, element);
    let after = to.checked_sub(1).map(|prev| current[prev]);
    trace!(element, from, to, ?after, "planned move");
    IndexMove {
        element,
        from,
        to,
        after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(mut order: Vec<char>, moves: &[IndexMove]) -> Vec<char> {
        for m in moves {
            let c = order.remove(m.from);
            order.insert(m.to, c);
        }
        order
    }

    #[test]
    fn test_identity_needs_no_moves() {
        assert!(plan_moves(&[0, 1, 2, 3]).unwrap().is_empty());
        assert!(plan_moves(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_rotate_left_is_one_move() {
        // [a, b, c] -> [b, c, a]
        let moves = plan_moves(&[2, 0, 1]).unwrap();
        assert_eq!(
            moves,
            vec![IndexMove {
                element: 2,
                from: 0,
                to: 2,
                after: Some(1),
            }]
        );
    }

    #[test]
    fn test_rotate_right_is_one_move() {
        // [a, b, c] -> [c, a, b]
        let moves = plan_moves(&[1, 2, 0]).unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].after, None);
        assert_eq!(replay(vec!['a', 'b', 'c'], &moves), vec!['c', 'a', 'b']);
    }

    #[test]
    fn test_reversal_converges() {
        // [a, b, c, d, e] -> [e, d, c, b, a]
        let moves = plan_moves(&[4, 3, 2, 1, 0]).unwrap();
        assert_eq!(moves.len(), 4);
        assert_eq!(
            replay(vec!['a', 'b', 'c', 'd', 'e'], &moves),
            vec!['e', 'd', 'c', 'b', 'a']
        );
    }

    #[test]
    fn test_ties_prefer_smaller_target() {
        // [a, b, c, d] -> [b, a, d, c]: all displacements are 1
        let moves = plan_moves(&[1, 0, 3, 2]).unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].element, 0);
        assert_eq!(moves[1].element, 2);
        assert_eq!(
            replay(vec!['a', 'b', 'c', 'd'], &moves),
            vec!['b', 'a', 'd', 'c']
        );
    }

    #[test]
    fn test_every_permutation_of_five_converges() {
        fn permutations(items: Vec<usize>) -> Vec<Vec<usize>> {
            if items.len() <= 1 {
                return vec![items];
            }
            let mut out = Vec::new();
            for i in 0..items.len() {
                let mut rest = items.clone();
                let head = rest.remove(i);
                for mut tail in permutations(rest) {
                    tail.insert(0, head);
                    out.push(tail);
                }
            }
            out
        }

        for perm in permutations((0..5).collect()) {
            let moves = plan_moves(&perm).unwrap();
            let mut order = perm.clone();
            for m in &moves {
                let e = order.remove(m.from);
                order.insert(m.to, e);
            }
            assert_eq!(order, vec![0, 1, 2, 3, 4], "permutation {perm:?}");
        }
    }

    #[test]
    fn test_rejects_non_permutation() {
        assert_eq!(
            plan_moves(&[0, 0]),
            Err(PlanError::NotAPermutation {
                position: 1,
                target: 0
            })
        );
        assert!(plan_moves(&[3]).is_err());
    }
}
