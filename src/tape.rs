//! Reverse-mode propagation over the graph reachable from a root node.
//!
//! The ordering is computed once, lazily, by an explicit-stack depth-first
//! postorder walk, so neither ordering nor propagation recurses per node.

use log::debug;
use once_cell::unsync::OnceCell;
use std::collections::{HashMap, HashSet};

use crate::backwards::{Node, Var};

pub struct Tape {
    root: Var,
    // Reverse-topological: the root first, every node before its operands.
    order: OnceCell<Vec<Var>>,
}

impl Tape {
    pub fn new(root: &Var) -> Tape {
        Tape {
            root: root.clone(),
            order: OnceCell::new(),
        }
    }

    /// Every node reachable from the root, each exactly once, root first.
    pub fn nodes(&self) -> &[Var] {
        self.order.get_or_init(|| reverse_topological(&self.root))
    }

    pub fn backward(&self) {
        self.backward_with_seed(1.0);
    }

    /// Adds `seed` times the derivative of the root to every reachable node.
    ///
    /// Contributions arriving over several paths are summed in a scratch
    /// buffer first and then added once to the node's accumulated derivative.
    /// Nothing is cleared beforehand; call [`Tape::reset`] between
    /// independent computations.
    pub fn backward_with_seed(&self, seed: f64) {
        let nodes = self.nodes();
        debug!("backward over {} nodes with seed {}", nodes.len(), seed);

        let index: HashMap<*const Node, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, var)| (var.key(), i))
            .collect();
        let mut pending = vec![0.0; nodes.len()];
        pending[0] = seed;

        for (i, var) in nodes.iter().enumerate() {
            let grad = pending[i];
            var.accumulate(grad);
            for (operand, local) in var.operands().iter().zip(var.local_grads()) {
                // Operands always sit after their users in the ordering.
                pending[index[&operand.key()]] += grad * local;
            }
        }
    }

    /// Zeroes the accumulated derivative of every reachable node.
    pub fn reset(&self) {
        let nodes = self.nodes();
        debug!("reset {} nodes", nodes.len());
        for var in nodes {
            var.zero_grad();
        }
    }

    /// Reads the accumulated derivatives of `inputs`, in order.
    pub fn gradients(&self, inputs: &[Var]) -> Vec<f64> {
        inputs.iter().map(Var::grad).collect()
    }
}

fn reverse_topological(root: &Var) -> Vec<Var> {
    let mut visited: HashSet<*const Node> = HashSet::new();
    let mut postorder = Vec::new();
    // (node, operands already scheduled)
    let mut stack = vec![(root.clone(), false)];

    while let Some((var, expanded)) = stack.pop() {
        if expanded {
            postorder.push(var);
            continue;
        }
        if !visited.insert(var.key()) {
            continue;
        }
        let operands: Vec<Var> = var
            .operands()
            .iter()
            .filter(|op| !visited.contains(&op.key()))
            .cloned()
            .collect();
        stack.push((var, true));
        stack.extend(operands.into_iter().map(|op| (op, false)));
    }

    postorder.reverse();
    debug!("ordered {} nodes", postorder.len());
    postorder
}
