use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec;
use alloc::vec::Vec;

use tracing::{debug, instrument};

use super::ir::{LoweredBody, LoweredProgram, Node, Poly, Value};
use crate::CircuitField;

/// Responsible for performing optimization passes on lowered bodies.
///
/// Passes, per body:
/// - dead code elimination (calls whose outputs are never read are dropped)
/// - fusion: single-use polynomial nodes are substituted into their only consumer, and a
///   single-use linear factor of a product is distributed over the product, as long as the
///   fused node needs at most `compress_threshold` gates
/// - dead code elimination of the nodes fusion made unreachable
#[derive(Debug, Clone, Copy)]
pub struct Optimizer {
    compress_threshold: usize,
}

impl Optimizer {
    /// Creates a new optimizer.
    pub const fn new(compress_threshold: usize) -> Self {
        Self { compress_threshold }
    }

    /// Optimizes every body of the program.
    #[instrument(skip_all, fields(compress_threshold = self.compress_threshold))]
    pub fn optimize<F: CircuitField>(&self, program: LoweredProgram<F>) -> LoweredProgram<F> {
        let LoweredProgram { subs, root } = program;
        LoweredProgram {
            subs: subs.into_iter().map(|body| self.optimize_body(body)).collect(),
            root: self.optimize_body(root),
        }
    }

    fn optimize_body<F: CircuitField>(&self, body: LoweredBody<F>) -> LoweredBody<F> {
        let before = body.nodes.len();
        let mut body = eliminate_dead_code(body);
        fuse(&mut body, self.compress_threshold);
        let body = eliminate_dead_code(body);
        debug!(before, after = body.nodes.len(), "optimized body");
        body
    }
}

/// Drops nodes that no output depends on and renumbers the survivors in order.
fn eliminate_dead_code<F: CircuitField>(body: LoweredBody<F>) -> LoweredBody<F> {
    let mut live = vec![false; body.nodes.len()];
    for node in body.outputs.iter().filter_map(|v| v.node()) {
        live[node as usize] = true;
    }
    for idx in (0..body.nodes.len()).rev() {
        if live[idx] {
            for node in body.nodes[idx].refs().into_iter().filter_map(Value::node) {
                live[node as usize] = true;
            }
        }
    }

    let mut remap = vec![0u32; body.nodes.len()];
    let mut next = 0u32;
    for (idx, &alive) in live.iter().enumerate() {
        if alive {
            remap[idx] = next;
            next += 1;
        }
    }
    let f = |node: u32| remap[node as usize];

    let nodes = body
        .nodes
        .into_iter()
        .zip(&live)
        .filter(|&(_, &alive)| alive)
        .map(|(node, _)| match node {
            Node::Poly(poly) => Node::Poly(poly.remap(f)),
            Node::Call {
                sub,
                args,
                num_outputs,
            } => Node::Call {
                sub,
                args: args.into_iter().map(|v| v.remap(f)).collect(),
                num_outputs,
            },
        })
        .collect();

    LoweredBody {
        num_inputs: body.num_inputs,
        nodes,
        outputs: body.outputs.into_iter().map(|v| v.remap(f)).collect(),
        num_user_outputs: body.num_user_outputs,
    }
}

/// Occurrences of each polynomial node in `poly`.
fn node_occurrences<F: CircuitField>(poly: &Poly<F>) -> BTreeMap<u32, u32> {
    let mut counts = BTreeMap::new();
    for value in poly.refs() {
        if let Value::Node(node) = value {
            *counts.entry(node).or_insert(0) += 1;
        }
    }
    counts
}

fn fuse<F: CircuitField>(body: &mut LoweredBody<F>, threshold: usize) {
    let mut uses = vec![0u32; body.nodes.len()];
    let all_refs = body
        .nodes
        .iter()
        .flat_map(Node::refs)
        .chain(body.outputs.iter().copied());
    for value in all_refs {
        if let Value::Node(node) = value {
            uses[node as usize] += 1;
        }
    }

    for idx in 0..body.nodes.len() {
        let Node::Poly(poly) = &body.nodes[idx] else {
            continue;
        };
        let mut poly = poly.clone();
        let mut rejected = BTreeSet::new();

        while let Some((candidate, fused)) = next_fusion(&body.nodes, &uses, &poly, &rejected) {
            if fused.term_count() > threshold {
                rejected.insert(candidate);
                continue;
            }
            let Node::Poly(inlined) = &body.nodes[candidate as usize] else {
                break;
            };
            let before = node_occurrences(&poly);
            let inlined = node_occurrences(inlined);
            let after = node_occurrences(&fused);
            for (&node, &count) in before.iter().chain(&inlined) {
                uses[node as usize] = uses[node as usize].saturating_sub(count);
            }
            for (&node, &count) in &after {
                uses[node as usize] += count;
            }
            poly = fused;
        }

        body.nodes[idx] = Node::Poly(poly);
    }
}

/// Finds the first single-use polynomial operand of `poly` that can be fused, in operand
/// order, and returns it with the fused polynomial.
fn next_fusion<F: CircuitField>(
    nodes: &[Node<F>],
    uses: &[u32],
    poly: &Poly<F>,
    rejected: &BTreeSet<u32>,
) -> Option<(u32, Poly<F>)> {
    let single_use_poly = |value: Value| match value {
        Value::Node(node) if uses[node as usize] == 1 && !rejected.contains(&node) => {
            match &nodes[node as usize] {
                Node::Poly(inner) => Some((node, inner)),
                Node::Call { .. } => None,
            }
        }
        _ => None,
    };

    for (&value, &coef) in &poly.linear {
        if let Some((node, inner)) = single_use_poly(value) {
            let mut fused = poly.clone();
            fused.linear.remove(&value);
            fused.add_scaled(inner, coef);
            return Some((node, fused));
        }
    }

    for (&(lhs, rhs), &coef) in &poly.quadratic {
        if lhs == rhs {
            continue;
        }
        for (factor, other) in [(lhs, rhs), (rhs, lhs)] {
            if let Some((node, inner)) = single_use_poly(factor)
                && inner.is_linear()
            {
                let mut fused = poly.clone();
                fused.quadratic.remove(&(lhs, rhs));
                fused.add_scaled_product(inner, other, coef);
                return Some((node, fused));
            }
        }
    }
    None
}
