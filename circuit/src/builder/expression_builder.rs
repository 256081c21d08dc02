//! Expression graph construction and constant pooling.
//!
//! The [`ExpressionBuilder`] is the layer for building arithmetic circuits.
//!
//! It manages a directed acyclic graph (DAG) of expressions where
//! - nodes represent field operations or sub-circuit calls,
//! - edges represent dependencies between expressions.

use alloc::vec::Vec;
use core::hash::Hash;

use hashbrown::HashMap;
use p3_field::PrimeCharacteristicRing;

use crate::expr::{Expr, ExpressionGraph};
use crate::types::{ExprId, SubCircuitId};

/// Manages expression graph construction, constant pooling, and assertion bookkeeping.
///
/// Each node in the graph represents a field operation or a special value
/// (constant, input, call output).
#[derive(Debug)]
pub struct ExpressionBuilder<F> {
    /// The underlying expression graph storage.
    ///
    /// The graph is append-only: once an expression is added, it never moves or gets
    /// removed, ensuring stable handles.
    graph: ExpressionGraph<F>,

    /// Constant deduplication pool.
    ///
    /// Maps field values to their unique [`ExprId`] in the graph.
    const_pool: HashMap<F, ExprId>,

    /// Expressions that must evaluate to zero, in assertion order.
    asserts: Vec<ExprId>,
}

impl<F> ExpressionBuilder<F>
where
    F: Clone + PrimeCharacteristicRing + Eq + Hash,
{
    #[inline]
    fn const_value(&self, id: ExprId) -> Option<&F> {
        match self.graph.get_expr(id) {
            Expr::Const(val) => Some(val),
            _ => None,
        }
    }

    #[inline]
    fn is_const(&self, id: ExprId, val: &F) -> bool {
        self.const_value(id) == Some(val)
    }

    /// Creates a new expression builder with zero constant pre-allocated.
    ///
    /// The zero constant is always the first node in the graph, accessible via
    /// [`ExprId::ZERO`].
    pub fn new() -> Self {
        let mut graph = ExpressionGraph::new();
        let zero_id = graph.add_expr(Expr::Const(F::ZERO));
        let const_pool = [(F::ZERO, zero_id)].into();

        Self {
            graph,
            const_pool,
            asserts: Vec::new(),
        }
    }

    /// Adds a constant to the expression graph with automatic deduplication.
    ///
    /// If this constant value was previously added, returns the existing [`ExprId`]
    /// handle instead of creating a duplicate node.
    pub fn add_const(&mut self, val: F) -> ExprId {
        if let Some(&cached_id) = self.const_pool.get(&val) {
            return cached_id;
        }

        let expr_id = self.graph.add_expr(Expr::Const(val.clone()));
        self.const_pool.insert(val, expr_id);
        expr_id
    }

    /// Adds an input expression to the graph.
    ///
    /// Inputs are not deduplicated: `pos` is handed out once by the circuit builder.
    pub fn add_input(&mut self, pos: usize) -> ExprId {
        self.graph.add_expr(Expr::Input(pos))
    }

    /// Adds `lhs + rhs`, folding constants and the additive identity.
    pub fn add_add(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        if let (Some(a), Some(b)) = (self.const_value(lhs), self.const_value(rhs)) {
            let sum = a.clone() + b.clone();
            return self.add_const(sum);
        }
        // x + 0 = x, 0 + x = x
        if self.is_const(lhs, &F::ZERO) {
            return rhs;
        }
        if self.is_const(rhs, &F::ZERO) {
            return lhs;
        }

        self.graph.add_expr(Expr::Add { lhs, rhs })
    }

    /// Adds `lhs - rhs`, folding constants, `x - 0` and `x - x`.
    pub fn add_sub(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        if let (Some(a), Some(b)) = (self.const_value(lhs), self.const_value(rhs)) {
            let diff = a.clone() - b.clone();
            return self.add_const(diff);
        }
        if self.is_const(rhs, &F::ZERO) {
            return lhs;
        }
        if lhs == rhs {
            return ExprId::ZERO;
        }

        self.graph.add_expr(Expr::Sub { lhs, rhs })
    }

    /// Adds `lhs * rhs`, folding constants and the multiplicative identities.
    pub fn add_mul(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        if let (Some(a), Some(b)) = (self.const_value(lhs), self.const_value(rhs)) {
            let prod = a.clone() * b.clone();
            return self.add_const(prod);
        }
        // x * 0 = 0, 0 * x = 0
        if self.is_const(lhs, &F::ZERO) || self.is_const(rhs, &F::ZERO) {
            return ExprId::ZERO;
        }
        // x * 1 = x, 1 * x = x
        if self.is_const(lhs, &F::ONE) {
            return rhs;
        }
        if self.is_const(rhs, &F::ONE) {
            return lhs;
        }

        self.graph.add_expr(Expr::Mul { lhs, rhs })
    }

    /// Adds a call node and one output node per user output of the callee.
    pub fn add_call(
        &mut self,
        sub: SubCircuitId,
        args: Vec<ExprId>,
        num_outputs: usize,
    ) -> (ExprId, Vec<ExprId>) {
        let call = self.graph.add_expr(Expr::Call { sub, args });
        let outputs = (0..num_outputs)
            .map(|i| {
                self.graph.add_expr(Expr::CallOutput {
                    call,
                    output_idx: i as u32,
                })
            })
            .collect();
        (call, outputs)
    }

    /// Records that `expr` must evaluate to zero.
    ///
    /// Asserting the zero constant is a no-op.
    pub fn assert_zero(&mut self, expr: ExprId) {
        if expr == ExprId::ZERO {
            return;
        }
        self.asserts.push(expr);
    }

    pub const fn graph(&self) -> &ExpressionGraph<F> {
        &self.graph
    }

    pub fn asserts(&self) -> &[ExprId] {
        &self.asserts
    }

    /// Consumes the builder, returning the graph and the asserted expressions.
    pub fn into_parts(self) -> (ExpressionGraph<F>, Vec<ExprId>) {
        (self.graph, self.asserts)
    }
}

impl<F> Default for ExpressionBuilder<F>
where
    F: Clone + PrimeCharacteristicRing + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
