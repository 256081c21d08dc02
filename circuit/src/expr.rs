use alloc::vec::Vec;

use crate::types::{ExprId, SubCircuitId};

/// Expression DAG for field operations
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr<F> {
    /// Constant field element
    Const(F),
    /// Circuit (or sub-circuit) input at declaration position
    Input(usize),
    /// Addition of two expressions
    Add { lhs: ExprId, rhs: ExprId },
    /// Subtraction of two expressions
    Sub { lhs: ExprId, rhs: ExprId },
    /// Multiplication of two expressions
    Mul { lhs: ExprId, rhs: ExprId },
    /// Invocation of a memoized sub-circuit body with flattened arguments
    Call { sub: SubCircuitId, args: Vec<ExprId> },
    /// The `output_idx`-th user output of a `Call` node
    CallOutput { call: ExprId, output_idx: u32 },
}

/// Graph for storing expression DAG nodes
#[derive(Debug, Clone)]
pub struct ExpressionGraph<F> {
    nodes: Vec<Expr<F>>,
}

impl<F> ExpressionGraph<F> {
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add an expression to the graph, returning its ID
    pub fn add_expr(&mut self, expr: Expr<F>) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(expr);
        id
    }

    /// Get an expression by ID
    pub fn get_expr(&self, id: ExprId) -> &Expr<F> {
        &self.nodes[id.0 as usize]
    }

    /// Whether `id` refers to a node of this graph.
    pub const fn contains(&self, id: ExprId) -> bool {
        (id.0 as usize) < self.nodes.len()
    }

    pub const fn len(&self) -> usize {
        self.nodes.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get all nodes in the graph
    pub fn nodes(&self) -> &[Expr<F>] {
        &self.nodes
    }
}

impl<F> Default for ExpressionGraph<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    // Mock field element for testing
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct MockField(u64);

    #[test]
    fn test_expression_graph() {
        let mut graph = ExpressionGraph::<MockField>::new();
        assert!(graph.is_empty());

        let const_expr = Expr::Const(MockField(42));
        let input_expr = Expr::Input(0);

        let const_id = graph.add_expr(const_expr.clone());
        let input_id = graph.add_expr(input_expr.clone());

        assert_eq!(const_id, ExprId::ZERO);
        assert_eq!(input_id, ExprId(1));

        assert_eq!(graph.get_expr(const_id), &const_expr);
        assert_eq!(graph.get_expr(input_id), &input_expr);

        let call = Expr::Call {
            sub: SubCircuitId(0),
            args: vec![const_id, input_id],
        };
        let call_id = graph.add_expr(call.clone());
        assert_eq!(graph.get_expr(call_id), &call);
        assert_eq!(graph.len(), 3);
        assert!(graph.contains(call_id));
        assert!(!graph.contains(ExprId(3)));
    }
}
