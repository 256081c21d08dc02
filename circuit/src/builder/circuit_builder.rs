use alloc::format;
use alloc::vec::Vec;
use core::mem;

use itertools::zip_eq;
use tracing::debug;

use super::ExpressionBuilder;
use super::memo::{Body, MemoizationKey, SubCircuit, SubCircuitRegistry};
use crate::expr::ExpressionGraph;
use crate::types::ExprId;
use crate::variable::{Assignment, Variable};
use crate::{CircuitBuilderError, CircuitField};

/// Builder for constructing circuits.
///
/// The same type builds the root circuit and every memoized sub-circuit body; a body is
/// built in a child builder that temporarily owns the shared sub-circuit registry.
pub struct CircuitBuilder<F: CircuitField> {
    /// Expression graph builder
    expr_builder: ExpressionBuilder<F>,

    /// Number of input positions handed out so far
    input_count: usize,

    /// Memoized bodies shared by the root and all nested bodies
    registry: SubCircuitRegistry<F>,

    /// Names of the gadgets currently being built, outermost first
    scope_stack: Vec<&'static str>,
}

/// The result of building: the root body and every sub-circuit it reaches.
#[derive(Debug, Clone)]
pub struct BuiltCircuit<F> {
    pub root: Body<F>,
    pub sub_circuits: SubCircuitRegistry<F>,
}

impl<F: CircuitField> Default for CircuitBuilder<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: CircuitField> CircuitBuilder<F> {
    /// Creates a new circuit builder.
    pub fn new() -> Self {
        Self::with_registry(SubCircuitRegistry::default())
    }

    fn with_registry(registry: SubCircuitRegistry<F>) -> Self {
        Self {
            expr_builder: ExpressionBuilder::new(),
            input_count: 0,
            registry,
            scope_stack: Vec::new(),
        }
    }

    /// Adds an unconstrained input to the circuit.
    pub fn add_input(&mut self) -> ExprId {
        let pos = self.input_count;
        self.input_count += 1;
        self.expr_builder.add_input(pos)
    }

    /// Allocates `count` consecutive inputs.
    pub fn alloc_inputs(&mut self, count: usize) -> Vec<ExprId> {
        (0..count).map(|_| self.add_input()).collect()
    }

    /// Allocates a fixed-size array of consecutive inputs.
    pub fn alloc_input_array<const N: usize>(&mut self) -> [ExprId; N] {
        core::array::from_fn(|_| self.add_input())
    }

    /// Returns the current input count.
    pub const fn input_count(&self) -> usize {
        self.input_count
    }

    /// Binds a placeholder to a wire of this builder and returns it.
    ///
    /// Free variables become the next input, assigned ones a pooled constant.
    pub fn bind(&mut self, var: &mut Variable<F>) -> ExprId {
        let expr = match var.assignment() {
            Assignment::Free => self.add_input(),
            Assignment::Constant(val) => self.add_const(*val),
        };
        var.set_bound(expr);
        expr
    }

    /// Binds every placeholder of `vars` in order.
    pub fn bind_all<'a>(&mut self, vars: impl IntoIterator<Item = &'a mut Variable<F>>) {
        for var in vars {
            self.bind(var);
        }
    }

    /// Adds a constant to the circuit (deduplicated).
    pub fn add_const(&mut self, val: F) -> ExprId {
        self.expr_builder.add_const(val)
    }

    /// Adds two expressions.
    pub fn add(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.expr_builder.add_add(lhs, rhs)
    }

    /// Subtracts two expressions.
    pub fn sub(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.expr_builder.add_sub(lhs, rhs)
    }

    /// Multiplies two expressions.
    pub fn mul(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.expr_builder.add_mul(lhs, rhs)
    }

    /// Negates an expression.
    pub fn neg(&mut self, x: ExprId) -> ExprId {
        self.sub(ExprId::ZERO, x)
    }

    /// Multiplies an expression by a constant.
    pub fn mul_const(&mut self, x: ExprId, c: F) -> ExprId {
        let c = self.add_const(c);
        self.mul(x, c)
    }

    /// Computes `a * b + c`.
    pub fn mul_add(&mut self, a: ExprId, b: ExprId, c: ExprId) -> ExprId {
        let product = self.mul(a, b);
        self.add(product, c)
    }

    /// Raises `base` to a constant power by square-and-multiply.
    ///
    /// Cost: `floor(log2(exp))` squarings plus one multiplication per extra set bit.
    pub fn exp_u64(&mut self, base: ExprId, exp: u64) -> ExprId {
        if exp == 0 {
            return self.add_const(F::ONE);
        }
        let mut acc = base;
        for bit in (0..exp.ilog2()).rev() {
            acc = self.mul(acc, acc);
            if (exp >> bit) & 1 == 1 {
                acc = self.mul(acc, base);
            }
        }
        acc
    }

    /// Computes the inner product `∑ a[i] · b[i]`.
    ///
    /// # Panics
    /// Panics if the input slices have different lengths.
    pub fn inner_product(&mut self, a: &[ExprId], b: &[ExprId]) -> ExprId {
        zip_eq(a, b).fold(ExprId::ZERO, |acc, (&x, &y)| self.mul_add(x, y, acc))
    }

    /// Computes `∑ coeffs[i] · xs[i]` for constant coefficients.
    ///
    /// # Panics
    /// Panics if the input slices have different lengths.
    pub fn linear_combination(&mut self, coeffs: &[F], xs: &[ExprId]) -> ExprId {
        zip_eq(coeffs, xs).fold(ExprId::ZERO, |acc, (&c, &x)| {
            let term = self.mul_const(x, c);
            self.add(acc, term)
        })
    }

    /// Asserts that an expression equals zero.
    pub fn assert_zero(&mut self, expr: ExprId) {
        self.expr_builder.assert_zero(expr);
    }

    /// Asserts that two expressions are equal.
    pub fn assert_eq(&mut self, a: ExprId, b: ExprId) {
        let diff = self.sub(a, b);
        self.assert_zero(diff);
    }

    /// Pushes a named scope; memoized bodies registered inside it log the scope path.
    pub fn push_scope(&mut self, scope: &'static str) {
        self.scope_stack.push(scope);
    }

    /// Pops the innermost scope.
    pub fn pop_scope(&mut self) -> Result<(), CircuitBuilderError> {
        self.scope_stack
            .pop()
            .map(|_| ())
            .ok_or(CircuitBuilderError::ScopeUnderflow)
    }

    pub fn scopes(&self) -> &[&'static str] {
        &self.scope_stack
    }

    pub const fn graph(&self) -> &ExpressionGraph<F> {
        self.expr_builder.graph()
    }

    pub const fn sub_circuits(&self) -> &SubCircuitRegistry<F> {
        &self.registry
    }

    pub fn asserts(&self) -> &[ExprId] {
        self.expr_builder.asserts()
    }

    fn check_owned(&self, exprs: &[ExprId], context: &str) -> Result<(), CircuitBuilderError> {
        match exprs.iter().find(|&&e| !self.graph().contains(e)) {
            Some(&expr_id) => Err(CircuitBuilderError::ForeignExpr {
                expr_id,
                context: context.into(),
            }),
            None => Ok(()),
        }
    }

    /// Emits a call to the body memoized under `key`, building the body first on a miss.
    pub(crate) fn call_memoized<B>(
        &mut self,
        key: MemoizationKey,
        args: &[Vec<ExprId>],
        build: &B,
    ) -> Result<Vec<ExprId>, CircuitBuilderError>
    where
        B: Fn(&mut Self, &[Vec<ExprId>]) -> Result<Vec<ExprId>, CircuitBuilderError>,
    {
        let flat_args: Vec<ExprId> = args.iter().flatten().copied().collect();
        self.check_owned(&flat_args, &format!("argument of {key}"))?;

        let sub = match self.registry.lookup(&key) {
            Some(sub) => sub,
            None => {
                let mut child = Self::with_registry(mem::take(&mut self.registry));
                child.scope_stack = self.scope_stack.clone();
                let inputs: Vec<Vec<ExprId>> = key
                    .input_shape
                    .iter()
                    .map(|&len| child.alloc_inputs(len))
                    .collect();
                let outputs = build(&mut child, &inputs);
                let checked = outputs.and_then(|outputs| {
                    child.check_owned(&outputs, &format!("output of {key}"))?;
                    Ok(outputs)
                });
                let (body, registry) = child.into_body(Vec::new());
                self.registry = registry;
                let outputs = checked?;

                debug!(
                    key = %key,
                    scope = ?self.scope_stack,
                    nodes = body.graph.len(),
                    asserts = body.asserts.len(),
                    "registered memoized sub-circuit"
                );
                self.registry.register(SubCircuit {
                    key,
                    body: Body { outputs, ..body },
                })?
            }
        };

        let num_outputs = self
            .registry
            .get(sub)
            .map_or(0, |registered| registered.body.outputs.len());
        let (_call, outputs) = self.expr_builder.add_call(sub, flat_args, num_outputs);
        Ok(outputs)
    }

    fn into_body(self, outputs: Vec<ExprId>) -> (Body<F>, SubCircuitRegistry<F>) {
        let (graph, asserts) = self.expr_builder.into_parts();
        (
            Body {
                graph,
                num_inputs: self.input_count,
                outputs,
                asserts,
            },
            self.registry,
        )
    }

    /// Finishes construction of the root circuit.
    pub fn build(self) -> BuiltCircuit<F> {
        let (root, sub_circuits) = self.into_body(Vec::new());
        BuiltCircuit { root, sub_circuits }
    }
}
