use alloc::format;
use alloc::vec::Vec;

use tracing::instrument;

use super::ir::{LoweredBody, LoweredProgram, Node, Poly, Value};
use crate::builder::{Body, BuiltCircuit, CircuitBuilderError};
use crate::expr::Expr;
use crate::types::ExprId;
use crate::CircuitField;

/// What an expression lowered to.
#[derive(Debug, Clone, Copy)]
enum Lowered<F> {
    /// Folded into its consumers.
    Const(F),
    Value(Value),
    /// A call node; only its `CallOutput`s are values.
    Call(u32),
}

/// Responsible for lowering expression graphs to degree-2 polynomial nodes.
///
/// Sub-circuit bodies are lowered in registration order, so every callee is lowered before
/// its callers, then the root. A body's own assertions and the assertion outputs of every
/// call it makes become extra outputs after its user outputs.
#[derive(Debug)]
pub struct ExpressionLowerer<'a, F> {
    built: &'a BuiltCircuit<F>,
}

impl<'a, F: CircuitField> ExpressionLowerer<'a, F> {
    pub const fn new(built: &'a BuiltCircuit<F>) -> Self {
        Self { built }
    }

    /// Lowers every body of the circuit.
    #[instrument(skip_all, fields(sub_circuits = self.built.sub_circuits.len()))]
    pub fn lower(self) -> Result<LoweredProgram<F>, CircuitBuilderError> {
        let mut subs = Vec::with_capacity(self.built.sub_circuits.len());
        for sub in self.built.sub_circuits.bodies() {
            let lowered = lower_body(&sub.body, &subs)?;
            subs.push(lowered);
        }
        let root = lower_body(&self.built.root, &subs)?;
        Ok(LoweredProgram { subs, root })
    }
}

struct BodyLowerer<'a, F> {
    subs: &'a [LoweredBody<F>],
    num_inputs: usize,
    nodes: Vec<Node<F>>,
    lowered: Vec<Lowered<F>>,
    call_asserts: Vec<Value>,
}

fn lower_body<F: CircuitField>(
    body: &Body<F>,
    subs: &[LoweredBody<F>],
) -> Result<LoweredBody<F>, CircuitBuilderError> {
    let mut lowerer = BodyLowerer {
        subs,
        num_inputs: body.num_inputs,
        nodes: Vec::new(),
        lowered: Vec::with_capacity(body.graph.len()),
        call_asserts: Vec::new(),
    };
    for expr in body.graph.nodes() {
        let lowered = lowerer.lower_expr(expr)?;
        lowerer.lowered.push(lowered);
    }

    let mut outputs = Vec::with_capacity(body.outputs.len() + body.asserts.len());
    for &expr_id in body.outputs.iter().chain(&body.asserts) {
        let value = lowerer.materialize(expr_id, "output")?;
        outputs.push(value);
    }
    outputs.append(&mut lowerer.call_asserts);

    let num_inputs = u32::try_from(body.num_inputs).map_err(|_| {
        CircuitBuilderError::VariableCountOverflow {
            details: format!("{} body inputs", body.num_inputs),
        }
    })?;
    Ok(LoweredBody {
        num_inputs,
        nodes: lowerer.nodes,
        outputs,
        num_user_outputs: body.outputs.len(),
    })
}

impl<F: CircuitField> BodyLowerer<'_, F> {
    fn get(&self, expr_id: ExprId, context: &str) -> Result<Lowered<F>, CircuitBuilderError> {
        self.lowered
            .get(expr_id.0 as usize)
            .copied()
            .ok_or_else(|| CircuitBuilderError::MissingExprMapping {
                expr_id,
                context: context.into(),
            })
    }

    fn push_poly(&mut self, poly: Poly<F>) -> Lowered<F> {
        if let Some(value) = poly.as_constant() {
            return Lowered::Const(value);
        }
        self.nodes.push(Node::Poly(poly));
        Lowered::Value(Value::Node(self.nodes.len() as u32 - 1))
    }

    /// Returns `expr_id` as a value, emitting a constant node when it was folded.
    fn materialize(&mut self, expr_id: ExprId, context: &str) -> Result<Value, CircuitBuilderError> {
        match self.get(expr_id, context)? {
            Lowered::Value(value) => Ok(value),
            Lowered::Const(value) => {
                self.nodes.push(Node::Poly(Poly::constant(value)));
                Ok(Value::Node(self.nodes.len() as u32 - 1))
            }
            Lowered::Call(_) => Err(CircuitBuilderError::MissingExprMapping {
                expr_id,
                context: format!("{context} refers to a call node instead of its outputs"),
            }),
        }
    }

    fn operand(&self, expr_id: ExprId, context: &str) -> Result<Poly<F>, CircuitBuilderError> {
        match self.get(expr_id, context)? {
            Lowered::Const(value) => Ok(Poly::constant(value)),
            Lowered::Value(value) => Ok(Poly::var(value)),
            Lowered::Call(_) => Err(CircuitBuilderError::MissingExprMapping {
                expr_id,
                context: format!("{context} operand is a call node"),
            }),
        }
    }

    fn lower_expr(&mut self, expr: &Expr<F>) -> Result<Lowered<F>, CircuitBuilderError> {
        match expr {
            Expr::Const(value) => Ok(Lowered::Const(*value)),
            Expr::Input(pos) => {
                if *pos >= self.num_inputs {
                    return Err(CircuitBuilderError::InputOutOfRange {
                        pos: *pos,
                        num_inputs: self.num_inputs,
                    });
                }
                Ok(Lowered::Value(Value::Input(*pos as u32)))
            }
            Expr::Add { lhs, rhs } | Expr::Sub { lhs, rhs } => {
                let mut poly = self.operand(*lhs, "add")?;
                let rhs = self.operand(*rhs, "add")?;
                let sign = if matches!(expr, Expr::Sub { .. }) {
                    -F::ONE
                } else {
                    F::ONE
                };
                poly.add_scaled(&rhs, sign);
                Ok(self.push_poly(poly))
            }
            Expr::Mul { lhs, rhs } => {
                let poly = match (self.get(*lhs, "mul")?, self.get(*rhs, "mul")?) {
                    (Lowered::Value(a), Lowered::Value(b)) => Poly::product(a, b),
                    (Lowered::Const(c), _) => scaled(&self.operand(*rhs, "mul")?, c),
                    (_, Lowered::Const(c)) => scaled(&self.operand(*lhs, "mul")?, c),
                    _ => {
                        return Err(CircuitBuilderError::MissingExprMapping {
                            expr_id: *lhs,
                            context: "mul operand is a call node".into(),
                        });
                    }
                };
                Ok(self.push_poly(poly))
            }
            Expr::Call { sub, args } => {
                let callee = self
                    .subs
                    .get(sub.0 as usize)
                    .ok_or(CircuitBuilderError::UnknownSubCircuit { sub: *sub })?;
                if args.len() != callee.num_inputs as usize {
                    return Err(CircuitBuilderError::ArityMismatch {
                        op: "call",
                        expected: callee.num_inputs as usize,
                        got: args.len(),
                    });
                }
                let num_outputs = callee.outputs.len() as u32;
                let user_outputs = callee.num_user_outputs as u32;

                let mut values = Vec::with_capacity(args.len());
                for &arg in args {
                    values.push(self.materialize(arg, "call argument")?);
                }
                self.nodes.push(Node::Call {
                    sub: *sub,
                    args: values,
                    num_outputs,
                });
                let node = self.nodes.len() as u32 - 1;
                self.call_asserts
                    .extend((user_outputs..num_outputs).map(|idx| Value::Output { node, idx }));
                Ok(Lowered::Call(node))
            }
            Expr::CallOutput { call, output_idx } => match self.get(*call, "call output")? {
                Lowered::Call(node) => Ok(Lowered::Value(Value::Output {
                    node,
                    idx: *output_idx,
                })),
                _ => Err(CircuitBuilderError::MissingExprMapping {
                    expr_id: *call,
                    context: "call output of a non-call expression".into(),
                }),
            },
        }
    }
}

fn scaled<F: CircuitField>(poly: &Poly<F>, coef: F) -> Poly<F> {
    let mut out = Poly::default();
    out.add_scaled(poly, coef);
    out
}
