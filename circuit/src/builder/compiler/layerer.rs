use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use alloc::{format, vec};

use hashbrown::HashMap;
use tracing::{debug, instrument};

use super::ir::{LoweredBody, LoweredProgram, Node, Value};
use crate::layered::{AddGate, ChildInput, ChildPlacement, ConstGate, LayeredCircuit, MulGate, Segment};
use crate::types::{SegmentId, SubCircuitId};
use crate::{CircuitField, CompileError};

/// What occupies a run of wires at one level of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Slot {
    /// One wire holding a value, computed at this level or relayed from below.
    Value(Value),
    /// The outputs of stage `stage` of a call: the call's sub-circuit after `stage` layers.
    Block { call: u32, stage: u32 },
}

/// A body already emitted as segments.
#[derive(Debug, Clone)]
struct BodyLayout {
    /// One segment per layer.
    segments: Vec<SegmentId>,
    /// `widths[0]` is the number of inputs, `widths[k]` the output width of layer `k`.
    widths: Vec<u32>,
}

impl BodyLayout {
    fn depth(&self) -> u32 {
        self.segments.len() as u32
    }
}

/// Responsible for assigning every lowered node to a layer and emitting the segments.
///
/// Inputs sit at level 0, a polynomial node one level past its deepest operand, and the
/// outputs of a call as many levels past its deepest argument as the callee has layers. A
/// last layer relays the body outputs in order. Values read further down than where they
/// are computed are carried by relay gates. Each sub-circuit is emitted once; a call only
/// adds one child placement per layer of the callee.
#[derive(Debug)]
pub struct Layerer<'a, F> {
    program: &'a LoweredProgram<F>,
}

impl<'a, F: CircuitField> Layerer<'a, F> {
    pub const fn new(program: &'a LoweredProgram<F>) -> Self {
        Self { program }
    }

    #[instrument(skip_all)]
    pub fn layer(self) -> Result<LayeredCircuit<F>, CompileError> {
        let mut segments = Vec::new();
        let mut layouts = Vec::with_capacity(self.program.subs.len());
        for body in &self.program.subs {
            let layout = BodyLayerer::new(body, &layouts)?.emit(&mut segments)?;
            layouts.push(layout);
        }
        let root = BodyLayerer::new(&self.program.root, &layouts)?.emit(&mut segments)?;
        debug!(
            layers = root.segments.len(),
            segments = segments.len(),
            "layered circuit"
        );
        Ok(LayeredCircuit::new(
            segments,
            root.segments,
            self.program.root.num_inputs,
        ))
    }
}

fn layering_error(details: impl Into<String>) -> CompileError {
    CompileError::Layering {
        details: details.into(),
    }
}

struct BodyLayerer<'a, F> {
    body: &'a LoweredBody<F>,
    layouts: &'a [BodyLayout],
    /// Level of each node's result (of every output, for calls).
    levels: Vec<u32>,
    /// Level of a call's arguments; unused for polynomial nodes.
    arg_levels: Vec<u32>,
}

impl<'a, F: CircuitField> BodyLayerer<'a, F> {
    fn new(body: &'a LoweredBody<F>, layouts: &'a [BodyLayout]) -> Result<Self, CompileError> {
        let mut layerer = Self {
            body,
            layouts,
            levels: Vec::with_capacity(body.nodes.len()),
            arg_levels: Vec::with_capacity(body.nodes.len()),
        };
        for node in &body.nodes {
            let (arg_level, level) = match node {
                Node::Poly(poly) => {
                    let deepest = poly.refs().map(|v| layerer.value_level(v)).max();
                    (0, deepest.unwrap_or(0) + 1)
                }
                Node::Call { sub, args, .. } => {
                    let deepest = args.iter().map(|&v| layerer.value_level(v)).max();
                    let arg_level = deepest.unwrap_or(0);
                    (arg_level, arg_level + layerer.layout(*sub)?.depth())
                }
            };
            layerer.arg_levels.push(arg_level);
            layerer.levels.push(level);
        }
        Ok(layerer)
    }

    fn layout(&self, sub: SubCircuitId) -> Result<&'a BodyLayout, CompileError> {
        self.layouts
            .get(sub.0 as usize)
            .ok_or_else(|| layering_error(format!("call to {sub} before it was layered")))
    }

    fn call_layout(&self, call: u32) -> Result<&'a BodyLayout, CompileError> {
        match &self.body.nodes[call as usize] {
            Node::Call { sub, .. } => self.layout(*sub),
            Node::Poly(_) => Err(layering_error(format!("node {call} is not a call"))),
        }
    }

    fn value_level(&self, value: Value) -> u32 {
        match value {
            Value::Input(_) => 0,
            Value::Node(node) | Value::Output { node, .. } => self.levels[node as usize],
        }
    }

    /// The slot holding `value` at `level`.
    fn slot_at(&self, value: Value, level: u32) -> Slot {
        match value {
            Value::Output { node, .. } if self.levels[node as usize] == level => Slot::Block {
                call: node,
                stage: level - self.arg_levels[node as usize],
            },
            _ => Slot::Value(value),
        }
    }

    /// Slots at `level - 1` that `slot` at `level` reads.
    fn deps(&self, slot: Slot, level: u32) -> Result<Vec<Slot>, CompileError> {
        let below = level - 1;
        Ok(match slot {
            Slot::Value(Value::Node(node)) if self.levels[node as usize] == level => {
                match &self.body.nodes[node as usize] {
                    Node::Poly(poly) => poly.refs().map(|v| self.slot_at(v, below)).collect(),
                    Node::Call { .. } => {
                        return Err(layering_error(format!("call node {node} read as a value")));
                    }
                }
            }
            Slot::Value(value) => vec![self.slot_at(value, below)],
            Slot::Block { call, stage } if stage > 1 => vec![Slot::Block {
                call,
                stage: stage - 1,
            }],
            Slot::Block { call, .. } => match &self.body.nodes[call as usize] {
                Node::Call { args, .. } => args.iter().map(|&v| self.slot_at(v, below)).collect(),
                Node::Poly(_) => return Err(layering_error(format!("node {call} is not a call"))),
            },
        })
    }

    fn slot_width(&self, slot: Slot) -> Result<u32, CompileError> {
        match slot {
            Slot::Value(_) => Ok(1),
            Slot::Block { call, stage } => Ok(self.call_layout(call)?.widths[stage as usize]),
        }
    }

    fn emit(self, segments: &mut Vec<Segment<F>>) -> Result<BodyLayout, CompileError> {
        let outputs = &self.body.outputs;
        let top = outputs
            .iter()
            .map(|&v| self.value_level(v))
            .max()
            .unwrap_or(0);
        let top_idx = top as usize;

        let mut need: Vec<BTreeSet<Slot>> = vec![BTreeSet::new(); top_idx + 1];
        need[top_idx] = outputs.iter().map(|&v| self.slot_at(v, top)).collect();
        for level in (1..=top).rev() {
            let mut below = BTreeSet::new();
            for &slot in &need[level as usize] {
                below.extend(self.deps(slot, level)?);
            }
            need[level as usize - 1] = below;
        }

        let mut widths = Vec::with_capacity(top_idx + 2);
        widths.push(self.body.num_inputs);
        let mut positions: Vec<HashMap<Slot, u32>> = vec![HashMap::new()];
        for slots in &need[1..] {
            let mut offsets = HashMap::with_capacity(slots.len());
            let mut width = 0u32;
            for &slot in slots {
                offsets.insert(slot, width);
                width = width
                    .checked_add(self.slot_width(slot)?)
                    .ok_or_else(|| layering_error("layer wider than u32::MAX wires"))?;
            }
            positions.push(offsets);
            widths.push(width);
        }

        let wire = |level: u32, value: Value| -> Result<u32, CompileError> {
            if level == 0 {
                return match value {
                    Value::Input(pos) => Ok(pos),
                    _ => Err(layering_error(format!("{value:?} placed at the input level"))),
                };
            }
            let slot = self.slot_at(value, level);
            let base = positions[level as usize]
                .get(&slot)
                .copied()
                .ok_or_else(|| layering_error(format!("{value:?} missing at level {level}")))?;
            Ok(match (slot, value) {
                (Slot::Block { .. }, Value::Output { idx, .. }) => base + idx,
                _ => base,
            })
        };

        let mut ids = Vec::with_capacity(top_idx + 1);
        for level in 1..=top {
            let l = level as usize;
            let mut seg = Segment::new(widths[l - 1], widths[l]);
            for &slot in &need[l] {
                let output = positions[l][&slot];
                match slot {
                    Slot::Value(Value::Node(node)) if self.levels[node as usize] == level => {
                        let Node::Poly(poly) = &self.body.nodes[node as usize] else {
                            return Err(layering_error(format!("call node {node} read as a value")));
                        };
                        if poly.constant != F::ZERO {
                            seg.constants.push(ConstGate {
                                output,
                                value: poly.constant,
                            });
                        }
                        for (&value, &coef) in &poly.linear {
                            seg.add.push(AddGate {
                                output,
                                input: wire(level - 1, value)?,
                                coef,
                            });
                        }
                        for (&(lhs, rhs), &coef) in &poly.quadratic {
                            seg.mul.push(MulGate {
                                output,
                                lhs: wire(level - 1, lhs)?,
                                rhs: wire(level - 1, rhs)?,
                                coef,
                            });
                        }
                    }
                    Slot::Value(value) => seg.add.push(AddGate {
                        output,
                        input: wire(level - 1, value)?,
                        coef: F::ONE,
                    }),
                    Slot::Block { call, stage } => {
                        let layout = self.call_layout(call)?;
                        let input = if stage == 1 {
                            let Node::Call { args, .. } = &self.body.nodes[call as usize] else {
                                return Err(layering_error(format!("node {call} is not a call")));
                            };
                            let wires = args
                                .iter()
                                .map(|&v| wire(level - 1, v))
                                .collect::<Result<_, _>>()?;
                            ChildInput::Wires(wires)
                        } else {
                            let prev = Slot::Block {
                                call,
                                stage: stage - 1,
                            };
                            ChildInput::Offset(positions[l - 1][&prev])
                        };
                        seg.children.push(ChildPlacement {
                            segment: layout.segments[stage as usize - 1],
                            input,
                            output_offset: output,
                        });
                    }
                }
            }
            segments.push(seg);
            ids.push(SegmentId(segments.len() as u32 - 1));
        }

        let mut last = Segment::new(widths[top_idx], outputs.len() as u32);
        for (output, &value) in outputs.iter().enumerate() {
            last.add.push(AddGate {
                output: output as u32,
                input: wire(top, value)?,
                coef: F::ONE,
            });
        }
        segments.push(last);
        ids.push(SegmentId(segments.len() as u32 - 1));
        widths.push(outputs.len() as u32);

        debug!(
            depth = ids.len(),
            max_width = widths.iter().max().copied().unwrap_or(0),
            "layered body"
        );
        Ok(BodyLayout {
            segments: ids,
            widths,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use p3_field::PrimeCharacteristicRing;
    use p3_mersenne_31::Mersenne31;

    use super::*;
    use crate::builder::compiler::{ExpressionLowerer, Optimizer};
    use crate::builder::memoize;
    use crate::{CircuitBuilder, ExprId};

    type F = Mersenne31;

    fn layer(builder: CircuitBuilder<F>) -> LayeredCircuit<F> {
        let program = ExpressionLowerer::new(&builder.build()).lower().unwrap();
        let program = Optimizer::new(32).optimize(program);
        let circuit = Layerer::new(&program).layer().unwrap();
        circuit.validate().unwrap();
        circuit
    }

    #[test]
    fn test_relays_carry_shallow_values() {
        // (x * y) * y - z: z is needed two levels up.
        let mut builder = CircuitBuilder::<F>::new();
        let [x, y, z] = builder.alloc_input_array();
        let xy = builder.mul(x, y);
        let xyy = builder.mul(xy, y);
        builder.assert_eq(xyy, z);
        let circuit = layer(builder);

        // xy at level 1, xyy - z at level 2, then the output relay.
        assert_eq!(circuit.layers().len(), 3);
        assert_eq!(circuit.output_width(), 1);

        let (x, y) = (F::from_u32(3), F::from_u32(4));
        assert!(circuit.is_satisfied(&[x, y, x * y * y]).unwrap());
        assert!(!circuit.is_satisfied(&[x, y, F::ONE]).unwrap());
    }

    #[test]
    fn test_sub_circuit_segments_are_shared() {
        let cube_check = memoize(|api: &mut CircuitBuilder<F>, inputs: &[Vec<ExprId>]| {
            let x = inputs[0][0];
            let cube = api.exp_u64(x, 3);
            api.assert_eq(cube, inputs[1][0]);
            Ok(Vec::new())
        });

        let build = |calls: usize| {
            let mut builder = CircuitBuilder::<F>::new();
            for _ in 0..calls {
                let args = vec![builder.alloc_inputs(1), builder.alloc_inputs(1)];
                cube_check.call_void(&mut builder, &args).unwrap();
            }
            layer(builder)
        };

        let two = build(2);
        let eight = build(8);
        assert_eq!(two.stats().segments, eight.stats().segments);
        assert_eq!(eight.stats().placements, 4 * two.stats().placements);

        let mut witness = Vec::new();
        for i in 0..8u32 {
            let x = F::from_u32(i + 2);
            witness.extend([x, x * x * x]);
        }
        assert!(eight.is_satisfied(&witness).unwrap());
        witness[5] += F::ONE;
        let outputs = eight.evaluate(&witness).unwrap();
        assert_eq!(
            outputs.iter().position(|v| *v != F::ZERO),
            Some(2),
            "only the third call's assertion fails"
        );
    }

    #[test]
    fn test_nested_calls_layer_bottom_up() {
        let square = memoize(|api: &mut CircuitBuilder<F>, inputs: &[Vec<ExprId>]| {
            Ok(vec![api.mul(inputs[0][0], inputs[0][0])])
        });
        let fourth = memoize(move |api: &mut CircuitBuilder<F>, inputs: &[Vec<ExprId>]| {
            let sq = square.call(api, inputs)?;
            square.call(api, &[sq])
        });

        let mut builder = CircuitBuilder::<F>::new();
        let x = builder.add_input();
        let y = builder.add_input();
        let x4 = fourth.call(&mut builder, &[vec![x]]).unwrap();
        builder.assert_eq(x4[0], y);
        let circuit = layer(builder);

        let x = F::from_u32(3);
        assert!(circuit.is_satisfied(&[x, F::from_u32(81)]).unwrap());
        assert!(!circuit.is_satisfied(&[x, F::from_u32(80)]).unwrap());
    }

    #[test]
    fn test_output_order_is_preserved() {
        let mut builder = CircuitBuilder::<F>::new();
        let [a, b] = builder.alloc_input_array();
        let ab = builder.mul(a, b);
        builder.assert_zero(b);
        builder.assert_zero(ab);
        builder.assert_zero(a);
        let circuit = layer(builder);

        let out = circuit.evaluate(&[F::TWO, F::from_u32(5)]).unwrap();
        assert_eq!(out, vec![F::from_u32(5), F::from_u32(10), F::TWO]);
    }

    #[test]
    fn test_layering_is_deterministic() {
        let make = || {
            let mut builder = CircuitBuilder::<F>::new();
            let xs = builder.alloc_inputs(6);
            let prod = xs.iter().fold(xs[0], |acc, &x| builder.mul(acc, x));
            let sum = builder.inner_product(&xs, &xs);
            builder.assert_eq(prod, sum);
            layer(builder).serialize().unwrap()
        };
        assert_eq!(make(), make());
    }
}
