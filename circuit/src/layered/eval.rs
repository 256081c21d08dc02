use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;

use hashbrown::HashMap;
use p3_field::Field;

use super::{ChildInput, LayeredCircuit, Segment};
use crate::CircuitField;
use crate::errors::CircuitError;
use crate::types::SegmentId;

/// A wire value domain the evaluator can run over.
trait WireValue<F: Field>: Copy + Debug {
    fn constant(value: F) -> Self;

    /// `self + other`
    fn plus(self, other: Self) -> Self;

    /// `self + coef * x`
    fn plus_scaled(self, x: Self, coef: F) -> Self;

    /// `self + coef * lhs * rhs`
    fn plus_product(self, lhs: Self, rhs: Self, coef: F) -> Self;

    /// Whether a segment's outputs on `inputs` may be reused for every other call.
    fn cacheable(_inputs: &[Self]) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
struct Exact<F>(F);

impl<F: Field> WireValue<F> for Exact<F> {
    fn constant(value: F) -> Self {
        Self(value)
    }

    fn plus(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    fn plus_scaled(self, x: Self, coef: F) -> Self {
        Self(self.0 + coef * x.0)
    }

    fn plus_product(self, lhs: Self, rhs: Self, coef: F) -> Self {
        Self(self.0 + coef * lhs.0 * rhs.0)
    }
}

/// A value that may be unknown; zero factors stay known.
#[derive(Debug, Clone, Copy)]
struct Partial<F>(Option<F>);

impl<F: Field> WireValue<F> for Partial<F> {
    fn constant(value: F) -> Self {
        Self(Some(value))
    }

    fn plus(self, other: Self) -> Self {
        Self(self.0.zip(other.0).map(|(a, b)| a + b))
    }

    fn plus_scaled(self, x: Self, coef: F) -> Self {
        if coef == F::ZERO {
            return self;
        }
        self.plus(Self(x.0.map(|x| coef * x)))
    }

    fn plus_product(self, lhs: Self, rhs: Self, coef: F) -> Self {
        let is_zero = |v: Option<F>| v == Some(F::ZERO);
        if coef == F::ZERO || is_zero(lhs.0) || is_zero(rhs.0) {
            return self;
        }
        self.plus(Self(lhs.0.zip(rhs.0).map(|(a, b)| coef * a * b)))
    }

    fn cacheable(inputs: &[Self]) -> bool {
        inputs.iter().all(|v| v.0.is_none())
    }
}

struct Evaluator<'a, F, V> {
    circuit: &'a LayeredCircuit<F>,
    cache: HashMap<SegmentId, Vec<V>>,
}

impl<'a, F: CircuitField, V: WireValue<F>> Evaluator<'a, F, V> {
    fn new(circuit: &'a LayeredCircuit<F>) -> Self {
        Self {
            circuit,
            cache: HashMap::new(),
        }
    }

    fn run(&mut self, inputs: Vec<V>) -> Vec<V> {
        let circuit = self.circuit;
        circuit
            .layers
            .iter()
            .fold(inputs, |wires, &id| self.eval_segment(id, &wires))
    }

    fn eval_segment(&mut self, id: SegmentId, input: &[V]) -> Vec<V> {
        let cacheable = V::cacheable(input);
        if cacheable && let Some(cached) = self.cache.get(&id) {
            return cached.clone();
        }

        let circuit = self.circuit;
        let seg: &Segment<F> = &circuit.segments[id.index()];
        let mut out = vec![V::constant(F::ZERO); seg.output_width as usize];
        for g in &seg.constants {
            let o = g.output as usize;
            out[o] = out[o].plus(V::constant(g.value));
        }
        for g in &seg.add {
            let o = g.output as usize;
            out[o] = out[o].plus_scaled(input[g.input as usize], g.coef);
        }
        for g in &seg.mul {
            let o = g.output as usize;
            out[o] = out[o].plus_product(input[g.lhs as usize], input[g.rhs as usize], g.coef);
        }
        for child in &seg.children {
            let width = circuit.segments[child.segment.index()].input_width as usize;
            let child_input: Vec<V> = match &child.input {
                ChildInput::Wires(wires) => wires.iter().map(|&w| input[w as usize]).collect(),
                ChildInput::Offset(offset) => {
                    let start = *offset as usize;
                    input[start..start + width].to_vec()
                }
            };
            let child_out = self.eval_segment(child.segment, &child_input);
            let start = child.output_offset as usize;
            for (slot, value) in out[start..start + child_out.len()].iter_mut().zip(child_out) {
                *slot = slot.plus(value);
            }
        }

        if cacheable {
            self.cache.insert(id, out.clone());
        }
        out
    }
}

impl<F: CircuitField> LayeredCircuit<F> {
    /// Runs the circuit on `inputs` and returns the output layer.
    pub fn evaluate(&self, inputs: &[F]) -> Result<Vec<F>, CircuitError> {
        if inputs.len() != self.input_width as usize {
            return Err(CircuitError::InputLengthMismatch {
                expected: self.input_width as usize,
                got: inputs.len(),
            });
        }
        let wires = inputs.iter().copied().map(Exact).collect();
        let outputs = Evaluator::new(self).run(wires);
        Ok(outputs.into_iter().map(|v| v.0).collect())
    }

    /// Whether `inputs` is a witness: every output evaluates to zero.
    pub fn is_satisfied(&self, inputs: &[F]) -> Result<bool, CircuitError> {
        let outputs = self.evaluate(inputs)?;
        Ok(outputs.iter().all(|v| *v == F::ZERO))
    }

    /// The outputs that hold the same value whatever the inputs are.
    pub fn constant_outputs(&self) -> Vec<Option<F>> {
        let wires = vec![Partial(None); self.input_width as usize];
        let outputs = Evaluator::new(self).run(wires);
        outputs.into_iter().map(|v| v.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use p3_field::PrimeCharacteristicRing;
    use p3_mersenne_31::Mersenne31;

    use super::*;
    use crate::layered::{AddGate, ChildPlacement, ConstGate, MulGate};

    type F = Mersenne31;

    /// Two layers: a child squaring its input placed twice, then `a^2 - b^2` and `a^2 * 0 + 3`.
    fn squares() -> LayeredCircuit<F> {
        let mut square = Segment::new(1, 1);
        square.mul.push(MulGate {
            output: 0,
            lhs: 0,
            rhs: 0,
            coef: F::ONE,
        });

        let mut first = Segment::new(2, 2);
        for (wire, offset) in [(0, 0), (1, 1)] {
            first.children.push(ChildPlacement {
                segment: SegmentId(0),
                input: ChildInput::Wires(vec![wire]),
                output_offset: offset,
            });
        }

        let mut second = Segment::new(2, 2);
        second.add.push(AddGate {
            output: 0,
            input: 0,
            coef: F::ONE,
        });
        second.add.push(AddGate {
            output: 0,
            input: 1,
            coef: -F::ONE,
        });
        second.mul.push(MulGate {
            output: 1,
            lhs: 0,
            rhs: 1,
            coef: F::ZERO,
        });
        second.constants.push(ConstGate {
            output: 1,
            value: F::from_u32(3),
        });

        LayeredCircuit::new(
            vec![square, first, second],
            vec![SegmentId(1), SegmentId(2)],
            2,
        )
    }

    #[test]
    fn test_evaluate_with_child_placements() {
        let circuit = squares();
        circuit.validate().unwrap();
        let out = circuit
            .evaluate(&[F::from_u32(5), F::from_u32(3)])
            .unwrap();
        assert_eq!(out, vec![F::from_u32(16), F::from_u32(3)]);
    }

    #[test]
    fn test_evaluate_rejects_wrong_width() {
        let err = squares().evaluate(&[F::ONE]).unwrap_err();
        assert!(matches!(
            err,
            CircuitError::InputLengthMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn test_satisfaction() {
        let mut circuit = squares();
        circuit.segments[2].constants.clear();
        assert!(circuit.is_satisfied(&[F::TWO, -F::TWO]).unwrap());
        assert!(!circuit.is_satisfied(&[F::TWO, F::ONE]).unwrap());
    }

    #[test]
    fn test_constant_outputs() {
        assert_eq!(
            squares().constant_outputs(),
            vec![None, Some(F::from_u32(3))]
        );
    }

    #[test]
    fn test_offset_child_input() {
        let mut double = Segment::new(2, 1);
        double.add.push(AddGate {
            output: 0,
            input: 1,
            coef: F::TWO,
        });
        let mut parent = Segment::new(3, 1);
        parent.children.push(ChildPlacement {
            segment: SegmentId(0),
            input: ChildInput::Offset(1),
            output_offset: 0,
        });
        let circuit = LayeredCircuit::new(vec![double, parent], vec![SegmentId(1)], 3);
        circuit.validate().unwrap();
        let out = circuit
            .evaluate(&[F::ONE, F::TWO, F::from_u32(7)])
            .unwrap();
        assert_eq!(out, vec![F::from_u32(14)]);
    }
}
