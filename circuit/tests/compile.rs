use layered_circuit::{
    Circuit, CircuitBuilder, CircuitBuilderError, CompileOptions, ExprId, LayeredCircuit, Variable,
    compile, memoize,
};
use p3_field::PrimeCharacteristicRing;
use p3_mersenne_31::Mersenne31;
use proptest::prelude::*;

type F = Mersenne31;

#[derive(Debug, Clone, Copy)]
enum Op {
    Add(usize, usize),
    Mul(usize, usize),
    Scale(usize, u32),
}

/// Asserts an arbitrary arithmetic program over four inputs, so its value is the output.
#[derive(Debug, Clone)]
struct Program {
    inputs: Vec<Variable<F>>,
    ops: Vec<Op>,
}

impl Program {
    fn new(ops: Vec<Op>) -> Self {
        Self {
            inputs: vec![Variable::free(); 4],
            ops,
        }
    }

    fn eval(&self, inputs: &[F]) -> F {
        let mut values = inputs.to_vec();
        for op in &self.ops {
            let v = match *op {
                Op::Add(a, b) => values[a % values.len()] + values[b % values.len()],
                Op::Mul(a, b) => values[a % values.len()] * values[b % values.len()],
                Op::Scale(a, c) => values[a % values.len()] * F::from_u32(c),
            };
            values.push(v);
        }
        values[values.len() - 1]
    }
}

impl Circuit<F> for Program {
    fn bind(&mut self, api: &mut CircuitBuilder<F>) -> Result<(), CircuitBuilderError> {
        api.bind_all(self.inputs.iter_mut());
        Ok(())
    }

    fn define(&self, api: &mut CircuitBuilder<F>) -> Result<(), CircuitBuilderError> {
        let mut values = self
            .inputs
            .iter()
            .map(Variable::expr)
            .collect::<Result<Vec<_>, _>>()?;
        for op in &self.ops {
            let n = values.len();
            let v = match *op {
                Op::Add(a, b) => api.add(values[a % n], values[b % n]),
                Op::Mul(a, b) => api.mul(values[a % n], values[b % n]),
                Op::Scale(a, c) => api.mul_const(values[a % n], F::from_u32(c)),
            };
            values.push(v);
        }
        api.assert_zero(values[values.len() - 1]);
        Ok(())
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Add(a, b)),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Mul(a, b)),
        (any::<usize>(), 1u32..1000).prop_map(|(a, c)| Op::Scale(a, c)),
    ]
}

fn compile_with(circuit: &mut impl Circuit<F>, threshold: usize) -> LayeredCircuit<F> {
    let options = CompileOptions::default().with_compress_threshold(threshold);
    compile(circuit, &options).unwrap().into_layered_circuit()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_layered_matches_direct_evaluation(
        ops in prop::collection::vec(op_strategy(), 1..24),
        inputs in prop::array::uniform4(0u32..(1 << 31) - 1),
        threshold in 1usize..40,
    ) {
        let mut program = Program::new(ops);
        let inputs = inputs.map(F::from_u32);
        let expected = program.eval(&inputs);

        let layered = compile_with(&mut program, threshold);
        prop_assert!(layered.stats().max_fan_in <= threshold.max(2));
        let out = layered.evaluate(&inputs).unwrap();
        prop_assert_eq!(out, vec![expected]);
    }
}

/// `sum_i (x_i^2)^2` where the inner square lives in its own memoized body.
struct NestedSquares {
    xs: Vec<Variable<F>>,
    total: Variable<F>,
}

impl Circuit<F> for NestedSquares {
    fn bind(&mut self, api: &mut CircuitBuilder<F>) -> Result<(), CircuitBuilderError> {
        api.bind_all(self.xs.iter_mut());
        api.bind(&mut self.total);
        Ok(())
    }

    fn define(&self, api: &mut CircuitBuilder<F>) -> Result<(), CircuitBuilderError> {
        let fourth = memoize(|api: &mut CircuitBuilder<F>, args: &[Vec<ExprId>]| {
            let square = memoize(|api: &mut CircuitBuilder<F>, args: &[Vec<ExprId>]| {
                let x = args[0][0];
                Ok(vec![api.mul(x, x)])
            });
            let sq = square.call(api, args)?;
            square.call(api, &[sq])
        });

        let mut sum = api.add_const(F::ZERO);
        for x in &self.xs {
            let out = fourth.call(api, &[vec![x.expr()?]])?;
            sum = api.add(sum, out[0]);
        }
        api.assert_eq(sum, self.total.expr()?);
        Ok(())
    }
}

#[test]
fn test_nested_memoized_bodies() {
    let mut circuit = NestedSquares {
        xs: vec![Variable::free(); 3],
        total: Variable::free(),
    };
    let layered = compile_with(&mut circuit, 32);
    layered.validate().unwrap();

    let xs = [F::from_u32(2), F::from_u32(3), F::from_u32(5)];
    let total = xs.iter().map(|x| x.exp_u64(4)).sum::<F>();
    let mut witness = xs.to_vec();
    witness.push(total);
    assert!(layered.is_satisfied(&witness).unwrap());

    witness[3] -= F::ONE;
    assert!(!layered.is_satisfied(&witness).unwrap());
}

/// Checks `2 * x == y` and `x * x == z` through two memoized bodies of the same shape.
struct DoubleAndSquare {
    x: Variable<F>,
    y: Variable<F>,
    z: Variable<F>,
}

impl Circuit<F> for DoubleAndSquare {
    fn bind(&mut self, api: &mut CircuitBuilder<F>) -> Result<(), CircuitBuilderError> {
        api.bind(&mut self.x);
        api.bind(&mut self.y);
        api.bind(&mut self.z);
        Ok(())
    }

    fn define(&self, api: &mut CircuitBuilder<F>) -> Result<(), CircuitBuilderError> {
        let double = memoize(|api: &mut CircuitBuilder<F>, args: &[Vec<ExprId>]| {
            Ok(vec![api.add(args[0][0], args[0][0])])
        });
        let square = memoize(|api: &mut CircuitBuilder<F>, args: &[Vec<ExprId>]| {
            Ok(vec![api.mul(args[0][0], args[0][0])])
        });

        let x = vec![self.x.expr()?];
        let doubled = double.call(api, &[x.clone()])?;
        let squared = square.call(api, &[x])?;
        api.assert_eq(doubled[0], self.y.expr()?);
        api.assert_eq(squared[0], self.z.expr()?);
        Ok(())
    }
}

#[test]
fn test_same_shape_bodies_check_their_own_relation() {
    let mut circuit = DoubleAndSquare {
        x: Variable::free(),
        y: Variable::free(),
        z: Variable::free(),
    };
    let layered = compile_with(&mut circuit, 32);

    let x = F::from_u32(5);
    assert!(
        layered
            .is_satisfied(&[x, x.double(), x.square()])
            .unwrap()
    );
    // `z = 2x` must not pass the square check.
    assert!(!layered.is_satisfied(&[x, x.double(), x.double()]).unwrap());
}
