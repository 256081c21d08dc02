//! Structural sharing of sub-circuit logic.
//!
//! A [`Memoized`] body is built once per [`MemoizationKey`] into a [`SubCircuit`] stored in
//! the builder's [`SubCircuitRegistry`]. Every later call with the same key only emits a
//! `Call` node carrying its own argument wiring.

use alloc::string::ToString;
use alloc::vec::Vec;
use core::any::{TypeId, type_name};
use core::fmt;
use core::marker::PhantomData;

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

use super::CircuitBuilder;
use crate::expr::ExpressionGraph;
use crate::types::{ExprId, SubCircuitId};
use crate::{CircuitBuilderError, CircuitField};

/// Identifies structurally identical sub-circuit invocations.
///
/// Two invocations share a body only if they run the same body type on the same argument
/// shape. Every closure expression is its own type, so distinct closures never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoizationKey {
    body: TypeId,
    /// Readable name of the body type, for logs only.
    pub function: &'static str,
    /// Length of each argument group, in call order.
    pub input_shape: Vec<usize>,
}

impl MemoizationKey {
    /// The key of body type `B` invoked with argument groups of the given lengths.
    pub fn of<B: 'static>(input_shape: Vec<usize>) -> Self {
        Self {
            body: TypeId::of::<B>(),
            function: type_name::<B>(),
            input_shape,
        }
    }

    /// Total number of flattened inputs.
    pub fn arity(&self) -> usize {
        self.input_shape.iter().sum()
    }
}

impl fmt::Display for MemoizationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.function, self.input_shape)
    }
}

/// A finished expression graph together with its interface.
#[derive(Debug, Clone)]
pub struct Body<F> {
    pub graph: ExpressionGraph<F>,
    /// Number of `Input` positions handed out.
    pub num_inputs: usize,
    /// User-visible outputs, in order.
    pub outputs: Vec<ExprId>,
    /// Expressions constrained to zero.
    pub asserts: Vec<ExprId>,
}

/// A registered memoized body.
#[derive(Debug, Clone)]
pub struct SubCircuit<F> {
    pub key: MemoizationKey,
    pub body: Body<F>,
}

/// Sub-circuit bodies in registration order, indexed by [`SubCircuitId`].
///
/// A body is always registered after every body it calls, so ids are a valid
/// bottom-up compilation order.
#[derive(Debug, Clone)]
pub struct SubCircuitRegistry<F> {
    bodies: Vec<SubCircuit<F>>,
    index: HashMap<MemoizationKey, SubCircuitId>,
}

impl<F> Default for SubCircuitRegistry<F> {
    fn default() -> Self {
        Self {
            bodies: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<F> SubCircuitRegistry<F> {
    pub fn lookup(&self, key: &MemoizationKey) -> Option<SubCircuitId> {
        self.index.get(key).copied()
    }

    /// Stores a new body. A key can be registered only once.
    pub fn register(&mut self, sub: SubCircuit<F>) -> Result<SubCircuitId, CircuitBuilderError> {
        let id = SubCircuitId(self.bodies.len() as u32);
        match self.index.entry(sub.key.clone()) {
            Entry::Occupied(entry) => {
                return Err(CircuitBuilderError::DuplicateSubCircuit {
                    key: sub.key.to_string(),
                    existing: *entry.get(),
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(id);
            }
        }
        self.bodies.push(sub);
        Ok(id)
    }

    pub fn get(&self, id: SubCircuitId) -> Option<&SubCircuit<F>> {
        self.bodies.get(id.0 as usize)
    }

    pub fn bodies(&self) -> &[SubCircuit<F>] {
        &self.bodies
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

/// A sub-circuit body whose gate logic is emitted once and rebound per call.
///
/// The body receives a child builder and one freshly allocated input group per argument
/// group, and returns its outputs. Bodies are keyed by their type, so state captured by the
/// closure must not change between calls made within one circuit, and a body calling another
/// memoized body must own it (`move`).
pub struct Memoized<F, B> {
    body: B,
    _phantom: PhantomData<fn() -> F>,
}

impl<F, B> fmt::Debug for Memoized<F, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("function", &type_name::<B>())
            .finish()
    }
}

/// Wraps `body` for memoized invocation.
pub const fn memoize<F, B>(body: B) -> Memoized<F, B>
where
    F: CircuitField,
    B: Fn(&mut CircuitBuilder<F>, &[Vec<ExprId>]) -> Result<Vec<ExprId>, CircuitBuilderError>
        + 'static,
{
    Memoized::new(body)
}

impl<F, B> Memoized<F, B>
where
    F: CircuitField,
    B: Fn(&mut CircuitBuilder<F>, &[Vec<ExprId>]) -> Result<Vec<ExprId>, CircuitBuilderError>
        + 'static,
{
    pub const fn new(body: B) -> Self {
        Self {
            body,
            _phantom: PhantomData,
        }
    }

    /// The key an invocation with these argument groups is memoized under.
    pub fn key(&self, args: &[Vec<ExprId>]) -> MemoizationKey {
        MemoizationKey::of::<B>(args.iter().map(Vec::len).collect())
    }

    /// Invokes the body, returning the call's output expressions in `api`.
    pub fn call(
        &self,
        api: &mut CircuitBuilder<F>,
        args: &[Vec<ExprId>],
    ) -> Result<Vec<ExprId>, CircuitBuilderError> {
        let key = self.key(args);
        api.call_memoized(key, args, &self.body)
    }

    /// Invokes a body used only for its constraints.
    pub fn call_void(
        &self,
        api: &mut CircuitBuilder<F>,
        args: &[Vec<ExprId>],
    ) -> Result<(), CircuitBuilderError> {
        self.call(api, args).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use p3_mersenne_31::Mersenne31;

    use super::*;

    type F = Mersenne31;

    fn sub_circuit(key: MemoizationKey) -> SubCircuit<F> {
        SubCircuit {
            key,
            body: Body {
                graph: ExpressionGraph::default(),
                num_inputs: 0,
                outputs: Vec::new(),
                asserts: Vec::new(),
            },
        }
    }

    #[test]
    fn test_distinct_closures_get_distinct_keys() {
        let double = memoize(|api: &mut CircuitBuilder<F>, inputs: &[Vec<ExprId>]| {
            Ok(vec![api.add(inputs[0][0], inputs[0][0])])
        });
        let square = memoize(|api: &mut CircuitBuilder<F>, inputs: &[Vec<ExprId>]| {
            Ok(vec![api.mul(inputs[0][0], inputs[0][0])])
        });

        let args = [vec![ExprId(1)]];
        assert_ne!(double.key(&args), square.key(&args));
        assert_eq!(double.key(&args), double.key(&args));
    }

    #[test]
    fn test_register_rejects_duplicate_key() {
        let mut registry = SubCircuitRegistry::<F>::default();
        let key = MemoizationKey::of::<u8>(vec![2]);
        let first = registry.register(sub_circuit(key.clone())).unwrap();
        let other = registry
            .register(sub_circuit(MemoizationKey::of::<u16>(vec![2])))
            .unwrap();
        assert_ne!(first, other);

        let err = registry.register(sub_circuit(key.clone())).unwrap_err();
        assert!(matches!(
            err,
            CircuitBuilderError::DuplicateSubCircuit { existing, .. } if existing == first
        ));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup(&key), Some(first));
    }
}
