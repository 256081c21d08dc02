//! Degree-2 intermediate representation shared by the lowering, fusion and layering passes.

use alloc::collections::BTreeMap;
use alloc::collections::btree_map::Entry;
use alloc::vec::Vec;

use p3_field::Field;

use crate::types::SubCircuitId;

/// Operand of a lowered node.
///
/// The derived order (inputs, then nodes, then call outputs, each by index) is the order
/// wires are laid out in, so it is part of the serialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    /// Body input at a position.
    Input(u32),
    /// Result of the polynomial node at an index.
    Node(u32),
    /// The `idx`-th output of the call node at an index.
    Output { node: u32, idx: u32 },
}

impl Value {
    /// Index of the node this value depends on, if any.
    pub const fn node(self) -> Option<u32> {
        match self {
            Self::Input(_) => None,
            Self::Node(node) | Self::Output { node, .. } => Some(node),
        }
    }

    /// Rewrites node references through `f`.
    pub fn remap(self, f: impl Fn(u32) -> u32) -> Self {
        match self {
            Self::Input(pos) => Self::Input(pos),
            Self::Node(node) => Self::Node(f(node)),
            Self::Output { node, idx } => Self::Output { node: f(node), idx },
        }
    }
}

/// A polynomial of degree at most two: `Σ c·a·b + Σ c·a + c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poly<F> {
    pub constant: F,
    pub linear: BTreeMap<Value, F>,
    /// Keys are stored with the smaller operand first.
    pub quadratic: BTreeMap<(Value, Value), F>,
}

impl<F: Field> Default for Poly<F> {
    fn default() -> Self {
        Self::constant(F::ZERO)
    }
}

impl<F: Field> Poly<F> {
    pub const fn constant(value: F) -> Self {
        Self {
            constant: value,
            linear: BTreeMap::new(),
            quadratic: BTreeMap::new(),
        }
    }

    pub fn var(value: Value) -> Self {
        let mut poly = Self::default();
        poly.add_linear(value, F::ONE);
        poly
    }

    pub fn product(lhs: Value, rhs: Value) -> Self {
        let mut poly = Self::default();
        poly.add_quadratic(lhs, rhs, F::ONE);
        poly
    }

    pub fn add_constant(&mut self, value: F) {
        self.constant += value;
    }

    pub fn add_linear(&mut self, value: Value, coef: F) {
        merge_term(&mut self.linear, value, coef);
    }

    pub fn add_quadratic(&mut self, lhs: Value, rhs: Value, coef: F) {
        let key = if lhs <= rhs { (lhs, rhs) } else { (rhs, lhs) };
        merge_term(&mut self.quadratic, key, coef);
    }

    /// Adds `coef · other` to `self`.
    pub fn add_scaled(&mut self, other: &Self, coef: F) {
        self.add_constant(other.constant * coef);
        for (&value, &c) in &other.linear {
            self.add_linear(value, c * coef);
        }
        for (&(lhs, rhs), &c) in &other.quadratic {
            self.add_quadratic(lhs, rhs, c * coef);
        }
    }

    /// Adds `coef · other · factor` to `self`. `other` must be linear.
    pub fn add_scaled_product(&mut self, other: &Self, factor: Value, coef: F) {
        debug_assert!(other.is_linear());
        self.add_linear(factor, other.constant * coef);
        for (&value, &c) in &other.linear {
            self.add_quadratic(value, factor, c * coef);
        }
    }

    /// Number of gates this node needs: one per term plus one for a non-zero constant.
    pub fn term_count(&self) -> usize {
        self.linear.len() + self.quadratic.len() + usize::from(self.constant != F::ZERO)
    }

    pub fn is_linear(&self) -> bool {
        self.quadratic.is_empty()
    }

    /// The value of a term-free polynomial.
    pub fn as_constant(&self) -> Option<F> {
        (self.linear.is_empty() && self.quadratic.is_empty()).then_some(self.constant)
    }

    /// Every operand occurrence; a square yields its operand twice.
    pub fn refs(&self) -> impl Iterator<Item = Value> + '_ {
        let linear = self.linear.keys().copied();
        let quadratic = self.quadratic.keys().flat_map(|&(lhs, rhs)| [lhs, rhs]);
        linear.chain(quadratic)
    }

    /// Rewrites node references through a monotone `f`.
    pub fn remap(&self, f: impl Fn(u32) -> u32 + Copy) -> Self {
        Self {
            constant: self.constant,
            linear: self
                .linear
                .iter()
                .map(|(value, &c)| (value.remap(f), c))
                .collect(),
            quadratic: self
                .quadratic
                .iter()
                .map(|((lhs, rhs), &c)| ((lhs.remap(f), rhs.remap(f)), c))
                .collect(),
        }
    }
}

fn merge_term<K: Ord, F: Field>(terms: &mut BTreeMap<K, F>, key: K, coef: F) {
    if coef == F::ZERO {
        return;
    }
    match terms.entry(key) {
        Entry::Vacant(entry) => {
            entry.insert(coef);
        }
        Entry::Occupied(mut entry) => {
            *entry.get_mut() += coef;
            if *entry.get() == F::ZERO {
                entry.remove();
            }
        }
    }
}

/// A lowered node, in topological order within its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node<F> {
    Poly(Poly<F>),
    /// Invocation of a lowered sub-circuit; its outputs are `Value::Output` of this node.
    Call {
        sub: SubCircuitId,
        args: Vec<Value>,
        num_outputs: u32,
    },
}

impl<F: Field> Node<F> {
    /// Every operand occurrence.
    pub fn refs(&self) -> Vec<Value> {
        match self {
            Self::Poly(poly) => poly.refs().collect(),
            Self::Call { args, .. } => args.clone(),
        }
    }
}

/// A body after lowering: its inputs, nodes and outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredBody<F> {
    pub num_inputs: u32,
    pub nodes: Vec<Node<F>>,
    /// User outputs followed by assertion outputs.
    pub outputs: Vec<Value>,
    pub num_user_outputs: usize,
}

impl<F> LoweredBody<F> {
    /// Outputs that must evaluate to zero.
    pub fn assertion_outputs(&self) -> &[Value] {
        &self.outputs[self.num_user_outputs..]
    }
}

/// Every body of a circuit, sub-circuits first in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredProgram<F> {
    pub subs: Vec<LoweredBody<F>>,
    pub root: LoweredBody<F>,
}
