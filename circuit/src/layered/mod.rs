//! The layered circuit: the compiler's serializable output.
//!
//! A circuit is a sequence of layers. Layer `k` maps the wire vector of layer `k - 1` (the
//! circuit inputs for `k = 0`) to its own wire vector, as described by one [`Segment`].
//! Every output wire of a segment is the sum of the gates and child-segment outputs that
//! target it. A child placement runs another segment on a slice of the input vector and
//! adds its outputs at an offset, so the segments of a memoized sub-circuit are stored once
//! and placed once per call.

mod eval;

use alloc::vec::Vec;
use alloc::{format, vec};

use serde::{Deserialize, Serialize};

use crate::errors::CircuitError;
use crate::types::SegmentId;
use crate::{CircuitField, CompileError};

/// Version tag of the serialized layout.
pub const LAYERED_FORMAT_VERSION: u32 = 1;

/// `output += coef * input[lhs] * input[rhs]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulGate<F> {
    pub output: u32,
    pub lhs: u32,
    pub rhs: u32,
    pub coef: F,
}

/// `output += coef * input[input]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddGate<F> {
    pub output: u32,
    pub input: u32,
    pub coef: F,
}

/// `output += value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstGate<F> {
    pub output: u32,
    pub value: F,
}

/// Where a child segment reads its inputs from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildInput {
    /// Arbitrary wires of the parent input vector, one per child input.
    Wires(Vec<u32>),
    /// A contiguous block of the parent input vector starting at this wire.
    Offset(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildPlacement {
    pub segment: SegmentId,
    pub input: ChildInput,
    /// First parent output wire the child's outputs are added to.
    pub output_offset: u32,
}

/// One layer's worth of gates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment<F> {
    pub input_width: u32,
    pub output_width: u32,
    pub mul: Vec<MulGate<F>>,
    pub add: Vec<AddGate<F>>,
    pub constants: Vec<ConstGate<F>>,
    pub children: Vec<ChildPlacement>,
}

impl<F> Segment<F> {
    pub const fn new(input_width: u32, output_width: u32) -> Self {
        Self {
            input_width,
            output_width,
            mul: Vec::new(),
            add: Vec::new(),
            constants: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn gate_count(&self) -> usize {
        self.mul.len() + self.add.len() + self.constants.len()
    }

    /// The largest number of gates targeting a single output wire.
    pub fn max_fan_in(&self) -> usize {
        let mut counts = vec![0usize; self.output_width as usize];
        let outputs = self
            .mul
            .iter()
            .map(|g| g.output)
            .chain(self.add.iter().map(|g| g.output))
            .chain(self.constants.iter().map(|g| g.output));
        for output in outputs {
            if let Some(count) = counts.get_mut(output as usize) {
                *count += 1;
            }
        }
        counts.into_iter().max().unwrap_or(0)
    }
}

/// Structural summary of a layered circuit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitStats {
    pub layers: usize,
    pub segments: usize,
    pub mul_gates: usize,
    pub add_gates: usize,
    pub const_gates: usize,
    pub placements: usize,
    /// Largest number of gates targeting one wire of any segment.
    pub max_fan_in: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayeredCircuit<F> {
    version: u32,
    field_modulus: u64,
    input_width: u32,
    output_width: u32,
    segments: Vec<Segment<F>>,
    layers: Vec<SegmentId>,
}

impl<F: CircuitField> LayeredCircuit<F> {
    pub(crate) fn new(segments: Vec<Segment<F>>, layers: Vec<SegmentId>, input_width: u32) -> Self {
        let output_width = layers
            .last()
            .and_then(|id| segments.get(id.index()))
            .map_or(input_width, |seg| seg.output_width);
        Self {
            version: LAYERED_FORMAT_VERSION,
            field_modulus: F::ORDER_U64,
            input_width,
            output_width,
            segments,
            layers,
        }
    }

    pub const fn field_modulus(&self) -> u64 {
        self.field_modulus
    }

    pub const fn input_width(&self) -> u32 {
        self.input_width
    }

    pub const fn output_width(&self) -> u32 {
        self.output_width
    }

    pub fn segments(&self) -> &[Segment<F>] {
        &self.segments
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment<F>> {
        self.segments.get(id.index())
    }

    pub fn layers(&self) -> &[SegmentId] {
        &self.layers
    }

    pub fn stats(&self) -> CircuitStats {
        self.segments.iter().fold(
            CircuitStats {
                layers: self.layers.len(),
                segments: self.segments.len(),
                ..CircuitStats::default()
            },
            |stats, seg| CircuitStats {
                mul_gates: stats.mul_gates + seg.mul.len(),
                add_gates: stats.add_gates + seg.add.len(),
                const_gates: stats.const_gates + seg.constants.len(),
                placements: stats.placements + seg.children.len(),
                max_fan_in: stats.max_fan_in.max(seg.max_fan_in()),
                ..stats
            },
        )
    }

    /// Encodes the circuit with postcard.
    pub fn serialize(&self) -> Result<Vec<u8>, CompileError> {
        postcard::to_allocvec(self).map_err(|e| CompileError::Serialization {
            details: format!("{e}"),
        })
    }

    /// Decodes and validates a circuit produced by [`LayeredCircuit::serialize`].
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CompileError> {
        let circuit: Self = postcard::from_bytes(bytes).map_err(|e| CompileError::Serialization {
            details: format!("{e}"),
        })?;
        if circuit.version != LAYERED_FORMAT_VERSION {
            return Err(CompileError::Serialization {
                details: format!(
                    "format version {} (expected {LAYERED_FORMAT_VERSION})",
                    circuit.version
                ),
            });
        }
        if circuit.field_modulus != F::ORDER_U64 {
            return Err(CompileError::Serialization {
                details: format!(
                    "field modulus {} (expected {})",
                    circuit.field_modulus,
                    F::ORDER_U64
                ),
            });
        }
        circuit.validate().map_err(|e| CompileError::Serialization {
            details: format!("{e}"),
        })?;
        Ok(circuit)
    }

    /// Checks every wire reference, width and placement of the circuit.
    ///
    /// Children must refer to segments with a smaller id, which rules out cycles.
    pub fn validate(&self) -> Result<(), CircuitError> {
        let mut width = self.input_width;
        for (layer, &id) in self.layers.iter().enumerate() {
            let seg = self
                .segment(id)
                .ok_or(CircuitError::UnknownSegment { segment: id })?;
            if seg.input_width != width {
                return Err(CircuitError::LayerWidthMismatch {
                    layer,
                    expected: width,
                    got: seg.input_width,
                });
            }
            width = seg.output_width;
        }
        if width != self.output_width {
            return Err(CircuitError::LayerWidthMismatch {
                layer: self.layers.len(),
                expected: self.output_width,
                got: width,
            });
        }

        for (idx, seg) in self.segments.iter().enumerate() {
            let id = SegmentId(idx as u32);
            self.validate_segment(id, seg)?;
        }
        Ok(())
    }

    fn validate_segment(&self, id: SegmentId, seg: &Segment<F>) -> Result<(), CircuitError> {
        let check = |wire: u32, width: u32| {
            if wire < width {
                Ok(())
            } else {
                Err(CircuitError::WireOutOfBounds {
                    segment: id,
                    wire,
                    width,
                })
            }
        };
        for g in &seg.mul {
            check(g.output, seg.output_width)?;
            check(g.lhs, seg.input_width)?;
            check(g.rhs, seg.input_width)?;
        }
        for g in &seg.add {
            check(g.output, seg.output_width)?;
            check(g.input, seg.input_width)?;
        }
        for g in &seg.constants {
            check(g.output, seg.output_width)?;
        }
        for child in &seg.children {
            if child.segment >= id {
                return Err(CircuitError::ForwardPlacement {
                    segment: id,
                    child: child.segment,
                });
            }
            let child_seg = self
                .segment(child.segment)
                .ok_or(CircuitError::UnknownSegment {
                    segment: child.segment,
                })?;
            match &child.input {
                ChildInput::Wires(wires) => {
                    if wires.len() != child_seg.input_width as usize {
                        return Err(CircuitError::ChildWidthMismatch {
                            segment: id,
                            child: child.segment,
                            expected: child_seg.input_width as usize,
                            got: wires.len(),
                        });
                    }
                    for &wire in wires {
                        check(wire, seg.input_width)?;
                    }
                }
                ChildInput::Offset(offset) => {
                    let end = offset.saturating_add(child_seg.input_width);
                    if end > seg.input_width {
                        return Err(CircuitError::WireOutOfBounds {
                            segment: id,
                            wire: end,
                            width: seg.input_width,
                        });
                    }
                }
            }
            let end = child.output_offset.saturating_add(child_seg.output_width);
            if end > seg.output_width {
                return Err(CircuitError::WireOutOfBounds {
                    segment: id,
                    wire: end,
                    width: seg.output_width,
                });
            }
        }
        Ok(())
    }
}
