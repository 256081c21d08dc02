use thiserror::Error;

use crate::types::SegmentId;

/// Errors that can occur while validating or evaluating a layered circuit.
#[derive(Debug, Error)]
pub enum CircuitError {
    /// Input vector length mismatch.
    #[error("Input length mismatch: expected {expected}, got {got}")]
    InputLengthMismatch { expected: usize, got: usize },

    /// A layer or placement refers to a segment that does not exist.
    #[error("Unknown segment {segment}")]
    UnknownSegment { segment: SegmentId },

    /// Consecutive layers disagree on the width of the wire vector between them.
    #[error("Layer {layer} expects {expected} input wires, got {got}")]
    LayerWidthMismatch {
        layer: usize,
        expected: u32,
        got: u32,
    },

    /// A gate or placement reaches past the end of a wire vector.
    #[error("Wire {wire} out of bounds in {segment} (width {width})")]
    WireOutOfBounds {
        segment: SegmentId,
        wire: u32,
        width: u32,
    },

    /// A placement binds the wrong number of wires to a child segment.
    #[error("{segment} binds {got} wires to {child}, which has {expected} inputs")]
    ChildWidthMismatch {
        segment: SegmentId,
        child: SegmentId,
        expected: usize,
        got: usize,
    },

    /// A segment places itself or a later segment.
    #[error("{segment} places {child}, which is not an earlier segment")]
    ForwardPlacement {
        segment: SegmentId,
        child: SegmentId,
    },
}
