//! Circuit-description placeholders.
//!
//! A circuit description declares its variables before any builder exists. The compiler binds
//! each [`Variable`] to a wire of the circuit under construction (a fresh input for free
//! variables, a pooled constant for assigned ones) right before calling `define`.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::{CircuitBuilderError, ExprId};

/// Upper bound on the number of variables one circuit description may declare.
///
/// Every variable becomes at least one wire of the input layer, and wire indices are `u32`.
pub const MAX_VARIABLES: usize = u32::MAX as usize;

/// What a placeholder stands for once bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment<F> {
    /// An unconstrained circuit input.
    Free,
    /// A value fixed at compile time.
    Constant(F),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable<F> {
    assignment: Assignment<F>,
    bound: Option<ExprId>,
}

impl<F> Variable<F> {
    pub const fn free() -> Self {
        Self {
            assignment: Assignment::Free,
            bound: None,
        }
    }

    pub const fn constant(value: F) -> Self {
        Self {
            assignment: Assignment::Constant(value),
            bound: None,
        }
    }

    pub const fn assignment(&self) -> &Assignment<F> {
        &self.assignment
    }

    pub const fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Returns the expression this variable was bound to by the last compilation.
    pub fn expr(&self) -> Result<ExprId, CircuitBuilderError> {
        self.bound.ok_or_else(|| CircuitBuilderError::UnboundVariable {
            context: String::from("variable read before binding"),
        })
    }

    pub(crate) const fn set_bound(&mut self, expr: ExprId) {
        self.bound = Some(expr);
    }
}

impl<F> Default for Variable<F> {
    fn default() -> Self {
        Self::free()
    }
}

/// Hands out placeholders against a fixed variable budget.
#[derive(Debug, Clone)]
pub struct VariableAllocator {
    allocated: usize,
    limit: usize,
}

impl Default for VariableAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableAllocator {
    pub const fn new() -> Self {
        Self::with_limit(MAX_VARIABLES)
    }

    pub const fn with_limit(limit: usize) -> Self {
        Self {
            allocated: 0,
            limit,
        }
    }

    pub const fn allocated(&self) -> usize {
        self.allocated
    }

    /// Reserves `count` variables, failing before any memory is committed.
    pub const fn reserve(&mut self, count: usize) -> Result<(), CircuitBuilderError> {
        let available = self.limit - self.allocated;
        if count > available {
            return Err(CircuitBuilderError::VariableBudgetExceeded {
                requested: count,
                available,
            });
        }
        self.allocated += count;
        Ok(())
    }

    /// Allocates `count` free variables.
    pub fn alloc_free<F>(&mut self, count: usize) -> Result<Vec<Variable<F>>, CircuitBuilderError> {
        self.reserve(count)?;
        Ok((0..count).map(|_| Variable::free()).collect())
    }

    /// Allocates `count` free fixed-width vectors of variables.
    pub fn alloc_free_arrays<F, const W: usize>(
        &mut self,
        count: usize,
    ) -> Result<Vec<[Variable<F>; W]>, CircuitBuilderError> {
        let total = count
            .checked_mul(W)
            .ok_or_else(|| CircuitBuilderError::VariableCountOverflow {
                details: format!("{count} vectors of width {W}"),
            })?;
        self.reserve(total)?;
        Ok((0..count)
            .map(|_| core::array::from_fn(|_| Variable::free()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_variable_errors() {
        let var = Variable::<u32>::free();
        assert!(!var.is_bound());
        assert!(matches!(
            var.expr(),
            Err(CircuitBuilderError::UnboundVariable { .. })
        ));
    }

    #[test]
    fn test_binding_records_expr() {
        let mut var = Variable::constant(7u32);
        var.set_bound(ExprId(5));
        assert_eq!(var.expr().unwrap(), ExprId(5));
        assert_eq!(var.assignment(), &Assignment::Constant(7));
    }

    #[test]
    fn test_allocator_budget() {
        let mut alloc = VariableAllocator::with_limit(10);
        let vars = alloc.alloc_free::<u32>(4).unwrap();
        assert_eq!(vars.len(), 4);
        let arrays = alloc.alloc_free_arrays::<u32, 3>(2).unwrap();
        assert_eq!(arrays.len(), 2);
        assert_eq!(alloc.allocated(), 10);

        let err = alloc.alloc_free::<u32>(1).unwrap_err();
        assert!(matches!(
            err,
            CircuitBuilderError::VariableBudgetExceeded {
                requested: 1,
                available: 0
            }
        ));
    }

    #[test]
    fn test_allocator_overflow() {
        let mut alloc = VariableAllocator::new();
        let err = alloc.alloc_free_arrays::<u32, 16>(usize::MAX).unwrap_err();
        assert!(matches!(err, CircuitBuilderError::VariableCountOverflow { .. }));
    }
}
