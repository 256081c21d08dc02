use core::fmt::Debug;
use core::hash::Hash;

use p3_field::{Field, PrimeField64};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{CircuitBuilder, CircuitBuilderError};

/// Trait encapsulating the field requirements of circuits
pub trait CircuitField:
    Field + PrimeField64 + Debug + Hash + Serialize + DeserializeOwned
{
}

impl<F> CircuitField for F where
    F: Field + PrimeField64 + Debug + Hash + Serialize + DeserializeOwned
{
}

/// A circuit description: placeholders plus the logic checking them.
///
/// The compiler first calls [`Circuit::bind`] on a fresh builder so every placeholder
/// gets a wire, then [`Circuit::define`] to emit the constraints.
pub trait Circuit<F: CircuitField> {
    /// Binds every placeholder of the description, in declaration order.
    fn bind(&mut self, api: &mut CircuitBuilder<F>) -> Result<(), CircuitBuilderError>;

    /// Emits the checking logic over the bound placeholders.
    fn define(&self, api: &mut CircuitBuilder<F>) -> Result<(), CircuitBuilderError>;
}
