//! Reverse-mode automatic differentiation over scalar expression graphs.
//!
//! Operations on [`Var`] record a new node holding the forward value and the
//! local derivative with respect to each operand. [`Var::backward`] then
//! walks the graph once and accumulates the total derivative into every node.

pub mod backwards;
pub mod error;
pub mod tape;

pub use backwards::{
    add, divide, force_var, leaf, multiply, negate, power, subtract, Operand, Var,
};
pub use error::DomainError;
pub use num_traits::Pow;
pub use tape::Tape;
