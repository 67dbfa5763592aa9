use thiserror::Error;

/// Failures detected while evaluating an operation forward.
///
/// Every variant is raised at node-construction time; the backward pass only
/// reads local derivatives that were already validated.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum DomainError {
    #[error("division of {numerator} by zero")]
    ZeroDivisor { numerator: f64 },

    #[error("negative base {base} raised to non-integer exponent {exponent}")]
    FractionalPowerOfNegative { base: f64, exponent: f64 },

    #[error("logarithm of non-positive value {value}")]
    NonPositiveLogarithm { value: f64 },
}
