use log::trace;
use num_traits::Pow;
use std::{
    cell::Cell,
    fmt,
    ops::{Add, Div, Mul, Neg, Sub},
    rc::Rc,
};

use crate::{error::DomainError, tape::Tape};

pub(crate) struct Node {
    value: f64,
    operands: Vec<Var>,
    local_grad: Vec<f64>,
    // Only field that changes after construction, and only by addition or reset.
    grad: Cell<f64>,
}

impl Drop for Node {
    fn drop(&mut self) {
        // Unlink operand chains iteratively so that a long expression does not
        // recurse once per node while being freed.
        let mut pending = std::mem::take(&mut self.operands);
        while let Some(Var(rc)) = pending.pop() {
            if let Ok(mut node) = Rc::try_unwrap(rc) {
                pending.append(&mut node.operands);
            }
        }
    }
}

/// A differentiable scalar: either a leaf or the result of one elementary
/// operation over earlier nodes.
///
/// Cloning a `Var` clones the handle, not the node; two clones refer to the
/// same value and share its accumulated derivative.
#[derive(Clone)]
pub struct Var(Rc<Node>);

impl Var {
    /// Creates a leaf node (an input or a constant).
    pub fn new(value: f64) -> Var {
        Var::from_operation(value, Vec::new(), Vec::new())
    }

    fn from_operation(value: f64, operands: Vec<Var>, local_grad: Vec<f64>) -> Var {
        debug_assert_eq!(operands.len(), local_grad.len());
        trace!(
            "node value={} operands={} local_grad={:?}",
            value,
            operands.len(),
            local_grad
        );
        Var(Rc::new(Node {
            value,
            operands,
            local_grad,
            grad: Cell::new(0.0),
        }))
    }

    pub fn value(&self) -> f64 {
        self.0.value
    }

    /// The derivative of the last traversal root(s) with respect to this node,
    /// summed over every backward pass since the last reset.
    pub fn grad(&self) -> f64 {
        self.0.grad.get()
    }

    pub fn operands(&self) -> &[Var] {
        &self.0.operands
    }

    /// ∂(self)/∂(operand), one entry per operand, fixed at construction.
    pub fn local_grads(&self) -> &[f64] {
        &self.0.local_grad
    }

    pub fn is_leaf(&self) -> bool {
        self.0.operands.is_empty()
    }

    /// Returns true when both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Var) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn key(&self) -> *const Node {
        Rc::as_ptr(&self.0)
    }

    pub(crate) fn accumulate(&self, grad: f64) {
        self.0.grad.set(self.0.grad.get() + grad);
    }

    /// Performs the backward pass from this variable with a seed of 1.0.
    pub fn backward(&self) {
        self.backward_with_seed(1.0);
    }

    pub fn backward_with_seed(&self, seed: f64) {
        Tape::new(self).backward_with_seed(seed);
    }

    /// Zeroes the accumulated derivative of every node reachable from here.
    pub fn reset(&self) {
        Tape::new(self).reset();
    }

    /// Zeroes the accumulated derivative of this node only.
    pub fn zero_grad(&self) {
        self.0.grad.set(0.0);
    }

    pub fn exp(&self) -> Var {
        let value = self.value().exp();
        Var::from_operation(value, vec![self.clone()], vec![value])
    }

    pub fn ln(&self) -> Result<Var, DomainError> {
        let x = self.value();
        if x <= 0.0 {
            return Err(DomainError::NonPositiveLogarithm { value: x });
        }
        Ok(Var::from_operation(x.ln(), vec![self.clone()], vec![1.0 / x]))
    }

    pub fn sin(&self) -> Var {
        let x = self.value();
        Var::from_operation(x.sin(), vec![self.clone()], vec![x.cos()])
    }

    pub fn cos(&self) -> Var {
        let x = self.value();
        Var::from_operation(x.cos(), vec![self.clone()], vec![-x.sin()])
    }

    pub fn tanh(&self) -> Var {
        let t = self.value().tanh();
        Var::from_operation(t, vec![self.clone()], vec![1.0 - t * t])
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("value", &self.value())
            .field("grad", &self.grad())
            .field("operands", &self.operands().len())
            .finish()
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Creates a leaf node.
pub fn leaf(value: f64) -> Var {
    Var::new(value)
}

/// Either side of an operation: an existing node or a raw scalar that still
/// has to become a constant leaf.
#[derive(Clone, Debug)]
pub enum Operand {
    Var(Var),
    Scalar(f64),
}

impl From<Var> for Operand {
    fn from(v: Var) -> Self {
        Operand::Var(v)
    }
}

impl From<&Var> for Operand {
    fn from(v: &Var) -> Self {
        Operand::Var(v.clone())
    }
}

impl From<f64> for Operand {
    fn from(x: f64) -> Self {
        Operand::Scalar(x)
    }
}

impl From<f32> for Operand {
    fn from(x: f32) -> Self {
        Operand::Scalar(x.into())
    }
}

impl From<i32> for Operand {
    fn from(x: i32) -> Self {
        Operand::Scalar(x.into())
    }
}

/// Resolves an operand into a node, wrapping raw scalars as fresh leaves.
pub fn force_var(x: impl Into<Operand>) -> Var {
    match x.into() {
        Operand::Var(v) => v,
        Operand::Scalar(value) => Var::new(value),
    }
}

pub fn add(a: impl Into<Operand>, b: impl Into<Operand>) -> Var {
    let (a, b) = (force_var(a), force_var(b));
    let value = a.value() + b.value();
    Var::from_operation(value, vec![a, b], vec![1.0, 1.0])
}

pub fn subtract(a: impl Into<Operand>, b: impl Into<Operand>) -> Var {
    let (a, b) = (force_var(a), force_var(b));
    let value = a.value() - b.value();
    Var::from_operation(value, vec![a, b], vec![1.0, -1.0])
}

pub fn multiply(a: impl Into<Operand>, b: impl Into<Operand>) -> Var {
    let (a, b) = (force_var(a), force_var(b));
    let (x, y) = (a.value(), b.value());
    Var::from_operation(x * y, vec![a, b], vec![y, x])
}

/// Fails when the divisor's value is exactly zero.
pub fn divide(a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Var, DomainError> {
    let (a, b) = (force_var(a), force_var(b));
    let (x, y) = (a.value(), b.value());
    if y == 0.0 {
        return Err(DomainError::ZeroDivisor { numerator: x });
    }
    Ok(Var::from_operation(
        x / y,
        vec![a, b],
        vec![1.0 / y, -x / (y * y)],
    ))
}

/// Raises `a` to a constant exponent. The exponent is not differentiated.
///
/// Fails for a negative base with a non-integer exponent.
pub fn power(a: impl Into<Operand>, exponent: f64) -> Result<Var, DomainError> {
    let a = force_var(a);
    let x = a.value();
    if x < 0.0 && exponent.fract() != 0.0 {
        return Err(DomainError::FractionalPowerOfNegative {
            base: x,
            exponent,
        });
    }
    let local = if exponent == 0.0 {
        0.0
    } else {
        exponent * x.powf(exponent - 1.0)
    };
    Ok(Var::from_operation(x.powf(exponent), vec![a], vec![local]))
}

pub fn negate(a: impl Into<Operand>) -> Var {
    let a = force_var(a);
    let value = -a.value();
    Var::from_operation(value, vec![a], vec![-1.0])
}

fn powi(a: Var, n: i32) -> Var {
    let x = a.value();
    let local = match n.checked_sub(1) {
        _ if n == 0 => 0.0,
        Some(m) => f64::from(n) * x.powi(m),
        None => f64::from(n) * x.powf(f64::from(n) - 1.0),
    };
    Var::from_operation(x.powi(n), vec![a], vec![local])
}

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $func:path, $output:ty) => {
        impl $trait<Var> for Var {
            type Output = $output;
            fn $method(self, rhs: Var) -> $output {
                $func(self, rhs)
            }
        }

        impl<'a> $trait<&'a Var> for Var {
            type Output = $output;
            fn $method(self, rhs: &'a Var) -> $output {
                $func(self, rhs)
            }
        }

        impl<'a> $trait<Var> for &'a Var {
            type Output = $output;
            fn $method(self, rhs: Var) -> $output {
                $func(self, rhs)
            }
        }

        impl<'a, 'b> $trait<&'b Var> for &'a Var {
            type Output = $output;
            fn $method(self, rhs: &'b Var) -> $output {
                $func(self, rhs)
            }
        }

        impl $trait<f64> for Var {
            type Output = $output;
            fn $method(self, rhs: f64) -> $output {
                $func(self, rhs)
            }
        }

        impl<'a> $trait<f64> for &'a Var {
            type Output = $output;
            fn $method(self, rhs: f64) -> $output {
                $func(self, rhs)
            }
        }

        impl $trait<Var> for f64 {
            type Output = $output;
            fn $method(self, rhs: Var) -> $output {
                $func(self, rhs)
            }
        }

        impl<'a> $trait<&'a Var> for f64 {
            type Output = $output;
            fn $method(self, rhs: &'a Var) -> $output {
                $func(self, rhs)
            }
        }
    };
}

binary_operator!(Add, add, add, Var);
binary_operator!(Sub, sub, subtract, Var);
binary_operator!(Mul, mul, multiply, Var);
binary_operator!(Div, div, divide, Result<Var, DomainError>);

impl Neg for Var {
    type Output = Var;

    fn neg(self) -> Var {
        negate(self)
    }
}

impl Neg for &Var {
    type Output = Var;

    fn neg(self) -> Var {
        negate(self)
    }
}

impl Pow<f64> for Var {
    type Output = Result<Var, DomainError>;

    fn pow(self, exponent: f64) -> Self::Output {
        power(self, exponent)
    }
}

impl Pow<f64> for &Var {
    type Output = Result<Var, DomainError>;

    fn pow(self, exponent: f64) -> Self::Output {
        power(self, exponent)
    }
}

// Integer exponents are defined for every base, so these cannot fail.
impl Pow<i32> for Var {
    type Output = Var;

    fn pow(self, n: i32) -> Var {
        powi(self, n)
    }
}

impl Pow<i32> for &Var {
    type Output = Var;

    fn pow(self, n: i32) -> Var {
        powi(self.clone(), n)
    }
}
