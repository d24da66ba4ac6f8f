//! Per-index payload functions.
//!
//! A payload maps an index to one sequence value. The engine calls payloads
//! from several worker threads at once and in no particular order, so every
//! implementation must be pure: the value for an index depends on nothing but
//! the index. Payloads may keep scratch state inside a single `compute` call,
//! never across calls.

use std::fmt;
use std::str::FromStr;

use num_bigint::{BigInt, BigUint};

use crate::error::PayloadError;
use crate::math::{fibonacci_pair, two_adic_valuation};

/// A pure, total `index -> value` function.
pub trait Payload: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn compute(&self, index: u64) -> Result<BigInt, PayloadError>;
}

impl<P: Payload + ?Sized> Payload for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn compute(&self, index: u64) -> Result<BigInt, PayloadError> {
        (**self).compute(index)
    }
}

/// Payload backed by a closure, see [`payload_fn`].
#[derive(Clone)]
pub struct FnPayload<F> {
    name: &'static str,
    f: F,
}

impl<F> fmt::Debug for FnPayload<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPayload")
            .field("name", &self.name)
            .finish()
    }
}

/// Wraps a closure as a [`Payload`].
///
/// ```
/// use adic_sequence::payload::{payload_fn, Payload};
/// use num_bigint::BigInt;
/// let squares = payload_fn("squares", |i| Ok(BigInt::from(i) * BigInt::from(i)));
/// assert_eq!(squares.compute(12).unwrap(), BigInt::from(144));
/// ```
pub fn payload_fn<F>(name: &'static str, f: F) -> FnPayload<F>
where
    F: Fn(u64) -> Result<BigInt, PayloadError> + Send + Sync,
{
    FnPayload { name, f }
}

impl<F> Payload for FnPayload<F>
where
    F: Fn(u64) -> Result<BigInt, PayloadError> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn compute(&self, index: u64) -> Result<BigInt, PayloadError> {
        (self.f)(index)
    }
}

/// 2-adic valuation of `L(i) = ((4m - 1) F(m) + 2m F(m + 1)) / 5` with
/// `m = 12i + 3`.
///
/// `F(m)` grows like `phi^m`, so index `i` costs a matrix power over integers
/// of roughly `8.3 i` bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lucas2Adic;

impl Lucas2Adic {
    const NAME: &'static str = "lucas-2adic";

    /// The `L(i)` term whose valuation is reported.
    pub fn term(index: u64) -> Result<BigUint, PayloadError> {
        let out_of_domain = || PayloadError::OutOfDomain {
            index,
            payload: Self::NAME,
        };
        let m = index
            .checked_mul(12)
            .and_then(|v| v.checked_add(3))
            .ok_or_else(out_of_domain)?;
        let four_m_minus_one = m.checked_mul(4).ok_or_else(out_of_domain)? - 1;
        let two_m = m.checked_mul(2).ok_or_else(out_of_domain)?;

        let (f_m, f_m1) = fibonacci_pair(m);
        let numerator = BigUint::from(four_m_minus_one) * f_m + BigUint::from(two_m) * f_m1;
        Ok(numerator / 5u32)
    }
}

impl Payload for Lucas2Adic {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn compute(&self, index: u64) -> Result<BigInt, PayloadError> {
        let term = Self::term(index)?;
        Ok(BigInt::from(two_adic_valuation(&term)))
    }
}

/// `F(i)` via matrix exponentiation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fibonacci;

impl Payload for Fibonacci {
    fn name(&self) -> &'static str {
        "fibonacci"
    }

    fn compute(&self, index: u64) -> Result<BigInt, PayloadError> {
        let (f_n, _) = fibonacci_pair(index);
        Ok(BigInt::from(f_n))
    }
}

/// Rudin-Shapiro sequence as 0/1: the parity of the number of `11` bit pairs
/// in `i`, so `0` where the signed sequence is `+1` and `1` where it is `-1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RudinShapiro;

impl Payload for RudinShapiro {
    fn name(&self) -> &'static str {
        "rudin-shapiro"
    }

    fn compute(&self, index: u64) -> Result<BigInt, PayloadError> {
        let pairs = (index & (index >> 1)).count_ones();
        Ok(BigInt::from(pairs % 2))
    }
}

/// Paperfolding sequence with `a(0) = 1`, `a(1) = 0`, `a(4k) = 1`,
/// `a(4k + 2) = 0` and `a(2k + 1) = a(k)` for `k >= 1`.
///
/// The odd chain ends at `a(1)` rather than `a(0)`, so every index of the form
/// `2^j - 1` with `j >= 1` is `0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Paperfolding;

impl Payload for Paperfolding {
    fn name(&self) -> &'static str {
        "paperfolding"
    }

    fn compute(&self, index: u64) -> Result<BigInt, PayloadError> {
        if index == 0 {
            return Ok(BigInt::from(1));
        }
        // a(2k + 1) = a(k) until the index is even, or the chain reaches a(1).
        let even = index.checked_shr(index.trailing_ones()).unwrap_or(0);
        let value = if even == 0 || even % 4 == 2 { 0 } else { 1 };
        Ok(BigInt::from(value))
    }
}

/// `i` itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Payload for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn compute(&self, index: u64) -> Result<BigInt, PayloadError> {
        Ok(BigInt::from(index))
    }
}

/// Payloads selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PayloadKind {
    #[default]
    #[value(name = "lucas-2adic")]
    Lucas2Adic,
    Fibonacci,
    RudinShapiro,
    Paperfolding,
    Identity,
}

impl PayloadKind {
    pub fn build(self) -> Box<dyn Payload> {
        match self {
            PayloadKind::Lucas2Adic => Box::new(Lucas2Adic),
            PayloadKind::Fibonacci => Box::new(Fibonacci),
            PayloadKind::RudinShapiro => Box::new(RudinShapiro),
            PayloadKind::Paperfolding => Box::new(Paperfolding),
            PayloadKind::Identity => Box::new(Identity),
        }
    }
}

impl FromStr for PayloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as clap::ValueEnum>::from_str(s, true)
    }
}
