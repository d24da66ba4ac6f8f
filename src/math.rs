use num_bigint::BigUint;
use num_traits::{One, Zero};

// Matrix structure for 2x2 matrices
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Matrix {
    pub a: BigUint,
    pub b: BigUint,
    pub c: BigUint,
    pub d: BigUint,
}

impl Matrix {
    pub fn identity() -> Self {
        Matrix {
            a: BigUint::one(),
            b: BigUint::zero(),
            c: BigUint::zero(),
            d: BigUint::one(),
        }
    }

    /// The Fibonacci Q-matrix `[[1, 1], [1, 0]]`.
    pub fn fibonacci_q() -> Self {
        Matrix {
            a: BigUint::one(),
            b: BigUint::one(),
            c: BigUint::one(),
            d: BigUint::zero(),
        }
    }
}

// Matrix multiplication for 2x2 matrices
pub fn matrix_mult(m1: &Matrix, m2: &Matrix) -> Matrix {
    Matrix {
        a: &m1.a * &m2.a + &m1.b * &m2.c,
        b: &m1.a * &m2.b + &m1.b * &m2.d,
        c: &m1.c * &m2.a + &m1.d * &m2.c,
        d: &m1.c * &m2.b + &m1.d * &m2.d,
    }
}

// Matrix exponentiation using squaring (O(log n))
pub fn matrix_pow(mut base: Matrix, mut exp: u64) -> Matrix {
    let mut result = Matrix::identity();

    while exp > 0 {
        if exp & 1 == 1 {
            result = matrix_mult(&result, &base);
        }
        exp >>= 1;
        if exp > 0 {
            base = matrix_mult(&base, &base);
        }
    }

    result
}

/// Returns `(F(n), F(n + 1))` from a single exponentiation of the Q-matrix.
///
/// `Q^n = [[F(n+1), F(n)], [F(n), F(n-1)]]`, so both terms needed by the
/// Lucas-style payloads come out of one `O(log n)` power.
///
/// ```
/// use adic_sequence::math::fibonacci_pair;
/// use num_bigint::BigUint;
/// let (f10, f11) = fibonacci_pair(10);
/// assert_eq!(f10, BigUint::from(55u32));
/// assert_eq!(f11, BigUint::from(89u32));
/// ```
pub fn fibonacci_pair(n: u64) -> (BigUint, BigUint) {
    let powered = matrix_pow(Matrix::fibonacci_q(), n);
    (powered.b, powered.a)
}

/// Number of times 2 divides `value`; zero is defined to have valuation 0.
pub fn two_adic_valuation(value: &BigUint) -> u64 {
    value.trailing_zeros().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pow_zero_is_identity() {
        assert_eq!(matrix_pow(Matrix::fibonacci_q(), 0), Matrix::identity());
    }

    #[test]
    fn fibonacci_pair_matches_iteration() {
        let (mut a, mut b) = (BigUint::zero(), BigUint::one());
        for n in 0..200u64 {
            assert_eq!(fibonacci_pair(n), (a.clone(), b.clone()), "n = {n}");
            let next = &a + &b;
            a = b;
            b = next;
        }
    }

    #[test]
    fn valuation_counts_trailing_zero_bits() {
        assert_eq!(two_adic_valuation(&BigUint::zero()), 0);
        assert_eq!(two_adic_valuation(&BigUint::from(1u32)), 0);
        assert_eq!(two_adic_valuation(&BigUint::from(13120u32)), 6);
        assert_eq!(two_adic_valuation(&(BigUint::one() << 300u32)), 300);
    }
}
