//! Log-space probability semiring.
//!
//! Every probability is carried as its natural logarithm, so products of
//! many small derivation scores stay finite. Addition is log-sum-exp
//! anchored at the larger operand; subtraction refuses to produce a
//! negative probability.

use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};
use std::str::FromStr;

use crate::{LogprobError, LogprobResult};

/// A probability stored as its natural logarithm.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Logprob(f64);

impl Logprob {
    /// Wrap a linear-domain probability (takes its logarithm).
    pub fn new(p: f64) -> Self {
        Logprob(p.ln())
    }

    /// Wrap a value that is already in log domain, e.g. a network score.
    pub const fn from_log(x: f64) -> Self {
        Logprob(x)
    }

    /// The semiring zero: probability 0, log value −∞.
    pub const fn zero() -> Self {
        Logprob(f64::NEG_INFINITY)
    }

    /// The semiring one: probability 1, log value 0.
    pub const fn one() -> Self {
        Logprob(0.0)
    }

    /// Largest representable value.
    pub const fn max_value() -> Self {
        Logprob(f64::INFINITY)
    }

    /// Smallest representable value (same as [`Logprob::zero`]).
    pub const fn min_value() -> Self {
        Logprob(f64::NEG_INFINITY)
    }

    /// The underlying log value.
    pub fn ln(self) -> f64 {
        self.0
    }

    /// Back to the linear domain.
    pub fn to_linear(self) -> f64 {
        self.0.exp()
    }

    /// Raise to a real power (scales the log value).
    pub fn pow(self, y: f64) -> Self {
        Logprob(self.0 * y)
    }

    /// Whether this is the semiring zero.
    pub fn is_zero(self) -> bool {
        self.0 == f64::NEG_INFINITY
    }

    /// Probability difference.
    ///
    /// Errors with [`LogprobError::InvalidMinus`] when the subtrahend
    /// exceeds the minuend: a derivation's sub-probability exceeding its
    /// whole is an invariant violation, never clamped.
    pub fn checked_sub(self, rhs: Logprob) -> LogprobResult<Logprob> {
        if rhs > self {
            return Err(LogprobError::InvalidMinus);
        }
        if self == rhs {
            return Ok(Logprob::zero());
        }
        let ratio = (rhs.0 - self.0).exp();
        if ratio == 1.0 {
            Ok(Logprob::zero())
        } else {
            Ok(Logprob(self.0 + (-ratio).ln_1p()))
        }
    }
}

impl Add for Logprob {
    type Output = Logprob;

    fn add(mut self, rhs: Logprob) -> Logprob {
        self += rhs;
        self
    }
}

impl AddAssign for Logprob {
    /// Probability OR: log-sum-exp anchored at the larger operand.
    fn add_assign(&mut self, rhs: Logprob) {
        if self.is_zero() {
            self.0 = rhs.0;
            return;
        }
        if rhs.is_zero() {
            return;
        }
        if self.0 <= rhs.0 {
            self.0 = rhs.0 + (self.0 - rhs.0).exp().ln_1p();
        } else {
            self.0 += (rhs.0 - self.0).exp().ln_1p();
        }
    }
}

impl Sub for Logprob {
    type Output = Logprob;

    /// Panics when `rhs > self`; use [`Logprob::checked_sub`] to handle the
    /// invalid-minus condition as a value.
    fn sub(self, rhs: Logprob) -> Logprob {
        match self.checked_sub(rhs) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

impl SubAssign for Logprob {
    fn sub_assign(&mut self, rhs: Logprob) {
        *self = *self - rhs;
    }
}

impl Mul for Logprob {
    type Output = Logprob;

    /// Probability AND: sum of logs.
    fn mul(self, rhs: Logprob) -> Logprob {
        Logprob(self.0 + rhs.0)
    }
}

impl MulAssign for Logprob {
    fn mul_assign(&mut self, rhs: Logprob) {
        self.0 += rhs.0;
    }
}

impl Div for Logprob {
    type Output = Logprob;

    /// Probability ratio: difference of logs.
    fn div(self, rhs: Logprob) -> Logprob {
        Logprob(self.0 - rhs.0)
    }
}

impl DivAssign for Logprob {
    fn div_assign(&mut self, rhs: Logprob) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Logprob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Logprob {
    type Err = std::num::ParseFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Logprob::from_log(s.parse()?))
    }
}
