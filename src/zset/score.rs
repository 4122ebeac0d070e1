//! Score keys and bounds.

use std::fmt;

use crate::error::{Error, Result};

/// An order-preserving integer image of a non-NaN `f64`.
///
/// Flipping the sign bit of non-negative floats and every bit of negative ones
/// turns IEEE 754 ordering into plain unsigned ordering. `-0.0` is folded into
/// `0.0` first, so both land in one bucket.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScoreKey(u64);

const SIGN: u64 = 1 << 63;

impl ScoreKey {
    /// # Panics
    /// Panics on NaN; scores are validated before they reach a bucket.
    pub fn new(score: f64) -> Self {
        assert!(!score.is_nan(), "NaN score reached the score index");
        let score = if score == 0.0 { 0.0 } else { score };
        let bits = score.to_bits();
        if bits & SIGN == 0 {
            ScoreKey(bits | SIGN)
        } else {
            ScoreKey(!bits)
        }
    }

    /// Big-endian bytes; byte order matches score order.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(ScoreKey(u64::from_be_bytes(bytes.try_into().ok()?)))
    }

    pub fn score(self) -> f64 {
        if self.0 & SIGN != 0 {
            f64::from_bits(self.0 & !SIGN)
        } else {
            f64::from_bits(!self.0)
        }
    }
}

impl fmt::Debug for ScoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScoreKey({})", self.score())
    }
}

/// Reject NaN; everything else, infinities included, is a valid score.
pub fn check_score(score: f64) -> Result<f64> {
    if score.is_nan() {
        return Err(Error::InvalidScore("NaN".to_string()));
    }
    Ok(score)
}

/// Parse a textual score. Accepts anything `f64` parses (`inf`, `-inf`,
/// exponents) except NaN.
pub fn parse_score(text: &str) -> Result<f64> {
    let score: f64 = text
        .trim()
        .parse()
        .map_err(|_| Error::InvalidScore(text.to_string()))?;
    if score.is_nan() {
        return Err(Error::InvalidScore(text.to_string()));
    }
    Ok(score)
}

/// One end of a score range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    Inclusive(f64),
    Exclusive(f64),
}

impl ScoreBound {
    pub const MIN: ScoreBound = ScoreBound::Inclusive(f64::NEG_INFINITY);
    pub const MAX: ScoreBound = ScoreBound::Inclusive(f64::INFINITY);

    pub fn value(self) -> f64 {
        match self {
            ScoreBound::Inclusive(v) | ScoreBound::Exclusive(v) => v,
        }
    }

    /// A NaN bound admits no score.
    pub fn is_nan(self) -> bool {
        self.value().is_nan()
    }

    /// `score` lies above this bound used as a range minimum.
    #[inline]
    pub fn admits_from_below(self, score: f64) -> bool {
        match self {
            ScoreBound::Inclusive(v) => score >= v,
            ScoreBound::Exclusive(v) => score > v,
        }
    }

    /// `score` lies below this bound used as a range maximum.
    #[inline]
    pub fn admits_from_above(self, score: f64) -> bool {
        match self {
            ScoreBound::Inclusive(v) => score <= v,
            ScoreBound::Exclusive(v) => score < v,
        }
    }
}

/// Parse `1.5` (inclusive), `(1.5` (exclusive), `-inf` or `+inf`.
pub fn parse_score_bound(text: &str) -> Result<ScoreBound> {
    match text.trim().strip_prefix('(') {
        Some(rest) => Ok(ScoreBound::Exclusive(parse_score(rest)?)),
        None => Ok(ScoreBound::Inclusive(parse_score(text)?)),
    }
}
