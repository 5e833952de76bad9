use super::{Rank, RankGenerator};
use crate::errors::RankError;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RADIX: u64 = 36;
const INTEGER_DIGITS: usize = 6;
const STEP: u64 = 8;
// "100000" and "z00000"
const INITIAL_MIN: u64 = 60_466_176;
const INITIAL_MAX: u64 = 2_116_316_160;
// "zzzzzz"
const MAX_INTEGER: u64 = 2_176_782_335;

pub const MAX_FRACTION_DIGITS: usize = 32;

/// Fixed-point base-36 value: six integer digits followed by fraction digits,
/// canonical when the fraction has no trailing zeros.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Decimal {
    digits: Vec<u8>,
}

impl Decimal {
    fn zero() -> Self {
        Self::from_integer(0)
    }

    fn from_integer(mut value: u64) -> Self {
        let mut digits = vec![0u8; INTEGER_DIGITS];
        for slot in digits.iter_mut().rev() {
            *slot = (value % RADIX) as u8;
            value /= RADIX;
        }
        Self { digits }
    }

    fn from_rank(rank: &Rank) -> Self {
        let digits = rank
            .integer_part()
            .bytes()
            .chain(rank.fraction_part().bytes())
            .map(digit_value)
            .collect();
        Self::canonical(digits)
    }

    fn canonical(mut digits: Vec<u8>) -> Self {
        while digits.len() > INTEGER_DIGITS && digits.last() == Some(&0) {
            digits.pop();
        }
        Self { digits }
    }

    fn integer(&self) -> u64 {
        self.digits[..INTEGER_DIGITS]
            .iter()
            .fold(0u64, |acc, digit| acc * RADIX + u64::from(*digit))
    }

    fn scale(&self) -> usize {
        self.digits.len() - INTEGER_DIGITS
    }

    fn has_fraction(&self) -> bool {
        self.scale() > 0
    }

    fn truncate(&self, scale: usize) -> Self {
        let end = (INTEGER_DIGITS + scale).min(self.digits.len());
        Self::canonical(self.digits[..end].to_vec())
    }

    /// Exact midpoint; one extra fraction digit always suffices because the
    /// radix is even.
    fn midpoint(a: &Self, b: &Self) -> Self {
        let len = a.digits.len().max(b.digits.len());
        let mut sum = vec![0u8; len + 1];
        let mut carry = 0u8;
        for index in (0..len).rev() {
            let left = a.digits.get(index).copied().unwrap_or(0);
            let right = b.digits.get(index).copied().unwrap_or(0);
            let total = left + right + carry;
            sum[index + 1] = total % RADIX as u8;
            carry = total / RADIX as u8;
        }
        sum[0] = carry;

        let mut half = Vec::with_capacity(sum.len() + 1);
        let mut remainder = 0u8;
        for digit in sum {
            let current = remainder * RADIX as u8 + digit;
            half.push(current / 2);
            remainder = current % 2;
        }
        if remainder == 1 {
            half.push((RADIX / 2) as u8);
        }
        // The sum of two six-digit integers halves back into six digits.
        half.remove(0);
        Self::canonical(half)
    }

    fn render(&self, bucket: u8) -> Rank {
        let mut out = String::with_capacity(self.digits.len() + 3);
        out.push((b'0' + bucket) as char);
        out.push('|');
        for (index, digit) in self.digits.iter().enumerate() {
            if index == INTEGER_DIGITS {
                out.push(':');
            }
            out.push(ALPHABET[*digit as usize] as char);
        }
        if self.digits.len() == INTEGER_DIGITS {
            out.push(':');
        }
        Rank::from_canonical(out)
    }
}

fn digit_value(byte: u8) -> u8 {
    match byte {
        b'0'..=b'9' => byte - b'0',
        _ => byte - b'a' + 10,
    }
}

/// LexoRank-compatible generator working inside one rank bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexoRankGenerator {
    bucket: u8,
}

impl LexoRankGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(bucket: u8) -> Self {
        Self { bucket: bucket.min(2) }
    }

    fn between_decimals(
        &self,
        lower: &Decimal,
        upper: &Decimal,
        bucket: u8,
    ) -> Result<Decimal, RankError> {
        if lower >= upper {
            return Err(RankError::NoRoom {
                lower: lower.render(bucket).to_string(),
                upper: upper.render(bucket).to_string(),
            });
        }
        let mid = Decimal::midpoint(lower, upper);
        let shortest = (0..=mid.scale())
            .map(|scale| mid.truncate(scale))
            .find(|candidate| candidate > lower)
            .unwrap_or(mid);
        if shortest.scale() > MAX_FRACTION_DIGITS {
            return Err(RankError::PrecisionExhausted {
                lower: lower.render(bucket).to_string(),
                upper: upper.render(bucket).to_string(),
            });
        }
        Ok(shortest)
    }
}

impl RankGenerator for LexoRankGenerator {
    fn min(&self) -> Rank {
        Decimal::zero().render(self.bucket)
    }

    fn max(&self) -> Rank {
        Decimal::from_integer(MAX_INTEGER).render(self.bucket)
    }

    fn middle(&self) -> Rank {
        let min = Decimal::zero();
        let max = Decimal::from_integer(MAX_INTEGER);
        Decimal::midpoint(&min, &max).truncate(0).render(self.bucket)
    }

    fn between(&self, lower: &Rank, upper: &Rank) -> Result<Rank, RankError> {
        if lower.bucket() != upper.bucket() {
            return Err(RankError::BucketMismatch {
                lower: lower.to_string(),
                upper: upper.to_string(),
            });
        }
        let lower_decimal = Decimal::from_rank(lower);
        let upper_decimal = Decimal::from_rank(upper);
        self.between_decimals(&lower_decimal, &upper_decimal, lower.bucket())
            .map(|value| value.render(lower.bucket()))
    }

    fn next(&self, rank: &Rank) -> Result<Rank, RankError> {
        let bucket = rank.bucket();
        let current = Decimal::from_rank(rank);
        if current == Decimal::zero() {
            return Ok(Decimal::from_integer(INITIAL_MIN).render(bucket));
        }
        let ceiling = current.integer() + u64::from(current.has_fraction());
        let candidate = ceiling + STEP;
        if candidate >= MAX_INTEGER {
            let max = Decimal::from_integer(MAX_INTEGER);
            return self
                .between_decimals(&current, &max, bucket)
                .map(|value| value.render(bucket));
        }
        Ok(Decimal::from_integer(candidate).render(bucket))
    }

    fn prev(&self, rank: &Rank) -> Result<Rank, RankError> {
        let bucket = rank.bucket();
        let current = Decimal::from_rank(rank);
        if current == Decimal::from_integer(MAX_INTEGER) {
            return Ok(Decimal::from_integer(INITIAL_MAX).render(bucket));
        }
        let floor = current.integer();
        if floor <= STEP {
            return self
                .between_decimals(&Decimal::zero(), &current, bucket)
                .map(|value| value.render(bucket));
        }
        Ok(Decimal::from_integer(floor - STEP).render(bucket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cmp::Ordering;

    fn rank(value: &str) -> Rank {
        Rank::parse(value).expect("valid rank")
    }

    #[test]
    fn canonical_bounds_and_middle() {
        let generator = LexoRankGenerator::new();
        assert_eq!(generator.min().as_str(), "0|000000:");
        assert_eq!(generator.max().as_str(), "0|zzzzzz:");
        assert_eq!(generator.middle().as_str(), "0|hzzzzz:");
    }

    #[test]
    fn between_min_and_max_succeeds_on_fresh_generator() {
        let generator = LexoRankGenerator::new();
        let value = generator
            .between(&generator.min(), &generator.max())
            .expect("room between bounds");
        assert_eq!(value, generator.middle());
    }

    #[test]
    fn between_adjacent_integers_extends_fraction() {
        let generator = LexoRankGenerator::new();
        let value = generator
            .between(&rank("0|hzzzzz:"), &rank("0|i00000:"))
            .expect("fraction room");
        assert_eq!(value.as_str(), "0|hzzzzz:i");

        let deeper = generator
            .between(&rank("0|hzzzzz:"), &value)
            .expect("deeper room");
        assert_eq!(deeper.as_str(), "0|hzzzzz:9");
    }

    #[test]
    fn between_prefers_shortest_value() {
        let generator = LexoRankGenerator::new();
        let value = generator
            .between(&rank("0|100000:"), &rank("0|200000:"))
            .expect("room");
        assert_eq!(value.as_str(), "0|1i0000:");
    }

    #[test]
    fn between_rejects_equal_reversed_and_mixed_bucket_inputs() {
        let generator = LexoRankGenerator::new();
        let a = rank("0|100000:");
        let b = rank("0|200000:");
        assert!(matches!(generator.between(&a, &a), Err(RankError::NoRoom { .. })));
        assert!(matches!(generator.between(&b, &a), Err(RankError::NoRoom { .. })));
        assert!(matches!(
            generator.between(&a, &rank("1|200000:")),
            Err(RankError::BucketMismatch { .. })
        ));
    }

    #[test]
    fn repeated_bisection_eventually_exhausts_precision() {
        let generator = LexoRankGenerator::new();
        let lower = rank("0|hzzzzz:");
        let mut upper = rank("0|i00000:");
        let mut failure = None;
        for _ in 0..400 {
            match generator.between(&lower, &upper) {
                Ok(value) => upper = value,
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }
        assert!(matches!(failure, Some(RankError::PrecisionExhausted { .. })));
    }

    #[test]
    fn next_steps_from_the_bottom_of_the_space() {
        let generator = LexoRankGenerator::new();
        let first = generator.next(&generator.min()).expect("next of min");
        assert_eq!(first.as_str(), "0|100000:");
        let second = generator.next(&first).expect("next");
        assert_eq!(second.as_str(), "0|100008:");
        let fractional = generator.next(&rank("0|100008:5")).expect("next of fraction");
        assert_eq!(fractional.as_str(), "0|10000h:");
    }

    #[test]
    fn next_near_max_bisects_and_fails_on_max() {
        let generator = LexoRankGenerator::new();
        let near = rank("0|zzzzzx:");
        let value = generator.next(&near).expect("room below max");
        assert!(value > near && value < generator.max());
        assert!(generator.next(&generator.max()).is_err());
    }

    #[test]
    fn prev_mirrors_next() {
        let generator = LexoRankGenerator::new();
        assert_eq!(generator.prev(&generator.max()).expect("prev max").as_str(), "0|z00000:");
        assert_eq!(generator.prev(&rank("0|10000g:")).expect("prev").as_str(), "0|100008:");
        let low = rank("0|000005:");
        let value = generator.prev(&low).expect("room above min");
        assert!(value < low && value > generator.min());
        assert!(generator.prev(&generator.min()).is_err());
    }

    #[test]
    fn bucket_is_preserved() {
        let generator = LexoRankGenerator::with_bucket(1);
        assert_eq!(generator.middle().as_str(), "1|hzzzzz:");
        let next = generator.next(&generator.middle()).expect("next");
        assert_eq!(next.bucket(), 1);
    }

    fn arb_rank() -> impl Strategy<Value = Rank> {
        ("[0-9a-z]{6}", "[0-9a-z]{0,4}").prop_map(|(integer, fraction)| {
            Rank::parse(&format!("0|{}:{}", integer, fraction)).expect("generated rank")
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_compare_is_antisymmetric_and_transitive(a in arb_rank(), b in arb_rank(), c in arb_rank()) {
            let generator = LexoRankGenerator::new();
            prop_assert_eq!(generator.compare(&a, &b), generator.compare(&b, &a).reverse());
            if generator.compare(&a, &b) != Ordering::Greater && generator.compare(&b, &c) != Ordering::Greater {
                prop_assert_ne!(generator.compare(&a, &c), Ordering::Greater);
            }
        }

        #[test]
        fn prop_between_is_strictly_inside(a in arb_rank(), b in arb_rank()) {
            prop_assume!(a != b);
            let (lower, upper) = if a < b { (a, b) } else { (b, a) };
            let generator = LexoRankGenerator::new();
            let value = generator.between(&lower, &upper).expect("room between distinct ranks");
            prop_assert!(lower < value);
            prop_assert!(value < upper);
        }
    }
}
