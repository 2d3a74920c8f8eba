// 💰 Budget Normalizer - raw amount text → canonical fixed-point value
//
// "1,234,500원" → 1234500.00 KRW
// "₩ 2,000.5"   → 2000.50 KRW
// "(1,000)"     → 0 + NegativeAmount flag

use crate::error::AmountError;
use crate::record::DataQualityFlag;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// Fractional digits kept by `Amount`
const SCALE: i64 = 100;

const CURRENCY_MARKERS: [&str; 6] = ["KRW", "krw", "원", "₩", "￦", "$"];
const SEPARATORS: [char; 2] = [',', '_'];

// ============================================================================
// AMOUNT
// ============================================================================

/// Fixed-point amount in won, stored as hundredths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_won(won: i64) -> Self {
        Amount(won.saturating_mul(SCALE))
    }

    pub fn from_hundredths(hundredths: i64) -> Self {
        Amount(hundredths)
    }

    pub fn hundredths(&self) -> i64 {
        self.0
    }

    /// Whole won, fractional part truncated
    pub fn won(&self) -> i64 {
        self.0 / SCALE
    }

    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Amount {
        iter.copied().sum()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = group_thousands(abs / SCALE as u64);
        let frac = abs % SCALE as u64;

        if frac == 0 {
            write!(f, "{}{}원", sign, whole)
        } else {
            write!(f, "{}{}.{:02}원", sign, whole, frac)
        }
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let won = f64::deserialize(deserializer)?;
        Ok(Amount((won * SCALE as f64).round() as i64))
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Parse a raw amount, keeping its sign.
///
/// Negative amounts are written either with a leading minus or in
/// accounting parentheses.
pub fn parse_signed(raw: &str) -> Result<Amount, AmountError> {
    let malformed = || AmountError::MalformedAmount {
        raw: raw.to_string(),
    };

    let mut text = raw.trim().to_string();
    for marker in CURRENCY_MARKERS {
        text = text.replace(marker, "");
    }
    text.retain(|c| !c.is_whitespace() && !SEPARATORS.contains(&c));

    let mut negative = false;
    if text.starts_with('(') && text.ends_with(')') && text.len() >= 2 {
        negative = true;
        text = text[1..text.len() - 1].to_string();
    }
    if let Some(rest) = text.strip_prefix(['-', '−']) {
        negative = !negative;
        text = rest.to_string();
    } else if let Some(rest) = text.strip_prefix('+') {
        text = rest.to_string();
    }

    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text.as_str(), ""),
    };

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
        return Err(malformed());
    }

    let whole_value: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| malformed())?
    };

    // Two kept digits, the third rounds half up
    let frac_digits: Vec<i64> = frac
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(i64::from)
        .collect();
    let mut frac_value = frac_digits.first().copied().unwrap_or(0) * 10
        + frac_digits.get(1).copied().unwrap_or(0);
    if frac_digits.get(2).copied().unwrap_or(0) >= 5 {
        frac_value += 1;
    }

    let hundredths = whole_value
        .checked_mul(SCALE)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(malformed)?;

    Ok(Amount(if negative { -hundredths } else { hundredths }))
}

/// Canonical non-negative amount. Negative inputs clamp to zero.
pub fn normalize(raw: &str) -> Result<Amount, AmountError> {
    parse_signed(raw).map(|amount| amount.max(Amount::ZERO))
}

/// Normalization that never fails: degraded input becomes zero plus a flag.
pub fn normalize_flagged(raw: &str) -> (Amount, Option<DataQualityFlag>) {
    match parse_signed(raw) {
        Ok(amount) if amount.is_negative() => (Amount::ZERO, Some(DataQualityFlag::NegativeAmount)),
        Ok(amount) => (amount, None),
        Err(_) => (Amount::ZERO, Some(DataQualityFlag::MalformedAmount)),
    }
}

// ============================================================================
// TESTS
// ============================================================================
