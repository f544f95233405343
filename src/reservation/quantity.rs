//! Exact resource quantities in Kubernetes notation.
//!
//! A quantity is a signed decimal magnitude followed by an optional suffix:
//! binary SI (`Ki`, `Mi`, ... `Ei`), decimal SI (`n`, `u`, `m`, `k`, ... `E`)
//! or a decimal exponent (`e3`, `E-6`). Values are held exactly and only turn
//! into floats through [`ResourceQuantity::as_f64`].

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Precision floor: anything finer than a nano-unit is rounded up.
const NANO_SCALE: u32 = 9;

const BINARY_SUFFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

const MIN_DECIMAL_EXPONENT: i32 = -9;
const MAX_DECIMAL_SI_EXPONENT: i32 = 18;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,

    #[error("malformed number {0:?}")]
    InvalidNumber(String),

    #[error("unknown suffix {0:?}")]
    UnknownSuffix(String),

    #[error("magnitude out of range")]
    OutOfRange,
}

/// Notation a quantity was written in, reused when it is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantityFormat {
    #[default]
    DecimalSI,
    BinarySI,
    DecimalExponent,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceQuantity {
    value: Decimal,
    format: QuantityFormat,
}

impl ResourceQuantity {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, QuantityError> {
        if text.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, unsigned) = match text.as_bytes()[0] {
            b'+' => (false, &text[1..]),
            b'-' => (true, &text[1..]),
            _ => (false, text),
        };

        let split = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(split);

        let has_digit = number.bytes().any(|b| b.is_ascii_digit());
        if !has_digit || number.matches('.').count() > 1 {
            return Err(QuantityError::InvalidNumber(text.to_string()));
        }

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        let (exponent, factor, format) = parse_suffix(suffix)?;

        let mut digits = format!("{}{}", whole, fraction);
        if factor != 1 {
            digits = multiply_digits(&digits, factor);
        }

        let exponent = exponent - fraction.len() as i64;
        let magnitude = nano_rounded(&digits, exponent)?;
        let value = if negative { -magnitude } else { magnitude };

        Ok(Self { value, format })
    }

    pub fn format(&self) -> QuantityFormat {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Float approximation of the exact value, used for ratios and gauges.
    pub fn as_f64(&self) -> f64 {
        self.value.to_f64().unwrap_or(f64::NAN)
    }

    /// Adds `other` in place. A zero accumulator adopts the notation of the
    /// first value added to it.
    pub fn try_add(&mut self, other: &ResourceQuantity) -> Result<(), QuantityError> {
        let sum = self
            .value
            .checked_add(other.value)
            .ok_or(QuantityError::OutOfRange)?;

        if self.value.is_zero() {
            self.format = other.format;
        }
        self.value = sum;

        Ok(())
    }

    fn binary_canonical(&self) -> Option<String> {
        let value = self.value.normalize();
        if value.scale() != 0 {
            return None;
        }

        let mut mantissa = value.mantissa();
        let mut exponent = 0;
        while mantissa != 0 && mantissa % 1024 == 0 && exponent < BINARY_SUFFIXES.len() - 1 {
            mantissa /= 1024;
            exponent += 1;
        }

        Some(format!("{}{}", mantissa, BINARY_SUFFIXES[exponent]))
    }

    fn decimal_canonical(&self) -> String {
        let value = self.value.normalize();
        if value.is_zero() {
            return "0".to_string();
        }

        let mut mantissa = value.mantissa();
        let mut exponent = -(value.scale() as i32);
        while mantissa % 10 == 0 {
            mantissa /= 10;
            exponent += 1;
        }

        let mut shift = (exponent.div_euclid(3) * 3).max(MIN_DECIMAL_EXPONENT);
        if self.format == QuantityFormat::DecimalSI {
            shift = shift.min(MAX_DECIMAL_SI_EXPONENT);
        }
        mantissa *= 10i128.pow((exponent - shift) as u32);

        let suffix = match self.format {
            QuantityFormat::DecimalExponent if shift != 0 => format!("e{}", shift),
            QuantityFormat::DecimalExponent => String::new(),
            _ => decimal_si_suffix(shift).to_string(),
        };

        format!("{}{}", mantissa, suffix)
    }
}

/// Splits a suffix into a power of ten, an integer factor and the notation.
fn parse_suffix(suffix: &str) -> Result<(i64, u64, QuantityFormat), QuantityError> {
    let decimal_si = |exponent: i64| Ok((exponent, 1, QuantityFormat::DecimalSI));

    match suffix {
        "" => decimal_si(0),
        "n" => decimal_si(-9),
        "u" => decimal_si(-6),
        "m" => decimal_si(-3),
        "k" => decimal_si(3),
        "M" => decimal_si(6),
        "G" => decimal_si(9),
        "T" => decimal_si(12),
        "P" => decimal_si(15),
        "E" => decimal_si(18),
        _ => {
            if let Some(power) = BINARY_SUFFIXES.iter().position(|s| *s == suffix) {
                return Ok((0, 1u64 << (10 * power), QuantityFormat::BinarySI));
            }

            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))
                .and_then(|digits| digits.parse::<i32>().ok())
                .ok_or_else(|| QuantityError::UnknownSuffix(suffix.to_string()))?;

            Ok((i64::from(exponent), 1, QuantityFormat::DecimalExponent))
        }
    }
}

/// Multiplies a string of decimal digits by `factor`.
fn multiply_digits(digits: &str, factor: u64) -> String {
    let mut product = Vec::with_capacity(digits.len() + 20);
    let mut carry: u128 = 0;

    for digit in digits.bytes().rev() {
        let step = u128::from(digit - b'0') * u128::from(factor) + carry;
        product.push(b'0' + (step % 10) as u8);
        carry = step / 10;
    }
    while carry > 0 {
        product.push(b'0' + (carry % 10) as u8);
        carry /= 10;
    }

    product.iter().rev().map(|&b| char::from(b)).collect()
}

/// Value of `digits * 10^exponent`, rounded up to a whole nano-unit.
///
/// Digits below the nano place are cut off as text so that arbitrarily fine
/// inputs still round up instead of vanishing in a fixed-width parse.
fn nano_rounded(digits: &str, exponent: i64) -> Result<Decimal, QuantityError> {
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let shift = exponent + i64::from(NANO_SCALE);
    let mut nanos: i128 = if shift < 0 {
        let dropped = usize::try_from(shift.unsigned_abs()).unwrap_or(usize::MAX);
        let (kept, rest) = digits.split_at(digits.len().saturating_sub(dropped));

        let kept = if kept.is_empty() {
            0
        } else {
            kept.parse::<i128>().map_err(|_| QuantityError::OutOfRange)?
        };
        if rest.bytes().any(|b| b != b'0') {
            kept.checked_add(1).ok_or(QuantityError::OutOfRange)?
        } else {
            kept
        }
    } else {
        let base = digits
            .parse::<i128>()
            .map_err(|_| QuantityError::OutOfRange)?;
        u32::try_from(shift)
            .ok()
            .and_then(|shift| 10i128.checked_pow(shift))
            .and_then(|scale| base.checked_mul(scale))
            .ok_or(QuantityError::OutOfRange)?
    };

    let mut scale = NANO_SCALE;
    while scale > 0 && nanos % 10 == 0 {
        nanos /= 10;
        scale -= 1;
    }

    Decimal::try_from_i128_with_scale(nanos, scale).map_err(|_| QuantityError::OutOfRange)
}

fn decimal_si_suffix(exponent: i32) -> &'static str {
    match exponent {
        -9 => "n",
        -6 => "u",
        -3 => "m",
        3 => "k",
        6 => "M",
        9 => "G",
        12 => "T",
        15 => "P",
        18 => "E",
        _ => "",
    }
}

impl fmt::Display for ResourceQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Binary notation only pays off from 1Ki upwards.
        if self.format == QuantityFormat::BinarySI && self.value.abs() >= Decimal::from(1024) {
            if let Some(text) = self.binary_canonical() {
                return f.write_str(&text);
            }
        }
        f.write_str(&self.decimal_canonical())
    }
}

impl PartialEq for ResourceQuantity {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for ResourceQuantity {}

impl FromStr for ResourceQuantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&Quantity> for ResourceQuantity {
    type Error = QuantityError;

    fn try_from(quantity: &Quantity) -> Result<Self, Self::Error> {
        Self::parse(&quantity.0)
    }
}

impl From<&ResourceQuantity> for Quantity {
    fn from(quantity: &ResourceQuantity) -> Self {
        Quantity(quantity.to_string())
    }
}

impl Serialize for ResourceQuantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourceQuantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
