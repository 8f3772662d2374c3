//! Resource quantity parsing and scaling
//!
//! Quantities follow the Kubernetes notation: a signed decimal number followed
//! by an optional SI suffix (`m`, `k`, `M`, ...), binary suffix (`Ki`, `Mi`,
//! ...) or decimal exponent (`e3`). The parsed value remembers which format it
//! was written in because binary quantities scale in powers of 1024.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Decimal exponent of a quantity (e.g. `MILLI` is `-3`)
pub type Scale = i32;

pub const NANO: Scale = -9;
pub const MICRO: Scale = -6;
pub const MILLI: Scale = -3;
pub const KILO: Scale = 3;
pub const MEGA: Scale = 6;
pub const GIGA: Scale = 9;
pub const TERA: Scale = 12;
pub const PETA: Scale = 15;
pub const EXA: Scale = 18;

const BINARY_SUFFIX: [&str; 10] = ["", "", "", "", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIX: [&str; 10] = ["n", "u", "m", "", "k", "M", "G", "T", "P", "E"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("invalid quantity {0:?}")]
    Invalid(String),
    #[error("quantity {0:?} is too large")]
    Overflow(String),
}

/// The notation a quantity was expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    DecimalSI,
    BinarySI,
    DecimalExponent,
}

/// A parsed resource quantity, stored as `mantissa * 10^exponent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantity {
    mantissa: i128,
    exponent: i32,
    format: Format,
}

impl Quantity {
    /// Create an integer quantity with an explicit format
    pub fn new(value: i64, format: Format) -> Self {
        Self {
            mantissa: value as i128,
            exponent: 0,
            format,
        }
    }

    /// Parse a quantity string such as `250m`, `1.5Gi` or `12e6`
    pub fn parse(s: &str) -> Result<Self, QuantityError> {
        let invalid = || QuantityError::Invalid(s.to_string());
        let overflow = || QuantityError::Overflow(s.to_string());

        let text = s.trim();
        let (negative, rest) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };

        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_len);

        let (whole, fraction) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(invalid());
        }

        let mut mantissa: i128 = 0;
        for digit in whole.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add((digit - b'0') as i128))
                .ok_or_else(overflow)?;
        }
        let mut exponent = i32::try_from(fraction.len())
            .map(|len| -len)
            .map_err(|_| overflow())?;

        let format = match suffix {
            "" => Format::DecimalSI,
            "n" | "u" | "m" | "k" | "M" | "G" | "T" | "P" | "E" => {
                let index = DECIMAL_SUFFIX
                    .iter()
                    .position(|x| *x == suffix)
                    .ok_or_else(invalid)?;
                exponent += NANO + 3 * index as i32;
                Format::DecimalSI
            }
            "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" => {
                let index = BINARY_SUFFIX
                    .iter()
                    .position(|x| *x == suffix)
                    .ok_or_else(invalid)?;
                let power = (index - 3) as u32;
                mantissa = mantissa
                    .checked_mul(1024i128.pow(power))
                    .ok_or_else(overflow)?;
                Format::BinarySI
            }
            _ if suffix.starts_with(['e', 'E']) => {
                let e: i32 = suffix[1..].parse().map_err(|_| invalid())?;
                exponent = exponent.checked_add(e).ok_or_else(overflow)?;
                Format::DecimalExponent
            }
            _ => return Err(invalid()),
        };

        if negative {
            mantissa = -mantissa;
        }

        Ok(Self {
            mantissa,
            exponent,
            format,
        })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// The value at the requested scale, rounded up
    pub fn scaled_value(&self, scale: Scale) -> i64 {
        if self.mantissa == 0 {
            return 0;
        }
        let saturated = if self.mantissa < 0 { i128::MIN } else { i128::MAX };
        // Below every representable unit, a positive value still rounds up to one
        let vanishing = if self.mantissa > 0 { 1 } else { 0 };

        let shift = i64::from(self.exponent) - i64::from(scale);
        let scaled = if shift >= 0 {
            u32::try_from(shift)
                .ok()
                .and_then(|shift| 10i128.checked_pow(shift))
                .and_then(|p| self.mantissa.checked_mul(p))
                .unwrap_or(saturated)
        } else {
            let divisor = u32::try_from(-shift)
                .ok()
                .and_then(|shift| 10i128.checked_pow(shift));
            match divisor {
                Some(divisor) => {
                    let quotient = self.mantissa / divisor;
                    if self.mantissa % divisor > 0 {
                        quotient + 1
                    } else {
                        quotient
                    }
                }
                None => vanishing,
            }
        };
        scaled.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// The integer value, rounded up
    pub fn value(&self) -> i64 {
        self.scaled_value(0)
    }

    /// The value in thousandths, rounded up
    pub fn milli_value(&self) -> i64 {
        self.scaled_value(MILLI)
    }

    /// Approximate floating point value
    pub fn as_f64(&self) -> f64 {
        self.mantissa as f64 * 10f64.powi(self.exponent)
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::parse(s)
    }
}

impl TryFrom<&k8s_openapi::apimachinery::pkg::api::resource::Quantity> for Quantity {
    type Error = QuantityError;

    fn try_from(
        q: &k8s_openapi::apimachinery::pkg::api::resource::Quantity,
    ) -> Result<Self, Self::Error> {
        Quantity::parse(&q.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exponent < 0 {
            return write!(f, "{}", self.as_f64());
        }
        let expanded = 10i128
            .checked_pow(self.exponent.unsigned_abs())
            .and_then(|p| self.mantissa.checked_mul(p));
        match expanded {
            Some(value) => write!(f, "{value}"),
            None => write!(f, "{}e{}", self.mantissa, self.exponent),
        }
    }
}

/// Scale the quantity to an `i32`, honoring the base implied by its format.
///
/// For example a binary `1` at `MILLI` scale is `1024`. The result is
/// truncated to 32 bits without an overflow check.
pub fn scale_to_int(q: &Quantity, scale: Scale) -> i32 {
    if q.format() != Format::BinarySI {
        return q.scaled_value(scale) as i32;
    }

    let mut v = q.value();
    if scale > 0 {
        for _ in 0..scale / 3 {
            v /= 1024;
        }
    } else {
        for _ in 0..(-scale) / 3 {
            v = v.wrapping_mul(1024);
        }
    }
    v as i32
}

/// The unit suffix for a scale in the given format, or `""` when there is none.
pub fn quantity_suffix(scale: Scale, format: Format) -> &'static str {
    let lookup = |suffixes: &[&'static str; 10]| {
        // Suffixes only exist for powers of 1000
        if scale % 3 != 0 {
            return "";
        }
        let index = (scale - NANO) / 3;
        if index < 0 || index as usize >= suffixes.len() {
            return "";
        }
        suffixes[index as usize]
    };

    match format {
        Format::BinarySI => lookup(&BINARY_SUFFIX),
        Format::DecimalSI => lookup(&DECIMAL_SUFFIX),
        Format::DecimalExponent => "",
    }
}
