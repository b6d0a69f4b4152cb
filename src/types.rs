//! Core types: Price, Symbol

use std::fmt;

/// Price in cents.
///
/// `Price(5025)` represents $50.25. Fixed-point keeps share sizing and
/// limit rounding exact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Price(pub i64);

impl Price {
    pub const ZERO: Price = Price(0);
    pub const ONE_CENT: Price = Price(1);

    /// Convert a decimal dollar amount to cents, rounding to the nearest cent.
    ///
    /// Returns `None` for NaN, infinities, and values outside the `i64` range.
    pub fn from_dollars(dollars: f64) -> Option<Price> {
        let cents = (dollars * 100.0).round();
        if cents.is_finite() && cents.abs() < i64::MAX as f64 {
            Some(Price(cents as i64))
        } else {
            None
        }
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dollars = self.0 / 100;
        let cents = (self.0 % 100).abs();
        if self.0 < 0 {
            write!(f, "-${}.{:02}", dollars.abs(), cents)
        } else {
            write!(f, "${}.{:02}", dollars, cents)
        }
    }
}

/// Instrument ticker, stored inline (at most 8 ASCII bytes) so it is `Copy`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    bytes: [u8; Symbol::MAX_LEN],
    len: u8,
}

impl Symbol {
    pub const MAX_LEN: usize = 8;

    /// Create a symbol, returning `None` if it is empty, longer than
    /// [`Symbol::MAX_LEN`] bytes, or not ASCII.
    pub fn try_new(s: &str) -> Option<Self> {
        if s.is_empty() || s.len() > Self::MAX_LEN || !s.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; Self::MAX_LEN];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Some(Self {
            bytes,
            len: s.len() as u8,
        })
    }

    /// Create a symbol.
    ///
    /// # Panics
    ///
    /// Panics if `s` is not a valid symbol (see [`Symbol::try_new`]).
    #[track_caller]
    pub fn new(s: &str) -> Self {
        match Self::try_new(s) {
            Some(sym) => sym,
            None => panic!("invalid symbol {s:?}: must be 1-8 ASCII bytes"),
        }
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII is ever stored.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Symbol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Symbol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Symbol::try_new(&s).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid symbol {s:?}: must be 1-8 ASCII bytes"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_ordering() {
        assert!(Price(100) < Price(200));
        assert!(Price(-50) < Price(50));
        assert_eq!(Price(100), Price(100));
    }

    #[test]
    fn price_display() {
        assert_eq!(format!("{}", Price(10050)), "$100.50");
        assert_eq!(format!("{}", Price(100)), "$1.00");
        assert_eq!(format!("{}", Price(5)), "$0.05");
        assert_eq!(format!("{}", Price(-250)), "-$2.50");
    }

    #[test]
    fn price_from_dollars_rounds() {
        assert_eq!(Price::from_dollars(2000.0), Some(Price(200_000)));
        assert_eq!(Price::from_dollars(50.25), Some(Price(5025)));
        assert_eq!(Price::from_dollars(19.999), Some(Price(2000)));
        assert_eq!(Price::from_dollars(0.004), Some(Price(0)));
        assert_eq!(Price::from_dollars(f64::NAN), None);
        assert_eq!(Price::from_dollars(f64::INFINITY), None);
    }

    #[test]
    fn symbol_roundtrip() {
        let sym = Symbol::new("TQQQ");
        assert_eq!(sym.as_str(), "TQQQ");
        assert_eq!(format!("{sym}"), "TQQQ");
        assert_eq!(format!("{sym:?}"), "Symbol(\"TQQQ\")");
    }

    #[test]
    fn symbol_rejects_invalid() {
        assert!(Symbol::try_new("").is_none());
        assert!(Symbol::try_new("TOOLONGSYM").is_none());
        assert!(Symbol::try_new("ΩMEGA").is_none());
        assert!(Symbol::try_new("12345678").is_some());
    }

    #[test]
    #[should_panic(expected = "invalid symbol")]
    fn symbol_new_panics_on_empty() {
        let _ = Symbol::new("");
    }
}
