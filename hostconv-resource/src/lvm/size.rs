//! Logical volume size specifications.
//!
//! Absolute sizes (`10G`, `512m`) map to `lvcreate -L`, relative sizes
//! (`100%FREE`, `50%VG`) to `lvcreate -l`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SizeError {
    #[error("invalid size '{0}': expected <number><unit> or <percent>%<FREE|VG|PVS|ORIGIN>")]
    Malformed(String),

    #[error("invalid size unit '{0}': expected one of b k m g t p e")]
    Unit(String),

    #[error("invalid relative size target '{0}': expected FREE, VG, PVS or ORIGIN")]
    RelativeTo(String),

    #[error("relative size must be between 1 and 100 percent, got {0}")]
    Percent(u64),

    #[error("size must not be zero")]
    Zero,
}

/// What a relative size is a percentage of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeTo {
    Free,
    Vg,
    Pvs,
    Origin,
}

impl RelativeTo {
    fn as_str(&self) -> &'static str {
        match self {
            RelativeTo::Free => "FREE",
            RelativeTo::Vg => "VG",
            RelativeTo::Pvs => "PVS",
            RelativeTo::Origin => "ORIGIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LvmSize {
    Absolute { size: u64, unit: char },
    Relative { percent: u8, of: RelativeTo },
}

impl LvmSize {
    /// The `lvcreate` option selecting this size.
    pub fn option(&self) -> String {
        match self {
            LvmSize::Absolute { size, unit } => format!("-L{}{}", size, unit),
            LvmSize::Relative { percent, of } => format!("-l{}%{}", percent, of.as_str()),
        }
    }
}

impl fmt::Display for LvmSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LvmSize::Absolute { size, unit } => write!(f, "{}{}", size, unit.to_ascii_uppercase()),
            LvmSize::Relative { percent, of } => write!(f, "{}%{}", percent, of.as_str()),
        }
    }
}

impl FromStr for LvmSize {
    type Err = SizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        if digits == 0 {
            return Err(SizeError::Malformed(s.to_string()));
        }
        let number: u64 = s[..digits]
            .parse()
            .map_err(|_| SizeError::Malformed(s.to_string()))?;
        let suffix = &s[digits..];

        if let Some(target) = suffix.strip_prefix('%') {
            let of = match target.to_ascii_uppercase().as_str() {
                "FREE" => RelativeTo::Free,
                "VG" => RelativeTo::Vg,
                "PVS" => RelativeTo::Pvs,
                "ORIGIN" => RelativeTo::Origin,
                _ => return Err(SizeError::RelativeTo(target.to_string())),
            };
            if number == 0 || number > 100 {
                return Err(SizeError::Percent(number));
            }
            return Ok(LvmSize::Relative {
                percent: number as u8,
                of,
            });
        }

        let mut chars = suffix.chars();
        let unit = match (chars.next(), chars.next()) {
            (Some(c), None) => c.to_ascii_lowercase(),
            (None, _) => return Err(SizeError::Malformed(s.to_string())),
            _ => return Err(SizeError::Unit(suffix.to_string())),
        };
        if !matches!(unit, 'b' | 'k' | 'm' | 'g' | 't' | 'p' | 'e') {
            return Err(SizeError::Unit(suffix.to_string()));
        }
        if number == 0 {
            return Err(SizeError::Zero);
        }

        Ok(LvmSize::Absolute { size: number, unit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute() {
        let size: LvmSize = "10G".parse().unwrap();
        assert_eq!(size, LvmSize::Absolute { size: 10, unit: 'g' });
        assert_eq!(size.option(), "-L10g");
        assert_eq!(size.to_string(), "10G");

        let size: LvmSize = " 512m ".parse().unwrap();
        assert_eq!(size.option(), "-L512m");
    }

    #[test]
    fn test_parse_relative() {
        let size: LvmSize = "100%FREE".parse().unwrap();
        assert_eq!(
            size,
            LvmSize::Relative {
                percent: 100,
                of: RelativeTo::Free
            }
        );
        assert_eq!(size.option(), "-l100%FREE");

        let size: LvmSize = "50%vg".parse().unwrap();
        assert_eq!(size.option(), "-l50%VG");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "G".parse::<LvmSize>().unwrap_err(),
            SizeError::Malformed("G".to_string())
        );
        assert_eq!(
            "10".parse::<LvmSize>().unwrap_err(),
            SizeError::Malformed("10".to_string())
        );
        assert_eq!(
            "10GB".parse::<LvmSize>().unwrap_err(),
            SizeError::Unit("GB".to_string())
        );
        assert_eq!(
            "10x".parse::<LvmSize>().unwrap_err(),
            SizeError::Unit("x".to_string())
        );
        assert_eq!("0g".parse::<LvmSize>().unwrap_err(), SizeError::Zero);
        assert_eq!(
            "101%FREE".parse::<LvmSize>().unwrap_err(),
            SizeError::Percent(101)
        );
        assert_eq!(
            "50%DISK".parse::<LvmSize>().unwrap_err(),
            SizeError::RelativeTo("DISK".to_string())
        );
    }
}
