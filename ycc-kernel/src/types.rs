//! Pixel types and the out-of-range policy

use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Packed 24-bit RGB pixel
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Packed 24-bit YCbCr pixel, same layout as `Rgb`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct YCbCr {
    pub y: u8,
    pub cb: u8,
    pub cr: u8,
}

impl YCbCr {
    pub const fn new(y: u8, cb: u8, cr: u8) -> Self {
        Self { y, cb, cr }
    }
}

/// How a component outside 0..=255 is narrowed to a byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgePolicy {
    /// Clamp to 0..=255
    #[default]
    Saturate,
    /// Keep the low 8 bits (two's complement narrowing)
    Wrap,
}

impl EdgePolicy {
    #[inline]
    pub fn narrow(self, value: i32) -> u8 {
        match self {
            EdgePolicy::Saturate => value.clamp(0, 255) as u8,
            EdgePolicy::Wrap => value as u8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgePolicy::Saturate => "saturate",
            EdgePolicy::Wrap => "wrap",
        }
    }
}

impl fmt::Display for EdgePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown edge policy {0:?} (expected \"saturate\" or \"wrap\")")]
pub struct ParsePolicyError(pub String);

impl FromStr for EdgePolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "saturate" => Ok(EdgePolicy::Saturate),
            "wrap" => Ok(EdgePolicy::Wrap),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}
