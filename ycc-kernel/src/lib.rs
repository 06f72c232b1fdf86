//! Color transform kernel
//!
//! Stateless RGB to YCbCr conversion over packed byte buffers.
//!
//! Key features:
//! - Fixed-point BT.601 matrix, integer only
//! - Explicit saturate-or-wrap narrowing
//! - Parallel conversion of large buffers with rayon

pub mod transform;
pub mod types;

pub use transform::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_saturates() {
        let mut px = [255u8, 255, 255];
        convert_in_place(&mut px, EdgePolicy::default());
        assert_eq!(px, [255, 130, 130]);
    }
}
