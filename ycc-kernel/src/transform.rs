//! Fixed-point RGB to YCbCr conversion
//!
//! BT.601 coefficients scaled by 1000 and rounded, applied with integer
//! arithmetic. Integer division truncates toward zero. Results are narrowed
//! to a byte by the caller's `EdgePolicy`.

use crate::types::{EdgePolicy, Rgb, YCbCr};
use rayon::prelude::*;

pub const D11: i32 = 257;
pub const D12: i32 = 502;
pub const D13: i32 = 98;
pub const D21: i32 = -148;
pub const D22: i32 = -289;
pub const D23: i32 = 438;
pub const D31: i32 = 438;
pub const D32: i32 = -366;
pub const D33: i32 = -71;

pub const C1: i32 = 16;
pub const C2: i32 = 128;
pub const C3: i32 = 128;

const SCALE: i32 = 100;

/// Bytes per pixel triple
pub const TRIPLE: usize = 3;

// Multiple of TRIPLE so that no triple straddles two parallel chunks
const PAR_CHUNK: usize = TRIPLE * 16 * 1024;

/// Unnarrowed Y, Cb, Cr for one pixel
#[inline]
pub fn rgb_to_ycbcr_wide(px: Rgb) -> [i32; 3] {
    let (r, g, b) = (px.r as i32, px.g as i32, px.b as i32);

    [
        (D11 * r + D12 * g + D13 * b) / SCALE + C1,
        (D21 * r + D22 * g + D23 * b) / SCALE + C2,
        (D31 * r + D32 * g + D33 * b) / SCALE + C3,
    ]
}

/// Convert one pixel
#[inline]
pub fn rgb_to_ycbcr(px: Rgb, policy: EdgePolicy) -> YCbCr {
    let [y, cb, cr] = rgb_to_ycbcr_wide(px);
    YCbCr::new(policy.narrow(y), policy.narrow(cb), policy.narrow(cr))
}

/// Convert every whole triple of `buf` in place
///
/// Trailing bytes that do not form a triple are left untouched. Returns the
/// number of pixels converted.
pub fn convert_in_place(buf: &mut [u8], policy: EdgePolicy) -> usize {
    let whole = buf.len() - buf.len() % TRIPLE;
    let pixels: &mut [Rgb] = bytemuck::cast_slice_mut(&mut buf[..whole]);

    for px in pixels.iter_mut() {
        *px = bytemuck::cast(rgb_to_ycbcr(*px, policy));
    }

    pixels.len()
}

/// Convert whole triples of `src` into the front of `dst`
///
/// Converts `min(src.len(), dst.len()) / 3` pixels; bytes of `dst` past the
/// converted region are left untouched. Returns the number of pixels converted.
pub fn convert_into(src: &[u8], dst: &mut [u8], policy: EdgePolicy) -> usize {
    let n = src.len().min(dst.len());
    let whole = n - n % TRIPLE;
    let from: &[Rgb] = bytemuck::cast_slice(&src[..whole]);
    let to: &mut [YCbCr] = bytemuck::cast_slice_mut(&mut dst[..whole]);

    for (out, px) in to.iter_mut().zip(from) {
        *out = rgb_to_ycbcr(*px, policy);
    }

    to.len()
}

/// `convert_in_place` split across the rayon pool, for large buffers
pub fn convert_par(buf: &mut [u8], policy: EdgePolicy) -> usize {
    buf.par_chunks_mut(PAR_CHUNK)
        .map(|chunk| convert_in_place(chunk, policy))
        .sum()
}
