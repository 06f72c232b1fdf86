//! Image load/store collaborator
//!
//! Images are packed RGB, row-major, 3 bytes per pixel, no row padding. The
//! shipped store decodes any PNM file with the `image` crate and writes
//! binary PPM (P6, maxval 255), whose raster is exactly that layout.

use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{ExtendedColorType, ImageEncoder, ImageReader};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{}: {reason}", .path.display())]
    Format { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbImage {
    /// Bytes in a packed RGB raster of this size
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    pub fn is_consistent(&self) -> bool {
        self.data.len() == Self::byte_len(self.width, self.height)
    }
}

pub trait ImageStore {
    fn load_image(&self, path: &Path) -> Result<RgbImage, ImageError>;
    fn store_image(&self, path: &Path, image: &RgbImage) -> Result<(), ImageError>;
}

/// PNM files in; binary PPM (P6, maxval 255) out
#[derive(Debug, Clone, Copy, Default)]
pub struct PpmStore;

impl ImageStore for PpmStore {
    fn load_image(&self, path: &Path) -> Result<RgbImage, ImageError> {
        let io_err = |source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        };
        let reader = ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
            .map_err(io_err)?;
        let decoded = reader
            .decode()
            .map_err(|source| ImageError::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .into_rgb8();

        let (width, height) = decoded.dimensions();
        log::debug!("{}: {}x{} loaded", path.display(), width, height);
        Ok(RgbImage {
            width,
            height,
            data: decoded.into_raw(),
        })
    }

    fn store_image(&self, path: &Path, image: &RgbImage) -> Result<(), ImageError> {
        if !image.is_consistent() {
            return Err(ImageError::Format {
                path: path.to_path_buf(),
                reason: format!(
                    "{} bytes do not make a {}x{} RGB raster",
                    image.data.len(),
                    image.width,
                    image.height
                ),
            });
        }

        let mut encoded = Vec::with_capacity(image.data.len() + 32);
        PnmEncoder::new(&mut encoded)
            .with_subtype(PnmSubtype::Pixmap(SampleEncoding::Binary))
            .write_image(
                &image.data,
                image.width,
                image.height,
                ExtendedColorType::Rgb8,
            )
            .map_err(|source| ImageError::Encode {
                path: path.to_path_buf(),
                source,
            })?;

        fs::write(path, encoded).map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
