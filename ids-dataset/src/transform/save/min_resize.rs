use super::filter_type;
use crate::{common::*, config::Interpolation, transform::min_resize_size};
use image::{DynamicImage, GenericImageView as _};

/// Upscales so that both sides are at least `min_size`, keeping the aspect
/// ratio.
#[derive(Debug, Clone)]
pub struct MinResize {
    min_size: usize,
    interpolation: Interpolation,
}

impl MinResize {
    pub fn new(min_size: usize, interpolation: Interpolation) -> Result<Self> {
        ensure!(min_size > 0, "min_size must be positive");
        Ok(Self {
            min_size,
            interpolation,
        })
    }

    pub fn transform(&self, image: DynamicImage) -> DynamicImage {
        let (width, height) = image.dimensions();
        let (new_height, new_width) = min_resize_size(self.min_size, height as usize, width as usize);
        if (new_height, new_width) == (height as usize, width as usize) {
            return image;
        }
        image.resize_exact(
            new_width as u32,
            new_height as u32,
            filter_type(self.interpolation),
        )
    }
}
