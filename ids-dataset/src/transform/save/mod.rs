//! Transforms applied to decoded 8-bit images while a dataset is written.

mod fixed_resize;
mod min_resize;
mod pixel_map;

pub use fixed_resize::*;
pub use min_resize::*;
pub use pixel_map::*;

use crate::{
    common::*,
    config::{Interpolation, SaveTransformConfig},
};
use image::{imageops::FilterType, DynamicImage};

#[derive(Debug, Clone)]
pub enum SaveTransform {
    FixedResize(FixedResize),
    MinResize(MinResize),
    PixelMap(PixelMap),
}

impl SaveTransform {
    pub fn new(config: &SaveTransformConfig) -> Result<Self> {
        let transform = match *config {
            SaveTransformConfig::FixedResize {
                width,
                height,
                interpolation,
            } => Self::FixedResize(FixedResize::new(height, width, interpolation)?),
            SaveTransformConfig::MinResize {
                min_size,
                interpolation,
            } => Self::MinResize(MinResize::new(min_size, interpolation)?),
            SaveTransformConfig::PixelMap { ref mapping_file } => {
                Self::PixelMap(PixelMap::open(mapping_file)?)
            }
        };
        Ok(transform)
    }

    pub fn transform(&self, image: DynamicImage) -> Result<DynamicImage> {
        match self {
            Self::FixedResize(transform) => Ok(transform.transform(&image)),
            Self::MinResize(transform) => Ok(transform.transform(image)),
            Self::PixelMap(transform) => transform.transform(&image),
        }
    }

    /// The number of channels after the transform.
    pub fn output_channels(&self, channels: usize) -> usize {
        match self {
            Self::FixedResize(_) | Self::MinResize(_) => channels,
            Self::PixelMap(_) => 1,
        }
    }
}

fn filter_type(interpolation: Interpolation) -> FilterType {
    match interpolation {
        Interpolation::Nearest => FilterType::Nearest,
        Interpolation::Linear => FilterType::Triangle,
    }
}
