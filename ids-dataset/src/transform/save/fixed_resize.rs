use super::filter_type;
use crate::{common::*, config::Interpolation};
use image::DynamicImage;

/// Resizes to a fixed size, ignoring the aspect ratio.
#[derive(Debug, Clone)]
pub struct FixedResize {
    height: u32,
    width: u32,
    interpolation: Interpolation,
}

impl FixedResize {
    pub fn new(height: usize, width: usize, interpolation: Interpolation) -> Result<Self> {
        ensure!(
            height > 0 && width > 0,
            "invalid fixed resize size {}x{}",
            width,
            height
        );
        Ok(Self {
            height: height.try_into()?,
            width: width.try_into()?,
            interpolation,
        })
    }

    pub fn transform(&self, image: &DynamicImage) -> DynamicImage {
        image.resize_exact(self.width, self.height, filter_type(self.interpolation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView as _, RgbImage};

    #[test]
    fn output_size() -> Result<()> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(10, 4));
        let resized = FixedResize::new(3, 7, Interpolation::Linear)?.transform(&image);
        assert_eq!(resized.dimensions(), (7, 3));
        assert!(FixedResize::new(0, 7, Interpolation::Nearest).is_err());
        Ok(())
    }
}
