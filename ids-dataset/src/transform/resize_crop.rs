use super::{shared_size, TransformableChannelset};
use crate::{
    common::*,
    config::ResizeCropParam,
    geometry::{self, PlaneShape},
};
use image::imageops::FilterType;
use rand::distributions::Uniform;

const MAX_ATTEMPTS: usize = 10;

/// Random area and aspect ratio crop resized to a square, as used for
/// Inception style training.
#[derive(Debug, Clone)]
pub struct ResizeCrop {
    crop_size: usize,
    area_fraction: Uniform<f64>,
    aspect_ratio: Uniform<f64>,
}

impl ResizeCrop {
    pub fn new(param: &ResizeCropParam) -> Result<Self> {
        let ResizeCropParam {
            crop_size,
            min_area_fraction,
            max_area_fraction,
            min_aspect_ratio,
            max_aspect_ratio,
        } = *param;
        let (min_area_fraction, max_area_fraction) = (min_area_fraction.raw(), max_area_fraction.raw());
        let (min_aspect_ratio, max_aspect_ratio) = (min_aspect_ratio.raw(), max_aspect_ratio.raw());

        ensure!(crop_size > 0, "crop_size must be positive");
        ensure!(
            min_area_fraction > 0.0 && min_area_fraction <= max_area_fraction && max_area_fraction <= 1.0,
            "invalid area fraction range [{}, {}]",
            min_area_fraction,
            max_area_fraction
        );
        ensure!(
            min_aspect_ratio > 0.0 && min_aspect_ratio <= max_aspect_ratio,
            "invalid aspect ratio range [{}, {}]",
            min_aspect_ratio,
            max_aspect_ratio
        );

        Ok(Self {
            crop_size,
            area_fraction: Uniform::new_inclusive(min_area_fraction, max_area_fraction),
            aspect_ratio: Uniform::new_inclusive(min_aspect_ratio, max_aspect_ratio),
        })
    }

    pub fn transformed_size(&self, _height: usize, _width: usize) -> (usize, usize) {
        (self.crop_size, self.crop_size)
    }

    pub fn required_workspace(&self, channels: usize, height: usize, width: usize) -> usize {
        let (new_height, new_width) = self.fallback_size(height, width);
        channels * cmp::max(height * width, new_height * new_width)
    }

    /// Size after scaling the shorter side to `crop_size`, rounded up.
    fn fallback_size(&self, height: usize, width: usize) -> (usize, usize) {
        let crop_size = self.crop_size;
        if height == 0 || width == 0 {
            (crop_size, crop_size)
        } else if width > height {
            (crop_size, (width * crop_size + height - 1) / height)
        } else {
            ((height * crop_size + width - 1) / width, crop_size)
        }
    }

    pub fn transform<R>(
        &self,
        channelsets: &mut [&mut TransformableChannelset<'_>],
        rng: &mut R,
    ) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        let crop_size = self.crop_size;
        let (height, width) = shared_size(channelsets)?;

        for _ in 0..MAX_ATTEMPTS {
            let target_area = ((height * width) as f64 * rng.sample(self.area_fraction) + 1.0) as usize;
            let aspect_ratio = rng.sample(self.aspect_ratio);
            let mut crop_width = ((target_area as f64 * aspect_ratio).sqrt() + 0.5) as usize;
            let mut crop_height = ((target_area as f64 / aspect_ratio).sqrt() + 0.5) as usize;
            if rng.gen_bool(0.5) {
                mem::swap(&mut crop_width, &mut crop_height);
            }

            if crop_height == 0 || crop_width == 0 || crop_height > height || crop_width > width {
                continue;
            }

            let top = rng.gen_range(0..=(height - crop_height));
            let left = rng.gen_range(0..=(width - crop_width));

            return channelsets.iter_mut().try_for_each(|channelset| {
                let shape = channelset.shape();
                let cropped = PlaneShape::new(shape.channels, crop_height, crop_width);

                channelset.set_size(crop_size, crop_size)?;
                let (final_mem, work_mem) = channelset.buffers_mut();
                geometry::crop(
                    &final_mem[..shape.len()],
                    shape,
                    top,
                    left,
                    crop_height,
                    crop_width,
                    work_mem,
                )?;
                geometry::resize(
                    &mut work_mem[..cropped.len()],
                    cropped,
                    crop_size,
                    crop_size,
                    FilterType::CatmullRom,
                    final_mem,
                )
            });
        }

        // fall back to a central crop of the scaled image
        let (new_height, new_width) = self.fallback_size(height, width);
        channelsets.iter_mut().try_for_each(|channelset| {
            let shape = channelset.shape();
            let resized = PlaneShape::new(shape.channels, new_height, new_width);

            channelset.set_size(crop_size, crop_size)?;
            let (final_mem, work_mem) = channelset.buffers_mut();
            ensure!(
                resized.len() <= work_mem.len(),
                "workspace of {} floats cannot hold {:?}",
                work_mem.len(),
                resized
            );
            geometry::resize(
                &mut final_mem[..shape.len()],
                shape,
                new_height,
                new_width,
                FilterType::CatmullRom,
                work_mem,
            )?;
            geometry::crop(
                &work_mem[..resized.len()],
                resized,
                (new_height - crop_size) / 2,
                (new_width - crop_size) / 2,
                crop_size,
                crop_size,
                final_mem,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ChannelsetId;
    use approx::assert_abs_diff_eq;

    fn param(min_area_fraction: f64) -> ResizeCropParam {
        ResizeCropParam {
            crop_size: 4,
            min_area_fraction: r64(min_area_fraction),
            max_area_fraction: r64(1.0),
            min_aspect_ratio: r64(0.75),
            max_aspect_ratio: r64(1.33),
        }
    }

    #[test]
    fn output_is_square() -> Result<()> {
        let transform = ResizeCrop::new(&param(0.3))?;
        let shape = PlaneShape::new(3, 10, 16);
        let len = transform.required_workspace(3, 10, 16);
        assert!(len >= shape.len());

        let mut final_mem = vec![5.0; len];
        let mut work_mem = vec![0.0; len];
        let mut channelset =
            TransformableChannelset::new(ChannelsetId(0), "image", &mut final_mem, &mut work_mem, shape)?;

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            channelset.set_size(10, 16)?;
            channelset.data_mut().iter_mut().for_each(|value| *value = 5.0);
            transform.transform(&mut [&mut channelset], &mut rng)?;
            assert_eq!(channelset.shape(), PlaneShape::new(3, 4, 4));
            channelset
                .data()
                .iter()
                .for_each(|&value| assert_abs_diff_eq!(value, 5.0, epsilon = 1e-3));
        }
        Ok(())
    }

    #[test]
    fn empty_input_is_rejected() -> Result<()> {
        let transform = ResizeCrop::new(&param(0.5))?;
        let shape = PlaneShape::new(1, 0, 6);
        let len = transform.required_workspace(1, 0, 6);
        assert_eq!(len, 16);

        let mut final_mem = vec![0.0; len];
        let mut work_mem = vec![0.0; len];
        let mut channelset =
            TransformableChannelset::new(ChannelsetId(0), "image", &mut final_mem, &mut work_mem, shape)?;
        assert!(transform
            .transform(&mut [&mut channelset], &mut StdRng::seed_from_u64(0))
            .is_err());
        Ok(())
    }

    #[test]
    fn workspace_covers_fallback() -> Result<()> {
        let transform = ResizeCrop::new(&param(0.5))?;
        assert_eq!(transform.fallback_size(2, 3), (4, 6));
        assert_eq!(transform.fallback_size(3, 2), (6, 4));
        assert_eq!(transform.required_workspace(1, 2, 3), 24);
        assert!(ResizeCrop::new(&param(0.0)).is_err());
        Ok(())
    }
}
