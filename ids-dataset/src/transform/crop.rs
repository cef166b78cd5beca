use super::{shared_size, TransformableChannelset};
use crate::{common::*, config::CropParam, geometry};

/// Cuts a square window out of every targeted channelset.
///
/// All targets share one window position so that aligned channelsets stay
/// aligned.
#[derive(Debug, Clone)]
pub struct Crop {
    crop_size: usize,
    central: bool,
}

impl Crop {
    pub fn new(param: &CropParam) -> Result<Self> {
        let CropParam {
            crop_size,
            central_crop,
        } = *param;
        ensure!(crop_size > 0, "crop_size must be positive");

        Ok(Self {
            crop_size,
            central: central_crop,
        })
    }

    pub fn transformed_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        ensure!(
            height >= self.crop_size && width >= self.crop_size,
            "cannot crop {}x{} window from {}x{} channelset",
            self.crop_size,
            self.crop_size,
            width,
            height
        );
        Ok((self.crop_size, self.crop_size))
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
        self.transformed_size(height, width)?;

        let max_top = height - crop_size;
        let max_left = width - crop_size;
        if max_top == 0 && max_left == 0 {
            return Ok(());
        }

        let (top, left) = if self.central {
            (max_top / 2, max_left / 2)
        } else {
            (rng.gen_range(0..=max_top), rng.gen_range(0..=max_left))
        };

        channelsets.iter_mut().try_for_each(|channelset| -> Result<_> {
            let shape = channelset.shape();
            let (final_mem, work_mem) = channelset.buffers_mut();
            geometry::crop(
                &final_mem[..shape.len()],
                shape,
                top,
                left,
                crop_size,
                crop_size,
                work_mem,
            )?;
            channelset.swap();
            channelset.set_size(crop_size, crop_size)?;
            Ok(())
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{format::ChannelsetId, geometry::PlaneShape};

    fn crop_once(central: bool, seed: u64) -> Result<Vec<f32>> {
        let crop = Crop::new(&CropParam {
            crop_size: 3,
            central_crop: central,
        })?;
        let mut final_mem: Vec<f32> = (0..64).map(|value| value as f32).collect();
        let mut work_mem = vec![0.0; 64];
        let mut channelset = TransformableChannelset::new(
            ChannelsetId(0),
            "image",
            &mut final_mem,
            &mut work_mem,
            PlaneShape::new(1, 8, 8),
        )?;

        crop.transform(&mut [&mut channelset], &mut StdRng::seed_from_u64(seed))?;
        assert_eq!(channelset.shape(), PlaneShape::new(1, 3, 3));
        Ok(channelset.data().to_vec())
    }

    #[test]
    fn central_crop_is_deterministic() -> Result<()> {
        let expect: Vec<f32> = [18, 19, 20, 26, 27, 28, 34, 35, 36]
            .iter()
            .map(|&value| value as f32)
            .collect();
        assert_eq!(crop_once(true, 0)?, expect);
        assert_eq!(crop_once(true, 1)?, expect);
        Ok(())
    }

    #[test]
    fn random_crop_follows_seed() -> Result<()> {
        assert_eq!(crop_once(false, 7)?, crop_once(false, 7)?);
        Ok(())
    }

    #[test]
    fn random_offset_stays_inside() -> Result<()> {
        let mut tops = HashSet::new();
        let mut lefts = HashSet::new();

        for seed in 0..500 {
            // values are row-major indices of the 8x8 input
            let data = crop_once(false, seed)?;
            let (top, left) = (data[0] as usize / 8, data[0] as usize % 8);
            assert!(top <= 5 && left <= 5, "offset ({}, {}) with seed {}", top, left, seed);

            let expect: Vec<f32> = (0..3)
                .cartesian_product(0..3)
                .map(|(row, col)| ((top + row) * 8 + left + col) as f32)
                .collect();
            assert_eq!(data, expect);

            tops.insert(top);
            lefts.insert(left);
        }

        // both ends of 0..=5 are reachable
        assert_eq!(tops, (0..=5).collect());
        assert_eq!(lefts, (0..=5).collect());
        Ok(())
    }

    #[test]
    fn too_small_input_is_rejected() -> Result<()> {
        let crop = Crop::new(&CropParam {
            crop_size: 5,
            central_crop: false,
        })?;
        assert!(crop.transformed_size(4, 8).is_err());
        assert_eq!(crop.transformed_size(5, 8)?, (5, 5));
        Ok(())
    }
}
