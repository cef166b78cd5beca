use super::{single_channelset, TransformableChannelset};
use crate::{common::*, config::MinResizeParam, geometry};
use image::imageops::FilterType;

/// Upscales a channelset so that both sides are at least `min_size`.
#[derive(Debug, Clone)]
pub struct MinResize {
    min_size: usize,
}

impl MinResize {
    pub fn new(param: &MinResizeParam) -> Result<Self> {
        ensure!(param.min_size > 0, "min_size must be positive");
        Ok(Self {
            min_size: param.min_size,
        })
    }

    pub fn transformed_size(&self, height: usize, width: usize) -> (usize, usize) {
        min_resize_size(self.min_size, height, width)
    }

    pub fn transform(&self, channelsets: &mut [&mut TransformableChannelset<'_>]) -> Result<()> {
        let channelset = single_channelset(channelsets, "MinResize")?;
        let shape = channelset.shape();
        let (new_height, new_width) = self.transformed_size(shape.height, shape.width);
        if (new_height, new_width) == (shape.height, shape.width) {
            return Ok(());
        }

        channelset.set_size(new_height, new_width)?;
        let (final_mem, work_mem) = channelset.buffers_mut();
        geometry::resize(
            &mut final_mem[..shape.len()],
            shape,
            new_height,
            new_width,
            FilterType::Nearest,
            work_mem,
        )?;
        channelset.swap();
        Ok(())
    }
}

/// The `(height, width)` after upscaling to at least `min_size` per side
/// with preserved aspect ratio.
///
/// The side with the larger scale becomes exactly `min_size`, the other is
/// truncated. Sizes already large enough are returned unchanged.
pub fn min_resize_size(min_size: usize, height: usize, width: usize) -> (usize, usize) {
    if height == 0 || width == 0 {
        return (height, width);
    }

    let scale_x = min_size as f32 / width as f32;
    let scale_y = min_size as f32 / height as f32;
    let scale = scale_x.max(scale_y);
    if scale <= 1.0 {
        return (height, width);
    }

    let new_width = if scale_x >= scale_y {
        min_size
    } else {
        (width as f32 * scale) as usize
    };
    let new_height = if scale_y >= scale_x {
        min_size
    } else {
        (height as f32 * scale) as usize
    };
    (new_height, new_width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{format::ChannelsetId, geometry::PlaneShape};

    #[test]
    fn sizes() {
        assert_eq!(min_resize_size(10, 5, 20), (10, 40));
        assert_eq!(min_resize_size(10, 20, 4), (50, 10));
        assert_eq!(min_resize_size(10, 8, 8), (10, 10));
        assert_eq!(min_resize_size(10, 12, 30), (12, 30));
    }

    #[test]
    fn resize_is_idempotent() -> Result<()> {
        let transform = MinResize::new(&MinResizeParam { min_size: 6 })?;
        let mut final_mem = vec![0.0; 2 * 6 * 12];
        let mut work_mem = vec![0.0; 2 * 6 * 12];
        final_mem
            .iter_mut()
            .take(2 * 3 * 6)
            .enumerate()
            .for_each(|(index, value)| *value = index as f32);

        let mut channelset = TransformableChannelset::new(
            ChannelsetId(0),
            "image",
            &mut final_mem,
            &mut work_mem,
            PlaneShape::new(2, 3, 6),
        )?;

        transform.transform(&mut [&mut channelset])?;
        assert_eq!(channelset.shape(), PlaneShape::new(2, 6, 12));
        assert!(channelset.is_swapped());
        let once = channelset.data().to_vec();

        transform.transform(&mut [&mut channelset])?;
        assert_eq!(channelset.shape(), PlaneShape::new(2, 6, 12));
        assert!(channelset.is_swapped());
        assert_eq!(channelset.data(), once.as_slice());
        Ok(())
    }

    #[test]
    fn rejects_many_channelsets() -> Result<()> {
        let transform = MinResize::new(&MinResizeParam { min_size: 2 })?;
        let (mut a, mut b, mut c, mut d) = (vec![0.0; 4], vec![0.0; 4], vec![0.0; 4], vec![0.0; 4]);
        let shape = PlaneShape::new(1, 1, 1);
        let mut lhs = TransformableChannelset::new(ChannelsetId(0), "a", &mut a, &mut b, shape)?;
        let mut rhs = TransformableChannelset::new(ChannelsetId(1), "b", &mut c, &mut d, shape)?;
        assert!(transform.transform(&mut [&mut lhs, &mut rhs]).is_err());
        Ok(())
    }
}
