use super::{shared_size, TransformableChannelset};
use crate::common::*;
use std::f64::consts::PI;

/// Rotates two-dimensional per-pixel vectors by a uniformly random angle.
///
/// The two components come either from one channelset with two channels or
/// from two single channel channelsets.
#[derive(Debug, Clone, Default)]
pub struct Rotation;

impl Rotation {
    pub fn transform<R>(
        &self,
        channelsets: &mut [&mut TransformableChannelset<'_>],
        rng: &mut R,
    ) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        let total_channels: usize = channelsets.iter().map(|channelset| channelset.channels()).sum();
        ensure!(
            total_channels == 2,
            "Rotation expects 2 channels in total, but get {}",
            total_channels
        );
        shared_size(channelsets)?;

        let angle = 2.0 * PI * rng.gen::<f64>();
        let (sin, cos) = angle.sin_cos();
        let rotate = |x: f32, y: f32| -> (f32, f32) {
            let (x, y) = (x as f64, y as f64);
            ((cos * x - sin * y) as f32, (sin * x + cos * y) as f32)
        };

        match channelsets {
            [channelset] => {
                channelset.data_mut().chunks_exact_mut(2).for_each(|pixel| {
                    let (x, y) = rotate(pixel[0], pixel[1]);
                    pixel[0] = x;
                    pixel[1] = y;
                });
            }
            [first, second] => {
                izip!(first.data_mut(), second.data_mut()).for_each(|(x, y)| {
                    let (new_x, new_y) = rotate(*x, *y);
                    *x = new_x;
                    *y = new_y;
                });
            }
            _ => bail!("Rotation expects at most 2 channelsets"),
        }

        Ok(())
    }
}
