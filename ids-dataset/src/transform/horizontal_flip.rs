use super::{shared_size, TransformableChannelset};
use crate::{common::*, config::HorizontalFlipParam, geometry};
use rand_distr::StandardNormal;

/// Mirrors the targeted channelsets with probability one half.
///
/// Channels flagged in `flip_channel_values` hold values that depend on the
/// orientation, e.g. horizontal flow. They are reflected across the
/// hyperplane orthogonal to a random unit direction `a`, that is
/// `x <- x - 2 (x . a) a` per pixel.
#[derive(Debug, Clone)]
pub struct HorizontalFlip {
    flip_channel_values: Vec<bool>,
}

impl HorizontalFlip {
    pub fn new(param: &HorizontalFlipParam) -> Result<Self> {
        Ok(Self {
            flip_channel_values: param.flip_channel_values.clone(),
        })
    }

    fn flagged_count(&self) -> usize {
        self.flip_channel_values.iter().filter(|&&flag| flag).count()
    }

    pub fn transform<R>(
        &self,
        channelsets: &mut [&mut TransformableChannelset<'_>],
        rng: &mut R,
    ) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        if !rng.gen_bool(0.5) {
            return Ok(());
        }

        channelsets.iter_mut().try_for_each(|channelset| -> Result<_> {
            let shape = channelset.shape();
            let (final_mem, work_mem) = channelset.buffers_mut();
            geometry::flip_horizontal(&final_mem[..shape.len()], shape, work_mem)?;
            channelset.swap();
            Ok(())
        })?;

        let flagged_count = self.flagged_count();
        if flagged_count == 0 {
            return Ok(());
        }

        let total_channels: usize = channelsets.iter().map(|channelset| channelset.channels()).sum();
        ensure!(
            self.flip_channel_values.len() == total_channels,
            "{} flip_channel_values flags are given for {} channels",
            self.flip_channel_values.len(),
            total_channels
        );
        let (height, width) = shared_size(channelsets)?;

        // random unit direction
        let direction: Vec<f64> = {
            let coefs: Vec<f64> = (0..flagged_count)
                .map(|_| rng.sample(StandardNormal))
                .collect();
            let norm = coefs.iter().map(|coef| coef * coef).sum::<f64>().sqrt();
            coefs.into_iter().map(|coef| coef / norm).collect()
        };

        // (channelset index, channel) of every flagged channel
        let flagged: Vec<(usize, usize)> = channelsets
            .iter()
            .enumerate()
            .flat_map(|(index, channelset)| (0..channelset.channels()).map(move |channel| (index, channel)))
            .zip(&self.flip_channel_values)
            .filter(|(_, flag)| **flag)
            .map(|(location, _)| location)
            .collect();

        let mut projection = vec![0f64; height * width];
        izip!(&flagged, &direction).for_each(|(&(index, channel), &coef)| {
            let channels = channelsets[index].channels();
            let data = channelsets[index].data();
            projection.iter_mut().enumerate().for_each(|(pixel, sum)| {
                *sum += data[pixel * channels + channel] as f64 * coef;
            });
        });

        izip!(&flagged, &direction).for_each(|(&(index, channel), &coef)| {
            let channels = channelsets[index].channels();
            let data = channelsets[index].data_mut();
            projection.iter().enumerate().for_each(|(pixel, &sum)| {
                data[pixel * channels + channel] -= (2.0 * sum * coef) as f32;
            });
        });

        Ok(())
    }
}
