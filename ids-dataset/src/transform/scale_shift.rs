use super::TransformableChannelset;
use crate::{common::*, config::ChannelwiseScaleShiftParam};

/// Computes `scale[k] * value + shift[k]` for every channel `k`, counting
/// channels across the targeted channelsets in order.
#[derive(Debug, Clone)]
pub struct ChannelwiseScaleShift {
    scale: Vec<f32>,
    shift: Vec<f32>,
}

impl ChannelwiseScaleShift {
    pub fn new(param: &ChannelwiseScaleShiftParam) -> Result<Self> {
        ensure!(
            param.scale.len() == param.shift.len(),
            "{} scale values but {} shift values are given",
            param.scale.len(),
            param.shift.len()
        );

        Ok(Self {
            scale: param.scale.iter().map(|value| value.raw() as f32).collect(),
            shift: param.shift.iter().map(|value| value.raw() as f32).collect(),
        })
    }

    pub fn transform(&self, channelsets: &mut [&mut TransformableChannelset<'_>]) -> Result<()> {
        let total_channels: usize = channelsets.iter().map(|channelset| channelset.channels()).sum();
        ensure!(
            total_channels == self.scale.len(),
            "the number of scale and shift values must equal {} input channels, but get {}",
            total_channels,
            self.scale.len()
        );

        let mut first_channel = 0;
        for channelset in channelsets.iter_mut() {
            let channels = channelset.channels();
            let range = first_channel..(first_channel + channels);
            let scale = &self.scale[range.clone()];
            let shift = &self.shift[range];

            channelset.data_mut().chunks_exact_mut(channels).for_each(|pixel| {
                izip!(pixel, scale, shift).for_each(|(value, &scale, &shift)| {
                    *value = scale * *value + shift;
                });
            });
            first_channel += channels;
        }

        Ok(())
    }
}
