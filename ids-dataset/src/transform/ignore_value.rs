use super::{shared_size, TransformableChannelset};
use crate::{common::*, config::IgnoreValueParam};

/// Marks label pixels as ignored where a value channelset holds a given
/// value.
///
/// Takes two single channel targets. The first one in example order is the
/// value source, the second one is the label that gets `ignore_label`.
#[derive(Debug, Clone)]
pub struct IgnoreValue {
    value: f32,
    ignore_label: f32,
}

impl IgnoreValue {
    pub fn new(param: &IgnoreValueParam, targets: &[String]) -> Result<Self> {
        ensure!(
            targets.len() == 2,
            "IgnoreValue requires two targets, but get {}",
            targets.len()
        );
        Ok(Self {
            value: param.value.raw() as f32,
            ignore_label: param.ignore_label.raw() as f32,
        })
    }

    pub fn transform(&self, channelsets: &mut [&mut TransformableChannelset<'_>]) -> Result<()> {
        shared_size(channelsets)?;
        let count = channelsets.len();

        match channelsets {
            [source, label] => {
                ensure!(
                    source.channels() == 1 && label.channels() == 1,
                    "IgnoreValue expects single channel targets, but get {} and {} channels",
                    source.channels(),
                    label.channels()
                );

                izip!(source.data(), label.data_mut()).for_each(|(&value, label)| {
                    if value == self.value {
                        *label = self.ignore_label;
                    }
                });
                Ok(())
            }
            _ => bail!("IgnoreValue expects two channelsets, but get {}", count),
        }
    }
}
