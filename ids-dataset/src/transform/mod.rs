//! Loading time transforms on decoded float channelsets.
//!
//! A [Transformer] pairs one [TransformKind] with the names of the
//! channelsets it targets. Sizes are given as `(height, width)`.

mod alexnet_color;
mod channelset;
mod color_jitter;
mod crop;
mod horizontal_flip;
mod ignore_value;
mod mean;
mod min_resize;
mod registry;
mod resize_crop;
mod rotation;
pub mod save;
mod scale_shift;

pub use alexnet_color::*;
pub use channelset::*;
pub use color_jitter::*;
pub use crop::*;
pub use horizontal_flip::*;
pub use ignore_value::*;
pub use mean::*;
pub use min_resize::*;
pub use registry::*;
pub use resize_crop::*;
pub use rotation::*;
pub use scale_shift::*;

use crate::{common::*, config::TransformConfig};

/// The closed set of loading transforms.
#[derive(Debug, Clone)]
pub enum TransformKind {
    Crop(Crop),
    MinResize(MinResize),
    ResizeCrop(ResizeCrop),
    HorizontalFlip(HorizontalFlip),
    Rotation(Rotation),
    ColorJitter(ColorJitter),
    AlexNetColor(AlexNetColor),
    Mean(Mean),
    ChannelwiseScaleShift(ChannelwiseScaleShift),
    IgnoreValue(IgnoreValue),
}

impl TransformKind {
    /// The size of a targeted channelset after the transform.
    pub fn transformed_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let size = match self {
            Self::Crop(transform) => transform.transformed_size(height, width)?,
            Self::MinResize(transform) => transform.transformed_size(height, width),
            Self::ResizeCrop(transform) => transform.transformed_size(height, width),
            Self::Mean(transform) => transform.transformed_size(height, width)?,
            Self::HorizontalFlip(_)
            | Self::Rotation(_)
            | Self::ColorJitter(_)
            | Self::AlexNetColor(_)
            | Self::ChannelwiseScaleShift(_)
            | Self::IgnoreValue(_) => (height, width),
        };
        Ok(size)
    }

    /// The number of workspace floats a targeted channelset needs.
    pub fn required_workspace(&self, channels: usize, height: usize, width: usize) -> usize {
        match self {
            Self::ResizeCrop(transform) => transform.required_workspace(channels, height, width),
            Self::ColorJitter(_) => (channels + 1) * height * width,
            Self::ChannelwiseScaleShift(_) | Self::IgnoreValue(_) => 0,
            Self::Crop(_)
            | Self::MinResize(_)
            | Self::HorizontalFlip(_)
            | Self::Rotation(_)
            | Self::AlexNetColor(_)
            | Self::Mean(_) => channels * height * width,
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
        match self {
            Self::Crop(transform) => transform.transform(channelsets, rng),
            Self::MinResize(transform) => transform.transform(channelsets),
            Self::ResizeCrop(transform) => transform.transform(channelsets, rng),
            Self::HorizontalFlip(transform) => transform.transform(channelsets, rng),
            Self::Rotation(transform) => transform.transform(channelsets, rng),
            Self::ColorJitter(transform) => transform.transform(channelsets, rng),
            Self::AlexNetColor(transform) => transform.transform(channelsets, rng),
            Self::Mean(transform) => transform.transform(channelsets),
            Self::ChannelwiseScaleShift(transform) => transform.transform(channelsets),
            Self::IgnoreValue(transform) => transform.transform(channelsets),
        }
    }
}

/// A transform applied to a declared list of target channelsets.
#[derive(Debug, Clone)]
pub struct Transformer {
    targets: Vec<String>,
    kind: TransformKind,
}

impl Transformer {
    pub fn new(config: &TransformConfig) -> Result<Self> {
        let kind = create_transform(config)?;
        Ok(Self::from_kind(config.targets.clone(), kind))
    }

    pub fn from_kind(targets: Vec<String>, kind: TransformKind) -> Self {
        Self { targets, kind }
    }

    pub fn kind(&self) -> &TransformKind {
        &self.kind
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn is_target(&self, name: &str) -> bool {
        self.targets.iter().any(|target| target == name)
    }

    /// The size of channelset `name` after this transform. Non-targets keep
    /// their size.
    pub fn transformed_size(&self, name: &str, height: usize, width: usize) -> Result<(usize, usize)> {
        if self.is_target(name) {
            self.kind
                .transformed_size(height, width)
                .with_context(|| format!("invalid size {}x{} of channelset '{}'", width, height, name))
        } else {
            Ok((height, width))
        }
    }

    /// Workspace floats needed for channelset `name`, zero for non-targets.
    pub fn required_workspace(&self, name: &str, channels: usize, height: usize, width: usize) -> usize {
        if self.is_target(name) {
            self.kind.required_workspace(channels, height, width)
        } else {
            0
        }
    }

    /// Transforms the targeted channelsets, keeping their example order.
    pub fn transform<R>(&self, channelsets: &mut [TransformableChannelset<'_>], rng: &mut R) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        let mut targeted: Vec<&mut TransformableChannelset<'_>> = channelsets
            .iter_mut()
            .filter(|channelset| self.is_target(channelset.name()))
            .collect();
        if targeted.is_empty() {
            return Ok(());
        }
        self.kind.transform(&mut targeted, rng)
    }
}

/// Returns the spatial size shared by every channelset.
pub(crate) fn shared_size(channelsets: &[&mut TransformableChannelset<'_>]) -> Result<(usize, usize)> {
    let first = channelsets
        .first()
        .ok_or_else(|| format_err!("no channelset is given"))?;
    let size = (first.height(), first.width());

    channelsets.iter().try_for_each(|channelset| {
        ensure!(
            (channelset.height(), channelset.width()) == size,
            "channelset '{}' is {}x{} but '{}' is {}x{}",
            channelset.name(),
            channelset.width(),
            channelset.height(),
            first.name(),
            size.1,
            size.0
        );
        Ok(())
    })?;

    Ok(size)
}

/// Returns the only channelset, failing if there are more.
pub(crate) fn single_channelset<'a, 'b>(
    channelsets: &'a mut [&mut TransformableChannelset<'b>],
    transform_name: &str,
) -> Result<&'a mut TransformableChannelset<'b>> {
    let count = channelsets.len();
    match channelsets {
        [channelset] => Ok(&mut **channelset),
        _ => bail!("{} expects one channelset, but get {}", transform_name, count),
    }
}
