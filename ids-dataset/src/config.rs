//! Loading and saving configuration formats.

use crate::{common::*, format::Compression};

pub use load::*;
pub use save::*;
pub use transform::*;

fn default_true() -> bool {
    true
}

fn default_threads_count() -> usize {
    num_cpus::get()
}

mod load {
    use super::*;

    /// The dataset loading configuration.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LoadConfig {
        /// IDS files forming the dataset, in example order.
        pub source: Vec<PathBuf>,
        /// Directory prepended to relative source files.
        #[serde(default)]
        pub source_path: Option<PathBuf>,
        /// A single file name replacing `source` when set.
        #[serde(default)]
        pub source_name: Option<String>,
        #[serde(default)]
        pub loader_index: usize,
        #[serde(default = "default_loaders_count")]
        pub loaders_count: usize,
        /// Desired number of bytes per disk read.
        #[serde(default = "default_disk_prefetch_size")]
        pub disk_prefetch_size: usize,
        #[serde(default)]
        pub shuffle_chunks: bool,
        #[serde(default)]
        pub shuffle_examples: bool,
        /// The number of image processing threads.
        #[serde(default = "default_threads_count")]
        pub threads_count: usize,
        /// The maximum number of processed examples alive at once.
        #[serde(default = "default_cache_size")]
        pub cache_size: usize,
        pub blobs: Vec<BlobConfig>,
        #[serde(default)]
        pub transforms: Vec<TransformConfig>,
    }

    impl LoadConfig {
        pub fn open<P>(path: P) -> Result<Self>
        where
            P: AsRef<Path>,
        {
            let path = path.as_ref();
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            let config = json5::from_str(&text)
                .with_context(|| format!("failed to parse '{}'", path.display()))?;
            Ok(config)
        }

        /// The IDS files to read after runtime overrides are applied.
        pub fn source_files(&self) -> Vec<PathBuf> {
            let names: Vec<PathBuf> = match &self.source_name {
                Some(name) => vec![PathBuf::from(name)],
                None => self.source.clone(),
            };

            names
                .into_iter()
                .map(|name| match &self.source_path {
                    Some(dir) if name.is_relative() => dir.join(name),
                    _ => name,
                })
                .collect()
        }
    }

    /// A named output buffer formed by concatenating channelsets.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlobConfig {
        pub name: String,
        pub channelsets: Vec<String>,
    }

    fn default_loaders_count() -> usize {
        1
    }

    fn default_disk_prefetch_size() -> usize {
        64 * 1024 * 1024
    }

    fn default_cache_size() -> usize {
        32
    }
}

mod transform {
    use super::*;

    /// One loading transform and the channelsets it applies to.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TransformConfig {
        #[serde(rename = "type")]
        pub kind: String,
        /// Names of the targeted channelsets.
        pub targets: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub crop_param: Option<CropParam>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub min_resize_param: Option<MinResizeParam>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub resize_crop_param: Option<ResizeCropParam>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub horizontal_flip_param: Option<HorizontalFlipParam>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub color_jitter_param: Option<ColorJitterParam>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub alexnet_color_param: Option<AlexNetColorParam>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub mean_param: Option<MeanParam>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub channelwise_scale_shift_param: Option<ChannelwiseScaleShiftParam>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ignore_value_param: Option<IgnoreValueParam>,
    }

    impl TransformConfig {
        /// Creates a configuration of the given type with no parameters.
        pub fn new<S>(kind: &str, targets: impl IntoIterator<Item = S>) -> Self
        where
            S: ToString,
        {
            Self {
                kind: kind.to_owned(),
                targets: targets.into_iter().map(|name| name.to_string()).collect(),
                crop_param: None,
                min_resize_param: None,
                resize_crop_param: None,
                horizontal_flip_param: None,
                color_jitter_param: None,
                alexnet_color_param: None,
                mean_param: None,
                channelwise_scale_shift_param: None,
                ignore_value_param: None,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CropParam {
        pub crop_size: usize,
        /// Takes the central window instead of a random one.
        #[serde(default)]
        pub central_crop: bool,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MinResizeParam {
        pub min_size: usize,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ResizeCropParam {
        pub crop_size: usize,
        pub min_area_fraction: R64,
        pub max_area_fraction: R64,
        pub min_aspect_ratio: R64,
        pub max_aspect_ratio: R64,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct HorizontalFlipParam {
        /// One flag per channel over all targeted channelsets. Flagged
        /// channels are reflected along with the image.
        #[serde(default)]
        pub flip_channel_values: Vec<bool>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ColorJitterParam {
        pub brightness: R64,
        pub contrast: R64,
        pub saturation: R64,
        #[serde(default)]
        pub lower_bound: Option<R64>,
        #[serde(default)]
        pub upper_bound: Option<R64>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct AlexNetColorParam {
        pub stdev: R64,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MeanParam {
        pub mean_file_path: PathBuf,
        pub resize_to: usize,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ChannelwiseScaleShiftParam {
        pub scale: Vec<R64>,
        pub shift: Vec<R64>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct IgnoreValueParam {
        pub value: R64,
        pub ignore_label: R64,
    }
}

mod save {
    use super::*;

    /// The dataset creation configuration.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SaveConfig {
        /// Whitespace separated tokens, one per channelset per example.
        pub list_file: PathBuf,
        pub output_file: PathBuf,
        /// Directory prepended to relative paths in the list file.
        #[serde(default)]
        pub root_dir: Option<PathBuf>,
        #[serde(default)]
        pub shuffle: bool,
        /// Fails on the first undecodable example instead of skipping it.
        #[serde(default = "default_true")]
        pub strict: bool,
        #[serde(default = "default_threads_count")]
        pub threads_count: usize,
        #[serde(default = "default_examples_per_batch")]
        pub examples_per_batch: usize,
        pub channelsets: Vec<SaveChannelsetConfig>,
    }

    impl SaveConfig {
        pub fn open<P>(path: P) -> Result<Self>
        where
            P: AsRef<Path>,
        {
            let path = path.as_ref();
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            let config = json5::from_str(&text)
                .with_context(|| format!("failed to parse '{}'", path.display()))?;
            Ok(config)
        }

        /// Resolves a list file token to a path.
        pub fn resolve_path(&self, token: &str) -> PathBuf {
            let path = PathBuf::from(token);
            match &self.root_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SaveChannelsetConfig {
        pub name: String,
        /// The number of channels stored for this channelset.
        pub in_channels: usize,
        pub out_compression: Compression,
        #[serde(default)]
        pub transforms: Vec<SaveTransformConfig>,
    }

    /// A transform applied to decoded 8-bit images before encoding.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "lowercase")]
    pub enum SaveTransformConfig {
        FixedResize {
            width: usize,
            height: usize,
            #[serde(default)]
            interpolation: Interpolation,
        },
        MinResize {
            min_size: usize,
            #[serde(default)]
            interpolation: Interpolation,
        },
        /// Maps RGB colors to single channel class values.
        PixelMap { mapping_file: PathBuf },
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Interpolation {
        Nearest,
        Linear,
    }

    impl Default for Interpolation {
        fn default() -> Self {
            Self::Linear
        }
    }

    fn default_examples_per_batch() -> usize {
        256
    }
}
