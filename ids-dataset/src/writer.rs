//! Creation of IDS files from list files.

use crate::{
    common::*,
    config::{SaveChannelsetConfig, SaveConfig},
    decompress::image_samples,
    format::*,
    tensor_file::TensorFile,
    transform::save::SaveTransform,
};
use image::{
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
    },
    ColorType, DynamicImage, GenericImageView as _,
};
use rayon::prelude::*;

/// Counters reported by [make_dataset].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteStatistics {
    pub examples: usize,
    pub errors: usize,
}

/// The serialized bytes of one channelset of one example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChannelset {
    pub width: usize,
    pub height: usize,
    pub bytes: Vec<u8>,
}

impl EncodedChannelset {
    pub fn value(value: i32) -> Self {
        Self {
            width: 1,
            height: 1,
            bytes: value.to_le_bytes().to_vec(),
        }
    }

    fn instance(&self) -> ChannelSetInstance {
        ChannelSetInstance {
            size: self.bytes.len(),
            width: self.width,
            height: self.height,
        }
    }
}

/// Writes examples into an IDS file.
///
/// The header is written with a zero cache offset first and rewritten by
/// [finish](IdsFileWriter::finish) once the trailing cache is in place.
#[derive(Debug)]
pub struct IdsFileWriter<W>
where
    W: Write + Seek,
{
    writer: W,
    channelsets: Vec<ChannelSet>,
    instances: Vec<ChannelSetInstance>,
}

impl IdsFileWriter<BufWriter<File>> {
    pub fn create<P>(path: P, channelsets: Vec<ChannelSet>) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("failed to create '{}'", path.display()))?;
        Self::new(BufWriter::new(file), channelsets)
    }
}

impl<W> IdsFileWriter<W>
where
    W: Write + Seek,
{
    pub fn new(mut writer: W, channelsets: Vec<ChannelSet>) -> Result<Self> {
        ensure!(!channelsets.is_empty(), "no channelset is given");
        let names: HashSet<_> = channelsets.iter().map(|channelset| &channelset.name).collect();
        ensure!(
            names.len() == channelsets.len(),
            "channelset names must be distinct"
        );

        Header::new(channelsets.len()).write(&mut writer)?;
        channelsets
            .iter()
            .try_for_each(|channelset| channelset.write(&mut writer))?;

        Ok(Self {
            writer,
            channelsets,
            instances: vec![],
        })
    }

    pub fn channelsets(&self) -> &[ChannelSet] {
        &self.channelsets
    }

    pub fn examples_count(&self) -> usize {
        self.instances.len() / self.channelsets.len()
    }

    /// Appends one example given in descriptor order.
    pub fn write_example(&mut self, example: &[EncodedChannelset]) -> Result<()> {
        ensure!(
            example.len() == self.channelsets.len(),
            "expect {} channelsets per example, but get {}",
            self.channelsets.len(),
            example.len()
        );

        let instances: Vec<_> = izip!(&self.channelsets, example)
            .map(|(channelset, encoded)| -> Result<_> {
                let instance = encoded.instance();
                check_instance(channelset, &instance)?;
                Ok(instance)
            })
            .collect::<Result<_>>()?;

        instances
            .iter()
            .try_for_each(|instance| instance.write(&mut self.writer))?;
        example
            .iter()
            .try_for_each(|encoded| self.writer.write_all(&encoded.bytes))?;
        self.instances.extend(instances);
        Ok(())
    }

    /// Writes the trailing instance cache and the final header.
    pub fn finish(mut self) -> Result<W> {
        let cached_instances_start = self.writer.stream_position()?;
        self.instances
            .iter()
            .try_for_each(|instance| instance.write(&mut self.writer))?;

        self.writer.seek(SeekFrom::Start(0))?;
        let header = Header {
            cached_instances_start,
            ..Header::new(self.channelsets.len())
        };
        header.write(&mut self.writer)?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Size checks of an instance against its slot descriptor.
fn check_instance(channelset: &ChannelSet, instance: &ChannelSetInstance) -> Result<()> {
    let ChannelSet {
        ref name,
        channels,
        compression,
    } = *channelset;
    let ChannelSetInstance {
        size,
        width,
        height,
    } = *instance;

    match compression {
        Compression::Value => ensure!(
            width == 1 && height == 1 && size == mem::size_of::<i32>(),
            "value channelset '{}' must be a single 4 byte value",
            name
        ),
        Compression::Raw => ensure!(
            size == channels * height * width,
            "raw channelset '{}' has {} bytes, expected {}x{}x{}",
            name,
            size,
            channels,
            height,
            width
        ),
        Compression::Jpg | Compression::Png | Compression::Tensor => {
            ensure!(size > 0, "empty channelset '{}'", name)
        }
    }
    Ok(())
}

/// Reads the list file into examples of one token per channelset.
pub fn read_list_file(config: &SaveConfig) -> Result<Vec<Vec<String>>> {
    let path = &config.list_file;
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read list file '{}'", path.display()))?;
    parse_list(&text, config.channelsets.len())
        .with_context(|| format!("invalid list file '{}'", path.display()))
}

fn parse_list(text: &str, channelsets_count: usize) -> Result<Vec<Vec<String>>> {
    ensure!(channelsets_count > 0, "no channelset is configured");
    let tokens: Vec<_> = text.split_whitespace().collect();
    ensure!(
        tokens.len() % channelsets_count == 0,
        "{} tokens is not a multiple of {} channelsets",
        tokens.len(),
        channelsets_count
    );

    let examples = tokens
        .chunks(channelsets_count)
        .map(|tokens| tokens.iter().map(|token| token.to_string()).collect())
        .collect();
    Ok(examples)
}

/// Decodes an image file into luma (1 channel) or RGB (3 channels).
pub fn decode_image(path: &Path, channels: usize) -> Result<DynamicImage> {
    let image =
        image::open(path).with_context(|| format!("failed to decode image '{}'", path.display()))?;
    let image = match channels {
        1 => DynamicImage::ImageLuma8(image.into_luma8()),
        3 => DynamicImage::ImageRgb8(image.into_rgb8()),
        _ => bail!("images must have 1 or 3 input channels, but get {}", channels),
    };
    Ok(image)
}

/// Encoding settings of one channelset slot.
#[derive(Debug)]
struct SlotEncoder {
    descriptor: ChannelSet,
    in_channels: usize,
    transforms: Vec<SaveTransform>,
}

impl SlotEncoder {
    fn new(config: &SaveChannelsetConfig) -> Result<Self> {
        let SaveChannelsetConfig {
            ref name,
            in_channels,
            out_compression,
            ref transforms,
        } = *config;

        let transforms: Vec<_> = transforms
            .iter()
            .map(SaveTransform::new)
            .collect::<Result<_>>()
            .with_context(|| format!("invalid transforms of channelset '{}'", name))?;
        ensure!(
            out_compression.is_image() || transforms.is_empty(),
            "channelset '{}' of {} compression cannot have transforms",
            name,
            out_compression
        );

        let channels = match out_compression {
            Compression::Value => 1,
            Compression::Tensor => in_channels,
            Compression::Jpg | Compression::Png | Compression::Raw => {
                ensure!(
                    in_channels == 1 || in_channels == 3,
                    "image channelset '{}' must have 1 or 3 input channels",
                    name
                );
                transforms
                    .iter()
                    .fold(in_channels, |channels, transform| transform.output_channels(channels))
            }
        };

        Ok(Self {
            descriptor: ChannelSet::new(name, channels, out_compression)?,
            in_channels,
            transforms,
        })
    }

    fn encode(&self, config: &SaveConfig, token: &str) -> Result<EncodedChannelset> {
        let ChannelSet {
            ref name,
            channels,
            compression,
        } = self.descriptor;

        let encoded = match compression {
            Compression::Value => {
                let value: i32 = token
                    .parse()
                    .with_context(|| format!("invalid value '{}' of channelset '{}'", token, name))?;
                EncodedChannelset::value(value)
            }
            Compression::Tensor => {
                let tensor = TensorFile::open(config.resolve_path(token))?;
                ensure!(
                    tensor.channels == channels,
                    "tensor of channelset '{}' has {} channels, expected {}",
                    name,
                    tensor.channels,
                    channels
                );
                EncodedChannelset {
                    width: tensor.width,
                    height: tensor.height,
                    bytes: tensor.encode(),
                }
            }
            Compression::Jpg | Compression::Png | Compression::Raw => {
                let image = decode_image(&config.resolve_path(token), self.in_channels)?;
                let image = self
                    .transforms
                    .iter()
                    .try_fold(image, |image, transform| transform.transform(image))?;
                let (width, height) = image.dimensions();
                let samples = image_samples(image, channels)?;

                EncodedChannelset {
                    width: width as usize,
                    height: height as usize,
                    bytes: encode_samples(&samples, width, height, channels, compression)?,
                }
            }
        };

        Ok(encoded)
    }
}

fn encode_samples(
    samples: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    compression: Compression,
) -> Result<Vec<u8>> {
    let color = match channels {
        1 => ColorType::L8,
        2 => ColorType::La8,
        3 => ColorType::Rgb8,
        4 => ColorType::Rgba8,
        _ => bail!("cannot encode {} channel images", channels),
    };

    let bytes = match compression {
        Compression::Raw => samples.to_vec(),
        Compression::Jpg => {
            let mut bytes = vec![];
            JpegEncoder::new_with_quality(&mut bytes, 100).encode(samples, width, height, color)?;
            bytes
        }
        Compression::Png => {
            let mut bytes = vec![];
            PngEncoder::new_with_quality(&mut bytes, CompressionType::Best, FilterType::Adaptive)
                .encode(samples, width, height, color)?;
            bytes
        }
        Compression::Value | Compression::Tensor => {
            bail!("{} is not an image compression", compression)
        }
    };
    Ok(bytes)
}

/// Creates the IDS file described by `config`.
pub fn make_dataset(config: &SaveConfig) -> Result<WriteStatistics> {
    ensure!(config.threads_count > 0, "threads_count must be positive");
    ensure!(
        config.examples_per_batch > 0,
        "examples_per_batch must be positive"
    );

    let encoders: Vec<_> = config
        .channelsets
        .iter()
        .map(SlotEncoder::new)
        .collect::<Result<_>>()?;
    let mut examples = read_list_file(config)?;
    if config.shuffle {
        let mut rng = StdRng::seed_from_u64(0);
        examples.shuffle(&mut rng);
    }
    info!(
        "writing {} examples into '{}'",
        examples.len(),
        config.output_file.display()
    );

    let thread_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads_count)
        .build()?;
    let descriptors = encoders
        .iter()
        .map(|encoder| encoder.descriptor.clone())
        .collect();
    let mut writer = IdsFileWriter::create(&config.output_file, descriptors)?;
    let mut stats = WriteStatistics::default();

    for batch in examples.chunks(config.examples_per_batch) {
        let encoded: Vec<Result<Vec<EncodedChannelset>>> = thread_pool.install(|| {
            batch
                .par_iter()
                .map(|tokens| {
                    izip!(&encoders, tokens)
                        .map(|(encoder, token)| encoder.encode(config, token))
                        .collect()
                })
                .collect()
        });

        for (tokens, example) in izip!(batch, encoded) {
            match example {
                Ok(example) => {
                    writer.write_example(&example)?;
                    stats.examples += 1;
                }
                Err(err) if !config.strict => {
                    warn!("skip example {:?}: {:#}", tokens, err);
                    stats.errors += 1;
                }
                Err(err) => {
                    return Err(err.context(format!("failed to encode example {:?}", tokens)));
                }
            }
        }
        debug!("{} examples are written", stats.examples);
    }

    if stats.examples == 0 {
        // a file without examples cannot be loaded
        drop(writer);
        fs::remove_file(&config.output_file).with_context(|| {
            format!("failed to remove '{}'", config.output_file.display())
        })?;
        bail!("none of the {} examples could be encoded", stats.errors);
    }

    writer.finish()?;
    info!("{} examples and {} errors", stats.examples, stats.errors);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_token_count() -> Result<()> {
        let examples = parse_list("a.png 3\nb.png 4\n\n", 2)?;
        assert_eq!(examples, vec![vec!["a.png", "3"], vec!["b.png", "4"]]);
        assert!(parse_list("a.png 3 b.png", 2).is_err());
        Ok(())
    }

    #[test]
    fn file_layout() -> Result<()> {
        let channelsets = vec![
            ChannelSet::new("label", 1, Compression::Value)?,
            ChannelSet::new("raw", 2, Compression::Raw)?,
        ];
        let mut writer = IdsFileWriter::new(io::Cursor::new(vec![]), channelsets)?;
        writer.write_example(&[
            EncodedChannelset::value(5),
            EncodedChannelset {
                width: 2,
                height: 1,
                bytes: vec![1, 2, 3, 4],
            },
        ])?;
        assert!(writer
            .write_example(&[EncodedChannelset::value(5), EncodedChannelset::value(6)])
            .is_err());
        assert_eq!(writer.examples_count(), 1);
        let bytes = writer.finish()?.into_inner();

        let example_start = Header::SIZE + 2 * ChannelSet::SIZE;
        let cache_start = example_start + 2 * ChannelSetInstance::SIZE + 4 + 4;
        assert_eq!(bytes.len(), cache_start + 2 * ChannelSetInstance::SIZE);

        let header = Header::read(&mut bytes.as_slice())?;
        assert_eq!(header.cached_instances_start, cache_start as u64);
        let inline = ChannelSetInstance::parse_many(&bytes[example_start..], 2)?;
        let cached = ChannelSetInstance::parse_many(&bytes[cache_start..], 2)?;
        assert_eq!(inline, cached);
        assert_eq!(
            cached[1],
            ChannelSetInstance {
                size: 4,
                width: 2,
                height: 1
            }
        );
        Ok(())
    }

    #[test]
    fn descriptor_channels_follow_transforms() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mapping = dir.path().join("mapping.txt");
        fs::write(&mapping, "road,1,128,64,128\n")?;

        let config: SaveChannelsetConfig = json5::from_str(&format!(
            r#"{{
                name: "label",
                in_channels: 3,
                out_compression: "png",
                transforms: [{{ type: "pixelmap", mapping_file: {:?} }}],
            }}"#,
            mapping
        ))?;
        let encoder = SlotEncoder::new(&config)?;
        assert_eq!(encoder.descriptor.channels, 1);
        assert_eq!(encoder.descriptor.compression, Compression::Png);
        Ok(())
    }
}
