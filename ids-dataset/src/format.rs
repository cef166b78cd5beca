//! The IDS binary container layout.
//!
//! ```text
//! [Header]
//! [ChannelSet] * channelsets_count
//! repeat per example:
//!   [ChannelSetInstance] * channelsets_count
//!   concatenated channelset bytes
//! [ChannelSetInstance] * (channelsets_count * examples_count)
//! ```
//!
//! Every integer is stored in little-endian order.

use crate::common::*;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use strum::{AsRefStr, Display, EnumString};

/// The only file version this crate reads and writes.
pub const IDS_FILE_VERSION: i32 = 2;

/// Size of the NUL padded channelset name field.
pub const MAX_NAME_LEN: usize = 16;

/// The compression of a channelset slot.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    FromPrimitive,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Compression {
    Jpg = 0,
    Png = 1,
    Raw = 2,
    #[serde(rename = "val")]
    #[strum(serialize = "val")]
    Value = 3,
    Tensor = 4,
}

impl Compression {
    pub fn from_code(code: i32) -> Result<Self> {
        Self::from_i32(code).ok_or_else(|| format_err!("invalid compression code {}", code))
    }

    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Returns true if the channelset is an encoded or raw 8-bit image.
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Jpg | Self::Png | Self::Raw)
    }
}

/// The element type of a tensor channelset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TensorType {
    Int = 0,
    Float = 1,
    Double = 2,
}

impl TensorType {
    pub fn from_code(code: i32) -> Result<Self> {
        Self::from_i32(code).ok_or_else(|| format_err!("invalid tensor type {}", code))
    }

    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn element_size(&self) -> usize {
        match self {
            Self::Int => mem::size_of::<i32>(),
            Self::Float => mem::size_of::<f32>(),
            Self::Double => mem::size_of::<f64>(),
        }
    }
}

/// The opaque handle of a channelset slot, resolved once by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelsetId(pub(crate) usize);

impl ChannelsetId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: i32,
    pub channelsets_count: usize,
    pub cached_instances_start: u64,
}

impl Header {
    pub const SIZE: usize = 16;

    pub fn new(channelsets_count: usize) -> Self {
        Self {
            version: IDS_FILE_VERSION,
            channelsets_count,
            cached_instances_start: 0,
        }
    }

    pub fn read<R>(reader: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let version = reader.read_i32::<LittleEndian>()?;
        ensure!(
            version == IDS_FILE_VERSION,
            "version mismatch in IDS loading, {} given {} expected",
            version,
            IDS_FILE_VERSION
        );
        let channelsets_count = reader.read_i32::<LittleEndian>()?;
        ensure!(
            channelsets_count > 0,
            "invalid channelsets count {}",
            channelsets_count
        );
        let cached_instances_start = reader.read_i64::<LittleEndian>()?;
        ensure!(
            cached_instances_start >= 0,
            "invalid cached instances offset {}",
            cached_instances_start
        );

        Ok(Self {
            version,
            channelsets_count: channelsets_count as usize,
            cached_instances_start: cached_instances_start as u64,
        })
    }

    pub fn write<W>(&self, writer: &mut W) -> Result<()>
    where
        W: Write,
    {
        writer.write_i32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.channelsets_count.try_into()?)?;
        writer.write_i64::<LittleEndian>(self.cached_instances_start.try_into()?)?;
        Ok(())
    }

    /// Headers of files forming one dataset must agree on everything but
    /// the cache offset.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.version == other.version && self.channelsets_count == other.channelsets_count
    }
}

/// The global descriptor of a channelset slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelSet {
    pub channels: usize,
    pub compression: Compression,
    pub name: String,
}

impl ChannelSet {
    pub const SIZE: usize = 8 + MAX_NAME_LEN;

    pub fn new(name: &str, channels: usize, compression: Compression) -> Result<Self> {
        ensure!(
            name.len() < MAX_NAME_LEN,
            "channelset name '{}' is longer than {} bytes",
            name,
            MAX_NAME_LEN - 1
        );
        ensure!(!name.is_empty(), "empty channelset name");
        ensure!(channels > 0, "channelset '{}' has zero channels", name);

        Ok(Self {
            channels,
            compression,
            name: name.to_owned(),
        })
    }

    pub fn read<R>(reader: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let channels = reader.read_i32::<LittleEndian>()?;
        let compression = Compression::from_code(reader.read_i32::<LittleEndian>()?)?;
        let mut name_buf = [0u8; MAX_NAME_LEN];
        reader.read_exact(&mut name_buf)?;

        let name_len = name_buf
            .iter()
            .position(|&byte| byte == 0)
            .ok_or_else(|| format_err!("channelset name is not NUL terminated"))?;
        let name = std::str::from_utf8(&name_buf[..name_len])
            .with_context(|| "channelset name is not valid UTF-8")?;
        ensure!(channels > 0, "channelset '{}' has {} channels", name, channels);

        Ok(Self {
            channels: channels as usize,
            compression,
            name: name.to_owned(),
        })
    }

    pub fn write<W>(&self, writer: &mut W) -> Result<()>
    where
        W: Write,
    {
        ensure!(self.name.len() < MAX_NAME_LEN);
        let mut name_buf = [0u8; MAX_NAME_LEN];
        name_buf[..self.name.len()].copy_from_slice(self.name.as_bytes());

        writer.write_i32::<LittleEndian>(self.channels.try_into()?)?;
        writer.write_i32::<LittleEndian>(self.compression.code())?;
        writer.write_all(&name_buf)?;
        Ok(())
    }

    pub fn check_compatible(&self, other: &Self) -> Result<()> {
        ensure!(
            self == other,
            "incompatible channelsets {:?} and {:?}",
            self,
            other
        );
        Ok(())
    }
}

/// The per-example descriptor of one channelset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChannelSetInstance {
    /// Serialized size in bytes.
    pub size: usize,
    pub width: usize,
    pub height: usize,
}

impl ChannelSetInstance {
    pub const SIZE: usize = 12;

    pub fn read<R>(reader: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let size = reader.read_i32::<LittleEndian>()?;
        let width = reader.read_i32::<LittleEndian>()?;
        let height = reader.read_i32::<LittleEndian>()?;
        ensure!(
            size >= 0 && width >= 0 && height >= 0,
            "invalid channelset instance (size={}, width={}, height={})",
            size,
            width,
            height
        );

        Ok(Self {
            size: size as usize,
            width: width as usize,
            height: height as usize,
        })
    }

    /// Parses `count` consecutive instances from the beginning of `bytes`.
    pub fn parse_many(bytes: &[u8], count: usize) -> Result<Vec<Self>> {
        ensure!(
            bytes.len() >= count * Self::SIZE,
            "truncated channelset instances, {} bytes for {} instances",
            bytes.len(),
            count
        );
        let mut reader = bytes;
        (0..count).map(|_| Self::read(&mut reader)).collect()
    }

    pub fn write<W>(&self, writer: &mut W) -> Result<()>
    where
        W: Write,
    {
        writer.write_i32::<LittleEndian>(self.size.try_into()?)?;
        writer.write_i32::<LittleEndian>(self.width.try_into()?)?;
        writer.write_i32::<LittleEndian>(self.height.try_into()?)?;
        Ok(())
    }
}

/// Total serialized size of one example, inline instances included.
pub fn example_size(instances: &[ChannelSetInstance]) -> usize {
    instances.len() * ChannelSetInstance::SIZE
        + instances.iter().map(|instance| instance.size).sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() -> Result<()> {
        let header = Header {
            cached_instances_start: 1234,
            ..Header::new(3)
        };
        let mut bytes = vec![];
        header.write(&mut bytes)?;
        assert_eq!(bytes.len(), Header::SIZE);
        assert_eq!(&bytes[0..4], &2i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &3i32.to_le_bytes());
        assert_eq!(&bytes[8..16], &1234i64.to_le_bytes());
        assert_eq!(Header::read(&mut bytes.as_slice())?, header);
        Ok(())
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut bytes = vec![];
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&0i64.to_le_bytes());
        assert!(Header::read(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn channelset_name_limits() -> Result<()> {
        assert!(ChannelSet::new("0123456789abcdef", 3, Compression::Png).is_err());
        let channelset = ChannelSet::new("0123456789abcde", 3, Compression::Png)?;

        let mut bytes = vec![];
        channelset.write(&mut bytes)?;
        assert_eq!(bytes.len(), ChannelSet::SIZE);
        assert_eq!(ChannelSet::read(&mut bytes.as_slice())?, channelset);
        Ok(())
    }

    #[test]
    fn compression_names() -> Result<()> {
        assert_eq!(Compression::from_str("val")?, Compression::Value);
        assert_eq!(Compression::from_str("jpg")?, Compression::Jpg);
        assert_eq!(Compression::Tensor.as_ref(), "tensor");
        assert!(Compression::from_code(5).is_err());
        Ok(())
    }
}
