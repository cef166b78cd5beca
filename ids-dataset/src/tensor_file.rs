//! Tensor source files referenced by list files.
//!
//! A `.txt` file holds the type code, height, width and channels followed by
//! the values, all whitespace separated. A `.bin` file holds the same fields
//! as little-endian `i32` followed by the packed values.

use crate::{common::*, format::TensorType};

/// A tensor read from a source file, with its values packed little-endian.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorFile {
    pub tensor_type: TensorType,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    values: Vec<u8>,
}

impl TensorFile {
    /// Reads a tensor, choosing the format by the file extension.
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        let tensor = match extension.as_deref() {
            Some("txt") => {
                let text = fs::read_to_string(path)?;
                Self::parse_text(&text)
            }
            Some("bin") => {
                let mut reader = BufReader::new(File::open(path)?);
                Self::read_binary(&mut reader)
            }
            _ => bail!("tensor files must end with .txt or .bin"),
        };
        tensor.with_context(|| format!("failed to read tensor file '{}'", path.display()))
    }

    pub fn parse_text(text: &str) -> Result<Self> {
        let mut tokens = text.split_whitespace();
        let mut next_dim = |name: &str| -> Result<i32> {
            let token = tokens
                .next()
                .ok_or_else(|| format_err!("missing tensor {}", name))?;
            token
                .parse()
                .with_context(|| format!("invalid tensor {} '{}'", name, token))
        };

        let tensor_type = TensorType::from_code(next_dim("type")?)?;
        let (height, width, channels) = Self::check_shape(next_dim("height")?, next_dim("width")?, next_dim("channels")?)?;
        let count = height * width * channels;

        let mut values = Vec::with_capacity(count * tensor_type.element_size());
        let mut num_values = 0;
        for token in tokens {
            match tensor_type {
                TensorType::Int => values.write_i32::<LittleEndian>(parse_value(token)?)?,
                TensorType::Float => values.write_f32::<LittleEndian>(parse_value(token)?)?,
                TensorType::Double => values.write_f64::<LittleEndian>(parse_value(token)?)?,
            }
            num_values += 1;
        }
        ensure!(
            num_values == count,
            "expect {} tensor values, but get {}",
            count,
            num_values
        );

        Ok(Self {
            tensor_type,
            height,
            width,
            channels,
            values,
        })
    }

    pub fn read_binary<R>(reader: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let tensor_type = TensorType::from_code(reader.read_i32::<LittleEndian>()?)?;
        let height = reader.read_i32::<LittleEndian>()?;
        let width = reader.read_i32::<LittleEndian>()?;
        let channels = reader.read_i32::<LittleEndian>()?;
        let (height, width, channels) = Self::check_shape(height, width, channels)?;

        let mut values = vec![0u8; height * width * channels * tensor_type.element_size()];
        reader
            .read_exact(&mut values)
            .with_context(|| "truncated tensor values")?;

        Ok(Self {
            tensor_type,
            height,
            width,
            channels,
            values,
        })
    }

    /// The channelset bytes: the type code followed by the values.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(mem::size_of::<i32>() + self.values.len());
        bytes.extend_from_slice(&self.tensor_type.code().to_le_bytes());
        bytes.extend_from_slice(&self.values);
        bytes
    }

    fn check_shape(height: i32, width: i32, channels: i32) -> Result<(usize, usize, usize)> {
        ensure!(
            height > 0 && width > 0 && channels > 0,
            "invalid tensor shape {}x{}x{}",
            height,
            width,
            channels
        );
        Ok((height as usize, width as usize, channels as usize))
    }
}

fn parse_value<T>(token: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    token
        .parse()
        .with_context(|| format!("invalid tensor value '{}'", token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_tensor() -> Result<()> {
        let tensor = TensorFile::parse_text("1 1 2 2\n0.5 -1.0\n2.0 3.25\n")?;
        assert_eq!(tensor.tensor_type, TensorType::Float);
        assert_eq!((tensor.height, tensor.width, tensor.channels), (1, 2, 2));

        let bytes = tensor.encode();
        assert_eq!(bytes.len(), 4 + 4 * 4);
        let mut reader = &bytes[..];
        assert_eq!(reader.read_i32::<LittleEndian>()?, TensorType::Float.code());
        let mut values = [0f32; 4];
        reader.read_f32_into::<LittleEndian>(&mut values)?;
        assert_eq!(values, [0.5, -1.0, 2.0, 3.25]);

        assert!(TensorFile::parse_text("0 1 1 2\n7").is_err());
        assert!(TensorFile::parse_text("0 1 1 1\n1.5").is_err());
        assert!(TensorFile::parse_text("9 1 1 1\n1").is_err());
        Ok(())
    }

    #[test]
    fn binary_tensor() -> Result<()> {
        let mut bytes = vec![];
        [TensorType::Double.code(), 2, 1, 1]
            .iter()
            .try_for_each(|&value| bytes.write_i32::<LittleEndian>(value))?;
        bytes.write_f64::<LittleEndian>(1.5)?;
        bytes.write_f64::<LittleEndian>(-2.0)?;

        let tensor = TensorFile::read_binary(&mut bytes.as_slice())?;
        assert_eq!(tensor.tensor_type, TensorType::Double);
        assert_eq!((tensor.height, tensor.width, tensor.channels), (2, 1, 1));
        assert_eq!(&tensor.encode()[4..], &bytes[16..]);

        assert!(TensorFile::read_binary(&mut &bytes[..bytes.len() - 1]).is_err());
        Ok(())
    }

    #[test]
    fn dispatch_by_extension() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("label.txt");
        fs::write(&path, "0 1 1 3\n1 2 3\n")?;
        assert_eq!(TensorFile::open(&path)?.tensor_type, TensorType::Int);

        let path = dir.path().join("label.npy");
        fs::write(&path, "0 1 1 1\n1\n")?;
        assert!(TensorFile::open(&path).is_err());
        Ok(())
    }
}
