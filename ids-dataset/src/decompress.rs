//! Expansion of serialized channelsets into interleaved float planes.

use crate::{common::*, format::*};
use image::{DynamicImage, GenericImageView as _, ImageFormat};

/// Decompresses one channelset into `out`.
///
/// `out` and `work` must each hold at least `channels * height * width`
/// floats. The decoded plane is interleaved (height, width, channels).
pub fn decompress(
    bytes: &[u8],
    channels: usize,
    height: usize,
    width: usize,
    compression: Compression,
    out: &mut [f32],
    work: &mut [f32],
) -> Result<()> {
    let len = channels * height * width;
    ensure!(
        out.len() >= len && work.len() >= len,
        "output buffers hold {} and {} floats but {} are required",
        out.len(),
        work.len(),
        len
    );
    let out = &mut out[..len];

    match compression {
        Compression::Raw => {
            ensure!(
                bytes.len() == len,
                "raw channelset has {} bytes, expected {}x{}x{}",
                bytes.len(),
                channels,
                height,
                width
            );
            widen(bytes, out);
        }
        Compression::Jpg | Compression::Png => {
            let format = if compression == Compression::Jpg {
                ImageFormat::Jpeg
            } else {
                ImageFormat::Png
            };
            let image = image::load_from_memory_with_format(bytes, format)
                .with_context(|| format!("failed to decode {} channelset", compression))?;
            ensure!(
                image.width() as usize == width && image.height() as usize == height,
                "decoded image is {}x{}, expected {}x{}",
                image.width(),
                image.height(),
                width,
                height
            );
            let samples = image_samples(image, channels)?;
            widen(&samples, out);
        }
        Compression::Value => {
            ensure!(
                channels == 1 && height == 1 && width == 1,
                "value channelset must be 1x1x1, but get {}x{}x{}",
                channels,
                height,
                width
            );
            ensure!(
                bytes.len() == mem::size_of::<i32>(),
                "value channelset has {} bytes",
                bytes.len()
            );
            out[0] = (&bytes[..]).read_i32::<LittleEndian>()? as f32;
        }
        Compression::Tensor => {
            let mut reader = bytes;
            let tensor_type = TensorType::from_code(reader.read_i32::<LittleEndian>()?)?;
            ensure!(
                reader.len() == len * tensor_type.element_size(),
                "tensor channelset has {} data bytes, expected {} {} elements",
                reader.len(),
                len,
                tensor_type
            );

            match tensor_type {
                TensorType::Int => out.iter_mut().try_for_each(|value| -> Result<_> {
                    *value = reader.read_i32::<LittleEndian>()? as f32;
                    Ok(())
                })?,
                TensorType::Float => reader.read_f32_into::<LittleEndian>(out)?,
                TensorType::Double => out.iter_mut().try_for_each(|value| -> Result<_> {
                    *value = reader.read_f64::<LittleEndian>()? as f32;
                    Ok(())
                })?,
            }
        }
    }

    Ok(())
}

/// Converts a decoded image to interleaved 8-bit samples of `channels` channels.
pub fn image_samples(image: DynamicImage, channels: usize) -> Result<Vec<u8>> {
    let samples = match channels {
        1 => image.into_luma8().into_raw(),
        2 => image.into_luma_alpha8().into_raw(),
        3 => image.into_rgb8().into_raw(),
        4 => image.into_rgba8().into_raw(),
        _ => bail!("images with {} channels are not supported", channels),
    };
    Ok(samples)
}

fn widen(bytes: &[u8], out: &mut [f32]) {
    izip!(out, bytes).for_each(|(dst, &src)| *dst = src as f32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_size_must_match() {
        let mut out = vec![0.0; 12];
        let mut work = vec![0.0; 12];
        assert!(decompress(&[0; 11], 3, 2, 2, Compression::Raw, &mut out, &mut work).is_err());
        assert!(decompress(&[7; 12], 3, 2, 2, Compression::Raw, &mut out, &mut work).is_ok());
        assert!(out.iter().all(|&value| value == 7.0));
    }

    #[test]
    fn value_channelset() -> Result<()> {
        let mut out = vec![0.0; 1];
        let mut work = vec![0.0; 1];
        decompress(
            &(-3i32).to_le_bytes(),
            1,
            1,
            1,
            Compression::Value,
            &mut out,
            &mut work,
        )?;
        assert_eq!(out[0], -3.0);
        assert!(decompress(&[0; 3], 1, 1, 1, Compression::Value, &mut out, &mut work).is_err());
        Ok(())
    }

    #[test]
    fn double_tensor() -> Result<()> {
        let mut bytes = vec![];
        bytes.write_i32::<LittleEndian>(TensorType::Double.code())?;
        for value in [0.5f64, -1.5, 2.0, 4.25] {
            bytes.write_f64::<LittleEndian>(value)?;
        }

        let mut out = vec![0.0; 4];
        let mut work = vec![0.0; 4];
        decompress(&bytes, 2, 1, 2, Compression::Tensor, &mut out, &mut work)?;
        assert_eq!(out, vec![0.5, -1.5, 2.0, 4.25]);

        bytes.pop();
        assert!(decompress(&bytes, 2, 1, 2, Compression::Tensor, &mut out, &mut work).is_err());
        Ok(())
    }
}
