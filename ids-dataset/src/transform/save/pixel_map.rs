use crate::common::*;
use image::{DynamicImage, GrayImage};

/// Converts an RGB color coded label image to single channel class values.
///
/// The mapping file has one `class_name,out,red,green,blue` line per color.
/// A pixel whose color has no mapping is an error.
#[derive(Debug, Clone)]
pub struct PixelMap {
    mapping: HashMap<[u8; 3], u8>,
}

impl PixelMap {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read mapping file '{}'", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid mapping file '{}'", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mapping = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_index, line)| -> Result<_> {
                let tokens: Vec<_> = line.split(',').map(str::trim).collect();
                ensure!(
                    tokens.len() == 5,
                    "line {} has {} comma separated values, expect 5",
                    line_index + 1,
                    tokens.len()
                );
                let values: Vec<u8> = tokens[1..]
                    .iter()
                    .map(|token| {
                        token.parse().with_context(|| {
                            format!("invalid value '{}' at line {}", token, line_index + 1)
                        })
                    })
                    .collect::<Result<_>>()?;
                Ok(([values[1], values[2], values[3]], values[0]))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self { mapping })
    }

    pub fn transform(&self, image: &DynamicImage) -> Result<DynamicImage> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let values: Vec<u8> = rgb
            .pixels()
            .map(|pixel| {
                self.mapping.get(&pixel.0).copied().ok_or_else(|| {
                    format_err!("color {:?} has no mapping", pixel.0)
                })
            })
            .collect::<Result<_>>()?;
        let gray = GrayImage::from_raw(width, height, values)
            .ok_or_else(|| format_err!("mapped image buffer has invalid size"))?;
        Ok(DynamicImage::ImageLuma8(gray))
    }
}
