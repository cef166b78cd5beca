use super::{single_channelset, TransformableChannelset};
use crate::{common::*, config::ColorJitterParam};

const RED_WEIGHT: f32 = 0.299;
const GREEN_WEIGHT: f32 = 0.587;
const BLUE_WEIGHT: f32 = 0.114;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adjustment {
    Brightness,
    Contrast,
    Saturation,
}

/// Random brightness, contrast and saturation changes of an RGB channelset,
/// applied in random order.
#[derive(Debug, Clone)]
pub struct ColorJitter {
    brightness: f32,
    contrast: f32,
    saturation: f32,
    lower_bound: Option<f32>,
    upper_bound: Option<f32>,
}

impl ColorJitter {
    pub fn new(param: &ColorJitterParam) -> Result<Self> {
        let ColorJitterParam {
            brightness,
            contrast,
            saturation,
            lower_bound,
            upper_bound,
        } = *param;
        let (brightness, contrast, saturation) = (
            brightness.raw() as f32,
            contrast.raw() as f32,
            saturation.raw() as f32,
        );

        ensure!(
            brightness >= 0.0 && contrast >= 0.0 && saturation >= 0.0,
            "color jitter strengths must be non-negative"
        );
        if let (Some(lower), Some(upper)) = (lower_bound, upper_bound) {
            ensure!(
                lower <= upper,
                "lower bound {} is above upper bound {}",
                lower,
                upper
            );
        }

        Ok(Self {
            brightness,
            contrast,
            saturation,
            lower_bound: lower_bound.map(|bound| bound.raw() as f32),
            upper_bound: upper_bound.map(|bound| bound.raw() as f32),
        })
    }

    pub fn transform<R>(
        &self,
        channelsets: &mut [&mut TransformableChannelset<'_>],
        rng: &mut R,
    ) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        let channelset = single_channelset(channelsets, "ColorJitter")?;
        ensure!(
            channelset.channels() == 3,
            "ColorJitter expects 3 channels, but get {}",
            channelset.channels()
        );

        let mut order = [
            Adjustment::Brightness,
            Adjustment::Contrast,
            Adjustment::Saturation,
        ];
        order.shuffle(rng);

        for adjustment in order {
            let strength = match adjustment {
                Adjustment::Brightness => self.brightness,
                Adjustment::Contrast => self.contrast,
                Adjustment::Saturation => self.saturation,
            };
            let alpha = 1.0 + strength * (2.0 * rng.gen::<f32>() - 1.0);

            let pixels = channelset.height() * channelset.width();
            let (final_mem, work_mem) = channelset.buffers_mut();
            let image = &mut final_mem[..(pixels * 3)];

            match adjustment {
                Adjustment::Brightness => {
                    image.iter_mut().for_each(|value| *value *= alpha);
                }
                Adjustment::Contrast => {
                    let gray = grayscale(image, &mut work_mem[..pixels]);
                    let mean = if pixels == 0 {
                        0.0
                    } else {
                        gray.iter().map(|&value| value as f64).sum::<f64>() / pixels as f64
                    };
                    let offset = (1.0 - alpha) * mean as f32;
                    image.iter_mut().for_each(|value| *value = *value * alpha + offset);
                }
                Adjustment::Saturation => {
                    let gray = grayscale(image, &mut work_mem[..pixels]);
                    izip!(image.chunks_exact_mut(3), gray.iter()).for_each(|(pixel, &gray)| {
                        pixel
                            .iter_mut()
                            .for_each(|value| *value = *value * alpha + (1.0 - alpha) * gray);
                    });
                }
            }
        }

        if self.lower_bound.is_some() || self.upper_bound.is_some() {
            let lower = self.lower_bound.unwrap_or(f32::NEG_INFINITY);
            let upper = self.upper_bound.unwrap_or(f32::INFINITY);
            channelset
                .data_mut()
                .iter_mut()
                .for_each(|value| *value = value.min(upper).max(lower));
        }

        Ok(())
    }
}

/// Writes the luma of interleaved RGB pixels into `gray`.
fn grayscale<'a>(image: &[f32], gray: &'a mut [f32]) -> &'a [f32] {
    izip!(image.chunks_exact(3), gray.iter_mut()).for_each(|(pixel, gray)| {
        *gray = RED_WEIGHT * pixel[0] + GREEN_WEIGHT * pixel[1] + BLUE_WEIGHT * pixel[2];
    });
    gray
}
