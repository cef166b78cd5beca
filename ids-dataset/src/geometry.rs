//! Geometric operations on interleaved (height, width, channels) float planes.
//!
//! Planes with one to four channels are viewed as `Luma`, `LumaA`, `Rgb` or
//! `Rgba` float images and handed to [imageops]. Wider planes are processed
//! one channel at a time.

use crate::common::*;
use image::{
    imageops::{self, FilterType},
    GenericImage as _, ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba,
};

/// The shape of an interleaved plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl PlaneShape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    pub fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn with_size(&self, height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            ..*self
        }
    }
}

/// Copies the `(height, width)` window at `(top, left)` into `dst`.
pub fn crop(
    src: &[f32],
    shape: PlaneShape,
    top: usize,
    left: usize,
    height: usize,
    width: usize,
    dst: &mut [f32],
) -> Result<()> {
    ensure!(
        top + height <= shape.height && left + width <= shape.width,
        "crop window {}x{} at ({}, {}) exceeds {}x{} image",
        width,
        height,
        left,
        top,
        shape.width,
        shape.height
    );

    let op = CropOp {
        left: left as u32,
        top: top as u32,
        width: width as u32,
        height: height as u32,
    };
    apply_op(&op, src, shape, dst)?;
    Ok(())
}

/// Mirrors the plane along the vertical axis.
pub fn flip_horizontal(src: &[f32], shape: PlaneShape, dst: &mut [f32]) -> Result<()> {
    apply_op(&FlipOp, src, shape, dst)?;
    Ok(())
}

/// Resamples the plane to `(new_height, new_width)` with `filter`.
///
/// The resampler clamps at zero, so `src` is moved into the positive range
/// before resampling and is left modified.
pub fn resize(
    src: &mut [f32],
    shape: PlaneShape,
    new_height: usize,
    new_width: usize,
    filter: FilterType,
    dst: &mut [f32],
) -> Result<()> {
    let output_shape = shape.with_size(new_height, new_width);
    if output_shape.is_empty() {
        return Ok(());
    }
    ensure!(
        shape.height > 0 && shape.width > 0,
        "cannot resize an empty {}x{} plane to {}x{}",
        shape.width,
        shape.height,
        new_width,
        new_height
    );
    ensure!(
        src.len() >= shape.len(),
        "{:?} does not fit in {} floats",
        shape,
        src.len()
    );

    let plane = &mut src[..shape.len()];
    let offset = positive_offset(plane, filter);
    if offset != 0.0 {
        plane.iter_mut().for_each(|value| *value += offset);
    }

    let op = ResizeOp {
        width: new_width as u32,
        height: new_height as u32,
        filter,
    };
    apply_op(&op, plane, shape, dst)?;

    if offset != 0.0 {
        dst[..output_shape.len()]
            .iter_mut()
            .for_each(|value| *value -= offset);
    }
    Ok(())
}

/// The shift that makes every sample of `plane` resample without clamping.
///
/// Cubic kernels overshoot by less than the value range, which is kept as
/// margin above zero.
fn positive_offset(plane: &[f32], filter: FilterType) -> f32 {
    if plane.is_empty() {
        return 0.0;
    }
    let (min, max) = plane
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &value| {
            (min.min(value), max.max(value))
        });

    if filter == FilterType::Nearest {
        if min >= 0.0 {
            0.0
        } else {
            -min
        }
    } else {
        (max - min).max(1.0) - min
    }
}

/// An image operation producing a new image of the same pixel type.
trait PlaneOp {
    fn apply<P>(&self, image: &ImageBuffer<P, &[f32]>) -> Result<ImageBuffer<P, Vec<f32>>>
    where
        P: Pixel<Subpixel = f32> + 'static;
}

struct CropOp {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

impl PlaneOp for CropOp {
    fn apply<P>(&self, image: &ImageBuffer<P, &[f32]>) -> Result<ImageBuffer<P, Vec<f32>>>
    where
        P: Pixel<Subpixel = f32> + 'static,
    {
        let view = imageops::crop_imm(image, self.left, self.top, self.width, self.height);
        let mut output = ImageBuffer::new(self.width, self.height);
        output.copy_from(&view, 0, 0)?;
        Ok(output)
    }
}

struct FlipOp;

impl PlaneOp for FlipOp {
    fn apply<P>(&self, image: &ImageBuffer<P, &[f32]>) -> Result<ImageBuffer<P, Vec<f32>>>
    where
        P: Pixel<Subpixel = f32> + 'static,
    {
        Ok(imageops::flip_horizontal(image))
    }
}

struct ResizeOp {
    width: u32,
    height: u32,
    filter: FilterType,
}

impl PlaneOp for ResizeOp {
    fn apply<P>(&self, image: &ImageBuffer<P, &[f32]>) -> Result<ImageBuffer<P, Vec<f32>>>
    where
        P: Pixel<Subpixel = f32> + 'static,
    {
        Ok(imageops::resize(image, self.width, self.height, self.filter))
    }
}

/// Runs `op` on the plane and writes the interleaved result into `dst`.
fn apply_op<O>(op: &O, src: &[f32], shape: PlaneShape, dst: &mut [f32]) -> Result<PlaneShape>
where
    O: PlaneOp,
{
    let PlaneShape {
        channels,
        height,
        width,
    } = shape;
    ensure!(channels > 0, "a plane must have at least one channel");
    ensure!(
        src.len() >= shape.len(),
        "{:?} does not fit in {} floats",
        shape,
        src.len()
    );

    let (new_height, new_width) = match channels {
        1 => copy_output(apply_image::<Luma<f32>, _>(op, src, height, width)?, dst)?,
        2 => copy_output(apply_image::<LumaA<f32>, _>(op, src, height, width)?, dst)?,
        3 => copy_output(apply_image::<Rgb<f32>, _>(op, src, height, width)?, dst)?,
        4 => copy_output(apply_image::<Rgba<f32>, _>(op, src, height, width)?, dst)?,
        _ => {
            // one gray image per channel
            let mut plane = vec![0.0; height * width];
            let mut size = (height, width);

            for channel in 0..channels {
                izip!(&mut plane, src.iter().skip(channel).step_by(channels))
                    .for_each(|(lhs, &rhs)| *lhs = rhs);
                let output = apply_image::<Luma<f32>, _>(op, &plane, height, width)?;
                let output_len = output.as_raw().len();
                ensure!(
                    dst.len() >= output_len * channels,
                    "output of {} floats does not fit in {}",
                    output_len * channels,
                    dst.len()
                );

                izip!(dst.iter_mut().skip(channel).step_by(channels), output.as_raw())
                    .for_each(|(lhs, &rhs)| *lhs = rhs);
                let (out_width, out_height) = output.dimensions();
                size = (out_height as usize, out_width as usize);
            }

            size
        }
    };

    Ok(shape.with_size(new_height, new_width))
}

fn apply_image<P, O>(
    op: &O,
    src: &[f32],
    height: usize,
    width: usize,
) -> Result<ImageBuffer<P, Vec<f32>>>
where
    P: Pixel<Subpixel = f32> + 'static,
    O: PlaneOp,
{
    let len = height * width * P::CHANNEL_COUNT as usize;
    let image = ImageBuffer::<P, &[f32]>::from_raw(width as u32, height as u32, &src[..len])
        .ok_or_else(|| format_err!("{}x{} image does not fit in {} floats", width, height, len))?;
    op.apply(&image)
}

/// Copies the samples of `output` into `dst` and returns its `(height, width)`.
fn copy_output<P>(output: ImageBuffer<P, Vec<f32>>, dst: &mut [f32]) -> Result<(usize, usize)>
where
    P: Pixel<Subpixel = f32> + 'static,
{
    let (width, height) = output.dimensions();
    let data = output.as_raw();
    ensure!(
        dst.len() >= data.len(),
        "output of {} floats does not fit in {}",
        data.len(),
        dst.len()
    );
    dst[..data.len()].copy_from_slice(data);
    Ok((height as usize, width as usize))
}
