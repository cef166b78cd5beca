use super::{single_channelset, TransformableChannelset};
use crate::{
    common::*,
    config::MeanParam,
    geometry::{self, PlaneShape},
};
use image::imageops::FilterType;

/// Subtracts a per pixel mean image.
///
/// The mean file holds `i32` channels, height and width followed by the
/// planar float values, all little-endian. The mean is resampled once to
/// `resize_to` by `resize_to` with nearest neighbour sampling.
#[derive(Debug, Clone)]
pub struct Mean {
    size: usize,
    channels: usize,
    /// Interleaved `(size, size, channels)` mean.
    mean: Vec<f32>,
}

impl Mean {
    pub fn new(param: &MeanParam) -> Result<Self> {
        let MeanParam {
            ref mean_file_path,
            resize_to,
        } = *param;
        ensure!(resize_to > 0, "resize_to must be positive");

        let (channels, height, width, planar) = Self::load_file(mean_file_path)
            .with_context(|| format!("failed to load mean file '{}'", mean_file_path.display()))?;

        // planar to interleaved, then resampled
        let plane_len = height * width;
        let mut interleaved: Vec<f32> = (0..plane_len)
            .flat_map(|pixel| {
                let planar = &planar;
                (0..channels).map(move |channel| planar[channel * plane_len + pixel])
            })
            .collect();
        let mut mean = vec![0.0; channels * resize_to * resize_to];
        geometry::resize(
            &mut interleaved,
            PlaneShape::new(channels, height, width),
            resize_to,
            resize_to,
            FilterType::Nearest,
            &mut mean,
        )?;

        Ok(Self {
            size: resize_to,
            channels,
            mean,
        })
    }

    fn load_file(path: &Path) -> Result<(usize, usize, usize, Vec<f32>)> {
        let mut reader = BufReader::new(File::open(path)?);
        let channels = reader.read_i32::<LittleEndian>()?;
        let height = reader.read_i32::<LittleEndian>()?;
        let width = reader.read_i32::<LittleEndian>()?;
        ensure!(
            channels > 0 && height > 0 && width > 0,
            "invalid mean shape {}x{}x{}",
            channels,
            height,
            width
        );

        let (channels, height, width) = (channels as usize, height as usize, width as usize);
        let mut values = vec![0f32; channels * height * width];
        reader.read_f32_into::<LittleEndian>(&mut values)?;
        Ok((channels, height, width, values))
    }

    pub fn transformed_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        ensure!(
            height == self.size && width == self.size,
            "Mean expects {}x{} input, but get {}x{}",
            self.size,
            self.size,
            width,
            height
        );
        Ok((height, width))
    }

    pub fn transform(&self, channelsets: &mut [&mut TransformableChannelset<'_>]) -> Result<()> {
        let channelset = single_channelset(channelsets, "Mean")?;
        self.transformed_size(channelset.height(), channelset.width())?;
        ensure!(
            channelset.channels() == self.channels,
            "Mean expects {} channels, but get {}",
            self.channels,
            channelset.channels()
        );

        izip!(channelset.data_mut(), &self.mean).for_each(|(value, &mean)| *value -= mean);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ChannelsetId;

    fn write_mean_file(path: &Path, channels: usize, size: usize, planar: &[f32]) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_i32::<LittleEndian>(channels as i32)?;
        writer.write_i32::<LittleEndian>(size as i32)?;
        writer.write_i32::<LittleEndian>(size as i32)?;
        planar
            .iter()
            .try_for_each(|&value| writer.write_f32::<LittleEndian>(value))?;
        writer.flush()?;
        Ok(())
    }

    #[test]
    fn subtracts_resampled_mean() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mean.bin");
        // 2 channels of 2x2, channel 1 is channel 0 plus 10
        write_mean_file(&path, 2, 2, &[1.0, 2.0, 3.0, 4.0, 11.0, 12.0, 13.0, 14.0])?;

        let transform = Mean::new(&MeanParam {
            mean_file_path: path,
            resize_to: 4,
        })?;
        assert!(transform.transformed_size(3, 4).is_err());

        let shape = PlaneShape::new(2, 4, 4);
        let (mut final_mem, mut work_mem) = (vec![20.0; 32], vec![0.0; 32]);
        let mut channelset =
            TransformableChannelset::new(ChannelsetId(0), "image", &mut final_mem, &mut work_mem, shape)?;
        transform.transform(&mut [&mut channelset])?;

        let data = channelset.data();
        // pixel (0, 0) and (3, 3) sample mean pixels (0, 0) and (1, 1)
        assert_eq!(&data[0..2], &[19.0, 9.0]);
        assert_eq!(&data[30..32], &[16.0, 6.0]);
        Ok(())
    }
}
