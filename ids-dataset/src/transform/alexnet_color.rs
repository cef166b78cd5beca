use super::{single_channelset, TransformableChannelset};
use crate::{common::*, config::AlexNetColorParam};
use rand_distr::Normal;

/// Principal components of the RGB values of the ILSVRC 2012 training set.
/// Column `j` is the eigenvector of `EIGENVALUES[j]`.
const EIGENVECTORS: [[f32; 3]; 3] = [
    [-0.5675, 0.7192, 0.4009],
    [-0.5808, -0.0045, -0.8140],
    [-0.5836, -0.6948, 0.4203],
];
const EIGENVALUES: [f32; 3] = [0.2175, 0.0188, 0.0045];

/// Color augmentation of Krizhevsky et al. Adds a random combination of the
/// principal color components to every pixel.
#[derive(Debug, Clone)]
pub struct AlexNetColor {
    displacement: Normal<f32>,
}

impl AlexNetColor {
    pub fn new(param: &AlexNetColorParam) -> Result<Self> {
        let stdev = param.stdev.raw() as f32;
        let displacement =
            Normal::new(0.0, stdev).map_err(|err| format_err!("invalid stdev {}: {}", stdev, err))?;
        Ok(Self { displacement })
    }

    pub fn transform<R>(
        &self,
        channelsets: &mut [&mut TransformableChannelset<'_>],
        rng: &mut R,
    ) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        let channelset = single_channelset(channelsets, "AlexNetColor")?;
        ensure!(
            channelset.channels() == 3,
            "AlexNetColor expects 3 channels, but get {}",
            channelset.channels()
        );

        let coefs: [f32; 3] = [
            rng.sample(self.displacement),
            rng.sample(self.displacement),
            rng.sample(self.displacement),
        ];
        let offset = color_offset(coefs);

        channelset.data_mut().chunks_exact_mut(3).for_each(|pixel| {
            izip!(pixel, &offset).for_each(|(value, &offset)| *value += offset);
        });
        Ok(())
    }
}

/// Per channel offset `255 * V diag(lambda) coefs`.
fn color_offset(coefs: [f32; 3]) -> [f32; 3] {
    let mut offset = [0f32; 3];
    izip!(&mut offset, &EIGENVECTORS).for_each(|(offset, row)| {
        *offset = izip!(row, &EIGENVALUES, &coefs)
            .map(|(vector, value, coef)| vector * value * coef * 255.0)
            .sum();
    });
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{format::ChannelsetId, geometry::PlaneShape};
    use approx::assert_abs_diff_eq;

    #[test]
    fn offset_is_uniform_over_pixels() -> Result<()> {
        let transform = AlexNetColor::new(&AlexNetColorParam { stdev: r64(0.1) })?;
        let shape = PlaneShape::new(3, 2, 2);
        let (mut final_mem, mut work_mem) = (vec![100.0; 12], vec![0.0; 12]);
        let mut channelset =
            TransformableChannelset::new(ChannelsetId(0), "image", &mut final_mem, &mut work_mem, shape)?;

        transform.transform(&mut [&mut channelset], &mut StdRng::seed_from_u64(4))?;
        let data = channelset.data();
        (3..12).for_each(|index| assert_abs_diff_eq!(data[index], data[index % 3], epsilon = 1e-5));
        Ok(())
    }

    #[test]
    fn first_component_offset() {
        let offset = color_offset([1.0, 0.0, 0.0]);
        assert_abs_diff_eq!(offset[0], -0.5675 * 0.2175 * 255.0, epsilon = 1e-4);
        assert_abs_diff_eq!(offset[1], -0.5808 * 0.2175 * 255.0, epsilon = 1e-4);
        assert_abs_diff_eq!(offset[2], -0.5836 * 0.2175 * 255.0, epsilon = 1e-4);
    }

    #[test]
    fn negative_stdev_is_rejected() {
        assert!(AlexNetColor::new(&AlexNetColorParam { stdev: r64(-1.0) }).is_err());
    }
}
