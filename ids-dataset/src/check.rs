//! Verification that every image of a list file can be decoded.

use crate::{
    common::*,
    config::SaveConfig,
    writer::{decode_image, read_list_file},
};
use rayon::prelude::*;

/// Decodes every image referenced by the list file of `config` and returns
/// the files that failed.
pub fn check_decoding(config: &SaveConfig) -> Result<Vec<PathBuf>> {
    let examples = read_list_file(config)?;
    let images: Vec<(PathBuf, usize)> = examples
        .iter()
        .flat_map(|tokens| izip!(&config.channelsets, tokens))
        .filter(|(channelset, _)| channelset.out_compression.is_image())
        .map(|(channelset, token)| (config.resolve_path(token), channelset.in_channels))
        .collect();

    let thread_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cmp::max(config.threads_count, 1))
        .build()?;
    let failures: Vec<PathBuf> = thread_pool.install(|| {
        images
            .par_iter()
            .filter_map(|(path, channels)| match decode_image(path, *channels) {
                Ok(_) => None,
                Err(err) => {
                    warn!("{:#}", err);
                    Some(path.clone())
                }
            })
            .collect()
    });

    info!(
        "checked {} images, {} cannot be decoded",
        images.len(),
        failures.len()
    );
    Ok(failures)
}
