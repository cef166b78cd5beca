use anyhow::Result;
use approx::assert_abs_diff_eq;
use ids_dataset::{
    check_decoding,
    events::LoadStatistics,
    make_dataset,
    overrides::{apply_runtime_overrides, OverridableParam},
    DatasetLoader, LoadConfig, SaveConfig, VecExampleSink,
};
use image::{Rgb, RgbImage};
use std::{path::Path, sync::Arc};

const NUM_EXAMPLES: usize = 10;
const IMAGE_SIZE: u32 = 64;
const CROP_SIZE: usize = 56;

/// Writes constant color images whose red value encodes the label.
fn write_images(dir: &Path) -> Result<()> {
    let mut list = String::new();

    for index in 0..NUM_EXAMPLES {
        let file_name = format!("image-{}.png", index);
        RgbImage::from_pixel(IMAGE_SIZE, IMAGE_SIZE, Rgb([index as u8 * 20, 100, 200]))
            .save(dir.join(&file_name))?;
        list.push_str(&format!("{} {}\n", file_name, index));
    }

    std::fs::write(dir.join("list.txt"), list)?;
    Ok(())
}

fn save_config(dir: &Path) -> Result<SaveConfig> {
    let config = json5::from_str(&format!(
        r#"{{
            list_file: {:?},
            output_file: {:?},
            root_dir: {:?},
            threads_count: 3,
            examples_per_batch: 4,
            channelsets: [
                {{ name: "image", in_channels: 3, out_compression: "png" }},
                {{ name: "label", in_channels: 1, out_compression: "val" }},
            ],
        }}"#,
        dir.join("list.txt"),
        dir.join("train.ids"),
        dir
    ))?;
    Ok(config)
}

fn load_config(dir: &Path, threads_count: usize, shuffle: bool) -> Result<LoadConfig> {
    let scale = 1.0 / 255.0;
    let config = json5::from_str(&format!(
        r#"{{
            source: ["train.ids"],
            source_path: {:?},
            disk_prefetch_size: 4096,
            shuffle_chunks: {shuffle},
            shuffle_examples: {shuffle},
            threads_count: {},
            cache_size: 4,
            blobs: [
                {{ name: "data", channelsets: ["image"] }},
                {{ name: "label", channelsets: ["label"] }},
            ],
            transforms: [
                {{ type: "Crop", targets: ["image"], crop_param: {{ crop_size: {}, central_crop: true }} }},
                {{ type: "HorizontalFlip", targets: ["image"] }},
                {{
                    type: "ChannelwiseScaleShift",
                    targets: ["image"],
                    channelwise_scale_shift_param: {{ scale: [{scale}, {scale}, {scale}], shift: [0.0, 0.0, 0.0] }},
                }},
            ],
        }}"#,
        dir,
        threads_count,
        CROP_SIZE,
        shuffle = shuffle,
        scale = scale,
    ))?;
    Ok(config)
}

fn labels(loader: &mut DatasetLoader, count: usize) -> Result<Vec<usize>> {
    let mut sink = VecExampleSink::new(loader.blobs_count());
    (0..count)
        .map(|_| -> Result<_> {
            loader.get_example(&mut sink)?;
            Ok(sink.data(1)[0] as usize)
        })
        .collect()
}

#[test]
fn png_dataset_scenario() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_images(dir.path())?;

    let save_config = save_config(dir.path())?;
    assert!(check_decoding(&save_config)?.is_empty());
    let stats = make_dataset(&save_config)?;
    assert_eq!((stats.examples, stats.errors), (NUM_EXAMPLES, 0));

    let events = Arc::new(LoadStatistics::default());
    let mut loader = DatasetLoader::new(load_config(dir.path(), 2, true)?, Some(events.clone()))?;
    assert_eq!(loader.blobs_count(), 2);
    assert_eq!(loader.blob_name(0), Some("data"));
    assert_eq!(loader.blob_name(1), Some("label"));
    assert_eq!(loader.blob_name(2), None);
    assert_eq!(loader.examples_count(), NUM_EXAMPLES);
    assert!(loader.configuration()?.contains("train.ids"));
    assert_eq!(events.image_processing_threads(), 2);

    let mut sink = VecExampleSink::new(loader.blobs_count());
    for _ in 0..NUM_EXAMPLES {
        loader.get_example(&mut sink)?;

        let shape = sink.shape(0);
        assert_eq!(
            (shape.channels, shape.height, shape.width),
            (3, CROP_SIZE, CROP_SIZE)
        );
        let label_shape = sink.shape(1);
        assert_eq!(
            (label_shape.channels, label_shape.height, label_shape.width),
            (1, 1, 1)
        );

        let label = sink.data(1)[0];
        assert!((0.0..NUM_EXAMPLES as f32).contains(&label));

        // planar output, one constant plane per channel
        let plane_len = CROP_SIZE * CROP_SIZE;
        let data = sink.data(0);
        let expect = [label * 20.0 / 255.0, 100.0 / 255.0, 200.0 / 255.0];
        for (channel, &value) in expect.iter().enumerate() {
            data[(channel * plane_len)..((channel + 1) * plane_len)]
                .iter()
                .for_each(|&sample| assert_abs_diff_eq!(sample, value, epsilon = 1e-5));
        }
    }

    drop(loader);
    assert!(events.examples_processed() >= NUM_EXAMPLES);
    Ok(())
}

#[test]
fn ordered_loading_across_epochs() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_images(dir.path())?;
    make_dataset(&save_config(dir.path())?)?;

    // one thread without shuffling keeps the list order
    let mut loader = DatasetLoader::new(load_config(dir.path(), 1, false)?, None)?;
    let expect: Vec<_> = (0..NUM_EXAMPLES).chain(0..NUM_EXAMPLES).collect();
    assert_eq!(labels(&mut loader, 2 * NUM_EXAMPLES)?, expect);

    // shuffled epochs are permutations of the dataset
    let mut loader = DatasetLoader::new(load_config(dir.path(), 1, true)?, None)?;
    let mut epoch = labels(&mut loader, NUM_EXAMPLES)?;
    epoch.sort_unstable();
    assert_eq!(epoch, (0..NUM_EXAMPLES).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn sharded_loading_with_overrides() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_images(dir.path())?;
    make_dataset(&save_config(dir.path())?)?;

    let mut config = load_config(dir.path(), 1, false)?;
    config.source_path = None;
    let overrides: Vec<OverridableParam> = vec![
        format!("source_path={}", dir.path().display()).parse()?,
        "loader_index=1".parse()?,
        "2=2".parse()?,
    ];
    apply_runtime_overrides(&mut config, &overrides)?;

    let mut loader = DatasetLoader::new(config, None)?;
    assert_eq!(loader.examples_count(), NUM_EXAMPLES / 2);
    assert_eq!(labels(&mut loader, NUM_EXAMPLES / 2)?, (5..10).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn invalid_blobs_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_images(dir.path())?;
    make_dataset(&save_config(dir.path())?)?;

    let mut config = load_config(dir.path(), 1, false)?;
    config.blobs[1].channelsets = vec!["image".into()];
    assert!(DatasetLoader::new(config, None).is_err());

    let mut config = load_config(dir.path(), 1, false)?;
    config.blobs[1].channelsets = vec!["depth".into()];
    assert!(DatasetLoader::new(config, None).is_err());

    let mut config = load_config(dir.path(), 1, false)?;
    config.blobs[1].name = "data".into();
    assert!(DatasetLoader::new(config, None).is_err());
    Ok(())
}
