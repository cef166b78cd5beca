use anyhow::Result;
use ids_dataset::{
    events::LoadStatistics,
    format::{ChannelSet, Compression},
    writer::{EncodedChannelset, IdsFileWriter},
    DatasetLoader, LoadConfig, VecExampleSink,
};
use std::{path::Path, sync::Arc};

const NUM_EXAMPLES: usize = 5;
/// The example whose "b" plane is larger than its "a" plane.
const BAD_EXAMPLE: usize = 2;

fn plane(size: usize, value: u8) -> EncodedChannelset {
    EncodedChannelset {
        width: size,
        height: size,
        bytes: vec![value; size * size],
    }
}

fn write_dataset(path: &Path) -> Result<()> {
    let mut writer = IdsFileWriter::create(
        path,
        vec![
            ChannelSet::new("a", 1, Compression::Raw)?,
            ChannelSet::new("b", 1, Compression::Raw)?,
        ],
    )?;

    for index in 0..NUM_EXAMPLES {
        let b_size = if index == BAD_EXAMPLE { 5 } else { 4 };
        writer.write_example(&[plane(4, index as u8), plane(b_size, index as u8)])?;
    }
    writer.finish()?;
    Ok(())
}

fn load_config(dir: &Path) -> Result<LoadConfig> {
    let config = json5::from_str(&format!(
        r#"{{
            source: ["data.ids"],
            source_path: {:?},
            shuffle_chunks: false,
            shuffle_examples: false,
            threads_count: 1,
            cache_size: 1,
            blobs: [
                {{ name: "a", channelsets: ["a"] }},
                {{ name: "b", channelsets: ["b"] }},
            ],
            transforms: [
                {{ type: "Crop", targets: ["a", "b"], crop_param: {{ crop_size: 3, central_crop: true }} }},
            ],
        }}"#,
        dir
    ))?;
    Ok(config)
}

#[test]
fn loader_stops_after_failed_example() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_dataset(&dir.path().join("data.ids"))?;

    let stats = Arc::new(LoadStatistics::default());
    let mut loader = DatasetLoader::new(load_config(dir.path())?, Some(stats.clone()))?;
    let mut sink = VecExampleSink::new(loader.blobs_count());

    for index in 0..BAD_EXAMPLE {
        loader.get_example(&mut sink)?;
        assert_eq!(sink.data(0)[0], index as f32);
    }

    // the mismatched sizes fail the shared crop
    let err = loader.get_example(&mut sink).unwrap_err();
    assert!(format!("{:#}", err).contains("'b'"), "{:#}", err);

    // refused instead of waiting on a job that was never pushed
    let err = loader.get_example(&mut sink).unwrap_err();
    assert!(format!("{:#}", err).contains("earlier error"), "{:#}", err);

    drop(loader);
    assert_eq!(stats.examples_failed(), 1);
    assert_eq!(stats.examples_started(), stats.examples_processed());
    Ok(())
}
