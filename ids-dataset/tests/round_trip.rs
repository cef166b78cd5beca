use anyhow::Result;
use ids_dataset::{
    decompress::decompress,
    deserializer::{DeserializedChannelsets, DeserializerInit},
    format::{ChannelSet, Compression},
    tensor_file::TensorFile,
    writer::{EncodedChannelset, IdsFileWriter},
};
use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage};
use std::collections::HashSet;

const NUM_EXAMPLES: usize = 12;

struct Expected {
    encoded: Vec<EncodedChannelset>,
    /// Decoded values of the lossless channelsets, indexed like `encoded`.
    values: Vec<Option<Vec<f32>>>,
}

fn channelsets() -> Result<Vec<ChannelSet>> {
    Ok(vec![
        ChannelSet::new("label", 1, Compression::Value)?,
        ChannelSet::new("feature", 2, Compression::Tensor)?,
        ChannelSet::new("raw", 3, Compression::Raw)?,
        ChannelSet::new("photo", 3, Compression::Jpg)?,
        ChannelSet::new("mask", 1, Compression::Png)?,
    ])
}

fn make_example(index: usize) -> Result<Expected> {
    let label = index as i32 * 7 - 3;

    let feature_values: Vec<f32> = (0..12).map(|k| index as f32 + k as f32 * 0.25).collect();
    let feature_text = format!(
        "1 3 2 2\n{}\n",
        feature_values.iter().map(|value| value.to_string()).collect::<Vec<_>>().join(" ")
    );
    let feature = TensorFile::parse_text(&feature_text)?;

    let (height, width) = (2 + index % 3, 3 + index % 2);
    let raw: Vec<u8> = (0..(3 * height * width)).map(|k| ((k + index) % 251) as u8).collect();

    let photo = DynamicImage::ImageRgb8(RgbImage::from_fn(16, 8, |x, y| {
        Rgb([(x * 8) as u8, (y * 16) as u8, index as u8])
    }));
    let mut photo_bytes = vec![];
    photo.write_to(&mut photo_bytes, ImageOutputFormat::Jpeg(90))?;

    let mask = DynamicImage::ImageLuma8(GrayImage::from_fn(5, 7, |x, y| Luma([(x + y) as u8])));
    let mut mask_bytes = vec![];
    mask.write_to(&mut mask_bytes, ImageOutputFormat::Png)?;

    Ok(Expected {
        encoded: vec![
            EncodedChannelset::value(label),
            EncodedChannelset {
                width: 2,
                height: 3,
                bytes: feature.encode(),
            },
            EncodedChannelset {
                width,
                height,
                bytes: raw.clone(),
            },
            EncodedChannelset {
                width: 16,
                height: 8,
                bytes: photo_bytes,
            },
            EncodedChannelset {
                width: 5,
                height: 7,
                bytes: mask_bytes,
            },
        ],
        values: vec![
            Some(vec![label as f32]),
            Some(feature_values),
            Some(raw.iter().map(|&value| value as f32).collect()),
            None,
            None,
        ],
    })
}

fn decode_all(example: &DeserializedChannelsets) -> Result<Vec<Vec<f32>>> {
    example
        .header()
        .channelset_ids()
        .map(|id| -> Result<_> {
            let channelset = example.channelset(id);
            let instance = example.instance(id);
            let len = channelset.channels * instance.height * instance.width;
            let mut out = vec![0.0; len];
            let mut work = vec![0.0; len];
            decompress(
                example.channelset_bytes(id),
                channelset.channels,
                instance.height,
                instance.width,
                channelset.compression,
                &mut out,
                &mut work,
            )?;
            Ok(out)
        })
        .collect()
}

#[test]
fn written_examples_read_back() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("mixed.ids");

    let expected: Vec<_> = (0..NUM_EXAMPLES).map(make_example).collect::<Result<_>>()?;
    let mut writer = IdsFileWriter::create(&path, channelsets()?)?;
    expected
        .iter()
        .try_for_each(|example| writer.write_example(&example.encoded))?;
    writer.finish()?;

    let mut deserializer = DeserializerInit {
        paths: vec![path],
        desired_prefetch_size: 1024,
        loader_index: 0,
        loaders_count: 1,
        shuffle_chunks: false,
        events_sink: None,
    }
    .build()?;
    assert_eq!(deserializer.examples_count(), NUM_EXAMPLES);
    assert!(deserializer.chunks().len() > 1);

    // examples are identified by their label
    let mut seen = HashSet::new();
    while seen.len() < NUM_EXAMPLES {
        for example in deserializer.get_examples()? {
            let decoded = decode_all(&example)?;
            let index = ((decoded[0][0] as i32 + 3) / 7) as usize;
            let expect = &expected[index];

            for (slot, (id, encoded)) in example.header().channelset_ids().zip(&expect.encoded).enumerate() {
                let channelset = example.channelset(id);
                let instance = example.instance(id);
                assert_eq!(channelset, &channelsets()?[slot]);
                assert_eq!((instance.width, instance.height), (encoded.width, encoded.height));
                assert_eq!(instance.size, encoded.bytes.len());
                assert_eq!(
                    decoded[slot].len(),
                    channelset.channels * encoded.width * encoded.height
                );

                if let Some(values) = &expect.values[slot] {
                    assert_eq!(example.channelset_bytes(id), encoded.bytes.as_slice());
                    assert_eq!(&decoded[slot], values);
                }
            }

            assert!(seen.insert(index));
        }
    }

    Ok(())
}

#[test]
fn lossless_png_content() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("mask.ids");

    let example = make_example(0)?;
    let mut writer = IdsFileWriter::create(&path, channelsets()?)?;
    writer.write_example(&example.encoded)?;
    writer.finish()?;

    let mut deserializer = DeserializerInit {
        paths: vec![path],
        desired_prefetch_size: 1 << 20,
        loader_index: 0,
        loaders_count: 1,
        shuffle_chunks: false,
        events_sink: None,
    }
    .build()?;
    let examples = deserializer.get_examples()?;
    assert_eq!(examples.len(), 1);

    let decoded = decode_all(&examples[0])?;
    let expect: Vec<f32> = (0..7)
        .flat_map(|y| (0..5).map(move |x| (x + y) as f32))
        .collect();
    assert_eq!(decoded[4], expect);
    Ok(())
}
