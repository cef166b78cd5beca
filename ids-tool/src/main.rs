use anyhow::{ensure, Context, Result};
use clap::Parser;
use ids_dataset::{
    check_decoding,
    events::{DatasetEventsSink, LoadStatistics},
    make_dataset,
    overrides::{apply_runtime_overrides, OverridableParam},
    DatasetLoader, LoadConfig, SaveConfig, VecExampleSink,
};
use log::info;
use prettytable::{cell, row, Table};
use std::{path::PathBuf, sync::Arc, time::Instant};

#[derive(Debug, Clone, Parser)]
/// Create, check and load IDS image datasets.
enum Opts {
    /// Write an IDS file from a list file.
    MakeDataset {
        /// save configuration file
        config_file: PathBuf,
    },
    /// Report images of a list file that cannot be decoded.
    CheckDecoding {
        /// save configuration file
        config_file: PathBuf,
    },
    /// Pull examples through the loading pipeline.
    TestLoad {
        /// load configuration file
        config_file: PathBuf,
        /// number of examples to load
        #[clap(long, default_value = "100")]
        examples: usize,
        /// runtime override in the form 'id=value'
        #[clap(long = "override")]
        overrides: Vec<OverridableParam>,
    },
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    match Opts::parse() {
        Opts::MakeDataset { config_file } => {
            let config = SaveConfig::open(&config_file)?;
            make_dataset(&config)?;
        }
        Opts::CheckDecoding { config_file } => {
            let config = SaveConfig::open(&config_file)?;
            let failures = check_decoding(&config)?;
            failures
                .iter()
                .for_each(|path| println!("{}", path.display()));
            ensure!(
                failures.is_empty(),
                "{} files cannot be decoded",
                failures.len()
            );
        }
        Opts::TestLoad {
            config_file,
            examples,
            overrides,
        } => test_load(config_file, examples, &overrides)?,
    }

    Ok(())
}

fn test_load(config_file: PathBuf, examples: usize, overrides: &[OverridableParam]) -> Result<()> {
    let mut config = LoadConfig::open(&config_file)?;
    apply_runtime_overrides(&mut config, overrides)?;

    let stats = Arc::new(LoadStatistics::default());
    let sink: Arc<dyn DatasetEventsSink> = stats.clone();
    let mut loader = DatasetLoader::new(config, Some(sink))
        .with_context(|| format!("failed to create loader from '{}'", config_file.display()))?;
    info!("effective configuration\n{}", loader.configuration()?);

    let mut output = VecExampleSink::new(loader.blobs_count());
    let since = Instant::now();
    for _ in 0..examples {
        loader.get_example(&mut output)?;
    }
    let elapsed = since.elapsed().as_secs_f64();

    // print blob shapes of the last example
    {
        let mut table = Table::new();
        table.add_row(row!["index", "blob", "channels", "height", "width"]);

        (0..loader.blobs_count()).for_each(|index| {
            let shape = output.shape(index);
            table.add_row(row![
                index,
                loader.blob_name(index).unwrap_or_default(),
                shape.channels,
                shape.height,
                shape.width
            ]);
        });

        table.printstd();
    }

    info!(
        "loaded {} of {} examples in {:.3}s ({:.1} examples/s), read {} bytes in {} chunks",
        examples,
        loader.examples_count(),
        elapsed,
        examples as f64 / elapsed.max(f64::EPSILON),
        stats.bytes_read(),
        stats.chunks_read()
    );

    Ok(())
}
