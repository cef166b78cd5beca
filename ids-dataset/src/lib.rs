//! Serialization, prefetching and augmentation pipeline for IDS image datasets.
//!
//! An IDS file stores every example as a fixed set of named channelsets
//! (images, integer labels or tensors). The [writer](crate::writer) builds
//! such files from a list file, and the [loader](crate::loader) streams them
//! back through background disk and image processing workers.

mod common;
pub mod check;
pub mod config;
pub mod decompress;
pub mod deserializer;
pub mod events;
pub mod format;
pub mod geometry;
pub mod loader;
pub mod overrides;
pub mod pool;
pub mod profiling;
pub mod tensor_file;
pub mod transform;
pub mod writer;

pub use check::check_decoding;
pub use config::{LoadConfig, SaveConfig};
pub use loader::{DatasetLoader, ExampleSink, VecExampleSink};
pub use writer::make_dataset;
