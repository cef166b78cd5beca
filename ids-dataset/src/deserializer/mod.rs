//! Reading IDS files in background-loaded disk chunks.

pub mod chunk;
mod header;
mod prefetcher;

pub use chunk::{Chunk, ExampleRange};
pub use header::*;
pub use prefetcher::*;
