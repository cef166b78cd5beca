//! Example sharding and disk chunk partitioning.

use super::DeserializedHeader;
use crate::{common::*, format::example_size};

/// A run of consecutive examples inside one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleRange {
    pub file_index: usize,
    /// Global example indices.
    pub examples: Range<usize>,
    /// Byte offset of the first example within the file.
    pub start_offset: u64,
}

/// A contiguous byte range of whole examples, the unit of disk reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub file_index: usize,
    pub start_offset: u64,
    pub size: usize,
    /// Global example indices.
    pub examples: Range<usize>,
}

/// Returns the exclusive example range of one shard.
///
/// The first `total % shards_count` shards receive one extra example.
pub fn shard_examples(
    total: usize,
    shards_count: usize,
    shard_index: usize,
) -> Result<Range<usize>> {
    ensure!(shards_count > 0, "the number of loaders must be positive");
    ensure!(
        shard_index < shards_count,
        "loader index {} is out of range for {} loaders",
        shard_index,
        shards_count
    );

    let base = total / shards_count;
    let leftover = total % shards_count;
    let start = shard_index * base + cmp::min(shard_index, leftover);
    let len = base + if shard_index < leftover { 1 } else { 0 };
    Ok(start..(start + len))
}

/// Splits a global example range at file boundaries.
pub fn file_ranges(header: &DeserializedHeader, examples: Range<usize>) -> Vec<ExampleRange> {
    (0..header.files_count())
        .filter_map(|file_index| {
            let file_examples = header.file_examples(file_index);
            let start = cmp::max(file_examples.start, examples.start);
            let end = cmp::min(file_examples.end, examples.end);
            if start >= end {
                return None;
            }

            let skipped: usize = (file_examples.start..start)
                .map(|example| example_size(header.example_instances(example)))
                .sum();

            Some(ExampleRange {
                file_index,
                examples: start..end,
                start_offset: header.examples_start_offset() + skipped as u64,
            })
        })
        .collect()
}

/// Packs the examples of each range into chunks near `desired_size` bytes.
///
/// Each range is cut into `ceil(total / desired_size)` pieces of about the
/// average size. An example that makes a chunk exceed the average still
/// belongs to it, so chunks are rarely smaller than the average.
pub fn compute_chunks(
    header: &DeserializedHeader,
    ranges: &[ExampleRange],
    desired_size: usize,
) -> Result<Vec<Chunk>> {
    ensure!(desired_size > 0, "the disk prefetch size must be positive");

    let mut chunks = vec![];

    for range in ranges {
        let sizes: Vec<usize> = range
            .examples
            .clone()
            .map(|example| example_size(header.example_instances(example)))
            .collect();
        let total_size: usize = sizes.iter().sum();
        if total_size == 0 {
            continue;
        }

        let chunks_count = (total_size + desired_size - 1) / desired_size;
        let average_size = total_size / chunks_count;

        let mut chunk_start = range.start_offset;
        let mut chunk_size = 0;
        let mut first_example = range.examples.start;

        for (example, size) in izip!(range.examples.clone(), sizes) {
            chunk_size += size;

            if chunk_size > average_size {
                chunks.push(Chunk {
                    file_index: range.file_index,
                    start_offset: chunk_start,
                    size: chunk_size,
                    examples: first_example..(example + 1),
                });
                chunk_start += chunk_size as u64;
                chunk_size = 0;
                first_example = example + 1;
            }
        }

        if chunk_size != 0 {
            chunks.push(Chunk {
                file_index: range.file_index,
                start_offset: chunk_start,
                size: chunk_size,
                examples: first_example..range.examples.end,
            });
        }
    }

    Ok(chunks)
}
