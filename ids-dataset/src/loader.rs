//! The dataset loader that turns IDS files into training blobs.

use crate::{
    common::*,
    config::LoadConfig,
    decompress::decompress,
    deserializer::{DeserializedChannelsets, Deserializer, DeserializerInit},
    events::DatasetEventsSink,
    format::ChannelsetId,
    geometry::PlaneShape,
    pool::{JobProcessor, ObjectPool, ObjectPoolInit, Pooled, Reusable, WorkerPool, WorkerPoolInit},
    profiling::{ProcessingStage, StageTimer},
    transform::{TransformableChannelset, Transformer},
};

/// Receives the blobs of one example.
///
/// The loader calls [reshape_blob](ExampleSink::reshape_blob) and then fills
/// [blob_memory](ExampleSink::blob_memory) of the same blob with the
/// `(channels, height, width)` planar values.
pub trait ExampleSink {
    fn reshape_blob(&mut self, index: usize, channels: usize, height: usize, width: usize) -> Result<()>;

    fn blob_memory(&mut self, index: usize) -> &mut [f32];
}

/// An [ExampleSink] keeping every blob in a vector.
#[derive(Debug, Clone, Default)]
pub struct VecExampleSink {
    blobs: Vec<(PlaneShape, Vec<f32>)>,
}

impl VecExampleSink {
    pub fn new(blobs_count: usize) -> Self {
        Self {
            blobs: vec![(PlaneShape::new(0, 0, 0), vec![]); blobs_count],
        }
    }

    pub fn shape(&self, index: usize) -> PlaneShape {
        self.blobs[index].0
    }

    pub fn data(&self, index: usize) -> &[f32] {
        &self.blobs[index].1
    }
}

impl ExampleSink for VecExampleSink {
    fn reshape_blob(&mut self, index: usize, channels: usize, height: usize, width: usize) -> Result<()> {
        let blob = self
            .blobs
            .get_mut(index)
            .ok_or_else(|| format_err!("blob index {} is out of range", index))?;
        let shape = PlaneShape::new(channels, height, width);
        blob.0 = shape;
        blob.1.resize(shape.len(), 0.0);
        Ok(())
    }

    fn blob_memory(&mut self, index: usize) -> &mut [f32] {
        &mut self.blobs[index].1
    }
}

/// A decoded channelset slot inside the payload of a [ProcessedExample].
#[derive(Debug, Clone)]
struct SlotLayout {
    id: ChannelsetId,
    name: String,
    channels: usize,
    /// Offset of the final buffer. The workspace follows it.
    offset: usize,
    /// Capacity of each of the two buffers.
    capacity: usize,
}

#[derive(Debug, Clone)]
struct ExampleLayout {
    slots: Vec<SlotLayout>,
    payload_len: usize,
}

impl ExampleLayout {
    fn slot_index(&self, id: ChannelsetId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.id == id)
    }
}

/// The result of processing one example. The float planes live in the
/// pooled payload.
#[derive(Debug)]
struct ProcessedExample {
    shapes: Vec<PlaneShape>,
    /// Whether a slot ended up in its workspace half.
    swapped: Vec<bool>,
}

impl ProcessedExample {
    fn slot_data<'a>(&self, layout: &ExampleLayout, payload: &'a [f32], index: usize) -> &'a [f32] {
        let slot = &layout.slots[index];
        let start = if self.swapped[index] {
            slot.offset + slot.capacity
        } else {
            slot.offset
        };
        &payload[start..(start + self.shapes[index].len())]
    }
}

impl Reusable for ProcessedExample {
    type Context = Arc<ExampleLayout>;

    fn construct(layout: &Arc<ExampleLayout>) -> Self {
        let count = layout.slots.len();
        Self {
            shapes: vec![PlaneShape::new(0, 0, 0); count],
            swapped: vec![false; count],
        }
    }

    fn reset(&mut self, _layout: &Arc<ExampleLayout>) {
        self.shapes
            .iter_mut()
            .for_each(|shape| *shape = PlaneShape::new(0, 0, 0));
        self.swapped.iter_mut().for_each(|swapped| *swapped = false);
    }
}

/// Decodes and transforms examples on the processing threads.
#[derive(Derivative)]
#[derivative(Debug)]
struct ExampleProcessor {
    layout: Arc<ExampleLayout>,
    pool: ObjectPool<ProcessedExample, f32>,
    transformers: Vec<Transformer>,
    #[derivative(Debug = "ignore")]
    events_sink: Option<Arc<dyn DatasetEventsSink>>,
}

impl JobProcessor for ExampleProcessor {
    type Job = DeserializedChannelsets;
    type Output = Pooled<ProcessedExample, f32>;

    fn process(&self, job: DeserializedChannelsets, thread_id: usize) -> Result<Self::Output> {
        let sink = self.events_sink.as_deref();
        if let Some(sink) = sink {
            sink.image_processing_start(thread_id);
        }

        let mut timer = StageTimer::new(thread_id, sink);
        let result = self.process_example(&job, &mut timer);
        timer.report();

        if let Some(sink) = sink {
            if result.is_err() {
                sink.image_processing_error(thread_id);
            }
            sink.image_processing_end(thread_id);
        }
        result
    }
}

impl ExampleProcessor {
    fn process_example(
        &self,
        job: &DeserializedChannelsets,
        timer: &mut StageTimer<'_>,
    ) -> Result<Pooled<ProcessedExample, f32>> {
        let mut example = self.pool.alloc()?;
        {
            let (processed, payload) = example.split_mut();
            let mut rest = &mut payload[..self.layout.payload_len];
            let mut channelsets = Vec::with_capacity(self.layout.slots.len());

            for slot in &self.layout.slots {
                let (region, tail) = mem::take(&mut rest).split_at_mut(slot.capacity * 2);
                rest = tail;
                let (final_mem, work_mem) = region.split_at_mut(slot.capacity);

                let instance = job.instance(slot.id);
                let compression = job.channelset(slot.id).compression;
                decompress(
                    job.channelset_bytes(slot.id),
                    slot.channels,
                    instance.height,
                    instance.width,
                    compression,
                    final_mem,
                    work_mem,
                )
                .with_context(|| format!("failed to decompress channelset '{}'", slot.name))?;

                let shape = PlaneShape::new(slot.channels, instance.height, instance.width);
                channelsets.push(TransformableChannelset::new(
                    slot.id, &slot.name, final_mem, work_mem, shape,
                )?);
            }
            timer.finish_stage(ProcessingStage::Decompress);

            let mut rng = thread_rng();
            self.transformers
                .iter()
                .try_for_each(|transformer| transformer.transform(&mut channelsets, &mut rng))?;
            timer.finish_stage(ProcessingStage::Transform);

            izip!(&channelsets, &mut processed.shapes, &mut processed.swapped).for_each(
                |(channelset, shape, swapped)| {
                    *shape = channelset.shape();
                    *swapped = channelset.is_swapped();
                },
            );
        }

        Ok(example)
    }
}

/// A blob as slot indices into the processed example layout.
#[derive(Debug, Clone)]
struct BlobLayout {
    name: String,
    slots: Vec<usize>,
}

/// Streams transformed examples of an IDS dataset.
///
/// Examples are decoded and transformed by `threads_count` background
/// threads. At most `cache_size` processed examples are alive at once.
#[derive(Debug)]
pub struct DatasetLoader {
    config: LoadConfig,
    layout: Arc<ExampleLayout>,
    blobs: Vec<BlobLayout>,
    workers: WorkerPool<ExampleProcessor>,
    /// The remaining examples of the current deserializer batch.
    batch: Vec<DeserializedChannelsets>,
    deserializer: Deserializer,
    shuffle_examples: bool,
    /// Set by the first failed [get_example](DatasetLoader::get_example).
    failed: bool,
}

impl DatasetLoader {
    pub fn new(config: LoadConfig, events_sink: Option<Arc<dyn DatasetEventsSink>>) -> Result<Self> {
        ensure!(config.threads_count > 0, "threads_count must be positive");
        ensure!(config.cache_size > 0, "cache_size must be positive");
        ensure!(!config.blobs.is_empty(), "no blob is configured");

        let transformers: Vec<_> = config
            .transforms
            .iter()
            .enumerate()
            .map(|(index, transform)| {
                Transformer::new(transform).with_context(|| format!("invalid transform at index {}", index))
            })
            .collect::<Result<_>>()?;

        let mut deserializer = DeserializerInit {
            paths: config.source_files(),
            desired_prefetch_size: config.disk_prefetch_size,
            loader_index: config.loader_index,
            loaders_count: config.loaders_count,
            shuffle_chunks: config.shuffle_chunks,
            events_sink: events_sink.clone(),
        }
        .build()?;
        let header = deserializer.header().clone();

        // channelsets used by blobs
        let mut blob_ids = vec![];
        {
            let mut blob_names = HashSet::new();
            let mut used = HashSet::new();

            for blob in &config.blobs {
                ensure!(blob_names.insert(&blob.name), "duplicated blob name '{}'", blob.name);
                ensure!(!blob.channelsets.is_empty(), "blob '{}' has no channelset", blob.name);

                let ids: Vec<_> = blob
                    .channelsets
                    .iter()
                    .map(|name| -> Result<_> {
                        let id = header.channelset_id(name).ok_or_else(|| {
                            format_err!("blob '{}' refers to unknown channelset '{}'", blob.name, name)
                        })?;
                        ensure!(used.insert(id), "channelset '{}' is used by more than one blob", name);
                        Ok(id)
                    })
                    .collect::<Result<_>>()?;
                blob_ids.push(ids);
            }
        }

        // transform targets are decoded even if no blob uses them
        let mut decoded: HashSet<ChannelsetId> = blob_ids.iter().flatten().copied().collect();
        transformers
            .iter()
            .flat_map(|transformer| transformer.targets())
            .for_each(|name| match header.channelset_id(name) {
                Some(id) => {
                    decoded.insert(id);
                }
                None => warn!("transform target '{}' is not a channelset of the dataset", name),
            });

        // size buffers for the worst example of this shard
        let shard = deserializer.shard_examples();
        let mut offset = 0;
        let slots: Vec<_> = header
            .channelset_ids()
            .filter(|id| decoded.contains(id))
            .map(|id| -> Result<_> {
                let channelset = header.channelset(id);
                let sizes: HashSet<_> = shard
                    .clone()
                    .map(|index| {
                        let instance = header.instance(index, id);
                        (instance.height, instance.width)
                    })
                    .collect();
                let capacity = sizes
                    .into_iter()
                    .map(|(height, width)| {
                        required_memory(&transformers, &channelset.name, channelset.channels, height, width)
                    })
                    .fold_ok(0, cmp::max)?;

                let slot = SlotLayout {
                    id,
                    name: channelset.name.clone(),
                    channels: channelset.channels,
                    offset,
                    capacity,
                };
                offset += capacity * 2;
                Ok(slot)
            })
            .collect::<Result<_>>()?;

        slots.iter().for_each(|slot| {
            debug!(
                "channelset '{}' uses {} floats per buffer",
                slot.name, slot.capacity
            );
        });

        let layout = Arc::new(ExampleLayout {
            slots,
            payload_len: offset,
        });

        let blobs: Vec<_> = izip!(&config.blobs, blob_ids)
            .map(|(blob, ids)| -> Result<_> {
                let slots: Vec<_> = ids
                    .into_iter()
                    .map(|id| {
                        layout
                            .slot_index(id)
                            .ok_or_else(|| format_err!("channelset of blob '{}' is not decoded", blob.name))
                    })
                    .collect::<Result<_>>()?;
                Ok(BlobLayout {
                    name: blob.name.clone(),
                    slots,
                })
            })
            .collect::<Result<_>>()?;

        let pool = ObjectPoolInit {
            payload_len: layout.payload_len,
            count: config.cache_size,
            no_new_alloc: true,
        }
        .build(layout.clone())?;

        if let Some(sink) = &events_sink {
            sink.image_processing_threads_count(config.threads_count);
        }

        let processor = ExampleProcessor {
            layout: layout.clone(),
            pool,
            transformers,
            events_sink,
        };
        let workers = WorkerPoolInit {
            name: "ids-process".into(),
            num_workers: config.threads_count,
            capacity: config.cache_size,
        }
        .build(Arc::new(processor))?;

        let shuffle_examples = config.shuffle_examples;
        let mut batch = vec![];
        let num_jobs = cmp::min(config.cache_size, shard.len());
        for _ in 0..num_jobs {
            let job = next_job(&mut deserializer, &mut batch, shuffle_examples)?;
            workers.push_job(job)?;
        }

        info!(
            "loader {} of {} serves {} examples with {} blobs",
            config.loader_index,
            config.loaders_count,
            shard.len(),
            blobs.len()
        );

        Ok(Self {
            config,
            layout,
            blobs,
            workers,
            batch,
            deserializer,
            shuffle_examples,
            failed: false,
        })
    }

    pub fn blobs_count(&self) -> usize {
        self.blobs.len()
    }

    pub fn blob_name(&self, index: usize) -> Option<&str> {
        self.blobs.get(index).map(|blob| blob.name.as_str())
    }

    /// Number of examples this loader delivers per epoch.
    pub fn examples_count(&self) -> usize {
        self.deserializer.shard_examples().len()
    }

    /// The effective configuration as pretty printed JSON.
    pub fn configuration(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.config)?)
    }

    /// Blocks until the next processed example is available and writes its
    /// blobs into `sink`.
    ///
    /// An error leaves the pipeline one job short, so every later call is
    /// refused.
    pub fn get_example<S>(&mut self, sink: &mut S) -> Result<()>
    where
        S: ExampleSink + ?Sized,
    {
        ensure!(!self.failed, "the loader is stopped by an earlier error");

        let result = self.fetch_example(sink);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn fetch_example<S>(&mut self, sink: &mut S) -> Result<()>
    where
        S: ExampleSink + ?Sized,
    {
        let example = self.workers.pop_result()?;

        for (blob_index, blob) in self.blobs.iter().enumerate() {
            let shapes: Vec<_> = blob.slots.iter().map(|&slot| example.shapes[slot]).collect();
            let (height, width) = (shapes[0].height, shapes[0].width);
            ensure!(
                shapes
                    .iter()
                    .all(|shape| shape.height == height && shape.width == width),
                "channelsets of blob '{}' differ in size: {:?}",
                blob.name,
                shapes
            );
            let channels: usize = shapes.iter().map(|shape| shape.channels).sum();

            sink.reshape_blob(blob_index, channels, height, width)?;
            let memory = sink.blob_memory(blob_index);
            let plane_len = height * width;
            ensure!(
                memory.len() >= channels * plane_len,
                "blob '{}' memory holds {} floats but {} are required",
                blob.name,
                memory.len(),
                channels * plane_len
            );

            // interleaved slot planes to concatenated planar channels
            let mut first_channel = 0;
            for &slot in &blob.slots {
                let shape = example.shapes[slot];
                let data = example.slot_data(&self.layout, example.payload(), slot);
                let out = &mut memory[(first_channel * plane_len)..((first_channel + shape.channels) * plane_len)];

                data.chunks_exact(shape.channels)
                    .enumerate()
                    .for_each(|(pixel, values)| {
                        values.iter().enumerate().for_each(|(channel, &value)| {
                            out[channel * plane_len + pixel] = value;
                        });
                    });
                first_channel += shape.channels;
            }
        }

        // release the slot before pushing the next job
        drop(example);
        let job = next_job(&mut self.deserializer, &mut self.batch, self.shuffle_examples)?;
        self.workers.push_job(job)?;
        Ok(())
    }
}

impl Drop for DatasetLoader {
    fn drop(&mut self) {
        self.workers.abort_all();
        self.batch.clear();
        self.deserializer.abort_deserializing();
    }
}

/// Takes the next example of the current batch, loading a new batch when
/// the current one is exhausted.
fn next_job(
    deserializer: &mut Deserializer,
    batch: &mut Vec<DeserializedChannelsets>,
    shuffle: bool,
) -> Result<DeserializedChannelsets> {
    if batch.is_empty() {
        let mut examples = deserializer.get_examples()?;
        if shuffle {
            let mut rng = StdRng::seed_from_u64(0);
            examples.shuffle(&mut rng);
        }
        // popped from the back
        examples.reverse();
        *batch = examples;
    }

    batch
        .pop()
        .ok_or_else(|| format_err!("the deserializer returned an empty batch"))
}

/// Floats needed by each buffer of a channelset decoded at `height` by
/// `width` and passed through every transform.
fn required_memory(
    transformers: &[Transformer],
    name: &str,
    channels: usize,
    height: usize,
    width: usize,
) -> Result<usize> {
    let init = (channels * height * width, height, width);
    let (memory, _, _) = transformers
        .iter()
        .try_fold(init, |(memory, height, width), transformer| -> Result<_> {
            let workspace = transformer.required_workspace(name, channels, height, width);
            let (new_height, new_width) = transformer.transformed_size(name, height, width)?;
            let memory = memory
                .max(workspace)
                .max(channels * new_height * new_width);
            Ok((memory, new_height, new_width))
        })?;
    Ok(memory)
}
