use super::{chunk::*, DeserializedHeader};
use crate::{
    common::*,
    events::DatasetEventsSink,
    format::*,
    pool::{JobProcessor, ObjectPool, ObjectPoolInit, Pooled, Reusable, WorkerPool, WorkerPoolInit},
};

/// Two chunk buffers for double buffering plus one for the case that the
/// second is done while the first is still in use.
const NUM_CHUNK_BUFFERS: usize = 3;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct DeserializerInit {
    pub paths: Vec<PathBuf>,
    /// Desired number of bytes per disk read.
    pub desired_prefetch_size: usize,
    pub loader_index: usize,
    pub loaders_count: usize,
    pub shuffle_chunks: bool,
    #[derivative(Debug = "ignore")]
    pub events_sink: Option<Arc<dyn DatasetEventsSink>>,
}

impl DeserializerInit {
    pub fn build(self) -> Result<Deserializer> {
        let Self {
            paths,
            desired_prefetch_size,
            loader_index,
            loaders_count,
            shuffle_chunks,
            events_sink,
        } = self;

        let (header, files) = DeserializedHeader::open(&paths)?;
        let header = Arc::new(header);

        let examples = shard_examples(header.examples_count(), loaders_count, loader_index)?;
        let ranges = file_ranges(&header, examples.clone());
        let mut chunks = compute_chunks(&header, &ranges, desired_prefetch_size)?;
        ensure!(
            !chunks.is_empty(),
            "loader {} of {} has no examples to read",
            loader_index,
            loaders_count
        );
        let max_chunk_size = chunks
            .iter()
            .map(|chunk| chunk.size)
            .max()
            .unwrap_or(0);

        info!(
            "deserializing examples {:?} of {} in {} chunks (max chunk {} bytes)",
            examples,
            header.examples_count(),
            chunks.len(),
            max_chunk_size
        );

        if shuffle_chunks {
            shuffle_chunk_list(&mut chunks);
        }

        let pool = ObjectPoolInit {
            payload_len: max_chunk_size,
            count: NUM_CHUNK_BUFFERS,
            no_new_alloc: false,
        }
        .build(())?;

        if let Some(sink) = &events_sink {
            sink.data_read_threads_count(1);
        }

        let reader = ChunkReader {
            files: files.into_iter().map(Mutex::new).collect(),
            pool,
            events_sink,
        };
        let workers = WorkerPoolInit {
            name: "ids-read".into(),
            num_workers: 1,
            capacity: 1,
        }
        .build(Arc::new(reader))?;

        workers.push_job(chunks[0].clone())?;

        Ok(Deserializer {
            header,
            examples,
            workers,
            chunks,
            curr_chunk: 0,
            shuffle_chunks,
        })
    }
}

/// Streams the examples of one shard from disk on a background thread.
#[derive(Debug)]
pub struct Deserializer {
    header: Arc<DeserializedHeader>,
    examples: Range<usize>,
    workers: WorkerPool<ChunkReader>,
    chunks: Vec<Chunk>,
    curr_chunk: usize,
    shuffle_chunks: bool,
}

impl Deserializer {
    pub fn header(&self) -> &Arc<DeserializedHeader> {
        &self.header
    }

    /// Total number of examples over all files.
    pub fn examples_count(&self) -> usize {
        self.header.examples_count()
    }

    /// Global indices of the examples this deserializer delivers.
    pub fn shard_examples(&self) -> Range<usize> {
        self.examples.clone()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn channelset_id(&self, name: &str) -> Option<ChannelsetId> {
        self.header.channelset_id(name)
    }

    pub fn channelset(&self, id: ChannelsetId) -> &ChannelSet {
        self.header.channelset(id)
    }

    pub fn instance(&self, example_index: usize, id: ChannelsetId) -> &ChannelSetInstance {
        self.header.instance(example_index, id)
    }

    /// Returns the examples of the next loaded chunk and starts loading the
    /// chunk after it.
    pub fn get_examples(&mut self) -> Result<Vec<DeserializedChannelsets>> {
        let memory = Arc::new(self.workers.pop_result()?);
        let chunk = memory.chunk.clone();
        let channelsets_count = self.header.channelsets_count();

        let mut views = Vec::with_capacity(chunk.examples.len());
        let mut offset = 0;

        while offset < chunk.size {
            let instances =
                ChannelSetInstance::parse_many(&memory.payload()[offset..chunk.size], channelsets_count)?;
            let size = example_size(&instances);
            ensure!(
                offset + size <= chunk.size,
                "example at offset {} overruns chunk of {} bytes",
                chunk.start_offset + offset as u64,
                chunk.size
            );

            views.push(DeserializedChannelsets {
                memory: memory.clone(),
                offset,
                instances,
                header: self.header.clone(),
            });
            offset += size;
        }
        ensure!(
            views.len() == chunk.examples.len(),
            "chunk at offset {} holds {} examples but {} are expected",
            chunk.start_offset,
            views.len(),
            chunk.examples.len()
        );

        self.curr_chunk += 1;
        if self.curr_chunk == self.chunks.len() {
            if self.shuffle_chunks {
                shuffle_chunk_list(&mut self.chunks);
            }
            self.curr_chunk = 0;
        }
        self.workers.push_job(self.chunks[self.curr_chunk].clone())?;

        Ok(views)
    }

    /// Stops the disk worker. Views handed out before remain valid.
    pub fn abort_deserializing(&mut self) {
        self.workers.abort_all();
    }
}

impl Drop for Deserializer {
    fn drop(&mut self) {
        self.abort_deserializing();
    }
}

/// A zero-copy view of one example inside a loaded chunk.
#[derive(Clone)]
pub struct DeserializedChannelsets {
    memory: Arc<Pooled<MemoryChunk, u8>>,
    /// Offset of the inline instances within the chunk.
    offset: usize,
    instances: Vec<ChannelSetInstance>,
    header: Arc<DeserializedHeader>,
}

impl DeserializedChannelsets {
    pub fn header(&self) -> &DeserializedHeader {
        &self.header
    }

    pub fn instances(&self) -> &[ChannelSetInstance] {
        &self.instances
    }

    pub fn instance(&self, id: ChannelsetId) -> &ChannelSetInstance {
        &self.instances[id.0]
    }

    pub fn channelset(&self, id: ChannelsetId) -> &ChannelSet {
        self.header.channelset(id)
    }

    /// The serialized bytes of one channelset.
    pub fn channelset_bytes(&self, id: ChannelsetId) -> &[u8] {
        let start = self.offset
            + self.instances.len() * ChannelSetInstance::SIZE
            + self.instances[..id.0]
                .iter()
                .map(|instance| instance.size)
                .sum::<usize>();
        let end = start + self.instances[id.0].size;
        &self.memory.payload()[start..end]
    }
}

impl Debug for DeserializedChannelsets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeserializedChannelsets")
            .field("chunk", &self.memory.chunk)
            .field("offset", &self.offset)
            .field("instances", &self.instances)
            .finish()
    }
}

/// A loaded chunk. Its bytes are the pooled payload.
#[derive(Debug)]
pub struct MemoryChunk {
    chunk: Chunk,
}

impl Reusable for MemoryChunk {
    type Context = ();

    fn construct(_context: &()) -> Self {
        Self {
            chunk: Chunk {
                file_index: 0,
                start_offset: 0,
                size: 0,
                examples: 0..0,
            },
        }
    }

    fn reset(&mut self, _context: &()) {
        self.chunk.size = 0;
        self.chunk.examples = 0..0;
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
struct ChunkReader {
    files: Vec<Mutex<File>>,
    pool: ObjectPool<MemoryChunk, u8>,
    #[derivative(Debug = "ignore")]
    events_sink: Option<Arc<dyn DatasetEventsSink>>,
}

impl JobProcessor for ChunkReader {
    type Job = Chunk;
    type Output = Pooled<MemoryChunk, u8>;

    fn process(&self, chunk: Chunk, thread_id: usize) -> Result<Self::Output> {
        if let Some(sink) = &self.events_sink {
            sink.data_read_start(thread_id);
        }

        let mut buffer = self.pool.alloc()?;
        let (memory_chunk, payload) = buffer.split_mut();
        ensure!(
            chunk.size <= payload.len(),
            "chunk size {} greater than buffer size {}",
            chunk.size,
            payload.len()
        );

        {
            let mut file = self.files[chunk.file_index]
                .lock()
                .map_err(|_| format_err!("file lock is poisoned"))?;
            file.seek(SeekFrom::Start(chunk.start_offset))?;
            file.read_exact(&mut payload[..chunk.size]).with_context(|| {
                format!(
                    "reading chunk start_offset={}, size={} failed",
                    chunk.start_offset, chunk.size
                )
            })?;
        }

        let size = chunk.size;
        memory_chunk.chunk = chunk;

        if let Some(sink) = &self.events_sink {
            sink.data_read_end(thread_id, size);
        }

        Ok(buffer)
    }
}

fn shuffle_chunk_list(chunks: &mut [Chunk]) {
    let mut rng = StdRng::seed_from_u64(0);
    chunks.shuffle(&mut rng);
}
