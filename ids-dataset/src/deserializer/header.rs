use crate::{common::*, format::*};

/// Header, channelset descriptors and the cached instances of every example
/// of one logical dataset, possibly spread over several files.
#[derive(Debug, Clone)]
pub struct DeserializedHeader {
    header: Header,
    channelsets: Vec<ChannelSet>,
    /// Instances of all files, `channelsets_count` per example.
    instances: Vec<ChannelSetInstance>,
    /// Global index of the first example of each file.
    file_example_starts: Vec<usize>,
    /// Byte offset of the first example, identical in every file.
    examples_start_offset: u64,
}

impl DeserializedHeader {
    /// Reads and cross-checks the headers of `paths`, returning the opened files.
    pub fn open<P>(paths: &[P]) -> Result<(Self, Vec<File>)>
    where
        P: AsRef<Path>,
    {
        ensure!(!paths.is_empty(), "no IDS file is given");

        let mut shared: Option<(Header, Vec<ChannelSet>, u64)> = None;
        let mut instances = vec![];
        let mut file_example_starts = vec![];
        let mut files = vec![];

        for path in paths {
            let path = path.as_ref();
            let mut file = File::open(path)
                .with_context(|| format!("failed to open IDS file '{}'", path.display()))?;
            let (header, channelsets, examples_start_offset, file_instances) =
                Self::read_file(&mut file)
                    .with_context(|| format!("failed to read IDS file '{}'", path.display()))?;

            if let Some((ref_header, ref_channelsets, ref_start)) = &shared {
                ensure!(
                    ref_header.is_compatible(&header),
                    "incompatible IDS files '{}' and '{}'",
                    paths[0].as_ref().display(),
                    path.display()
                );
                izip!(ref_channelsets, &channelsets).try_for_each(|(lhs, rhs)| {
                    lhs.check_compatible(rhs).with_context(|| {
                        format!(
                            "incompatible IDS files '{}' and '{}'",
                            paths[0].as_ref().display(),
                            path.display()
                        )
                    })
                })?;
                ensure!(
                    *ref_start == examples_start_offset,
                    "inconsistent example start offsets {} and {} across files '{}' and '{}'",
                    ref_start,
                    examples_start_offset,
                    paths[0].as_ref().display(),
                    path.display()
                );
            }

            file_example_starts.push(instances.len() / header.channelsets_count);
            instances.extend(file_instances);
            files.push(file);

            if shared.is_none() {
                shared = Some((header, channelsets, examples_start_offset));
            }
        }

        let (header, channelsets, examples_start_offset) =
            shared.ok_or_else(|| format_err!("no IDS file is given"))?;

        Ok((
            Self {
                header,
                channelsets,
                instances,
                file_example_starts,
                examples_start_offset,
            },
            files,
        ))
    }

    fn read_file(file: &mut File) -> Result<(Header, Vec<ChannelSet>, u64, Vec<ChannelSetInstance>)> {
        let file_size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        let mut reader = BufReader::new(&mut *file);
        let header = Header::read(&mut reader)?;
        let channelsets: Vec<_> = (0..header.channelsets_count)
            .map(|_| ChannelSet::read(&mut reader))
            .collect::<Result<_>>()?;
        let examples_start_offset = (Header::SIZE + ChannelSet::SIZE * channelsets.len()) as u64;

        ensure!(
            header.cached_instances_start >= examples_start_offset
                && header.cached_instances_start < file_size,
            "invalid cached instances offset {} (file size {})",
            header.cached_instances_start,
            file_size
        );
        let cache_size = (file_size - header.cached_instances_start) as usize;
        ensure!(
            cache_size % ChannelSetInstance::SIZE == 0,
            "invalid cached instances size {} (not multiple of {})",
            cache_size,
            ChannelSetInstance::SIZE
        );
        let num_instances = cache_size / ChannelSetInstance::SIZE;
        ensure!(
            num_instances % header.channelsets_count == 0,
            "{} cached instances do not divide into {} channelsets per example",
            num_instances,
            header.channelsets_count
        );

        reader.seek(SeekFrom::Start(header.cached_instances_start))?;
        let instances: Vec<_> = (0..num_instances)
            .map(|_| ChannelSetInstance::read(&mut reader))
            .collect::<Result<_>>()?;

        Ok((header, channelsets, examples_start_offset, instances))
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn channelsets_count(&self) -> usize {
        self.channelsets.len()
    }

    pub fn channelsets(&self) -> &[ChannelSet] {
        &self.channelsets
    }

    pub fn channelset(&self, id: ChannelsetId) -> &ChannelSet {
        &self.channelsets[id.0]
    }

    pub fn channelset_id(&self, name: &str) -> Option<ChannelsetId> {
        self.channelsets
            .iter()
            .position(|channelset| channelset.name == name)
            .map(ChannelsetId)
    }

    pub fn channelset_ids(&self) -> impl Iterator<Item = ChannelsetId> {
        (0..self.channelsets.len()).map(ChannelsetId)
    }

    pub fn examples_count(&self) -> usize {
        self.instances.len() / self.channelsets.len()
    }

    pub fn files_count(&self) -> usize {
        self.file_example_starts.len()
    }

    /// Global example indices stored in the given file.
    pub fn file_examples(&self, file_index: usize) -> Range<usize> {
        let start = self.file_example_starts[file_index];
        let end = self
            .file_example_starts
            .get(file_index + 1)
            .copied()
            .unwrap_or_else(|| self.examples_count());
        start..end
    }

    pub fn examples_start_offset(&self) -> u64 {
        self.examples_start_offset
    }

    pub fn example_instances(&self, example_index: usize) -> &[ChannelSetInstance] {
        let count = self.channelsets.len();
        &self.instances[(example_index * count)..((example_index + 1) * count)]
    }

    pub fn instance(&self, example_index: usize, id: ChannelsetId) -> &ChannelSetInstance {
        &self.example_instances(example_index)[id.0]
    }
}
