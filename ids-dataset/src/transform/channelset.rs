use crate::{common::*, format::ChannelsetId, geometry::PlaneShape};

/// A decoded channelset with a final buffer and a workspace buffer of the
/// same capacity. The current image lives in the final buffer.
#[derive(Debug)]
pub struct TransformableChannelset<'a> {
    id: ChannelsetId,
    name: &'a str,
    final_mem: &'a mut [f32],
    work_mem: &'a mut [f32],
    swapped: bool,
    shape: PlaneShape,
}

impl<'a> TransformableChannelset<'a> {
    pub fn new(
        id: ChannelsetId,
        name: &'a str,
        final_mem: &'a mut [f32],
        work_mem: &'a mut [f32],
        shape: PlaneShape,
    ) -> Result<Self> {
        ensure!(
            final_mem.len() == work_mem.len(),
            "final and workspace buffers of '{}' differ in size",
            name
        );
        ensure!(
            shape.len() <= final_mem.len(),
            "channelset '{}' of shape {:?} does not fit in {} floats",
            name,
            shape,
            final_mem.len()
        );

        Ok(Self {
            id,
            name,
            final_mem,
            work_mem,
            swapped: false,
            shape,
        })
    }

    pub fn id(&self) -> ChannelsetId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn shape(&self) -> PlaneShape {
        self.shape
    }

    pub fn channels(&self) -> usize {
        self.shape.channels
    }

    pub fn height(&self) -> usize {
        self.shape.height
    }

    pub fn width(&self) -> usize {
        self.shape.width
    }

    /// Number of floats each buffer can hold.
    pub fn capacity(&self) -> usize {
        self.final_mem.len()
    }

    /// Changes the image size after a transform wrote a resized image.
    pub fn set_size(&mut self, height: usize, width: usize) -> Result<()> {
        let shape = self.shape.with_size(height, width);
        ensure!(
            shape.len() <= self.capacity(),
            "resized channelset '{}' of shape {:?} does not fit in {} floats",
            self.name,
            shape,
            self.capacity()
        );
        self.shape = shape;
        Ok(())
    }

    /// The current image.
    pub fn data(&self) -> &[f32] {
        &self.final_mem[..self.shape.len()]
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        let len = self.shape.len();
        &mut self.final_mem[..len]
    }

    /// The whole final and workspace buffers.
    pub fn buffers_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut *self.final_mem, &mut *self.work_mem)
    }

    /// Exchanges the final and the workspace buffer.
    pub fn swap(&mut self) {
        mem::swap(&mut self.final_mem, &mut self.work_mem);
        self.swapped = !self.swapped;
    }

    /// Whether the image currently lives in the buffer allocated as workspace.
    pub fn is_swapped(&self) -> bool {
        self.swapped
    }
}
