use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use log::debug;

use crate::layout::BLOCK_SIZE;
use crate::platform::{BlockStorage, Partition};

/// eMMC stand-in backed by partition dumps
#[derive(Debug, Default)]
pub struct ImageStorage {
    partitions: HashMap<Partition, Vec<u8>>,
    selected: Option<Partition>,
    active: bool,
}

impl ImageStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn with_partition(mut self, partition: Partition, data: Vec<u8>) -> Self {
        self.partitions.insert(partition, data);
        self
    }
    /// Storage holding a BOOT0 dump read from `path`
    pub fn from_boot0_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let data = fs::read(path)?;
        Ok(Self::new().with_partition(Partition::Boot0, data))
    }
}

impl BlockStorage for ImageStorage {
    fn is_active(&self) -> bool {
        self.active
    }
    fn init(&mut self) -> io::Result<()> {
        self.active = true;
        self.selected = Some(Partition::Gpp);
        Ok(())
    }
    fn set_partition(&mut self, partition: Partition) -> io::Result<()> {
        if !self.partitions.contains_key(&partition) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {partition} image loaded"),
            ));
        }
        self.selected = Some(partition);
        Ok(())
    }
    fn read_blocks(&mut self, start: u32, count: u32, buf: &mut [u8]) -> io::Result<()> {
        let partition = self
            .selected
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "storage not initialized"))?;
        let data = self
            .partitions
            .get(&partition)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no {partition} image loaded")))?;

        let offset = start as usize * BLOCK_SIZE as usize;
        let len = count as usize * BLOCK_SIZE as usize;
        if buf.len() < len {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "buffer too small"));
        }
        let src = data
            .get(offset..)
            .and_then(|rest| rest.get(..len))
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, format!("read past end of {partition}")))?;

        debug!("Reading {count} blocks from {partition} at block {start:#x}");
        buf[..len].copy_from_slice(src);
        Ok(())
    }
    fn end(&mut self) {
        self.active = false;
        self.selected = None;
    }
}
