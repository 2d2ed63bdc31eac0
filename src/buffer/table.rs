//! Buffer table backed by OpenCL memory objects

use super::{BufferId, BufferKind, HostStorage, byte_len_of};
use crate::error::{Error, Result};
use crate::timer::{TimingAccumulator, event_elapsed};
use bytemuck::Pod;
use ocl::core;
use ocl::{Buffer, Queue};
use std::time::Instant;

pub struct BufferRecord {
    pub id: BufferId,
    pub kind: BufferKind,
    pub count: usize,
    pub elem_size: usize,
    pub write_timing: TimingAccumulator,
    pub read_timing: TimingAccumulator,
    host: HostStorage,
    mapped: Option<HostStorage>,
    device: Option<Buffer<u8>>,
}

impl BufferRecord {
    pub fn byte_len(&self) -> usize {
        self.count * self.elem_size
    }

    pub fn device_mem(&self) -> Option<&Buffer<u8>> {
        self.device.as_ref()
    }

    /// True once `free` has dropped the device allocation.
    pub fn is_released(&self) -> bool {
        self.kind.allocates() && self.device.is_none()
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    pub fn host(&self) -> &HostStorage {
        &self.host
    }
}

/// Blocking transfer timed on the device when profiling, on the host otherwise.
fn timed<F>(profiling: bool, acc: &mut TimingAccumulator, transfer: F) -> Result<()>
where
    F: FnOnce(Option<&mut ocl::Event>) -> ocl::Result<()>,
{
    if profiling {
        let mut event = ocl::Event::empty();
        transfer(Some(&mut event))?;
        core::wait_for_event(&event)?;
        acc.record(event_elapsed(&event)?);
    } else {
        let start = Instant::now();
        transfer(None)?;
        acc.record_duration(start.elapsed());
    }
    Ok(())
}

pub struct BufferTable {
    records: Vec<BufferRecord>,
    profiling: bool,
}

impl BufferTable {
    pub fn new(profiling: bool) -> Self {
        Self {
            records: Vec::new(),
            profiling,
        }
    }

    /// Allocate `count` elements of `T`.
    ///
    /// Initial contents are copied into host staging and, for kinds with
    /// device storage, written to the device with a blocking transfer.
    pub fn alloc<T: Pod>(
        &mut self,
        queue: &Queue,
        kind: BufferKind,
        count: usize,
        host: Option<&[T]>,
    ) -> Result<BufferId> {
        let id = BufferId::new(self.records.len() + 1);
        let byte_len = byte_len_of::<T>(count)?;
        let elem_size = std::mem::size_of::<T>();

        let host = match host {
            Some(data) => {
                let storage = HostStorage::from_slice(data);
                if storage.len() != byte_len {
                    return Err(Error::TypeMismatch {
                        id,
                        expected: byte_len,
                        actual: storage.len(),
                    });
                }
                Some(storage)
            }
            None => None,
        };
        let has_data = host.is_some();

        let device = match kind.mem_flags() {
            Some(flags) => {
                if byte_len == 0 {
                    return Err(Error::InvalidConfig(format!(
                        "{kind} buffer {id} would be empty"
                    )));
                }
                Some(
                    Buffer::<u8>::builder()
                        .queue(queue.clone())
                        .flags(flags)
                        .len(byte_len)
                        .build()?,
                )
            }
            None => None,
        };

        self.records.push(BufferRecord {
            id,
            kind,
            count,
            elem_size,
            write_timing: TimingAccumulator::default(),
            read_timing: TimingAccumulator::default(),
            host: host.unwrap_or_else(|| HostStorage::zeroed(byte_len)),
            mapped: None,
            device,
        });
        log::debug!("buffer {id}: {kind}, {count} x {elem_size} bytes");

        if has_data && kind.allocates() {
            self.write(id)?;
        }
        Ok(id)
    }

    pub fn get(&self, id: BufferId) -> Result<&BufferRecord> {
        id.index()
            .and_then(|i| self.records.get(i))
            .ok_or(Error::NoBuffer(id))
    }

    fn get_mut(&mut self, id: BufferId) -> Result<&mut BufferRecord> {
        id.index()
            .and_then(|i| self.records.get_mut(i))
            .ok_or(Error::NoBuffer(id))
    }

    /// Push host staging to the device, blocking.
    pub fn write(&mut self, id: BufferId) -> Result<()> {
        let profiling = self.profiling;
        let record = self.get_mut(id)?;
        let device = record.device.as_ref().ok_or(Error::BufferReleased(id))?;
        let bytes = record.host.bytes();
        // SAFETY: `block(true)` makes the transfer synchronous, so `bytes`
        // outlives the command.
        timed(profiling, &mut record.write_timing, |event| unsafe {
            match event {
                Some(e) => device.write(bytes).block(true).enew(e).enq(),
                None => device.write(bytes).block(true).enq(),
            }
        })
    }

    /// Replace host staging with `data` and push it.
    pub fn write_from<T: Pod>(&mut self, id: BufferId, data: &[T]) -> Result<()> {
        self.get_mut(id)?.host.copy_from(id, data)?;
        self.write(id)
    }

    /// Host staging as `T`, for filling before [`write`](Self::write).
    pub fn host_mut<T: Pod>(&mut self, id: BufferId) -> Result<&mut [T]> {
        self.get_mut(id)?.host.view_mut(id)
    }

    /// Read device contents into a separate mapped region.
    pub fn map<T: Pod>(&mut self, id: BufferId) -> Result<&[T]> {
        let profiling = self.profiling;
        let record = self.get_mut(id)?;
        let device = record.device.as_ref().ok_or(Error::BufferReleased(id))?;
        let mut mapped = HostStorage::zeroed(record.host.len());
        let dst = mapped.bytes_mut();
        // SAFETY: `block(true)` makes the transfer synchronous, so `dst`
        // outlives the command.
        timed(profiling, &mut record.read_timing, |event| unsafe {
            match event {
                Some(e) => device.read(dst).block(true).enew(e).enq(),
                None => device.read(dst).block(true).enq(),
            }
        })?;
        record.mapped.insert(mapped).view(id)
    }

    /// Last mapped contents without touching the device.
    pub fn mapped<T: Pod>(&self, id: BufferId) -> Result<&[T]> {
        self.get(id)?
            .mapped
            .as_ref()
            .ok_or(Error::NotMapped(id))?
            .view(id)
    }

    pub fn unmap(&mut self, id: BufferId) -> Result<()> {
        self.get_mut(id)?
            .mapped
            .take()
            .map(|_| ())
            .ok_or(Error::NotMapped(id))
    }

    /// Refresh host staging from the device.
    pub fn read<T: Pod>(&mut self, id: BufferId) -> Result<&[T]> {
        let profiling = self.profiling;
        let record = self.get_mut(id)?;
        let device = record.device.as_ref().ok_or(Error::BufferReleased(id))?;
        let dst = record.host.bytes_mut();
        // SAFETY: `block(true)` makes the transfer synchronous, so `dst`
        // outlives the command.
        timed(profiling, &mut record.read_timing, |event| unsafe {
            match event {
                Some(e) => device.read(dst).block(true).enew(e).enq(),
                None => device.read(dst).block(true).enq(),
            }
        })?;
        record.host.view(id)
    }

    /// Release the device allocation. Releasing twice is a no-op.
    pub fn free(&mut self, id: BufferId) -> Result<()> {
        let record = self.get_mut(id)?;
        record.mapped = None;
        if record.device.take().is_some() {
            log::debug!("released buffer {id}");
        }
        Ok(())
    }

    pub fn records(&self) -> impl Iterator<Item = &BufferRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Release every buffer, most recent first.
    pub fn clear(&mut self) {
        while self.records.pop().is_some() {}
    }
}
