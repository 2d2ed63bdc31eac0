//! Buffer kinds and host-side storage

#[cfg(feature = "opencl")]
mod table;

#[cfg(feature = "opencl")]
pub use table::{BufferRecord, BufferTable};

use crate::error::{Error, Result};
use crate::handle::handle;
use bytemuck::Pod;
use std::fmt;

handle!(
    /// Buffer created by a manager, 1-based.
    BufferId
);

/// Allocation intent of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Read by kernels, filled from the host.
    Input,
    /// Written by kernels only.
    Output,
    /// Read and written by kernels and the host.
    IO,
    /// Read-only parameters.
    Constant,
    /// Device-resident working storage.
    Global,
    /// Workgroup-local scratch; reserves local memory per launch, no device
    /// allocation.
    LDS,
}

/// Device access implied by a buffer kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl BufferKind {
    /// `None` for kinds that own no device storage.
    pub fn access(self) -> Option<Access> {
        match self {
            BufferKind::Input | BufferKind::Constant => Some(Access::ReadOnly),
            BufferKind::IO | BufferKind::Global => Some(Access::ReadWrite),
            BufferKind::Output => Some(Access::WriteOnly),
            BufferKind::LDS => None,
        }
    }

    pub fn allocates(self) -> bool {
        self.access().is_some()
    }

    #[cfg(feature = "opencl")]
    pub fn mem_flags(self) -> Option<ocl::flags::MemFlags> {
        use ocl::flags;
        self.access().map(|a| match a {
            Access::ReadOnly => flags::MEM_READ_ONLY,
            Access::WriteOnly => flags::MEM_WRITE_ONLY,
            Access::ReadWrite => flags::MEM_READ_WRITE,
        })
    }
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferKind::Input => "input",
            BufferKind::Output => "output",
            BufferKind::IO => "io",
            BufferKind::Constant => "constant",
            BufferKind::Global => "global",
            BufferKind::LDS => "lds",
        };
        f.write_str(name)
    }
}

/// Size in bytes of `count` elements of `T`.
pub fn byte_len_of<T>(count: usize) -> Result<usize> {
    count.checked_mul(std::mem::size_of::<T>()).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "{count} elements of {} bytes overflow the address space",
            std::mem::size_of::<T>()
        ))
    })
}

/// Byte storage aligned for any element type up to 8-byte alignment.
///
/// Typed views go through `bytemuck`, so the backing words only need to
/// keep the alignment; the logical length is tracked in bytes.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HostStorage {
    words: Vec<u64>,
    len: usize,
}

impl fmt::Debug for HostStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostStorage({} bytes)", self.len)
    }
}

impl HostStorage {
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(8)],
            len,
        }
    }

    pub fn from_slice<T: Pod>(data: &[T]) -> Self {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut storage = Self::zeroed(bytes.len());
        storage.bytes_mut().copy_from_slice(bytes);
        storage
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
    }

    fn check<T: Pod>(&self, id: BufferId) -> Result<()> {
        let size = std::mem::size_of::<T>();
        if size == 0 || self.len % size != 0 || std::mem::align_of::<T>() > 8 {
            return Err(Error::TypeMismatch {
                id,
                expected: size,
                actual: self.len,
            });
        }
        Ok(())
    }

    /// View as `T`; the byte length must be a multiple of `size_of::<T>()`.
    pub fn view<T: Pod>(&self, id: BufferId) -> Result<&[T]> {
        self.check::<T>(id)?;
        Ok(bytemuck::cast_slice(self.bytes()))
    }

    pub fn view_mut<T: Pod>(&mut self, id: BufferId) -> Result<&mut [T]> {
        self.check::<T>(id)?;
        Ok(bytemuck::cast_slice_mut(self.bytes_mut()))
    }

    /// Overwrite from `data`, which must have exactly the same byte length.
    pub fn copy_from<T: Pod>(&mut self, id: BufferId, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() != self.len {
            return Err(Error::TypeMismatch {
                id,
                expected: self.len,
                actual: bytes.len(),
            });
        }
        self.bytes_mut().copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_access() {
        assert_eq!(BufferKind::Input.access(), Some(Access::ReadOnly));
        assert_eq!(BufferKind::Constant.access(), Some(Access::ReadOnly));
        assert_eq!(BufferKind::IO.access(), Some(Access::ReadWrite));
        assert_eq!(BufferKind::Global.access(), Some(Access::ReadWrite));
        assert_eq!(BufferKind::Output.access(), Some(Access::WriteOnly));
        assert!(!BufferKind::LDS.allocates());
    }

    #[test]
    fn test_storage_views() {
        let id = BufferId::new(1);
        let mut s = HostStorage::from_slice(&[1.0f64, 2.0, 3.0]);
        assert_eq!(s.len(), 24);
        assert_eq!(s.view::<f64>(id).unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(s.view::<u32>(id).unwrap().len(), 6);

        s.view_mut::<f64>(id).unwrap()[1] = -2.0;
        assert_eq!(s.view::<f64>(id).unwrap()[1], -2.0);
    }

    #[test]
    fn test_odd_length_storage() {
        let id = BufferId::new(2);
        let s = HostStorage::from_slice(&[7u8, 8, 9]);
        assert_eq!(s.bytes(), &[7, 8, 9]);
        assert!(matches!(
            s.view::<u32>(id),
            Err(Error::TypeMismatch { expected: 4, actual: 3, .. })
        ));
    }

    #[test]
    fn test_byte_len_overflow_rejected() {
        assert_eq!(byte_len_of::<f64>(3).unwrap(), 24);
        assert_eq!(byte_len_of::<u8>(usize::MAX).unwrap(), usize::MAX);
        assert!(matches!(
            byte_len_of::<u32>(usize::MAX / 2),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_copy_from_checks_length() {
        let id = BufferId::new(3);
        let mut s = HostStorage::zeroed(8);
        s.copy_from(id, &[1u32, 2]).unwrap();
        assert_eq!(s.view::<u32>(id).unwrap(), &[1, 2]);
        assert!(s.copy_from(id, &[1u32]).is_err());
    }
}
