//! Kernel bookkeeping: work shapes, positional arguments, scalar payloads

#[cfg(feature = "opencl")]
mod table;

#[cfg(feature = "opencl")]
pub use table::{KernelRecord, KernelTable};

use crate::error::{Error, Result};
use crate::handle::handle;
use crate::vendor::Vendor;

handle!(
    /// Kernel created by a manager, 1-based.
    KernelId
);

/// Largest power of two not exceeding `n` (0 for 0).
pub fn floor_pow2(n: usize) -> usize {
    if n == 0 { 0 } else { 1 << (usize::BITS - 1 - n.leading_zeros()) }
}

/// Local size for the first dimension.
///
/// A nonzero `requested` value wins; otherwise the kernel's natural
/// workgroup size rounded down to a power of two. The result is then capped
/// by the vendor quirk and by `limit` when that is smaller, and halved until
/// it divides `global`.
pub fn derive_local_size(
    requested: usize,
    natural: usize,
    vendor: Vendor,
    limit: Option<usize>,
    global: usize,
) -> usize {
    let mut local = if requested != 0 {
        requested
    } else {
        floor_pow2(natural).max(1)
    };
    if let Some(cap) = vendor.local_size_cap() {
        local = local.min(cap);
    }
    if let Some(limit) = limit {
        local = local.min(limit);
    }
    while local > 1 && global % local != 0 {
        local /= 2;
    }
    local.max(1)
}

/// Dispatch geometry. Dimensions beyond `dims` are 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkShape {
    pub dims: u32,
    pub global: [usize; 3],
    pub local: [usize; 3],
}

impl WorkShape {
    pub fn derive(
        dims: u32,
        global: &[usize],
        local: &[usize],
        natural: usize,
        vendor: Vendor,
        limit: Option<usize>,
    ) -> Result<Self> {
        if !(1..=3).contains(&dims) {
            return Err(Error::InvalidConfig(format!("work dimension {dims} not in 1..=3")));
        }
        let n = dims as usize;
        if global.len() < n || global[..n].contains(&0) {
            return Err(Error::InvalidConfig(format!(
                "global shape {global:?} does not cover {dims} dimensions"
            )));
        }

        let mut shape = WorkShape {
            dims,
            global: [1; 3],
            local: [1; 3],
        };
        shape.global[..n].copy_from_slice(&global[..n]);
        let requested = |i: usize| local.get(i).copied().unwrap_or(0);

        shape.local[0] = derive_local_size(requested(0), natural, vendor, limit, shape.global[0]);
        for i in 1..n {
            let r = requested(i);
            shape.local[i] = if r != 0 && shape.global[i] % r == 0 { r } else { 1 };
        }
        Ok(shape)
    }

    pub fn global_items(&self) -> usize {
        self.global.iter().product()
    }
}

/// Where a bound argument goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgPosition {
    /// The position after the last one bound.
    Next,
    /// An explicit position, for rebinding between runs.
    At(u32),
}

/// Positional argument state checked against the kernel's arity.
///
/// Every position must be set before a run. `Next` continues after the
/// highest position set so far, so explicit positions can be mixed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgBinding {
    set: Vec<bool>,
    next: u32,
}

impl ArgBinding {
    pub fn new(arity: u32) -> Self {
        Self {
            set: vec![false; arity as usize],
            next: 0,
        }
    }

    pub fn arity(&self) -> u32 {
        self.set.len() as u32
    }

    /// Number of distinct positions set.
    pub fn bound(&self) -> u32 {
        self.set.iter().filter(|&&s| s).count() as u32
    }

    pub fn is_set(&self, index: u32) -> bool {
        self.set.get(index as usize).copied().unwrap_or(false)
    }

    pub fn is_complete(&self) -> bool {
        self.set.iter().all(|&s| s)
    }

    /// Resolve `position` to an index without marking it.
    pub fn resolve(&self, kernel: &str, position: ArgPosition) -> Result<u32> {
        let index = match position {
            ArgPosition::Next => self.next,
            ArgPosition::At(i) => i,
        };
        if index >= self.arity() {
            return Err(Error::ArgumentOverflow {
                kernel: kernel.to_string(),
                index,
                arity: self.arity(),
            });
        }
        Ok(index)
    }

    /// Record a position as set; `index` must come from [`resolve`](Self::resolve).
    pub fn mark(&mut self, index: u32) {
        if let Some(slot) = self.set.get_mut(index as usize) {
            *slot = true;
            self.next = self.next.max(index + 1);
        }
    }

    /// Resolve `position` and mark it set.
    pub fn claim(&mut self, kernel: &str, position: ArgPosition) -> Result<u32> {
        let index = self.resolve(kernel, position)?;
        self.mark(index);
        Ok(index)
    }

    pub fn ensure_complete(&self, kernel: &str) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(Error::ArgumentsIncomplete {
                kernel: kernel.to_string(),
                bound: self.bound(),
                arity: self.arity(),
            })
        }
    }
}

/// By-value kernel argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarArg {
    Int(i32),
    Uint(u32),
    Float(f32),
    Double(f64),
    Int4([i32; 4]),
    Uint4([u32; 4]),
    Float4([f32; 4]),
    Double4([f64; 4]),
}

impl ScalarArg {
    /// Size of the argument as seen by the kernel.
    pub fn size(&self) -> usize {
        match self {
            ScalarArg::Int(_) | ScalarArg::Uint(_) | ScalarArg::Float(_) => 4,
            ScalarArg::Double(_) => 8,
            ScalarArg::Int4(_) | ScalarArg::Uint4(_) | ScalarArg::Float4(_) => 16,
            ScalarArg::Double4(_) => 32,
        }
    }
}

impl From<i32> for ScalarArg {
    fn from(v: i32) -> Self {
        ScalarArg::Int(v)
    }
}

impl From<u32> for ScalarArg {
    fn from(v: u32) -> Self {
        ScalarArg::Uint(v)
    }
}

impl From<f32> for ScalarArg {
    fn from(v: f32) -> Self {
        ScalarArg::Float(v)
    }
}

impl From<f64> for ScalarArg {
    fn from(v: f64) -> Self {
        ScalarArg::Double(v)
    }
}

impl From<[i32; 4]> for ScalarArg {
    fn from(v: [i32; 4]) -> Self {
        ScalarArg::Int4(v)
    }
}

impl From<[u32; 4]> for ScalarArg {
    fn from(v: [u32; 4]) -> Self {
        ScalarArg::Uint4(v)
    }
}

impl From<[f32; 4]> for ScalarArg {
    fn from(v: [f32; 4]) -> Self {
        ScalarArg::Float4(v)
    }
}

impl From<[f64; 4]> for ScalarArg {
    fn from(v: [f64; 4]) -> Self {
        ScalarArg::Double4(v)
    }
}
