//! Kernel table backed by OpenCL kernels

use super::{ArgBinding, ArgPosition, KernelId, ScalarArg, WorkShape};
use crate::buffer::BufferRecord;
use crate::cache::ProgramId;
use crate::error::{Error, Result};
use crate::timer::{TimingAccumulator, event_elapsed};
use crate::vendor::Vendor;
use ocl::core::{
    self, ArgVal, KernelInfo, KernelInfoResult, KernelWorkGroupInfo, KernelWorkGroupInfoResult,
};
use ocl::prm::{Double4, Float4, Int4, Uint4};
use ocl::{Device, Program, Queue};

pub struct KernelRecord {
    pub id: KernelId,
    pub name: String,
    pub program: ProgramId,
    pub shape: WorkShape,
    /// Local memory the kernel itself needs, in bytes.
    pub local_mem_size: u64,
    pub preferred_multiple: usize,
    pub timing: TimingAccumulator,
    args: ArgBinding,
    kernel: core::Kernel,
}

impl KernelRecord {
    pub fn arity(&self) -> u32 {
        self.args.arity()
    }

    pub fn bound_args(&self) -> u32 {
        self.args.bound()
    }

    fn set_arg(&mut self, position: ArgPosition, value: ArgVal) -> Result<u32> {
        let index = self.args.resolve(&self.name, position)?;
        core::set_kernel_arg(&self.kernel, index, value)?;
        self.args.mark(index);
        Ok(index)
    }
}

pub struct KernelTable {
    records: Vec<KernelRecord>,
    vendor: Vendor,
    local_limit: Option<usize>,
    profiling: bool,
}

impl KernelTable {
    pub fn new(vendor: Vendor, local_limit: Option<usize>, profiling: bool) -> Self {
        Self {
            records: Vec::new(),
            vendor,
            local_limit,
            profiling,
        }
    }

    /// Create `name` from `program` and derive its dispatch shape.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        program_id: ProgramId,
        program: &Program,
        device: Device,
        name: &str,
        dims: u32,
        global: &[usize],
        local: &[usize],
    ) -> Result<KernelId> {
        let kernel = core::create_kernel(program.as_core(), name)
            .map_err(|e| Error::ApiCallFailed(format!("cannot create kernel '{name}': {e}")))?;

        let arity = match core::get_kernel_info(&kernel, KernelInfo::NumArgs)? {
            KernelInfoResult::NumArgs(n) => n,
            other => {
                return Err(Error::ApiCallFailed(format!(
                    "unexpected kernel info result: {other:?}"
                )));
            }
        };
        let natural = match core::get_kernel_work_group_info(
            &kernel,
            device,
            KernelWorkGroupInfo::WorkGroupSize,
        )? {
            KernelWorkGroupInfoResult::WorkGroupSize(n) => n,
            other => {
                return Err(Error::ApiCallFailed(format!(
                    "unexpected work group info result: {other:?}"
                )));
            }
        };
        let local_mem_size =
            match core::get_kernel_work_group_info(&kernel, device, KernelWorkGroupInfo::LocalMemSize) {
                Ok(KernelWorkGroupInfoResult::LocalMemSize(n)) => n,
                _ => 0,
            };
        // not reported by OpenCL 1.0 drivers
        let preferred_multiple = match core::get_kernel_work_group_info(
            &kernel,
            device,
            KernelWorkGroupInfo::PreferredWorkGroupSizeMultiple,
        ) {
            Ok(KernelWorkGroupInfoResult::PreferredWorkGroupSizeMultiple(n)) => n,
            _ => 1,
        };

        let shape = WorkShape::derive(dims, global, local, natural, self.vendor, self.local_limit)?;
        let id = KernelId::new(self.records.len() + 1);
        log::debug!(
            "kernel {id} '{name}': {arity} args, global {:?}, local {:?} (natural {natural})",
            &shape.global[..dims as usize],
            &shape.local[..dims as usize]
        );

        self.records.push(KernelRecord {
            id,
            name: name.to_string(),
            program: program_id,
            shape,
            local_mem_size,
            preferred_multiple,
            timing: TimingAccumulator::default(),
            args: ArgBinding::new(arity),
            kernel,
        });
        Ok(id)
    }

    pub fn get(&self, id: KernelId) -> Result<&KernelRecord> {
        id.index()
            .and_then(|i| self.records.get(i))
            .ok_or(Error::NoKernel(id))
    }

    fn get_mut(&mut self, id: KernelId) -> Result<&mut KernelRecord> {
        id.index()
            .and_then(|i| self.records.get_mut(i))
            .ok_or(Error::NoKernel(id))
    }

    /// Bind a buffer's device memory, or reserve local bytes for LDS buffers.
    pub fn bind_buffer(
        &mut self,
        id: KernelId,
        buffer: &BufferRecord,
        position: ArgPosition,
    ) -> Result<u32> {
        let record = self.get_mut(id)?;
        if !buffer.kind.allocates() {
            let bytes = buffer.byte_len();
            return record.set_arg(position, ArgVal::local::<u8>(&bytes));
        }
        let mem = buffer.device_mem().ok_or(Error::BufferReleased(buffer.id))?;
        record.set_arg(position, ArgVal::mem(mem.as_core()))
    }

    pub fn bind_scalar(&mut self, id: KernelId, value: &ScalarArg, position: ArgPosition) -> Result<u32> {
        let record = self.get_mut(id)?;
        match *value {
            ScalarArg::Int(v) => record.set_arg(position, ArgVal::scalar(&v)),
            ScalarArg::Uint(v) => record.set_arg(position, ArgVal::scalar(&v)),
            ScalarArg::Float(v) => record.set_arg(position, ArgVal::scalar(&v)),
            ScalarArg::Double(v) => record.set_arg(position, ArgVal::scalar(&v)),
            ScalarArg::Int4([a, b, c, d]) => {
                let v = Int4::new(a, b, c, d);
                record.set_arg(position, ArgVal::vector(&v))
            }
            ScalarArg::Uint4([a, b, c, d]) => {
                let v = Uint4::new(a, b, c, d);
                record.set_arg(position, ArgVal::vector(&v))
            }
            ScalarArg::Float4([a, b, c, d]) => {
                let v = Float4::new(a, b, c, d);
                record.set_arg(position, ArgVal::vector(&v))
            }
            ScalarArg::Double4([a, b, c, d]) => {
                let v = Double4::new(a, b, c, d);
                record.set_arg(position, ArgVal::vector(&v))
            }
        }
    }

    /// Enqueue with the stored shape and block until the kernel completes.
    pub fn run(&mut self, id: KernelId, queue: &Queue) -> Result<()> {
        let profiling = self.profiling;
        let record = self.get_mut(id)?;
        record.args.ensure_complete(&record.name)?;
        let WorkShape { dims, global, local } = record.shape;

        if profiling {
            let mut event = core::Event::null();
            unsafe {
                core::enqueue_kernel(
                    queue.as_core(),
                    &record.kernel,
                    dims,
                    None,
                    &global,
                    Some(local),
                    None::<&core::Event>,
                    Some(&mut event),
                )?;
            }
            core::wait_for_event(&event)?;
            record.timing.record(event_elapsed(&event)?);
        } else {
            unsafe {
                core::enqueue_kernel(
                    queue.as_core(),
                    &record.kernel,
                    dims,
                    None,
                    &global,
                    Some(local),
                    None::<&core::Event>,
                    None::<&mut core::Event>,
                )?;
            }
            queue.finish()?;
        }
        Ok(())
    }

    pub fn records(&self) -> impl Iterator<Item = &KernelRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Release every kernel, most recent first.
    pub fn clear(&mut self) {
        while self.records.pop().is_some() {}
    }
}
