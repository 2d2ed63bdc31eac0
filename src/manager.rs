//! Resource manager: one device, its programs, kernels and buffers
//!
//! The manager owns everything it creates. Fields are declared in release
//! order, so dropping a manager (or calling [`ResourceManager::shutdown`])
//! releases kernels, then buffers, then programs, then the queue and context.

use crate::buffer::{BufferId, BufferKind, BufferTable};
use crate::cache::{CacheIdentity, ProgramCache, ProgramId, ProgramRecord};
use crate::catalog::OclCatalog;
use crate::compiler::OclCompiler;
use crate::config::ManagerConfig;
use crate::device::{DeviceIdentity, OpenCLDevice};
use crate::diagnostics;
use crate::error::{Error, Result};
use crate::kernel::{ArgPosition, KernelId, KernelTable, ScalarArg};
use crate::timer::{TIMER_BUILD, TIMER_TOTAL, TimerPool, TimingStat};
use bytemuck::Pod;
use std::fmt::Write as _;

pub struct ResourceManager {
    kernels: KernelTable,
    buffers: BufferTable,
    programs: ProgramCache<OclCompiler>,
    device: OpenCLDevice,
    timers: TimerPool,
    config: ManagerConfig,
}

impl ResourceManager {
    /// Select a device, open its context and queue, and attach the program
    /// cache described by `config`.
    pub fn initialize(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let mut timers = TimerPool::new();
        timers.start(TIMER_TOTAL)?;

        let catalog = OclCatalog::enumerate()?;
        if catalog.platform_count() == 0 {
            return Err(Error::NoPlatform);
        }
        let selection = match (config.platform_index, config.device_index) {
            (Some(p), Some(d)) => catalog.select(p, d)?,
            _ => catalog.auto_select(config.platform_vendor, config.device_vendor)?,
        };
        let device = OpenCLDevice::open(&catalog, selection, config.profiling)?;

        let identity = device.identity();
        let cache_identity = CacheIdentity::new(&identity.device_name, &identity.platform_name);
        let compiler = OclCompiler::new(device.context().clone(), device.device());
        let cache_dir = config.use_cache.then_some(config.cache_dir.as_path());
        let mut programs = ProgramCache::new(compiler, cache_identity, cache_dir)?;
        if config.debug.dump_source {
            programs = programs.with_source_dump(config.cache_dir.clone());
        }
        if cache_dir.is_none() {
            log::info!("program cache disabled");
        }

        let kernels = KernelTable::new(
            identity.device_vendor,
            config.max_local_size,
            config.profiling,
        );
        let buffers = BufferTable::new(config.profiling);

        Ok(Self {
            kernels,
            buffers,
            programs,
            device,
            timers,
            config,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn identity(&self) -> &DeviceIdentity {
        self.device.identity()
    }

    pub fn device(&self) -> &OpenCLDevice {
        &self.device
    }

    pub fn timers(&self) -> &TimerPool {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut TimerPool {
        &mut self.timers
    }

    pub fn programs(&self) -> &ProgramCache<OclCompiler> {
        &self.programs
    }

    // ------------------------------------------------------------------
    // Programs
    // ------------------------------------------------------------------

    /// Build `source` (or load it from the cache) and make it active.
    pub fn program_create(&mut self, source: &str, options: Option<&str>) -> Result<ProgramId> {
        self.timers.start(TIMER_BUILD)?;
        let result = self.programs.create(source, options);
        self.timers.stop(TIMER_BUILD)?;

        let id = result?;
        if self.config.debug.build_log {
            if let Some(record) = self.programs.get(id) {
                log::info!("program {id} ({}) build log:\n{}", record.status, record.build_log);
            }
        }
        Ok(id)
    }

    pub fn program_set_active(&mut self, id: ProgramId) -> Result<()> {
        self.programs.set_active(id)
    }

    /// Active ordinal, 0 before the first successful build.
    pub fn program_active(&self) -> usize {
        self.programs.active_ordinal()
    }

    pub fn program(&self, id: ProgramId) -> Option<&ProgramRecord<ocl::Program>> {
        self.programs.get(id)
    }

    // ------------------------------------------------------------------
    // Kernels
    // ------------------------------------------------------------------

    /// Create kernel `name` from the active program.
    ///
    /// Zero entries in `local` ask for the derived local size.
    pub fn kernel_init(
        &mut self,
        name: &str,
        dims: u32,
        global: &[usize],
        local: &[usize],
    ) -> Result<KernelId> {
        let program = self.programs.active().ok_or(Error::NoActiveProgram)?;
        self.kernels.create(
            program.id,
            &program.program,
            self.device.device(),
            name,
            dims,
            global,
            local,
        )
    }

    /// Bind `buffer` as the kernel's next argument.
    pub fn kernel_init_buffer(&mut self, kernel: KernelId, buffer: BufferId) -> Result<u32> {
        let record = self.buffers.get(buffer)?;
        self.kernels.bind_buffer(kernel, record, ArgPosition::Next)
    }

    /// Rebind an already declared argument to another buffer.
    pub fn kernel_set_buffer(&mut self, kernel: KernelId, buffer: BufferId, index: u32) -> Result<()> {
        let record = self.buffers.get(buffer)?;
        self.kernels.bind_buffer(kernel, record, ArgPosition::At(index))?;
        Ok(())
    }

    /// Bind a by-value argument as the kernel's next argument.
    pub fn kernel_init_constant(
        &mut self,
        kernel: KernelId,
        value: impl Into<ScalarArg>,
    ) -> Result<u32> {
        self.kernels
            .bind_scalar(kernel, &value.into(), ArgPosition::Next)
    }

    /// Replace the by-value argument at `index`, e.g. between runs.
    pub fn kernel_set_constant(
        &mut self,
        kernel: KernelId,
        value: impl Into<ScalarArg>,
        index: u32,
    ) -> Result<()> {
        self.kernels
            .bind_scalar(kernel, &value.into(), ArgPosition::At(index))?;
        Ok(())
    }

    pub fn kernel_run(&mut self, kernel: KernelId) -> Result<()> {
        self.kernels.run(kernel, self.device.queue())
    }

    pub fn kernel_stat(&self, kernel: KernelId) -> Result<TimingStat> {
        Ok(self.kernels.get(kernel)?.timing.stat())
    }

    // ------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------

    /// Allocate `count` elements of `T`; `host` is copied, never retained.
    pub fn buffer_init<T: Pod>(
        &mut self,
        kind: BufferKind,
        count: usize,
        host: Option<&[T]>,
    ) -> Result<BufferId> {
        self.buffers.alloc(self.device.queue(), kind, count, host)
    }

    pub fn buffer_write(&mut self, id: BufferId) -> Result<()> {
        self.buffers.write(id)
    }

    pub fn buffer_write_from<T: Pod>(&mut self, id: BufferId, data: &[T]) -> Result<()> {
        self.buffers.write_from(id, data)
    }

    pub fn buffer_host_mut<T: Pod>(&mut self, id: BufferId) -> Result<&mut [T]> {
        self.buffers.host_mut(id)
    }

    pub fn buffer_map<T: Pod>(&mut self, id: BufferId) -> Result<&[T]> {
        self.buffers.map(id)
    }

    pub fn buffer_unmap(&mut self, id: BufferId) -> Result<()> {
        self.buffers.unmap(id)
    }

    pub fn buffer_read<T: Pod>(&mut self, id: BufferId) -> Result<&[T]> {
        self.buffers.read(id)
    }

    pub fn buffer_kill(&mut self, id: BufferId) -> Result<()> {
        self.buffers.free(id)
    }

    /// Write and read statistics of a buffer.
    pub fn buffer_stat(&self, id: BufferId) -> Result<(TimingStat, TimingStat)> {
        let record = self.buffers.get(id)?;
        Ok((record.write_timing.stat(), record.read_timing.stat()))
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    /// Per-kernel and per-buffer timing table.
    ///
    /// `total` is the cumulative time and `dev` the spread derived from it;
    /// `avg` is total over runs.
    pub fn time_report(&self) -> String {
        let mut out = String::new();
        let total = self.timers.elapsed(TIMER_TOTAL).unwrap_or_default();
        let build = self.timers.elapsed(TIMER_BUILD).unwrap_or_default();
        let _ = writeln!(out, "Device: {}", self.identity().device_name);
        let _ = writeln!(
            out,
            "Wall time {:.3} s, program builds {:.3} s ({} compiled from source)",
            total.as_secs_f64(),
            build.as_secs_f64(),
            self.programs.compile_count()
        );

        let _ = writeln!(
            out,
            "{:>4} {:<32} {:>8} {:>12} {:>12} {:>12}",
            "id", "kernel", "runs", "total", "avg", "dev"
        );
        for k in self.kernels.records() {
            let s = k.timing.stat();
            let _ = writeln!(
                out,
                "{:>4} {:<32} {:>8} {:>12.6} {:>12.6} {:>12.6}",
                k.id.get(),
                k.name,
                s.samples,
                s.mean,
                s.average(),
                s.deviation
            );
        }

        let _ = writeln!(
            out,
            "{:>4} {:<10} {:>12} {:>8} {:>12} {:>12} {:>8} {:>12} {:>12}",
            "id", "buffer", "bytes", "writes", "total", "dev", "reads", "total", "dev"
        );
        for b in self.buffers.records() {
            let w = b.write_timing.stat();
            let r = b.read_timing.stat();
            let _ = writeln!(
                out,
                "{:>4} {:<10} {:>12} {:>8} {:>12.6} {:>12.6} {:>8} {:>12.6} {:>12.6}",
                b.id.get(),
                b.kind.to_string(),
                b.byte_len(),
                w.samples,
                w.mean,
                w.deviation,
                r.samples,
                r.mean,
                r.deviation
            );
        }
        out
    }

    pub fn print_time_detailed(&self) {
        print!("{}", self.time_report());
    }

    /// Print every platform and device visible to this process.
    pub fn print_available_hardware() -> Result<()> {
        let catalog = OclCatalog::enumerate()?;
        print!("{catalog}");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Release kernels, buffers and programs, then wait for the queue.
    pub fn shutdown(mut self) -> Result<()> {
        self.kernels.clear();
        self.buffers.clear();
        self.programs.clear();
        let result = self.device.finish();
        log::info!("released device {}", self.identity().device_name);
        result
    }

    /// Release everything and exit the process with `code`.
    pub fn finalize(self, code: i32) -> ! {
        if let Err(e) = self.shutdown() {
            log::error!("teardown failed: {e}");
        }
        std::process::exit(code)
    }

    /// Fail-fast driver: report `err`, dump the program in flight, release
    /// the device and exit with the error's exit code.
    pub fn fail(self, err: Error) -> ! {
        log::error!("{err}");
        eprintln!("latticecl: fatal error (exit code {}): {err}", err.exit_code());
        if let Some(diagnostic) = self.programs.diagnostic() {
            match diagnostics::write_dump(&self.config.diagnostics_dir, &diagnostic) {
                Ok(paths) => {
                    for p in paths {
                        eprintln!("  wrote {}", p.display());
                    }
                }
                Err(e) => log::error!("could not write diagnostics: {e}"),
            }
        }
        let code = err.exit_code();
        self.finalize(code)
    }
}

/// Fail-fast exit for errors raised before a manager exists.
pub fn abort(err: Error) -> ! {
    log::error!("{err}");
    eprintln!("latticecl: fatal error (exit code {}): {err}", err.exit_code());
    std::process::exit(err.exit_code())
}
