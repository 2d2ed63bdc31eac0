//! OpenCL program compiler

use crate::cache::{BuildOutput, ProgramCompiler};
use crate::error::{Error, Result};
use ocl::core::{ProgramBuildInfo, ProgramBuildInfoResult, ProgramInfo, ProgramInfoResult};
use ocl::{Context, Device, Program};

/// Builds programs for one device in one context.
pub struct OclCompiler {
    context: Context,
    device: Device,
}

impl OclCompiler {
    pub fn new(context: Context, device: Device) -> Self {
        Self { context, device }
    }

    fn build_log(&self, program: &Program) -> String {
        match program.build_info(self.device, ProgramBuildInfo::BuildLog) {
            Ok(ProgramBuildInfoResult::BuildLog(log)) => log.trim_end_matches('\0').trim().to_string(),
            _ => String::new(),
        }
    }

    fn binary(&self, program: &Program) -> Result<Vec<u8>> {
        match program.info(ProgramInfo::Binaries)? {
            ProgramInfoResult::Binaries(mut binaries) if !binaries.is_empty() => {
                Ok(binaries.swap_remove(0))
            }
            other => Err(Error::CompileFailed {
                log: format!("program binary unavailable: {other:?}"),
            }),
        }
    }

    fn finish(&self, program: Program) -> Result<BuildOutput<Program>> {
        let log = self.build_log(&program);
        let binary = self.binary(&program)?;
        Ok(BuildOutput {
            program,
            binary,
            log,
        })
    }
}

impl ProgramCompiler for OclCompiler {
    type Program = Program;

    fn compile_source(&mut self, source: &str, options: &str) -> Result<BuildOutput<Program>> {
        // ocl folds the driver's build log into the error text
        let program = Program::builder()
            .src(source)
            .devices(self.device)
            .cmplr_opt(options)
            .build(&self.context)
            .map_err(|e| Error::CompileFailed { log: e.to_string() })?;
        self.finish(program)
    }

    fn load_binary(&mut self, binary: &[u8], options: &str) -> Result<BuildOutput<Program>> {
        let binaries = [binary];
        let program = Program::builder()
            .binaries(&binaries)
            .devices(self.device)
            .cmplr_opt(options)
            .build(&self.context)
            .map_err(|e| Error::CompileFailed { log: e.to_string() })?;
        self.finish(program)
    }
}
