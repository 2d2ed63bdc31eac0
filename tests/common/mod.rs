//! Common test utilities for integration tests

#![allow(dead_code)]

use latticecl::cache::{BuildOutput, ProgramCompiler};
use latticecl::{Error, Result};
use std::cell::Cell;
use std::rc::Rc;

pub const EPSILON: f32 = 1e-5;

pub fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

pub fn vec_approx_eq(a: &[f32], b: &[f32]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| approx_eq(*x, *y))
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Compiler whose "binary" is the options and source text. Counters are
/// shared so a test can keep watching them after the cache takes ownership.
#[derive(Clone, Default)]
pub struct TextCompiler {
    pub compiles: Rc<Cell<usize>>,
    pub loads: Rc<Cell<usize>>,
}

impl ProgramCompiler for TextCompiler {
    type Program = String;

    fn compile_source(&mut self, source: &str, options: &str) -> Result<BuildOutput<String>> {
        self.compiles.set(self.compiles.get() + 1);
        if source.contains("#error") {
            return Err(Error::CompileFailed {
                log: format!("{source}: #error directive"),
            });
        }
        Ok(BuildOutput {
            program: source.to_string(),
            binary: format!("{options}\n{source}").into_bytes(),
            log: "build ok".to_string(),
        })
    }

    fn load_binary(&mut self, binary: &[u8], _options: &str) -> Result<BuildOutput<String>> {
        self.loads.set(self.loads.get() + 1);
        let text = String::from_utf8_lossy(binary);
        let source = text.split_once('\n').map(|(_, s)| s).unwrap_or_default();
        Ok(BuildOutput {
            program: source.to_string(),
            binary: binary.to_vec(),
            log: String::new(),
        })
    }
}
