//! Diagnostic dump of the program in flight when a run fails

use crate::cache::ProgramDiagnostic;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

pub const SOURCE_FILE: &str = "diagnostic_source.cl";
pub const STATUS_FILE: &str = "diagnostic_build_status.txt";
pub const OPTIONS_FILE: &str = "diagnostic_build_options.txt";
pub const LOG_FILE: &str = "diagnostic_build_log.txt";

/// Write the four fixed dump files into `dir`, replacing earlier dumps.
///
/// Returns the paths written, in the order source, status, options, log.
pub fn write_dump(dir: &Path, diagnostic: &ProgramDiagnostic) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let status = format!("program {}: {}\n", diagnostic.ordinal, diagnostic.status);
    let options = diagnostic.options.as_deref().unwrap_or("");
    let files = [
        (SOURCE_FILE, diagnostic.source.as_str()),
        (STATUS_FILE, status.as_str()),
        (OPTIONS_FILE, options),
        (LOG_FILE, diagnostic.log.as_str()),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        let path = dir.join(name);
        fs::write(&path, contents)?;
        written.push(path);
    }
    log::info!("wrote diagnostics for program {} to {}", diagnostic.ordinal, dir.display());
    Ok(written)
}
