//! Kernel source ingestion

use crate::error::Result;
use std::path::Path;

/// Separator placed between concatenated source files.
pub const SOURCE_SEPARATOR: &str = "\n\n";

/// Join source fragments with a blank line between each.
pub fn join_sources<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(SOURCE_SEPARATOR)
}

/// Read and join source files in the given order.
pub fn read_sources<P: AsRef<Path>>(paths: &[P]) -> Result<String> {
    let parts = paths
        .iter()
        .map(|p| std::fs::read_to_string(p.as_ref()))
        .collect::<std::io::Result<Vec<_>>>()?;
    log::debug!("read {} source files", parts.len());
    Ok(join_sources(&parts))
}
