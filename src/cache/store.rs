//! On-disk slot store
//!
//! Slot `i` is the pair `program<i>.inf` / `program<i>.bin`. Slots are
//! numbered densely from 1; removing a slot moves the last slot into the
//! hole so the numbering never has gaps.

use super::descriptor::Descriptor;
use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    len: usize,
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn rename_if_exists(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl CacheStore {
    /// Open a cache directory, creating it if needed, and count the slots.
    ///
    /// The slot count is the length of the unbroken run of descriptor files
    /// starting at `program1.inf`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let mut store = Self { dir, len: 0 };
        while store.descriptor_path(store.len + 1).is_file() {
            store.len += 1;
        }
        log::debug!(
            "program cache at {} holds {} slots",
            store.dir.display(),
            store.len
        );
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn descriptor_path(&self, slot: usize) -> PathBuf {
        self.dir.join(format!("program{slot}.inf"))
    }

    pub fn binary_path(&self, slot: usize) -> PathBuf {
        self.dir.join(format!("program{slot}.bin"))
    }

    pub fn read_descriptor(&self, slot: usize) -> Result<Descriptor> {
        let text = std::fs::read_to_string(self.descriptor_path(slot))?;
        Descriptor::parse(&text)
    }

    /// Binary bytes of a slot, or `None` when the file is missing or empty.
    pub fn read_binary(&self, slot: usize) -> Option<Vec<u8>> {
        match std::fs::read(self.binary_path(slot)) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    log::warn!("cannot read cached binary for slot {slot}: {e}");
                }
                None
            }
        }
    }

    /// Write descriptor then binary into `slot`.
    ///
    /// `slot` may be an existing slot (overwrite) or `len() + 1` (append).
    pub fn write(&mut self, slot: usize, descriptor: &Descriptor, binary: &[u8]) -> Result<()> {
        if slot == 0 || slot > self.len + 1 {
            return Err(Error::InvalidConfig(format!(
                "cache slot {slot} would leave a gap after {}",
                self.len
            )));
        }
        std::fs::write(self.descriptor_path(slot), descriptor.to_string())?;
        std::fs::write(self.binary_path(slot), binary)?;
        if slot == self.len + 1 {
            self.len += 1;
        }
        log::debug!(
            "cached program {} in slot {slot} ({} bytes)",
            descriptor.number,
            binary.len()
        );
        Ok(())
    }

    /// Delete `slot` and move the last slot into its place.
    pub fn remove(&mut self, slot: usize) -> Result<()> {
        if slot == 0 || slot > self.len {
            return Err(Error::InvalidConfig(format!(
                "cache slot {slot} out of range 1..={}",
                self.len
            )));
        }
        remove_if_exists(&self.descriptor_path(slot))?;
        remove_if_exists(&self.binary_path(slot))?;
        if slot != self.len {
            rename_if_exists(&self.binary_path(self.len), &self.binary_path(slot))?;
            rename_if_exists(&self.descriptor_path(self.len), &self.descriptor_path(slot))?;
            log::debug!("moved cache slot {} into {slot}", self.len);
        }
        self.len -= 1;
        Ok(())
    }

    /// All slots whose descriptor parses, in index order.
    pub fn slots(&self) -> Vec<(usize, Descriptor)> {
        (1..=self.len)
            .filter_map(|i| self.read_descriptor(i).ok().map(|d| (i, d)))
            .collect()
    }
}
