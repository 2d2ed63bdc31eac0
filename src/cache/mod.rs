//! Persistent compiled-program cache
//!
//! Every program handed to [`ProgramCache::create`] gets the next ordinal.
//! Before compiling, the cache looks for a slot on disk that was written for
//! the same ordinal with the same source hash, device, platform and options;
//! if one exists its binary is loaded instead of compiling. Slots written for
//! this ordinal with different content are stale and are removed, with the
//! store compacted so slot numbers stay dense.

mod descriptor;
mod store;

pub use descriptor::{Descriptor, DATE_FORMAT, normalize_options, timestamp_now};
pub use store::CacheStore;

use crate::error::{Error, Result};
use crate::handle::handle;
use crate::hash::ContentHash;
use std::fmt;
use std::path::{Path, PathBuf};

handle!(
    /// Ordinal of a program created by a [`ProgramCache`].
    ProgramId
);

/// Output of a successful build.
pub struct BuildOutput<P> {
    pub program: P,
    /// Device binary as reported by the driver.
    pub binary: Vec<u8>,
    pub log: String,
}

/// Turns source or cached binaries into device programs.
pub trait ProgramCompiler {
    type Program;

    /// Compile source text. Failures are reported as
    /// [`Error::CompileFailed`] carrying the build log.
    fn compile_source(&mut self, source: &str, options: &str) -> Result<BuildOutput<Self::Program>>;

    /// Rebuild a program from a binary previously produced by
    /// [`compile_source`](Self::compile_source) on the same device.
    fn load_binary(&mut self, binary: &[u8], options: &str) -> Result<BuildOutput<Self::Program>>;
}

/// Device/platform names recorded in descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheIdentity {
    pub device: String,
    pub platform: String,
}

impl CacheIdentity {
    /// Names as stored in descriptors: surrounding whitespace dropped.
    pub fn new(device: &str, platform: &str) -> Self {
        Self {
            device: device.trim().to_string(),
            platform: platform.trim().to_string(),
        }
    }

    fn normalized(self) -> Result<Self> {
        let identity = Self::new(&self.device, &self.platform);
        if has_line_break(&identity.device) || has_line_break(&identity.platform) {
            return Err(Error::InvalidConfig(format!(
                "device identity {:?} / {:?} spans several lines",
                identity.device, identity.platform
            )));
        }
        Ok(identity)
    }
}

fn has_line_break(value: &str) -> bool {
    value.contains(['\n', '\r'])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Compiled,
    /// Loaded from the given cache slot.
    Cached(usize),
    Failed,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Compiled => f.write_str("compiled from source"),
            BuildStatus::Cached(slot) => write!(f, "loaded from cache slot {slot}"),
            BuildStatus::Failed => f.write_str("build failed"),
        }
    }
}

pub struct ProgramRecord<P> {
    pub id: ProgramId,
    pub source: String,
    pub options: Option<String>,
    pub hash: ContentHash,
    pub device: String,
    pub platform: String,
    pub binary: Vec<u8>,
    pub build_log: String,
    pub compiled_at: String,
    pub status: BuildStatus,
    pub program: P,
}

/// What the fail-fast driver dumps about the program in flight.
#[derive(Debug, Clone)]
pub struct ProgramDiagnostic {
    pub ordinal: usize,
    pub source: String,
    pub options: Option<String>,
    pub status: BuildStatus,
    pub log: String,
}

pub struct ProgramCache<C: ProgramCompiler> {
    compiler: C,
    store: Option<CacheStore>,
    identity: CacheIdentity,
    records: Vec<ProgramRecord<C::Program>>,
    active: usize,
    compiles: usize,
    failed: Option<ProgramDiagnostic>,
    source_dump: Option<PathBuf>,
}

impl<C: ProgramCompiler> ProgramCache<C> {
    /// Create a cache backed by `cache_dir`, or an in-memory one that always
    /// compiles when `cache_dir` is `None`.
    pub fn new(compiler: C, identity: CacheIdentity, cache_dir: Option<&Path>) -> Result<Self> {
        let identity = identity.normalized()?;
        let store = cache_dir.map(CacheStore::open).transpose()?;
        Ok(Self {
            compiler,
            store,
            identity,
            records: Vec::new(),
            active: 0,
            compiles: 0,
            failed: None,
            source_dump: None,
        })
    }

    /// Write every successfully built source to `dir/source<N>.cl`.
    pub fn with_source_dump(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dump = Some(dir.into());
        self
    }

    pub fn identity(&self) -> &CacheIdentity {
        &self.identity
    }

    pub fn store(&self) -> Option<&CacheStore> {
        self.store.as_ref()
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Number of builds from source since this cache was created.
    pub fn compile_count(&self) -> usize {
        self.compiles
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Build `source` as the next program and make it active.
    pub fn create(&mut self, source: &str, options: Option<&str>) -> Result<ProgramId> {
        let ordinal = self.records.len() + 1;
        if options.is_some_and(has_line_break) {
            return Err(Error::InvalidConfig(format!(
                "build options for program {ordinal} span several lines"
            )));
        }
        let wanted = Descriptor {
            number: ordinal,
            hash: ContentHash::of(source),
            options: normalize_options(options),
            device: self.identity.device.clone(),
            platform: self.identity.platform.clone(),
            date: timestamp_now(),
        };

        match self.build(source, &wanted) {
            Ok((output, status, date)) => {
                log::debug!("program {ordinal}: {status} (md5 {})", wanted.hash);
                if let Some(dir) = &self.source_dump {
                    std::fs::write(dir.join(format!("source{ordinal}.cl")), source)?;
                }
                self.records.push(ProgramRecord {
                    id: ProgramId::new(ordinal),
                    source: source.to_string(),
                    options: wanted.options,
                    hash: wanted.hash,
                    device: wanted.device,
                    platform: wanted.platform,
                    binary: output.binary,
                    build_log: output.log,
                    compiled_at: date,
                    status,
                    program: output.program,
                });
                self.active = ordinal;
                self.failed = None;
                Ok(ProgramId::new(ordinal))
            }
            Err(e) => {
                let log = match &e {
                    Error::CompileFailed { log } => log.clone(),
                    other => other.to_string(),
                };
                self.failed = Some(ProgramDiagnostic {
                    ordinal,
                    source: source.to_string(),
                    options: wanted.options,
                    status: BuildStatus::Failed,
                    log,
                });
                Err(e)
            }
        }
    }

    fn build(
        &mut self,
        source: &str,
        wanted: &Descriptor,
    ) -> Result<(BuildOutput<C::Program>, BuildStatus, String)> {
        let options = wanted.options.as_deref().unwrap_or("");
        let Some(store) = self.store.as_mut() else {
            self.compiles += 1;
            let output = self.compiler.compile_source(source, options)?;
            return Ok((output, BuildStatus::Compiled, wanted.date.clone()));
        };

        let (slot, reuse) = resolve_slot(store, wanted)?;
        if let Some(hit) = reuse {
            if let Some(binary) = store.read_binary(slot) {
                match self.compiler.load_binary(&binary, options) {
                    Ok(mut output) => {
                        if output.binary.is_empty() {
                            output.binary = binary;
                        }
                        return Ok((output, BuildStatus::Cached(slot), hit.date));
                    }
                    Err(e) => {
                        log::warn!("cached binary in slot {slot} rejected, rebuilding: {e}");
                    }
                }
            }
        }

        self.compiles += 1;
        let output = self.compiler.compile_source(source, options)?;
        store.write(slot, wanted, &output.binary)?;
        Ok((output, BuildStatus::Compiled, wanted.date.clone()))
    }

    pub fn set_active(&mut self, id: ProgramId) -> Result<()> {
        if id.get() == 0 || id.get() > self.records.len() {
            return Err(Error::NoProgram {
                ordinal: id.get(),
                count: self.records.len(),
            });
        }
        self.active = id.get();
        Ok(())
    }

    /// Active ordinal, 0 when nothing has been created.
    pub fn active_ordinal(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> Option<&ProgramRecord<C::Program>> {
        self.active
            .checked_sub(1)
            .and_then(|i| self.records.get(i))
    }

    pub fn get(&self, id: ProgramId) -> Option<&ProgramRecord<C::Program>> {
        id.index().and_then(|i| self.records.get(i))
    }

    pub fn records(&self) -> impl Iterator<Item = &ProgramRecord<C::Program>> {
        self.records.iter()
    }

    /// The failed build if the last `create` failed, else the active program.
    pub fn diagnostic(&self) -> Option<ProgramDiagnostic> {
        if let Some(failed) = &self.failed {
            return Some(failed.clone());
        }
        self.active().map(|r| ProgramDiagnostic {
            ordinal: r.id.get(),
            source: r.source.clone(),
            options: r.options.clone(),
            status: r.status,
            log: r.build_log.clone(),
        })
    }

    /// Drop every program, most recent first.
    pub fn clear(&mut self) {
        while self.records.pop().is_some() {}
        self.active = 0;
    }
}

/// Find the slot serving `wanted`, evicting stale slots along the way.
///
/// Returns the target slot and, on a hit, the descriptor found there.
fn resolve_slot(store: &mut CacheStore, wanted: &Descriptor) -> Result<(usize, Option<Descriptor>)> {
    let mut slot = 1;
    while slot <= store.len() {
        match store.read_descriptor(slot) {
            Ok(found) if found.number != wanted.number => slot += 1,
            Ok(found) if found.same_content(wanted) => return Ok((slot, Some(found))),
            Ok(found) => {
                log::debug!(
                    "evicting stale cache slot {slot} (md5 {} -> {})",
                    found.hash,
                    wanted.hash
                );
                // the last slot moves into `slot`; examine it next
                store.remove(slot)?;
            }
            Err(e) => {
                log::warn!("evicting unreadable cache slot {slot}: {e}");
                store.remove(slot)?;
            }
        }
    }
    Ok((store.len() + 1, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Compiler producing the source bytes as its "binary".
    struct FakeCompiler {
        compiles: Rc<Cell<usize>>,
        loads: Rc<Cell<usize>>,
        reject_binaries: bool,
    }

    impl FakeCompiler {
        fn new() -> Self {
            Self {
                compiles: Rc::new(Cell::new(0)),
                loads: Rc::new(Cell::new(0)),
                reject_binaries: false,
            }
        }
    }

    impl ProgramCompiler for FakeCompiler {
        type Program = String;

        fn compile_source(&mut self, source: &str, options: &str) -> Result<BuildOutput<String>> {
            self.compiles.set(self.compiles.get() + 1);
            if source.contains("syntax error") {
                return Err(Error::CompileFailed {
                    log: "error: expected ';'".to_string(),
                });
            }
            Ok(BuildOutput {
                program: source.to_string(),
                binary: format!("{options}|{source}").into_bytes(),
                log: String::new(),
            })
        }

        fn load_binary(&mut self, binary: &[u8], _options: &str) -> Result<BuildOutput<String>> {
            self.loads.set(self.loads.get() + 1);
            if self.reject_binaries {
                return Err(Error::ApiCallFailed("CL_INVALID_BINARY".to_string()));
            }
            let text = String::from_utf8_lossy(binary).into_owned();
            Ok(BuildOutput {
                program: text,
                binary: binary.to_vec(),
                log: String::new(),
            })
        }
    }

    fn identity() -> CacheIdentity {
        CacheIdentity {
            device: "Tahiti".to_string(),
            platform: "AMD Accelerated Parallel Processing".to_string(),
        }
    }

    fn cache_in(dir: &Path) -> ProgramCache<FakeCompiler> {
        ProgramCache::new(FakeCompiler::new(), identity(), Some(dir)).unwrap()
    }

    #[test]
    fn test_second_run_loads_binary() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = cache_in(dir.path());
        let id = first.create("kernel void k(){}", Some("")).unwrap();
        assert_eq!(id.get(), 1);
        assert_eq!(first.compile_count(), 1);
        let binary = std::fs::read(dir.path().join("program1.bin")).unwrap();
        let inf = std::fs::read_to_string(dir.path().join("program1.inf")).unwrap();

        let mut second = cache_in(dir.path());
        let id = second.create("kernel void k(){}", Some("")).unwrap();
        assert_eq!(id.get(), 1);
        assert_eq!(second.compile_count(), 0);
        assert_eq!(second.active().unwrap().status, BuildStatus::Cached(1));
        assert_eq!(second.active().unwrap().binary, binary);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("program1.inf")).unwrap(),
            inf
        );
    }

    #[test]
    fn test_changed_source_replaces_slot() {
        let dir = tempfile::tempdir().unwrap();
        cache_in(dir.path()).create("kernel void a(){}", None).unwrap();

        let mut run = cache_in(dir.path());
        run.create("kernel void b(){}", None).unwrap();
        assert_eq!(run.compile_count(), 1);
        assert_eq!(run.store().unwrap().len(), 1);
        let inf = run.store().unwrap().read_descriptor(1).unwrap();
        assert_eq!(inf.hash, ContentHash::of("kernel void b(){}"));
        assert_eq!(
            std::fs::read(dir.path().join("program1.bin")).unwrap(),
            b"|kernel void b(){}"
        );
    }

    #[test]
    fn test_changed_options_miss() {
        let dir = tempfile::tempdir().unwrap();
        cache_in(dir.path())
            .create("kernel void a(){}", Some("-D NC=2"))
            .unwrap();
        let mut run = cache_in(dir.path());
        run.create("kernel void a(){}", Some("-D NC=3")).unwrap();
        assert_eq!(run.compile_count(), 1);
        assert_eq!(
            run.store().unwrap().read_descriptor(1).unwrap().options.as_deref(),
            Some("-D NC=3")
        );
    }

    #[test]
    fn test_other_device_misses() {
        let dir = tempfile::tempdir().unwrap();
        cache_in(dir.path()).create("kernel void a(){}", None).unwrap();

        let other = CacheIdentity {
            device: "GeForce GTX 980".to_string(),
            platform: "NVIDIA CUDA".to_string(),
        };
        let mut run = ProgramCache::new(FakeCompiler::new(), other, Some(dir.path())).unwrap();
        run.create("kernel void a(){}", None).unwrap();
        assert_eq!(run.compile_count(), 1);
        assert_eq!(run.store().unwrap().read_descriptor(1).unwrap().device, "GeForce GTX 980");
    }

    #[test]
    fn test_stale_middle_slot_is_compacted() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = cache_in(dir.path());
        for src in ["a", "b", "c"] {
            first.create(src, None).unwrap();
        }
        assert_eq!(first.store().unwrap().len(), 3);

        let mut second = cache_in(dir.path());
        second.create("a", None).unwrap();
        second.create("b changed", None).unwrap();
        second.create("c", None).unwrap();

        // "a" and "c" hit, "b changed" compiles; slot 3 moved into slot 2
        assert_eq!(second.compile_count(), 1);
        let store = second.store().unwrap();
        assert_eq!(store.len(), 3);
        let numbers: Vec<usize> = store.slots().iter().map(|(_, d)| d.number).collect();
        assert_eq!(numbers, [1, 3, 2]);
        assert_eq!(second.get(ProgramId::new(3)).unwrap().status, BuildStatus::Cached(2));
    }

    #[test]
    fn test_many_invalidations_keep_numbering_dense() {
        let dir = tempfile::tempdir().unwrap();
        for round in 0..4 {
            let mut run = cache_in(dir.path());
            for p in 0..3 {
                let src = if p == round % 3 {
                    format!("program {p} round {round}")
                } else {
                    format!("program {p}")
                };
                run.create(&src, None).unwrap();
            }
            let store = run.store().unwrap();
            assert_eq!(store.len(), 3);
            let reopened = CacheStore::open(dir.path()).unwrap();
            assert_eq!(reopened.len(), 3);
            for slot in 1..=3 {
                assert!(reopened.binary_path(slot).is_file());
            }
            assert!(!reopened.descriptor_path(4).exists());
        }
    }

    #[test]
    fn test_rejected_binary_is_rebuilt_in_place() {
        let dir = tempfile::tempdir().unwrap();
        cache_in(dir.path()).create("k", None).unwrap();

        let mut compiler = FakeCompiler::new();
        compiler.reject_binaries = true;
        let loads = compiler.loads.clone();
        let mut run = ProgramCache::new(compiler, identity(), Some(dir.path())).unwrap();
        run.create("k", None).unwrap();
        assert_eq!(loads.get(), 1);
        assert_eq!(run.compile_count(), 1);
        assert_eq!(run.store().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_binary_recompiles() {
        let dir = tempfile::tempdir().unwrap();
        cache_in(dir.path()).create("k", None).unwrap();
        std::fs::remove_file(dir.path().join("program1.bin")).unwrap();

        let mut run = cache_in(dir.path());
        run.create("k", None).unwrap();
        assert_eq!(run.compile_count(), 1);
        assert_eq!(run.store().unwrap().len(), 1);
        assert!(dir.path().join("program1.bin").is_file());
    }

    #[test]
    fn test_corrupt_descriptor_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("program1.inf"), "garbage without separator").unwrap();
        let mut run = cache_in(dir.path());
        assert_eq!(run.store().unwrap().len(), 1);
        run.create("k", None).unwrap();
        assert_eq!(run.store().unwrap().len(), 1);
        assert_eq!(run.store().unwrap().read_descriptor(1).unwrap().number, 1);
    }

    #[test]
    fn test_disabled_cache_always_compiles() {
        let mut cache = ProgramCache::new(FakeCompiler::new(), identity(), None).unwrap();
        cache.create("k", None).unwrap();
        cache.create("k", None).unwrap();
        assert_eq!(cache.compile_count(), 2);
        assert!(cache.store().is_none());
    }

    #[test]
    fn test_set_active_validates_range() {
        let mut cache = ProgramCache::new(FakeCompiler::new(), identity(), None).unwrap();
        assert_eq!(cache.active_ordinal(), 0);
        assert!(cache.active().is_none());
        cache.create("a", None).unwrap();
        cache.create("b", None).unwrap();
        assert_eq!(cache.active_ordinal(), 2);

        cache.set_active(ProgramId::new(1)).unwrap();
        assert_eq!(cache.active().unwrap().program, "a");

        let err = cache.set_active(ProgramId::new(3)).unwrap_err();
        assert!(matches!(err, Error::NoProgram { ordinal: 3, count: 2 }));
        assert!(cache.set_active(ProgramId::new(0)).is_err());
        assert_eq!(cache.active_ordinal(), 1);
    }

    #[test]
    fn test_failed_build_keeps_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache_in(dir.path());
        cache.create("ok", None).unwrap();
        let err = cache.create("syntax error", Some("-Werror")).unwrap_err();
        assert!(matches!(err, Error::CompileFailed { .. }));

        // active program unchanged, nothing written for the failure
        assert_eq!(cache.active_ordinal(), 1);
        assert_eq!(cache.store().unwrap().len(), 1);

        let diag = cache.diagnostic().unwrap();
        assert_eq!(diag.ordinal, 2);
        assert_eq!(diag.status, BuildStatus::Failed);
        assert_eq!(diag.options.as_deref(), Some("-Werror"));
        assert!(diag.log.contains("expected ';'"));
    }

    #[test]
    fn test_source_dump() {
        let dir = tempfile::tempdir().unwrap();
        let dump = tempfile::tempdir().unwrap();
        let mut cache = cache_in(dir.path()).with_source_dump(dump.path());
        cache.create("kernel void k(){}", None).unwrap();
        assert_eq!(
            std::fs::read_to_string(dump.path().join("source1.cl")).unwrap(),
            "kernel void k(){}"
        );
    }
}
