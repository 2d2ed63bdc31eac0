//! Program cache behavior across simulated process runs

mod common;

use common::{TextCompiler, init_logging};
use latticecl::cache::{CacheIdentity, CacheStore, ProgramCache};
use latticecl::diagnostics;
use latticecl::hash::ContentHash;
use latticecl::source::join_sources;
use latticecl::{BuildStatus, Error, ProgramId};
use rstest::rstest;
use std::path::Path;

const UPDATE: &str = "__kernel void update(__global float *u) { u[get_global_id(0)] += 1.0f; }";
const MEASURE: &str = "__kernel void plaquette(__global float *u, __global float *p) { p[0] = u[0]; }";

fn identity(device: &str) -> CacheIdentity {
    CacheIdentity {
        device: device.to_string(),
        platform: "NVIDIA CUDA".to_string(),
    }
}

fn open(dir: &Path, compiler: &TextCompiler) -> ProgramCache<TextCompiler> {
    ProgramCache::new(compiler.clone(), identity("GeForce GTX 980"), Some(dir)).unwrap()
}

fn slot_hashes(dir: &Path) -> Vec<(usize, usize, ContentHash)> {
    CacheStore::open(dir)
        .unwrap()
        .slots()
        .into_iter()
        .map(|(slot, d)| (slot, d.number, d.hash))
        .collect()
}

#[test]
fn test_double_create_compiles_once() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let compiler = TextCompiler::default();

    for _ in 0..2 {
        let mut cache = open(dir.path(), &compiler);
        let id = cache.create(UPDATE, Some("-cl-mad-enable")).unwrap();
        assert_eq!(id, ProgramId::new(1));
        assert_eq!(cache.active().unwrap().program, UPDATE);
    }

    assert_eq!(compiler.compiles.get(), 1);
    assert_eq!(compiler.loads.get(), 1);
}

#[test]
fn test_multi_program_run_reuses_each_slot() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = TextCompiler::default();
    let sources = [UPDATE, MEASURE];

    let mut first = open(dir.path(), &compiler);
    for s in sources {
        first.create(s, None).unwrap();
    }
    assert_eq!(first.active_ordinal(), 2);

    let mut second = open(dir.path(), &compiler);
    for (i, s) in sources.iter().enumerate() {
        second.create(s, None).unwrap();
        assert_eq!(second.active().unwrap().status, BuildStatus::Cached(i + 1));
    }
    assert_eq!(compiler.compiles.get(), 2);
    assert_eq!(
        slot_hashes(dir.path()),
        vec![(1, 1, ContentHash::of(UPDATE)), (2, 2, ContentHash::of(MEASURE))]
    );

    second.set_active(ProgramId::new(1)).unwrap();
    assert_eq!(second.active().unwrap().program, UPDATE);
}

#[rstest]
#[case::options(Some("-DNCOLORS=3"), "GeForce GTX 980")]
#[case::device(None, "Tesla K40m")]
fn test_identity_change_adds_slot(#[case] options: Option<&str>, #[case] device: &str) {
    let dir = tempfile::tempdir().unwrap();
    let compiler = TextCompiler::default();
    open(dir.path(), &compiler).create(UPDATE, None).unwrap();

    let mut other =
        ProgramCache::new(compiler.clone(), identity(device), Some(dir.path())).unwrap();
    other.create(UPDATE, options).unwrap();

    // same ordinal and hash but different content key: the old slot is stale
    assert_eq!(compiler.compiles.get(), 2);
    let store = CacheStore::open(dir.path()).unwrap();
    assert_eq!(store.len(), 1);
    let d = store.read_descriptor(1).unwrap();
    assert_eq!(d.device, device);
    assert_eq!(d.options.as_deref(), options);
}

#[test]
fn test_numbering_stays_dense_under_churn() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = TextCompiler::default();

    for round in 0..6 {
        let mut cache = open(dir.path(), &compiler);
        // program 2 changes every round, programs 1 and 3 never do
        cache.create(UPDATE, None).unwrap();
        cache.create(&format!("{MEASURE} // round {round}"), None).unwrap();
        cache.create(&join_sources(&[UPDATE, MEASURE]), None).unwrap();

        let slots = slot_hashes(dir.path());
        assert_eq!(slots.len(), 3);
        let indices: Vec<_> = slots.iter().map(|s| s.0).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        let mut numbers: Vec<_> = slots.iter().map(|s| s.1).collect();
        numbers.sort();
        assert_eq!(numbers, vec![1, 2, 3]);
    }
    // 3 builds in the first round, then only program 2 each round
    assert_eq!(compiler.compiles.get(), 3 + 5);
}

#[test]
fn test_failed_build_dumps_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = TextCompiler::default();
    let mut cache = open(&dir.path().join("cache"), &compiler);
    cache.create(UPDATE, None).unwrap();

    let broken = "#error unsupported gauge group";
    let err = cache.create(broken, Some("-DSU3")).unwrap_err();
    assert!(matches!(err, Error::CompileFailed { ref log } if log.contains("#error")));
    assert_eq!(cache.active_ordinal(), 1);
    assert_eq!(cache.len(), 1);

    let diagnostic = cache.diagnostic().unwrap();
    assert_eq!(diagnostic.ordinal, 2);
    let out = dir.path().join("diag");
    diagnostics::write_dump(&out, &diagnostic).unwrap();
    assert_eq!(
        std::fs::read_to_string(out.join(diagnostics::SOURCE_FILE)).unwrap(),
        broken
    );
    assert_eq!(
        std::fs::read_to_string(out.join(diagnostics::OPTIONS_FILE)).unwrap(),
        "-DSU3"
    );
    // nothing was persisted for the failed program
    assert_eq!(CacheStore::open(dir.path().join("cache")).unwrap().len(), 1);
}

#[rstest]
#[case::leading_spaces("       Intel(R) Core(TM) i7-4770 CPU @ 3.40GHz", "Intel(R) OpenCL")]
#[case::trailing_space("Tahiti ", " AMD Accelerated Parallel Processing")]
#[case::hash_in_name("Radeon #2", "AMD Accelerated Parallel Processing")]
fn test_driver_names_hit_on_second_run(#[case] device: &str, #[case] platform: &str) {
    let dir = tempfile::tempdir().unwrap();
    let compiler = TextCompiler::default();

    for _ in 0..2 {
        let identity = CacheIdentity {
            device: device.to_string(),
            platform: platform.to_string(),
        };
        let mut cache = ProgramCache::new(compiler.clone(), identity, Some(dir.path())).unwrap();
        cache.create("kernel void k(){}", None).unwrap();
    }

    assert_eq!(compiler.compiles.get(), 1);
    assert_eq!(compiler.loads.get(), 1);
    let d = CacheStore::open(dir.path()).unwrap().read_descriptor(1).unwrap();
    assert_eq!(d.device, device.trim());
    assert_eq!(d.platform, platform.trim());
}

#[test]
fn test_options_with_hash_hit_on_second_run() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = TextCompiler::default();
    let options = "-DSEP='#' -I C:\\kernels\\";

    for _ in 0..2 {
        let mut cache = open(dir.path(), &compiler);
        cache.create(UPDATE, Some(options)).unwrap();
    }

    assert_eq!(compiler.compiles.get(), 1);
    let d = CacheStore::open(dir.path()).unwrap().read_descriptor(1).unwrap();
    assert_eq!(d.options.as_deref(), Some(options));
}

#[test]
fn test_multiline_options_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = TextCompiler::default();
    let mut cache = open(dir.path(), &compiler);

    let err = cache.create(UPDATE, Some("-DA=1\nNUMBER=7")).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert_eq!(compiler.compiles.get(), 0);
    assert_eq!(CacheStore::open(dir.path()).unwrap().len(), 0);
}
