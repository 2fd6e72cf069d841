//! Shared helpers for the libclang-backed tests.
#![allow(dead_code)] // each test binary uses a subset

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use cdex::index::{InputKind, index_into};
use cdex::store::Store;

/// libclang allows one `Clang` instance per process, so indexing calls from
/// concurrently running tests have to be serialized.
static CLANG_LOCK: Mutex<()> = Mutex::new(());

pub fn clang_lock() -> MutexGuard<'static, ()> {
    CLANG_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write `source` to a scratch file and index it into a fresh in-memory
/// store.
pub fn index_snippet(source: &str) -> Store {
    let _guard = clang_lock();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.c");
    std::fs::write(&path, source).unwrap();

    let mut store = Store::open_mem();
    index_into(&mut store, &InputKind::SourceFile(path), &[]).unwrap();
    store
}

/// Index a whole build directory (with a compile_commands.json) into the
/// given store.
pub fn index_build_dir(store: &mut Store, dir: &Path) {
    let _guard = clang_lock();
    index_into(store, &InputKind::BuildDir(dir.to_path_buf()), &[]).unwrap();
}
