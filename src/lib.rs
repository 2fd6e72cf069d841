//! cdex — index and query composite-type declarations in C source trees.
//!
//! The indexer compiles C translation units through libclang, extracts
//! struct/union/enum declarations together with every name they can be
//! referred to by (tag names, typedefs, instance-variable names of unnamed
//! records) and their members, and persists the result in a queryable
//! store. The query tool resolves a type, name, or member by identifier or
//! by name and prints where it was declared.
//!
//! # Quick start
//!
//! Index a source file into an sqlite database:
//!
//! ```no_run
//! use std::path::PathBuf;
//! use cdex::index::{IndexConfig, InputKind, StoreSpec, index_project};
//!
//! let store = index_project(&IndexConfig {
//!     input: InputKind::SourceFile(PathBuf::from("t.c")),
//!     store: StoreSpec::Sql(PathBuf::from("cf.db")),
//!     extra_args: vec![],
//! }).unwrap();
//! store.close().unwrap();
//! ```
//!
//! Then query it:
//!
//! ```no_run
//! use std::path::Path;
//!
//! cdex::query::run_command(Path::new("cf.db"), "td struct foo").unwrap();
//! ```

pub mod config;
pub mod index;
pub mod model;
pub mod query;
pub mod stdio;
pub mod store;
