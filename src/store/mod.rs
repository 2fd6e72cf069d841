//! Store front-end — one interface over three backends.
//!
//! [`Store`] statically dispatches every operation to a no-op, in-memory, or
//! sqlite backend. The operation surface is small and fixed: the ingestion
//! driver only creates entries and pre-looks-up typenames; the query
//! executor only reads.
//!
//! Name searches return a [`TypenameCursor`]. The cursor borrows the store,
//! so the borrow checker rejects interleaving a live cursor with writes on
//! the same store. A [`TypenameHit`] peeked from a cursor borrows its name
//! string from the cursor; advancing the cursor invalidates it, which is
//! again enforced statically (`peek` borrows `&self`, `next` takes
//! `&mut self`). Consumers that retain a name must copy it out.

use std::path::Path;

use crate::model::{
    FileRef, LocCtx, MemberEntry, NameKind, TypeEntry, TypeRef, TypeUseEntry, TypenameEntry,
};

pub mod mem;
pub mod nop;
pub mod sql;

pub use mem::MemStore;
pub use nop::NopStore;
pub use sql::SqlStore;

/// Errors crossing the store boundary.
///
/// The taxonomy is flat on purpose: callers only ever branch on `NotFound`;
/// everything else is logged and survived (ingestion) or reported (CLI).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no matching entry")]
    NotFound,
    #[error("entry already exists")]
    AlreadyExists,
    #[error("value out of range")]
    OutOfRange,
    #[error("corrupt row: {0}")]
    Corrupt(&'static str),
    #[error("store is read-only")]
    Readonly,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("i/o failed")]
    Io(#[from] std::io::Error),
    #[error("sqlite failure")]
    Backend(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Database front-end dispatching between backend implementations.
#[derive(Debug)]
pub enum Store {
    Nop(NopStore),
    Mem(MemStore),
    Sql(SqlStore),
}

impl Store {
    /// Open a store that accepts every write and retains nothing.
    pub fn open_nop() -> Store {
        Store::Nop(NopStore::default())
    }

    /// Open an empty in-memory store.
    pub fn open_mem() -> Store {
        Store::Mem(MemStore::default())
    }

    /// Open (and in read-write mode, create) an sqlite store at `path`.
    pub fn open_sql(path: &Path, readonly: bool) -> Result<Store> {
        Ok(Store::Sql(SqlStore::open(path, readonly)?))
    }

    /// Release the store. Consuming the handle makes "close twice" and
    /// "use after close" unrepresentable.
    pub fn close(self) -> Result<()> {
        match self {
            Store::Nop(_) | Store::Mem(_) => Ok(()),
            Store::Sql(db) => db.close(),
        }
    }

    /// Insert a source-file path, returning a reference to its row.
    ///
    /// Preexistence is not an error: if the (canonicalized, for the sqlite
    /// backend) path is already present, the existing reference is returned.
    pub fn add_file(&mut self, path: &Path) -> Result<FileRef> {
        match self {
            Store::Nop(db) => db.add_file(path),
            Store::Mem(db) => db.add_file(path),
            Store::Sql(db) => db.add_file(path),
        }
    }

    /// Check for a typename matching (`loc.file`, `name`, `kind`) and return
    /// the type it references. Scope is recognized by the schema but lookups
    /// are currently global only.
    pub fn typename_lookup(&self, loc: &LocCtx, name: &str, kind: NameKind) -> Result<TypeRef> {
        match self {
            Store::Nop(db) => db.typename_lookup(loc, name, kind),
            Store::Mem(db) => db.typename_lookup(loc, name, kind),
            Store::Sql(db) => db.typename_lookup(loc, name, kind),
        }
    }

    /// Insert a type entry. Always creates a new row.
    pub fn type_insert(&mut self, loc: &LocCtx, entry: &TypeEntry) -> Result<TypeRef> {
        match self {
            Store::Nop(db) => db.type_insert(loc, entry),
            Store::Mem(db) => db.type_insert(loc, entry),
            Store::Sql(db) => db.type_insert(loc, entry),
        }
    }

    /// Insert a typename entry. The caller must have ruled out a duplicate
    /// with [`Store::typename_lookup`] first.
    pub fn typename_insert(&mut self, loc: &LocCtx, entry: &TypenameEntry) -> Result<()> {
        match self {
            Store::Nop(db) => db.typename_insert(loc, entry),
            Store::Mem(db) => db.typename_insert(loc, entry),
            Store::Sql(db) => db.typename_insert(loc, entry),
        }
    }

    /// Insert a member entry.
    pub fn member_insert(&mut self, loc: &LocCtx, entry: &MemberEntry) -> Result<()> {
        match self {
            Store::Nop(db) => db.member_insert(loc, entry),
            Store::Mem(db) => db.member_insert(loc, entry),
            Store::Sql(db) => db.member_insert(loc, entry),
        }
    }

    /// Insert a type-use entry.
    pub fn type_use_insert(&mut self, loc: &LocCtx, entry: &TypeUseEntry) -> Result<()> {
        match self {
            Store::Nop(db) => db.type_use_insert(loc, entry),
            Store::Mem(db) => db.type_use_insert(loc, entry),
            Store::Sql(db) => db.type_use_insert(loc, entry),
        }
    }

    /// Resolve a file reference to its (owned) path string.
    pub fn file_lookup(&self, file: FileRef) -> Result<String> {
        match self {
            Store::Nop(db) => db.file_lookup(file),
            Store::Mem(db) => db.file_lookup(file),
            Store::Sql(db) => db.file_lookup(file),
        }
    }

    /// Resolve a type reference to its entry and location.
    pub fn type_lookup(&self, id: TypeRef) -> Result<(TypeEntry, LocCtx)> {
        match self {
            Store::Nop(db) => db.type_lookup(id),
            Store::Mem(db) => db.type_lookup(id),
            Store::Sql(db) => db.type_lookup(id),
        }
    }

    /// Look up a member of `parent` by exact name.
    pub fn member_lookup(&self, parent: TypeRef, name: &str) -> Result<(MemberEntry, LocCtx)> {
        match self {
            Store::Nop(db) => db.member_lookup(parent, name),
            Store::Mem(db) => db.member_lookup(parent, name),
            Store::Sql(db) => db.member_lookup(parent, name),
        }
    }

    /// Create a cursor over every typename whose name byte-equals `name`.
    pub fn typename_find<'a>(&'a self, name: &'a str) -> Result<TypenameCursor<'a>> {
        match self {
            Store::Nop(db) => db.typename_find(name),
            Store::Mem(db) => Ok(TypenameCursor::Mem(db.typename_find(name))),
            Store::Sql(db) => Ok(TypenameCursor::Sql(db.typename_find(name)?)),
        }
    }

    /// The in-memory backend, if that is what this store is. Tests and small
    /// tools use this to inspect tables directly.
    pub fn as_mem(&self) -> Option<&MemStore> {
        match self {
            Store::Mem(db) => Some(db),
            _ => None,
        }
    }
}

/// One row yielded by a [`TypenameCursor`].
///
/// `name` is borrowed from the cursor and is valid until the next
/// [`TypenameCursor::next`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypenameHit<'c> {
    pub kind: NameKind,
    pub base_type: TypeRef,
    pub name: &'c str,
    pub loc: LocCtx,
}

/// Iterator over typename rows matching a search key.
///
/// Use:
/// ```no_run
/// # use cdex::store::Store;
/// # let store = Store::open_mem();
/// let mut cursor = store.typename_find("foo").unwrap();
/// while cursor.next() {
///     let hit = cursor.peek().unwrap();
///     // inspect hit; hit.name dies at the next `next`
/// }
/// ```
#[derive(Debug)]
pub enum TypenameCursor<'a> {
    Mem(mem::MemTypenameCursor<'a>),
    Sql(sql::SqlTypenameCursor<'a>),
}

impl TypenameCursor<'_> {
    /// Advance to the next matching row. Returns false when exhausted, and
    /// keeps returning false from then on.
    pub fn next(&mut self) -> bool {
        match self {
            TypenameCursor::Mem(it) => it.next(),
            TypenameCursor::Sql(it) => it.next(),
        }
    }

    /// The row the cursor is positioned on, or `None` before the first
    /// `next` and after exhaustion.
    pub fn peek(&self) -> Option<TypenameHit<'_>> {
        match self {
            TypenameCursor::Mem(it) => it.peek(),
            TypenameCursor::Sql(it) => it.peek(),
        }
    }
}
