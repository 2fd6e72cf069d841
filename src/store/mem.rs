//! In-memory store backend.
//!
//! Parallel append-only vectors, one location vector per entry kind, aligned
//! by index. Lookups are linear scans; in-memory use is limited to tests and
//! small inputs. References to types and files are 1-based so that 0 can
//! mean "absent"; the find cursor walks raw indices.

use std::path::Path;

use tracing::debug;

use crate::model::{
    FileRef, LocCtx, MemberEntry, NameKind, TypeEntry, TypeRef, TypeUseEntry, TypenameEntry,
};

use super::{Result, StoreError, TypenameHit};

#[derive(Debug, Default)]
pub struct MemStore {
    files: Vec<String>,
    types: Vec<TypeEntry>,
    type_locs: Vec<LocCtx>,
    typenames: Vec<TypenameEntry>,
    typename_locs: Vec<LocCtx>,
    members: Vec<MemberEntry>,
    member_locs: Vec<LocCtx>,
    type_uses: Vec<TypeUseEntry>,
    type_use_locs: Vec<LocCtx>,
}

impl MemStore {
    /// Add `path` if it is new, else return the existing reference. Paths
    /// are compared byte-for-byte; canonicalization is the sqlite backend's
    /// concern.
    pub fn add_file(&mut self, path: &Path) -> Result<FileRef> {
        let path = path.to_string_lossy();
        if let Some(i) = self.files.iter().position(|f| *f == path) {
            return Ok(FileRef(i as i64 + 1));
        }
        self.files.push(path.into_owned());
        Ok(FileRef(self.files.len() as i64))
    }

    pub fn typename_lookup(&self, loc: &LocCtx, name: &str, kind: NameKind) -> Result<TypeRef> {
        for (i, entry) in self.typenames.iter().enumerate() {
            if entry.name != name {
                continue;
            }
            // name match, check location and kind
            if self.typename_locs[i].file != loc.file {
                continue;
            }
            if entry.kind != kind {
                continue;
            }
            return Ok(entry.base_type);
        }
        Err(StoreError::NotFound)
    }

    pub fn type_insert(&mut self, loc: &LocCtx, entry: &TypeEntry) -> Result<TypeRef> {
        self.types.push(*entry);
        self.type_locs.push(*loc);
        // the new length is the 1-based reference of the new row
        Ok(TypeRef(self.types.len() as i64))
    }

    pub fn typename_insert(&mut self, loc: &LocCtx, entry: &TypenameEntry) -> Result<()> {
        debug!(name = %entry.name, kind = %entry.kind, "memdb typename insert");
        self.typenames.push(entry.clone());
        self.typename_locs.push(*loc);
        Ok(())
    }

    pub fn member_insert(&mut self, loc: &LocCtx, entry: &MemberEntry) -> Result<()> {
        self.members.push(entry.clone());
        self.member_locs.push(*loc);
        Ok(())
    }

    pub fn type_use_insert(&mut self, loc: &LocCtx, entry: &TypeUseEntry) -> Result<()> {
        self.type_uses.push(*entry);
        self.type_use_locs.push(*loc);
        Ok(())
    }

    pub fn file_lookup(&self, file: FileRef) -> Result<String> {
        let index = ref_to_index(file.0)?;
        match self.files.get(index) {
            Some(path) => Ok(path.clone()),
            None => Err(StoreError::NotFound),
        }
    }

    pub fn type_lookup(&self, id: TypeRef) -> Result<(TypeEntry, LocCtx)> {
        let index = ref_to_index(id.0)?;
        match self.types.get(index) {
            Some(entry) => Ok((*entry, self.type_locs[index])),
            None => Err(StoreError::NotFound),
        }
    }

    pub fn member_lookup(&self, parent: TypeRef, name: &str) -> Result<(MemberEntry, LocCtx)> {
        for (i, entry) in self.members.iter().enumerate() {
            if entry.parent != parent || entry.name != name {
                continue;
            }
            return Ok((entry.clone(), self.member_locs[i]));
        }
        Err(StoreError::NotFound)
    }

    pub fn typename_find<'a>(&'a self, name: &'a str) -> MemTypenameCursor<'a> {
        MemTypenameCursor {
            store: self,
            key: name,
            pos: None,
            done: false,
        }
    }

    // Table views, used by tests and small tools.

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn types(&self) -> &[TypeEntry] {
        &self.types
    }

    pub fn typenames(&self) -> &[TypenameEntry] {
        &self.typenames
    }

    pub fn members(&self) -> &[MemberEntry] {
        &self.members
    }

    pub fn type_uses(&self) -> &[TypeUseEntry] {
        &self.type_uses
    }
}

fn ref_to_index(id: i64) -> Result<usize> {
    if id <= 0 {
        return Err(StoreError::InvalidArgument("absent reference"));
    }
    Ok(id as usize - 1)
}

/// Cursor over typename rows whose name equals the search key.
///
/// Holds the (borrowed) key and the current raw index; `next` scans forward
/// for the next name-equal row.
#[derive(Debug)]
pub struct MemTypenameCursor<'a> {
    store: &'a MemStore,
    key: &'a str,
    pos: Option<usize>,
    done: bool,
}

impl MemTypenameCursor<'_> {
    pub fn next(&mut self) -> bool {
        if self.done {
            return false;
        }
        let start = match self.pos {
            Some(i) => i + 1,
            None => 0,
        };
        for i in start..self.store.typenames.len() {
            if self.store.typenames[i].name == self.key {
                self.pos = Some(i);
                return true;
            }
        }
        self.done = true;
        false
    }

    pub fn peek(&self) -> Option<TypenameHit<'_>> {
        if self.done {
            return None;
        }
        let i = self.pos?;
        let entry = &self.store.typenames[i];
        Some(TypenameHit {
            kind: entry.kind,
            base_type: entry.base_type,
            name: &entry.name,
            loc: self.store.typename_locs[i],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TypeKind;

    fn loc(file: FileRef, line: u32) -> LocCtx {
        LocCtx {
            file,
            line,
            column: 1,
            ..LocCtx::default()
        }
    }

    fn named_type(db: &mut MemStore, file: FileRef, name: &str, line: u32) -> TypeRef {
        let id = db
            .type_insert(
                &loc(file, line),
                &TypeEntry {
                    kind: TypeKind::Struct,
                    complete: true,
                },
            )
            .unwrap();
        db.typename_insert(
            &loc(file, line),
            &TypenameEntry {
                kind: NameKind::Direct,
                base_type: id,
                name: name.to_string(),
            },
        )
        .unwrap();
        id
    }

    #[test]
    fn add_file_is_idempotent() {
        let mut db = MemStore::default();
        let a = db.add_file(Path::new("/tmp/t.c")).unwrap();
        let b = db.add_file(Path::new("/tmp/t.c")).unwrap();
        assert_eq!(a, b);
        assert_eq!(db.files().len(), 1);
        assert_eq!(db.file_lookup(a).unwrap(), "/tmp/t.c");
    }

    #[test]
    fn refs_are_one_based() {
        let mut db = MemStore::default();
        let file = db.add_file(Path::new("t.c")).unwrap();
        assert_eq!(file, FileRef(1));
        let id = named_type(&mut db, file, "foo", 3);
        assert_eq!(id, TypeRef(1));
        assert!(matches!(
            db.type_lookup(TypeRef::NONE),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn typename_lookup_matches_file_name_kind() {
        let mut db = MemStore::default();
        let f1 = db.add_file(Path::new("a.c")).unwrap();
        let f2 = db.add_file(Path::new("b.c")).unwrap();
        let id = named_type(&mut db, f1, "foo", 1);

        assert_eq!(
            db.typename_lookup(&loc(f1, 9), "foo", NameKind::Direct).unwrap(),
            id
        );
        // wrong file
        assert!(matches!(
            db.typename_lookup(&loc(f2, 9), "foo", NameKind::Direct),
            Err(StoreError::NotFound)
        ));
        // wrong kind: the tag namespace is not the typedef namespace
        assert!(matches!(
            db.typename_lookup(&loc(f1, 9), "foo", NameKind::Typedef),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn member_lookup_exact() {
        let mut db = MemStore::default();
        let file = db.add_file(Path::new("t.c")).unwrap();
        let parent = named_type(&mut db, file, "foo", 1);
        db.member_insert(
            &loc(file, 2),
            &MemberEntry {
                parent,
                base_type: TypeRef::NONE,
                name: "a".to_string(),
            },
        )
        .unwrap();

        let (entry, found_loc) = db.member_lookup(parent, "a").unwrap();
        assert_eq!(entry.name, "a");
        assert!(entry.base_type.is_none());
        assert_eq!(found_loc.line, 2);
        assert!(matches!(
            db.member_lookup(parent, "ab"),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.member_lookup(TypeRef(99), "a"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn find_cursor_yields_matches_then_stays_exhausted() {
        let mut db = MemStore::default();
        let file = db.add_file(Path::new("t.c")).unwrap();
        named_type(&mut db, file, "foo", 1);
        named_type(&mut db, file, "bar", 2);
        named_type(&mut db, file, "foo", 3);

        let mut cursor = db.typename_find("foo");
        assert!(cursor.peek().is_none());
        let mut seen = Vec::new();
        while cursor.next() {
            let hit = cursor.peek().unwrap();
            seen.push((hit.base_type, hit.loc.line));
            assert_eq!(hit.name, "foo");
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, 1);
        assert_eq!(seen[1].1, 3);
        // exhausted cursors keep reporting false
        assert!(!cursor.next());
        assert!(!cursor.next());
        assert!(cursor.peek().is_none());
    }

    #[test]
    fn find_cursor_matches_are_byte_exact() {
        let mut db = MemStore::default();
        let file = db.add_file(Path::new("t.c")).unwrap();
        named_type(&mut db, file, "foo", 1);
        named_type(&mut db, file, "foobar", 2);

        let mut cursor = db.typename_find("foo%");
        assert!(!cursor.next());

        let mut cursor = db.typename_find("foo");
        assert!(cursor.next());
        assert_eq!(cursor.peek().unwrap().loc.line, 1);
        assert!(!cursor.next());
    }
}
