//! Query execution — parse a command, resolve it against a store, print the
//! results.
//!
//! Results are printed one per line in a human-readable form; everything
//! else (diagnostics, progress) goes through `tracing` so that stdout stays
//! machine-consumable.

use std::path::Path;

use tracing::error;

use crate::model::{LocCtx, MemberEntry, NameKind, TypeEntry, TypeRef};
use crate::store::{Store, StoreError, TypenameHit};

pub mod parse;

pub use parse::{MemberSearch, NameSpec, ParseError, SearchCmd, TypeSearch, parse_command};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("no matching entry")]
    NoMatch,
    #[error("ambiguous typename")]
    Ambiguous,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Open the database at `db_path`, parse `command` and execute it.
pub fn run_command(db_path: &Path, command: &str) -> Result<(), QueryError> {
    let store = Store::open_sql(db_path, false)?;
    let result = parse_command(command)
        .map_err(QueryError::from)
        .and_then(|cmd| exec_search(&store, &cmd));
    if let Err(err) = store.close() {
        error!(%err, "closing store failed");
    }
    result
}

/// Execute a parsed search against any store.
pub fn exec_search(store: &Store, cmd: &SearchCmd) -> Result<(), QueryError> {
    match cmd {
        SearchCmd::TypeDecl(search) => exec_search_type(store, search),
        SearchCmd::Typename(spec) => exec_search_typename(store, spec),
        SearchCmd::MemberDecl(search) => exec_search_member(store, search),
    }
}

fn exec_search_type(store: &Store, search: &TypeSearch) -> Result<(), QueryError> {
    let (id, entry, loc) = search_type_core(store, search)?;
    let file = store.file_lookup(loc.file)?;
    print_type_entry(id, &entry, &loc, &file);
    Ok(())
}

fn exec_search_typename(store: &Store, spec: &NameSpec) -> Result<(), QueryError> {
    let printed = print_all_typenames(store, spec)?;
    if printed == 0 {
        println!("no matching typename");
        return Err(QueryError::NoMatch);
    }
    Ok(())
}

fn exec_search_member(store: &Store, search: &MemberSearch) -> Result<(), QueryError> {
    let (parent, _entry, _loc) = search_type_core(store, &search.base)?;

    match store.member_lookup(parent, &search.member) {
        Ok((entry, loc)) => {
            let file = store.file_lookup(loc.file)?;
            print_member_entry(parent, &entry, &loc, &file);
            Ok(())
        }
        Err(StoreError::NotFound) => {
            println!("no member '{}' in type {}", search.member, parent.0);
            Err(QueryError::NoMatch)
        }
        Err(err) => {
            error!(parent = parent.0, member = %search.member, %err, "member lookup failed");
            Err(err.into())
        }
    }
}

/// Resolve a type search to a single type row.
///
/// No-match and ambiguity are reported to the user here; an ambiguous name
/// additionally lists every matching row so the user can redo the search by
/// id.
fn search_type_core(
    store: &Store,
    search: &TypeSearch,
) -> Result<(TypeRef, TypeEntry, LocCtx), QueryError> {
    let id = match search {
        TypeSearch::Id(rowid) => TypeRef(*rowid),
        TypeSearch::Name(spec) => match find_one_type(store, spec) {
            Ok(id) => id,
            Err(QueryError::NoMatch) => {
                println!("no matching type");
                return Err(QueryError::NoMatch);
            }
            Err(QueryError::Ambiguous) => {
                println!("ambiguous typename");
                print_all_typenames(store, spec)?;
                return Err(QueryError::Ambiguous);
            }
            Err(err) => return Err(err),
        },
    };

    match store.type_lookup(id) {
        Ok((entry, loc)) => Ok((id, entry, loc)),
        Err(StoreError::NotFound) => {
            println!("no type matching id {}", id.0);
            Err(QueryError::NoMatch)
        }
        Err(err) => {
            error!(id = id.0, %err, "type lookup failed");
            Err(err.into())
        }
    }
}

/// Resolve a plain or elaborated name to exactly one type.
///
/// Plain names must reference a single underlying type across every
/// matching typename row. Elaborated names only consider direct-kind rows
/// whose type entry matches the requested tag kind.
fn find_one_type(store: &Store, spec: &NameSpec) -> Result<TypeRef, QueryError> {
    if let Some(elab) = spec.elab {
        return find_elab_type(store, elab, &spec.name);
    }

    let mut cursor = store.typename_find(&spec.name)?;
    if !cursor.next() {
        return Err(QueryError::NoMatch);
    }
    let id = cursor.peek().expect("cursor yielded a row").base_type;

    while cursor.next() {
        let hit = cursor.peek().expect("cursor yielded a row");
        if hit.base_type != id {
            // many names referencing different types
            return Err(QueryError::Ambiguous);
        }
    }
    Ok(id)
}

fn find_elab_type(
    store: &Store,
    elab: crate::model::TypeKind,
    name: &str,
) -> Result<TypeRef, QueryError> {
    let mut cursor = store.typename_find(name)?;
    let mut id: Option<TypeRef> = None;

    while cursor.next() {
        let hit = cursor.peek().expect("cursor yielded a row");
        // an elaborated search only matches tag names
        if hit.kind != NameKind::Direct {
            continue;
        }
        let base = hit.base_type;

        let (entry, _loc) = match store.type_lookup(base) {
            Ok(found) => found,
            Err(err) => {
                error!(id = base.0, %err, "typename references a missing type row");
                return Err(err.into());
            }
        };
        if entry.kind != elab {
            // `struct foo` is not `union foo`
            continue;
        }

        match id {
            None => id = Some(base),
            Some(prev) if prev != base => return Err(QueryError::Ambiguous),
            Some(_) => {}
        }
    }

    id.ok_or(QueryError::NoMatch)
}

/// Print every typename row matching the name. Returns how many were
/// printed.
fn print_all_typenames(store: &Store, spec: &NameSpec) -> Result<usize, QueryError> {
    let mut cursor = store.typename_find(&spec.name)?;
    let mut printed = 0;
    while cursor.next() {
        let hit = cursor.peek().expect("cursor yielded a row");
        let file = store.file_lookup(hit.loc.file)?;
        print_one_typename(&hit, &file);
        printed += 1;
    }
    Ok(printed)
}

fn print_type_entry(id: TypeRef, entry: &TypeEntry, loc: &LocCtx, file: &str) {
    println!(
        "{} {} at {}:{}:{}",
        id.0, entry.kind, file, loc.line, loc.column
    );
}

fn print_one_typename(hit: &TypenameHit<'_>, file: &str) {
    println!(
        "{} '{}' at {}:{}:{}",
        hit.base_type.0, hit.name, file, hit.loc.line, hit.loc.column
    );
}

fn print_member_entry(parent: TypeRef, entry: &MemberEntry, loc: &LocCtx, file: &str) {
    println!(
        "{}.'{}', type {}, at {}:{}:{}",
        parent.0, entry.name, entry.base_type.0, file, loc.line, loc.column
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileRef, LocCtx, MemberEntry, TypeEntry, TypeKind, TypenameEntry};

    fn loc(file: FileRef, line: u32) -> LocCtx {
        LocCtx {
            file,
            line,
            column: 1,
            ..LocCtx::default()
        }
    }

    /// Two files, `struct foo` in each, a typedef alias in the first, and a
    /// member on the first foo.
    fn fixture() -> Store {
        let mut store = Store::open_mem();
        let f1 = store.add_file(Path::new("a.c")).unwrap();
        let f2 = store.add_file(Path::new("b.c")).unwrap();

        let entry = TypeEntry {
            kind: TypeKind::Struct,
            complete: true,
        };
        let foo1 = store.type_insert(&loc(f1, 1), &entry).unwrap();
        store
            .typename_insert(
                &loc(f1, 1),
                &TypenameEntry {
                    kind: NameKind::Direct,
                    base_type: foo1,
                    name: "foo".to_string(),
                },
            )
            .unwrap();
        store
            .typename_insert(
                &loc(f1, 2),
                &TypenameEntry {
                    kind: NameKind::Typedef,
                    base_type: foo1,
                    name: "foo_t".to_string(),
                },
            )
            .unwrap();
        store
            .member_insert(
                &loc(f1, 1),
                &MemberEntry {
                    parent: foo1,
                    base_type: TypeRef::NONE,
                    name: "a".to_string(),
                },
            )
            .unwrap();

        let foo2 = store.type_insert(&loc(f2, 5), &entry).unwrap();
        store
            .typename_insert(
                &loc(f2, 5),
                &TypenameEntry {
                    kind: NameKind::Direct,
                    base_type: foo2,
                    name: "foo".to_string(),
                },
            )
            .unwrap();
        store
    }

    #[test]
    fn unique_name_resolves() {
        let store = fixture();
        let id = find_one_type(
            &store,
            &NameSpec {
                elab: None,
                name: "foo_t".to_string(),
            },
        )
        .unwrap();
        assert_eq!(id, TypeRef(1));
    }

    #[test]
    fn duplicate_name_is_ambiguous() {
        let store = fixture();
        let err = find_one_type(
            &store,
            &NameSpec {
                elab: None,
                name: "foo".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::Ambiguous));

        // elaborated search hits the same ambiguity: two direct `struct foo`
        let err = find_one_type(
            &store,
            &NameSpec {
                elab: Some(TypeKind::Struct),
                name: "foo".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::Ambiguous));
    }

    #[test]
    fn elaborated_search_filters_kind() {
        let store = fixture();
        // no union named foo
        let err = find_one_type(
            &store,
            &NameSpec {
                elab: Some(TypeKind::Union),
                name: "foo".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::NoMatch));

        // `struct foo_t` doesn't exist either: typedef rows aren't tags
        let err = find_one_type(
            &store,
            &NameSpec {
                elab: Some(TypeKind::Struct),
                name: "foo_t".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::NoMatch));
    }

    #[test]
    fn unknown_name_is_no_match() {
        let store = fixture();
        let err = exec_search(
            &store,
            &SearchCmd::TypeDecl(TypeSearch::Name(NameSpec {
                elab: None,
                name: "bar".to_string(),
            })),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::NoMatch));
    }

    #[test]
    fn search_by_id_bypasses_names() {
        let store = fixture();
        exec_search(&store, &SearchCmd::TypeDecl(TypeSearch::Id(2))).unwrap();
        let err = exec_search(&store, &SearchCmd::TypeDecl(TypeSearch::Id(99))).unwrap_err();
        assert!(matches!(err, QueryError::NoMatch));
    }

    #[test]
    fn member_search_resolves_parent_then_member() {
        let store = fixture();
        // unambiguous through the typedef name
        exec_search(
            &store,
            &SearchCmd::MemberDecl(MemberSearch {
                base: TypeSearch::Name(NameSpec {
                    elab: None,
                    name: "foo_t".to_string(),
                }),
                member: "a".to_string(),
            }),
        )
        .unwrap();

        let err = exec_search(
            &store,
            &SearchCmd::MemberDecl(MemberSearch {
                base: TypeSearch::Id(1),
                member: "zz".to_string(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::NoMatch));
    }

    #[test]
    fn typename_search_lists_matches() {
        let store = fixture();
        exec_search(
            &store,
            &SearchCmd::Typename(NameSpec {
                elab: None,
                name: "foo".to_string(),
            }),
        )
        .unwrap();

        let err = exec_search(
            &store,
            &SearchCmd::Typename(NameSpec {
                elab: None,
                name: "nope".to_string(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::NoMatch));
    }
}
