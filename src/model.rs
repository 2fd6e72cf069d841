//! Entity model — the records persisted by the stores.
//!
//! These types are front-end independent and backend independent. The
//! ingestion pipeline builds them from clang entities and hands them to a
//! [`Store`](crate::store::Store); the query executor reads them back.

use std::fmt;

/// Reference to a file row.
///
/// The relational backend stores a strictly positive rowid here; the
/// in-memory backend stores a 1-based index. Value 0 is reserved to mean
/// "absent".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FileRef(pub i64);

impl FileRef {
    pub const NONE: FileRef = FileRef(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Reference to a type row.
///
/// Other entries (typenames, members, type uses) use this to point at a
/// particular composite type. Representation rules are the same as
/// [`FileRef`]; `TypeRef::NONE` marks primitive-typed members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TypeRef(pub i64);

impl TypeRef {
    pub const NONE: TypeRef = TypeRef(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Reference to a function row. Value 0 means "no enclosing function".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FuncRef(pub i64);

impl FuncRef {
    pub const NONE: FuncRef = FuncRef(0);
}

/// Scope level for [`LocCtx::scope`]: 0 = global, 1 = function body,
/// >= 2 = nested blocks.
pub const SCOPE_GLOBAL: u32 = 0;
pub const SCOPE_FUNC: u32 = 1;
pub const SCOPE_NESTED: u32 = 2;

/// Full source-location context of a database entry.
///
/// Lines and columns start at 1. `func` is [`FuncRef::NONE`] for entries at
/// global scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocCtx {
    pub file: FileRef,
    pub func: FuncRef,
    pub scope: u32,
    pub line: u32,
    pub column: u32,
}

/// C language kind of a user-defined composite type.
///
/// Typedefs are excluded; they are names, not types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Struct = 1,
    Union = 2,
    Enum = 3,
}

impl TypeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeKind::Struct => "struct",
            TypeKind::Union => "union",
            TypeKind::Enum => "enum",
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(v: i64) -> Option<TypeKind> {
        match v {
            1 => Some(TypeKind::Struct),
            2 => Some(TypeKind::Union),
            3 => Some(TypeKind::Enum),
            _ => None,
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry for a user-defined type declaration.
///
/// There is no name member because not every type has a direct name. Each
/// name that can refer to a type is a separate [`TypenameEntry`].
/// `complete = false` is reserved for forward declarations; the indexer
/// currently always commits complete entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeEntry {
    pub kind: TypeKind,
    pub complete: bool,
}

/// The ways a composite type acquires a name.
///
/// - `Direct`: "foo" in `struct foo {};`
/// - `Typedef`: "foo_t" in `typedef struct foo foo_t;` or
///   `typedef struct {} foo_t;`
/// - `Var`: "foo" in `struct {} foo;` — the instance variable is the only
///   identifier of an otherwise unnamed type. Note `struct foo {} f;` only
///   names the type "foo".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Direct = 1,
    Typedef = 2,
    Var = 3,
}

impl NameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NameKind::Direct => "direct",
            NameKind::Typedef => "typedef",
            NameKind::Var => "var",
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(v: i64) -> Option<NameKind> {
        match v {
            1 => Some(NameKind::Direct),
            2 => Some(NameKind::Typedef),
            3 => Some(NameKind::Var),
            _ => None,
        }
    }
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry for one name of a type.
///
/// A typename expands the set of identifiers that refer to `base_type`.
/// For elaborated spellings such as `struct foo`, only "foo" is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypenameEntry {
    pub kind: NameKind,
    pub base_type: TypeRef,
    pub name: String,
}

/// Entry for a struct/union member declaration.
///
/// `base_type` is [`TypeRef::NONE`] for members of primitive type; those are
/// represented but do not reference the type table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    pub parent: TypeRef,
    pub base_type: TypeRef,
    pub name: String,
}

/// Manner in which a type is used. Only `Decl` is currently emitted; the
/// remaining kinds are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeUseKind {
    /// A variable/member declaration of this type.
    Decl = 1,
    /// An initialization.
    Init = 2,
    /// A function parameter.
    Param = 3,
    /// An implicit or explicit cast.
    Cast = 4,
    /// `sizeof(T)`, `alignof(T)` and friends.
    Sizeof = 5,
}

impl TypeUseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeUseKind::Decl => "decl",
            TypeUseKind::Init => "init",
            TypeUseKind::Param => "param",
            TypeUseKind::Cast => "cast",
            TypeUseKind::Sizeof => "sizeof",
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(v: i64) -> Option<TypeUseKind> {
        match v {
            1 => Some(TypeUseKind::Decl),
            2 => Some(TypeUseKind::Init),
            3 => Some(TypeUseKind::Param),
            4 => Some(TypeUseKind::Cast),
            5 => Some(TypeUseKind::Sizeof),
            _ => None,
        }
    }
}

/// Miscellaneous use of a type at some location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeUseEntry {
    pub base_type: TypeRef,
    pub kind: TypeUseKind,
}

/// Classification of member accesses. The taxonomy exists for the schema but
/// no access tracking is emitted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAccessKind {
    /// Member is read: `return f->a;`
    Load = 1,
    /// Member is written: `f->a = 0;`
    Store = 2,
    /// Read-modify-write in one operation: `f->a *= 2;`
    Rmw = 3,
    /// The member's address is formed: `&f->a`
    Loc = 4,
}

impl MemberAccessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberAccessKind::Load => "load",
            MemberAccessKind::Store => "store",
            MemberAccessKind::Rmw => "rmw",
            MemberAccessKind::Loc => "loc",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrips() {
        for kind in [TypeKind::Struct, TypeKind::Union, TypeKind::Enum] {
            assert_eq!(TypeKind::from_i64(kind.as_i64()), Some(kind));
        }
        for kind in [NameKind::Direct, NameKind::Typedef, NameKind::Var] {
            assert_eq!(NameKind::from_i64(kind.as_i64()), Some(kind));
        }
        assert_eq!(TypeKind::from_i64(0), None);
        assert_eq!(TypeKind::from_i64(4), None);
        assert_eq!(NameKind::from_i64(-1), None);
    }

    #[test]
    fn kind_strings() {
        assert_eq!(TypeKind::Struct.to_string(), "struct");
        assert_eq!(TypeKind::Union.as_str(), "union");
        assert_eq!(NameKind::Var.as_str(), "var");
        assert_eq!(TypeUseKind::Decl.as_str(), "decl");
    }

    #[test]
    fn absent_refs() {
        assert!(TypeRef::NONE.is_none());
        assert!(!TypeRef(1).is_none());
        assert!(FileRef::NONE.is_none());
        assert_eq!(FuncRef::default(), FuncRef::NONE);
    }
}
