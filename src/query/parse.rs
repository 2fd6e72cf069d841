//! Query command parser.
//!
//! Grammar:
//!
//! ```text
//! COMMAND ARGS...
//!
//! COMMAND:
//!   td, typedecl    search for a type declaration
//!   tn, typename    search for the name of a type
//!   md, memberdecl  search for a member declaration
//! ```
//!
//! `typedecl` takes a numeric id or a name; a name may be preceded by one of
//! the elaboration keywords `struct`/`union`/`enum`, which the parser knows
//! make up part of the type's name ("struct foo" is one name). `typename`
//! takes a name. `memberdecl` takes a type search followed by the member
//! name. Searching by id is useful to redo a search whose name was
//! ambiguous.

use tracing::debug;

use crate::model::TypeKind;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no command given")]
    MissingVerb,
    #[error("unknown command '{0}'")]
    UnknownVerb(String),
    #[error("missing argument")]
    MissingArgument,
    #[error("cannot parse '{0}' as a type id")]
    BadTypeId(String),
    #[error("expected a tag after keyword '{0}'")]
    MissingTag(String),
}

/// A name argument, optionally elaborated: a search for any type named
/// "foo" versus one for `struct foo` specifically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameSpec {
    pub elab: Option<TypeKind>,
    pub name: String,
}

/// How to resolve a type: directly by row id, or through its names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSearch {
    Id(i64),
    Name(NameSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSearch {
    pub base: TypeSearch,
    pub member: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCmd {
    TypeDecl(TypeSearch),
    Typename(NameSpec),
    MemberDecl(MemberSearch),
}

/// Turn a command string into its struct representation.
pub fn parse_command(input: &str) -> Result<SearchCmd, ParseError> {
    let mut tokens = input.split([' ', '\t']).filter(|tok| !tok.is_empty());

    let verb = tokens.next().ok_or(ParseError::MissingVerb)?;
    let cmd = match verb {
        "td" | "typedecl" => SearchCmd::TypeDecl(parse_type_search(&mut tokens)?),
        "tn" | "typename" => SearchCmd::Typename(parse_name_spec(&mut tokens)?),
        "md" | "memberdecl" => {
            let base = parse_type_search(&mut tokens)?;
            let member = tokens
                .next()
                .ok_or(ParseError::MissingArgument)?
                .to_string();
            SearchCmd::MemberDecl(MemberSearch { base, member })
        }
        other => return Err(ParseError::UnknownVerb(other.to_string())),
    };

    if let Some(trailing) = tokens.next() {
        debug!(token = trailing, "ignoring trailing token(s)");
    }
    Ok(cmd)
}

/// The first token is one of: a numeric type id (C names cannot start with
/// a digit), an elaboration keyword, or the name itself.
fn parse_type_search<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<TypeSearch, ParseError> {
    let tok = tokens.next().ok_or(ParseError::MissingArgument)?;

    if tok.starts_with(|c: char| c.is_ascii_digit()) {
        // decimal, unsigned, no '+'/'-'
        if !tok.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseError::BadTypeId(tok.to_string()));
        }
        let id: u64 = tok
            .parse()
            .map_err(|_| ParseError::BadTypeId(tok.to_string()))?;
        let id = i64::try_from(id).map_err(|_| ParseError::BadTypeId(tok.to_string()))?;
        return Ok(TypeSearch::Id(id));
    }

    parse_name_spec_from(tok, tokens).map(TypeSearch::Name)
}

fn parse_name_spec<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<NameSpec, ParseError> {
    let tok = tokens.next().ok_or(ParseError::MissingArgument)?;
    parse_name_spec_from(tok, tokens)
}

fn parse_name_spec_from<'a>(
    tok: &str,
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<NameSpec, ParseError> {
    let Some(elab) = str_to_elab(tok) else {
        return Ok(NameSpec {
            elab: None,
            name: tok.to_string(),
        });
    };

    // `tok` is a tag keyword; the next token is the name
    let name = tokens
        .next()
        .ok_or_else(|| ParseError::MissingTag(tok.to_string()))?;
    Ok(NameSpec {
        elab: Some(elab),
        name: name.to_string(),
    })
}

fn str_to_elab(tok: &str) -> Option<TypeKind> {
    match tok {
        "struct" => Some(TypeKind::Struct),
        "union" => Some(TypeKind::Union),
        "enum" => Some(TypeKind::Enum),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verbs_and_aliases() {
        for verb in ["td", "typedecl"] {
            let cmd = parse_command(&format!("{verb} foo")).unwrap();
            assert_eq!(
                cmd,
                SearchCmd::TypeDecl(TypeSearch::Name(NameSpec {
                    elab: None,
                    name: "foo".to_string(),
                }))
            );
        }
        assert!(matches!(
            parse_command("tn foo").unwrap(),
            SearchCmd::Typename(_)
        ));
        assert!(matches!(
            parse_command("memberdecl foo a").unwrap(),
            SearchCmd::MemberDecl(_)
        ));
    }

    #[test]
    fn parses_numeric_ids() {
        assert_eq!(
            parse_command("td 42").unwrap(),
            SearchCmd::TypeDecl(TypeSearch::Id(42))
        );
        assert_eq!(
            parse_command("td 12x").unwrap_err(),
            ParseError::BadTypeId("12x".to_string())
        );
        // out of range for a row id
        assert!(matches!(
            parse_command("td 99999999999999999999"),
            Err(ParseError::BadTypeId(_))
        ));
    }

    #[test]
    fn parses_elaborated_names() {
        assert_eq!(
            parse_command("td struct foo").unwrap(),
            SearchCmd::TypeDecl(TypeSearch::Name(NameSpec {
                elab: Some(TypeKind::Struct),
                name: "foo".to_string(),
            }))
        );
        assert_eq!(
            parse_command("td union").unwrap_err(),
            ParseError::MissingTag("union".to_string())
        );
    }

    #[test]
    fn parses_member_searches() {
        let cmd = parse_command("md struct foo a").unwrap();
        assert_eq!(
            cmd,
            SearchCmd::MemberDecl(MemberSearch {
                base: TypeSearch::Name(NameSpec {
                    elab: Some(TypeKind::Struct),
                    name: "foo".to_string(),
                }),
                member: "a".to_string(),
            })
        );
        let cmd = parse_command("md 3 a").unwrap();
        assert_eq!(
            cmd,
            SearchCmd::MemberDecl(MemberSearch {
                base: TypeSearch::Id(3),
                member: "a".to_string(),
            })
        );
        assert_eq!(
            parse_command("md foo").unwrap_err(),
            ParseError::MissingArgument
        );
    }

    #[test]
    fn rejects_junk() {
        assert_eq!(parse_command("").unwrap_err(), ParseError::MissingVerb);
        assert_eq!(parse_command("  \t ").unwrap_err(), ParseError::MissingVerb);
        assert_eq!(
            parse_command("frobnicate foo").unwrap_err(),
            ParseError::UnknownVerb("frobnicate".to_string())
        );
        assert_eq!(parse_command("td").unwrap_err(), ParseError::MissingArgument);
    }

    #[test]
    fn tolerates_extra_whitespace_and_trailing_tokens() {
        assert_eq!(
            parse_command("td \t  foo  extra").unwrap(),
            SearchCmd::TypeDecl(TypeSearch::Name(NameSpec {
                elab: None,
                name: "foo".to_string(),
            }))
        );
    }
}
