//! Compilation database loading.
//!
//! A `compile_commands.json` is a JSON array describing how to compile every
//! source file in a project. Despite the name there is nothing database-like
//! about it. Each entry carries either an `arguments` array or a flat
//! `command` string.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct CompileCommand {
    pub directory: PathBuf,
    pub file: PathBuf,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub command: Option<String>,
}

/// Load `compile_commands.json` from `build_dir`.
pub fn load_compile_commands(build_dir: &Path) -> Result<Vec<CompileCommand>> {
    let path = build_dir.join("compile_commands.json");
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading compilation database {}", path.display()))?;
    let commands: Vec<CompileCommand> = serde_json::from_str(&content)
        .with_context(|| format!("parsing compilation database {}", path.display()))?;
    Ok(commands)
}

impl CompileCommand {
    /// Absolute path of the source file this command compiles.
    pub fn source_path(&self) -> PathBuf {
        if self.file.is_absolute() {
            self.file.clone()
        } else {
            self.directory.join(&self.file)
        }
    }

    /// The command's compile arguments adapted for handing to the parser:
    /// the compiler executable, `-c`, `-o OUT` and the source operand are
    /// stripped, the rest passes through in order.
    pub fn parse_arguments(&self) -> Vec<String> {
        let raw: Vec<String> = if !self.arguments.is_empty() {
            self.arguments.clone()
        } else {
            self.command
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect()
        };

        let file_name = self.file.to_string_lossy();
        let mut args = Vec::new();
        let mut iter = raw.into_iter();
        // argv[0] is the compiler
        let _ = iter.next();
        while let Some(arg) = iter.next() {
            if arg == "-c" {
                continue;
            }
            if arg == "-o" {
                let _ = iter.next();
                continue;
            }
            if arg == file_name || Path::new(&arg) == self.source_path() {
                continue;
            }
            args.push(arg);
        }
        debug!(file = %self.file.display(), args = ?args, "compile command arguments");
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_flat_command_strings() {
        let cmd = CompileCommand {
            directory: PathBuf::from("/proj"),
            file: PathBuf::from("a.c"),
            arguments: vec![],
            command: Some("cc -I/proj/include -DFOO=1 -c -o a.o a.c".to_string()),
        };
        assert_eq!(cmd.parse_arguments(), vec!["-I/proj/include", "-DFOO=1"]);
        assert_eq!(cmd.source_path(), PathBuf::from("/proj/a.c"));
    }

    #[test]
    fn prefers_argument_arrays() {
        let cmd = CompileCommand {
            directory: PathBuf::from("/proj"),
            file: PathBuf::from("/proj/b.c"),
            arguments: ["clang", "-std=c11", "-c", "/proj/b.c"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            command: Some("ignored".to_string()),
        };
        assert_eq!(cmd.parse_arguments(), vec!["-std=c11"]);
        assert_eq!(cmd.source_path(), PathBuf::from("/proj/b.c"));
    }

    #[test]
    fn loads_a_database() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("compile_commands.json"),
            r#"[{"directory": "/proj", "file": "a.c", "command": "cc -c a.c"}]"#,
        )
        .unwrap();
        let commands = load_compile_commands(dir.path()).unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].file, PathBuf::from("a.c"));

        assert!(load_compile_commands(&dir.path().join("missing")).is_err());
    }
}
