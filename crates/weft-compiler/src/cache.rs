//! The caching compiler seam.
//!
//! Source parsing and code generation live outside this engine; the
//! [`CachingCompiler`] trait is the contract the compile driver consumes.
//! [`PassthroughCompiler`] is the built-in stand-in: it resolves the
//! source type for unambiguous hints with a lightweight syntax scan and
//! records the rewrites a real compiler would have applied.

use std::path::PathBuf;

use weft_eval::HostError;
use weft_registry::{CompileData, Entry, SourceHint, SourcePos, SourceType, Transforms};

/// Options handed to the caching compiler for one compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub cache_key: String,
    pub cache_path: Option<PathBuf>,
    /// Dynamic-module helper variables enabled for this entry.
    pub helper_vars: bool,
    pub filename: PathBuf,
    pub hint: SourceHint,
    pub mtime: Option<i64>,
    pub runtime_name: String,
    /// Source type resolved so far; the compiler settles unambiguous hints.
    pub source_type: SourceType,
    /// Whether a top-level return statement is legal.
    pub top_level_return: bool,
}

/// Collaborator that turns source text into a compiled artifact, or
/// resolves one from its own cache by identity.
pub trait CachingCompiler {
    fn compile(&mut self, source: &str, options: &CompileOptions)
        -> Result<CompileData, HostError>;

    /// Resolve an artifact for the entry from an existing cache.
    fn from_cache(&mut self, entry: &Entry) -> Option<CompileData>;
}

/// Built-in compiler stand-in: no real codegen, just source-type
/// resolution and transform bookkeeping.
#[derive(Debug, Default)]
pub struct PassthroughCompiler;

impl PassthroughCompiler {
    fn looks_declarative(source: &str) -> bool {
        source.lines().any(|line| {
            let line = line.trim_start();
            line.starts_with("import ") || line.starts_with("export ")
        })
    }
}

impl CachingCompiler for PassthroughCompiler {
    fn compile(
        &mut self,
        source: &str,
        options: &CompileOptions,
    ) -> Result<CompileData, HostError> {
        let source_type = match options.hint {
            SourceHint::Module => SourceType::Module,
            SourceHint::Script => SourceType::Script,
            SourceHint::Unambiguous => {
                if Self::looks_declarative(source) {
                    SourceType::Module
                } else {
                    SourceType::Script
                }
            }
        };

        let mut data = CompileData::new(source_type);
        match source_type {
            SourceType::Module => {
                let mut transforms = Transforms::empty();
                if source.contains("import ") {
                    transforms |= Transforms::IMPORT_REWRITE;
                }
                if source.contains("export ") {
                    transforms |= Transforms::EXPORT_REWRITE;
                }
                data.transforms = transforms;
                data.code = Some(source.to_string());
                data.code_with_tdz = Some(format!("'use deferred';\n{}", source));
                data.first_await_outside_function = first_top_level_await(source);
            }
            SourceType::Script => {
                data.transforms = Transforms::EVAL_WRAP;
                data.code = Some(format!("(0,eval)({:?})", source));
            }
        }
        Ok(data)
    }

    fn from_cache(&mut self, _entry: &Entry) -> Option<CompileData> {
        None
    }
}

/// Locate the first `await` keyword outside any function body.
///
/// Brace depth stands in for function nesting; good enough for the
/// passthrough compiler, which never sees real module syntax trees.
fn first_top_level_await(source: &str) -> Option<SourcePos> {
    let mut depth: i32 = 0;
    for (line_index, line) in source.lines().enumerate() {
        let bytes = line.as_bytes();
        let mut column = 0;
        while column < bytes.len() {
            match bytes[column] {
                b'{' => depth += 1,
                b'}' => depth = depth.saturating_sub(1),
                b'a' if depth == 0 => {
                    let boundary_before =
                        column == 0 || !is_ident_byte(bytes[column - 1]);
                    let end = column + 5;
                    let boundary_after =
                        end >= bytes.len() || !is_ident_byte(bytes[end]);
                    if boundary_before
                        && boundary_after
                        && line[column..].starts_with("await")
                    {
                        return Some(SourcePos {
                            line: line_index as u32 + 1,
                            column: column as u32,
                        });
                    }
                }
                _ => {}
            }
            column += 1;
        }
    }
    None
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(hint: SourceHint) -> CompileOptions {
        CompileOptions {
            cache_key: "a".to_string(),
            cache_path: None,
            helper_vars: false,
            filename: PathBuf::from("/src/a"),
            hint,
            mtime: None,
            runtime_name: "__weft".to_string(),
            source_type: SourceType::Script,
            top_level_return: true,
        }
    }

    #[test]
    fn test_unambiguous_detects_module() {
        let data = PassthroughCompiler
            .compile("import x from 'y'\nexport var a = 1", &options(SourceHint::Unambiguous))
            .unwrap();
        assert_eq!(data.source_type, Some(SourceType::Module));
        assert!(data.transforms.contains(Transforms::IMPORT_REWRITE));
        assert!(data.transforms.contains(Transforms::EXPORT_REWRITE));
        assert!(data.code_with_tdz.is_some());
    }

    #[test]
    fn test_unambiguous_defaults_to_script() {
        let data = PassthroughCompiler
            .compile("var a = 1", &options(SourceHint::Unambiguous))
            .unwrap();
        assert_eq!(data.source_type, Some(SourceType::Script));
        assert_eq!(data.transforms, Transforms::EVAL_WRAP);
    }

    #[test]
    fn test_script_hint_wraps_in_eval() {
        let data = PassthroughCompiler
            .compile("var a = 1", &options(SourceHint::Script))
            .unwrap();
        assert_eq!(data.code.as_deref(), Some("(0,eval)(\"var a = 1\")"));
    }

    #[test]
    fn test_first_await_location() {
        let source = "var a = 1\nawait ready()\n";
        let pos = first_top_level_await(source).unwrap();
        assert_eq!((pos.line, pos.column), (2, 0));
    }

    #[test]
    fn test_await_inside_function_ignored() {
        let source = "function f() {\n  await inner()\n}\n";
        assert!(first_top_level_await(source).is_none());
    }

    #[test]
    fn test_await_as_identifier_prefix_ignored() {
        assert!(first_top_level_await("var awaiting = 1").is_none());
        assert!(first_top_level_await("var re_await = 1").is_none());
    }
}
