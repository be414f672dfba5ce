//! Candid argument templates for dfxtest
//!
//! A template is plain text with `{name}` placeholders. Rendering either
//! resolves every placeholder or fails without producing any output.

use dfxtest_model::{SourceMap, Span};
use lexer::{Lexer, Token};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub mod lexer;
pub mod variables;

pub use variables::VariableContext;

/// Extension of rendered argument files
pub const ARGS_EXTENSION: &str = "candid";

/// Name used in error messages for templates that did not come from a file
const INLINE_TEMPLATE: &str = "<template>";

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error("cannot read template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write rendered arguments to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{template}:{line}:{column}: unterminated placeholder `{text}`")]
    Malformed {
        template: String,
        text: String,
        span: Span,
        line: usize,
        column: usize,
    },

    #[error("{template}: no value for placeholder(s) {}", .names.join(", "))]
    MissingVariables { template: String, names: Vec<String> },
}

impl TemplateError {
    #[must_use]
    pub fn malformed(text: &str, span: Span, source_map: &SourceMap, template: &str) -> Self {
        let pos = source_map.position(span.start);
        Self::Malformed {
            template: template.to_string(),
            text: text.to_string(),
            span,
            line: pos.line,
            column: pos.column,
        }
    }
}

/// Piece of a parsed template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Placeholder { name: &'a str, span: Span },
}

/// Split template text into literals and placeholders
///
/// # Errors
///
/// Returns `TemplateError::Malformed` for a `{name` that is not closed and is
/// not the start of a Candid record field (`{name = ..`, `{name : ..`,
/// `{name; ..`)
pub fn parse<'a>(source: &'a str, template: &str) -> Result<Vec<Segment<'a>>, TemplateError> {
    let tokens = Lexer::new(source).tokenize();
    let mut segments = Vec::with_capacity(tokens.len());

    for (index, token) in tokens.iter().enumerate() {
        match token.token {
            Token::Placeholder => {
                let name = token.placeholder_name().unwrap_or_default();
                segments.push(Segment::Placeholder {
                    name,
                    span: token.span,
                });
            }
            Token::OpenPlaceholder => {
                let record_field = tokens
                    .get(index + 1)
                    .is_some_and(|next| next.token == Token::Text && starts_field(next.text));
                if !record_field {
                    return Err(TemplateError::malformed(
                        token.text,
                        token.span,
                        &SourceMap::new(source),
                        template,
                    ));
                }
                segments.push(Segment::Literal(token.text));
            }
            Token::Lbrace | Token::Newline | Token::Text => {
                segments.push(Segment::Literal(token.text));
            }
            Token::Eof => break,
        }
    }

    Ok(segments)
}

/// Whether text after `{name` reads as a Candid field, e.g. `{name = 1}` or `{nat; nat}`
fn starts_field(text: &str) -> bool {
    text.trim_start_matches([' ', '\t'])
        .starts_with(['=', ':', ';'])
}

/// Distinct placeholder names used by a template, sorted
///
/// # Errors
///
/// Returns `TemplateError::Malformed` if the template cannot be parsed
pub fn placeholders(source: &str) -> Result<Vec<String>, TemplateError> {
    let names: BTreeSet<&str> = parse(source, INLINE_TEMPLATE)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder { name, .. } => Some(name),
            Segment::Literal(_) => None,
        })
        .collect();
    Ok(names.into_iter().map(str::to_string).collect())
}

/// Render template text held in memory
///
/// # Errors
///
/// Returns `TemplateError` if the template is malformed or uses a
/// placeholder with no value in `vars`
pub fn render_str(source: &str, vars: &VariableContext) -> Result<String, TemplateError> {
    render_named(source, vars, INLINE_TEMPLATE)
}

fn render_named(
    source: &str,
    vars: &VariableContext,
    template: &str,
) -> Result<String, TemplateError> {
    let segments = parse(source, template)?;

    let mut missing = BTreeSet::new();
    let mut output = String::with_capacity(source.len());
    for segment in &segments {
        match segment {
            Segment::Literal(text) => output.push_str(text),
            Segment::Placeholder { name, .. } => match vars.get(name) {
                Some(value) => output.push_str(value),
                None => {
                    missing.insert(*name);
                }
            },
        }
    }

    if missing.is_empty() {
        Ok(output)
    } else {
        Err(TemplateError::MissingVariables {
            template: template.to_string(),
            names: missing.into_iter().map(str::to_string).collect(),
        })
    }
}

/// Render `template_path` into `output_path`
///
/// On failure nothing is written and any earlier output at `output_path` is
/// removed, so a stale argument file is never picked up by a later deploy.
///
/// # Errors
///
/// Returns `TemplateError` if the template cannot be read, rendered or written
pub fn render_file(
    template_path: &Path,
    vars: &VariableContext,
    output_path: &Path,
) -> Result<(), TemplateError> {
    let result = fs::read_to_string(template_path)
        .map_err(|source| TemplateError::Read {
            path: template_path.to_path_buf(),
            source,
        })
        .and_then(|source| render_named(&source, vars, &template_path.display().to_string()));

    let rendered = match result {
        Ok(rendered) => rendered,
        Err(err) => {
            discard_stale_output(output_path);
            return Err(err);
        }
    };

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| TemplateError::Write {
            path: output_path.to_path_buf(),
            source,
        })?;
    }
    fs::write(output_path, rendered).map_err(|source| TemplateError::Write {
        path: output_path.to_path_buf(),
        source,
    })?;

    debug!(
        template = %template_path.display(),
        output = %output_path.display(),
        "rendered template"
    );
    Ok(())
}

/// Where the rendered arguments of `template_path` live: `<args_dir>/<stem>.candid`
#[must_use]
pub fn output_path_for(template_path: &Path, args_dir: &Path) -> PathBuf {
    let stem = template_path
        .file_stem()
        .map_or_else(|| "args".into(), |stem| stem.to_string_lossy());
    args_dir.join(format!("{stem}.{ARGS_EXTENSION}"))
}

/// Render `template_path` into the args directory and return the output path
///
/// # Errors
///
/// Returns `TemplateError` if the template cannot be read, rendered or written
pub fn render_to_dir(
    template_path: &Path,
    vars: &VariableContext,
    args_dir: &Path,
) -> Result<PathBuf, TemplateError> {
    let output_path = output_path_for(template_path, args_dir);
    render_file(template_path, vars, &output_path)?;
    Ok(output_path)
}

fn discard_stale_output(output_path: &Path) {
    match fs::remove_file(output_path) {
        Ok(()) => debug!(output = %output_path.display(), "removed stale rendered arguments"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => debug!(output = %output_path.display(), %err, "could not remove stale output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> VariableContext {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_render_record() {
        let rendered = render_str(
            r#"( record { name = "{name}"; } )"#,
            &vars(&[("name", "demo")]),
        )
        .unwrap();
        assert_eq!(rendered, r#"( record { name = "demo"; } )"#);
    }

    #[test]
    fn test_render_repeated_and_multiline() {
        let source = "(\n  principal \"{owner}\",\n  principal \"{owner}\",\n  record {}\n)\n";
        let rendered = render_str(source, &vars(&[("owner", "aaaaa-aa")])).unwrap();
        assert_eq!(
            rendered,
            "(\n  principal \"aaaaa-aa\",\n  principal \"aaaaa-aa\",\n  record {}\n)\n"
        );
    }

    #[test]
    fn test_render_without_placeholders_is_identity() {
        let source = "( record { fee = 10_000 : nat } )";
        assert_eq!(render_str(source, &VariableContext::new()).unwrap(), source);
    }

    #[test]
    fn test_unused_variables_are_ignored() {
        let rendered = render_str("{a}", &vars(&[("a", "1"), ("b", "2")])).unwrap();
        assert_eq!(rendered, "1");
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        let err = render_str("{owner} {minter} {owner} {fee}", &vars(&[("fee", "1")])).unwrap_err();
        match err {
            TemplateError::MissingVariables { names, .. } => {
                assert_eq!(names, vec!["minter", "owner"]);
            }
            other => panic!("Expected MissingVariables, got {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_placeholder_reports_position() {
        let err = render_str("( record {\n  owner = {owner\n} )", &vars(&[("owner", "x")]))
            .unwrap_err();
        match err {
            TemplateError::Malformed {
                text, line, column, ..
            } => {
                assert_eq!(text, "{owner");
                assert_eq!(line, 2);
                assert_eq!(column, 11);
            }
            other => panic!("Expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_placeholder_at_end_of_input() {
        assert!(matches!(
            render_str("value = {owner", &VariableContext::new()),
            Err(TemplateError::Malformed { .. })
        ));
        assert!(matches!(
            render_str("{owner{fee}", &VariableContext::new()),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_unclosed_placeholder_inside_string() {
        let err = render_str(
            "( record { owner = principal \"{owner\" } )",
            &vars(&[("owner", "aaaaa-aa")]),
        )
        .unwrap_err();
        match err {
            TemplateError::Malformed { text, line, column, .. } => {
                assert_eq!(text, "{owner");
                assert_eq!((line, column), (1, 31));
            }
            other => panic!("Expected Malformed, got {other:?}"),
        }
        assert!(matches!(
            render_str("( {owner, 1 )", &VariableContext::new()),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_candid_field_labels_are_not_placeholders() {
        let source = "record {fee : nat = 10}; record {nat; nat}; record {a=1}";
        assert_eq!(render_str(source, &VariableContext::new()).unwrap(), source);
    }

    #[test]
    fn test_candid_braces_stay_literal() {
        // `{name = ...` is a Candid record field, not a placeholder
        let source = "record {name = \"{name}\"}";
        let rendered = render_str(source, &vars(&[("name", "demo")])).unwrap();
        assert_eq!(rendered, "record {name = \"demo\"}");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("{b} record { x = {a} } {b}").unwrap(),
            vec!["a", "b"]
        );
        assert!(placeholders("record {}").unwrap().is_empty());
    }

    #[test]
    fn test_error_messages() {
        let err = render_str("{a}{b}", &VariableContext::new()).unwrap_err();
        assert_eq!(err.to_string(), "<template>: no value for placeholder(s) a, b");

        let err = render_str("{a", &VariableContext::new()).unwrap_err();
        assert_eq!(err.to_string(), "<template>:1:1: unterminated placeholder `{a`");
    }

    #[test]
    fn test_render_to_dir() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("ledger.template");
        fs::write(&template, "( record { minter = principal \"{minter}\" } )").unwrap();

        let args_dir = dir.path().join("args");
        let output = render_to_dir(&template, &vars(&[("minter", "aaaaa-aa")]), &args_dir).unwrap();

        assert_eq!(output, args_dir.join("ledger.candid"));
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "( record { minter = principal \"aaaaa-aa\" } )"
        );
    }

    #[test]
    fn test_missing_key_writes_nothing_and_removes_stale_output() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("ledger.template");
        fs::write(&template, "( principal \"{minter}\" )").unwrap();

        let args_dir = dir.path().join("args");
        fs::create_dir_all(&args_dir).unwrap();
        let stale = args_dir.join("ledger.candid");
        fs::write(&stale, "( principal \"old\" )").unwrap();

        let result = render_to_dir(&template, &VariableContext::new(), &args_dir);

        assert!(matches!(result, Err(TemplateError::MissingVariables { .. })));
        assert!(!stale.exists());
    }

    #[test]
    fn test_missing_template_file() {
        let dir = TempDir::new().unwrap();
        let result = render_to_dir(
            &dir.path().join("absent.template"),
            &VariableContext::new(),
            dir.path(),
        );
        assert!(matches!(result, Err(TemplateError::Read { .. })));
        assert!(!dir.path().join("absent.candid").exists());
    }

    proptest! {
        #[test]
        fn complete_mapping_leaves_no_placeholders(
            names in proptest::collection::btree_set("[a-z_][a-z0-9_]{0,8}", 1..6),
            value in "[a-zA-Z0-9 -]{0,12}",
        ) {
            let source = names
                .iter()
                .map(|name| format!("field_{name} = \"{{{name}}}\";"))
                .collect::<Vec<_>>()
                .join("\n");
            let source = format!("( record {{\n{source}\n}} )");
            let context: VariableContext =
                names.iter().map(|name| (name.clone(), value.clone())).collect();

            let rendered = render_str(&source, &context).unwrap();

            prop_assert!(placeholders(&rendered).unwrap().is_empty());
        }
    }
}
