//! Parsers for compiler-emitted dependency files.
//!
//! Two formats: the classic make-rule text gcc emits with `-MMD`, and the
//! JSON document MSVC emits with `/sourceDependencies`. Parse failures are
//! recoverable — the caller warns and proceeds with no extra deps, because
//! a depfile may simply not exist yet on a first build.

use crate::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepFormat {
    #[default]
    Gcc,
    Msvc,
}

impl DepFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "gcc" => Ok(DepFormat::Gcc),
            "msvc" => Ok(DepFormat::Msvc),
            other => Err(Error::validation(format!(
                "invalid dependency file format '{other}'"
            ))),
        }
    }
}

/// Read and parse a depfile into its dependency path list.
pub fn parse_depfile(path: &Path, format: DepFormat) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    match format {
        DepFormat::Gcc => Ok(parse_gcc(&text)),
        DepFormat::Msvc => parse_msvc(&text),
    }
}

/// Parse the first rule of a make-style depfile.
///
/// `\` at end of line continues the rule; `\ ` is a literal space inside a
/// path; everything after the first rule is ignored.
pub fn parse_gcc(text: &str) -> Vec<String> {
    // Collapse the first rule into one logical line.
    let mut line = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('\n') => {
                    chars.next();
                    line.push(' ');
                }
                Some('\r') => {
                    chars.next();
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    line.push(' ');
                }
                _ => line.push(c),
            }
            continue;
        }
        if c == '\n' {
            break;
        }
        line.push(c);
    }

    // Drop the target: everything up to the first colon. A colon inside
    // the dependency list would have to be escaped, which gcc does.
    let deps_text = match line.find(':') {
        Some(pos) => &line[pos + 1..],
        None => return Vec::new(),
    };

    // Tokenize on whitespace, honoring `\ ` escapes.
    let mut deps = Vec::new();
    let mut token = String::new();
    let mut chars = deps_text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(' ') => token.push(' '),
                Some(other) => token.push(other),
                None => {}
            },
            c if c.is_whitespace() => {
                if !token.is_empty() {
                    deps.push(std::mem::take(&mut token));
                }
            }
            c => token.push(c),
        }
    }
    if !token.is_empty() {
        deps.push(token);
    }
    deps
}

#[derive(Deserialize)]
struct MsvcDepfile {
    #[serde(rename = "Data")]
    data: MsvcData,
}

#[derive(Deserialize)]
struct MsvcData {
    #[serde(rename = "Includes", default)]
    includes: Vec<String>,
}

/// Parse the MSVC `/sourceDependencies` JSON format.
pub fn parse_msvc(text: &str) -> Result<Vec<String>> {
    let doc: MsvcDepfile = serde_json::from_str(text)?;
    Ok(doc.data.includes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcc_single_line() {
        let deps = parse_gcc("util.o: util.cpp util.hpp\n");
        assert_eq!(deps, ["util.cpp", "util.hpp"]);
    }

    #[test]
    fn test_gcc_continuation_lines() {
        let deps = parse_gcc("main.o: main.cpp \\\n  util.hpp \\\n  config.hpp\n");
        assert_eq!(deps, ["main.cpp", "util.hpp", "config.hpp"]);
    }

    #[test]
    fn test_gcc_escaped_spaces() {
        let deps = parse_gcc("out.o: my\\ file.cpp other.hpp\n");
        assert_eq!(deps, ["my file.cpp", "other.hpp"]);
    }

    #[test]
    fn test_gcc_first_rule_only() {
        let deps = parse_gcc("a.o: a.cpp\nb.o: b.cpp\n");
        assert_eq!(deps, ["a.cpp"]);
    }

    #[test]
    fn test_gcc_no_rule() {
        assert!(parse_gcc("garbage without a colon\n").is_empty());
    }

    #[test]
    fn test_msvc_includes() {
        let text = r#"{
            "Version": "1.2",
            "Data": {
                "Source": "util.cpp",
                "Includes": ["C:\\src\\util.hpp", "C:\\src\\base.hpp"]
            }
        }"#;
        let deps = parse_msvc(text).unwrap();
        assert_eq!(deps, ["C:\\src\\util.hpp", "C:\\src\\base.hpp"]);
    }

    #[test]
    fn test_msvc_malformed_is_error() {
        assert!(parse_msvc("not json at all").is_err());
    }

    #[test]
    fn test_depformat_parse() {
        assert_eq!(DepFormat::parse("gcc").unwrap(), DepFormat::Gcc);
        assert_eq!(DepFormat::parse("msvc").unwrap(), DepFormat::Msvc);
        assert!(DepFormat::parse("clang").is_err());
    }
}
