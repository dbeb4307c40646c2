//! Context path (cpath) normalization and file name sanitization.
//!
//! A cpath is `/`-delimited and case-sensitive. Its normalized form has no
//! empty segments and a single leading `/`; the empty string names the
//! synthetic listing of all mounted roots. `..` is never resolved upward: any
//! occurrence rejects the whole path.

use crate::errors::CoreError;
use std::fmt;

/// Longest file name segment accepted, in bytes.
pub const MAX_NAME_BYTES: usize = 255;

/// Characters that may never appear in a file name segment.
pub const ILLEGAL_NAME_CHARS: [char; 5] = ['[', ']', '\u{7f}', '\\', '\0'];

/// One problem found while validating a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathProblem {
    ParentSegment,
    IllegalChar { segment: String, ch: char },
    NameTooLong { segment: String, len: usize },
}

impl fmt::Display for PathProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParentSegment => write!(f, "'..' segments are not allowed"),
            Self::IllegalChar { segment, ch } => {
                write!(f, "illegal character {:?} in {segment:?}", ch)
            }
            Self::NameTooLong { segment, len } => {
                write!(f, "name {segment:?} is {len} bytes, limit is {MAX_NAME_BYTES}")
            }
        }
    }
}

/// Result of non-strict validation: every problem in the path, at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub normalized: String,
    pub problems: Vec<PathProblem>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn into_result(self) -> crate::Result<String> {
        match self.problems.first() {
            None => Ok(self.normalized),
            Some(problem) => Err(CoreError::path_invalid(format!(
                "{}: {}",
                self.normalized, problem
            ))),
        }
    }
}

fn name_problems(segment: &str, out: &mut Vec<PathProblem>, stop_at_first: bool) {
    if segment == ".." {
        out.push(PathProblem::ParentSegment);
        return;
    }
    for ch in segment.chars() {
        if ILLEGAL_NAME_CHARS.contains(&ch) {
            out.push(PathProblem::IllegalChar {
                segment: segment.to_string(),
                ch,
            });
            if stop_at_first {
                return;
            }
        }
    }
    if segment.len() > MAX_NAME_BYTES {
        out.push(PathProblem::NameTooLong {
            segment: segment.to_string(),
            len: segment.len(),
        });
    }
}

fn scan(input: &str, stop_at_first: bool) -> Validation {
    let mut problems = Vec::new();
    let mut segments = Vec::new();
    for segment in input.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        name_problems(segment, &mut problems, stop_at_first);
        if stop_at_first && !problems.is_empty() {
            break;
        }
        segments.push(segment);
    }
    let normalized = if segments.is_empty() {
        String::new()
    } else {
        format!("/{}", segments.join("/"))
    };
    Validation {
        normalized,
        problems,
    }
}

/// Non-strict validation: keeps going so all problems are reported together.
pub fn validate(input: &str) -> Validation {
    scan(input, false)
}

/// Strict validation: fails on the first violation.
pub fn normalize(input: &str) -> crate::Result<String> {
    scan(input, true).into_result()
}

/// Checks a single file name segment.
pub fn check_name(name: &str) -> crate::Result<()> {
    if name.is_empty() || name == "." || name.contains('/') {
        return Err(CoreError::path_invalid(format!("{name:?} is not a file name")));
    }
    let mut problems = Vec::new();
    name_problems(name, &mut problems, true);
    match problems.into_iter().next() {
        None => Ok(()),
        Some(problem) => Err(CoreError::path_invalid(problem.to_string())),
    }
}

pub fn is_valid_name(name: &str) -> bool {
    check_name(name).is_ok()
}

/// Normalizes a root-relative path (no leading `/`, `""` for the root).
pub fn normalize_relative(input: &str) -> crate::Result<String> {
    normalize(input).map(|cpath| cpath.trim_start_matches('/').to_string())
}

/// Joins a relative parent and a child name.
pub fn join(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{}/{}", parent.trim_end_matches('/'), child),
    }
}

/// Splits a relative path into (parent, name). The root has no parent.
pub fn split_parent(rpath: &str) -> Option<(&str, &str)> {
    let rpath = rpath.trim_matches('/');
    if rpath.is_empty() {
        return None;
    }
    Some(match rpath.rfind('/') {
        Some(idx) => (&rpath[..idx], &rpath[idx + 1..]),
        None => ("", rpath),
    })
}

pub fn file_name(rpath: &str) -> &str {
    split_parent(rpath).map(|(_, name)| name).unwrap_or("")
}

/// Extension of a file name, without the dot. Leading-dot names have none.
pub fn extension(name: &str) -> Option<&str> {
    let idx = name.rfind('.')?;
    if idx == 0 || idx + 1 == name.len() {
        return None;
    }
    Some(&name[idx + 1..])
}

/// True when `rpath` equals `ancestor` or lies beneath it.
pub fn is_within(rpath: &str, ancestor: &str) -> bool {
    let rpath = rpath.trim_matches('/');
    let ancestor = ancestor.trim_matches('/');
    ancestor.is_empty()
        || rpath == ancestor
        || (rpath.starts_with(ancestor) && rpath.as_bytes().get(ancestor.len()) == Some(&b'/'))
}
