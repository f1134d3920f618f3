//! Editing text files on a host with `sed`.
//!
//! Patterns are POSIX extended regular expressions as understood by `sed -r`. We also compile
//! them locally (with the `regex` crate) to validate them and to see which lines they will touch
//! before changing anything, so patterns must stay within the syntax both agree on.

use log::{debug, info, warn};

use regex::Regex;

use crate::error::BenchError;
use crate::quote_for_bash;
use crate::remote::Host;

/// What to do when a pattern matches no line of the file (or the file does not exist).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MatchPolicy {
    /// Log a warning and leave the file alone.
    Warn,
    /// Fail with `BenchError::NoMatch`.
    Require,
}

/// A `sed` substitution: every line matching `pattern` has its first match replaced by
/// `replacement`, in which `\1`..`\9` refer to groups of the match and `&` to all of it.
#[derive(Debug, Clone)]
pub struct Substitution {
    pattern: String,
    replacement: String,
    delimiter: char,
    regex: Regex,
}

impl Substitution {
    pub fn new(pattern: &str, replacement: &str, delimiter: char) -> Result<Self, BenchError> {
        if pattern.contains(delimiter) || replacement.contains(delimiter) {
            return Err(BenchError::DelimiterCollision {
                delimiter,
                pattern: pattern.into(),
                replacement: replacement.into(),
            });
        }

        // `sed` works line by line.
        if pattern.contains('\n') || replacement.contains('\n') {
            return Err(BenchError::InvalidPattern {
                pattern: pattern.into(),
                cause: "patterns and replacements must fit on one line".into(),
            });
        }

        let regex = Regex::new(pattern).map_err(|err| BenchError::InvalidPattern {
            pattern: pattern.into(),
            cause: err.to_string(),
        })?;

        Ok(Substitution {
            pattern: pattern.into(),
            replacement: replacement.into(),
            delimiter,
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The `sed` script, e.g. `s|foo|bar|`.
    pub fn sed_script(&self) -> String {
        format!(
            "s{d}{}{d}{}{d}",
            self.pattern,
            self.replacement,
            d = self.delimiter
        )
    }

    /// The command that applies the substitution to `path` in place.
    pub fn sed_command(&self, path: &str) -> String {
        format!("sed -i -r {} {}", quote_for_bash(&self.sed_script()), path)
    }

    /// What `sed` will do to `text`: `(before, after)` for every matching line.
    pub fn preview(&self, text: &str) -> Vec<(String, String)> {
        let replacement = self.regex_replacement();
        text.lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| self.regex.is_match(line))
            .map(|line| {
                let after = self.regex.replacen(line, 1, replacement.as_str());
                (line.to_owned(), after.into_owned())
            })
            .collect()
    }

    /// Translate the `sed` replacement into `regex` replacement syntax.
    fn regex_replacement(&self) -> String {
        let mut out = String::with_capacity(self.replacement.len() + 8);
        let mut chars = self.replacement.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(d) if d.is_ascii_digit() => {
                        out.push_str("${");
                        out.push(d);
                        out.push('}');
                    }
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('$') => out.push_str("$$"),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                },
                '&' => out.push_str("${0}"),
                '$' => out.push_str("$$"),
                c => out.push(c),
            }
        }
        out
    }
}

/// Replace text in `path` on `host`. Returns the number of lines that matched.
///
/// `delimiter` separates the parts of the `sed` script and must not appear in `pattern` or
/// `replacement` (e.g. use `|` when they contain paths).
pub fn replace_text(
    host: &Host,
    pattern: &str,
    replacement: &str,
    path: &str,
    delimiter: char,
    policy: MatchPolicy,
) -> Result<usize, failure::Error> {
    let sub = Substitution::new(pattern, replacement, delimiter)?;

    let contents = host
        .run(rcmd!("[ -f {} ] && cat {}", path, path).no_pty().allow_error())?
        .stdout;
    let changes = sub.preview(&contents);

    if changes.is_empty() {
        match policy {
            MatchPolicy::Warn => {
                warn!(
                    "[{}] `{}` matches nothing in {}; leaving it unchanged",
                    host.name(),
                    pattern,
                    path
                );
                return Ok(0);
            }
            MatchPolicy::Require => {
                return Err(BenchError::NoMatch {
                    path: path.into(),
                    pattern: pattern.into(),
                }
                .into());
            }
        }
    }

    for (before, after) in changes.iter() {
        debug!("{}: `{}` -> `{}`", path, before.trim(), after.trim());
    }

    host.run(rcmd!("{}", sub.sed_command(path)))?;
    info!(
        "[{}] patched {} line(s) of {}",
        host.name(),
        changes.len(),
        path
    );

    Ok(changes.len())
}
