//! Template Renderer.
//!
//! Expands `{{NAME}}` placeholders in a stored template. Each placeholder is resolved, in
//! order of preference, from a caller `KEY:VALUE` argument, the environment, or an
//! interactive secret prompt. Substituted values are inserted verbatim and never re-scanned.
//! Caller arguments that are not `KEY:VALUE` pairs are appended after substitution.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    error::RenderError,
    secrets::{EnvLookup, SecretPrompt},
};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A placeholder occurrence inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    /// Byte offset of `{{`.
    start: usize,
    /// Byte offset just past `}}`.
    end: usize,
    name: &'a str,
}

/// Scans `template` for `{{NAME}}` tokens where `NAME` is a non-empty run without braces.
fn tokens(template: &str) -> Vec<Token<'_>> {
    let mut found = Vec::new();
    let mut offset = 0;

    while let Some(relative) = template[offset..].find(OPEN) {
        let start = offset + relative;
        let name_start = start + OPEN.len();
        let name_len = template[name_start..].find(['{', '}']).unwrap_or(template.len() - name_start);
        let name_end = name_start + name_len;

        if name_len > 0 && template[name_end..].starts_with(CLOSE) {
            let end = name_end + CLOSE.len();
            found.push(Token {
                start,
                end,
                name: &template[name_start..name_end],
            });
            offset = end;
        } else {
            // Not a token; rescan from the next character so `{{{A}}` still finds `{{A}}`.
            offset = start + 1;
        }
    }

    found
}

/// Distinct placeholder names in order of first appearance.
///
/// ```rust
/// use hiproc_engine::templates::placeholders;
///
/// assert_eq!(placeholders("scp {{FILE}} {{HOST}}:{{FILE}}"), vec!["FILE", "HOST"]);
/// ```
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for token in tokens(template) {
        if !names.contains(&token.name) {
            names.push(token.name);
        }
    }
    names
}

/// Caller arguments split into named values and passthrough words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArguments {
    /// `KEY:VALUE` pairs. A repeated key keeps its last value.
    pub named: IndexMap<String, String>,
    /// Everything else, in the order given.
    pub passthrough: Vec<String>,
}

impl ParsedArguments {
    pub fn parse<S: AsRef<str>>(arguments: &[S]) -> Self {
        let mut parsed = Self::default();
        for argument in arguments {
            let argument = argument.as_ref();
            match split_named_argument(argument) {
                Some((key, value)) => {
                    parsed.named.insert(key.to_string(), value.to_string());
                }
                None => parsed.passthrough.push(argument.to_string()),
            }
        }
        parsed
    }
}

/// Splits `KEY:VALUE`, where `KEY` is a non-empty run of letters, digits, `_`, `-` or `.`
/// that does not start with `-`. URL-like values (`scheme://...`) are not named arguments.
pub fn split_named_argument(argument: &str) -> Option<(&str, &str)> {
    let (key, value) = argument.split_once(':')?;
    let valid_key = !key.is_empty()
        && !key.starts_with('-')
        && key.chars().all(|character| character.is_ascii_alphanumeric() || matches!(character, '_' | '-' | '.'));
    (valid_key && !value.starts_with("//")).then_some((key, value))
}

/// Where a placeholder value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Argument,
    Environment,
    Prompt,
}

/// Result of a successful render. The rendered text may contain secrets and must not be logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Source of each placeholder value, in order of first appearance.
    pub sources: IndexMap<String, ValueSource>,
}

impl std::fmt::Debug for Rendered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendered")
            .field("text", &"[REDACTED]")
            .field("sources", &self.sources)
            .finish()
    }
}

/// Expand `template` against `arguments`, `env` and `prompt`.
///
/// Named arguments whose key is not a placeholder are dropped. The prompt is asked at most
/// once per distinct placeholder name. If it yields nothing, rendering fails with
/// [`RenderError::UnresolvedPlaceholder`] and no partial result is returned.
pub fn render(template: &str, arguments: &ParsedArguments, env: &dyn EnvLookup, prompt: &dyn SecretPrompt) -> Result<Rendered, RenderError> {
    let found = tokens(template);

    let mut values: HashMap<&str, String> = HashMap::new();
    let mut sources = IndexMap::new();
    for token in &found {
        if values.contains_key(token.name) {
            continue;
        }
        let (value, source) = if let Some(value) = arguments.named.get(token.name) {
            (value.clone(), ValueSource::Argument)
        } else if let Some(value) = env.lookup(token.name) {
            (value, ValueSource::Environment)
        } else {
            debug!(placeholder = token.name, "prompting for secret");
            let value = prompt
                .prompt_secret(token.name)
                .ok_or_else(|| RenderError::UnresolvedPlaceholder(token.name.to_string()))?;
            (value, ValueSource::Prompt)
        };
        values.insert(token.name, value);
        sources.insert(token.name.to_string(), source);
    }

    let mut text = String::with_capacity(template.len());
    let mut cursor = 0;
    for token in &found {
        text.push_str(&template[cursor..token.start]);
        if let Some(value) = values.get(token.name) {
            text.push_str(value);
        }
        cursor = token.end;
    }
    text.push_str(&template[cursor..]);

    if !arguments.passthrough.is_empty() {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&arguments.passthrough.join(" "));
    }

    let dropped = arguments.named.keys().filter(|key| !values.contains_key(key.as_str())).count();
    if dropped > 0 {
        debug!(dropped, "ignored named arguments without a matching placeholder");
    }

    Ok(Rendered { text, sources })
}
