// Template resolution for signature fields
// Both delimiter conventions ({{.var}} and [[.var]]) share one compile/render
// path; malformed text is escaped and retried once, then kept as-is

use std::ops::Range;

use lazy_static::lazy_static;
use log::warn;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::models::Bindings;

lazy_static! {
    // an opening delimiter not followed by a field-access marker is what
    // makes user-authored text fail to compile
    static ref STRAY_CURLY: Regex = Regex::new(r"\{\{[^.]").unwrap();
    static ref STRAY_SQUARE: Regex = Regex::new(r"\[\[[^.]").unwrap();
}

/// The two token markers bounding a template field reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimiterPair {
    open: &'static str,
    close: &'static str,
}

impl DelimiterPair {
    /// `{{.var}}`, the convention raw signature values are written in.
    pub const PRIMARY: DelimiterPair = DelimiterPair {
        open: "{{",
        close: "}}",
    };

    /// `[[.var]]`, the convention of the second resolution pass.
    pub const ALTERNATE: DelimiterPair = DelimiterPair {
        open: "[[",
        close: "]]",
    };

    pub fn open(&self) -> &'static str {
        self.open
    }

    pub fn close(&self) -> &'static str {
        self.close
    }

    fn stray_open(&self) -> &'static Regex {
        match self.open {
            "{{" => &*STRAY_CURLY,
            _ => &*STRAY_SQUARE,
        }
    }

    /// Quoted-literal expression that renders as the opening delimiter itself,
    /// e.g. `{{"{{"}}` for the primary pair.
    fn escaped_open(&self) -> String {
        format!("{open}\"{open}\"{close}", open = self.open, close = self.close)
    }

    /// Rewrite every stray opening delimiter into its escaped literal form.
    fn escape_strays(&self, text: &str) -> String {
        let escaped = self.escaped_open();
        self.stray_open()
            .replace_all(text, |caps: &Captures| {
                format!("{}{}", escaped, &caps[0][self.open.len()..])
            })
            .into_owned()
    }
}

/// Failure modes of template compilation and rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unexpected token after {open:?} at byte {at}")]
    UnexpectedToken { open: &'static str, at: usize },
    #[error("unterminated expression starting at byte {at}")]
    Unterminated { at: usize },
    #[error("undefined variable {name:?}")]
    UndefinedVariable { name: String },
}

#[derive(Debug, Clone)]
enum Token {
    /// Literal span of the compiled source.
    Literal(Range<usize>),
    /// Field reference: `.name` between delimiters.
    Field(String),
    /// Quoted literal expression: `"text"` between delimiters.
    Text(String),
}

/// A template compiled against one delimiter pair.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    tokens: Vec<Token>,
}

impl Template {
    /// Tokenize `source`. An opening delimiter must be followed by a field
    /// reference (`.name`) or a quoted literal (`"text"`) and a matching
    /// closing delimiter; anything else is a compile error.
    pub fn compile(delims: DelimiterPair, source: &str) -> Result<Self, TemplateError> {
        let mut tokens = Vec::new();
        let mut rest = 0;
        while let Some(found) = source[rest..].find(delims.open()) {
            let open_at = rest + found;
            if open_at > rest {
                tokens.push(Token::Literal(rest..open_at));
            }
            let expr_at = open_at + delims.open().len();
            let tail = &source[expr_at..];
            if let Some(body) = tail.strip_prefix('.') {
                let close = body
                    .find(delims.close())
                    .ok_or(TemplateError::Unterminated { at: open_at })?;
                tokens.push(Token::Field(body[..close].trim().to_string()));
                rest = expr_at + 1 + close + delims.close().len();
            } else if let Some(body) = tail.strip_prefix('"') {
                let quote = body
                    .find('"')
                    .ok_or(TemplateError::Unterminated { at: open_at })?;
                if !body[quote + 1..].starts_with(delims.close()) {
                    return Err(TemplateError::UnexpectedToken {
                        open: delims.open(),
                        at: open_at,
                    });
                }
                tokens.push(Token::Text(body[..quote].to_string()));
                rest = expr_at + 1 + quote + 1 + delims.close().len();
            } else {
                return Err(TemplateError::UnexpectedToken {
                    open: delims.open(),
                    at: open_at,
                });
            }
        }
        if rest < source.len() {
            tokens.push(Token::Literal(rest..source.len()));
        }
        Ok(Template {
            source: source.to_string(),
            tokens,
        })
    }

    /// Render against `bindings`. Referencing an undefined variable is an
    /// error; `original` is always defined by construction.
    pub fn render(&self, bindings: &Bindings) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for token in &self.tokens {
            match token {
                Token::Literal(span) => out.push_str(&self.source[span.clone()]),
                Token::Field(name) => match bindings.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(TemplateError::UndefinedVariable { name: name.clone() })
                    }
                },
                Token::Text(text) => out.push_str(text),
            }
        }
        Ok(out)
    }
}

/// Logging port for template text that fails to parse even after the escape
/// pass.
pub trait TemplateLog {
    fn malformed_template(&self, text: &str);
}

/// Default sink: forwards to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeLog;

impl TemplateLog for FacadeLog {
    fn malformed_template(&self, text: &str) {
        warn!("improper template format {:?}", text);
    }
}

/// Resolve `text` against `bindings` using the given delimiter pair.
///
/// Never fails: a malformed template is escaped and recompiled once; if that
/// still fails the condition is logged and the original text is returned.
/// Rendering errors also return the original text.
pub fn resolve_template(
    delims: DelimiterPair,
    text: &str,
    bindings: &Bindings,
    logger: &dyn TemplateLog,
) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }
    let template = match Template::compile(delims, text) {
        Ok(template) => template,
        Err(_) => {
            let escaped = delims.escape_strays(text);
            match Template::compile(delims, &escaped) {
                Ok(template) => template,
                Err(_) => {
                    logger.malformed_template(text);
                    return text.to_string();
                }
            }
        }
    };
    template.render(bindings).unwrap_or_else(|_| text.to_string())
}

/// Resolve `{{.var}}` references.
pub fn resolve_variable(text: &str, bindings: &Bindings) -> String {
    resolve_template(DelimiterPair::PRIMARY, text, bindings, &FacadeLog)
}

/// Resolve `[[.var]]` references.
pub fn alt_resolve_variable(text: &str, bindings: &Bindings) -> String {
    resolve_template(DelimiterPair::ALTERNATE, text, bindings, &FacadeLog)
}
