//! Line rewriter: comment stripping, blank dropping and directive
//! classification for one physical source line

use crate::unit::COMMENT_TOKEN;

/// What a directive keyword means to the pipeline. The classifier is a table
/// of registered keywords, so new directive families can be added without
/// touching the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// Pulls another file into the compilation.
    Include,
    /// Stripped from code output, captured into the channel side list.
    Channel,
}

/// Classification of one physical line after comment stripping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// Nothing left after stripping; produces no output line.
    Blank,
    /// A retained code line (trimmed, comment removed).
    Code(String),
    /// A well-formed include directive.
    Include { path: String },
    /// A recognized directive whose arguments could not be parsed.
    MalformedDirective { reason: String },
    /// A channel descriptor line.
    Channel { name: String, args: Vec<String> },
}

/// Classifies and rewrites lines of the sketch dialect.
///
/// Comment stripping is deliberately not string-literal aware: the first
/// occurrence of the comment token ends the line even inside a quoted string.
#[derive(Debug, Clone)]
pub struct LineRewriter {
    directives: Vec<(String, DirectiveKind)>,
}

impl Default for LineRewriter {
    fn default() -> Self {
        let mut rewriter = Self { directives: Vec::new() };
        rewriter.register("@include", DirectiveKind::Include);
        rewriter.register("@channel", DirectiveKind::Channel);
        rewriter
    }
}

impl LineRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an additional directive keyword.
    pub fn register(&mut self, keyword: impl Into<String>, kind: DirectiveKind) {
        self.directives.push((keyword.into(), kind));
    }

    /// Strip a trailing single-line comment and surrounding whitespace.
    pub fn strip_comment<'a>(&self, raw: &'a str) -> &'a str {
        let code = match raw.find(COMMENT_TOKEN) {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        code.trim()
    }

    pub fn classify(&self, raw: &str) -> LineClass {
        let code = self.strip_comment(raw);
        if code.is_empty() {
            return LineClass::Blank;
        }

        for (keyword, kind) in &self.directives {
            if let Some(rest) = Self::match_keyword(code, keyword) {
                return self.classify_directive(*kind, rest);
            }
        }

        LineClass::Code(code.to_string())
    }

    /// A keyword matches only as a leading token: followed by end of line,
    /// whitespace or an opening quote.
    fn match_keyword<'a>(code: &'a str, keyword: &str) -> Option<&'a str> {
        let rest = code.strip_prefix(keyword)?;
        match rest.chars().next() {
            None => Some(rest),
            Some(c) if c.is_whitespace() || c == '"' || c == '(' => Some(rest),
            Some(_) => None,
        }
    }

    fn classify_directive(&self, kind: DirectiveKind, rest: &str) -> LineClass {
        match kind {
            DirectiveKind::Include => match last_quoted_token(rest) {
                Some(path) if !path.is_empty() => LineClass::Include { path: path.to_string() },
                Some(_) => LineClass::MalformedDirective {
                    reason: "include path is empty".to_string(),
                },
                None => LineClass::MalformedDirective {
                    reason: "include path must be quoted".to_string(),
                },
            },
            DirectiveKind::Channel => {
                let mut tokens = rest
                    .split(|c: char| c.is_whitespace() || c == '(' || c == ')' || c == ',')
                    .filter(|t| !t.is_empty())
                    .map(|t| t.trim_matches('"').to_string());
                match tokens.next() {
                    Some(name) => LineClass::Channel { name, args: tokens.collect() },
                    None => LineClass::MalformedDirective {
                        reason: "channel directive needs a name".to_string(),
                    },
                }
            }
        }
    }
}

/// The directive path is the last quoted token on the line, extracted by
/// delimiter splitting rather than expression parsing.
fn last_quoted_token(rest: &str) -> Option<&str> {
    let parts: Vec<&str> = rest.split('"').collect();
    if parts.len() < 3 {
        return None;
    }
    Some(parts[parts.len() - 2])
}
