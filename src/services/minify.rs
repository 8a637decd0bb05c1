//! Conservative css/js minification for emitted bundles.
//!
//! Both minifiers scan the source once and copy string literals verbatim
//! (template literals and regex literals too, for js). Only comments and
//! whitespace outside those literals are touched.

use std::iter::Peekable;
use std::str::Chars;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::scope::CodeType;

struct CssPatterns {
    whitespace: Regex,
    around_separators: Regex,
    around_declaration_colon: Regex,
}

fn css_patterns() -> &'static CssPatterns {
    static PATTERNS: OnceLock<CssPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CssPatterns {
        whitespace: Regex::new(r"\s+").unwrap(),
        around_separators: Regex::new(r"\s*([,>])\s*").unwrap(),
        around_declaration_colon: Regex::new(r"\s*:\s*").unwrap(),
    })
}

/// Piece of a css statement: unquoted text or a quoted string.
enum CssPiece {
    Code(String),
    Quoted(String),
}

/// How a css statement ended.
#[derive(Clone, Copy, PartialEq, Eq)]
enum CssTerminator {
    /// `{`: a selector or at-rule prelude.
    Block,
    /// `;` or `}`: a declaration.
    Declaration,
    Eof,
}

/// Copy a quoted literal including both quotes. Stops early at an unescaped
/// newline or end of input.
fn read_quoted(quote: char, chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    out.push(quote);
    while let Some(c) = chars.next() {
        out.push(c);
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '\n' => break,
            c if c == quote => break,
            _ => {}
        }
    }
}

/// Skip a block comment whose `/*` was already consumed. Returns whether it
/// spanned a newline.
fn skip_block_comment(chars: &mut Peekable<Chars<'_>>) -> bool {
    let mut newline = false;
    let mut prev = '\0';
    for c in chars.by_ref() {
        if prev == '*' && c == '/' {
            break;
        }
        newline |= c == '\n';
        prev = c;
    }
    newline
}

fn render_css_statement(pieces: Vec<CssPiece>, terminator: CssTerminator, out: &mut String) {
    let p = css_patterns();
    let last = pieces.len().saturating_sub(1);
    for (i, piece) in pieces.into_iter().enumerate() {
        match piece {
            CssPiece::Quoted(text) => out.push_str(&text),
            CssPiece::Code(text) => {
                let mut text = p.whitespace.replace_all(&text, " ").into_owned();
                text = p.around_separators.replace_all(&text, "$1").into_owned();
                // Selectors keep the space before `:`, it is a descendant combinator there.
                if terminator == CssTerminator::Declaration {
                    text = p.around_declaration_colon.replace_all(&text, ":").into_owned();
                }
                let mut text = text.as_str();
                if i == 0 {
                    text = text.trim_start();
                }
                if i == last {
                    text = text.trim_end();
                }
                out.push_str(text);
            }
        }
    }
}

pub fn minify_css(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut pieces: Vec<CssPiece> = Vec::new();
    let mut code = String::new();
    let mut chars = css.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                pieces.push(CssPiece::Code(std::mem::take(&mut code)));
                let mut quoted = String::new();
                read_quoted(c, &mut chars, &mut quoted);
                pieces.push(CssPiece::Quoted(quoted));
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                skip_block_comment(&mut chars);
                code.push(' ');
            }
            '{' | ';' | '}' => {
                pieces.push(CssPiece::Code(std::mem::take(&mut code)));
                let terminator = if c == '{' {
                    CssTerminator::Block
                } else {
                    CssTerminator::Declaration
                };
                render_css_statement(std::mem::take(&mut pieces), terminator, &mut out);
                if c == '}' && out.ends_with(';') {
                    out.pop();
                }
                out.push(c);
            }
            c => code.push(c),
        }
    }

    pieces.push(CssPiece::Code(code));
    render_css_statement(pieces, CssTerminator::Eof, &mut out);
    out.trim().to_string()
}

/// Characters after which a `/` starts a regex literal rather than a division.
const REGEX_PREFIX: &str = "(,=:[!&|?{};+-*%<>~^";

const REGEX_KEYWORDS: &[&str] = &["return", "typeof", "case", "do", "else", "in", "of", "void", "yield"];

fn regex_allowed(out: &str) -> bool {
    let code = out.trim_end();
    let Some(last) = code.chars().last() else {
        return true;
    };
    if REGEX_PREFIX.contains(last) {
        return true;
    }
    REGEX_KEYWORDS.iter().any(|keyword| {
        code.strip_suffix(keyword).is_some_and(|before| {
            !before
                .chars()
                .last()
                .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        })
    })
}

/// Copy a regex literal whose opening `/` was already consumed.
fn read_regex(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    out.push('/');
    let mut in_class = false;
    while let Some(c) = chars.next() {
        out.push(c);
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => break,
            '\n' => break,
            _ => {}
        }
    }
}

/// Copy template literal text up to the closing backtick or an opening
/// `${`. Returns true when it stopped at `${`.
fn read_template(chars: &mut Peekable<Chars<'_>>, out: &mut String) -> bool {
    while let Some(c) = chars.next() {
        out.push(c);
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '`' => return false,
            '$' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
                return true;
            }
            _ => {}
        }
    }
    false
}

/// Drop trailing spaces on the current output line and start a new one,
/// unless the output is empty or already at a line start.
fn end_line(out: &mut String) {
    let trimmed = out.trim_end_matches([' ', '\t', '\r']).len();
    out.truncate(trimmed);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

pub fn minify_js(js: &str) -> String {
    let mut out = String::with_capacity(js.len());
    let mut chars = js.chars().peekable();
    // Brace depth inside each open template `${ ... }`.
    let mut interpolations: Vec<usize> = Vec::new();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => read_quoted(c, &mut chars, &mut out),
            '`' => {
                out.push('`');
                if read_template(&mut chars, &mut out) {
                    interpolations.push(0);
                }
            }
            '{' => {
                if let Some(depth) = interpolations.last_mut() {
                    *depth += 1;
                }
                out.push('{');
            }
            '}' => {
                out.push('}');
                match interpolations.last_mut() {
                    Some(0) => {
                        interpolations.pop();
                        if read_template(&mut chars, &mut out) {
                            interpolations.push(0);
                        }
                    }
                    Some(depth) => *depth -= 1,
                    None => {}
                }
            }
            '/' => match chars.peek() {
                Some('/') => {
                    while chars.next_if(|&n| n != '\n').is_some() {}
                }
                Some('*') => {
                    chars.next();
                    if skip_block_comment(&mut chars) {
                        end_line(&mut out);
                    }
                }
                _ if regex_allowed(&out) => read_regex(&mut chars, &mut out),
                _ => out.push('/'),
            },
            '\n' => end_line(&mut out),
            c if c.is_whitespace() => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push(c);
                }
            }
            c => out.push(c),
        }
    }

    out.truncate(out.trim_end().len());
    out
}

/// Minify according to code type; php and html pass through unchanged.
pub fn minify(code: &str, code_type: CodeType) -> String {
    match code_type {
        CodeType::Css => minify_css(code),
        CodeType::Js => minify_js(code),
        CodeType::Php | CodeType::Html => code.to_string(),
    }
}
