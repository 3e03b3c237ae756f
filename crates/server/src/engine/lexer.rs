// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::Diagnostic;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Punctuation and operators (`<-`, `<=`, `{`, `:`...).
    Sym(&'static str),
}

impl Tok {
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(s) => format!("'{s}'"),
            Self::Int(i) => format!("'{i}'"),
            Self::Float(f) => format!("'{f}'"),
            Self::Str(s) => format!("\"{s}\""),
            Self::Sym(s) => format!("'{s}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
    pub column: usize,
}

const SYMBOLS: &[&str] = &[
    "<-", "<=", ">=", "!=", "::", "=", "<", ">", "+", "-", "*", "/", "(", ")", "{", "}", "[",
    "]", ";", ",", ":", "!", ".",
];

/// Split source text into tokens. Line and column numbers are 1-based.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Vec<Diagnostic>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let (mut i, mut line, mut column) = (0usize, 1usize, 1usize);

    while i < chars.len() {
        let c = chars[i];
        let (start_line, start_col) = (line, column);

        if c == '\n' {
            i += 1;
            line += 1;
            column = 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            column += 1;
            continue;
        }

        // Comments
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            column += 2;
            loop {
                match chars.get(i) {
                    None => {
                        errors.push(Diagnostic::new(start_line, start_col, "unterminated comment"));
                        break;
                    }
                    Some('*') if chars.get(i + 1) == Some(&'/') => {
                        i += 2;
                        column += 2;
                        break;
                    }
                    Some('\n') => {
                        i += 1;
                        line += 1;
                        column = 1;
                    }
                    Some(_) => {
                        i += 1;
                        column += 1;
                    }
                }
            }
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let mut text = String::new();
            i += 1;
            column += 1;
            let mut closed = false;
            while let Some(&ch) = chars.get(i) {
                i += 1;
                column += 1;
                match ch {
                    '\\' => {
                        if let Some(&esc) = chars.get(i) {
                            i += 1;
                            column += 1;
                            text.push(match esc {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                        }
                    }
                    '\n' => {
                        line += 1;
                        column = 1;
                        text.push(ch);
                    }
                    ch if ch == quote => {
                        closed = true;
                        break;
                    }
                    ch => text.push(ch),
                }
            }
            if !closed {
                errors.push(Diagnostic::new(start_line, start_col, "unterminated string literal"));
            }
            tokens.push(Token { tok: Tok::Str(text), line: start_line, column: start_col });
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let mut is_float = false;
            if chars.get(i) == Some(&'.') && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) {
                is_float = true;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            column += i - start;
            let tok = if is_float {
                text.parse().map(Tok::Float).ok()
            } else {
                text.parse().map(Tok::Int).ok()
            };
            match tok {
                Some(tok) => tokens.push(Token { tok, line: start_line, column: start_col }),
                None => errors.push(Diagnostic::new(
                    start_line,
                    start_col,
                    format!("invalid number literal {text}"),
                )),
            }
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            column += i - start;
            tokens.push(Token { tok: Tok::Ident(text), line: start_line, column: start_col });
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        match SYMBOLS.iter().copied().find(|s| rest.starts_with(*s)) {
            Some(sym) => {
                i += sym.len();
                column += sym.len();
                tokens.push(Token { tok: Tok::Sym(sym), line: start_line, column: start_col });
            }
            None => {
                errors.push(Diagnostic::new(
                    start_line,
                    start_col,
                    format!("unexpected character '{c}'"),
                ));
                i += 1;
                column += 1;
            }
        }
    }

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
#[path = "lexer_tests.rs"]
mod tests;
