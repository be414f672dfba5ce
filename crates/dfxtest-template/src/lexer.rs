//! Lexical analysis for argument templates
//!
//! Splits template text into literal runs and `{name}` placeholders using logos.
//! Braces that do not open a placeholder are ordinary Candid text.

use dfxtest_model::Span;
use logos::Logos;

#[derive(Logos, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Token {
    /// `{name}`
    #[regex(r"\{[a-zA-Z_][a-zA-Z0-9_]*\}")]
    Placeholder,

    /// `{name` without its closing brace (yet)
    #[regex(r"\{[a-zA-Z_][a-zA-Z0-9_]*")]
    OpenPlaceholder,

    /// A brace that cannot start a placeholder, e.g. `record { ... }`
    #[token("{")]
    Lbrace,

    #[token("\n")]
    Newline,

    #[regex(r"[^{\n]+")]
    Text,

    Eof,
}

#[derive(Debug, Clone)]
pub struct SpannedToken<'input> {
    pub token: Token,
    pub span: Span,
    pub text: &'input str,
}

impl<'input> SpannedToken<'input> {
    /// Name inside a `{name}` or `{name` token
    #[must_use]
    pub fn placeholder_name(&self) -> Option<&'input str> {
        match self.token {
            Token::Placeholder => Some(&self.text[1..self.text.len() - 1]),
            Token::OpenPlaceholder => Some(&self.text[1..]),
            _ => None,
        }
    }

    /// Whether this token begins with an opening brace
    #[must_use]
    pub const fn opens_brace(&self) -> bool {
        matches!(
            self.token,
            Token::Placeholder | Token::OpenPlaceholder | Token::Lbrace
        )
    }

    /// Whether this token ends the current line
    #[must_use]
    pub fn ends_line(&self) -> bool {
        match self.token {
            Token::Newline | Token::Eof => true,
            Token::Text => self.text == "\r",
            _ => false,
        }
    }
}

pub struct Lexer<'input> {
    lexer: logos::Lexer<'input, Token>,
    input: &'input str,
}

impl<'input> Lexer<'input> {
    #[must_use]
    pub fn new(input: &'input str) -> Self {
        Self {
            lexer: Token::lexer(input),
            input,
        }
    }

    pub fn next_token(&mut self) -> SpannedToken<'input> {
        match self.lexer.next() {
            Some(result) => {
                let span = self.lexer.span();
                SpannedToken {
                    // every byte matches some token
                    token: result.unwrap_or(Token::Text),
                    span: Span::new(span.start, span.end),
                    text: &self.input[span],
                }
            }
            None => SpannedToken {
                token: Token::Eof,
                span: Span::new(self.input.len(), self.input.len()),
                text: "",
            },
        }
    }

    pub fn tokenize(&mut self) -> Vec<SpannedToken<'input>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.token == Token::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }
}
