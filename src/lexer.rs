use std::collections::VecDeque;

use thiserror::Error;

pub mod token;

use token::{Position, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexerState {
    LineBegin,
    TokenStart,
}

enum StepOutcome {
    Emit(Token),
    Continue,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at {position}")]
    UnexpectedCharacter { character: char, position: Position },
    #[error("Unterminated string literal starting at {position}")]
    UnterminatedString { position: Position },
    #[error("Invalid dedent to {width} columns at {position}")]
    InvalidDedent { width: usize, position: Position },
    #[error("Invalid integer literal '{literal}' at {position}")]
    InvalidIntegerLiteral { literal: String, position: Position },
}

pub type LexResult<T> = Result<T, LexError>;

/// Width contributed by a tab when measuring leading indentation.
const TAB_WIDTH: usize = 8;

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    position: Position,
    indent_stack: Vec<usize>,
    pending: VecDeque<Token>,
    state: LexerState,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            position: Position::start(),
            indent_stack: vec![0],
            pending: VecDeque::new(),
            state: LexerState::LineBegin,
            finished: false,
        }
    }

    pub fn next_token(&mut self) -> LexResult<Token> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(token);
            }

            match self.step_state()? {
                StepOutcome::Emit(token) => return Ok(token),
                StepOutcome::Continue => continue,
            }
        }
    }

    fn step_state(&mut self) -> LexResult<StepOutcome> {
        match self.state {
            LexerState::LineBegin => {
                self.handle_indentation()?;
                self.state = LexerState::TokenStart;
                Ok(StepOutcome::Continue)
            }
            LexerState::TokenStart => {
                self.skip_spaces();

                let at = self.position;
                let Some(ch) = self.peek_char() else {
                    return self.handle_eof();
                };

                if ch == '#' {
                    self.skip_comment();
                    return Ok(StepOutcome::Continue);
                }

                Ok(StepOutcome::Emit(self.read_token(ch, at)?))
            }
        }
    }

    /// Measures leading whitespace and queues Indent/Dedent tokens.
    ///
    /// Tabs count as `TAB_WIDTH` columns, summed additively with spaces.
    /// Blank and comment-only lines never change the indentation depth.
    fn handle_indentation(&mut self) -> LexResult<()> {
        let mut width = 0usize;
        while let Some(c) = self.peek_char() {
            match c {
                ' ' => width += 1,
                '\t' => width += TAB_WIDTH,
                _ => break,
            }
            self.consume_char();
        }

        match self.peek_char() {
            None | Some('\n') | Some('#') => return Ok(()),
            _ => {}
        }

        let at = self.position;
        let current = self.current_indent();
        if width > current {
            self.indent_stack.push(width);
            self.pending
                .push_back(Token::new(TokenKind::Indent, "", at));
        } else if width < current {
            while self.current_indent() > width {
                self.indent_stack.pop();
                self.pending
                    .push_back(Token::new(TokenKind::Dedent, "", at));
            }
            if self.current_indent() != width {
                return Err(LexError::InvalidDedent {
                    width,
                    position: at,
                });
            }
        }
        Ok(())
    }

    fn handle_eof(&mut self) -> LexResult<StepOutcome> {
        // Unwind the indentation stack before the final Eof.
        let at = self.position;
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.pending
                .push_back(Token::new(TokenKind::Dedent, "", at));
        }
        if !self.pending.is_empty() {
            return Ok(StepOutcome::Continue);
        }
        Ok(StepOutcome::Emit(Token::new(TokenKind::Eof, "", at)))
    }

    fn read_token(&mut self, ch: char, at: Position) -> LexResult<Token> {
        match ch {
            '\n' => {
                self.consume_char();
                self.state = LexerState::LineBegin;
                Ok(Token::new(TokenKind::Newline, "\n", at))
            }
            '"' | '\'' => self.read_string(ch, at),
            c if c.is_ascii_digit() => self.read_number(at),
            c if c.is_ascii_alphabetic() || c == '_' => Ok(self.read_identifier(at)),
            _ => self.read_operator(ch, at),
        }
    }

    fn read_operator(&mut self, ch: char, at: Position) -> LexResult<Token> {
        self.consume_char();
        let next = self.peek_char();
        let kind = match ch {
            '+' if next == Some('=') => self.consume_into(TokenKind::PlusAssign),
            '+' => TokenKind::Plus,
            '-' if next == Some('=') => self.consume_into(TokenKind::MinusAssign),
            '-' => TokenKind::Minus,
            '*' if next == Some('*') => self.consume_into(TokenKind::Power),
            '*' if next == Some('=') => self.consume_into(TokenKind::MultAssign),
            '*' => TokenKind::Multiply,
            '/' if next == Some('/') => self.consume_into(TokenKind::FloorDivide),
            '/' if next == Some('=') => self.consume_into(TokenKind::DivAssign),
            '/' => TokenKind::Divide,
            '=' if next == Some('=') => self.consume_into(TokenKind::Equal),
            '=' => TokenKind::Assign,
            '!' if next == Some('=') => self.consume_into(TokenKind::NotEqual),
            '<' if next == Some('=') => self.consume_into(TokenKind::LessEqual),
            '<' => TokenKind::Less,
            '>' if next == Some('=') => self.consume_into(TokenKind::GreaterEqual),
            '>' => TokenKind::Greater,
            '%' => TokenKind::Modulo,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            _ => {
                return Err(LexError::UnexpectedCharacter {
                    character: ch,
                    position: at,
                });
            }
        };
        Ok(Token::new(kind, kind.symbol(), at))
    }

    fn consume_into(&mut self, kind: TokenKind) -> TokenKind {
        self.consume_char();
        kind
    }

    fn read_string(&mut self, quote: char, at: Position) -> LexResult<Token> {
        self.consume_char(); // opening quote
        let mut value = String::new();
        loop {
            match self.consume_char() {
                None => return Err(LexError::UnterminatedString { position: at }),
                Some(c) if c == quote => break,
                Some('\\') => {
                    let escaped = self
                        .consume_char()
                        .ok_or(LexError::UnterminatedString { position: at })?;
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        // Unknown escapes pass the character through verbatim.
                        other => other,
                    });
                }
                Some(c) => value.push(c),
            }
        }
        Ok(Token::new(TokenKind::String, value, at))
    }

    fn read_number(&mut self, at: Position) -> LexResult<Token> {
        let start = self.pos;
        self.consume_while(|c| c.is_ascii_digit());

        let mut is_float = false;
        if self.peek_char() == Some('.')
            && self.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.consume_char();
            self.consume_while(|c| c.is_ascii_digit());
        }

        let lexeme = &self.input[start..self.pos];
        if !is_float && lexeme.parse::<i64>().is_err() {
            return Err(LexError::InvalidIntegerLiteral {
                literal: lexeme.to_string(),
                position: at,
            });
        }
        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Integer
        };
        Ok(Token::new(kind, lexeme, at))
    }

    fn read_identifier(&mut self, at: Position) -> Token {
        let start = self.pos;
        self.consume_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let lexeme = &self.input[start..self.pos];
        let kind = TokenKind::keyword(lexeme).unwrap_or(TokenKind::Identifier);
        Token::new(kind, lexeme, at)
    }

    fn skip_spaces(&mut self) {
        self.consume_while(|c| c == ' ' || c == '\t' || c == '\r');
    }

    fn skip_comment(&mut self) {
        self.consume_while(|c| c != '\n');
    }

    fn consume_while<P>(&mut self, keep: P)
    where
        P: Fn(char) -> bool,
    {
        while let Some(c) = self.peek_char() {
            if !keep(c) {
                break;
            }
            self.consume_char();
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        self.input[self.pos..].chars().nth(1)
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.position.line += 1;
            self.position.column = 1;
        } else {
            self.position.column += 1;
        }
        Some(c)
    }

    fn current_indent(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or(0)
    }
}

impl Iterator for Lexer<'_> {
    type Item = LexResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_token() {
            Ok(token) => {
                if token.kind == TokenKind::Eof {
                    self.finished = true;
                }
                Some(Ok(token))
            }
            Err(error) => {
                self.finished = true;
                Some(Err(error))
            }
        }
    }
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    Lexer::new(input).collect()
}
