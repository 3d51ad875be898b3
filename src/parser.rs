use std::rc::Rc;

use thiserror::Error;

pub mod ast;

use crate::lexer::token::{Position, Token, TokenKind};
use ast::{
    Expression, ExpressionKind, FunctionDecl, Parameter, Program, Statement, StatementKind,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected {expected}, got '{found}' at {position}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: Position,
    },
    #[error("Invalid assignment target at {position}")]
    InvalidAssignmentTarget { position: Position },
}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|token| token.kind) != Some(TokenKind::Eof) {
            let position = tokens
                .last()
                .map(|token| token.position)
                .unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, "", position));
        }
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        self.consume_newlines();
        while !self.check(TokenKind::Eof) {
            statements.push(self.parse_statement()?);
            self.consume_newlines();
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.current_kind() {
            TokenKind::Def => self.parse_function_def(),
            TokenKind::Class => self.parse_class_def(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => {
                let token = self.advance();
                Ok(Statement::new(StatementKind::Break, token.position))
            }
            TokenKind::Continue => {
                let token = self.advance();
                Ok(Statement::new(StatementKind::Continue, token.position))
            }
            TokenKind::Pass => {
                let token = self.advance();
                Ok(Statement::new(StatementKind::Pass, token.position))
            }
            _ => {
                let expr = self.parse_expression()?;
                let position = expr.position;
                Ok(Statement::new(StatementKind::Expr(expr), position))
            }
        }
    }

    /// `: NEWLINE INDENT statements DEDENT` after a compound-statement header.
    fn parse_suite(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::Colon, "':'")?;
        self.expect(TokenKind::Newline, "a newline")?;
        self.parse_block()
    }

    fn parse_block(&mut self) -> ParseResult<Statement> {
        let indent = self.expect(TokenKind::Indent, "an indented block")?;
        let mut statements = Vec::new();
        loop {
            if self.check(TokenKind::Dedent) || self.check(TokenKind::Eof) {
                break;
            }
            if self.matches(TokenKind::Newline) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenKind::Dedent, "a dedent to close the block")?;
        Ok(Statement::new(
            StatementKind::Block(statements),
            indent.position,
        ))
    }

    fn parse_function_def(&mut self) -> ParseResult<Statement> {
        let def = self.expect(TokenKind::Def, "'def'")?;
        let name = self.expect(TokenKind::Identifier, "a function name")?;
        self.expect(TokenKind::LParen, "'('")?;
        let mut parameters = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let parameter = self.expect(TokenKind::Identifier, "a parameter name")?;
                let default = if self.matches(TokenKind::Assign) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                parameters.push(Parameter {
                    name: parameter.lexeme,
                    default,
                });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_suite()?;
        Ok(Statement::new(
            StatementKind::FunctionDef(Rc::new(FunctionDecl {
                name: name.lexeme,
                parameters,
                body,
            })),
            def.position,
        ))
    }

    fn parse_class_def(&mut self) -> ParseResult<Statement> {
        let class = self.expect(TokenKind::Class, "'class'")?;
        let name = self.expect(TokenKind::Identifier, "a class name")?;
        let mut bases = Vec::new();
        if self.matches(TokenKind::LParen) {
            if !self.check(TokenKind::RParen) {
                loop {
                    let base = self.expect(TokenKind::Identifier, "a base class name")?;
                    bases.push(base.lexeme);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }
        let body = self.parse_suite()?;
        Ok(Statement::new(
            StatementKind::ClassDef {
                name: name.lexeme,
                bases,
                body: Box::new(body),
            },
            class.position,
        ))
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        // Entered on `if` or, for chains, on `elif`.
        let keyword = self.advance();
        let condition = self.parse_expression()?;
        let then_block = self.parse_suite()?;
        let else_block = if self.check(TokenKind::Elif) {
            Some(Box::new(self.parse_if()?))
        } else if self.matches(TokenKind::Else) {
            Some(Box::new(self.parse_suite()?))
        } else {
            None
        };
        Ok(Statement::new(
            StatementKind::If {
                condition,
                then_block: Box::new(then_block),
                else_block,
            },
            keyword.position,
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::While, "'while'")?;
        let condition = self.parse_expression()?;
        let body = self.parse_suite()?;
        Ok(Statement::new(
            StatementKind::While {
                condition,
                body: Box::new(body),
            },
            keyword.position,
        ))
    }

    fn parse_for(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::For, "'for'")?;
        let variable = self.expect(TokenKind::Identifier, "a loop variable name")?;
        self.expect(TokenKind::In, "'in'")?;
        let iterable = self.parse_expression()?;
        let body = self.parse_suite()?;
        Ok(Statement::new(
            StatementKind::For {
                variable: variable.lexeme,
                iterable,
                body: Box::new(body),
            },
            keyword.position,
        ))
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::Return, "'return'")?;
        let value = if matches!(
            self.current_kind(),
            TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof
        ) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        Ok(Statement::new(StatementKind::Return(value), keyword.position))
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> ParseResult<Expression> {
        let expr = self.parse_or()?;
        if self.check(TokenKind::Assign) {
            if !matches!(expr.kind, ExpressionKind::Identifier(_)) {
                return Err(ParseError::InvalidAssignmentTarget {
                    position: expr.position,
                });
            }
            let op = self.advance();
            let value = self.parse_assignment()?;
            let position = expr.position;
            return Ok(Expression::new(
                ExpressionKind::Assignment {
                    target: Box::new(expr),
                    op: op.kind,
                    value: Box::new(value),
                },
                position,
            ));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_and()?;
        while self.check(TokenKind::Or) {
            let op = self.advance();
            let right = self.parse_and()?;
            expr = binary(expr, op.kind, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_equality()?;
        while self.check(TokenKind::And) {
            let op = self.advance();
            let right = self.parse_equality()?;
            expr = binary(expr, op.kind, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_comparison()?;
        while matches!(self.current_kind(), TokenKind::Equal | TokenKind::NotEqual) {
            let op = self.advance();
            let right = self.parse_comparison()?;
            expr = binary(expr, op.kind, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_term()?;
        while matches!(
            self.current_kind(),
            TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual
        ) {
            let op = self.advance();
            let right = self.parse_term()?;
            expr = binary(expr, op.kind, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_factor()?;
        while matches!(self.current_kind(), TokenKind::Plus | TokenKind::Minus) {
            let op = self.advance();
            let right = self.parse_factor()?;
            expr = binary(expr, op.kind, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_power()?;
        while matches!(
            self.current_kind(),
            TokenKind::Multiply | TokenKind::Divide | TokenKind::Modulo | TokenKind::FloorDivide
        ) {
            let op = self.advance();
            let right = self.parse_power()?;
            expr = binary(expr, op.kind, right);
        }
        Ok(expr)
    }

    fn parse_power(&mut self) -> ParseResult<Expression> {
        let expr = self.parse_unary()?;
        if self.check(TokenKind::Power) {
            let op = self.advance();
            // Right associative.
            let right = self.parse_power()?;
            return Ok(binary(expr, op.kind, right));
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        if matches!(self.current_kind(), TokenKind::Minus | TokenKind::Not) {
            let op = self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::new(
                ExpressionKind::Unary {
                    op: op.kind,
                    operand: Box::new(operand),
                },
                op.position,
            ));
        }
        self.parse_call()
    }

    fn parse_call(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;
        while self.matches(TokenKind::LParen) {
            let mut args = Vec::new();
            if !self.check(TokenKind::RParen) {
                loop {
                    args.push(self.parse_expression()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
            let position = expr.position;
            expr = Expression::new(
                ExpressionKind::Call {
                    callee: Box::new(expr),
                    args,
                },
                position,
            );
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match self.current_kind() {
            TokenKind::Integer
            | TokenKind::Float
            | TokenKind::String
            | TokenKind::Boolean
            | TokenKind::None => {
                let token = self.advance();
                let position = token.position;
                Ok(Expression::new(ExpressionKind::Literal(token), position))
            }
            TokenKind::Identifier => {
                let token = self.advance();
                Ok(Expression::new(
                    ExpressionKind::Identifier(token.lexeme),
                    token.position,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_list(),
            TokenKind::LBrace => self.parse_dict(),
            _ => Err(self.error("an expression")),
        }
    }

    fn parse_list(&mut self) -> ParseResult<Expression> {
        let bracket = self.expect(TokenKind::LBracket, "'['")?;
        let mut elements = Vec::new();
        if !self.check(TokenKind::RBracket) {
            loop {
                elements.push(self.parse_expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(Expression::new(
            ExpressionKind::List(elements),
            bracket.position,
        ))
    }

    fn parse_dict(&mut self) -> ParseResult<Expression> {
        let brace = self.expect(TokenKind::LBrace, "'{'")?;
        let mut pairs = Vec::new();
        if !self.check(TokenKind::RBrace) {
            loop {
                let key = self.parse_expression()?;
                self.expect(TokenKind::Colon, "':'")?;
                let value = self.parse_expression()?;
                pairs.push((key, value));
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expression::new(ExpressionKind::Dict(pairs), brace.position))
    }

    fn current(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(expected))
        }
    }

    fn consume_newlines(&mut self) {
        while self.matches(TokenKind::Newline) {}
    }

    fn error(&self, expected: &str) -> ParseError {
        let token = self.current();
        let found = match token.kind {
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            _ => token.lexeme.clone(),
        };
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found,
            position: token.position,
        }
    }
}

fn binary(left: Expression, op: TokenKind, right: Expression) -> Expression {
    let position = left.position;
    Expression::new(
        ExpressionKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        position,
    )
}

pub fn parse_tokens(tokens: Vec<Token>) -> ParseResult<Program> {
    Parser::new(tokens).parse_program()
}
