use thiserror::Error;

use crate::lexer::token::Position;

/// Fatal diagnostic raised during evaluation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} at {position}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub position: Position,
}

impl RuntimeError {
    pub(crate) fn new(kind: RuntimeErrorKind, position: Position) -> Self {
        Self { kind, position }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Object of type {type_name} is not callable")]
    NotCallable { type_name: &'static str },
    #[error("Missing argument for parameter '{parameter}'")]
    MissingArgument { parameter: String },
    #[error("Too many arguments: expected {expected}, got {found}")]
    TooManyArguments { expected: usize, found: usize },
    #[error("{name}() takes {expected} argument(s), got {found}")]
    BuiltinArity {
        name: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("Unsupported binary operation '{op}' for types {left} and {right}")]
    UnsupportedBinaryOp {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Modulo by zero")]
    ModuloByZero,
    #[error("Invalid literal for int(): '{literal}'")]
    InvalidIntLiteral { literal: String },
    #[error("Could not convert string to float: '{literal}'")]
    InvalidFloatLiteral { literal: String },
    #[error("{name}() argument must be a string or a number, got {type_name}")]
    UnsupportedConversion {
        name: &'static str,
        type_name: &'static str,
    },
    #[error("Object of type {type_name} has no len()")]
    UnsupportedLen { type_name: &'static str },
    #[error("Bad operand type for abs(): {type_name}")]
    UnsupportedAbs { type_name: &'static str },
    #[error("range() arguments must be integers, got {type_name}")]
    RangeArgumentType { type_name: &'static str },
    #[error("range() step must not be zero")]
    RangeZeroStep,
    #[error("'break' outside loop")]
    BreakOutsideLoop,
    #[error("'continue' outside loop")]
    ContinueOutsideLoop,
    #[error("Invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("Invalid literal '{literal}'")]
    InvalidLiteral { literal: String },
}
