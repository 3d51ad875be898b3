use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins::BuiltinFunction;
use crate::lexer::token::{Position, Token, TokenKind};
use crate::parser::ast::{Expression, ExpressionKind, Statement, StatementKind};

use super::error::{RuntimeError, RuntimeErrorKind};
use super::value::{FunctionValue, Value};

/// Lexical scope: a mutable name table chained to its enclosing scope.
///
/// Scopes are shared (`Rc`) because every closure keeps its defining
/// environment alive; chains form a tree under the parent link.
#[derive(Debug, Default)]
pub struct Environment {
    bindings: HashMap<String, Value>,
    parent: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn root() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment::default()))
    }

    pub fn with_parent(parent: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            bindings: HashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    /// Creates or overwrites a binding in this scope.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Reads a name, walking the scope chain outwards.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.bindings.get(name) {
            return Some(value.clone());
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.borrow().get(name))
    }

    /// Mutates the nearest existing binding; false when the name is unbound.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.bindings.get_mut(name) {
            *slot = value;
            return true;
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().assign(name, value),
            None => false,
        }
    }
}

/// Control-flow outcome of executing a statement.
///
/// Loop signals carry the position of the raising statement so an unhandled
/// signal can be reported as a diagnostic.
pub(super) enum Flow {
    Normal,
    Return(Value),
    Break(Position),
    Continue(Position),
}

type EvalResult = Result<Value, RuntimeError>;
type FlowResult = Result<Flow, RuntimeError>;

pub(super) struct Runtime {
    pub(super) output: Vec<String>,
    pub(super) last_value: Value,
}

impl Runtime {
    pub(super) fn new() -> Self {
        Self {
            output: Vec::new(),
            last_value: Value::None,
        }
    }

    pub(super) fn exec_statements(
        &mut self,
        statements: &[Statement],
        env: &Rc<RefCell<Environment>>,
    ) -> FlowResult {
        for statement in statements {
            match self.exec_statement(statement, env)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_statement(&mut self, statement: &Statement, env: &Rc<RefCell<Environment>>) -> FlowResult {
        match &statement.kind {
            StatementKind::Expr(expr) => {
                self.last_value = self.eval_expression(expr, env)?;
                Ok(Flow::Normal)
            }
            StatementKind::Block(statements) => self.exec_statements(statements, env),
            StatementKind::If {
                condition,
                then_block,
                else_block,
            } => {
                if self.eval_expression(condition, env)?.is_truthy() {
                    self.exec_statement(then_block, env)
                } else if let Some(else_block) = else_block {
                    self.exec_statement(else_block, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StatementKind::While { condition, body } => {
                while self.eval_expression(condition, env)?.is_truthy() {
                    match self.exec_statement(body, env)? {
                        Flow::Normal | Flow::Continue(_) => {}
                        Flow::Break(_) => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            StatementKind::For {
                variable,
                iterable,
                body,
            } => {
                let iterable = self.eval_expression(iterable, env)?;
                // Only ranges iterate; any other value is a no-op.
                if let Value::Range { start, stop, step } = iterable {
                    let mut index = start;
                    while index < stop {
                        env.borrow_mut().define(variable.clone(), Value::Int(index));
                        match self.exec_statement(body, env)? {
                            Flow::Normal | Flow::Continue(_) => {}
                            Flow::Break(_) => break,
                            ret @ Flow::Return(_) => return Ok(ret),
                        }
                        index = index.wrapping_add(step);
                    }
                }
                Ok(Flow::Normal)
            }
            StatementKind::FunctionDef(declaration) => {
                let function = Value::Function(Rc::new(FunctionValue {
                    declaration: Rc::clone(declaration),
                    closure: Rc::clone(env),
                }));
                env.borrow_mut().define(declaration.name.clone(), function);
                Ok(Flow::Normal)
            }
            StatementKind::ClassDef { name, .. } => {
                // Classes are syntactic only; the body is not executed.
                env.borrow_mut()
                    .define(name.clone(), Value::Str(format!("__class_{name}")));
                Ok(Flow::Normal)
            }
            StatementKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expression(expr, env)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            StatementKind::Break => Ok(Flow::Break(statement.position)),
            StatementKind::Continue => Ok(Flow::Continue(statement.position)),
            StatementKind::Pass => Ok(Flow::Normal),
        }
    }

    fn eval_expression(&mut self, expr: &Expression, env: &Rc<RefCell<Environment>>) -> EvalResult {
        match &expr.kind {
            ExpressionKind::Literal(token) => literal_value(token, expr.position),
            ExpressionKind::Identifier(name) => {
                // Built-in names resolve first and cannot be shadowed.
                if let Some(builtin) = BuiltinFunction::from_name(name) {
                    return Ok(Value::Builtin(builtin));
                }
                env.borrow().get(name).ok_or_else(|| {
                    RuntimeError::new(
                        RuntimeErrorKind::UndefinedVariable { name: name.clone() },
                        expr.position,
                    )
                })
            }
            ExpressionKind::Binary { left, op, right } => {
                // Strict left-to-right evaluation; `and`/`or` do not
                // short-circuit, so side effects of both operands are visible.
                let left = self.eval_expression(left, env)?;
                let right = self.eval_expression(right, env)?;
                apply_binary(left, *op, right, expr.position)
            }
            ExpressionKind::Unary { op, operand } => {
                let operand = self.eval_expression(operand, env)?;
                // '-' negates integers; every other operand, and 'not',
                // passes through unchanged.
                match (op, &operand) {
                    (TokenKind::Minus, Value::Int(value)) => Ok(Value::Int(value.wrapping_neg())),
                    _ => Ok(operand),
                }
            }
            ExpressionKind::Call { callee, args } => {
                let callee = self.eval_expression(callee, env)?;
                let mut arguments = Vec::with_capacity(args.len());
                for arg in args {
                    arguments.push(self.eval_expression(arg, env)?);
                }
                self.call_value(callee, arguments, expr.position)
            }
            ExpressionKind::Member { .. } => Ok(Value::None),
            ExpressionKind::Assignment { target, value, .. } => {
                let value = self.eval_expression(value, env)?;
                match &target.kind {
                    ExpressionKind::Identifier(name) => {
                        env.borrow_mut().define(name.clone(), value.clone());
                        Ok(value)
                    }
                    _ => Err(RuntimeError::new(
                        RuntimeErrorKind::InvalidAssignmentTarget,
                        target.position,
                    )),
                }
            }
            ExpressionKind::List(_) => Ok(Value::Str("[list]".to_string())),
            ExpressionKind::Dict(_) => Ok(Value::Str("[dict]".to_string())),
        }
    }

    fn call_value(&mut self, callee: Value, arguments: Vec<Value>, at: Position) -> EvalResult {
        match callee {
            Value::Function(function) => self.call_function(&function, arguments, at),
            Value::Builtin(builtin) => self.call_builtin(builtin, arguments, at),
            other => Err(RuntimeError::new(
                RuntimeErrorKind::NotCallable {
                    type_name: other.type_name(),
                },
                at,
            )),
        }
    }

    fn call_function(
        &mut self,
        function: &FunctionValue,
        arguments: Vec<Value>,
        at: Position,
    ) -> EvalResult {
        let parameters = &function.declaration.parameters;
        if arguments.len() > parameters.len() {
            return Err(RuntimeError::new(
                RuntimeErrorKind::TooManyArguments {
                    expected: parameters.len(),
                    found: arguments.len(),
                },
                at,
            ));
        }

        let local = Environment::with_parent(&function.closure);
        let mut arguments = arguments.into_iter();
        for parameter in parameters {
            let value = match arguments.next() {
                Some(value) => value,
                None => match &parameter.default {
                    // Defaults are evaluated in the captured environment,
                    // not in the call scope under construction.
                    Some(default) => self.eval_expression(default, &function.closure)?,
                    None => {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::MissingArgument {
                                parameter: parameter.name.clone(),
                            },
                            at,
                        ));
                    }
                },
            };
            local.borrow_mut().define(parameter.name.clone(), value);
        }

        match self.exec_statement(&function.declaration.body, &local)? {
            Flow::Normal => Ok(Value::None),
            Flow::Return(value) => Ok(value),
            // A loop signal escaping the body has no loop to land in.
            Flow::Break(position) => Err(RuntimeError::new(
                RuntimeErrorKind::BreakOutsideLoop,
                position,
            )),
            Flow::Continue(position) => Err(RuntimeError::new(
                RuntimeErrorKind::ContinueOutsideLoop,
                position,
            )),
        }
    }

    fn call_builtin(
        &mut self,
        builtin: BuiltinFunction,
        arguments: Vec<Value>,
        at: Position,
    ) -> EvalResult {
        match builtin {
            BuiltinFunction::Print => {
                let line = arguments
                    .iter()
                    .map(Value::to_output)
                    .collect::<Vec<_>>()
                    .join(" ");
                self.output.push(line);
                Ok(Value::None)
            }
            BuiltinFunction::Range => {
                if arguments.is_empty() || arguments.len() > 3 {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::BuiltinArity {
                            name: "range",
                            expected: "from 1 to 3",
                            found: arguments.len(),
                        },
                        at,
                    ));
                }
                let mut bounds = Vec::with_capacity(arguments.len());
                for argument in &arguments {
                    match argument {
                        Value::Int(value) => bounds.push(*value),
                        other => {
                            return Err(RuntimeError::new(
                                RuntimeErrorKind::RangeArgumentType {
                                    type_name: other.type_name(),
                                },
                                at,
                            ));
                        }
                    }
                }
                let mut bounds = bounds.into_iter();
                let first = bounds.next().unwrap_or(0);
                let (start, stop) = match bounds.next() {
                    Some(second) => (first, second),
                    None => (0, first),
                };
                let step = bounds.next().unwrap_or(1);
                if step == 0 {
                    return Err(RuntimeError::new(RuntimeErrorKind::RangeZeroStep, at));
                }
                Ok(Value::Range { start, stop, step })
            }
            BuiltinFunction::Len => match expect_single(&arguments, "len", at)? {
                Value::Str(value) => Ok(Value::Int(value.chars().count() as i64)),
                other => Err(RuntimeError::new(
                    RuntimeErrorKind::UnsupportedLen {
                        type_name: other.type_name(),
                    },
                    at,
                )),
            },
            BuiltinFunction::Str => {
                let value = expect_single(&arguments, "str", at)?;
                Ok(Value::Str(value.to_output()))
            }
            BuiltinFunction::Int => convert_int(expect_single(&arguments, "int", at)?, at),
            BuiltinFunction::Float => convert_float(expect_single(&arguments, "float", at)?, at),
            BuiltinFunction::Type => {
                let value = expect_single(&arguments, "type", at)?;
                Ok(Value::Str(format!("<class '{}'>", value.type_name())))
            }
            BuiltinFunction::Abs => match expect_single(&arguments, "abs", at)? {
                Value::Int(value) => Ok(Value::Int(value.wrapping_abs())),
                Value::Float(value) => Ok(Value::Float(value.abs())),
                other => Err(RuntimeError::new(
                    RuntimeErrorKind::UnsupportedAbs {
                        type_name: other.type_name(),
                    },
                    at,
                )),
            },
        }
    }
}

fn expect_single<'a>(
    arguments: &'a [Value],
    name: &'static str,
    at: Position,
) -> Result<&'a Value, RuntimeError> {
    match arguments {
        [value] => Ok(value),
        _ => Err(RuntimeError::new(
            RuntimeErrorKind::BuiltinArity {
                name,
                expected: "exactly 1",
                found: arguments.len(),
            },
            at,
        )),
    }
}

fn literal_value(token: &Token, at: Position) -> EvalResult {
    match token.kind {
        TokenKind::Integer => token.lexeme.parse::<i64>().map(Value::Int).map_err(|_| {
            RuntimeError::new(
                RuntimeErrorKind::InvalidLiteral {
                    literal: token.lexeme.clone(),
                },
                at,
            )
        }),
        TokenKind::Float => token.lexeme.parse::<f64>().map(Value::Float).map_err(|_| {
            RuntimeError::new(
                RuntimeErrorKind::InvalidLiteral {
                    literal: token.lexeme.clone(),
                },
                at,
            )
        }),
        TokenKind::String => Ok(Value::Str(token.lexeme.clone())),
        TokenKind::Boolean => Ok(Value::Bool(token.lexeme == "True")),
        TokenKind::None => Ok(Value::None),
        _ => Err(RuntimeError::new(
            RuntimeErrorKind::InvalidLiteral {
                literal: token.lexeme.clone(),
            },
            at,
        )),
    }
}

fn apply_binary(left: Value, op: TokenKind, right: Value, at: Position) -> EvalResult {
    // Logical operators combine the truthiness of both evaluated operands.
    if matches!(op, TokenKind::And | TokenKind::Or) {
        let combined = match op {
            TokenKind::And => left.is_truthy() && right.is_truthy(),
            _ => left.is_truthy() || right.is_truthy(),
        };
        return Ok(Value::Bool(combined));
    }

    let type_names = (left.type_name(), right.type_name());
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => int_binary(l, op, r, at),
        (Value::Int(l), Value::Float(r)) => float_binary(l as f64, op, r, type_names, at),
        (Value::Float(l), Value::Int(r)) => float_binary(l, op, r as f64, type_names, at),
        (Value::Float(l), Value::Float(r)) => float_binary(l, op, r, type_names, at),
        (Value::Str(l), Value::Str(r)) => string_binary(l, op, r, at),
        _ => Err(unsupported(op, type_names, at)),
    }
}

fn int_binary(l: i64, op: TokenKind, r: i64, at: Position) -> EvalResult {
    let value = match op {
        TokenKind::Plus => Value::Int(l.wrapping_add(r)),
        TokenKind::Minus => Value::Int(l.wrapping_sub(r)),
        TokenKind::Multiply => Value::Int(l.wrapping_mul(r)),
        TokenKind::Divide => {
            if r == 0 {
                return Err(RuntimeError::new(RuntimeErrorKind::DivisionByZero, at));
            }
            // Integer '/' is true division.
            Value::Float(l as f64 / r as f64)
        }
        TokenKind::Modulo => {
            if r == 0 {
                return Err(RuntimeError::new(RuntimeErrorKind::ModuloByZero, at));
            }
            Value::Int(l.wrapping_rem(r))
        }
        TokenKind::Equal => Value::Bool(l == r),
        TokenKind::NotEqual => Value::Bool(l != r),
        TokenKind::Less => Value::Bool(l < r),
        TokenKind::LessEqual => Value::Bool(l <= r),
        TokenKind::Greater => Value::Bool(l > r),
        TokenKind::GreaterEqual => Value::Bool(l >= r),
        _ => return Err(unsupported(op, ("int", "int"), at)),
    };
    Ok(value)
}

fn float_binary(
    l: f64,
    op: TokenKind,
    r: f64,
    type_names: (&'static str, &'static str),
    at: Position,
) -> EvalResult {
    let value = match op {
        TokenKind::Plus => Value::Float(l + r),
        TokenKind::Minus => Value::Float(l - r),
        TokenKind::Multiply => Value::Float(l * r),
        TokenKind::Divide => {
            if r == 0.0 {
                return Err(RuntimeError::new(RuntimeErrorKind::DivisionByZero, at));
            }
            Value::Float(l / r)
        }
        TokenKind::Equal => Value::Bool(l == r),
        TokenKind::NotEqual => Value::Bool(l != r),
        TokenKind::Less => Value::Bool(l < r),
        TokenKind::LessEqual => Value::Bool(l <= r),
        TokenKind::Greater => Value::Bool(l > r),
        TokenKind::GreaterEqual => Value::Bool(l >= r),
        // No float modulo, floor division, or power.
        _ => return Err(unsupported(op, type_names, at)),
    };
    Ok(value)
}

fn string_binary(l: String, op: TokenKind, r: String, at: Position) -> EvalResult {
    let value = match op {
        TokenKind::Plus => Value::Str(l + &r),
        TokenKind::Equal => Value::Bool(l == r),
        TokenKind::NotEqual => Value::Bool(l != r),
        TokenKind::Less => Value::Bool(l < r),
        TokenKind::LessEqual => Value::Bool(l <= r),
        TokenKind::Greater => Value::Bool(l > r),
        TokenKind::GreaterEqual => Value::Bool(l >= r),
        _ => return Err(unsupported(op, ("str", "str"), at)),
    };
    Ok(value)
}

fn unsupported(op: TokenKind, type_names: (&'static str, &'static str), at: Position) -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::UnsupportedBinaryOp {
            op: op.symbol(),
            left: type_names.0,
            right: type_names.1,
        },
        at,
    )
}

fn convert_int(value: &Value, at: Position) -> EvalResult {
    match value {
        Value::Int(v) => Ok(Value::Int(*v)),
        Value::Float(v) => Ok(Value::Int(*v as i64)),
        Value::Bool(v) => Ok(Value::Int(i64::from(*v))),
        Value::Str(s) => match s.as_str() {
            "True" => Ok(Value::Int(1)),
            "False" => Ok(Value::Int(0)),
            _ => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                RuntimeError::new(
                    RuntimeErrorKind::InvalidIntLiteral { literal: s.clone() },
                    at,
                )
            }),
        },
        other => Err(RuntimeError::new(
            RuntimeErrorKind::UnsupportedConversion {
                name: "int",
                type_name: other.type_name(),
            },
            at,
        )),
    }
}

fn convert_float(value: &Value, at: Position) -> EvalResult {
    match value {
        Value::Float(v) => Ok(Value::Float(*v)),
        Value::Int(v) => Ok(Value::Float(*v as f64)),
        Value::Bool(v) => Ok(Value::Float(if *v { 1.0 } else { 0.0 })),
        Value::Str(s) => match s.as_str() {
            "True" => Ok(Value::Float(1.0)),
            "False" => Ok(Value::Float(0.0)),
            _ => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                RuntimeError::new(
                    RuntimeErrorKind::InvalidFloatLiteral { literal: s.clone() },
                    at,
                )
            }),
        },
        other => Err(RuntimeError::new(
            RuntimeErrorKind::UnsupportedConversion {
                name: "float",
                type_name: other.type_name(),
            },
            at,
        )),
    }
}
