use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::builtins::BuiltinFunction;
use crate::parser::ast::FunctionDecl;

use super::runtime::Environment;

/// Runtime value model used by the tree-walking interpreter.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Function(Rc<FunctionValue>),
    Builtin(BuiltinFunction),
    /// First-class iteration bounds produced by `range` and consumed by `for`.
    Range { start: i64, stop: i64, step: i64 },
}

/// A user function: its declaration plus the environment it closed over.
pub struct FunctionValue {
    pub declaration: Rc<FunctionDecl>,
    pub closure: Rc<RefCell<Environment>>,
}

impl fmt::Debug for FunctionValue {
    // The closure may transitively contain this function; print the name only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("declaration", &self.declaration.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (
                Value::Range { start, stop, step },
                Value::Range {
                    start: other_start,
                    stop: other_stop,
                    step: other_step,
                },
            ) => start == other_start && stop == other_stop && step == other_step,
            _ => false,
        }
    }
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(value) => *value,
            Value::Int(value) => *value != 0,
            // NaN compares unequal to zero and is therefore truthy.
            Value::Float(value) => *value != 0.0,
            Value::Str(value) => !value.is_empty(),
            Value::Function(_) | Value::Builtin(_) | Value::Range { .. } => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Range { .. } => "range",
        }
    }

    /// Canonical string form used by `print` and `str`.
    pub fn to_output(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(value) => {
                if *value {
                    "True".to_string()
                } else {
                    "False".to_string()
                }
            }
            Value::Int(value) => value.to_string(),
            Value::Float(value) => format!("{value}"),
            Value::Str(value) => value.clone(),
            Value::Function(function) => format!("<function {}>", function.declaration.name),
            Value::Builtin(builtin) => format!("<built-in function {}>", builtin.name()),
            Value::Range { start, stop, step } => {
                if *step == 1 {
                    format!("range({start}, {stop})")
                } else {
                    format!("range({start}, {stop}, {step})")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_the_value_table() {
        assert!(!Value::None.is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Float(0.5).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(Value::Float(f64::NAN).is_truthy());
        assert!(Value::Str("x".to_string()).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Builtin(BuiltinFunction::Print).is_truthy());
        assert!(
            Value::Range {
                start: 0,
                stop: 0,
                step: 1
            }
            .is_truthy()
        );
    }

    #[test]
    fn cross_arm_equality_is_false() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Bool(true));
        assert_ne!(Value::Int(0), Value::None);
        assert_ne!(Value::Str("1".to_string()), Value::Int(1));
    }

    #[test]
    fn same_arm_equality_is_structural() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_eq!(Value::Str("a".to_string()), Value::Str("a".to_string()));
        assert_eq!(
            Value::Range {
                start: 1,
                stop: 5,
                step: 2
            },
            Value::Range {
                start: 1,
                stop: 5,
                step: 2
            }
        );
    }

    #[test]
    fn canonical_output_forms() {
        assert_eq!(Value::None.to_output(), "None");
        assert_eq!(Value::Bool(true).to_output(), "True");
        assert_eq!(Value::Bool(false).to_output(), "False");
        assert_eq!(Value::Int(-4).to_output(), "-4");
        assert_eq!(Value::Float(2.5).to_output(), "2.5");
        assert_eq!(Value::Str("plain".to_string()).to_output(), "plain");
        assert_eq!(
            Value::Builtin(BuiltinFunction::Len).to_output(),
            "<built-in function len>"
        );
        assert_eq!(
            Value::Range {
                start: 0,
                stop: 3,
                step: 1
            }
            .to_output(),
            "range(0, 3)"
        );
        assert_eq!(
            Value::Range {
                start: 2,
                stop: 10,
                step: 3
            }
            .to_output(),
            "range(2, 10, 3)"
        );
    }

    #[test]
    fn type_names_cover_every_arm() {
        assert_eq!(Value::None.type_name(), "NoneType");
        assert_eq!(Value::Bool(true).type_name(), "bool");
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::Float(1.0).type_name(), "float");
        assert_eq!(Value::Str(String::new()).type_name(), "str");
        assert_eq!(
            Value::Builtin(BuiltinFunction::Abs).type_name(),
            "builtin_function_or_method"
        );
        assert_eq!(
            Value::Range {
                start: 0,
                stop: 0,
                step: 1
            }
            .type_name(),
            "range"
        );
    }
}
