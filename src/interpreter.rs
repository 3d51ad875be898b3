//! Tree-walking evaluator.
//!
//! Statements execute directly against a chain of lexical environments.
//! Control transfer for `return`/`break`/`continue` travels as a tagged flow
//! result; diagnostics travel in the error channel.

use std::cell::RefCell;
use std::rc::Rc;

use crate::parser::ast::Program;

mod error;
mod runtime;
mod value;

pub use crate::builtins::BuiltinFunction;
pub use error::{RuntimeError, RuntimeErrorKind};
pub use runtime::Environment;
pub use value::{FunctionValue, Value};

use runtime::{Flow, Runtime};

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    runtime: Runtime,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Environment::root();
        globals
            .borrow_mut()
            .define("__name__", Value::Str("__main__".to_string()));
        Self {
            globals,
            runtime: Runtime::new(),
        }
    }

    /// Runs a program, yielding the value of its last top-level expression.
    ///
    /// A `return` at the top level yields its value to the caller; `break`
    /// and `continue` reaching the top are diagnostics.
    pub fn run(&mut self, program: &Program) -> Result<Value, RuntimeError> {
        self.runtime.last_value = Value::None;
        match self
            .runtime
            .exec_statements(&program.statements, &self.globals)?
        {
            Flow::Normal => Ok(self.runtime.last_value.clone()),
            Flow::Return(value) => Ok(value),
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

    /// Drains the lines printed so far; one entry per `print` call.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.runtime.output)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::token::Position;
    use crate::parser::ast::{Expression, ExpressionKind, Statement, StatementKind};
    use crate::{lexer, parser};
    use indoc::indoc;

    fn run(source: &str) -> (Value, Vec<String>) {
        let tokens = lexer::tokenize(source).expect("tokenize should succeed");
        let program = parser::parse_tokens(tokens).expect("parse should succeed");
        let mut interpreter = Interpreter::new();
        let value = interpreter.run(&program).expect("run should succeed");
        (value, interpreter.take_output())
    }

    fn run_err(source: &str) -> RuntimeError {
        let tokens = lexer::tokenize(source).expect("tokenize should succeed");
        let program = parser::parse_tokens(tokens).expect("parse should succeed");
        let mut interpreter = Interpreter::new();
        interpreter
            .run(&program)
            .expect_err("expected runtime failure")
    }

    fn output(source: &str) -> Vec<String> {
        run(source).1
    }

    fn value(source: &str) -> Value {
        run(source).0
    }

    #[test]
    fn prints_hello_world() {
        assert_eq!(output("print(\"Hello, World!\")\n"), vec!["Hello, World!"]);
    }

    #[test]
    fn evaluates_arithmetic() {
        assert_eq!(value("1 + 2 * 3\n"), Value::Int(7));
        assert_eq!(value("10 - 4 - 3\n"), Value::Int(3));
        assert_eq!(value("7 % 3\n"), Value::Int(1));
        assert_eq!(value("7 / 2\n"), Value::Float(3.5));
        assert_eq!(value("1 + 2.5\n"), Value::Float(3.5));
        assert_eq!(value("2.5 * 2\n"), Value::Float(5.0));
        assert_eq!(value("-5 + 1\n"), Value::Int(-4));
    }

    #[test]
    fn assignment_yields_the_assigned_value() {
        assert_eq!(value("x = 4 * 5\nx\n"), Value::Int(20));
        let (result, _) = run("x = y = 3\nprint(x + y)\n");
        assert_eq!(result, Value::None);
    }

    #[test]
    fn comparison_consistency_for_numbers() {
        for (a, b) in [(1, 1), (1, 2), (5, -3)] {
            let eq = value(&format!("{a} == {b}\n"));
            let ne = value(&format!("{a} != {b}\n"));
            let lt = value(&format!("{a} < {b}\n"));
            let gt = value(&format!("{a} > {b}\n"));
            assert_eq!(eq, Value::Bool(a == b));
            assert_eq!(ne, Value::Bool(a != b));
            if eq == Value::Bool(true) {
                assert_eq!(lt, Value::Bool(false));
                assert_eq!(gt, Value::Bool(false));
            }
        }
    }

    #[test]
    fn string_concatenation_and_comparison() {
        assert_eq!(value("\"foo\" + \"bar\"\n"), Value::Str("foobar".to_string()));
        assert_eq!(value("\"abc\" < \"abd\"\n"), Value::Bool(true));
        assert_eq!(value("\"a\" == \"a\"\n"), Value::Bool(true));
        assert_eq!(output("print(len(\"foo\" + \"bar\"))\n"), vec!["6"]);
    }

    #[test]
    fn division_and_modulo_by_zero_are_fatal() {
        assert_eq!(run_err("1 / 0\n").kind, RuntimeErrorKind::DivisionByZero);
        assert_eq!(run_err("1.5 / 0\n").kind, RuntimeErrorKind::DivisionByZero);
        assert_eq!(run_err("1 / 0.0\n").kind, RuntimeErrorKind::DivisionByZero);
        assert_eq!(run_err("1 % 0\n").kind, RuntimeErrorKind::ModuloByZero);
    }

    #[test]
    fn unsupported_operator_combinations_are_fatal() {
        // Floor division and power parse but have no evaluation rule.
        assert!(matches!(
            run_err("4 // 2\n").kind,
            RuntimeErrorKind::UnsupportedBinaryOp { op: "//", .. }
        ));
        assert!(matches!(
            run_err("2 ** 3\n").kind,
            RuntimeErrorKind::UnsupportedBinaryOp { op: "**", .. }
        ));
        // Modulo is integer-only.
        assert!(matches!(
            run_err("5.0 % 2\n").kind,
            RuntimeErrorKind::UnsupportedBinaryOp { op: "%", .. }
        ));
        // Comparisons are defined per-arm; booleans have none.
        assert!(matches!(
            run_err("True == False\n").kind,
            RuntimeErrorKind::UnsupportedBinaryOp { op: "==", .. }
        ));
        assert!(matches!(
            run_err("\"a\" - \"b\"\n").kind,
            RuntimeErrorKind::UnsupportedBinaryOp {
                op: "-",
                left: "str",
                right: "str"
            }
        ));
        assert!(matches!(
            run_err("None + 1\n").kind,
            RuntimeErrorKind::UnsupportedBinaryOp { op: "+", .. }
        ));
    }

    #[test]
    fn logic_operators_evaluate_both_sides() {
        let source = indoc! {"
            def loud(v):
                print(v)
                return v

            result = loud(0) and loud(1)
            print(result)
            result = loud(\"\") or loud(\"x\")
            print(result)
        "};
        // Both operands run even when the left side decides the outcome.
        assert_eq!(output(source), vec!["0", "1", "False", "", "x", "True"]);
    }

    #[test]
    fn unary_minus_negates_integers_only() {
        assert_eq!(value("-7\n"), Value::Int(-7));
        // Non-integers pass through unchanged.
        assert_eq!(value("-2.5\n"), Value::Float(2.5));
        assert_eq!(value("-\"s\"\n"), Value::Str("s".to_string()));
    }

    #[test]
    fn unary_not_passes_the_operand_through() {
        assert_eq!(value("not True\n"), Value::Bool(true));
        assert_eq!(value("not 0\n"), Value::Int(0));
    }

    #[test]
    fn if_elif_else_selects_by_truthiness() {
        let source = indoc! {"
            def describe(n):
                if n < 0:
                    return \"negative\"
                elif n == 0:
                    return \"zero\"
                elif n < 10:
                    return \"small\"
                else:
                    return \"large\"

            print(describe(-5))
            print(describe(0))
            print(describe(7))
            print(describe(42))
        "};
        assert_eq!(output(source), vec!["negative", "zero", "small", "large"]);
    }

    #[test]
    fn truthiness_drives_conditions() {
        let source = indoc! {"
            if \"x\" and 1:
                print(\"both\")
            if 0 or \"\":
                print(\"neither\")
            else:
                print(\"fallback\")
            if None:
                print(\"none\")
            else:
                print(\"no none\")
        "};
        assert_eq!(output(source), vec!["both", "fallback", "no none"]);
    }

    #[test]
    fn while_loop_with_break_and_continue() {
        let source = indoc! {"
            total = 0
            i = 0
            while i < 10:
                i = i + 1
                if i % 2 == 0:
                    continue
                if i > 7:
                    break
                total = total + i
            print(total)
            print(i)
        "};
        assert_eq!(output(source), vec!["16", "9"]);
    }

    #[test]
    fn for_loop_over_ranges() {
        assert_eq!(
            output("for i in range(3):\n    print(i)\n"),
            vec!["0", "1", "2"]
        );
        assert_eq!(
            output("for i in range(2, 10, 3):\n    print(i)\n"),
            vec!["2", "5", "8"]
        );
        // The loop variable stays bound after the loop.
        assert_eq!(
            output("for i in range(3):\n    pass\nprint(i)\n"),
            vec!["2"]
        );
    }

    #[test]
    fn descending_ranges_are_empty() {
        // The termination predicate is `i < stop`, so a negative step with
        // start above stop never runs.
        assert_eq!(
            output("for i in range(5, 0, -1):\n    print(i)\nprint(\"done\")\n"),
            vec!["done"]
        );
    }

    #[test]
    fn for_over_non_range_values_is_a_no_op() {
        assert_eq!(
            output("for c in \"abc\":\n    print(c)\nprint(\"after\")\n"),
            vec!["after"]
        );
        assert_eq!(output("for x in 5:\n    print(x)\nprint(\"after\")\n"), vec!["after"]);
    }

    #[test]
    fn range_argument_validation() {
        assert_eq!(
            run_err("range(\"a\")\n").kind,
            RuntimeErrorKind::RangeArgumentType { type_name: "str" }
        );
        assert_eq!(run_err("range(1, 5, 0)\n").kind, RuntimeErrorKind::RangeZeroStep);
        assert!(matches!(
            run_err("range()\n").kind,
            RuntimeErrorKind::BuiltinArity { name: "range", .. }
        ));
        assert_eq!(
            value("range(4)\n"),
            Value::Range {
                start: 0,
                stop: 4,
                step: 1
            }
        );
        assert_eq!(output("print(range(2, 8, 2))\n"), vec!["range(2, 8, 2)"]);
    }

    #[test]
    fn recursive_functions() {
        let source = indoc! {"
            def fib(n):
                if n <= 1:
                    return n
                return fib(n - 1) + fib(n - 2)
            print(fib(10))
        "};
        assert_eq!(output(source), vec!["55"]);
    }

    #[test]
    fn closures_capture_their_defining_environment() {
        let source = indoc! {"
            def make_counter():
                n = 0
                def inc():
                    return n
                return inc

            c = make_counter()
            print(c())
        "};
        assert_eq!(output(source), vec!["0"]);
    }

    #[test]
    fn default_parameters_evaluate_in_the_captured_environment() {
        let source = indoc! {"
            base = 100
            def g(a, b=base + 5):
                return a + b
            print(g(3))
            print(g(3, 4))
        "};
        assert_eq!(output(source), vec!["108", "7"]);
    }

    #[test]
    fn functions_without_return_yield_none() {
        assert_eq!(
            output("def f():\n    pass\nprint(f())\n"),
            vec!["None"]
        );
    }

    #[test]
    fn return_stops_the_function_body() {
        let source = indoc! {"
            def f():
                return 7
                print(\"unreachable\")
            print(f())
        "};
        assert_eq!(output(source), vec!["7"]);
    }

    #[test]
    fn assignment_creates_a_local_binding() {
        let source = indoc! {"
            x = 1
            def shadow():
                x = 2
                return x
            print(shadow())
            print(x)
        "};
        assert_eq!(output(source), vec!["2", "1"]);
    }

    #[test]
    fn arity_errors() {
        assert_eq!(
            run_err("def f(a, b):\n    return a\nf(1)\n").kind,
            RuntimeErrorKind::MissingArgument {
                parameter: "b".to_string()
            }
        );
        assert_eq!(
            run_err("def f(a):\n    return a\nf(1, 2)\n").kind,
            RuntimeErrorKind::TooManyArguments {
                expected: 1,
                found: 2
            }
        );
        assert!(matches!(
            run_err("len(\"a\", \"b\")\n").kind,
            RuntimeErrorKind::BuiltinArity { name: "len", .. }
        ));
    }

    #[test]
    fn calling_a_non_callable_is_fatal() {
        assert_eq!(
            run_err("x = 1\nx()\n").kind,
            RuntimeErrorKind::NotCallable { type_name: "int" }
        );
    }

    #[test]
    fn undefined_names_are_fatal_with_position() {
        let error = run_err("x = 1\nprint(missing)\n");
        assert_eq!(
            error.kind,
            RuntimeErrorKind::UndefinedVariable {
                name: "missing".to_string()
            }
        );
        assert_eq!(error.position, Position::new(2, 7));
    }

    #[test]
    fn loop_signals_outside_loops_are_fatal() {
        assert_eq!(run_err("break\n").kind, RuntimeErrorKind::BreakOutsideLoop);
        assert_eq!(
            run_err("continue\n").kind,
            RuntimeErrorKind::ContinueOutsideLoop
        );
        // A signal escaping a function body has no loop to land in, even
        // when the call site is inside one.
        assert_eq!(
            run_err("def f():\n    break\nwhile True:\n    f()\n").kind,
            RuntimeErrorKind::BreakOutsideLoop
        );
    }

    #[test]
    fn top_level_return_yields_its_value_to_the_driver() {
        assert_eq!(value("return 5\n"), Value::Int(5));
        assert_eq!(value("return\n"), Value::None);
    }

    #[test]
    fn builtin_conversions() {
        assert_eq!(value("int(3.9)\n"), Value::Int(3));
        assert_eq!(value("int(\"17\")\n"), Value::Int(17));
        assert_eq!(value("int(\"True\")\n"), Value::Int(1));
        assert_eq!(value("int(False)\n"), Value::Int(0));
        assert_eq!(value("float(2)\n"), Value::Float(2.0));
        assert_eq!(value("float(\"2.5\")\n"), Value::Float(2.5));
        assert_eq!(value("float(\"False\")\n"), Value::Float(0.0));
        assert_eq!(value("str(42)\n"), Value::Str("42".to_string()));
        assert_eq!(value("str(None)\n"), Value::Str("None".to_string()));
        assert_eq!(
            run_err("int(\"abc\")\n").kind,
            RuntimeErrorKind::InvalidIntLiteral {
                literal: "abc".to_string()
            }
        );
        assert_eq!(
            run_err("float(\"abc\")\n").kind,
            RuntimeErrorKind::InvalidFloatLiteral {
                literal: "abc".to_string()
            }
        );
        assert_eq!(
            run_err("int(None)\n").kind,
            RuntimeErrorKind::UnsupportedConversion {
                name: "int",
                type_name: "NoneType"
            }
        );
    }

    #[test]
    fn builtin_type_and_abs_and_len() {
        assert_eq!(value("type(1)\n"), Value::Str("<class 'int'>".to_string()));
        assert_eq!(value("type(1.0)\n"), Value::Str("<class 'float'>".to_string()));
        assert_eq!(value("type(\"s\")\n"), Value::Str("<class 'str'>".to_string()));
        assert_eq!(value("type(None)\n"), Value::Str("<class 'NoneType'>".to_string()));
        assert_eq!(value("abs(-7)\n"), Value::Int(7));
        assert_eq!(value("abs(2.5)\n"), Value::Float(2.5));
        assert_eq!(value("len(\"hello\")\n"), Value::Int(5));
        assert_eq!(
            run_err("len(1)\n").kind,
            RuntimeErrorKind::UnsupportedLen { type_name: "int" }
        );
        assert_eq!(
            run_err("abs(\"x\")\n").kind,
            RuntimeErrorKind::UnsupportedAbs { type_name: "str" }
        );
    }

    #[test]
    fn dunder_name_is_prebound() {
        assert_eq!(output("print(__name__)\n"), vec!["__main__"]);
    }

    #[test]
    fn builtin_names_resolve_before_user_bindings() {
        // Binding the name does not hide the builtin.
        assert_eq!(output("print = 5\nprint(1)\n"), vec!["1"]);
        assert_eq!(
            output("print(str(print))\n"),
            vec!["<built-in function print>"]
        );
    }

    #[test]
    fn print_joins_arguments_with_spaces() {
        assert_eq!(
            output("print(True, \"hello\", None, 1.5)\n"),
            vec!["True hello None 1.5"]
        );
        assert_eq!(output("print()\n"), vec![""]);
    }

    #[test]
    fn float_division_uses_host_formatting() {
        assert_eq!(
            output("x = 10\ny = 3\nprint(x / y)\nprint(x % y)\n"),
            vec![(10.0f64 / 3.0).to_string(), "1".to_string()]
        );
    }

    #[test]
    fn class_definitions_bind_a_placeholder() {
        let source = indoc! {"
            class Greeter:
                print(\"not executed\")
            print(Greeter)
        "};
        assert_eq!(output(source), vec!["__class_Greeter"]);
    }

    #[test]
    fn list_and_dict_literals_evaluate_to_stubs() {
        assert_eq!(value("[1, 2, 3]\n"), Value::Str("[list]".to_string()));
        assert_eq!(value("{\"a\": 1}\n"), Value::Str("[dict]".to_string()));
        // Elements are not evaluated.
        assert_eq!(output("[print(\"effect\")]\nprint(\"end\")\n"), vec!["end"]);
    }

    #[test]
    fn member_expressions_evaluate_to_none() {
        // The parser never produces Member; exercise the evaluator directly.
        let object = Expression::new(
            ExpressionKind::Identifier("obj".to_string()),
            Position::start(),
        );
        let member = Expression::new(
            ExpressionKind::Member {
                object: Box::new(object),
                name: "field".to_string(),
            },
            Position::start(),
        );
        let program = Program {
            statements: vec![Statement::new(
                StatementKind::Expr(member),
                Position::start(),
            )],
        };
        let mut interpreter = Interpreter::new();
        assert_eq!(interpreter.run(&program).expect("run should succeed"), Value::None);
    }

    #[test]
    fn empty_programs_yield_none() {
        assert_eq!(value(""), Value::None);
        assert_eq!(value("   "), Value::None);
        assert_eq!(value("# comment only\n"), Value::None);
    }

    #[test]
    fn last_expression_value_survives_trailing_definitions() {
        assert_eq!(value("1 + 1\ndef f():\n    pass\n"), Value::Int(2));
    }

    #[test]
    fn globals_persist_across_runs() {
        let mut interpreter = Interpreter::new();
        let first = parser::parse_tokens(lexer::tokenize("x = 41\n").expect("lex"))
            .expect("parse");
        interpreter.run(&first).expect("first run");
        let second = parser::parse_tokens(lexer::tokenize("x + 1\n").expect("lex"))
            .expect("parse");
        assert_eq!(interpreter.run(&second).expect("second run"), Value::Int(42));
    }
}
