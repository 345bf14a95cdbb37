//! Built-in operations registry.
//!
//! This module provides the fixed table of builtin operations the evaluator starts from:
//! native procedures that receive already-evaluated arguments, and the special forms
//! that control evaluation of their operands.
//!
//! ```scheme
//! (+ 1 2 3)            ; 6
//! (+ 1 2.5)            ; 3.5, any float makes the result inexact
//! (eq? '() '())        ; #t
//! (eqv? "ab" "ab")     ; #t, strings compare by content under eqv?
//! (not 0)              ; #f, only #f is false
//! ```
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: Evaluate all arguments before application (e.g., `+`, `not`, `car`)
//! - **Special Forms**: Control evaluation of arguments (e.g., `if`, `define`, `lambda`)
//!
//! Functions are bound as procedures in the global environment by
//! [`create_global_env`](crate::evaluator::create_global_env). Special forms are
//! recognized by the evaluator through the same registry.
//!
//! ## Error Handling
//!
//! Every builtin enforces its own arity and type contract and reports a violation by
//! returning an [`Error`], which becomes an ordinary error value at the evaluation
//! boundary. An error operand is propagated unchanged before any checking happens.
//!
//! - **Arity Checking**: Strict argument count validation for all operations
//! - **Type Safety**: Numeric operations reject non-numbers (`(= "a" "a")` is an error)
//! - **Overflow Detection**: Exact arithmetic reports overflow instead of wrapping
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** following the signature `fn(args: &[Value]) -> Result<Value, Error>`
//! 2. **Add to BUILTIN_OPS** with its Scheme identifier and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{Number, Value};
use crate::evaluator::{
    Environment, FrameId, Tail, eval_and, eval_begin, eval_cond, eval_define, eval_if,
    eval_lambda, eval_let, eval_or, eval_quote, eval_set,
};

/// Canonical signature of every native procedure
pub type OperationFn = fn(&[Value]) -> Result<Value, Error>;

/// Signature of special forms: unevaluated operands, the environment, the frame they are
/// evaluated in and the current nesting depth
pub(crate) type SpecialFormFn =
    fn(&[Value], &mut Environment, FrameId, usize) -> Result<Tail, Error>;

/// Number of arguments an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn accepts(&self, got: usize) -> bool {
        match *self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
            Arity::Any => true,
        }
    }

    pub fn validate(&self, got: usize) -> Result<(), Error> {
        if self.accepts(got) {
            Ok(())
        } else {
            Err(Error::arity_error(*self, got))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Represents the implementation of a built-in expression (function or special form)
#[derive(Clone, Copy)]
pub(crate) enum OpKind {
    /// Regular function that takes evaluated arguments and returns a value
    Function(OperationFn),
    /// Special form that requires access to the environment and unevaluated arguments
    SpecialForm(SpecialFormFn),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub(crate) struct BuiltinOp {
    /// The Scheme identifier for this operation
    pub scheme_id: &'static str,
    /// The implementation of this operation (function or special form)
    pub op_kind: OpKind,
    /// Expected number of arguments (operands, for special forms)
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.scheme_id == other.scheme_id
    }
}

impl BuiltinOp {
    pub(crate) fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    /// Check the operand count, naming the operation on failure
    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity
            .validate(arg_count)
            .map_err(|_| Error::arity_error_for(self.scheme_id, self.arity, arg_count))
    }
}

//
// Argument helpers
//

/// Destructure a fixed-size argument list
fn fixed_args<'a, const N: usize>(name: &str, args: &'a [Value]) -> Result<&'a [Value; N], Error> {
    args.try_into()
        .map_err(|_| Error::arity_error_for(name, Arity::Exact(N), args.len()))
}

fn to_number(name: &str, value: &Value) -> Result<Number, Error> {
    value
        .as_number()
        .ok_or_else(|| Error::TypeError(format!("{name} requires numbers, got {value}")))
}

fn to_numbers(name: &str, args: &[Value]) -> Result<Vec<Number>, Error> {
    args.iter().map(|arg| to_number(name, arg)).collect()
}

/// Ordering of two numbers; exact pairs compare exactly, anything else as floats
fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    match (a, b) {
        (Number::Integer(x), Number::Integer(y)) => Some(x.cmp(y)),
        _ => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

//
// Builtin Function Implementations
//

// Binary arithmetic step: checked for exact operands, float otherwise
macro_rules! arithmetic_step {
    ($name:ident, $checked:ident, $op:tt, $overflow_msg:expr) => {
        fn $name(a: Number, b: Number) -> Result<Number, Error> {
            match (a, b) {
                (Number::Integer(x), Number::Integer(y)) => x
                    .$checked(y)
                    .map(Number::Integer)
                    .ok_or_else(|| Error::EvalError($overflow_msg.into())),
                _ => Ok(Number::Float(a.as_f64() $op b.as_f64())),
            }
        }
    };
}

arithmetic_step!(add_step, checked_add, +, "Integer overflow in addition");
arithmetic_step!(sub_step, checked_sub, -, "Integer overflow in subtraction");
arithmetic_step!(mul_step, checked_mul, *, "Integer overflow in multiplication");

fn div_step(a: Number, b: Number) -> Result<Number, Error> {
    match (a, b) {
        (_, Number::Integer(0)) => Err(Error::EvalError("Division by zero".into())),
        (Number::Integer(x), Number::Integer(y)) => match x.checked_rem(y) {
            Some(0) => x
                .checked_div(y)
                .map(Number::Integer)
                .ok_or_else(|| Error::EvalError("Integer overflow in division".into())),
            Some(_) => Ok(Number::Float(x as f64 / y as f64)),
            None => Err(Error::EvalError("Integer overflow in division".into())),
        },
        _ => Ok(Number::Float(a.as_f64() / b.as_f64())),
    }
}

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    let mut sum = Number::Integer(0);
    for n in to_numbers("+", args)? {
        sum = add_step(sum, n)?;
    }
    Ok(Value::number(sum))
}

fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    let mut product = Number::Integer(1);
    for n in to_numbers("*", args)? {
        product = mul_step(product, n)?;
    }
    Ok(Value::number(product))
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    let nums = to_numbers("-", args)?;
    match nums.as_slice() {
        [] => Err(Error::arity_error_for("-", Arity::AtLeast(1), 0)),
        [only] => Ok(Value::number(sub_step(Number::Integer(0), *only)?)),
        [first, rest @ ..] => {
            let mut result = *first;
            for n in rest {
                result = sub_step(result, *n)?;
            }
            Ok(Value::number(result))
        }
    }
}

fn builtin_div(args: &[Value]) -> Result<Value, Error> {
    let nums = to_numbers("/", args)?;
    match nums.as_slice() {
        [] => Err(Error::arity_error_for("/", Arity::AtLeast(1), 0)),
        [only] => Ok(Value::number(div_step(Number::Integer(1), *only)?)),
        [first, rest @ ..] => {
            let mut result = *first;
            for n in rest {
                result = div_step(result, *n)?;
            }
            Ok(Value::number(result))
        }
    }
}

fn builtin_numeric_eq(args: &[Value]) -> Result<Value, Error> {
    let [a, b] = fixed_args::<2>("=", args)?;
    let (a, b) = (to_number("=", a)?, to_number("=", b)?);
    Ok(Value::boolean(a.numeric_eq(&b)))
}

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op_str:expr, $($accept:pat_param)|+) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let nums = to_numbers($op_str, args)?;
            if nums.len() < 2 {
                return Err(Error::arity_error_for($op_str, Arity::AtLeast(2), nums.len()));
            }

            // Chain comparisons: all adjacent pairs must satisfy the comparison
            let holds = nums
                .windows(2)
                .all(|pair| matches!(compare_numbers(&pair[0], &pair[1]), $(Some($accept))|+));
            Ok(Value::boolean(holds))
        }
    };
}

numeric_comparison!(builtin_lt, "<", Ordering::Less);
numeric_comparison!(builtin_gt, ">", Ordering::Greater);
numeric_comparison!(builtin_le, "<=", Ordering::Less | Ordering::Equal);
numeric_comparison!(builtin_ge, ">=", Ordering::Greater | Ordering::Equal);

// Macro to generate max/min with inexact contagion
macro_rules! numeric_extremum {
    ($name:ident, $op_str:expr, $keep:pat_param) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let nums = to_numbers($op_str, args)?;
            let Some((first, rest)) = nums.split_first() else {
                return Err(Error::arity_error_for($op_str, Arity::AtLeast(1), 0));
            };

            let mut result = *first;
            for n in rest {
                if matches!(compare_numbers(n, &result), Some($keep)) {
                    result = *n;
                }
            }

            if nums.iter().any(|n| !n.is_exact()) {
                result = Number::Float(result.as_f64());
            }
            Ok(Value::number(result))
        }
    };
}

numeric_extremum!(builtin_max, "max", Ordering::Greater);
numeric_extremum!(builtin_min, "min", Ordering::Less);

fn builtin_eq(args: &[Value]) -> Result<Value, Error> {
    let [a, b] = fixed_args::<2>("eq?", args)?;
    Ok(Value::boolean(a.is_eq(b)))
}

fn builtin_eqv(args: &[Value]) -> Result<Value, Error> {
    let [a, b] = fixed_args::<2>("eqv?", args)?;
    Ok(Value::boolean(a.is_eqv(b)))
}

fn builtin_equal(args: &[Value]) -> Result<Value, Error> {
    let [a, b] = fixed_args::<2>("equal?", args)?;
    Ok(Value::boolean(a.is_equal(b)))
}

fn builtin_not(args: &[Value]) -> Result<Value, Error> {
    let [value] = fixed_args::<1>("not", args)?;
    Ok(Value::boolean(!value.is_truthy()))
}

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    match fixed_args::<1>("car", args)? {
        [Value::Pair(pair)] => Ok(pair.head()),
        [other] => Err(Error::TypeError(format!("car requires a pair, got {other}"))),
    }
}

fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    match fixed_args::<1>("cdr", args)? {
        [Value::Pair(pair)] => Ok(pair.tail()),
        [other] => Err(Error::TypeError(format!("cdr requires a pair, got {other}"))),
    }
}

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    let [head, tail] = fixed_args::<2>("cons", args)?;
    Ok(Value::cons(head.clone(), tail.clone()))
}

fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::list(args.iter().cloned()))
}

fn builtin_set_car(args: &[Value]) -> Result<Value, Error> {
    match fixed_args::<2>("set-car!", args)? {
        [Value::Pair(pair), value] => {
            pair.set_head(value.clone());
            Ok(Value::Unspecified)
        }
        [other, _] => Err(Error::TypeError(format!("set-car! requires a pair, got {other}"))),
    }
}

fn builtin_set_cdr(args: &[Value]) -> Result<Value, Error> {
    match fixed_args::<2>("set-cdr!", args)? {
        [Value::Pair(pair), value] => {
            pair.set_tail(value.clone());
            Ok(Value::Unspecified)
        }
        [other, _] => Err(Error::TypeError(format!("set-cdr! requires a pair, got {other}"))),
    }
}

// Macro to generate single-argument type predicates
macro_rules! type_predicate {
    ($name:ident, $op_str:expr, $value:ident => $test:expr) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let [$value] = fixed_args::<1>($op_str, args)?;
            Ok(Value::boolean($test))
        }
    };
}

type_predicate!(builtin_null, "null?", v => v.is_nil());
type_predicate!(builtin_pair, "pair?", v => matches!(v, Value::Pair(_)));
type_predicate!(builtin_number, "number?", v => matches!(v, Value::Number(_)));
type_predicate!(builtin_integer, "integer?", v => match v.as_number() {
    Some(Number::Integer(_)) => true,
    Some(Number::Float(x)) => x.is_finite() && x.fract() == 0.0,
    None => false,
});
type_predicate!(builtin_string, "string?", v => matches!(v, Value::String(_)));
type_predicate!(builtin_symbol, "symbol?", v => matches!(v, Value::Symbol(_)));
type_predicate!(builtin_boolean, "boolean?", v => matches!(v, Value::Bool(_)));
type_predicate!(builtin_procedure, "procedure?", v => matches!(v, Value::Procedure(_)));

fn builtin_string_append(args: &[Value]) -> Result<Value, Error> {
    let mut result = String::new();
    for arg in args {
        match arg {
            Value::String(s) => result.push_str(s),
            other => {
                return Err(Error::TypeError(format!(
                    "string-append requires strings, got {other}"
                )));
            }
        }
    }
    Ok(Value::from(result))
}

fn builtin_error(args: &[Value]) -> Result<Value, Error> {
    let parts: Vec<String> = args
        .iter()
        .map(|value| match value {
            Value::String(s) => s.to_string(),
            _ => format!("{value}"),
        })
        .collect();

    let message = if parts.is_empty() {
        "Error".to_owned()
    } else {
        parts.join(" ")
    };

    Err(Error::EvalError(message))
}

/// Global registry of all built-in operations, built once on first use.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn function(scheme_id: &'static str, func: OperationFn, arity: Arity) -> BuiltinOp {
        BuiltinOp {
            scheme_id,
            op_kind: OpKind::Function(func),
            arity,
        }
    }

    fn special_form(scheme_id: &'static str, form: SpecialFormFn, arity: Arity) -> BuiltinOp {
        BuiltinOp {
            scheme_id,
            op_kind: OpKind::SpecialForm(form),
            arity,
        }
    }

    vec![
        // Arithmetic operations
        function("+", builtin_add, Arity::Any),
        function("-", builtin_sub, Arity::AtLeast(1)),
        function("*", builtin_mul, Arity::Any),
        function("/", builtin_div, Arity::AtLeast(1)),
        function("max", builtin_max, Arity::AtLeast(1)),
        function("min", builtin_min, Arity::AtLeast(1)),
        // Comparison operations
        function("=", builtin_numeric_eq, Arity::Exact(2)),
        function("<", builtin_lt, Arity::AtLeast(2)),
        function(">", builtin_gt, Arity::AtLeast(2)),
        function("<=", builtin_le, Arity::AtLeast(2)),
        function(">=", builtin_ge, Arity::AtLeast(2)),
        // Equivalence predicates
        function("eq?", builtin_eq, Arity::Exact(2)),
        function("eqv?", builtin_eqv, Arity::Exact(2)),
        function("equal?", builtin_equal, Arity::Exact(2)),
        // Logical operations
        function("not", builtin_not, Arity::Exact(1)),
        special_form("and", eval_and, Arity::Any),
        special_form("or", eval_or, Arity::Any),
        // Pairs and lists
        function("car", builtin_car, Arity::Exact(1)),
        function("cdr", builtin_cdr, Arity::Exact(1)),
        function("cons", builtin_cons, Arity::Exact(2)),
        function("list", builtin_list, Arity::Any),
        function("set-car!", builtin_set_car, Arity::Exact(2)),
        function("set-cdr!", builtin_set_cdr, Arity::Exact(2)),
        // Type predicates
        function("null?", builtin_null, Arity::Exact(1)),
        function("pair?", builtin_pair, Arity::Exact(1)),
        function("number?", builtin_number, Arity::Exact(1)),
        function("integer?", builtin_integer, Arity::Exact(1)),
        function("string?", builtin_string, Arity::Exact(1)),
        function("symbol?", builtin_symbol, Arity::Exact(1)),
        function("boolean?", builtin_boolean, Arity::Exact(1)),
        function("procedure?", builtin_procedure, Arity::Exact(1)),
        // Strings
        function("string-append", builtin_string_append, Arity::Any),
        // Special forms
        special_form("quote", eval_quote, Arity::Exact(1)),
        special_form("if", eval_if, Arity::Range(2, 3)),
        special_form("define", eval_define, Arity::AtLeast(2)),
        special_form("set!", eval_set, Arity::Exact(2)),
        special_form("lambda", eval_lambda, Arity::AtLeast(2)),
        special_form("begin", eval_begin, Arity::AtLeast(1)),
        special_form("let", eval_let, Arity::AtLeast(2)),
        special_form("cond", eval_cond, Arity::Any),
        // Error handling
        function("error", builtin_error, Arity::Any),
    ]
});

/// Lazy static map from scheme_id to BuiltinOp (private - use find_scheme_op)
static BUILTIN_SCHEME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.scheme_id, op)).collect()
});

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its Scheme identifier
pub(crate) fn find_scheme_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_SCHEME.get(id).copied()
}

/// Find a special form by keyword
pub(crate) fn find_special_form(id: &str) -> Option<&'static BuiltinOp> {
    find_scheme_op(id).filter(|op| op.is_special_form())
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{NativeProcedure, NumberType, nil, sym, val};

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    /// Invoke a builtin the way the evaluator does: through its procedure object,
    /// so error propagation and arity checks run first.
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_scheme_op(name).unwrap();
        match op.op_kind {
            OpKind::Function(func) => NativeProcedure {
                name: name.to_owned(),
                arity: op.arity,
                func,
            }
            .call(args),
            OpKind::SpecialForm(_) => {
                panic!("expected function builtin in tests, got special form: {name}")
            }
        }
    }

    #[test]
    fn test_builtin_ops_registry() {
        let not_op = find_scheme_op("not").unwrap();
        assert_eq!(not_op.arity, Arity::Exact(1));
        assert!(!not_op.is_special_form());

        let add_op = find_scheme_op("+").unwrap();
        assert_eq!(add_op.arity, Arity::Any);
        if let OpKind::Function(func) = add_op.op_kind {
            assert_eq!(func(&[val(1), val(2)]).unwrap(), val(3));
        } else {
            panic!("Expected Function variant");
        }

        for form in ["quote", "if", "define", "set!", "lambda", "begin", "let", "cond", "and", "or"] {
            assert!(find_special_form(form).is_some(), "{form} should be a special form");
        }
        assert!(find_special_form("car").is_none());
        assert!(find_scheme_op("unknown").is_none());

        // Every identifier appears once
        let all_ops = get_builtin_ops();
        let mut ids: Vec<_> = all_ops.iter().map(|op| op.scheme_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), all_ops.len());
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let many_ones: Vec<Value> = (0..100).map(|_| val(1)).collect();
        let twenty: Vec<Value> = (1..=20).map(val).collect();
        let mixed = val([val(1), val("hello"), val(true), nil()]);

        let test_cases: Vec<TestCase> = vec![
            // Addition
            test!("+", &[], success(0)),
            test!("+", &[val(5)], success(5)),
            test!("+", &[val(1), val(2)], success(3)),
            test!("+", &twenty, success(210)),
            test!("+", &[val(-5), val(10)], success(5)),
            test!("+", &[val(1), val(2.5)], success(3.5)),
            test!("+", &[val(1.5), val(1.5)], success(3.0)),
            test!("+", &many_ones, success(100)),
            test!("+", &[val("not a number")], None),
            test!("+", &[val(1), val(true)], None),
            test!("+", &[val(NumberType::MAX), val(1)], None),
            // Subtraction
            test!("-", &[val(5)], success(-5)),
            test!("-", &[val(10), val(3), val(2)], success(5)),
            test!("-", &[val(1), val(0.5)], success(0.5)),
            test!("-", &[val(2.5)], success(-2.5)),
            test!("-", &[], None),
            test!("-", &[val(5), val(false)], None),
            test!("-", &[val(NumberType::MIN)], None),
            test!("-", &[val(NumberType::MIN), val(1)], None),
            // Multiplication
            test!("*", &[], success(1)),
            test!("*", &[val(2), val(3), val(4)], success(24)),
            test!("*", &[val(2), val(0.5)], success(1.0)),
            test!("*", &[val(NumberType::MAX), val(2)], None),
            test!("*", &[val(2), nil()], None),
            // Division
            test!("/", &[val(6), val(3)], success(2)),
            test!("/", &[val(7), val(2)], success(3.5)),
            test!("/", &[val(2)], success(0.5)),
            test!("/", &[val(60), val(2), val(3)], success(10)),
            test!("/", &[val(1.0), val(4)], success(0.25)),
            test!("/", &[val(1), val(0)], None),
            test!("/", &[val(0)], None),
            test!("/", &[val(1.5), val(0)], None),
            test!("/", &[val(NumberType::MIN), val(-1)], None),
            test!("/", &[], None),
            test!("/", &[val("6"), val(3)], None),
            // Numeric equality
            test!("=", &[val(1), val(1)], success(true)),
            test!("=", &[val(67), val(45)], success(false)),
            test!("=", &[val(2), val(2.0)], success(true)),
            test!("=", &[val(0.5), val(0.5)], success(true)),
            test!("=", &[val("string1"), val("string1")], None),
            test!("=", &[val(1)], None),
            test!("=", &[val(1), val(1), val(1)], None),
            // Ordering
            test!("<", &[val(1), val(2), val(3)], success(true)),
            test!("<", &[val(1), val(3), val(2)], success(false)),
            test!("<", &[val(6), val(6)], success(false)),
            test!("<", &[val(1), val(1.5)], success(true)),
            test!(">", &[val(9), val(6), val(2)], success(true)),
            test!(">", &[val(9), val(6), val(7)], success(false)),
            test!("<=", &[val(3), val(3), val(4)], success(true)),
            test!(">=", &[val(7), val(7)], success(true)),
            test!(">=", &[val(2), val(6)], success(false)),
            test!("<", &[val(1), val(f64::NAN)], success(false)),
            test!(">", &[val(5)], None),
            test!(">", &[val("a"), val(3)], None),
            // Equivalence predicates
            test!("eq?", &[nil(), nil()], success(true)),
            test!("eq?", &[val(1), val(1)], success(false)),
            test!("eq?", &[sym("a"), sym("a")], success(true)),
            test!("eq?", &[val(true), val(true)], success(true)),
            test!("eq?", &[val(true), val(false)], success(false)),
            test!("eq?", &[val("s"), val("s")], success(false)),
            test!("eq?", &[val(5)], None),
            test!("eq?", &[val(1), val(2), val(3)], None),
            test!("eqv?", &[val("string"), val("string")], success(true)),
            test!("eqv?", &[val("string"), val("string2")], success(false)),
            test!("eqv?", &[val(2), val(2)], success(true)),
            test!("eqv?", &[val(2), val(2.0)], success(false)),
            test!("eqv?", &[val([1]), val([1])], success(false)),
            test!("eqv?", &[val(1), val(2), val(3)], None),
            test!("eqv?", &[val(1)], None),
            test!("equal?", &[val([1, 2]), val([1, 2])], success(true)),
            test!("equal?", &[val([1, 2]), val([1, 3])], success(false)),
            test!("equal?", &[val("hello"), val("hello")], success(true)),
            test!("equal?", &[val(1), val("1")], success(false)),
            test!("equal?", &[val(5)], None),
            // Logical negation
            test!("not", &[val(true)], success(false)),
            test!("not", &[val(false)], success(true)),
            test!("not", &[val(0)], success(false)),
            test!("not", &[nil()], success(false)),
            test!("not", &[val("")], success(false)),
            test!("not", &[], None),
            test!("not", &[val(true), val(false)], None),
            // Pairs and lists
            test!("car", &[val([1, 2, 3])], success(1)),
            test!("car", std::slice::from_ref(&mixed), success(1)),
            test!("car", &[Value::cons(val(1), val(2))], success(1)),
            test!("car", &[nil()], None),
            test!("car", &[val(42)], None),
            test!("cdr", &[val([1, 2, 3])], success([2, 3])),
            test!("cdr", &[val(["only"])], Some(nil())),
            test!("cdr", &[Value::cons(val(1), val(2))], success(2)),
            test!("cdr", &[val(true)], None),
            test!("cons", &[val(0), val([1, 2])], success([0, 1, 2])),
            test!("cons", &[val(1), val(2)], Some(Value::cons(val(1), val(2)))),
            test!("cons", &[val(1)], None),
            test!("list", &[], Some(nil())),
            test!("list", &[val(1), val("hello"), val(true)], success(vec![val(1), val("hello"), val(true)])),
            test!("set-car!", &[val(5), val(1)], None),
            test!("set-cdr!", &[nil(), val(1)], None),
            // Type predicates
            test!("null?", &[nil()], success(true)),
            test!("null?", &[val(false)], success(false)),
            test!("null?", &[val([1])], success(false)),
            test!("pair?", &[val([1])], success(true)),
            test!("pair?", &[nil()], success(false)),
            test!("number?", &[val(1.5)], success(true)),
            test!("number?", &[val("1")], success(false)),
            test!("integer?", &[val(3)], success(true)),
            test!("integer?", &[val(3.0)], success(true)),
            test!("integer?", &[val(3.5)], success(false)),
            test!("string?", &[val("s")], success(true)),
            test!("symbol?", &[sym("s")], success(true)),
            test!("symbol?", &[val("s")], success(false)),
            test!("boolean?", &[val(false)], success(true)),
            test!("boolean?", &[nil()], success(false)),
            test!("procedure?", &[val(1)], success(false)),
            test!("null?", &[], None),
            // Strings
            test!("string-append", &[], success("")),
            test!("string-append", &[val("hello"), val(" "), val("world")], success("hello world")),
            test!("string-append", &[val("hello"), val(123)], None),
            // Max/min
            test!("max", &[val(1), val(3), val(2)], success(3)),
            test!("max", &[val(1), val(2.0)], success(2.0)),
            test!("max", &[val(3), val(2.0)], success(3.0)),
            test!("min", &[val(-5), val(-1), val(-10)], success(-10)),
            test!("min", &[val(5)], success(5)),
            test!("max", &[], None),
            test!("min", &[val(1), val(true)], None),
            // Error
            test!("error", &[], None),
            test!("error", &[val("test error")], None),
        ];

        for (test_expr, result, expected) in test_cases {
            match (result, expected) {
                (Ok(actual), Some(expected_val)) => {
                    assert_eq!(actual, expected_val, "Failed for test case: {test_expr}");
                    // Exactness is part of the expected value
                    assert_eq!(
                        actual.as_number().map(|n| n.is_exact()),
                        expected_val.as_number().map(|n| n.is_exact()),
                        "Exactness mismatch for test case: {test_expr} ({actual})"
                    );
                }
                (Err(_), None) => {}
                (actual, expected) => panic!(
                    "Unexpected result for test case: {test_expr}\nGot: {actual:?}, Expected: {expected:?}"
                ),
            }
        }
    }

    #[test]
    fn test_boolean_results_are_canonical() {
        let t = call_builtin("not", &[val(false)]).unwrap();
        let f = call_builtin("=", &[val(1), val(2)]).unwrap();
        assert!(t.is_eq(&Value::TRUE));
        assert!(f.is_eq(&Value::FALSE));
    }

    #[test]
    fn test_error_operands_propagate() {
        let err = Value::error(Error::UnboundVariable("x".into()));
        // The operand error wins over both the type check and the arity check
        for (name, args) in [
            ("+", vec![val(1), err.clone()]),
            ("not", vec![err.clone()]),
            ("eq?", vec![err.clone()]),
        ] {
            assert_eq!(
                call_builtin(name, &args),
                Err(Error::UnboundVariable("x".into())),
                "{name} should propagate its error operand"
            );
        }
    }

    #[test]
    fn test_pair_mutation() {
        let cell = val([1, 2]);
        let alias = cell.clone();
        let result = call_builtin("set-car!", &[cell.clone(), val(10)]).unwrap();
        assert!(matches!(result, Value::Unspecified));
        call_builtin("set-cdr!", &[cell, val(3)]).unwrap();
        assert_eq!(alias.to_string(), "(10 . 3)");
    }

    #[test]
    fn test_error_message_construction() {
        type ErrorTest = (Vec<Value>, &'static str);
        let test_cases: Vec<ErrorTest> = vec![
            (vec![], "Error"),
            (vec![val("Simple message")], "Simple message"),
            (vec![val("Code:"), val(404), val("Not Found")], "Code: 404 Not Found"),
            (vec![val(true), val(42), val("mixed"), nil()], "#t 42 mixed ()"),
        ];

        for (args, expected_msg) in test_cases {
            match call_builtin("error", &args).unwrap_err() {
                Error::EvalError(msg) => {
                    assert_eq!(msg, expected_msg, "Failed for args: {args:?}");
                }
                other => panic!("Expected EvalError for args: {args:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_arity_errors_name_the_procedure() {
        match call_builtin("eq?", &[val(5)]).unwrap_err() {
            Error::ArityError { expected, got, name } => {
                assert_eq!(expected, Arity::Exact(2));
                assert_eq!(got, 1);
                assert_eq!(name.as_deref(), Some("eq?"));
            }
            other => panic!("Expected ArityError, got {other:?}"),
        }
    }

    #[test]
    fn test_arity_validation() {
        use Arity::*;

        Exact(2).validate(2).unwrap();
        Exact(2).validate(1).unwrap_err();
        Exact(2).validate(3).unwrap_err();

        AtLeast(1).validate(1).unwrap();
        AtLeast(1).validate(2).unwrap();
        AtLeast(1).validate(0).unwrap_err();

        Range(1, 3).validate(1).unwrap();
        Range(1, 3).validate(3).unwrap();
        Range(1, 3).validate(0).unwrap_err();
        Range(1, 3).validate(4).unwrap_err();

        Any.validate(0).unwrap();
        Any.validate(100).unwrap();

        match Exact(2).validate(1).unwrap_err() {
            Error::ArityError { expected, got, name } => {
                assert_eq!(expected, Exact(2));
                assert_eq!(got, 1);
                assert_eq!(name, None);
            }
            _ => panic!("Expected ArityError"),
        }
    }
}
