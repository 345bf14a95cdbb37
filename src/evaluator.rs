//! The evaluation engine.
//!
//! Evaluation is a loop over `(expression, frame)` states. Each step either produces a
//! final value or hands back the next state to continue from, which is how tail
//! positions (the branch an `if` takes, the last expression of a body, the body of a
//! called closure) run without growing the host stack. Only non-tail subexpressions
//! (operands, tests, initializers) recurse, and that nesting is bounded by
//! [`EvalConfig::max_depth`].
//!
//! Failures travel as `Err` internally and come out of [`eval`] as [`Value::Error`]
//! objects, never as panics.

mod environment;

pub use environment::{Environment, FrameId};

use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{Closure, Procedure, Symbol, Value};
use crate::builtinops::{Arity, OpKind, find_special_form, get_builtin_ops};
use crate::{Error, MAX_EVAL_DEPTH};

/// Evaluation limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Maximum nesting of non-tail evaluation before an error value is produced
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// Outcome of one evaluation step
pub(crate) enum Tail {
    /// Evaluation finished with this value
    Return(Value),
    /// Continue with this expression in this frame (tail position)
    Eval(Value, FrameId),
}

/// Evaluate an expression in the global frame (public API)
pub fn eval(expr: &Value, env: &mut Environment) -> Value {
    let global = env.global();
    eval_in(expr, env, global)
}

/// Evaluate an expression in a specific frame
///
/// Frames created while evaluating are freed afterwards unless the result or an older
/// frame still reaches them.
pub fn eval_in(expr: &Value, env: &mut Environment, frame: FrameId) -> Value {
    env.begin_generation(vec![expr.clone()]);
    let result = eval_with_depth_tracking(expr, env, frame, 0).unwrap_or_else(Value::error);
    env.finish_generation(&result);
    result
}

/// Apply a procedure object to already-evaluated arguments (public API)
pub fn apply(func: &Value, args: &[Value], env: &mut Environment) -> Value {
    if let Some(err) = args.iter().find(|arg| arg.is_error()) {
        return err.clone();
    }
    let mut pinned = vec![func.clone()];
    pinned.extend_from_slice(args);
    env.begin_generation(pinned);
    let result = apply_procedure(func, args, env, 0)
        .and_then(|tail| run_trampoline(tail, env, 0))
        .unwrap_or_else(Value::error);
    env.finish_generation(&result);
    result
}

/// Evaluate an expression with depth tracking to prevent stack overflow
fn eval_with_depth_tracking(
    expr: &Value,
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    let max_depth = env.config().max_depth;
    if depth >= max_depth {
        debug!(max_depth, "evaluation depth limit hit");
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {max_depth})"
        )));
    }
    run_trampoline(Tail::Eval(expr.clone(), frame), env, depth)
}

/// Drive evaluation steps until one of them produces a value
fn run_trampoline(mut tail: Tail, env: &mut Environment, depth: usize) -> Result<Value, Error> {
    let mut iterations = 0usize;
    loop {
        match tail {
            Tail::Return(value) => {
                if iterations > 1 {
                    trace!(iterations, depth, "evaluation loop finished");
                }
                return Ok(value);
            }
            Tail::Eval(expr, frame) => {
                iterations += 1;
                // At the outermost level the pending state is the only thing holding frames
                if depth == 0 && env.should_collect() {
                    env.collect_young(&[frame], &[&expr]);
                }
                tail = eval_step(&expr, env, frame, depth)?;
            }
        }
    }
}

/// Evaluate a non-tail subexpression one level deeper.
/// An error object produced there short-circuits the enclosing form.
fn eval_operand(
    expr: &Value,
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    match eval_with_depth_tracking(expr, env, frame, depth + 1)? {
        Value::Error(err) => Err(err.as_ref().clone()),
        value => Ok(value),
    }
}

/// One step of evaluation, dispatching on the shape of the expression
fn eval_step(
    expr: &Value,
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Tail, Error> {
    match expr {
        // Variable lookup
        Value::Symbol(name) => env.lookup(frame, name).map(Tail::Return),

        // Special form or procedure application
        Value::Pair(pair) => {
            let head = pair.head();
            let operands = pair
                .tail()
                .list_to_vec()
                .ok_or_else(|| Error::EvalError(format!("Cannot evaluate improper list: {expr}")))?;

            if let Value::Symbol(keyword) = &head
                && let Some(op) = find_special_form(keyword)
                && let OpKind::SpecialForm(special_form) = op.op_kind
            {
                op.validate_arity(operands.len())?;
                return special_form(&operands, env, frame, depth);
            }

            // Operator first, then arguments left to right, all in the current frame
            let func = eval_operand(&head, env, frame, depth)?;
            let args = operands
                .iter()
                .map(|arg| eval_operand(arg, env, frame, depth))
                .collect::<Result<Vec<_>, _>>()?;
            apply_procedure(&func, &args, env, depth)
        }

        // Self-evaluating forms (numbers, strings, booleans, (), procedures, errors)
        _ => Ok(Tail::Return(expr.clone())),
    }
}

/// Apply a procedure. Natives finish here; closures continue with their body.
fn apply_procedure(
    func: &Value,
    args: &[Value],
    env: &mut Environment,
    depth: usize,
) -> Result<Tail, Error> {
    let Value::Procedure(procedure) = func else {
        return Err(Error::NotApplicable(func.to_string()));
    };

    match procedure.as_ref() {
        Procedure::Native(native) => native.call(args).map(Tail::Return),
        Procedure::Closure(closure) => {
            if closure.params.len() != args.len() {
                return Err(Error::ArityError {
                    expected: Arity::Exact(closure.params.len()),
                    got: args.len(),
                    name: closure.name.clone(),
                });
            }

            let call_frame = env.extend(closure.env);
            for (param, arg) in closure.params.iter().zip(args) {
                env.define(call_frame, param.clone(), arg.clone())?;
            }
            eval_body(&closure.body, env, call_frame, depth)
        }
    }
}

/// Evaluate all but the last expression for effect; the last one is a tail position
fn eval_body(
    body: &[Value],
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Tail, Error> {
    let Some((last, init)) = body.split_last() else {
        return Ok(Tail::Return(Value::Unspecified));
    };
    for expr in init {
        eval_operand(expr, env, frame, depth)?;
    }
    Ok(Tail::Eval(last.clone(), frame))
}

fn is_keyword(expr: &Value, keyword: &str) -> bool {
    matches!(expr, Value::Symbol(s) if &**s == keyword)
}

/// Build a closure from a parameter list and body captured in `frame`
fn make_closure(
    name: Option<String>,
    params: &Value,
    body: &[Value],
    frame: FrameId,
) -> Result<Value, Error> {
    // Variadic forms are not supported:
    // - (lambda args body) - where args collects all arguments as a list
    // - (lambda (a b . rest) body) - where rest collects remaining arguments
    let param_list = match params {
        Value::Symbol(_) => None,
        _ => params.list_to_vec(),
    }
    .ok_or_else(|| {
        Error::EvalError(format!(
            "Variadic parameter lists are not supported: {params}"
        ))
    })?;

    let mut names: Vec<Symbol> = Vec::with_capacity(param_list.len());
    for param in param_list {
        match param {
            Value::Symbol(param_name) => {
                if names.contains(&param_name) {
                    return Err(Error::EvalError(format!(
                        "Duplicate parameter name: {param_name}"
                    )));
                }
                names.push(param_name);
            }
            other => {
                return Err(Error::TypeError(format!(
                    "Lambda parameters must be symbols, got {other}"
                )));
            }
        }
    }

    if body.is_empty() {
        return Err(Error::EvalError("Procedure body cannot be empty".into()));
    }

    Ok(Value::Procedure(Rc::new(Procedure::Closure(Closure {
        name,
        params: names,
        body: Rc::from(body),
        env: frame,
    }))))
}

/// Evaluate quote special form
pub(crate) fn eval_quote(
    args: &[Value],
    _env: &mut Environment,
    _frame: FrameId,
    _depth: usize,
) -> Result<Tail, Error> {
    match args {
        [expr] => Ok(Tail::Return(expr.clone())),
        _ => Err(Error::arity_error_for("quote", Arity::Exact(1), args.len())),
    }
}

/// Evaluate if special form; both branches are tail positions
pub(crate) fn eval_if(
    args: &[Value],
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Tail, Error> {
    let (condition_expr, then_expr, else_expr) = match args {
        [condition, then_branch] => (condition, then_branch, None),
        [condition, then_branch, else_branch] => (condition, then_branch, Some(else_branch)),
        _ => return Err(Error::arity_error_for("if", Arity::Range(2, 3), args.len())),
    };

    if eval_operand(condition_expr, env, frame, depth)?.is_truthy() {
        Ok(Tail::Eval(then_expr.clone(), frame))
    } else {
        match else_expr {
            Some(expr) => Ok(Tail::Eval(expr.clone(), frame)),
            None => Ok(Tail::Return(Value::Unspecified)),
        }
    }
}

/// Evaluate define special form: `(define name expr)` or `(define (name params...) body...)`
pub(crate) fn eval_define(
    args: &[Value],
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Tail, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let mut value = eval_operand(expr, env, frame, depth)?;

            // A lambda defined under a name prints with that name
            if let Value::Pair(form) = expr
                && is_keyword(&form.head(), "lambda")
                && let Value::Procedure(procedure) = &mut value
                && let Some(Procedure::Closure(closure)) = Rc::get_mut(procedure)
            {
                closure.name = Some(name.to_string());
            }

            debug!(%name, "define");
            env.define(frame, name.clone(), value)?;
            Ok(Tail::Return(Value::Unspecified))
        }
        [Value::Symbol(name), ..] => Err(Error::EvalError(format!(
            "define of {name} takes exactly one value expression"
        ))),
        [Value::Pair(signature), body @ ..] => {
            let Value::Symbol(name) = signature.head() else {
                return Err(Error::TypeError(format!(
                    "define requires a symbol as procedure name, got {}",
                    signature.head()
                )));
            };
            let closure = make_closure(Some(name.to_string()), &signature.tail(), body, frame)?;

            debug!(%name, "define procedure");
            env.define(frame, name, closure)?;
            Ok(Tail::Return(Value::Unspecified))
        }
        [other, ..] => Err(Error::TypeError(format!(
            "define requires a symbol or (name params...), got {other}"
        ))),
        [] => Err(Error::arity_error_for("define", Arity::AtLeast(2), 0)),
    }
}

/// Evaluate set! special form
pub(crate) fn eval_set(
    args: &[Value],
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Tail, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_operand(expr, env, frame, depth)?;
            env.set(frame, name, value)?;
            Ok(Tail::Return(Value::Unspecified))
        }
        [other, _] => Err(Error::TypeError(format!(
            "set! requires a symbol, got {other}"
        ))),
        _ => Err(Error::arity_error_for("set!", Arity::Exact(2), args.len())),
    }
}

/// Evaluate lambda special form
pub(crate) fn eval_lambda(
    args: &[Value],
    _env: &mut Environment,
    frame: FrameId,
    _depth: usize,
) -> Result<Tail, Error> {
    match args {
        [params, body @ ..] => make_closure(None, params, body, frame).map(Tail::Return),
        [] => Err(Error::arity_error_for("lambda", Arity::AtLeast(2), 0)),
    }
}

/// Evaluate begin special form
pub(crate) fn eval_begin(
    args: &[Value],
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Tail, Error> {
    eval_body(args, env, frame, depth)
}

/// Evaluate let special form: initializers run in the current frame, the body in a new one
pub(crate) fn eval_let(
    args: &[Value],
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Tail, Error> {
    let [bindings, body @ ..] = args else {
        return Err(Error::arity_error_for("let", Arity::AtLeast(2), args.len()));
    };
    let bindings = bindings
        .list_to_vec()
        .ok_or_else(|| Error::TypeError(format!("let bindings must be a list, got {bindings}")))?;

    let mut values: Vec<(Symbol, Value)> = Vec::with_capacity(bindings.len());
    for binding in &bindings {
        match binding.list_to_vec().as_deref() {
            Some([Value::Symbol(name), init]) => {
                if values.iter().any(|(bound, _)| bound == name) {
                    return Err(Error::EvalError(format!("Duplicate let binding: {name}")));
                }
                let value = eval_operand(init, env, frame, depth)?;
                values.push((name.clone(), value));
            }
            _ => {
                return Err(Error::TypeError(format!(
                    "let binding must be (name value), got {binding}"
                )));
            }
        }
    }

    let let_frame = env.extend(frame);
    for (name, value) in values {
        env.define(let_frame, name, value)?;
    }
    eval_body(body, env, let_frame, depth)
}

/// Evaluate cond special form; the last expression of the chosen clause is a tail position
pub(crate) fn eval_cond(
    args: &[Value],
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Tail, Error> {
    for (index, clause) in args.iter().enumerate() {
        let parts = clause.list_to_vec().unwrap_or_default();
        let Some((test, body)) = parts.split_first() else {
            return Err(Error::TypeError(format!(
                "cond clause must be a non-empty list, got {clause}"
            )));
        };

        if is_keyword(test, "else") {
            if index + 1 != args.len() {
                return Err(Error::EvalError("else must be the last cond clause".into()));
            }
            if body.is_empty() {
                return Err(Error::EvalError("else clause cannot be empty".into()));
            }
            return eval_body(body, env, frame, depth);
        }

        let value = eval_operand(test, env, frame, depth)?;
        if value.is_truthy() {
            // A clause without body yields the value of its test
            if body.is_empty() {
                return Ok(Tail::Return(value));
            }
            return eval_body(body, env, frame, depth);
        }
    }
    Ok(Tail::Return(Value::Unspecified))
}

macro_rules! boolean_logic_op {
    ($name:ident, $stop_when_truthy:literal, $default:expr) => {
        pub(crate) fn $name(
            args: &[Value],
            env: &mut Environment,
            frame: FrameId,
            depth: usize,
        ) -> Result<Tail, Error> {
            let Some((last, init)) = args.split_last() else {
                return Ok(Tail::Return($default));
            };

            for arg in init {
                let value = eval_operand(arg, env, frame, depth)?;
                if value.is_truthy() == $stop_when_truthy {
                    return Ok(Tail::Return(value));
                }
            }

            // The last operand is a tail position
            Ok(Tail::Eval(last.clone(), frame))
        }
    };
}

// Generate boolean logic special forms
boolean_logic_op!(eval_and, false, Value::TRUE);
boolean_logic_op!(eval_or, true, Value::FALSE);

/// Create a global environment with built-in functions
pub fn create_global_env() -> Environment {
    create_global_env_with_config(EvalConfig::default())
}

/// Create a global environment with built-in functions and custom limits
pub fn create_global_env_with_config(config: EvalConfig) -> Environment {
    let mut env = Environment::with_config(config);

    let mut count = 0usize;
    for builtin_op in get_builtin_ops() {
        if let OpKind::Function(func) = builtin_op.op_kind {
            env.register_builtin_function(builtin_op.scheme_id, builtin_op.arity, func);
            count += 1;
        }
    }

    debug!(builtins = count, "global environment created");
    env
}
