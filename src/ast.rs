//! This module defines the object model every other part of the interpreter operates on.
//! The main enum, [`Value`], is a closed tagged union over numbers, booleans, strings,
//! interned symbols, pairs, procedures and first-class errors. The three equality
//! relations of the language (`eq?`, `eqv?`, `equal?`) are layered on top of it as
//! [`Value::is_eq`], [`Value::is_eqv`] and [`Value::is_equal`]; `PartialEq` follows
//! `equal?`. The printer is the `Display` impl. Ergonomic helpers such as [`val`], [`sym`]
//! and [`nil`] are provided for building object trees in code and tests.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use string_cache::DefaultAtom;

use crate::Error;
use crate::builtinops::{Arity, OperationFn};
use crate::evaluator::FrameId;

/// Interned symbol name. Two symbols with the same text share one atom, so
/// comparison is a pointer check.
pub type Symbol = DefaultAtom;

/// Type alias for exact numbers in the interpreter
pub type NumberType = i64;

/// Allowed non-alphanumeric characters in symbol names
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$.%&:^~";

/// Check if a string is a valid symbol name
/// Valid: non-empty, not a lone ".", no leading digit, no sign or "." followed by a digit,
/// alphanumeric + SYMBOL_SPECIAL_CHARS
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() || name == "." {
                return false;
            }

            if matches!(first_char, '-' | '+' | '.')
                && let Some(second_char) = chars.next()
                && (second_char.is_ascii_digit()
                    || (first_char != '.' && second_char == '.'
                        && chars.next().is_some_and(|c| c.is_ascii_digit())))
            {
                return false;
            }

            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

/// The two-level numeric tower: exact integers and inexact floats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(NumberType),
    Float(f64),
}

impl Number {
    pub fn is_exact(&self) -> bool {
        matches!(self, Number::Integer(_))
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Integer(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    /// Numeric value equality regardless of exactness (the `=` relation)
    pub fn numeric_eq(&self, other: &Number) -> bool {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Number::Integer(n) => write!(f, "{n}"),
            Number::Float(x) if x.is_nan() => write!(f, "+nan.0"),
            Number::Float(x) if x.is_infinite() => {
                write!(f, "{}", if x > 0.0 { "+inf.0" } else { "-inf.0" })
            }
            // Debug formatting always keeps a decimal point or exponent
            Number::Float(x) => write!(f, "{x:?}"),
        }
    }
}

/// A mutable cons cell. Every holder of the `Rc<Pair>` sees mutations.
pub struct Pair {
    head: RefCell<Value>,
    tail: RefCell<Value>,
}

impl Pair {
    pub fn new(head: Value, tail: Value) -> Self {
        Pair {
            head: RefCell::new(head),
            tail: RefCell::new(tail),
        }
    }

    pub fn head(&self) -> Value {
        self.head.borrow().clone()
    }

    pub fn tail(&self) -> Value {
        self.tail.borrow().clone()
    }

    pub fn set_head(&self, value: Value) {
        *self.head.borrow_mut() = value;
    }

    pub fn set_tail(&self, value: Value) {
        *self.tail.borrow_mut() = value;
    }
}

/// Unlink chains of uniquely owned cells one at a time so that freeing a long list
/// (or a deeply nested one) never recurses.
impl Drop for Pair {
    fn drop(&mut self) {
        let mut pending: Vec<Rc<Pair>> = Vec::new();
        pending.extend(take_pair(self.head.get_mut()));
        pending.extend(take_pair(self.tail.get_mut()));

        while let Some(cell) = pending.pop() {
            // Shared cells stay alive; their other owners will free them
            if let Ok(mut pair) = Rc::try_unwrap(cell) {
                pending.extend(take_pair(pair.head.get_mut()));
                pending.extend(take_pair(pair.tail.get_mut()));
            }
        }
    }
}

fn take_pair(slot: &mut Value) -> Option<Rc<Pair>> {
    match std::mem::replace(slot, Value::Nil) {
        Value::Pair(cell) => Some(cell),
        other => {
            *slot = other;
            None
        }
    }
}

/// A native procedure from the builtin table (or registered by the host)
pub struct NativeProcedure {
    pub name: String,
    pub arity: Arity,
    pub func: OperationFn,
}

impl NativeProcedure {
    /// Invoke the implementation on already-evaluated arguments.
    ///
    /// An `Error` operand is propagated unchanged before anything else is checked;
    /// then the arity contract is enforced, then the function runs.
    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        if let Some(err) = args.iter().find_map(Value::as_error) {
            return Err(err.clone());
        }
        if !self.arity.accepts(args.len()) {
            return Err(Error::arity_error_for(&self.name, self.arity, args.len()));
        }
        (self.func)(args)
    }
}

/// A user procedure: parameter list, body and the frame it was created in
pub struct Closure {
    pub name: Option<String>,
    pub params: Vec<Symbol>,
    pub body: Rc<[Value]>,
    pub env: FrameId,
}

pub enum Procedure {
    Native(NativeProcedure),
    Closure(Closure),
}

impl Procedure {
    pub fn name(&self) -> Option<&str> {
        match self {
            Procedure::Native(native) => Some(&native.name),
            Procedure::Closure(closure) => closure.name.as_deref(),
        }
    }
}

/// Core object type of the interpreter
///
/// Numbers, strings, pairs, procedures and errors are heap allocated behind `Rc`, so each
/// construction is a distinct identity for `eq?`. Booleans and the empty list carry no
/// payload and are compared by tag; [`Value::TRUE`], [`Value::FALSE`] and [`Value::NIL`]
/// are their canonical instances.
///
/// To build a tree, use the ergonomic helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for empty lists
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    /// The empty list
    Nil,
    Bool(bool),
    Number(Rc<Number>),
    String(Rc<str>),
    Symbol(Symbol),
    Pair(Rc<Pair>),
    Procedure(Rc<Procedure>),
    /// A failure, carried as an ordinary value
    Error(Rc<Error>),
    /// Result of forms evaluated only for effect (`define`, `set!`, one-armed `if`)
    Unspecified,
}

impl Value {
    pub const TRUE: Value = Value::Bool(true);
    pub const FALSE: Value = Value::Bool(false);
    pub const NIL: Value = Value::Nil;

    /// The canonical boolean for `b`
    pub fn boolean(b: bool) -> Value {
        if b { Value::TRUE } else { Value::FALSE }
    }

    pub fn integer(n: NumberType) -> Value {
        Value::Number(Rc::new(Number::Integer(n)))
    }

    pub fn float(x: f64) -> Value {
        Value::Number(Rc::new(Number::Float(x)))
    }

    pub fn number(n: Number) -> Value {
        Value::Number(Rc::new(n))
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Symbol::from(name))
    }

    pub fn error(err: Error) -> Value {
        Value::Error(Rc::new(err))
    }

    pub fn cons(head: Value, tail: Value) -> Value {
        Value::Pair(Rc::new(Pair::new(head, tail)))
    }

    /// Build a proper list from the items
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::list_with_tail(items, Value::Nil)
    }

    /// Build a list whose final tail is `tail` (improper unless `tail` is `()`)
    pub fn list_with_tail<I: IntoIterator<Item = Value>>(items: I, tail: Value) -> Value {
        let items: Vec<Value> = items.into_iter().collect();
        items
            .into_iter()
            .rev()
            .fold(tail, |acc, item| Value::cons(item, acc))
    }

    /// Elements of a proper list, or `None` for anything else (improper or circular lists)
    pub fn list_to_vec(&self) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        let mut current = self.clone();
        // Moves at half speed; meeting it again means the spine is circular
        let mut slow = self.clone();
        loop {
            match current {
                Value::Nil => return Some(items),
                Value::Pair(pair) => {
                    items.push(pair.head());
                    current = pair.tail();
                    if items.len() % 2 == 0
                        && let Value::Pair(behind) = &slow
                    {
                        let next = behind.tail();
                        slow = next;
                    }
                    if let (Value::Pair(a), Value::Pair(b)) = (&current, &slow)
                        && Rc::ptr_eq(a, b)
                    {
                        return None;
                    }
                }
                _ => return None,
            }
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Everything except the canonical false is true
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Value::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(**n),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the variant, used in type error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "empty list",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Pair(_) => "pair",
            Value::Procedure(_) => "procedure",
            Value::Error(_) => "error",
            Value::Unspecified => "unspecified",
        }
    }

    /// Identity (`eq?`): same singleton, same interned symbol, or same allocation.
    pub fn is_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) | (Value::Unspecified, Value::Unspecified) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => Rc::ptr_eq(a, b),
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::Procedure(a), Value::Procedure(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `eqv?`: identity, or numbers of the same exactness and value, or strings with
    /// the same characters.
    pub fn is_eqv(&self, other: &Value) -> bool {
        if self.is_eq(other) {
            return true;
        }
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => match (**a, **b) {
                (Number::Integer(x), Number::Integer(y)) => x == y,
                (Number::Float(x), Number::Float(y)) => x == y,
                _ => false,
            },
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }

    /// Structural equality (`equal?`): pairs compare element-wise, errors by message,
    /// everything else by `eqv?`. Terminates on circular structure: a pair of cells
    /// already under comparison is assumed equal.
    pub fn is_equal(&self, other: &Value) -> bool {
        let mut pending = vec![(self.clone(), other.clone())];
        let mut compared: HashSet<(*const Pair, *const Pair)> = HashSet::new();

        while let Some((left, right)) = pending.pop() {
            match (&left, &right) {
                (Value::Pair(a), Value::Pair(b)) => {
                    if Rc::ptr_eq(a, b) || !compared.insert((Rc::as_ptr(a), Rc::as_ptr(b))) {
                        continue;
                    }
                    pending.push((a.tail(), b.tail()));
                    pending.push((a.head(), b.head()));
                }
                (Value::Error(a), Value::Error(b)) => {
                    if a.to_string() != b.to_string() {
                        return false;
                    }
                }
                _ => {
                    if !left.is_eqv(&right) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "{n:?}"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Pair(_) => write!(f, "List{self}"),
            Value::Procedure(_) => write!(f, "Procedure({self})"),
            Value::Error(err) => write!(f, "Error({err:?})"),
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, &mut HashSet::new())
    }
}

/// Print `value`. `path` holds the cells of every list currently being printed, so a
/// cell that points back into one of them prints as `...` instead of looping.
fn write_value(
    f: &mut fmt::Formatter<'_>,
    value: &Value,
    path: &mut HashSet<*const Pair>,
) -> fmt::Result {
    match value {
        Value::Nil => write!(f, "()"),
        Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
        Value::Number(n) => write!(f, "{n}"),
        Value::String(s) => {
            write!(f, "\"")?;
            for ch in s.chars() {
                match ch {
                    '"' => write!(f, "\\\"")?,
                    '\\' => write!(f, "\\\\")?,
                    '\n' => write!(f, "\\n")?,
                    '\t' => write!(f, "\\t")?,
                    '\r' => write!(f, "\\r")?,
                    c => write!(f, "{c}")?,
                }
            }
            write!(f, "\"")
        }
        Value::Symbol(s) => write!(f, "{s}"),
        Value::Pair(first) => write_list(f, first, path),
        Value::Procedure(procedure) => match procedure.as_ref() {
            Procedure::Native(native) => write!(f, "#<builtin:{}>", native.name),
            Procedure::Closure(Closure { name: Some(name), .. }) => {
                write!(f, "#<procedure:{name}>")
            }
            Procedure::Closure(_) => write!(f, "#<procedure>"),
        },
        Value::Error(err) => write!(f, "#<error: {err}>"),
        Value::Unspecified => write!(f, "#<unspecified>"),
    }
}

fn write_list(
    f: &mut fmt::Formatter<'_>,
    first: &Rc<Pair>,
    path: &mut HashSet<*const Pair>,
) -> fmt::Result {
    let mut entered = Vec::new();
    let mut cell = Rc::clone(first);
    write!(f, "(")?;
    loop {
        path.insert(Rc::as_ptr(&cell));
        entered.push(Rc::as_ptr(&cell));

        match cell.head() {
            Value::Pair(inner) if path.contains(&Rc::as_ptr(&inner)) => write!(f, "...")?,
            head => write_value(f, &head, path)?,
        }

        match cell.tail() {
            Value::Nil => break,
            Value::Pair(next) if path.contains(&Rc::as_ptr(&next)) => {
                write!(f, " ...")?;
                break;
            }
            Value::Pair(next) => {
                write!(f, " ")?;
                cell = next;
            }
            other => {
                write!(f, " . ")?;
                write_value(f, &other, path)?;
                break;
            }
        }
    }
    for cell in entered {
        path.remove(&cell);
    }
    write!(f, ")")
}

/// `==` on values is `equal?`
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::float(x)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::number(n)
    }
}

impl From<Error> for Value {
    fn from(err: Error) -> Self {
        Value::error(err)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::integer(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into))
    }
}

impl TryFrom<Value> for NumberType {
    type Error = Error;

    fn try_from(value: Value) -> Result<NumberType, Error> {
        match value.as_number() {
            Some(Number::Integer(n)) => Ok(n),
            _ => Err(Error::TypeError("expected integer".into())),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<bool, Error> {
        if let Value::Bool(b) = value {
            Ok(b)
        } else {
            Err(Error::TypeError("expected boolean".into()))
        }
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::symbol(name.as_ref())
}

/// Helper function for creating Values - works great in mixed lists!
/// Accepts any type that can be converted to Value
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for the empty list
pub fn nil() -> Value {
    Value::NIL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        // (helper_result, expected printed form)
        let test_cases = vec![
            (val(42), "42"),
            (val(-17), "-17"),
            (val(4294967295u32), "4294967295"),
            (val(-128i8), "-128"),
            (val(NumberType::MAX), "9223372036854775807"),
            (val(2.5), "2.5"),
            (val(3.0), "3.0"),
            (val(1e21), "1e21"),
            (val(f64::INFINITY), "+inf.0"),
            (val(f64::NEG_INFINITY), "-inf.0"),
            (val(f64::NAN), "+nan.0"),
            (val(true), "#t"),
            (val(false), "#f"),
            (val("hello"), "\"hello\""),
            (val("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\""),
            (sym("foo-bar?"), "foo-bar?"),
            (sym(String::from("test")), "test"),
            (nil(), "()"),
            (val([1, 2, 3]), "(1 2 3)"),
            (val(vec![sym("op"), val(42), val("s"), val(true)]), "(op 42 \"s\" #t)"),
            (val(vec![val([1]), nil()]), "((1) ())"),
            (Value::cons(val(1), val(2)), "(1 . 2)"),
            (Value::list_with_tail([val(1), val(2)], val(3)), "(1 2 . 3)"),
            (Value::error(Error::UnboundVariable("x".into())), "#<error: Unbound variable: x>"),
            (Value::Unspecified, "#<unspecified>"),
        ];

        for (i, (value, expected)) in test_cases.iter().enumerate() {
            assert_eq!(value.to_string(), *expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_singletons() {
        assert!(Value::TRUE.is_eq(&Value::boolean(true)));
        assert!(Value::FALSE.is_eq(&Value::boolean(false)));
        assert!(!Value::TRUE.is_eq(&Value::FALSE));
        assert!(Value::NIL.is_eq(&nil()));
        assert!(!Value::NIL.is_eq(&Value::FALSE));
    }

    #[test]
    fn test_equality_relations() {
        // (a, b, eq?, eqv?, equal?)
        let two = val(2);
        let pair = Value::cons(val(1), nil());
        let cases = vec![
            (val(1), val(1), false, true, true),
            (two.clone(), two.clone(), true, true, true),
            (val(2), val(2.0), false, false, false),
            (val(1.5), val(1.5), false, true, true),
            (val("string"), val("string"), false, true, true),
            (val("string"), val("string2"), false, false, false),
            (sym("a"), sym("a"), true, true, true),
            (sym("a"), sym("b"), false, false, false),
            (nil(), nil(), true, true, true),
            (val(true), val(true), true, true, true),
            (val(true), val(false), false, false, false),
            (pair.clone(), pair.clone(), true, true, true),
            (val([1, 2]), val([1, 2]), false, false, true),
            (val([1, 2]), val([1, 3]), false, false, false),
            (val(vec![val("a"), val([1])]), val(vec![val("a"), val([1])]), false, false, true),
            (Value::cons(val(1), val(2)), Value::cons(val(1), val(2)), false, false, true),
            (val([1, 2]), val([1]), false, false, false),
            (nil(), val(false), false, false, false),
            (val(0), val(false), false, false, false),
        ];

        for (i, (a, b, eq, eqv, equal)) in cases.iter().enumerate() {
            assert_eq!(a.is_eq(b), *eq, "eq? case {} ({a} {b})", i + 1);
            assert_eq!(a.is_eqv(b), *eqv, "eqv? case {} ({a} {b})", i + 1);
            assert_eq!(a.is_equal(b), *equal, "equal? case {} ({a} {b})", i + 1);
        }
    }

    #[test]
    fn test_errors_compare_by_message() {
        let a = Value::error(Error::TypeError("x".into()));
        let b = Value::error(Error::TypeError("x".into()));
        let c = Value::error(Error::TypeError("y".into()));
        assert!(!a.is_eq(&b));
        assert!(a.is_equal(&b));
        assert!(!a.is_equal(&c));
    }

    #[test]
    fn test_pair_mutation_is_shared() {
        let cell = Value::cons(val(1), nil());
        let alias = cell.clone();
        let Value::Pair(pair) = &cell else {
            panic!("expected a pair");
        };
        pair.set_head(val(99));
        pair.set_tail(val([2]));
        assert_eq!(alias.to_string(), "(99 2)");
    }

    #[test]
    fn test_list_to_vec() {
        assert_eq!(val([1, 2, 3]).list_to_vec(), Some(vec![val(1), val(2), val(3)]));
        assert_eq!(nil().list_to_vec(), Some(vec![]));
        assert_eq!(Value::cons(val(1), val(2)).list_to_vec(), None);
        assert_eq!(val(5).list_to_vec(), None);
    }

    /// `(1 2 ... n)` whose last cell points back to the cell at `back_to`
    fn circular_list(n: usize, back_to: usize) -> Value {
        let list = Value::list((1..=n as NumberType).map(val));
        let mut cells = Vec::new();
        let mut current = list.clone();
        while let Value::Pair(pair) = current {
            current = pair.tail();
            cells.push(pair);
        }
        cells[n - 1].set_tail(Value::Pair(Rc::clone(&cells[back_to])));
        list
    }

    #[test]
    fn test_dropping_long_and_deep_structures() {
        // A long spine
        let long = Value::list((0..300_000).map(val));
        drop(long);

        // A deep chain of heads: ((((... 0))))
        let mut deep = val(0);
        for _ in 0..300_000 {
            deep = Value::cons(deep, nil());
        }
        drop(deep);

        // Cells still shared elsewhere survive
        let shared_tail = Value::list((0..100_000).map(val));
        let front = Value::cons(val(-1), shared_tail.clone());
        drop(front);
        assert_eq!(shared_tail.list_to_vec().map(|items| items.len()), Some(100_000));
    }

    #[test]
    fn test_circular_lists() {
        let cases = vec![
            (circular_list(1, 0), "(1 ...)"),
            (circular_list(3, 0), "(1 2 3 ...)"),
            (circular_list(3, 1), "(1 2 3 ...)"),
        ];
        for (list, expected) in &cases {
            assert_eq!(list.to_string(), *expected);
            assert_eq!(list.list_to_vec(), None);
        }

        // A list that contains itself
        let outer = val([1, 2]);
        let Value::Pair(cell) = &outer else {
            panic!("expected a pair");
        };
        cell.set_head(outer.clone());
        assert_eq!(outer.to_string(), "(... 2)");

        // Shared but acyclic substructure is printed in full
        let inner = val([1]);
        assert_eq!(val(vec![inner.clone(), inner]).to_string(), "((1) (1))");

        // equal? terminates and compares the unrolled structure
        assert!(circular_list(2, 0).is_equal(&circular_list(2, 0)));
        assert!(!circular_list(2, 0).is_equal(&circular_list(2, 1)));
        assert!(!circular_list(2, 0).is_equal(&circular_list(3, 0)));
        assert!(!circular_list(1, 0).is_equal(&val([1])));
    }

    #[test]
    fn test_truthiness() {
        assert!(!val(false).is_truthy());
        for truthy in [val(true), val(0), nil(), val(""), sym("x"), Value::Unspecified] {
            assert!(truthy.is_truthy(), "{truthy} should be truthy");
        }
    }

    #[test]
    fn test_symbol_validation() {
        let valid = ["x", "foo-bar?", "+", "-", "...", "set-car!", "->x", "a.b", "%x", "<=?"];
        let invalid = ["", "1x", "-1", "+2", ".5", "-.5", ".", "a b", "a(b", "x'"];
        for name in valid {
            assert!(is_valid_symbol(name), "{name} should be a valid symbol");
        }
        for name in invalid {
            assert!(!is_valid_symbol(name), "{name} should be rejected");
        }
    }

    #[test]
    fn test_try_from() {
        assert_eq!(NumberType::try_from(val(7)), Ok(7));
        assert!(NumberType::try_from(val(7.5)).is_err());
        assert_eq!(bool::try_from(val(true)), Ok(true));
        assert!(bool::try_from(val("no")).is_err());
    }
}
