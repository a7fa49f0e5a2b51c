use crate::{
    parser::{token as token_parser, white_space_or_comment, ws_prefixed},
    sname, Name,
};
use educe::Educe;
use either::Either;
use log::{debug, warn};
use std::{cell::RefCell, collections::HashMap, fmt::Display, rc::Rc};
use winnow::Parser;

pub mod graphics;
use graphics::{GraphicsState, Matrix, PageEvent, Point, Rgb};

pub type Array = Vec<Value>;
pub type TokenArray = Vec<Token>;
pub type Dictionary = HashMap<Name, Value>;

type OperatorFn = fn(&mut Machine) -> MachineResult<()>;

#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(Rc<RefCell<Vec<u8>>>),
    Name(Name),
    Array(Rc<RefCell<Array>>),
    Dictionary(Rc<RefCell<Dictionary>>),
    Procedure(Rc<RefCell<TokenArray>>),
}

/// Stack slot: a value, or one of the positional markers used to build
/// composite literals in place.
#[derive(Debug, PartialEq, Clone)]
pub enum RuntimeValue {
    Value(Value),
    /// Set by `mark`, consumed by `cleartomark`.
    Mark,
    /// Tells `]` where the array began.
    ArrayMark,
    /// Tells `>>` where the dictionary began.
    DictMark,
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::String(s) => write!(f, "({})", String::from_utf8_lossy(&s.borrow())),
            // literal names keep their leading slash in the payload
            Value::Name(n) => write!(f, "{}", n),
            Value::Array(_) => write!(f, "array"),
            Value::Dictionary(_) => write!(f, "dict"),
            Value::Procedure(_) => write!(f, "procedure"),
        }
    }
}

impl Display for RuntimeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeValue::Mark => write!(f, "mark"),
            RuntimeValue::ArrayMark => write!(f, "array-mark"),
            RuntimeValue::DictMark => write!(f, "dict-mark"),
            RuntimeValue::Value(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! value_access {
    ($method:ident, $opt_method:ident, $branch:ident, $t: ty) => {
        impl Value {
            #[allow(dead_code)]
            pub fn $opt_method(&self) -> Option<$t> {
                match self {
                    Self::$branch(v) => Some(v.clone()),
                    _ => None,
                }
            }

            #[allow(dead_code)]
            pub fn $method(&self) -> MachineResult<$t> {
                match self {
                    Self::$branch(v) => Ok(v.clone()),
                    _ => Err(MachineError::TypeCheck),
                }
            }
        }
    };
}

value_access!(bool, opt_bool, Bool, bool);
value_access!(int, opt_int, Integer, i64);
value_access!(real, opt_real, Real, f64);
value_access!(string, opt_string, String, Rc<RefCell<Vec<u8>>>);
value_access!(array, opt_array, Array, Rc<RefCell<Array>>);
value_access!(dict, opt_dict, Dictionary, Rc<RefCell<Dictionary>>);
value_access!(procedure, opt_procedure, Procedure, Rc<RefCell<TokenArray>>);
value_access!(name, opt_name, Name, Name);

impl Value {
    pub fn opt_number(&self) -> Option<Either<i64, f64>> {
        match self {
            Self::Integer(i) => Some(Either::Left(*i)),
            Self::Real(r) => Some(Either::Right(*r)),
            _ => None,
        }
    }

    pub fn number(&self) -> MachineResult<Either<i64, f64>> {
        self.opt_number().ok_or(MachineError::TypeCheck)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Literal(Value),
    /// Executable name, resolved against the operator registry and the
    /// dictionary stack at execution time.
    Name(Name),
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Literal(v) => write!(f, "{}", v),
            Token::Name(n) => write!(f, "{}", n),
        }
    }
}

macro_rules! to_value {
    ($t:ty, $branch:ident) => {
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::$branch(v)
            }
        }
    };
}
to_value!(bool, Bool);
to_value!(i64, Integer);
to_value!(f64, Real);

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::String(Rc::new(RefCell::new(v)))
    }
}

impl<const N: usize> From<[u8; N]> for Value {
    fn from(v: [u8; N]) -> Self {
        let bytes: Vec<u8> = v.into();
        bytes.into()
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Name(crate::name(v))
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Self::Array(Rc::new(RefCell::new(v)))
    }
}

impl From<Dictionary> for Value {
    fn from(v: Dictionary) -> Self {
        Self::Dictionary(Rc::new(RefCell::new(v)))
    }
}

impl From<TokenArray> for Value {
    fn from(v: TokenArray) -> Self {
        Self::Procedure(Rc::new(RefCell::new(v)))
    }
}

impl<T: Into<Value>> From<T> for RuntimeValue {
    fn from(v: T) -> Self {
        Self::Value(v.into())
    }
}

impl<T: Into<Value>> From<T> for Token {
    fn from(v: T) -> Self {
        Token::Literal(v.into())
    }
}

impl TryFrom<RuntimeValue> for Value {
    type Error = MachineError;

    fn try_from(v: RuntimeValue) -> Result<Self, Self::Error> {
        match v {
            RuntimeValue::Value(v) => Ok(v),
            _ => Err(MachineError::TypeCheck),
        }
    }
}

#[cfg(test)]
pub fn name_token(s: &str) -> Token {
    Token::Name(crate::name(s))
}

/// Create Array from a list of values
#[cfg(test)]
macro_rules! values {
    () => {
        Array::new()
    };
    ($($e:expr),*) => {
        vec![$(Into::<Value>::into($e)),*]
    }
}

#[cfg(test)]
macro_rules! rt_values {
    () => {
        Vec::<RuntimeValue>::new()
    };
    ($($e:expr),*) => {
        vec![$(Into::<RuntimeValue>::into($e)),*]
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum MachineError {
    #[error("stack underflow")]
    StackUnderflow,
    #[error("type check error")]
    TypeCheck,
    #[error("undefined")]
    Undefined,
    #[error("unmatched mark")]
    UnMatchedMark,
    #[error("range check error")]
    RangeCheck,
    #[error("division by zero")]
    DivisionByZero,
    #[error("dictionary stack underflow")]
    DictStackUnderflow,
    #[error("graphics state stack underflow")]
    GraphicsStackUnderflow,
}

pub type MachineResult<T> = Result<T, MachineError>;

/// Execution error with the failing token and the operand stack depth
/// at the point of failure.
#[derive(Debug, thiserror::Error)]
#[error("executing `{token}` (stack depth {stack_depth}): {source}")]
pub struct ScriptError {
    pub token: String,
    pub stack_depth: usize,
    #[source]
    pub source: MachineError,
}

/// Name to built-in operator function mapping, populated once at
/// machine construction. Registered operators shadow dictionary
/// bindings of the same name.
pub struct OperatorRegistry(HashMap<Name, OperatorFn>);

impl OperatorRegistry {
    fn get(&self, name: &str) -> Option<OperatorFn> {
        self.0.get(name).copied()
    }
}

macro_rules! built_in_ops {
    ($($k:expr => $v:expr),* $(,)?) => {
        OperatorRegistry(std::iter::Iterator::collect(
            std::iter::IntoIterator::into_iter([$((sname($k), ($v) as OperatorFn),)*]),
        ))
    };
}

/// Interpreter for the page description language: operand stack,
/// dictionary stack, graphics state stack and emitted drawing events.
#[derive(Educe)]
#[educe(Debug)]
pub struct Machine {
    #[educe(Debug(ignore))]
    operators: OperatorRegistry,
    stack: Vec<RuntimeValue>,
    variable_stack: VariableDictStack,
    graphics: Vec<GraphicsState>,
    events: Vec<PageEvent>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self {
            operators: operator_registry(),
            stack: Vec::new(),
            variable_stack: VariableDictStack::new(),
            graphics: vec![GraphicsState::default()],
            events: Vec::new(),
        }
    }

    /// Tokenize and run a whole program. Trailing bytes that are not
    /// white space or comments are reported and skipped.
    pub fn execute(&mut self, source: &[u8]) -> Result<(), ScriptError> {
        let mut input = source;
        while let Some(token) = next_token(&mut input) {
            self.exec_traced(token)?;
        }
        let mut remains = input;
        let _ = white_space_or_comment.parse_next(&mut remains);
        if !remains.is_empty() {
            warn!(
                "trailing bytes not executed: {:?}",
                String::from_utf8_lossy(&remains[..remains.len().min(16)])
            );
        }
        Ok(())
    }

    /// Run one pre-tokenized token.
    pub fn execute_token(&mut self, token: &str) -> Result<(), ScriptError> {
        let mut buf = token.as_bytes();
        match next_token(&mut buf) {
            Some(t) => self.exec_traced(t),
            None => Err(ScriptError {
                token: token.to_owned(),
                stack_depth: self.stack.len(),
                source: MachineError::Undefined,
            }),
        }
    }

    /// Push a value onto the operand stack.
    pub fn push_value(&mut self, v: Value) {
        self.push(v);
    }

    /// Resolve and run an executable name, exactly as if it appeared in
    /// a program.
    pub fn exec_operator(&mut self, name: &str) -> MachineResult<()> {
        self.exec_name(name)
    }

    pub fn stack(&self) -> &[RuntimeValue] {
        &self.stack
    }

    pub fn dict_stack_len(&self) -> usize {
        self.variable_stack.len()
    }

    pub fn graphics(&self) -> &GraphicsState {
        self.graphics.last().unwrap()
    }

    pub fn graphics_stack_len(&self) -> usize {
        self.graphics.len()
    }

    pub fn events(&self) -> &[PageEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<PageEvent> {
        std::mem::take(&mut self.events)
    }

    fn exec_traced(&mut self, token: Token) -> Result<(), ScriptError> {
        match self.exec(token.clone()) {
            Ok(()) => Ok(()),
            Err(source) => Err(ScriptError {
                token: token.to_string(),
                stack_depth: self.stack.len(),
                source,
            }),
        }
    }

    fn exec(&mut self, token: Token) -> MachineResult<()> {
        match token {
            Token::Literal(v) => {
                self.push(v);
                Ok(())
            }
            Token::Name(name) => self.exec_name(&name),
        }
    }

    fn exec_name(&mut self, name: &str) -> MachineResult<()> {
        if let Some(op) = self.operators.get(name) {
            return op(self);
        }
        match self.variable_stack.lookup(name) {
            Some(Value::Procedure(p)) => self.execute_procedure(p),
            Some(v) => {
                self.push(v);
                Ok(())
            }
            None => {
                warn!("unknown token `{}`, pushed as string", name);
                self.push(Value::from(name.as_bytes().to_vec()));
                Ok(())
            }
        }
    }

    /// Procedure bodies run in-line on the host call stack; nesting
    /// depth bounds on host stack depth.
    fn execute_procedure(&mut self, proc: Rc<RefCell<TokenArray>>) -> MachineResult<()> {
        for token in proc.borrow().iter().cloned() {
            self.exec(token)?;
        }
        Ok(())
    }

    fn pop(&mut self) -> MachineResult<RuntimeValue> {
        self.stack.pop().ok_or(MachineError::StackUnderflow)
    }

    fn pop_value(&mut self) -> MachineResult<Value> {
        self.pop()?.try_into()
    }

    fn top(&self) -> MachineResult<&RuntimeValue> {
        self.stack.last().ok_or(MachineError::StackUnderflow)
    }

    fn push(&mut self, v: impl Into<RuntimeValue>) {
        self.stack.push(v.into());
    }

    fn pop_number(&mut self) -> MachineResult<Either<i64, f64>> {
        self.pop_value()?.number()
    }

    fn pop_f64(&mut self) -> MachineResult<f64> {
        self.pop_number().map(to_f64)
    }

    fn pop_int(&mut self) -> MachineResult<i64> {
        self.pop_value()?.int()
    }

    fn pop_procedure(&mut self) -> MachineResult<Rc<RefCell<TokenArray>>> {
        self.pop_value()?.procedure()
    }

    fn pop_array(&mut self) -> MachineResult<Rc<RefCell<Array>>> {
        self.pop_value()?.array()
    }

    fn pop_dict(&mut self) -> MachineResult<Rc<RefCell<Dictionary>>> {
        self.pop_value()?.dict()
    }

    /// Dictionary key operand: a name, or a string converted to a name.
    fn pop_key(&mut self) -> MachineResult<Name> {
        key_of(self.pop_value()?)
    }

    fn pop_point(&mut self) -> MachineResult<Point> {
        let y = self.pop_f64()?;
        let x = self.pop_f64()?;
        Ok(Point::new(x, y))
    }

    fn truthy(&mut self) -> MachineResult<bool> {
        match self.pop_value()? {
            Value::Bool(b) => Ok(b),
            Value::Integer(i) => Ok(i != 0),
            Value::Real(r) => Ok(r != 0.0),
            _ => Err(MachineError::TypeCheck),
        }
    }

    fn gs(&mut self) -> &mut GraphicsState {
        self.graphics.last_mut().unwrap()
    }

    fn emit(&mut self, event: PageEvent) {
        self.events.push(event);
    }

    fn dump_stack(&self) {
        debug!("{}", {
            use std::fmt::Write;
            let mut s = "stack: ".to_owned();
            for v in self.stack.iter().rev() {
                write!(&mut s, "{} ", v).unwrap();
            }
            s
        });
    }
}

fn next_token(input: &mut &[u8]) -> Option<Token> {
    ws_prefixed(token_parser).parse_next(input).ok()
}

fn to_f64(v: Either<i64, f64>) -> f64 {
    v.either(|i| i as f64, |r| r)
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Integer(a), Value::Integer(b)) => a == b,
        (Value::Real(a), Value::Real(b)) => a == b,
        (Value::Integer(a), Value::Real(b)) | (Value::Real(b), Value::Integer(a)) => {
            *a as f64 == *b
        }
        (Value::String(a), Value::String(b)) => {
            Rc::ptr_eq(a, b) || a.borrow().as_slice() == b.borrow().as_slice()
        }
        (Value::Name(a), Value::Name(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
        (Value::Dictionary(a), Value::Dictionary(b)) => Rc::ptr_eq(a, b),
        (Value::Procedure(a), Value::Procedure(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

fn value_gt(a: &Value, b: &Value) -> MachineResult<bool> {
    Ok(match (a, b) {
        (Value::Integer(a), Value::Integer(b)) => a > b,
        (Value::String(a), Value::String(b)) => a.borrow().as_slice() > b.borrow().as_slice(),
        _ => {
            let a = a.number()?;
            let b = b.number()?;
            to_f64(a) > to_f64(b)
        }
    })
}

/// Dictionary stack. The bottom entry is the machine's initial default
/// dictionary; `begin`/`end` work above it and popping past the floor
/// is an error.
#[derive(Debug)]
struct VariableDictStack {
    stack: Vec<Rc<RefCell<Dictionary>>>,
}

impl VariableDictStack {
    fn new() -> Self {
        Self {
            stack: vec![Rc::new(RefCell::new(Dictionary::new()))],
        }
    }

    fn len(&self) -> usize {
        self.stack.len()
    }

    /// Search from the current dictionary down.
    fn lookup(&self, name: &str) -> Option<Value> {
        self.stack
            .iter()
            .rev()
            .find_map(|dict| dict.borrow().get(name).cloned())
    }

    fn push(&mut self, dict: Rc<RefCell<Dictionary>>) {
        self.stack.push(dict);
    }

    fn pop(&mut self) -> MachineResult<Rc<RefCell<Dictionary>>> {
        if self.stack.len() > 1 {
            Ok(self.stack.pop().unwrap())
        } else {
            Err(MachineError::DictStackUnderflow)
        }
    }

    fn top(&self) -> Rc<RefCell<Dictionary>> {
        self.stack.last().unwrap().clone()
    }
}

fn operator_registry() -> OperatorRegistry {
    built_in_ops!(
        // any1 any2 exch -> any2 any1
        "exch" => |m| {
            let a = m.pop()?;
            let b = m.pop()?;
            m.push(a);
            m.push(b);
            Ok(())
        },

        // any -> any any
        "dup" => |m| {
            let top = m.top()?.clone();
            m.push(top);
            Ok(())
        },
        "pop" => |m| {
            m.pop()?;
            Ok(())
        },
        "clear" => |m| {
            m.stack.clear();
            Ok(())
        },
        "count" => |m| {
            let len = m.stack.len() as i64;
            m.push(len);
            Ok(())
        },
        // any1 .. any(n) n copy -> any1 .. any(n) any1 .. any(n)
        "copy" => |m| {
            let count = m.pop_int()?;
            if count < 0 || count as usize > m.stack.len() {
                return Err(MachineError::RangeCheck);
            }
            let at = m.stack.len() - count as usize;
            let copied: Vec<_> = m.stack[at..].to_vec();
            m.stack.extend(copied);
            Ok(())
        },
        // any(n) ... any0 n index -> any(n) ... any0 any(n)
        "index" => |m| {
            let index = m.pop_int()?;
            if index < 0 {
                return Err(MachineError::RangeCheck);
            }
            let v = m
                .stack
                .len()
                .checked_sub(index as usize + 1)
                .and_then(|i| m.stack.get(i))
                .ok_or(MachineError::StackUnderflow)?
                .clone();
            m.push(v);
            Ok(())
        },
        "stack" => |m| {
            m.dump_stack();
            Ok(())
        },

        "mark" => |m| {
            m.push(RuntimeValue::Mark);
            Ok(())
        },
        "cleartomark" => |m| {
            loop {
                let v = m.pop().map_err(|e| {
                    if e == MachineError::StackUnderflow {
                        MachineError::UnMatchedMark
                    } else {
                        e
                    }
                })?;
                if v == RuntimeValue::Mark {
                    return Ok(());
                }
            }
        },

        "true" => |m| {
            m.push(true);
            Ok(())
        },
        "false" => |m| {
            m.push(false);
            Ok(())
        },
        "null" => |m| {
            m.push(Value::Null);
            Ok(())
        },

        // bool/int pairwise logic
        "and" => |m| {
            let a = m.pop_value()?;
            let b = m.pop_value()?;
            match (a, b) {
                (Value::Bool(a), Value::Bool(b)) => m.push(a && b),
                (Value::Integer(a), Value::Integer(b)) => m.push(a & b),
                _ => return Err(MachineError::TypeCheck),
            }
            Ok(())
        },
        "or" => |m| {
            let a = m.pop_value()?;
            let b = m.pop_value()?;
            match (a, b) {
                (Value::Bool(a), Value::Bool(b)) => m.push(a || b),
                (Value::Integer(a), Value::Integer(b)) => m.push(a | b),
                _ => return Err(MachineError::TypeCheck),
            }
            Ok(())
        },
        "not" => |m| {
            match m.pop_value()? {
                Value::Bool(b) => m.push(!b),
                Value::Integer(i) => m.push(!i),
                _ => return Err(MachineError::TypeCheck),
            }
            Ok(())
        },
        "xor" => |m| {
            let a = m.pop_value()?;
            let b = m.pop_value()?;
            match (a, b) {
                (Value::Bool(a), Value::Bool(b)) => m.push(a ^ b),
                (Value::Integer(a), Value::Integer(b)) => m.push(a ^ b),
                _ => return Err(MachineError::TypeCheck),
            }
            Ok(())
        },

        "eq" => |m| {
            let b = m.pop_value()?;
            let a = m.pop_value()?;
            m.push(value_eq(&a, &b));
            Ok(())
        },
        "ne" => |m| {
            let b = m.pop_value()?;
            let a = m.pop_value()?;
            m.push(!value_eq(&a, &b));
            Ok(())
        },
        "le" => |m| {
            let b = m.pop_value()?;
            let a = m.pop_value()?;
            m.push(!value_gt(&a, &b)? || value_eq(&a, &b));
            Ok(())
        },
        "lt" => |m| {
            let b = m.pop_value()?;
            let a = m.pop_value()?;
            m.push(!value_gt(&a, &b)? && !value_eq(&a, &b));
            Ok(())
        },
        "ge" => |m| {
            let b = m.pop_value()?;
            let a = m.pop_value()?;
            m.push(value_gt(&a, &b)? || value_eq(&a, &b));
            Ok(())
        },
        "gt" => |m| {
            let b = m.pop_value()?;
            let a = m.pop_value()?;
            m.push(value_gt(&a, &b)? && !value_eq(&a, &b));
            Ok(())
        },

        // num1 num2 add -> sum; integers stay integral
        "add" => |m| {
            let b = m.pop_number()?;
            let a = m.pop_number()?;
            match (a, b) {
                (Either::Left(a), Either::Left(b)) => m.push(a + b),
                (a, b) => m.push(to_f64(a) + to_f64(b)),
            }
            Ok(())
        },
        "sub" => |m| {
            let b = m.pop_number()?;
            let a = m.pop_number()?;
            match (a, b) {
                (Either::Left(a), Either::Left(b)) => m.push(a - b),
                (a, b) => m.push(to_f64(a) - to_f64(b)),
            }
            Ok(())
        },
        "mul" => |m| {
            let b = m.pop_number()?;
            let a = m.pop_number()?;
            match (a, b) {
                (Either::Left(a), Either::Left(b)) => m.push(a * b),
                (a, b) => m.push(to_f64(a) * to_f64(b)),
            }
            Ok(())
        },
        // div stays integral only when division is exact
        "div" => |m| {
            let b = m.pop_number()?;
            let a = m.pop_number()?;
            let zero = match b {
                Either::Left(i) => i == 0,
                Either::Right(r) => r == 0.0,
            };
            if zero {
                return Err(MachineError::DivisionByZero);
            }
            match (a, b) {
                (Either::Left(a), Either::Left(b)) if a % b == 0 => m.push(a / b),
                (a, b) => m.push(to_f64(a) / to_f64(b)),
            }
            Ok(())
        },

        // int array -> array of nulls
        "array" => |m| {
            let count = m.pop_int()?;
            if count < 0 {
                return Err(MachineError::RangeCheck);
            }
            m.push(vec![Value::Null; count as usize]);
            Ok(())
        },
        "[" => |m| {
            m.push(RuntimeValue::ArrayMark);
            Ok(())
        },
        "]" => |m| {
            let mut array = Array::new();
            loop {
                match m.pop().map_err(|e| {
                    if e == MachineError::StackUnderflow {
                        MachineError::UnMatchedMark
                    } else {
                        e
                    }
                })? {
                    RuntimeValue::ArrayMark => break,
                    RuntimeValue::Value(v) => array.push(v),
                    _ => return Err(MachineError::TypeCheck),
                }
            }
            array.reverse();
            m.push(array);
            Ok(())
        },

        // int dict -> empty dict with capacity hint
        "dict" => |m| {
            let count = m.pop_int()?;
            if count < 0 {
                return Err(MachineError::RangeCheck);
            }
            m.push(Dictionary::with_capacity(count as usize));
            Ok(())
        },
        "<<" => |m| {
            m.push(RuntimeValue::DictMark);
            Ok(())
        },
        ">>" => |m| {
            let mut dict = Dictionary::new();
            loop {
                let value = match m.pop().map_err(|e| {
                    if e == MachineError::StackUnderflow {
                        MachineError::UnMatchedMark
                    } else {
                        e
                    }
                })? {
                    RuntimeValue::DictMark => {
                        m.push(dict);
                        return Ok(());
                    }
                    RuntimeValue::Value(v) => v,
                    _ => return Err(MachineError::TypeCheck),
                };
                let key = m.pop_key()?;
                dict.insert(key, value);
            }
        },

        // int string -> zero filled string
        "string" => |m| {
            let count = m.pop_int()?;
            if count < 0 {
                return Err(MachineError::RangeCheck);
            }
            m.push(vec![0u8; count as usize]);
            Ok(())
        },

        // array|dict|string|procedure length -> int
        "length" => |m| {
            let len = match m.pop_value()? {
                Value::Array(a) => a.borrow().len(),
                Value::String(s) => s.borrow().len(),
                Value::Dictionary(d) => d.borrow().len(),
                Value::Procedure(p) => p.borrow().len(),
                _ => return Err(MachineError::TypeCheck),
            };
            m.push(len as i64);
            Ok(())
        },
        // array index get / string index get
        "get" => |m| {
            let key = m.pop_value()?;
            match m.pop_value()? {
                Value::Array(array) => {
                    let v = array
                        .borrow()
                        .get(index_of(key)?)
                        .cloned()
                        .ok_or(MachineError::RangeCheck)?;
                    m.push(v);
                }
                Value::Procedure(p) => {
                    let v = p
                        .borrow()
                        .get(index_of(key)?)
                        .cloned()
                        .ok_or(MachineError::RangeCheck)?;
                    match v {
                        Token::Literal(v) => m.push(v),
                        Token::Name(n) => m.push(Value::Name(n)),
                    }
                }
                Value::String(s) => {
                    let v = s
                        .borrow()
                        .get(index_of(key)?)
                        .copied()
                        .ok_or(MachineError::RangeCheck)?;
                    m.push(i64::from(v));
                }
                _ => return Err(MachineError::TypeCheck),
            }
            Ok(())
        },
        // mutation is visible through every alias of the composite
        "put" => |m| {
            let value = m.pop_value()?;
            let key = m.pop_value()?;
            match m.pop_value()? {
                Value::Array(array) => {
                    let index = index_of(key)?;
                    let mut array = array.borrow_mut();
                    if index >= array.len() {
                        return Err(MachineError::RangeCheck);
                    }
                    array[index] = value;
                }
                Value::String(s) => {
                    let index = index_of(key)?;
                    let mut s = s.borrow_mut();
                    if index >= s.len() {
                        return Err(MachineError::RangeCheck);
                    }
                    s[index] = value.int()? as u8;
                }
                _ => return Err(MachineError::TypeCheck),
            }
            Ok(())
        },
        // array aload -> elem0 .. elem(n-1) array
        "aload" => |m| {
            let array = m.pop_array()?;
            for v in array.borrow().iter() {
                m.push(v.clone());
            }
            m.push(Value::Array(array));
            Ok(())
        },
        // elem0 .. elem(n-1) array astore -> array
        "astore" => |m| {
            let array = m.pop_array()?;
            let len = array.borrow().len();
            if m.stack.len() < len {
                return Err(MachineError::StackUnderflow);
            }
            {
                let mut borrow = array.borrow_mut();
                for i in (0..len).rev() {
                    borrow[i] = m.pop_value()?;
                }
            }
            m.push(Value::Array(array));
            Ok(())
        },
        // array proc forall / dict proc forall / string proc forall
        "forall" => |m| {
            let proc = m.pop_procedure()?;
            match m.pop_value()? {
                Value::Array(array) => {
                    let items: Vec<_> = array.borrow().clone();
                    for v in items {
                        m.push(v);
                        m.execute_procedure(proc.clone())?;
                    }
                }
                Value::String(s) => {
                    let bytes: Vec<u8> = s.borrow().clone();
                    for b in bytes {
                        m.push(i64::from(b));
                        m.execute_procedure(proc.clone())?;
                    }
                }
                Value::Dictionary(d) => {
                    let items: Vec<(Value, Value)> = d
                        .borrow()
                        .iter()
                        .map(|(k, v)| (key_to_name(k), v.clone()))
                        .collect();
                    for (k, v) in items {
                        m.push(k);
                        m.push(v);
                        m.execute_procedure(proc.clone())?;
                    }
                }
                _ => return Err(MachineError::TypeCheck),
            }
            Ok(())
        },

        // key value def -> -, writes the current dictionary
        "def" => |m| {
            let value = m.pop_value()?;
            let key = m.pop_key()?;
            m.variable_stack.top().borrow_mut().insert(key, value);
            Ok(())
        },
        // key load -> value
        "load" => |m| {
            let key = m.pop_key()?;
            let v = m
                .variable_stack
                .lookup(&key)
                .ok_or(MachineError::Undefined)?;
            m.push(v);
            Ok(())
        },
        // dict key value store -> -, writes an explicit dictionary
        "store" => |m| {
            let value = m.pop_value()?;
            let key = m.pop_key()?;
            let dict = m.pop_dict()?;
            dict.borrow_mut().insert(key, value);
            Ok(())
        },
        // dict key known -> bool
        "known" => |m| {
            let key = m.pop_key()?;
            let dict = m.pop_dict()?;
            let r = dict.borrow().contains_key(&key);
            m.push(r);
            Ok(())
        },
        // dict keys -> array of /name values
        "keys" => |m| {
            let dict = m.pop_dict()?;
            let keys: Array = dict.borrow().keys().map(|k| key_to_name(k)).collect();
            m.push(keys);
            Ok(())
        },
        "begin" => |m| {
            let dict = m.pop_dict()?;
            m.variable_stack.push(dict);
            Ok(())
        },
        "end" => |m| {
            m.variable_stack.pop()?;
            Ok(())
        },
        "currentdict" => |m| {
            let top = m.variable_stack.top();
            m.push(Value::Dictionary(top));
            Ok(())
        },

        // bool proc if -> -
        "if" => |m| {
            let proc = m.pop_procedure()?;
            let cond = m.truthy()?;
            if cond {
                m.execute_procedure(proc)?;
            }
            Ok(())
        },
        // bool proc1 proc2 ifelse -> -
        "ifelse" => |m| {
            let proc2 = m.pop_procedure()?;
            let proc1 = m.pop_procedure()?;
            let cond = m.truthy()?;
            m.execute_procedure(if cond { proc1 } else { proc2 })
        },
        // int proc repeat -> -
        "repeat" => |m| {
            let proc = m.pop_procedure()?;
            let n = m.pop_int()?;
            if n < 0 {
                return Err(MachineError::RangeCheck);
            }
            for _ in 0..n {
                m.execute_procedure(proc.clone())?;
            }
            Ok(())
        },
        // initial increment limit proc for -> -, loop variable pushed
        // before each run, direction follows the increment's sign
        "for" => |m| {
            let proc = m.pop_procedure()?;
            let limit = m.pop_int()?;
            let increment = m.pop_int()?;
            let initial = m.pop_int()?;
            if increment == 0 {
                return Err(MachineError::RangeCheck);
            }
            let mut i = initial;
            while (increment > 0 && i <= limit) || (increment < 0 && i >= limit) {
                m.push(i);
                m.execute_procedure(proc.clone())?;
                i += increment;
            }
            Ok(())
        },
        "exec" => |m| {
            let proc = m.pop_procedure()?;
            m.execute_procedure(proc)
        },

        // string show -> -, emits the text event
        "show" => |m| {
            let s = m.pop_value()?.string()?;
            let bytes = s.borrow().clone();
            m.emit(PageEvent::Text(bytes));
            Ok(())
        },

        // x y moveto -> -
        "moveto" => |m| {
            let p = m.pop_point()?;
            m.gs().move_to(p);
            Ok(())
        },
        "lineto" => |m| {
            let p = m.pop_point()?;
            m.gs().line_to(p);
            Ok(())
        },
        // x1 y1 x2 y2 x3 y3 curveto -> -
        "curveto" => |m| {
            let p3 = m.pop_point()?;
            let p2 = m.pop_point()?;
            let p1 = m.pop_point()?;
            m.gs().curve_to(p1, p2, p3);
            Ok(())
        },
        "closepath" => |m| {
            m.gs().close_path();
            Ok(())
        },
        "newpath" => |m| {
            m.gs().path.clear();
            Ok(())
        },
        "stroke" => |m| {
            let gs = m.gs();
            let path = std::mem::take(&mut gs.path);
            let (ctm, color, line_width) = (gs.ctm, gs.color, gs.line_width);
            m.emit(PageEvent::Stroke {
                path,
                ctm,
                color,
                line_width,
            });
            Ok(())
        },
        "fill" => |m| {
            let gs = m.gs();
            let path = std::mem::take(&mut gs.path);
            let (ctm, color) = (gs.ctm, gs.color);
            m.emit(PageEvent::Fill { path, ctm, color });
            Ok(())
        },
        // paint the same path twice, then drop it
        "fillstroke" => |m| {
            let gs = m.gs();
            let path = std::mem::take(&mut gs.path);
            let (ctm, color, line_width) = (gs.ctm, gs.color, gs.line_width);
            m.emit(PageEvent::Fill {
                path: path.clone(),
                ctm,
                color,
            });
            m.emit(PageEvent::Stroke {
                path,
                ctm,
                color,
                line_width,
            });
            Ok(())
        },
        "gsave" => |m| {
            let top = m.graphics.last().unwrap().clone();
            m.graphics.push(top);
            Ok(())
        },
        "grestore" => |m| {
            if m.graphics.len() <= 1 {
                return Err(MachineError::GraphicsStackUnderflow);
            }
            m.graphics.pop();
            Ok(())
        },
        // tx ty translate -> -
        "translate" => |m| {
            let ty = m.pop_f64()?;
            let tx = m.pop_f64()?;
            m.gs().concat(Matrix::translation(tx, ty));
            Ok(())
        },
        "scale" => |m| {
            let sy = m.pop_f64()?;
            let sx = m.pop_f64()?;
            m.gs().concat(Matrix::scaling(sx, sy));
            Ok(())
        },
        // degrees rotate -> -
        "rotate" => |m| {
            let degrees = m.pop_f64()?;
            m.gs().concat(Matrix::rotation(degrees));
            Ok(())
        },
        // a b c d e f concat -> -
        "concat" => |m| {
            let f = m.pop_f64()?;
            let e = m.pop_f64()?;
            let d = m.pop_f64()?;
            let c = m.pop_f64()?;
            let b = m.pop_f64()?;
            let a = m.pop_f64()?;
            m.gs().concat(Matrix::new(a, b, c, d, e, f));
            Ok(())
        },
        "setrgbcolor" => |m| {
            let b = m.pop_f64()?;
            let g = m.pop_f64()?;
            let r = m.pop_f64()?;
            m.gs().color = Rgb::new(r, g, b);
            Ok(())
        },
        "setgray" => |m| {
            let level = m.pop_f64()?;
            m.gs().color = Rgb::gray(level);
            Ok(())
        },
        "setlinewidth" => |m| {
            let w = m.pop_f64()?;
            m.gs().line_width = w;
            Ok(())
        },
        "showpage" => |m| {
            m.emit(PageEvent::EndPage);
            Ok(())
        },
    )
}

/// Name or string operand as a dictionary key. The leading `/` of a
/// literal name is stripped here, at the point of key use, only.
fn key_of(v: Value) -> MachineResult<Name> {
    fn strip(s: &str) -> &str {
        s.strip_prefix('/').unwrap_or(s)
    }

    match v {
        Value::Name(n) => Ok(crate::name(strip(&n))),
        Value::String(s) => {
            let s = s.borrow();
            std::str::from_utf8(&s)
                .map(|s| crate::name(strip(s)))
                .map_err(|_| MachineError::TypeCheck)
        }
        _ => Err(MachineError::TypeCheck),
    }
}

fn index_of(v: Value) -> MachineResult<usize> {
    let i = v.int()?;
    usize::try_from(i).map_err(|_| MachineError::RangeCheck)
}

/// Stored dictionary key back to a literal name value, slash restored.
fn key_to_name(key: &Name) -> Value {
    Value::Name(crate::name(&format!("/{}", key)))
}

#[cfg(test)]
mod tests;
