//! Values, records and stream items flowing between operators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::pipeline::PipelineWrapper;

/// A single structured value.
///
/// `Pipeline` values are pipelines stored in the namespace (e.g. `p = (| n: gen(n) |)`).
/// They live only inside one process and are never serialized.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    #[serde(skip)]
    Pipeline(Arc<PipelineWrapper>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Truthiness used by predicate operators (`select`).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Pipeline(_) => true,
        }
    }

    pub fn is_pipeline(&self) -> bool {
        matches!(self, Value::Pipeline(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Pipeline(a), Value::Pipeline(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Pipeline(p) => write!(f, "{p}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Fixed-arity record. Never empty: see [`Record::wrap`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Vec<Value>);

impl Record {
    /// Normalize a value into a record: a list becomes a record of its items, anything else
    /// (including an empty list) becomes a 1-record.
    pub fn wrap(value: Value) -> Self {
        match value {
            Value::List(items) if !items.is_empty() => Record(items),
            other => Record(vec![other]),
        }
    }

    /// Build a record from positional values. An empty vector yields a 1-record holding an
    /// empty list so the arity invariant holds.
    pub fn from_values(values: Vec<Value>) -> Self {
        if values.is_empty() {
            Record(vec![Value::List(Vec::new())])
        } else {
            Record(values)
        }
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    pub fn get(&self, i: usize) -> Option<&Value> {
        self.0.get(i)
    }

    /// Prefix the record with one more leading field (fork labels).
    pub fn prepend(self, head: Value) -> Self {
        let mut values = Vec::with_capacity(self.0.len() + 1);
        values.push(head);
        values.extend(self.0);
        Record(values)
    }

    /// Collapse back to a single value: 1-records give their only field, wider records a list.
    pub fn into_value(self) -> Value {
        let mut values = self.0;
        if values.len() == 1 {
            values.pop().unwrap_or(Value::Null)
        } else {
            Value::List(values)
        }
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Record::wrap(value)
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Record::from_values(values)
    }
}

impl From<i64> for Record {
    fn from(n: i64) -> Self {
        Record::wrap(Value::Int(n))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            return write!(f, "{}", self.0[0]);
        }
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

/// Identifies one branch of a fan-out: a thread index for local fork, a host for remote.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Thread(usize),
    Host(String),
}

impl Label {
    pub fn to_value(&self) -> Value {
        match self {
            Label::Thread(i) => Value::Int(*i as i64),
            Label::Host(h) => Value::Str(h.clone()),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Thread(i) => write!(f, "{i}"),
            Label::Host(h) => write!(f, "{h}"),
        }
    }
}

/// One entry of a stream as seen by a terminal sink: data or an error marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Record(Record),
    Error(Error),
}

impl Item {
    pub fn is_error(&self) -> bool {
        matches!(self, Item::Error(_))
    }

    pub fn record(&self) -> Option<&Record> {
        match self {
            Item::Record(r) => Some(r),
            Item::Error(_) => None,
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Record(r) => write!(f, "{r}"),
            Item::Error(e) => write!(f, "{e}"),
        }
    }
}
