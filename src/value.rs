//! Runtime value types for Ship

use std::fmt;
use crate::gc::{Handle, Heap};

/// Runtime values in Ship
///
/// Numbers, booleans and nil live on the stack; everything else is a handle
/// into the garbage-collected heap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(Handle),
    Array(Handle),
    Function(Handle),
    Native(Handle),
    Error(Handle),
    Iterator(Handle),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Function(_) => "function",
            Value::Native(_) => "native function",
            Value::Error(_) => "error",
            Value::Iterator(_) => "iterator",
        }
    }

    /// The heap object this value refers to, if any
    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            Value::String(h)
            | Value::Array(h)
            | Value::Function(h)
            | Value::Native(h)
            | Value::Error(h)
            | Value::Iterator(h) => Some(*h),
            Value::Nil | Value::Bool(_) | Value::Number(_) => None,
        }
    }

    /// Nil, false, zero and empty strings/arrays are falsy; all else is truthy
    pub fn is_truthy(&self, heap: &Heap) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(h) => heap.get_string(*h).is_some_and(|s| !s.is_empty()),
            Value::Array(h) => heap.get_array(*h).is_some_and(|a| !a.is_empty()),
            _ => true,
        }
    }

    /// Equality as seen by `==`: strings compare by content, other heap
    /// objects by identity
    pub fn equals(&self, other: &Value, heap: &Heap) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => {
                a == b || heap.get_string(*a) == heap.get_string(*b)
            }
            _ => self == other,
        }
    }

    pub fn display(&self, heap: &Heap) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(h) => match heap.get_string(*h) {
                Some(s) => s.to_string(),
                None => "<string (collected)>".to_string(),
            },
            Value::Array(h) => match heap.get_array(*h) {
                Some(arr) => {
                    let items: Vec<String> = arr
                        .iter()
                        .map(|v| match v {
                            Value::String(_) => format!("\"{}\"", v.display(heap)),
                            _ => v.display(heap),
                        })
                        .collect();
                    format!("[{}]", items.join(", "))
                }
                None => "<array (collected)>".to_string(),
            },
            Value::Function(h) => match heap.get_function(*h) {
                Some(f) => format!("<fn {}>", f.name),
                None => "<fn (collected)>".to_string(),
            },
            Value::Native(h) => match heap.get_native(*h) {
                Some(n) => format!("<native fn {}>", n.name),
                None => "<native fn (collected)>".to_string(),
            },
            Value::Error(h) => match heap.get_error(*h) {
                Some(e) => e.message.clone(),
                None => "<error (collected)>".to_string(),
            },
            Value::Iterator(_) => "<iterator>".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            // Cannot reach the contents without the heap
            other => write!(f, "<{}>", other.type_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        let mut heap = Heap::new(16);
        let empty = Value::String(heap.alloc_string(String::new()));
        let text = Value::String(heap.alloc_string("x".into()));
        let no_items = Value::Array(heap.alloc_array(Vec::new()));
        let items = Value::Array(heap.alloc_array(vec![Value::Nil]));

        assert!(!Value::Nil.is_truthy(&heap));
        assert!(!Value::Bool(false).is_truthy(&heap));
        assert!(!Value::Number(0.0).is_truthy(&heap));
        assert!(!empty.is_truthy(&heap));
        assert!(!no_items.is_truthy(&heap));

        assert!(Value::Bool(true).is_truthy(&heap));
        assert!(Value::Number(-1.5).is_truthy(&heap));
        assert!(text.is_truthy(&heap));
        assert!(items.is_truthy(&heap));
    }

    #[test]
    fn test_string_equality_by_content() {
        let mut heap = Heap::new(16);
        let a = Value::String(heap.alloc_string("ship".into()));
        let b = Value::String(heap.alloc_string("ship".into()));
        let c = Value::String(heap.alloc_string("boat".into()));
        assert!(a.equals(&b, &heap));
        assert!(!a.equals(&c, &heap));
        assert!(!a.equals(&Value::Nil, &heap));
    }

    #[test]
    fn test_display() {
        let mut heap = Heap::new(16);
        let s = Value::String(heap.alloc_string("hi".into()));
        let arr = Value::Array(heap.alloc_array(vec![Value::Number(1.0), s, Value::Bool(true)]));
        assert_eq!(Value::Number(10.0).display(&heap), "10");
        assert_eq!(Value::Number(2.5).display(&heap), "2.5");
        assert_eq!(arr.display(&heap), "[1, \"hi\", true]");
    }
}
