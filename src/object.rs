//! Heap object variants
//!
//! Every object is owned by the [`Heap`](crate::gc::Heap) until the collector
//! frees it. References between objects are plain [`Value`]s holding handles.

use std::rc::Rc;

use crate::bytecode::Chunk;
use crate::error::{ErrorClass, ErrorKind};
use crate::gc::Heap;
use crate::value::Value;

/// Whether a function is the root of a script or a declared `fn`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Script,
    Function,
}

/// A compiled function
#[derive(Debug, Clone)]
pub struct FunctionObj {
    pub name: String,
    pub kind: FunctionKind,
    pub arity: usize,
    pub chunk: Rc<Chunk>,
    /// Name of every local slot, indexed by slot number
    pub locals: Vec<String>,
}

impl FunctionObj {
    pub fn new(name: String, kind: FunctionKind, arity: usize, chunk: Chunk, locals: Vec<String>) -> Self {
        Self {
            name,
            kind,
            arity,
            chunk: Rc::new(chunk),
            locals,
        }
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// Slot index of the local called `name`
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.locals.iter().position(|local| local == name)
    }
}

/// Native function signature.
///
/// Native methods receive their receiver as `args[0]`.
pub type NativeFn = fn(&mut Heap, &[Value]) -> Result<Value, ErrorKind>;

/// Call convention of a native
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeKind {
    /// Called with exactly the arguments at the call site
    Function,
    /// Bound to a receiver that is prepended to the arguments
    Method { receiver: Value },
}

/// A builtin callable
#[derive(Clone)]
pub struct NativeObj {
    pub name: String,
    pub func: NativeFn,
    pub kind: NativeKind,
}

impl std::fmt::Debug for NativeObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

/// A first-class runtime error
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorObj {
    pub class: ErrorClass,
    pub message: String,
}

impl ErrorObj {
    pub fn from_kind(kind: &ErrorKind) -> Self {
        Self {
            class: kind.class(),
            message: format!("{}: {}", kind.class(), kind),
        }
    }
}

/// A cursor over a string or array used by `foreach`.
///
/// The target is referenced by handle, never copied or owned.
#[derive(Debug, Clone, PartialEq)]
pub struct IterableObj {
    pub target: Value,
    pub cursor: usize,
}

impl IterableObj {
    pub fn new(target: Value) -> Self {
        Self { target, cursor: 0 }
    }
}
