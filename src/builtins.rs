//! Builtin functions and attributes of primitive values
//!
//! The VM only knows the contract: [`lookup`] maps a receiver and an attribute
//! name to a native, dispatching on the receiver's type first and the name
//! second. The native is invoked with the receiver as `args[0]`.

use crate::error::{ErrorClass, ErrorKind};
use crate::gc::{Handle, Heap};
use crate::object::NativeFn;
use crate::value::Value;

/// Plain natives the VM registers as globals
pub const GLOBALS: &[(&str, NativeFn)] = &[
    ("str", native_str),
    ("type", native_type),
    ("len", native_len),
];

/// Resolve `receiver.name` to a native method
pub fn lookup(receiver: &Value, name: &str) -> Result<NativeFn, ErrorKind> {
    let found = match receiver {
        Value::Number(_) => number_attr(name),
        Value::String(_) => string_attr(name),
        Value::Array(_) => array_attr(name),
        _ => None,
    };
    found.ok_or_else(|| {
        ErrorKind::Raised(
            ErrorClass::Name,
            format!("'{}' object has no attribute '{}'", receiver.type_name(), name),
        )
    })
}

fn number_attr(name: &str) -> Option<NativeFn> {
    let f: NativeFn = match name {
        "to_str" => number_to_str,
        "floor" => |_, args| unary_math(args, f64::floor),
        "ceil" => |_, args| unary_math(args, f64::ceil),
        "round" => |_, args| unary_math(args, f64::round),
        "abs" => |_, args| unary_math(args, f64::abs),
        "is_int" => number_is_int,
        _ => return None,
    };
    Some(f)
}

fn string_attr(name: &str) -> Option<NativeFn> {
    let f: NativeFn = match name {
        "len" => native_len,
        "upper" => |heap, args| map_string(heap, args, str::to_uppercase),
        "lower" => |heap, args| map_string(heap, args, str::to_lowercase),
        "to_num" => string_to_num,
        "contains" => string_contains,
        _ => return None,
    };
    Some(f)
}

fn array_attr(name: &str) -> Option<NativeFn> {
    let f: NativeFn = match name {
        "len" => native_len,
        "push" => array_push,
        "pop" => array_pop,
        "get" => array_get,
        _ => return None,
    };
    Some(f)
}

/// Validate the argument count, receiver included
fn expect_args(args: &[Value], min: usize, max: usize) -> Result<(), ErrorKind> {
    if args.len() < min {
        return Err(ErrorKind::Raised(ErrorClass::Syntax, "not enough arguments".to_string()));
    }
    if args.len() > max {
        return Err(ErrorKind::Raised(ErrorClass::Syntax, "too many arguments".to_string()));
    }
    Ok(())
}

fn type_error(expected: &str, got: &Value) -> ErrorKind {
    ErrorKind::Raised(
        ErrorClass::Type,
        format!("expected {}, got '{}'", expected, got.type_name()),
    )
}

fn stale(value: &Value) -> ErrorKind {
    ErrorKind::Raised(ErrorClass::Type, format!("{} was already collected", value.type_name()))
}

fn string_arg<'h>(heap: &'h Heap, value: &Value) -> Result<&'h str, ErrorKind> {
    match value {
        Value::String(h) => heap.get_string(*h).ok_or_else(|| stale(value)),
        other => Err(type_error("string", other)),
    }
}

fn array_handle(value: &Value) -> Result<Handle, ErrorKind> {
    match value {
        Value::Array(h) => Ok(*h),
        other => Err(type_error("array", other)),
    }
}

fn number_arg(value: &Value) -> Result<f64, ErrorKind> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(type_error("number", other)),
    }
}

// ==================== Globals ====================

fn native_str(heap: &mut Heap, args: &[Value]) -> Result<Value, ErrorKind> {
    expect_args(args, 1, 1)?;
    let text = args[0].display(heap);
    Ok(Value::String(heap.alloc_string(text)))
}

fn native_type(heap: &mut Heap, args: &[Value]) -> Result<Value, ErrorKind> {
    expect_args(args, 1, 1)?;
    Ok(Value::String(heap.alloc_string(args[0].type_name().to_string())))
}

fn native_len(heap: &mut Heap, args: &[Value]) -> Result<Value, ErrorKind> {
    expect_args(args, 1, 1)?;
    let len = match &args[0] {
        Value::String(_) => string_arg(heap, &args[0])?.chars().count(),
        Value::Array(h) => heap.get_array(*h).ok_or_else(|| stale(&args[0]))?.len(),
        other => return Err(type_error("string or array", other)),
    };
    Ok(Value::Number(len as f64))
}

// ==================== Numbers ====================

fn number_to_str(heap: &mut Heap, args: &[Value]) -> Result<Value, ErrorKind> {
    expect_args(args, 1, 1)?;
    let n = number_arg(&args[0])?;
    Ok(Value::String(heap.alloc_string(n.to_string())))
}

fn number_is_int(_heap: &mut Heap, args: &[Value]) -> Result<Value, ErrorKind> {
    expect_args(args, 1, 1)?;
    let n = number_arg(&args[0])?;
    Ok(Value::Bool(n.is_finite() && n.fract() == 0.0))
}

fn unary_math(args: &[Value], op: fn(f64) -> f64) -> Result<Value, ErrorKind> {
    expect_args(args, 1, 1)?;
    Ok(Value::Number(op(number_arg(&args[0])?)))
}

// ==================== Strings ====================

fn map_string(heap: &mut Heap, args: &[Value], op: fn(&str) -> String) -> Result<Value, ErrorKind> {
    expect_args(args, 1, 1)?;
    let mapped = op(string_arg(heap, &args[0])?);
    Ok(Value::String(heap.alloc_string(mapped)))
}

fn string_to_num(heap: &mut Heap, args: &[Value]) -> Result<Value, ErrorKind> {
    expect_args(args, 1, 1)?;
    let text = string_arg(heap, &args[0])?;
    text.trim().parse::<f64>().map(Value::Number).map_err(|_| {
        ErrorKind::Raised(
            ErrorClass::Type,
            format!("could not convert string to number: '{}'", text),
        )
    })
}

fn string_contains(heap: &mut Heap, args: &[Value]) -> Result<Value, ErrorKind> {
    expect_args(args, 2, 2)?;
    let haystack = string_arg(heap, &args[0])?;
    let needle = string_arg(heap, &args[1])?;
    Ok(Value::Bool(haystack.contains(needle)))
}

// ==================== Arrays ====================

fn array_push(heap: &mut Heap, args: &[Value]) -> Result<Value, ErrorKind> {
    expect_args(args, 2, 2)?;
    let handle = array_handle(&args[0])?;
    let items = heap.get_array_mut(handle).ok_or_else(|| stale(&args[0]))?;
    items.push(args[1]);
    Ok(Value::Nil)
}

fn array_pop(heap: &mut Heap, args: &[Value]) -> Result<Value, ErrorKind> {
    expect_args(args, 1, 1)?;
    let handle = array_handle(&args[0])?;
    let items = heap.get_array_mut(handle).ok_or_else(|| stale(&args[0]))?;
    Ok(items.pop().unwrap_or(Value::Nil))
}

fn array_get(heap: &mut Heap, args: &[Value]) -> Result<Value, ErrorKind> {
    expect_args(args, 2, 2)?;
    let handle = array_handle(&args[0])?;
    let index = number_arg(&args[1])?;
    let items = heap.get_array(handle).ok_or_else(|| stale(&args[0]))?;
    if index < 0.0 || index.fract() != 0.0 || index as usize >= items.len() {
        return Err(ErrorKind::Raised(
            ErrorClass::Type,
            format!("array index {} out of range", index),
        ));
    }
    Ok(items[index as usize])
}
