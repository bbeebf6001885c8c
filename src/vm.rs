//! Stack-based Virtual Machine for Ship
//!
//! One interpreter loop runs the innermost frame. Calls push a frame instead of
//! recursing on the host stack, so call depth is bounded by the configured
//! frame limit alone.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::builtins;
use crate::bytecode::{Chunk, OpCode};
use crate::config::VmConfig;
use crate::error::{ErrorClass, ErrorKind, Result, RuntimeError, ShipError};
use crate::gc::{Handle, Heap};
use crate::object::{ErrorObj, NativeFn, NativeKind};
use crate::value::Value;

/// One function activation
#[derive(Debug, Clone)]
struct StackFrame {
    /// The function being executed
    function: Handle,

    /// The chunk being executed (cached from the function)
    chunk: Rc<Chunk>,

    /// Instruction pointer
    ip: usize,

    /// Offset of the instruction currently executing, for error lines
    op_start: usize,

    /// Local slots; `None` until the slot is first bound
    locals: Vec<Option<Value>>,

    /// Stack height when the frame was entered
    stack_base: usize,
}

/// Where `print` writes
#[derive(Debug)]
enum Output {
    Stdout,
    Captured(Vec<String>),
}

/// The Virtual Machine
pub struct VM {
    /// Value stack
    stack: Vec<Value>,

    /// Call frames
    frames: Vec<StackFrame>,

    /// Global variables. Not scanned by the collector.
    globals: HashMap<String, Value>,

    /// Garbage collected heap
    pub heap: Heap,

    /// Natives registered by the VM itself, kept alive across collections
    builtins: Vec<Handle>,

    config: VmConfig,
    output: Output,
}

fn no_frame() -> ErrorKind {
    ErrorKind::Raised(ErrorClass::Fatal, "no active call frame".to_string())
}

impl VM {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut vm = Self {
            stack: Vec::with_capacity(config.stack_max),
            frames: Vec::with_capacity(config.frames_max),
            globals: HashMap::new(),
            heap: Heap::new(config.gc_threshold),
            builtins: Vec::new(),
            config,
            output: Output::Stdout,
        };

        for &(name, func) in builtins::GLOBALS {
            vm.define_native(name, func);
        }
        vm
    }

    /// Register a native function as a global
    pub fn define_native(&mut self, name: &str, func: NativeFn) {
        let handle = self.heap.alloc_native(name, func, NativeKind::Function);
        self.builtins.push(handle);
        self.globals.insert(name.to_string(), Value::Native(handle));
    }

    /// Bind a global. The value is not a collection root.
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).copied()
    }

    /// Send `print` output to an in-memory buffer instead of stdout
    pub fn capture_output(&mut self) {
        self.output = Output::Captured(Vec::new());
    }

    /// Drain captured output lines
    pub fn take_output(&mut self) -> Vec<String> {
        match &mut self.output {
            Output::Captured(lines) => std::mem::take(lines),
            Output::Stdout => Vec::new(),
        }
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Run a compiled script function to completion.
    ///
    /// On a runtime error every frame above the script root is discarded and
    /// the error object is left as the only value on the stack.
    pub fn interpret(&mut self, function: Handle) -> Result<()> {
        self.stack.clear();
        self.frames.clear();

        let Some(script) = self.heap.get_function(function) else {
            return Err(self.raise(ErrorKind::NotCallable("nil")));
        };
        let frame = StackFrame {
            function,
            chunk: Rc::clone(&script.chunk),
            ip: 0,
            op_start: 0,
            locals: vec![None; script.local_count()],
            stack_base: 0,
        };
        trace!(function = %script.name, "push frame");
        self.frames.push(frame);

        match self.execute() {
            Ok(()) => Ok(()),
            Err(kind) => Err(self.raise(kind)),
        }
    }

    /// Turn an error into a heap error object and unwind to the root frame
    fn raise(&mut self, kind: ErrorKind) -> ShipError {
        let line = self
            .frames
            .last()
            .map(|frame| frame.chunk.line_at(frame.op_start))
            .unwrap_or(0);
        debug!(depth = self.frames.len(), line, error = %kind, "runtime error, unwinding");

        self.frames.truncate(1);
        self.stack.clear();

        let obj = ErrorObj::from_kind(&kind);
        let handle = self.heap.alloc_error(obj.class, obj.message);
        self.stack.push(Value::Error(handle));

        ShipError::Runtime(RuntimeError {
            kind,
            line,
            file: self.config.file_name.clone(),
        })
    }

    pub fn collect_garbage(&mut self) {
        let before = self.heap.object_count();

        // 1. Mark roots
        for value in &self.stack {
            self.heap.mark_value(*value);
        }
        for frame in &self.frames {
            self.heap.mark(frame.function);
            for local in frame.locals.iter().flatten() {
                self.heap.mark_value(*local);
            }
        }
        for handle in &self.builtins {
            self.heap.mark(*handle);
        }

        // 2. Trace references
        self.heap.trace_references();

        // 3. Sweep
        let freed = self.heap.sweep();

        debug!(
            before,
            after = self.heap.object_count(),
            freed,
            next_gc = self.heap.next_gc(),
            "garbage collection"
        );
    }

    /// Collect if the next allocation would cross the threshold.
    /// Anything the caller still needs must be reachable from a root.
    fn maybe_collect(&mut self) {
        if self.config.stress_gc || self.heap.should_collect() {
            self.collect_garbage();
        }
    }

    fn execute(&mut self) -> std::result::Result<(), ErrorKind> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(());
            };

            let op_start = frame.ip;
            let code = &frame.chunk.code;
            let byte = code.get(op_start).copied().unwrap_or(OpCode::Halt as u8);
            let opcode = OpCode::try_from(byte).map_err(|b| {
                ErrorKind::Raised(ErrorClass::Fatal, format!("invalid opcode {}", b))
            })?;
            let byte_at = |offset: usize| code.get(offset).copied().unwrap_or(0);
            let operand = match opcode.operand_len() {
                1 => usize::from(byte_at(op_start + 1)),
                2 => usize::from(u16::from_be_bytes([byte_at(op_start + 1), byte_at(op_start + 2)])),
                _ => 0,
            };
            frame.op_start = op_start;
            frame.ip = op_start + 1 + opcode.operand_len();

            match opcode {
                OpCode::Constant => {
                    let value = self.constant(operand)?;
                    self.push(value)?;
                }

                OpCode::Nil => self.push(Value::Nil)?,
                OpCode::True => self.push(Value::Bool(true))?,
                OpCode::False => self.push(Value::Bool(false))?,

                OpCode::PopTop => {
                    self.pop()?;
                }

                // === Arithmetic ===
                OpCode::Add => self.add()?,
                OpCode::Sub => self.binary_op("-", |a, b| a - b)?,
                OpCode::Mul => self.binary_op("*", |a, b| a * b)?,
                OpCode::Div => {
                    self.check_divisor("/")?;
                    self.binary_op("/", |a, b| a / b)?;
                }
                OpCode::Mod => {
                    self.check_divisor("%")?;
                    self.binary_op("%", |a, b| a % b)?;
                }
                OpCode::Negate => match self.pop()? {
                    Value::Number(n) => self.push(Value::Number(-n))?,
                    other => {
                        return Err(ErrorKind::TypeMismatch(
                            "number for unary '-'".to_string(),
                            other.type_name(),
                        ))
                    }
                },

                // === Comparison ===
                OpCode::Not => {
                    let value = self.pop()?;
                    let truthy = value.is_truthy(&self.heap);
                    self.push(Value::Bool(!truthy))?;
                }
                OpCode::Compare => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let equal = a.equals(&b, &self.heap);
                    self.push(Value::Bool(equal))?;
                }
                OpCode::LessThan => self.comparison_op("<", |a, b| a < b)?,
                OpCode::GreaterThan => self.comparison_op(">", |a, b| a > b)?,

                // === Locals ===
                OpCode::StoreFast => {
                    let value = self.pop()?;
                    self.set_local(operand, value)?;
                }
                OpCode::LoadLocal => {
                    let frame = self.frames.last().ok_or_else(no_frame)?;
                    match frame.locals.get(operand).copied().flatten() {
                        Some(value) => self.push(value)?,
                        None => return Err(self.unbound_local(operand)),
                    }
                }
                OpCode::AssignLocal => {
                    let bound = self
                        .frames
                        .last()
                        .and_then(|frame| frame.locals.get(operand))
                        .is_some_and(Option::is_some);
                    if !bound {
                        return Err(self.unbound_local(operand));
                    }
                    let value = self.pop()?;
                    self.set_local(operand, value)?;
                }

                // === Globals ===
                OpCode::LoadGlobal => {
                    let name = self.constant_name(operand)?;
                    let value = match self.find_outer_local(&name) {
                        Some((depth, slot)) => self.frames[depth].locals[slot],
                        None => self.globals.get(&name).copied(),
                    };
                    match value {
                        Some(value) => self.push(value)?,
                        None => return Err(ErrorKind::UndefinedVariable(name)),
                    }
                }
                OpCode::AssignGlobal => {
                    let name = self.constant_name(operand)?;
                    let value = self.peek(0)?;
                    if let Some((depth, slot)) = self.find_outer_local(&name) {
                        self.frames[depth].locals[slot] = Some(value);
                    } else if let Some(global) = self.globals.get_mut(&name) {
                        *global = value;
                    } else {
                        return Err(ErrorKind::UndefinedVariable(name));
                    }
                    self.pop()?;
                }

                // === Control flow ===
                OpCode::PopJumpIfFalse => {
                    let condition = self.pop()?;
                    if !condition.is_truthy(&self.heap) {
                        self.frame_mut()?.ip += operand;
                    }
                }
                OpCode::Jump => self.frame_mut()?.ip += operand,
                OpCode::JumpBackward => self.frame_mut()?.ip -= operand,

                // === Functions ===
                OpCode::Call => self.call_value(operand)?,
                OpCode::Return => {
                    let result = self.pop()?;
                    let frame = self.frames.pop().ok_or_else(no_frame)?;
                    trace!(depth = self.frames.len(), "pop frame");
                    self.stack.truncate(frame.stack_base);
                    if self.frames.is_empty() {
                        return Ok(());
                    }
                    self.push(result)?;
                }

                // === Iteration ===
                OpCode::GetIter => {
                    let target = self.peek(0)?;
                    if !matches!(target, Value::String(_) | Value::Array(_)) {
                        return Err(ErrorKind::TypeMismatch(
                            "string or array to iterate".to_string(),
                            target.type_name(),
                        ));
                    }
                    self.maybe_collect();
                    let handle = self.heap.alloc_iterator(target);
                    self.pop()?;
                    self.push(Value::Iterator(handle))?;
                }
                OpCode::ForIter => match self.iterate()? {
                    Some(value) => self.push(value)?,
                    None => self.frame_mut()?.ip += operand,
                },
                OpCode::EndFor => {
                    if let Value::Iterator(handle) = self.pop()? {
                        self.heap.release(handle);
                    }
                }

                // === Aggregates and attributes ===
                OpCode::BuildArray => {
                    let start = self
                        .stack
                        .len()
                        .checked_sub(operand)
                        .ok_or_else(stack_underflow)?;
                    self.maybe_collect();
                    let items = self.stack[start..].to_vec();
                    let handle = self.heap.alloc_array(items);
                    self.stack.truncate(start);
                    self.push(Value::Array(handle))?;
                }
                OpCode::LoadAttr => {
                    let name = self.constant_name(operand)?;
                    let receiver = self.peek(0)?;
                    let func = builtins::lookup(&receiver, &name)?;
                    self.maybe_collect();
                    let handle = self.heap.alloc_native(&name, func, NativeKind::Method { receiver });
                    self.pop()?;
                    self.push(Value::Native(handle))?;
                }

                OpCode::ShowTop => {
                    let value = self.pop()?;
                    let text = value.display(&self.heap);
                    self.write_line(text);
                }

                OpCode::Halt => {
                    if let Some(frame) = self.frames.pop() {
                        self.stack.truncate(frame.stack_base);
                    }
                    trace!("halt");
                    return Ok(());
                }
            }
        }
    }

    /// Call the value sitting below `arg_count` arguments
    fn call_value(&mut self, arg_count: usize) -> std::result::Result<(), ErrorKind> {
        let callee_slot = self
            .stack
            .len()
            .checked_sub(arg_count + 1)
            .ok_or_else(stack_underflow)?;
        let callee = self.stack[callee_slot];

        match callee {
            Value::Function(handle) => self.call_function(handle, callee_slot, arg_count),
            Value::Native(handle) => {
                let native = self
                    .heap
                    .get_native(handle)
                    .cloned()
                    .ok_or(ErrorKind::NotCallable("native function"))?;

                let mut args = Vec::with_capacity(arg_count + 1);
                if let NativeKind::Method { receiver } = native.kind {
                    args.push(receiver);
                }
                args.extend_from_slice(&self.stack[callee_slot + 1..]);

                // Callee and arguments stay on the stack while the native allocates
                self.maybe_collect();
                let result = (native.func)(&mut self.heap, &args)?;

                self.stack.truncate(callee_slot);
                self.push(result)
            }
            other => Err(ErrorKind::NotCallable(other.type_name())),
        }
    }

    /// Push a frame for a declared function. Arguments bind to parameters in
    /// order; extra arguments are dropped and missing parameters read as nil.
    fn call_function(
        &mut self,
        handle: Handle,
        callee_slot: usize,
        arg_count: usize,
    ) -> std::result::Result<(), ErrorKind> {
        if self.frames.len() >= self.config.frames_max {
            return Err(ErrorKind::FrameOverflow);
        }

        let function = self
            .heap
            .get_function(handle)
            .ok_or(ErrorKind::NotCallable("function"))?;

        let mut locals = vec![None; function.local_count()];
        let args = &self.stack[callee_slot + 1..];
        for (param, slot) in locals.iter_mut().enumerate().take(function.arity) {
            *slot = Some(args.get(param).copied().unwrap_or(Value::Nil));
        }

        trace!(function = %function.name, args = arg_count, depth = self.frames.len() + 1, "push frame");
        let frame = StackFrame {
            function: handle,
            chunk: Rc::clone(&function.chunk),
            ip: 0,
            op_start: 0,
            locals,
            stack_base: callee_slot,
        };
        self.stack.truncate(callee_slot);
        self.frames.push(frame);
        Ok(())
    }

    /// Advance the iterator on top of the stack; `None` once exhausted
    fn iterate(&mut self) -> std::result::Result<Option<Value>, ErrorKind> {
        let Value::Iterator(handle) = self.peek(0)? else {
            return Err(ErrorKind::TypeMismatch("iterator".to_string(), self.peek(0)?.type_name()));
        };
        let (target, cursor) = match self.heap.get_iterator(handle) {
            Some(it) => (it.target, it.cursor),
            None => return Ok(None),
        };

        let next = match target {
            Value::Array(array) => self
                .heap
                .get_array(array)
                .and_then(|items| items.get(cursor).copied()),
            Value::String(string) => {
                let ch = self
                    .heap
                    .get_string(string)
                    .and_then(|s| s.chars().nth(cursor));
                match ch {
                    Some(ch) => {
                        // The iterator on the stack keeps the string alive
                        self.maybe_collect();
                        Some(Value::String(self.heap.alloc_string(ch.to_string())))
                    }
                    None => None,
                }
            }
            _ => None,
        };

        if next.is_some() {
            if let Some(it) = self.heap.get_iterator_mut(handle) {
                it.cursor += 1;
            }
        }
        Ok(next)
    }

    /// Locate `name` among the locals of frames outside the current one,
    /// innermost first
    fn find_outer_local(&self, name: &str) -> Option<(usize, usize)> {
        let outer = self.frames.len().saturating_sub(1);
        (0..outer).rev().find_map(|depth| {
            let frame = &self.frames[depth];
            let slot = self.heap.get_function(frame.function)?.slot_of(name)?;
            frame.locals.get(slot)?.map(|_| (depth, slot))
        })
    }

    fn add(&mut self) -> std::result::Result<(), ErrorKind> {
        let b = self.peek(0)?;
        let a = self.peek(1)?;

        match (a, b) {
            (Value::String(x), Value::String(y)) => {
                let joined = match (self.heap.get_string(x), self.heap.get_string(y)) {
                    (Some(x), Some(y)) => format!("{}{}", x, y),
                    _ => return Err(ErrorKind::UnsupportedOperands("+", "string", "string")),
                };
                // Operands stay on the stack until the result exists
                self.maybe_collect();
                let handle = self.heap.alloc_string(joined);
                self.pop()?;
                self.pop()?;
                self.push(Value::String(handle))
            }
            _ => self.binary_op("+", |a, b| a + b),
        }
    }

    fn check_divisor(&self, op: &'static str) -> std::result::Result<(), ErrorKind> {
        match (self.peek(1)?, self.peek(0)?) {
            (Value::Number(_), Value::Number(d)) if d == 0.0 => Err(ErrorKind::DivisionByZero),
            (Value::Number(_), Value::Number(_)) => Ok(()),
            (a, b) => Err(ErrorKind::UnsupportedOperands(op, a.type_name(), b.type_name())),
        }
    }

    fn binary_op<F>(&mut self, op_name: &'static str, op: F) -> std::result::Result<(), ErrorKind>
    where
        F: Fn(f64, f64) -> f64,
    {
        let b = self.pop()?;
        let a = self.pop()?;

        match (a, b) {
            (Value::Number(x), Value::Number(y)) => self.push(Value::Number(op(x, y))),
            _ => Err(ErrorKind::UnsupportedOperands(op_name, a.type_name(), b.type_name())),
        }
    }

    fn comparison_op<F>(&mut self, op_name: &'static str, op: F) -> std::result::Result<(), ErrorKind>
    where
        F: Fn(f64, f64) -> bool,
    {
        let b = self.pop()?;
        let a = self.pop()?;

        match (a, b) {
            (Value::Number(x), Value::Number(y)) => self.push(Value::Bool(op(x, y))),
            _ => Err(ErrorKind::UnsupportedOperands(op_name, a.type_name(), b.type_name())),
        }
    }

    // ==================== Helpers ====================

    fn push(&mut self, value: Value) -> std::result::Result<(), ErrorKind> {
        if self.stack.len() >= self.config.stack_max {
            return Err(ErrorKind::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> std::result::Result<Value, ErrorKind> {
        self.stack.pop().ok_or_else(stack_underflow)
    }

    fn peek(&self, distance: usize) -> std::result::Result<Value, ErrorKind> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .map(|idx| self.stack[idx])
            .ok_or_else(stack_underflow)
    }

    fn frame_mut(&mut self) -> std::result::Result<&mut StackFrame, ErrorKind> {
        self.frames.last_mut().ok_or_else(no_frame)
    }

    fn constant(&self, idx: usize) -> std::result::Result<Value, ErrorKind> {
        let frame = self.frames.last().ok_or_else(no_frame)?;
        frame.chunk.constants.get(idx).copied().ok_or_else(|| {
            ErrorKind::Raised(ErrorClass::Fatal, format!("constant {} out of range", idx))
        })
    }

    fn constant_name(&self, idx: usize) -> std::result::Result<String, ErrorKind> {
        match self.constant(idx)? {
            Value::String(handle) => self
                .heap
                .get_string(handle)
                .map(str::to_string)
                .ok_or(ErrorKind::TypeMismatch("name".to_string(), "string")),
            other => Err(ErrorKind::TypeMismatch("name".to_string(), other.type_name())),
        }
    }

    fn set_local(&mut self, slot: usize, value: Value) -> std::result::Result<(), ErrorKind> {
        let frame = self.frame_mut()?;
        match frame.locals.get_mut(slot) {
            Some(local) => {
                *local = Some(value);
                Ok(())
            }
            None => Err(ErrorKind::Raised(
                ErrorClass::Fatal,
                format!("local slot {} out of range", slot),
            )),
        }
    }

    fn unbound_local(&self, slot: usize) -> ErrorKind {
        let name = self
            .frames
            .last()
            .and_then(|frame| self.heap.get_function(frame.function))
            .and_then(|function| function.locals.get(slot).cloned())
            .unwrap_or_else(|| format!("<slot {}>", slot));
        ErrorKind::UndefinedVariable(name)
    }

    fn write_line(&mut self, line: String) {
        match &mut self.output {
            Output::Stdout => println!("{}", line),
            Output::Captured(lines) => lines.push(line),
        }
    }
}

fn stack_underflow() -> ErrorKind {
    ErrorKind::Raised(ErrorClass::Fatal, "operand stack underflow".to_string())
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    fn run_vm(vm: &mut VM, source: &str) -> Result<Vec<String>> {
        vm.capture_output();
        let function = compile(source, &mut vm.heap)?;
        vm.interpret(function)?;
        Ok(vm.take_output())
    }

    fn run(source: &str) -> Vec<String> {
        run_vm(&mut VM::new(), source).expect("program failed")
    }

    #[test]
    fn test_vm_arithmetic() {
        assert_eq!(run("print(1 + 2 * 3); print((1 + 2) * 3); print(7 % 4);"), vec!["7", "9", "3"]);
        assert_eq!(run("print(-4 / 8);"), vec!["-0.5"]);
    }

    #[test]
    fn test_vm_comparison() {
        assert_eq!(
            run("print(1 < 2); print(2 <= 1); print(3 >= 3); print(\"a\" == \"a\"); print(1 != 1);"),
            vec!["true", "false", "true", "true", "false"]
        );
    }

    #[test]
    fn test_vm_while() {
        assert_eq!(
            run("var i = 0; var sum = 0; while i < 5 { sum = sum + i; i = i + 1; } print(sum);"),
            vec!["10"]
        );
    }

    #[test]
    fn test_foreach_over_string() {
        assert_eq!(run("foreach \"héj\" |c| { print(c); }"), vec!["h", "é", "j"]);
    }

    #[test]
    fn test_recursion_keeps_caller_locals() {
        let source = "
            fn fib(n) {
                if n < 2 { return n; }
                return fib(n - 1) + fib(n - 2);
            }
            print(fib(10));
        ";
        assert_eq!(run(source), vec!["55"]);
    }

    #[test]
    fn test_function_sees_outer_frame_locals() {
        let source = "var base = 10; fn add(n) { base = base + n; return base; } print(add(5)); print(base);";
        assert_eq!(run(source), vec!["15", "15"]);
    }

    #[test]
    fn test_gc_keeps_roots_and_frees_garbage() {
        let mut vm = VM::new();
        let kept = vm.heap.alloc_string("kept".into());
        vm.stack.push(Value::String(kept));
        let nested = vm.heap.alloc_string("nested".into());
        let array = vm.heap.alloc_array(vec![Value::String(nested)]);
        vm.stack.push(Value::Array(array));
        let orphan = vm.heap.alloc_array(Vec::new());

        let before = vm.heap.object_count();
        vm.collect_garbage();

        assert_eq!(vm.heap.object_count(), before - 1);
        assert!(vm.heap.is_live(kept));
        assert!(vm.heap.is_live(array));
        assert!(vm.heap.is_live(nested));
        assert!(!vm.heap.is_live(orphan));
    }

    #[test]
    fn test_globals_are_not_roots() {
        let mut vm = VM::new();
        let only_global = vm.heap.alloc_string("g".into());
        vm.define_global("g", Value::String(only_global));

        vm.collect_garbage();

        assert!(!vm.heap.is_live(only_global));
        // Builtins registered by the VM survive and stay callable
        assert_eq!(run_vm(&mut vm, "print(len(\"abc\"));").unwrap(), vec!["3"]);
    }

    #[test]
    fn test_error_unwinds_to_root_frame() {
        let mut vm = VM::new();
        let source = "fn inner(n) {\n  return n / 0;\n}\nfn outer(n) { return inner(n); }\nprint(outer(1));";
        let err = run_vm(&mut vm, source).unwrap_err();

        let ShipError::Runtime(err) = err else {
            panic!("expected runtime error");
        };
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        assert_eq!(err.line, 2);
        assert_eq!(vm.frame_depth(), 1);
        assert_eq!(vm.stack().len(), 1);

        let Value::Error(handle) = vm.stack()[0] else {
            panic!("expected error value on the stack");
        };
        let obj = vm.heap.get_error(handle).unwrap();
        assert_eq!(obj.class, ErrorClass::Type);
        assert_eq!(obj.message, "TypeError: division by zero");
    }

    #[test]
    fn test_frame_overflow_is_fatal() {
        let mut vm = VM::new();
        let err = run_vm(&mut vm, "fn f() { return f(); } f();").unwrap_err();
        assert_eq!(err.classes(), vec![ErrorClass::Fatal]);
        assert_eq!(vm.frame_depth(), 1);
    }

    #[test]
    fn test_stack_overflow_is_fatal() {
        let config = VmConfig { stack_max: 4, ..VmConfig::default() };
        let mut vm = VM::with_config(config);
        let err = run_vm(&mut vm, "print([1, 2, 3, 4, 5]);").unwrap_err();
        let ShipError::Runtime(err) = err else {
            panic!("expected runtime error");
        };
        assert_eq!(err.kind, ErrorKind::StackOverflow);
    }

    #[test]
    fn test_stress_gc_preserves_live_values() {
        let mut vm = VM::with_config(VmConfig::default().with_stress_gc(true));
        let source = "
            var words = [\"a\", \"b\"];
            var out = \"\";
            foreach words |w| { out = out + w + \"!\"; }
            words.push(out.upper());
            print(words);
        ";
        assert_eq!(run_vm(&mut vm, source).unwrap(), vec!["[\"a\", \"b\", \"A!B!\"]"]);
        assert!(vm.heap.collections() > 0);
    }

    #[test]
    fn test_end_for_releases_iterator() {
        let mut vm = VM::new();
        vm.capture_output();
        let function = compile("var xs = [1, 2]; foreach xs |x| { }", &mut vm.heap).unwrap();
        let compiled = vm.heap.object_count();

        vm.interpret(function).unwrap();

        // Only the array outlives the loop
        assert_eq!(vm.heap.object_count(), compiled + 1);
        assert_eq!(vm.heap.collections(), 0);
    }
}
