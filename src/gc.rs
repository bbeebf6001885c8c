//! Garbage-collected heap
//!
//! Objects live in a slot arena. A [`Handle`] names a slot plus the slot's
//! generation, so a handle to a freed object can never reach whatever gets
//! allocated into the slot next. Collection is mark-sweep, driven by the VM,
//! which supplies the roots.

use crate::error::ErrorClass;
use crate::object::{ErrorObj, FunctionObj, IterableObj, NativeFn, NativeKind, NativeObj};
use crate::value::Value;

/// A safe handle to a heap-allocated object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

pub enum Object {
    String(String),
    Array(Vec<Value>),
    Function(FunctionObj),
    Native(NativeObj),
    Error(ErrorObj),
    Iterator(IterableObj),
}

impl Object {
    /// Values this object keeps alive
    fn children(&self) -> Vec<Value> {
        match self {
            Object::String(_) | Object::Error(_) => Vec::new(),
            Object::Array(items) => items.clone(),
            Object::Function(f) => f.chunk.constants.clone(),
            Object::Native(n) => match n.kind {
                NativeKind::Method { receiver } => vec![receiver],
                NativeKind::Function => Vec::new(),
            },
            Object::Iterator(it) => vec![it.target],
        }
    }
}

struct Slot {
    generation: u32,
    marked: bool,
    object: Option<Object>,
}

pub struct Heap {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    grey_stack: Vec<Handle>,

    /// Live object count
    count: usize,
    /// Object count at which the next collection runs
    next_gc: usize,
    collections: usize,
}

impl Heap {
    pub fn new(threshold: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            grey_stack: Vec::new(),
            count: 0,
            next_gc: threshold.max(1),
            collections: 0,
        }
    }

    pub fn alloc_string(&mut self, s: String) -> Handle {
        self.alloc(Object::String(s))
    }

    pub fn alloc_array(&mut self, items: Vec<Value>) -> Handle {
        self.alloc(Object::Array(items))
    }

    pub fn alloc_function(&mut self, f: FunctionObj) -> Handle {
        self.alloc(Object::Function(f))
    }

    pub fn alloc_native(&mut self, name: &str, func: NativeFn, kind: NativeKind) -> Handle {
        self.alloc(Object::Native(NativeObj {
            name: name.to_string(),
            func,
            kind,
        }))
    }

    pub fn alloc_error(&mut self, class: ErrorClass, message: String) -> Handle {
        self.alloc(Object::Error(ErrorObj { class, message }))
    }

    pub fn alloc_iterator(&mut self, target: Value) -> Handle {
        self.alloc(Object::Iterator(IterableObj::new(target)))
    }

    fn alloc(&mut self, object: Object) -> Handle {
        self.count += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.marked = false;
            Handle { index, generation: slot.generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                marked: false,
                object: Some(object),
            });
            Handle { index, generation: 0 }
        }
    }

    fn object(&self, handle: Handle) -> Option<&Object> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.object.as_ref()
    }

    fn object_mut(&mut self, handle: Handle) -> Option<&mut Object> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.object.as_mut()
    }

    /// Whether `handle` still refers to a live object
    pub fn is_live(&self, handle: Handle) -> bool {
        self.object(handle).is_some()
    }

    pub fn get_string(&self, handle: Handle) -> Option<&str> {
        match self.object(handle)? {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_array(&self, handle: Handle) -> Option<&Vec<Value>> {
        match self.object(handle)? {
            Object::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn get_array_mut(&mut self, handle: Handle) -> Option<&mut Vec<Value>> {
        match self.object_mut(handle)? {
            Object::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn get_function(&self, handle: Handle) -> Option<&FunctionObj> {
        match self.object(handle)? {
            Object::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn get_native(&self, handle: Handle) -> Option<&NativeObj> {
        match self.object(handle)? {
            Object::Native(n) => Some(n),
            _ => None,
        }
    }

    pub fn get_error(&self, handle: Handle) -> Option<&ErrorObj> {
        match self.object(handle)? {
            Object::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn get_iterator(&self, handle: Handle) -> Option<&IterableObj> {
        match self.object(handle)? {
            Object::Iterator(it) => Some(it),
            _ => None,
        }
    }

    pub fn get_iterator_mut(&mut self, handle: Handle) -> Option<&mut IterableObj> {
        match self.object_mut(handle)? {
            Object::Iterator(it) => Some(it),
            _ => None,
        }
    }

    /// Free a single object right away; the handle and every copy of it go stale
    pub fn release(&mut self, handle: Handle) {
        if self.object(handle).is_some() {
            self.free_slot(handle.index());
        }
    }

    fn free_slot(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.object = None;
        slot.marked = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(index as u32);
        self.count -= 1;
    }

    pub fn object_count(&self) -> usize {
        self.count
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub fn collections(&self) -> usize {
        self.collections
    }

    /// True when one more allocation would exceed the threshold
    pub fn should_collect(&self) -> bool {
        self.count + 1 > self.next_gc
    }

    pub fn is_marked(&self, handle: Handle) -> bool {
        self.slots
            .get(handle.index())
            .is_some_and(|slot| slot.generation == handle.generation && slot.marked)
    }

    pub fn mark_value(&mut self, value: Value) {
        if let Some(handle) = value.as_handle() {
            self.mark(handle);
        }
    }

    pub fn mark(&mut self, handle: Handle) {
        let Some(slot) = self.slots.get_mut(handle.index()) else {
            return;
        };
        if slot.generation != handle.generation || slot.object.is_none() || slot.marked {
            return;
        }
        slot.marked = true;
        self.grey_stack.push(handle);
    }

    pub fn trace_references(&mut self) {
        while let Some(handle) = self.grey_stack.pop() {
            let children = self.object(handle).map(Object::children).unwrap_or_default();
            for child in children {
                self.mark_value(child);
            }
        }
    }

    /// Free every unmarked object, clear marks on survivors and double the
    /// threshold. Returns the number of objects freed.
    pub fn sweep(&mut self) -> usize {
        let mut freed = 0;

        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if slot.object.is_none() {
                continue;
            }
            if slot.marked {
                slot.marked = false;
            } else {
                self.free_slot(index);
                freed += 1;
            }
        }

        self.collections += 1;
        self.next_gc = self.next_gc.saturating_mul(2);
        freed
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_GC_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmarked_objects_are_freed() {
        let mut heap = Heap::new(64);
        let keep = heap.alloc_string("keep".into());
        let drop = heap.alloc_string("drop".into());
        assert_eq!(heap.object_count(), 2);

        heap.mark(keep);
        heap.trace_references();
        assert_eq!(heap.sweep(), 1);

        assert_eq!(heap.object_count(), 1);
        assert_eq!(heap.get_string(keep), Some("keep"));
        assert!(!heap.is_live(drop));
        assert!(!heap.is_marked(keep));
    }

    #[test]
    fn test_marking_recurses_into_arrays_and_iterators() {
        let mut heap = Heap::new(64);
        let inner = heap.alloc_string("inner".into());
        let array = heap.alloc_array(vec![Value::String(inner), Value::Number(1.0)]);
        let iter = heap.alloc_iterator(Value::Array(array));
        let orphan = heap.alloc_array(Vec::new());

        heap.mark(iter);
        heap.trace_references();
        heap.sweep();

        assert!(heap.is_live(iter));
        assert!(heap.is_live(array));
        assert!(heap.is_live(inner));
        assert!(!heap.is_live(orphan));
    }

    #[test]
    fn test_stale_handle_does_not_see_reused_slot() {
        let mut heap = Heap::new(64);
        let old = heap.alloc_string("old".into());
        heap.release(old);
        let new = heap.alloc_string("new".into());

        assert_eq!(old.index(), new.index());
        assert_eq!(heap.get_string(old), None);
        assert_eq!(heap.get_string(new), Some("new"));
    }

    #[test]
    fn test_threshold_doubles_after_collection() {
        let mut heap = Heap::new(4);
        for _ in 0..4 {
            heap.alloc_array(Vec::new());
        }
        assert!(heap.should_collect());
        heap.sweep();
        assert_eq!(heap.next_gc(), 8);
        assert_eq!(heap.collections(), 1);
        assert!(!heap.should_collect());
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut heap = Heap::new(64);
        let h = heap.alloc_iterator(Value::Nil);
        heap.release(h);
        heap.release(h);
        assert_eq!(heap.object_count(), 0);
    }
}
