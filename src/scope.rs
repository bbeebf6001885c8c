//! Per-function name table used by the compiler
//!
//! Maps identifier text to the local slot assigned to it.

use std::collections::HashMap;

use crate::error::ErrorKind;

/// Maximum number of locals per function; slots are encoded in one byte
pub const MAX_LOCALS: usize = 256;

#[derive(Debug, Default)]
pub struct Scope {
    slots: HashMap<String, u8>,
    names: Vec<String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to the next free slot
    pub fn declare(&mut self, name: &str) -> Result<u8, ErrorKind> {
        if self.slots.contains_key(name) {
            return Err(ErrorKind::Redeclared(name.to_string()));
        }
        if self.names.len() >= MAX_LOCALS {
            return Err(ErrorKind::TooManyLocals);
        }
        let slot = self.names.len() as u8;
        self.slots.insert(name.to_string(), slot);
        self.names.push(name.to_string());
        Ok(slot)
    }

    pub fn resolve(&self, name: &str) -> Option<u8> {
        self.slots.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Slot names in slot order
    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}
