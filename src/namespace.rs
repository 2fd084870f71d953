//! Chained variable scopes. Frame 0 is the global frame; the last frame is innermost.

use std::collections::HashMap;

use crate::error::NamespaceError;
use crate::types::Value;

pub type Bindings = HashMap<String, Value>;

#[derive(Clone, Debug)]
pub struct Namespace {
    frames: Vec<Bindings>,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace {
    pub fn new() -> Self {
        Namespace {
            frames: vec![Bindings::new()],
        }
    }

    pub fn with_globals(globals: Bindings) -> Self {
        Namespace {
            frames: vec![globals],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Innermost binding of `key`.
    pub fn get(&self, key: &str) -> Result<&Value, NamespaceError> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(key))
            .ok_or_else(|| NamespaceError::KeyError(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.frames.iter().any(|frame| frame.contains_key(key))
    }

    /// Update the frame that already defines `key`, else define it in the innermost frame.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.frames.iter_mut().rev().find(|f| f.contains_key(&key)) {
            Some(frame) => {
                frame.insert(key, value);
            }
            None => {
                self.innermost().insert(key, value);
            }
        }
    }

    /// Remove the innermost binding of `key`.
    pub fn delete(&mut self, key: &str) -> Result<Value, NamespaceError> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.remove(key))
            .ok_or_else(|| NamespaceError::KeyError(key.to_string()))
    }

    pub fn push_scope(&mut self, bindings: Bindings) {
        self.frames.push(bindings);
    }

    pub fn pop_scope(&mut self) -> Result<Bindings, NamespaceError> {
        if self.frames.len() <= 1 {
            return Err(NamespaceError::ScopeUnderflow);
        }
        self.frames.pop().ok_or(NamespaceError::ScopeUnderflow)
    }

    /// All visible bindings; inner frames shadow outer ones.
    pub fn flatten(&self) -> Bindings {
        let mut merged = Bindings::new();
        for frame in &self.frames {
            for (k, v) in frame {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    fn innermost(&mut self) -> &mut Bindings {
        if self.frames.is_empty() {
            self.frames.push(Bindings::new());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}
