//! `collect`: terminal sink gathering the stream into a buffer shared with the caller.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::env::Environment;
use crate::error::{Error, OpResult};
use crate::pipeline::{Downstream, Op};
use crate::types::{Item, Record, Value};

/// Handle on what a [`Collect`] op received. Clones share the buffer.
#[derive(Clone, Debug, Default)]
pub struct Collected(Arc<Mutex<Vec<Item>>>);

impl Collected {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Item>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, item: Item) {
        self.lock().push(item);
    }

    pub fn items(&self) -> Vec<Item> {
        self.lock().clone()
    }

    pub fn records(&self) -> Vec<Record> {
        self.lock().iter().filter_map(Item::record).cloned().collect()
    }

    /// Records collapsed to single values; errors are skipped.
    pub fn values(&self) -> Vec<Value> {
        self.records().into_iter().map(Record::into_value).collect()
    }

    pub fn errors(&self) -> Vec<Error> {
        self.lock()
            .iter()
            .filter_map(|item| match item {
                Item::Error(e) => Some(e.clone()),
                Item::Record(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[derive(Clone, Debug, Default)]
pub struct Collect {
    buffer: Collected,
}

impl Collect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect into an existing buffer.
    pub fn with_buffer(buffer: Collected) -> Self {
        Collect { buffer }
    }

    pub fn buffer(&self) -> Collected {
        self.buffer.clone()
    }
}

impl Op for Collect {
    fn name(&self) -> &'static str {
        "collect"
    }

    fn receive(
        &mut self,
        _env: &mut Environment,
        record: Record,
        _out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        self.buffer.push(Item::Record(record));
        Ok(())
    }

    fn receive_error(
        &mut self,
        _env: &mut Environment,
        error: Error,
        _out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        self.buffer.push(Item::Error(error));
        Ok(())
    }

    // Copies keep feeding the same buffer.
    fn copy(&self) -> Box<dyn Op> {
        Box::new(self.clone())
    }

    fn is_sink(&self) -> bool {
        true
    }
}
