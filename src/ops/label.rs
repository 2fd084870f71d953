use crate::env::Environment;
use crate::error::{Error, OpResult};
use crate::pipeline::{Downstream, Op, OpSpec};
use crate::types::{self, Record};

/// Tail op of a fork replica: prefixes records with the replica's label and tags its errors.
#[derive(Clone, Debug)]
pub struct Label {
    label: types::Label,
}

impl Label {
    pub fn new(label: types::Label) -> Self {
        Label { label }
    }
}

impl Op for Label {
    fn name(&self) -> &'static str {
        "label"
    }

    fn receive(
        &mut self,
        env: &mut Environment,
        record: Record,
        out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        out.send(env, record.prepend(self.label.to_value()))
    }

    fn receive_error(
        &mut self,
        env: &mut Environment,
        error: Error,
        out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        out.send_error(env, error.tagged(&self.label))
    }

    fn copy(&self) -> Box<dyn Op> {
        Box::new(self.clone())
    }

    fn spec(&self) -> OpResult<OpSpec> {
        Ok(OpSpec::Label {
            label: self.label.clone(),
        })
    }
}
