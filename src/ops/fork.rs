//! `fork FANOUT (| body |)`: run copies of a pipeline concurrently, one per label.
//!
//! Setup happens in two steps. `setup_1` turns the fanout into labels (thread indices or
//! cluster hosts); `setup_2` builds one replica per label, each ending in a [`Label`] op.
//! At run time every replica executes on its own scoped thread with its own environment
//! clone, and all of them feed the same downstream through a [`FanIn`].

use crossbeam_channel::{RecvTimeoutError, unbounded};
use log::debug;
use serde::{Deserialize, Serialize};
use std::thread;

use crate::env::Environment;
use crate::error::{OpError, OpResult};
use crate::namespace::Bindings;
use crate::ops::{Label, Remote};
use crate::pipeline::{Downstream, FanIn, Op, OpSpec, Pipeline, Sink, logging_handler};
use crate::types;

/// How many replicas, and where they run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fanout {
    /// Labels `0..n`.
    Threads(usize),
    /// One thread per available core.
    Cores,
    /// One replica per host of a configured cluster, each run through `remote`.
    Cluster(String),
}

pub struct Fork {
    fanout: Fanout,
    body: Pipeline,
    labels: Vec<types::Label>,
    replicas: Vec<Pipeline>,
}

impl Fork {
    pub fn new(fanout: Fanout, body: Pipeline) -> Self {
        Fork {
            fanout,
            body,
            labels: Vec::new(),
            replicas: Vec::new(),
        }
    }

    /// Labels from the fanout.
    fn setup_1(&mut self, env: &Environment) -> OpResult<()> {
        self.labels = match &self.fanout {
            Fanout::Threads(0) => {
                return Err(OpError::fatal("fork needs at least one thread"));
            }
            Fanout::Threads(n) => (0..*n).map(types::Label::Thread).collect(),
            Fanout::Cores => (0..rayon::current_num_threads())
                .map(types::Label::Thread)
                .collect(),
            Fanout::Cluster(name) => {
                let cluster = env
                    .config()
                    .cluster(name)
                    .ok_or_else(|| OpError::fatal(format!("unknown cluster: {name}")))?;
                if cluster.hosts.is_empty() {
                    return Err(OpError::fatal(format!("cluster {name} has no hosts")));
                }
                cluster.hosts.iter().cloned().map(types::Label::Host).collect()
            }
        };
        Ok(())
    }

    /// One replica per label, each tagging its output with the label.
    fn setup_2(&mut self, env: &Environment) -> OpResult<()> {
        if self.body.n_params() > 1 {
            return Err(OpError::fatal(format!(
                "fork pipeline can have at most one parameter, the label; got {}",
                self.body.n_params()
            )));
        }
        self.replicas = match &self.fanout {
            Fanout::Cluster(name) => {
                let mut spec = self.body.to_spec()?;
                spec.params = None;
                let cluster = env
                    .config()
                    .cluster(name)
                    .ok_or_else(|| OpError::fatal(format!("unknown cluster: {name}")))?;
                self.labels
                    .iter()
                    .map(|label| {
                        let host = label.to_string();
                        Pipeline::from_ops(vec![
                            Box::new(Remote::new(cluster.address(&host), spec.clone())),
                            Box::new(Label::new(label.clone())),
                        ])
                    })
                    .collect()
            }
            Fanout::Threads(_) | Fanout::Cores => self
                .labels
                .iter()
                .map(|label| {
                    let mut replica = self.body.copy();
                    replica.append(Box::new(Label::new(label.clone())));
                    replica
                })
                .collect(),
        };
        let handler = self.body.error_handler().cloned().unwrap_or_else(logging_handler);
        for replica in &mut self.replicas {
            replica.set_error_handler(handler.clone());
        }
        Ok(())
    }
}

/// Execute one replica, binding the body's parameter (if any) to the label.
fn run_replica(
    replica: &mut Pipeline,
    env: &mut Environment,
    param: Option<&str>,
    label: &types::Label,
    tail: &dyn Sink,
) -> OpResult<()> {
    let Some(param) = param else {
        return replica.execute(env, Some(tail));
    };
    let mut bindings = Bindings::new();
    bindings.insert(param.to_string(), label.to_value());
    env.namespace_mut().push_scope(bindings);
    let result = replica.execute(env, Some(tail));
    let popped = env.namespace_mut().pop_scope();
    result?;
    popped?;
    Ok(())
}

/// Reduce per-replica outcomes to one: cancellation, then fatal, then resumable, then
/// success. Among equals the first wins.
pub fn merge_outcomes(outcomes: impl IntoIterator<Item = OpResult<()>>) -> OpResult<()> {
    let mut worst: Option<OpError> = None;
    for outcome in outcomes {
        if let Err(e) = outcome
            && worst.as_ref().is_none_or(|w| e.severity() > w.severity())
        {
            worst = Some(e);
        }
    }
    worst.map_or(Ok(()), Err)
}

impl Op for Fork {
    fn name(&self) -> &'static str {
        "fork"
    }

    fn setup(&mut self, env: &mut Environment) -> OpResult<()> {
        self.setup_1(env)?;
        self.setup_2(env)
    }

    fn run(&mut self, env: &mut Environment, out: &mut Downstream<'_>) -> OpResult<()> {
        let replicas = std::mem::take(&mut self.replicas);
        let labels = self.labels.clone();
        let param = self.body.params().and_then(|p| p.first().cloned());
        let poll = env.config().fork_join_poll;
        let merged = {
            let fan_in = FanIn::new(out.reborrow());
            let fan_in = &fan_in;
            let parent = &*env;
            let outcomes = thread::scope(|scope| {
                let (done_tx, done_rx) = unbounded::<()>();
                let handles: Vec<_> = replicas
                    .into_iter()
                    .zip(labels)
                    .map(|(mut replica, label)| {
                        let mut replica_env = parent.clone();
                        let done = done_tx.clone();
                        let param = param.clone();
                        scope.spawn(move || {
                            let result = run_replica(
                                &mut replica,
                                &mut replica_env,
                                param.as_deref(),
                                &label,
                                fan_in,
                            );
                            debug!("fork replica {} finished: {:?}", label, result);
                            let _ = done.send(());
                            result
                        })
                    })
                    .collect();
                drop(done_tx);
                let mut remaining = handles.len();
                while remaining > 0 {
                    match done_rx.recv_timeout(poll) {
                        Ok(()) => remaining -= 1,
                        Err(RecvTimeoutError::Timeout) => {
                            if parent.is_cancelled() {
                                debug!("fork: cancelled, waiting for {} replica(s)", remaining);
                            }
                        }
                        // Senders of panicked replicas are gone too.
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                handles
                    .into_iter()
                    .map(|h| {
                        h.join()
                            .unwrap_or_else(|_| Err(OpError::fatal("fork replica panicked")))
                    })
                    .collect::<Vec<_>>()
            });
            merge_outcomes(outcomes)
        };
        match merged {
            Err(OpError::Resumable(error)) => out.send_error(env, error),
            other => other,
        }
    }

    fn cleanup(&mut self) {
        for replica in &mut self.replicas {
            replica.cleanup();
        }
        self.replicas.clear();
    }

    fn copy(&self) -> Box<dyn Op> {
        Box::new(Fork::new(self.fanout.clone(), self.body.copy()))
    }

    fn must_be_first_in_pipeline(&self) -> bool {
        true
    }

    fn spec(&self) -> OpResult<OpSpec> {
        Ok(OpSpec::Fork {
            fanout: self.fanout.clone(),
            pipeline: self.body.to_spec()?,
        })
    }
}
