//! Infix composition for the API path: `a | b | c` builds a tree that flattens to a pipeline.

use std::ops::BitOr;

use crate::pipeline::core::Pipeline;
use crate::pipeline::op::Op;

/// Ops combined with `|`. Not executable; flatten with [`Node::into_pipeline`].
pub enum Node {
    Op(Box<dyn Op>),
    Pipeline(Pipeline),
    Pipe(Box<Node>, Box<Node>),
}

impl Node {
    pub fn op(op: impl Op + 'static) -> Self {
        Node::Op(Box::new(op))
    }

    /// In-order traversal: left subtree ops, then right subtree ops.
    pub fn into_pipeline(self) -> Pipeline {
        let mut ops = Vec::new();
        self.flatten_into(&mut ops);
        Pipeline::from_ops(ops)
    }

    fn flatten_into(self, ops: &mut Vec<Box<dyn Op>>) {
        match self {
            Node::Op(op) => ops.push(op),
            Node::Pipeline(p) => ops.extend(p.into_ops()),
            Node::Pipe(left, right) => {
                left.flatten_into(ops);
                right.flatten_into(ops);
            }
        }
    }
}

impl BitOr for Node {
    type Output = Node;

    fn bitor(self, rhs: Node) -> Node {
        Node::Pipe(Box::new(self), Box::new(rhs))
    }
}

impl From<Box<dyn Op>> for Node {
    fn from(op: Box<dyn Op>) -> Self {
        Node::Op(op)
    }
}

impl From<Pipeline> for Node {
    fn from(p: Pipeline) -> Self {
        Node::Pipeline(p)
    }
}

impl From<Node> for Pipeline {
    fn from(node: Node) -> Self {
        node.into_pipeline()
    }
}
