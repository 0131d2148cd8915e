//! The engine-executable prompt graph.
//!
//! The wire format mirrors what the engine's `/prompt` endpoint accepts:
//! an object keyed by node id, each node carrying a `class_type` and an
//! `inputs` map whose values are either literal JSON or a two-element
//! `[source_node_id, output_slot]` array.

use std::collections::{BTreeMap, HashMap};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::slots;
use crate::CompileError;

/// One input to a prompt node: a literal value or a link to another
/// node's output slot.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Literal(Value),
    Link { node: String, slot: u32 },
}

impl InputValue {
    /// Convenience constructor for node-to-node references.
    pub fn link(node: impl Into<String>, slot: u32) -> Self {
        InputValue::Link {
            node: node.into(),
            slot,
        }
    }

    /// Convenience constructor for literal values.
    pub fn lit(value: impl Into<Value>) -> Self {
        InputValue::Literal(value.into())
    }
}

impl Serialize for InputValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            InputValue::Literal(v) => v.serialize(serializer),
            InputValue::Link { node, slot } => (node, slot).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for InputValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        // A two-element [string, unsigned] array is the engine's link shape;
        // anything else is a literal.
        if let Value::Array(items) = &value {
            if items.len() == 2 {
                if let (Value::String(node), Some(slot)) = (&items[0], items[1].as_u64()) {
                    let slot = u32::try_from(slot)
                        .map_err(|_| D::Error::custom("output slot out of range"))?;
                    return Ok(InputValue::Link {
                        node: node.clone(),
                        slot,
                    });
                }
            }
        }
        Ok(InputValue::Literal(value))
    }
}

/// One operation in the prompt graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptNode {
    pub class_type: String,
    pub inputs: BTreeMap<String, InputValue>,
}

impl PromptNode {
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            inputs: BTreeMap::new(),
        }
    }

    /// Builder-style input setter.
    pub fn input(mut self, name: impl Into<String>, value: InputValue) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }
}

/// An engine-executable DAG of prompt nodes, keyed by node id.
///
/// Ordered map so serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptGraph {
    pub nodes: BTreeMap<String, PromptNode>,
}

impl PromptGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, node: PromptNode) {
        self.nodes.insert(id.into(), node);
    }

    pub fn get(&self, id: &str) -> Option<&PromptNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Serialize to the engine wire shape.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Check structural invariants: every link resolves to an existing
    /// node, every slot is defined for the source node's class (where the
    /// class is known), and the graph is acyclic.
    pub fn validate(&self) -> Result<(), CompileError> {
        for (id, node) in &self.nodes {
            for (input_name, value) in &node.inputs {
                let InputValue::Link { node: source, slot } = value else {
                    continue;
                };
                let Some(source_node) = self.nodes.get(source) else {
                    return Err(CompileError::DanglingEdge(source.clone()));
                };
                if let Some(count) = slots::output_count(&source_node.class_type) {
                    if *slot >= count {
                        return Err(CompileError::InvalidSlot {
                            node: id.clone(),
                            input: input_name.clone(),
                            class: source_node.class_type.clone(),
                            slot: *slot,
                        });
                    }
                }
            }
        }
        self.check_acyclic()
    }

    /// Depth-first cycle check over link edges.
    fn check_acyclic(&self) -> Result<(), CompileError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        fn visit(
            graph: &PromptGraph,
            id: &str,
            marks: &mut HashMap<String, Mark>,
        ) -> Result<(), CompileError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => return Err(CompileError::Cycle(id.to_string())),
                None => {}
            }
            marks.insert(id.to_string(), Mark::InProgress);
            if let Some(node) = graph.nodes.get(id) {
                for value in node.inputs.values() {
                    if let InputValue::Link { node: source, .. } = value {
                        visit(graph, source, marks)?;
                    }
                }
            }
            marks.insert(id.to_string(), Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for id in self.nodes.keys() {
            visit(self, id, &mut marks)?;
        }
        Ok(())
    }
}
