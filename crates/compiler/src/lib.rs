//! The workflow compiler.
//!
//! Turns a validated parameter set (or a user-authored canvas graph) into
//! an engine-executable prompt graph: a mapping of node-id to
//! `{class_type, inputs}` where inputs are literals or references to
//! another node's output slot. The compiler is pure — any asset upload
//! needed to materialize input images happens before compilation, and the
//! engine-assigned filenames are already substituted into the parameters.

pub mod canvas;
pub mod graph;
pub mod simple;
mod slots;

use prism_core::params::GenerationParams;

pub use graph::{InputValue, PromptGraph, PromptNode};

/// A successfully compiled prompt graph plus any compiler warnings
/// (currently only unknown canvas node types passed through verbatim).
#[derive(Debug, Clone)]
pub struct Compiled {
    pub graph: PromptGraph,
    pub warnings: Vec<String>,
}

/// Errors produced while compiling a job into a prompt graph.
///
/// All of these are logical failures: the job transitions to `failed`
/// without an engine call and is never retried.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Edge references unknown node id \"{0}\"")]
    DanglingEdge(String),

    #[error("Input \"{input}\" of node \"{node}\" references undefined output slot {slot} of {class}")]
    InvalidSlot {
        node: String,
        input: String,
        class: String,
        slot: u32,
    },

    #[error("Prompt graph contains a cycle through node \"{0}\"")]
    Cycle(String),

    #[error("Job kind {0} has no compiler path")]
    Unsupported(prism_core::JobKind),
}

/// Compile a job's parameter set into a prompt graph.
///
/// Known kinds go through the fixed-graph builder; `custom_graph` jobs go
/// through the canvas converter. The output is validated (no dangling
/// references, no undefined slots, acyclic) before it is returned.
pub fn compile(params: &GenerationParams) -> Result<Compiled, CompileError> {
    let compiled = match params {
        GenerationParams::CustomGraph(p) => canvas::compile_canvas(&p.nodes, &p.edges)?,
        other => Compiled {
            graph: simple::compile_simple(other)?,
            warnings: Vec::new(),
        },
    };
    compiled.graph.validate()?;
    Ok(compiled)
}
