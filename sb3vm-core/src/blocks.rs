//! Immutable, indexed view of one target's block graph. Built once at load
//! and shared (`Arc`) between a sprite and all of its clones; execution
//! never mutates it.

use crate::project::{BlockDecl, Input, Opcode};
use crate::types::{BlockId, ProcCode};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::algo::tarjan_scc;
use std::collections::BTreeMap;

/// Resolved custom-block definition.
#[derive(Clone, Debug)]
pub struct ProcedureDef {
    pub definition: BlockId,
    /// First block of the body (the definition hat's `next`).
    pub body: Option<BlockId>,
    pub argument_ids: Vec<String>,
    pub argument_names: Vec<String>,
    pub warp: bool,
}

#[derive(Debug, Default)]
pub struct BlockGraph {
    blocks: BTreeMap<BlockId, BlockDecl>,
    /// Top-level hat blocks, ordered by id for deterministic scheduling.
    hats: Vec<BlockId>,
    /// Canonical (lower-case) broadcast name → receiver hats.
    broadcast_hats: BTreeMap<String, Vec<BlockId>>,
    procedures: BTreeMap<ProcCode, ProcedureDef>,
}

impl BlockGraph {
    pub fn build(blocks: BTreeMap<BlockId, BlockDecl>) -> Self {
        let mut hats = Vec::new();
        let mut broadcast_hats: BTreeMap<String, Vec<BlockId>> = BTreeMap::new();
        let mut procedures = BTreeMap::new();

        for (id, block) in &blocks {
            if block.top_level && block.opcode.is_hat() {
                hats.push(id.clone());
                if block.opcode == Opcode::EventWhenBroadcastReceived {
                    if let Some(name) = block.field_text("BROADCAST_OPTION") {
                        broadcast_hats
                            .entry(canonical_broadcast(name))
                            .or_default()
                            .push(id.clone());
                    }
                }
            }
            if block.opcode == Opcode::ProceduresDefinition {
                if let Some(def) = resolve_procedure(&blocks, id, block) {
                    // First definition wins on duplicate proccodes; the
                    // verifier reports the duplicate.
                    procedures.entry(def.0).or_insert(def.1);
                }
            }
        }

        Self {
            blocks,
            hats,
            broadcast_hats,
            procedures,
        }
    }

    pub fn block(&self, id: &str) -> Option<&BlockDecl> {
        self.blocks.get(id)
    }

    pub fn hats(&self) -> &[BlockId] {
        &self.hats
    }

    pub fn broadcast_receivers(&self, canonical_name: &str) -> &[BlockId] {
        self.broadcast_hats
            .get(canonical_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn procedure(&self, proccode: &str) -> Option<&ProcedureDef> {
        self.procedures.get(proccode)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (&BlockId, &BlockDecl)> {
        self.blocks.iter()
    }
}

/// Broadcast names match case-insensitively; display keeps the given form.
pub fn canonical_broadcast(name: &str) -> String {
    name.to_lowercase()
}

fn resolve_procedure(
    blocks: &BTreeMap<BlockId, BlockDecl>,
    def_id: &str,
    def: &BlockDecl,
) -> Option<(ProcCode, ProcedureDef)> {
    let prototype_id = match def.input("custom_block")? {
        Input::Block { id } => id,
        _ => return None,
    };
    let mutation = blocks.get(prototype_id)?.mutation.as_ref()?;
    Some((
        mutation.proccode.clone(),
        ProcedureDef {
            definition: def_id.to_string(),
            body: def.next.clone(),
            argument_ids: mutation.argument_ids.clone(),
            argument_names: mutation.argument_names.clone(),
            warp: mutation.warp,
        },
    ))
}

// ─── Structural verification ──────────────────────────────────

/// A structural fault found at load time. Faults are reported and logged,
/// never fatal: the broken reference behaves as missing at runtime.
#[derive(Debug, Clone)]
pub struct GraphFault {
    pub message: String,
    pub block_id: Option<BlockId>,
}

impl std::fmt::Display for GraphFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(id) = &self.block_id {
            write!(f, "[{}] {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Verify structural invariants of a block graph.
///
/// Returns a list of faults. Empty list means the graph is well formed.
pub fn verify(graph: &BlockGraph) -> Vec<GraphFault> {
    let mut faults = Vec::new();

    let mut ref_graph: DiGraph<&BlockId, ()> = DiGraph::new();
    let mut nodes: BTreeMap<&BlockId, NodeIndex> = BTreeMap::new();
    for (id, _) in graph.blocks() {
        nodes.insert(id, ref_graph.add_node(id));
    }

    let mut seen_proccodes: BTreeMap<&str, &BlockId> = BTreeMap::new();

    for (id, block) in graph.blocks() {
        if block.opcode == Opcode::Unknown {
            faults.push(GraphFault {
                message: "unknown opcode, block will execute as a no-op".into(),
                block_id: Some(id.clone()),
            });
        }

        for referenced in [&block.next, &block.parent] {
            if let Some(other) = referenced {
                if graph.block(other).is_none() {
                    faults.push(GraphFault {
                        message: format!("dangling block reference {other}"),
                        block_id: Some(id.clone()),
                    });
                }
            }
        }

        for (name, input) in &block.inputs {
            let referenced = match input {
                Input::Block { id } => Some(id),
                Input::Substack { id } => id.as_ref(),
                _ => None,
            };
            let Some(other) = referenced else { continue };
            match graph.block(other) {
                None => faults.push(GraphFault {
                    message: format!("input {name} references missing block {other}"),
                    block_id: Some(id.clone()),
                }),
                Some(_) => {
                    // Only reporter references can cycle during evaluation;
                    // substacks advance the cursor instead.
                    if matches!(input, Input::Block { .. }) {
                        ref_graph.add_edge(nodes[id], nodes[other], ());
                    }
                }
            }
        }

        if block.opcode == Opcode::ProceduresPrototype {
            if let Some(mutation) = &block.mutation {
                if let Some(first) = seen_proccodes.insert(&mutation.proccode, id) {
                    faults.push(GraphFault {
                        message: format!(
                            "duplicate definition of \"{}\" (first at {first})",
                            mutation.proccode
                        ),
                        block_id: Some(id.clone()),
                    });
                }
            }
        }
    }

    for scc in tarjan_scc(&ref_graph) {
        if scc.len() > 1 {
            let members: Vec<&str> = scc.iter().map(|n| ref_graph[*n].as_str()).collect();
            faults.push(GraphFault {
                message: format!("reporter input cycle: {}", members.join(" → ")),
                block_id: Some(ref_graph[scc[0]].clone()),
            });
        }
    }

    faults
}
