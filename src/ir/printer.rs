//! Printer for the textual HIR accepted by [`super::parser`].

use std::fmt::{self, Write};

use super::*;

pub(super) fn print_method(graph: &Graph, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let params: Vec<InstId> = graph
        .blocks
        .first()
        .map(|entry| {
            entry
                .instructions
                .iter()
                .copied()
                .filter(|id| matches!(graph.inst(*id).kind, InstructionKind::Parameter(_)))
                .collect()
        })
        .unwrap_or_default();

    write!(f, "method {}(", graph.name)?;
    for (idx, param) in params.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        let inst = graph.inst(*param);
        write!(f, "%{}: {}", inst.name, inst.ty.name())?;
    }
    f.write_str(") {\n")?;

    for block in &graph.blocks {
        if block.in_try {
            f.write_str("try ")?;
        }
        writeln!(f, "{}:", block.name)?;
        for id in block.phis.iter().chain(&block.instructions) {
            if params.contains(id) {
                continue;
            }
            let mut line = String::new();
            print_instruction(graph, *id, &mut line)?;
            writeln!(f, "  {}", line)?;
        }
    }
    f.write_str("}\n")
}

fn value_name(graph: &Graph, id: InstId) -> String {
    let inst = graph.inst(id);
    if inst.name.is_empty() {
        format!("%{}", graph.type_id(id))
    } else {
        format!("%{}", inst.name)
    }
}

fn print_instruction(graph: &Graph, id: InstId, out: &mut String) -> fmt::Result {
    let inst = graph.inst(id);
    if !inst.name.is_empty() {
        write!(out, "%{} = ", inst.name)?;
    }
    out.push_str(inst.kind.mnemonic());
    if inst.ty != DataType::Void {
        write!(out, ".{}", inst.ty.name())?;
    }

    let mut operands = Vec::new();
    match inst.kind {
        InstructionKind::Phi => {
            for (value, block) in inst.inputs.iter().zip(&inst.block_operands) {
                operands.push(format!(
                    "[^{}, {}]",
                    graph.block(*block).name,
                    value_name(graph, *value)
                ));
            }
        }
        kind => {
            if let InstructionKind::Constant(value) = kind {
                operands.push(value.to_string());
            }
            operands.extend(inst.inputs.iter().map(|input| value_name(graph, *input)));
            operands.extend(
                inst.block_operands
                    .iter()
                    .map(|block| format!("^{}", graph.block(*block).name)),
            );
            if let Some(field) = inst.field {
                let field = graph.field(field);
                operands.push(format!("@{}.{}", field.owner, field.name));
                if field.is_volatile {
                    operands.push("volatile".to_string());
                }
            }
            match kind {
                InstructionKind::NewInstance { string_alloc: true } => {
                    operands.push("stringalloc".to_string())
                }
                InstructionKind::Vec(VecOp::Load {
                    string_char_at: true,
                }) => operands.push("charat".to_string()),
                _ => {}
            }
        }
    }
    if !operands.is_empty() {
        write!(out, " {}", operands.join(", "))?;
    }

    if !inst.environment.is_empty() {
        let env: Vec<String> = inst
            .environment
            .iter()
            .map(|value| value_name(graph, *value))
            .collect();
        write!(out, " env({})", env.join(", "))?;
    }
    Ok(())
}
