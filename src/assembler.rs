use std::collections::HashMap;

use crate::parser::Instruction;

/// Parsed instructions bundled with the completed label table, ready for
/// linking. Produced once per parse and never mutated.
#[derive(Debug, PartialEq, Clone)]
pub struct AssemblyUnit {
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) label_table: HashMap<String, usize>,
}

/// Walks the instruction sequence once and records every attached label
/// against the index of its instruction. Label references are not checked
/// here; resolving them is the linker's job.
pub fn assemble(instructions: Vec<Instruction>) -> AssemblyUnit {
    let mut label_table = HashMap::new();
    for (index, instruction) in instructions.iter().enumerate() {
        for label in &instruction.labels {
            let previous = label_table.insert(label.clone(), index);
            // the parser rejects duplicate definitions before they get here
            debug_assert!(
                previous.is_none(),
                "duplicate label '{}' survived parsing",
                label
            );
        }
    }

    AssemblyUnit {
        instructions,
        label_table,
    }
}
