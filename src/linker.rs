use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;

use crate::assembler::AssemblyUnit;
use crate::parser::{Instruction, Opcode, Operand};

#[derive(Debug)]
pub(crate) enum LinkErrorKind {
    UndefinedLabel(usize, String),
}

impl LinkErrorKind {
    fn throw<T>(self) -> Result<T, LinkError> {
        let msg = match &self {
            LinkErrorKind::UndefinedLabel(line, name) => {
                format!("undefined label '{}' referenced on line {}", name, line)
            }
        };
        Err(LinkError { msg, kind: self })
    }
}

impl Display for LinkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Raised when a label reference cannot be resolved.
#[derive(Debug)]
pub struct LinkError {
    pub(crate) msg: String,
    pub(crate) kind: LinkErrorKind,
}

impl Error for LinkError {}

impl Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

/// An operand after linking. Label names are gone; jump targets are plain
/// instruction indices.
#[derive(Debug, PartialEq, Clone)]
pub enum ResolvedOperand {
    Int(i32),
    Str(String),
    Target(usize),
}

/// The linked form of an [`Instruction`]: identical fields except that every
/// label operand has been replaced by the index it resolves to.
#[derive(Debug, PartialEq, Clone)]
pub struct Operation {
    pub(crate) opcode: Opcode,
    pub(crate) operands: Vec<ResolvedOperand>,
    pub(crate) line: usize,
}

/// The directly executable operation sequence. Operation indices match the
/// parsed instruction indices one to one; the index space doubles as the
/// machine's program counter space.
#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    pub(crate) operations: Vec<Operation>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Resolves every label operand through the unit's label table, producing a
/// program in the same order as the parsed instructions. A reference to a
/// label that was never defined is a hard stop.
pub fn link(unit: AssemblyUnit) -> Result<Program, LinkError> {
    let AssemblyUnit {
        instructions,
        label_table,
    } = unit;

    let mut operations = Vec::with_capacity(instructions.len());
    for instruction in instructions {
        let Instruction {
            opcode,
            operands,
            line,
            ..
        } = instruction;

        let mut resolved = Vec::with_capacity(operands.len());
        for operand in operands {
            resolved.push(resolve_operand(operand, &label_table, line)?);
        }
        operations.push(Operation {
            opcode,
            operands: resolved,
            line,
        });
    }

    Ok(Program { operations })
}

fn resolve_operand(
    operand: Operand,
    label_table: &HashMap<String, usize>,
    line: usize,
) -> Result<ResolvedOperand, LinkError> {
    match operand {
        Operand::Int(value) => Ok(ResolvedOperand::Int(value)),
        Operand::Str(text) => Ok(ResolvedOperand::Str(text)),
        Operand::Label(name) => match label_table.get(&name) {
            Some(&index) => Ok(ResolvedOperand::Target(index)),
            None => LinkErrorKind::UndefinedLabel(line, name).throw(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::parser::Parser;

    fn link_source(source: &str) -> Result<Program, LinkError> {
        let instructions = Parser::new(source).parse().unwrap();
        link(assemble(instructions))
    }

    #[test]
    fn labels_resolve_to_instruction_indices() -> Result<(), LinkError> {
        let program = link_source(
            r#"EMBER 5
GLINT.POS done
FLASH "neg-or-zero"
DRIFT end
done: FLASH "pos"
end: QUIET
"#,
        )?;
        assert_eq!(program.operations[1].operands, vec![ResolvedOperand::Target(4)]);
        assert_eq!(program.operations[3].operands, vec![ResolvedOperand::Target(5)]);

        Ok(())
    }

    #[test]
    fn ints_and_strings_pass_through_unchanged() -> Result<(), LinkError> {
        let program = link_source("EMBER -3\nFLASH \"kept\"\nQUIET\n")?;
        assert_eq!(program.operations[0].operands, vec![ResolvedOperand::Int(-3)]);
        assert_eq!(
            program.operations[1].operands,
            vec![ResolvedOperand::Str("kept".to_string())]
        );

        Ok(())
    }

    #[test]
    fn linking_preserves_order_and_lines() -> Result<(), LinkError> {
        let source = "a: EMBER 1\nTWIST 1\nDRIFT a\nQUIET\n";
        let instructions = Parser::new(source).parse().unwrap();
        let lines: Vec<usize> = instructions.iter().map(|i| i.line).collect();
        let program = link(assemble(instructions))?;
        assert_eq!(program.len(), 4);
        let linked_lines: Vec<usize> = program.operations.iter().map(|o| o.line).collect();
        assert_eq!(linked_lines, lines);

        Ok(())
    }

    #[test]
    fn undefined_label_is_a_hard_stop() {
        let err = link_source("DRIFT missing\nQUIET\n").unwrap_err();
        assert!(matches!(
            err.kind,
            LinkErrorKind::UndefinedLabel(1, ref name) if name == "missing"
        ));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn linking_twice_yields_identical_programs() -> Result<(), LinkError> {
        let source = "loop: TWIST 1\nGLINT.POS loop\nQUIET\n";
        assert_eq!(link_source(source)?, link_source(source)?);

        Ok(())
    }
}
