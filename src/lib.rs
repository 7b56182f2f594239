//! a lightweight toolchain and stack machine for the aventa lumen
//! instruction set (`.av` files)
//!
//! the pipeline has four stages, each handing an immutable artifact to the
//! next: [`Parser`] turns source text into instructions, [`assemble`] binds
//! label definitions into an [`AssemblyUnit`], [`link`] resolves label
//! references into an executable [`Program`], and [`Vm`] runs it against an
//! [`InputSource`].

pub mod assembler;
pub mod linker;
pub mod parser;
pub mod vm;

pub use assembler::{assemble, AssemblyUnit};
pub use linker::{link, LinkError, Operation, Program, ResolvedOperand};
pub use parser::{Instruction, Opcode, Operand, OperandKind, ParseError, Parser};
pub use vm::{InputSource, ScriptedSource, StdinSource, Vm, VmError};
