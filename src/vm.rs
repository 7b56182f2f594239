use std::collections::VecDeque;
use std::error::Error;
use std::fmt::Display;
use std::io::{self, stdin, stdout, Write};

use crate::linker::{Operation, Program, ResolvedOperand};
use crate::parser::Opcode;

/// The capability the machine suspends on when executing SIP. Reading
/// blocks until one value is available; `None` means the source is
/// exhausted.
pub trait InputSource {
    fn next_value(&mut self) -> io::Result<Option<String>>;
}

/// Reads one line per SIP from standard input, prompting first.
pub struct StdinSource {
    prompt: bool,
}

impl StdinSource {
    pub fn new() -> StdinSource {
        StdinSource { prompt: true }
    }

    /// A stdin source without the `SIP> ` prompt, for piped input.
    pub fn silent() -> StdinSource {
        StdinSource { prompt: false }
    }
}

impl InputSource for StdinSource {
    fn next_value(&mut self) -> io::Result<Option<String>> {
        if self.prompt {
            print!("SIP> ");
            stdout().flush()?;
        }
        let mut buffer = String::new();
        if stdin().read_line(&mut buffer)? == 0 {
            return Ok(None);
        }
        Ok(Some(buffer.trim().to_string()))
    }
}

/// A pre-scripted input source, used by tests and benchmarks in place of
/// interactive input.
pub struct ScriptedSource {
    values: VecDeque<String>,
}

impl ScriptedSource {
    pub fn new(values: &[&str]) -> ScriptedSource {
        ScriptedSource {
            values: values.iter().map(|value| value.to_string()).collect(),
        }
    }

    pub fn empty() -> ScriptedSource {
        ScriptedSource {
            values: VecDeque::new(),
        }
    }
}

impl InputSource for ScriptedSource {
    fn next_value(&mut self) -> io::Result<Option<String>> {
        Ok(self.values.pop_front())
    }
}

#[derive(Debug)]
pub(crate) enum VmErrorKind {
    StackUnderflow(usize, &'static str),
    InvalidInput(usize, String),
    InputExhausted(usize),
    InputFailed(usize, io::Error),
    MalformedOperation(Operation),
}

impl VmErrorKind {
    fn throw<T>(self) -> Result<T, VmError> {
        let msg = match &self {
            VmErrorKind::StackUnderflow(line, mnemonic) => {
                format!("{} on line {} requires a stack value", mnemonic, line)
            }
            VmErrorKind::InvalidInput(line, value) => format!(
                "SIP on line {} could not parse '{}' as an integer",
                line, value
            ),
            VmErrorKind::InputExhausted(line) => {
                format!("SIP on line {} found the input source exhausted", line)
            }
            VmErrorKind::InputFailed(line, err) => {
                format!("SIP on line {} failed to read input, details: {}", line, err)
            }
            VmErrorKind::MalformedOperation(operation) => format!(
                "the linker delivered an inconsistent operation, failing instruction: {:?}",
                operation
            ),
        };
        Err(VmError { msg, kind: self })
    }
}

impl Display for VmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Raised when execution reaches an illegal state.
#[derive(Debug)]
pub struct VmError {
    pub(crate) msg: String,
    pub(crate) kind: VmErrorKind,
}

impl Error for VmError {}

impl Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

/// The component that executes a linked program to a terminal state.
///
/// State is created fresh per run: an instruction pointer starting at 0, an
/// integer stack, and the ordered buffer of FLASH output, which is only
/// surfaced once the machine halts or faults.
pub struct Vm {
    program: Program,
    input: Box<dyn InputSource>,
    stack: Vec<i32>,
    output: Vec<String>,
    instruction_pointer: usize,
    halted: bool,
    debug: bool,
}

impl Vm {
    /// Creates a machine for `program`, drawing SIP values from `input`.
    ///
    /// - `debug` prints every executed operation to stderr
    pub fn new(program: Program, input: Box<dyn InputSource>, debug: bool) -> Vm {
        Vm {
            program,
            input,
            stack: vec![],
            output: vec![],
            instruction_pointer: 0,
            halted: false,
            debug,
        }
    }

    /// Runs until QUIET, until the instruction pointer walks off the end of
    /// the program (an implicit halt), or until an execution error.
    pub fn run(&mut self) -> Result<(), VmError> {
        while !self.halted && self.instruction_pointer < self.program.operations.len() {
            let operation = self.program.operations[self.instruction_pointer].clone();
            if self.debug {
                eprintln!("[vm] {:?}", operation);
            }
            self.exec(&operation)?;
        }
        self.halted = true;

        Ok(())
    }

    /// Returns the machine to its initial state, keeping the program and
    /// the input source.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.output.clear();
        self.instruction_pointer = 0;
        self.halted = false;
    }

    /// The strings queued by FLASH, in execution order. Only meaningful
    /// once `run` has returned.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn stack(&self) -> &[i32] {
        &self.stack
    }

    fn exec(&mut self, operation: &Operation) -> Result<(), VmError> {
        match operation.opcode {
            Opcode::Sip => {
                let value = match self.input.next_value() {
                    Ok(Some(content)) => content,
                    Ok(None) => return VmErrorKind::InputExhausted(operation.line).throw(),
                    Err(err) => return VmErrorKind::InputFailed(operation.line, err).throw(),
                };
                match value.trim().parse::<i32>() {
                    Ok(number) => self.stack.push(number),
                    Err(_) => return VmErrorKind::InvalidInput(operation.line, value).throw(),
                }
                self.instruction_pointer += 1;
            }
            Opcode::Ember => {
                let literal = self.int_operand(operation)?;
                self.stack.push(literal);
                self.instruction_pointer += 1;
            }
            Opcode::Twist => {
                let literal = self.int_operand(operation)?;
                match self.stack.pop() {
                    Some(head) => self.stack.push(head - literal),
                    None => {
                        return VmErrorKind::StackUnderflow(
                            operation.line,
                            operation.opcode.mnemonic(),
                        )
                        .throw()
                    }
                }
                self.instruction_pointer += 1;
            }
            Opcode::Flash => {
                let text = self.str_operand(operation)?;
                self.output.push(text);
                self.instruction_pointer += 1;
            }
            Opcode::Drift => {
                self.instruction_pointer = self.target_operand(operation)?;
            }
            Opcode::GlintZero => {
                // an empty stack peeks a documented 0, it does not fault
                let head = self.stack.last().copied().unwrap_or(0);
                let target = self.target_operand(operation)?;
                if head == 0 {
                    self.instruction_pointer = target;
                } else {
                    self.instruction_pointer += 1;
                }
            }
            Opcode::GlintPos => {
                let head = self.stack.last().copied().unwrap_or(0);
                let target = self.target_operand(operation)?;
                if head > 0 {
                    self.instruction_pointer = target;
                } else {
                    self.instruction_pointer += 1;
                }
            }
            Opcode::Quiet => {
                self.halted = true;
            }
        }

        Ok(())
    }

    fn int_operand(&self, operation: &Operation) -> Result<i32, VmError> {
        match operation.operands.first() {
            Some(ResolvedOperand::Int(value)) => Ok(*value),
            _ => VmErrorKind::MalformedOperation(operation.clone()).throw(),
        }
    }

    fn str_operand(&self, operation: &Operation) -> Result<String, VmError> {
        match operation.operands.first() {
            Some(ResolvedOperand::Str(text)) => Ok(text.clone()),
            _ => VmErrorKind::MalformedOperation(operation.clone()).throw(),
        }
    }

    fn target_operand(&self, operation: &Operation) -> Result<usize, VmError> {
        match operation.operands.first() {
            Some(ResolvedOperand::Target(index)) => Ok(*index),
            _ => VmErrorKind::MalformedOperation(operation.clone()).throw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::linker::link;
    use crate::parser::Parser;

    fn compile(source: &str) -> Program {
        let instructions = Parser::new(source).parse().unwrap();
        link(assemble(instructions)).unwrap()
    }

    fn vm_with_input(source: &str, inputs: &[&str]) -> Vm {
        Vm::new(compile(source), Box::new(ScriptedSource::new(inputs)), false)
    }

    fn run_for_output(source: &str, inputs: &[&str]) -> Vec<String> {
        let mut vm = vm_with_input(source, inputs);
        vm.run().unwrap();
        vm.output().to_vec()
    }

    const BRANCHING: &str = r#"EMBER 5
GLINT.POS done
FLASH "neg-or-zero"
DRIFT end
done: FLASH "pos"
end: QUIET
"#;

    const SIGN_OF_INPUT: &str = r#"SIP
GLINT.ZERO z
FLASH "nonzero"
DRIFT e
z: FLASH "zero"
e: QUIET
"#;

    #[test]
    fn positive_head_takes_the_glint_pos_branch() {
        assert_eq!(run_for_output(BRANCHING, &[]), vec!["pos".to_string()]);
    }

    #[test]
    fn sip_zero_takes_the_glint_zero_branch() {
        assert_eq!(
            run_for_output(SIGN_OF_INPUT, &["0"]),
            vec!["zero".to_string()]
        );
    }

    #[test]
    fn sip_nonzero_falls_through() {
        assert_eq!(
            run_for_output(SIGN_OF_INPUT, &["7"]),
            vec!["nonzero".to_string()]
        );
    }

    #[test]
    fn quiet_stops_before_later_flashes() {
        assert!(run_for_output("QUIET\nFLASH \"unreachable\"\n", &[]).is_empty());
    }

    #[test]
    fn falling_off_the_end_halts() {
        let mut vm = vm_with_input("EMBER 1\n", &[]);
        vm.run().unwrap();
        assert_eq!(vm.stack(), &[1]);
        assert!(vm.output().is_empty());
    }

    #[test]
    fn twist_subtracts_the_literal_from_the_head() {
        let mut vm = vm_with_input("EMBER 5\nTWIST 3\nQUIET\n", &[]);
        vm.run().unwrap();
        assert_eq!(vm.stack(), &[2]);
    }

    #[test]
    fn twist_on_an_empty_stack_faults() {
        let err = vm_with_input("TWIST 1\nQUIET\n", &[]).run().unwrap_err();
        assert!(matches!(err.kind, VmErrorKind::StackUnderflow(1, "TWIST")));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn sip_with_unparsable_input_faults() {
        let err = vm_with_input("SIP\nQUIET\n", &["seven"]).run().unwrap_err();
        assert!(matches!(
            err.kind,
            VmErrorKind::InvalidInput(1, ref value) if value == "seven"
        ));
    }

    #[test]
    fn sip_on_an_exhausted_source_faults() {
        let err = vm_with_input("SIP\nQUIET\n", &[]).run().unwrap_err();
        assert!(matches!(err.kind, VmErrorKind::InputExhausted(1)));
    }

    #[test]
    fn sip_accepts_negative_integers() {
        let mut vm = vm_with_input("SIP\nQUIET\n", &["-12"]);
        vm.run().unwrap();
        assert_eq!(vm.stack(), &[-12]);
    }

    #[test]
    fn glint_on_an_empty_stack_peeks_zero() {
        // empty stack: GLINT.ZERO jumps, GLINT.POS falls through
        let source = r#"GLINT.ZERO taken
FLASH "fell-through"
DRIFT end
taken: GLINT.POS not-taken
FLASH "empty-is-zero"
DRIFT end
not-taken: FLASH "unexpected"
end: QUIET
"#;
        assert_eq!(
            run_for_output(source, &[]),
            vec!["empty-is-zero".to_string()]
        );
    }

    #[test]
    fn empty_stack_glint_matches_a_pushed_zero() {
        let empty = r#"GLINT.POS p
FLASH "fall"
DRIFT e
p: FLASH "jump"
e: QUIET
"#;
        let pushed = r#"EMBER 0
GLINT.POS p
FLASH "fall"
DRIFT e
p: FLASH "jump"
e: QUIET
"#;
        assert_eq!(run_for_output(empty, &[]), run_for_output(pushed, &[]));
    }

    #[test]
    fn glint_peeks_without_popping() {
        let mut vm = vm_with_input("EMBER 4\nGLINT.POS done\ndone: QUIET\n", &[]);
        vm.run().unwrap();
        assert_eq!(vm.stack(), &[4]);
    }

    #[test]
    fn flash_output_keeps_execution_order_across_jumps() {
        let source = r#"DRIFT second
first: FLASH "two"
DRIFT third
second: FLASH "one"
DRIFT first
third: FLASH "three"
QUIET
"#;
        assert_eq!(
            run_for_output(source, &[]),
            vec!["one".to_string(), "two".to_string(), "three".to_string()]
        );
    }

    #[test]
    fn countdown_loop_terminates() {
        let source = r#"EMBER 3
loop: GLINT.ZERO done
TWIST 1
DRIFT loop
done: FLASH "lift-off"
QUIET
"#;
        let mut vm = vm_with_input(source, &[]);
        vm.run().unwrap();
        assert_eq!(vm.output(), &["lift-off".to_string()]);
        assert_eq!(vm.stack(), &[0]);
    }

    #[test]
    fn reset_restores_the_initial_state() {
        let mut vm = vm_with_input(BRANCHING, &[]);
        vm.run().unwrap();
        assert!(!vm.output().is_empty());

        vm.reset();
        assert!(vm.output().is_empty());
        assert!(vm.stack().is_empty());

        vm.run().unwrap();
        assert_eq!(vm.output(), &["pos".to_string()]);
    }

    #[test]
    fn output_is_buffered_until_the_fault() {
        // the FLASH before the underflow executes, the one after never runs
        let source = "FLASH \"before\"\nTWIST 1\nFLASH \"after\"\nQUIET\n";
        let mut vm = vm_with_input(source, &[]);
        assert!(vm.run().is_err());
        assert_eq!(vm.output(), &["before".to_string()]);
    }
}
