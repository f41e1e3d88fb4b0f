use std::error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    UnknownInstruction,
    OperandCountMismatch,
    InvalidOperand,
    InvalidMemoryAccess,
    DivisionByZero,
    ArithmeticOverflow,
    StackOverflow,
    StackUnderflow,
    UndefinedLabel,
    ExecutionOutOfBounds,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::UnknownInstruction => f.write_str("unknown instruction"),
            FaultKind::OperandCountMismatch => f.write_str("wrong number of operands"),
            FaultKind::InvalidOperand => f.write_str("invalid operand"),
            FaultKind::InvalidMemoryAccess => f.write_str("memory address out of range"),
            FaultKind::DivisionByZero => f.write_str("division by zero"),
            FaultKind::ArithmeticOverflow => f.write_str("arithmetic overflow"),
            FaultKind::StackOverflow => f.write_str("stack overflow"),
            FaultKind::StackUnderflow => f.write_str("stack underflow"),
            FaultKind::UndefinedLabel => f.write_str("undefined label"),
            FaultKind::ExecutionOutOfBounds => {
                f.write_str("program counter ran past the last instruction")
            }
        }
    }
}

impl error::Error for FaultKind {}

/// An error raised while executing an instruction.
///
/// Faults are returned by value from [`Processor::step`](crate::processor::Processor::step)
/// and leave the machine exactly as it was before the instruction started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fault {
    pub kind: FaultKind,
    /// Source line of the faulting instruction, if there was one
    pub line: Option<usize>,
}

impl Fault {
    pub fn new<L: Into<Option<usize>>>(kind: FaultKind, line: L) -> Self {
        Self {
            kind,
            line: line.into(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} (line {})", self.kind, line),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn display_with_line() -> Result<()> {
        let fault = Fault::new(FaultKind::DivisionByZero, 3);
        assert_eq!(fault.to_string(), "division by zero (line 3)");

        Ok(())
    }

    #[test]
    fn display_without_line() -> Result<()> {
        let fault = Fault::new(FaultKind::ExecutionOutOfBounds, None);
        assert_eq!(
            fault.to_string(),
            "program counter ran past the last instruction"
        );

        Ok(())
    }
}
