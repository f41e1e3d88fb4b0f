use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::fault::{Fault, FaultKind};

pub mod parse;

use parse::{ParseError, ParseErrorKind};

macro_rules! instructions {
    ( $( $( #[doc = $doc:expr] )+ $name:ident / $arity:literal = $repr:literal , )+ ) => {
        /// Defines the instructions
        /// Every instruction operates on registers and memory through addressing modes
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(TryFromPrimitive, IntoPrimitive)]
        pub enum Opcode {
            $(
                $( #[doc = $doc] )+
                $name = $repr,
            )+
        }

        impl Opcode {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name) , )+
                }
            }

            /// Number of operands the instruction expects
            pub fn arity(&self) -> usize {
                match self {
                    $( Self::$name => $arity , )+
                }
            }
        }

        impl ::std::fmt::Display for Opcode {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $( Self::$name => f.write_str(stringify!($name)) , )+
                }
            }
        }
    }
}

instructions! {
    /// Copy a value
    /// @param dest Where to store the value
    /// @param src The value to copy
    MOV / 2 = 0x00,
    /// Push a value onto the stack
    PUSH / 1 = 0x01,
    /// Pop the top of the stack into a location
    POP / 1 = 0x02,
    /// dest := dest + src
    ADD / 2 = 0x10,
    /// dest := dest - src
    SUB / 2 = 0x11,
    /// dest := dest * src
    MOL / 2 = 0x12,
    /// dest := floor(dest / src)
    DIV / 2 = 0x13,
    /// dest := dest + 1
    INC / 1 = 0x14,
    /// dest := dest - 1
    DEC / 1 = 0x15,
    /// Bitwise and
    AND / 2 = 0x20,
    /// Bitwise or
    OR / 2 = 0x21,
    /// Bitwise complement
    NOT / 1 = 0x22,
    /// Compare two values, setting the flags as SUB would
    CMP / 2 = 0x23,
    /// Jump to a label
    /// @param label The label to jump to
    JMP / 1 = 0x30,
    /// Jump to a label if the zero flag is set
    JZ / 1 = 0x31,
    /// Jump to a label if the zero flag is clear
    JNZ / 1 = 0x32,
    /// Jump to a label if the sign flag is set
    JS / 1 = 0x33,
    /// Push the return address and jump to a label
    CALL / 1 = 0x34,
    /// Pop the return address and jump to it
    RET / 0 = 0x35,
    /// Append a value to the output log
    OUT / 1 = 0x40,
    /// Stop the execution of the program
    HLT / 0 = 0x41,
}

impl Opcode {
    /// Looks up a mnemonic, ignoring case
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|opcode| opcode.name().eq_ignore_ascii_case(mnemonic))
    }
}

/// The general purpose registers
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(TryFromPrimitive, IntoPrimitive)]
pub enum Register {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
}

impl Register {
    /// Number of general purpose registers
    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        u8::from(self) as usize
    }

    /// Parses `R0`..`R3`, ignoring case
    pub fn parse(token: &str) -> Option<Self> {
        match token.as_bytes() {
            [b'R', digit] | [b'r', digit] if digit.is_ascii_digit() => {
                Register::try_from(digit - b'0').ok()
            }
            _ => None,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.index())
    }
}

/// How an operand token addresses its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// `R0`..`R3`
    Register(Register),
    /// `-12`, `42`
    Immediate(i64),
    /// `[12]`
    Direct(i64),
    /// `[R1]`
    Indirect(Register),
    /// Anything else, such as a label name. Not readable or writable.
    Symbol,
}

/// Parses an optionally negative run of decimal digits. Values too large for
/// an `i64` saturate.
fn parse_decimal(token: &str) -> Option<i64> {
    let digits = token.strip_prefix('-').unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    match token.parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) if token.starts_with('-') => Some(i64::MIN),
        Err(_) => Some(i64::MAX),
    }
}

impl Mode {
    fn classify(token: &str) -> Self {
        if let Some(register) = Register::parse(token) {
            return Mode::Register(register);
        }
        if let Some(value) = parse_decimal(token) {
            return Mode::Immediate(value);
        }
        if let Some(inner) = token
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let inner = inner.trim();
            if let Some(register) = Register::parse(inner) {
                return Mode::Indirect(register);
            }
            // Negative addresses stay direct so the access faults on bounds.
            if let Some(address) = parse_decimal(inner) {
                return Mode::Direct(address);
            }
        }
        Mode::Symbol
    }
}

/// An operand as written in the source, together with its addressing mode
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operand {
    pub token: String,
    pub mode: Mode,
}

impl Operand {
    pub fn new(token: &str) -> Self {
        let token = token.trim();
        Self {
            token: token.to_owned(),
            mode: Mode::classify(token),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// A single assembled instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    /// 1-based line in the source text
    pub line: usize,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>, line: usize) -> Self {
        Self {
            opcode,
            operands,
            line,
        }
    }

    /// Builds an instruction from a numeric opcode, as produced by
    /// `u8::from(Opcode)`.
    pub fn from_raw(code: u8, tokens: &[&str], line: usize) -> Result<Self, Fault> {
        let opcode = Opcode::try_from(code)
            .map_err(|_| Fault::new(FaultKind::UnknownInstruction, line))?;
        let operands = tokens.iter().map(|token| Operand::new(token)).collect();
        Ok(Self::new(opcode, operands, line))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for (i, operand) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, operand)?;
        }
        Ok(())
    }
}

/// Maps label names to the index of the instruction following them.
/// Names are compared without regard to case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: HashMap<String, usize>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name` at `index`, returning the index it previously had
    pub fn insert(&mut self, name: &str, index: usize) -> Option<usize> {
        self.labels.insert(name.to_ascii_uppercase(), index)
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.labels.get(&name.to_ascii_uppercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterates over `(NAME, index)` pairs in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.labels.iter().map(|(name, index)| (name.as_str(), *index))
    }
}

/// The output of the assembler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub labels: LabelTable,
}

impl Program {
    /// Reads and assembles a source file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|err| {
            ParseError::new(
                ParseErrorKind::Io,
                format!("{}: {}", path.display(), err),
                0,
            )
        })?;
        source.parse()
    }

    /// Renders the program one instruction per line, with labels on their
    /// own lines ahead of the instruction they point at.
    pub fn listing(&self) -> String {
        let mut labels: Vec<(&str, usize)> = self.labels.iter().collect();
        labels.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)));

        let mut out = String::new();
        let mut pending = labels.iter().peekable();
        for (index, instruction) in self.instructions.iter().enumerate() {
            while let Some((name, _)) = pending.next_if(|(_, at)| *at == index) {
                out.push_str(name);
                out.push_str(":\n");
            }
            out.push_str(&format!("{:04}  {}\n", index, instruction));
        }
        for (name, _) in pending {
            out.push_str(name);
            out.push_str(":\n");
        }
        out
    }
}

impl FromStr for Program {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse::assemble(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn mnemonics_ignore_case() -> Result<()> {
        assert_eq!(Opcode::from_mnemonic("mov"), Some(Opcode::MOV));
        assert_eq!(Opcode::from_mnemonic("Jnz"), Some(Opcode::JNZ));
        assert_eq!(Opcode::from_mnemonic("MUL"), None);
        assert_eq!(Opcode::ALL.len(), 21);

        Ok(())
    }

    #[test]
    fn arity() -> Result<()> {
        assert_eq!(Opcode::MOV.arity(), 2);
        assert_eq!(Opcode::NOT.arity(), 1);
        assert_eq!(Opcode::CALL.arity(), 1);
        assert_eq!(Opcode::RET.arity(), 0);
        assert_eq!(Opcode::HLT.arity(), 0);

        Ok(())
    }

    #[test]
    fn addressing_modes() -> Result<()> {
        assert_eq!(Operand::new("r2").mode, Mode::Register(Register::R2));
        assert_eq!(Operand::new("R4").mode, Mode::Symbol);
        assert_eq!(Operand::new("-17").mode, Mode::Immediate(-17));
        assert_eq!(Operand::new("[200]").mode, Mode::Direct(200));
        assert_eq!(Operand::new("[ r1 ]").mode, Mode::Indirect(Register::R1));
        assert_eq!(Operand::new("[-1]").mode, Mode::Direct(-1));
        assert_eq!(Operand::new("[R0-1]").mode, Mode::Symbol);
        assert_eq!(Operand::new("LOOP").mode, Mode::Symbol);
        assert_eq!(Operand::new("-").mode, Mode::Symbol);

        Ok(())
    }

    #[test]
    fn huge_immediates_saturate() -> Result<()> {
        assert_eq!(
            Operand::new("99999999999999999999").mode,
            Mode::Immediate(i64::MAX)
        );
        assert_eq!(
            Operand::new("-99999999999999999999").mode,
            Mode::Immediate(i64::MIN)
        );

        Ok(())
    }

    #[test]
    fn from_raw() -> Result<()> {
        let instruction = Instruction::from_raw(Opcode::ADD.into(), &["R0", "5"], 7)?;
        assert_eq!(instruction.opcode, Opcode::ADD);
        assert_eq!(instruction.to_string(), "ADD R0, 5");

        let fault = Instruction::from_raw(0xFF, &[], 9).unwrap_err();
        assert_eq!(fault, Fault::new(FaultKind::UnknownInstruction, 9));

        Ok(())
    }

    #[test]
    fn labels_ignore_case() -> Result<()> {
        let mut labels = LabelTable::new();
        assert_eq!(labels.insert("Loop", 3), None);
        assert_eq!(labels.get("LOOP"), Some(3));
        assert_eq!(labels.get("loop"), Some(3));
        assert_eq!(labels.insert("LOOP", 5), Some(3));
        assert_eq!(labels.len(), 1);

        Ok(())
    }

    #[test]
    fn listing() -> Result<()> {
        let program: Program = "start: mov r0, 1\nhlt\nend:".parse()?;
        assert_eq!(program.listing(), "START:\n0000  MOV r0, 1\n0001  HLT\nEND:\n");

        Ok(())
    }
}
