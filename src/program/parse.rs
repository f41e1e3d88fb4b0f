//! Assembler for the textual source format:
//!
//! ```text
//!     MOV R0, 5       ; comment
//! LOOP:
//!     DEC R0
//!     JNZ LOOP
//! END: HLT
//! ```
//!
//! Mnemonics and register names are case-insensitive. Operands are only
//! classified into addressing modes here; whether they make sense for the
//! instruction is checked when the instruction runs.

use std::borrow::Cow;
use std::error;
use std::{fmt, str::Lines};

use super::{Instruction, LabelTable, Opcode, Operand, Program};

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';
const OPERAND_SEPARATOR: char = ',';

macro_rules! propagate {
    ( $res:expr ) => {
        match $res {
            Ok(value) => value,
            Err(err) => return Some(Err(err)),
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    InvalidLabel,
    InvalidInstruction,
    EmptyOperand,
    Io,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::InvalidLabel => f.write_str("invalid label"),
            ParseErrorKind::InvalidInstruction => f.write_str("failed to resolve instruction"),
            ParseErrorKind::EmptyOperand => f.write_str("empty operand"),
            ParseErrorKind::Io => f.write_str("failed to read source"),
        }
    }
}

/// A syntax error. Assembly stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    kind: ParseErrorKind,
    context: Option<Cow<'static, str>>,
    line_nr: usize,
}

impl ParseError {
    pub(crate) fn new<C, S>(kind: ParseErrorKind, context: C, line_nr: usize) -> Self
    where
        C: Into<Option<S>>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            context: context.into().map(|inner| inner.into()),
            line_nr,
        }
    }

    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    /// 1-based line of the offending source line. `0` if no line was read.
    pub fn line(&self) -> usize {
        self.line_nr
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(
                f,
                "error [ln: {}]: {} - {}",
                self.line_nr, self.kind, context
            )
        } else {
            write!(f, "error [ln: {}]: {}", self.line_nr, self.kind)
        }
    }
}

impl error::Error for ParseError {}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

/// Assembles `source` into a [`Program`].
pub fn assemble(source: &str) -> Result<Program> {
    Parser::new(source).parse()
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone)]
pub struct Parser<'a> {
    lines: Lines<'a>,
    line_nr: usize,
    instructions: Vec<Instruction>,
    labels: LabelTable,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for `data`.
    pub fn new(data: &'a str) -> Self {
        Self {
            lines: data.lines(),
            line_nr: 0,
            instructions: Vec::new(),
            labels: LabelTable::new(),
        }
    }

    /// Consumes `self` and tries to assemble all of the source.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; no program is produced.
    pub fn parse(mut self) -> Result<Program> {
        while let Some(res) = self.parse_next_line() {
            if let Err(err) = res {
                log::error!("{}", err);
                return Err(err);
            }
        }

        Ok(Program {
            instructions: self.instructions,
            labels: self.labels,
        })
    }

    /// Tries to parse the next line. A line holds an optional label followed
    /// by an optional instruction.
    fn parse_next_line(&mut self) -> Option<Result<()>> {
        let line = self.lines.next()?;
        self.line_nr += 1;

        let line = match line.split_once(COMMENT_CHAR) {
            Some((code, _comment)) => code,
            None => line,
        }
        .trim();

        if line.is_empty() {
            // Comment or empty line; skip
            return Some(Ok(()));
        }

        let rest = propagate!(self.parse_label(line));

        if rest.is_empty() {
            Some(Ok(()))
        } else {
            self.parse_instruction(rest)
        }
    }

    /// Records a leading `NAME:` if there is one and returns the remainder of
    /// the line.
    ///
    /// # Examples
    ///
    /// - `LOOP:`
    /// - `end: HLT`
    fn parse_label<'l>(&mut self, line: &'l str) -> Result<&'l str> {
        let (name, rest) = match line.split_once(LABEL_SUFFIX) {
            Some(split) => split,
            None => return Ok(line),
        };

        if !is_identifier(name) {
            return Err(ParseError::new(
                ParseErrorKind::InvalidLabel,
                format!("`{}` is not a valid label name", name),
                self.line_nr,
            ));
        }

        // Labels point at the next instruction to be emitted.
        let address = self.instructions.len();
        if let Some(previous) = self.labels.insert(name, address) {
            log::warn!(
                "[{}] Label `{}` redefined (was {}, now {})",
                self.line_nr,
                name,
                previous,
                address
            );
        }

        log::debug!("[{}] Found label `{}` -> {}", self.line_nr, name, address);

        Ok(rest.trim())
    }

    /// Tries to parse `line` as an instruction.
    ///
    /// # Examples
    ///
    /// - `MOV R0, [R1]`
    /// - `hlt`
    fn parse_instruction(&mut self, line: &str) -> Option<Result<()>> {
        let (mnemonic, operands) = match line.split_once(char::is_whitespace) {
            Some((mnemonic, operands)) => (mnemonic, operands.trim()),
            None => (line, ""),
        };

        let opcode = propagate!(Opcode::from_mnemonic(mnemonic).ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::InvalidInstruction,
                format!("no instruction named `{}`", mnemonic),
                self.line_nr,
            )
        }));

        let mut parsed = Vec::new();
        if !operands.is_empty() {
            for token in operands.split(OPERAND_SEPARATOR) {
                let token = token.trim();
                if token.is_empty() {
                    return Some(Err(ParseError::new(
                        ParseErrorKind::EmptyOperand,
                        "operands must not be empty",
                        self.line_nr,
                    )));
                }
                parsed.push(Operand::new(token));
            }
        }

        let instruction = Instruction::new(opcode, parsed, self.line_nr);
        log::debug!("[{}] Found instruction {}", self.line_nr, instruction);
        self.instructions.push(instruction);

        Some(Ok(()))
    }
}
