use std::convert::TryFrom;

use log::*;

use crate::fault::{Fault, FaultKind};
use crate::memory::{clamp, StdMem, Word, MEMORY_SIZE};
use crate::program::{Instruction, LabelTable, Opcode, Operand, Program, Register};

mod operand;

/// Value of the stack pointer when the stack is empty. The stack grows
/// downward from the top of memory.
pub const STACK_TOP: usize = MEMORY_SIZE;

/// Status flags, set by arithmetic, logic and compare instructions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags {
    /// Zero flag
    pub zero: bool,
    /// Sign flag
    pub sign: bool,
}

/// Registers of the CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MachineState {
    /// General purpose registers R0..R3
    pub registers: [Word; Register::COUNT],
    /// Program counter, an index into the instruction list
    pub pc: usize,
    /// Stack Pointer
    pub sp: usize,
    pub flags: Flags,
    /// Termination flag. Set by `HLT` and never cleared except by a reset
    pub halted: bool,
}

impl Default for MachineState {
    fn default() -> Self {
        Self {
            registers: [0; Register::COUNT],
            pc: 0,
            sp: STACK_TOP,
            flags: Flags::default(),
            halted: false,
        }
    }
}

/// A copy of everything an observer may look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub registers: [Word; Register::COUNT],
    pub pc: usize,
    pub sp: usize,
    pub zero_flag: bool,
    pub sign_flag: bool,
    pub memory: StdMem,
    pub output: Vec<String>,
    pub halted: bool,
}

/// Executes an assembled [`Program`] one instruction at a time.
///
/// A fault returned by [`Processor::step`] leaves the program counter on the
/// faulting instruction and does not halt the processor, so stepping again
/// retries the same instruction. Deciding when to stop is up to the caller.
#[derive(Debug, Clone)]
pub struct Processor {
    program: Program,
    state: MachineState,
    memory: StdMem,
    output: Vec<String>,
}

impl From<Program> for Processor {
    fn from(program: Program) -> Self {
        Self {
            program,
            state: MachineState::default(),
            memory: StdMem::default(),
            output: Vec::new(),
        }
    }
}

impl Processor {
    /// Initializes a new CPU
    pub fn new(instructions: Vec<Instruction>, labels: LabelTable) -> Self {
        Program {
            instructions,
            labels,
        }
        .into()
    }

    /// Restores the initial state. The program itself is kept.
    pub fn reset(&mut self) {
        self.state = MachineState::default();
        self.memory.clear();
        self.output.clear();

        debug!("RESET");
    }

    /// Runs one execution step
    pub fn step(&mut self) -> Option<Fault> {
        if self.state.halted {
            return None;
        }

        let instruction = match self.program.instructions.get(self.state.pc) {
            Some(instruction) => instruction,
            None => {
                let fault = Fault::new(FaultKind::ExecutionOutOfBounds, None);
                debug!("[pc: {}] {}", self.state.pc, fault);
                return Some(fault);
            }
        };

        let mut task = Task {
            state: &mut self.state,
            memory: &mut self.memory,
            output: &mut self.output,
            labels: &self.program.labels,
            instruction,
        };

        match task.run() {
            Ok(Flow::Next) => self.state.pc += 1,
            Ok(Flow::Jump(target)) => self.state.pc = target,
            Ok(Flow::Halt) => self.state.halted = true,
            Err(kind) => {
                let fault = Fault::new(kind, instruction.line);
                debug!("[pc: {}] {}: {}", self.state.pc, instruction, fault);
                return Some(fault);
            }
        }

        None
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The instruction the program counter points at, if any
    pub fn current_instruction(&self) -> Option<&Instruction> {
        self.program.instructions.get(self.state.pc)
    }

    pub fn registers(&self) -> [Word; Register::COUNT] {
        self.state.registers
    }

    pub fn register(&self, register: Register) -> Word {
        self.state.registers[register.index()]
    }

    pub fn pc(&self) -> usize {
        self.state.pc
    }

    pub fn sp(&self) -> usize {
        self.state.sp
    }

    pub fn flags(&self) -> Flags {
        self.state.flags
    }

    pub fn zero_flag(&self) -> bool {
        self.state.flags.zero
    }

    pub fn sign_flag(&self) -> bool {
        self.state.flags.sign
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted
    }

    pub fn memory(&self) -> &StdMem {
        &self.memory
    }

    /// Values emitted by `OUT`, oldest first
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            registers: self.state.registers,
            pc: self.state.pc,
            sp: self.state.sp,
            zero_flag: self.state.flags.zero,
            sign_flag: self.state.flags.sign,
            memory: self.memory,
            output: self.output.clone(),
            halted: self.state.halted,
        }
    }
}

/// Where execution continues after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Jump(usize),
    Halt,
}

/// The parts of the processor a single instruction works on
struct Task<'p> {
    state: &'p mut MachineState,
    memory: &'p mut StdMem,
    output: &'p mut Vec<String>,
    labels: &'p LabelTable,
    instruction: &'p Instruction,
}

fn in_range(value: i64) -> bool {
    value >= Word::MIN as i64 && value <= Word::MAX as i64
}

/// Division rounding toward negative infinity
fn floor_div(a: i64, b: i64) -> i64 {
    let quotient = match a.checked_div(b) {
        Some(quotient) => quotient,
        None => return i64::MAX, // i64::MIN / -1
    };
    if a % b != 0 && (a < 0) != (b < 0) {
        quotient - 1
    } else {
        quotient
    }
}

impl<'p> Task<'p> {
    fn run(&mut self) -> Result<Flow, FaultKind> {
        let instruction = self.instruction;
        if instruction.operands.len() != instruction.opcode.arity() {
            return Err(FaultKind::OperandCountMismatch);
        }
        let operands = instruction.operands.as_slice();

        match instruction.opcode {
            Opcode::MOV => {
                let value = self.read(&operands[1])?;
                self.write(&operands[0], value)?;

                debug!("MOV {} <- {}", operands[0], value);
            }
            Opcode::PUSH => {
                if self.state.sp == 0 {
                    return Err(FaultKind::StackOverflow);
                }
                let value = self.read(&operands[0])?;
                self.state.sp -= 1;
                self.memory.data[self.state.sp] = clamp(value);

                debug!("PUSH {} (sp: {})", value, self.state.sp);
            }
            Opcode::POP => {
                let value = self.pop_value()?;
                self.write(&operands[0], value)?;
                self.state.sp += 1;

                debug!("POP {} -> {} (sp: {})", value, operands[0], self.state.sp);
            }
            Opcode::ADD => self.arithmetic(operands, i64::checked_add)?,
            Opcode::SUB => self.arithmetic(operands, i64::checked_sub)?,
            Opcode::MOL => self.arithmetic(operands, i64::checked_mul)?,
            Opcode::DIV => {
                let a = self.read(&operands[0])?;
                let b = self.read(&operands[1])?;
                if b == 0 {
                    return Err(FaultKind::DivisionByZero);
                }
                // The quotient may leave the word range (-32768 / -1); the
                // write saturates it instead of faulting.
                let result = floor_div(a, b);
                self.store(&operands[0], result)?;

                debug!("DIV {} {}: {}", a, b, result);
            }
            Opcode::INC => {
                let a = self.read(&operands[0])?;
                let result = a.saturating_add(1);
                if result > Word::MAX as i64 {
                    return Err(FaultKind::ArithmeticOverflow);
                }
                self.store(&operands[0], result)?;

                debug!("INC {}: {}", a, result);
            }
            Opcode::DEC => {
                let a = self.read(&operands[0])?;
                let result = a.saturating_sub(1);
                if result < Word::MIN as i64 {
                    return Err(FaultKind::ArithmeticOverflow);
                }
                self.store(&operands[0], result)?;

                debug!("DEC {}: {}", a, result);
            }
            Opcode::AND => self.bitwise(operands, |a, b| a & b)?,
            Opcode::OR => self.bitwise(operands, |a, b| a | b)?,
            Opcode::NOT => {
                let a = self.read(&operands[0])?;
                let result = !a;
                self.store(&operands[0], result)?;

                debug!("NOT {}: {}", a, result);
            }
            Opcode::CMP => {
                let a = self.read(&operands[0])?;
                let b = self.read(&operands[1])?;
                let result = a.saturating_sub(b);
                self.set_flags(result);

                debug!("CMP {} {}: {}", a, b, result);
            }
            Opcode::JMP => return self.jump(&operands[0]),
            Opcode::JZ => return self.jump_if(self.state.flags.zero, &operands[0]),
            Opcode::JNZ => return self.jump_if(!self.state.flags.zero, &operands[0]),
            Opcode::JS => return self.jump_if(self.state.flags.sign, &operands[0]),
            Opcode::CALL => {
                if self.state.sp == 0 {
                    return Err(FaultKind::StackOverflow);
                }
                let target = self.resolve_label(&operands[0])?;
                // The return address must fit in a stack cell.
                let return_address = Word::try_from(self.state.pc + 1)
                    .map_err(|_| FaultKind::ExecutionOutOfBounds)?;
                self.state.sp -= 1;
                self.memory.data[self.state.sp] = return_address;

                debug!("CALL {} -> {} (sp: {})", operands[0], target, self.state.sp);
                return Ok(Flow::Jump(target));
            }
            Opcode::RET => {
                let return_address = self.pop_value()?;
                if return_address < 0 {
                    return Err(FaultKind::ExecutionOutOfBounds);
                }
                self.state.sp += 1;

                debug!("RET -> {} (sp: {})", return_address, self.state.sp);
                return Ok(Flow::Jump(return_address as usize));
            }
            Opcode::OUT => {
                let value = self.read(&operands[0])?;
                self.output.push(value.to_string());

                debug!("OUT {}", value);
            }
            Opcode::HLT => {
                debug!("HLT");
                return Ok(Flow::Halt);
            }
        }

        Ok(Flow::Next)
    }

    fn set_flags(&mut self, result: i64) {
        self.state.flags.zero = result == 0;
        self.state.flags.sign = result < 0;
    }

    /// Writes a flag-affecting result and updates the flags
    fn store(&mut self, dest: &Operand, result: i64) -> Result<(), FaultKind> {
        self.write(dest, result)?;
        self.set_flags(result);
        Ok(())
    }

    /// `ADD`, `SUB` and `MOL`: the result must fit a word before anything is written
    fn arithmetic(
        &mut self,
        operands: &[Operand],
        op: fn(i64, i64) -> Option<i64>,
    ) -> Result<(), FaultKind> {
        let a = self.read(&operands[0])?;
        let b = self.read(&operands[1])?;
        let result = op(a, b)
            .filter(|result| in_range(*result))
            .ok_or(FaultKind::ArithmeticOverflow)?;
        self.store(&operands[0], result)?;

        debug!("{} {} {}: {}", self.instruction.opcode, a, b, result);
        Ok(())
    }

    /// `AND` and `OR`: never fault on range, the write saturates
    fn bitwise(&mut self, operands: &[Operand], op: fn(i64, i64) -> i64) -> Result<(), FaultKind> {
        let a = self.read(&operands[0])?;
        let b = self.read(&operands[1])?;
        let result = op(a, b);
        self.store(&operands[0], result)?;

        debug!("{} {} {}: {}", self.instruction.opcode, a, b, result);
        Ok(())
    }

    /// The value on top of the stack, without popping it
    fn pop_value(&self) -> Result<i64, FaultKind> {
        self.memory
            .data
            .get(self.state.sp)
            .map(|value| *value as i64)
            .ok_or(FaultKind::StackUnderflow)
    }

    fn resolve_label(&self, operand: &Operand) -> Result<usize, FaultKind> {
        self.labels
            .get(&operand.token)
            .ok_or(FaultKind::UndefinedLabel)
    }

    fn jump(&self, operand: &Operand) -> Result<Flow, FaultKind> {
        let target = self.resolve_label(operand)?;

        debug!("{} {} -> {}", self.instruction.opcode, operand, target);
        Ok(Flow::Jump(target))
    }

    fn jump_if(&self, condition: bool, operand: &Operand) -> Result<Flow, FaultKind> {
        if condition {
            self.jump(operand)
        } else {
            debug!("{} {} not taken", self.instruction.opcode, operand);
            Ok(Flow::Next)
        }
    }
}
