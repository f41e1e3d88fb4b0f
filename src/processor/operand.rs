//! Resolves operands through their addressing mode.
//!
//! Every write saturates the value into the range of a word.

use crate::fault::FaultKind;
use crate::memory::clamp;
use crate::program::{Mode, Operand};

use super::Task;

impl<'p> Task<'p> {
    /// The memory address an operand refers to, if it refers to one
    fn position(&self, mode: Mode) -> Option<i64> {
        match mode {
            Mode::Direct(address) => Some(address),
            Mode::Indirect(register) => Some(self.state.registers[register.index()] as i64),
            _ => None,
        }
    }

    /// Reads the value of an operand
    pub(super) fn read(&self, operand: &Operand) -> Result<i64, FaultKind> {
        match operand.mode {
            Mode::Register(register) => Ok(self.state.registers[register.index()] as i64),
            Mode::Immediate(value) => Ok(value),
            Mode::Direct(_) | Mode::Indirect(_) => {
                let position = self.position(operand.mode).ok_or(FaultKind::InvalidOperand)?;
                self.memory
                    .read_word(position)
                    .map(i64::from)
                    .ok_or(FaultKind::InvalidMemoryAccess)
            }
            Mode::Symbol => Err(FaultKind::InvalidOperand),
        }
    }

    /// Stores `value` into the location an operand refers to
    pub(super) fn write(&mut self, operand: &Operand, value: i64) -> Result<(), FaultKind> {
        match operand.mode {
            Mode::Register(register) => {
                self.state.registers[register.index()] = clamp(value);
                Ok(())
            }
            Mode::Direct(_) | Mode::Indirect(_) => {
                let position = self.position(operand.mode).ok_or(FaultKind::InvalidOperand)?;
                self.memory
                    .write_word(position, value)
                    .ok_or(FaultKind::InvalidMemoryAccess)
            }
            Mode::Immediate(_) | Mode::Symbol => Err(FaultKind::InvalidOperand),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{MachineState, Task};
    use crate::fault::FaultKind;
    use crate::memory::StdMem;
    use crate::program::{Instruction, LabelTable, Opcode, Operand};
    use color_eyre::eyre::Result;

    struct Fixture {
        state: MachineState,
        memory: StdMem,
        output: Vec<String>,
        labels: LabelTable,
        instruction: Instruction,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                state: MachineState::default(),
                memory: StdMem::default(),
                output: Vec::new(),
                labels: LabelTable::new(),
                instruction: Instruction::new(Opcode::HLT, Vec::new(), 1),
            }
        }

        fn task(&mut self) -> Task<'_> {
            Task {
                state: &mut self.state,
                memory: &mut self.memory,
                output: &mut self.output,
                labels: &self.labels,
                instruction: &self.instruction,
            }
        }
    }

    #[test]
    fn register_mode() -> Result<()> {
        let mut fixture = Fixture::new();
        let mut task = fixture.task();

        task.write(&Operand::new("R2"), -7)?;
        assert_eq!(task.read(&Operand::new("r2"))?, -7);

        task.write(&Operand::new("R3"), 1_000_000)?;
        assert_eq!(task.read(&Operand::new("R3"))?, 32767);

        Ok(())
    }

    #[test]
    fn immediate_mode_is_read_only() -> Result<()> {
        let mut fixture = Fixture::new();
        let mut task = fixture.task();

        assert_eq!(task.read(&Operand::new("-42"))?, -42);
        assert_eq!(
            task.write(&Operand::new("42"), 1),
            Err(FaultKind::InvalidOperand)
        );

        Ok(())
    }

    #[test]
    fn direct_mode() -> Result<()> {
        let mut fixture = Fixture::new();
        let mut task = fixture.task();

        task.write(&Operand::new("[255]"), -40000)?;
        assert_eq!(task.read(&Operand::new("[255]"))?, -32768);
        assert_eq!(
            task.read(&Operand::new("[256]")),
            Err(FaultKind::InvalidMemoryAccess)
        );
        assert_eq!(
            task.write(&Operand::new("[300]"), 1),
            Err(FaultKind::InvalidMemoryAccess)
        );
        assert_eq!(
            task.read(&Operand::new("[-1]")),
            Err(FaultKind::InvalidMemoryAccess)
        );
        assert_eq!(
            task.write(&Operand::new("[ -5 ]"), 1),
            Err(FaultKind::InvalidMemoryAccess)
        );
        assert_eq!(fixture.memory.data[255], -32768);

        Ok(())
    }

    #[test]
    fn indirect_mode() -> Result<()> {
        let mut fixture = Fixture::new();
        fixture.state.registers[1] = 10;
        fixture.memory.data[10] = 99;
        let mut task = fixture.task();

        assert_eq!(task.read(&Operand::new("[R1]"))?, 99);
        task.write(&Operand::new("[r1]"), 5)?;
        assert_eq!(task.read(&Operand::new("[10]"))?, 5);

        task.state.registers[1] = -1;
        assert_eq!(
            task.read(&Operand::new("[R1]")),
            Err(FaultKind::InvalidMemoryAccess)
        );

        Ok(())
    }

    #[test]
    fn symbols_are_not_operands() -> Result<()> {
        let mut fixture = Fixture::new();
        let mut task = fixture.task();

        assert_eq!(
            task.read(&Operand::new("LOOP")),
            Err(FaultKind::InvalidOperand)
        );
        assert_eq!(
            task.write(&Operand::new("R9"), 0),
            Err(FaultKind::InvalidOperand)
        );

        Ok(())
    }
}
