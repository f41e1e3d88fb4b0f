//! Assembler and step-wise interpreter for a small 16-bit register machine.
//!
//! The machine has four general purpose registers (`R0`..`R3`), a zero and a
//! sign flag, 256 words of memory whose top doubles as a downward growing
//! stack, and an output log filled by `OUT`.
//!
//! ```
//! use asm16::{assemble, Processor};
//!
//! let program = assemble("MOV R0, 2\nADD R0, 3\nOUT R0\nHLT").unwrap();
//! let mut cpu = Processor::from(program);
//! while !cpu.is_halted() {
//!     assert_eq!(cpu.step(), None);
//! }
//! assert_eq!(cpu.output(), ["5"]);
//! ```

pub mod fault;
pub mod memory;
pub mod processor;
pub mod program;

pub use fault::{Fault, FaultKind};
pub use processor::{Processor, Snapshot};
pub use program::parse::{assemble, ParseError, ParseErrorKind};
pub use program::{Instruction, LabelTable, Opcode, Program};
