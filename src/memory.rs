use log::*;

/// A single machine word: every register and memory cell holds one.
pub type Word = i16; // 2 bytes

/// Number of addressable memory cells
pub const MEMORY_SIZE: usize = 256;

/// Default memory
pub type StdMem = Memory<MEMORY_SIZE>;

/// Saturates a computed value into the range of a [`Word`].
pub fn clamp(value: i64) -> Word {
    if value > Word::MAX as i64 {
        Word::MAX
    } else if value < Word::MIN as i64 {
        Word::MIN
    } else {
        value as Word
    }
}

/// Emulates the data memory of the machine. The stack lives in the same
/// address space and grows downward from the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Memory<const S: usize> {
    /// The actual data of the memory
    pub data: [Word; S],
}

impl<const S: usize> Default for Memory<S> {
    /// Initializes the memory
    fn default() -> Self {
        Memory { data: [0; S] }
    }
}

impl<const S: usize> Memory<S> {
    /// Converts a computed address into an index, if it lies inside the memory
    pub fn address(position: i64) -> Option<usize> {
        if position >= 0 && (position as u64) < S as u64 {
            Some(position as usize)
        } else {
            None
        }
    }

    /// Reads a word from the memory
    pub fn read_word(&self, position: i64) -> Option<Word> {
        Self::address(position).map(|index| self.data[index])
    }

    /// Writes a word to the memory, saturating the value into range
    pub fn write_word(&mut self, position: i64, value: i64) -> Option<()> {
        let index = Self::address(position)?;
        self.data[index] = clamp(value);
        Some(())
    }

    /// Zeroes every cell
    pub fn clear(&mut self) {
        self.data = [0; S];
    }

    /// Logs every non-zero cell
    pub fn dump(&self) {
        for (address, value) in self.data.iter().enumerate() {
            if *value != 0 {
                info!("[0x{:02X}] {}", address, value);
            }
        }
    }
}
