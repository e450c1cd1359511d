// crates/systems/spi_sram/src/command.rs
// SRAM opcodes. The read shifter delivers `addr_bits - 8` bits as the command
// word: the opcode followed by the address bits above the low 16.

pub const READ: u8 = 0x03;
pub const FAST_READ: u8 = 0x0B;
pub const WRITE: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Read,
    FastRead,
    Write,
    /// Anything else. Not an error: the bus is simply not for us.
    Unknown(u32),
}

impl Command {
    pub fn decode(word: u32, addr_bits: u8) -> Command {
        match word >> (addr_bits - 16) {
            op if op == READ as u32 => Command::Read,
            op if op == FAST_READ as u32 => Command::FastRead,
            op if op == WRITE as u32 => Command::Write,
            op => Command::Unknown(op),
        }
    }

    /// Opcode scaled to the command word width (`READ_CMD` and friends).
    pub fn word(opcode: u8, addr_bits: u8) -> u32 {
        (opcode as u32) << (addr_bits - 16)
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Read => "READ",
            Command::FastRead => "FAST_READ",
            Command::Write => "WRITE",
            Command::Unknown(_) => "UNKNOWN",
        }
    }
}
