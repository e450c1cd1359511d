use sram_core::PinBank;
use thiserror::Error;

pub mod instr;
pub mod sm;
mod tests;

pub use instr::{
    encode_in, encode_jmp, encode_jmp_pin, encode_jmp_x_dec, encode_mov, encode_nop, encode_out,
    encode_pull, encode_push, encode_set, encode_wait_gpio, encode_wait_pin, InSrc, Instr,
    JmpCond, MovDest, MovSrc, OutDest, SetDest,
};
pub use sm::{ExecCtrl, PinCtrl, ShiftCtrl, SmConfig, StateMachine};

// ============================================================================
//  CONSTANTS
// ============================================================================

pub const NUM_STATE_MACHINES: usize = 4;
pub const INSTRUCTION_COUNT: usize = 32;

/// Register offsets inside a PIO block, as seen from the bus.
pub mod regs {
    pub const FSTAT: u32 = 0x004;
    pub const TXF0: u32 = 0x010;
    pub const RXF0: u32 = 0x020;
    pub const INSTR_MEM0: u32 = 0x048;

    pub const fn txf(sm: usize) -> u32 {
        TXF0 + 4 * sm as u32
    }

    pub const fn rxf(sm: usize) -> u32 {
        RXF0 + 4 * sm as u32
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PioError {
    #[error("PIO{pio} SM{sm} is already claimed")]
    SmClaimed { pio: u8, sm: usize },
    #[error("PIO{pio} has no state machine {sm}")]
    NoSuchSm { pio: u8, sm: usize },
    #[error("PIO{pio} has no room for a {len}-instruction program")]
    NoProgramSpace { pio: u8, len: usize },
    #[error("PIO{pio} instruction memory at offset {offset} is already in use")]
    OffsetInUse { pio: u8, offset: u8 },
    #[error("program origin {origin} conflicts with requested offset {offset}")]
    OriginMismatch { origin: u8, offset: u8 },
}

// ============================================================================
//  PROGRAMS
// ============================================================================

/// An assembled program, like the `pio_program` the assembler emits.
/// JMP targets are relative to the start of the program and get relocated
/// when the program is loaded.
#[derive(Debug, Clone)]
pub struct Program {
    pub instructions: Vec<u16>,
    pub origin: Option<u8>,
    pub wrap_target: u8,
    pub wrap: u8,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    fn mask(&self, offset: u8) -> u32 {
        let span = if self.len() >= 32 {
            u32::MAX
        } else {
            (1u32 << self.len()) - 1
        };
        span << offset
    }
}

// ============================================================================
//  PIO BLOCK
// ============================================================================

pub struct Pio {
    pub index: u8,
    instr_mem: [u16; INSTRUCTION_COUNT],
    used_instr: u32,
    claimed: u8,
    sm: [StateMachine; NUM_STATE_MACHINES],
    irq: u8,
}

impl Pio {
    pub fn new(index: u8) -> Self {
        Self {
            index,
            instr_mem: [0; INSTRUCTION_COUNT],
            used_instr: 0,
            claimed: 0,
            sm: Default::default(),
            irq: 0,
        }
    }

    // --- Resource claims ---

    pub fn sm_claim(&mut self, sm: usize) -> Result<(), PioError> {
        if sm >= NUM_STATE_MACHINES {
            return Err(PioError::NoSuchSm { pio: self.index, sm });
        }
        if self.claimed & (1 << sm) != 0 {
            return Err(PioError::SmClaimed { pio: self.index, sm });
        }
        self.claimed |= 1 << sm;
        Ok(())
    }

    pub fn is_claimed(&self, sm: usize) -> bool {
        sm < NUM_STATE_MACHINES && self.claimed & (1 << sm) != 0
    }

    // --- Instruction memory ---

    pub fn can_add_program_at_offset(&self, program: &Program, offset: u8) -> bool {
        if program.origin.is_some_and(|o| o != offset) {
            return false;
        }
        offset as usize + program.len() <= INSTRUCTION_COUNT
            && self.used_instr & program.mask(offset) == 0
    }

    /// Loads a program wherever it fits, searching from the top of
    /// instruction memory down like the SDK allocator. Returns the offset.
    pub fn add_program(&mut self, program: &Program) -> Result<u8, PioError> {
        if let Some(origin) = program.origin {
            self.add_program_at_offset(program, origin)?;
            return Ok(origin);
        }
        let len = program.len();
        if len == 0 || len > INSTRUCTION_COUNT {
            return Err(PioError::NoProgramSpace { pio: self.index, len });
        }
        let offset = (0..=(INSTRUCTION_COUNT - len) as u8)
            .rev()
            .find(|&offset| self.can_add_program_at_offset(program, offset))
            .ok_or(PioError::NoProgramSpace { pio: self.index, len })?;
        self.load(program, offset);
        Ok(offset)
    }

    pub fn add_program_at_offset(&mut self, program: &Program, offset: u8) -> Result<(), PioError> {
        if let Some(origin) = program.origin {
            if origin != offset {
                return Err(PioError::OriginMismatch { origin, offset });
            }
        }
        if offset as usize + program.len() > INSTRUCTION_COUNT {
            return Err(PioError::NoProgramSpace {
                pio: self.index,
                len: program.len(),
            });
        }
        if self.used_instr & program.mask(offset) != 0 {
            return Err(PioError::OffsetInUse { pio: self.index, offset });
        }
        self.load(program, offset);
        Ok(())
    }

    fn load(&mut self, program: &Program, offset: u8) {
        for (i, &word) in program.instructions.iter().enumerate() {
            self.instr_mem[offset as usize + i] = if instr::is_jmp(word) {
                // Relocate the 5-bit target
                (word & !0x1F) | ((word + offset as u16) & 0x1F)
            } else {
                word
            };
        }
        self.used_instr |= program.mask(offset);
        log::debug!(
            "pio{}: loaded {} instructions at offset {}",
            self.index,
            program.len(),
            offset
        );
    }

    pub fn instr(&self, addr: u8) -> u16 {
        self.instr_mem[(addr & 0x1F) as usize]
    }

    /// Direct write to INSTR_MEMx; running state machines see it on their
    /// next fetch.
    pub fn write_instr(&mut self, addr: u8, word: u16) {
        self.instr_mem[(addr & 0x1F) as usize] = word;
    }

    // --- State machine control ---

    pub fn sm(&self, sm: usize) -> &StateMachine {
        &self.sm[sm]
    }

    pub fn sm_mut(&mut self, sm: usize) -> &mut StateMachine {
        &mut self.sm[sm]
    }

    /// `pio_sm_init`: disable, configure, clear FIFOs, restart, jump to `initial_pc`.
    pub fn sm_init(&mut self, sm: usize, initial_pc: u8, config: &SmConfig) {
        let machine = &mut self.sm[sm];
        machine.enabled = false;
        machine.apply_config(config);
        machine.clear_fifos();
        machine.restart();
        machine.exec(encode_jmp(initial_pc));
    }

    pub fn sm_set_enabled(&mut self, sm: usize, enabled: bool) {
        self.sm[sm].enabled = enabled;
    }

    pub fn sm_clear_fifos(&mut self, sm: usize) {
        self.sm[sm].clear_fifos();
    }

    pub fn sm_restart(&mut self, sm: usize) {
        self.sm[sm].restart();
    }

    pub fn sm_exec(&mut self, sm: usize, word: u16) {
        self.sm[sm].exec(word);
    }

    /// Non-blocking RX pop; callers poll this where the SDK would block.
    pub fn sm_get(&mut self, sm: usize) -> Option<u32> {
        self.sm[sm].rx.pop_front()
    }

    /// Non-blocking TX push; false when the FIFO is full.
    pub fn sm_put(&mut self, sm: usize, value: u32) -> bool {
        let machine = &mut self.sm[sm];
        if machine.tx_full() {
            return false;
        }
        machine.tx.push_back(value);
        true
    }

    pub fn sm_is_rx_fifo_empty(&self, sm: usize) -> bool {
        self.sm[sm].rx_empty()
    }

    pub fn sm_is_tx_fifo_full(&self, sm: usize) -> bool {
        self.sm[sm].tx_full()
    }

    /// Atomic set alias of SMx_SHIFTCTRL (`hw_set_bits`).
    pub fn sm_shiftctrl_set_bits(&mut self, sm: usize, bits: u32) {
        let machine = &mut self.sm[sm];
        machine.shiftctrl = ShiftCtrl::from_bits_retain(machine.shiftctrl.bits() | bits);
    }

    /// Atomic clear alias of SMx_SHIFTCTRL (`hw_clear_bits`).
    pub fn sm_shiftctrl_clear_bits(&mut self, sm: usize, bits: u32) {
        let machine = &mut self.sm[sm];
        machine.shiftctrl = ShiftCtrl::from_bits_retain(machine.shiftctrl.bits() & !bits);
    }

    pub fn irq_flags(&self) -> u8 {
        self.irq
    }

    // --- DREQ ---

    /// DREQ number of one FIFO, as `pio_get_dreq` computes it.
    pub fn dreq(&self, sm: usize, is_tx: bool) -> u8 {
        self.index * 8 + if is_tx { 0 } else { 4 } + sm as u8
    }

    pub fn tx_dreq(&self, sm: usize) -> bool {
        !self.sm[sm].tx_full()
    }

    pub fn rx_dreq(&self, sm: usize) -> bool {
        !self.sm[sm].rx_empty()
    }

    // --- Bus register window ---

    /// Word read from the block's register window. RXF pops; unknown or
    /// empty registers read as 0.
    pub fn read_reg(&mut self, offset: u32) -> u32 {
        match offset {
            regs::FSTAT => {
                let mut fstat = 0u32;
                for (i, machine) in self.sm.iter().enumerate() {
                    if machine.rx_empty() {
                        fstat |= 1 << (8 + i);
                    }
                    if machine.tx_full() {
                        fstat |= 1 << (16 + i);
                    }
                    if machine.tx_level() == 0 {
                        fstat |= 1 << (24 + i);
                    }
                }
                fstat
            }
            o if (regs::RXF0..regs::RXF0 + 16).contains(&o) => {
                let sm = ((o - regs::RXF0) / 4) as usize;
                self.sm[sm].rx.pop_front().unwrap_or(0)
            }
            o if (regs::INSTR_MEM0..regs::INSTR_MEM0 + 4 * INSTRUCTION_COUNT as u32)
                .contains(&o) =>
            {
                self.instr_mem[((o - regs::INSTR_MEM0) / 4) as usize] as u32
            }
            _ => 0,
        }
    }

    /// Word write to the register window. A write to a full TXF is dropped.
    pub fn write_reg(&mut self, offset: u32, value: u32) {
        match offset {
            o if (regs::TXF0..regs::TXF0 + 16).contains(&o) => {
                let sm = ((o - regs::TXF0) / 4) as usize;
                if !self.sm_put(sm, value) {
                    log::trace!("pio{}: TXF{} overflow, dropped {:08X}", self.index, sm, value);
                }
            }
            o if (regs::INSTR_MEM0..regs::INSTR_MEM0 + 4 * INSTRUCTION_COUNT as u32)
                .contains(&o) =>
            {
                self.instr_mem[((o - regs::INSTR_MEM0) / 4) as usize] = value as u16;
            }
            _ => {}
        }
    }

    // --- Clock ---

    /// Advances every enabled state machine by one system clock.
    pub fn step(&mut self, pins: &mut dyn PinBank) {
        let Self {
            instr_mem, sm, irq, ..
        } = self;
        for machine in sm.iter_mut() {
            machine.step(instr_mem, pins, irq);
        }
    }
}
