// crates/rp_pio/src/sm.rs
// One PIO state machine: X/Y scratch, ISR/OSR shifters, TX/RX FIFOs.

use crate::instr::{
    delay_of, InSrc, Instr, JmpCond, MovDest, MovOp, MovSrc, OutDest, SetDest, WaitSrc,
};
use bitflags::bitflags;
use sram_core::PinBank;
use std::collections::VecDeque;

pub const FIFO_DEPTH: usize = 4;

bitflags! {
    /// SMx_SHIFTCTRL. Thresholds are 5-bit fields where 0 means 32.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShiftCtrl: u32 {
        const AUTOPUSH     = 1 << 16;
        const AUTOPULL     = 1 << 17;
        const IN_SHIFTDIR  = 1 << 18; // 1 = shift right
        const OUT_SHIFTDIR = 1 << 19; // 1 = shift right
        const PUSH_THRESH  = 0x1F << 20;
        const PULL_THRESH  = 0x1F << 25;
        const FJOIN_TX     = 1 << 30;
        const FJOIN_RX     = 1 << 31;
    }
}

impl ShiftCtrl {
    pub const PUSH_THRESH_LSB: u32 = 20;
    pub const PULL_THRESH_LSB: u32 = 25;

    /// Power-on value: both directions shift right, thresholds 32.
    pub const RESET: ShiftCtrl = ShiftCtrl::IN_SHIFTDIR.union(ShiftCtrl::OUT_SHIFTDIR);

    pub fn push_thresh(self) -> u8 {
        match (self.bits() >> Self::PUSH_THRESH_LSB) & 0x1F {
            0 => 32,
            n => n as u8,
        }
    }

    pub fn pull_thresh(self) -> u8 {
        match (self.bits() >> Self::PULL_THRESH_LSB) & 0x1F {
            0 => 32,
            n => n as u8,
        }
    }

    pub fn with_push_thresh(self, bits: u8) -> Self {
        let field = ((bits as u32) & 0x1F) << Self::PUSH_THRESH_LSB;
        Self::from_bits_retain((self.bits() & !Self::PUSH_THRESH.bits()) | field)
    }

    pub fn with_pull_thresh(self, bits: u8) -> Self {
        let field = ((bits as u32) & 0x1F) << Self::PULL_THRESH_LSB;
        Self::from_bits_retain((self.bits() & !Self::PULL_THRESH.bits()) | field)
    }
}

/// Pin mapping (SMx_PINCTRL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinCtrl {
    pub out_base: u8,
    pub out_count: u8,
    pub set_base: u8,
    pub set_count: u8,
    pub in_base: u8,
}

/// Program-flow controls (SMx_EXECCTRL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecCtrl {
    pub wrap_bottom: u8,
    pub wrap_top: u8,
    pub jmp_pin: u8,
}

impl Default for ExecCtrl {
    fn default() -> Self {
        Self {
            wrap_bottom: 0,
            wrap_top: 31,
            jmp_pin: 0,
        }
    }
}

/// Builder mirroring `pio_sm_config` from the C SDK.
#[derive(Debug, Clone, Copy)]
pub struct SmConfig {
    pub clkdiv: u16,
    pub execctrl: ExecCtrl,
    pub shiftctrl: ShiftCtrl,
    pub pinctrl: PinCtrl,
}

impl Default for SmConfig {
    fn default() -> Self {
        Self {
            clkdiv: 1,
            execctrl: ExecCtrl::default(),
            shiftctrl: ShiftCtrl::RESET,
            pinctrl: PinCtrl::default(),
        }
    }
}

impl SmConfig {
    pub fn set_wrap(&mut self, wrap_target: u8, wrap: u8) {
        self.execctrl.wrap_bottom = wrap_target;
        self.execctrl.wrap_top = wrap;
    }

    pub fn set_in_pins(&mut self, base: u8) {
        self.pinctrl.in_base = base;
    }

    pub fn set_out_pins(&mut self, base: u8, count: u8) {
        self.pinctrl.out_base = base;
        self.pinctrl.out_count = count;
    }

    /// Threshold 32 is stored as 0, like the hardware field.
    pub fn set_in_shift(&mut self, shift_right: bool, autopush: bool, threshold: u8) {
        let mut ctrl = self.shiftctrl.with_push_thresh(threshold & 0x1F);
        ctrl.set(ShiftCtrl::IN_SHIFTDIR, shift_right);
        ctrl.set(ShiftCtrl::AUTOPUSH, autopush);
        self.shiftctrl = ctrl;
    }

    pub fn set_out_shift(&mut self, shift_right: bool, autopull: bool, threshold: u8) {
        let mut ctrl = self.shiftctrl.with_pull_thresh(threshold & 0x1F);
        ctrl.set(ShiftCtrl::OUT_SHIFTDIR, shift_right);
        ctrl.set(ShiftCtrl::AUTOPULL, autopull);
        self.shiftctrl = ctrl;
    }
}

/// Outcome of executing one instruction.
enum Flow {
    Next,
    Stall,
    Jump(u8),
}

pub struct StateMachine {
    pub(crate) enabled: bool,
    pub clkdiv: u16,
    clk_count: u16,
    pub execctrl: ExecCtrl,
    pub shiftctrl: ShiftCtrl,
    pub pinctrl: PinCtrl,

    pub pc: u8,
    pub x: u32,
    pub y: u32,
    pub isr: u32,
    pub isr_count: u8,
    pub osr: u32,
    pub osr_count: u8,

    delay: u8,
    pending_exec: Option<u16>,
    irq_waiting: bool,
    pub stalled: bool,

    pub(crate) tx: VecDeque<u32>,
    pub(crate) rx: VecDeque<u32>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            enabled: false,
            clkdiv: 1,
            clk_count: 0,
            execctrl: ExecCtrl::default(),
            shiftctrl: ShiftCtrl::RESET,
            pinctrl: PinCtrl::default(),
            pc: 0,
            x: 0,
            y: 0,
            isr: 0,
            isr_count: 0,
            osr: 0,
            osr_count: 32,
            delay: 0,
            pending_exec: None,
            irq_waiting: false,
            stalled: false,
            tx: VecDeque::with_capacity(2 * FIFO_DEPTH),
            rx: VecDeque::with_capacity(2 * FIFO_DEPTH),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn apply_config(&mut self, config: &SmConfig) {
        self.clkdiv = config.clkdiv.max(1);
        self.execctrl = config.execctrl;
        self.shiftctrl = config.shiftctrl;
        self.pinctrl = config.pinctrl;
    }

    // --- FIFOs ---

    pub fn tx_depth(&self) -> usize {
        if self.shiftctrl.contains(ShiftCtrl::FJOIN_TX) {
            2 * FIFO_DEPTH
        } else if self.shiftctrl.contains(ShiftCtrl::FJOIN_RX) {
            0
        } else {
            FIFO_DEPTH
        }
    }

    pub fn rx_depth(&self) -> usize {
        if self.shiftctrl.contains(ShiftCtrl::FJOIN_RX) {
            2 * FIFO_DEPTH
        } else if self.shiftctrl.contains(ShiftCtrl::FJOIN_TX) {
            0
        } else {
            FIFO_DEPTH
        }
    }

    pub fn tx_full(&self) -> bool {
        self.tx.len() >= self.tx_depth()
    }

    pub fn rx_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn tx_level(&self) -> usize {
        self.tx.len()
    }

    pub fn clear_fifos(&mut self) {
        self.tx.clear();
        self.rx.clear();
    }

    /// Clears shift counters, delay and any stalled instruction.
    /// PC, X and Y are left alone.
    pub fn restart(&mut self) {
        self.isr = 0;
        self.isr_count = 0;
        self.osr = 0;
        self.osr_count = 32;
        self.delay = 0;
        self.clk_count = 0;
        self.pending_exec = None;
        self.irq_waiting = false;
        self.stalled = false;
    }

    /// Forces an instruction through SMx_INSTR. An unconditional jump takes
    /// effect immediately (even while disabled); anything else runs on the
    /// next enabled cycle.
    pub fn exec(&mut self, word: u16) {
        match Instr::decode(word) {
            Some(Instr::Jmp {
                cond: JmpCond::Always,
                addr,
            }) => {
                self.pc = addr & 0x1F;
                self.pending_exec = None;
                self.stalled = false;
            }
            _ => self.pending_exec = Some(word),
        }
    }

    // --- Execution ---

    pub(crate) fn step(&mut self, instr_mem: &[u16; 32], pins: &mut dyn PinBank, irq: &mut u8) {
        if !self.enabled {
            return;
        }
        self.clk_count += 1;
        if self.clk_count < self.clkdiv {
            return;
        }
        self.clk_count = 0;

        if self.delay > 0 {
            self.delay -= 1;
            return;
        }

        let (word, forced) = match self.pending_exec.take() {
            Some(word) => (word, true),
            None => (instr_mem[self.pc as usize], false),
        };

        let Some(instr) = Instr::decode(word) else {
            log::warn!("pio: reserved encoding {:04X} at pc {}", word, self.pc);
            if !forced {
                self.advance_pc();
            }
            return;
        };

        match self.execute(instr, pins, irq) {
            Flow::Stall => {
                self.stalled = true;
                if forced {
                    self.pending_exec = Some(word);
                }
            }
            Flow::Next => {
                self.stalled = false;
                if !forced {
                    self.advance_pc();
                }
                self.delay = delay_of(word);
            }
            Flow::Jump(addr) => {
                self.stalled = false;
                self.pc = addr & 0x1F;
                self.delay = delay_of(word);
            }
        }
    }

    fn advance_pc(&mut self) {
        if self.pc == self.execctrl.wrap_top {
            self.pc = self.execctrl.wrap_bottom;
        } else {
            self.pc = (self.pc + 1) & 0x1F;
        }
    }

    fn in_pins(&self, pins: &dyn PinBank) -> u32 {
        pins.levels().rotate_right(self.pinctrl.in_base as u32)
    }

    fn write_pins(pins: &mut dyn PinBank, base: u8, count: u8, value: u32, dirs: bool) {
        let mask = low_mask(count).rotate_left(base as u32);
        let bits = value.rotate_left(base as u32) & mask;
        if dirs {
            pins.set_dirs(mask, bits);
        } else {
            pins.drive(mask, bits);
        }
    }

    fn shift_in(&mut self, data: u32, count: u8) {
        let data = data & low_mask(count);
        let n = count as u32;
        self.isr = if self.shiftctrl.contains(ShiftCtrl::IN_SHIFTDIR) {
            (((self.isr as u64) >> n) | ((data as u64) << (32 - n))) as u32
        } else {
            (((self.isr as u64) << n) | data as u64) as u32
        };
        self.isr_count = (self.isr_count + count).min(32);
    }

    fn shift_out(&mut self, count: u8) -> u32 {
        let n = count as u32;
        let data = if self.shiftctrl.contains(ShiftCtrl::OUT_SHIFTDIR) {
            let data = self.osr & low_mask(count);
            self.osr = ((self.osr as u64) >> n) as u32;
            data
        } else {
            let data = ((self.osr as u64) >> (32 - n)) as u32 & low_mask(count);
            self.osr = ((self.osr as u64) << n) as u32;
            data
        };
        self.osr_count = (self.osr_count + count).min(32);
        data
    }

    fn push_isr(&mut self) {
        self.rx.push_back(self.isr);
        self.isr = 0;
        self.isr_count = 0;
    }

    fn rx_full(&self) -> bool {
        self.rx.len() >= self.rx_depth()
    }

    fn execute(&mut self, instr: Instr, pins: &mut dyn PinBank, irq: &mut u8) -> Flow {
        match instr {
            Instr::Jmp { cond, addr } => {
                let taken = match cond {
                    JmpCond::Always => true,
                    JmpCond::XZero => self.x == 0,
                    JmpCond::XDec => {
                        let taken = self.x != 0;
                        self.x = self.x.wrapping_sub(1);
                        taken
                    }
                    JmpCond::YZero => self.y == 0,
                    JmpCond::YDec => {
                        let taken = self.y != 0;
                        self.y = self.y.wrapping_sub(1);
                        taken
                    }
                    JmpCond::XNeY => self.x != self.y,
                    JmpCond::Pin => pins.level(self.execctrl.jmp_pin),
                    JmpCond::OsrNotEmpty => self.osr_count < self.shiftctrl.pull_thresh(),
                };
                if taken {
                    Flow::Jump(addr)
                } else {
                    Flow::Next
                }
            }

            Instr::Wait { polarity, src, index } => {
                let satisfied = match src {
                    WaitSrc::Gpio => pins.level(index) == polarity,
                    WaitSrc::Pin => {
                        pins.level((self.pinctrl.in_base + index) & 0x1F) == polarity
                    }
                    WaitSrc::Irq => {
                        let bit = 1u8 << (index & 7);
                        let set = *irq & bit != 0;
                        if set == polarity && polarity {
                            *irq &= !bit;
                        }
                        set == polarity
                    }
                };
                if satisfied {
                    Flow::Next
                } else {
                    Flow::Stall
                }
            }

            Instr::In { src, count } => {
                let autopush = self.shiftctrl.contains(ShiftCtrl::AUTOPUSH);
                let thresh = self.shiftctrl.push_thresh();
                if autopush && self.isr_count + count >= thresh && self.rx_full() {
                    return Flow::Stall;
                }
                let data = match src {
                    InSrc::Pins => self.in_pins(pins),
                    InSrc::X => self.x,
                    InSrc::Y => self.y,
                    InSrc::Null => 0,
                    InSrc::Isr => self.isr,
                    InSrc::Osr => self.osr,
                };
                self.shift_in(data, count);
                if autopush && self.isr_count >= thresh {
                    self.push_isr();
                }
                Flow::Next
            }

            Instr::Out { dest, count } => {
                if self.shiftctrl.contains(ShiftCtrl::AUTOPULL)
                    && self.osr_count >= self.shiftctrl.pull_thresh()
                {
                    match self.tx.pop_front() {
                        Some(word) => {
                            self.osr = word;
                            self.osr_count = 0;
                        }
                        None => return Flow::Stall,
                    }
                }
                let data = self.shift_out(count);
                match dest {
                    OutDest::Pins => {
                        let PinCtrl { out_base, out_count, .. } = self.pinctrl;
                        Self::write_pins(pins, out_base, out_count.min(count), data, false);
                    }
                    OutDest::PinDirs => {
                        let PinCtrl { out_base, out_count, .. } = self.pinctrl;
                        Self::write_pins(pins, out_base, out_count.min(count), data, true);
                    }
                    OutDest::X => self.x = data,
                    OutDest::Y => self.y = data,
                    OutDest::Null => {}
                    OutDest::Isr => {
                        self.isr = data;
                        self.isr_count = count;
                    }
                    OutDest::Pc => return Flow::Jump(data as u8),
                    OutDest::Exec => {
                        self.pending_exec = Some(data as u16);
                        return Flow::Jump(self.next_pc());
                    }
                }
                Flow::Next
            }

            Instr::Push { if_full, block } => {
                if if_full && self.isr_count < self.shiftctrl.push_thresh() {
                    return Flow::Next;
                }
                if self.rx_full() {
                    if block {
                        return Flow::Stall;
                    }
                    self.isr = 0;
                    self.isr_count = 0;
                    return Flow::Next;
                }
                self.push_isr();
                Flow::Next
            }

            Instr::Pull { if_empty, block } => {
                if if_empty && self.osr_count < self.shiftctrl.pull_thresh() {
                    return Flow::Next;
                }
                match self.tx.pop_front() {
                    Some(word) => {
                        self.osr = word;
                        self.osr_count = 0;
                    }
                    None if block => return Flow::Stall,
                    None => {
                        self.osr = self.x;
                        self.osr_count = 0;
                    }
                }
                Flow::Next
            }

            Instr::Mov { dest, op, src } => {
                let value = match src {
                    MovSrc::Pins => self.in_pins(pins),
                    MovSrc::X => self.x,
                    MovSrc::Y => self.y,
                    MovSrc::Null => 0,
                    MovSrc::Status => 0,
                    MovSrc::Isr => self.isr,
                    MovSrc::Osr => self.osr,
                };
                let value = match op {
                    MovOp::None => value,
                    MovOp::Invert => !value,
                    MovOp::Reverse => value.reverse_bits(),
                };
                match dest {
                    MovDest::Pins => {
                        let PinCtrl { out_base, out_count, .. } = self.pinctrl;
                        Self::write_pins(pins, out_base, out_count, value, false);
                    }
                    MovDest::X => self.x = value,
                    MovDest::Y => self.y = value,
                    MovDest::Exec => {
                        self.pending_exec = Some(value as u16);
                        return Flow::Jump(self.next_pc());
                    }
                    MovDest::Pc => return Flow::Jump(value as u8),
                    MovDest::Isr => {
                        self.isr = value;
                        self.isr_count = 0;
                    }
                    MovDest::Osr => {
                        self.osr = value;
                        self.osr_count = 0;
                    }
                }
                Flow::Next
            }

            Instr::Irq { clear, wait, index } => {
                let bit = 1u8 << (index & 7);
                if clear {
                    *irq &= !bit;
                    return Flow::Next;
                }
                if !wait {
                    *irq |= bit;
                    return Flow::Next;
                }
                if self.irq_waiting {
                    if *irq & bit == 0 {
                        self.irq_waiting = false;
                        return Flow::Next;
                    }
                } else {
                    *irq |= bit;
                    self.irq_waiting = true;
                }
                Flow::Stall
            }

            Instr::Set { dest, data } => {
                let value = data as u32;
                match dest {
                    SetDest::Pins => {
                        let PinCtrl { set_base, set_count, .. } = self.pinctrl;
                        Self::write_pins(pins, set_base, set_count, value, false);
                    }
                    SetDest::PinDirs => {
                        let PinCtrl { set_base, set_count, .. } = self.pinctrl;
                        Self::write_pins(pins, set_base, set_count, value, true);
                    }
                    SetDest::X => self.x = value,
                    SetDest::Y => self.y = value,
                }
                Flow::Next
            }
        }
    }

    fn next_pc(&self) -> u8 {
        if self.pc == self.execctrl.wrap_top {
            self.execctrl.wrap_bottom
        } else {
            (self.pc + 1) & 0x1F
        }
    }
}

fn low_mask(count: u8) -> u32 {
    if count >= 32 {
        u32::MAX
    } else {
        (1u32 << count) - 1
    }
}
