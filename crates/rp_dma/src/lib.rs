// crates/rp_dma/src/lib.rs
// DMA controller: 12 channels, register aliases with trigger semantics,
// DREQ pacing, byte swap and channel chaining.

use bitflags::bitflags;
use sram_core::{DataSize, MemoryBus};
use thiserror::Error;

// ============================================================================
//  CONSTANTS
// ============================================================================

pub const NUM_CHANNELS: usize = 12;

/// Where the controller's own registers sit in the bus address space.
pub const DMA_BASE: u32 = 0x5000_0000;
/// Register block plus its XOR/SET/CLR atomic aliases.
pub const DMA_WINDOW: u32 = 0x4000;

/// TREQ_SEL value for an unpaced channel.
pub const TREQ_PERMANENT: u8 = 0x3F;

pub mod regs {
    pub const CH_STRIDE: u32 = 0x40;

    pub const READ_ADDR: u32 = 0x00;
    pub const WRITE_ADDR: u32 = 0x04;
    pub const TRANS_COUNT: u32 = 0x08;
    pub const CTRL_TRIG: u32 = 0x0C;
    pub const AL1_CTRL: u32 = 0x10;
    pub const AL1_READ_ADDR: u32 = 0x14;
    pub const AL1_WRITE_ADDR: u32 = 0x18;
    pub const AL1_TRANS_COUNT_TRIG: u32 = 0x1C;
    pub const AL2_CTRL: u32 = 0x20;
    pub const AL2_TRANS_COUNT: u32 = 0x24;
    pub const AL2_READ_ADDR: u32 = 0x28;
    pub const AL2_WRITE_ADDR_TRIG: u32 = 0x2C;
    pub const AL3_CTRL: u32 = 0x30;
    pub const AL3_WRITE_ADDR: u32 = 0x34;
    pub const AL3_TRANS_COUNT: u32 = 0x38;
    pub const AL3_READ_ADDR_TRIG: u32 = 0x3C;

    pub const MULTI_CHAN_TRIGGER: u32 = 0x430;
    pub const CHAN_ABORT: u32 = 0x444;

    // Atomic register aliases (hw_xor_bits / hw_set_bits / hw_clear_bits)
    pub const ALIAS_XOR: u32 = 0x1000;
    pub const ALIAS_SET: u32 = 0x2000;
    pub const ALIAS_CLR: u32 = 0x3000;

    /// Offset of a channel register block.
    pub const fn ch(channel: usize) -> u32 {
        channel as u32 * CH_STRIDE
    }

    /// Absolute bus address of a channel register, as another bus master
    /// (or a chained channel) would target it.
    pub const fn ch_addr(channel: usize, reg: u32) -> u32 {
        super::DMA_BASE + ch(channel) + reg
    }
}

bitflags! {
    /// CHx_CTRL_TRIG.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ctrl: u32 {
        const EN            = 1 << 0;
        const HIGH_PRIORITY = 1 << 1;
        const DATA_SIZE     = 0x3 << 2;
        const INCR_READ     = 1 << 4;
        const INCR_WRITE    = 1 << 5;
        const RING_SIZE     = 0xF << 6;
        const RING_SEL      = 1 << 10;
        const CHAIN_TO      = 0xF << 11;
        const TREQ_SEL      = 0x3F << 15;
        const IRQ_QUIET     = 1 << 21;
        const BSWAP         = 1 << 22;
        const SNIFF_EN      = 1 << 23;
        const BUSY          = 1 << 24; // read only
    }
}

impl Ctrl {
    pub const DATA_SIZE_LSB: u32 = 2;
    pub const CHAIN_TO_LSB: u32 = 11;
    pub const TREQ_SEL_LSB: u32 = 15;

    pub fn data_size(self) -> DataSize {
        DataSize::from_bits(self.bits() >> Self::DATA_SIZE_LSB)
    }

    pub fn chain_to(self) -> usize {
        ((self.bits() >> Self::CHAIN_TO_LSB) & 0xF) as usize
    }

    pub fn treq(self) -> u8 {
        ((self.bits() >> Self::TREQ_SEL_LSB) & 0x3F) as u8
    }

    fn with_field(self, field: Ctrl, lsb: u32, value: u32) -> Self {
        let bits = (self.bits() & !field.bits()) | ((value << lsb) & field.bits());
        Self::from_bits_retain(bits)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DmaError {
    #[error("DMA channel {0} is already claimed")]
    ChannelClaimed(usize),
    #[error("there is no DMA channel {0}")]
    NoSuchChannel(usize),
}

/// The address space a channel moves data through, plus the DREQ lines
/// that pace it.
pub trait DmaBus: MemoryBus {
    fn dreq(&self, treq: u8) -> bool;
}

// ============================================================================
//  CHANNEL CONFIG (dma_channel_config)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    ctrl: Ctrl,
}

impl ChannelConfig {
    /// `dma_channel_get_default_config`: enabled, 32-bit, read increment,
    /// unpaced, chained to itself (no chaining).
    pub fn default_for(channel: usize) -> Self {
        let ctrl = (Ctrl::EN | Ctrl::INCR_READ)
            .with_field(Ctrl::DATA_SIZE, Ctrl::DATA_SIZE_LSB, DataSize::Word.bits())
            .with_field(Ctrl::CHAIN_TO, Ctrl::CHAIN_TO_LSB, channel as u32)
            .with_field(Ctrl::TREQ_SEL, Ctrl::TREQ_SEL_LSB, TREQ_PERMANENT as u32);
        Self { ctrl }
    }

    pub fn set_transfer_data_size(&mut self, size: DataSize) {
        self.ctrl = self.ctrl.with_field(Ctrl::DATA_SIZE, Ctrl::DATA_SIZE_LSB, size.bits());
    }

    pub fn set_read_increment(&mut self, incr: bool) {
        self.ctrl.set(Ctrl::INCR_READ, incr);
    }

    pub fn set_write_increment(&mut self, incr: bool) {
        self.ctrl.set(Ctrl::INCR_WRITE, incr);
    }

    pub fn set_dreq(&mut self, treq: u8) {
        self.ctrl = self.ctrl.with_field(Ctrl::TREQ_SEL, Ctrl::TREQ_SEL_LSB, treq as u32);
    }

    pub fn set_chain_to(&mut self, channel: usize) {
        self.ctrl = self.ctrl.with_field(Ctrl::CHAIN_TO, Ctrl::CHAIN_TO_LSB, channel as u32);
    }

    pub fn set_bswap(&mut self, bswap: bool) {
        self.ctrl.set(Ctrl::BSWAP, bswap);
    }

    pub fn set_enable(&mut self, enable: bool) {
        self.ctrl.set(Ctrl::EN, enable);
    }

    pub fn ctrl(&self) -> Ctrl {
        self.ctrl
    }
}

// ============================================================================
//  CHANNEL STATE
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct Channel {
    pub read_addr: u32,
    pub write_addr: u32,
    /// Transfers left in the current run.
    pub trans_count: u32,
    /// Written through TRANS_COUNT; loaded into `trans_count` on trigger.
    pub trans_count_reload: u32,
    pub ctrl: Ctrl,
    busy: bool,
}

impl Channel {
    pub fn is_busy(&self) -> bool {
        self.busy
    }
}

// ============================================================================
//  CONTROLLER
// ============================================================================

pub struct Dma {
    channels: [Channel; NUM_CHANNELS],
    claimed: u16,
    /// Total transfers performed, for diagnostics.
    pub transfers: u64,
}

impl Default for Dma {
    fn default() -> Self {
        Self::new()
    }
}

impl Dma {
    pub fn new() -> Self {
        Self {
            channels: [Channel::default(); NUM_CHANNELS],
            claimed: 0,
            transfers: 0,
        }
    }

    pub fn channel_claim(&mut self, channel: usize) -> Result<(), DmaError> {
        if channel >= NUM_CHANNELS {
            return Err(DmaError::NoSuchChannel(channel));
        }
        if self.claimed & (1 << channel) != 0 {
            return Err(DmaError::ChannelClaimed(channel));
        }
        self.claimed |= 1 << channel;
        Ok(())
    }

    pub fn is_claimed(&self, channel: usize) -> bool {
        channel < NUM_CHANNELS && self.claimed & (1 << channel) != 0
    }

    pub fn channel(&self, channel: usize) -> &Channel {
        &self.channels[channel]
    }

    pub fn is_busy(&self, channel: usize) -> bool {
        self.channels[channel].busy
    }

    /// `dma_channel_configure`: addresses, count, then the control word
    /// through CTRL_TRIG or the non-triggering AL1_CTRL.
    pub fn configure(
        &mut self,
        channel: usize,
        config: &ChannelConfig,
        write_addr: u32,
        read_addr: u32,
        count: u32,
        trigger: bool,
    ) {
        let base = regs::ch(channel);
        self.write_reg(base + regs::READ_ADDR, read_addr);
        self.write_reg(base + regs::WRITE_ADDR, write_addr);
        self.write_reg(base + regs::TRANS_COUNT, count);
        let ctrl_reg = if trigger { regs::CTRL_TRIG } else { regs::AL1_CTRL };
        self.write_reg(base + ctrl_reg, config.ctrl.bits());
    }

    /// `dma_channel_start`, through MULTI_CHAN_TRIGGER.
    pub fn start(&mut self, channel: usize) {
        self.write_reg(regs::MULTI_CHAN_TRIGGER, 1 << channel);
    }

    /// `dma_channel_abort`. Transfers are never in flight across ticks, so
    /// the channel is idle as soon as this returns.
    pub fn abort(&mut self, channel: usize) {
        self.write_reg(regs::CHAN_ABORT, 1 << channel);
    }

    fn trigger(&mut self, channel: usize) {
        let ch = &mut self.channels[channel];
        if !ch.ctrl.contains(Ctrl::EN) {
            return;
        }
        ch.trans_count = ch.trans_count_reload;
        ch.busy = ch.trans_count > 0;
        log::trace!(
            "dma ch{}: trigger read={:08X} write={:08X} count={}",
            channel,
            ch.read_addr,
            ch.write_addr,
            ch.trans_count
        );
    }

    // --- Register window ---

    pub fn read_reg(&self, offset: u32) -> u32 {
        let reg = offset & 0x0FFF;
        if reg >= regs::ch(NUM_CHANNELS) {
            return 0;
        }
        let ch = &self.channels[(reg / regs::CH_STRIDE) as usize];
        match reg % regs::CH_STRIDE {
            regs::READ_ADDR | regs::AL1_READ_ADDR | regs::AL2_READ_ADDR
            | regs::AL3_READ_ADDR_TRIG => ch.read_addr,
            regs::WRITE_ADDR | regs::AL1_WRITE_ADDR | regs::AL2_WRITE_ADDR_TRIG
            | regs::AL3_WRITE_ADDR => ch.write_addr,
            regs::TRANS_COUNT | regs::AL1_TRANS_COUNT_TRIG | regs::AL2_TRANS_COUNT
            | regs::AL3_TRANS_COUNT => ch.trans_count,
            _ => {
                let mut ctrl = ch.ctrl;
                ctrl.set(Ctrl::BUSY, ch.busy);
                ctrl.bits()
            }
        }
    }

    /// Word write into the register window, atomic aliases included.
    pub fn write_reg(&mut self, offset: u32, value: u32) {
        let reg = offset & 0x0FFF;
        let value = match offset & 0x3000 {
            0 => value,
            regs::ALIAS_XOR => self.read_reg(reg) ^ value,
            regs::ALIAS_SET => self.read_reg(reg) | value,
            _ => self.read_reg(reg) & !value,
        };

        match reg {
            regs::MULTI_CHAN_TRIGGER => {
                for channel in 0..NUM_CHANNELS {
                    if value & (1 << channel) != 0 {
                        self.trigger(channel);
                    }
                }
            }
            regs::CHAN_ABORT => {
                for channel in 0..NUM_CHANNELS {
                    if value & (1 << channel) != 0 {
                        self.channels[channel].busy = false;
                        log::trace!("dma ch{}: abort", channel);
                    }
                }
            }
            r if r < regs::ch(NUM_CHANNELS) => {
                self.write_channel_reg((r / regs::CH_STRIDE) as usize, r % regs::CH_STRIDE, value)
            }
            _ => log::trace!("dma: write to unmapped register {:03X}", reg),
        }
    }

    fn write_channel_reg(&mut self, channel: usize, reg: u32, value: u32) {
        let ch = &mut self.channels[channel];
        match reg {
            regs::READ_ADDR | regs::AL1_READ_ADDR | regs::AL2_READ_ADDR
            | regs::AL3_READ_ADDR_TRIG => ch.read_addr = value,
            regs::WRITE_ADDR | regs::AL1_WRITE_ADDR | regs::AL2_WRITE_ADDR_TRIG
            | regs::AL3_WRITE_ADDR => ch.write_addr = value,
            regs::TRANS_COUNT | regs::AL1_TRANS_COUNT_TRIG | regs::AL2_TRANS_COUNT
            | regs::AL3_TRANS_COUNT => ch.trans_count_reload = value,
            _ => ch.ctrl = Ctrl::from_bits_retain(value & !Ctrl::BUSY.bits()),
        }
        if matches!(
            reg,
            regs::CTRL_TRIG
                | regs::AL1_TRANS_COUNT_TRIG
                | regs::AL2_WRITE_ADDR_TRIG
                | regs::AL3_READ_ADDR_TRIG
        ) {
            self.trigger(channel);
        }
    }

    // --- Clock ---

    /// One system clock: every busy channel whose DREQ is asserted moves one
    /// unit, lowest channel first. Writes landing in the controller's own
    /// window are handled here and never reach `bus`.
    pub fn step(&mut self, bus: &mut dyn DmaBus) {
        for channel in 0..NUM_CHANNELS {
            let ch = self.channels[channel];
            if !ch.busy {
                continue;
            }
            let treq = ch.ctrl.treq();
            if treq != TREQ_PERMANENT && !bus.dreq(treq) {
                continue;
            }
            self.transfer(channel, bus);
        }
    }

    fn transfer(&mut self, channel: usize, bus: &mut dyn DmaBus) {
        let ch = self.channels[channel];
        let size = ch.ctrl.data_size();

        let mut value = self.bus_read(bus, ch.read_addr, size);
        if ch.ctrl.contains(Ctrl::BSWAP) {
            value = match size {
                DataSize::Word => value.swap_bytes(),
                DataSize::HalfWord => (value as u16).swap_bytes() as u32,
                DataSize::Byte => value,
            };
        }

        let done = {
            let c = &mut self.channels[channel];
            if c.ctrl.contains(Ctrl::INCR_READ) {
                c.read_addr = c.read_addr.wrapping_add(size.bytes());
            }
            if c.ctrl.contains(Ctrl::INCR_WRITE) {
                c.write_addr = c.write_addr.wrapping_add(size.bytes());
            }
            c.trans_count -= 1;
            if c.trans_count == 0 {
                c.busy = false;
            }
            c.trans_count == 0
        };
        self.transfers += 1;

        self.bus_write(bus, ch.write_addr, size, value);

        if done {
            let chain = ch.ctrl.chain_to();
            if chain != channel {
                self.trigger(chain);
            }
        }
    }

    fn bus_read(&self, bus: &mut dyn DmaBus, addr: u32, size: DataSize) -> u32 {
        if addr.wrapping_sub(DMA_BASE) < DMA_WINDOW {
            let word = self.read_reg((addr - DMA_BASE) & !3);
            return size.lane(word, addr);
        }
        bus.read_sized(addr, size)
    }

    fn bus_write(&mut self, bus: &mut dyn DmaBus, addr: u32, size: DataSize, value: u32) {
        if addr.wrapping_sub(DMA_BASE) < DMA_WINDOW {
            self.write_reg((addr - DMA_BASE) & !3, size.replicate(value));
            return;
        }
        bus.write_sized(addr, size, value);
    }
}
