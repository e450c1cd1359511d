// crates/systems/spi_sram/src/pipeline.rs
// The two halves of the bus as the dispatcher sees them: a state machine,
// its program offset and the DMA channels hanging off its FIFO.
use crate::chip::{pio_base, Peripherals};
use crate::programs;
use rp_dma::{regs, ChannelConfig, Ctrl};
use rp_pio::{encode_jmp, Pio, ShiftCtrl};
use sram_core::DataSize;

/// Transfer count a channel is armed with: enough to cover the whole array
/// in either width. Every transaction normally ends in an abort first.
pub fn transfer_len(addr_bits: u8) -> u32 {
    1u32 << addr_bits
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// 32-bit words, byte swapped, data right after the address.
    Normal,
    /// Single bytes after eight dummy clocks.
    FastRead,
}

/// Disable, flush, rewind to `offset`, enable.
fn reset_sm(pio: &mut Pio, sm: usize, offset: u8) {
    pio.sm_set_enabled(sm, false);
    pio.sm_clear_fifos(sm);
    pio.sm_restart(sm);
    pio.sm_exec(sm, encode_jmp(offset));
    pio.sm_set_enabled(sm, true);
}

// ============================================================================
//  READ PIPELINE (MOSI)
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct ReadPipeline {
    pub pio: usize,
    pub sm: usize,
    pub offset: u8,
    pub rx_channel: usize,
}

impl ReadPipeline {
    /// Bus address of the RX FIFO.
    pub fn rx_fifo(&self) -> u32 {
        pio_base(self.pio) + rp_pio::regs::rxf(self.sm)
    }

    pub fn dreq(&self, hw: &Peripherals) -> u8 {
        hw.pio[self.pio].dreq(self.sm, false)
    }

    pub fn pop(&self, hw: &mut Peripherals) -> Option<u32> {
        hw.pio[self.pio].sm_get(self.sm)
    }

    pub fn rx_empty(&self, hw: &Peripherals) -> bool {
        hw.pio[self.pio].sm_is_rx_fifo_empty(self.sm)
    }

    pub fn pc(&self, hw: &Peripherals) -> u8 {
        hw.pio[self.pio].sm(self.sm).pc
    }

    pub fn reset(&self, hw: &mut Peripherals) {
        reset_sm(&mut hw.pio[self.pio], self.sm, self.offset);
    }

    /// Receive channel: RX FIFO bytes into the array. The write address
    /// (and the trigger) comes from the dispatcher.
    pub fn configure_rx_channel(&self, hw: &mut Peripherals, count: u32) {
        let mut config = ChannelConfig::default_for(self.rx_channel);
        config.set_transfer_data_size(DataSize::Byte);
        config.set_read_increment(false);
        config.set_write_increment(true);
        config.set_dreq(self.dreq(hw));
        hw.dma
            .configure(self.rx_channel, &config, 0, self.rx_fifo(), count, false);
    }
}

// ============================================================================
//  WRITE PIPELINE (MISO)
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct WritePipeline {
    pub pio: usize,
    pub sm: usize,
    pub offset: u8,
    pub tx_channel: usize,
    pub handoff_channel: usize,
}

impl WritePipeline {
    /// Bus address of the TX FIFO.
    pub fn tx_fifo(&self) -> u32 {
        pio_base(self.pio) + rp_pio::regs::txf(self.sm)
    }

    pub fn reset(&self, hw: &mut Peripherals) {
        reset_sm(&mut hw.pio[self.pio], self.sm, self.offset);
    }

    /// Send channel: array into the TX FIFO, whole words swapped so the
    /// lowest address leaves first. Triggered through its read address.
    pub fn configure_tx_channel(&self, hw: &mut Peripherals, count: u32) {
        let mut config = ChannelConfig::default_for(self.tx_channel);
        config.set_transfer_data_size(DataSize::Word);
        config.set_read_increment(true);
        config.set_write_increment(false);
        config.set_bswap(true);
        config.set_dreq(hw.pio[self.pio].dreq(self.sm, true));
        hw.dma
            .configure(self.tx_channel, &config, self.tx_fifo(), 0, count, false);
    }

    /// Hand-off channel: one address word from the read side's RX FIFO into
    /// the send channel's `AL3_READ_ADDR_TRIG`.
    pub fn wire_handoff(&self, hw: &mut Peripherals, read: &ReadPipeline) {
        let mut config = ChannelConfig::default_for(self.handoff_channel);
        config.set_transfer_data_size(DataSize::Word);
        config.set_read_increment(false);
        config.set_write_increment(false);
        config.set_dreq(read.dreq(hw));
        hw.dma.configure(
            self.handoff_channel,
            &config,
            regs::ch_addr(self.tx_channel, regs::AL3_READ_ADDR_TRIG),
            read.rx_fifo(),
            1,
            false,
        );
    }

    /// Switches the loop exit, the send width and the pull threshold
    /// together.
    pub fn apply_mode(&self, hw: &mut Peripherals, mode: WriteMode) {
        let ctrl = regs::ch(self.tx_channel) + regs::AL1_CTRL;
        let pio = &mut hw.pio[self.pio];
        match mode {
            WriteMode::FastRead => {
                pio.write_instr(
                    self.offset + programs::WRITE_LOOP_END,
                    encode_jmp(self.offset + programs::WRITE_FAST_READ),
                );
                hw.dma.write_reg(regs::ALIAS_CLR + ctrl, Ctrl::DATA_SIZE.bits());
                pio.sm_shiftctrl_set_bits(self.sm, 8 << ShiftCtrl::PULL_THRESH_LSB);
            }
            WriteMode::Normal => {
                pio.write_instr(
                    self.offset + programs::WRITE_LOOP_END,
                    encode_jmp(self.offset + programs::WRITE_DATA),
                );
                hw.dma.write_reg(
                    regs::ALIAS_SET + ctrl,
                    DataSize::Word.bits() << Ctrl::DATA_SIZE_LSB,
                );
                pio.sm_shiftctrl_clear_bits(self.sm, ShiftCtrl::PULL_THRESH.bits());
            }
        }
        log::trace!("write pipeline: {:?} mode", mode);
    }
}
