// crates/systems/spi_sram/src/master.rs
// Bit-banged SPI mode 0 master driving the chip's pads, for tests and the
// calibration sweep. Each frame advances the chip clock itself.
use crate::chip::Chip;
use crate::command;
use crate::config::{SpiPins, SramConfig};

/// Ticks with select high between two frames.
pub const DEFAULT_GAP: u32 = 32;

pub struct SpiMaster {
    pins: SpiPins,
    addr_bits: u8,
    half_period: u32,
    /// Ticks between select going low and the first clock.
    pub cs_setup: u32,
    /// Ticks between the last falling edge and select going high.
    pub cs_hold: u32,
    pub gap: u32,
    glitch_at: Option<usize>,
    abort_after: Option<usize>,
}

impl SpiMaster {
    pub fn new(config: &SramConfig, half_period: u32) -> Self {
        let half_period = half_period.max(1);
        Self {
            pins: config.pins,
            addr_bits: config.addr_bits,
            half_period,
            cs_setup: half_period,
            cs_hold: half_period,
            gap: DEFAULT_GAP,
            glitch_at: None,
            abort_after: None,
        }
    }

    pub fn half_period(&self) -> u32 {
        self.half_period
    }

    /// Bus at rest: select high, clock low. Runs one inter-frame gap.
    pub fn idle(&self, chip: &mut Chip) {
        let gpio = &mut chip.hw.gpio;
        gpio.set_input(self.pins.cs, true);
        gpio.set_input(self.pins.sck, false);
        gpio.set_input(self.pins.mosi, false);
        chip.run(self.gap);
    }

    /// Next frame pulses select high for one tick before bit `bit`.
    pub fn glitch_cs_at(&mut self, bit: usize) -> &mut Self {
        self.glitch_at = Some(bit);
        self
    }

    /// Next frame deselects after clocking `bits` bits.
    pub fn abort_after(&mut self, bits: usize) -> &mut Self {
        self.abort_after = Some(bits);
        self
    }

    /// Clocks `out` as one frame and returns what came back on MISO.
    pub fn raw(&mut self, chip: &mut Chip, out: &[u8]) -> Vec<u8> {
        let bits: Vec<bool> = out
            .iter()
            .flat_map(|&byte| (0..8).rev().map(move |i| (byte >> i) & 1 != 0))
            .collect();
        pack(&self.frame(chip, &bits))
    }

    pub fn read(&mut self, chip: &mut Chip, addr: u32, len: usize) -> Vec<u8> {
        self.transfer(chip, command::READ, addr, 0, &vec![0; len])
    }

    /// FAST_READ: eight dummy clocks between address and data.
    pub fn fast_read(&mut self, chip: &mut Chip, addr: u32, len: usize) -> Vec<u8> {
        self.transfer(chip, command::FAST_READ, addr, 8, &vec![0; len])
    }

    pub fn write(&mut self, chip: &mut Chip, addr: u32, data: &[u8]) {
        self.transfer(chip, command::WRITE, addr, 0, data);
    }

    /// Opcode, `addr_bits` address bits and `dummy` zero bits, then `data`.
    /// Returns the bytes clocked in during the data phase.
    fn transfer(&mut self, chip: &mut Chip, opcode: u8, addr: u32, dummy: usize, data: &[u8]) -> Vec<u8> {
        let addr_bits = self.addr_bits as usize;
        let mask = (1u64 << addr_bits) - 1;
        let header = ((opcode as u64) << addr_bits) | (addr as u64 & mask);

        let mut bits: Vec<bool> = (0..8 + addr_bits)
            .rev()
            .map(|i| (header >> i) & 1 != 0)
            .collect();
        bits.extend(std::iter::repeat(false).take(dummy));
        let skip = bits.len();
        bits.extend(
            data.iter()
                .flat_map(|&byte| (0..8).rev().map(move |i| (byte >> i) & 1 != 0)),
        );

        let sampled = self.frame(chip, &bits);
        pack(sampled.get(skip..).unwrap_or(&[]))
    }

    fn frame(&mut self, chip: &mut Chip, mosi: &[bool]) -> Vec<bool> {
        let glitch = self.glitch_at.take();
        let abort = self.abort_after.take();
        let SpiPins { mosi: mosi_pin, sck, cs, miso } = self.pins;

        chip.hw.gpio.set_input(sck, false);
        chip.hw.gpio.set_input(cs, false);
        chip.run(self.cs_setup);

        let mut sampled = Vec::with_capacity(mosi.len());
        for (i, &bit) in mosi.iter().enumerate() {
            if abort == Some(i) {
                break;
            }
            if glitch == Some(i) {
                chip.hw.gpio.set_input(cs, true);
                chip.tick();
                chip.hw.gpio.set_input(cs, false);
            }
            chip.hw.gpio.set_input(mosi_pin, bit);
            chip.run(self.half_period);
            // Mode 0: sample on the rising edge
            sampled.push(chip.hw.gpio.get(miso));
            chip.hw.gpio.set_input(sck, true);
            chip.run(self.half_period);
            chip.hw.gpio.set_input(sck, false);
        }

        chip.run(self.cs_hold);
        chip.hw.gpio.set_input(cs, true);
        chip.run(self.gap);
        sampled
    }
}

/// MSB-first bits to bytes; a trailing partial byte is dropped.
fn pack(bits: &[bool]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|chunk| chunk.iter().fold(0u8, |byte, &bit| (byte << 1) | bit as u8))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_is_msb_first() {
        let bits = [true, false, true, false, true, false, true, false, true];
        assert_eq!(pack(&bits), vec![0xAA]);
    }

    #[test]
    fn frame_without_firmware_reads_idle_line() {
        let mut chip = Chip::new();
        let mut master = SpiMaster::new(&SramConfig::default(), 4);
        master.idle(&mut chip);
        assert_eq!(master.raw(&mut chip, &[0x9F, 0x00]), vec![0x00, 0x00]);
        assert!(chip.hw.gpio.get(SramConfig::default().pins.cs));
    }
}
