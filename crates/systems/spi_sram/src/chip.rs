// crates/systems/spi_sram/src/chip.rs
use crate::memory::MemoryArray;
use bitflags::bitflags;
use rp_dma::{Dma, DmaBus};
use rp_pio::Pio;
use sram_core::{Core, DataSize, MemoryBus, PinBank};

// RP2040-like Memory Map (as seen by the DMA)
// $0000_0000 - ...        : Emulated SRAM array (1 << addr_bits bytes)
// $5000_0000 - $5000_3FFF : DMA registers (+ atomic aliases)
// $5020_0000 - $5020_0FFF : PIO0
// $5030_0000 - $5030_0FFF : PIO1
// Everything else -> open bus (reads 0, writes dropped)

pub const PIO0_BASE: u32 = 0x5020_0000;
pub const PIO1_BASE: u32 = 0x5030_0000;
const PIO_WINDOW: u32 = 0x1000;

pub const fn pio_base(index: usize) -> u32 {
    if index == 0 {
        PIO0_BASE
    } else {
        PIO1_BASE
    }
}

bitflags! {
    /// BUSCTRL BUS_PRIORITY.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BusPriority: u32 {
        const PROC0 = 1 << 0;
        const PROC1 = 1 << 4;
        const DMA_R = 1 << 8;
        const DMA_W = 1 << 12;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetReason {
    #[default]
    PowerOn,
    /// SRAM contents survive this one.
    Watchdog,
}

// ============================================================================
//  GPIO
// ============================================================================

/// Pad levels: external drivers on inputs, the PIO output latch on pins
/// whose output enable is set.
#[derive(Debug, Default)]
pub struct Gpio {
    input: u32,
    out: u32,
    oe: u32,
}

impl Gpio {
    /// Level driven from outside the chip (the SPI master).
    pub fn set_input(&mut self, pin: u8, level: bool) {
        let bit = 1u32 << (pin & 31);
        if level {
            self.input |= bit;
        } else {
            self.input &= !bit;
        }
    }

    /// `gpio_get`
    pub fn get(&self, pin: u8) -> bool {
        self.level(pin)
    }

    /// `gpio_set_dir`
    pub fn set_output_enabled(&mut self, pin: u8, enabled: bool) {
        let bit = 1u32 << (pin & 31);
        self.set_dirs(bit, if enabled { bit } else { 0 });
    }
}

impl PinBank for Gpio {
    fn levels(&self) -> u32 {
        (self.input & !self.oe) | (self.out & self.oe)
    }

    fn drive(&mut self, mask: u32, values: u32) {
        self.out = (self.out & !mask) | (values & mask);
    }

    fn set_dirs(&mut self, mask: u32, dirs: u32) {
        self.oe = (self.oe & !mask) | (dirs & mask);
    }
}

// ============================================================================
//  PERIPHERALS (what core 1 firmware can touch)
// ============================================================================

pub struct Peripherals {
    pub gpio: Gpio,
    pub pio: [Pio; 2],
    pub dma: Dma,
    pub bus_priority: BusPriority,
}

impl Default for Peripherals {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripherals {
    pub fn new() -> Self {
        Self {
            gpio: Gpio::default(),
            pio: [Pio::new(0), Pio::new(1)],
            dma: Dma::new(),
            bus_priority: BusPriority::empty(),
        }
    }
}

// ============================================================================
//  SYSTEM BUS (DMA view)
// ============================================================================

struct SystemBus<'a> {
    pio: &'a mut [Pio; 2],
    ram: &'a mut MemoryArray,
}

impl SystemBus<'_> {
    fn pio_window(addr: u32) -> Option<(usize, u32)> {
        [PIO0_BASE, PIO1_BASE]
            .iter()
            .position(|&base| addr.wrapping_sub(base) < PIO_WINDOW)
            .map(|index| (index, (addr - pio_base(index)) & !3))
    }
}

impl MemoryBus for SystemBus<'_> {
    fn read(&mut self, addr: u32) -> u8 {
        self.read_sized(addr, DataSize::Byte) as u8
    }

    fn write(&mut self, addr: u32, val: u8) {
        self.write_sized(addr, DataSize::Byte, val as u32)
    }

    // Peripheral registers are 32 bits wide: one access per transfer, narrow
    // reads pick a lane, narrow writes replicate.
    fn read_sized(&mut self, addr: u32, size: DataSize) -> u32 {
        if let Some((index, offset)) = Self::pio_window(addr) {
            let word = self.pio[index].read_reg(offset);
            return size.lane(word, addr);
        }
        let mut value = 0u32;
        for i in 0..size.bytes() {
            value |= (self.ram.read(addr.wrapping_add(i)) as u32) << (8 * i);
        }
        value
    }

    fn write_sized(&mut self, addr: u32, size: DataSize, val: u32) {
        if let Some((index, offset)) = Self::pio_window(addr) {
            self.pio[index].write_reg(offset, size.replicate(val));
            return;
        }
        for i in 0..size.bytes() {
            self.ram.write(addr.wrapping_add(i), (val >> (8 * i)) as u8);
        }
    }
}

impl DmaBus for SystemBus<'_> {
    fn dreq(&self, treq: u8) -> bool {
        let index = (treq / 8) as usize;
        let sm = (treq % 4) as usize;
        match self.pio.get(index) {
            Some(pio) if treq % 8 < 4 => pio.tx_dreq(sm),
            Some(pio) => pio.rx_dreq(sm),
            None => false,
        }
    }
}

// ============================================================================
//  CHIP
// ============================================================================

/// Two-core microcontroller model. Core 0 is whoever owns the `Chip` (the
/// test or the binary); core 1 runs whatever firmware `launch_core1` got.
pub struct Chip {
    pub hw: Peripherals,
    ram: MemoryArray,
    core1: Option<Box<dyn Core<Hw = Peripherals>>>,
    core1_stall: u32,
    reset_reason: ResetReason,
    cycles: u64,
}

impl Default for Chip {
    fn default() -> Self {
        Self::new()
    }
}

impl Chip {
    pub fn new() -> Self {
        Self {
            hw: Peripherals::new(),
            ram: MemoryArray::empty(),
            core1: None,
            core1_stall: 0,
            reset_reason: ResetReason::PowerOn,
            cycles: 0,
        }
    }

    pub fn reset_reason(&self) -> ResetReason {
        self.reset_reason
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn ram(&self) -> &MemoryArray {
        &self.ram
    }

    /// Core 0 owns the array only until core 1 starts serving the bus.
    pub fn ram_mut(&mut self) -> Option<&mut MemoryArray> {
        if self.core1.is_some() {
            None
        } else {
            Some(&mut self.ram)
        }
    }

    pub fn core1_running(&self) -> bool {
        self.core1.is_some()
    }

    pub fn core1_state(&self) -> Option<&'static str> {
        self.core1.as_ref().map(|core| core.state_name())
    }

    /// `multicore_launch_core1`
    pub fn launch_core1(&mut self, mut core: Box<dyn Core<Hw = Peripherals>>) {
        core.reset();
        self.core1 = Some(core);
        self.core1_stall = 0;
    }

    /// Peripherals and cores restart; the SRAM array keeps its contents.
    pub fn watchdog_reboot(&mut self) {
        self.hw = Peripherals::new();
        self.core1 = None;
        self.core1_stall = 0;
        self.reset_reason = ResetReason::Watchdog;
        log::info!("chip: watchdog reboot after {} cycles", self.cycles);
    }

    /// Advances every block by one system clock.
    pub fn tick(&mut self) {
        for block in self.hw.pio.iter_mut() {
            block.step(&mut self.hw.gpio);
        }

        let dma_first = self
            .hw
            .bus_priority
            .contains(BusPriority::DMA_R | BusPriority::DMA_W);
        if dma_first {
            self.step_dma();
            self.step_core1();
        } else if !self.step_core1() {
            // Core 1 won the fabric this cycle
            self.step_dma();
        }
        self.cycles += 1;
    }

    pub fn run(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    fn step_dma(&mut self) {
        let mut bus = SystemBus {
            pio: &mut self.hw.pio,
            ram: &mut self.ram,
        };
        self.hw.dma.step(&mut bus);
    }

    /// Returns true when core 1 used the bus fabric this cycle.
    fn step_core1(&mut self) -> bool {
        let Some(core) = self.core1.as_mut() else {
            return false;
        };
        if self.core1_stall > 0 {
            self.core1_stall -= 1;
            return false;
        }
        let cycles = core.step(&mut self.hw);
        self.core1_stall = cycles.saturating_sub(1);
        core.holds_fabric()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rp_dma::ChannelConfig;

    /// Firmware that grabs the fabric every cycle.
    struct Hog;

    impl Core for Hog {
        type Hw = Peripherals;
        fn reset(&mut self) {}
        fn step(&mut self, _hw: &mut Peripherals) -> u32 {
            1
        }
        fn holds_fabric(&self) -> bool {
            true
        }
        fn state_name(&self) -> &'static str {
            "Hog"
        }
    }

    #[test]
    fn output_enable_selects_driver() {
        let mut gpio = Gpio::default();
        gpio.set_input(5, true);
        assert!(gpio.get(5));
        gpio.drive(1 << 5, 0);
        gpio.set_output_enabled(5, true);
        assert!(!gpio.get(5));
        gpio.set_output_enabled(5, false);
        assert!(gpio.get(5));
    }

    #[test]
    fn dma_priority_beats_core1() {
        let mut chip = Chip::new();
        if let Some(ram) = chip.ram_mut() {
            *ram = MemoryArray::new(16);
            ram.fill_pattern();
        }
        let mut config = ChannelConfig::default_for(1);
        config.set_bswap(true);
        config.set_dreq(chip.hw.pio[0].dreq(1, true));
        chip.hw
            .dma
            .configure(1, &config, PIO0_BASE + rp_pio::regs::txf(1), 0x10, 6, true);

        chip.launch_core1(Box::new(Hog));
        assert!(chip.ram_mut().is_none());
        chip.run(8);
        assert_eq!(chip.hw.pio[0].sm(1).tx_level(), 0);

        chip.hw.bus_priority = BusPriority::DMA_R | BusPriority::DMA_W;
        chip.run(8);
        // Four words fill the FIFO; DREQ holds back the other two
        assert_eq!(chip.hw.pio[0].sm(1).tx_level(), 4);
        assert_eq!(chip.hw.dma.channel(1).trans_count, 2);
        assert_eq!(chip.core1_state(), Some("Hog"));
    }

    #[test]
    fn watchdog_keeps_ram() {
        let mut chip = Chip::new();
        if let Some(ram) = chip.ram_mut() {
            *ram = MemoryArray::new(16);
            ram.write(0x42, 0x99);
        }
        chip.launch_core1(Box::new(Hog));
        chip.run(3);
        chip.watchdog_reboot();
        assert_eq!(chip.cycles(), 3);
        assert_eq!(chip.reset_reason(), ResetReason::Watchdog);
        assert!(!chip.core1_running());
        assert_eq!(chip.ram().read(0x42), 0x99);
        assert!(chip.hw.bus_priority.is_empty());
    }
}
