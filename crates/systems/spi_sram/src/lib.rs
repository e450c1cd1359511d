// crates/systems/spi_sram/src/lib.rs
// Emulated SPI SRAM on a cycle-stepped two-core microcontroller: two PIO
// shifters, three DMA channels and a command dispatcher on core 1.

pub mod chip;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod master;
pub mod memory;
pub mod pipeline;
pub mod programs;
pub mod sram;

pub use chip::{BusPriority, Chip, Peripherals, ResetReason};
pub use command::Command;
pub use config::{ConfigError, InitialContents, LoadError, SmSlot, SpiPins, SramConfig};
pub use master::SpiMaster;
pub use memory::MemoryArray;
pub use pipeline::WriteMode;
pub use sram::{setup_simulated_sram, SetupError, SramHandle};
