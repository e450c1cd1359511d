// crates/systems/spi_sram/src/sram.rs
use crate::chip::{BusPriority, Chip, ResetReason};
use crate::config::{ConfigError, InitialContents, SramConfig};
use crate::dispatcher::Dispatcher;
use crate::memory::MemoryArray;
use crate::pipeline::{self, ReadPipeline, WritePipeline};
use crate::programs;
use rp_dma::DmaError;
use rp_pio::PioError;
use sram_core::{ImageError, MemoryImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("PIO: {0}")]
    Pio(#[from] PioError),
    #[error("DMA: {0}")]
    Dma(#[from] DmaError),
    #[error("initial contents: {0}")]
    Image(#[from] ImageError),
    #[error("core 1 is already running")]
    Core1Running,
}

/// Resources the running emulator holds.
#[derive(Debug, Clone)]
pub struct SramHandle {
    pub config: SramConfig,
    pub read: ReadPipeline,
    pub write: WritePipeline,
}

/// Brings up the emulated SRAM on `chip` and launches the dispatcher on
/// core 1. Nothing is launched when a resource cannot be claimed.
pub fn setup_simulated_sram(chip: &mut Chip, config: SramConfig) -> Result<SramHandle, SetupError> {
    config.validate()?;
    if chip.core1_running() {
        return Err(SetupError::Core1Running);
    }
    let addr_bits = config.addr_bits;
    let pins = config.pins;

    // Load the image before touching hardware so a bad file claims nothing
    let image = match &config.initial_contents {
        InitialContents::Image(path) => {
            let image = MemoryImage::from_file(path)?;
            image.check_fits(1usize << addr_bits)?;
            Some(image)
        }
        _ => None,
    };

    let hw = &mut chip.hw;

    // --- Read side: dynamic offset ---
    let read_slot = config.read_sm;
    let pio = &mut hw.pio[read_slot.pio as usize];
    pio.sm_claim(read_slot.sm as usize)?;
    let read_offset = pio.add_program(&programs::read_program())?;
    let read = ReadPipeline {
        pio: read_slot.pio as usize,
        sm: read_slot.sm as usize,
        offset: read_offset,
        rx_channel: config.rx_channel,
    };
    pio.sm_init(read.sm, read_offset, &programs::read_sm_config(read_offset, &pins));
    pio.write_instr(
        read_offset + programs::READ_SET_CMD_BITS,
        programs::read_cmd_bits_instr(addr_bits),
    );
    pio.write_instr(
        read_offset + programs::READ_INJECT_HIGH_BITS,
        programs::read_high_bits_instr(addr_bits),
    );

    // --- Write side: must sit at offset 0 ---
    let write_slot = config.write_sm;
    let pio = &mut hw.pio[write_slot.pio as usize];
    pio.sm_claim(write_slot.sm as usize)?;
    pio.add_program_at_offset(&programs::write_program(), 0)?;
    let write = WritePipeline {
        pio: write_slot.pio as usize,
        sm: write_slot.sm as usize,
        offset: 0,
        tx_channel: config.tx_channel,
        handoff_channel: config.handoff_channel,
    };
    pio.sm_init(write.sm, 0, &programs::write_sm_config(0, &pins));
    pio.write_instr(
        programs::WRITE_SET_ADDR_BITS,
        programs::write_addr_bits_instr(addr_bits),
    );
    hw.gpio.set_output_enabled(pins.miso, true);

    // --- DMA ---
    for channel in [config.rx_channel, config.tx_channel, config.handoff_channel] {
        hw.dma.channel_claim(channel)?;
    }
    let count = pipeline::transfer_len(addr_bits);
    read.configure_rx_channel(hw, count);
    write.configure_tx_channel(hw, count);
    write.wire_handoff(hw, &read);
    hw.bus_priority = BusPriority::DMA_R | BusPriority::DMA_W;

    hw.pio[read.pio].sm_set_enabled(read.sm, true);
    hw.pio[write.pio].sm_set_enabled(write.sm, true);

    // --- Contents ---
    let preserve = chip.reset_reason() == ResetReason::Watchdog && chip.ram().addr_bits() == addr_bits;
    let ram = chip.ram_mut().ok_or(SetupError::Core1Running)?;
    if preserve {
        log::info!("sram: watchdog reboot, keeping {} bytes", ram.len());
    } else {
        *ram = MemoryArray::new(addr_bits);
        match image {
            Some(image) => ram.load_image(&image)?,
            None if config.initial_contents == InitialContents::Pattern => ram.fill_pattern(),
            None => {}
        }
    }

    chip.launch_core1(Box::new(Dispatcher::new(read, write, pins.cs, addr_bits)));
    log::info!(
        "sram: {}-bit addresses, read PIO{} SM{} @{}, write PIO{} SM{} @0, DMA {}/{}/{}",
        addr_bits,
        read.pio,
        read.sm,
        read_offset,
        write.pio,
        write.sm,
        config.rx_channel,
        config.tx_channel,
        config.handoff_channel
    );

    Ok(SramHandle {
        config,
        read,
        write,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_every_resource() {
        let mut chip = Chip::new();
        let handle = setup_simulated_sram(&mut chip, SramConfig::default()).unwrap();
        assert!(chip.core1_running());
        assert!(chip.hw.pio[1].is_claimed(1));
        assert!(chip.hw.pio[0].is_claimed(1));
        assert!((0..3).all(|ch| chip.hw.dma.is_claimed(ch)));
        assert_eq!(handle.read.offset, 11);
        assert_eq!(chip.ram().len(), 65536);
        assert_eq!(chip.ram().read(0x1234), 0x34);
        assert!(chip.ram_mut().is_none());
    }

    #[test]
    fn channel_counts_cover_the_array() {
        let mut chip = Chip::new();
        let config = SramConfig {
            addr_bits: 24,
            initial_contents: InitialContents::Zeroed,
            ..SramConfig::default()
        };
        setup_simulated_sram(&mut chip, config).unwrap();
        assert_eq!(chip.hw.dma.channel(0).trans_count_reload, 1 << 24);
        assert_eq!(chip.hw.dma.channel(1).trans_count_reload, 1 << 24);
        assert_eq!(chip.hw.dma.channel(2).trans_count_reload, 1);
    }

    #[test]
    fn second_setup_is_refused() {
        let mut chip = Chip::new();
        setup_simulated_sram(&mut chip, SramConfig::default()).unwrap();
        assert!(matches!(
            setup_simulated_sram(&mut chip, SramConfig::default()),
            Err(SetupError::Core1Running)
        ));
    }

    #[test]
    fn claimed_channel_aborts_setup() {
        let mut chip = Chip::new();
        chip.hw.dma.channel_claim(1).unwrap();
        assert!(matches!(
            setup_simulated_sram(&mut chip, SramConfig::default()),
            Err(SetupError::Dma(DmaError::ChannelClaimed(1)))
        ));
        assert!(!chip.core1_running());
    }

    #[test]
    fn missing_image_claims_nothing() {
        let mut chip = Chip::new();
        let config = SramConfig {
            initial_contents: InitialContents::Image("/nonexistent/sram.bin".into()),
            ..SramConfig::default()
        };
        assert!(matches!(
            setup_simulated_sram(&mut chip, config),
            Err(SetupError::Image(ImageError::Io(_)))
        ));
        assert!(!chip.hw.pio[1].is_claimed(1));
    }
}
