// crates/systems/spi_sram/src/config.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
//  LIMITS
// ============================================================================

pub const NUM_GPIO: u8 = 30;
pub const MIN_ADDR_BITS: u8 = 16;
pub const MAX_ADDR_BITS: u8 = 24;
pub const DEFAULT_ADDR_BITS: u8 = 16;

// ============================================================================
//  CONFIG TYPES
// ============================================================================

/// GPIOs of the four bus signals. The read program addresses SCK and CS
/// relative to MOSI, hence the fixed layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiPins {
    pub mosi: u8,
    pub sck: u8, // MOSI + 1
    pub cs: u8,  // MOSI + 2
    pub miso: u8,
}

impl Default for SpiPins {
    fn default() -> Self {
        Self {
            mosi: 2,
            sck: 3,
            cs: 4,
            miso: 5,
        }
    }
}

/// One PIO state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmSlot {
    pub pio: u8,
    pub sm: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialContents {
    /// `mem[n] = n mod 256`
    #[default]
    Pattern,
    Zeroed,
    /// Raw bytes copied to address 0.
    Image(PathBuf),
}

/// Hardware resources and bus layout of the emulated SRAM.
///
/// Resources are fixed rather than looked up at run time; `validate` only
/// checks they do not collide with each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SramConfig {
    pub addr_bits: u8,
    pub pins: SpiPins,
    pub read_sm: SmSlot,
    pub write_sm: SmSlot,
    pub rx_channel: usize,
    pub tx_channel: usize,
    pub handoff_channel: usize,
    pub initial_contents: InitialContents,
}

impl Default for SramConfig {
    fn default() -> Self {
        Self {
            addr_bits: DEFAULT_ADDR_BITS,
            pins: SpiPins::default(),
            read_sm: SmSlot { pio: 1, sm: 1 },
            write_sm: SmSlot { pio: 0, sm: 1 },
            rx_channel: 0,
            tx_channel: 1,
            handoff_channel: 2,
            initial_contents: InitialContents::Pattern,
        }
    }
}

// ============================================================================
//  ERRORS
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("address width {0} is outside 16..=24")]
    AddressWidth(u8),
    #[error("SCK must be MOSI+1 and CS MOSI+2 (MOSI={mosi} SCK={sck} CS={cs})")]
    PinLayout { mosi: u8, sck: u8, cs: u8 },
    #[error("GPIO {0} does not exist")]
    NoSuchPin(u8),
    #[error("MISO on GPIO {0} overlaps an input signal")]
    MisoOverlap(u8),
    #[error("PIO{pio} SM{sm} does not exist")]
    NoSuchSm { pio: u8, sm: u8 },
    #[error("read and write programs do not fit one PIO block (both on PIO{0})")]
    SharedPioBlock(u8),
    #[error("DMA channel {0} does not exist")]
    NoSuchChannel(usize),
    #[error("DMA channel {0} is assigned twice")]
    ChannelCollision(usize),
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

// ============================================================================
//  VALIDATION / LOADING
// ============================================================================

impl SramConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_ADDR_BITS..=MAX_ADDR_BITS).contains(&self.addr_bits) {
            return Err(ConfigError::AddressWidth(self.addr_bits));
        }

        let SpiPins { mosi, sck, cs, miso } = self.pins;
        if sck != mosi.wrapping_add(1) || cs != mosi.wrapping_add(2) {
            return Err(ConfigError::PinLayout { mosi, sck, cs });
        }
        for pin in [mosi, sck, cs, miso] {
            if pin >= NUM_GPIO {
                return Err(ConfigError::NoSuchPin(pin));
            }
        }
        if (mosi..=cs).contains(&miso) {
            return Err(ConfigError::MisoOverlap(miso));
        }

        for slot in [self.read_sm, self.write_sm] {
            if slot.pio > 1 || slot.sm as usize >= rp_pio::NUM_STATE_MACHINES {
                return Err(ConfigError::NoSuchSm {
                    pio: slot.pio,
                    sm: slot.sm,
                });
            }
        }
        if self.read_sm.pio == self.write_sm.pio {
            return Err(ConfigError::SharedPioBlock(self.read_sm.pio));
        }

        let channels = [self.rx_channel, self.tx_channel, self.handoff_channel];
        for (i, &ch) in channels.iter().enumerate() {
            if ch >= rp_dma::NUM_CHANNELS {
                return Err(ConfigError::NoSuchChannel(ch));
            }
            if channels[..i].contains(&ch) {
                return Err(ConfigError::ChannelCollision(ch));
            }
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        let config: SramConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
