// crates/systems/spi_sram/src/dispatcher.rs
// Core 1 firmware: waits for a command word, arms the pipelines for it and
// tears everything down once the master deselects.
use crate::chip::Peripherals;
use crate::command::Command;
use crate::pipeline::{ReadPipeline, WriteMode, WritePipeline};
use rp_dma::regs;
use sram_core::Core;

// Cycle cost of each kind of step
const POLL: u32 = 1;
const ARM: u32 = 2;
const MODE_SWITCH: u32 = 3;
const RESET: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle { seen_high: bool },
    Decode,
    ReadArm,
    FastReadArm,
    WriteArm,
    IgnoreUnknown(u32),
    AwaitAddress { cmd: Command, seen_high: bool },
    AwaitDeselect { cmd: Command, seen_high: bool },
    Drain,
    ResetPipelines,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Idle { .. } => "Idle",
            State::Decode => "Decode",
            State::ReadArm => "ReadArm",
            State::FastReadArm => "FastReadArm",
            State::WriteArm => "WriteArm",
            State::IgnoreUnknown(_) => "IgnoreUnknown",
            State::AwaitAddress { .. } => "AwaitAddress",
            State::AwaitDeselect { .. } => "AwaitDeselect",
            State::Drain => "Drain",
            State::ResetPipelines => "ResetPipelines",
        }
    }
}

pub struct Dispatcher {
    read: ReadPipeline,
    write: WritePipeline,
    cs_pin: u8,
    addr_bits: u8,
    state: State,
    fabric: bool,
}

impl Dispatcher {
    pub fn new(read: ReadPipeline, write: WritePipeline, cs_pin: u8, addr_bits: u8) -> Self {
        Self {
            read,
            write,
            cs_pin,
            addr_bits,
            state: State::Idle { seen_high: false },
            fabric: false,
        }
    }

    /// A single high sample is a glitch; two in a row are a deselect.
    fn deselected(&self, hw: &Peripherals, seen_high: bool) -> (bool, bool) {
        let high = hw.gpio.get(self.cs_pin);
        (high && seen_high, high)
    }

    fn teardown(&mut self, hw: &mut Peripherals, cmd: Command) -> (State, u32) {
        match cmd {
            Command::Read => {
                // The hand-off may still be armed if no address ever came
                hw.dma.abort(self.write.tx_channel);
                hw.dma.abort(self.write.handoff_channel);
                self.fabric = true;
                (State::ResetPipelines, ARM)
            }
            Command::FastRead => {
                hw.dma.abort(self.write.tx_channel);
                self.write.apply_mode(hw, WriteMode::Normal);
                self.fabric = true;
                (State::ResetPipelines, MODE_SWITCH)
            }
            Command::Write => (State::Drain, POLL),
            Command::Unknown(op) => {
                log::trace!("dispatcher: ignored opcode {:02X}", op);
                (State::ResetPipelines, POLL)
            }
        }
    }

    fn advance(&mut self, hw: &mut Peripherals) -> (State, u32) {
        match self.state {
            State::Idle { seen_high } => {
                if !self.read.rx_empty(hw) {
                    return (State::Decode, POLL);
                }
                let (deselected, high) = self.deselected(hw, seen_high);
                if deselected && self.read.pc(hw) != self.read.offset {
                    log::debug!("dispatcher: deselect inside a command byte");
                    return (State::ResetPipelines, POLL);
                }
                (State::Idle { seen_high: high }, POLL)
            }

            State::Decode => {
                let Some(word) = self.read.pop(hw) else {
                    return (State::Idle { seen_high: false }, POLL);
                };
                self.fabric = true;
                let cmd = Command::decode(word, self.addr_bits);
                log::debug!("dispatcher: {} (command word {:06X})", cmd.name(), word);
                let next = match cmd {
                    Command::Read => State::ReadArm,
                    Command::FastRead => State::FastReadArm,
                    Command::Write => State::WriteArm,
                    Command::Unknown(op) => State::IgnoreUnknown(op),
                };
                (next, POLL)
            }

            State::ReadArm => {
                // The address goes straight from the RX FIFO to the send channel
                hw.dma.start(self.write.handoff_channel);
                self.fabric = true;
                let next = State::AwaitDeselect {
                    cmd: Command::Read,
                    seen_high: false,
                };
                (next, ARM)
            }

            State::FastReadArm => {
                self.write.apply_mode(hw, WriteMode::FastRead);
                self.fabric = true;
                let next = State::AwaitAddress {
                    cmd: Command::FastRead,
                    seen_high: false,
                };
                (next, MODE_SWITCH)
            }

            State::WriteArm => {
                let next = State::AwaitAddress {
                    cmd: Command::Write,
                    seen_high: false,
                };
                (next, POLL)
            }

            State::IgnoreUnknown(op) => {
                let next = State::AwaitDeselect {
                    cmd: Command::Unknown(op),
                    seen_high: false,
                };
                (next, POLL)
            }

            State::AwaitAddress { cmd, seen_high } => {
                if let Some(addr) = self.read.pop(hw) {
                    self.fabric = true;
                    let trigger = match cmd {
                        Command::FastRead => {
                            regs::ch(self.write.tx_channel) + regs::AL3_READ_ADDR_TRIG
                        }
                        _ => regs::ch(self.read.rx_channel) + regs::AL2_WRITE_ADDR_TRIG,
                    };
                    hw.dma.write_reg(trigger, addr);
                    log::trace!("dispatcher: {} at {:06X}", cmd.name(), addr);
                    return (State::AwaitDeselect { cmd, seen_high: false }, ARM);
                }
                match self.deselected(hw, seen_high) {
                    (true, _) => {
                        log::debug!("dispatcher: {} deselected before its address", cmd.name());
                        self.teardown(hw, cmd)
                    }
                    (false, high) => (State::AwaitAddress { cmd, seen_high: high }, POLL),
                }
            }

            State::AwaitDeselect { cmd, seen_high } => match self.deselected(hw, seen_high) {
                (true, _) => self.teardown(hw, cmd),
                (false, high) => (State::AwaitDeselect { cmd, seen_high: high }, POLL),
            },

            State::Drain => {
                // The receive channel empties the FIFO on its own until its
                // count runs out; whatever is left then goes with the reset
                if !self.read.rx_empty(hw) && hw.dma.is_busy(self.read.rx_channel) {
                    return (State::Drain, POLL);
                }
                hw.dma.abort(self.read.rx_channel);
                self.fabric = true;
                (State::ResetPipelines, ARM)
            }

            State::ResetPipelines => {
                self.write.reset(hw);
                self.read.reset(hw);
                self.fabric = true;
                (State::Idle { seen_high: false }, RESET)
            }
        }
    }
}

impl Core for Dispatcher {
    type Hw = Peripherals;

    fn reset(&mut self) {
        self.state = State::Idle { seen_high: false };
        self.fabric = false;
    }

    fn step(&mut self, hw: &mut Peripherals) -> u32 {
        self.fabric = false;
        let (next, cycles) = self.advance(hw);
        if next.name() != self.state.name() {
            log::trace!("dispatcher: {} -> {}", self.state.name(), next.name());
        }
        self.state = next;
        cycles
    }

    fn holds_fabric(&self) -> bool {
        self.fabric
    }

    fn state_name(&self) -> &'static str {
        self.state.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        let read = ReadPipeline {
            pio: 1,
            sm: 1,
            offset: 11,
            rx_channel: 0,
        };
        let write = WritePipeline {
            pio: 0,
            sm: 1,
            offset: 0,
            tx_channel: 1,
            handoff_channel: 2,
        };
        Dispatcher::new(read, write, 3, 16)
    }

    #[test]
    fn unknown_opcode_survives_until_teardown() {
        let mut hw = Peripherals::new();
        let mut core = dispatcher();
        core.state = State::IgnoreUnknown(0x9F);

        core.step(&mut hw);
        assert_eq!(
            core.state,
            State::AwaitDeselect {
                cmd: Command::Unknown(0x9F),
                seen_high: false
            }
        );
        assert_eq!(core.state_name(), "AwaitDeselect");
    }

    #[test]
    fn drain_ends_when_receive_channel_is_idle() {
        let mut hw = Peripherals::new();
        let mut core = dispatcher();
        core.state = State::Drain;
        assert!(!hw.dma.is_busy(0));

        assert_eq!(core.step(&mut hw), ARM);
        assert_eq!(core.state, State::ResetPipelines);
        assert_eq!(core.step(&mut hw), RESET);
        assert_eq!(core.state_name(), "Idle");
    }
}
