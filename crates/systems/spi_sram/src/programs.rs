// crates/systems/spi_sram/src/programs.rs
// Shifter programs for both halves of the bus. JMP targets are relative to
// the start of each program; `Pio::add_program` relocates them.
use crate::config::SpiPins;
use rp_pio::{
    encode_in, encode_jmp, encode_jmp_x_dec, encode_mov, encode_nop, encode_out, encode_push,
    encode_set, encode_wait_pin, InSrc, MovDest, MovSrc, OutDest, Program, SetDest, SmConfig,
};

// Pins relative to IN_BASE (= MOSI)
const PIN_MOSI: u8 = 0;
const PIN_SCK: u8 = 1;
const PIN_CS: u8 = 2;

// ============================================================================
//  READ SIDE (MOSI -> RX FIFO)
// ============================================================================

/// `set x, addr_bits - 9`: length of the command word.
pub const READ_SET_CMD_BITS: u8 = 1;
/// `in y, addr_bits - 16`: re-inject the high address bits.
pub const READ_INJECT_HIGH_BITS: u8 = 8;

const READ_CMD_LOOP: u8 = 2;
const READ_ADDR_LOOP: u8 = 10;
const READ_DATA: u8 = 15;
const READ_DATA_LOOP: u8 = 16;

/// Shifts in the command word, the address word and then one word per data
/// byte. `push block` stalls on a full RX FIFO.
pub fn read_program() -> Program {
    let instructions = vec![
        encode_wait_pin(false, PIN_CS),
        encode_set(SetDest::X, 7),
        // cmd_loop
        encode_wait_pin(false, PIN_SCK),
        encode_wait_pin(true, PIN_SCK),
        encode_in(InSrc::Pins, 1),
        encode_jmp_x_dec(READ_CMD_LOOP),
        encode_mov(MovDest::Y, MovSrc::Isr),
        encode_push(false, true),
        encode_nop(),
        encode_set(SetDest::X, 15),
        // addr_loop
        encode_wait_pin(false, PIN_SCK),
        encode_wait_pin(true, PIN_SCK),
        encode_in(InSrc::Pins, 1),
        encode_jmp_x_dec(READ_ADDR_LOOP),
        encode_push(false, true),
        // data (.wrap_target)
        encode_set(SetDest::X, 7),
        encode_wait_pin(false, PIN_SCK),
        encode_wait_pin(true, PIN_SCK),
        encode_in(InSrc::Pins, 1),
        encode_jmp_x_dec(READ_DATA_LOOP),
        encode_push(false, true),
        // .wrap
    ];
    Program {
        instructions,
        origin: None,
        wrap_target: READ_DATA,
        wrap: 20,
    }
}

pub fn read_sm_config(offset: u8, pins: &SpiPins) -> SmConfig {
    let program = read_program();
    let mut config = SmConfig::default();
    config.set_wrap(offset + program.wrap_target, offset + program.wrap);
    config.set_in_pins(pins.mosi + PIN_MOSI);
    config.set_in_shift(false, false, 32);
    config
}

pub fn read_cmd_bits_instr(addr_bits: u8) -> u16 {
    encode_set(SetDest::X, addr_bits - 9)
}

pub fn read_high_bits_instr(addr_bits: u8) -> u16 {
    match addr_bits - 16 {
        0 => encode_nop(),
        n => encode_in(InSrc::Y, n),
    }
}

// ============================================================================
//  WRITE SIDE (TX FIFO -> MISO)
// ============================================================================

/// `set x, addr_bits + 6`: clocks to skip before the first data bit.
pub const WRITE_SET_ADDR_BITS: u8 = 1;
/// Patched to pick between `data` and `fast_read`.
pub const WRITE_LOOP_END: u8 = 5;
pub const WRITE_FAST_READ: u8 = 6;
pub const WRITE_DATA: u8 = 10;

const WRITE_ADDR_LOOP: u8 = 2;
const WRITE_DUMMY_LOOP: u8 = 7;

/// Counts command and address clocks, then shifts one bit out per falling
/// edge. Autopull stalls the `out` while the TX FIFO is empty.
pub fn write_program() -> Program {
    let instructions = vec![
        encode_wait_pin(false, PIN_CS),
        encode_set(SetDest::X, 22),
        // addr_loop
        encode_wait_pin(true, PIN_SCK),
        encode_wait_pin(false, PIN_SCK),
        encode_jmp_x_dec(WRITE_ADDR_LOOP),
        // loop_end
        encode_jmp(WRITE_DATA),
        // fast_read
        encode_set(SetDest::X, 7),
        encode_wait_pin(true, PIN_SCK),
        encode_wait_pin(false, PIN_SCK),
        encode_jmp_x_dec(WRITE_DUMMY_LOOP),
        // data (.wrap_target)
        encode_wait_pin(true, PIN_SCK),
        encode_wait_pin(false, PIN_SCK),
        encode_out(OutDest::Pins, 1),
        // .wrap
    ];
    Program {
        instructions,
        origin: Some(0),
        wrap_target: WRITE_DATA,
        wrap: 12,
    }
}

pub fn write_sm_config(offset: u8, pins: &SpiPins) -> SmConfig {
    let program = write_program();
    let mut config = SmConfig::default();
    config.set_wrap(offset + program.wrap_target, offset + program.wrap);
    config.set_in_pins(pins.mosi + PIN_MOSI);
    config.set_out_pins(pins.miso, 1);
    config.set_out_shift(false, true, 32);
    config
}

pub fn write_addr_bits_instr(addr_bits: u8) -> u16 {
    encode_set(SetDest::X, addr_bits + 6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rp_pio::{Instr, JmpCond, Pio};

    #[test]
    fn programs_fit_their_blocks() {
        let mut pio0 = Pio::new(0);
        let mut pio1 = Pio::new(1);
        assert_eq!(pio0.add_program(&write_program()), Ok(0));
        // 21 instructions, allocated from the top
        assert_eq!(pio1.add_program(&read_program()), Ok(11));
        assert_eq!(
            Instr::decode(pio1.instr(11 + 5)),
            Some(Instr::Jmp {
                cond: JmpCond::XDec,
                addr: 11 + READ_CMD_LOOP
            })
        );
    }

    #[test]
    fn patches_follow_address_width() {
        assert_eq!(read_cmd_bits_instr(16), encode_set(SetDest::X, 7));
        assert_eq!(read_cmd_bits_instr(24), encode_set(SetDest::X, 15));
        assert_eq!(read_high_bits_instr(16), encode_nop());
        assert_eq!(read_high_bits_instr(20), encode_in(InSrc::Y, 4));
        assert_eq!(write_addr_bits_instr(16), write_program().instructions[1]);
        assert_eq!(write_addr_bits_instr(24), encode_set(SetDest::X, 30));
    }

    #[test]
    fn loop_end_defaults_to_data() {
        let program = write_program();
        assert_eq!(
            program.instructions[WRITE_LOOP_END as usize],
            encode_jmp(WRITE_DATA)
        );
        assert_eq!(
            Instr::decode(program.instructions[WRITE_DUMMY_LOOP as usize + 2]),
            Some(Instr::Jmp {
                cond: JmpCond::XDec,
                addr: WRITE_DUMMY_LOOP
            })
        );
    }
}
