// crates/rp_pio/src/tests.rs
#[cfg(test)]
mod tests {
    use crate::*;
    use sram_core::PinBank;

    #[derive(Default)]
    struct TestPins {
        input: u32,
        out: u32,
        oe: u32,
    }

    impl PinBank for TestPins {
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

    fn program(instructions: Vec<u16>) -> Program {
        let wrap = instructions.len() as u8 - 1;
        Program {
            instructions,
            origin: None,
            wrap_target: 0,
            wrap,
        }
    }

    #[test]
    fn test_encodings_match_sdk() {
        assert_eq!(encode_nop(), 0xA042);
        assert_eq!(encode_jmp(5), 0x0005);
        assert_eq!(encode_jmp_x_dec(2), 0x0042);
        assert_eq!(encode_set(SetDest::X, 7), 0xE027);
        assert_eq!(encode_wait_pin(false, 2), 0x2022);
        assert_eq!(encode_push(false, true), 0x8020);
        assert_eq!(encode_pull(false, true), 0x80A0);
        assert_eq!(encode_in(InSrc::Pins, 1), 0x4001);
        assert_eq!(encode_in(InSrc::Y, 8), 0x4048);
        assert_eq!(encode_out(OutDest::Pins, 1), 0x6001);
        assert_eq!(encode_mov(MovDest::Y, MovSrc::Isr), 0xA046);

        // 32-bit counts are stored as 0
        assert_eq!(encode_in(InSrc::Null, 32), 0x4060);
        assert_eq!(
            Instr::decode(0x4060),
            Some(Instr::In { src: InSrc::Null, count: 32 })
        );
        assert_eq!(
            Instr::decode(encode_jmp_pin(9)),
            Some(Instr::Jmp { cond: JmpCond::Pin, addr: 9 })
        );
        // IN from source 4 is reserved
        assert_eq!(Instr::decode(0x4081), None);
    }

    #[test]
    fn test_add_program_allocates_from_top_and_relocates() {
        let mut pio = Pio::new(1);
        let prog = program(vec![encode_set(SetDest::X, 1), encode_jmp(0)]);

        let offset = pio.add_program(&prog).unwrap();
        assert_eq!(offset, 30);
        assert_eq!(pio.instr(31), encode_jmp(30));
        assert_eq!(pio.instr(30), encode_set(SetDest::X, 1));

        let second = pio.add_program(&prog).unwrap();
        assert_eq!(second, 28);

        assert_eq!(
            pio.add_program_at_offset(&prog, 29),
            Err(PioError::OffsetInUse { pio: 1, offset: 29 })
        );
        assert!(pio.add_program_at_offset(&prog, 0).is_ok());
        assert_eq!(pio.instr(1), encode_jmp(0));
    }

    #[test]
    fn test_sm_claims_are_exclusive() {
        let mut pio = Pio::new(0);
        assert!(pio.sm_claim(1).is_ok());
        assert!(pio.is_claimed(1));
        assert_eq!(pio.sm_claim(1), Err(PioError::SmClaimed { pio: 0, sm: 1 }));
        assert_eq!(pio.sm_claim(4), Err(PioError::NoSuchSm { pio: 0, sm: 4 }));
    }

    #[test]
    fn test_shift_in_and_push() {
        let mut pio = Pio::new(0);
        let prog = program(vec![
            encode_set(SetDest::X, 7),
            encode_in(InSrc::Pins, 1),
            encode_jmp_x_dec(1),
            encode_push(false, true),
        ]);
        pio.add_program_at_offset(&prog, 0).unwrap();

        let mut config = SmConfig::default();
        config.set_in_pins(3);
        config.set_in_shift(false, false, 32);
        pio.sm_init(0, 0, &config);
        pio.sm_set_enabled(0, true);

        // MOSI high on pin 3 only
        let mut pins = TestPins { input: 1 << 3, ..Default::default() };
        for _ in 0..30 {
            pio.step(&mut pins);
        }
        assert_eq!(pio.sm_get(0), Some(0xFF));
        assert_eq!(pio.sm_get(0), None);
    }

    #[test]
    fn test_autopull_out_stalls_when_empty() {
        let mut pio = Pio::new(0);
        pio.add_program_at_offset(&program(vec![encode_out(OutDest::Pins, 1)]), 0)
            .unwrap();

        let mut config = SmConfig::default();
        config.set_out_pins(5, 1);
        config.set_out_shift(false, true, 8);
        config.set_wrap(0, 0);
        pio.sm_init(0, 0, &config);
        pio.sm_set_enabled(0, true);

        let mut pins = TestPins::default();
        pins.set_dirs(1 << 5, 1 << 5);

        pio.step(&mut pins);
        assert!(pio.sm(0).stalled);
        assert!(!pins.level(5));

        assert!(pio.sm_put(0, 0xA5A5_A5A5));
        let mut bits = Vec::new();
        for _ in 0..8 {
            pio.step(&mut pins);
            bits.push(pins.level(5) as u8);
        }
        assert_eq!(bits, vec![1, 0, 1, 0, 0, 1, 0, 1]);

        pio.step(&mut pins);
        assert!(pio.sm(0).stalled);
    }

    #[test]
    fn test_exec_jump_and_restart() {
        let mut pio = Pio::new(0);
        let prog = program(vec![
            encode_wait_gpio(true, 4), // stalls forever with pin 4 low
            encode_set(SetDest::Y, 9),
            encode_jmp(1),
        ]);
        pio.add_program_at_offset(&prog, 0).unwrap();
        pio.sm_init(2, 0, &SmConfig::default());
        pio.sm_set_enabled(2, true);

        let mut pins = TestPins::default();
        pio.step(&mut pins);
        assert!(pio.sm(2).stalled);
        assert_eq!(pio.sm(2).pc, 0);

        pio.sm_set_enabled(2, false);
        pio.sm_restart(2);
        pio.sm_exec(2, encode_jmp(1));
        assert!(!pio.sm(2).stalled);
        assert_eq!(pio.sm(2).pc, 1);

        pio.sm_set_enabled(2, true);
        pio.step(&mut pins);
        assert_eq!(pio.sm(2).y, 9);
    }

    #[test]
    fn test_patched_instruction_takes_effect_on_next_fetch() {
        let mut pio = Pio::new(0);
        let prog = program(vec![encode_set(SetDest::X, 3), encode_jmp(0)]);
        pio.add_program_at_offset(&prog, 0).unwrap();
        pio.sm_init(0, 0, &SmConfig::default());
        pio.sm_set_enabled(0, true);

        let mut pins = TestPins::default();
        pio.step(&mut pins);
        assert_eq!(pio.sm(0).x, 3);

        pio.write_instr(0, encode_set(SetDest::X, 12));
        pio.step(&mut pins); // jmp 0
        pio.step(&mut pins);
        assert_eq!(pio.sm(0).x, 12);
    }

    #[test]
    fn test_fifo_register_window() {
        let mut pio = Pio::new(0);
        pio.write_reg(regs::txf(1), 0x1234);
        assert_eq!(pio.sm(1).tx_level(), 1);

        // RX of SM1 empty
        assert_ne!(pio.read_reg(regs::FSTAT) & (1 << 9), 0);
        pio.sm_mut(1).rx.push_back(0xBEEF);
        assert!(pio.rx_dreq(1));
        assert_eq!(pio.read_reg(regs::rxf(1)), 0xBEEF);
        assert_eq!(pio.read_reg(regs::rxf(1)), 0);
    }

    #[test]
    fn test_shiftctrl_set_and_clear_aliases() {
        let mut pio = Pio::new(0);
        let mut config = SmConfig::default();
        config.set_out_shift(false, true, 32);
        pio.sm_init(0, 0, &config);
        assert_eq!(pio.sm(0).shiftctrl.pull_thresh(), 32);

        pio.sm_shiftctrl_set_bits(0, 8 << ShiftCtrl::PULL_THRESH_LSB);
        assert_eq!(pio.sm(0).shiftctrl.pull_thresh(), 8);
        assert!(pio.sm(0).shiftctrl.contains(ShiftCtrl::AUTOPULL));

        pio.sm_shiftctrl_clear_bits(0, ShiftCtrl::PULL_THRESH.bits());
        assert_eq!(pio.sm(0).shiftctrl.pull_thresh(), 32);
    }
}
