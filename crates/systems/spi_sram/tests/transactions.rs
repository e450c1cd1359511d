use proptest::prelude::*;
use rp_pio::PioError;
use spi_sram::{setup_simulated_sram, Chip, ResetReason, SetupError, SpiMaster, SramConfig};

const HALF_PERIOD: u32 = 8;

fn boot(config: SramConfig) -> (Chip, SpiMaster) {
    let mut chip = Chip::new();
    let mut master = SpiMaster::new(&config, HALF_PERIOD);
    master.idle(&mut chip);
    setup_simulated_sram(&mut chip, config).unwrap();
    (chip, master)
}

fn boot_default() -> (Chip, SpiMaster) {
    boot(SramConfig::default())
}

// ============================================================================
//  PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn written_bytes_read_back(
        addr in 0u32..0xFF00,
        data in prop::collection::vec(any::<u8>(), 1..32),
    ) {
        let (mut chip, mut master) = boot_default();
        master.write(&mut chip, addr, &data);
        prop_assert_eq!(chip.ram().slice(addr, data.len()), data.as_slice());
        prop_assert_eq!(master.read(&mut chip, addr, data.len()), data);
    }

    #[test]
    fn fast_read_matches_read(addr in 0u32..0xFF00, len in 1usize..24) {
        let (mut chip, mut master) = boot_default();
        let slow = master.read(&mut chip, addr, len);
        let fast = master.fast_read(&mut chip, addr, len);
        prop_assert_eq!(&slow, &fast);
        prop_assert_eq!(slow.as_slice(), chip.ram().slice(addr, len));
    }
}

// ============================================================================
//  SCENARIOS
// ============================================================================

#[test]
fn end_to_end_scenario() {
    let (mut chip, mut master) = boot_default();
    master.write(&mut chip, 0x00FF, &[0xAA, 0xBB, 0xCC, 0xDD]);
    assert_eq!(master.read(&mut chip, 0x00FF, 4), vec![0xAA, 0xBB, 0xCC, 0xDD]);
    assert_eq!(master.read(&mut chip, 0x0000, 4), vec![0x00, 0x01, 0x02, 0x03]);
    assert_eq!(chip.core1_state(), Some("Idle"));
}

#[test]
fn unknown_command_changes_nothing() {
    let (mut chip, mut master) = boot_default();
    let before = chip.ram().as_slice().to_vec();
    master.raw(&mut chip, &[0x9F, 0x12, 0x34, 0x56, 0x78, 0x9A]);
    master.raw(&mut chip, &[0x05, 0x00, 0x00, 0x00]);
    assert!(chip.ram().as_slice() == before.as_slice());
    assert_eq!(master.read(&mut chip, 0x1234, 3), vec![0x34, 0x35, 0x36]);
}

#[test]
fn deselect_after_command_byte() {
    let (mut chip, mut master) = boot_default();
    let before = chip.ram().as_slice().to_vec();

    master.abort_after(8);
    assert!(master.read(&mut chip, 0x4000, 4).is_empty());
    assert_eq!(chip.core1_state(), Some("Idle"));
    assert_eq!(master.read(&mut chip, 0x4000, 2), vec![0x00, 0x01]);

    master.abort_after(8);
    master.write(&mut chip, 0x4000, &[0xEE]);
    assert!(chip.ram().as_slice() == before.as_slice());
    master.write(&mut chip, 0x4000, &[0xEE]);
    assert_eq!(master.read(&mut chip, 0x4000, 2), vec![0xEE, 0x01]);
}

#[test]
fn deselect_inside_command_byte() {
    let (mut chip, mut master) = boot_default();
    master.abort_after(5);
    master.read(&mut chip, 0x0010, 4);
    assert_eq!(chip.core1_state(), Some("Idle"));
    assert_eq!(master.read(&mut chip, 0x0010, 4), vec![0x10, 0x11, 0x12, 0x13]);
}

#[test]
fn deselect_mid_data_keeps_completed_bytes() {
    let (mut chip, mut master) = boot_default();
    // Command, address, two whole bytes and half of a third
    master.abort_after(8 + 16 + 20);
    master.write(&mut chip, 0x2000, &[0x11, 0x22, 0x33]);
    assert_eq!(chip.ram().slice(0x2000, 3), &[0x11, 0x22, 0x02]);
    assert_eq!(master.fast_read(&mut chip, 0x2000, 3), vec![0x11, 0x22, 0x02]);
}

#[test]
fn cs_glitch_during_data_is_ignored() {
    let (mut chip, mut master) = boot_default();
    master.glitch_cs_at(8 + 16 + 12);
    assert_eq!(
        master.read(&mut chip, 0x0300, 4),
        vec![0x00, 0x01, 0x02, 0x03]
    );

    master.glitch_cs_at(8 + 16 + 4);
    master.write(&mut chip, 0x0300, &[0xDE, 0xAD]);
    assert_eq!(chip.ram().slice(0x0300, 2), &[0xDE, 0xAD]);
}

#[test]
fn wide_address_read_returns_pattern() {
    let config = SramConfig {
        addr_bits: 24,
        ..SramConfig::default()
    };
    let (mut chip, mut master) = boot(config);
    assert_eq!(chip.ram().len(), 1 << 24);
    assert_eq!(
        master.read(&mut chip, 0x123456, 4),
        vec![0x56, 0x57, 0x58, 0x59]
    );
    master.write(&mut chip, 0xFE0001, &[0x42]);
    assert_eq!(chip.ram().read(0xFE0001), 0x42);
    assert_eq!(chip.ram().read(0x000001), 0x01);
}

#[test]
fn slowest_and_fastest_supported_clocks() {
    for half_period in [4, 32] {
        let config = SramConfig::default();
        let mut chip = Chip::new();
        let mut master = SpiMaster::new(&config, half_period);
        master.idle(&mut chip);
        setup_simulated_sram(&mut chip, config).unwrap();
        master.write(&mut chip, 0x8000, &[5, 6, 7]);
        assert_eq!(master.read(&mut chip, 0x7FFF, 5), vec![0xFF, 5, 6, 7, 0x03]);
    }
}

#[test]
fn write_longer_than_64k_with_wide_addresses() {
    let (mut chip, mut master) = boot(SramConfig {
        addr_bits: 24,
        ..SramConfig::default()
    });

    let data: Vec<u8> = (0..65540u32).map(|i| (i * 7 + 3) as u8).collect();
    master.write(&mut chip, 0x100000, &data);
    assert_eq!(chip.ram().slice(0x100000, data.len()), data.as_slice());
    assert_eq!(chip.core1_state(), Some("Idle"));

    assert_eq!(master.read(&mut chip, 0x10, 4), vec![0x10, 0x11, 0x12, 0x13]);
    assert_eq!(master.read(&mut chip, 0x10FFFE, 6), data[65534..].to_vec());
}

#[test]
fn write_past_the_array_recovers() {
    let config = SramConfig::default();
    let mut chip = Chip::new();
    let mut master = SpiMaster::new(&config, 4);
    master.idle(&mut chip);
    setup_simulated_sram(&mut chip, config).unwrap();

    // More bytes than the receive channel is armed for
    let data: Vec<u8> = (0..65544u32).map(|i| (i ^ 0x5A) as u8).collect();
    master.write(&mut chip, 0x8000, &data);
    assert_eq!(chip.core1_state(), Some("Idle"));
    assert_eq!(chip.ram().slice(0x8000, 0x8000), &data[..0x8000]);
    assert_eq!(chip.ram().read(0x0010), 0x10);

    master.write(&mut chip, 0x0010, &[0xAB]);
    assert_eq!(master.read(&mut chip, 0x000F, 3), vec![0x0F, 0xAB, 0x11]);
}

// ============================================================================
//  SETUP
// ============================================================================

#[test]
fn claimed_state_machine_fails_setup() {
    let mut chip = Chip::new();
    chip.hw.pio[1].sm_claim(1).unwrap();
    let result = setup_simulated_sram(&mut chip, SramConfig::default());
    assert!(matches!(
        result,
        Err(SetupError::Pio(PioError::SmClaimed { pio: 1, sm: 1 }))
    ));
    assert!(!chip.core1_running());
}

#[test]
fn watchdog_reboot_keeps_contents() {
    let (mut chip, mut master) = boot_default();
    master.write(&mut chip, 0x0010, &[0xC0, 0xFF, 0xEE]);

    chip.watchdog_reboot();
    assert_eq!(chip.reset_reason(), ResetReason::Watchdog);
    assert!(!chip.core1_running());
    master.idle(&mut chip);
    setup_simulated_sram(&mut chip, SramConfig::default()).unwrap();

    assert_eq!(master.read(&mut chip, 0x0010, 3), vec![0xC0, 0xFF, 0xEE]);
    assert_eq!(master.read(&mut chip, 0x0020, 1), vec![0x20]);
}
