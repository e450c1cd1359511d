use serde::Deserialize;
use spi_sram::{setup_simulated_sram, Chip, SpiMaster, SramConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Deserialize, Debug)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Write {
        addr: u32,
        data: Vec<u8>,
    },
    Read {
        addr: u32,
        expect: Vec<u8>,
    },
    FastRead {
        addr: u32,
        expect: Vec<u8>,
    },
    Raw {
        out: Vec<u8>,
        #[serde(default)]
        expect_tail: Option<Vec<u8>>,
    },
}

#[derive(Deserialize, Debug)]
struct TestCase {
    name: String,
    addr_bits: u8,
    half_period: u32,
    steps: Vec<Step>,
}

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/wire_order.json");

#[test]
fn wire_order_fixtures() {
    let path = Path::new(FIXTURE);
    let file = File::open(path).expect("File open failed");
    let reader = BufReader::new(file);
    let tests: Vec<TestCase> = serde_json::from_reader(reader).expect("JSON parse failed");
    assert!(!tests.is_empty());

    for test in &tests {
        run_single_test(test);
    }
    println!("Passed {} fixture cases", tests.len());
}

fn run_single_test(test: &TestCase) {
    // 1. Setup chip
    let config = SramConfig {
        addr_bits: test.addr_bits,
        ..SramConfig::default()
    };
    let mut chip = Chip::new();
    let mut master = SpiMaster::new(&config, test.half_period);
    master.idle(&mut chip);
    setup_simulated_sram(&mut chip, config).expect("setup failed");

    // 2. Replay steps
    for (i, step) in test.steps.iter().enumerate() {
        match step {
            Step::Write { addr, data } => master.write(&mut chip, *addr, data),
            Step::Read { addr, expect } => {
                let got = master.read(&mut chip, *addr, expect.len());
                assert_eq!(&got, expect, "{} step {}: READ {:06X}", test.name, i, addr);
            }
            Step::FastRead { addr, expect } => {
                let got = master.fast_read(&mut chip, *addr, expect.len());
                assert_eq!(&got, expect, "{} step {}: FAST_READ {:06X}", test.name, i, addr);
            }
            Step::Raw { out, expect_tail } => {
                let got = master.raw(&mut chip, out);
                assert_eq!(got.len(), out.len());
                if let Some(tail) = expect_tail {
                    assert_eq!(
                        &got[got.len() - tail.len()..],
                        tail.as_slice(),
                        "{} step {}: raw frame",
                        test.name,
                        i
                    );
                }
            }
        }
    }
}
