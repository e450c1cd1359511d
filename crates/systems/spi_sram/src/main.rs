// crates/systems/spi_sram/src/main.rs
// Calibration sweep: drives the emulated SRAM with ever faster clocks and
// reports the shortest half period that still passes random READ and WRITE
// checks.
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spi_sram::{setup_simulated_sram, Chip, SpiMaster, SramConfig};
use std::path::PathBuf;
use std::process::ExitCode;

const CHECK_LEN: usize = 8;

#[derive(Parser, Debug)]
#[command(name = "spi_sram", about = "Barrido de velocidad del emulador de SRAM SPI")]
struct Args {
    /// JSON configuration (defaults to the reference board)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Overrides the address width from the configuration
    #[arg(long, value_name = "BITS")]
    addr_bits: Option<u8>,

    /// READ + WRITE checks per half period
    #[arg(long, default_value_t = 16)]
    runs: u32,

    #[arg(long, default_value_t = 0x5EED)]
    seed: u64,

    /// Slowest half period tried, in system ticks
    #[arg(long, default_value_t = 16)]
    start_half_period: u32,

    #[arg(long, default_value_t = 1)]
    min_half_period: u32,
}

/// Result of the checks at one half period.
enum Outcome {
    Passed { cycles: u64 },
    Failed(Mismatch),
}

/// What failed at a given speed.
struct Mismatch {
    check: &'static str,
    addr: u32,
    got: Vec<u8>,
    want: Vec<u8>,
}

fn check_speed(
    config: &SramConfig,
    half_period: u32,
    runs: u32,
    rng: &mut StdRng,
) -> Result<Outcome, spi_sram::SetupError> {
    let mut chip = Chip::new();
    let mut master = SpiMaster::new(config, half_period);
    master.idle(&mut chip);
    setup_simulated_sram(&mut chip, config.clone())?;

    let span = (1u32 << config.addr_bits) - CHECK_LEN as u32;
    for _ in 0..runs {
        // READ against what the array holds
        let addr = rng.gen_range(0..=span);
        let want = chip.ram().slice(addr, CHECK_LEN).to_vec();
        let got = master.read(&mut chip, addr, CHECK_LEN);
        if got != want {
            return Ok(Outcome::Failed(Mismatch {
                check: "READ",
                addr,
                got,
                want,
            }));
        }

        // WRITE, then read it back
        let addr = rng.gen_range(0..=span);
        let mut data = [0u8; CHECK_LEN];
        rng.fill(&mut data[..]);
        master.write(&mut chip, addr, &data);
        let got = master.read(&mut chip, addr, CHECK_LEN);
        if got != data {
            return Ok(Outcome::Failed(Mismatch {
                check: "WRITE",
                addr,
                got,
                want: data.to_vec(),
            }));
        }
    }
    Ok(Outcome::Passed {
        cycles: chip.cycles(),
    })
}

fn run(args: &Args) -> Result<Option<u32>, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => SramConfig::load(path)?,
        None => SramConfig::default(),
    };
    if let Some(bits) = args.addr_bits {
        config.addr_bits = bits;
        config.validate()?;
    }

    println!("--- Oxide SPI SRAM ---");
    println!(
        "Address bits: {}  MOSI:{} SCK:{} CS:{} MISO:{}",
        config.addr_bits, config.pins.mosi, config.pins.sck, config.pins.cs, config.pins.miso
    );
    println!("Runs per step: {}  Seed: {:#X}", args.runs, args.seed);

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut fastest = None;
    let floor = args.min_half_period.max(1);
    for half_period in (floor..=args.start_half_period.max(floor)).rev() {
        match check_speed(&config, half_period, args.runs, &mut rng)? {
            Outcome::Passed { cycles } => {
                println!("half period {:>3}: ok ({} cycles)", half_period, cycles);
                fastest = Some(half_period);
            }
            Outcome::Failed(mismatch) => {
                println!(
                    "half period {:>3}: {} at {:06X} got {:02X?} want {:02X?}",
                    half_period, mismatch.check, mismatch.addr, mismatch.got, mismatch.want
                );
                break;
            }
        }
    }
    Ok(fastest)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(Some(half_period)) => {
            println!("Fastest passing half period: {} ticks", half_period);
            ExitCode::SUCCESS
        }
        Ok(None) => {
            eprintln!("No half period passed");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
