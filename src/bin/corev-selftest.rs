//! Standalone self-tests for the CORE-V debug target library.
//!
//! Brings the full transport stack up over the behavioral device model
//! and exercises the chosen subsystems with randomized data. Useful as
//! a smoke test of the debug port without a debug server attached.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use corev_target::dmi::registers::Dmstatus;
use corev_target::dmi::{csr, Dmi};
use corev_target::dtm::JtagDtm;
use corev_target::sim::fake_mcu::FakeMcu;
use corev_target::sim::SimDevice;
use corev_target::tap::Tap;

#[derive(Parser)]
#[command(name = "corev-selftest", version, about = "CORE-V debug target self-tests")]
struct Cli {
    /// Clock speed in MHz
    #[arg(short = 's', long, default_value_t = 100.0, value_name = "SPEED")]
    mhz: f64,

    /// Simulation duration in nanoseconds (0 = unlimited)
    #[arg(short = 'd', long = "duration-ns", default_value_t = 0, value_name = "TIME")]
    duration_ns: u64,

    /// Random number seed
    #[arg(long, default_value_t = 1, value_name = "N")]
    seed: u64,

    /// Maximum size of memory block to test
    #[arg(long = "max-block", default_value_t = 64, value_name = "N")]
    max_block: usize,

    /// Verilog Change Dump file name
    #[arg(long, value_name = "FILENAME")]
    vcd: Option<String>,

    /// Run a test of hart status
    #[arg(long = "test-status")]
    test_status: bool,

    /// Run a test of the GPRs
    #[arg(long = "test-gprs")]
    test_gprs: bool,

    /// Run a test of the FPRs and FPU CSRs
    #[arg(long = "test-fprs")]
    test_fprs: bool,

    /// Run a test of the CSRs
    #[arg(long = "test-csrs")]
    test_csrs: bool,

    /// Run a test of memory
    #[arg(long = "test-mem")]
    test_mem: bool,
}

impl Cli {
    /// The VCD path with a `.vcd` suffix guaranteed.
    fn vcd_path(&self) -> Option<PathBuf> {
        let name = self.vcd.as_deref()?;
        if name.is_empty() {
            return None;
        }
        let mut name = name.to_owned();
        if !name.ends_with(".vcd") && !name.ends_with(".VCD") {
            name.push_str(".vcd");
        }
        Some(PathBuf::from(name))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.mhz > 500.0 {
        bail!("speed cannot be greater than 500MHz");
    }
    let clk_period_ns = (1000.0 / cli.mhz) as u64;

    fastrand::seed(cli.seed);

    let dev = SimDevice::new(
        Box::new(FakeMcu::new()),
        clk_period_ns,
        cli.duration_ns,
        cli.vcd_path().as_deref(),
    )?;
    let mut dmi = Dmi::new(Box::new(JtagDtm::new(Tap::new(dev))));

    dmi.dtm_reset()?;
    dmi.select_hart(0)?;
    dmi.halt_hart(0)?;

    let mut failures = 0usize;
    let mut ran = 0usize;

    if cli.test_status {
        ran += 1;
        failures += report("hart status", test_status(&mut dmi));
    }
    if cli.test_gprs {
        ran += 1;
        failures += report("GPRs", test_gprs(&mut dmi));
    }
    if cli.test_fprs {
        ran += 1;
        failures += report("FPRs", test_fprs(&mut dmi));
    }
    if cli.test_csrs {
        ran += 1;
        failures += report("CSRs", test_csrs(&mut dmi));
    }
    if cli.test_mem {
        ran += 1;
        failures += report("memory", test_mem(&mut dmi, cli.max_block));
    }

    if ran == 0 {
        println!("no self-tests selected; see --help for the --test-* switches");
        return Ok(());
    }

    println!(
        "{ran} test group(s) run, {failures} failure(s), {} ns simulated",
        dmi.sim_time_ns()
    );
    if failures > 0 {
        bail!("{failures} self-test failure(s)");
    }
    Ok(())
}

fn report(name: &str, result: Result<usize>) -> usize {
    match result {
        Ok(0) => {
            println!("{name}: ok");
            0
        }
        Ok(n) => {
            println!("{name}: {n} check(s) FAILED");
            n
        }
        Err(e) => {
            println!("{name}: aborted: {e}");
            1
        }
    }
}

fn test_status(dmi: &mut Dmi) -> Result<usize> {
    let mut failed = 0;

    let status: Dmstatus = dmi.read_register()?;
    if !status.halted() || status.running() {
        println!("  hart 0 should be halted, dmstatus = {status:?}");
        failed += 1;
    }
    if !status.authenticated() {
        println!("  debug module reports unauthenticated");
        failed += 1;
    }
    if status.version() != 2 {
        println!("  unexpected debug module version {}", status.version());
        failed += 1;
    }

    let hartsellen = dmi.hartsellen()?;
    if hartsellen != 0 {
        println!("  expected a single hart, hartsellen reports {hartsellen}");
        failed += 1;
    }
    // hartsellen rewrote the hart selection; restore it.
    dmi.halt_hart(0)?;

    Ok(failed)
}

fn test_gprs(dmi: &mut Dmi) -> Result<usize> {
    let mut failed = 0;

    // x0 is hardwired to zero.
    dmi.write_gpr(0, 0xffff_ffff)?;
    if dmi.read_gpr(0)? != 0 {
        println!("  x0 is not hardwired to zero");
        failed += 1;
    }

    for reg in 1..32 {
        let value = fastrand::u32(..);
        dmi.write_gpr(reg, value)?;
        let back = dmi.read_gpr(reg)?;
        if back != value {
            println!("  x{reg}: wrote {value:#010x}, read {back:#010x}");
            failed += 1;
        }
    }

    Ok(failed)
}

fn test_fprs(dmi: &mut Dmi) -> Result<usize> {
    let mut failed = 0;

    for reg in 0..32 {
        let value = fastrand::u32(..);
        dmi.write_fpr(reg, value)?;
        let back = dmi.read_fpr(reg)?;
        if back != value {
            println!("  f{reg}: wrote {value:#010x}, read {back:#010x}");
            failed += 1;
        }
    }

    // The FPU CSRs must be reachable as well.
    for addr in [0x001u16, 0x002, 0x003] {
        let value = fastrand::u32(..) & 0xff;
        dmi.write_csr(addr, value)?;
        let back = dmi.read_csr(addr)?;
        if back != value {
            println!(
                "  {}: wrote {value:#x}, read {back:#x}",
                csr::name(addr)
            );
            failed += 1;
        }
    }

    Ok(failed)
}

fn test_csrs(dmi: &mut Dmi) -> Result<usize> {
    let mut failed = 0;

    // Every catalogued CSR must be readable.
    for info in csr::CSRS {
        if dmi.read_csr(info.address).is_err() {
            println!("  {} ({:#05x}) is not readable", info.name, info.address);
            failed += 1;
        }
    }

    // Writable CSRs round-trip.
    for addr in [0x340u16, 0x341, 0x305] {
        let value = fastrand::u32(..);
        dmi.write_csr(addr, value)?;
        let back = dmi.read_csr(addr)?;
        if back != value {
            println!(
                "  {}: wrote {value:#010x}, read {back:#010x}",
                csr::name(addr)
            );
            failed += 1;
        }
    }

    // Read-only CSRs refuse writes.
    if dmi.write_csr(0xc00, 1).is_ok() {
        println!("  writing read-only cycle succeeded");
        failed += 1;
    }

    Ok(failed)
}

fn test_mem(dmi: &mut Dmi, max_block: usize) -> Result<usize> {
    let mut failed = 0;
    let max_block = max_block.max(1);

    for _ in 0..16 {
        let addr = 0x1c00_8000 + fastrand::u32(0..0x8000);
        let len = fastrand::usize(1..=max_block);
        let data: Vec<u8> = (0..len).map(|_| fastrand::u8(..)).collect();

        dmi.write_mem(addr, &data)?;
        let back = dmi.read_mem(addr, len)?;
        if back != data {
            println!("  {len} byte block at {addr:#010x} did not round-trip");
            failed += 1;
        }
    }

    // A write must not disturb its aligned neighbourhood.
    let base = 0x1c00_c000;
    dmi.write_mem(base, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88])?;
    dmi.write_mem(base + 3, &[0xaa, 0xbb])?;
    let back = dmi.read_mem(base, 8)?;
    if back != [0x11, 0x22, 0x33, 0xaa, 0xbb, 0x66, 0x77, 0x88] {
        println!("  partial write disturbed its neighbourhood: {back:02x?}");
        failed += 1;
    }

    Ok(failed)
}
