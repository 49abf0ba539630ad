//! Debugger-facing target adapter.
//!
//! Composes the transport stack into the abstract-target contract a
//! debug server expects: register and memory access, step / continue /
//! halt, and target-description XML. This is the only layer that knows
//! debugger conventions (register numbering, stop reasons); everything
//! below it speaks DMI.

mod desc;

use std::io::Write;
use std::path::PathBuf;

use crate::dmi::registers::{Dcsr, Dmstatus};
use crate::dmi::{csr, Dmi};
use crate::dtm::JtagDtm;
use crate::sim::fake_mcu::FakeMcu;
use crate::sim::{DutModel, SimDevice};
use crate::tap::Tap;
use crate::RiscvError;

/// GDB register numbering: 0..31 GPRs, 32 the PC, 33..64 the FPRs, then
/// the 4096 possible CSRs.
pub const REG_ZERO: usize = 0;
pub const REG_PC: usize = 32;
pub const REG_FT0: usize = 33;
pub const REG_CSR0: usize = 65;
pub const REG_CSR_LAST: usize = REG_CSR0 + 0xfff;

/// What a CPU should do on the next `resume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeType {
    None,
    Step,
    Continue,
}

/// Why a CPU stopped (or failed to).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeRes {
    None,
    Success,
    Failure,
    Interrupted,
}

/// Outcome of waiting for the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitRes {
    EventOccurred,
    Timeout,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    Cold,
    Warm,
}

/// Matchpoints cover hardware break- and watchpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Breakpoint,
    WatchWrite,
    WatchRead,
    WatchAccess,
}

/// Where a syscall argument lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallArgLoc {
    Register(u32),
}

/// The abstract target contract of the debug server.
pub trait DebugTarget {
    /// Number of registers reported to the debugger (CSRs excluded).
    fn register_count(&self) -> usize;
    /// Size of a register in bytes.
    fn register_size(&self) -> usize;

    /// Read a register; `None` for an index outside the map.
    fn read_register(&mut self, reg: usize) -> Option<u32>;
    /// Write a register, returning the number of bytes written.
    fn write_register(&mut self, reg: usize, value: u32) -> usize;

    /// Read memory, returning the number of bytes read.
    fn read_mem(&mut self, addr: u32, buf: &mut [u8]) -> usize;
    /// Write memory, returning the number of bytes written.
    fn write_mem(&mut self, addr: u32, data: &[u8]) -> usize;

    /// Record what each CPU should do on the next `resume`.
    fn prepare(&mut self, actions: &[ResumeType]) -> bool;
    /// Set the prepared actions going.
    fn resume(&mut self) -> bool;
    /// Block until a CPU stops, filling one result per CPU.
    fn wait(&mut self, results: &mut Vec<ResumeRes>) -> WaitRes;
    /// Force all CPUs to halt.
    fn halt(&mut self) -> bool;

    fn terminate(&mut self) -> ResumeRes;
    fn reset(&mut self, kind: ResetType) -> ResumeRes;

    fn insert_matchpoint(&mut self, addr: u32, kind: MatchType) -> bool;
    fn remove_matchpoint(&mut self, addr: u32, kind: MatchType) -> bool;

    /// Pass a monitor command through to the target.
    fn command(&mut self, cmd: &str, out: &mut dyn Write) -> bool;

    /// Target time in seconds since construction.
    fn timestamp(&mut self) -> f64;
    fn cycle_count(&self) -> u64;
    fn instr_count(&self) -> u64;

    fn cpu_count(&self) -> usize;
    fn current_cpu(&self) -> usize;
    fn set_current_cpu(&mut self, cpu: usize);

    fn supports_target_xml(&self) -> bool;
    /// The target description document, generated on first use.
    fn target_xml(&mut self, name: &str) -> Option<&str>;

    /// Locations of the syscall id, arguments and return value for
    /// host file I/O.
    fn syscall_arg_locs(&self) -> (SyscallArgLoc, Vec<SyscallArgLoc>, SyscallArgLoc);
}

/// Construction parameters for [`CorevTarget`].
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Main clock period in nanoseconds.
    pub clk_period_ns: u64,
    /// Simulated-time cap in nanoseconds, 0 for unbounded.
    pub sim_time_ns: u64,
    /// VCD dump path, if tracing is wanted.
    pub wave_path: Option<PathBuf>,
    /// Log DMI registers with decoded fields.
    pub trace_dmi: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            clk_period_ns: 20,
            sim_time_ns: 1_000_000_000,
            wave_path: None,
            trace_dmi: false,
        }
    }
}

type ModelFactory = Box<dyn Fn() -> Box<dyn DutModel>>;

/// The CORE-V target.
pub struct CorevTarget {
    dmi: Dmi,
    config: TargetConfig,
    model_factory: ModelFactory,
    run_action: ResumeType,
    xml: Option<String>,
    sim_start_ns: u64,
}

impl CorevTarget {
    /// Build the target over the in-crate behavioral device model.
    pub fn new(config: TargetConfig) -> Result<Self, RiscvError> {
        Self::with_model(Box::new(|| Box::new(FakeMcu::new()) as Box<dyn DutModel>), config)
    }

    /// Build the target over caller-supplied device models; `factory`
    /// is invoked again whenever the debugger requests a reset.
    pub fn with_model(factory: ModelFactory, config: TargetConfig) -> Result<Self, RiscvError> {
        let dmi = Self::build_stack(&factory, &config)?;
        let sim_start_ns = dmi.sim_time_ns();

        Ok(CorevTarget {
            dmi,
            config,
            model_factory: factory,
            run_action: ResumeType::None,
            xml: None,
            sim_start_ns,
        })
    }

    /// Construct and initialize the whole stack: reset the transport,
    /// then select and halt the single hart.
    fn build_stack(factory: &ModelFactory, config: &TargetConfig) -> Result<Dmi, RiscvError> {
        let dev = SimDevice::new(
            factory(),
            config.clk_period_ns,
            config.sim_time_ns,
            config.wave_path.as_deref(),
        )?;
        let mut dmi = Dmi::new(Box::new(JtagDtm::new(Tap::new(dev))));
        dmi.pretty_print(config.trace_dmi);

        dmi.dtm_reset()?;
        dmi.select_hart(0)?;
        dmi.halt_hart(0)?;
        Ok(dmi)
    }

    /// Poll `haltsum0` until hart 0 reports halted. Gives up once the
    /// simulated-time cap is passed.
    fn poll_halted(&mut self) -> Result<bool, RiscvError> {
        loop {
            if self.dmi.read_haltsum(0)? & 1 != 0 {
                return Ok(true);
            }
            if self.config.sim_time_ns != 0 && self.dmi.sim_time_ns() >= self.config.sim_time_ns {
                return Ok(false);
            }
        }
    }

    fn set_dcsr_bits(&mut self, mask: u32, set: bool) -> Result<(), RiscvError> {
        let value = self.dmi.read_csr(csr::DCSR)?;
        let value = if set { value | mask } else { value & !mask };
        self.dmi.write_csr(csr::DCSR, value)
    }

    fn wait_step(&mut self) -> Result<ResumeRes, RiscvError> {
        if !self.poll_halted()? {
            return Ok(ResumeRes::None);
        }
        self.set_dcsr_bits(0x4, false)?;
        Ok(ResumeRes::Interrupted)
    }

    fn wait_continue(&mut self) -> Result<ResumeRes, RiscvError> {
        if !self.poll_halted()? {
            return Ok(ResumeRes::None);
        }

        let dcsr = Dcsr::from(self.dmi.read_csr(csr::DCSR)?);
        let result = if dcsr.cause() == Dcsr::CAUSE_EBREAK {
            ResumeRes::Interrupted
        } else {
            ResumeRes::Failure
        };
        self.set_dcsr_bits(Dcsr::EBREAK_MASK, false)?;
        Ok(result)
    }
}

impl DebugTarget for CorevTarget {
    fn register_count(&self) -> usize {
        // GPRs, PC and FPRs; the CSRs are deliberately not counted.
        REG_CSR0
    }

    fn register_size(&self) -> usize {
        4
    }

    fn read_register(&mut self, reg: usize) -> Option<u32> {
        let result = match reg {
            REG_ZERO..REG_PC => self.dmi.read_gpr(reg),
            REG_PC => self.dmi.read_csr(csr::DPC),
            REG_FT0..REG_CSR0 => self.dmi.read_fpr(reg - REG_FT0),
            REG_CSR0..=REG_CSR_LAST => self.dmi.read_csr((reg - REG_CSR0) as u16),
            _ => {
                tracing::warn!("read of register {reg} is out of range");
                return None;
            }
        };
        result.map_err(|e| tracing::warn!("register {reg} read failed: {e}")).ok()
    }

    fn write_register(&mut self, reg: usize, value: u32) -> usize {
        let result = match reg {
            REG_ZERO..REG_PC => self.dmi.write_gpr(reg, value),
            REG_PC => self.dmi.write_csr(csr::DPC, value),
            REG_FT0..REG_CSR0 => self.dmi.write_fpr(reg - REG_FT0, value),
            REG_CSR0..=REG_CSR_LAST => self.dmi.write_csr((reg - REG_CSR0) as u16, value),
            _ => {
                tracing::warn!("write of register {reg} is out of range");
                return 0;
            }
        };
        match result {
            Ok(()) => self.register_size(),
            Err(e) => {
                tracing::warn!("register {reg} write failed: {e}");
                0
            }
        }
    }

    fn read_mem(&mut self, addr: u32, buf: &mut [u8]) -> usize {
        match self.dmi.read_mem(addr, buf.len()) {
            Ok(bytes) => {
                buf.copy_from_slice(&bytes);
                bytes.len()
            }
            Err(e) => {
                tracing::warn!("memory read at {addr:#010x} failed: {e}");
                0
            }
        }
    }

    fn write_mem(&mut self, addr: u32, data: &[u8]) -> usize {
        match self.dmi.write_mem(addr, data) {
            Ok(()) => data.len(),
            Err(e) => {
                tracing::warn!("memory write at {addr:#010x} failed: {e}");
                0
            }
        }
    }

    fn prepare(&mut self, actions: &[ResumeType]) -> bool {
        if actions.len() != 1 {
            return false;
        }
        self.run_action = actions[0];
        matches!(self.run_action, ResumeType::Step | ResumeType::Continue)
    }

    fn resume(&mut self) -> bool {
        let armed = match self.run_action {
            ResumeType::Step => self.set_dcsr_bits(0x4, true),
            ResumeType::Continue => self.set_dcsr_bits(Dcsr::EBREAK_MASK, true),
            ResumeType::None => return false,
        };
        if let Err(e) = armed {
            tracing::warn!("arming dcsr for resume failed: {e}");
            return false;
        }

        self.dmi
            .resume_hart(0)
            .map_err(|e| tracing::warn!("resume request failed: {e}"))
            .is_ok()
    }

    fn wait(&mut self, results: &mut Vec<ResumeRes>) -> WaitRes {
        results.clear();
        results.resize(self.cpu_count(), ResumeRes::None);

        let outcome = match self.run_action {
            ResumeType::Step => self.wait_step(),
            ResumeType::Continue => self.wait_continue(),
            ResumeType::None => return WaitRes::Error,
        };

        match outcome {
            Ok(ResumeRes::None) => WaitRes::Timeout,
            Ok(result) => {
                results[0] = result;
                WaitRes::EventOccurred
            }
            Err(e) => {
                tracing::warn!("wait failed: {e}");
                WaitRes::Error
            }
        }
    }

    fn halt(&mut self) -> bool {
        if let Err(e) = self.dmi.halt_hart(0) {
            tracing::warn!("halt request failed: {e}");
            return false;
        }
        match self.dmi.read_register::<Dmstatus>() {
            Ok(status) => status.halted(),
            Err(e) => {
                tracing::warn!("dmstatus read failed: {e}");
                false
            }
        }
    }

    fn terminate(&mut self) -> ResumeRes {
        ResumeRes::None
    }

    fn reset(&mut self, _kind: ResetType) -> ResumeRes {
        // Rebuild the whole stack over a fresh device model; the old
        // simulation is dropped with its state.
        match Self::build_stack(&self.model_factory, &self.config) {
            Ok(dmi) => {
                self.sim_start_ns = dmi.sim_time_ns();
                self.dmi = dmi;
                self.run_action = ResumeType::None;
                ResumeRes::Success
            }
            Err(e) => {
                tracing::error!("target reset failed: {e}");
                ResumeRes::Failure
            }
        }
    }

    fn insert_matchpoint(&mut self, _addr: u32, _kind: MatchType) -> bool {
        false
    }

    fn remove_matchpoint(&mut self, _addr: u32, _kind: MatchType) -> bool {
        false
    }

    fn command(&mut self, _cmd: &str, _out: &mut dyn Write) -> bool {
        false
    }

    fn timestamp(&mut self) -> f64 {
        (self.dmi.sim_time_ns() - self.sim_start_ns) as f64 / 1e9
    }

    fn cycle_count(&self) -> u64 {
        (self.dmi.sim_time_ns() - self.sim_start_ns) / self.config.clk_period_ns
    }

    fn instr_count(&self) -> u64 {
        // Retired instructions are not observable over the debug port.
        0
    }

    fn cpu_count(&self) -> usize {
        1
    }

    fn current_cpu(&self) -> usize {
        0
    }

    fn set_current_cpu(&mut self, cpu: usize) {
        assert!(cpu == 0, "only one CPU is available");
    }

    fn supports_target_xml(&self) -> bool {
        true
    }

    fn target_xml(&mut self, _name: &str) -> Option<&str> {
        if self.xml.is_none() {
            self.xml = Some(desc::build_target_xml());
        }
        self.xml.as_deref()
    }

    fn syscall_arg_locs(&self) -> (SyscallArgLoc, Vec<SyscallArgLoc>, SyscallArgLoc) {
        (
            SyscallArgLoc::Register(1),
            vec![
                SyscallArgLoc::Register(2),
                SyscallArgLoc::Register(3),
                SyscallArgLoc::Register(4),
            ],
            SyscallArgLoc::Register(5),
        )
    }
}

/// Version of the target API implemented by this library.
pub const TARGET_API_VERSION: u64 = 1;

/// Plugin entry point: construct a target from a trace-flags word.
/// Returns null if the stack cannot be brought up.
#[no_mangle]
pub extern "C" fn create_target(trace_flags: u64) -> *mut CorevTarget {
    let config = TargetConfig {
        trace_dmi: trace_flags & 1 != 0,
        ..TargetConfig::default()
    };
    match CorevTarget::new(config) {
        Ok(target) => Box::into_raw(Box::new(target)),
        Err(e) => {
            tracing::error!("target construction failed: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Plugin entry point: the target-API version this library implements.
#[no_mangle]
pub extern "C" fn target_version() -> u64 {
    TARGET_API_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> CorevTarget {
        CorevTarget::new(TargetConfig::default()).unwrap()
    }

    #[test]
    fn register_map_shape() {
        let t = target();
        assert_eq!(t.register_count(), 65);
        assert_eq!(t.register_size(), 4);
        assert_eq!(t.cpu_count(), 1);
        assert_eq!(t.current_cpu(), 0);
    }

    #[test]
    fn pc_maps_to_dpc() {
        let mut t = target();
        assert_eq!(t.write_register(REG_PC, 0x8000_0040), 4);
        assert_eq!(t.read_register(REG_PC), Some(0x8000_0040));
        // dpc is also visible through its CSR number.
        assert_eq!(t.read_register(REG_CSR0 + csr::DPC as usize), Some(0x8000_0040));
    }

    #[test]
    fn gpr_and_fpr_round_trip() {
        let mut t = target();
        assert_eq!(t.write_register(5, 0xdead_beef), 4);
        assert_eq!(t.read_register(5), Some(0xdead_beef));

        assert_eq!(t.write_register(REG_FT0 + 2, 0x3f80_0000), 4);
        assert_eq!(t.read_register(REG_FT0 + 2), Some(0x3f80_0000));
    }

    #[test]
    fn out_of_range_register_is_rejected() {
        let mut t = target();
        assert_eq!(t.read_register(REG_CSR_LAST + 1), None);
        assert_eq!(t.write_register(REG_CSR_LAST + 1, 1), 0);
    }

    #[test]
    fn halt_reports_success() {
        let mut t = target();
        assert!(t.halt());
    }

    #[test]
    fn matchpoints_are_unsupported() {
        let mut t = target();
        assert!(!t.insert_matchpoint(0x1c00_8000, MatchType::Breakpoint));
        assert!(!t.remove_matchpoint(0x1c00_8000, MatchType::WatchWrite));
    }

    #[test]
    fn syscall_locations_are_fixed_registers() {
        let t = target();
        let (id, args, ret) = t.syscall_arg_locs();
        assert_eq!(id, SyscallArgLoc::Register(1));
        assert_eq!(args.len(), 3);
        assert_eq!(ret, SyscallArgLoc::Register(5));
    }

    #[test]
    fn target_xml_is_cached_and_wellformed() {
        let mut t = target();
        let xml = t.target_xml("target.xml").unwrap().to_owned();
        assert!(xml.starts_with("<?xml version=\"1.0\"?>"));
        assert!(xml.contains("<architecture>riscv:rv32</architecture>"));
        assert!(xml.contains("org.gnu.gdb.riscv.cpu"));
        assert!(xml.contains("org.gnu.gdb.riscv.fpu"));
        assert!(xml.contains("org.gnu.gdb.riscv.csr"));
        assert!(xml.contains("<reg name=\"pc\" bitsize=\"32\" type=\"code_ptr\" regnum=\"32\"/>"));

        // Second request returns the cached document.
        assert_eq!(t.target_xml("target.xml").unwrap(), xml);
    }

    #[test]
    fn reset_rebuilds_a_usable_stack() {
        let mut t = target();
        t.write_register(6, 0x1234_5678);
        assert_eq!(t.reset(ResetType::Cold), ResumeRes::Success);
        // Fresh model: the register file started over and the target
        // still responds.
        assert!(t.halt());
        assert_eq!(t.read_register(6), Some(0));
    }

    #[test]
    fn plugin_symbols() {
        assert_eq!(target_version(), TARGET_API_VERSION);
        let raw = create_target(0);
        assert!(!raw.is_null());
        let mut target = unsafe { Box::from_raw(raw) };
        assert!(target.halt());
    }
}
