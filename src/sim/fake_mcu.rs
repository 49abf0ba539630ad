//! Behavioral model of the CORE-V MCU debug port.
//!
//! Implements [`DutModel`](super::DutModel) without any RTL: a JTAG TAP
//! with the device's quirks (reset parks in Run-Test/Idle, TDO lags the
//! shift by one TCK), the DTM registers, and a debug module with one
//! hart, a register file and system-bus memory. The self-test binary and
//! the test suite run the full transport stack against this model.
//!
//! Hart execution is modelled just deeply enough for the debug port:
//! a resumed hart runs for a fixed number of clock cycles, then halts by
//! itself if single-stepping or if `ebreak` entry to debug mode is
//! enabled in `dcsr`.

use std::collections::HashMap;

use crate::dmi::csr;
use crate::sim::DutModel;
use crate::tap::TapState;

const IR_LEN: u8 = 5;

const IR_IDCODE: u8 = 0x01;
const IR_DTMCS: u8 = 0x10;
const IR_DMIACCESS: u8 = 0x11;

/// DMI address bits advertised in `dtmcs.abits`.
const ABITS: u32 = 7;

/// Clock cycles a resumed hart runs before it steps or hits an ebreak.
const RUN_CYCLES: u32 = 40;

/// Clock cycles a system bus access stays busy.
const SB_LATENCY: u32 = 4;

/// Writable `dcsr` bits: ebreakm/s/u, stepie, stopcount, stoptime,
/// mprven and step.
const DCSR_WRITE_MASK: u32 = 0xbe14;

/// `dcsr.cause` values.
const CAUSE_EBREAK: u32 = 1;
const CAUSE_HALTREQ: u32 = 3;
const CAUSE_STEP: u32 = 4;

#[derive(Clone, Copy)]
enum DmiOp {
    Read { address: u64 },
    Write { address: u64, value: u32 },
}

/// Pending system bus transfer.
#[derive(Clone, Copy)]
enum BusOp {
    Read,
    Write(u32),
}

pub struct FakeMcu {
    // Input pins, committed by eval().
    clk: bool,
    rstn: bool,
    trst: bool,
    tck: bool,
    tms: bool,
    tdi: bool,
    prev_clk: bool,
    prev_tck: bool,

    // TAP.
    state: TapState,
    ir: u8,
    shift: u64,
    shift_len: u8,
    /// Shift-out bit sampled at the posedge, presented on TDO at the
    /// following negedge.
    tdo_pending: bool,
    tdo: bool,

    // DTM response latch for the `dmiaccess` register.
    resp_data: u32,
    resp_status: u8,
    deferred: Option<DmiOp>,
    retry_every: Option<u32>,
    ops_since_retry: u32,

    dm: DebugModule,
}

impl FakeMcu {
    pub const IDCODE: u32 = 0x249511c3;

    pub fn new() -> Self {
        FakeMcu {
            clk: false,
            rstn: false,
            trst: false,
            tck: false,
            tms: false,
            tdi: false,
            prev_clk: false,
            prev_tck: false,
            state: TapState::RunTestIdle,
            ir: IR_IDCODE,
            shift: 0,
            shift_len: 1,
            tdo_pending: false,
            tdo: false,
            resp_data: 0,
            resp_status: 0,
            deferred: None,
            retry_every: None,
            ops_since_retry: 0,
            dm: DebugModule::new(),
        }
    }

    /// Make every `n`th DMI operation answer RETRY until the next DMI
    /// reset. Used to exercise the transport retry path.
    pub fn arm_retry_every(&mut self, n: u32) {
        self.retry_every = Some(n);
        self.ops_since_retry = 0;
    }

    fn on_tck_posedge(&mut self) {
        let current = self.state;
        self.state = current.step(self.tms);

        match current {
            TapState::CaptureIr => {
                // IEEE mandates 01 in the two least significant bits.
                self.shift = 0b00001;
                self.shift_len = IR_LEN;
            }
            TapState::ShiftIr | TapState::ShiftDr => {
                self.tdo_pending = self.shift & 1 != 0;
                self.shift >>= 1;
                if self.tdi {
                    self.shift |= 1 << (self.shift_len - 1);
                }
            }
            TapState::UpdateIr => {
                self.ir = (self.shift & 0x1f) as u8;
            }
            TapState::CaptureDr => self.capture_dr(),
            TapState::UpdateDr => self.update_dr(),
            _ => {}
        }
    }

    fn capture_dr(&mut self) {
        let (value, len) = match self.ir {
            IR_IDCODE => (Self::IDCODE as u64, 32),
            IR_DTMCS => (self.dtmcs() as u64, 32),
            IR_DMIACCESS => (
                (self.resp_data as u64) << 2 | self.resp_status as u64,
                34 + ABITS as u8,
            ),
            // Everything else is BYPASS.
            _ => (0, 1),
        };
        self.shift = value;
        self.shift_len = len;
    }

    fn update_dr(&mut self) {
        match self.ir {
            IR_DTMCS => {
                // dmireset (bit 16) or dmihardreset (bit 17).
                if self.shift & 0x30000 != 0 {
                    if let Some(op) = self.deferred.take() {
                        self.execute_dmi(op);
                    }
                    self.resp_status = 0;
                }
            }
            IR_DMIACCESS => {
                let op = self.shift & 0x3;
                let value = (self.shift >> 2) as u32;
                let address = (self.shift >> 34) & ((1 << ABITS) - 1);
                let op = match op {
                    1 => DmiOp::Read { address },
                    2 => DmiOp::Write { address, value },
                    _ => return, // NOP leaves the response latch alone
                };

                if let Some(n) = self.retry_every {
                    self.ops_since_retry += 1;
                    if self.ops_since_retry >= n {
                        self.ops_since_retry = 0;
                        self.resp_status = 3;
                        self.deferred = Some(op);
                        return;
                    }
                }
                self.execute_dmi(op);
            }
            _ => {}
        }
    }

    fn execute_dmi(&mut self, op: DmiOp) {
        match op {
            DmiOp::Read { address } => self.resp_data = self.dm.read(address),
            DmiOp::Write { address, value } => {
                self.dm.write(address, value);
                self.resp_data = 0;
            }
        }
        self.resp_status = 0;
    }

    fn dtmcs(&self) -> u32 {
        // idle = 1, version = 1.
        (1 << 12) | (ABITS << 4) | 1
    }
}

impl Default for FakeMcu {
    fn default() -> Self {
        Self::new()
    }
}

impl DutModel for FakeMcu {
    fn eval(&mut self) {
        if !self.trst {
            // The TAP of this device leaves reset in Run-Test/Idle.
            self.state = TapState::RunTestIdle;
            self.ir = IR_IDCODE;
            self.tdo = false;
            self.tdo_pending = false;
        } else {
            if self.tck && !self.prev_tck {
                self.on_tck_posedge();
            }
            if !self.tck && self.prev_tck {
                self.tdo = self.tdo_pending;
            }
        }

        if !self.rstn {
            self.dm.reset();
        } else if self.clk && !self.prev_clk {
            self.dm.on_clk_posedge();
        }

        self.prev_tck = self.tck;
        self.prev_clk = self.clk;
    }

    fn set_clk(&mut self, level: bool) {
        self.clk = level;
    }

    fn set_rstn(&mut self, level: bool) {
        self.rstn = level;
    }

    fn set_trst(&mut self, level: bool) {
        self.trst = level;
    }

    fn set_tck(&mut self, level: bool) {
        self.tck = level;
    }

    fn set_tms(&mut self, level: bool) {
        self.tms = level;
    }

    fn set_tdi(&mut self, level: bool) {
        self.tdi = level;
    }

    fn tms(&self) -> bool {
        self.tms
    }

    fn tdi(&self) -> bool {
        self.tdi
    }

    fn tdo(&self) -> bool {
        self.tdo
    }

    fn finished(&self) -> bool {
        false
    }
}

/// The debug module with one hart behind it.
struct DebugModule {
    dmactive: bool,
    haltreq: bool,
    halted: bool,
    resumeack: bool,
    /// Clock cycles left until a resumed hart stops on its own.
    run_countdown: u32,

    gprs: [u32; 32],
    fprs: [u32; 32],
    csrs: HashMap<u16, u32>,
    dcsr: u32,
    cause: u32,
    dpc: u32,

    data: [u32; 12],
    cmderr: u32,
    progbuf: [u32; 16],
    hawindowsel: u32,
    hawindow: u32,

    // System bus.
    sbcs_ctl: u32,
    sbaddress: u32,
    sbdata: u32,
    sberror: u32,
    sbbusyerror: bool,
    sb_busy: u32,
    sb_pending: Option<BusOp>,
    memory: HashMap<u32, u32>,
}

impl DebugModule {
    fn new() -> Self {
        DebugModule {
            dmactive: false,
            haltreq: false,
            halted: false,
            resumeack: false,
            run_countdown: 0,
            gprs: [0; 32],
            fprs: [0; 32],
            csrs: HashMap::new(),
            dcsr: 0,
            cause: 0,
            dpc: 0,
            data: [0; 12],
            cmderr: 0,
            progbuf: [0; 16],
            hawindowsel: 0,
            hawindow: 0,
            sbcs_ctl: 2 << 17,
            sbaddress: 0,
            sbdata: 0,
            sberror: 0,
            sbbusyerror: false,
            sb_busy: 0,
            sb_pending: None,
            memory: HashMap::new(),
        }
    }

    fn reset(&mut self) {
        *self = DebugModule {
            memory: std::mem::take(&mut self.memory),
            ..DebugModule::new()
        };
    }

    fn on_clk_posedge(&mut self) {
        if self.sb_busy > 0 {
            self.sb_busy -= 1;
            if self.sb_busy == 0 {
                if let Some(op) = self.sb_pending.take() {
                    self.complete_bus_op(op);
                }
            }
        }

        if !self.halted && self.run_countdown > 0 {
            self.run_countdown -= 1;
            if self.run_countdown == 0 {
                if self.dcsr & 0x4 != 0 {
                    // Single step: one instruction, then back to debug mode.
                    self.halted = true;
                    self.cause = CAUSE_STEP;
                    self.dpc = self.dpc.wrapping_add(4);
                } else if self.dcsr & 0xb000 != 0 {
                    self.halted = true;
                    self.cause = CAUSE_EBREAK;
                }
            }
        }
    }

    fn read(&mut self, address: u64) -> u32 {
        match address {
            0x04..=0x0f => self.data[(address - 0x04) as usize],
            0x10 => self.dmcontrol(),
            0x11 => self.dmstatus(),
            0x12 => (2 << 20) | (1 << 12) | 0x380,
            0x13 | 0x34 | 0x35 => 0,
            0x14 => self.hawindowsel,
            0x15 => self.hawindow,
            0x16 => (8 << 24) | (self.cmderr << 8) | 1,
            0x18 => 0,
            0x19..=0x1c => 0,
            0x1d => 0,
            0x20..=0x2f => self.progbuf[(address - 0x20) as usize],
            0x30 => 0,
            0x38 => self.sbcs(),
            0x39 => self.sbaddress,
            0x3c => {
                let value = self.sbdata;
                // sbreadondata triggers the next (auto-incremented) read.
                if self.sbcs_ctl & (1 << 15) != 0 {
                    self.trigger_bus_op(BusOp::Read);
                }
                value
            }
            0x3a | 0x3b | 0x3d..=0x3f => 0,
            0x40 => self.halted as u32,
            _ => 0,
        }
    }

    fn write(&mut self, address: u64, value: u32) {
        match address {
            0x04..=0x0f => self.data[(address - 0x04) as usize] = value,
            0x10 => self.write_dmcontrol(value),
            0x14 => self.hawindowsel = value & 0x7fff,
            0x15 => self.hawindow = value,
            0x16 => self.cmderr &= !((value >> 8) & 0x7),
            0x17 => self.abstract_command(value),
            0x20..=0x2f => self.progbuf[(address - 0x20) as usize] = value,
            0x38 => {
                // sbreadonaddr, sbaccess, sbautoincrement and
                // sbreadondata latch; sberror and sbbusyerror are W1C.
                self.sbcs_ctl = value & 0x001f8000;
                if value & (7 << 12) != 0 {
                    self.sberror = 0;
                }
                if value & (1 << 22) != 0 {
                    self.sbbusyerror = false;
                }
            }
            0x39 => {
                if self.sb_busy > 0 {
                    self.sbbusyerror = true;
                    return;
                }
                self.sbaddress = value;
                if self.sbcs_ctl & (1 << 20) != 0 {
                    self.trigger_bus_op(BusOp::Read);
                }
            }
            0x3c => {
                if self.sb_busy > 0 {
                    self.sbbusyerror = true;
                    return;
                }
                self.sbdata = value;
                self.trigger_bus_op(BusOp::Write(value));
            }
            _ => {}
        }
    }

    fn dmcontrol(&self) -> u32 {
        // hartsel reads back as the latched value; a single hart latches
        // no bits at all.
        (self.haltreq as u32) << 31 | self.dmactive as u32
    }

    fn write_dmcontrol(&mut self, value: u32) {
        let dmactive = value & 1 != 0;
        if !dmactive {
            // Deasserting dmactive resets the debug module but not the
            // hart or the memory behind the bus.
            let halted = self.halted;
            self.reset();
            self.halted = halted;
            return;
        }
        self.dmactive = true;

        if value & (1 << 1) != 0 {
            // ndmreset: reset the hart.
            self.halted = false;
            self.run_countdown = 0;
            self.dcsr = 0;
            self.cause = 0;
        }

        self.haltreq = value & (1 << 31) != 0;
        if self.haltreq && !self.halted {
            self.halted = true;
            self.cause = CAUSE_HALTREQ;
        }

        let resumereq = value & (1 << 30) != 0;
        if resumereq && !self.haltreq && self.halted {
            self.halted = false;
            self.resumeack = true;
            self.run_countdown = RUN_CYCLES;
        }
    }

    fn dmstatus(&self) -> u32 {
        let mut status = (1 << 7) | 2; // authenticated, version 0.13
        if self.halted {
            status |= 3 << 8;
        } else {
            status |= 3 << 10;
        }
        if self.resumeack {
            status |= 3 << 16;
        }
        status
    }

    fn abstract_command(&mut self, command: u32) {
        // While cmderr is set further commands are ignored.
        if self.cmderr != 0 {
            return;
        }

        let cmdtype = command >> 24;
        let aarsize = (command >> 20) & 0x7;
        let transfer = command & (1 << 17) != 0;
        let write = command & (1 << 16) != 0;
        let postexec = command & (1 << 18) != 0;
        let regno = (command & 0xffff) as u16;

        if cmdtype != 0 || aarsize != 2 || postexec {
            self.cmderr = 2;
            return;
        }
        if !transfer {
            return;
        }
        if !self.halted {
            self.cmderr = 4;
            return;
        }

        if write {
            let value = self.data[0];
            match regno {
                0x1000 => {} // x0 is hardwired
                0x1001..=0x101f => self.gprs[(regno - 0x1000) as usize] = value,
                0x1020..=0x103f => self.fprs[(regno - 0x1020) as usize] = value,
                _ => self.write_csr(regno, value),
            }
        } else {
            let value = match regno {
                0x1000 => Some(0),
                0x1001..=0x101f => Some(self.gprs[(regno - 0x1000) as usize]),
                0x1020..=0x103f => Some(self.fprs[(regno - 0x1020) as usize]),
                _ => self.read_csr(regno),
            };
            if let Some(value) = value {
                self.data[0] = value;
            }
        }
    }

    fn read_csr(&mut self, address: u16) -> Option<u32> {
        if csr::lookup(address).is_none() {
            self.cmderr = 3;
            return None;
        }
        Some(match address {
            csr::DCSR => (4 << 28) | (self.dcsr & DCSR_WRITE_MASK) | (self.cause << 6) | 3,
            csr::DPC => self.dpc,
            _ => self.csrs.get(&address).copied().unwrap_or(0),
        })
    }

    fn write_csr(&mut self, address: u16, value: u32) {
        match csr::lookup(address) {
            None => self.cmderr = 3,
            Some(info) if info.read_only => self.cmderr = 3,
            Some(_) => match address {
                csr::DCSR => self.dcsr = value & DCSR_WRITE_MASK,
                csr::DPC => self.dpc = value,
                _ => {
                    self.csrs.insert(address, value);
                }
            },
        }
    }

    fn sbcs(&self) -> u32 {
        (1 << 29)                       // sbversion 1
            | (self.sbbusyerror as u32) << 22
            | ((self.sb_busy > 0) as u32) << 21
            | self.sbcs_ctl
            | self.sberror << 12
            | 32 << 5                   // sbasize
            | 1 << 2 // 32-bit access support
    }

    fn trigger_bus_op(&mut self, op: BusOp) {
        if (self.sbcs_ctl >> 17) & 0x7 != 2 {
            self.sberror = 4;
            return;
        }
        if self.sbaddress & 0x3 != 0 {
            self.sberror = 3;
            return;
        }
        self.sb_busy = SB_LATENCY;
        self.sb_pending = Some(op);
    }

    fn complete_bus_op(&mut self, op: BusOp) {
        match op {
            BusOp::Read => {
                // The bus on this device acknowledges every address;
                // unmapped reads return a poison value.
                self.sbdata = self
                    .memory
                    .get(&self.sbaddress)
                    .copied()
                    .unwrap_or(0xbadcab1e);
            }
            BusOp::Write(value) => {
                self.memory.insert(self.sbaddress, value);
            }
        }
        // sbautoincrement
        if self.sbcs_ctl & (1 << 16) != 0 {
            self.sbaddress = self.sbaddress.wrapping_add(4);
        }
    }
}
