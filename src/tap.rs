//! IEEE 1149.1 Test Access Port controller.
//!
//! Runs the 16-state TAP graph over a [`SimDevice`], exposing whole
//! register accesses: an optional IR shift followed by a DR shift of a
//! caller-chosen width, finishing in Update-DR so the write takes
//! effect. Repeated accesses with the same IR skip the IR scan and
//! instead dwell in Run-Test/Idle for a configurable number of cycles,
//! as the RISC-V DTM requires between `dmiaccess` scans.

use bitvec::field::BitField;
use bitvec::order::Lsb0;
use bitvec::vec::BitVec;

use crate::sim::SimDevice;
use crate::RiscvError;

/// Width of the instruction register on this TAP.
const IR_LEN: u8 = 5;

/// The sixteen controller states of IEEE 1149.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapState {
    TestLogicReset = 0,
    RunTestIdle = 1,
    SelectDrScan = 2,
    CaptureDr = 3,
    ShiftDr = 4,
    Exit1Dr = 5,
    PauseDr = 6,
    Exit2Dr = 7,
    UpdateDr = 8,
    SelectIrScan = 9,
    CaptureIr = 10,
    ShiftIr = 11,
    Exit1Ir = 12,
    PauseIr = 13,
    Exit2Ir = 14,
    UpdateIr = 15,
}

impl TapState {
    /// The state reached from `self` when TMS is sampled at a rising TCK
    /// edge.
    pub fn step(self, tms: bool) -> TapState {
        use TapState::*;
        match (self, tms) {
            (TestLogicReset, false) => RunTestIdle,
            (TestLogicReset, true) => TestLogicReset,
            (RunTestIdle, false) => RunTestIdle,
            (RunTestIdle, true) => SelectDrScan,
            (SelectDrScan, false) => CaptureDr,
            (SelectDrScan, true) => SelectIrScan,
            (CaptureDr, false) => ShiftDr,
            (CaptureDr, true) => Exit1Dr,
            (ShiftDr, false) => ShiftDr,
            (ShiftDr, true) => Exit1Dr,
            (Exit1Dr, false) => PauseDr,
            (Exit1Dr, true) => UpdateDr,
            (PauseDr, false) => PauseDr,
            (PauseDr, true) => Exit2Dr,
            (Exit2Dr, false) => ShiftDr,
            (Exit2Dr, true) => UpdateDr,
            (UpdateDr, false) => RunTestIdle,
            (UpdateDr, true) => SelectDrScan,
            (SelectIrScan, false) => CaptureIr,
            (SelectIrScan, true) => TestLogicReset,
            (CaptureIr, false) => ShiftIr,
            (CaptureIr, true) => Exit1Ir,
            (ShiftIr, false) => ShiftIr,
            (ShiftIr, true) => Exit1Ir,
            (Exit1Ir, false) => PauseIr,
            (Exit1Ir, true) => UpdateIr,
            (PauseIr, false) => PauseIr,
            (PauseIr, true) => Exit2Ir,
            (Exit2Ir, false) => ShiftIr,
            (Exit2Ir, true) => UpdateIr,
            (UpdateIr, false) => RunTestIdle,
            (UpdateIr, true) => SelectDrScan,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TapState::TestLogicReset => "Test-Logic-Reset",
            TapState::RunTestIdle => "Run-Test/Idle",
            TapState::SelectDrScan => "Select-DR-Scan",
            TapState::CaptureDr => "Capture-DR",
            TapState::ShiftDr => "Shift-DR",
            TapState::Exit1Dr => "Exit1-DR",
            TapState::PauseDr => "Pause-DR",
            TapState::Exit2Dr => "Exit2-DR",
            TapState::UpdateDr => "Update-DR",
            TapState::SelectIrScan => "Select-IR-Scan",
            TapState::CaptureIr => "Capture-IR",
            TapState::ShiftIr => "Shift-IR",
            TapState::Exit1Ir => "Exit1-IR",
            TapState::PauseIr => "Pause-IR",
            TapState::Exit2Ir => "Exit2-IR",
            TapState::UpdateIr => "Update-IR",
        }
    }
}

/// TMS value to drive for the first step of the walk from the row state
/// to the column state. Row/column order matches the [`TapState`]
/// discriminants.
#[rustfmt::skip]
const TMS_TOWARDS: [[u8; 16]; 16] = [
    // TLR                                            UIR
    [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], // Test-Logic-Reset
    [1, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1], // Run-Test/Idle
    [1, 1, 1, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1], // Select-DR-Scan
    [1, 1, 1, 1, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1], // Capture-DR
    [1, 1, 1, 1, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1], // Shift-DR
    [1, 1, 1, 1, 1, 1, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1], // Exit1-DR
    [1, 1, 1, 1, 1, 1, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1], // Pause-DR
    [1, 1, 1, 1, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1], // Exit2-DR
    [1, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1], // Update-DR
    [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0], // Select-IR-Scan
    [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 1, 1, 1, 1], // Capture-IR
    [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 1, 1, 1, 1], // Shift-IR
    [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 1], // Exit1-IR
    [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 1, 1], // Pause-IR
    [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 1], // Exit2-IR
    [1, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1], // Update-IR
];

/// The TAP controller driving a simulated device.
pub struct Tap {
    dev: SimDevice,
    state: TapState,
    /// Last value scanned into the IR. Starts as BYPASS so the first
    /// access always shifts the IR.
    last_ir: u8,
    /// Cycles to dwell in Run-Test/Idle between same-IR accesses.
    idle_cycles: u8,
}

impl Tap {
    pub fn new(dev: SimDevice) -> Self {
        Tap {
            dev,
            state: TapState::TestLogicReset,
            last_ir: 0,
            idle_cycles: 1,
        }
    }

    /// Set the Run-Test/Idle dwell count.
    ///
    /// Not known at construction; the DTM configures it from `dtmcs`
    /// after reset.
    pub fn idle_cycle_count(&mut self, cycles: u8) {
        self.idle_cycles = cycles;
    }

    /// Take the device and the TAP through reset.
    ///
    /// TMS is held low for the whole reset window: this device computes
    /// its next TAP state combinationally, and TMS high during reset
    /// would land it in Select-DR-Scan. For the same reason the
    /// controller leaves reset in Run-Test/Idle rather than
    /// Test-Logic-Reset.
    pub fn reset(&mut self) -> Result<(), RiscvError> {
        while self.dev.in_reset() {
            if self.dev.all_done() {
                return Err(RiscvError::SimulationFinished);
            }
            self.dev.set_tms(false);
            self.dev.eval();
            self.dev.advance_half_period();
        }

        self.state = TapState::RunTestIdle;
        Ok(())
    }

    /// Access a JTAG register: write `wdata` and read the old contents
    /// back in one DR scan of `len` bits, ending in Update-DR.
    ///
    /// If `ir` is already loaded the IR scan is skipped and the
    /// controller dwells in Run-Test/Idle instead.
    pub fn access_reg(&mut self, ir: u8, wdata: u64, len: u8) -> u64 {
        assert!(
            (2..=64).contains(&len),
            "JTAG register scan of {len} bits is out of range"
        );

        if self.last_ir == ir {
            self.goto_state(TapState::RunTestIdle);
            for _ in 1..self.idle_cycles {
                self.advance_state(false, false);
            }
        } else {
            self.shift_ir(ir);
            self.last_ir = ir;
        }

        self.shift_dr(wdata, len)
    }

    /// Write a JTAG register, discarding the scan-out.
    pub fn write_reg(&mut self, ir: u8, wdata: u64, len: u8) {
        self.access_reg(ir, wdata, len);
    }

    /// Read a JTAG register by scanning in zeros.
    pub fn read_reg(&mut self, ir: u8, len: u8) -> u64 {
        self.access_reg(ir, 0, len)
    }

    /// Simulated time in nanoseconds.
    pub fn sim_time_ns(&self) -> u64 {
        self.dev.sim_time_ns()
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> TapState {
        self.state
    }

    /// Shift a new value into the instruction register, LSB first,
    /// finishing in Update-IR.
    fn shift_ir(&mut self, ir: u8) {
        self.goto_state(TapState::ShiftIr);

        for i in 0..IR_LEN - 1 {
            self.advance_state(false, ir & (1 << i) != 0);
        }
        // TMS high on the final bit exits to Exit1-IR.
        self.advance_state(true, ir & (1 << (IR_LEN - 1)) != 0);

        self.goto_state(TapState::UpdateIr);
    }

    /// Shift `len` bits through the data register, LSB first, and return
    /// the bits shifted out. Finishes in Update-DR.
    ///
    /// TDO lags the shift by one TCK on this device, so the first
    /// captured bit is discarded and one extra low-TMS edge after the
    /// exit collects the final bit.
    fn shift_dr(&mut self, wdata: u64, len: u8) -> u64 {
        let len = len as usize;
        self.goto_state(TapState::ShiftDr);

        let mut out: BitVec<u64, Lsb0> = BitVec::repeat(false, len);

        // First bit in; the bit coming out belongs to no one.
        self.advance_state(false, wdata & 1 != 0);

        for i in 1..len - 1 {
            let tdo = self.advance_state(false, wdata & (1 << i) != 0);
            out.set(i - 1, tdo);
        }

        // Last bit in with TMS high, penultimate bit out.
        let tdo = self.advance_state(true, wdata & (1 << (len - 1)) != 0);
        out.set(len - 2, tdo);

        // One more low edge (into Pause-DR) to collect the final bit.
        let tdo = self.advance_state(false, wdata & (1 << (len - 1)) != 0);
        out.set(len - 1, tdo);

        self.goto_state(TapState::UpdateDr);
        out.load_le::<u64>()
    }

    /// Walk the controller to state `s`, driving TMS along the standard
    /// graph. Returns the TDO level seen on the last edge taken.
    fn goto_state(&mut self, s: TapState) -> bool {
        let mut tdo = self.dev.tdo();
        while self.state != s {
            let tms = TMS_TOWARDS[self.state as usize][s as usize] != 0;
            tdo = self.advance_state(tms, false);
        }
        tdo
    }

    /// Clock one TCK cycle: run to the TCK posedge, drive TMS/TDI, run
    /// to the following negedge, and return TDO. The device is left at a
    /// negedge.
    fn advance_state(&mut self, tms: bool, tdi: bool) -> bool {
        while !self.dev.tap_posedge() {
            self.dev.eval();
            self.dev.advance_half_period();
        }

        self.dev.set_tms(tms);
        self.dev.set_tdi(tdi);

        while !self.dev.tap_negedge() {
            self.dev.eval();
            self.dev.advance_half_period();
        }

        self.state = self.state.step(self.dev.tms());
        tracing::trace!("TAP -> {}", self.state.name());
        self.dev.tdo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::fake_mcu::FakeMcu;

    const ALL_STATES: [TapState; 16] = [
        TapState::TestLogicReset,
        TapState::RunTestIdle,
        TapState::SelectDrScan,
        TapState::CaptureDr,
        TapState::ShiftDr,
        TapState::Exit1Dr,
        TapState::PauseDr,
        TapState::Exit2Dr,
        TapState::UpdateDr,
        TapState::SelectIrScan,
        TapState::CaptureIr,
        TapState::ShiftIr,
        TapState::Exit1Ir,
        TapState::PauseIr,
        TapState::Exit2Ir,
        TapState::UpdateIr,
    ];

    fn tap() -> Tap {
        let dev = SimDevice::new(Box::new(FakeMcu::new()), 20, 0, None).unwrap();
        Tap::new(dev)
    }

    #[test]
    fn reset_with_tms_high_from_any_state() {
        // Five TMS=1 edges reach Test-Logic-Reset from anywhere.
        for start in ALL_STATES {
            let mut s = start;
            for _ in 0..5 {
                s = s.step(true);
            }
            assert_eq!(s, TapState::TestLogicReset, "from {}", start.name());
        }
    }

    #[test]
    fn tms_routing_reaches_every_state() {
        // Following the routing table must converge from every state to
        // every other state; the longest walk in the graph is 8 edges.
        for from in ALL_STATES {
            for to in ALL_STATES {
                let mut s = from;
                let mut steps = 0;
                while s != to {
                    s = s.step(TMS_TOWARDS[s as usize][to as usize] != 0);
                    steps += 1;
                    assert!(
                        steps <= 8,
                        "no path {} -> {}",
                        from.name(),
                        to.name()
                    );
                }
            }
        }
    }

    #[test]
    fn reset_parks_in_run_test_idle() {
        let mut t = tap();
        t.reset().unwrap();
        assert_eq!(t.state(), TapState::RunTestIdle);
    }

    #[test]
    fn reset_reports_simulation_end() {
        // Cap the simulation inside the reset window.
        let dev = SimDevice::new(Box::new(FakeMcu::new()), 20, 100, None).unwrap();
        let mut t = Tap::new(dev);
        assert!(matches!(t.reset(), Err(RiscvError::SimulationFinished)));
    }

    #[test]
    fn access_reg_finishes_in_update_dr() {
        let mut t = tap();
        t.reset().unwrap();
        t.access_reg(0x01, 0, 32);
        assert_eq!(t.state(), TapState::UpdateDr);
    }

    #[test]
    fn idcode_scan_returns_idcode() {
        let mut t = tap();
        t.reset().unwrap();
        let idcode = t.read_reg(0x01, 32) as u32;
        assert_eq!(idcode, FakeMcu::IDCODE);

        // A second scan with the same IR (no IR shift) reads the same.
        let again = t.read_reg(0x01, 32) as u32;
        assert_eq!(again, FakeMcu::IDCODE);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn oversized_scan_is_fatal() {
        let mut t = tap();
        t.reset().unwrap();
        t.access_reg(0x11, 0, 65);
    }
}
