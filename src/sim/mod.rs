//! Clock, reset and pin-level access to the cycle-stepped device model.
//!
//! [`SimDevice`] owns the device model and is the only place simulated
//! time advances. It drives the main clock, the JTAG test clock (TCK, at
//! a quarter of the main clock rate) and the active-low resets as pure
//! functions of the tick counter, and reports TCK edges so the layer
//! above can honor the JTAG sampling rules: inputs change on a TCK
//! posedge, TDO is sampled on a TCK negedge.

pub mod fake_mcu;
mod vcd;

use std::io;
use std::path::Path;

use self::vcd::VcdWriter;

/// Pin-level view of the device under test.
///
/// A production build implements this for the generated RTL model; the
/// in-crate [`fake_mcu::FakeMcu`] implements it behaviorally for tests
/// and the standalone self-tests. `eval` commits the current input pin
/// values to the model and recomputes its outputs; all other methods are
/// plain pin accessors with no side effects.
pub trait DutModel {
    /// Commit inputs and recompute outputs.
    fn eval(&mut self);

    fn set_clk(&mut self, level: bool);
    fn set_rstn(&mut self, level: bool);
    fn set_trst(&mut self, level: bool);
    fn set_tck(&mut self, level: bool);
    fn set_tms(&mut self, level: bool);
    fn set_tdi(&mut self, level: bool);

    fn tms(&self) -> bool;
    fn tdi(&self) -> bool;
    fn tdo(&self) -> bool;

    /// Whether the model executed `$finish`.
    fn finished(&self) -> bool;
}

/// The simulated device, stepped half a main-clock period at a time.
///
/// One tick is one nanosecond. The TCK half-period is twice the main
/// clock half-period, and reset is held asserted (low) for the first ten
/// TCK half-periods.
pub struct SimDevice {
    dut: Box<dyn DutModel>,
    /// Tick counter, 1 tick = 1 ns.
    ticks: u64,
    clk_half_period: u64,
    tck_half_period: u64,
    reset_period: u64,
    /// Simulated-time cap in ticks, 0 meaning unbounded.
    time_cap: u64,
    tck: bool,
    tck_posedge: bool,
    tck_negedge: bool,
    wave: Option<VcdWriter>,
}

impl SimDevice {
    /// Create a device stepped with the given main clock period.
    ///
    /// `sim_time_ns` caps the simulation (0 = run forever); `wave_path`
    /// enables VCD tracing of the debug pins.
    pub fn new(
        dut: Box<dyn DutModel>,
        clk_period_ns: u64,
        sim_time_ns: u64,
        wave_path: Option<&Path>,
    ) -> io::Result<Self> {
        let clk_half_period = clk_period_ns / 2;
        let tck_half_period = clk_half_period * 2;

        let wave = wave_path.map(VcdWriter::create).transpose()?;

        let mut dev = SimDevice {
            dut,
            ticks: 0,
            clk_half_period,
            tck_half_period,
            reset_period: tck_half_period * 10,
            time_cap: sim_time_ns,
            tck: true,
            tck_posedge: true,
            tck_negedge: false,
            wave,
        };

        // Pin levels at tick 0: both clocks high, resets asserted.
        dev.dut.set_clk(true);
        dev.dut.set_tck(true);
        dev.dut.set_rstn(false);
        dev.dut.set_trst(false);
        Ok(dev)
    }

    /// Advance simulated time by one main-clock half-period.
    ///
    /// Clock, reset and TCK pins are recomputed from the new tick count;
    /// the posedge/negedge flags describe the TCK transition this call
    /// performed (if any).
    pub fn advance_half_period(&mut self) {
        self.ticks += self.clk_half_period;

        let old_tck = self.tck;
        let rstn = self.ticks >= self.reset_period;
        let clk = (self.ticks / self.clk_half_period) % 2 == 0;
        self.tck = (self.ticks / self.tck_half_period) % 2 == 0;

        self.dut.set_clk(clk);
        self.dut.set_rstn(rstn);
        self.dut.set_trst(rstn);
        self.dut.set_tck(self.tck);

        self.tck_posedge = !old_tck && self.tck;
        self.tck_negedge = old_tck && !self.tck;
    }

    /// Evaluate the model and dump a waveform frame if tracing.
    pub fn eval(&mut self) {
        self.dut.eval();

        if let Some(wave) = &mut self.wave {
            wave.dump(
                self.ticks,
                &[
                    (self.ticks / self.clk_half_period) % 2 == 0,
                    self.ticks >= self.reset_period,
                    self.tck,
                    self.dut.tms(),
                    self.dut.tdi(),
                    self.dut.tdo(),
                ],
            );
        }
    }

    /// Whether reset is still asserted at the current tick.
    pub fn in_reset(&self) -> bool {
        self.ticks < self.reset_period
    }

    /// Whether the last advance took TCK low-to-high.
    pub fn tap_posedge(&self) -> bool {
        self.tck_posedge
    }

    /// Whether the last advance took TCK high-to-low.
    pub fn tap_negedge(&self) -> bool {
        self.tck_negedge
    }

    /// Whether the model finished or the simulated-time cap was reached.
    pub fn all_done(&self) -> bool {
        self.dut.finished() || (self.time_cap != 0 && self.ticks >= self.time_cap)
    }

    /// Simulated time in nanoseconds.
    pub fn sim_time_ns(&self) -> u64 {
        self.ticks
    }

    pub fn set_tms(&mut self, level: bool) {
        self.dut.set_tms(level);
    }

    pub fn set_tdi(&mut self, level: bool) {
        self.dut.set_tdi(level);
    }

    pub fn tms(&self) -> bool {
        self.dut.tms()
    }

    pub fn tdi(&self) -> bool {
        self.dut.tdi()
    }

    pub fn tdo(&self) -> bool {
        self.dut.tdo()
    }
}

#[cfg(test)]
mod tests {
    use super::fake_mcu::FakeMcu;
    use super::*;

    fn device(clk_period_ns: u64, sim_time_ns: u64) -> SimDevice {
        SimDevice::new(Box::new(FakeMcu::new()), clk_period_ns, sim_time_ns, None).unwrap()
    }

    #[test]
    fn tick_counter_tracks_half_periods() {
        let mut dev = device(20, 0);
        for n in 1..=10 {
            dev.advance_half_period();
            assert_eq!(dev.sim_time_ns(), n * 10);
        }
    }

    #[test]
    fn tck_edges_every_second_advance() {
        let mut dev = device(20, 0);

        // TCK starts high; it toggles every two main-clock half-periods.
        let mut edges = Vec::new();
        for _ in 0..8 {
            dev.advance_half_period();
            edges.push((dev.tap_posedge(), dev.tap_negedge()));
        }
        assert_eq!(
            edges,
            [
                (false, false),
                (false, true),
                (false, false),
                (true, false),
                (false, false),
                (false, true),
                (false, false),
                (true, false),
            ]
        );
    }

    #[test]
    fn reset_spans_ten_tck_half_periods() {
        let mut dev = device(20, 0);

        // 10 TCK half-periods = 20 main-clock half-periods = 200 ns.
        assert!(dev.in_reset());
        for _ in 0..19 {
            dev.advance_half_period();
            assert!(dev.in_reset());
        }
        dev.advance_half_period();
        assert!(!dev.in_reset());
    }

    #[test]
    fn time_cap_terminates_simulation() {
        let mut dev = device(20, 100);
        assert!(!dev.all_done());
        for _ in 0..10 {
            dev.advance_half_period();
        }
        assert!(dev.all_done());
    }

    #[test]
    fn unbounded_simulation_never_expires() {
        let mut dev = device(20, 0);
        for _ in 0..1000 {
            dev.advance_half_period();
        }
        assert!(!dev.all_done());
    }
}
