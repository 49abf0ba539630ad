//! RISC-V JTAG Debug Transport Module.
//!
//! Packs DMI `(op, data, address)` triplets into DR scans of the
//! `dmiaccess` JTAG register and handles the result codes: RETRY resets
//! the DMI and tries again, ERROR is logged and the stale data returned,
//! since the layers above have no use for transport-level failure.

use bitfield::bitfield;

use crate::tap::Tap;
use crate::RiscvError;

/// JTAG instruction register values of the DTM.
mod ir {
    pub const IDCODE: u8 = 0x01;
    pub const DTMCS: u8 = 0x10;
    pub const DMIACCESS: u8 = 0x11;
}

/// Operation codes shifted into the `op` field of `dmiaccess`.
const OP_READ: u64 = 1;
const OP_WRITE: u64 = 2;

/// `dtmcs.dmireset` bit.
const DTMCS_DMIRESET: u32 = 1 << 16;

bitfield! {
    /// The `dtmcs` JTAG register.
    pub struct Dtmcs(u32);
    impl Debug;

    pub _, set_dmihardreset: 17;
    pub _, set_dmireset: 16;
    pub idle, _: 14, 12;
    pub dmistat, _: 11, 10;
    pub abits, _: 9, 4;
    pub version, _: 3, 0;
}

/// Result codes read back in the `op` field of `dmiaccess`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmiOperationStatus {
    Ok = 0,
    Reserved = 1,
    OperationFailed = 2,
    RequestInProgress = 3,
}

impl DmiOperationStatus {
    fn parse(value: u8) -> Option<Self> {
        use DmiOperationStatus::*;

        let status = match value {
            0 => Ok,
            1 => Reserved,
            2 => OperationFailed,
            3 => RequestInProgress,
            _ => return None,
        };

        Some(status)
    }
}

/// Access to a Debug Transport Module.
///
/// Seams the register layer from the concrete transport: the production
/// implementation is [`JtagDtm`]; tests substitute scripted ones.
pub trait DtmAccess {
    /// Take the transport and the device behind it through reset.
    fn reset(&mut self) -> Result<(), RiscvError>;

    /// Read a 32-bit DMI register.
    fn dmi_read(&mut self, address: u64) -> Result<u32, RiscvError>;

    /// Write a 32-bit DMI register.
    fn dmi_write(&mut self, address: u64, value: u32) -> Result<(), RiscvError>;

    /// Simulated time in nanoseconds.
    fn sim_time_ns(&self) -> u64;
}

/// The JTAG DTM over a simulated TAP.
pub struct JtagDtm {
    tap: Tap,
    /// Width of a `dmiaccess` scan: 34 + abits. Plausible default until
    /// `dtmcs` has been read.
    dmi_width: u8,
    addr_mask: u64,
    /// Ceiling on consecutive RETRY answers before giving up. `None`
    /// retries forever.
    retry_limit: Option<u32>,
}

impl JtagDtm {
    pub fn new(tap: Tap) -> Self {
        JtagDtm {
            tap,
            dmi_width: 42,
            addr_mask: 0xff,
            retry_limit: None,
        }
    }

    /// Bound the RETRY loop. The DMI reset between attempts is kept.
    pub fn retry_limit(&mut self, limit: Option<u32>) {
        self.retry_limit = limit;
    }

    pub fn read_idcode(&mut self) -> u32 {
        self.tap.read_reg(ir::IDCODE, 32) as u32
    }

    pub fn read_dtmcs(&mut self) -> Dtmcs {
        Dtmcs(self.tap.read_reg(ir::DTMCS, 32) as u32)
    }

    pub fn write_dtmcs(&mut self, value: u32) {
        self.tap.write_reg(ir::DTMCS, value as u64, 32);
    }

    /// Scan one `dmiaccess` operation and return the raw response.
    fn dmi_scan(&mut self, op: u64, address: u64, value: u32) -> u64 {
        let request = op | (value as u64) << 2 | (address & self.addr_mask) << 34;
        self.tap.access_reg(ir::DMIACCESS, request, self.dmi_width)
    }

    /// Re-read the response register until it stops answering RETRY,
    /// resetting the DMI between attempts.
    fn wait_for_result(&mut self, what: &str) -> Result<u64, RiscvError> {
        let mut retries = 0;
        loop {
            let response = self.tap.read_reg(ir::DMIACCESS, self.dmi_width);
            match DmiOperationStatus::parse((response & 0x3) as u8) {
                Some(DmiOperationStatus::RequestInProgress) => {
                    tracing::warn!("DMI {what} retry requested");
                    retries += 1;
                    if let Some(limit) = self.retry_limit {
                        if retries > limit {
                            return Err(RiscvError::RetryLimitExceeded(limit));
                        }
                    }
                    self.write_dtmcs(DTMCS_DMIRESET);
                }
                Some(DmiOperationStatus::Ok) => return Ok(response),
                status => {
                    tracing::warn!("unexpected DMI {what} result {status:?}: ignored");
                    return Ok(response);
                }
            }
        }
    }
}

impl DtmAccess for JtagDtm {
    /// Reset the TAP, learn the DMI geometry from `idcode` and `dtmcs`,
    /// then reset the DMI itself.
    fn reset(&mut self) -> Result<(), RiscvError> {
        self.tap.reset()?;

        let idcode = self.read_idcode();
        if idcode == 0 {
            return Err(RiscvError::NoTarget);
        }

        let dtmcs = self.read_dtmcs();
        if dtmcs.version() != 1 {
            return Err(RiscvError::UnsupportedDtmVersion(dtmcs.version() as u8));
        }

        let abits = dtmcs.abits();
        self.tap.idle_cycle_count(dtmcs.idle() as u8);
        self.dmi_width = (34 + abits) as u8;
        self.addr_mask = !(!0u64 << abits);

        tracing::debug!(
            "IDCODE = {idcode:#010x} [version = {}, part = {:#06x}, \
             manufacturer = {:#05x} [JEP106 id = {:#04x}, continuation = {}]]",
            (idcode >> 28) & 0xf,
            (idcode >> 12) & 0xffff,
            (idcode >> 1) & 0x7ff,
            (idcode >> 1) & 0x7f,
            (idcode >> 8) & 0xf,
        );
        tracing::debug!("{dtmcs:?}, addr mask = {:#010x}", self.addr_mask);

        self.write_dtmcs(DTMCS_DMIRESET);
        Ok(())
    }

    fn dmi_read(&mut self, address: u64) -> Result<u32, RiscvError> {
        self.dmi_scan(OP_READ, address, 0);
        let response = self.wait_for_result("read")?;
        Ok((response >> 2) as u32)
    }

    fn dmi_write(&mut self, address: u64, value: u32) -> Result<(), RiscvError> {
        self.dmi_scan(OP_WRITE, address, value);
        self.wait_for_result("write")?;
        Ok(())
    }

    fn sim_time_ns(&self) -> u64 {
        self.tap.sim_time_ns()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::fake_mcu::FakeMcu;
    use crate::sim::SimDevice;

    fn dtm_with(mcu: FakeMcu) -> JtagDtm {
        let dev = SimDevice::new(Box::new(mcu), 20, 0, None).unwrap();
        JtagDtm::new(Tap::new(dev))
    }

    #[test]
    fn reset_learns_dmi_geometry() {
        let mut dtm = dtm_with(FakeMcu::new());
        dtm.reset().unwrap();
        assert_eq!(dtm.dmi_width, 41);
        assert_eq!(dtm.addr_mask, 0x7f);
    }

    #[test]
    fn data0_round_trips() {
        let mut dtm = dtm_with(FakeMcu::new());
        dtm.reset().unwrap();

        dtm.dmi_write(0x04, 0xcafe_f00d).unwrap();
        assert_eq!(dtm.dmi_read(0x04).unwrap(), 0xcafe_f00d);
    }

    #[test]
    fn retry_answers_are_absorbed() {
        let mut mcu = FakeMcu::new();
        mcu.arm_retry_every(3);
        let mut dtm = dtm_with(mcu);
        dtm.reset().unwrap();

        // Every third operation stalls; the value must still arrive.
        for i in 0..8u32 {
            dtm.dmi_write(0x04, i).unwrap();
            assert_eq!(dtm.dmi_read(0x04).unwrap(), i);
        }
    }

    #[test]
    fn dtmcs_reports_version_one() {
        let mut dtm = dtm_with(FakeMcu::new());
        dtm.reset().unwrap();
        let dtmcs = dtm.read_dtmcs();
        assert_eq!(dtmcs.version(), 1);
        assert!(dtmcs.abits() >= 6);
    }
}
