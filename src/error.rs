use thiserror::Error;

use crate::dmi::registers::{AbstractCommandErrorKind, SystemBusErrorKind};

/// Errors surfaced by the debug transport stack.
///
/// Transport-level retries and unexpected DMI result codes are handled
/// (and logged) inside the DTM and never surface here; what remains is
/// either the simulation going away underneath us, or an error the debug
/// module itself reported.
#[derive(Debug, Error)]
pub enum RiscvError {
    /// The simulation signalled `$finish` or hit the simulated-time cap
    /// before the operation completed.
    #[error("simulation finished before the operation completed")]
    SimulationFinished,

    /// The DTM kept answering RETRY past the configured ceiling.
    #[error("DMI access still busy after {0} retries")]
    RetryLimitExceeded(u32),

    /// No target responded on the scan chain (IDCODE read back as zero).
    #[error("no target detected on the JTAG scan chain")]
    NoTarget,

    /// The DTM reports a debug transport version we do not speak.
    #[error("unsupported debug transport module version {0}")]
    UnsupportedDtmVersion(u8),

    /// An abstract command finished with a non-zero `cmderr`.
    #[error("abstract command failed: {0:?}")]
    AbstractCommand(AbstractCommandErrorKind),

    /// A system bus access finished with a non-zero `sberror`.
    #[error("system bus access failed: {0:?}")]
    SystemBus(SystemBusErrorKind),

    /// Creating the waveform dump file failed.
    #[error("waveform output: {0}")]
    Wave(#[from] std::io::Error),
}
