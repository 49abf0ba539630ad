//! Static catalogue of the CORE-V CSRs.
//!
//! Maps the 12-bit CSR address to a printable name, a read-only flag and
//! the hardware feature the CSR belongs to. Drives target-description
//! generation and access validation; addresses not in the catalogue do
//! not exist on this device.

/// Hardware feature gating a CSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrGroup {
    /// Present in every configuration.
    Any,
    /// Present when the FPU is configured.
    Fp,
    /// Present when hardware loops are configured.
    Hwlp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsrInfo {
    pub address: u16,
    pub name: &'static str,
    pub read_only: bool,
    pub group: CsrGroup,
}

/// `dcsr`, the debug control and status CSR.
pub const DCSR: u16 = 0x7b0;
/// `dpc`, the debug program counter.
pub const DPC: u16 = 0x7b1;

const fn csr(address: u16, name: &'static str, read_only: bool, group: CsrGroup) -> CsrInfo {
    CsrInfo {
        address,
        name,
        read_only,
        group,
    }
}

/// Every CSR of the device, sorted by address.
#[rustfmt::skip]
pub static CSRS: &[CsrInfo] = &[
    // User floating point
    csr(0x001, "fflags", false, CsrGroup::Fp),
    csr(0x002, "frm", false, CsrGroup::Fp),
    csr(0x003, "fcsr", false, CsrGroup::Fp),
    // Machine trap setup
    csr(0x300, "mstatus", false, CsrGroup::Any),
    csr(0x301, "misa", false, CsrGroup::Any),
    csr(0x304, "mie", false, CsrGroup::Any),
    csr(0x305, "mtvec", false, CsrGroup::Any),
    // Machine counter setup
    csr(0x320, "mcountinhibit", false, CsrGroup::Any),
    csr(0x323, "mhpmevent3", false, CsrGroup::Any),
    csr(0x324, "mhpmevent4", false, CsrGroup::Any),
    csr(0x325, "mhpmevent5", false, CsrGroup::Any),
    csr(0x326, "mhpmevent6", false, CsrGroup::Any),
    csr(0x327, "mhpmevent7", false, CsrGroup::Any),
    csr(0x328, "mhpmevent8", false, CsrGroup::Any),
    csr(0x329, "mhpmevent9", false, CsrGroup::Any),
    csr(0x32a, "mhpmevent10", false, CsrGroup::Any),
    csr(0x32b, "mhpmevent11", false, CsrGroup::Any),
    csr(0x32c, "mhpmevent12", false, CsrGroup::Any),
    csr(0x32d, "mhpmevent13", false, CsrGroup::Any),
    csr(0x32e, "mhpmevent14", false, CsrGroup::Any),
    csr(0x32f, "mhpmevent15", false, CsrGroup::Any),
    csr(0x330, "mhpmevent16", false, CsrGroup::Any),
    csr(0x331, "mhpmevent17", false, CsrGroup::Any),
    csr(0x332, "mhpmevent18", false, CsrGroup::Any),
    csr(0x333, "mhpmevent19", false, CsrGroup::Any),
    csr(0x334, "mhpmevent20", false, CsrGroup::Any),
    csr(0x335, "mhpmevent21", false, CsrGroup::Any),
    csr(0x336, "mhpmevent22", false, CsrGroup::Any),
    csr(0x337, "mhpmevent23", false, CsrGroup::Any),
    csr(0x338, "mhpmevent24", false, CsrGroup::Any),
    csr(0x339, "mhpmevent25", false, CsrGroup::Any),
    csr(0x33a, "mhpmevent26", false, CsrGroup::Any),
    csr(0x33b, "mhpmevent27", false, CsrGroup::Any),
    csr(0x33c, "mhpmevent28", false, CsrGroup::Any),
    csr(0x33d, "mhpmevent29", false, CsrGroup::Any),
    csr(0x33e, "mhpmevent30", false, CsrGroup::Any),
    csr(0x33f, "mhpmevent31", false, CsrGroup::Any),
    // Machine trap handling
    csr(0x340, "mscratch", false, CsrGroup::Any),
    csr(0x341, "mepc", false, CsrGroup::Any),
    csr(0x342, "mcause", false, CsrGroup::Any),
    csr(0x343, "mtval", false, CsrGroup::Any),
    csr(0x344, "mip", false, CsrGroup::Any),
    // Trigger module
    csr(0x7a0, "tselect", false, CsrGroup::Any),
    csr(0x7a1, "tdata1", false, CsrGroup::Any),
    csr(0x7a2, "tdata2", false, CsrGroup::Any),
    csr(0x7a3, "tdata3", false, CsrGroup::Any),
    csr(0x7a4, "tinfo", true, CsrGroup::Any),
    csr(0x7a8, "mcontext", false, CsrGroup::Any),
    csr(0x7aa, "scontext", false, CsrGroup::Any),
    // Debug mode
    csr(0x7b0, "dcsr", false, CsrGroup::Any),
    csr(0x7b1, "dpc", false, CsrGroup::Any),
    csr(0x7b2, "dscratch0", false, CsrGroup::Any),
    csr(0x7b3, "dscratch1", false, CsrGroup::Any),
    // Hardware loops
    csr(0x800, "lpstart0", false, CsrGroup::Hwlp),
    csr(0x801, "lpend0", false, CsrGroup::Hwlp),
    csr(0x802, "lpcount0", false, CsrGroup::Hwlp),
    csr(0x804, "lpstart1", false, CsrGroup::Hwlp),
    csr(0x805, "lpend1", false, CsrGroup::Hwlp),
    csr(0x806, "lpcount1", false, CsrGroup::Hwlp),
    // Machine counters
    csr(0xb00, "mcycle", false, CsrGroup::Any),
    csr(0xb02, "minstret", false, CsrGroup::Any),
    csr(0xb03, "mhpmcounter3", false, CsrGroup::Any),
    csr(0xb04, "mhpmcounter4", false, CsrGroup::Any),
    csr(0xb05, "mhpmcounter5", false, CsrGroup::Any),
    csr(0xb06, "mhpmcounter6", false, CsrGroup::Any),
    csr(0xb07, "mhpmcounter7", false, CsrGroup::Any),
    csr(0xb08, "mhpmcounter8", false, CsrGroup::Any),
    csr(0xb09, "mhpmcounter9", false, CsrGroup::Any),
    csr(0xb0a, "mhpmcounter10", false, CsrGroup::Any),
    csr(0xb0b, "mhpmcounter11", false, CsrGroup::Any),
    csr(0xb0c, "mhpmcounter12", false, CsrGroup::Any),
    csr(0xb0d, "mhpmcounter13", false, CsrGroup::Any),
    csr(0xb0e, "mhpmcounter14", false, CsrGroup::Any),
    csr(0xb0f, "mhpmcounter15", false, CsrGroup::Any),
    csr(0xb10, "mhpmcounter16", false, CsrGroup::Any),
    csr(0xb11, "mhpmcounter17", false, CsrGroup::Any),
    csr(0xb12, "mhpmcounter18", false, CsrGroup::Any),
    csr(0xb13, "mhpmcounter19", false, CsrGroup::Any),
    csr(0xb14, "mhpmcounter20", false, CsrGroup::Any),
    csr(0xb15, "mhpmcounter21", false, CsrGroup::Any),
    csr(0xb16, "mhpmcounter22", false, CsrGroup::Any),
    csr(0xb17, "mhpmcounter23", false, CsrGroup::Any),
    csr(0xb18, "mhpmcounter24", false, CsrGroup::Any),
    csr(0xb19, "mhpmcounter25", false, CsrGroup::Any),
    csr(0xb1a, "mhpmcounter26", false, CsrGroup::Any),
    csr(0xb1b, "mhpmcounter27", false, CsrGroup::Any),
    csr(0xb1c, "mhpmcounter28", false, CsrGroup::Any),
    csr(0xb1d, "mhpmcounter29", false, CsrGroup::Any),
    csr(0xb1e, "mhpmcounter30", false, CsrGroup::Any),
    csr(0xb1f, "mhpmcounter31", false, CsrGroup::Any),
    csr(0xb80, "mcycleh", false, CsrGroup::Any),
    csr(0xb82, "minstreth", false, CsrGroup::Any),
    csr(0xb83, "mhpmcounterh3", false, CsrGroup::Any),
    csr(0xb84, "mhpmcounterh4", false, CsrGroup::Any),
    csr(0xb85, "mhpmcounterh5", false, CsrGroup::Any),
    csr(0xb86, "mhpmcounterh6", false, CsrGroup::Any),
    csr(0xb87, "mhpmcounterh7", false, CsrGroup::Any),
    csr(0xb88, "mhpmcounterh8", false, CsrGroup::Any),
    csr(0xb89, "mhpmcounterh9", false, CsrGroup::Any),
    csr(0xb8a, "mhpmcounterh10", false, CsrGroup::Any),
    csr(0xb8b, "mhpmcounterh11", false, CsrGroup::Any),
    csr(0xb8c, "mhpmcounterh12", false, CsrGroup::Any),
    csr(0xb8d, "mhpmcounterh13", false, CsrGroup::Any),
    csr(0xb8e, "mhpmcounterh14", false, CsrGroup::Any),
    csr(0xb8f, "mhpmcounterh15", false, CsrGroup::Any),
    csr(0xb90, "mhpmcounterh16", false, CsrGroup::Any),
    csr(0xb91, "mhpmcounterh17", false, CsrGroup::Any),
    csr(0xb92, "mhpmcounterh18", false, CsrGroup::Any),
    csr(0xb93, "mhpmcounterh19", false, CsrGroup::Any),
    csr(0xb94, "mhpmcounterh20", false, CsrGroup::Any),
    csr(0xb95, "mhpmcounterh21", false, CsrGroup::Any),
    csr(0xb96, "mhpmcounterh22", false, CsrGroup::Any),
    csr(0xb97, "mhpmcounterh23", false, CsrGroup::Any),
    csr(0xb98, "mhpmcounterh24", false, CsrGroup::Any),
    csr(0xb99, "mhpmcounterh25", false, CsrGroup::Any),
    csr(0xb9a, "mhpmcounterh26", false, CsrGroup::Any),
    csr(0xb9b, "mhpmcounterh27", false, CsrGroup::Any),
    csr(0xb9c, "mhpmcounterh28", false, CsrGroup::Any),
    csr(0xb9d, "mhpmcounterh29", false, CsrGroup::Any),
    csr(0xb9e, "mhpmcounterh30", false, CsrGroup::Any),
    csr(0xb9f, "mhpmcounterh31", false, CsrGroup::Any),
    // User counters
    csr(0xc00, "cycle", true, CsrGroup::Any),
    csr(0xc02, "instret", true, CsrGroup::Any),
    csr(0xc03, "hpmcounter3", true, CsrGroup::Any),
    csr(0xc04, "hpmcounter4", true, CsrGroup::Any),
    csr(0xc05, "hpmcounter5", true, CsrGroup::Any),
    csr(0xc06, "hpmcounter6", true, CsrGroup::Any),
    csr(0xc07, "hpmcounter7", true, CsrGroup::Any),
    csr(0xc08, "hpmcounter8", true, CsrGroup::Any),
    csr(0xc09, "hpmcounter9", true, CsrGroup::Any),
    csr(0xc0a, "hpmcounter10", true, CsrGroup::Any),
    csr(0xc0b, "hpmcounter11", true, CsrGroup::Any),
    csr(0xc0c, "hpmcounter12", true, CsrGroup::Any),
    csr(0xc0d, "hpmcounter13", true, CsrGroup::Any),
    csr(0xc0e, "hpmcounter14", true, CsrGroup::Any),
    csr(0xc0f, "hpmcounter15", true, CsrGroup::Any),
    csr(0xc10, "hpmcounter16", true, CsrGroup::Any),
    csr(0xc11, "hpmcounter17", true, CsrGroup::Any),
    csr(0xc12, "hpmcounter18", true, CsrGroup::Any),
    csr(0xc13, "hpmcounter19", true, CsrGroup::Any),
    csr(0xc14, "hpmcounter20", true, CsrGroup::Any),
    csr(0xc15, "hpmcounter21", true, CsrGroup::Any),
    csr(0xc16, "hpmcounter22", true, CsrGroup::Any),
    csr(0xc17, "hpmcounter23", true, CsrGroup::Any),
    csr(0xc18, "hpmcounter24", true, CsrGroup::Any),
    csr(0xc19, "hpmcounter25", true, CsrGroup::Any),
    csr(0xc1a, "hpmcounter26", true, CsrGroup::Any),
    csr(0xc1b, "hpmcounter27", true, CsrGroup::Any),
    csr(0xc1c, "hpmcounter28", true, CsrGroup::Any),
    csr(0xc1d, "hpmcounter29", true, CsrGroup::Any),
    csr(0xc1e, "hpmcounter30", true, CsrGroup::Any),
    csr(0xc1f, "hpmcounter31", true, CsrGroup::Any),
    csr(0xc80, "cycleh", true, CsrGroup::Any),
    csr(0xc82, "instreth", true, CsrGroup::Any),
    csr(0xc83, "hpmcounterh3", true, CsrGroup::Any),
    csr(0xc84, "hpmcounterh4", true, CsrGroup::Any),
    csr(0xc85, "hpmcounterh5", true, CsrGroup::Any),
    csr(0xc86, "hpmcounterh6", true, CsrGroup::Any),
    csr(0xc87, "hpmcounterh7", true, CsrGroup::Any),
    csr(0xc88, "hpmcounterh8", true, CsrGroup::Any),
    csr(0xc89, "hpmcounterh9", true, CsrGroup::Any),
    csr(0xc8a, "hpmcounterh10", true, CsrGroup::Any),
    csr(0xc8b, "hpmcounterh11", true, CsrGroup::Any),
    csr(0xc8c, "hpmcounterh12", true, CsrGroup::Any),
    csr(0xc8d, "hpmcounterh13", true, CsrGroup::Any),
    csr(0xc8e, "hpmcounterh14", true, CsrGroup::Any),
    csr(0xc8f, "hpmcounterh15", true, CsrGroup::Any),
    csr(0xc90, "hpmcounterh16", true, CsrGroup::Any),
    csr(0xc91, "hpmcounterh17", true, CsrGroup::Any),
    csr(0xc92, "hpmcounterh18", true, CsrGroup::Any),
    csr(0xc93, "hpmcounterh19", true, CsrGroup::Any),
    csr(0xc94, "hpmcounterh20", true, CsrGroup::Any),
    csr(0xc95, "hpmcounterh21", true, CsrGroup::Any),
    csr(0xc96, "hpmcounterh22", true, CsrGroup::Any),
    csr(0xc97, "hpmcounterh23", true, CsrGroup::Any),
    csr(0xc98, "hpmcounterh24", true, CsrGroup::Any),
    csr(0xc99, "hpmcounterh25", true, CsrGroup::Any),
    csr(0xc9a, "hpmcounterh26", true, CsrGroup::Any),
    csr(0xc9b, "hpmcounterh27", true, CsrGroup::Any),
    csr(0xc9c, "hpmcounterh28", true, CsrGroup::Any),
    csr(0xc9d, "hpmcounterh29", true, CsrGroup::Any),
    csr(0xc9e, "hpmcounterh30", true, CsrGroup::Any),
    csr(0xc9f, "hpmcounterh31", true, CsrGroup::Any),
    // Custom user
    csr(0xcc0, "uhartid", true, CsrGroup::Any),
    csr(0xcc1, "privlv", true, CsrGroup::Any),
    // Machine information
    csr(0xf11, "mvendorid", true, CsrGroup::Any),
    csr(0xf12, "marchid", true, CsrGroup::Any),
    csr(0xf13, "mimpid", true, CsrGroup::Any),
    csr(0xf14, "mhartid", true, CsrGroup::Any),
];

/// Look a CSR up by address.
pub fn lookup(address: u16) -> Option<&'static CsrInfo> {
    CSRS.binary_search_by_key(&address, |info| info.address)
        .ok()
        .map(|index| &CSRS[index])
}

/// Printable name of a CSR, `"UNKNOWN"` if it does not exist.
pub fn name(address: u16) -> &'static str {
    lookup(address).map_or("UNKNOWN", |info| info.name)
}

/// Whether a CSR is read-only. Nonexistent CSRs report read-only.
pub fn read_only(address: u16) -> bool {
    lookup(address).map_or(true, |info| info.read_only)
}

/// The feature group of a CSR, `None` if it does not exist.
pub fn group(address: u16) -> Option<CsrGroup> {
    lookup(address).map(|info| info.group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_and_unique() {
        for pair in CSRS.windows(2) {
            assert!(
                pair[0].address < pair[1].address,
                "{} and {} out of order",
                pair[0].name,
                pair[1].name
            );
        }
    }

    #[test]
    fn debug_csrs_are_catalogued() {
        assert_eq!(name(DCSR), "dcsr");
        assert_eq!(name(DPC), "dpc");
        assert!(!read_only(DPC));
    }

    #[test]
    fn lookup_respects_groups_and_access() {
        assert_eq!(group(0x001), Some(CsrGroup::Fp));
        assert_eq!(group(0x800), Some(CsrGroup::Hwlp));
        assert_eq!(group(0x300), Some(CsrGroup::Any));
        assert!(read_only(0xc00));
        assert!(!read_only(0x340));
    }

    #[test]
    fn unknown_addresses_do_not_exist() {
        assert_eq!(lookup(0x7c0), None);
        assert_eq!(name(0x7c0), "UNKNOWN");
        assert!(read_only(0x7c0));
        assert_eq!(group(0x7c0), None);
    }
}
