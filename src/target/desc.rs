//! GDB target-description XML generation.
//!
//! Enumerates the GPR, FPR and CSR sets into the standard `<target>`
//! document. CSRs come from the static catalogue, so only registers
//! that exist on the device are advertised.

use crate::dmi::csr;
use crate::target::{REG_CSR0, REG_FT0};

/// General registers in GDB numbering order, with their GDB types.
const GEN_REGS: [(&str, &str); 33] = [
    ("zero", "int"),
    ("ra", "code_ptr"),
    ("sp", "data_ptr"),
    ("gp", "data_ptr"),
    ("tp", "data_ptr"),
    ("t0", "int"),
    ("t1", "int"),
    ("t2", "int"),
    ("fp", "data_ptr"),
    ("s1", "int"),
    ("a0", "int"),
    ("a1", "int"),
    ("a2", "int"),
    ("a3", "int"),
    ("a4", "int"),
    ("a5", "int"),
    ("a6", "int"),
    ("a7", "int"),
    ("s2", "int"),
    ("s3", "int"),
    ("s4", "int"),
    ("s5", "int"),
    ("s6", "int"),
    ("s7", "int"),
    ("s8", "int"),
    ("s9", "int"),
    ("s10", "int"),
    ("s11", "int"),
    ("t3", "int"),
    ("t4", "int"),
    ("t5", "int"),
    ("t6", "int"),
    ("pc", "code_ptr"),
];

const FP_REGS: [&str; 32] = [
    "ft0", "ft1", "ft2", "ft3", "ft4", "ft5", "ft6", "ft7", "fs0", "fs1", "fa0", "fa1", "fa2",
    "fa3", "fa4", "fa5", "fa6", "fa7", "fs2", "fs3", "fs4", "fs5", "fs6", "fs7", "fs8", "fs9",
    "fs10", "fs11", "ft8", "ft9", "ft10", "ft11",
];

/// Build the target description document.
pub(super) fn build_target_xml() -> String {
    let mut xml = String::with_capacity(16 * 1024);
    xml.push_str("<?xml version=\"1.0\"?>\n");
    xml.push_str("<!DOCTYPE target SYSTEM \"gdb-target.dtd\">\n");
    xml.push_str("<target version=\"1.0\">\n");
    xml.push_str("  <architecture>riscv:rv32</architecture>\n");

    xml.push_str("  <feature name=\"org.gnu.gdb.riscv.cpu\">\n");
    for (regnum, (name, gdb_type)) in GEN_REGS.iter().enumerate() {
        xml.push_str(&format!(
            "    <reg name=\"{name}\" bitsize=\"32\" type=\"{gdb_type}\" regnum=\"{regnum}\"/>\n"
        ));
    }
    xml.push_str("  </feature>\n");

    xml.push_str("  <feature name=\"org.gnu.gdb.riscv.fpu\">\n");
    for (i, name) in FP_REGS.iter().enumerate() {
        let regnum = REG_FT0 + i;
        xml.push_str(&format!(
            "    <reg name=\"{name}\" bitsize=\"32\" type=\"ieee_single\" regnum=\"{regnum}\" group=\"float\"/>\n"
        ));
    }
    xml.push_str("  </feature>\n");

    xml.push_str("  <feature name=\"org.gnu.gdb.riscv.csr\">\n");
    for info in csr::CSRS {
        let regnum = REG_CSR0 + info.address as usize;
        xml.push_str(&format!(
            "    <reg name=\"{}\" bitsize=\"32\" type=\"uint32\" save-restore=\"no\" regnum=\"{regnum}\" group=\"csr\"/>\n",
            info.name
        ));
    }
    xml.push_str("  </feature>\n");

    xml.push_str("</target>\n");
    xml
}
