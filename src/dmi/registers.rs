//! The DMI register set of the RISC-V Debug Specification v0.13.2.
//!
//! Structured registers are `bitfield!` newtypes over `u32`; plain
//! 32-bit ones are generated by `data_register!`. Every register type
//! implements [`DebugRegister`], carrying its DMI address, printable
//! name and reset value.
//!
//! For registers the debug module treats as write-1-to-clear
//! (`abstractcs.cmderr`, `sbcs.sberror`, `sbcs.sbbusyerror`) the clear
//! helpers set the field to all ones so the next write clears it on the
//! device side.

use bitfield::bitfield;

/// A register of the Debug Module Interface.
pub trait DebugRegister: From<u32> + Into<u32> + Copy + core::fmt::Debug {
    /// The DMI address of this register.
    const ADDRESS: u64;
    /// Printable name, as in the debug specification.
    const NAME: &'static str;
    /// Value the register assumes on debug-module reset.
    const RESET_VALUE: u32 = 0;

    fn reset() -> Self {
        Self::from(Self::RESET_VALUE)
    }
}

macro_rules! data_register {
    ($(#[$outer:meta])* $i:ident, $addr:expr, $name:expr) => {
        $(#[$outer])*
        #[derive(Debug, Copy, Clone)]
        pub struct $i(pub u32);

        impl From<$i> for u32 {
            fn from(register: $i) -> Self {
                register.0
            }
        }

        impl From<u32> for $i {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl DebugRegister for $i {
            const ADDRESS: u64 = $addr;
            const NAME: &'static str = $name;
        }
    };
}

/// Implements the conversions and [`DebugRegister`] for a `bitfield!`
/// register type.
macro_rules! register_addr {
    ($i:ident, $addr:expr, $name:expr) => {
        register_addr! { $i, $addr, $name, reset = 0 }
    };
    ($i:ident, $addr:expr, $name:expr, reset = $reset:expr) => {
        impl From<$i> for u32 {
            fn from(register: $i) -> Self {
                register.0
            }
        }

        impl From<u32> for $i {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl DebugRegister for $i {
            const ADDRESS: u64 = $addr;
            const NAME: &'static str = $name;
            const RESET_VALUE: u32 = $reset;
        }
    };
}

/// One named field of a register: mask, right-shift offset and width in
/// bits. `mask == ((1 << width) - 1) << offset` holds for every entry.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub mask: u32,
    pub offset: u32,
    pub width: u32,
}

const fn field(name: &'static str, mask: u32, offset: u32, width: u32) -> Field {
    Field {
        name,
        mask,
        offset,
        width,
    }
}

// DMI addresses of the indexed register groups.

pub const DATA_ADDR: [u64; 12] = [
    0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
];
/// `haltsum0` lives apart from its siblings.
pub const HALTSUM_ADDR: [u64; 4] = [0x40, 0x13, 0x34, 0x35];
pub const CONFSTRPTR_ADDR: [u64; 4] = [0x19, 0x1a, 0x1b, 0x1c];
pub const PROGBUF_ADDR: [u64; 16] = [
    0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x2b, 0x2c, 0x2d, 0x2e,
    0x2f,
];
/// `sbaddress3` sits below its siblings.
pub const SBADDRESS_ADDR: [u64; 4] = [0x39, 0x3a, 0x3b, 0x37];
pub const SBDATA_ADDR: [u64; 4] = [0x3c, 0x3d, 0x3e, 0x3f];

bitfield! {
    /// The `dmcontrol` register, at 0x10.
    #[derive(Copy, Clone)]
    pub struct Dmcontrol(u32);
    impl Debug;

    pub haltreq, set_haltreq: 31;
    pub resumereq, set_resumereq: 30;
    pub hartreset, set_hartreset: 29;
    pub ackhavereset, set_ackhavereset: 28;
    pub hasel, set_hasel: 26;
    pub hartsello, set_hartsello: 25, 16;
    pub hartselhi, set_hartselhi: 15, 6;
    pub setresethaltreq, set_setresethaltreq: 3;
    pub clrresethaltreq, set_clrresethaltreq: 2;
    pub ndmreset, set_ndmreset: 1;
    pub dmactive, set_dmactive: 0;
}
register_addr! { Dmcontrol, 0x10, "dmcontrol" }

impl Dmcontrol {
    /// The selected hart: `hartselhi << 10 | hartsello`.
    pub fn hartsel(&self) -> u32 {
        self.hartselhi() << 10 | self.hartsello()
    }

    /// Select a hart. Bits beyond the 20-bit field are dropped.
    pub fn set_hartsel(&mut self, hartsel: u32) {
        self.set_hartsello(hartsel & 0x3ff);
        self.set_hartselhi((hartsel >> 10) & 0x3ff);
    }

    /// The largest value the `hartsel` field can carry.
    pub const fn hartsel_max() -> u32 {
        (1 << 20) - 1
    }

    pub const FIELDS: &'static [Field] = &[
        field("haltreq", 0x8000_0000, 31, 1),
        field("resumereq", 0x4000_0000, 30, 1),
        field("hartreset", 0x2000_0000, 29, 1),
        field("ackhavereset", 0x1000_0000, 28, 1),
        field("hasel", 0x0400_0000, 26, 1),
        field("hartsello", 0x03ff_0000, 16, 10),
        field("hartselhi", 0x0000_ffc0, 6, 10),
        field("setresethaltreq", 0x0000_0008, 3, 1),
        field("clrresethaltreq", 0x0000_0004, 2, 1),
        field("ndmreset", 0x0000_0002, 1, 1),
        field("dmactive", 0x0000_0001, 0, 1),
    ];
}

bitfield! {
    /// The read-only `dmstatus` register, at 0x11.
    #[derive(Copy, Clone)]
    pub struct Dmstatus(u32);
    impl Debug;

    pub impebreak, _: 22;
    pub allhavereset, _: 19;
    pub anyhavereset, _: 18;
    pub allresumeack, _: 17;
    pub anyresumeack, _: 16;
    pub allnonexistent, _: 15;
    pub anynonexistent, _: 14;
    pub allunavail, _: 13;
    pub anyunavail, _: 12;
    pub allrunning, _: 11;
    pub anyrunning, _: 10;
    pub allhalted, _: 9;
    pub anyhalted, _: 8;
    pub authenticated, _: 7;
    pub authbusy, _: 6;
    pub hasresethaltreq, _: 5;
    pub confstrptrvalid, _: 4;
    pub version, _: 3, 0;
}
register_addr! { Dmstatus, 0x11, "dmstatus" }

impl Dmstatus {
    // With a single selected hart the all/any distinction carries no
    // information; these fold the pairs.

    pub fn havereset(&self) -> bool {
        self.allhavereset() || self.anyhavereset()
    }

    pub fn resumeack(&self) -> bool {
        self.allresumeack() || self.anyresumeack()
    }

    pub fn nonexistent(&self) -> bool {
        self.allnonexistent() || self.anynonexistent()
    }

    pub fn unavail(&self) -> bool {
        self.allunavail() || self.anyunavail()
    }

    pub fn running(&self) -> bool {
        self.allrunning() || self.anyrunning()
    }

    pub fn halted(&self) -> bool {
        self.allhalted() || self.anyhalted()
    }

    pub const FIELDS: &'static [Field] = &[
        field("impebreak", 0x0040_0000, 22, 1),
        field("allhavereset", 0x0008_0000, 19, 1),
        field("anyhavereset", 0x0004_0000, 18, 1),
        field("allresumeack", 0x0002_0000, 17, 1),
        field("anyresumeack", 0x0001_0000, 16, 1),
        field("allnonexistent", 0x0000_8000, 15, 1),
        field("anynonexistent", 0x0000_4000, 14, 1),
        field("allunavail", 0x0000_2000, 13, 1),
        field("anyunavail", 0x0000_1000, 12, 1),
        field("allrunning", 0x0000_0800, 11, 1),
        field("anyrunning", 0x0000_0400, 10, 1),
        field("allhalted", 0x0000_0200, 9, 1),
        field("anyhalted", 0x0000_0100, 8, 1),
        field("authenticated", 0x0000_0080, 7, 1),
        field("authbusy", 0x0000_0040, 6, 1),
        field("hasresethaltreq", 0x0000_0020, 5, 1),
        field("confstrptrvalid", 0x0000_0010, 4, 1),
        field("version", 0x0000_000f, 0, 4),
    ];
}

bitfield! {
    /// The read-only `hartinfo` register, at 0x12.
    #[derive(Copy, Clone)]
    pub struct Hartinfo(u32);
    impl Debug;

    pub nscratch, _: 23, 20;
    pub dataaccess, _: 16;
    pub datasize, _: 15, 12;
    pub dataaddr, _: 11, 0;
}
register_addr! { Hartinfo, 0x12, "hartinfo" }

impl Hartinfo {
    pub const FIELDS: &'static [Field] = &[
        field("nscratch", 0x00f0_0000, 20, 4),
        field("dataaccess", 0x0001_0000, 16, 1),
        field("datasize", 0x0000_f000, 12, 4),
        field("dataaddr", 0x0000_0fff, 0, 12),
    ];
}

bitfield! {
    /// The `hawindowsel` register, at 0x14.
    #[derive(Copy, Clone)]
    pub struct Hawindowsel(u32);
    impl Debug;

    pub hawindowsel, set_hawindowsel: 14, 0;
}
register_addr! { Hawindowsel, 0x14, "hawindowsel" }

impl Hawindowsel {
    pub const FIELDS: &'static [Field] = &[field("hawindowsel", 0x0000_7fff, 0, 15)];
}

data_register! {
    /// The hart-array window register, at 0x15.
    Hawindow, 0x15, "hawindow"
}

bitfield! {
    /// The `abstractcs` register, at 0x16.
    #[derive(Copy, Clone)]
    pub struct Abstractcs(u32);
    impl Debug;

    pub progbufsize, _: 28, 24;
    pub busy, _: 12;
    pub cmderr, set_cmderr: 10, 8;
    pub datacount, _: 3, 0;
}
// cmderr is W1C; resetting with it set keeps the next write clearing.
register_addr! { Abstractcs, 0x16, "abstractcs", reset = 0x700 }

impl Abstractcs {
    /// Arm the next write to clear `cmderr`.
    pub fn clear_cmderr(&mut self) {
        self.set_cmderr(0x7);
    }

    pub const FIELDS: &'static [Field] = &[
        field("progbufsize", 0x1f00_0000, 24, 5),
        field("busy", 0x0000_1000, 12, 1),
        field("cmderr", 0x0000_0700, 8, 3),
        field("datacount", 0x0000_000f, 0, 4),
    ];
}

/// `abstractcs.cmderr` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbstractCommandErrorKind {
    None = 0,
    Busy = 1,
    NotSupported = 2,
    Exception = 3,
    HaltResume = 4,
    Bus = 5,
    Reserved = 6,
    Other = 7,
}

impl AbstractCommandErrorKind {
    pub fn parse(value: u32) -> Self {
        use AbstractCommandErrorKind::*;

        match value & 0x7 {
            0 => None,
            1 => Busy,
            2 => NotSupported,
            3 => Exception,
            4 => HaltResume,
            5 => Bus,
            6 => Reserved,
            _ => Other,
        }
    }
}

/// Abstract command types in `command.cmdtype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbstractCommandType {
    AccessRegister = 0,
    QuickAccess = 1,
    AccessMemory = 2,
}

/// Access widths used in `command.aarsize`/`aamsize` and
/// `sbcs.sbaccess`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiscvBusAccess {
    A8 = 0,
    A16 = 1,
    A32 = 2,
    A64 = 3,
    A128 = 4,
}

bitfield! {
    /// The write-only `command` register, at 0x17.
    #[derive(Copy, Clone)]
    pub struct Command(u32);
    impl Debug;

    pub cmdtype, set_cmdtype: 31, 24;
    pub control, set_control: 23, 0;
    pub aamvirtual, set_aamvirtual: 23;
    pub aarsize, set_aarsize: 22, 20;
    pub aamsize, set_aamsize: 22, 20;
    pub aapostincrement, set_aapostincrement: 19;
    pub postexec, set_postexec: 18;
    pub transfer, set_transfer: 17;
    pub write, set_write: 16;
    pub target_specific, set_target_specific: 15, 14;
    pub regno, set_regno: 15, 0;
}
register_addr! { Command, 0x17, "command" }

impl Command {
    /// An access-register command transferring a 32-bit value for
    /// `regno`.
    pub fn access_register(regno: u16, write: bool) -> Self {
        let mut command = Command(0);
        command.set_cmdtype(AbstractCommandType::AccessRegister as u32);
        command.set_aarsize(RiscvBusAccess::A32 as u32);
        command.set_transfer(true);
        command.set_write(write);
        command.set_regno(regno as u32);
        command
    }

    pub const FIELDS: &'static [Field] = &[
        field("cmdtype", 0xff00_0000, 24, 8),
        field("control", 0x00ff_ffff, 0, 24),
        field("aamvirtual", 0x0080_0000, 23, 1),
        field("aarsize", 0x0070_0000, 20, 3),
        field("aamsize", 0x0070_0000, 20, 3),
        field("aapostincrement", 0x0008_0000, 19, 1),
        field("postexec", 0x0004_0000, 18, 1),
        field("transfer", 0x0002_0000, 17, 1),
        field("write", 0x0001_0000, 16, 1),
        field("targetspecific", 0x0000_c000, 14, 2),
        field("regno", 0x0000_ffff, 0, 16),
    ];
}

bitfield! {
    /// The `abstractauto` register, at 0x18.
    #[derive(Copy, Clone, PartialEq)]
    pub struct Abstractauto(u32);
    impl Debug;

    pub autoexecprogbuf, set_autoexecprogbuf: 31, 16;
    pub autoexecdata, set_autoexecdata: 11, 0;
}
register_addr! { Abstractauto, 0x18, "abstractauto" }

impl Abstractauto {
    pub const FIELDS: &'static [Field] = &[
        field("autoexecprogbuf", 0xffff_0000, 16, 16),
        field("autoexecdata", 0x0000_0fff, 0, 12),
    ];
}

data_register! {
    /// Link to the next debug module, at 0x1d.
    Nextdm, 0x1d, "nextdm"
}

data_register! {
    /// Authentication data, at 0x30. Inert on this device.
    Authdata, 0x30, "authdata"
}

bitfield! {
    /// The `sbcs` system-bus control register, at 0x38.
    #[derive(Copy, Clone)]
    pub struct Sbcs(u32);
    impl Debug;

    pub sbversion, _: 31, 29;
    pub sbbusyerror, set_sbbusyerror: 22;
    pub sbbusy, _: 21;
    pub sbreadonaddr, set_sbreadonaddr: 20;
    pub sbaccess, set_sbaccess: 19, 17;
    pub sbautoincrement, set_sbautoincrement: 16;
    pub sbreadondata, set_sbreadondata: 15;
    pub sberror, set_sberror: 14, 12;
    pub sbasize, _: 11, 5;
    pub sbaccess128, _: 4;
    pub sbaccess64, _: 3;
    pub sbaccess32, _: 2;
    pub sbaccess16, _: 1;
    pub sbaccess8, _: 0;
}
// Reset default: sbversion 1, 32-bit access.
register_addr! { Sbcs, 0x38, "sbcs", reset = 0x2004_0000 }

impl Sbcs {
    /// Arm the next write to clear `sberror`.
    pub fn clear_sberror(&mut self) {
        self.set_sberror(0x7);
    }

    /// Arm the next write to clear `sbbusyerror`.
    pub fn clear_sbbusyerror(&mut self) {
        self.set_sbbusyerror(true);
    }

    pub const FIELDS: &'static [Field] = &[
        field("sbversion", 0xe000_0000, 29, 3),
        field("sbbusyerror", 0x0040_0000, 22, 1),
        field("sbbusy", 0x0020_0000, 21, 1),
        field("sbreadonaddr", 0x0010_0000, 20, 1),
        field("sbaccess", 0x000e_0000, 17, 3),
        field("sbautoincrement", 0x0001_0000, 16, 1),
        field("sbreadondata", 0x0000_8000, 15, 1),
        field("sberror", 0x0000_7000, 12, 3),
        field("sbasize", 0x0000_0fe0, 5, 7),
        field("sbaccess128", 0x0000_0010, 4, 1),
        field("sbaccess64", 0x0000_0008, 3, 1),
        field("sbaccess32", 0x0000_0004, 2, 1),
        field("sbaccess16", 0x0000_0002, 1, 1),
        field("sbaccess8", 0x0000_0001, 0, 1),
    ];
}

/// `sbcs.sberror` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemBusErrorKind {
    None = 0,
    Timeout = 1,
    BadAddress = 2,
    Alignment = 3,
    BadSize = 4,
    Other = 7,
}

impl SystemBusErrorKind {
    pub fn parse(value: u32) -> Self {
        use SystemBusErrorKind::*;

        match value & 0x7 {
            0 => None,
            1 => Timeout,
            2 => BadAddress,
            3 => Alignment,
            4 => BadSize,
            _ => Other,
        }
    }
}

bitfield! {
    /// The `dcsr` debug control CSR (address 0x7b0).
    ///
    /// Not a DMI register, but the adapter's step/continue logic lives
    /// in its bits.
    #[derive(Copy, Clone)]
    pub struct Dcsr(u32);
    impl Debug;

    pub xdebugver, _: 31, 28;
    pub ebreakm, set_ebreakm: 15;
    pub ebreaks, set_ebreaks: 13;
    pub ebreaku, set_ebreaku: 12;
    pub stepie, set_stepie: 11;
    pub stopcount, set_stopcount: 10;
    pub stoptime, set_stoptime: 9;
    pub cause, _: 8, 6;
    pub mprven, set_mprven: 4;
    pub nmip, _: 3;
    pub step, set_step: 2;
    pub prv, set_prv: 1, 0;
}

impl From<Dcsr> for u32 {
    fn from(register: Dcsr) -> Self {
        register.0
    }
}

impl From<u32> for Dcsr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Dcsr {
    /// Mask of the ebreakm/ebreaks/ebreaku bits.
    pub const EBREAK_MASK: u32 = 0xb000;

    /// `cause` value reporting an executed `ebreak`.
    pub const CAUSE_EBREAK: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_fields(name: &str, fields: &[Field]) {
        for f in fields {
            assert_eq!(
                f.mask,
                (((1u64 << f.width) - 1) as u32) << f.offset,
                "{name}.{} mask is inconsistent",
                f.name
            );
            assert!(
                f.offset + f.width <= 32,
                "{name}.{} exceeds 32 bits",
                f.name
            );
        }
    }

    #[test]
    fn field_tables_are_consistent() {
        check_fields("dmcontrol", Dmcontrol::FIELDS);
        check_fields("dmstatus", Dmstatus::FIELDS);
        check_fields("hartinfo", Hartinfo::FIELDS);
        check_fields("hawindowsel", Hawindowsel::FIELDS);
        check_fields("abstractcs", Abstractcs::FIELDS);
        check_fields("command", Command::FIELDS);
        check_fields("abstractauto", Abstractauto::FIELDS);
        check_fields("sbcs", Sbcs::FIELDS);
    }

    #[test]
    fn dmcontrol_hartsel_splits_across_fields() {
        let mut control = Dmcontrol(0);
        control.set_hartsel(0xabcde);
        assert_eq!(control.hartsello(), 0xabcde & 0x3ff);
        assert_eq!(control.hartselhi(), 0xabcde >> 10);
        assert_eq!(control.hartsel(), 0xabcde);

        control.set_hartsel(Dmcontrol::hartsel_max());
        assert_eq!(control.hartsel(), (1 << 20) - 1);
    }

    #[test]
    fn dmcontrol_flag_positions() {
        let mut control = Dmcontrol(0);
        control.set_haltreq(true);
        assert_eq!(control.0, 0x8000_0000);

        let mut control = Dmcontrol(0);
        control.set_resumereq(true);
        control.set_dmactive(true);
        assert_eq!(control.0, 0x4000_0001);
    }

    #[test]
    fn dmstatus_folds_all_and_any() {
        let status = Dmstatus(0x0000_0300);
        assert!(status.halted());
        assert!(!status.running());

        let status = Dmstatus(0x0000_0c00);
        assert!(status.running());
        assert!(!status.halted());
    }

    #[test]
    fn abstractcs_reset_arms_cmderr_clear() {
        assert_eq!(Abstractcs::RESET_VALUE, 0x700);
        let mut acs = Abstractcs(0);
        acs.clear_cmderr();
        assert_eq!(acs.cmderr(), 0x7);
    }

    #[test]
    fn command_access_register_layout() {
        let command = Command::access_register(0x1005, false);
        assert_eq!(command.0, 0x0022_1005);

        let command = Command::access_register(0x7b1, true);
        assert_eq!(command.0, 0x0023_07b1);
    }

    #[test]
    fn sbcs_reset_is_version_one_32_bit() {
        let sbcs = Sbcs::reset();
        assert_eq!(sbcs.sbversion(), 1);
        assert_eq!(sbcs.sbaccess(), RiscvBusAccess::A32 as u32);
    }

    #[test]
    fn dcsr_wire_positions() {
        let mut dcsr = Dcsr(0);
        dcsr.set_step(true);
        assert_eq!(dcsr.0, 0x4);

        let mut dcsr = Dcsr(0);
        dcsr.set_ebreakm(true);
        dcsr.set_ebreaks(true);
        dcsr.set_ebreaku(true);
        assert_eq!(dcsr.0, Dcsr::EBREAK_MASK);

        let dcsr = Dcsr(Dcsr::CAUSE_EBREAK << 6);
        assert_eq!(dcsr.cause(), 1);
    }

    #[test]
    fn group_addresses_match_the_map() {
        assert_eq!(HALTSUM_ADDR, [0x40, 0x13, 0x34, 0x35]);
        assert_eq!(SBADDRESS_ADDR, [0x39, 0x3a, 0x3b, 0x37]);
        assert_eq!(DATA_ADDR[0], 0x04);
        assert_eq!(PROGBUF_ADDR[15], 0x2f);
        assert_eq!(SBDATA_ADDR[0], 0x3c);
    }
}
