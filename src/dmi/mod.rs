//! Debug Module Interface.
//!
//! Everything the debug module offers over DMI: the typed register set
//! ([`registers`]), the CSR catalogue ([`csr`]), hart selection and
//! halting, CSR/GPR/FPR access through abstract register-transfer
//! commands, and memory access through the system bus.
//!
//! Memory on this device is reachable only through the system bus, and
//! the bus only performs 32-bit aligned accesses, so `read_mem` and
//! `write_mem` fix arbitrary byte ranges up into aligned word transfers
//! with read-modify-write at the boundaries.

pub mod csr;
pub mod registers;

use self::registers::{
    AbstractCommandErrorKind, Abstractcs, Command, DebugRegister, Dmcontrol, Sbcs,
    SystemBusErrorKind,
};

use crate::dtm::DtmAccess;
use crate::RiscvError;

/// Register-number base of the GPRs in abstract register transfers.
const GPR_BASE: u16 = 0x1000;

/// Register-number base of the FPRs in abstract register transfers.
const FPR_BASE: u16 = 0x1020;

/// The Debug Module Interface over a transport.
pub struct Dmi {
    dtm: Box<dyn DtmAccess>,
    /// Most recently selected hart; reapplied whenever `dmcontrol` is
    /// rebuilt from its reset value.
    current_hartsel: u32,
    /// Log registers with decoded fields instead of plain hex.
    pretty: bool,
}

impl Dmi {
    pub fn new(dtm: Box<dyn DtmAccess>) -> Self {
        Dmi {
            dtm,
            current_hartsel: 0,
            pretty: false,
        }
    }

    /// Decode register fields in debug logs.
    pub fn pretty_print(&mut self, pretty: bool) {
        self.pretty = pretty;
    }

    /// Reset the underlying transport (and the device behind it).
    pub fn dtm_reset(&mut self) -> Result<(), RiscvError> {
        self.dtm.reset()
    }

    /// Simulated time in nanoseconds.
    pub fn sim_time_ns(&self) -> u64 {
        self.dtm.sim_time_ns()
    }

    /// Read a DMI register.
    pub fn read_register<R: DebugRegister>(&mut self) -> Result<R, RiscvError> {
        let value = self.dtm.dmi_read(R::ADDRESS)?;
        let register = R::from(value);
        if self.pretty {
            tracing::debug!("read {} = {:?}", R::NAME, register);
        } else {
            tracing::debug!("read {} = {value:#010x}", R::NAME);
        }
        Ok(register)
    }

    /// Write a DMI register.
    pub fn write_register<R: DebugRegister>(&mut self, register: R) -> Result<(), RiscvError> {
        let value: u32 = register.into();
        if self.pretty {
            tracing::debug!("write {} = {register:?}", R::NAME);
        } else {
            tracing::debug!("write {} = {value:#010x}", R::NAME);
        }
        self.dtm.dmi_write(R::ADDRESS, value)
    }

    // Indexed register groups. An index beyond the group is a caller
    // bug but not a fatal one: reads return zero, writes are dropped,
    // both under a diagnostic.

    fn read_indexed(&mut self, name: &str, addrs: &[u64], n: usize) -> Result<u32, RiscvError> {
        match addrs.get(n) {
            Some(&address) => self.dtm.dmi_read(address),
            None => {
                tracing::warn!("reading {name}[{n}] is out of range: zero returned");
                Ok(0)
            }
        }
    }

    fn write_indexed(
        &mut self,
        name: &str,
        addrs: &[u64],
        n: usize,
        value: u32,
    ) -> Result<(), RiscvError> {
        match addrs.get(n) {
            Some(&address) => self.dtm.dmi_write(address, value),
            None => {
                tracing::warn!("writing {name}[{n}] is out of range: ignored");
                Ok(())
            }
        }
    }

    pub fn read_data(&mut self, n: usize) -> Result<u32, RiscvError> {
        self.read_indexed("data", &registers::DATA_ADDR, n)
    }

    pub fn write_data(&mut self, n: usize, value: u32) -> Result<(), RiscvError> {
        self.write_indexed("data", &registers::DATA_ADDR, n, value)
    }

    pub fn read_haltsum(&mut self, n: usize) -> Result<u32, RiscvError> {
        self.read_indexed("haltsum", &registers::HALTSUM_ADDR, n)
    }

    pub fn read_confstrptr(&mut self, n: usize) -> Result<u32, RiscvError> {
        self.read_indexed("confstrptr", &registers::CONFSTRPTR_ADDR, n)
    }

    pub fn read_progbuf(&mut self, n: usize) -> Result<u32, RiscvError> {
        self.read_indexed("progbuf", &registers::PROGBUF_ADDR, n)
    }

    pub fn write_progbuf(&mut self, n: usize, value: u32) -> Result<(), RiscvError> {
        self.write_indexed("progbuf", &registers::PROGBUF_ADDR, n, value)
    }

    pub fn read_sbaddress(&mut self, n: usize) -> Result<u32, RiscvError> {
        self.read_indexed("sbaddress", &registers::SBADDRESS_ADDR, n)
    }

    pub fn write_sbaddress(&mut self, n: usize, value: u32) -> Result<(), RiscvError> {
        self.write_indexed("sbaddress", &registers::SBADDRESS_ADDR, n, value)
    }

    pub fn read_sbdata(&mut self, n: usize) -> Result<u32, RiscvError> {
        self.read_indexed("sbdata", &registers::SBDATA_ADDR, n)
    }

    pub fn write_sbdata(&mut self, n: usize, value: u32) -> Result<(), RiscvError> {
        self.write_indexed("sbdata", &registers::SBDATA_ADDR, n, value)
    }

    /// `dmcontrol` at its reset value with the current hart selection
    /// reapplied.
    fn dmcontrol_base(&self) -> Dmcontrol {
        let mut control = Dmcontrol::reset();
        control.set_hartsel(self.current_hartsel);
        control
    }

    /// Select a hart.
    pub fn select_hart(&mut self, hart: u32) -> Result<(), RiscvError> {
        if hart > Dmcontrol::hartsel_max() {
            tracing::warn!("hartsel {hart:#x} exceeds the field width: higher bits dropped");
        }
        self.current_hartsel = hart & Dmcontrol::hartsel_max();

        let mut control = self.dmcontrol_base();
        control.set_dmactive(true);
        self.write_register(control)
    }

    /// Select a hart and request it to halt.
    pub fn halt_hart(&mut self, hart: u32) -> Result<(), RiscvError> {
        if hart > Dmcontrol::hartsel_max() {
            tracing::warn!("hartsel {hart:#x} exceeds the field width: higher bits dropped");
        }
        self.current_hartsel = hart & Dmcontrol::hartsel_max();

        let mut control = self.dmcontrol_base();
        control.set_haltreq(true);
        control.set_dmactive(true);
        self.write_register(control)
    }

    /// Request the selected hart to resume. Any pending halt request is
    /// dropped by the same write.
    pub fn resume_hart(&mut self, hart: u32) -> Result<(), RiscvError> {
        self.current_hartsel = hart & Dmcontrol::hartsel_max();

        let mut control = self.dmcontrol_base();
        control.set_resumereq(true);
        control.set_dmactive(true);
        self.write_register(control)
    }

    /// Discover the highest supported hart index by writing the widest
    /// possible `hartsel` and observing which bits latched.
    pub fn hartsellen(&mut self) -> Result<u32, RiscvError> {
        self.select_hart(Dmcontrol::hartsel_max())?;
        let control: Dmcontrol = self.read_register()?;
        let latched = control.hartsel();
        self.current_hartsel = latched;
        Ok(latched)
    }

    /// Run one abstract command to completion.
    ///
    /// `cmderr` of BUSY means the debug unit wedged; give it a reset
    /// (`ndmreset` high then low, `dmactive` low then high) and let the
    /// caller retry. Any other error is cleared from `abstractcs` and
    /// reported.
    fn run_abstract_command(&mut self, command: Command) -> Result<(), RiscvError> {
        self.write_register(command)?;

        let abstractcs = self.wait_abstract_command()?;
        match AbstractCommandErrorKind::parse(abstractcs.cmderr()) {
            AbstractCommandErrorKind::None => Ok(()),
            AbstractCommandErrorKind::Busy => {
                tracing::warn!("abstract command busy: resetting the debug unit");
                for flag in [true, false] {
                    let mut control = self.dmcontrol_base();
                    control.set_ndmreset(flag);
                    self.write_register(control)?;
                }
                for flag in [false, true] {
                    let mut control = self.dmcontrol_base();
                    control.set_dmactive(flag);
                    self.write_register(control)?;
                }
                Err(RiscvError::AbstractCommand(AbstractCommandErrorKind::Busy))
            }
            kind => {
                let mut clear = Abstractcs::from(0);
                clear.clear_cmderr();
                self.write_register(clear)?;
                Err(RiscvError::AbstractCommand(kind))
            }
        }
    }

    /// Poll `abstractcs` until the command is no longer executing.
    fn wait_abstract_command(&mut self) -> Result<Abstractcs, RiscvError> {
        loop {
            let abstractcs: Abstractcs = self.read_register()?;
            if !abstractcs.busy() {
                return Ok(abstractcs);
            }
        }
    }

    /// Read a CSR through an abstract register transfer.
    pub fn read_csr(&mut self, address: u16) -> Result<u32, RiscvError> {
        self.run_abstract_command(Command::access_register(address, false))?;
        self.read_data(0)
    }

    /// Write a CSR through an abstract register transfer.
    ///
    /// Whether the CSR is writable is not checked here; the debug module
    /// reports an exception for read-only targets.
    pub fn write_csr(&mut self, address: u16, value: u32) -> Result<(), RiscvError> {
        self.write_data(0, value)?;
        self.run_abstract_command(Command::access_register(address, true))
    }

    /// Read a general purpose register.
    pub fn read_gpr(&mut self, reg: usize) -> Result<u32, RiscvError> {
        self.read_csr(GPR_BASE + reg as u16)
    }

    /// Write a general purpose register.
    pub fn write_gpr(&mut self, reg: usize, value: u32) -> Result<(), RiscvError> {
        self.write_csr(GPR_BASE + reg as u16, value)
    }

    /// Read a floating point register.
    pub fn read_fpr(&mut self, reg: usize) -> Result<u32, RiscvError> {
        self.read_csr(FPR_BASE + reg as u16)
    }

    /// Write a floating point register.
    pub fn write_fpr(&mut self, reg: usize, value: u32) -> Result<(), RiscvError> {
        self.write_csr(FPR_BASE + reg as u16, value)
    }

    /// A fresh `sbcs` programming with error clearing armed.
    fn sbcs_base(words: usize) -> Sbcs {
        let mut sbcs = Sbcs::reset();
        sbcs.set_sbautoincrement(words > 1);
        sbcs.clear_sberror();
        sbcs
    }

    /// Poll `sbcs` until the bus is idle, then surface any `sberror`.
    fn wait_system_bus(&mut self) -> Result<(), RiscvError> {
        loop {
            let sbcs: Sbcs = self.read_register()?;
            if sbcs.sbbusy() {
                continue;
            }

            let error = SystemBusErrorKind::parse(sbcs.sberror());
            if error == SystemBusErrorKind::None {
                return Ok(());
            }

            let mut clear = Sbcs::from(0);
            clear.clear_sberror();
            clear.clear_sbbusyerror();
            self.write_register(clear)?;
            return Err(RiscvError::SystemBus(error));
        }
    }

    /// Read `len` bytes from `addr` over the system bus.
    ///
    /// The bus acknowledges every address on this device; reads of
    /// unmapped memory come back as the poison word `0xbadcab1e` and are
    /// indistinguishable from valid data.
    pub fn read_mem(&mut self, addr: u32, len: usize) -> Result<Vec<u8>, RiscvError> {
        if len == 0 {
            return Ok(Vec::new());
        }

        let start = (addr & !3) as u64;
        let end = (addr as u64 + len as u64 + 3) & !3;
        let words = ((end - start) / 4) as usize;

        let mut sbcs = Self::sbcs_base(words);
        sbcs.set_sbreadonaddr(true);
        sbcs.set_sbreadondata(true);
        self.write_register(sbcs)?;

        // Writing the address triggers the first bus read; each
        // following read of sbdata0 triggers the next.
        self.write_sbaddress(0, start as u32)?;

        let mut buf = Vec::with_capacity(len);
        for i in 0..words {
            self.wait_system_bus()?;
            let word = self.read_sbdata(0)?;

            let word_base = start + 4 * i as u64;
            for byte in 0..4u64 {
                let a = word_base + byte;
                if a >= addr as u64 && a < addr as u64 + len as u64 {
                    buf.push((word >> (8 * byte)) as u8);
                }
            }
        }

        Ok(buf)
    }

    /// Write `data` to `addr` over the system bus.
    ///
    /// Partial words at either boundary are read first and the new
    /// bytes overlaid, so neighbouring memory is preserved. The bulk in
    /// the middle goes out as back-to-back auto-incremented word
    /// writes.
    pub fn write_mem(&mut self, addr: u32, data: &[u8]) -> Result<(), RiscvError> {
        if data.is_empty() {
            return Ok(());
        }

        let addr = addr as u64;
        let len = data.len() as u64;
        let start = addr & !3;
        let end = (addr + len + 3) & !3;
        let words = ((end - start) / 4) as usize;

        let first_full = addr == start && addr + len >= start + 4;
        let last_full = addr + len == end;

        let mut sbcs = Self::sbcs_base(words);
        sbcs.set_sbreadonaddr(!first_full);
        self.write_register(sbcs)?;
        self.write_sbaddress(0, start as u32)?;

        // First word. If partial, the address write above has already
        // fetched it for the overlay; the fetch auto-incremented the
        // address, so both sbcs and the address must be programmed
        // again.
        let mut word = 0u32;
        if !first_full {
            self.wait_system_bus()?;
            word = self.read_sbdata(0)?;

            let mut sbcs = Self::sbcs_base(words);
            sbcs.set_sbreadonaddr(false);
            self.write_register(sbcs)?;
            self.write_sbaddress(0, start as u32)?;
        }

        let mut index = 0;
        let offset = (addr - start) as usize;
        for i in offset..(offset + data.len()).min(4) {
            word &= !(0xff << (8 * i));
            word |= (data[index] as u32) << (8 * i);
            index += 1;
        }
        self.write_sbdata(0, word)?;
        self.wait_system_bus()?;

        if words == 1 {
            return Ok(());
        }

        // Middle words are fully covered by the caller's data.
        for _ in 1..words - 1 {
            let mut word = 0u32;
            for i in 0..4 {
                word |= (data[index] as u32) << (8 * i);
                index += 1;
            }
            self.write_sbdata(0, word)?;
            self.wait_system_bus()?;
        }

        // Last word, read-modified if the range ends mid-word. The
        // auto-incremented cursor already points at it.
        let mut word = 0u32;
        if !last_full {
            let mut sbcs = Self::sbcs_base(1);
            sbcs.set_sbreadonaddr(true);
            self.write_register(sbcs)?;
            self.write_sbaddress(0, (end - 4) as u32)?;
            self.wait_system_bus()?;
            word = self.read_sbdata(0)?;

            let mut sbcs = Self::sbcs_base(1);
            sbcs.set_sbreadonaddr(false);
            self.write_register(sbcs)?;
        }

        let tail = (4 - (end - (addr + len))) as usize;
        for i in 0..tail {
            word &= !(0xff << (8 * i));
            word |= (data[index + i] as u32) << (8 * i);
        }
        self.write_sbdata(0, word)?;
        self.wait_system_bus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::fake_mcu::FakeMcu;
    use crate::sim::SimDevice;
    use crate::tap::Tap;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;

    /// A DTM answering from a table, recording all writes.
    struct ScriptedDtm {
        responses: HashMap<u64, VecDeque<u32>>,
        defaults: HashMap<u64, u32>,
        writes: Rc<RefCell<Vec<(u64, u32)>>>,
    }

    impl ScriptedDtm {
        fn new() -> Self {
            ScriptedDtm {
                responses: HashMap::new(),
                defaults: HashMap::new(),
                writes: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn respond(&mut self, address: u64, value: u32) {
            self.responses.entry(address).or_default().push_back(value);
        }

        fn default_response(&mut self, address: u64, value: u32) {
            self.defaults.insert(address, value);
        }

        fn writes(&self) -> Rc<RefCell<Vec<(u64, u32)>>> {
            Rc::clone(&self.writes)
        }
    }

    impl DtmAccess for ScriptedDtm {
        fn reset(&mut self) -> Result<(), RiscvError> {
            Ok(())
        }

        fn dmi_read(&mut self, address: u64) -> Result<u32, RiscvError> {
            if let Some(queue) = self.responses.get_mut(&address) {
                if let Some(value) = queue.pop_front() {
                    return Ok(value);
                }
            }
            Ok(self.defaults.get(&address).copied().unwrap_or(0))
        }

        fn dmi_write(&mut self, address: u64, value: u32) -> Result<(), RiscvError> {
            self.writes.borrow_mut().push((address, value));
            Ok(())
        }

        fn sim_time_ns(&self) -> u64 {
            0
        }
    }

    fn scripted(dtm: ScriptedDtm) -> (Dmi, Rc<RefCell<Vec<(u64, u32)>>>) {
        let writes = dtm.writes();
        (Dmi::new(Box::new(dtm)), writes)
    }

    fn full_stack() -> Dmi {
        let dev = SimDevice::new(Box::new(FakeMcu::new()), 20, 0, None).unwrap();
        let mut dmi = Dmi::new(Box::new(crate::dtm::JtagDtm::new(Tap::new(dev))));
        dmi.dtm_reset().unwrap();
        dmi
    }

    #[test]
    fn select_hart_writes_dmactive_and_hartsel() {
        let (mut dmi, writes) = scripted(ScriptedDtm::new());
        dmi.select_hart(3).unwrap();

        assert_eq!(*writes.borrow(), vec![(0x10, (3 << 16) | 1)]);
    }

    #[test]
    fn halt_hart_adds_haltreq() {
        let (mut dmi, writes) = scripted(ScriptedDtm::new());
        dmi.halt_hart(0).unwrap();

        assert_eq!(*writes.borrow(), vec![(0x10, 0x8000_0001)]);
    }

    #[test]
    fn oversized_hartsel_is_truncated() {
        let (mut dmi, writes) = scripted(ScriptedDtm::new());
        dmi.select_hart(0x70_0005).unwrap();

        assert_eq!(*writes.borrow(), vec![(0x10, (5 << 16) | 1)]);
    }

    #[test]
    fn out_of_range_group_indices_are_noops() {
        let (mut dmi, writes) = scripted(ScriptedDtm::new());
        assert_eq!(dmi.read_data(12).unwrap(), 0);
        assert_eq!(dmi.read_haltsum(4).unwrap(), 0);
        dmi.write_progbuf(16, 0xffff_ffff).unwrap();
        dmi.write_sbdata(4, 0xffff_ffff).unwrap();

        assert!(writes.borrow().is_empty());
    }

    #[test]
    fn read_csr_issues_transfer_and_reads_data0() {
        let mut dtm = ScriptedDtm::new();
        dtm.default_response(0x04, 0x1234_5678);
        let (mut dmi, writes) = scripted(dtm);

        assert_eq!(dmi.read_csr(0x7b1).unwrap(), 0x1234_5678);

        assert_eq!(*writes.borrow(), vec![(0x17, 0x0022_07b1)]);
    }

    #[test]
    fn write_csr_places_value_in_data0_first() {
        let (mut dmi, writes) = scripted(ScriptedDtm::new());
        dmi.write_csr(0x340, 0xfeed_beef).unwrap();

        assert_eq!(
            *writes.borrow(),
            vec![(0x04, 0xfeed_beef), (0x17, 0x0023_0340)]
        );
    }

    #[test]
    fn gpr_and_fpr_access_use_the_register_bases() {
        let (mut dmi, writes) = scripted(ScriptedDtm::new());
        dmi.write_gpr(5, 1).unwrap();
        dmi.write_fpr(5, 2).unwrap();

        let writes = writes.borrow();
        assert_eq!(writes[1].1 & 0xffff, 0x1005);
        assert_eq!(writes[3].1 & 0xffff, 0x1025);
    }

    #[test]
    fn abstract_command_polls_while_busy() {
        let mut dtm = ScriptedDtm::new();
        dtm.respond(0x16, 1 << 12); // busy
        dtm.respond(0x16, 1 << 12); // still busy
        dtm.respond(0x16, 0); // done, no error
        dtm.default_response(0x04, 42);
        let (mut dmi, _writes) = scripted(dtm);

        assert_eq!(dmi.read_csr(0x300).unwrap(), 42);
    }

    #[test]
    fn command_error_is_cleared_and_reported() {
        let mut dtm = ScriptedDtm::new();
        dtm.respond(0x16, 2 << 8); // cmderr = not supported
        let (mut dmi, writes) = scripted(dtm);

        let err = dmi.read_csr(0x300).unwrap_err();
        assert!(matches!(
            err,
            RiscvError::AbstractCommand(AbstractCommandErrorKind::NotSupported)
        ));

        // The clearing write sets every cmderr bit.
        assert_eq!(writes.borrow().last(), Some(&(0x16, 0x700)));
    }

    #[test]
    fn busy_command_resets_the_debug_unit() {
        let mut dtm = ScriptedDtm::new();
        dtm.respond(0x16, 1 << 8); // cmderr = busy
        let (mut dmi, writes) = scripted(dtm);

        let err = dmi.read_csr(0x300).unwrap_err();
        assert!(matches!(
            err,
            RiscvError::AbstractCommand(AbstractCommandErrorKind::Busy)
        ));

        let writes = writes.borrow();
        // command, ndmreset on, ndmreset off, dmactive off, dmactive on
        assert_eq!(writes.len(), 5);
        assert_eq!(writes[1], (0x10, 0x2));
        assert_eq!(writes[2], (0x10, 0x0));
        assert_eq!(writes[3], (0x10, 0x0));
        assert_eq!(writes[4], (0x10, 0x1));
    }

    #[test]
    fn sberror_short_circuits_and_clears() {
        let mut dtm = ScriptedDtm::new();
        dtm.default_response(0x38, 2 << 12); // sberror = bad address
        let (mut dmi, writes) = scripted(dtm);

        let err = dmi.read_mem(0x100, 8).unwrap_err();
        assert!(matches!(
            err,
            RiscvError::SystemBus(SystemBusErrorKind::BadAddress)
        ));

        assert_eq!(writes.borrow().last(), Some(&(0x38, 0x0040_7000)));
    }

    #[test]
    fn gpr_round_trip_through_the_stack() {
        let mut dmi = full_stack();
        dmi.select_hart(0).unwrap();
        dmi.halt_hart(0).unwrap();

        dmi.write_gpr(5, 0xdead_beef).unwrap();
        assert_eq!(dmi.read_gpr(5).unwrap(), 0xdead_beef);
    }

    #[test]
    fn unmapped_memory_reads_the_poison_word() {
        let mut dmi = full_stack();
        let bytes = dmi.read_mem(0x4000_0000, 4).unwrap();
        assert_eq!(bytes, 0xbadcab1eu32.to_le_bytes());
    }

    #[test]
    fn hartsellen_reports_the_latched_width() {
        let mut dmi = full_stack();
        // A single hart latches no hartsel bits at all.
        assert_eq!(dmi.hartsellen().unwrap(), 0);
    }
}
