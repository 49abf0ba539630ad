//! End-to-end tests of the whole transport stack: target adapter over
//! DMI over DTM over TAP over the simulated device.

use corev_target::dmi::registers::{Authdata, Dcsr, Dmstatus, Hartinfo, Hawindow, Nextdm, Sbcs};
use corev_target::dmi::{csr, Dmi};
use corev_target::dtm::JtagDtm;
use corev_target::sim::fake_mcu::FakeMcu;
use corev_target::sim::SimDevice;
use corev_target::tap::Tap;
use corev_target::target::{
    CorevTarget, DebugTarget, ResumeRes, ResumeType, TargetConfig, WaitRes,
};

fn stack() -> Dmi {
    let dev = SimDevice::new(Box::new(FakeMcu::new()), 20, 0, None).unwrap();
    Dmi::new(Box::new(JtagDtm::new(Tap::new(dev))))
}

fn halted_stack() -> Dmi {
    let mut dmi = stack();
    dmi.dtm_reset().unwrap();
    dmi.select_hart(0).unwrap();
    dmi.halt_hart(0).unwrap();
    dmi
}

#[test]
fn reset_and_identify() {
    let mut dmi = stack();
    dmi.dtm_reset().unwrap();

    // The identification happened inside the reset; check the stack is
    // alive by reading dmstatus.
    let status: Dmstatus = dmi.read_register().unwrap();
    assert_eq!(status.version(), 2);
    assert!(status.authenticated());
}

#[test]
fn halt_hart_zero() {
    let mut dmi = halted_stack();

    let status: Dmstatus = dmi.read_register().unwrap();
    assert!(status.halted());
    assert!(!status.running());

    // haltsum0 agrees.
    assert_eq!(dmi.read_haltsum(0).unwrap() & 1, 1);
}

#[test]
fn gpr_round_trip() {
    let mut dmi = halted_stack();

    dmi.write_gpr(5, 0xdead_beef).unwrap();
    assert_eq!(dmi.read_gpr(5).unwrap(), 0xdead_beef);
}

#[test]
fn csr_round_trip() {
    let mut dmi = halted_stack();

    dmi.write_csr(0x340, 0x5555_aaaa).unwrap();
    assert_eq!(dmi.read_csr(0x340).unwrap(), 0x5555_aaaa);
}

#[test]
fn aligned_memory_round_trip() {
    let mut dmi = halted_stack();

    let data: Vec<u8> = (0..16).collect();
    dmi.write_mem(0x1c00_8000, &data).unwrap();
    assert_eq!(dmi.read_mem(0x1c00_8000, 16).unwrap(), data);
}

#[test]
fn misaligned_memory_round_trip() {
    let mut dmi = halted_stack();

    // Five bytes straddling two words.
    let data = [0xaa, 0xbb, 0xcc, 0xdd, 0xee];
    dmi.write_mem(0x1c00_8003, &data).unwrap();
    assert_eq!(dmi.read_mem(0x1c00_8003, 5).unwrap(), data);
}

#[test]
fn misaligned_write_preserves_neighbours() {
    let mut dmi = halted_stack();

    dmi.write_mem(0x1c00_8000, &[0u8; 12]).unwrap();
    dmi.write_mem(0x1c00_8005, &[0x11, 0x22, 0x33]).unwrap();

    let back = dmi.read_mem(0x1c00_8000, 12).unwrap();
    assert_eq!(
        back,
        [0, 0, 0, 0, 0, 0x11, 0x22, 0x33, 0, 0, 0, 0]
    );
}

#[test]
fn single_byte_round_trips_at_every_offset() {
    let mut dmi = halted_stack();

    for offset in 0..4 {
        let addr = 0x1c00_9000 + offset;
        dmi.write_mem(addr, &[offset as u8 + 1]).unwrap();
        assert_eq!(dmi.read_mem(addr, 1).unwrap(), [offset as u8 + 1]);
    }
}

#[test]
fn large_block_round_trips_across_alignments() {
    let mut dmi = halted_stack();

    for offset in 0..4u32 {
        let data: Vec<u8> = (0..61u32).map(|i| ((i * 7 + offset) as u8) ^ 0x5a).collect();
        let addr = 0x1c00_a000 + offset * 0x100;
        dmi.write_mem(addr + offset, &data).unwrap();
        assert_eq!(dmi.read_mem(addr + offset, data.len()).unwrap(), data);
    }
}

#[test]
fn auxiliary_registers_are_reachable() {
    let mut dmi = halted_stack();

    let hartinfo: Hartinfo = dmi.read_register().unwrap();
    assert_eq!(hartinfo.nscratch(), 2);

    let nextdm: Nextdm = dmi.read_register().unwrap();
    assert_eq!(nextdm.0, 0);

    // authdata is present but inert on this device.
    dmi.write_register(Authdata(0x5555_5555)).unwrap();
    let authdata: Authdata = dmi.read_register().unwrap();
    assert_eq!(authdata.0, 0);

    dmi.write_register(Hawindow(0xffff_ffff)).unwrap();
    let hawindow: Hawindow = dmi.read_register().unwrap();
    assert_eq!(hawindow.0, 0xffff_ffff);

    dmi.write_progbuf(3, 0x0000_0013).unwrap();
    assert_eq!(dmi.read_progbuf(3).unwrap(), 0x13);

    assert_eq!(dmi.read_confstrptr(0).unwrap(), 0);
    assert_eq!(dmi.read_data(1).unwrap(), 0);
}

#[test]
fn sbcs_after_reset_reports_version_one_32_bit() {
    let mut dmi = halted_stack();

    let sbcs: Sbcs = dmi.read_register().unwrap();
    assert_eq!(sbcs.sbversion(), 1);
    assert!(sbcs.sbaccess32());
    assert_eq!(sbcs.sbasize(), 32);
}

#[test]
fn single_step_halts_and_clears_step() {
    let mut target = CorevTarget::new(TargetConfig::default()).unwrap();
    assert!(target.halt());

    let pc_before = target.read_register(32).unwrap();

    assert!(target.prepare(&[ResumeType::Step]));
    assert!(target.resume());

    let mut results = Vec::new();
    assert_eq!(target.wait(&mut results), WaitRes::EventOccurred);
    assert_eq!(results, [ResumeRes::Interrupted]);

    // The step bit must be gone and the PC moved on.
    let dcsr = Dcsr::from(target.read_register(65 + csr::DCSR as usize).unwrap());
    assert!(!dcsr.step());
    let pc_after = target.read_register(32).unwrap();
    assert_eq!(pc_after, pc_before.wrapping_add(4));
}

#[test]
fn continue_runs_to_ebreak() {
    let mut target = CorevTarget::new(TargetConfig::default()).unwrap();
    assert!(target.halt());

    assert!(target.prepare(&[ResumeType::Continue]));
    assert!(target.resume());

    let mut results = Vec::new();
    assert_eq!(target.wait(&mut results), WaitRes::EventOccurred);
    assert_eq!(results, [ResumeRes::Interrupted]);

    // The ebreak enables must be cleared again.
    let dcsr = Dcsr::from(target.read_register(65 + csr::DCSR as usize).unwrap());
    assert_eq!(u32::from(dcsr) & Dcsr::EBREAK_MASK, 0);
}

#[test]
fn memory_through_the_adapter() {
    let mut target = CorevTarget::new(TargetConfig::default()).unwrap();
    assert!(target.halt());

    let data = [1u8, 2, 3, 4, 5];
    assert_eq!(target.write_mem(0x1c00_8010, &data), 5);

    let mut back = [0u8; 5];
    assert_eq!(target.read_mem(0x1c00_8010, &mut back), 5);
    assert_eq!(back, data);
}

#[test]
fn zero_length_memory_access_is_accepted() {
    let mut target = CorevTarget::new(TargetConfig::default()).unwrap();

    // Debuggers probe binary-write support with an empty write.
    assert_eq!(target.write_mem(0x1c00_8000, &[]), 0);
    let mut empty = [0u8; 0];
    assert_eq!(target.read_mem(0x1c00_8000, &mut empty), 0);
}
