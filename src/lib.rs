//! Debug target library for a simulated CORE-V (RV32) microcontroller.
//!
//! This crate lets a host debug server control a cycle-accurate simulation
//! of a CORE-V MCU as if it were a real chip, by driving the chip's JTAG
//! debug port through its simulated pins. It is layered bottom-up:
//!
//! * [`sim`]: clock, reset and pin-level access to the cycle-stepped
//!   device model, including optional VCD tracing.
//! * [`tap`]: the IEEE 1149.1 Test Access Port controller, providing
//!   whole-register IR/DR scans on top of half-period stepping.
//! * [`dtm`]: the RISC-V JTAG Debug Transport Module, packing DMI
//!   register accesses into `dmiaccess` DR scans with retry handling.
//! * [`dmi`]: the Debug Module Interface with the full register set of
//!   the RISC-V Debug Specification v0.13.2, hart control,
//!   abstract-command register access and system-bus memory access.
//! * [`target`]: the debugger-facing adapter composing the layers below
//!   into step / continue / halt / register / memory operations.

pub mod dmi;
pub mod dtm;
pub mod sim;
pub mod tap;
pub mod target;

mod error;

pub use error::RiscvError;
