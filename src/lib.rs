#![cfg_attr(not(test), no_std)]
#![allow(static_mut_refs)]
//! Blocking I2C v1 transfer engine for WCH CH32 and STM32F1-class microcontrollers.
//!
//! The crate drives the controller (master) and peripheral (slave) roles of the I2C v1 block,
//! including the one-, two- and N-byte receive procedures the hardware requires. Clock tree and
//! pin setup are left to the caller: the peripheral clock must be enabled and SCL/SDA configured as
//! open-drain alternate function before an [`i2c::I2c`] is created.

// This must go FIRST so that all the other modules see its macros.
mod fmt;

mod macros;
pub mod regs;
pub mod time;

pub mod i2c;

mod peripheral;
pub use peripheral::*;

/// Bound on a single blocking wait.
///
/// Every wait loop polls a status flag and calls [`Timeout::check`] between polls; `None` means the
/// wait has run out of budget.
#[derive(Clone, Copy)]
pub(crate) struct Timeout {
    #[cfg(feature = "time")]
    deadline: embassy_time::Instant,
    polls_left: u32,
}

impl Timeout {
    pub(crate) fn new(polls: u32) -> Self {
        Self {
            #[cfg(feature = "time")]
            deadline: embassy_time::Instant::MAX,
            polls_left: polls,
        }
    }

    #[cfg(feature = "time")]
    pub(crate) fn with_deadline(self, timeout: embassy_time::Duration) -> Self {
        Self {
            deadline: embassy_time::Instant::now() + timeout,
            ..self
        }
    }

    #[inline]
    pub(crate) fn check(&mut self) -> Option<()> {
        #[cfg(feature = "time")]
        if embassy_time::Instant::now() > self.deadline {
            return None;
        }

        self.polls_left = self.polls_left.checked_sub(1)?;
        Some(())
    }
}
