//! SCL clock parameters.

use super::{ConfigError, Duty};
use crate::regs::{Ckcfgr, Ctlr2, Rtr};
use crate::time::Hertz;

/// Highest standard-mode SCL frequency.
pub const STANDARD_MODE_MAX: Hertz = Hertz::khz(100);
/// Highest fast-mode SCL frequency.
pub const FAST_MODE_MAX: Hertz = Hertz::khz(400);

/// Register values that produce a given SCL frequency.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    /// CTLR2.FREQ, peripheral clock in MHz.
    pub freq: u8,
    /// CKCFGR.CCR
    pub ccr: u16,
    /// RTR.TRISE
    pub trise: u8,
    /// CKCFGR.F/S
    pub fast: bool,
    /// CKCFGR.DUTY, only meaningful in fast mode.
    pub duty: Duty,
}

impl Timing {
    /// Computes the divider and rise time for `speed` from a `kernel_clock` peripheral clock.
    ///
    /// CCR is rounded up so that the generated SCL frequency never exceeds `speed`.
    pub fn compute(kernel_clock: Hertz, speed: Hertz, fast_mode: bool, duty: Duty) -> Result<Self, ConfigError> {
        let pclk = kernel_clock.0;
        let freq = kernel_clock.to_mhz();

        if speed.0 == 0 || speed > FAST_MODE_MAX || (!fast_mode && speed > STANDARD_MODE_MAX) {
            return Err(ConfigError::SpeedOutOfRange);
        }
        // 2 MHz is the floor for standard mode, 4 MHz for fast mode
        let min_freq = if fast_mode { 4 } else { 2 };
        if freq < min_freq || freq > 36 {
            return Err(ConfigError::KernelClockOutOfRange);
        }

        let (ccr, trise) = if fast_mode {
            let divisor = match duty {
                Duty::Duty2_1 => 3,
                Duty::Duty16_9 => 25,
            };
            let ccr = pclk.div_ceil(speed.0 * divisor).max(0x01);
            (ccr, freq * 300 / 1000 + 1)
        } else {
            let ccr = pclk.div_ceil(speed.0 * 2).max(0x04);
            (ccr, freq + 1)
        };

        if ccr > 0xFFF {
            return Err(ConfigError::SpeedOutOfRange);
        }

        Ok(Self {
            freq: freq as u8,
            ccr: ccr as u16,
            trise: trise as u8,
            fast: fast_mode,
            duty,
        })
    }

    /// Decodes the timing currently programmed in the registers.
    pub fn from_registers(ctlr2: Ctlr2, ckcfgr: Ckcfgr, rtr: Rtr) -> Self {
        Self {
            freq: ctlr2.freq(),
            ccr: ckcfgr.ccr(),
            trise: rtr.trise(),
            fast: ckcfgr.f_s(),
            duty: if ckcfgr.duty() { Duty::Duty16_9 } else { Duty::Duty2_1 },
        }
    }

    /// SCL frequency these values produce from `kernel_clock`.
    pub fn scl_frequency(&self, kernel_clock: Hertz) -> Hertz {
        let period = match (self.fast, self.duty) {
            (false, _) => 2,
            (true, Duty::Duty2_1) => 3,
            (true, Duty::Duty16_9) => 25,
        };
        Hertz(kernel_clock.0 / (period * self.ccr.max(1) as u32))
    }
}
