//! Inter-Integrated-Circuit (I2C)
//!
//! Blocking driver for the I2C v1 block in both bus roles.
//!
//! A controller transfer is driven step by step:
//!
//! ```ignore
//! let mut i2c = I2c::new(p.I2C1, Hertz::mhz(36), Config::default())?;
//! i2c.begin_transfer()?;
//! i2c.request(address_byte(0x30, Direction::Write))?;
//! i2c.write_burst(Role::Controller, &[0xde, 0xad, 0xbe, 0xef])?;
//! i2c.end_transfer();
//! ```
//!
//! In the peripheral role [`I2c::write_burst`] and [`I2c::read_burst`] wait for the controller to
//! address this device first.

mod controller;
mod peripheral;
pub mod receive;
pub mod timing;

#[cfg(test)]
mod sim;

use embedded_hal::i2c::Operation;

pub use self::peripheral::FILLER;
use self::receive::Ending;
use self::timing::Timing;
use crate::regs::{RegisterBlock, Star1};
use crate::time::Hertz;
use crate::Timeout;

/// Wakes the task waiting in [`I2c::listen`] and masks the event interrupt.
///
/// Call this from the I2C event and error interrupt handlers of `regs`.
///
/// # Safety
///
/// Must only be called from the interrupt handler of the block `regs` refers to.
#[cfg(feature = "embassy")]
pub unsafe fn on_interrupt<B: RegisterBlock>(regs: &B) {
    // v1 uses the event interrupt for every flag, so the task is woken on all of them and
    // re-arms the interrupt if it still has to wait.
    regs.waker().wake();
    critical_section::with(|_| {
        regs.ctlr2().modify(|w| {
            w.set_itevten(false);
            w.set_iterren(false);
        });
    });
}

/// I2C error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Bus error. (BERR)
    Bus,
    /// Arbitration lost (ARLO), or the start condition was not ours.
    Arbitration,
    /// Address byte not acknowledged.
    AddressNack,
    /// Data byte not acknowledged. (AF)
    Nack,
    /// A status flag did not assert within the configured bound, or SMBus timeout.
    Timeout,
    /// PEC error
    Crc,
    /// Overrun error (OVR)
    Overrun,
    /// The controller sent more bytes than the receive buffer holds.
    BufferOverflow,
    /// Zero-length reads are not allowed.
    ZeroLengthTransfer,
    /// Addressed as transmitter when receiving was requested, or the other way round.
    UnexpectedDirection,
    /// Target address does not fit in 7 bits.
    InvalidAddress,
}

/// Configuration rejected before touching the hardware.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Zero, above 400 kHz, above 100 kHz in standard mode, or not reachable with a 12-bit divider.
    SpeedOutOfRange,
    /// Peripheral clock outside 2..=36 MHz, or below 4 MHz in fast mode.
    KernelClockOutOfRange,
    /// Own address does not fit the selected addressing mode.
    InvalidOwnAddress,
}

/// Which side of the bus this driver plays.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Generates start/stop and addresses other devices.
    Controller,
    /// Responds when a controller addresses one of the own addresses.
    Peripheral,
}

/// Transfer direction, as encoded in bit 0 of the address byte.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Controller writes to the peripheral.
    Write = 0,
    /// Controller reads from the peripheral.
    Read = 1,
}

/// Fast mode duty cycle, t_low/t_high.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Duty {
    Duty2_1 = 0,
    Duty16_9 = 1,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressMode {
    SevenBit,
    TenBit,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusMode {
    I2c,
    /// SMBus device
    SmbusDevice,
    /// SMBus host
    SmbusHost,
}

/// I2C config
#[non_exhaustive]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Config {
    pub role: Role,
    pub bus_mode: BusMode,
    /// SCL frequency, at most 400 kHz.
    pub frequency: Hertz,
    /// Fast mode (F/S). Required above 100 kHz.
    pub fast_mode: bool,
    pub duty: Duty,
    /// Let the peripheral role stretch SCL while software catches up.
    pub clock_stretching: bool,
    pub address_mode: AddressMode,
    /// Also answer to `own_address2`.
    pub dual_address: bool,
    /// OADDR1 address field. In 7-bit mode the address occupies bits 7:1 (`0xC8` is `0x64`); in
    /// 10-bit mode all ten bits are used.
    pub own_address1: u16,
    /// OADDR2 address, bits 7:1.
    pub own_address2: u8,
    pub general_call: bool,
    /// Packet error checking.
    pub pec: bool,
    /// SMBus address resolution protocol.
    pub arp: bool,
    /// Raise DMA requests on TxE/RxNE.
    pub dma: bool,
    /// Status polls allowed per wait before giving up with [`Error::Timeout`].
    pub poll_limit: u32,
    /// Deadline per wait.
    #[cfg(feature = "time")]
    pub timeout: embassy_time::Duration,
}

impl Default for Config {
    /// 400 kHz fast mode controller, 7-bit own addresses 0xC8/0xD8, optional features off.
    fn default() -> Self {
        Self {
            role: Role::Controller,
            bus_mode: BusMode::I2c,
            frequency: Hertz::khz(400),
            fast_mode: true,
            duty: Duty::Duty2_1,
            clock_stretching: true,
            address_mode: AddressMode::SevenBit,
            dual_address: false,
            own_address1: 0xC8,
            own_address2: 0xD8,
            general_call: false,
            pec: false,
            arp: false,
            dma: false,
            poll_limit: 100_000,
            #[cfg(feature = "time")]
            timeout: embassy_time::Duration::from_millis(1000),
        }
    }
}

impl Config {
    fn validate_addresses(&self) -> Result<(), ConfigError> {
        let own1_ok = match self.address_mode {
            AddressMode::SevenBit => self.own_address1 <= 0xFE && self.own_address1 & 1 == 0,
            AddressMode::TenBit => self.own_address1 <= 0x3FF,
        };
        if !own1_ok || self.own_address2 & 1 != 0 {
            return Err(ConfigError::InvalidOwnAddress);
        }
        Ok(())
    }
}

/// Builds the byte sent in the address phase for a 7-bit address.
pub const fn address_byte(address: u8, direction: Direction) -> u8 {
    debug_assert!(address <= 0x7F, "not a 7-bit address");
    (address << 1) | direction as u8
}

/// I2C driver.
pub struct I2c<B: RegisterBlock> {
    regs: B,
    kernel_clock: Hertz,
    config: Config,
}

impl<B: RegisterBlock> I2c<B> {
    /// Create a new I2C driver and apply `config`.
    ///
    /// `kernel_clock` is the APB1 clock feeding the block. The clock must already be enabled and
    /// the pins configured.
    pub fn new(regs: B, kernel_clock: Hertz, config: Config) -> Result<Self, ConfigError> {
        let mut this = Self {
            regs,
            kernel_clock,
            config,
        };
        this.apply(&config)?;
        Ok(this)
    }

    /// Reprograms the block from scratch.
    ///
    /// The configuration is validated first; on error the registers are left as they were.
    /// Applying the same configuration twice produces the same register state.
    pub fn apply(&mut self, config: &Config) -> Result<(), ConfigError> {
        let timing = Timing::compute(self.kernel_clock, config.frequency, config.fast_mode, config.duty)?;
        config.validate_addresses()?;

        let regs = &self.regs;

        regs.ctlr1().modify(|w| w.set_pe(false)); // disable i2c

        // soft reset, every register is back at its reset value afterwards
        regs.ctlr1().modify(|w| w.set_swrst(true));
        regs.ctlr1().modify(|w| w.set_swrst(false));

        regs.ctlr2().write(|w| {
            w.set_freq(timing.freq);
            w.set_dmaen(config.dma);
        });
        regs.ckcfgr().write(|w| {
            w.set_f_s(timing.fast);
            w.set_duty(timing.fast && timing.duty == Duty::Duty16_9);
            w.set_ccr(timing.ccr);
        });
        regs.rtr().write(|w| w.set_trise(timing.trise));

        regs.oaddr1().write(|w| {
            w.set_fixed(true);
            w.set_addmode(config.address_mode == AddressMode::TenBit);
            w.set_add(config.own_address1);
        });
        regs.oaddr2().write(|w| {
            w.set_endual(config.dual_address);
            w.set_add2(config.own_address2 >> 1);
        });

        regs.ctlr1().write(|w| {
            w.set_smbus(config.bus_mode != BusMode::I2c);
            w.set_smbtype(config.bus_mode == BusMode::SmbusHost);
            w.set_enarp(config.arp);
            w.set_enpec(config.pec);
            w.set_engc(config.general_call);
            w.set_nostretch(!config.clock_stretching);
        });

        regs.ctlr1().modify(|w| w.set_pe(true));
        // ACK is cleared by hardware while PE=0
        regs.ctlr1().modify(|w| w.set_ack(config.role == Role::Peripheral));

        debug!(
            "i2c: ccr={} trise={} fast={} -> {} Hz",
            timing.ccr,
            timing.trise,
            timing.fast,
            timing.scl_frequency(self.kernel_clock).0
        );

        self.config = *config;
        Ok(())
    }

    /// The configuration currently applied.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The register block this driver owns.
    pub fn regs(&self) -> &B {
        &self.regs
    }

    fn timeout(&self) -> Timeout {
        let timeout = Timeout::new(self.config.poll_limit);
        #[cfg(feature = "time")]
        let timeout = timeout.with_deadline(self.config.timeout);
        timeout
    }

    fn check_and_clear_error_flags(&self) -> Result<Star1, Error> {
        // Note that flags should only be cleared once they have been registered. If flags are
        // cleared otherwise, there may be an inherent race condition and flags may be missed.
        let star1 = self.regs.star1().read();

        if star1.timeout() {
            self.regs.star1().modify(|w| w.set_timeout(false));
            return Err(Error::Timeout);
        }

        if star1.pecerr() {
            self.regs.star1().modify(|w| w.set_pecerr(false));
            return Err(Error::Crc);
        }

        if star1.ovr() {
            self.regs.star1().modify(|w| w.set_ovr(false));
            return Err(Error::Overrun);
        }

        if star1.af() {
            self.regs.star1().modify(|w| w.set_af(false));
            return Err(Error::Nack);
        }

        if star1.arlo() {
            self.regs.star1().modify(|w| w.set_arlo(false));
            return Err(Error::Arbitration);
        }

        // The errata indicates that BERR may be incorrectly detected. It recommends ignoring and
        // clearing the BERR bit instead.
        if star1.berr() {
            self.regs.star1().modify(|w| w.set_berr(false));
        }

        Ok(star1)
    }

    /// Single non-blocking look at STAR1.
    fn poll(&self, flag: impl Fn(&Star1) -> bool) -> nb::Result<Star1, Error> {
        let star1 = self.check_and_clear_error_flags()?;
        if flag(&star1) {
            Ok(star1)
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Polls until `flag` is set, an error flag shows up or the wait runs out.
    fn wait(&self, flag: impl Fn(&Star1) -> bool) -> Result<Star1, Error> {
        let mut timeout = self.timeout();
        loop {
            match self.poll(&flag) {
                Ok(star1) => return Ok(star1),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => timeout.check().ok_or(Error::Timeout)?,
            }
        }
    }

    /// Sends `bytes`.
    ///
    /// - Controller: `begin_transfer` and a write `request` must have been issued. No stop is
    ///   generated, so the caller can follow up with a repeated start or [`I2c::end_transfer`].
    /// - Peripheral: waits to be addressed for a read, then answers it, see [`I2c::respond`].
    ///
    /// Returns the number of bytes from `bytes` that went out on the bus.
    pub fn write_burst(&mut self, role: Role, bytes: &[u8]) -> Result<usize, Error> {
        match role {
            Role::Controller => {
                for &byte in bytes {
                    self.write_byte(byte)?;
                }
                Ok(bytes.len())
            }
            Role::Peripheral => match self.wait_addressed()? {
                Direction::Read => self.respond(bytes),
                Direction::Write => Err(Error::UnexpectedDirection),
            },
        }
    }

    /// Fills `buffer`.
    ///
    /// - Controller: `begin_transfer` and a read `request` must have been issued. Reads exactly
    ///   `buffer.len()` bytes, NACKs the last one and generates the stop condition.
    /// - Peripheral: waits to be addressed for a write, then receives until the controller stops,
    ///   see [`I2c::receive`].
    ///
    /// Returns the number of bytes stored.
    pub fn read_burst(&mut self, role: Role, buffer: &mut [u8]) -> Result<usize, Error> {
        match role {
            Role::Controller => {
                if buffer.is_empty() {
                    return Err(Error::ZeroLengthTransfer);
                }
                self.receive_controller(buffer.len(), Ending::Stop, |i, byte| {
                    if let Some(slot) = buffer.get_mut(i) {
                        *slot = byte;
                    }
                })?;
                Ok(buffer.len())
            }
            Role::Peripheral => match self.wait_addressed()? {
                Direction::Write => self.receive(buffer),
                Direction::Read => Err(Error::UnexpectedDirection),
            },
        }
    }

    /// Blocking transaction with operations, as controller.
    ///
    /// Consecutive operations of same type are merged into one frame: each frame gets a (repeated)
    /// start and an address phase, and the last one a stop. See [transaction contract] for details.
    ///
    /// [transaction contract]: embedded_hal::i2c::I2c::transaction
    pub fn blocking_transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Error> {
        // Check empty read buffer before starting transaction. Otherwise, we would risk halting with an
        // error in the middle of the transaction.
        if operations.iter().any(|op| matches!(op, Operation::Read(read) if read.is_empty())) {
            return Err(Error::ZeroLengthTransfer);
        }
        if address > 0x7F {
            return Err(Error::InvalidAddress);
        }

        let mut frames = operations
            .chunk_by_mut(|a, b| {
                matches!(
                    (a, b),
                    (Operation::Read(_), Operation::Read(_)) | (Operation::Write(_), Operation::Write(_))
                )
            })
            .peekable();

        while let Some(frame) = frames.next() {
            let last = frames.peek().is_none();

            self.begin_transfer()?;
            if matches!(frame.first(), Some(Operation::Read(_))) {
                self.request(address_byte(address, Direction::Read))?;
                let len: usize = frame.iter().map(op_len).sum();
                // the next frame's start has to be requested before the last bytes are drained
                let ending = if last { Ending::Stop } else { Ending::RepeatedStart };
                self.receive_controller(len, ending, |i, byte| {
                    if let Some(slot) = frame_byte(&mut *frame, i) {
                        *slot = byte;
                    }
                })?;
            } else {
                self.request(address_byte(address, Direction::Write))?;
                for op in frame.iter() {
                    if let Operation::Write(bytes) = op {
                        for &byte in bytes.iter() {
                            self.write_byte(byte)?;
                        }
                    }
                }
                if last {
                    self.end_transfer();
                }
            }
        }

        Ok(())
    }
}

fn op_len(op: &Operation<'_>) -> usize {
    match op {
        Operation::Read(read) => read.len(),
        Operation::Write(write) => write.len(),
    }
}

/// Byte `index` of a merged read frame.
fn frame_byte<'a>(frame: &'a mut [Operation<'_>], mut index: usize) -> Option<&'a mut u8> {
    for op in frame.iter_mut() {
        if let Operation::Read(read) = op {
            if index < read.len() {
                return read.get_mut(index);
            }
            index -= read.len();
        }
    }
    None
}

impl<B: RegisterBlock> Drop for I2c<B> {
    fn drop(&mut self) {
        self.regs.ctlr1().modify(|w| w.set_pe(false));
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

        match *self {
            Self::Bus => ErrorKind::Bus,
            Self::Arbitration => ErrorKind::ArbitrationLoss,
            Self::AddressNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            Self::Nack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            Self::Overrun | Self::BufferOverflow => ErrorKind::Overrun,
            Self::Timeout
            | Self::Crc
            | Self::ZeroLengthTransfer
            | Self::UnexpectedDirection
            | Self::InvalidAddress => ErrorKind::Other,
        }
    }
}

impl<B: RegisterBlock> embedded_hal::i2c::ErrorType for I2c<B> {
    type Error = Error;
}

impl<B: RegisterBlock> embedded_hal::i2c::I2c for I2c<B> {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        self.blocking_transaction(address, operations)
    }
}
