//! Controller role: conditions, address phase and byte transfers.

use super::receive::{Ending, Reception, Step};
use super::{Error, I2c};
use crate::regs::{RegisterBlock, Star1};

impl<B: RegisterBlock> I2c<B> {
    /// Generates a start condition and waits until it is on the bus.
    ///
    /// If this controller still owns the bus from an unterminated transfer the hardware sends a
    /// repeated start instead. A start already requested by a receive that ended in
    /// [`Ending::RepeatedStart`] is only waited for.
    pub fn begin_transfer(&mut self) -> Result<(), Error> {
        let star1 = self.check_and_clear_error_flags()?;
        if !star1.sb() && !self.regs.ctlr1().read().start() {
            // Send a START condition
            self.regs.ctlr1().modify(|reg| reg.set_start(true));
        }

        // Wait until START condition was generated
        self.wait(Star1::sb)?;

        // Check if we were the ones to generate START
        if self.regs.ctlr1().read().start() || !self.regs.star2().read().msl() {
            return Err(Error::Arbitration);
        }

        trace!("i2c: start");
        Ok(())
    }

    /// Requests a stop condition after the current byte. Does not wait for it.
    pub fn end_transfer(&mut self) {
        self.regs.ctlr1().modify(|reg| reg.set_stop(true));
    }

    /// Waits until a requested stop condition has been generated.
    pub fn wait_for_stop(&mut self) -> Result<(), Error> {
        let mut timeout = self.timeout();
        while self.regs.ctlr1().read().stop() {
            timeout.check().ok_or(Error::Timeout)?;
        }
        Ok(())
    }

    /// Runs the address phase with an address byte that already carries the direction bit, see
    /// [`address_byte`](super::address_byte).
    ///
    /// For a write the ADDR flag is cleared here. For a read it is left pending: the receive
    /// sequence has to program ACK and POS before ADDR is cleared, so [`I2c::read_burst`] clears it.
    pub fn request(&mut self, address_with_direction: u8) -> Result<(), Error> {
        self.wait(Star1::sb)?;

        // Set up current address we're trying to talk to
        self.regs.datar().write(|reg| reg.set_datar(address_with_direction));

        // Wait for the address to be acknowledged. If a NACK occurs, the ADDR bit will never be set.
        match self.wait(Star1::addr) {
            Ok(_) => {}
            Err(Error::Nack) => {
                warn!("i2c: address {=u8:#x} not acknowledged", address_with_direction);
                self.end_transfer();
                return Err(Error::AddressNack);
            }
            Err(e) => return Err(e),
        }

        if address_with_direction & 1 == 0 {
            // Clear condition by reading SR2
            let _ = self.regs.star2().read();
        }

        trace!("i2c: addressed {=u8:#x}", address_with_direction);
        Ok(())
    }

    /// Sends one byte and waits until it has been shifted out and acknowledged.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), Error> {
        // Wait until we're ready for sending
        self.wait(Star1::tx_e)?;

        // Push out a byte of data
        self.regs.datar().write(|reg| reg.set_datar(byte));

        // Wait until byte is transferred
        self.wait(Star1::btf)?;

        Ok(())
    }

    /// Waits for one received byte.
    ///
    /// ACK is left as it is; use [`I2c::read_burst`] to get the NACK and stop right.
    pub fn read_byte(&mut self) -> Result<u8, Error> {
        if self.check_and_clear_error_flags()?.addr() {
            let _ = self.regs.star2().read();
        }

        self.wait(Star1::rx_ne)?;
        Ok(self.regs.datar().read().datar())
    }

    /// Executes a [`Reception`] of `len` bytes, handing every byte to `store`.
    pub(super) fn receive_controller(
        &mut self,
        len: usize,
        ending: Ending,
        mut store: impl FnMut(usize, u8),
    ) -> Result<(), Error> {
        // no logging between the steps, the tail is timing critical
        trace!("i2c: receive {} bytes, then {}", len, ending);
        for step in Reception::new(len, ending) {
            match step {
                Step::Ack(ack) => self.regs.ctlr1().modify(|w| w.set_ack(ack)),
                Step::AckPosition(pos) => self.regs.ctlr1().modify(|w| w.set_pos(pos)),
                Step::ClearAddr => {
                    let _ = self.regs.star1().read();
                    let _ = self.regs.star2().read();
                }
                Step::WaitRxne => {
                    self.wait(Star1::rx_ne)?;
                }
                Step::WaitBtf => {
                    self.wait(Star1::btf)?;
                }
                Step::Stop => self.regs.ctlr1().modify(|w| w.set_stop(true)),
                Step::Start => self.regs.ctlr1().modify(|w| w.set_start(true)),
                Step::Read(index) => store(index, self.regs.datar().read().datar()),
            }
        }
        Ok(())
    }
}
