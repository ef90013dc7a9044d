//! Peripheral role: waiting to be addressed and serving the transfer.

#[cfg(feature = "embassy")]
use core::future::poll_fn;
#[cfg(feature = "embassy")]
use core::task::Poll;

use super::{Direction, Error, I2c};
use crate::regs::{RegisterBlock, Star1};

/// Sent when the controller keeps reading past the end of the response.
pub const FILLER: u8 = 0xFF;

impl<B: RegisterBlock> I2c<B> {
    /// Checks once whether a controller has addressed us.
    ///
    /// On a match ADDR is cleared and the direction the controller asked for is returned.
    pub fn try_addressed(&mut self) -> nb::Result<Direction, Error> {
        self.poll(Star1::addr)?;

        // Reading SR2 after SR1 clears ADDR and releases SCL
        let star2 = self.regs.star2().read();
        let direction = if star2.tra() { Direction::Read } else { Direction::Write };
        trace!("i2c: addressed, {}", direction);
        Ok(direction)
    }

    /// Waits until a controller addresses one of our own addresses.
    pub fn wait_addressed(&mut self) -> Result<Direction, Error> {
        self.regs.ctlr1().modify(|w| w.set_ack(true));

        let mut timeout = self.timeout();
        loop {
            match self.try_addressed() {
                Ok(direction) => return Ok(direction),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => timeout.check().ok_or(Error::Timeout)?,
            }
        }
    }

    /// Waits for the address match from the event interrupt.
    ///
    /// [`on_interrupt`](super::on_interrupt) must be hooked up to the event and error interrupts of
    /// this block.
    #[cfg(feature = "embassy")]
    pub async fn listen(&mut self) -> Result<Direction, Error> {
        self.regs.ctlr1().modify(|w| w.set_ack(true));

        poll_fn(|cx| {
            self.regs.waker().register(cx.waker());

            match self.try_addressed() {
                Ok(direction) => Poll::Ready(Ok(direction)),
                Err(nb::Error::Other(e)) => Poll::Ready(Err(e)),
                Err(nb::Error::WouldBlock) => {
                    // When pending, (re-)enable interrupts to wake us up.
                    self.regs.ctlr2().modify(|w| {
                        w.set_iterren(true);
                        w.set_itevten(true);
                    });
                    Poll::Pending
                }
            }
        })
        .await
    }

    /// Transmits `bytes` to a controller that addressed us for a read.
    ///
    /// Data is written on every TxE until the controller NACKs; bytes requested past the end of
    /// `bytes` are sent as [`FILLER`]. Returns how many bytes of `bytes` the controller clocked out.
    pub fn respond(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        let mut written = 0;
        let mut timeout = self.timeout();

        loop {
            let star1 = match self.check_and_clear_error_flags() {
                Ok(star1) => star1,
                // NACK from the controller ends the transfer, AF is already cleared
                Err(Error::Nack) => break,
                Err(e) => return Err(e),
            };

            if star1.tx_e() {
                let byte = bytes.get(written).copied().unwrap_or(FILLER);
                self.regs.datar().write(|w| w.set_datar(byte));
                written += 1;
                timeout = self.timeout();
            } else if star1.stopf() {
                self.regs.ctlr1().modify(|_| {});
                break;
            } else {
                timeout.check().ok_or(Error::Timeout)?;
            }
        }

        // a byte still sitting in DATAR never made it onto the bus
        let pending = !self.regs.star1().read().tx_e();
        let sent = written.saturating_sub(pending as usize);
        trace!("i2c: responded {} bytes", sent);
        Ok(sent.min(bytes.len()))
    }

    /// Receives from a controller that addressed us for a write, until it stops or addresses us
    /// again with a repeated start.
    ///
    /// Bytes that do not fit `buffer` are still acknowledged and drained, then reported as
    /// [`Error::BufferOverflow`].
    pub fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, Error> {
        let mut count = 0;
        let mut dropped = 0usize;
        let mut timeout = self.timeout();

        loop {
            let star1 = self.check_and_clear_error_flags()?;

            if star1.rx_ne() {
                let byte = self.regs.datar().read().datar();
                match buffer.get_mut(count) {
                    Some(slot) => {
                        *slot = byte;
                        count += 1;
                    }
                    None => dropped += 1,
                }
                timeout = self.timeout();
            } else if star1.stopf() {
                // STOPF is cleared by a write to CTLR1 after the STAR1 read
                self.regs.ctlr1().modify(|_| {});
                trace!("i2c: stop detected");
                break;
            } else if star1.addr() {
                break;
            } else {
                timeout.check().ok_or(Error::Timeout)?;
            }
        }

        if dropped > 0 {
            warn!("i2c: receive buffer full, dropped {} bytes", dropped);
            return Err(Error::BufferOverflow);
        }
        Ok(count)
    }
}
