//! I2C v1 register block.
//!
//! The register layout is shared by the CH32V1/V2/V3 and STM32F1 I2C peripherals. Every register
//! is 32 bits wide on the bus with only the low half-word implemented.

use core::marker::PhantomData;

#[cfg(feature = "embassy")]
use embassy_sync::waitqueue::AtomicWaker;

/// Register offsets within one I2C block.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    Ctlr1 = 0x00,
    Ctlr2 = 0x04,
    Oaddr1 = 0x08,
    Oaddr2 = 0x0C,
    Datar = 0x10,
    Star1 = 0x14,
    Star2 = 0x18,
    Ckcfgr = 0x1C,
    Rtr = 0x20,
}

impl Register {
    #[inline(always)]
    pub const fn offset(self) -> usize {
        self as usize
    }
}

/// A typed view of one register.
pub trait RegValue: Copy + Default {
    const REGISTER: Register;

    fn from_bits(bits: u16) -> Self;
    fn to_bits(self) -> u16;
}

regval! {
    /// Control register 1
    pub struct Ctlr1 = Ctlr1;
    bits {
        /// Peripheral enable
        pe / set_pe = 0;
        /// SMBus mode
        smbus / set_smbus = 1;
        /// SMBus type, host when set
        smbtype / set_smbtype = 3;
        enarp / set_enarp = 4;
        enpec / set_enpec = 5;
        /// General call enable
        engc / set_engc = 6;
        /// Clock stretching disable (slave mode)
        nostretch / set_nostretch = 7;
        start / set_start = 8;
        stop / set_stop = 9;
        ack / set_ack = 10;
        /// ACK/PEC position: ACK applies to the next byte received in the shift register
        pos / set_pos = 11;
        pec / set_pec = 12;
        alert / set_alert = 13;
        /// Software reset
        swrst / set_swrst = 15;
    }
    fields {}
}

regval! {
    /// Control register 2
    pub struct Ctlr2 = Ctlr2;
    bits {
        iterren / set_iterren = 8;
        itevten / set_itevten = 9;
        itbufen / set_itbufen = 10;
        dmaen / set_dmaen = 11;
        last / set_last = 12;
    }
    fields {
        /// Peripheral clock frequency in MHz
        freq / set_freq: u8 = 0, 6;
    }
}

regval! {
    /// Own address register 1
    pub struct Oaddr1 = Oaddr1;
    bits {
        /// Must be kept at 1 by software
        fixed / set_fixed = 14;
        /// 10-bit slave address when set
        addmode / set_addmode = 15;
    }
    fields {
        /// Full 10-bit address field
        add / set_add: u16 = 0, 10;
        /// 7-bit address, bits 7:1
        add7 / set_add7: u8 = 1, 7;
    }
}

regval! {
    /// Own address register 2
    pub struct Oaddr2 = Oaddr2;
    bits {
        /// Dual addressing mode enable
        endual / set_endual = 0;
    }
    fields {
        add2 / set_add2: u8 = 1, 7;
    }
}

regval! {
    /// Data register
    pub struct Datar = Datar;
    bits {}
    fields {
        datar / set_datar: u8 = 0, 8;
    }
}

regval! {
    /// Status register 1
    pub struct Star1 = Star1;
    bits {
        /// Start bit (master mode)
        sb / set_sb = 0;
        /// Address sent (master) / matched (slave)
        addr / set_addr = 1;
        /// Byte transfer finished
        btf / set_btf = 2;
        add10 / set_add10 = 3;
        /// Stop detection (slave mode)
        stopf / set_stopf = 4;
        rx_ne / set_rx_ne = 6;
        tx_e / set_tx_e = 7;
        berr / set_berr = 8;
        arlo / set_arlo = 9;
        /// Acknowledge failure
        af / set_af = 10;
        ovr / set_ovr = 11;
        pecerr / set_pecerr = 12;
        timeout / set_timeout = 14;
        smbalert / set_smbalert = 15;
    }
    fields {}
}

impl Star1 {
    /// Flags cleared by software writing 0; writing 1 leaves them untouched.
    pub const RC_W0: u16 = 0b1101_1111_0000_0000;
}

regval! {
    /// Status register 2
    pub struct Star2 = Star2;
    bits {
        /// Master/slave
        msl / set_msl = 0;
        busy / set_busy = 1;
        /// Transmitter/receiver
        tra / set_tra = 2;
        gencall / set_gencall = 4;
        smbdefault / set_smbdefault = 5;
        smbhost / set_smbhost = 6;
        dualf / set_dualf = 7;
    }
    fields {
        pec / set_pec: u8 = 8, 8;
    }
}

regval! {
    /// Clock control register
    pub struct Ckcfgr = Ckcfgr;
    bits {
        /// Fast mode duty cycle, 16/9 when set
        duty / set_duty = 14;
        /// Fast/standard mode selection
        f_s / set_f_s = 15;
    }
    fields {
        ccr / set_ccr: u16 = 0, 12;
    }
}

regval! {
    /// Rise time register
    pub struct Rtr = Rtr;
    bits {}
    fields {
        trise / set_trise: u8 = 0, 6;
    }
}

/// Raw access to one I2C register block.
///
/// Implemented by the memory-mapped peripheral handles and by anything else that can stand in
/// for them, such as a register model.
pub trait RegisterBlock {
    fn read(&self, reg: Register) -> u16;
    fn write(&self, reg: Register, value: u16);

    /// Waker notified from the event interrupt of this block.
    #[cfg(feature = "embassy")]
    fn waker(&self) -> &AtomicWaker;

    #[inline(always)]
    fn ctlr1(&self) -> Reg<'_, Self, Ctlr1> {
        Reg::new(self)
    }
    #[inline(always)]
    fn ctlr2(&self) -> Reg<'_, Self, Ctlr2> {
        Reg::new(self)
    }
    #[inline(always)]
    fn oaddr1(&self) -> Reg<'_, Self, Oaddr1> {
        Reg::new(self)
    }
    #[inline(always)]
    fn oaddr2(&self) -> Reg<'_, Self, Oaddr2> {
        Reg::new(self)
    }
    #[inline(always)]
    fn datar(&self) -> Reg<'_, Self, Datar> {
        Reg::new(self)
    }
    #[inline(always)]
    fn star1(&self) -> Reg<'_, Self, Star1> {
        Reg::new(self)
    }
    #[inline(always)]
    fn star2(&self) -> Reg<'_, Self, Star2> {
        Reg::new(self)
    }
    #[inline(always)]
    fn ckcfgr(&self) -> Reg<'_, Self, Ckcfgr> {
        Reg::new(self)
    }
    #[inline(always)]
    fn rtr(&self) -> Reg<'_, Self, Rtr> {
        Reg::new(self)
    }
}

impl<T: RegisterBlock + ?Sized> RegisterBlock for &T {
    #[inline(always)]
    fn read(&self, reg: Register) -> u16 {
        T::read(self, reg)
    }

    #[inline(always)]
    fn write(&self, reg: Register, value: u16) {
        T::write(self, reg, value)
    }

    #[cfg(feature = "embassy")]
    fn waker(&self) -> &AtomicWaker {
        T::waker(self)
    }
}

/// Proxy for a single register of a [`RegisterBlock`].
pub struct Reg<'a, B: ?Sized, T> {
    block: &'a B,
    _phantom: PhantomData<T>,
}

impl<'a, B: RegisterBlock + ?Sized, T: RegValue> Reg<'a, B, T> {
    #[inline(always)]
    fn new(block: &'a B) -> Self {
        Self {
            block,
            _phantom: PhantomData,
        }
    }

    #[inline(always)]
    pub fn read(&self) -> T {
        T::from_bits(self.block.read(T::REGISTER))
    }

    /// Writes a value built from the reset value (all zeroes).
    #[inline(always)]
    pub fn write(&self, f: impl FnOnce(&mut T)) {
        let mut val = T::default();
        f(&mut val);
        self.block.write(T::REGISTER, val.to_bits());
    }

    #[inline(always)]
    pub fn write_value(&self, val: T) {
        self.block.write(T::REGISTER, val.to_bits());
    }

    /// Read-modify-write.
    #[inline(always)]
    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        let mut val = self.read();
        f(&mut val);
        self.block.write(T::REGISTER, val.to_bits());
    }
}
