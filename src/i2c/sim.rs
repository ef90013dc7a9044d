//! Cycle-stepped model of an I2C v1 block and the bus behind it, for host tests.
//!
//! Every register access first advances the model by one tick, then performs the access. A byte
//! takes [`BYTE_TICKS`] ticks on the wire. The model either plays the controller side against a
//! scripted [`Target`], or the peripheral side against a scripted remote controller ([`Op`]s).

use std::cell::RefCell;
use std::collections::VecDeque;

#[cfg(feature = "embassy")]
use embassy_sync::waitqueue::AtomicWaker;

use crate::regs::{Ctlr1, Ctlr2, Oaddr1, Oaddr2, Register, RegisterBlock, Star1, Star2};

pub const BYTE_TICKS: u32 = 2;

/// What happened on SDA/SCL.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BusEvent {
    Start,
    Restart,
    Address { byte: u8, ack: bool },
    Data { byte: u8, ack: bool },
    Stop,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Trace {
    Read(Register, u16),
    Write(Register, u16),
    Bus(BusEvent),
    /// STOPF raised on the peripheral side.
    StopDetected,
}

/// Remote device answering the simulated controller. Bytes written to it are appended to the data
/// it returns on reads; reads past the end return 0xFF.
pub struct Target {
    address: u8,
    data: VecDeque<u8>,
    received: Vec<u8>,
}

impl Target {
    pub fn loopback(address: u8) -> Self {
        Self {
            address,
            data: VecDeque::new(),
            received: Vec::new(),
        }
    }

    pub fn with_data(address: u8, data: &[u8]) -> Self {
        Self {
            data: data.iter().copied().collect(),
            ..Self::loopback(address)
        }
    }
}

/// One action of the remote controller driving the simulated peripheral.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Op {
    Start,
    Address(u8),
    /// Controller sends a byte.
    Write(u8),
    /// Controller clocks in a byte and answers with ACK or NACK.
    Read { ack: bool },
    Stop,
}

/// Replays a recorded controller transfer as a remote-controller script.
pub fn script_from_wire(events: &[BusEvent]) -> Vec<Op> {
    let mut reading = false;
    events
        .iter()
        .map(|event| match *event {
            BusEvent::Start | BusEvent::Restart => Op::Start,
            BusEvent::Address { byte, .. } => {
                reading = byte & 1 == 1;
                Op::Address(byte)
            }
            BusEvent::Data { byte, ack } => {
                if reading {
                    Op::Read { ack }
                } else {
                    Op::Write(byte)
                }
            }
            BusEvent::Stop => Op::Stop,
        })
        .collect()
}

enum Side {
    Controller { target: Target, hold_start: bool },
    Peripheral { script: VecDeque<Op> },
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum FlightKind {
    Address,
    Tx,
    Rx,
}

/// Byte currently on the wire.
struct Flight {
    byte: u8,
    ticks: u32,
    kind: FlightKind,
    /// ACK bit at the time the byte started, used when POS is set.
    ack: bool,
}

struct State {
    ctlr1: Ctlr1,
    ctlr2: Ctlr2,
    oaddr1: Oaddr1,
    oaddr2: Oaddr2,
    ckcfgr: u16,
    rtr: u16,
    /// Latched STAR1 flags; TxE, RxNE and BTF are derived.
    flags: Star1,
    msl: bool,
    busy: bool,
    tra: bool,
    receiving: bool,
    addressed: bool,
    tx_dr: Option<u8>,
    /// Peripheral transmit shift register, loaded from DATAR as soon as it is free.
    tx_shift: Option<u8>,
    tx_done: bool,
    rx_dr: Option<u8>,
    rx_shift: Option<u8>,
    flight: Option<Flight>,
    addr_armed: bool,
    stopf_armed: bool,
    side: Side,
    trace: Vec<Trace>,
}

impl State {
    fn new(side: Side) -> Self {
        Self {
            ctlr1: Ctlr1(0),
            ctlr2: Ctlr2(0),
            oaddr1: Oaddr1(0),
            oaddr2: Oaddr2(0),
            ckcfgr: 0,
            rtr: 0,
            flags: Star1(0),
            msl: false,
            busy: false,
            tra: false,
            receiving: false,
            addressed: false,
            tx_dr: None,
            tx_shift: None,
            tx_done: false,
            rx_dr: None,
            rx_shift: None,
            flight: None,
            addr_armed: false,
            stopf_armed: false,
            side,
            trace: Vec::new(),
        }
    }

    fn reset(&mut self) {
        let side = std::mem::replace(&mut self.side, Side::Peripheral { script: VecDeque::new() });
        let trace = std::mem::take(&mut self.trace);
        *self = Self::new(side);
        self.trace = trace;
    }

    fn bus(&mut self, event: BusEvent) {
        self.trace.push(Trace::Bus(event));
    }

    fn star1(&self) -> Star1 {
        let mut star1 = self.flags;
        let transmitting = self.tra && !self.flags.addr();
        star1.set_tx_e(transmitting && self.tx_dr.is_none());
        star1.set_rx_ne(self.rx_dr.is_some());
        star1.set_btf(if transmitting {
            self.tx_done && self.tx_dr.is_none() && self.flight.is_none()
        } else {
            self.rx_dr.is_some() && self.rx_shift.is_some()
        });
        star1
    }

    fn star2(&self) -> Star2 {
        let mut star2 = Star2(0);
        star2.set_msl(self.msl);
        star2.set_busy(self.busy);
        star2.set_tra(self.tra);
        star2
    }

    fn push_rx(&mut self, byte: u8) {
        if self.rx_dr.is_none() {
            self.rx_dr = Some(byte);
        } else {
            self.rx_shift = Some(byte);
        }
    }

    /// Advances one tick. Returns true when ADDR was raised with the event interrupt enabled.
    fn step(&mut self) -> bool {
        if !self.ctlr1.pe() {
            return false;
        }
        match self.side {
            Side::Controller { .. } => {
                self.step_controller();
                false
            }
            Side::Peripheral { .. } => self.step_peripheral(),
        }
    }

    fn step_controller(&mut self) {
        if let Some(flight) = self.flight.as_mut() {
            flight.ticks -= 1;
            if flight.ticks > 0 {
                return;
            }
            if let Some(flight) = self.flight.take() {
                self.complete(flight);
            }
        }

        if self.ctlr1.stop() {
            self.ctlr1.set_stop(false);
            if self.msl {
                self.msl = false;
                self.busy = false;
                self.tra = false;
                self.receiving = false;
                self.tx_done = false;
                self.flags.set_sb(false);
                self.flags.set_addr(false);
                self.bus(BusEvent::Stop);
            }
            return;
        }

        if self.ctlr1.start() {
            if let Side::Controller { hold_start: true, .. } = self.side {
                return;
            }
            self.ctlr1.set_start(false);
            let event = if self.msl { BusEvent::Restart } else { BusEvent::Start };
            self.msl = true;
            self.busy = true;
            self.tra = false;
            self.receiving = false;
            self.tx_done = false;
            self.flags.set_addr(false);
            self.flags.set_sb(true);
            self.bus(event);
            return;
        }

        if !self.msl || self.flags.addr() || self.flags.af() || self.flags.sb() {
            return;
        }
        if self.tra {
            if let Some(byte) = self.tx_dr.take() {
                self.flight = Some(Flight {
                    byte,
                    ticks: BYTE_TICKS,
                    kind: FlightKind::Tx,
                    ack: false,
                });
            }
        } else if self.receiving && self.rx_shift.is_none() {
            // a NACK does not stop the clock, only a pending stop or start does
            let byte = match &mut self.side {
                Side::Controller { target, .. } => target.data.pop_front().unwrap_or(0xFF),
                Side::Peripheral { .. } => 0xFF,
            };
            self.flight = Some(Flight {
                byte,
                ticks: BYTE_TICKS,
                kind: FlightKind::Rx,
                ack: self.ctlr1.ack(),
            });
        }
    }

    fn complete(&mut self, flight: Flight) {
        let Side::Controller { target, .. } = &mut self.side else {
            return;
        };
        match flight.kind {
            FlightKind::Address => {
                let ack = flight.byte >> 1 == target.address;
                if ack {
                    self.flags.set_addr(true);
                    self.tra = flight.byte & 1 == 0;
                    self.receiving = !self.tra;
                } else {
                    self.flags.set_af(true);
                }
                self.bus(BusEvent::Address { byte: flight.byte, ack });
            }
            FlightKind::Tx => {
                target.received.push(flight.byte);
                target.data.push_back(flight.byte);
                self.tx_done = true;
                self.bus(BusEvent::Data { byte: flight.byte, ack: true });
            }
            FlightKind::Rx => {
                let ack = if self.ctlr1.pos() { flight.ack } else { self.ctlr1.ack() };
                self.push_rx(flight.byte);
                self.bus(BusEvent::Data { byte: flight.byte, ack });
            }
        }
    }

    fn own_address(&self, address: u8) -> bool {
        address == self.oaddr1.add7()
            || (self.oaddr2.endual() && address == self.oaddr2.add2())
            || (address == 0 && self.ctlr1.engc())
    }

    fn step_peripheral(&mut self) -> bool {
        // DATAR moves to the shift register in a tick of its own, raising TxE again. Nothing
        // moves after the controller's NACK.
        if self.addressed && self.tra && !self.flags.addr() && !self.flags.af() && self.tx_shift.is_none() {
            if let Some(byte) = self.tx_dr.take() {
                self.tx_shift = Some(byte);
                return false;
            }
        }

        let Side::Peripheral { script } = &self.side else {
            return false;
        };
        let Some(&op) = script.front() else {
            return false;
        };

        let mut raised = false;
        let done = match op {
            // the remote controller waits until we are ready to answer
            Op::Start if !self.ctlr1.ack() => false,
            Op::Start => {
                let event = if self.busy { BusEvent::Restart } else { BusEvent::Start };
                self.busy = true;
                self.addressed = false;
                self.tx_shift = None;
                self.bus(event);
                true
            }
            Op::Address(byte) => {
                let ack = self.ctlr1.ack() && self.own_address(byte >> 1);
                if ack {
                    self.addressed = true;
                    self.tra = byte & 1 == 1;
                    self.flags.set_addr(true);
                    raised = self.ctlr2.itevten();
                }
                self.bus(BusEvent::Address { byte, ack });
                true
            }
            Op::Write(byte) if !self.addressed => {
                self.bus(BusEvent::Data { byte, ack: false });
                true
            }
            Op::Write(_) if self.flags.addr() || self.rx_shift.is_some() => false,
            Op::Write(byte) => {
                let ack = self.ctlr1.ack();
                self.push_rx(byte);
                self.bus(BusEvent::Data { byte, ack });
                true
            }
            Op::Read { ack } if !self.addressed => {
                self.bus(BusEvent::Data { byte: 0xFF, ack });
                true
            }
            Op::Read { ack } => match self.tx_shift {
                Some(byte) if !self.flags.addr() => {
                    self.tx_shift = None;
                    if !ack {
                        self.flags.set_af(true);
                    }
                    self.bus(BusEvent::Data { byte, ack });
                    true
                }
                // clock stretched until DATAR is loaded
                _ => false,
            },
            Op::Stop => {
                self.bus(BusEvent::Stop);
                if self.addressed && !self.tra {
                    self.flags.set_stopf(true);
                    self.trace.push(Trace::StopDetected);
                }
                self.addressed = false;
                self.busy = false;
                self.tx_shift = None;
                true
            }
        };

        if done {
            if let Side::Peripheral { script } = &mut self.side {
                script.pop_front();
            }
        }
        raised
    }

    fn read(&mut self, reg: Register) -> u16 {
        match reg {
            Register::Ctlr1 => self.ctlr1.0,
            Register::Ctlr2 => self.ctlr2.0,
            Register::Oaddr1 => self.oaddr1.0,
            Register::Oaddr2 => self.oaddr2.0,
            Register::Ckcfgr => self.ckcfgr,
            Register::Rtr => self.rtr,
            Register::Datar => {
                let byte = self.rx_dr.take();
                self.rx_dr = self.rx_shift.take();
                byte.unwrap_or(0) as u16
            }
            Register::Star1 => {
                let star1 = self.star1();
                self.addr_armed = star1.addr();
                self.stopf_armed = star1.stopf();
                star1.0
            }
            Register::Star2 => {
                let star2 = self.star2();
                if self.addr_armed {
                    self.flags.set_addr(false);
                    self.addr_armed = false;
                }
                star2.0
            }
        }
    }

    fn write(&mut self, reg: Register, value: u16) {
        match reg {
            Register::Ctlr1 => {
                let mut ctlr1 = Ctlr1(value);
                if ctlr1.swrst() {
                    self.reset();
                    self.ctlr1 = ctlr1;
                    return;
                }
                if !ctlr1.pe() {
                    ctlr1.set_ack(false);
                    ctlr1.set_start(false);
                    ctlr1.set_stop(false);
                }
                if self.stopf_armed {
                    self.flags.set_stopf(false);
                    self.stopf_armed = false;
                }
                self.ctlr1 = ctlr1;
            }
            Register::Ctlr2 => self.ctlr2 = Ctlr2(value),
            Register::Oaddr1 => self.oaddr1 = Oaddr1(value),
            Register::Oaddr2 => self.oaddr2 = Oaddr2(value),
            Register::Ckcfgr => self.ckcfgr = value,
            Register::Rtr => self.rtr = value,
            Register::Datar => {
                let byte = value as u8;
                if self.flags.sb() {
                    self.flags.set_sb(false);
                    self.flight = Some(Flight {
                        byte,
                        ticks: BYTE_TICKS,
                        kind: FlightKind::Address,
                        ack: false,
                    });
                } else if self.tra {
                    self.tx_dr = Some(byte);
                }
            }
            Register::Star1 => self.flags.0 &= value | !Star1::RC_W0,
            Register::Star2 => {}
        }
    }
}

/// Simulated I2C block.
pub struct Sim {
    state: RefCell<State>,
    #[cfg(feature = "embassy")]
    waker: AtomicWaker,
}

impl Sim {
    fn with_side(side: Side) -> Self {
        Self {
            state: RefCell::new(State::new(side)),
            #[cfg(feature = "embassy")]
            waker: AtomicWaker::new(),
        }
    }

    /// Controller side, talking to `target`.
    pub fn controller(target: Target) -> Self {
        Self::with_side(Side::Controller {
            target,
            hold_start: false,
        })
    }

    /// Controller side on a bus somebody else holds: start conditions never go out.
    pub fn stuck_bus() -> Self {
        Self::with_side(Side::Controller {
            target: Target::loopback(0),
            hold_start: true,
        })
    }

    /// Peripheral side, addressed by a remote controller running `script`.
    pub fn peripheral(script: Vec<Op>) -> Self {
        Self::with_side(Side::Peripheral {
            script: script.into(),
        })
    }

    fn step(&self) {
        let raised = self.state.borrow_mut().step();
        #[cfg(feature = "embassy")]
        if raised {
            self.waker.wake();
        }
        #[cfg(not(feature = "embassy"))]
        let _ = raised;
    }

    pub fn trace(&self) -> Vec<Trace> {
        self.state.borrow().trace.clone()
    }

    pub fn clear_trace(&self) {
        self.state.borrow_mut().trace.clear();
    }

    pub fn bus_events(&self) -> Vec<BusEvent> {
        self.state
            .borrow()
            .trace
            .iter()
            .filter_map(|t| match t {
                Trace::Bus(event) => Some(*event),
                _ => None,
            })
            .collect()
    }

    /// Bytes the target has accepted so far.
    pub fn received(&self) -> Vec<u8> {
        match &self.state.borrow().side {
            Side::Controller { target, .. } => target.received.clone(),
            Side::Peripheral { .. } => Vec::new(),
        }
    }

    /// Whether the remote controller has run its whole script.
    pub fn script_done(&self) -> bool {
        match &self.state.borrow().side {
            Side::Peripheral { script } => script.is_empty(),
            Side::Controller { .. } => true,
        }
    }

    /// Register value without advancing the model or recording an access.
    pub fn peek(&self, reg: Register) -> u16 {
        let state = self.state.borrow();
        match reg {
            Register::Star1 => state.star1().0,
            Register::Star2 => state.star2().0,
            Register::Datar => state.rx_dr.unwrap_or(0) as u16,
            Register::Ctlr1 => state.ctlr1.0,
            Register::Ctlr2 => state.ctlr2.0,
            Register::Oaddr1 => state.oaddr1.0,
            Register::Oaddr2 => state.oaddr2.0,
            Register::Ckcfgr => state.ckcfgr,
            Register::Rtr => state.rtr,
        }
    }
}

impl RegisterBlock for Sim {
    fn read(&self, reg: Register) -> u16 {
        self.step();
        let mut state = self.state.borrow_mut();
        let value = state.read(reg);
        state.trace.push(Trace::Read(reg, value));
        value
    }

    fn write(&self, reg: Register, value: u16) {
        self.step();
        let mut state = self.state.borrow_mut();
        state.trace.push(Trace::Write(reg, value));
        state.write(reg, value);
    }

    #[cfg(feature = "embassy")]
    fn waker(&self) -> &AtomicWaker {
        &self.waker
    }
}
