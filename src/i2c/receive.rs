//! Controller receive sequencing.
//!
//! The I2C v1 block needs a different ACK/POS/STOP choreography depending on how many bytes are
//! left, otherwise the controller clocks in one byte too many before the NACK and the stop
//! condition take effect. [`Reception`] yields that choreography as a sequence of [`Step`]s for a
//! transfer of a given length; the driver executes the steps against the registers.
//!
//! | bytes | prologue                                   | tail                                                        |
//! |-------|--------------------------------------------|-------------------------------------------------------------|
//! | 1     | ACK=0, clear ADDR, STOP                    | wait RxNE, read                                             |
//! | 2     | POS=1, ACK=1, clear ADDR, ACK=0            | wait BTF, STOP, read, read, POS=0                           |
//! | N > 2 | ACK=1, clear ADDR, (wait RxNE, read)*      | wait BTF, ACK=0, read, STOP, wait BTF, read, read           |
//!
//! A reception followed by a repeated start requests START in the STOP slot instead.

/// One register-level action of a controller receive.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Program CTLR1.ACK.
    Ack(bool),
    /// Program CTLR1.POS.
    AckPosition(bool),
    /// Clear ADDR by reading STAR1 then STAR2, which releases the clock.
    ClearAddr,
    /// Wait until DATAR holds a byte.
    WaitRxne,
    /// Wait until both DATAR and the shift register hold a byte.
    WaitBtf,
    /// Request a stop condition.
    Stop,
    /// Request a repeated start condition.
    Start,
    /// Read DATAR into the given buffer index.
    Read(usize),
}

/// Where a [`Reception`] is in its sequence.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// ADDR is set and the ACK policy is being programmed.
    AddressPhaseComplete { at: usize },
    /// Plain ACKed reception while more than three bytes remain.
    AckEnabledReceiving { next: usize, ready: bool },
    /// NACK, stop and drain of the last one, two or three bytes.
    LastBytes { at: usize },
    Done,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Regime {
    Single,
    Pair,
    Burst,
}

impl Regime {
    const fn of(len: usize) -> Self {
        match len {
            0 | 1 => Regime::Single,
            2 => Regime::Pair,
            _ => Regime::Burst,
        }
    }

    const fn prologue(self) -> &'static [Step] {
        match self {
            Regime::Single => &[Step::Ack(false), Step::ClearAddr, Step::Stop],
            Regime::Pair => &[Step::AckPosition(true), Step::Ack(true), Step::ClearAddr, Step::Ack(false)],
            Regime::Burst => &[Step::Ack(true), Step::ClearAddr],
        }
    }

    /// Tail steps; `Read` indices are relative to the first tail byte.
    const fn tail(self) -> &'static [Step] {
        match self {
            Regime::Single => &[Step::WaitRxne, Step::Read(0)],
            Regime::Pair => &[
                Step::WaitBtf,
                Step::Stop,
                Step::Read(0),
                Step::Read(1),
                Step::AckPosition(false),
            ],
            Regime::Burst => &[
                Step::WaitBtf,
                Step::Ack(false),
                Step::Read(0),
                Step::Stop,
                Step::WaitBtf,
                Step::Read(1),
                Step::Read(2),
            ],
        }
    }

    const fn tail_len(self) -> usize {
        match self {
            Regime::Single => 1,
            Regime::Pair => 2,
            Regime::Burst => 3,
        }
    }
}

/// Condition a [`Reception`] ends the transfer with.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ending {
    Stop,
    /// Hand over to the next frame of a transaction without releasing the bus.
    RepeatedStart,
}

/// Step sequence for one controller receive of `len` bytes.
///
/// The stop or repeated start is requested at the point where the hardware needs it, before the
/// last bytes are drained, so no byte is clocked after the NACK.
#[derive(Clone, Debug)]
pub struct Reception {
    len: usize,
    ending: Ending,
    regime: Regime,
    state: State,
}

impl Reception {
    pub fn new(len: usize, ending: Ending) -> Self {
        Self {
            len,
            ending,
            regime: Regime::of(len),
            state: if len == 0 {
                State::Done
            } else {
                State::AddressPhaseComplete { at: 0 }
            },
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    fn tail_start(&self) -> usize {
        self.len - self.regime.tail_len()
    }

    fn advance(&mut self) -> Option<Step> {
        match self.state {
            State::AddressPhaseComplete { at } => {
                let prologue = self.regime.prologue();
                let step = prologue[at];
                self.state = if at + 1 < prologue.len() {
                    State::AddressPhaseComplete { at: at + 1 }
                } else if self.tail_start() > 0 {
                    State::AckEnabledReceiving { next: 0, ready: false }
                } else {
                    State::LastBytes { at: 0 }
                };
                Some(step)
            }
            State::AckEnabledReceiving { next, ready: false } => {
                self.state = State::AckEnabledReceiving { next, ready: true };
                Some(Step::WaitRxne)
            }
            State::AckEnabledReceiving { next, ready: true } => {
                self.state = if next + 1 < self.tail_start() {
                    State::AckEnabledReceiving {
                        next: next + 1,
                        ready: false,
                    }
                } else {
                    State::LastBytes { at: 0 }
                };
                Some(Step::Read(next))
            }
            State::LastBytes { at } => {
                let tail = self.regime.tail();
                let step = match tail[at] {
                    Step::Read(i) => Step::Read(self.tail_start() + i),
                    step => step,
                };
                self.state = if at + 1 < tail.len() {
                    State::LastBytes { at: at + 1 }
                } else {
                    State::Done
                };
                Some(step)
            }
            State::Done => None,
        }
    }
}

impl Iterator for Reception {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        match self.advance()? {
            Step::Stop if self.ending == Ending::RepeatedStart => Some(Step::Start),
            step => Some(step),
        }
    }
}
