use core::ptr;

#[cfg(feature = "embassy")]
use embassy_sync::waitqueue::AtomicWaker;

use crate::regs::{Register, RegisterBlock};

static mut TAKEN: bool = false;

macro_rules! peripherals {
    ($($(#[$meta:meta])* $name:ident: $base:literal,)*) => {
        $(
            $(#[$meta])*
            #[allow(non_camel_case_types)]
            pub struct $name {
                _private: (),
            }

            impl $name {
                /// Base address of the register block.
                pub const BASE: usize = $base;

                /// Unsafely create an instance of this peripheral out of thin air.
                ///
                /// # Safety
                ///
                /// You must ensure that you're only using one instance of this type at a time.
                #[inline]
                pub unsafe fn steal() -> Self {
                    Self { _private: () }
                }
            }

            impl RegisterBlock for $name {
                #[inline(always)]
                fn read(&self, reg: Register) -> u16 {
                    unsafe { ptr::read_volatile((Self::BASE + reg.offset()) as *const u32) as u16 }
                }

                #[inline(always)]
                fn write(&self, reg: Register, value: u16) {
                    unsafe { ptr::write_volatile((Self::BASE + reg.offset()) as *mut u32, value as u32) }
                }

                #[cfg(feature = "embassy")]
                fn waker(&self) -> &AtomicWaker {
                    static WAKER: AtomicWaker = AtomicWaker::new();
                    &WAKER
                }
            }
        )*

        /// All I2C peripherals of the chip.
        #[allow(non_snake_case)]
        pub struct Peripherals {
            $(
                $(#[$meta])*
                pub $name: $name,
            )*
        }

        impl Peripherals {
            /// Returns all the peripherals *once*.
            #[inline]
            pub fn take() -> Option<Self> {
                critical_section::with(|_| unsafe {
                    if TAKEN {
                        return None;
                    }
                    TAKEN = true;
                    Some(Self::steal())
                })
            }

            /// Unchecked version of [`Peripherals::take`].
            ///
            /// # Safety
            ///
            /// Each of the returned peripherals must be used at most once.
            #[inline]
            pub unsafe fn steal() -> Self {
                Self {
                    $( $name: $name::steal(), )*
                }
            }
        }
    };
}

peripherals! {
    /// I2C1 on the APB1 bus.
    I2C1: 0x4000_5400,
    /// I2C2 on the APB1 bus.
    I2C2: 0x4000_5800,
}
