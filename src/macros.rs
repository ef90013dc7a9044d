#![macro_use]

/// Declares a 16-bit register value type with single-bit and multi-bit field accessors.
///
/// Single bits go in the `bits` block (`getter / setter = position;`), multi-bit
/// fields in the `fields` block (`getter / setter: type = position, width;`).
macro_rules! regval {
    (
        $(#[$meta:meta])*
        pub struct $name:ident = $reg:ident;
        bits {
            $(
                $(#[$bmeta:meta])*
                $bget:ident / $bset:ident = $bpos:literal;
            )*
        }
        fields {
            $(
                $(#[$fmeta:meta])*
                $fget:ident / $fset:ident: $fty:ty = $fpos:literal, $fwidth:literal;
            )*
        }
    ) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name(pub u16);

        #[allow(dead_code)]
        impl $name {
            $(
                $(#[$bmeta])*
                #[inline(always)]
                pub const fn $bget(&self) -> bool {
                    (self.0 >> $bpos) & 1 != 0
                }

                #[inline(always)]
                pub fn $bset(&mut self, val: bool) {
                    self.0 = (self.0 & !(1 << $bpos)) | ((val as u16) << $bpos);
                }
            )*
            $(
                $(#[$fmeta])*
                #[inline(always)]
                pub const fn $fget(&self) -> $fty {
                    ((self.0 >> $fpos) & (((1u32 << $fwidth) - 1) as u16)) as $fty
                }

                #[inline(always)]
                pub fn $fset(&mut self, val: $fty) {
                    let mask = ((1u32 << $fwidth) - 1) as u16;
                    self.0 = (self.0 & !(mask << $fpos)) | (((val as u16) & mask) << $fpos);
                }
            )*
        }

        impl $crate::regs::RegValue for $name {
            const REGISTER: $crate::regs::Register = $crate::regs::Register::$reg;

            #[inline(always)]
            fn from_bits(bits: u16) -> Self {
                Self(bits)
            }

            #[inline(always)]
            fn to_bits(self) -> u16 {
                self.0
            }
        }
    };
}
