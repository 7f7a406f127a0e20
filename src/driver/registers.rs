/// Declares a register map as a `u8` enum with its addresses and printable names.
macro_rules! registers {
    (
        $(#[$meta:meta])*
        $enum_name:ident {
            $($name:ident = $val:expr),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(u8)]
        #[allow(dead_code)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        pub enum $enum_name {
            $($name = $val),*
        }

        impl $enum_name {
            pub const fn addr(self) -> u8 {
                self as u8
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $($enum_name::$name => stringify!($name),)*
                }
            }
        }

        impl From<$enum_name> for u8 {
            fn from(r: $enum_name) -> u8 {
                r as u8
            }
        }
    };
}

pub(crate) use registers;
