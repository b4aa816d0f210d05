//! The opcodes the tracers dispatch on.
//!
//! Hosts report the raw opcode byte; anything not listed here is stepped over.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(pub u8);

impl Opcode {
    pub const STOP: Opcode = Opcode(0x00);
    pub const BALANCE: Opcode = Opcode(0x31);
    pub const EXTCODESIZE: Opcode = Opcode(0x3B);
    pub const EXTCODECOPY: Opcode = Opcode(0x3C);
    pub const EXTCODEHASH: Opcode = Opcode(0x3F);
    pub const POP: Opcode = Opcode(0x50);
    pub const SLOAD: Opcode = Opcode(0x54);
    pub const SSTORE: Opcode = Opcode(0x55);
    pub const PUSH1: Opcode = Opcode(0x60);
    pub const CREATE: Opcode = Opcode(0xF0);
    pub const CALL: Opcode = Opcode(0xF1);
    pub const CALLCODE: Opcode = Opcode(0xF2);
    pub const RETURN: Opcode = Opcode(0xF3);
    pub const DELEGATECALL: Opcode = Opcode(0xF4);
    pub const CREATE2: Opcode = Opcode(0xF5);
    pub const STATICCALL: Opcode = Opcode(0xFA);
    pub const REVERT: Opcode = Opcode(0xFD);
    pub const INVALID: Opcode = Opcode(0xFE);
    pub const SELFDESTRUCT: Opcode = Opcode(0xFF);

    pub fn is_create(self) -> bool {
        self == Self::CREATE || self == Self::CREATE2
    }

    pub fn is_call(self) -> bool {
        matches!(
            self,
            Self::CALL | Self::CALLCODE | Self::DELEGATECALL | Self::STATICCALL
        )
    }

    /// Reads an external account's balance or code.
    pub fn reads_external_account(self) -> bool {
        matches!(
            self,
            Self::BALANCE | Self::EXTCODESIZE | Self::EXTCODECOPY | Self::EXTCODEHASH
        )
    }

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::STOP => "STOP",
            Self::BALANCE => "BALANCE",
            Self::EXTCODESIZE => "EXTCODESIZE",
            Self::EXTCODECOPY => "EXTCODECOPY",
            Self::EXTCODEHASH => "EXTCODEHASH",
            Self::POP => "POP",
            Self::SLOAD => "SLOAD",
            Self::SSTORE => "SSTORE",
            Self::PUSH1 => "PUSH1",
            Self::CREATE => "CREATE",
            Self::CALL => "CALL",
            Self::CALLCODE => "CALLCODE",
            Self::RETURN => "RETURN",
            Self::DELEGATECALL => "DELEGATECALL",
            Self::CREATE2 => "CREATE2",
            Self::STATICCALL => "STATICCALL",
            Self::REVERT => "REVERT",
            Self::INVALID => "INVALID",
            Self::SELFDESTRUCT => "SELFDESTRUCT",
            _ => return None,
        };
        Some(name)
    }
}

impl From<u8> for Opcode {
    fn from(byte: u8) -> Self {
        Opcode(byte)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:02x}", self.0),
        }
    }
}
