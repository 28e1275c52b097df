// src/vm/opcode.rs

// The instruction set. One byte per opcode; PUSH1 and PUSH32 carry 1
// and 32 immediate bytes respectively.

pub const STOP: u8 = 0x00;
pub const PUSH1: u8 = 0x01;
pub const PUSH32: u8 = 0x02;
pub const POP: u8 = 0x03;
pub const DUP: u8 = 0x04;
pub const SWAP: u8 = 0x05;

pub const ADD: u8 = 0x10;
pub const SUB: u8 = 0x11;
pub const MUL: u8 = 0x12;
pub const DIV: u8 = 0x13;
pub const MOD: u8 = 0x14;

pub const LT: u8 = 0x20;
pub const GT: u8 = 0x21;
pub const EQ: u8 = 0x22;
pub const ISZERO: u8 = 0x23;

pub const AND: u8 = 0x30;
pub const OR: u8 = 0x31;
pub const NOT: u8 = 0x32;

pub const JUMP: u8 = 0x40;
pub const JUMPI: u8 = 0x41;
pub const JUMPDEST: u8 = 0x42;

pub const CALLER: u8 = 0x50;
pub const CALLVALUE: u8 = 0x51;
pub const CALLDATALOAD: u8 = 0x52;
pub const CALLDATASIZE: u8 = 0x53;

pub const SLOAD: u8 = 0x60;
pub const SSTORE: u8 = 0x61;

pub const MLOAD: u8 = 0x70;
pub const MSTORE: u8 = 0x71;

pub const RETURN: u8 = 0x80;
pub const REVERT: u8 = 0x81;

pub const LOG: u8 = 0x90;

// Fixed gas cost per opcode, charged before execution. None marks an
// unknown opcode.
pub fn gas_cost(op: u8) -> Option<u64> {
    let cost = match op {
        STOP | RETURN | REVERT => 0,
        PUSH1 | PUSH32 => 3,
        POP => 2,
        DUP | SWAP => 3,
        ADD | SUB => 3,
        MUL | DIV | MOD => 5,
        LT | GT | EQ | ISZERO => 3,
        AND | OR | NOT => 3,
        JUMP => 8,
        JUMPI => 10,
        JUMPDEST => 1,
        CALLER | CALLVALUE | CALLDATASIZE => 2,
        CALLDATALOAD => 3,
        SLOAD => 200,
        SSTORE => 5000,
        MLOAD | MSTORE => 3,
        LOG => 375,
        _ => return None,
    };
    Some(cost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_opcodes_dominate_the_schedule() {
        assert_eq!(gas_cost(SSTORE), Some(5000));
        assert_eq!(gas_cost(SLOAD), Some(200));
        assert_eq!(gas_cost(PUSH1), Some(3));
        assert_eq!(gas_cost(STOP), Some(0));
    }

    #[test]
    fn unknown_opcodes_have_no_cost() {
        assert_eq!(gas_cost(0xff), None);
        assert_eq!(gas_cost(0x15), None);
    }
}
