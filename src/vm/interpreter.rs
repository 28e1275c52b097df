// src/vm/interpreter.rs

use crate::error::VmError;
use crate::vm::opcode::{self, gas_cost};
use crate::vm::U256;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_GAS_LIMIT: u64 = 1_000_000;

// Who is calling, with how much value and what input data. The
// constructor run at deploy time uses an empty context apart from the
// deployer as caller.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub caller: String,
    pub call_value: u64,
    pub calldata: Vec<u8>,
}

// The complete outcome of one execution. On success the caller takes
// `storage` as the contract's new state; on failure it must be
// discarded. `error` is None for a clean REVERT.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub gas_used: u64,
    pub return_data: Vec<u8>,
    pub storage: HashMap<U256, U256>,
    pub logs: Vec<U256>,
    pub stack: Vec<U256>,
    pub error: Option<VmError>,
}

enum Halt {
    Stop,
    Return,
    Revert,
    FellOff,
}

struct Machine<'a> {
    code: &'a [u8],
    ctx: &'a ExecutionContext,
    jumpdests: HashSet<usize>,
    stack: Vec<U256>,
    memory: HashMap<U256, U256>,
    storage: HashMap<U256, U256>,
    logs: Vec<U256>,
    return_data: Vec<u8>,
    gas_used: u64,
    gas_limit: u64,
    pc: usize,
}

// Positions a JUMP may land on: actual JUMPDEST opcodes, skipping
// bytes that are PUSH immediates.
fn valid_jumpdests(code: &[u8]) -> HashSet<usize> {
    let mut dests = HashSet::new();
    let mut pc = 0;
    while pc < code.len() {
        match code[pc] {
            opcode::PUSH1 => pc += 2,
            opcode::PUSH32 => pc += 33,
            opcode::JUMPDEST => {
                dests.insert(pc);
                pc += 1;
            }
            _ => pc += 1,
        }
    }
    dests
}

// The lossy caller word: the first 16 hex chars of the caller string
// parsed as a 64-bit number, zero when unparseable. Pinned behavior.
fn caller_word(caller: &str) -> U256 {
    let prefix: String = caller.chars().take(16).collect();
    U256::from(u64::from_str_radix(&prefix, 16).unwrap_or(0))
}

impl<'a> Machine<'a> {
    fn pop(&mut self) -> Result<U256, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    // Reads the immediate bytes after `pc`, zero-padded when the code
    // ends early, and advances past them.
    fn push_immediate(&mut self, width: usize) {
        let start = self.pc + 1;
        let end = (start + width).min(self.code.len());
        let mut buf = [0u8; 32];
        let slice = if start < self.code.len() {
            &self.code[start..end]
        } else {
            &[]
        };
        buf[32 - width..32 - width + slice.len()].copy_from_slice(slice);
        self.stack.push(U256::from_big_endian(&buf[32 - width..]));
        self.pc = start + width;
    }

    fn jump_to(&mut self, dest: U256) -> Result<(), VmError> {
        if dest > U256::from(u32::MAX) {
            return Err(VmError::InvalidJump);
        }
        let dest = dest.low_u64() as usize;
        if !self.jumpdests.contains(&dest) {
            return Err(VmError::InvalidJump);
        }
        self.pc = dest;
        Ok(())
    }

    // 32-byte calldata window at `offset`, zero-padded past the end.
    fn calldata_word(&self, offset: U256) -> U256 {
        let mut buf = [0u8; 32];
        if offset <= U256::from(u32::MAX) {
            let offset = offset.low_u64() as usize;
            for (i, slot) in buf.iter_mut().enumerate() {
                if let Some(byte) = self.ctx.calldata.get(offset + i) {
                    *slot = *byte;
                }
            }
        }
        U256::from_big_endian(&buf)
    }

    fn run(&mut self) -> Result<Halt, VmError> {
        loop {
            if self.pc >= self.code.len() {
                return Ok(Halt::FellOff);
            }
            let op = self.code[self.pc];
            let cost = gas_cost(op).ok_or(VmError::InvalidOpcode(op))?;
            if self.gas_used + cost > self.gas_limit {
                return Err(VmError::OutOfGas);
            }
            self.gas_used += cost;

            match op {
                opcode::STOP => return Ok(Halt::Stop),
                opcode::PUSH1 => {
                    self.push_immediate(1);
                    continue;
                }
                opcode::PUSH32 => {
                    self.push_immediate(32);
                    continue;
                }
                opcode::POP => {
                    self.pop()?;
                }
                opcode::DUP => {
                    let top = *self.stack.last().ok_or(VmError::StackUnderflow)?;
                    self.stack.push(top);
                }
                opcode::SWAP => {
                    let len = self.stack.len();
                    if len < 2 {
                        return Err(VmError::StackUnderflow);
                    }
                    self.stack.swap(len - 1, len - 2);
                }
                opcode::ADD => {
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.stack.push(a.overflowing_add(b).0);
                }
                opcode::SUB => {
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.stack.push(a.overflowing_sub(b).0);
                }
                opcode::MUL => {
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.stack.push(a.overflowing_mul(b).0);
                }
                opcode::DIV => {
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.stack
                        .push(if b.is_zero() { U256::zero() } else { a / b });
                }
                opcode::MOD => {
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.stack
                        .push(if b.is_zero() { U256::zero() } else { a % b });
                }
                opcode::LT => {
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.stack.push(U256::from((a < b) as u64));
                }
                opcode::GT => {
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.stack.push(U256::from((a > b) as u64));
                }
                opcode::EQ => {
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.stack.push(U256::from((a == b) as u64));
                }
                opcode::ISZERO => {
                    let a = self.pop()?;
                    self.stack.push(U256::from(a.is_zero() as u64));
                }
                opcode::AND => {
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.stack.push(a & b);
                }
                opcode::OR => {
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.stack.push(a | b);
                }
                opcode::NOT => {
                    let a = self.pop()?;
                    self.stack.push(!a);
                }
                opcode::JUMP => {
                    let dest = self.pop()?;
                    self.jump_to(dest)?;
                    continue;
                }
                opcode::JUMPI => {
                    let dest = self.pop()?;
                    let condition = self.pop()?;
                    if !condition.is_zero() {
                        self.jump_to(dest)?;
                        continue;
                    }
                }
                opcode::JUMPDEST => {}
                opcode::CALLER => {
                    self.stack.push(caller_word(&self.ctx.caller));
                }
                opcode::CALLVALUE => {
                    self.stack.push(U256::from(self.ctx.call_value));
                }
                opcode::CALLDATALOAD => {
                    let offset = self.pop()?;
                    let word = self.calldata_word(offset);
                    self.stack.push(word);
                }
                opcode::CALLDATASIZE => {
                    self.stack.push(U256::from(self.ctx.calldata.len() as u64));
                }
                opcode::SLOAD => {
                    let key = self.pop()?;
                    let value = self.storage.get(&key).copied().unwrap_or_default();
                    self.stack.push(value);
                }
                opcode::SSTORE => {
                    let key = self.pop()?;
                    let value = self.pop()?;
                    self.storage.insert(key, value);
                }
                opcode::MLOAD => {
                    let key = self.pop()?;
                    let value = self.memory.get(&key).copied().unwrap_or_default();
                    self.stack.push(value);
                }
                opcode::MSTORE => {
                    let key = self.pop()?;
                    let value = self.pop()?;
                    self.memory.insert(key, value);
                }
                opcode::RETURN | opcode::REVERT => {
                    if let Some(value) = self.stack.pop() {
                        let mut buf = [0u8; 32];
                        value.to_big_endian(&mut buf);
                        self.return_data = buf.to_vec();
                    }
                    return Ok(if op == opcode::RETURN {
                        Halt::Return
                    } else {
                        Halt::Revert
                    });
                }
                opcode::LOG => {
                    let value = self.pop()?;
                    self.logs.push(value);
                }
                _ => unreachable!("cost lookup rejects unknown opcodes"),
            }
            self.pc += 1;
        }
    }
}

// Runs bytecode against a snapshot of the contract's storage under the
// default gas limit.
pub fn execute(
    bytecode: &[u8],
    ctx: &ExecutionContext,
    storage: HashMap<U256, U256>,
) -> ExecutionResult {
    execute_with_limit(bytecode, ctx, storage, DEFAULT_GAS_LIMIT)
}

pub fn execute_with_limit(
    bytecode: &[u8],
    ctx: &ExecutionContext,
    storage: HashMap<U256, U256>,
    gas_limit: u64,
) -> ExecutionResult {
    let mut machine = Machine {
        code: bytecode,
        ctx,
        jumpdests: valid_jumpdests(bytecode),
        stack: Vec::new(),
        memory: HashMap::new(),
        storage,
        logs: Vec::new(),
        return_data: Vec::new(),
        gas_used: 0,
        gas_limit,
        pc: 0,
    };
    let (success, error) = match machine.run() {
        Ok(Halt::Stop) | Ok(Halt::Return) | Ok(Halt::FellOff) => (true, None),
        Ok(Halt::Revert) => (false, None),
        Err(trap) => (false, Some(trap)),
    };
    ExecutionResult {
        success,
        gas_used: machine.gas_used,
        return_data: machine.return_data,
        storage: machine.storage,
        logs: machine.logs,
        stack: machine.stack,
        error,
    }
}
