// src/vm/mod.rs

use uint::construct_uint;

construct_uint! {
    // 256-bit machine word. All VM arithmetic wraps modulo 2^256.
    pub struct U256(4);
}

pub mod assembler;
pub mod interpreter;
pub mod opcode;

pub use interpreter::{
    execute, execute_with_limit, ExecutionContext, ExecutionResult, DEFAULT_GAS_LIMIT,
};
