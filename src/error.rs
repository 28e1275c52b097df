// src/error.rs

use thiserror::Error;

// Validation failures raised by the ledger. These are returned to the
// caller and never mutate chain state.
#[derive(Debug, Error, PartialEq)]
pub enum ChainError {
    #[error("transaction has no receiver")]
    MissingReceiver,
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("insufficient balance: have {balance}, need {amount}")]
    InsufficientBalance { balance: i64, amount: u64 },
    #[error("block hash does not match its contents")]
    BlockHashMismatch,
    #[error("block does not link to the current tip")]
    BlockLinkMismatch,
    #[error("block hash does not meet the difficulty target")]
    BlockDifficultyUnmet,
    #[error("candidate chain failed validation: {0}")]
    ChainInvalid(String),
    #[error("mining reward transactions cannot be signed")]
    CannotSignReward,
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error, PartialEq)]
pub enum StorageError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("database is locked by another process")]
    Locked,
    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("database error: {0}")]
    Backend(String),
}

// Traps raised by the bytecode interpreter. A trap marks the execution
// as reverted; storage changes are discarded by the caller.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    #[error("out of gas")]
    OutOfGas,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("jump to invalid destination")]
    InvalidJump,
    #[error("invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),
}

// What a contract-manager operation can run into: a missing contract,
// a source that does not compile, or a store failure. VM failures are
// not errors at this level; they come back in the outcome with the gas
// spent.
#[derive(Debug, Error, PartialEq)]
pub enum ContractError {
    #[error("no contract at address {0}")]
    ContractNotFound(String),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("unknown instruction `{0}` on line {1}")]
    UnknownInstruction(String, usize),
    #[error("bad operand `{0}` on line {1}")]
    BadOperand(String, usize),
}

// Gossip-layer failures. These never escape the p2p module: the
// connection is dropped and the reconnection timer retries later.
#[derive(Debug, Error)]
pub enum P2pError {
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("refusing to connect to ourselves")]
    SelfConnection,
}
