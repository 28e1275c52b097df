// src/vm/assembler.rs

use crate::error::CompileError;
use crate::vm::opcode;
use crate::vm::U256;

// Compiles the line-based assembly dialect to bytecode. One
// instruction per line, `//` comments, case-insensitive mnemonics.
//
// `STORE`, `LOAD` and `JUMP` take an optional small operand: when
// present it is emitted as a PUSH1 prefix, when absent the bare opcode
// is emitted and the operand is expected on the stack already.
pub fn compile(source: &str) -> Result<Vec<u8>, CompileError> {
    let mut bytecode = Vec::new();
    for (line_index, raw_line) in source.lines().enumerate() {
        let line_number = line_index + 1;
        let line = match raw_line.find("//") {
            Some(position) => &raw_line[..position],
            None => raw_line,
        };
        let mut tokens = line.split_whitespace();
        let mnemonic = match tokens.next() {
            Some(token) => token.to_uppercase(),
            None => continue,
        };
        let operand = tokens.next();

        match mnemonic.as_str() {
            "PUSH" => {
                let operand = operand.ok_or_else(|| {
                    CompileError::BadOperand("missing".to_string(), line_number)
                })?;
                let value = parse_operand(operand, line_number)?;
                if value < U256::from(256) {
                    bytecode.push(opcode::PUSH1);
                    bytecode.push(value.low_u64() as u8);
                } else {
                    bytecode.push(opcode::PUSH32);
                    let mut buf = [0u8; 32];
                    value.to_big_endian(&mut buf);
                    bytecode.extend_from_slice(&buf);
                }
            }
            "STORE" => {
                emit_optional_slot(&mut bytecode, operand, line_number)?;
                bytecode.push(opcode::SSTORE);
            }
            "LOAD" => {
                emit_optional_slot(&mut bytecode, operand, line_number)?;
                bytecode.push(opcode::SLOAD);
            }
            "JUMP" => {
                emit_optional_slot(&mut bytecode, operand, line_number)?;
                bytecode.push(opcode::JUMP);
            }
            "ADD" => bytecode.push(opcode::ADD),
            "SUB" => bytecode.push(opcode::SUB),
            "MUL" => bytecode.push(opcode::MUL),
            "DIV" => bytecode.push(opcode::DIV),
            "MOD" => bytecode.push(opcode::MOD),
            "LT" => bytecode.push(opcode::LT),
            "GT" => bytecode.push(opcode::GT),
            "EQ" => bytecode.push(opcode::EQ),
            "ISZERO" => bytecode.push(opcode::ISZERO),
            "AND" => bytecode.push(opcode::AND),
            "OR" => bytecode.push(opcode::OR),
            "NOT" => bytecode.push(opcode::NOT),
            "POP" => bytecode.push(opcode::POP),
            "DUP" => bytecode.push(opcode::DUP),
            "SWAP" => bytecode.push(opcode::SWAP),
            "CALLER" => bytecode.push(opcode::CALLER),
            "CALLVALUE" => bytecode.push(opcode::CALLVALUE),
            "CALLDATASIZE" => bytecode.push(opcode::CALLDATASIZE),
            "CALLDATALOAD" => bytecode.push(opcode::CALLDATALOAD),
            "JUMPDEST" => bytecode.push(opcode::JUMPDEST),
            "STOP" => bytecode.push(opcode::STOP),
            "RETURN" => bytecode.push(opcode::RETURN),
            "REVERT" => bytecode.push(opcode::REVERT),
            "LOG" => bytecode.push(opcode::LOG),
            other => {
                return Err(CompileError::UnknownInstruction(
                    other.to_string(),
                    line_number,
                ))
            }
        }
    }
    Ok(bytecode)
}

// The PUSH1 prefix for STORE/LOAD/JUMP operands; absent operands emit
// nothing.
fn emit_optional_slot(
    bytecode: &mut Vec<u8>,
    operand: Option<&str>,
    line_number: usize,
) -> Result<(), CompileError> {
    if let Some(operand) = operand {
        let value = parse_operand(operand, line_number)?;
        if value >= U256::from(256) {
            return Err(CompileError::BadOperand(operand.to_string(), line_number));
        }
        bytecode.push(opcode::PUSH1);
        bytecode.push(value.low_u64() as u8);
    }
    Ok(())
}

// Decimal by default, hex with a 0x prefix.
fn parse_operand(token: &str, line_number: usize) -> Result<U256, CompileError> {
    let bad = || CompileError::BadOperand(token.to_string(), line_number);
    if let Some(hex_digits) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        let padded = if hex_digits.len() % 2 == 1 {
            format!("0{}", hex_digits)
        } else {
            hex_digits.to_string()
        };
        let bytes = hex::decode(&padded).map_err(|_| bad())?;
        if bytes.len() > 32 {
            return Err(bad());
        }
        Ok(U256::from_big_endian(&bytes))
    } else {
        U256::from_dec_str(token).map_err(|_| bad())
    }
}
