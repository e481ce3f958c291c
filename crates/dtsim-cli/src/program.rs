//! Program file format: a header of `.key value` directives describing the
//! family to create, followed by one instruction per line.
//!
//! Stands in for the out-of-scope ELF loader and ISA decoder: instructions
//! already name register-file addresses directly (`r<n>` integer, `f<n>`
//! float), the same minimal representation `dtsim_pipeline::Op` defines.

use std::fmt;

use dtsim_allocator::{CreateKind, CreateRequest, PackedCounts, RegCountsByType};
use dtsim_fpu::FpuOp;
use dtsim_pipeline::Op;
use dtsim_regfile::{RegAddr, RegType};
use dtsim_tables::ParentLocation;

#[derive(Debug)]
pub enum ProgramError {
    BadLine { line: usize, text: String },
    BadRegister { line: usize, token: String },
    UnknownDirective { line: usize, name: String },
    UnknownOpcode { line: usize, name: String },
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLine { line, text } => write!(f, "line {line}: malformed instruction `{text}`"),
            Self::BadRegister { line, token } => write!(f, "line {line}: not a register (`{token}`, expected r<n> or f<n>)"),
            Self::UnknownDirective { line, name } => write!(f, "line {line}: unknown directive `.{name}`"),
            Self::UnknownOpcode { line, name } => write!(f, "line {line}: unknown opcode `{name}`"),
        }
    }
}

impl std::error::Error for ProgramError {}

/// A parsed program: the family-creation request for its single root
/// family plus the instruction stream it runs.
pub struct Program {
    pub request: CreateRequest,
    pub ops: Vec<Op>,
}

fn parse_register(line: usize, token: &str) -> Result<RegAddr, ProgramError> {
    let bad = || ProgramError::BadRegister { line, token: token.to_string() };
    let (reg_type, rest) = match token.as_bytes().first() {
        Some(b'r' | b'R') => (RegType::Integer, &token[1..]),
        Some(b'f' | b'F') => (RegType::Float, &token[1..]),
        _ => return Err(bad()),
    };
    let index: u32 = rest.parse().map_err(|_| bad())?;
    Ok(RegAddr::new(reg_type, index))
}

fn parse_fpu_op(line: usize, name: &str) -> Result<FpuOp, ProgramError> {
    match name {
        "fadd" => Ok(FpuOp::Add),
        "fsub" => Ok(FpuOp::Sub),
        "fmul" => Ok(FpuOp::Mul),
        "fdiv" => Ok(FpuOp::Div),
        "fsqrt" => Ok(FpuOp::Sqrt),
        other => Err(ProgramError::UnknownOpcode { line, name: other.to_string() }),
    }
}

/// Parse the program text. Directives (`.name value`) set the root
/// family's creation parameters; everything else is an instruction. Blank
/// lines and `#`-prefixed comments are ignored.
pub fn parse(text: &str) -> Result<Program, ProgramError> {
    let mut regs = RegCountsByType::default();
    regs.integer = PackedCounts { globals: 0, shareds: 0, locals: 1 };
    let mut start = 0u64;
    let mut step = 1u64;
    let mut last_thread = 0u64;
    let mut virt_block_size = 1u32;
    let mut ops = Vec::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let lineno = lineno + 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if let Some(name) = tokens[0].strip_prefix('.') {
            let value = tokens.get(1).copied().unwrap_or("");
            let parsed: u64 = value.parse().unwrap_or(0);
            match name {
                "integer_globals" => regs.integer.globals = parsed as u32,
                "integer_shareds" => regs.integer.shareds = parsed as u32,
                "integer_locals" => regs.integer.locals = parsed as u32,
                "float_globals" => regs.float.globals = parsed as u32,
                "float_shareds" => regs.float.shareds = parsed as u32,
                "float_locals" => regs.float.locals = parsed as u32,
                "start" => start = parsed,
                "step" => step = parsed,
                "last_thread" => last_thread = parsed,
                "virt_block_size" => virt_block_size = parsed as u32,
                other => {
                    return Err(ProgramError::UnknownDirective { line: lineno, name: other.to_string() });
                }
            }
            continue;
        }

        let op = match tokens[0] {
            "seti" => {
                let [dest, value] = tokens.get(1..3).ok_or_else(|| bad_line(lineno, line))?.try_into().map_err(|_| bad_line(lineno, line))?;
                Op::SetImmediate {
                    dest: parse_register(lineno, dest)?,
                    value: value.parse().map_err(|_| bad_line(lineno, line))?,
                }
            }
            "add" => {
                let [dest, a, b] = tokens.get(1..4).ok_or_else(|| bad_line(lineno, line))?.try_into().map_err(|_| bad_line(lineno, line))?;
                Op::Add {
                    dest: parse_register(lineno, dest)?,
                    a: parse_register(lineno, a)?,
                    b: parse_register(lineno, b)?,
                }
            }
            name @ ("fadd" | "fsub" | "fmul" | "fdiv" | "fsqrt") => {
                let [dest, a, b] = tokens.get(1..4).ok_or_else(|| bad_line(lineno, line))?.try_into().map_err(|_| bad_line(lineno, line))?;
                Op::FloatOp {
                    op: parse_fpu_op(lineno, name)?,
                    dest: parse_register(lineno, dest)?,
                    a: parse_register(lineno, a)?,
                    b: parse_register(lineno, b)?,
                }
            }
            "load" => {
                let [dest, addr] = tokens.get(1..3).ok_or_else(|| bad_line(lineno, line))?.try_into().map_err(|_| bad_line(lineno, line))?;
                Op::Load {
                    dest: parse_register(lineno, dest)?,
                    addr: addr.parse().map_err(|_| bad_line(lineno, line))?,
                }
            }
            "store" => {
                let [addr, src] = tokens.get(1..3).ok_or_else(|| bad_line(lineno, line))?.try_into().map_err(|_| bad_line(lineno, line))?;
                Op::Store {
                    addr: addr.parse().map_err(|_| bad_line(lineno, line))?,
                    src: parse_register(lineno, src)?,
                }
            }
            "br" => {
                let [taken, target] = tokens.get(1..3).ok_or_else(|| bad_line(lineno, line))?.try_into().map_err(|_| bad_line(lineno, line))?;
                Op::Branch {
                    taken: taken != "0",
                    target: target.parse().map_err(|_| bad_line(lineno, line))?,
                }
            }
            "exit" => {
                let code_tok = tokens.get(1).copied().ok_or_else(|| bad_line(lineno, line))?;
                let code_reg = parse_register(lineno, code_tok)?;
                let value_reg = match tokens.get(2).copied() {
                    Some(tok) => Some(parse_register(lineno, tok)?),
                    None => None,
                };
                Op::Exit { code_reg, value_reg }
            }
            other => return Err(ProgramError::UnknownOpcode { line: lineno, name: other.to_string() }),
        };
        ops.push(op);
    }

    let request = CreateRequest {
        kind: CreateKind::Local,
        pc: 0,
        program_id: 0,
        start,
        step,
        last_thread,
        virt_block_size,
        regs,
        parent: ParentLocation::NONE,
        exit_code_reg: RegAddr::new(RegType::Integer, 0),
        exit_value_reg: RegAddr::NONE,
        parent_shared_reg: RegAddr::NONE,
    };
    Ok(Program { request, ops })
}

fn bad_line(line: usize, text: &str) -> ProgramError {
    ProgramError::BadLine { line, text: text.to_string() }
}
