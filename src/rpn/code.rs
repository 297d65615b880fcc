// Structured C statement emission for counter equations
//
//  Copyright (C) 2015-2022 The oagen Authors
//
//  This file is part of oagen.
//
//  This program is free software: you can redistribute it and/or modify
//  it under the terms of the GNU General Public License as published by
//  the Free Software Foundation, either version 3 of the License, or
//  (at your option) any later version.
//
//  This program is distributed in the hope that it will be useful,
//  but WITHOUT ANY WARRANTY; without even the implied warranty of
//  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//  GNU General Public License for more details.
//
//  You should have received a copy of the GNU General Public License
//  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Compile counter equations into straight-line statements.
//!
//! Each operator binds its result to a fresh temporary,
//!   numbered from zero for every equation:
//!
//! ```text
//!   10 3 USUB 2 UDIV
//!
//!   uint64_t tmp0 = 10 - 3;
//!   uint64_t tmp1 = tmp0;
//!   uint64_t tmp2 = 2;
//!   uint64_t tmp3 = tmp2 ? tmp1 / tmp2 : 0;
//!   return tmp3;
//! ```
//!
//! Division evaluates both operands into temporaries before testing the
//!   divisor,
//!     so that division by zero yields `0` rather than trapping.
//!
//! The result is a [`Body`] that can be both rendered
//!   (see [`Stmt`]'s [`Display`])
//!   and evaluated directly ([`Body::eval`]).

use super::{
    binary_args, fold, unary_arg, Args, EquationError, EquationResult,
    Number, Op, OpTable, Operand, RpnFold, EQUATION_OPS,
};
use crate::hw::{Bank, HwField};
use crate::symtab::{Resolved, SymbolTable};
use std::fmt::Display;

/// Identifier of a temporary,
///   unique within a single [`Body`].
pub type TmpId = u32;

/// A value that may appear within a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Tmp(TmpId),

    /// Literal text and its numeric value.
    Literal(String, Number),
    Hw(&'static HwField),

    /// Call to the read function of a sibling counter,
    ///   given its symbol and the index of the counter within its set.
    Call(String, usize),
}

impl Display for Value {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Tmp(id) => write!(fmt, "tmp{}", id),
            Self::Literal(text, _) => fmt.write_str(text),
            Self::Hw(field) => fmt.write_str(field.expr),
            Self::Call(sym, _) => {
                write!(fmt, "{}(devinfo, metric_set, accumulator)", sym)
            }
        }
    }
}

/// C type of a temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CType {
    Uint64,
    Double,
}

impl Display for CType {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Uint64 => write!(fmt, "uint64_t"),
            Self::Double => write!(fmt, "double"),
        }
    }
}

/// Infix binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Shl,
    Shr,
    And,
}

impl Display for BinOp {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.write_str(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::And => "&",
        })
    }
}

/// Right-hand side of a temporary binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Rvalue {
    Value(Value),
    Binary(BinOp, Value, Value),

    /// `den ? num / den : 0`
    GuardedDiv { num: Value, den: Value },
    Max(Value, Value),
    Min(Value, Value),

    /// `accumulator[metric_set-><bank>_offset + index]`
    Read { bank: Bank, index: Value },

    /// Register reads are not available to the runtime and always yield
    ///   `0`.
    ReadReg(Value),
}

impl Display for Rvalue {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Value(value) => Display::fmt(value, fmt),
            Self::Binary(op, lhs, rhs) => write!(fmt, "{} {} {}", lhs, op, rhs),
            Self::GuardedDiv { num, den } => {
                write!(fmt, "{} ? {} / {} : 0", den, num, den)
            }
            Self::Max(a, b) => write!(fmt, "MAX({}, {})", a, b),
            Self::Min(a, b) => write!(fmt, "MIN({}, {})", a, b),
            Self::Read { bank, index } => write!(
                fmt,
                "accumulator[metric_set->{} + {}]",
                bank.offset_field(),
                index
            ),
            Self::ReadReg(reg) => write!(fmt, "0 /* READ_REG {} */", reg),
        }
    }
}

/// Binding of a temporary.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub ty: CType,
    pub tmp: TmpId,
    pub value: Rvalue,
}

impl Display for Stmt {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{} tmp{} = {};", self.ty, self.tmp, self.value)
    }
}

/// Compiled equation.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Source equation,
    ///   retained for documentation.
    pub equation: String,
    pub stmts: Vec<Stmt>,
    pub result: Value,
}

/// Runtime state consulted by [`Body::eval`].
pub trait EvalEnv {
    /// Value of a device-capability field.
    fn hw(&self, field: &HwField) -> u64;

    /// Accumulator entry `index` of `bank`.
    fn accumulator(&self, bank: Bank, index: u64) -> u64;

    /// Result of the read function of sibling counter `counter`.
    fn call(&self, counter: usize) -> Number;
}

impl Body {
    /// Evaluate the statements with the semantics of the generated C.
    ///
    /// Unsigned arithmetic wraps and division by zero yields zero.
    /// An unsigned operation with a `double` operand is computed as a
    ///   `double` and truncated only when bound,
    ///     as C's usual arithmetic conversions do.
    ///
    /// A shift by the width of the type or more is undefined in C;
    ///   this interpreter yields zero for it.
    pub fn eval<E: EvalEnv>(&self, env: &E) -> Number {
        let mut tmps: Vec<Number> = Vec::with_capacity(self.stmts.len());

        for stmt in &self.stmts {
            let n = match stmt.ty {
                CType::Uint64 => Number::U64(eval_u64(&stmt.value, env, &tmps)),
                CType::Double => Number::F64(eval_f64(&stmt.value, env, &tmps)),
            };

            tmps.push(n);
        }

        load(&self.result, env, &tmps)
    }
}

fn load<E: EvalEnv>(value: &Value, env: &E, tmps: &[Number]) -> Number {
    match value {
        Value::Tmp(id) => tmps[*id as usize],
        Value::Literal(_, n) => *n,
        Value::Hw(field) => Number::U64(env.hw(field)),
        Value::Call(_, counter) => env.call(*counter),
    }
}

/// Both operands as `double`,
///   unless both are unsigned.
fn promote(l: Number, r: Number) -> Option<(f64, f64)> {
    match (l, r) {
        (Number::U64(_), Number::U64(_)) => None,
        _ => Some((l.as_f64(), r.as_f64())),
    }
}

fn eval_u64<E: EvalEnv>(rvalue: &Rvalue, env: &E, tmps: &[Number]) -> u64 {
    let num = |value: &Value| load(value, env, tmps);
    let get = |value: &Value| num(value).as_u64();

    match rvalue {
        Rvalue::Value(value) => get(value),
        Rvalue::Binary(op, lhs, rhs) => {
            let (l, r) = (num(lhs), num(rhs));

            match (op, promote(l, r)) {
                (BinOp::Add, Some((l, r))) => return (l + r) as u64,
                (BinOp::Sub, Some((l, r))) => return (l - r) as u64,
                (BinOp::Mul, Some((l, r))) => return (l * r) as u64,
                _ => {}
            }

            let (l, r) = (l.as_u64(), r.as_u64());

            match op {
                BinOp::Add => l.wrapping_add(r),
                BinOp::Sub => l.wrapping_sub(r),
                BinOp::Mul => l.wrapping_mul(r),
                BinOp::Shl => u32::try_from(r)
                    .ok()
                    .and_then(|r| l.checked_shl(r))
                    .unwrap_or(0),
                BinOp::Shr => u32::try_from(r)
                    .ok()
                    .and_then(|r| l.checked_shr(r))
                    .unwrap_or(0),
                BinOp::And => l & r,
            }
        }
        Rvalue::GuardedDiv { num, den } => match get(den) {
            0 => 0,
            d => get(num) / d,
        },
        Rvalue::Max(a, b) | Rvalue::Min(a, b) => {
            let is_max = matches!(rvalue, Rvalue::Max(..));
            let (a, b) = (num(a), num(b));

            match promote(a, b) {
                Some((a, b)) if is_max => a.max(b) as u64,
                Some((a, b)) => a.min(b) as u64,
                None if is_max => a.as_u64().max(b.as_u64()),
                None => a.as_u64().min(b.as_u64()),
            }
        }
        Rvalue::Read { bank, index } => env.accumulator(*bank, get(index)),
        Rvalue::ReadReg(_) => 0,
    }
}

fn eval_f64<E: EvalEnv>(rvalue: &Rvalue, env: &E, tmps: &[Number]) -> f64 {
    let get = |value: &Value| load(value, env, tmps).as_f64();

    match rvalue {
        Rvalue::Binary(BinOp::Add, lhs, rhs) => get(lhs) + get(rhs),
        Rvalue::Binary(BinOp::Sub, lhs, rhs) => get(lhs) - get(rhs),
        Rvalue::Binary(BinOp::Mul, lhs, rhs) => get(lhs) * get(rhs),
        Rvalue::GuardedDiv { num, den } => {
            let d = get(den);

            if d == 0.0 {
                0.0
            } else {
                get(num) / d
            }
        }
        Rvalue::Max(a, b) => {
            let (a, b) = (get(a), get(b));

            if a > b {
                a
            } else {
                b
            }
        }
        Rvalue::Min(a, b) => get(a).min(get(b)),
        Rvalue::Value(value) => get(value),

        // Integer-only forms are never bound to doubles by the emitter.
        other => eval_u64(other, env, tmps) as f64,
    }
}

/// Stack entry during emission.
#[derive(Debug)]
enum Slot {
    Value(Value),
    Bank(Bank),

    /// Unrecognized word in a bank slot.
    Word(String),
}

/// [`RpnFold`] producing a [`Body`].
struct CodeEmitter<'t, 's> {
    symtab: &'t SymbolTable<'s>,
    stmts: Vec<Stmt>,
    next_tmp: TmpId,
}

impl<'t, 's> CodeEmitter<'t, 's> {
    fn bind(&mut self, ty: CType, value: Rvalue) -> Value {
        let tmp = self.next_tmp;
        self.next_tmp += 1;

        self.stmts.push(Stmt { ty, tmp, value });
        Value::Tmp(tmp)
    }

    /// Bind both operands before computing from them.
    ///
    /// This is needed when the computation may refer to an operand more
    ///   than once.
    fn bind_pair(&mut self, ty: CType, lhs: Value, rhs: Value) -> (Value, Value) {
        let a = self.bind(ty, Rvalue::Value(lhs));
        let b = self.bind(ty, Rvalue::Value(rhs));

        (a, b)
    }

    fn read(&mut self, args: Args<Slot>) -> EquationResult<Slot> {
        let (lhs, rhs) = binary_args(Op::Read, args)?;

        let (index, bank) = match (lhs, rhs) {
            (Slot::Value(index), Slot::Bank(bank))
            | (Slot::Bank(bank), Slot::Value(index)) => (index, bank),

            (Slot::Bank(_), Slot::Bank(bank)) => {
                return Err(EquationError::UnexpectedOperand(
                    bank.token().to_string(),
                ))
            }

            (Slot::Value(_), Slot::Value(other)) => {
                return Err(EquationError::UnknownBank(other.to_string()))
            }

            (_, Slot::Word(word)) | (Slot::Word(word), _) => {
                return Err(EquationError::UnknownBank(word))
            }
        };

        Ok(Slot::Value(
            self.bind(CType::Uint64, Rvalue::Read { bank, index }),
        ))
    }
}

impl Slot {
    fn into_value(self) -> EquationResult<Value> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Bank(bank) => {
                Err(EquationError::UnexpectedOperand(bank.token().to_string()))
            }
            Self::Word(word) => Err(EquationError::UnknownOperator(word)),
        }
    }
}

impl<'t, 's> RpnFold for CodeEmitter<'t, 's> {
    type Value = Slot;

    fn ops(&self) -> &'static OpTable {
        &EQUATION_OPS
    }

    fn operand(&mut self, operand: Operand) -> EquationResult<Slot> {
        match operand {
            Operand::Var(var) => match self.symtab.resolve(var) {
                Some(Resolved::Hw(field)) => Ok(Slot::Value(Value::Hw(field))),
                Some(Resolved::Counter(i, _)) => {
                    Ok(Slot::Value(Value::Call(self.symtab.read_fn(i), i)))
                }
                None => Err(EquationError::UnresolvedVariable(var.to_string())),
            },

            Operand::Literal(lit) => Ok(Slot::Value(Value::Literal(
                lit.text.to_string(),
                lit.value,
            ))),

            Operand::Bank(bank) => Ok(Slot::Bank(bank)),
            Operand::Word(word) => Ok(Slot::Word(word.to_string())),
        }
    }

    fn apply(&mut self, op: Op, args: Args<Slot>) -> EquationResult<Slot> {
        use CType::{Double, Uint64};

        if op == Op::Read {
            return self.read(args);
        }

        if op == Op::ReadReg {
            let reg = unary_arg(op, args)?.into_value()?;
            return Ok(Slot::Value(self.bind(Uint64, Rvalue::ReadReg(reg))));
        }

        let (lhs, rhs) = binary_args(op, args)?;
        let (lhs, rhs) = (lhs.into_value()?, rhs.into_value()?);
        let ty = if op.is_float() { Double } else { Uint64 };

        let value = match op {
            Op::Fadd | Op::Uadd => Rvalue::Binary(BinOp::Add, lhs, rhs),
            Op::Fsub | Op::Usub => Rvalue::Binary(BinOp::Sub, lhs, rhs),
            Op::Fmul | Op::Umul => Rvalue::Binary(BinOp::Mul, lhs, rhs),
            Op::Shl => Rvalue::Binary(BinOp::Shl, lhs, rhs),
            Op::Shr => Rvalue::Binary(BinOp::Shr, lhs, rhs),
            Op::And => Rvalue::Binary(BinOp::And, lhs, rhs),
            Op::Umin => Rvalue::Min(lhs, rhs),

            Op::Fdiv | Op::Udiv => {
                let (num, den) = self.bind_pair(ty, lhs, rhs);
                Rvalue::GuardedDiv { num, den }
            }

            Op::Fmax => {
                let (a, b) = self.bind_pair(ty, lhs, rhs);
                Rvalue::Max(a, b)
            }

            Op::Read | Op::ReadReg | Op::LogicalAnd | Op::Ult | Op::Ugte => {
                return Err(EquationError::UnknownOperator(
                    op.token().to_string(),
                ))
            }
        };

        Ok(Slot::Value(self.bind(ty, value)))
    }
}

/// Compile `equation` against `symtab`.
///
/// Temporaries are numbered from zero;
///   nothing is shared between calls.
pub fn emit_equation(
    equation: &str,
    symtab: &SymbolTable,
) -> EquationResult<Body> {
    let mut emitter = CodeEmitter {
        symtab,
        stmts: Vec::new(),
        next_tmp: 0,
    };

    let result = fold(equation, &mut emitter)?.into_value()?;

    Ok(Body {
        equation: equation.to_string(),
        stmts: emitter.stmts,
        result,
    })
}
