// Reverse Polish notation equation folding
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

//! Generic stack machine over RPN token streams.
//!
//! Counter equations,
//!   availability expressions,
//!   and their documentation renderings
//!   are all written in the same whitespace-delimited postfix notation:
//!
//! ```text
//!   GPU_TIME 0 READ 1000000000 UMUL $GpuTimestampFrequency UDIV
//! ```
//!
//! Rather than evaluating that notation three times over,
//!   the algorithm is implemented once by [`fold`] and parameterized by an
//!   [`RpnFold`] that decides what a stack value _is_:
//!
//!   - [`code`] folds into structured C statements;
//!   - [`avail`] folds into a boolean guard expression; and
//!   - [`mathml`] folds into a precedence-aware markup tree.
//!
//! Operators are applied eagerly as soon as they are read,
//!   consuming the topmost [`Op::arity`] values of the stack.
//! Operands are passed to the operator in the order in which they were
//!   pushed,
//!     so `b a USUB` computes `b - a`.
//!
//! Grammars
//! ========
//! Each folder selects the operators it recognizes through an [`OpTable`].
//! A token that is an operator of one grammar but not another is simply
//!   an unknown operator in the latter;
//!     `&&` is meaningless in a counter equation,
//!     as is `UDIV` in an availability expression.

pub mod avail;
pub mod code;
pub mod mathml;

use crate::hw::Bank;
use arrayvec::ArrayVec;
use log::trace;
use std::fmt::Display;

pub type EquationResult<T> = Result<T, EquationError>;

/// Operands of an operator in push order.
///
/// `args[0]` is the operand pushed first
///   (the left-hand side of an infix rendering).
pub type Args<V> = ArrayVec<V, 2>;

/// Every operator known to any grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fmax,
    Uadd,
    Usub,
    Umul,
    Udiv,
    Umin,
    Shl,
    Shr,

    /// Bitwise and.
    And,

    /// Accumulator read `(index, bank)`.
    Read,

    /// Read of a register not present in any report.
    ReadReg,

    /// Logical and (`&&`),
    ///   only meaningful in availability expressions.
    LogicalAnd,
    Ult,
    Ugte,
}

impl Op {
    /// Number of operands consumed by the operator.
    pub fn arity(&self) -> usize {
        match self {
            Self::ReadReg => 1,
            _ => 2,
        }
    }

    /// Token as written in equations.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Fadd => "FADD",
            Self::Fsub => "FSUB",
            Self::Fmul => "FMUL",
            Self::Fdiv => "FDIV",
            Self::Fmax => "FMAX",
            Self::Uadd => "UADD",
            Self::Usub => "USUB",
            Self::Umul => "UMUL",
            Self::Udiv => "UDIV",
            Self::Umin => "UMIN",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::And => "AND",
            Self::Read => "READ",
            Self::ReadReg => "READ_REG",
            Self::LogicalAnd => "&&",
            Self::Ult => "ULT",
            Self::Ugte => "UGTE",
        }
    }

    /// Whether the operator computes in the `double` domain.
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            Self::Fadd | Self::Fsub | Self::Fmul | Self::Fdiv | Self::Fmax
        )
    }

    /// Whether an operand of this operator names an accumulator bank.
    pub fn takes_bank(&self) -> bool {
        matches!(self, Self::Read)
    }
}

impl Display for Op {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.write_str(self.token())
    }
}

/// Closed set of operators recognized by a grammar.
#[derive(Debug, PartialEq, Eq)]
pub struct OpTable(&'static [Op]);

impl OpTable {
    /// Look up the operator denoted by `token`.
    ///
    /// Operator tokens are case-sensitive.
    pub fn get(&self, token: &str) -> Option<Op> {
        self.0.iter().copied().find(|op| op.token() == token)
    }
}

/// Operators of counter read and max equations.
pub const EQUATION_OPS: OpTable = OpTable(&[
    Op::Fadd,
    Op::Fsub,
    Op::Fmul,
    Op::Fdiv,
    Op::Fmax,
    Op::Uadd,
    Op::Usub,
    Op::Umul,
    Op::Udiv,
    Op::Umin,
    Op::Shl,
    Op::Shr,
    Op::And,
    Op::Read,
    Op::ReadReg,
]);

/// Operators of availability expressions.
pub const AVAILABILITY_OPS: OpTable =
    OpTable(&[Op::And, Op::Ugte, Op::Ult, Op::LogicalAnd]);

/// Numeric value of a literal token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    U64(u64),
    F64(f64),
}

impl Number {
    /// Value in the unsigned domain,
    ///   truncating floats the way a C conversion would.
    pub fn as_u64(&self) -> u64 {
        match *self {
            Self::U64(n) => n,
            Self::F64(f) => f as u64,
        }
    }

    /// Value in the `double` domain.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::U64(n) => n as f64,
            Self::F64(f) => f,
        }
    }
}

/// A numeric literal as written in an equation.
///
/// The original text is retained so that generated code reproduces the
///   literal exactly
///     (e.g. hexadecimal masks stay hexadecimal).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Literal<'a> {
    pub text: &'a str,
    pub value: Number,
}

impl<'a> Literal<'a> {
    /// Parse a decimal, `0x`-prefixed hexadecimal, or floating-point
    ///   literal.
    ///
    /// Only tokens beginning with a digit or `.` are considered,
    ///   so that names like `inf` are never mistaken for numbers.
    pub fn parse(text: &'a str) -> Option<Self> {
        let first = text.chars().next()?;

        if !(first.is_ascii_digit() || first == '.') {
            return None;
        }

        let value = if let Some(hex) =
            text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
        {
            Number::U64(u64::from_str_radix(hex, 16).ok()?)
        } else if let Ok(n) = text.parse::<u64>() {
            Number::U64(n)
        } else {
            Number::F64(text.parse::<f64>().ok()?)
        };

        Some(Self { text, value })
    }
}

/// A token that is not an operator of the active grammar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand<'a> {
    /// Sigil-prefixed variable (`$EuCoresTotalCount`).
    Var(&'a str),
    Literal(Literal<'a>),
    Bank(Bank),

    /// Bare token that is neither a literal nor a known bank.
    ///
    /// Only an operator taking a bank may consume a word
    ///   (see [`Op::takes_bank`]);
    ///     anywhere else it is reported by [`fold`] as an unknown
    ///     operator.
    Word(&'a str),
}

impl<'a> Operand<'a> {
    /// Classify a non-operator token.
    fn classify(token: &'a str) -> Self {
        if token.starts_with('$') {
            Self::Var(token)
        } else if let Some(lit) = Literal::parse(token) {
            Self::Literal(lit)
        } else if let Some(bank) = Bank::from_token(token) {
            Self::Bank(bank)
        } else {
            Self::Word(token)
        }
    }
}

impl<'a> Display for Operand<'a> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Var(var) => fmt.write_str(var),
            Self::Literal(lit) => fmt.write_str(lit.text),
            Self::Bank(bank) => Display::fmt(bank, fmt),
            Self::Word(word) => fmt.write_str(word),
        }
    }
}

/// Interpretation of an RPN token stream.
///
/// See the [module-level documentation](self) for more information.
pub trait RpnFold {
    /// Type of each stack entry.
    type Value;

    /// Operators recognized by this interpretation.
    fn ops(&self) -> &'static OpTable;

    /// Produce a stack value from an operand token.
    fn operand(&mut self, operand: Operand) -> EquationResult<Self::Value>;

    /// Combine operands into a new stack value.
    ///
    /// `args` contains exactly [`Op::arity`] values in push order.
    fn apply(
        &mut self,
        op: Op,
        args: Args<Self::Value>,
    ) -> EquationResult<Self::Value>;
}

/// Evaluate `equation` using `folder`,
///   yielding the single value remaining on the stack.
///
/// Errors
/// ======
/// - [`EquationError::StackUnderflow`] if an operator fires with fewer
///     operands than its arity.
/// - [`EquationError::MalformedEquation`] if anything other than exactly
///     one value remains at the end of the stream.
/// - [`EquationError::UnknownOperator`] if a bare word is consumed by
///     anything other than a bank slot,
///     or is left on the stack.
/// - Any error produced by `folder`.
pub fn fold<F: RpnFold>(equation: &str, folder: &mut F) -> EquationResult<F::Value> {
    let ops = folder.ops();
    let mut stack: Vec<F::Value> = Vec::new();

    // Parallel to `stack`.
    let mut words: Vec<Option<&str>> = Vec::new();

    for token in equation.split_whitespace() {
        match ops.get(token) {
            Some(op) => {
                let arity = op.arity();

                if stack.len() < arity {
                    return Err(EquationError::StackUnderflow {
                        op: token.to_string(),
                        depth: stack.len(),
                    });
                }

                let at = stack.len() - arity;

                if let Some(word) = words.drain(at..).flatten().next() {
                    if !op.takes_bank() {
                        return Err(EquationError::UnknownOperator(
                            word.to_string(),
                        ));
                    }
                }

                let args: Args<_> = stack.drain(at..).collect();
                let value = folder.apply(op, args)?;

                stack.push(value);
                words.push(None);
            }

            None => {
                let operand = Operand::classify(token);
                let word = match operand {
                    Operand::Word(word) => Some(word),
                    _ => None,
                };

                stack.push(folder.operand(operand)?);
                words.push(word);
            }
        }

        trace!("rpn `{}`: stack depth {}", token, stack.len());
    }

    if let Some(word) = words.into_iter().flatten().next() {
        return Err(EquationError::UnknownOperator(word.to_string()));
    }

    match stack.len() {
        1 => stack.pop().ok_or(EquationError::MalformedEquation { depth: 0 }),
        depth => Err(EquationError::MalformedEquation { depth }),
    }
}

/// Split the operands of a binary operator into `(lhs, rhs)`.
pub(crate) fn binary_args<V>(op: Op, args: Args<V>) -> EquationResult<(V, V)> {
    let depth = args.len();
    let mut args = args.into_iter();

    match (args.next(), args.next()) {
        (Some(lhs), Some(rhs)) => Ok((lhs, rhs)),
        _ => Err(EquationError::StackUnderflow {
            op: op.token().to_string(),
            depth,
        }),
    }
}

/// The sole operand of a unary operator.
pub(crate) fn unary_arg<V>(op: Op, args: Args<V>) -> EquationResult<V> {
    args.into_iter()
        .next()
        .ok_or_else(|| EquationError::StackUnderflow {
            op: op.token().to_string(),
            depth: 0,
        })
}

/// Failure to fold a single equation.
///
/// These errors do not know which equation they belong to;
///   see [`EquationCtx`](crate::error::EquationCtx).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EquationError {
    /// A sigil-prefixed variable is neither a hardware field nor a
    ///   sibling counter.
    UnresolvedVariable(String),

    /// Token is neither an operator of the grammar nor an operand.
    UnknownOperator(String),

    /// `READ` was given no recognizable accumulator bank.
    UnknownBank(String),

    /// Availability expressions may only refer to hardware fields.
    CounterInAvailability(String),

    /// An operand of a kind that the operator cannot accept
    ///   (e.g. a bank used as an arithmetic operand).
    UnexpectedOperand(String),

    /// An operator fired with fewer values on the stack than its arity.
    StackUnderflow { op: String, depth: usize },

    /// The stack did not contain exactly one value at the end of the
    ///   equation.
    MalformedEquation { depth: usize },
}

impl EquationError {
    /// Whether this error describes the shape of the equation rather
    ///   than any particular token.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedEquation { .. } | Self::StackUnderflow { .. }
        )
    }
}

impl Display for EquationError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::UnresolvedVariable(var) => {
                write!(fmt, "failed to resolve variable `{}`", var)
            }
            Self::UnknownOperator(token) => {
                write!(fmt, "unknown operator `{}`", token)
            }
            Self::UnknownBank(token) => {
                write!(fmt, "unknown accumulator bank `{}`", token)
            }
            Self::CounterInAvailability(var) => write!(
                fmt,
                "counter `{}` cannot be referenced by an availability \
                   expression",
                var
            ),
            Self::UnexpectedOperand(token) => {
                write!(fmt, "unexpected operand `{}`", token)
            }
            Self::StackUnderflow { op, depth } => write!(
                fmt,
                "malformed equation: too few operands for `{}` \
                   (stack depth {})",
                op, depth
            ),
            Self::MalformedEquation { depth } => write!(
                fmt,
                "malformed equation: {} values left on the stack, \
                   expected exactly 1",
                depth
            ),
        }
    }
}

impl std::error::Error for EquationError {}
