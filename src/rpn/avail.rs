// Availability expression splicing
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

//! Boolean guards deciding whether a counter or register block applies
//!   to the device at hand.
//!
//! Availability expressions use [`AVAILABILITY_OPS`] and may refer only to
//!   hardware fields;
//!     they are evaluated when the metric set is registered,
//!     before any counter could be read.
//!
//! The resulting [`Guard`] is the list of clauses of the top-level `&&`
//!   chain,
//!     allowing each to be rendered on its own line.
//! Conjunctions nested beneath any other operator are left intact.

use super::{
    binary_args, fold, Args, EquationError, EquationResult, Op, OpTable,
    Operand, RpnFold, AVAILABILITY_OPS,
};
use crate::symtab::{Resolved, SymbolTable};
use std::fmt::Display;

/// Boolean expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoolExpr {
    Atom(String),
    Binary(Op, Box<BoolExpr>, Box<BoolExpr>),
}

impl BoolExpr {
    fn symbol(op: Op) -> &'static str {
        match op {
            Op::LogicalAnd => "&&",
            Op::Ult => "<",
            Op::Ugte => ">=",
            _ => "&",
        }
    }

    /// Render as an operand of a larger expression.
    fn bracketed(&self) -> String {
        match self {
            Self::Atom(atom) => atom.clone(),
            Self::Binary(..) => format!("({})", self),
        }
    }

    fn flatten_into(self, clauses: &mut Vec<String>) {
        match self {
            Self::Binary(Op::LogicalAnd, lhs, rhs) => {
                lhs.flatten_into(clauses);
                rhs.flatten_into(clauses);
            }
            other => clauses.push(other.bracketed()),
        }
    }
}

impl Display for BoolExpr {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Atom(atom) => fmt.write_str(atom),
            Self::Binary(op, lhs, rhs) => write!(
                fmt,
                "{} {} {}",
                lhs.bracketed(),
                Self::symbol(*op),
                rhs.bracketed()
            ),
        }
    }
}

/// Conjunction of one or more C boolean clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub clauses: Vec<String>,
}

impl From<BoolExpr> for Guard {
    fn from(expr: BoolExpr) -> Self {
        let clauses = match expr {
            BoolExpr::Binary(Op::LogicalAnd, ..) => {
                let mut clauses = Vec::new();
                expr.flatten_into(&mut clauses);
                clauses
            }
            other => vec![other.to_string()],
        };

        Self { clauses }
    }
}

impl Display for Guard {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.write_str(&self.clauses.join(" && "))
    }
}

struct Splicer<'t, 's> {
    symtab: &'t SymbolTable<'s>,
}

impl<'t, 's> RpnFold for Splicer<'t, 's> {
    type Value = BoolExpr;

    fn ops(&self) -> &'static OpTable {
        &AVAILABILITY_OPS
    }

    fn operand(&mut self, operand: Operand) -> EquationResult<BoolExpr> {
        match operand {
            Operand::Var(var) => match self.symtab.resolve(var) {
                Some(Resolved::Hw(field)) => {
                    Ok(BoolExpr::Atom(field.expr.to_string()))
                }
                Some(Resolved::Counter(..)) => {
                    Err(EquationError::CounterInAvailability(var.to_string()))
                }
                None => Err(EquationError::UnresolvedVariable(var.to_string())),
            },
            Operand::Literal(lit) => Ok(BoolExpr::Atom(lit.text.to_string())),
            Operand::Bank(bank) => {
                Err(EquationError::UnexpectedOperand(bank.token().to_string()))
            }
            Operand::Word(word) => {
                Err(EquationError::UnknownOperator(word.to_string()))
            }
        }
    }

    fn apply(&mut self, op: Op, args: Args<BoolExpr>) -> EquationResult<BoolExpr> {
        let (lhs, rhs) = binary_args(op, args)?;
        Ok(BoolExpr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }
}

/// Compile an availability expression into a [`Guard`].
pub fn splice_availability(
    expression: &str,
    symtab: &SymbolTable,
) -> EquationResult<Guard> {
    fold(expression, &mut Splicer { symtab }).map(Guard::from)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metric::test::{counter, set};
    use crate::metric::MetricSet;

    fn splice(expr: &str) -> EquationResult<Guard> {
        let set: MetricSet = set("S", vec![counter("Busy", "1")]);
        splice_availability(expr, &SymbolTable::new(&set))
    }

    #[test]
    fn single_clause_unbracketed() {
        assert_eq!(
            Ok(vec!["devinfo->slice_mask & 0x01".to_string()]),
            splice("$SliceMask 0x01 AND").map(|g| g.clauses)
        );
    }

    #[test]
    fn comparison_operators() {
        assert_eq!(
            Ok("devinfo->revision < 0x02".to_string()),
            splice("$SkuRevisionId 0x02 ULT").map(|g| g.to_string())
        );
        assert_eq!(
            Ok("devinfo->revision >= 0x02".to_string()),
            splice("$SkuRevisionId 0x02 UGTE").map(|g| g.to_string())
        );
    }

    #[test]
    fn top_level_conjunction_splits_into_clauses() {
        let guard = splice(
            "$SliceMask 0x01 AND $SubsliceMask 0x02 AND && \
             $SkuRevisionId 0x02 UGTE &&",
        )
        .expect("splice failed");

        assert_eq!(
            vec![
                "(devinfo->slice_mask & 0x01)",
                "(devinfo->subslice_mask & 0x02)",
                "(devinfo->revision >= 0x02)",
            ],
            guard.clauses
        );
        assert_eq!(
            "(devinfo->slice_mask & 0x01) && (devinfo->subslice_mask & 0x02) \
             && (devinfo->revision >= 0x02)",
            guard.to_string()
        );
    }

    #[test]
    fn nested_conjunction_not_split() {
        assert_eq!(
            Ok(vec!["devinfo->slice_mask & (1 && 2)".to_string()]),
            splice("$SliceMask 1 2 && AND").map(|g| g.clauses)
        );
    }

    #[test]
    fn counters_rejected() {
        assert_eq!(
            Err(EquationError::CounterInAvailability("$Busy".into())),
            splice("$Busy 1 AND")
        );
    }

    #[test]
    fn unknown_variable() {
        assert_eq!(
            Err(EquationError::UnresolvedVariable("$Unknown".into())),
            splice("$Unknown 1 AND")
        );
    }

    #[test]
    fn arithmetic_operators_rejected() {
        assert_eq!(
            Err(EquationError::UnknownOperator("UADD".into())),
            splice("1 2 UADD")
        );
    }
}
