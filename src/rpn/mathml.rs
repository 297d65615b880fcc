// MathML rendering of counter equations
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

//! Human-readable rendering of counter equations.
//!
//! Each stack value is a markup tree paired with the precedence of its
//!   outermost operator.
//! An operand is bracketed when its precedence is lower than that
//!   required by the slot it is placed into;
//!     right-hand operands of `-`, `<<` and `>>` require one level more
//!     than their operator,
//!       so that `1 2 3 USUB USUB` renders as `1 - (2 - 3)`.
//! Division renders as a fraction and `max`/`min` as calls,
//!   neither of which ever needs brackets.
//!
//! Variables are rendered with their description as a tooltip when one
//!   is known.
//! Variables that cannot be resolved are rendered by name;
//!   rendering fails only on a malformed equation or an unknown bank.

use super::{
    binary_args, fold, unary_arg, Args, EquationError, EquationResult, Op,
    OpTable, Operand, RpnFold, EQUATION_OPS,
};
use crate::hw::Bank;
use crate::symtab::SymbolTable;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

/// Precedence of `&`.
pub const PREC_AND: u8 = 8;

/// Precedence of `<<` and `>>`.
pub const PREC_SHIFT: u8 = 5;

/// Precedence of `*`.
pub const PREC_MUL: u8 = 3;

/// Precedence of `+` and `-`.
pub const PREC_ADD: u8 = 2;

/// Precedence of anything never requiring brackets.
pub const PREC_ATOM: u8 = 16;

/// Presentation MathML node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MathNode {
    /// `<mn>`
    Num(String),

    /// `<mi>`
    Ident(String),

    /// `<mo>`
    Op(&'static str),

    /// `<mtext>`
    Text(String),

    /// Identifier annotated with a description.
    Tooltip { ident: String, desc: String },
    Frac(Box<MathNode>, Box<MathNode>),

    /// Sequence of nodes,
    ///   rendered without a wrapping element.
    Row(Vec<MathNode>),
}

impl MathNode {
    /// Write this node as XML events.
    pub fn write<W: Write>(&self, w: &mut Writer<W>) -> quick_xml::Result<()> {
        match self {
            Self::Num(text) => leaf(w, "mn", text),
            Self::Ident(text) => leaf(w, "mi", text),
            Self::Op(text) => leaf(w, "mo", text),
            Self::Text(text) => leaf(w, "mtext", text),

            Self::Tooltip { ident, desc } => {
                let mut start = BytesStart::new("maction");
                start.push_attribute(("actiontype", "tooltip"));

                w.write_event(Event::Start(start))?;
                leaf(w, "mi", ident)?;
                leaf(w, "mtext", desc)?;
                w.write_event(Event::End(BytesEnd::new("maction")))
            }

            Self::Frac(num, den) => {
                w.write_event(Event::Start(BytesStart::new("mfrac")))?;

                for part in [num, den] {
                    w.write_event(Event::Start(BytesStart::new("mrow")))?;
                    part.write(w)?;
                    w.write_event(Event::End(BytesEnd::new("mrow")))?;
                }

                w.write_event(Event::End(BytesEnd::new("mfrac")))
            }

            Self::Row(nodes) => nodes.iter().try_for_each(|node| node.write(w)),
        }
    }

    /// Text content with all markup removed.
    pub fn plain_text(&self) -> String {
        match self {
            Self::Num(text) | Self::Ident(text) | Self::Text(text) => {
                text.clone()
            }
            Self::Op(text) => text.to_string(),
            Self::Tooltip { ident, .. } => ident.clone(),
            Self::Frac(num, den) => {
                format!("{}/{}", num.plain_text(), den.plain_text())
            }
            Self::Row(nodes) => nodes.iter().map(Self::plain_text).collect(),
        }
    }
}

fn leaf<W: Write>(
    w: &mut Writer<W>,
    name: &str,
    text: &str,
) -> quick_xml::Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))
}

/// Markup paired with the precedence of its outermost operator.
#[derive(Debug)]
struct Term {
    node: MathNode,
    prec: u8,
}

impl Term {
    fn atom(node: MathNode) -> Self {
        Self {
            node,
            prec: PREC_ATOM,
        }
    }

    /// Node for placement into a slot requiring precedence `required`.
    fn operand(self, required: u8) -> MathNode {
        if self.prec < required {
            MathNode::Row(vec![
                MathNode::Text("(".into()),
                self.node,
                MathNode::Text(")".into()),
            ])
        } else {
            self.node
        }
    }

    fn infix(op: &'static str, prec: u8, assoc: bool, lhs: Self, rhs: Self) -> Self {
        let rhs_prec = if assoc { prec } else { prec + 1 };

        Self {
            node: MathNode::Row(vec![
                lhs.operand(prec),
                MathNode::Op(op),
                rhs.operand(rhs_prec),
            ]),
            prec,
        }
    }

    fn call(name: &str, lhs: Self, rhs: Self) -> Self {
        Self::atom(MathNode::Row(vec![
            MathNode::Text(format!("{} ( ", name)),
            lhs.node,
            MathNode::Text(" , ".into()),
            rhs.node,
            MathNode::Text(" ) ".into()),
        ]))
    }
}

#[derive(Debug)]
enum Slot {
    Term(Term),
    Bank(Bank),
    Word(String),
}

impl Slot {
    fn into_term(self) -> Term {
        match self {
            Self::Term(term) => term,
            Self::Bank(bank) => Term::atom(MathNode::Ident(bank.to_string())),
            Self::Word(word) => Term::atom(MathNode::Ident(word)),
        }
    }
}

struct Renderer<'t, 's> {
    symtab: &'t SymbolTable<'s>,
}

impl<'t, 's> Renderer<'t, 's> {
    fn read(index: Slot, bank: Slot) -> EquationResult<Term> {
        let (index, bank) = match (index, bank) {
            (_, Slot::Word(word)) | (Slot::Word(word), _) => {
                return Err(EquationError::UnknownBank(word))
            }
            (Slot::Bank(bank), index) | (index, Slot::Bank(bank)) => {
                (index.into_term(), bank.to_string())
            }
            (Slot::Term(lhs), Slot::Term(rhs)) => (lhs, rhs.node.plain_text()),
        };

        let index = index.node.plain_text();

        Ok(Term::atom(MathNode::Tooltip {
            ident: format!("{}{}", bank, index),
            desc: format!("Raw counter {} of the {} bank", index, bank),
        }))
    }
}

impl<'t, 's> RpnFold for Renderer<'t, 's> {
    type Value = Slot;

    fn ops(&self) -> &'static OpTable {
        &EQUATION_OPS
    }

    fn operand(&mut self, operand: Operand) -> EquationResult<Slot> {
        Ok(match operand {
            Operand::Var(var) => {
                let node = match self.symtab.describe(var) {
                    Some(desc) => MathNode::Tooltip {
                        ident: var.to_string(),
                        desc: desc.to_string(),
                    },
                    None => MathNode::Ident(var.to_string()),
                };

                Slot::Term(Term::atom(node))
            }
            Operand::Literal(lit) => {
                Slot::Term(Term::atom(MathNode::Num(lit.text.to_string())))
            }
            Operand::Bank(bank) => Slot::Bank(bank),
            Operand::Word(word) => Slot::Word(word.to_string()),
        })
    }

    fn apply(&mut self, op: Op, args: Args<Slot>) -> EquationResult<Slot> {
        if op == Op::ReadReg {
            let reg = unary_arg(op, args)?.into_term().node.plain_text();

            return Ok(Slot::Term(Term::atom(MathNode::Tooltip {
                ident: format!("REG({})", reg),
                desc: format!("Register {}, not available at runtime", reg),
            })));
        }

        let (lhs, rhs) = binary_args(op, args)?;

        if op == Op::Read {
            return Self::read(lhs, rhs).map(Slot::Term);
        }

        let (lhs, rhs) = (lhs.into_term(), rhs.into_term());

        let term = match op {
            Op::Fadd | Op::Uadd => Term::infix("+", PREC_ADD, true, lhs, rhs),
            Op::Fsub | Op::Usub => Term::infix("-", PREC_ADD, false, lhs, rhs),
            Op::Fmul | Op::Umul => Term::infix("*", PREC_MUL, true, lhs, rhs),
            Op::Shl => Term::infix("<<", PREC_SHIFT, false, lhs, rhs),
            Op::Shr => Term::infix(">>", PREC_SHIFT, false, lhs, rhs),
            Op::And => Term::infix("&", PREC_AND, true, lhs, rhs),

            Op::Fdiv | Op::Udiv => Term::atom(MathNode::Frac(
                Box::new(lhs.node),
                Box::new(rhs.node),
            )),

            Op::Fmax => Term::call("max", lhs, rhs),
            Op::Umin => Term::call("min", lhs, rhs),

            // Not part of the equation grammar.
            Op::Read | Op::ReadReg | Op::LogicalAnd | Op::Ult | Op::Ugte => {
                Term::infix(op.token(), PREC_ATOM, false, lhs, rhs)
            }
        };

        Ok(Slot::Term(term))
    }
}

/// Render `equation` as a MathML tree.
pub fn splice_mathml(
    equation: &str,
    symtab: &SymbolTable,
) -> EquationResult<MathNode> {
    fold(equation, &mut Renderer { symtab }).map(|slot| slot.into_term().node)
}

/// Rendered equation ready for insertion into a `<counter>` element.
///
/// This is written as `<mathml_{label}>` containing `{label} = ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub label: &'static str,
    pub root: MathNode,
}

impl Annotation {
    /// Label of the read equation annotation.
    pub const EQ: &'static str = "EQ";

    /// Label of the max equation annotation.
    pub const MAX_EQ: &'static str = "MAX_EQ";

    pub fn new(
        label: &'static str,
        equation: &str,
        symtab: &SymbolTable,
    ) -> EquationResult<Self> {
        Ok(Self {
            label,
            root: splice_mathml(equation, symtab)?,
        })
    }

    /// Name of the element holding this annotation.
    pub fn element_name(&self) -> String {
        format!("mathml_{}", self.label)
    }

    pub fn write<W: Write>(&self, w: &mut Writer<W>) -> quick_xml::Result<()> {
        let name = self.element_name();

        w.write_event(Event::Start(BytesStart::new(name.as_str())))?;
        leaf(w, "mi", self.label)?;
        leaf(w, "mo", " = ")?;
        self.root.write(w)?;
        w.write_event(Event::End(BytesEnd::new(name.as_str())))
    }
}

/// Whether `name` is the name of an annotation element.
pub fn is_annotation_element(name: &[u8]) -> bool {
    name.starts_with(b"mathml_")
}
