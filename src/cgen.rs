// Structured C source builder
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

//! C translation units as data.
//!
//! Generated code is accumulated as [`Item`]s and [`CStmt`]s and rendered
//!   to text in a single final pass via [`Display`],
//!     so that indentation is never tracked by the code deciding what to
//!     emit.
//!
//! Everything is indented by four spaces per level.

use crate::rpn::avail::Guard;
use crate::rpn::code::{Body, Stmt};
use std::fmt::{Display, Formatter, Result as FmtResult};

const INDENT: usize = 4;

/// Statement within a function body.
#[derive(Debug, Clone, PartialEq)]
pub enum CStmt {
    Comment(String),

    /// Statement text,
    ///   including any trailing `;`.
    Line(String),
    Blank,
    Eval(Stmt),
    Return(String),
    If { guard: Guard, body: Vec<CStmt> },
}

impl CStmt {
    /// Statements computing `body` and returning its result.
    pub fn from_body(body: &Body) -> Vec<Self> {
        let mut stmts = vec![Self::Comment(format!("RPN equation: {}", body.equation))];

        stmts.extend(body.stmts.iter().cloned().map(Self::Eval));
        stmts.push(Self::Blank);
        stmts.push(Self::Return(body.result.to_string()));

        stmts
    }

    fn fmt_at(&self, fmt: &mut Formatter, level: usize) -> FmtResult {
        let ind = " ".repeat(level * INDENT);

        match self {
            Self::Comment(text) => writeln!(fmt, "{}/* {} */", ind, text),
            Self::Line(text) if text.is_empty() => writeln!(fmt),
            Self::Line(text) => writeln!(fmt, "{}{}", ind, text),
            Self::Blank => writeln!(fmt),
            Self::Eval(stmt) => writeln!(fmt, "{}{}", ind, stmt),
            Self::Return(value) => writeln!(fmt, "{}return {};", ind, value),

            Self::If { guard, body } => {
                let last = guard.clauses.len().saturating_sub(1);

                write!(fmt, "{}if (", ind)?;

                for (i, clause) in guard.clauses.iter().enumerate() {
                    if i == last {
                        writeln!(fmt, "{}) {{", clause)?;
                    } else {
                        write!(fmt, "{} &&\n{}    ", clause, ind)?;
                    }
                }

                for stmt in body {
                    stmt.fmt_at(fmt, level + 1)?;
                }

                writeln!(fmt, "{}}}", ind)
            }
        }
    }
}

/// Function definition.
#[derive(Debug, Clone, PartialEq)]
pub struct CFunction {
    pub comment: Option<String>,
    pub is_static: bool,
    pub ret: String,
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<CStmt>,
}

impl Display for CFunction {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        if let Some(comment) = &self.comment {
            writeln!(fmt, "/* {} */", comment)?;
        }

        if self.is_static {
            write!(fmt, "static ")?;
        }

        writeln!(fmt, "{}", self.ret)?;
        write!(fmt, "{}(", self.name)?;

        let align = " ".repeat(self.name.len() + 1);
        let mut params = self.params.iter();

        if let Some(first) = params.next() {
            write!(fmt, "{}", first)?;
        }

        for param in params {
            write!(fmt, ",\n{}{}", align, param)?;
        }

        writeln!(fmt, ")")?;
        writeln!(fmt, "{{")?;

        for stmt in &self.body {
            stmt.fmt_at(fmt, 1)?;
        }

        writeln!(fmt, "}}")
    }
}

/// Top-level element of a translation unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Comment(String),

    /// Text emitted verbatim.
    Raw(String),
    Blank,
    Function(CFunction),

    /// `#define name target`
    Alias { name: String, target: String },
    Prototype {
        ret: String,
        name: String,
        params: Vec<String>,
    },
}

impl Display for Item {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self {
            Self::Comment(text) => writeln!(fmt, "/* {} */", text),
            Self::Raw(text) => fmt.write_str(text),
            Self::Blank => writeln!(fmt),
            Self::Function(func) => Display::fmt(func, fmt),
            Self::Alias { name, target } => {
                writeln!(fmt, "#define {} {}", name, target)
            }
            Self::Prototype { ret, name, params } => {
                writeln!(fmt, "{} {}({});", ret, name, params.join(", "))
            }
        }
    }
}

/// Ordered sequence of [`Item`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unit {
    pub items: Vec<Item>,
}

impl Unit {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }
}

impl Extend<Item> for Unit {
    fn extend<I: IntoIterator<Item = Item>>(&mut self, iter: I) {
        self.items.extend(iter)
    }
}

impl Display for Unit {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        self.items.iter().try_for_each(|item| Display::fmt(item, fmt))
    }
}

/// Quote `s` as a C string literal.
///
/// Control characters are written as octal escapes,
///   which unlike hexadecimal escapes cannot absorb a following
///   character.
pub fn c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');

    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_ascii_control() => {
                out.push_str(&format!("\\{:03o}", c as u32))
            }
            c => out.push(c),
        }
    }

    out.push('"');
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn guard(clauses: &[&str]) -> Guard {
        Guard {
            clauses: clauses.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn function_params_aligned_to_name() {
        let sut = CFunction {
            comment: Some("Set :: Counter".into()),
            is_static: true,
            ret: "uint64_t".into(),
            name: "f".into(),
            params: vec!["int a".into(), "int b".into()],
            body: vec![CStmt::Return("a".into())],
        };

        assert_eq!(
            "/* Set :: Counter */\n\
             static uint64_t\n\
             f(int a,\n  int b)\n\
             {\n    return a;\n}\n",
            sut.to_string()
        );
    }

    #[test]
    fn single_clause_if() {
        let sut = CStmt::If {
            guard: guard(&["x & 1"]),
            body: vec![CStmt::Line("y = 1;".into())],
        };

        let mut unit = Unit::new();
        unit.push(Item::Function(CFunction {
            comment: None,
            is_static: false,
            ret: "void".into(),
            name: "g".into(),
            params: vec!["void".into()],
            body: vec![sut],
        }));

        assert_eq!(
            "void\ng(void)\n{\n    if (x & 1) {\n        y = 1;\n    }\n}\n",
            unit.to_string()
        );
    }

    #[test]
    fn multi_clause_if_one_clause_per_line() {
        let sut = CStmt::If {
            guard: guard(&["(a)", "(b)", "(c)"]),
            body: vec![CStmt::Line("z;".into())],
        };

        let mut out = String::new();
        {
            struct At<'a>(&'a CStmt);

            impl Display for At<'_> {
                fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
                    self.0.fmt_at(fmt, 0)
                }
            }

            out.push_str(&At(&sut).to_string());
        }

        assert_eq!("if ((a) &&\n    (b) &&\n    (c)) {\n    z;\n}\n", out);
    }

    #[test]
    fn alias_and_prototype() {
        let mut sut = Unit::new();

        sut.extend([
            Item::Alias {
                name: "b".into(),
                target: "a".into(),
            },
            Item::Prototype {
                ret: "void".into(),
                name: "entry".into(),
                params: vec!["int x".into(), "void *data".into()],
            },
        ]);

        assert_eq!(
            "#define b a\nvoid entry(int x, void *data);\n",
            sut.to_string()
        );
    }

    #[test]
    fn c_string_escapes() {
        assert_eq!(r#""plain""#, c_string("plain"));
        assert_eq!(r#""say \"hi\"\\n""#, c_string("say \"hi\"\\n"));
        assert_eq!(r#""a\nb\001""#, c_string("a\nb\u{1}"));
    }
}
