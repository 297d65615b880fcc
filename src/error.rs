// Generator errors
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

//! Errors that abort a generation run.
//!
//! Every error is fatal:
//!   the generator is a batch compiler and partial output is never
//!   valid.
//! Errors therefore contain only owned values,
//!   which simplifies [`Result`] chaining considerably.

use crate::rpn::EquationError;
use std::fmt::Display;
use std::io;

pub type GenResult<T> = Result<T, GenError>;

/// Thin wrapper around [`quick_xml::Error`] to implement [`PartialEq`].
///
/// This will always yield `false`,
///   but allows us to derive the trait on types using [`XmlError`];
///     otherwise, this madness propagates indefinitely.
#[derive(Debug)]
pub struct XmlError(pub quick_xml::Error);

impl PartialEq for XmlError {
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        Self(e)
    }
}

impl Display for XmlError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.0.fmt(fmt)
    }
}

impl std::error::Error for XmlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Location of an equation within the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquationCtx {
    /// Name of the metric set.
    pub set: String,

    /// Name of the counter,
    ///   or a description of the owner for register configs.
    pub counter: String,

    /// Equation text as written in the input.
    pub equation: String,
}

impl EquationCtx {
    pub fn new<S, C, E>(set: S, counter: C, equation: E) -> Self
    where
        S: Into<String>,
        C: Into<String>,
        E: Into<String>,
    {
        Self {
            set: set.into(),
            counter: counter.into(),
            equation: equation.into(),
        }
    }

    /// Attach this context to an [`EquationError`].
    pub fn wrap(&self, err: EquationError) -> GenError {
        GenError::Equation {
            ctx: self.clone(),
            err,
        }
    }
}

impl Display for EquationCtx {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            fmt,
            "`{}` :: `{}` (equation \"{}\")",
            self.set, self.counter, self.equation
        )
    }
}

/// Fatal generation error.
#[derive(Debug, PartialEq)]
pub enum GenError {
    /// An equation failed to compile.
    Equation { ctx: EquationCtx, err: EquationError },

    /// Counters of a set refer to one another in a loop.
    ///
    /// The cycle lists counter symbol names in reference order,
    ///   ending with the first element repeated.
    CyclicCounterReference { set: String, cycle: Vec<String> },

    /// A `<register_config>` has an unrecognized `@type`.
    UnknownRegisterType { set: String, ty: String },

    /// A register type that may only be programmed one way was given
    ///   differing blocks within a single set.
    InconsistentDuplicateRegisterConfig { set: String, ty: String },

    /// A counter has an unrecognized `@data_type`.
    UnknownDataType {
        set: String,
        counter: String,
        data_type: String,
    },

    /// A required attribute is missing from an input element.
    MissingAttribute {
        element: &'static str,
        attr: &'static str,
        context: String,
    },

    /// Counter symbol names must be unique within a set.
    DuplicateCounter { set: String, counter: String },

    /// The requested chipset has no metric sets in the input.
    NoMetricSets { chipset: String },

    /// Input sets disagree on their chipset and none was selected.
    ChipsetMismatch { expected: String, found: String },

    /// An annotated copy of the input was requested,
    ///   but there is more than one input.
    XmlOutMultipleInputs { count: usize },

    Io(String),
    Xml(XmlError),
}

impl From<io::Error> for GenError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<quick_xml::Error> for GenError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.into())
    }
}

impl From<quick_xml::events::attributes::AttrError> for GenError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(quick_xml::Error::from(e).into())
    }
}

impl Display for GenError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        use GenError::*;

        match self {
            Equation { ctx, err } => write!(fmt, "{} in {}", err, ctx),

            CyclicCounterReference { set, cycle } => write!(
                fmt,
                "cyclic counter reference in `{}`: {}",
                set,
                cycle.join(" -> "),
            ),

            UnknownRegisterType { set, ty } => {
                write!(fmt, "unknown register type `{}` in `{}`", ty, set)
            }

            InconsistentDuplicateRegisterConfig { set, ty } => write!(
                fmt,
                "multiple, differing {} register configs for `{}`",
                ty, set,
            ),

            UnknownDataType {
                set,
                counter,
                data_type,
            } => write!(
                fmt,
                "unhandled data type `{}` for `{}` :: `{}`",
                data_type, set, counter,
            ),

            MissingAttribute {
                element,
                attr,
                context,
            } => write!(
                fmt,
                "`{}` element is missing `@{}` ({})",
                element, attr, context,
            ),

            DuplicateCounter { set, counter } => write!(
                fmt,
                "duplicate counter `{}` in `{}`",
                counter, set
            ),

            NoMetricSets { chipset } => {
                write!(fmt, "no metric sets found for chipset `{}`", chipset)
            }

            ChipsetMismatch { expected, found } => write!(
                fmt,
                "metric sets for chipset `{}` found alongside `{}` \
                   (select one with `--chipset`)",
                found, expected,
            ),

            XmlOutMultipleInputs { count } => write!(
                fmt,
                "annotated XML output requires a single input ({} given)",
                count
            ),

            Io(msg) => fmt.write_str(msg),
            Xml(e) => Display::fmt(e, fmt),
        }
    }
}

impl std::error::Error for GenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Equation { err, .. } => Some(err),
            Self::Xml(e) => Some(e),
            _ => None,
        }
    }
}
