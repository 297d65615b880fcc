// Metric set data model
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

//! Metric sets and their counters.
//!
//! A [`MetricSet`] is one hardware counter configuration for a specific
//!   chipset.
//! It is constructed once from a `<set>` element
//!   (see [`xml::MetricsReader`])
//!   and is immutable thereafter.

pub mod xml;

pub use xml::MetricsReader;

use std::convert::TryFrom;
use std::fmt::Display;

/// Numeric type of a counter's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Uint64,
    Float,
}

impl DataType {
    /// Name as used in the XML and in runtime field names
    ///   (`oa_counter_read_uint64`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uint64 => "uint64",
            Self::Float => "float",
        }
    }

    /// C type returned by functions computing values of this type.
    pub fn ctype(&self) -> &'static str {
        match self {
            Self::Uint64 => "uint64_t",
            Self::Float => "double",
        }
    }
}

impl TryFrom<&str> for DataType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "uint64" => Ok(Self::Uint64),
            "float" => Ok(Self::Float),
            _ => Err(value.to_string()),
        }
    }
}

impl Display for DataType {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// Kind of register programmed by a `<register_config>` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterType {
    Flex,
    Noa,
    Oa,
}

impl RegisterType {
    /// Metric set array receiving registers of this type.
    pub fn array(&self) -> &'static str {
        match self {
            Self::Flex => "flex_regs",
            Self::Noa => "mux_regs",
            Self::Oa => "b_counter_regs",
        }
    }

    /// Whether repeated blocks of this type must agree in content.
    ///
    /// Only `NOA` (mux) programming legitimately varies by availability.
    pub fn is_singular(&self) -> bool {
        !matches!(self, Self::Noa)
    }
}

impl TryFrom<&str> for RegisterType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "FLEX" => Ok(Self::Flex),
            "NOA" => Ok(Self::Noa),
            "OA" => Ok(Self::Oa),
            _ => Err(value.to_string()),
        }
    }
}

impl Display for RegisterType {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Flex => write!(fmt, "FLEX"),
            Self::Noa => write!(fmt, "NOA"),
            Self::Oa => write!(fmt, "OA"),
        }
    }
}

/// A single register write.
///
/// Addresses and values are kept verbatim;
///   they are emitted as C literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub address: String,
    pub value: String,
}

/// A block of register writes applied when a metric set is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterConfig {
    pub ty: RegisterType,
    pub availability: Option<String>,
    pub registers: Vec<Register>,
}

/// One derived metric within a [`MetricSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub name: String,

    /// Unique within the owning set;
    ///   other equations refer to this counter as `$<symbol_name>`.
    pub symbol_name: String,

    pub underscore_name: String,
    pub description: String,
    pub data_type: DataType,
    pub semantic_type: String,
    pub units: Option<String>,

    /// RPN read equation.
    pub equation: String,

    /// RPN equation yielding the maximum value,
    ///   if any.
    pub max_equation: Option<String>,

    /// RPN guard deciding whether the counter is exposed at all.
    pub availability: Option<String>,
}

/// A named group of counters valid for one chipset.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSet {
    pub name: String,
    pub chipset: String,
    pub symbol_name: String,
    pub underscore_name: String,
    pub hw_config_guid: Option<String>,
    pub counters: Vec<Counter>,
    pub register_configs: Vec<RegisterConfig>,
}

/// Kind of function generated for a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    Read,
    Max,
}

impl MetricSet {
    /// Chipset identity used to group sets into a generation batch.
    pub fn chipset_id(&self) -> String {
        self.chipset.to_lowercase()
    }

    /// Stable symbol of the function of `kind` generated for `counter`.
    ///
    /// The symbol is always declared,
    ///   either as a function or as an alias of an identical function.
    pub fn fn_symbol(&self, counter: &Counter, kind: FnKind) -> String {
        let suffix = match kind {
            FnKind::Read => "read",
            FnKind::Max => "max",
        };

        format!(
            "{}__{}__{}__{}",
            self.chipset_id(),
            self.underscore_name,
            counter.underscore_name,
            suffix,
        )
    }

    /// Name of the registration function generated for this set.
    pub fn add_fn_symbol(&self) -> String {
        format!("add_{}_metric_set", self.underscore_name)
    }
}
