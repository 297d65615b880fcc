// OA metric set code generator
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

//! Compile GPU OA metric set descriptions into C.
//!
//! Metric sets are read from XML ([`metric`]),
//!   each counter equation is compiled by one of several folds over the
//!   same RPN token stream ([`rpn`]),
//!   and the results are assembled per chipset ([`assemble`]) into C
//!   source ([`cgen`]).
//! [`gen`] drives a complete run;
//!   see the `oagen` binary for the command line.

// We build docs for private items.
#![allow(rustdoc::private_intra_doc_links)]

pub mod annotate;
pub mod assemble;
pub mod cgen;
pub mod dedup;
pub mod error;
pub mod fs;
pub mod gen;
pub mod hw;
pub mod metric;
pub mod rpn;
pub mod symtab;
