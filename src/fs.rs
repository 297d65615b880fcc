// Input file access
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

//! Reading input documents by path.
//!
//! The same metric XML may be named more than once on the command line
//!   (e.g. through overlapping shell globs).
//! [`VisitOnceReader`] reads each canonical path only once,
//!   yielding [`Visit::Repeat`] thereafter,
//!   so that no set is generated twice.

use fxhash::FxBuildHasher;
use std::collections::HashSet;
use std::hash::BuildHasher;
use std::io::Result;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Path canonicalization strategy.
pub trait Canonicalizer {
    fn canonicalize(path: &Path) -> Result<PathBuf>;
}

/// Canonicalize using the real filesystem,
///   resolving symlinks and relative components.
pub struct FsCanonicalizer;

impl Canonicalizer for FsCanonicalizer {
    fn canonicalize(path: &Path) -> Result<PathBuf> {
        std::fs::canonicalize(path)
    }
}

/// Result of [`VisitOnceReader::read`].
#[derive(Debug, PartialEq, Eq)]
pub enum Visit {
    /// Contents of a document not read before.
    First(Vec<u8>),

    /// The document was already read through another path.
    Repeat,
}

/// Reads each canonical path at most once.
///
/// A path that fails to read is not recorded.
pub struct VisitOnceReader<C: Canonicalizer, S: BuildHasher = FxBuildHasher> {
    visited: HashSet<PathBuf, S>,
    _c: PhantomData<C>,
}

impl<C: Canonicalizer, S: BuildHasher + Default> VisitOnceReader<C, S> {
    pub fn new() -> Self {
        Self {
            visited: HashSet::default(),
            _c: PhantomData,
        }
    }

    /// Number of distinct documents read.
    pub fn visit_len(&self) -> usize {
        self.visited.len()
    }

    pub fn read<P: AsRef<Path>>(&mut self, path: P) -> Result<Visit> {
        let cpath = C::canonicalize(path.as_ref())?;

        if self.visited.contains(&cpath) {
            return Ok(Visit::Repeat);
        }

        let src = std::fs::read(&cpath)?;
        self.visited.insert(cpath);

        Ok(Visit::First(src))
    }
}

impl<C: Canonicalizer, S: BuildHasher + Default> Default
    for VisitOnceReader<C, S>
{
    fn default() -> Self {
        Self::new()
    }
}
