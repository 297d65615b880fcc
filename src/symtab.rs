// Equation variable resolution
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

//! Per-set symbol table.
//!
//! A sigil-prefixed variable resolves,
//!   in this order,
//!   to a [hardware field](crate::hw::HW_FIELDS) or to a sibling counter
//!   of the same [`MetricSet`].
//! Counters may be referenced before or after their definition in
//!   document order.
//!
//! A table is constructed for a single set and borrows from it;
//!   nothing is shared between sets.

use crate::hw::{self, HwField};
use crate::metric::{Counter, FnKind, MetricSet};
use fxhash::FxHashMap;

/// Result of resolving a variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'s> {
    Hw(&'static HwField),

    /// Sibling counter and its index within the set.
    Counter(usize, &'s Counter),
}

#[derive(Debug)]
pub struct SymbolTable<'s> {
    set: &'s MetricSet,
    counters: FxHashMap<&'s str, usize>,
}

impl<'s> SymbolTable<'s> {
    pub fn new(set: &'s MetricSet) -> Self {
        let counters = set
            .counters
            .iter()
            .enumerate()
            .map(|(i, counter)| (counter.symbol_name.as_str(), i))
            .collect();

        Self { set, counters }
    }

    pub fn set(&self) -> &'s MetricSet {
        self.set
    }

    /// Resolve a sigil-prefixed variable.
    ///
    /// Tokens lacking the sigil never resolve.
    pub fn resolve(&self, var: &str) -> Option<Resolved<'s>> {
        if let Some(field) = hw::lookup(var) {
            return Some(Resolved::Hw(field));
        }

        let name = var.strip_prefix('$')?;

        self.counters
            .get(name)
            .map(|&i| Resolved::Counter(i, &self.set.counters[i]))
    }

    /// Index of the counter named by `var`,
    ///   if it is a sibling counter and not a hardware field.
    pub fn counter_index(&self, var: &str) -> Option<usize> {
        match self.resolve(var)? {
            Resolved::Counter(i, _) => Some(i),
            Resolved::Hw(_) => None,
        }
    }

    /// Symbol of the read function of counter `index`.
    pub fn read_fn(&self, index: usize) -> String {
        self.set.fn_symbol(&self.set.counters[index], FnKind::Read)
    }

    /// Human-readable description of `var`,
    ///   if one is known.
    pub fn describe(&self, var: &str) -> Option<&'s str> {
        match self.resolve(var)? {
            Resolved::Hw(field) => field.desc,
            Resolved::Counter(_, counter) => {
                Some(counter.description.as_str()).filter(|d| !d.is_empty())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metric::test::{counter, set};

    type Sut<'s> = SymbolTable<'s>;

    #[test]
    fn hw_fields_take_precedence_over_counters() {
        let set = set("S", vec![counter("EuCoresTotalCount", "1")]);
        let sut = Sut::new(&set);

        match sut.resolve("$EuCoresTotalCount") {
            Some(Resolved::Hw(field)) => assert_eq!("devinfo->n_eus", field.expr),
            bad => panic!("expected hardware field: {:?}", bad),
        }
    }

    #[test]
    fn resolves_forward_and_backward_counters() {
        let set = set(
            "S",
            vec![counter("First", "$Second"), counter("Second", "$First")],
        );
        let sut = Sut::new(&set);

        assert_eq!(Some(0), sut.counter_index("$First"));
        assert_eq!(Some(1), sut.counter_index("$Second"));
        assert_eq!("bdw__s__second__read", sut.read_fn(1));
    }

    #[test]
    fn unknown_and_unprefixed_do_not_resolve() {
        let set = set("S", vec![counter("First", "1")]);
        let sut = Sut::new(&set);

        assert_eq!(None, sut.resolve("$Unknown"));
        assert_eq!(None, sut.resolve("First"));
    }

    #[test]
    fn descriptions() {
        let mut described = counter("Described", "1");
        described.description = "Some words".into();

        let set = set("S", vec![described, counter("Bare", "1")]);
        let sut = Sut::new(&set);

        assert_eq!(Some("Some words"), sut.describe("$Described"));
        assert_eq!(None, sut.describe("$Bare"));
        assert_eq!(
            Some("The total number of execution units"),
            sut.describe("$EuCoresTotalCount")
        );
        assert_eq!(None, sut.describe("$SliceMask"));
    }
}
