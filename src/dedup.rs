// Counter dependency ordering and formula deduplication
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

//! Counter reference graph and canonical formula keys.
//!
//! Read equations may refer to sibling counters,
//!   which become calls to the read functions of those counters.
//! Those functions must be defined before they are called,
//!   and so read functions are emitted in post-order over the graph of
//!   counter references ([`CounterGraph::emission_order`]).
//! A reference cycle has no such order and is a fatal error.
//!
//! Deduplication
//! =============
//! Two counters compute the same thing if their equations are textually
//!   identical once every sibling reference is replaced by the formula of
//!   that sibling,
//!     recursively.
//! [`Canonicalizer`] computes that expansion once per counter,
//!   and [`DedupTable`] maps each distinct key to the first function
//!   emitted for it.
//! The table lives for a single chipset batch;
//!   sets of different chipsets never share functions.

use crate::error::{GenError, GenResult};
use crate::metric::MetricSet;
use crate::symtab::SymbolTable;
use fixedbitset::FixedBitSet;
use fxhash::{FxHashMap, FxHashSet};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;

/// Sibling counters referenced by `equation`,
///   in order of appearance.
fn references<'a>(
    equation: &'a str,
    symtab: &'a SymbolTable<'a>,
) -> impl Iterator<Item = usize> + 'a {
    equation
        .split_whitespace()
        .filter_map(move |token| symtab.counter_index(token))
}

/// Graph of read-equation references between the counters of one set.
///
/// Node `i` is counter `i` of the set;
///   an edge `i -> j` means that counter `i` reads counter `j`.
#[derive(Debug)]
pub struct CounterGraph<'s> {
    set: &'s MetricSet,
    graph: DiGraph<usize, ()>,
}

impl<'s> CounterGraph<'s> {
    pub fn new(symtab: &SymbolTable<'s>) -> Self {
        let set = symtab.set();
        let mut graph = DiGraph::with_capacity(set.counters.len(), 0);

        for i in 0..set.counters.len() {
            graph.add_node(i);
        }

        for (i, counter) in set.counters.iter().enumerate() {
            for j in references(&counter.equation, symtab) {
                graph.update_edge(NodeIndex::new(i), NodeIndex::new(j), ());
            }
        }

        Self { set, graph }
    }

    /// Fail on the first reference cycle,
    ///   reporting its full path.
    pub fn check_cycles(&self) -> GenResult<()> {
        let sccs = petgraph::algo::tarjan_scc(&self.graph);

        let cycles = sccs.into_iter().filter(|scc| {
            // Single-node components are cycles only if self-referencing.
            scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0])
        });

        // Report the cycle containing the earliest counter,
        //   for stable output.
        let first = cycles.min_by_key(|scc| scc.iter().min().copied());

        match first {
            None => Ok(()),
            Some(scc) => Err(GenError::CyclicCounterReference {
                set: self.set.name.clone(),
                cycle: self
                    .cycle_path(&scc)
                    .into_iter()
                    .map(|nx| self.set.counters[nx.index()].symbol_name.clone())
                    .collect(),
            }),
        }
    }

    /// A cycle through the strongly connected component `scc`,
    ///   beginning and ending with the same node.
    fn cycle_path(&self, scc: &[NodeIndex]) -> Vec<NodeIndex> {
        let members: FxHashSet<NodeIndex> = scc.iter().copied().collect();

        let start = match scc.iter().min() {
            Some(&start) => start,
            None => return vec![],
        };

        let mut path = vec![start];
        let mut cur = start;

        while let Some(next) = self
            .graph
            .neighbors(cur)
            .filter(|nx| members.contains(nx))
            .min()
        {
            if let Some(pos) = path.iter().position(|&nx| nx == next) {
                path.drain(..pos);
                path.push(next);
                break;
            }

            path.push(next);
            cur = next;
        }

        path
    }

    /// Counter indices ordered such that every counter follows all
    ///   counters that it references.
    ///
    /// Unrelated counters retain their document order.
    /// This is meaningful only if [`check_cycles`](Self::check_cycles)
    ///   succeeds.
    pub fn emission_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut dfs = DfsPostOrder::empty(&self.graph);

        for i in 0..self.graph.node_count() {
            dfs.move_to(NodeIndex::new(i));

            while let Some(nx) = dfs.next(&self.graph) {
                order.push(self.graph[nx]);
            }
        }

        order
    }
}

/// Memoizing computation of canonical formula keys for one set.
///
/// A counter currently being expanded is marked,
///   so that a reference cycle is reported rather than recursing
///   indefinitely.
pub struct Canonicalizer<'t, 's> {
    symtab: &'t SymbolTable<'s>,
    keys: Vec<Option<String>>,
    resolving: FixedBitSet,
    path: Vec<usize>,
}

impl<'t, 's> Canonicalizer<'t, 's> {
    pub fn new(symtab: &'t SymbolTable<'s>) -> Self {
        let n = symtab.set().counters.len();

        Self {
            symtab,
            keys: vec![None; n],
            resolving: FixedBitSet::with_capacity(n),
            path: Vec::new(),
        }
    }

    /// Canonical key of the read function of counter `index`.
    ///
    /// The key incorporates the C return type,
    ///   since functions of differing types cannot be shared.
    pub fn read_key(&mut self, index: usize) -> GenResult<String> {
        if let Some(key) = &self.keys[index] {
            return Ok(key.clone());
        }

        if self.resolving.contains(index) {
            return Err(self.cycle_error(index));
        }

        let counter = &self.symtab.set().counters[index];

        self.resolving.insert(index);
        self.path.push(index);

        let expanded = self.expand(&counter.equation);

        self.path.pop();
        self.resolving.set(index, false);

        let key = format!("{}:{}", counter.data_type.ctype(), expanded?);
        self.keys[index] = Some(key.clone());

        Ok(key)
    }

    /// Canonical key of the max function of counter `index`,
    ///   if it has a max equation.
    pub fn max_key(&mut self, index: usize) -> GenResult<Option<String>> {
        let counter = &self.symtab.set().counters[index];

        match &counter.max_equation {
            None => Ok(None),
            Some(max) => Ok(Some(format!(
                "max:{}:{}",
                counter.data_type.ctype(),
                self.expand(max)?
            ))),
        }
    }

    /// Normalize whitespace and substitute sibling references.
    fn expand(&mut self, equation: &str) -> GenResult<String> {
        let mut out = Vec::new();

        for token in equation.split_whitespace() {
            match self.symtab.counter_index(token) {
                Some(j) => out.push(format!("[{}]", self.read_key(j)?)),
                None => out.push(token.to_string()),
            }
        }

        Ok(out.join(" "))
    }

    fn cycle_error(&self, index: usize) -> GenError {
        let set = self.symtab.set();
        let pos = self.path.iter().position(|&i| i == index).unwrap_or(0);

        GenError::CyclicCounterReference {
            set: set.name.clone(),
            cycle: self.path[pos..]
                .iter()
                .chain(std::iter::once(&index))
                .map(|&i| set.counters[i].symbol_name.clone())
                .collect(),
        }
    }
}

/// What to do with a function whose key has been claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    /// First occurrence;
    ///   emit a function body.
    Emit,

    /// Alias the previously emitted function of the given symbol.
    Alias(String),
}

/// Functions emitted so far within a chipset batch,
///   by canonical key.
#[derive(Debug, Default)]
pub struct DedupTable {
    funcs: FxHashMap<String, String>,
}

impl DedupTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Record `sym` as the implementation of `key` unless another
    ///   function already implements it.
    pub fn claim(&mut self, key: String, sym: &str) -> Emission {
        match self.funcs.get(&key) {
            Some(target) => Emission::Alias(target.clone()),
            None => {
                self.funcs.insert(key, sym.to_string());
                Emission::Emit
            }
        }
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metric::test::{counter, set};
    use crate::metric::DataType;

    fn cycle_of(set: &MetricSet) -> Vec<String> {
        let symtab = SymbolTable::new(set);

        match CounterGraph::new(&symtab).check_cycles() {
            Err(GenError::CyclicCounterReference { cycle, .. }) => cycle,
            bad => panic!("expected cycle: {:?}", bad),
        }
    }

    #[test]
    fn post_order_puts_references_first() {
        let set = set(
            "S",
            vec![
                counter("Ratio", "$Busy $Total FDIV"),
                counter("Total", "1"),
                counter("Busy", "$Total 2 UDIV"),
                counter("Other", "3"),
            ],
        );
        let symtab = SymbolTable::new(&set);
        let sut = CounterGraph::new(&symtab);

        assert_eq!(Ok(()), sut.check_cycles());
        assert_eq!(vec![1, 2, 0, 3], sut.emission_order());
    }

    #[test]
    fn two_counter_cycle_path() {
        let set = set(
            "S",
            vec![
                counter("Ok", "1"),
                counter("A", "$B 1 UADD"),
                counter("B", "$A 1 UADD"),
            ],
        );

        assert_eq!(vec!["A", "B", "A"], cycle_of(&set));
    }

    #[test]
    fn self_reference_is_cycle() {
        let set = set("S", vec![counter("Me", "$Me 1 UADD")]);

        assert_eq!(vec!["Me", "Me"], cycle_of(&set));
    }

    #[test]
    fn canonical_key_expands_references() {
        let set = set(
            "S",
            vec![
                counter("Total", "$EuCoresTotalCount   2 UMUL"),
                counter("Half", "$Total 2 UDIV"),
            ],
        );
        let symtab = SymbolTable::new(&set);
        let mut sut = Canonicalizer::new(&symtab);

        assert_eq!(
            Ok("uint64_t:[uint64_t:$EuCoresTotalCount 2 UMUL] 2 UDIV".to_string()),
            sut.read_key(1)
        );
    }

    #[test]
    fn identical_formulas_share_keys_across_names() {
        let set = set(
            "S",
            vec![
                counter("A", "5 A READ"),
                counter("B", "5 A READ"),
                counter("UsesA", "$A 2 UMUL"),
                counter("UsesB", "$B 2 UMUL"),
            ],
        );
        let symtab = SymbolTable::new(&set);
        let mut sut = Canonicalizer::new(&symtab);

        assert_eq!(sut.read_key(2), sut.read_key(3));
    }

    #[test]
    fn data_type_distinguishes_keys() {
        let mut float = counter("F", "1 2 UADD");
        float.data_type = DataType::Float;

        let set = set("S", vec![counter("U", "1 2 UADD"), float]);
        let symtab = SymbolTable::new(&set);
        let mut sut = Canonicalizer::new(&symtab);

        assert_ne!(sut.read_key(0), sut.read_key(1));
    }

    #[test]
    fn canonicalizer_detects_cycles() {
        let set = set(
            "S",
            vec![counter("A", "$B 1 UADD"), counter("B", "$A 1 UADD")],
        );
        let symtab = SymbolTable::new(&set);
        let mut sut = Canonicalizer::new(&symtab);

        match sut.read_key(0) {
            Err(GenError::CyclicCounterReference { cycle, .. }) => {
                assert_eq!(vec!["A", "B", "A"], cycle)
            }
            bad => panic!("expected cycle: {:?}", bad),
        }
    }

    #[test]
    fn max_keys_distinct_from_read_keys() {
        let mut c = counter("C", "100");
        c.max_equation = Some("100".into());

        let set = set("S", vec![c]);
        let symtab = SymbolTable::new(&set);
        let mut sut = Canonicalizer::new(&symtab);

        assert_eq!(Ok(Some("max:uint64_t:100".to_string())), sut.max_key(0));
        assert_eq!(Ok("uint64_t:100".to_string()), sut.read_key(0));
    }

    #[test]
    fn first_claim_emits_then_aliases() {
        let mut sut = DedupTable::new();

        assert_eq!(Emission::Emit, sut.claim("k".into(), "first"));
        assert_eq!(
            Emission::Alias("first".into()),
            sut.claim("k".into(), "second")
        );
        assert_eq!(Emission::Emit, sut.claim("other".into(), "third"));
        assert_eq!(2, sut.len());
    }
}
