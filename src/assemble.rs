// Metric set assembly
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

//! Assemble the metric sets of one chipset into C definitions.
//!
//! Each set is assembled in two passes:
//!
//!   1. Read functions are emitted in dependency order
//!        (see [`CounterGraph`]),
//!        followed by max functions;
//!        a function whose canonical formula was already emitted within
//!        this batch becomes a `#define` alias of that function instead.
//!   2. A registration function `add_<set>_metric_set` allocates the set,
//!        programs its registers,
//!        and appends one record per counter
//!          (sorted by symbol name,
//!           each within its availability guard)
//!        before handing the set to the runtime's callback.
//!
//! After all sets have been added,
//!   [`Assembler::finish`] appends the chipset entry point
//!   `gputop_oa_add_metrics_<chipset>` that registers each set in the
//!   order it was added.

use crate::cgen::{c_string, CFunction, CStmt, Item, Unit};
use crate::dedup::{Canonicalizer, CounterGraph, DedupTable, Emission};
use crate::error::{EquationCtx, GenError, GenResult};
use crate::hw::ReportLayout;
use crate::metric::{Counter, FnKind, MetricSet, RegisterConfig, RegisterType};
use crate::rpn::avail::{splice_availability, Guard};
use crate::rpn::code::emit_equation;
use crate::symtab::SymbolTable;
use log::debug;

/// Parameters of every read and max function.
pub const READ_PARAMS: [&str; 3] = [
    "struct gputop_devinfo *devinfo",
    "const struct gputop_metric_set *metric_set",
    "uint64_t *accumulator",
];

/// Parameters of registration functions and the chipset entry point.
pub const REGISTER_PARAMS: [&str; 3] = [
    "struct gputop_devinfo *devinfo",
    "void (*register_metric_set)(struct gputop_metric_set *, void *)",
    "void *data",
];

/// Max equation value treated as a fixed percentage.
const PERCENTAGE_MAX: &str = "100";

/// Runtime counter type for a `semantic_type`.
pub fn semantic_kind(semantic_type: &str) -> String {
    match semantic_type {
        "duration" => "RAW".to_string(),
        "ratio" => "EVENT".to_string(),
        other => other.to_uppercase(),
    }
}

/// Summary of a batch,
///   for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub sets: usize,
    pub counters: usize,
    pub functions: usize,
    pub aliases: usize,
}

/// Accumulates the definitions of a single chipset batch.
///
/// Deduplication state is owned by the assembler,
///   and so is scoped to the batch.
#[derive(Debug)]
pub struct Assembler {
    chipset: String,
    layout: ReportLayout,
    dedup: DedupTable,
    unit: Unit,
    add_fns: Vec<String>,
    stats: Stats,
}

impl Assembler {
    pub fn new(chipset: &str) -> Self {
        let chipset = chipset.to_lowercase();

        Self {
            layout: ReportLayout::for_chipset(&chipset),
            chipset,
            dedup: DedupTable::new(),
            unit: Unit::new(),
            add_fns: Vec::new(),
            stats: Stats::default(),
        }
    }

    pub fn chipset(&self) -> &str {
        &self.chipset
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Name of the chipset entry point.
    pub fn entry_fn(&self) -> String {
        format!("gputop_oa_add_metrics_{}", self.chipset)
    }

    /// Declaration of the chipset entry point.
    pub fn entry_prototype(&self) -> Item {
        Item::Prototype {
            ret: "void".into(),
            name: self.entry_fn(),
            params: REGISTER_PARAMS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Emit the functions and registration function of `set`.
    ///
    /// On error,
    ///   the assembler must be discarded.
    pub fn add_set(&mut self, set: &MetricSet) -> GenResult<()> {
        debug!(
            "assembling set `{}` ({} counters)",
            set.name,
            set.counters.len()
        );

        let symtab = SymbolTable::new(set);
        let graph = CounterGraph::new(&symtab);

        graph.check_cycles()?;

        let mut canon = Canonicalizer::new(&symtab);

        for i in graph.emission_order() {
            self.emit_read(set, &symtab, &mut canon, i)?;
        }

        let maxes = (0..set.counters.len())
            .map(|i| self.emit_max(set, &symtab, &mut canon, i))
            .collect::<GenResult<Vec<_>>>()?;

        let register_fn = self.register_fn(set, &symtab, &maxes)?;

        self.unit.push(Item::Blank);
        self.unit.push(Item::Function(register_fn));

        self.add_fns.push(set.add_fn_symbol());
        self.stats.sets += 1;
        self.stats.counters += set.counters.len();

        Ok(())
    }

    /// Append the chipset entry point and yield the definitions.
    pub fn finish(mut self) -> Unit {
        let body = self
            .add_fns
            .iter()
            .map(|add_fn| {
                CStmt::Line(format!(
                    "{}(devinfo, register_metric_set, data);",
                    add_fn
                ))
            })
            .collect();

        let entry = CFunction {
            comment: None,
            is_static: false,
            ret: "void".into(),
            name: self.entry_fn(),
            params: REGISTER_PARAMS.iter().map(ToString::to_string).collect(),
            body,
        };

        self.unit.push(Item::Blank);
        self.unit.push(Item::Function(entry));

        self.unit
    }

    fn emit_read(
        &mut self,
        set: &MetricSet,
        symtab: &SymbolTable,
        canon: &mut Canonicalizer,
        index: usize,
    ) -> GenResult<()> {
        let counter = &set.counters[index];
        let key = canon.read_key(index)?;

        self.emit_fn(set, symtab, counter, FnKind::Read, key, &counter.equation)
    }

    /// Emit the max function of counter `index`,
    ///   yielding the value to be stored in its record.
    fn emit_max(
        &mut self,
        set: &MetricSet,
        symtab: &SymbolTable,
        canon: &mut Canonicalizer,
        index: usize,
    ) -> GenResult<String> {
        let counter = &set.counters[index];

        let max = match &counter.max_equation {
            None => return Ok("NULL".into()),
            Some(max) if max.trim() == PERCENTAGE_MAX => {
                return Ok(format!(
                    "percentage_max_callback_{}",
                    counter.data_type
                ))
            }
            Some(max) => max,
        };

        // Only `None` if there is no max equation.
        let key = canon.max_key(index)?.unwrap_or_default();

        self.emit_fn(set, symtab, counter, FnKind::Max, key, max)?;

        Ok(set.fn_symbol(counter, FnKind::Max))
    }

    fn emit_fn(
        &mut self,
        set: &MetricSet,
        symtab: &SymbolTable,
        counter: &Counter,
        kind: FnKind,
        key: String,
        equation: &str,
    ) -> GenResult<()> {
        let sym = set.fn_symbol(counter, kind);

        match self.dedup.claim(key, &sym) {
            Emission::Emit => {
                let body = emit_equation(equation, symtab).map_err(|e| {
                    EquationCtx::new(&set.name, &counter.name, equation).wrap(e)
                })?;

                debug!("emitting `{}` ({} statements)", sym, body.stmts.len());

                self.unit.push(Item::Blank);
                self.unit.push(Item::Function(CFunction {
                    comment: Some(format!("{} :: {}", set.name, counter.name)),
                    is_static: true,
                    ret: counter.data_type.ctype().into(),
                    name: sym,
                    params: READ_PARAMS.iter().map(ToString::to_string).collect(),
                    body: CStmt::from_body(&body),
                }));

                self.stats.functions += 1;
            }

            Emission::Alias(target) => {
                debug!("aliasing `{}` to `{}`", sym, target);

                self.unit.push(Item::Alias { name: sym, target });
                self.stats.aliases += 1;
            }
        }

        Ok(())
    }

    fn guard(
        set: &MetricSet,
        owner: &str,
        availability: &str,
        symtab: &SymbolTable,
    ) -> GenResult<Guard> {
        splice_availability(availability, symtab)
            .map_err(|e| EquationCtx::new(&set.name, owner, availability).wrap(e))
    }

    fn register_fn(
        &self,
        set: &MetricSet,
        symtab: &SymbolTable,
        maxes: &[String],
    ) -> GenResult<CFunction> {
        use CStmt::{Blank, Line};

        let n = set.counters.len();

        let mut body = vec![
            Line("struct gputop_metric_set *metric_set;".into()),
            Line("struct gputop_metric_set_counter *counter;".into()),
            Blank,
            Line("metric_set = xmalloc0(sizeof(struct gputop_metric_set));".into()),
            Line(format!("metric_set->name = {};", c_string(&set.name))),
            Line(format!(
                "metric_set->symbol_name = {};",
                c_string(&set.symbol_name)
            )),
            Line(format!(
                "metric_set->hw_config_guid = {};",
                set.hw_config_guid
                    .as_deref()
                    .map(c_string)
                    .unwrap_or_else(|| "NULL".into())
            )),
            Line(format!(
                "metric_set->counters = xmalloc0(sizeof(struct gputop_metric_set_counter) * {});",
                n
            )),
            Line("metric_set->n_counters = 0;".into()),
            Line("metric_set->perf_oa_metrics_set = 0; // determined at runtime".into()),
            Blank,
        ];

        body.extend(self.layout.init_lines().into_iter().map(Line));
        body.push(Blank);
        body.extend(Self::register_stmts(set, symtab)?);

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            set.counters[a].symbol_name.cmp(&set.counters[b].symbol_name)
        });

        for i in order {
            let counter = &set.counters[i];
            let record = Self::counter_record(set, counter, &maxes[i]);

            match &counter.availability {
                Some(availability) => body.push(CStmt::If {
                    guard: Self::guard(set, &counter.name, availability, symtab)?,
                    body: record,
                }),
                None => body.extend(record),
            }

            body.push(Blank);
        }

        body.extend([
            Line(format!("assert(metric_set->n_counters <= {});", n)),
            Blank,
            Line("register_metric_set(metric_set, data);".into()),
        ]);

        Ok(CFunction {
            comment: Some(set.name.clone()),
            is_static: true,
            ret: "void".into(),
            name: set.add_fn_symbol(),
            params: REGISTER_PARAMS.iter().map(ToString::to_string).collect(),
            body,
        })
    }

    fn counter_record(set: &MetricSet, counter: &Counter, max: &str) -> Vec<CStmt> {
        let dt = counter.data_type.as_str();

        let mut record = vec![
            CStmt::Line(
                "counter = &metric_set->counters[metric_set->n_counters++];".into(),
            ),
            CStmt::Line(format!(
                "counter->oa_counter_read_{} = {};",
                dt,
                set.fn_symbol(counter, FnKind::Read)
            )),
            CStmt::Line(format!("counter->name = {};", c_string(&counter.name))),
            CStmt::Line(format!(
                "counter->symbol_name = {};",
                c_string(&counter.symbol_name)
            )),
            CStmt::Line(format!(
                "counter->desc = {};",
                c_string(&counter.description)
            )),
            CStmt::Line(format!(
                "counter->type = GPUTOP_PERFQUERY_COUNTER_{};",
                semantic_kind(&counter.semantic_type)
            )),
            CStmt::Line(format!(
                "counter->data_type = GPUTOP_PERFQUERY_COUNTER_DATA_{};",
                dt.to_uppercase()
            )),
            CStmt::Line(format!("counter->max_{} = {};", dt, max)),
        ];

        if let Some(units) = &counter.units {
            record.push(CStmt::Line(format!(
                "counter->units = {};",
                c_string(units)
            )));
        }

        record
    }

    /// Register programming of `set`.
    ///
    /// Repeated blocks of a singular register type must be identical and
    ///   are emitted once.
    fn register_stmts(set: &MetricSet, symtab: &SymbolTable) -> GenResult<Vec<CStmt>> {
        let mut configs: Vec<&RegisterConfig> = Vec::new();

        for config in &set.register_configs {
            let prev = configs
                .iter()
                .find(|prev| prev.ty == config.ty && config.ty.is_singular());

            match prev {
                Some(prev) if *prev == config => {
                    debug!("ignoring repeated {} config of `{}`", config.ty, set.name)
                }
                Some(_) => {
                    return Err(GenError::InconsistentDuplicateRegisterConfig {
                        set: set.name.clone(),
                        ty: config.ty.to_string(),
                    })
                }
                None => configs.push(config),
            }
        }

        // Allocation sizes,
        //   by register type in order of first appearance.
        let mut totals: Vec<(RegisterType, usize)> = Vec::new();

        for config in &configs {
            match totals.iter_mut().find(|(ty, _)| *ty == config.ty) {
                Some((_, n)) => *n += config.registers.len(),
                None => totals.push((config.ty, config.registers.len())),
            }
        }

        let mut stmts: Vec<CStmt> = totals
            .iter()
            .map(|(ty, n)| {
                CStmt::Line(format!(
                    "metric_set->{0} = xmalloc0(sizeof(*metric_set->{0}) * {1});",
                    ty.array(),
                    n
                ))
            })
            .collect();

        stmts.push(CStmt::Blank);

        for config in configs {
            let array = config.ty.array();

            let writes: Vec<CStmt> = config
                .registers
                .iter()
                .map(|reg| {
                    CStmt::Line(format!(
                        "metric_set->{0}[metric_set->n_{0}++] = \
                           (struct gputop_register_prog) {{ .reg = {1}, .val = {2} }};",
                        array, reg.address, reg.value
                    ))
                })
                .collect();

            match &config.availability {
                Some(availability) => {
                    let owner = format!("{} register config", config.ty);

                    stmts.push(CStmt::If {
                        guard: Self::guard(set, &owner, availability, symtab)?,
                        body: writes,
                    });
                }
                None => stmts.extend(writes),
            }

            stmts.push(CStmt::Blank);
        }

        Ok(stmts)
    }
}

#[cfg(test)]
mod test;
