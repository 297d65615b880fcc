// Tests for metric set assembly
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

use super::*;
use crate::metric::test::{counter, set};
use crate::metric::{DataType, Register};
use crate::rpn::EquationError;

type Sut = Assembler;

fn render(sets: &[MetricSet]) -> GenResult<String> {
    let mut sut = Sut::new("bdw");

    for set in sets {
        sut.add_set(set)?;
    }

    Ok(sut.finish().to_string())
}

fn config(ty: RegisterType, regs: &[(&str, &str)]) -> RegisterConfig {
    RegisterConfig {
        ty,
        availability: None,
        registers: regs
            .iter()
            .map(|(address, value)| Register {
                address: address.to_string(),
                value: value.to_string(),
            })
            .collect(),
    }
}

fn pos(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("missing `{}` in:\n{}", needle, haystack))
}

#[test]
fn identical_formulas_share_one_body() {
    let out = render(&[set(
        "S",
        vec![counter("A", "5 A READ"), counter("B", "5 A  READ")],
    )])
    .expect("assembly failed");

    assert_eq!(1, out.matches("\nbdw__s__a__read(struct").count());
    assert!(out.contains("#define bdw__s__b__read bdw__s__a__read\n"));
    assert!(!out.contains("bdw__s__b__read(struct"));
}

#[test]
fn dedup_spans_sets_of_batch() {
    let mut sut = Sut::new("bdw");

    sut.add_set(&set("S", vec![counter("A", "5 A READ")]))
        .expect("first set failed");
    sut.add_set(&set("T", vec![counter("X", "5 A READ")]))
        .expect("second set failed");

    assert_eq!(
        Stats {
            sets: 2,
            counters: 2,
            functions: 1,
            aliases: 1,
        },
        sut.stats()
    );

    assert!(sut
        .finish()
        .to_string()
        .contains("#define bdw__t__x__read bdw__s__a__read\n"));
}

#[test]
fn differing_return_types_not_shared() {
    let mut float = counter("B", "5 A READ");
    float.data_type = DataType::Float;

    let out = render(&[set("S", vec![counter("A", "5 A READ"), float])])
        .expect("assembly failed");

    assert!(out.contains("static uint64_t\nbdw__s__a__read(struct"));
    assert!(out.contains("static double\nbdw__s__b__read(struct"));
    assert!(!out.contains("#define"));
}

#[test]
fn referenced_counters_emitted_first() {
    let out = render(&[set(
        "S",
        vec![counter("Ratio", "$Total 2 UDIV"), counter("Total", "1 A READ")],
    )])
    .expect("assembly failed");

    assert!(
        pos(&out, "\nbdw__s__total__read(struct")
            < pos(&out, "\nbdw__s__ratio__read(struct")
    );
    assert!(out.contains("bdw__s__total__read(devinfo, metric_set, accumulator)"));
}

#[test]
fn function_signature_and_comment() {
    let out = render(&[set("S", vec![counter("A", "1 2 UADD")])])
        .expect("assembly failed");

    assert!(out.contains(
        "/* S :: A */\n\
         static uint64_t\n\
         bdw__s__a__read(struct gputop_devinfo *devinfo,\n                \
         const struct gputop_metric_set *metric_set,\n                \
         uint64_t *accumulator)\n\
         {\n    \
         /* RPN equation: 1 2 UADD */\n"
    ));
}

#[test]
fn max_values() {
    let mut none = counter("None", "1");
    none.max_equation = None;

    let mut pct = counter("Pct", "2");
    pct.max_equation = Some("100".into());

    let mut computed = counter("Computed", "3");
    computed.max_equation = Some("$EuCoresTotalCount 2 UMUL".into());

    let out = render(&[set("S", vec![none, pct, computed])])
        .expect("assembly failed");

    assert!(out.contains("counter->max_uint64 = NULL;"));
    assert!(out.contains("counter->max_uint64 = percentage_max_callback_uint64;"));
    assert!(out.contains("counter->max_uint64 = bdw__s__computed__max;"));
    assert!(out.contains("\nbdw__s__computed__max(struct"));
    assert!(!out.contains("bdw__s__pct__max"));
}

#[test]
fn records_sorted_by_symbol_name() {
    let out = render(&[set(
        "S",
        vec![counter("Zeta", "1"), counter("Alpha", "2")],
    )])
    .expect("assembly failed");

    assert!(
        pos(&out, "counter->symbol_name = \"Alpha\";")
            < pos(&out, "counter->symbol_name = \"Zeta\";")
    );
    assert!(out.contains("assert(metric_set->n_counters <= 2);"));
}

#[test]
fn counter_record_fields() {
    let mut busy = counter("Busy", "1");
    busy.name = "EU \"Busy\"".into();
    busy.description = "Percentage of time busy.".into();
    busy.semantic_type = "duration".into();
    busy.units = Some("percent".into());

    let out = render(&[set("S", vec![busy])]).expect("assembly failed");

    assert!(out.contains(
        "    counter = &metric_set->counters[metric_set->n_counters++];\n    \
         counter->oa_counter_read_uint64 = bdw__s__busy__read;\n    \
         counter->name = \"EU \\\"Busy\\\"\";\n    \
         counter->symbol_name = \"Busy\";\n    \
         counter->desc = \"Percentage of time busy.\";\n    \
         counter->type = GPUTOP_PERFQUERY_COUNTER_RAW;\n    \
         counter->data_type = GPUTOP_PERFQUERY_COUNTER_DATA_UINT64;\n    \
         counter->max_uint64 = NULL;\n    \
         counter->units = \"percent\";\n"
    ));
}

#[test]
fn availability_guards_record() {
    let mut guarded = counter("Guarded", "1");
    guarded.availability =
        Some("$SliceMask 0x01 AND $SkuRevisionId 0x02 UGTE &&".into());

    let out = render(&[set("S", vec![guarded])]).expect("assembly failed");

    assert!(out.contains(
        "    if ((devinfo->slice_mask & 0x01) &&\n        \
         (devinfo->revision >= 0x02)) {\n        \
         counter = &metric_set->counters[metric_set->n_counters++];\n"
    ));
}

#[test]
fn availability_error_names_counter() {
    let mut guarded = counter("Guarded", "1");
    guarded.availability = Some("$Other 1 AND".into());

    let result = render(&[set("S", vec![guarded, counter("Other", "2")])]);

    assert_eq!(
        Err(GenError::Equation {
            ctx: EquationCtx::new("S", "Guarded", "$Other 1 AND"),
            err: EquationError::CounterInAvailability("$Other".into()),
        }),
        result
    );
}

#[test]
fn unresolved_variable_names_counter() {
    let result = render(&[set("S", vec![counter("Bad", "$Unknown 1 UADD")])]);

    assert_eq!(
        Err(GenError::Equation {
            ctx: EquationCtx::new("S", "Bad", "$Unknown 1 UADD"),
            err: EquationError::UnresolvedVariable("$Unknown".into()),
        }),
        result
    );
}

#[test]
fn cyclic_references_rejected() {
    let result = render(&[set(
        "S",
        vec![counter("A", "$B 1 UADD"), counter("B", "$A 1 UADD")],
    )]);

    assert_eq!(
        Err(GenError::CyclicCounterReference {
            set: "S".into(),
            cycle: vec!["A".into(), "B".into(), "A".into()],
        }),
        result
    );
}

#[test]
fn register_programming() {
    let mut noa = config(RegisterType::Noa, &[("0x9888", "0x1")]);
    noa.availability = Some("$SliceMask 0x01 AND".into());

    let mut s = set("S", vec![counter("A", "1")]);
    s.register_configs = vec![
        config(RegisterType::Flex, &[("0xe458", "0x5")]),
        noa,
        config(RegisterType::Flex, &[("0xe458", "0x5")]),
    ];

    let out = render(&[s]).expect("assembly failed");

    assert!(out.contains(
        "    metric_set->flex_regs = xmalloc0(sizeof(*metric_set->flex_regs) * 1);\n    \
         metric_set->mux_regs = xmalloc0(sizeof(*metric_set->mux_regs) * 1);\n"
    ));

    // The repeated FLEX block is written only once.
    assert_eq!(
        1,
        out.matches(
            "metric_set->flex_regs[metric_set->n_flex_regs++] = \
             (struct gputop_register_prog) { .reg = 0xe458, .val = 0x5 };"
        )
        .count()
    );

    assert!(out.contains(
        "    if (devinfo->slice_mask & 0x01) {\n        \
         metric_set->mux_regs[metric_set->n_mux_regs++] = \
         (struct gputop_register_prog) { .reg = 0x9888, .val = 0x1 };\n    \
         }\n"
    ));
}

#[test]
fn inconsistent_singular_register_config() {
    let mut s = set("S", vec![counter("A", "1")]);
    s.register_configs = vec![
        config(RegisterType::Oa, &[("0x2740", "0x0")]),
        config(RegisterType::Oa, &[("0x2740", "0x1")]),
    ];

    assert_eq!(
        Err(GenError::InconsistentDuplicateRegisterConfig {
            set: "S".into(),
            ty: "OA".into(),
        }),
        render(&[s])
    );
}

#[test]
fn report_layout_follows_chipset() {
    let mut sut = Sut::new("HSW");
    sut.add_set(&set("S", vec![counter("A", "1")]))
        .expect("assembly failed");

    let out = sut.finish().to_string();

    assert!(out.contains("metric_set->perf_oa_format = I915_OA_FORMAT_A45_B8_C8;"));
    assert!(!out.contains("gpu_clock_offset"));
    assert!(out.contains("\ngputop_oa_add_metrics_hsw(struct"));
}

#[test]
fn entry_point_registers_sets_in_order() {
    let out = render(&[
        set("S", vec![counter("A", "1")]),
        set("T", vec![counter("B", "2")]),
    ])
    .expect("assembly failed");

    assert!(out.ends_with(
        "void\n\
         gputop_oa_add_metrics_bdw(struct gputop_devinfo *devinfo,\n                          \
         void (*register_metric_set)(struct gputop_metric_set *, void *),\n                          \
         void *data)\n\
         {\n    \
         add_s_metric_set(devinfo, register_metric_set, data);\n    \
         add_t_metric_set(devinfo, register_metric_set, data);\n\
         }\n"
    ));
}

#[test]
fn entry_prototype() {
    assert_eq!(
        "void gputop_oa_add_metrics_bdw(struct gputop_devinfo *devinfo, \
         void (*register_metric_set)(struct gputop_metric_set *, void *), \
         void *data);\n",
        Sut::new("bdw").entry_prototype().to_string()
    );
}

#[test]
fn semantic_kinds() {
    assert_eq!("RAW", semantic_kind("duration"));
    assert_eq!("EVENT", semantic_kind("ratio"));
    assert_eq!("THROUGHPUT", semantic_kind("throughput"));
}
