// Hardware introspection fields and report layouts
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

//! Fixed hardware-introspection table and per-chipset report layouts.
//!
//! Equations may refer to properties of the device they are evaluated
//!   on
//!     (e.g. the number of execution units)
//!   through sigil-prefixed variables such as `$EuCoresTotalCount`.
//! Those variables are not computed by the generator;
//!   they resolve to a field of the device-capability record that the
//!   runtime library passes to every generated function as `devinfo`.
//!
//! The accumulator that read functions index into is laid out according
//!   to the OA report format of the chipset,
//!     described here by [`ReportLayout`].

use std::fmt::Display;

/// A read-only field of the runtime device-capability record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwField {
    /// Sigil-prefixed variable name as it appears in equations.
    pub var: &'static str,

    /// C expression reading the field at runtime.
    pub expr: &'static str,

    /// Human-readable description,
    ///   used only for documentation output.
    pub desc: Option<&'static str>,
}

/// Every hardware field known to the generator.
///
/// Resolution consults this table before sibling counters,
///   so a counter can never shadow a hardware field.
pub const HW_FIELDS: &[HwField] = &[
    HwField {
        var: "$EuCoresTotalCount",
        expr: "devinfo->n_eus",
        desc: Some("The total number of execution units"),
    },
    HwField {
        var: "$EuSlicesTotalCount",
        expr: "devinfo->n_eu_slices",
        desc: None,
    },
    HwField {
        var: "$EuSubslicesTotalCount",
        expr: "devinfo->n_eu_sub_slices",
        desc: None,
    },
    HwField {
        var: "$EuThreadsCount",
        expr: "devinfo->eu_threads_count",
        desc: None,
    },
    HwField {
        var: "$SliceMask",
        expr: "devinfo->slice_mask",
        desc: None,
    },
    HwField {
        var: "$SubsliceMask",
        expr: "devinfo->subslice_mask",
        desc: None,
    },
    HwField {
        var: "$GpuTimestampFrequency",
        expr: "devinfo->timestamp_frequency",
        desc: None,
    },
    HwField {
        var: "$GpuMinFrequency",
        expr: "devinfo->gt_min_freq",
        desc: None,
    },
    HwField {
        var: "$GpuMaxFrequency",
        expr: "devinfo->gt_max_freq",
        desc: None,
    },
    HwField {
        var: "$SkuRevisionId",
        expr: "devinfo->revision",
        desc: None,
    },
];

/// Look up a hardware field by its sigil-prefixed variable name.
pub fn lookup(var: &str) -> Option<&'static HwField> {
    HW_FIELDS.iter().find(|field| field.var == var)
}

/// A region of the accumulated-counter buffer.
///
/// Each bank begins at an offset stored in the metric set at runtime
///   (`metric_set-><bank>_offset`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    A,
    B,
    C,
    GpuTime,
    GpuClock,
}

impl Bank {
    /// Parse a bank name as it appears in an equation.
    ///
    /// Bank names are matched without regard to case.
    pub fn from_token(token: &str) -> Option<Self> {
        const BANKS: [(&str, Bank); 5] = [
            ("A", Bank::A),
            ("B", Bank::B),
            ("C", Bank::C),
            ("GPU_TIME", Bank::GpuTime),
            ("GPU_CLOCK", Bank::GpuClock),
        ];

        BANKS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
            .map(|(_, bank)| *bank)
    }

    /// Name of the bank as written in equations.
    pub fn token(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::GpuTime => "GPU_TIME",
            Self::GpuClock => "GPU_CLOCK",
        }
    }

    /// Metric set field holding the offset of this bank.
    pub fn offset_field(&self) -> &'static str {
        match self {
            Self::A => "a_offset",
            Self::B => "b_offset",
            Self::C => "c_offset",
            Self::GpuTime => "gpu_time_offset",
            Self::GpuClock => "gpu_clock_offset",
        }
    }
}

impl Display for Bank {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.write_str(self.token())
    }
}

/// Size in bytes of a raw OA report.
pub const RAW_REPORT_SIZE: u32 = 256;

/// Layout of the accumulator for a given OA report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLayout {
    /// i915 report format constant.
    pub format: &'static str,

    /// Offset of the GPU clock counter,
    ///   if the format carries one.
    pub gpu_clock: Option<u32>,

    /// Offset of the first A counter.
    pub a: u32,

    /// Number of A counters preceding the B bank.
    pub n_a: u32,

    /// Number of B counters preceding the C bank.
    pub n_b: u32,
}

impl ReportLayout {
    /// Haswell reports carry 45 A counters and no GPU clock.
    pub const A45_B8_C8: Self = Self {
        format: "I915_OA_FORMAT_A45_B8_C8",
        gpu_clock: None,
        a: 1,
        n_a: 45,
        n_b: 8,
    };

    /// Report format of every generation following Haswell.
    pub const A32U40_A4U32_B8_C8: Self = Self {
        format: "I915_OA_FORMAT_A32u40_A4u32_B8_C8",
        gpu_clock: Some(1),
        a: 2,
        n_a: 36,
        n_b: 8,
    };

    /// Layout used by the given chipset.
    pub fn for_chipset(chipset: &str) -> Self {
        if chipset.eq_ignore_ascii_case("hsw") {
            Self::A45_B8_C8
        } else {
            Self::A32U40_A4U32_B8_C8
        }
    }

    /// Absolute accumulator offset of `bank`.
    ///
    /// A bank that the format does not carry has no offset;
    ///   the runtime leaves such fields zeroed,
    ///   and so that is what is returned here.
    pub fn offset(&self, bank: Bank) -> u32 {
        match bank {
            Bank::GpuTime => 0,
            Bank::GpuClock => self.gpu_clock.unwrap_or(0),
            Bank::A => self.a,
            Bank::B => self.a + self.n_a,
            Bank::C => self.a + self.n_a + self.n_b,
        }
    }

    /// C statements initializing the offsets of a metric set.
    pub fn init_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("metric_set->perf_oa_format = {};", self.format),
            String::new(),
            format!("metric_set->perf_raw_size = {};", RAW_REPORT_SIZE),
            "metric_set->gpu_time_offset = 0;".to_string(),
        ];

        if let Some(clock) = self.gpu_clock {
            lines.push(format!("metric_set->gpu_clock_offset = {};", clock));
        }

        lines.extend([
            format!("metric_set->a_offset = {};", self.a),
            format!(
                "metric_set->b_offset = metric_set->a_offset + {};",
                self.n_a
            ),
            format!(
                "metric_set->c_offset = metric_set->b_offset + {};",
                self.n_b
            ),
        ]);

        lines
    }
}
