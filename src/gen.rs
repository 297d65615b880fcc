// Generation driver
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

//! Drive a complete generation run.
//!
//! A run reads every input document,
//!   selects the metric sets of a single chipset
//!     (the _batch_),
//!   assembles them,
//!   and only then writes its outputs.
//! Nothing is written if any step fails,
//!   so a failed run never leaves partial output behind.
//! Outputs are first staged in temporary files beside their
//!   destinations and renamed into place only once all of them have
//!   been written.
//!
//! Deduplication state lives in the [`Assembler`] of the batch and is
//!   discarded with it.

use crate::annotate::Annotator;
use crate::assemble::{Assembler, Stats, READ_PARAMS};
use crate::cgen::{CFunction, CStmt, Item, Unit};
use crate::error::{GenError, GenResult};
use crate::fs::{FsCanonicalizer, Visit, VisitOnceReader};
use crate::metric::{MetricSet, MetricsReader};
use log::{debug, info, warn};
use std::io::{self, Write};
use tempfile::NamedTempFile;
use std::path::{Path, PathBuf};

/// Banner heading every generated file.
pub const BANNER: &str =
    "Autogenerated file, DO NOT EDIT manually! generated by oagen";

/// Options of a generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenOptions {
    /// Metric set XML documents.
    pub inputs: Vec<PathBuf>,

    /// Declarations file to write.
    pub header: Option<PathBuf>,

    /// Definitions file to write.
    pub code: Option<PathBuf>,

    /// Annotated copy of the (single) input to write.
    pub xml_out: Option<PathBuf>,

    /// Chipset to generate;
    ///   derived from the input when absent.
    pub chipset: Option<String>,
}

/// An input document and the sets read from it.
#[derive(Debug)]
pub struct Input {
    pub path: PathBuf,
    pub src: Vec<u8>,
    pub sets: Vec<MetricSet>,
}

/// Rendered outputs of a batch.
#[derive(Debug)]
pub struct Generated {
    pub chipset: String,
    pub header: String,
    pub code: String,
    pub xml: Option<Vec<u8>>,
    pub stats: Stats,
}

fn io_error(path: &Path, e: io::Error) -> GenError {
    GenError::Io(format!("{}: {}", path.display(), e))
}

/// Read each input document once.
///
/// A path naming an already-read document is skipped with a warning.
pub fn read_inputs<P: AsRef<Path>>(paths: &[P]) -> GenResult<Vec<Input>> {
    let mut reader: VisitOnceReader<FsCanonicalizer> = VisitOnceReader::new();
    let mut inputs = Vec::with_capacity(paths.len());

    for path in paths {
        let path: &Path = path.as_ref();

        let src = match reader.read(path).map_err(|e| io_error(path, e))? {
            Visit::First(src) => src,
            Visit::Repeat => {
                warn!("skipping duplicate input `{}`", path.display());
                continue;
            }
        };

        let sets = MetricsReader::new(src.as_slice()).read_sets()?;
        debug!("read {} set(s) from `{}`", sets.len(), path.display());

        inputs.push(Input {
            path: path.to_path_buf(),
            src,
            sets,
        });
    }

    Ok(inputs)
}

/// Select the batch to generate.
///
/// With a `requested` chipset,
///   sets of any other chipset are skipped.
/// Otherwise every set must share the chipset of the first.
pub fn select_chipset<'a, I>(
    sets: I,
    requested: Option<&str>,
) -> GenResult<(String, Vec<&'a MetricSet>)>
where
    I: IntoIterator<Item = &'a MetricSet>,
{
    let mut chipset = requested.map(str::to_lowercase);
    let mut batch = Vec::new();

    for set in sets {
        let id = set.chipset_id();
        let expected = chipset.get_or_insert_with(|| id.clone());

        if *expected != id {
            if requested.is_none() {
                return Err(GenError::ChipsetMismatch {
                    expected: expected.clone(),
                    found: id,
                });
            }

            warn!("skipping set `{}` of chipset `{}`", set.name, id);
            continue;
        }

        batch.push(set);
    }

    match chipset {
        Some(chipset) if !batch.is_empty() => Ok((chipset, batch)),
        chipset => Err(GenError::NoMetricSets {
            chipset: chipset.unwrap_or_default(),
        }),
    }
}

/// Declarations of a batch.
pub fn render_header(asm: &Assembler) -> String {
    let guard = format!("OA_{}_H", asm.chipset().to_uppercase());

    let mut unit = Unit::new();

    unit.extend([
        Item::Comment(BANNER.into()),
        Item::Blank,
        Item::Raw(format!("#ifndef {0}\n#define {0}\n", guard)),
        Item::Blank,
        Item::Raw("#include \"gputop-oa-metrics.h\"\n".into()),
        Item::Blank,
        Item::Raw("#ifdef __cplusplus\nextern \"C\" {\n#endif\n".into()),
        Item::Blank,
        asm.entry_prototype(),
        Item::Blank,
        Item::Raw("#ifdef __cplusplus\n} /* extern \"C\" */\n#endif\n".into()),
        Item::Blank,
        Item::Raw(format!("#endif /* {} */\n", guard)),
    ]);

    unit.to_string()
}

/// Definitions shared by every metric set.
fn preamble(header_name: &str) -> Vec<Item> {
    let percentage = |ty: &str, ret: &str| {
        Item::Function(CFunction {
            comment: None,
            is_static: true,
            ret: ret.into(),
            name: format!("percentage_max_callback_{}", ty),
            params: READ_PARAMS.iter().map(ToString::to_string).collect(),
            body: vec![CStmt::Return("100".into())],
        })
    };

    vec![
        Item::Comment(BANNER.into()),
        Item::Blank,
        Item::Raw(
            [
                "#include <stddef.h>",
                "#include <stdint.h>",
                "#include <stdbool.h>",
                "#include <assert.h>",
                "#include <stdlib.h>",
                "#include <string.h>",
                "",
            ]
            .join("\n"),
        ),
        Item::Blank,
        Item::Raw(format!("#include \"{}\"\n", header_name)),
        Item::Raw("#include \"gputop-oa-metrics.h\"\n".into()),
        Item::Blank,
        Item::Raw("#define MIN(a, b) (((a) < (b)) ? (a) : (b))\n".into()),
        Item::Raw("#define MAX(a, b) (((a) > (b)) ? (a) : (b))\n".into()),
        Item::Blank,
        Item::Function(CFunction {
            comment: None,
            is_static: true,
            ret: "void *".into(),
            name: "xmalloc0".into(),
            params: vec!["size_t size".into()],
            body: vec![
                CStmt::Line("void *ret = malloc(size);".into()),
                CStmt::Line("if (!ret)".into()),
                CStmt::Line("    abort();".into()),
                CStmt::Line("memset(ret, 0, size);".into()),
                CStmt::Return("ret".into()),
            ],
        }),
        Item::Blank,
        percentage("float", "double"),
        Item::Blank,
        percentage("uint64", "uint64_t"),
    ]
}

/// Assemble and render a batch.
pub fn render(
    chipset: &str,
    sets: &[&MetricSet],
    header_name: Option<&str>,
) -> GenResult<Generated> {
    let mut asm = Assembler::new(chipset);

    for set in sets {
        asm.add_set(set)?;
    }

    let stats = asm.stats();
    let header = render_header(&asm);

    let default_name = format!("oa-{}.h", asm.chipset());
    let mut unit = Unit::new();
    unit.extend(preamble(header_name.unwrap_or(&default_name)));
    unit.extend(asm.finish().items);

    Ok(Generated {
        chipset: chipset.to_lowercase(),
        header,
        code: unit.to_string(),
        xml: None,
        stats,
    })
}

/// Perform a complete generation run.
pub fn generate(opts: &GenOptions) -> GenResult<Generated> {
    if opts.xml_out.is_some() && opts.inputs.len() > 1 {
        return Err(GenError::XmlOutMultipleInputs {
            count: opts.inputs.len(),
        });
    }

    let inputs = read_inputs(&opts.inputs)?;

    let (chipset, batch) = select_chipset(
        inputs.iter().flat_map(|input| &input.sets),
        opts.chipset.as_deref(),
    )?;

    info!("generating {} set(s) for chipset `{}`", batch.len(), chipset);

    let header_name = opts
        .header
        .as_deref()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned());

    let mut generated = render(&chipset, &batch, header_name.as_deref())?;

    if opts.xml_out.is_some() {
        generated.xml = inputs
            .first()
            .map(|input| {
                Annotator::new(input.src.as_slice(), Vec::new(), &input.sets)
                    .annotate()
            })
            .transpose()?;
    }

    let stats = generated.stats;
    info!(
        "{} counter(s): {} function(s) emitted, {} aliased",
        stats.counters, stats.functions, stats.aliases
    );

    write_outputs(opts, &generated)?;

    Ok(generated)
}

fn write_outputs(opts: &GenOptions, generated: &Generated) -> GenResult<()> {
    let outputs = [
        (opts.header.as_deref(), Some(generated.header.as_bytes())),
        (opts.code.as_deref(), Some(generated.code.as_bytes())),
        (opts.xml_out.as_deref(), generated.xml.as_deref()),
    ];

    let mut staged = Vec::with_capacity(outputs.len());

    for (path, content) in outputs {
        if let (Some(path), Some(content)) = (path, content) {
            let tmp = stage(path, content).map_err(|e| io_error(path, e))?;
            staged.push((path, tmp));
        }
    }

    for (path, tmp) in staged {
        tmp.persist(path).map_err(|e| io_error(path, e.error))?;
        info!("wrote `{}`", path.display());
    }

    Ok(())
}

/// Write `content` to a temporary file in the directory of `path`.
///
/// The file is removed when dropped unless persisted.
fn stage(path: &Path, content: &[u8]) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;

    // Temporary files are created private to the owner.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    Ok(tmp)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metric::test::{counter, set};

    const BDW_XML: &str = r#"<metrics>
  <set name="Render" chipset="BDW" symbol_name="Render" underscore_name="render">
    <counter name="Threads" symbol_name="Threads" underscore_name="threads"
             data_type="uint64" semantic_type="event"
             equation="$EuCoresTotalCount 2 UMUL"/>
  </set>
</metrics>"#;

    fn on(chipset: &str, name: &str) -> MetricSet {
        let mut s = set(name, vec![counter("A", "1")]);
        s.chipset = chipset.into();
        s
    }

    #[test]
    fn chipset_derived_from_sets() {
        let sets = [on("BDW", "S"), on("bdw", "T")];

        match select_chipset(&sets, None) {
            Ok((chipset, batch)) => {
                assert_eq!("bdw", chipset);
                assert_eq!(2, batch.len());
            }
            bad => panic!("expected batch: {:?}", bad),
        }
    }

    #[test]
    fn mixed_chipsets_rejected_without_selection() {
        let sets = [on("BDW", "S"), on("SKL", "T")];

        assert_eq!(
            Err(GenError::ChipsetMismatch {
                expected: "bdw".into(),
                found: "skl".into(),
            }),
            select_chipset(&sets, None).map(|_| ())
        );
    }

    #[test]
    fn requested_chipset_skips_others() {
        let sets = [on("BDW", "S"), on("SKL", "T"), on("SKL", "U")];

        match select_chipset(&sets, Some("SKL")) {
            Ok((chipset, batch)) => {
                assert_eq!("skl", chipset);
                assert_eq!(
                    vec!["T", "U"],
                    batch.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
                );
            }
            bad => panic!("expected batch: {:?}", bad),
        }
    }

    #[test]
    fn no_sets_for_chipset() {
        let sets = [on("BDW", "S")];

        assert_eq!(
            Err(GenError::NoMetricSets {
                chipset: "hsw".into()
            }),
            select_chipset(&sets, Some("hsw")).map(|_| ())
        );

        assert_eq!(
            Err(GenError::NoMetricSets {
                chipset: String::new()
            }),
            select_chipset(&Vec::<MetricSet>::new(), None).map(|_| ())
        );
    }

    #[test]
    fn header_declares_entry_point() {
        let header = render_header(&Assembler::new("bdw"));

        assert!(header.starts_with(&format!("/* {} */\n", BANNER)));
        assert!(header.contains("#ifndef OA_BDW_H\n#define OA_BDW_H\n"));
        assert!(header.contains("extern \"C\" {"));
        assert!(header.contains("void gputop_oa_add_metrics_bdw("));
        assert!(header.ends_with("#endif /* OA_BDW_H */\n"));
    }

    #[test]
    fn code_includes_preamble_and_sets() {
        let sets = [on("BDW", "S")];
        let batch: Vec<_> = sets.iter().collect();

        let generated = render("bdw", &batch, None).expect("render failed");

        assert!(generated.code.starts_with(&format!("/* {} */\n", BANNER)));
        assert!(generated.code.contains("#include \"oa-bdw.h\"\n"));
        assert!(generated
            .code
            .contains("#define MIN(a, b) (((a) < (b)) ? (a) : (b))\n"));
        assert!(generated
            .code
            .contains("#define MAX(a, b) (((a) > (b)) ? (a) : (b))\n"));
        assert!(generated
            .code
            .contains("static double\npercentage_max_callback_float("));
        assert!(generated
            .code
            .contains("static uint64_t\npercentage_max_callback_uint64("));
        assert!(generated.code.contains("\nadd_s_metric_set(struct"));
        assert!(generated.code.contains("\ngputop_oa_add_metrics_bdw(struct"));
    }

    #[test]
    fn generate_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bdw.xml");
        std::fs::write(&input, BDW_XML).unwrap();

        let opts = GenOptions {
            inputs: vec![input.clone(), input],
            header: Some(dir.path().join("oa-bdw.h")),
            code: Some(dir.path().join("oa-bdw.c")),
            xml_out: None,
            chipset: None,
        };

        let generated = generate(&opts).unwrap();

        // The duplicate input was read once.
        assert_eq!(1, generated.stats.sets);

        let code = std::fs::read_to_string(dir.path().join("oa-bdw.c")).unwrap();
        assert!(code.contains("tmp0 = devinfo->n_eus * 2;"));

        let header =
            std::fs::read_to_string(dir.path().join("oa-bdw.h")).unwrap();
        assert_eq!(generated.header, header);
    }

    #[test]
    fn failed_generation_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.xml");
        std::fs::write(&input, BDW_XML.replace("$EuCoresTotalCount", "$Unknown"))
            .unwrap();

        let opts = GenOptions {
            inputs: vec![input],
            code: Some(dir.path().join("oa-bdw.c")),
            ..Default::default()
        };

        assert!(generate(&opts).is_err());
        assert!(!dir.path().join("oa-bdw.c").exists());
    }

    #[test]
    fn failed_write_leaves_other_outputs_unwritten() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bdw.xml");
        std::fs::write(&input, BDW_XML).unwrap();

        let opts = GenOptions {
            inputs: vec![input],
            header: Some(dir.path().join("oa-bdw.h")),
            code: Some(dir.path().join("missing").join("oa-bdw.c")),
            ..Default::default()
        };

        assert!(generate(&opts).is_err());
        assert!(!dir.path().join("oa-bdw.h").exists());

        // Only the input remains; no staged file was left behind.
        assert_eq!(1, std::fs::read_dir(dir.path()).unwrap().count());
    }

    #[test]
    fn xml_out_requires_single_input() {
        let opts = GenOptions {
            inputs: vec!["a.xml".into(), "b.xml".into()],
            xml_out: Some("out.xml".into()),
            ..Default::default()
        };

        assert_eq!(
            Err(GenError::XmlOutMultipleInputs { count: 2 }),
            generate(&opts).map(|_| ())
        );
    }
}
