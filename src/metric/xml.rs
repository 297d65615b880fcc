// Metric set XML reader
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

//! Reader for metric set XML.
//!
//! The input is a document containing any number of `<set>` elements
//!   (at any depth),
//!     each holding `<counter>` and `<register_config>` children:
//!
//! ```xml
//! <metrics>
//!   <set name="Render Metrics Basic" chipset="BDW"
//!        symbol_name="RenderBasic" underscore_name="render_basic"
//!        hw_config_guid="b541bd57-0e0f-4154-b4c0-5858010a2bf7">
//!     <counter name="GPU Time Elapsed" symbol_name="GpuTime"
//!              underscore_name="gpu_time" data_type="uint64"
//!              semantic_type="duration" units="ns"
//!              equation="GPU_TIME 0 READ 1000000000 UMUL $GpuTimestampFrequency UDIV"/>
//!     <register_config type="NOA" availability="$SliceMask 0x01 AND">
//!       <register address="0x9888" value="0x143f000f"/>
//!     </register_config>
//!   </set>
//! </metrics>
//! ```
//!
//! Elements within `<counter>` and `<register>` are skipped,
//!   which allows reading XML previously annotated by
//!   [`annotate`](crate::annotate).
//! Unknown attributes are ignored.

use super::{Counter, DataType, MetricSet, Register, RegisterConfig, RegisterType};
use crate::error::{GenError, GenResult};
use fxhash::FxHashMap;
use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::convert::TryFrom;
use std::io::BufRead;

type Attrs = FxHashMap<String, String>;

/// Wrapper around [`quick_xml::Reader`] producing [`MetricSet`]s.
pub struct MetricsReader<B>
where
    B: BufRead,
{
    /// Source XML reader.
    reader: Reader<B>,

    /// Internal buffer for [`Reader`].
    buffer: Vec<u8>,

    /// Buffer for skipping unneeded child elements.
    ///
    /// This buffer exists to work around ownership rules.
    sub_buffer: Vec<u8>,
}

impl<B> MetricsReader<B>
where
    B: BufRead,
{
    /// Construct a new reader.
    pub fn new(reader: B) -> Self {
        let mut reader = Reader::from_reader(reader);
        reader.trim_text(true);

        Self {
            reader,
            buffer: Vec::new(),
            sub_buffer: Vec::new(),
        }
    }

    /// Read every metric set in the document,
    ///   in document order.
    ///
    /// Errors
    /// ======
    /// - [`GenError::Xml`] if the document is not well-formed.
    /// - [`GenError::MissingAttribute`] if a required attribute is
    ///     absent.
    /// - [`GenError::UnknownDataType`] and
    ///     [`GenError::UnknownRegisterType`] for unrecognized type
    ///     attributes.
    /// - [`GenError::DuplicateCounter`] if two counters of a set share a
    ///     symbol name.
    pub fn read_sets(mut self) -> GenResult<Vec<MetricSet>> {
        let mut sets = Vec::new();
        let mut set: Option<MetricSet> = None;
        let mut config: Option<RegisterConfig> = None;

        loop {
            self.buffer.clear();
            self.sub_buffer.clear();

            match self.reader.read_event_into(&mut self.buffer)? {
                Event::Start(ele) => match ele.name().as_ref() {
                    b"set" => set = Some(Self::process_set(&ele)?),

                    b"counter" => {
                        Self::process_counter(set.as_mut(), &ele)?;
                        self.reader
                            .read_to_end_into(ele.name(), &mut self.sub_buffer)?;
                    }

                    b"register_config" => {
                        config = Self::process_config(set.as_ref(), &ele)?;
                    }

                    b"register" => {
                        Self::process_register(config.as_mut(), &ele)?;
                        self.reader
                            .read_to_end_into(ele.name(), &mut self.sub_buffer)?;
                    }

                    // Descend into anything else looking for sets.
                    _ => (),
                },

                Event::Empty(ele) => match ele.name().as_ref() {
                    b"set" => sets.push(Self::process_set(&ele)?),
                    b"counter" => Self::process_counter(set.as_mut(), &ele)?,
                    b"register_config" => {
                        let empty = Self::process_config(set.as_ref(), &ele)?;

                        if let (Some(set), Some(config)) = (set.as_mut(), empty)
                        {
                            set.register_configs.push(config);
                        }
                    }
                    b"register" => {
                        Self::process_register(config.as_mut(), &ele)?
                    }
                    _ => (),
                },

                Event::End(ele) => match ele.name().as_ref() {
                    b"set" => sets.extend(set.take()),
                    b"register_config" => {
                        if let (Some(set), Some(config)) =
                            (set.as_mut(), config.take())
                        {
                            set.register_configs.push(config);
                        }
                    }
                    _ => (),
                },

                Event::Eof => break,

                _ => (),
            }
        }

        Ok(sets)
    }

    /// Process `set` element attributes.
    fn process_set(ele: &BytesStart) -> GenResult<MetricSet> {
        let mut attrs = collect_attrs(ele)?;
        let name = required(&mut attrs, "set", "name", || String::new())?;
        let ctx = || format!("set `{}`", name);

        Ok(MetricSet {
            chipset: required(&mut attrs, "set", "chipset", ctx)?,
            symbol_name: required(&mut attrs, "set", "symbol_name", ctx)?,
            underscore_name: required(
                &mut attrs,
                "set",
                "underscore_name",
                ctx,
            )?,
            hw_config_guid: optional(&mut attrs, "hw_config_guid")
                .or_else(|| optional(&mut attrs, "guid")),
            counters: vec![],
            register_configs: vec![],
            name,
        })
    }

    /// Process `counter` element attributes,
    ///   appending the counter to `set`.
    ///
    /// Counters outside of a set are ignored.
    fn process_counter(
        set: Option<&mut MetricSet>,
        ele: &BytesStart,
    ) -> GenResult<()> {
        let set = match set {
            Some(set) => set,
            None => {
                warn!("ignoring `counter` outside of a `set`");
                return Ok(());
            }
        };

        let mut attrs = collect_attrs(ele)?;
        let name = required(&mut attrs, "counter", "name", || {
            format!("set `{}`", set.name)
        })?;
        let ctx = || format!("`{}` :: `{}`", set.name, name);

        let data_type_str = required(&mut attrs, "counter", "data_type", ctx)?;
        let data_type = DataType::try_from(data_type_str.as_str()).map_err(
            |data_type| GenError::UnknownDataType {
                set: set.name.clone(),
                counter: name.clone(),
                data_type,
            },
        )?;

        let counter = Counter {
            symbol_name: required(&mut attrs, "counter", "symbol_name", ctx)?,
            underscore_name: required(
                &mut attrs,
                "counter",
                "underscore_name",
                ctx,
            )?,
            equation: required(&mut attrs, "counter", "equation", ctx)?,
            semantic_type: required(
                &mut attrs,
                "counter",
                "semantic_type",
                ctx,
            )?,
            description: attrs.remove("description").unwrap_or_default(),
            units: optional(&mut attrs, "units"),
            max_equation: optional(&mut attrs, "max_equation"),
            availability: optional(&mut attrs, "availability"),
            data_type,
            name,
        };

        if set
            .counters
            .iter()
            .any(|c| c.symbol_name == counter.symbol_name)
        {
            return Err(GenError::DuplicateCounter {
                set: set.name.clone(),
                counter: counter.symbol_name,
            });
        }

        set.counters.push(counter);

        Ok(())
    }

    /// Process `register_config` element attributes.
    ///
    /// Configs outside of a set yield [`None`].
    fn process_config(
        set: Option<&MetricSet>,
        ele: &BytesStart,
    ) -> GenResult<Option<RegisterConfig>> {
        let set = match set {
            Some(set) => set,
            None => {
                warn!("ignoring `register_config` outside of a `set`");
                return Ok(None);
            }
        };

        let mut attrs = collect_attrs(ele)?;
        let ty_str = required(&mut attrs, "register_config", "type", || {
            format!("set `{}`", set.name)
        })?;

        let ty = RegisterType::try_from(ty_str.as_str()).map_err(|ty| {
            GenError::UnknownRegisterType {
                set: set.name.clone(),
                ty,
            }
        })?;

        Ok(Some(RegisterConfig {
            ty,
            availability: optional(&mut attrs, "availability"),
            registers: vec![],
        }))
    }

    /// Process `register` element attributes,
    ///   appending the register to `config`.
    fn process_register(
        config: Option<&mut RegisterConfig>,
        ele: &BytesStart,
    ) -> GenResult<()> {
        let config = match config {
            Some(config) => config,
            None => {
                warn!("ignoring `register` outside of a `register_config`");
                return Ok(());
            }
        };

        let mut attrs = collect_attrs(ele)?;
        let ctx = || format!("{} register config", config.ty);

        config.registers.push(Register {
            address: required(&mut attrs, "register", "address", ctx)?,
            value: required(&mut attrs, "register", "value", ctx)?,
        });

        Ok(())
    }
}

/// Unescape all attributes of `ele` into an owned map.
fn collect_attrs(ele: &BytesStart) -> GenResult<Attrs> {
    let mut attrs = Attrs::default();

    for attr in ele.attributes() {
        let attr = attr?;

        attrs.insert(
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            attr.unescape_value()?.into_owned(),
        );
    }

    Ok(attrs)
}

fn required<F>(
    attrs: &mut Attrs,
    element: &'static str,
    attr: &'static str,
    context: F,
) -> GenResult<String>
where
    F: FnOnce() -> String,
{
    attrs.remove(attr).ok_or_else(|| GenError::MissingAttribute {
        element,
        attr,
        context: context(),
    })
}

/// Optional attributes treat an empty value as absent.
fn optional(attrs: &mut Attrs, attr: &str) -> Option<String> {
    attrs.remove(attr).filter(|value| !value.trim().is_empty())
}
