// MathML annotation of metric set XML
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

//! Copy metric set XML,
//!   attaching a MathML rendering of each counter equation.
//!
//! Every `<counter>` receives a `<mathml_EQ>` child and,
//!   if it has a max equation,
//!   a `<mathml_MAX_EQ>` child.
//! Existing `mathml_*` children are dropped first,
//!   so annotating already-annotated input yields the same output.
//!
//! Everything else is copied through,
//!   re-indented by two spaces per level.

use crate::error::{EquationCtx, GenResult};
use crate::metric::MetricSet;
use crate::rpn::mathml::{is_annotation_element, Annotation};
use crate::symtab::SymbolTable;
use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::io::{BufRead, Write};

/// Streaming rewrite of a metric set document.
///
/// `sets` must be the sets read from the same document by
///   [`MetricsReader`](crate::metric::MetricsReader),
///     which are matched to `<set>` and `<counter>` elements by position.
pub struct Annotator<'a, B, W>
where
    B: BufRead,
    W: Write,
{
    reader: Reader<B>,
    writer: Writer<W>,
    buffer: Vec<u8>,
    symtabs: Vec<SymbolTable<'a>>,

    /// Index of the open `<set>`,
    ///   if any.
    set: Option<usize>,
    next_set: usize,
    next_counter: usize,
}

impl<'a, B, W> Annotator<'a, B, W>
where
    B: BufRead,
    W: Write,
{
    pub fn new(src: B, dest: W, sets: &'a [MetricSet]) -> Self {
        let mut reader = Reader::from_reader(src);
        reader.trim_text(true);

        Self {
            reader,
            writer: Writer::new_with_indent(dest, b' ', 2),
            buffer: Vec::new(),
            symtabs: sets.iter().map(SymbolTable::new).collect(),
            set: None,
            next_set: 0,
            next_counter: 0,
        }
    }

    /// Rewrite the entire document,
    ///   yielding the destination.
    pub fn annotate(mut self) -> GenResult<W> {
        loop {
            self.buffer.clear();

            let event = self.reader.read_event_into(&mut self.buffer)?.into_owned();

            match event {
                Event::Start(ele) if ele.name().as_ref() == b"set" => {
                    self.set = Some(self.next_set);
                    self.next_set += 1;
                    self.next_counter = 0;
                    self.writer.write_event(Event::Start(ele))?;
                }

                Event::Empty(ele) if ele.name().as_ref() == b"set" => {
                    self.next_set += 1;
                    self.writer.write_event(Event::Empty(ele))?;
                }

                Event::End(ele) if ele.name().as_ref() == b"set" => {
                    self.set = None;
                    self.writer.write_event(Event::End(ele))?;
                }

                Event::Start(ele) if ele.name().as_ref() == b"counter" => {
                    self.counter(ele, false)?
                }

                Event::Empty(ele) if ele.name().as_ref() == b"counter" => {
                    self.counter(ele, true)?
                }

                Event::Eof => break,

                other => self.writer.write_event(other)?,
            }
        }

        Ok(self.writer.into_inner())
    }

    /// Copy a counter element,
    ///   replacing its annotations.
    ///
    /// Empty elements are expanded to hold the annotations.
    fn counter(&mut self, start: BytesStart<'static>, empty: bool) -> GenResult<()> {
        let annotations = self.annotations()?;

        self.writer.write_event(Event::Start(start.borrow()))?;

        if !empty {
            self.copy_children()?;
        }

        for annotation in annotations {
            annotation.write(&mut self.writer)?;
        }

        self.writer.write_event(Event::End(start.to_end()))?;

        Ok(())
    }

    /// Annotations of the next counter of the open set.
    fn annotations(&mut self) -> GenResult<Vec<Annotation>> {
        let index = self.next_counter;
        self.next_counter += 1;

        let symtab = match self.set.and_then(|i| self.symtabs.get(i)) {
            Some(symtab) => symtab,
            None => {
                warn!("leaving `counter` outside of a known `set` unannotated");
                return Ok(vec![]);
            }
        };

        let set = symtab.set();
        let counter = match set.counters.get(index) {
            Some(counter) => counter,
            None => return Ok(vec![]),
        };

        let annotation = |label, equation: &str| {
            Annotation::new(label, equation, symtab).map_err(|e| {
                EquationCtx::new(&set.name, &counter.name, equation).wrap(e)
            })
        };

        let mut annotations = vec![annotation(Annotation::EQ, &counter.equation)?];

        if let Some(max) = &counter.max_equation {
            annotations.push(annotation(Annotation::MAX_EQ, max)?);
        }

        Ok(annotations)
    }

    /// Copy the children of the open counter up to its end tag,
    ///   dropping annotations.
    fn copy_children(&mut self) -> GenResult<()> {
        let mut depth = 0usize;

        loop {
            self.buffer.clear();

            let event = self.reader.read_event_into(&mut self.buffer)?.into_owned();

            match event {
                Event::Start(ele) if is_annotation_element(ele.name().as_ref()) => {
                    self.buffer.clear();
                    self.reader.read_to_end_into(ele.name(), &mut self.buffer)?;
                }

                Event::Empty(ele) if is_annotation_element(ele.name().as_ref()) => (),

                Event::Start(ele) => {
                    depth += 1;
                    self.writer.write_event(Event::Start(ele))?;
                }

                Event::End(_) if depth == 0 => return Ok(()),

                Event::End(ele) => {
                    depth -= 1;
                    self.writer.write_event(Event::End(ele))?;
                }

                Event::Eof => return Ok(()),

                other => self.writer.write_event(other)?,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::GenError;
    use crate::metric::MetricsReader;
    use crate::rpn::EquationError;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<metrics>
  <!-- sample -->
  <set name="S" chipset="BDW" symbol_name="S" underscore_name="s">
    <counter name="Threads" symbol_name="Threads" underscore_name="threads"
             data_type="uint64" semantic_type="event"
             description="Threads dispatched"
             equation="$EuCoresTotalCount 2 UMUL"/>
    <counter name="Busy" symbol_name="Busy" underscore_name="busy"
             data_type="float" semantic_type="duration"
             max_equation="100" equation="$Threads 2 FDIV">
      <mathml_EQ><mi>stale</mi></mathml_EQ>
      <note>kept</note>
    </counter>
  </set>
</metrics>"#;

    fn annotate(xml: &str) -> GenResult<String> {
        let sets = MetricsReader::new(xml.as_bytes()).read_sets()?;
        let out = Annotator::new(xml.as_bytes(), Vec::new(), &sets).annotate()?;

        Ok(String::from_utf8(out).expect("invalid utf-8"))
    }

    #[test]
    fn annotates_every_counter() {
        let out = annotate(SAMPLE).expect("annotate failed");

        assert_eq!(2, out.matches("<mathml_EQ>").count());
        assert_eq!(1, out.matches("<mathml_MAX_EQ>").count());
        assert!(out.contains("<mi>EQ</mi>"));
        assert!(out.contains("<mi>MAX_EQ</mi>"));
        assert!(out.contains("<mtext>Threads dispatched</mtext>"));
        assert!(out.contains("<mn>100</mn>"));
    }

    #[test]
    fn replaces_stale_annotations() {
        let out = annotate(SAMPLE).expect("annotate failed");

        assert!(!out.contains("stale"));
        assert!(out.contains("<note>kept</note>"));
        assert!(out.contains("<!-- sample -->"));
    }

    #[test]
    fn annotation_is_idempotent() {
        let once = annotate(SAMPLE).expect("first pass failed");
        let twice = annotate(&once).expect("second pass failed");

        assert_eq!(once, twice);
    }

    #[test]
    fn annotated_output_reads_back_identically() {
        let once = annotate(SAMPLE).expect("annotate failed");

        assert_eq!(
            MetricsReader::new(SAMPLE.as_bytes()).read_sets(),
            MetricsReader::new(once.as_bytes()).read_sets(),
        );
    }

    #[test]
    fn malformed_equation_names_counter() {
        let xml = r#"<set name="S" chipset="BDW" symbol_name="S" underscore_name="s">
            <counter name="Bad" symbol_name="Bad" underscore_name="bad"
                     data_type="uint64" semantic_type="event" equation="1 2"/>
          </set>"#;

        match annotate(xml) {
            Err(GenError::Equation { ctx, err }) => {
                assert_eq!("Bad", ctx.counter);
                assert_eq!(EquationError::MalformedEquation { depth: 2 }, err);
            }
            bad => panic!("expected Equation error: {:?}", bad),
        }
    }
}
