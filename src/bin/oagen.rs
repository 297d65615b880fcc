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

//! This is the OA metric set code generator.
//!
//! `oagen` reads metric set XML and writes the C declarations and
//!   definitions registering those sets with the runtime.

extern crate oagen;

use getopts::{Fail, Options};
use log::LevelFilter;
use oagen::gen::{generate, GenOptions};
use std::env;

/// Types of commands
#[derive(Debug, PartialEq)]
enum Command {
    Generate(GenOptions, LevelFilter),
    Usage,
}

/// Entrypoint for the generator
pub fn main() {
    let args: Vec<String> = env::args().collect();
    let program = &args[0];
    let opts = get_opts();
    let usage = opts.usage(&format!("Usage: {} [OPTIONS] XML...", program));

    match parse_options(opts, args.clone()) {
        Ok(Command::Generate(gen_opts, level)) => {
            env_logger::Builder::new()
                .filter_level(level)
                .parse_default_env()
                .init();

            if let Err(e) = generate(&gen_opts) {
                eprintln!("fatal: {}", e);
                std::process::exit(1);
            }
        }
        Ok(Command::Usage) => {
            println!("{}", usage);
            std::process::exit(exitcode::OK);
        }
        Err(e) => {
            eprintln!("{}", e);
            println!("{}", usage);
            std::process::exit(exitcode::USAGE);
        }
    }
}

/// Get 'Options'
fn get_opts() -> Options {
    let mut opts = Options::new();
    opts.optopt("", "header", "declarations file to write", "FILE");
    opts.optopt("", "code", "definitions file to write", "FILE");
    opts.optopt(
        "",
        "xml-out",
        "write the input annotated with MathML equations",
        "FILE",
    );
    opts.optopt("", "chipset", "generate only this chipset", "NAME");
    opts.optflagmulti("v", "verbose", "increase logging verbosity");
    opts.optflag("h", "help", "print this help menu");

    opts
}

/// Log level for the number of `-v` flags given.
fn verbosity(count: usize) -> LevelFilter {
    match count {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Option parser
fn parse_options(opts: Options, args: Vec<String>) -> Result<Command, Fail> {
    let matches = opts.parse(&args[1..])?;

    if matches.opt_present("h") {
        return Ok(Command::Usage);
    }

    if matches.free.is_empty() {
        return Err(Fail::OptionMissing(String::from("XML")));
    }

    let xml_out = matches.opt_str("xml-out");

    if xml_out.is_some() && matches.free.len() > 1 {
        return Err(Fail::UnexpectedArgument(String::from("--xml-out")));
    }

    Ok(Command::Generate(
        GenOptions {
            inputs: matches.free.iter().map(Into::into).collect(),
            header: matches.opt_str("header").map(Into::into),
            code: matches.opt_str("code").map(Into::into),
            xml_out: xml_out.map(Into::into),
            chipset: matches.opt_str("chipset"),
        },
        verbosity(matches.opt_count("v")),
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, Fail> {
        let args = std::iter::once("program")
            .chain(args.iter().copied())
            .map(String::from)
            .collect();

        parse_options(get_opts(), args)
    }

    #[test]
    fn parse_options_help() {
        match parse(&["-h"]) {
            Ok(Command::Usage) => {}
            bad => panic!("expected Usage: {:?}", bad),
        }

        match parse(&["--help"]) {
            Ok(Command::Usage) => {}
            bad => panic!("expected Usage: {:?}", bad),
        }
    }

    #[test]
    fn parse_options_invalid() {
        match parse(&["-q"]) {
            Err(Fail::UnrecognizedOption(_)) => {}
            bad => panic!("expected UnrecognizedOption: {:?}", bad),
        }
    }

    #[test]
    fn parse_options_missing_input() {
        match parse(&["--code", "oa-bdw.c"]) {
            Err(Fail::OptionMissing(message)) => assert_eq!("XML", message),
            bad => panic!("expected OptionMissing: {:?}", bad),
        }
    }

    #[test]
    fn parse_options_xml_out_single_input() {
        match parse(&["--xml-out", "out.xml", "a.xml", "b.xml"]) {
            Err(Fail::UnexpectedArgument(_)) => {}
            bad => panic!("expected UnexpectedArgument: {:?}", bad),
        }
    }

    #[test]
    fn parse_options_generate() {
        assert_eq!(
            Ok(Command::Generate(
                GenOptions {
                    inputs: vec!["a.xml".into(), "b.xml".into()],
                    header: Some("oa-bdw.h".into()),
                    code: Some("oa-bdw.c".into()),
                    xml_out: None,
                    chipset: Some("bdw".into()),
                },
                LevelFilter::Warn,
            )),
            parse(&[
                "--header", "oa-bdw.h", "--code", "oa-bdw.c", "--chipset",
                "bdw", "a.xml", "b.xml",
            ])
        );
    }

    #[test]
    fn parse_options_verbosity() {
        match parse(&["-vv", "a.xml"]) {
            Ok(Command::Generate(_, level)) => {
                assert_eq!(LevelFilter::Debug, level)
            }
            bad => panic!("expected Generate: {:?}", bad),
        }

        assert_eq!(LevelFilter::Trace, verbosity(5));
    }
}
