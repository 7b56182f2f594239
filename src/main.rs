use aventa::{assemble, link, Parser, StdinSource, Vm};
use clap::{App, Arg, ArgMatches};
use std::process::exit;
use std::time::Instant;

fn args() -> ArgMatches {
    App::new("aventa")
        .about("a lightweight toolchain and stack machine for the aventa lumen instruction set")
        .version("0.1.0")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .takes_value(true)
                .required(true)
                .help("aventa lumen source file to run"),
        )
        .arg(
            Arg::new("ir")
                .short('i')
                .long("ir")
                .takes_value(false)
                .required(false)
                .help("prints the parsed instruction sequence instead of executing"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .takes_value(false)
                .required(false)
                .help("prints each executed operation to stderr"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .takes_value(false)
                .required(false)
                .help("suppresses stage banners and timing output"),
        )
        .get_matches()
}

fn main() {
    let args = args();
    let file_name = args.value_of("file").unwrap();
    let ir = args.is_present("ir");
    let debug = args.is_present("debug");
    let quiet = args.is_present("quiet");

    let parser = match Parser::from_file(file_name) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("[parse-error] {}", err);
            exit(1);
        }
    };
    let instructions = match parser.parse() {
        Ok(content) => content,
        Err(err) => {
            eprintln!("[parse-error] {}", err);
            exit(1);
        }
    };
    if !quiet {
        println!("[parser] complete");
    }

    if ir {
        for instruction in &instructions {
            println!("{:?}", instruction);
        }
        return;
    }

    let unit = assemble(instructions);
    if !quiet {
        println!("[assembler] complete");
    }

    let program = match link(unit) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("[link-error] {}", err);
            exit(1);
        }
    };
    if !quiet {
        println!("[linker] complete");
    }

    let start = Instant::now();
    let mut vm = Vm::new(program, Box::new(StdinSource::new()), debug);
    if let Err(err) = vm.run() {
        eprintln!("[runtime-error] {}", err);
        exit(1);
    }
    if !quiet {
        println!(
            "[runtime] complete in {} ms ({} ns)",
            start.elapsed().as_millis(),
            start.elapsed().as_nanos()
        );
    }

    for line in vm.output() {
        println!("{}", line);
    }
}
