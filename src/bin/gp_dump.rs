//! Thin CLI wrapper: reads a tab file from a path argument (or stdin) and
//! dumps the decoded song model.

extern crate env_logger;
extern crate gp_decoder;

use std::env;
use std::fs;
use std::io::{self, Read};

fn main() {
    env_logger::init();

    let path = env::args().nth(1);
    let data = match &path {
        Some(p) => fs::read(p).expect("failed to read input file"),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).expect("failed to read stdin");
            buf
        }
    };

    match gp_decoder::parse_with_limits(&data, path.as_deref(), &gp_decoder::DecodeLimits::default()) {
        Ok(song) => println!("{:#?}", song),
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    }
}
