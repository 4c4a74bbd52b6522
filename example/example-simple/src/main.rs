#[macro_use]
extern crate log;

mod app;

pub fn main() {
    if let Err(e) = app::run(std::env::args().nth(1)) {
        eprintln!("example-simple failed: {:?}", e);
        std::process::exit(1);
    }
}
