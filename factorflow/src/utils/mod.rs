use std::path::PathBuf;

pub mod panic;
pub mod thread;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

pub fn get_work_space() -> std::io::Result<PathBuf> {
    std::env::current_dir()
}
