//! 分块大小消融实验.
//!
//! 在同一合成序列上以不同的分块大小运行完整分析, 比较耗时,
//! 并检查结果与不分块时完全一致.

mod profile;
mod result;
mod runner;

use std::error::Error;

use log::LevelFilter;
use simple_logger::SimpleLogger;

fn main() -> Result<(), Box<dyn Error>> {
    SimpleLogger::new().with_level(LevelFilter::Info).init()?;
    runner::run()?.analyze()?;
    Ok(())
}
