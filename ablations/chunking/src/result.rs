//! 实验结果.

use std::io::{self, Write};
use std::path::PathBuf;

use spot_berry::pipeline::Stage;

use crate::profile::Profile;

/// 将 `p` 的结果写进 `w` 中.
fn describe_into<W: Write>(p: &Profile, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Chunk size {}:", p.chunk_size())?;
    writeln!(w, "{S4}Detection: {} us", p.stage_us(Stage::Detect))?;
    writeln!(w, "{S4}Tracking: {} us", p.stage_us(Stage::Track))?;
    writeln!(w, "{S4}Extraction: {} us", p.stage_us(Stage::Extract))?;
    writeln!(w, "{S4}Total machine time: {} us", p.real_time_us())?;
    writeln!(w, "{S4}Spot voxels: {}", p.voxels())?;
    writeln!(w, "{S4}Tracks: {}", p.tracks())?;
    write!(
        w,
        "{S4}Matches single chunk: {}",
        if p.consistent() { "yes" } else { "NO" }
    )
}

/// 消融实验最终结果.
pub struct AblationResult {
    archive: PathBuf,
    archive_ok: bool,
    data: Vec<Profile>,
}

impl AblationResult {
    pub fn new(archive: PathBuf, archive_ok: bool, data: Vec<Profile>) -> Self {
        Self {
            archive,
            archive_ok,
            data,
        }
    }

    /// 输出运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut w = stdout.lock();

        utils::sep_to(&mut w)?;
        writeln!(
            w,
            "Archive {}: {}",
            self.archive.display(),
            if self.archive_ok { "reloaded intact" } else { "MISMATCH" }
        )?;
        utils::sep_to(&mut w)?;
        for profile in self.data.iter() {
            describe_into(profile, &mut w)?;
            writeln!(w)?;
            utils::sep_to(&mut w)?;
        }
        Ok(())
    }
}
