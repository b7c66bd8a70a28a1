//! Archive example.
//!
//! Writes a few segments, bundles everything up to today into
//! `{YYYYMMDD}.tar.gz` and restores it again.

use relaylog::{Archiver, LogDir, cutoff_days_ago, log_info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let dir = LogDir::setup(temp_dir.path())?;

    let service = relaylog::builder()
        .with_console(false)
        .with_directory(dir.path())
        .with_file("archive", "demo", 512u64)
        .build()?;
    let log = service.get_logger("archive");
    for i in 0..50 {
        log_info!(log, "record {}", i)?;
    }
    service.shutdown()?;

    let archiver = Archiver::new(&dir);
    let today = cutoff_days_ago(0);

    let report = archiver.compress("archive_", today)?;
    println!(
        "compressed {} files into {:?}",
        report.files.len(),
        report.archive
    );

    let restored = archiver.decompress(today)?;
    println!("restored {} files", restored.files.len());

    Ok(())
}
