//! Rotating file example.
//!
//! Writes enough records with a 1KB cut size to produce several segments
//! for today's date.

use relaylog::log_info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;

    let service = relaylog::builder()
        .with_console(true)
        .with_directory(temp_dir.path())
        .with_file("rotation", "demo", 1024u64)
        .build()?;

    let log = service.get_logger("rotation");
    for i in 0..100 {
        log_info!(log, "Log message number {}", i)?;
    }
    service.shutdown()?;

    let mut segments: Vec<_> = std::fs::read_dir(temp_dir.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    segments.sort();
    for segment in segments {
        println!("created {}", segment);
    }

    Ok(())
}
