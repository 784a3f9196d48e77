//! Whitelisted memory-file writes.
//!
//! Only four relative paths are writable; everything else is rejected before
//! the filesystem is touched.  `notes.md` appends, the rest overwrite.

use std::io::Write as _;
use std::path::Path;

/// The only writable paths under the memory directory.
const ALLOWED_PATHS: &[&str] = &[
    "notes.md",
    "goals.json",
    "tool-reliability.json",
    "llm-calls.log.jsonl",
];

fn is_allowed(path: &str) -> bool {
    ALLOWED_PATHS.contains(&path)
}

/// Write `content` to one of the pre-approved memory files.
pub fn write_memory_file(memory_dir: &Path, path: &str, content: &str) -> String {
    if !is_allowed(path) {
        return format!("Security error: Cannot write to {path}");
    }

    let result = (|| -> std::io::Result<()> {
        std::fs::create_dir_all(memory_dir)?;
        let target = memory_dir.join(path);
        if path == "notes.md" {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(target)?;
            file.write_all(content.as_bytes())?;
        } else {
            std::fs::write(target, content)?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => format!("Wrote to memory/{path} successfully"),
        Err(e) => format!("Write error: {e}"),
    }
}
