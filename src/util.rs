use chrono::Local;
use fern::Dispatch;
use std::path::Path;

/// Initialize logger function
pub fn setup_logger<P: AsRef<Path>>(
    level: log::LevelFilter,
    log_file_path: P,
) -> Result<(), fern::InitError> {
    Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(fern::log_file(log_file_path)?)
        .apply()?;
    Ok(())
}

/// Strict lowercase hex: non-empty, even length, `[0-9a-f]` only.
pub fn is_lowercase_hex(s: &str) -> bool {
    !s.is_empty()
        && s.len() % 2 == 0
        && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// A SHA-256 digest rendered as exactly 64 lowercase hex characters.
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && is_lowercase_hex(s)
}
