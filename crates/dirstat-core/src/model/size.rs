/// Human-readable sizes and counts for summaries.
///
/// Totals are kept as `u64` bytes; floating point only appears here, at
/// the formatting boundary.
use super::entry::BLOCK_SIZE;

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Format a byte count with binary units, one decimal above bytes.
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Format an allocated-block count as bytes on disk.
pub fn format_blocks(blocks: u64) -> String {
    format_size(blocks.saturating_mul(BLOCK_SIZE))
}

/// Format a count with thousand separators.
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
