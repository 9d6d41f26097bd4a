//! Size estimate formatting.
//!
//! The estimate text is parsed by people, not machines, but its layout is
//! stable so clients can show it verbatim.

// ============================================================================
// Estimate Figures
// ============================================================================

/// Rough token count for a packed file: one token per four bytes, rounded up.
pub fn estimate_tokens(bytes: u64) -> u64 {
    bytes.div_ceil(4)
}

/// Size in kibibytes with two decimals.
pub fn format_kb(bytes: u64) -> String {
    format_hundredths(bytes, 1024)
}

/// Size in mebibytes with two decimals.
pub fn format_mb(bytes: u64) -> String {
    format_hundredths(bytes, 1024 * 1024)
}

/// `bytes / unit` to two decimals, ties rounded up (`0.125` → `0.13`).
///
/// Float formatting rounds ties to even, which disagrees with how clients
/// render the same figures.
fn format_hundredths(bytes: u64, unit: u64) -> String {
    let scaled = u128::from(bytes) * 100;
    let unit = u128::from(unit);
    let mut hundredths = scaled / unit;
    if (scaled % unit) * 2 >= unit {
        hundredths += 1;
    }
    format!("{}.{:02}", hundredths / 100, hundredths % 100)
}

/// Group digits in threes: `1349` → `1,349`.
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Render the `pack-estimate` summary for an output file of `bytes` bytes.
///
/// `compress` echoes what the caller asked for; the output itself is never
/// inspected.
pub fn format_estimate(bytes: u64, compress: bool) -> String {
    format!(
        "Repomix output size estimate:\n\
         - Size: {} KB ({} MB)\n\
         - Estimated tokens: ~{}\n\
         - Compression: {}\n\
         \n\
         Use the repomix tool with these same parameters to retrieve the actual content.",
        format_kb(bytes),
        format_mb(bytes),
        format_thousands(estimate_tokens(bytes)),
        if compress { "enabled" } else { "disabled" },
    )
}
