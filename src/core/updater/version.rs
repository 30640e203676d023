/// `major.minor.patch` with missing components as zero. Each component
/// contributes its leading digits only, so `"2-beta"` reads as 2; ordering
/// of pre-release suffixes is not otherwise defined.
fn triple(raw: &str) -> [u64; 3] {
    let mut out = [0u64; 3];
    for (slot, part) in out.iter_mut().zip(raw.split('.')) {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        *slot = digits.parse().unwrap_or(0);
    }
    out
}

fn strip_prefix(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed.strip_prefix('v').unwrap_or(trimmed)
}

/// Whether `latest` is strictly newer than `current`. An empty current
/// version (first run) is older than anything.
pub fn is_newer(current: &str, latest: &str) -> bool {
    let current = strip_prefix(current);
    if current.is_empty() {
        return true;
    }
    triple(strip_prefix(latest)) > triple(current)
}

/// True only when a version was saved before and it differs from the
/// running one. A leading `v` on either side is ignored.
pub fn needs_reinstall(saved: Option<&str>, current: &str) -> bool {
    match saved.map(strip_prefix).filter(|s| !s.is_empty()) {
        Some(saved) => saved != strip_prefix(current),
        None => false,
    }
}
