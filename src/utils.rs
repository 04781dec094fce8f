//! # Shared Value Parsing Helpers
//!
//! Small parsing routines shared by `cli.rs`'s value-parsers and anything
//! else that needs the same literal shapes: a bare-or-suffixed duration
//! (`--time-limit`, `--faults-interval`, `--timeout`) and the `--concurrency
//! <n|"Mn">` multiplier syntax, where `Mn` means `M × node-count`.

use std::time::Duration;

/// Parses `"500ms"`, `"5s"`, `"2m"`, `"1h"`, or a bare number (seconds).
/// Shared by every duration-shaped CLI flag rather than reimplemented per
/// flag.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Some(digits) = s.strip_suffix("ms") {
        return digits.parse::<u64>().map(Duration::from_millis).map_err(|e| format!("invalid duration {s:?}: {e}"));
    }
    if let Some(digits) = s.strip_suffix('h') {
        return digits.parse::<u64>().map(|h| Duration::from_secs(h * 3600)).map_err(|e| format!("invalid duration {s:?}: {e}"));
    }
    if let Some(digits) = s.strip_suffix('m') {
        return digits.parse::<u64>().map(|m| Duration::from_secs(m * 60)).map_err(|e| format!("invalid duration {s:?}: {e}"));
    }
    if let Some(digits) = s.strip_suffix('s') {
        return digits.parse::<f64>().map(Duration::from_secs_f64).map_err(|e| format!("invalid duration {s:?}: {e}"));
    }
    s.parse::<f64>().map(Duration::from_secs_f64).map_err(|e| format!("invalid duration {s:?}: {e}"))
}

/// `--concurrency`: either a bare integer or an `"Mn"` multiplier (e.g.
/// `"2n"` = `2 * node_count`). Resolved once `node_count` is known, so this
/// returns a small enum rather than the resolved integer directly — the CLI
/// layer parses the flag before it necessarily knows `node_count` if the
/// flags arrive in the other order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Concurrency {
    Fixed(usize),
    PerNode(usize),
}

impl Concurrency {
    pub fn resolve(self, node_count: usize) -> usize {
        match self {
            Concurrency::Fixed(n) => n,
            Concurrency::PerNode(multiplier) => multiplier.saturating_mul(node_count).max(1),
        }
    }
}

pub fn parse_concurrency(s: &str) -> Result<Concurrency, String> {
    let s = s.trim();
    if let Some(digits) = s.strip_suffix('n') {
        return digits
            .parse::<usize>()
            .map(Concurrency::PerNode)
            .map_err(|e| format!("invalid concurrency multiplier {s:?}: {e}"));
    }
    s.parse::<usize>().map(Concurrency::Fixed).map_err(|e| format!("invalid concurrency {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_bare_seconds() {
        assert_eq!(parse_duration("5").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn parse_duration_accepts_all_suffixes() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("3m").unwrap(), Duration::from_secs(180));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn parse_concurrency_resolves_fixed_and_per_node() {
        assert_eq!(parse_concurrency("8").unwrap().resolve(5), 8);
        assert_eq!(parse_concurrency("2n").unwrap().resolve(5), 10);
    }

    #[test]
    fn parse_concurrency_rejects_garbage() {
        assert!(parse_concurrency("abc").is_err());
    }
}
