/// Risk scoring for submitted commands.
///
/// The session only consumes the `RiskAssessor` trait; the bundled
/// heuristic is a deliberately conservative pattern table. A deployment
/// that scores server-side keeps this as the defense-in-depth layer.
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Anything above `Low` requires an explicit approval before the
    /// executor may see the command.
    pub fn requires_confirmation(self) -> bool {
        self > RiskLevel::Low
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub reasons: Vec<String>,
}

impl RiskAssessment {
    pub fn low() -> Self {
        Self {
            level: RiskLevel::Low,
            reasons: Vec::new(),
        }
    }
}

pub trait RiskAssessor: Send + Sync {
    fn assess(&self, command: &str) -> RiskAssessment;
}

/// Pattern rule: substring match against the normalized command line.
struct Rule {
    needle: &'static str,
    level: RiskLevel,
    reason: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        needle: "rm -rf",
        level: RiskLevel::High,
        reason: "recursive delete",
    },
    Rule {
        needle: "rm -fr",
        level: RiskLevel::High,
        reason: "recursive delete",
    },
    Rule {
        needle: "mkfs",
        level: RiskLevel::Critical,
        reason: "filesystem format",
    },
    Rule {
        needle: "dd if=",
        level: RiskLevel::High,
        reason: "raw block copy",
    },
    Rule {
        needle: "of=/dev/",
        level: RiskLevel::Critical,
        reason: "raw write to a device node",
    },
    Rule {
        needle: "> /dev/sd",
        level: RiskLevel::Critical,
        reason: "raw write to a device node",
    },
    Rule {
        needle: ":(){ :|:& };:",
        level: RiskLevel::Critical,
        reason: "fork bomb",
    },
    Rule {
        needle: "shutdown",
        level: RiskLevel::High,
        reason: "host shutdown",
    },
    Rule {
        needle: "reboot",
        level: RiskLevel::High,
        reason: "host reboot",
    },
    Rule {
        needle: "poweroff",
        level: RiskLevel::High,
        reason: "host shutdown",
    },
    Rule {
        needle: "halt",
        level: RiskLevel::High,
        reason: "host shutdown",
    },
    Rule {
        needle: "shred",
        level: RiskLevel::High,
        reason: "unrecoverable file destruction",
    },
    Rule {
        needle: "chmod 777",
        level: RiskLevel::Moderate,
        reason: "world-writable permissions",
    },
    Rule {
        needle: "chmod -r 777",
        level: RiskLevel::Moderate,
        reason: "recursive world-writable permissions",
    },
    Rule {
        needle: "| sh",
        level: RiskLevel::High,
        reason: "pipes a stream into a shell",
    },
    Rule {
        needle: "| bash",
        level: RiskLevel::High,
        reason: "pipes a stream into a shell",
    },
    Rule {
        needle: "sudo ",
        level: RiskLevel::Moderate,
        reason: "privilege escalation",
    },
    Rule {
        needle: "push --force",
        level: RiskLevel::Moderate,
        reason: "remote history rewrite",
    },
    Rule {
        needle: "truncate -s 0",
        level: RiskLevel::Moderate,
        reason: "file truncation",
    },
];

/// A recursive delete whose target token is the root itself, not a path
/// underneath it.
fn targets_filesystem_root(normalized: &str) -> bool {
    ["rm -rf", "rm -fr"].iter().any(|flags| {
        normalized
            .split_once(flags)
            .map(|(_, rest)| rest.split_whitespace().any(|tok| tok == "/"))
            .unwrap_or(false)
    })
}

/// Default assessor: scans the rule table, collects every matching reason
/// in table order, and reports the highest matched level.
#[derive(Debug, Default)]
pub struct HeuristicAssessor;

impl RiskAssessor for HeuristicAssessor {
    fn assess(&self, command: &str) -> RiskAssessment {
        let normalized = command.trim().to_lowercase();
        let mut level = RiskLevel::Low;
        let mut reasons = Vec::new();
        for rule in RULES {
            if normalized.contains(rule.needle) {
                if rule.level > level {
                    level = rule.level;
                }
                if !reasons.iter().any(|r| r == rule.reason) {
                    reasons.push(rule.reason.to_string());
                }
            }
        }
        if targets_filesystem_root(&normalized) {
            level = RiskLevel::Critical;
            reasons.insert(0, "recursive delete at filesystem root".to_string());
        }
        RiskAssessment { level, reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_commands_are_low_risk() {
        let assessor = HeuristicAssessor;
        let assessment = assessor.assess("ls -la");
        assert_eq!(assessment.level, RiskLevel::Low);
        assert!(assessment.reasons.is_empty());
        assert!(!assessment.level.requires_confirmation());
    }

    #[test]
    fn recursive_delete_is_high_with_reason() {
        let assessor = HeuristicAssessor;
        let assessment = assessor.assess("rm -rf /tmp/x");
        assert_eq!(assessment.level, RiskLevel::High);
        assert_eq!(assessment.reasons, vec!["recursive delete".to_string()]);
    }

    #[test]
    fn root_delete_escalates_to_critical() {
        let assessor = HeuristicAssessor;
        let assessment = assessor.assess("rm -rf / --no-preserve-root");
        assert_eq!(assessment.level, RiskLevel::Critical);
    }

    #[test]
    fn highest_matched_level_wins_and_reasons_accumulate() {
        let assessor = HeuristicAssessor;
        let assessment = assessor.assess("sudo mkfs.ext4 /dev/sda1");
        assert_eq!(assessment.level, RiskLevel::Critical);
        assert!(assessment
            .reasons
            .contains(&"filesystem format".to_string()));
        assert!(assessment
            .reasons
            .contains(&"privilege escalation".to_string()));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let assessor = HeuristicAssessor;
        assert_eq!(
            assessor.assess("SUDO reboot").level,
            RiskLevel::High
        );
    }
}
