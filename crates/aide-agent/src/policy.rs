//! Policy gate: decides whether an action may run.
//!
//! Evaluation is pure and total. The gate never executes anything and never
//! fails; the caller records a refusal in the conversation.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Denylist only
    Low,
    /// Denylist and sensitive paths
    #[default]
    Medium,
    /// Additionally blocks write-like shell commands
    High,
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SecurityLevel::Low => "low",
            SecurityLevel::Medium => "medium",
            SecurityLevel::High => "high",
        })
    }
}

impl FromStr for SecurityLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(SecurityLevel::Low),
            "medium" => Ok(SecurityLevel::Medium),
            "high" => Ok(SecurityLevel::High),
            other => Err(crate::Error::Config(format!(
                "unknown security level '{}' (expected low, medium or high)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: String,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: "Action Permitted".to_string(),
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// A compiled pattern with the label reported when it matches.
struct Rule {
    label: &'static str,
    regex: Regex,
}

fn compile(rules: &[(&'static str, &str)]) -> Vec<Rule> {
    rules
        .iter()
        .filter_map(|(label, pattern)| match Regex::new(pattern) {
            Ok(regex) => Some(Rule { label: *label, regex }),
            Err(e) => {
                tracing::error!("invalid policy pattern {}: {}", pattern, e);
                None
            }
        })
        .collect()
}

static DANGEROUS_COMMANDS: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    compile(&[
        (r"rm\s+-rf", r"(?i)\brm\s+-[a-z]*(r[a-z]*f|f[a-z]*r)"),
        (r"del\s+/s", r"(?i)\bdel\s+/s"),
        (r"format\s+[c-z]:", r"(?i)\bformat\s+[c-z]:"),
        (r"rd\s+/s", r"(?i)\brd\s+/s"),
        (r"net\s+user", r"(?i)\bnet\s+user"),
        ("shutdown", r"(?i)shutdown"),
        ("taskkill", r"(?i)taskkill"),
        (r"reg\s+delete", r"(?i)\breg\s+delete"),
        ("mkfs", r"(?i)\bmkfs"),
        (r"dd\s+if=", r"(?i)\bdd\s+if="),
        (r"chmod\s+-R\s+777\s+/", r"(?i)\bchmod\s+-r\s+777\s+/"),
        (r"sudo\s+su", r"(?i)\bsudo\s+su"),
        ("useradd|userdel|passwd", r"(?i)\b(useradd|userdel|passwd)"),
    ])
});

// A leading `..` still counts: `../../etc` resolves to `/etc` from shallow dirs.
static SENSITIVE_PATHS: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    compile(&[
        (r"C:\Windows", r"(?i)c:\\windows"),
        (r"C:\Program Files", r"(?i)c:\\program files"),
        (r"C:\Users\<user>\AppData", r"(?i)c:\\users\\[^\\]+\\appdata"),
        ("System32", r"(?i)system32"),
        ("/etc", r"(?:^|[^\w.]|\.\.)/etc(?:/|\b|$)"),
        ("/boot", r"(?:^|[^\w.]|\.\.)/boot(?:/|\b|$)"),
        ("/sys", r"(?:^|[^\w.]|\.\.)/sys(?:/|\b|$)"),
        ("/proc", r"(?:^|[^\w.]|\.\.)/proc(?:/|\b|$)"),
        ("/usr/bin", r"(?:^|[^\w.]|\.\.)/usr/bin(?:/|\b|$)"),
        ("/usr/sbin", r"(?:^|[^\w.]|\.\.)/usr/sbin(?:/|\b|$)"),
    ])
});

static WRITE_LIKE: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    compile(&[
        (">", r">"),
        ("write", r"(?i)\bwrite\b"),
        ("set-content", r"(?i)\bset-content\b"),
        ("out-file", r"(?i)\bout-file\b"),
        ("tee", r"(?i)\btee\b"),
    ])
});

fn first_match<'a>(rules: &'a [Rule], text: &str) -> Option<&'a Rule> {
    rules.iter().find(|r| r.regex.is_match(text))
}

/// Stateless gate over the denylist and sensitive-path tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyGate {
    pub level: SecurityLevel,
}

impl PolicyGate {
    pub fn new(level: SecurityLevel) -> Self {
        Self { level }
    }

    pub fn evaluate(&self, action: &Action) -> PolicyDecision {
        evaluate(action, self.level)
    }
}

/// Decide whether `action` may run at `level`.
pub fn evaluate(action: &Action, level: SecurityLevel) -> PolicyDecision {
    match &action.kind {
        ActionKind::Execute { command } => {
            if let Some(rule) = first_match(&DANGEROUS_COMMANDS, command) {
                return PolicyDecision::block(format!(
                    "Blocked Dangerous Command Pattern: {}",
                    rule.label
                ));
            }
            if level >= SecurityLevel::Medium {
                if let Some(rule) = first_match(&SENSITIVE_PATHS, command) {
                    return PolicyDecision::block(format!(
                        "Blocked Access to Sensitive Path: {}",
                        rule.label
                    ));
                }
            }
            if level == SecurityLevel::High {
                if let Some(rule) = first_match(&WRITE_LIKE, command) {
                    return PolicyDecision::block(format!(
                        "High Security Mode blocks file writes ({})",
                        rule.label
                    ));
                }
            }
            PolicyDecision::allow()
        }
        ActionKind::FileOp {
            sub_action, path, ..
        } if sub_action.is_mutating() => {
            let path = path.as_deref().unwrap_or_default();
            match first_match(&SENSITIVE_PATHS, path) {
                Some(rule) => PolicyDecision::block(format!(
                    "Blocked Write/Delete on Sensitive Path: {}",
                    rule.label
                )),
                None => PolicyDecision::allow(),
            }
        }
        _ => PolicyDecision::allow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::FileOpKind;
    use serde_json::json;

    fn exec(command: &str) -> Action {
        Action::new(ActionKind::Execute {
            command: command.into(),
        })
    }

    fn file_op(sub: FileOpKind, path: &str) -> Action {
        Action::new(ActionKind::FileOp {
            sub_action: sub,
            path: Some(path.into()),
            content: None,
            search_text: None,
            replace_text: None,
        })
    }

    #[test]
    fn test_denylist_blocks_at_every_level() {
        for level in [SecurityLevel::Low, SecurityLevel::Medium, SecurityLevel::High] {
            let d = evaluate(&exec("rm -rf /"), level);
            assert!(!d.allowed);
            assert!(d.reason.contains("rm\\s+-rf"), "got: {}", d.reason);
        }
    }

    #[test]
    fn test_denylist_case_insensitive() {
        assert!(!evaluate(&exec("SHUTDOWN /s /t 0"), SecurityLevel::Low).allowed);
        assert!(!evaluate(&exec("Format D:"), SecurityLevel::Low).allowed);
        assert!(!evaluate(&exec("sudo passwd root"), SecurityLevel::Low).allowed);
    }

    #[test]
    fn test_benign_command_allowed() {
        let d = evaluate(&exec("ls -la ~/projects"), SecurityLevel::High);
        assert!(d.allowed);
        assert_eq!(d.reason, "Action Permitted");
    }

    #[test]
    fn test_sensitive_path_depends_on_level() {
        let action = exec("cat /etc/passwd");
        // passwd itself is on the denylist; use a path-only command
        assert!(!evaluate(&action, SecurityLevel::Low).allowed);

        let action = exec("cat /etc/hosts");
        assert!(evaluate(&action, SecurityLevel::Low).allowed);
        let d = evaluate(&action, SecurityLevel::Medium);
        assert!(!d.allowed);
        assert!(d.reason.contains("/etc"));

        let win = exec(r"dir C:\Windows\System32");
        assert!(!evaluate(&win, SecurityLevel::Medium).allowed);
    }

    #[test]
    fn test_rm_with_extra_flags_blocked() {
        for cmd in ["rm -rfv /", "rm -rfi ~", "rm -fr ~/", "RM -Rvf /home", "sudo rm -vrf /"] {
            let d = evaluate(&exec(cmd), SecurityLevel::Low);
            assert!(!d.allowed, "allowed: {}", cmd);
            assert!(d.reason.contains("rm\\s+-rf"));
        }
        assert!(evaluate(&exec("rm -f notes.txt"), SecurityLevel::High).allowed);
        assert!(evaluate(&exec("rm -r build"), SecurityLevel::Medium).allowed);
    }

    #[test]
    fn test_denylist_matches_inside_longer_words() {
        assert!(!evaluate(&exec("net users"), SecurityLevel::Low).allowed);
        assert!(!evaluate(&exec("sudo su-root"), SecurityLevel::Low).allowed);
        assert!(!evaluate(&exec(r"reg deletekey HKLM\Software"), SecurityLevel::Low).allowed);
    }

    #[test]
    fn test_parent_relative_sensitive_paths() {
        assert!(!evaluate(&exec("cat ../../etc/shadow"), SecurityLevel::Medium).allowed);
        assert!(evaluate(&exec("cat ../../etc/shadow"), SecurityLevel::Low).allowed);
        let d = evaluate(&file_op(FileOpKind::Delete, "../../etc/hosts"), SecurityLevel::Low);
        assert!(!d.allowed);
        assert!(d.reason.contains("/etc"));
    }

    #[test]
    fn test_path_prefix_not_confused() {
        assert!(evaluate(&exec("ls ./etc/config"), SecurityLevel::Medium).allowed);
        assert!(evaluate(&exec("cat /home/me/etc.txt"), SecurityLevel::Medium).allowed);
    }

    #[test]
    fn test_high_blocks_writes() {
        let action = exec("echo hi > notes.txt");
        assert!(evaluate(&action, SecurityLevel::Medium).allowed);
        let d = evaluate(&action, SecurityLevel::High);
        assert!(!d.allowed);
        assert!(d.reason.contains("High Security"));
        assert!(!evaluate(&exec("Set-Content a.txt 'x'"), SecurityLevel::High).allowed);
    }

    #[test]
    fn test_file_op_sensitive_write_blocked_at_all_levels() {
        for level in [SecurityLevel::Low, SecurityLevel::Medium, SecurityLevel::High] {
            let d = evaluate(&file_op(FileOpKind::Write, r"C:\Windows\win.ini"), level);
            assert!(!d.allowed);
            assert!(d.reason.contains("Sensitive Path"));
        }
        assert!(!evaluate(&file_op(FileOpKind::Delete, "/boot/vmlinuz"), SecurityLevel::Low).allowed);
    }

    #[test]
    fn test_file_op_read_of_sensitive_path_allowed() {
        assert!(evaluate(&file_op(FileOpKind::Read, "/etc/hosts"), SecurityLevel::High).allowed);
        assert!(evaluate(&file_op(FileOpKind::Write, "/tmp/out.txt"), SecurityLevel::High).allowed);
    }

    #[test]
    fn test_other_kinds_allowed() {
        let unknown = Action::from_value(json!({"action": "mystery_op", "command": "rm -rf /"}));
        assert!(evaluate(&unknown, SecurityLevel::High).allowed);
        assert!(evaluate(&Action::reply("rm -rf /"), SecurityLevel::High).allowed);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("HIGH".parse::<SecurityLevel>().unwrap(), SecurityLevel::High);
        assert!("paranoid".parse::<SecurityLevel>().is_err());
        assert_eq!(SecurityLevel::default(), SecurityLevel::Medium);
    }

    #[test]
    fn test_gate_wraps_level() {
        let gate = PolicyGate::new(SecurityLevel::Low);
        assert!(gate.evaluate(&exec("cat /etc/hosts")).allowed);
    }
}
