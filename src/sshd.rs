//! OpenSSH daemon integration: version detection and sshd_config editing.
//!
//! `AuthorizedKeysCommand` exists since OpenSSH 6.2; the fingerprint (`%f`)
//! and user (`%u`) command tokens since 6.9. The installer uses the parsed
//! version to decide which directive shape to write.

use std::path::Path;

/// Minimum OpenSSH version with AuthorizedKeysCommand support.
pub const OPENSSH_MIN: (u32, u32) = (6, 2);
/// Minimum OpenSSH version with %f/%u token expansion.
pub const OPENSSH_FINGERPRINT_MIN: (u32, u32) = (6, 9);

/// Parse `major.minor` out of an sshd banner line such as
/// `sshd version OpenSSH_8.9p1, OpenSSL ...`. Anything unrecognisable is
/// `(0, 0)`, which fails every minimum-version gate.
pub fn parse_openssh_version(line: &str) -> (u32, u32) {
    let Some(token) = line
        .split_whitespace()
        .find(|token| token.starts_with("OpenSSH_"))
    else {
        return (0, 0);
    };
    let version = token["OpenSSH_".len()..].trim_end_matches(',');
    let version = match version.find('p') {
        Some(pos) if pos > 0 => &version[..pos],
        _ => version,
    };
    let mut parts = version.split('.');
    let major = parts.next().and_then(|part| part.parse().ok());
    let minor = parts.next().and_then(|part| part.parse().ok());
    match (major, minor) {
        (Some(major), Some(minor)) => (major, minor),
        _ => (0, 0),
    }
}

/// Ask the installed sshd for its version.
///
/// `sshd -v` is not a real flag: sshd rejects it and prints its usage text,
/// whose second line carries the version banner.
pub fn installed_version() -> std::io::Result<(u32, u32)> {
    let output = std::process::Command::new("sshd").arg("-v").output()?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    Ok(stderr
        .lines()
        .nth(1)
        .map(parse_openssh_version)
        .unwrap_or((0, 0)))
}

/// The sshd_config directives that wire the agent in.
pub fn directives(user: &str, version: (u32, u32)) -> Vec<(String, String)> {
    let command = if version < OPENSSH_FINGERPRINT_MIN {
        "/usr/sbin/keywarden".to_string()
    } else {
        "/usr/sbin/keywarden --fingerprint %f %u".to_string()
    };
    vec![
        ("PasswordAuthentication".to_string(), "no".to_string()),
        (
            "AuthorizedKeysFile".to_string(),
            "/var/cache/keywarden/%u".to_string(),
        ),
        ("AuthorizedKeysCommand".to_string(), command),
        ("AuthorizedKeysCommandUser".to_string(), user.to_string()),
    ]
}

/// Rewrite sshd_config content: each directive replaces the first line
/// mentioning its keyword (commented or not); directives with no existing
/// line are appended at the end.
pub fn apply_directives(content: &str, directives: &[(String, String)]) -> String {
    let mut pending: Vec<&(String, String)> = directives.iter().collect();
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    for line in &mut lines {
        if let Some(pos) = pending.iter().position(|(key, _)| line.contains(key.as_str())) {
            let (key, value) = pending.remove(pos);
            *line = format!("{key} {value}");
        }
    }
    for (key, value) in pending {
        lines.push(format!("{key} {value}"));
    }
    lines.join("\n")
}

/// Apply the directives to the sshd_config file in place.
pub fn edit_config_file(path: &Path, directives: &[(String, String)]) -> std::io::Result<()> {
    let content = std::fs::read_to_string(path)?;
    std::fs::write(path, apply_directives(&content, directives))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_banner_shapes() {
        assert_eq!(
            parse_openssh_version("sshd version OpenSSH_8.9p1, OpenSSL 3.0.2"),
            (8, 9)
        );
        assert_eq!(parse_openssh_version("OpenSSH_6.2"), (6, 2));
        assert_eq!(parse_openssh_version("OpenSSH_7.2p2,"), (7, 2));
        assert_eq!(parse_openssh_version("OpenSSH_9.6p1 Ubuntu-3ubuntu13"), (9, 6));
    }

    #[test]
    fn garbage_parses_to_zero() {
        assert_eq!(parse_openssh_version(""), (0, 0));
        assert_eq!(parse_openssh_version("usage: sshd [-46DdeGiqTtV]"), (0, 0));
        assert_eq!(parse_openssh_version("OpenSSH_x.y"), (0, 0));
    }

    #[test]
    fn version_gates_compare_as_tuples() {
        assert!((6, 1) < OPENSSH_MIN);
        assert!((6, 2) >= OPENSSH_MIN);
        assert!((6, 8) < OPENSSH_FINGERPRINT_MIN);
        assert!((7, 0) >= OPENSSH_FINGERPRINT_MIN);
    }

    #[test]
    fn old_sshd_gets_directives_without_tokens() {
        let dirs = directives("keywarden", (6, 2));
        let command = dirs
            .iter()
            .find(|(key, _)| key == "AuthorizedKeysCommand")
            .unwrap();
        assert_eq!(command.1, "/usr/sbin/keywarden");
    }

    #[test]
    fn modern_sshd_gets_fingerprint_tokens() {
        let dirs = directives("keywarden", (8, 9));
        let command = dirs
            .iter()
            .find(|(key, _)| key == "AuthorizedKeysCommand")
            .unwrap();
        assert_eq!(command.1, "/usr/sbin/keywarden --fingerprint %f %u");
    }

    #[test]
    fn existing_directives_are_replaced_in_place() {
        let content = "Port 22\n#PasswordAuthentication yes\nAuthorizedKeysCommand /usr/bin/old\n";
        let out = apply_directives(content, &directives("keywarden", (8, 9)));
        assert!(out.contains("Port 22"));
        assert!(out.contains("PasswordAuthentication no"));
        assert!(!out.contains("#PasswordAuthentication"));
        assert!(out.contains("AuthorizedKeysCommand /usr/sbin/keywarden --fingerprint %f %u"));
        assert!(!out.contains("/usr/bin/old"));
    }

    #[test]
    fn missing_directives_are_appended() {
        let content = "Port 22\n";
        let out = apply_directives(content, &directives("svc", (8, 9)));
        assert!(out.contains("AuthorizedKeysCommandUser svc"));
        assert!(out.contains("AuthorizedKeysFile /var/cache/keywarden/%u"));
        // Untouched content stays first.
        assert!(out.starts_with("Port 22\n"));
    }

    #[test]
    fn each_directive_replaces_at_most_one_line() {
        let content = "PasswordAuthentication yes\nPasswordAuthentication yes\n";
        let out = apply_directives(
            content,
            &[("PasswordAuthentication".to_string(), "no".to_string())],
        );
        assert_eq!(out.matches("PasswordAuthentication no").count(), 1);
        assert_eq!(out.matches("PasswordAuthentication yes").count(), 1);
    }
}
