//! Denylists the content scanner checks extracted files against.

use glob::{MatchOptions, Pattern};
use regex::Regex;
use std::sync::LazyLock;

/// Executable, script and library file types. Packages are data bundles.
const DENIED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bat", "cmd", "com", "scr", "msi", "sh", "bash", "ps1", "vbs",
    "jar", "js", "py", "app", "apk",
];

/// Extensions whose content is scanned as text.
const TEXT_EXTENSIONS: &[&str] = &[
    "json", "txt", "md", "yaml", "yml", "xml", "csv", "ini", "cfg", "toml", "gltf", "mtl", "lua",
    "svg", "html", "htm",
];

static DENIED_PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    DENIED_EXTENSIONS
        .iter()
        .map(|ext| Pattern::new(&format!("*.{}", ext)).expect("invalid pattern"))
        .collect()
});

const CASE_INSENSITIVE: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Dynamic evaluation and process spawning primitives, with the label used
/// in reports.
static DANGEROUS_CODE: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("eval()", r"\beval\s*\("),
        ("exec()", r"\bexec\s*\("),
        ("Function()", r"\bFunction\s*\("),
        ("__import__()", r"__import__\s*\("),
        ("child_process", r"child_process"),
        ("subprocess", r"\bsubprocess\b"),
        ("system()", r"\bsystem\s*\("),
        ("spawn()", r"\bspawn\s*\("),
        ("os.execute", r"\bos\.execute\b"),
        ("shell path", r"/bin/(?:ba)?sh\b"),
        ("cmd.exe", r"(?i)\bcmd\.exe\b"),
        ("powershell", r"(?i)\bpowershell\b"),
        ("script tag", r"(?i)<script\b"),
        ("javascript: URL", r"(?i)javascript:"),
    ]
    .into_iter()
    .map(|(label, pattern)| (label, Regex::new(pattern).expect("invalid regex")))
    .collect()
});

/// Keywords in file or directory names that indicate inappropriate content.
/// Matched against the lowercased relative path, delimited by
/// non-alphanumerics so `gorgeous.png` does not match `gore`.
static INAPPROPRIATE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^a-z0-9])(nsfw|porn|xxx|nude|nudity|gore|explicit|hentai)(?:[^a-z0-9]|$)")
        .expect("invalid regex")
});

pub fn is_denied_file_name(file_name: &str) -> bool {
    DENIED_PATTERNS
        .iter()
        .any(|p| p.matches_with(file_name, CASE_INSENSITIVE))
}

pub fn is_text_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Labels of every dangerous pattern found in `content`.
pub fn dangerous_patterns(content: &str) -> Vec<&'static str> {
    DANGEROUS_CODE
        .iter()
        .filter(|(_, regex)| regex.is_match(content))
        .map(|(label, _)| *label)
        .collect()
}

/// The inappropriate keyword in `relative_path`, if any.
pub fn inappropriate_keyword(relative_path: &str) -> Option<String> {
    let lowered = relative_path.to_lowercase();
    INAPPROPRIATE_NAME
        .captures(&lowered)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_extensions_case_insensitive() {
        assert!(is_denied_file_name("payload.exe"));
        assert!(is_denied_file_name("PAYLOAD.EXE"));
        assert!(is_denied_file_name("install.sh"));
        assert!(is_denied_file_name("libfoo.so"));
        assert!(!is_denied_file_name("model.gltf"));
        assert!(!is_denied_file_name("buffer.bin"));
        assert!(!is_denied_file_name("exe.png"));
    }

    #[test]
    fn test_text_detection() {
        assert!(is_text_file("personality.json"));
        assert!(is_text_file("README.MD"));
        assert!(!is_text_file("skin.png"));
        assert!(!is_text_file("noextension"));
    }

    #[test]
    fn test_dangerous_patterns() {
        assert_eq!(dangerous_patterns(r#"{"onLoad": "eval (payload)"}"#), vec!["eval()"]);
        assert_eq!(
            dangerous_patterns("require('child_process').exec('rm')"),
            vec!["exec()", "child_process"]
        );
        assert!(dangerous_patterns(r#"{"greeting": "Let's evaluate!"}"#).is_empty());
        assert!(dangerous_patterns("the ecosystem( is fine").is_empty());
    }

    #[test]
    fn test_inappropriate_keyword_boundaries() {
        assert_eq!(
            inappropriate_keyword("assets/NSFW_pose.png").as_deref(),
            Some("nsfw")
        );
        assert_eq!(
            inappropriate_keyword("gore/blood.png").as_deref(),
            Some("gore")
        );
        assert!(inappropriate_keyword("assets/gorgeous.png").is_none());
        assert!(inappropriate_keyword("assets/explicitly_lit.png").is_none());
    }
}
