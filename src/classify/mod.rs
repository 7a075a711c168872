use woothee::parser::Parser;

/// Facts derived from a user-agent string
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub is_bot: bool,
    pub browser: Option<String>,
    pub os: Option<String>,
    /// Device class ("pc", "smartphone", ...); bots are gated out before
    /// this is ever stored
    pub device: Option<String>,
}

/// Pluggable user-agent heuristics, so the classifier can be swapped or
/// stubbed in tests without touching the recorder
pub trait UserAgentClassifier: Send + Sync {
    fn classify(&self, user_agent: &str) -> Classification;
}

/// Production classifier backed by the woothee parser
#[derive(Debug, Default)]
pub struct WootheeClassifier;

impl WootheeClassifier {
    pub fn new() -> Self {
        Self
    }
}

fn non_unknown(value: &str) -> Option<String> {
    if value.is_empty() || value == "UNKNOWN" {
        None
    } else {
        Some(value.to_string())
    }
}

impl UserAgentClassifier for WootheeClassifier {
    fn classify(&self, user_agent: &str) -> Classification {
        let parser = Parser::new();
        let result = parser.parse(user_agent).unwrap_or_default();

        Classification {
            is_bot: result.category == "crawler",
            browser: non_unknown(result.name),
            os: non_unknown(result.os),
            device: non_unknown(result.category),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const GOOGLEBOT_UA: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    #[test]
    fn test_classify_desktop_browser() {
        let parsed = WootheeClassifier::new().classify(CHROME_UA);
        assert!(!parsed.is_bot);
        assert_eq!(parsed.browser.as_deref(), Some("Chrome"));
        assert_eq!(parsed.os.as_deref(), Some("Windows 10"));
        assert_eq!(parsed.device.as_deref(), Some("pc"));
    }

    #[test]
    fn test_classify_googlebot() {
        let parsed = WootheeClassifier::new().classify(GOOGLEBOT_UA);
        assert!(parsed.is_bot);
        assert_eq!(parsed.device.as_deref(), Some("crawler"));
    }

    #[test]
    fn test_classify_mobile() {
        let parsed = WootheeClassifier::new().classify(IPHONE_UA);
        assert!(!parsed.is_bot);
        assert_eq!(parsed.device.as_deref(), Some("smartphone"));
    }

    #[test]
    fn test_classify_garbage() {
        let parsed = WootheeClassifier::new().classify("not a real user agent");
        assert!(!parsed.is_bot);
        assert!(parsed.browser.is_none());
    }
}
