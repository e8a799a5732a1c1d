use std::collections::HashMap;

/// Category-keyed welcome texts used to seed empty conversations.
///
/// Unknown categories fall back to the general text, so a freshly created
/// conversation always has exactly one opening line available.
#[derive(Clone, Debug)]
pub struct WelcomeCatalog {
    entries: HashMap<String, String>,
    fallback: String,
}

impl Default for WelcomeCatalog {
    fn default() -> Self {
        let entries = [
            ("Yama", "Welcome. Speak plainly; nothing said here leaves this room."),
            ("Siddhartha", "Sit down, take a breath. We have all the time you need."),
            ("Shankara", "Every knot loosens once you look at it directly. Where shall we start?"),
            ("Kama", "Whatever weighs on your heart is welcome here."),
            ("Narada", "Tell me the whole story — the messy version."),
            ("TherapyBro", "Listening that doesn't interrupt. Insight that doesn't intrude."),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            entries,
            fallback: "Listening that doesn't interrupt. Insight that doesn't intrude.".to_string(),
        }
    }
}

impl WelcomeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, category: impl Into<String>, welcome: impl Into<String>) -> Self {
        self.entries.insert(category.into(), welcome.into());
        self
    }

    pub fn with_fallback(mut self, welcome: impl Into<String>) -> Self {
        self.fallback = welcome.into();
        self
    }

    /// The welcome line for a category, or the general fallback.
    pub fn text(&self, category: &str) -> &str {
        self.entries
            .get(category)
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_category_gets_its_own_text() {
        let catalog = WelcomeCatalog::default();
        assert!(catalog.text("Yama").contains("Welcome"));
        assert_ne!(catalog.text("Yama"), catalog.text("Narada"));
    }

    #[test]
    fn unknown_category_falls_back() {
        let catalog = WelcomeCatalog::default();
        assert_eq!(catalog.text("no-such-listener"), catalog.fallback);
    }

    #[test]
    fn custom_entries_override() {
        let catalog = WelcomeCatalog::default()
            .with_entry("Yama", "custom opening")
            .with_fallback("generic opening");
        assert_eq!(catalog.text("Yama"), "custom opening");
        assert_eq!(catalog.text("other"), "generic opening");
    }
}
