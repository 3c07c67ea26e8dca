use serde::Deserialize;

fn default_icon() -> String {
    "📚".to_string()
}

fn default_available() -> bool {
    true
}

/// What kind of conversation a knowledge base drives. The backend sends
/// corpus-specific type strings; everything that is not code review is a
/// plain question-answering KB as far as the client is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KbKind {
    CodeReview,
    #[default]
    Normal,
}

impl<'de> Deserialize<'de> for KbKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(if tag == "code_review" {
            KbKind::CodeReview
        } else {
            KbKind::Normal
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(rename = "type", default)]
    pub kind: KbKind,
    #[serde(default)]
    pub supports_images: bool,
    #[serde(default = "default_available")]
    pub available: bool,
}

impl KnowledgeBase {
    pub fn is_code_review(&self) -> bool {
        self.kind == KbKind::CodeReview
    }

    /// The greeting shown when a conversation with this KB starts empty.
    pub fn welcome_message(&self) -> String {
        let mut welcome = if self.is_code_review() {
            "Hello! Paste your code and ask your questions for a detailed review.".to_string()
        } else if self.description.is_empty() {
            format!("Hello! I can help you with {}. Ask me your questions!", self.name)
        } else {
            format!(
                "Hello! I can help you with {}. Ask me your questions!",
                self.description.to_lowercase()
            )
        };

        if self.supports_images {
            welcome.push_str(" You can also attach images for more context.");
        }

        welcome
    }
}

/// The selectable knowledge bases, fetched once at startup. At most one is
/// current at any time; unavailable entries can never become current.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<KnowledgeBase>,
    current: Option<usize>,
}

impl Registry {
    /// Install the loaded list and auto-select the first available entry.
    /// Returns the selection, if any.
    pub fn set_entries(&mut self, entries: Vec<KnowledgeBase>) -> Option<&KnowledgeBase> {
        self.entries = entries;
        self.current = self.entries.iter().position(|kb| kb.available);
        self.current()
    }

    /// Make `id` current. Unknown or unavailable ids leave the selection
    /// unchanged and return None.
    pub fn select(&mut self, id: &str) -> Option<&KnowledgeBase> {
        let index = self
            .entries
            .iter()
            .position(|kb| kb.id == id && kb.available)?;
        self.current = Some(index);
        self.entries.get(index)
    }

    pub fn current(&self) -> Option<&KnowledgeBase> {
        self.current.and_then(|i| self.entries.get(i))
    }

    pub fn entries(&self) -> &[KnowledgeBase] {
        &self.entries
    }
}
