use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// One conversation as listed by the dashboard's conversation catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationInfo {
    pub conversation_id: String,
    #[serde(default)]
    pub center_name: Option<String>,
    #[serde(default)]
    pub workflow_name: Option<String>,
}

/// Conversation lookup keyed by conversation id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationCatalog {
    entries: HashMap<String, ConversationInfo>,
}

impl ConversationCatalog {
    pub fn new(conversations: impl IntoIterator<Item = ConversationInfo>) -> Self {
        Self {
            entries: conversations
                .into_iter()
                .map(|c| (c.conversation_id.clone(), c))
                .collect(),
        }
    }

    /// Parse a JSON array of conversations
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let conversations: Vec<ConversationInfo> = serde_json::from_str(raw)?;
        Ok(Self::new(conversations))
    }

    pub fn get(&self, conversation_id: &str) -> Option<&ConversationInfo> {
        self.entries.get(conversation_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
