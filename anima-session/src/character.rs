//! Character persona definitions.

use serde::{Deserialize, Serialize};

/// The persona card injected at the top of every system prompt.
///
/// Only `name` is mandatory; every absent field omits its line from the
/// prompt rather than emitting an empty one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterCard {
    /// Display name of the character.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
    /// Personality summary.
    #[serde(default)]
    pub personality: Option<String>,
    /// Scenario / setting the character lives in.
    #[serde(default)]
    pub scenario: Option<String>,
    /// Author-supplied system prompt fragment.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl CharacterCard {
    /// Create a card with just a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            personality: None,
            scenario: None,
            system_prompt: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the personality summary.
    #[must_use]
    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality = Some(personality.into());
        self
    }

    /// Set the scenario.
    #[must_use]
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    /// Set the system prompt fragment.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}
