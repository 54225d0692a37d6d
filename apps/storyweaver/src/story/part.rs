use serde::{Deserialize, Serialize};

use crate::story::modules::{ChoiceSet, StoryModule};

/// One generation step's output: an ordered, append-only-once list of modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryPart {
    modules: Vec<StoryModule>,
}

impl StoryPart {
    pub fn new(modules: Vec<StoryModule>) -> Self {
        Self { modules }
    }

    pub fn modules(&self) -> &[StoryModule] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn to_prompt_string(&self) -> String {
        self.modules
            .iter()
            .map(StoryModule::to_prompt_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The choice set this part ends with, if any.
    pub fn trailing_choice_set(&self) -> Option<&ChoiceSet> {
        self.modules.last().and_then(StoryModule::as_choice_set)
    }

    pub(crate) fn trailing_choice_set_mut(&mut self) -> Option<&mut ChoiceSet> {
        self.modules.last_mut().and_then(StoryModule::as_choice_set_mut)
    }
}
