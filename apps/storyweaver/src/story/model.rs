use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::story::modules::{ChoiceModule, ModelError, StoryModule, TextModule};
use crate::story::part::StoryPart;

/// Per-story generation options, fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorySettings {
    /// Number of continuation parts between the introduction and the ending.
    pub length: u32,
    /// `None` means the story is shown as written.
    #[serde(default)]
    pub target_language: Option<String>,
    pub illustrate: bool,
    pub speech: bool,
}

impl Default for StorySettings {
    fn default() -> Self {
        Self {
            length: 3,
            target_language: None,
            illustrate: true,
            speech: false,
        }
    }
}

/// Where a story stands in its lifecycle, derived from its contents.
///
/// A failed generation is not a state: the story is left exactly as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryState {
    Empty,
    Seeding,
    Introducing,
    Extending,
    AwaitingChoice,
    Ending,
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    id: Uuid,
    title: Option<TextModule>,
    overview: Option<String>,
    idea: Option<String>,
    settings: StorySettings,
    parts: Vec<StoryPart>,
    /// Number of parts already handed to the caller.
    cursor: usize,
}

impl Story {
    /// A story with nothing yet: the idea will be generated.
    pub fn new(settings: StorySettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: None,
            overview: None,
            idea: None,
            settings,
            parts: Vec::new(),
            cursor: 0,
        }
    }

    /// A story whose idea is given; title and overview are still generated from it.
    pub fn from_idea(settings: StorySettings, idea: impl Into<String>) -> Self {
        Self {
            idea: Some(idea.into()),
            ..Self::new(settings)
        }
    }

    /// A story with a known title and overview; generation starts at the introduction.
    pub fn with_outline(
        settings: StorySettings,
        title: impl Into<String>,
        overview: impl Into<String>,
    ) -> Self {
        Self {
            title: Some(TextModule::new(title)),
            overview: Some(overview.into()),
            ..Self::new(settings)
        }
    }

    /// Rebuilds a persisted story. The cursor starts at zero so every part is
    /// delivered again on the first call.
    pub(crate) fn restore(
        id: Uuid,
        title: Option<TextModule>,
        overview: Option<String>,
        idea: Option<String>,
        settings: StorySettings,
        parts: Vec<StoryPart>,
    ) -> Result<Self, ModelError> {
        let story = Self {
            id,
            title,
            overview,
            idea,
            settings,
            parts,
            cursor: 0,
        };
        story.validate()?;
        Ok(story)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> Option<&TextModule> {
        self.title.as_ref()
    }

    pub fn overview(&self) -> Option<&str> {
        self.overview.as_deref()
    }

    pub fn idea(&self) -> Option<&str> {
        self.idea.as_deref()
    }

    pub fn settings(&self) -> &StorySettings {
        &self.settings
    }

    pub fn parts(&self) -> &[StoryPart] {
        &self.parts
    }

    /// Number of generation steps done so far.
    pub fn iteration_count(&self) -> usize {
        self.parts.len()
    }

    pub fn has_outline(&self) -> bool {
        self.title.is_some() && self.overview.is_some()
    }

    /// True once the ending part is in.
    pub fn is_complete(&self) -> bool {
        self.parts.len() > self.settings.length as usize
    }

    pub fn is_awaiting_user_input(&self) -> bool {
        self.parts
            .last()
            .and_then(StoryPart::trailing_choice_set)
            .is_some_and(|set| !set.is_selected())
    }

    pub fn state(&self) -> StoryState {
        if self.is_complete() {
            StoryState::Complete
        } else if self.is_awaiting_user_input() {
            StoryState::AwaitingChoice
        } else if !self.has_outline() {
            if self.idea.is_some() {
                StoryState::Seeding
            } else {
                StoryState::Empty
            }
        } else if self.parts.is_empty() {
            StoryState::Introducing
        } else if self.parts.len() < self.settings.length as usize {
            StoryState::Extending
        } else {
            StoryState::Ending
        }
    }

    /// Resolves the trailing choice set. Ignored (returns `false`) unless the story
    /// is waiting for input and `choice` is one of the offered choices.
    pub fn submit_user_choice(&mut self, choice: &ChoiceModule) -> bool {
        if !self.is_awaiting_user_input() {
            return false;
        }
        self.parts
            .last_mut()
            .and_then(StoryPart::trailing_choice_set_mut)
            .is_some_and(|set| set.select(choice))
    }

    /// The story so far as plain text, used as context for later generation.
    pub fn prompt_story(&self) -> String {
        self.parts
            .iter()
            .map(StoryPart::to_prompt_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn has_undelivered(&self) -> bool {
        self.cursor < self.parts.len()
    }

    /// Hands out every part the caller has not seen yet.
    pub(crate) fn take_undelivered(&mut self) -> Vec<StoryPart> {
        let pending = self.parts[self.cursor..].to_vec();
        self.cursor = self.parts.len();
        pending
    }

    pub(crate) fn set_idea(&mut self, idea: String) {
        self.idea = Some(idea);
    }

    pub(crate) fn set_outline(&mut self, title: String, overview: String) {
        self.title = Some(TextModule::new(title));
        self.overview = Some(overview);
    }

    pub(crate) fn title_mut(&mut self) -> Option<&mut TextModule> {
        self.title.as_mut()
    }

    /// Appends a finished part and marks it delivered.
    pub(crate) fn append_part(&mut self, part: StoryPart) {
        debug_assert!(!self.is_awaiting_user_input());
        self.parts.push(part);
        self.cursor = self.parts.len();
    }

    /// Checks every choice set, and that only the very last module of the story
    /// may be an unresolved one.
    pub fn validate(&self) -> Result<(), ModelError> {
        let last_part = self.parts.len().saturating_sub(1);
        for (part_index, part) in self.parts.iter().enumerate() {
            let last_module = part.len().saturating_sub(1);
            for (module_index, module) in part.modules().iter().enumerate() {
                let StoryModule::ChoiceSet(set) = module else {
                    continue;
                };
                set.validate()?;
                let is_story_tail = part_index == last_part && module_index == last_module;
                if !set.is_selected() && !is_story_tail {
                    return Err(ModelError::UnresolvedChoiceSet { part: part_index });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::modules::{ChoiceSet, HasDisplayText};

    fn settings(length: u32) -> StorySettings {
        StorySettings {
            length,
            target_language: None,
            illustrate: false,
            speech: false,
        }
    }

    fn choice_part(labels: &[&str]) -> StoryPart {
        let set = ChoiceSet::new(labels.iter().map(|l| ChoiceModule::new(*l)).collect()).unwrap();
        StoryPart::new(vec![StoryModule::text("Two paths."), StoryModule::ChoiceSet(set)])
    }

    #[test]
    fn test_new_story_is_empty() {
        let story = Story::new(settings(2));
        assert_eq!(story.state(), StoryState::Empty);
        assert!(!story.is_awaiting_user_input());
        assert_eq!(story.prompt_story(), "");
    }

    #[test]
    fn test_state_follows_parts() {
        let mut story = Story::with_outline(settings(1), "T", "O");
        assert_eq!(story.state(), StoryState::Introducing);

        story.append_part(choice_part(&["A", "B"]));
        assert_eq!(story.state(), StoryState::AwaitingChoice);

        assert!(story.submit_user_choice(&ChoiceModule::new("A")));
        assert_eq!(story.state(), StoryState::Ending);

        story.append_part(StoryPart::new(vec![StoryModule::text("The end.")]));
        assert_eq!(story.state(), StoryState::Complete);
        assert!(story.is_complete());
    }

    #[test]
    fn test_seeded_story_starts_in_seeding() {
        let story = Story::from_idea(settings(1), "A lighthouse keeper finds a map.");
        assert_eq!(story.state(), StoryState::Seeding);
        assert_eq!(story.idea(), Some("A lighthouse keeper finds a map."));
    }

    #[test]
    fn test_submit_choice_is_ignored_when_not_awaiting() {
        let mut story = Story::with_outline(settings(2), "T", "O");
        assert!(!story.submit_user_choice(&ChoiceModule::new("A")));

        story.append_part(choice_part(&["A", "B"]));
        assert!(!story.submit_user_choice(&ChoiceModule::new("C")));
        assert!(story.is_awaiting_user_input());

        assert!(story.submit_user_choice(&ChoiceModule::new("B")));
        assert!(!story.is_awaiting_user_input());
        // Late duplicate.
        assert!(!story.submit_user_choice(&ChoiceModule::new("A")));
        let selected = story.parts()[0].trailing_choice_set().unwrap().selected().unwrap();
        assert_eq!(selected.text(), "B");
    }

    #[test]
    fn test_prompt_story_includes_selected_choice() {
        let mut story = Story::with_outline(settings(2), "T", "O");
        story.append_part(choice_part(&["Left", "Right"]));
        story.submit_user_choice(&ChoiceModule::new("Left"));
        assert_eq!(story.prompt_story(), "Two paths.\n\n->Left");
    }

    #[test]
    fn test_take_undelivered_advances_cursor() {
        let parts = vec![
            StoryPart::new(vec![StoryModule::text("one")]),
            StoryPart::new(vec![StoryModule::text("two")]),
        ];
        let mut story =
            Story::restore(Uuid::new_v4(), None, None, None, settings(3), parts).unwrap();
        assert!(story.has_undelivered());

        assert_eq!(story.take_undelivered().len(), 2);
        assert!(!story.has_undelivered());
        assert!(story.take_undelivered().is_empty());
    }

    #[test]
    fn test_restore_rejects_unresolved_set_before_the_end() {
        let parts = vec![
            choice_part(&["A", "B"]),
            StoryPart::new(vec![StoryModule::text("later")]),
        ];
        let result = Story::restore(Uuid::new_v4(), None, None, None, settings(3), parts);
        assert_eq!(result, Err(ModelError::UnresolvedChoiceSet { part: 0 }));
    }
}
