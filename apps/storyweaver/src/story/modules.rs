//! Content modules: the atomic units a story part is made of.
//!
//! `StoryModule` is a closed sum type serialized with a `type` tag. Cross-cutting
//! capabilities are small traits implemented only by the variants that have them:
//!
//! | capability            | Text | Image | Choice | ChoiceSet |
//! |-----------------------|------|-------|--------|-----------|
//! | `HasDisplayText`      |  ✓   |       |   ✓    |           |
//! | `Translatable`        |  ✓   |       |   ✓    |           |
//! | `SpeechSynthesizable` |  ✓   |       |        |           |

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_CHOICES: usize = 2;
pub const MAX_CHOICES: usize = 4;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("a choice set needs 2 to 4 choices, got {0}")]
    ChoiceCount(usize),

    #[error("selected choice {index} is out of range for {len} choices")]
    SelectionOutOfRange { index: usize, len: usize },

    #[error("part {part} contains an unresolved choice set before the end of the story")]
    UnresolvedChoiceSet { part: usize },
}

// ────────────────────────────────────────────────────────────────────────────
// Capabilities
// ────────────────────────────────────────────────────────────────────────────

/// Display text produced for one target language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayOverride {
    pub lang: String,
    pub text: String,
}

pub trait HasDisplayText {
    /// The canonical text, as generated.
    fn text(&self) -> &str;

    fn display_override(&self) -> Option<&DisplayOverride>;

    /// The text shown to the reader: the override when present, else the canonical text.
    fn displayed_text(&self) -> &str {
        self.display_override()
            .map(|o| o.text.as_str())
            .unwrap_or_else(|| self.text())
    }
}

pub trait Translatable: HasDisplayText {
    /// Sets the display text for `lang`. Returns `false` if a translation for that
    /// language is already present; the existing one is kept.
    fn set_displayed_text(&mut self, lang: &str, text: String) -> bool;

    fn is_translated_to(&self, lang: &str) -> bool {
        self.display_override()
            .is_some_and(|o| o.lang.eq_ignore_ascii_case(lang))
    }
}

pub trait SpeechSynthesizable {
    /// The text to read aloud.
    fn speech_text(&self) -> &str;

    fn audio_path(&self) -> Option<&str>;

    fn attach_audio(&mut self, path: String);
}

fn set_override(slot: &mut Option<DisplayOverride>, lang: &str, text: String) -> bool {
    if slot
        .as_ref()
        .is_some_and(|o| o.lang.eq_ignore_ascii_case(lang))
    {
        return false;
    }
    *slot = Some(DisplayOverride {
        lang: lang.to_string(),
        text,
    });
    true
}

// ────────────────────────────────────────────────────────────────────────────
// Variants
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextModule {
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    displayed: Option<DisplayOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    audio_path: Option<String>,
}

impl TextModule {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            displayed: None,
            audio_path: None,
        }
    }
}

impl HasDisplayText for TextModule {
    fn text(&self) -> &str {
        &self.text
    }

    fn display_override(&self) -> Option<&DisplayOverride> {
        self.displayed.as_ref()
    }
}

impl Translatable for TextModule {
    fn set_displayed_text(&mut self, lang: &str, text: String) -> bool {
        set_override(&mut self.displayed, lang, text)
    }
}

impl SpeechSynthesizable for TextModule {
    fn speech_text(&self) -> &str {
        self.displayed_text()
    }

    fn audio_path(&self) -> Option<&str> {
        self.audio_path.as_deref()
    }

    fn attach_audio(&mut self, path: String) {
        self.audio_path = Some(path);
    }
}

/// An illustration. `path` is `None` only in documents saved before the image existed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageModule {
    pub path: Option<String>,
}

impl ImageModule {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceModule {
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    displayed: Option<DisplayOverride>,
}

impl ChoiceModule {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            displayed: None,
        }
    }
}

/// Choices are identified by their canonical label only.
impl PartialEq for ChoiceModule {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for ChoiceModule {}

impl HasDisplayText for ChoiceModule {
    fn text(&self) -> &str {
        &self.text
    }

    fn display_override(&self) -> Option<&DisplayOverride> {
        self.displayed.as_ref()
    }
}

impl Translatable for ChoiceModule {
    fn set_displayed_text(&mut self, lang: &str, text: String) -> bool {
        set_override(&mut self.displayed, lang, text)
    }
}

/// An ordered list of 2 to 4 choices, consumable exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceSet {
    choices: Vec<ChoiceModule>,
    #[serde(default)]
    selected: Option<usize>,
}

impl ChoiceSet {
    pub fn new(choices: Vec<ChoiceModule>) -> Result<Self, ModelError> {
        let set = Self {
            choices,
            selected: None,
        };
        set.validate()?;
        Ok(set)
    }

    pub fn choices(&self) -> &[ChoiceModule] {
        &self.choices
    }

    pub fn selected(&self) -> Option<&ChoiceModule> {
        self.selected.and_then(|i| self.choices.get(i))
    }

    pub fn is_selected(&self) -> bool {
        self.selected.is_some()
    }

    /// Records the reader's choice. A no-op returning `false` when a choice was
    /// already made or `choice` is not part of this set.
    pub fn select(&mut self, choice: &ChoiceModule) -> bool {
        if self.selected.is_some() {
            return false;
        }
        match self.choices.iter().position(|c| c == choice) {
            Some(index) => {
                self.selected = Some(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn choices_mut(&mut self) -> &mut [ChoiceModule] {
        &mut self.choices
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let len = self.choices.len();
        if !(MIN_CHOICES..=MAX_CHOICES).contains(&len) {
            return Err(ModelError::ChoiceCount(len));
        }
        match self.selected {
            Some(index) if index >= len => Err(ModelError::SelectionOutOfRange { index, len }),
            _ => Ok(()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// StoryModule
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoryModule {
    Text(TextModule),
    Image(ImageModule),
    Choice(ChoiceModule),
    ChoiceSet(ChoiceSet),
}

impl StoryModule {
    pub fn text(text: impl Into<String>) -> Self {
        StoryModule::Text(TextModule::new(text))
    }

    /// Renders the module into the running story sent back to the model.
    pub fn to_prompt_string(&self) -> String {
        match self {
            StoryModule::Text(text) => text.text().to_string(),
            StoryModule::Image(_) => String::new(),
            StoryModule::Choice(choice) => format!("->{}", choice.text()),
            StoryModule::ChoiceSet(set) => {
                let selected = set
                    .selected()
                    .map(|c| StoryModule::Choice(c.clone()).to_prompt_string())
                    .unwrap_or_default();
                format!("\n{selected}")
            }
        }
    }

    /// Every translatable unit in this module, choice-set entries included.
    pub fn translatables_mut(&mut self) -> Vec<&mut dyn Translatable> {
        match self {
            StoryModule::Text(text) => vec![text as &mut dyn Translatable],
            StoryModule::Choice(choice) => vec![choice as &mut dyn Translatable],
            StoryModule::ChoiceSet(set) => set
                .choices_mut()
                .iter_mut()
                .map(|c| c as &mut dyn Translatable)
                .collect(),
            StoryModule::Image(_) => Vec::new(),
        }
    }

    pub fn as_speech(&self) -> Option<&dyn SpeechSynthesizable> {
        match self {
            StoryModule::Text(text) => Some(text),
            StoryModule::Image(_) | StoryModule::Choice(_) | StoryModule::ChoiceSet(_) => None,
        }
    }

    pub fn as_speech_mut(&mut self) -> Option<&mut dyn SpeechSynthesizable> {
        match self {
            StoryModule::Text(text) => Some(text),
            StoryModule::Image(_) | StoryModule::Choice(_) | StoryModule::ChoiceSet(_) => None,
        }
    }

    pub fn as_choice_set(&self) -> Option<&ChoiceSet> {
        match self {
            StoryModule::ChoiceSet(set) => Some(set),
            _ => None,
        }
    }

    pub(crate) fn as_choice_set_mut(&mut self) -> Option<&mut ChoiceSet> {
        match self {
            StoryModule::ChoiceSet(set) => Some(set),
            _ => None,
        }
    }
}
