// All LLM prompt constants for the story module.
// Reuses the writer persona and JSON instruction from llm_client::prompts.
// Placeholders are filled with `.replace`; `{format}` is appended separately.

// ── Idea ────────────────────────────────────────────────────────────────────

pub const IDEA_FORMAT: &str = r#"{
    "idea": "The story idea"
}"#;

/// Replace `{previous_ideas}`.
pub const IDEA_PROMPT: &str = "Generate a 3 lines long story idea. The story is lived in the first person by the reader, who plays it as a story game.

Your previously generated ideas are:
{previous_ideas}

Make sure that your new idea is not similar or close to the previous ones. Make it truly unique.
";

pub const EXPANSION_FORMAT: &str = r#"{
    "themes": ["theme1", "theme2", "theme3"],
    "places": ["place1", "place2", "place3"],
    "characters": ["character1", "character2", "character3"],
    "objects": ["object1", "object2", "object3"],
    "goal": "The goal of the story",
    "title": "The story title",
    "overview": "A quick overview of the story plot containing a moral or idea."
}"#;

/// Replace `{idea}`.
pub const EXPANSION_PROMPT: &str = "Make sure that the story idea is clear. Do not open a vague story.

Story idea: {idea}

Start by listing the themes you want to explore in the story.
Give the main places, characters, and objects you want to include.

Give a quick overview of the main plot and the idea behind it. The story should fit in a few paragraphs and must have a clear goal: outline it.
The overview should have a clear beginning and middle and express the moral or idea the story conveys.
Only give the overview, not the entire story.
";

// ── Narrative ───────────────────────────────────────────────────────────────

pub const INTRODUCTION_FORMAT: &str = r#"{
    "story_content": "your answer here"
}"#;

/// Replace `{overview}`.
pub const INTRODUCTION_PROMPT: &str = "Write the beginning of the story given its overview. Tell it assuming the reader knows neither the overview nor any context.

Describe the environment, the main characters, and the current situation: the time, the place, and how the main character ended up where they are.
Keep it short (2 paragraphs maximum) and address the main character in the second person (you).

Do not transition to the following part and do not ask questions. The introduction may end abruptly, it will be continued later.

Story overview: {overview}

The introduction should not cover the entire overview, only set the stage.
";

pub const CONTINUATION_FORMAT: &str = r#"{
    "story_content": "your answer here",
    "choices": [
        {"choice": "Choice 1"},
        {"choice": "Choice 2"},
        ...
    ]
}"#;

/// Replace `{story}`, `{part_number}`, `{total_parts}`, `{overview}`.
pub const CONTINUATION_PROMPT: &str = "Story so far: {story}

Write the continuation of the story given its overview and the story so far. Keep it short (2 paragraphs maximum): write a single part, the story will be completed later.

The part should contain a twist or a new element that makes the story more engaging. Describe any new character or place smoothly as it appears.

End the part with a decision the reader must make as the person within the story. Craft it so that there are 2 to 4 possible answers with radically different effects on the story.
Advance the story without losing time: it must be completed in {total_parts} parts and this part is {part_number}/{total_parts}. Get close to the end on the last part.

Explain the options within the text but do not enumerate them at the end of the part. List them in the JSON object instead.

Story overview: {overview}
";

pub const ENDING_FORMAT: &str = r#"{
    "story_end": "your answer here"
}"#;

/// Replace `{story}`, `{overview}`.
pub const ENDING_PROMPT: &str = "Story so far: {story}

Write the end of the story given its overview and the story so far. A moral or a clear idea would add value but is not required.
Keep it short (2 paragraphs maximum). The end must follow from the story and from the choices the reader made, and may reflect on them.

Story overview: {overview}
";

// ── Illustration ────────────────────────────────────────────────────────────

pub const ILLUSTRATIONS_FORMAT: &str = r#"{
    "illustrations": [
        {
            "description": "Description for the illustration",
            "text_beginning": "Beginning of the text reference",
            "text_end": "End of the text reference"
        },
        ...
    ]
}"#;

/// Replace `{max_illustrations}`, `{text}`.
pub const ILLUSTRATIONS_PROMPT: &str = "You have written a story and now need to illustrate it.
List the illustrations that should be included: only the most valuable ones, {max_illustrations} maximum.

Text:
{text}

For each illustration give:
- 'description': a concise description of what the illustration should depict.
- 'text_beginning' and 'text_end': the first and last few words of the passage to illustrate, copied exactly from the text (no '...').
  Keep the exact words and punctuation. If the passage does not end with punctuation, do not add any.

The passages must not overlap and must not be too long.
";

pub const IMAGE_DESCRIPTION_FORMAT: &str = r#"{
    "image_description": "Description of the image"
}"#;

/// Replace `{story}`, `{excerpt}`, `{description}`.
pub const IMAGE_DESCRIPTION_PROMPT: &str = "I have written a story and would like to illustrate it with several images.

The story is: {story}

The passage to illustrate is: {excerpt}

My brief description of the image is: {description}

Based on the passage and the brief description, write a precise and detailed image description for the illustrator.
Keep the theme and the style of the story, and name a style for the image close to a natural or realistic one.
";
