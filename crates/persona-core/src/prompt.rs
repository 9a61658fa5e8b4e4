//! Per-model prompt templates and decoding parameters.
//!
//! | Model       | Wire id | Template                                   | Repetition penalty |
//! |-------------|---------|--------------------------------------------|--------------------|
//! | `nous`      | `"1"`   | `### Instruction:` / `### You:` blocks     | none               |
//! | `pygmalion` | `"2"`   | `{name}'s Persona:` + `<START>` dialogue   | 1.5                |
//!
//! Both use temperature 0.7 and at most 512 new tokens. The table in
//! [`policy_for`] is the only place that ties a [`ModelKind`] to its policy.

use serde::{Deserialize, Serialize};

use crate::kind::ModelKind;
use crate::model::SamplingParams;

/// One request's conversation fields. Nothing here is validated; empty
/// strings are formatted as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub character_name: String,
    pub persona: String,
    pub prompt: String,
    /// Prior turns, already formatted by the caller. `Some("")` still counts
    /// as present.
    #[serde(default)]
    pub chat_history: Option<String>,
}

/// Fixed generation constants for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodingParams {
    pub temperature: f64,
    pub max_new_tokens: usize,
    /// `None` leaves the runtime default (no penalty) in place.
    pub repetition_penalty: Option<f64>,
}

impl DecodingParams {
    /// Expand into engine-level sampling parameters, stopping on `stop_token_ids`.
    pub fn to_sampling_params(&self, stop_token_ids: Vec<u32>) -> SamplingParams {
        let mut params = SamplingParams {
            temperature: self.temperature,
            max_new_tokens: self.max_new_tokens,
            stop_token_ids,
            ..SamplingParams::default()
        };
        if let Some(penalty) = self.repetition_penalty {
            params.repetition_penalty = penalty;
        }
        params
    }
}

/// How a policy lays out the conversation fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// Alpaca-style `### Instruction:` blocks.
    Instruction,
    /// Pygmalion persona header followed by a `<START>` dialogue.
    PersonaDialogue,
}

/// A prompt layout plus the decoding parameters that go with it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplatePolicy {
    pub style: PromptStyle,
    pub decoding: DecodingParams,
}

const POLICIES: [(ModelKind, TemplatePolicy); 2] = [
    (
        ModelKind::Nous,
        TemplatePolicy {
            style: PromptStyle::Instruction,
            decoding: DecodingParams {
                temperature: 0.7,
                max_new_tokens: 512,
                repetition_penalty: None,
            },
        },
    ),
    (
        ModelKind::Pygmalion,
        TemplatePolicy {
            style: PromptStyle::PersonaDialogue,
            decoding: DecodingParams {
                temperature: 0.7,
                max_new_tokens: 512,
                repetition_penalty: Some(1.5),
            },
        },
    ),
];

/// Look up the template policy for `kind`.
pub fn policy_for(kind: ModelKind) -> &'static TemplatePolicy {
    // Rows are stored in discriminant order.
    &POLICIES[kind as usize].1
}

impl TemplatePolicy {
    /// Render the literal prompt string for `conv`.
    pub fn render(&self, conv: &Conversation) -> String {
        match self.style {
            PromptStyle::Instruction => render_instruction(conv),
            PromptStyle::PersonaDialogue => render_persona_dialogue(conv),
        }
    }
}

/// Render the prompt `kind` would receive for `conv`.
pub fn build_prompt(kind: ModelKind, conv: &Conversation) -> String {
    policy_for(kind).render(conv)
}

fn render_instruction(conv: &Conversation) -> String {
    let Conversation { character_name: name, persona, prompt, chat_history } = conv;
    let mut s = format!("### Instruction: Continue the conversation as {name}. {persona}\n");
    if let Some(history) = chat_history {
        s.push_str(&format!("### Input: \n{history}\n"));
    }
    s.push_str(&format!("### You: {prompt}\n### {name}: "));
    s
}

fn render_persona_dialogue(conv: &Conversation) -> String {
    let Conversation { character_name: name, persona, prompt, chat_history } = conv;
    let mut s = format!("{name}'s Persona: {persona}\n<START>\n");
    if let Some(history) = chat_history {
        s.push_str(&format!("{history}\n"));
    }
    s.push_str(&format!("You: {prompt}\n{name}: "));
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shinobu(history: Option<&str>) -> Conversation {
        Conversation {
            character_name: "Shinobu".to_string(),
            persona: "P".to_string(),
            prompt: "hi".to_string(),
            chat_history: history.map(str::to_string),
        }
    }

    #[test]
    fn test_nous_with_history() {
        assert_eq!(
            build_prompt(ModelKind::Nous, &shinobu(Some("H"))),
            "### Instruction: Continue the conversation as Shinobu. P\n### Input: \nH\n### You: hi\n### Shinobu: "
        );
    }

    #[test]
    fn test_nous_without_history() {
        assert_eq!(
            build_prompt(ModelKind::Nous, &shinobu(None)),
            "### Instruction: Continue the conversation as Shinobu. P\n### You: hi\n### Shinobu: "
        );
    }

    #[test]
    fn test_pygmalion_with_history() {
        assert_eq!(
            build_prompt(ModelKind::Pygmalion, &shinobu(Some("H"))),
            "Shinobu's Persona: P\n<START>\nH\nYou: hi\nShinobu: "
        );
    }

    #[test]
    fn test_pygmalion_without_history() {
        assert_eq!(
            build_prompt(ModelKind::Pygmalion, &shinobu(None)),
            "Shinobu's Persona: P\n<START>\nYou: hi\nShinobu: "
        );
    }

    #[test]
    fn test_empty_history_counts_as_present() {
        assert_eq!(
            build_prompt(ModelKind::Pygmalion, &shinobu(Some(""))),
            "Shinobu's Persona: P\n<START>\n\nYou: hi\nShinobu: "
        );
    }

    #[test]
    fn test_empty_fields_are_formatted_verbatim() {
        let conv = Conversation::default();
        assert_eq!(
            build_prompt(ModelKind::Nous, &conv),
            "### Instruction: Continue the conversation as . \n### You: \n### : "
        );
    }

    #[test]
    fn test_build_prompt_is_idempotent() {
        for kind in ModelKind::ALL {
            for conv in [shinobu(None), shinobu(Some("H"))] {
                assert_eq!(build_prompt(kind, &conv), build_prompt(kind, &conv));
            }
        }
    }

    #[test]
    fn test_braces_in_fields_are_not_interpreted() {
        let conv = Conversation {
            character_name: "{name}".to_string(),
            ..shinobu(None)
        };
        assert!(build_prompt(ModelKind::Pygmalion, &conv).starts_with("{name}'s Persona: P"));
    }

    #[test]
    fn test_every_kind_has_its_own_policy_row() {
        assert_eq!(POLICIES.len(), ModelKind::ALL.len());
        for kind in ModelKind::ALL {
            assert_eq!(POLICIES[kind as usize].0, kind, "policy row out of order for {kind}");
        }
        assert_eq!(policy_for(ModelKind::Nous).style, PromptStyle::Instruction);
        assert_eq!(policy_for(ModelKind::Pygmalion).style, PromptStyle::PersonaDialogue);
    }

    #[test]
    fn test_nous_decoding_has_no_repetition_penalty() {
        let d = policy_for(ModelKind::Nous).decoding;
        assert!((d.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(d.max_new_tokens, 512);
        assert!(d.repetition_penalty.is_none());

        let p = d.to_sampling_params(vec![2]);
        assert!((p.repetition_penalty - 1.0).abs() < f64::EPSILON);
        assert_eq!(p.stop_token_ids, vec![2]);
    }

    #[test]
    fn test_pygmalion_decoding_uses_penalty_1_5() {
        let d = policy_for(ModelKind::Pygmalion).decoding;
        assert!((d.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(d.max_new_tokens, 512);
        assert_eq!(d.repetition_penalty, Some(1.5));

        let p = d.to_sampling_params(vec![]);
        assert!((p.repetition_penalty - 1.5).abs() < f64::EPSILON);
        assert!((p.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(p.max_new_tokens, 512);
        assert!(p.seed.is_none());
    }
}
