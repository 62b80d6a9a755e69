use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-deployment conversation policy: prompt, gating, and stop rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,
    /// Hard cap on generation steps per cycle.
    #[serde(default = "d_40")]
    pub max_steps: u32,
    /// Stop requesting further steps once a tool produced a result.
    #[serde(default = "d_true")]
    pub stop_after_tool_result: bool,
    /// When false, the tool catalog is offered on every turn.
    #[serde(default = "d_true")]
    pub gate_enabled: bool,
    /// Lowercase phrases that signal a request for tool use.
    #[serde(default = "d_gate_keywords")]
    pub gate_keywords: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: d_system_prompt(),
            max_steps: 40,
            stop_after_tool_result: true,
            gate_enabled: true,
            gate_keywords: d_gate_keywords(),
        }
    }
}

fn d_40() -> u32 {
    40
}
fn d_true() -> bool {
    true
}

fn d_system_prompt() -> String {
    "You are a helpful assistant that can search for and display high-quality photos \
     from Unsplash upon request. You can also engage in general conversation.\n\
     \n\
     When a user greets you or asks for help, respond politely. Do NOT use any tools \
     unless the user specifically asks for photos or images. Do NOT mention the tools.\n\
     \n\
     When a user asks for photos or images, call search_unsplash_photos with their \
     query and the number of images they asked for. The tool output is displayed to \
     the user directly: after using the tool, do not generate any further text. Only \
     respond with text if there is an error or no photos were found."
        .into()
}

fn d_gate_keywords() -> Vec<String> {
    [
        "show",
        "find",
        "search",
        "looking for",
        "look for",
        "picture",
        "photo",
        "image",
        "pic",
        "display",
        "fetch",
        "get me",
        "give me",
        "send",
        "want to see",
        "like to see",
        "provide",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
