//! Guided-workflow prompt templates.

use serde_json::{json, Map, Value};

pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

pub struct PromptDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: &'static [PromptArgument],
}

pub const PROMPTS: &[PromptDefinition] = &[
    PromptDefinition {
        name: "create_automation_wizard",
        description: "Guided workflow to create an automation from a natural-language \
                      description.",
        arguments: &[
            PromptArgument {
                name: "description",
                description: "What the automation should do, in plain language",
                required: true,
            },
            PromptArgument {
                name: "area",
                description: "Area to focus entity discovery on",
                required: false,
            },
        ],
    },
    PromptDefinition {
        name: "optimize_automations",
        description: "Review all automations for conflicts, gaps, and improvements.",
        arguments: &[],
    },
    PromptDefinition {
        name: "troubleshoot_entity",
        description: "Diagnose why an entity is misbehaving using state, history, and the \
                      error log.",
        arguments: &[PromptArgument {
            name: "entity_id",
            description: "The entity to investigate",
            required: true,
        }],
    },
    PromptDefinition {
        name: "summarize_home_status",
        description: "Produce a concise status report of the whole home.",
        arguments: &[],
    },
];

pub fn prompt_list_payload() -> Value {
    let prompts: Vec<Value> = PROMPTS
        .iter()
        .map(|prompt| {
            json!({
                "name": prompt.name,
                "description": prompt.description,
                "arguments": prompt
                    .arguments
                    .iter()
                    .map(|argument| {
                        json!({
                            "name": argument.name,
                            "description": argument.description,
                            "required": argument.required,
                        })
                    })
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({"prompts": prompts})
}

/// Renders a prompt to its message text. Unknown names and missing required
/// arguments are errors.
pub fn render_prompt(name: &str, arguments: &Map<String, Value>) -> Result<String, String> {
    let definition = PROMPTS
        .iter()
        .find(|prompt| prompt.name == name)
        .ok_or_else(|| format!("unknown prompt '{name}'"))?;
    for argument in definition.arguments {
        if argument.required
            && arguments
                .get(argument.name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .is_none()
        {
            return Err(format!(
                "prompt '{name}' requires argument '{}'",
                argument.name
            ));
        }
    }

    let arg = |key: &str| {
        arguments
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string()
    };

    match name {
        "create_automation_wizard" => {
            let description = arg("description");
            let area = arg("area");
            let area_step = if area.is_empty() {
                "2. If the description mentions a room or area, list the devices and entities \
                 there with list_areas, list_entities, and list_devices. Otherwise identify the \
                 relevant entities with search_entities and get_all_states."
                    .to_string()
            } else {
                format!(
                    "2. List the available devices and entities in the '{area}' area using \
                     list_entities and list_devices filtered by that area, and present a summary \
                     so the user can confirm which entities to use."
                )
            };
            Ok(format!(
                "Help me create a Home Assistant automation based on this description:\n\
                 \"{description}\"\n\n\
                 Follow these steps carefully:\n\n\
                 1. Parse the description above and identify the intended trigger(s), \
                 condition(s), and action(s). Summarize your understanding and ask for \
                 confirmation before proceeding.\n\
                 {area_step}\n\
                 3. Build the complete automation configuration with proper trigger, condition, \
                 and action sections, using the entity IDs discovered in the previous step.\n\
                 4. Validate the configuration with the validate_automation_config tool to catch \
                 errors before creating it.\n\
                 5. Create the automation with the create_automation tool. Present the preview \
                 and wait for confirmation before finalizing.\n\n\
                 Important: at each step, explain what you are doing and why. If anything is \
                 ambiguous, ask for clarification rather than guessing."
            ))
        }
        "optimize_automations" => Ok("Perform a comprehensive review of all Home Assistant \
             automations and suggest improvements.\n\n\
             Follow these steps:\n\n\
             1. List all automations with list_automations and retrieve each configuration with \
             get_automation.\n\
             2. Run detect_automation_conflicts and present any conflicts with explanations.\n\
             3. Run analyze_devices to find coverage gaps, then suggest_automations for concrete \
             additions worth creating.\n\
             4. For each improvement, show the proposed configuration and apply it only after \
             the user approves, using update_automation or create_automation.\n\n\
             Be conservative: never modify or delete an automation without explicit approval."
            .to_string()),
        "troubleshoot_entity" => {
            let entity_id = arg("entity_id");
            Ok(format!(
                "Help me troubleshoot the Home Assistant entity '{entity_id}'.\n\n\
                 Follow these steps:\n\n\
                 1. Get its current state and attributes with get_entity_state and its registry \
                 entry with get_entity_details.\n\
                 2. Review its recent behavior with get_entity_history and get_logbook.\n\
                 3. Check the error log with get_error_log for related warnings or errors.\n\
                 4. If automations reference it, inspect them with list_automations and \
                 get_automation.\n\
                 5. Summarize the likely cause and propose a fix; apply configuration changes \
                 only after confirmation."
            ))
        }
        "summarize_home_status" => Ok("Produce a concise status report of the home.\n\n\
             1. Use get_all_states grouped by domain for an overview of lights, climate, locks, \
             and sensors.\n\
             2. Highlight anything unusual: unavailable entities, open doors or windows, low \
             batteries.\n\
             3. List currently firing automations (state 'on' with a recent last_triggered).\n\
             4. Keep it short: a handful of bullet points a person can scan in ten seconds."
            .to_string()),
        _ => Err(format!("unknown prompt '{name}'")),
    }
}
