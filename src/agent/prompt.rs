//! Prompt templates for the conversation agent and memory summarizer.

use crate::models::Turn;

/// Returned to the user when the agent loop hits its iteration cap.
pub const FORCED_STOP_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";

const SYSTEM_PROMPT_HEADER: &str = r#"Assistant is designed to assist the human using the tools provided, from answering simple questions to providing in-depth explanations and discussions on the topics given below.

Topics:
"#;

const SYSTEM_PROMPT_FOOTER: &str = r#"
Assistant must not generate any answer on its own. If the Assistant cannot answer the user's query using the tools provided, the Assistant should apologise and say that it is unable to answer.

Output of the tools is a JSON object with the topic as key, whose value is an object with the location as key, whose value is an object with the year as key and the tool's result as value.
If a tool reports an error, such as a location that could not be found or missing data, explain the problem to the user and apologise."#;

/// Build the system prompt listing the available indicator topics.
pub fn system_prompt(topics: &[&str]) -> String {
    let mut prompt = String::from(SYSTEM_PROMPT_HEADER);
    prompt.push_str(&topics.join("\n"));
    prompt.push('\n');
    prompt.push_str(SYSTEM_PROMPT_FOOTER);
    prompt
}

/// Description of a single-year indicator tool.
pub fn tool_description(topic: &str, scope: &str, span: &str) -> String {
    format!(
        "Use this tool when you need to calculate {topic} for a {scope} in a given location \
         and a given {span} year.\n\
         To use the tool, you must provide all of the following parameters: [location, year].\n\
         location: location details like village, district and state name from the user input\n\
         year: year for which the annual {topic} is to be calculated"
    )
}

/// Prefix of the system message carrying the running conversation summary.
pub const SUMMARY_MESSAGE_PREFIX: &str = "Summary of the earlier conversation:\n";

const SUMMARY_PROMPT: &str = r#"Progressively summarize the lines of conversation provided, adding onto the previous summary and returning a new summary.

EXAMPLE
Current summary:
The human asks about rainfall in a village. The AI reports the annual rainfall for the requested year.

New lines of conversation:
Human: And what about evapotranspiration in the same village?
AI: The actual evapotranspiration there was 612.4 mm for that hydrological year.

New summary:
The human asks about rainfall in a village. The AI reports the annual rainfall for the requested year. The human then asks about evapotranspiration in the same village and the AI reports 612.4 mm for that hydrological year.
END OF EXAMPLE
"#;

/// Build the summarization prompt for folding `turns` into `summary`.
pub fn summary_prompt(summary: Option<&str>, turns: &[Turn]) -> String {
    let new_lines: Vec<String> = turns.iter().map(Turn::transcript_line).collect();
    format!(
        "{}\nCurrent summary:\n{}\n\nNew lines of conversation:\n{}\n\nNew summary:",
        SUMMARY_PROMPT,
        summary.unwrap_or(""),
        new_lines.join("\n")
    )
}
