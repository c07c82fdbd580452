//! Prompts for the context-gathering agent, the proxy and the writer.
//!
//! Only the control logic depends on these texts through a few fixed
//! prefixes: the writer keeps user messages starting with [`README_OPEN_TAG`]
//! or [`TOOL_RESULT_PREFIX`] when it rebuilds its context.

use regex::Regex;
use std::sync::LazyLock;

use crate::extraction::ExtractionStatus;

/// Opening tag wrapping the README in the first user message.
pub const README_OPEN_TAG: &str = "<read>";

/// Prefix of every collated tool result message.
pub const TOOL_RESULT_PREFIX: &str = "Result of ";

static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid html comment regex"));

/// System prompt of the context-gathering agent.
pub const AGENT_SYSTEM_PROMPT: &str = r#"You are a software developer with broad experience maintaining a large project.
You are working on an open-source project with multiple contributors and no complete documentation.
The README file contains some basic information marked between <read> and </read>.
Your task is to invoke search API calls to gather information, then have documentation written that guides a junior developer through how the project is used and how it works."#;

/// Sent after a batch of tool results.
pub const ANALYZE_PROMPT: &str = "Let's analyze collected context first";

/// Sent when the proxy could not extract a usable set of calls.
pub const INVALID_CALLS_PROMPT: &str = "The search API calls seem not valid. Please check the arguments you give carefully and try again.";

/// Questions asked at the end of every round except the last.
pub const NEXT_STEP_PROMPT: &str = r#"Based on your analysis, answer below questions:
- do we need more context: construct search API calls to get more context of the project. (leave it empty if you don't need more context)
- do you have enough information to start writing a comprehensive document?"#;

/// System prompt of the documentation writer.
pub const WRITER_SYSTEM_PROMPT: &str = r#"You are a seasoned software developer with extensive experience maintaining large projects.
You are working on an open-source project with multiple contributors, and the code has little documentation or comments.
Your task is to document the code so that a junior developer can use and understand the project."#;

/// Instructions for the documentation writer, including the edit format.
pub const WRITER_USER_PROMPT: &str = r#"Write documentation for the project, based on the retrieved context. Document the code in place: add doc comments or docstrings to the functions, classes and modules you have seen, explaining what they do, how they connect and how they depend on each other.

Return every change as an edit block. Each block names a file and holds the original lines and their documented replacement:

<file>path/to/file.py</file>
<code>
<original>
def area(self):
    return self.width * self.height
</original>
<patched>
def area(self):
    """Return the area of the rectangle in square units."""
    return self.width * self.height
</patched>
</code>

Rules:
- The file path must be a path of the codebase, relative to the project root.
- The original lines must be copied exactly from the code you retrieved. Indentation may differ, everything else must match.
- Keep the original block short: a few lines that identify the place to document.
- An empty original inserts the patched text at the top of the file (for a module docstring or header comment).
- Do not change behavior. Only add or improve documentation.
- You may write several edit blocks, for several files.

DO NOT MAKE THINGS UP. IF YOU DON'T KNOW WHAT A PIECE OF CODE DOES, LEAVE IT UNDOCUMENTED."#;

/// Prompt asking the agent to start gathering context with the given APIs.
pub fn context_retrieval_prompt(api_listing: &str, state_machine: bool) -> String {
    let batching = if state_machine {
        "\n\n- Make exactly one API call per round. Please make sure to provide concrete arguments for it."
    } else {
        "\n\n- You can make multiple API calls in a single round. Please make sure to provide concrete arguments for each API call."
    };

    format!(
        "Analyze the repository to understand its structure and connections. Use the following search APIs to get more context of the project.\
         \nIt is recommended to run extract_fullcode on the main files before running the other APIs.\
         \n{api_listing}\
         \n\n- Do not skip ordinary source files: they may contain important information. Analyze carefully before deciding.\
         \n\n- Review any documentation or inline comments to gather insights into the codebase and its intended behavior.\
         {batching}\
         \n\n- Use the folder structure to build correct file_path arguments.\
         \n\n- Now analyze the codebase and select the APIs needed to get more context of the project. Each API call must have concrete arguments."
    )
}

/// Next-step questions for state-machine mode, listing what may follow.
pub fn next_step_prompt_for(api_listing: &str) -> String {
    format!(
        "{NEXT_STEP_PROMPT}\n\nThe APIs you may call next are:\n{api_listing}\n\nCall write_doc() once you have enough information."
    )
}

/// System prompt of the proxy that turns free text into JSON calls.
pub fn proxy_prompt(api_listing: &str, api_schema: &str, single_call: bool) -> String {
    let call_note = if single_call {
        "- API_calls must contain at most one call."
    } else {
        "- Leave API_calls empty if there is no right call to make for question 1."
    };

    format!(
        r#"You are a helpful assistant that retrieves API calls from a text into JSON format.
The text will consist of two parts:
1. do we need more context?
2. do you have enough information to start writing a good document?
Extract API calls from question 1 and the confirmation from question 2.

The API calls include:
{api_listing}

Their parameters, as function schemas:
{api_schema}

Provide your answer in JSON like the example below, without the argument placeholders in the API calls.
For example, search_code(code_str="str") should be search_code("str")
search_method_in_file("method_name", "path.to.file") should be search_method_in_file("method_name", "path/to/file")
Make sure each API call is written as a valid call expression with string arguments.

### NOTE
- Return 1 if the answer to question 2 is "Yes", else 0.
{call_note}

{{
    "API_calls": ["api_call_1(args)", "api_call_2(args)", ...],
    "Finish": 1 | 0
}}"#
    )
}

/// Corrective message after a write attempt that did not finish.
pub fn retry_prompt(status: ExtractionStatus, message: &str) -> String {
    let hint = match status {
        ExtractionStatus::NoEdits | ExtractionStatus::RawTextProduced => {
            "No answer was produced. Please write the documentation edits now."
        }
        ExtractionStatus::EditsUnparseable => {
            "No edit block could be read. Use <file>...</file> followed by <code>...</code> for every edit."
        }
        ExtractionStatus::EditsUnmatched => {
            "None of the original blocks were found in the files. Copy the original lines exactly from the retrieved code."
        }
        ExtractionStatus::MatchedEmptyDiff => {
            "The edits did not change anything. The patched text must add documentation."
        }
        ExtractionStatus::MatchedEmptyOrigin => {
            "Some edits had an empty original. Anchor every edit on existing lines of code."
        }
        ExtractionStatus::Finished => "",
    };

    format!(
        "The task could not be finished ({}). {}\n{}\nPlease write the documentation edits again.",
        status, message, hint
    )
}

/// Wrap a README in `<read>` tags and append the folder structure.
///
/// HTML comments are removed and every line is trimmed; blank lines are
/// dropped.
pub fn prepare_readme_prompt(readme: &str, folder_structure: &str) -> String {
    let without_comments = HTML_COMMENT.replace_all(readme, "");
    let body = without_comments
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{README_OPEN_TAG}\nREADME file:\n{body}\n</read>\nCodebase folder structure:\n{folder_structure}"
    )
}
