//! Capability registry and dispatch for the context-gathering agent.
//!
//! The registry is a static table of the functions the model may request.
//! It renders them for prompts and function-calling schemas, binds parsed
//! call expressions to named arguments, and knows which capability may follow
//! which in state-machine mode.

pub mod search;

pub use search::{CodeSearch, LocalCodeSearch, SearchOutput};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use super::invocation::ParsedCall;

/// Name of the terminal capability that hands over to the writing agent.
pub const WRITE_DOC: &str = "write_doc";

/// Errors raised while binding or dispatching a capability call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The name is not in the registry.
    #[error("Unknown function name {0}")]
    UnknownFunction(String),

    /// The name exists but may not be called right now.
    #[error("Function {0} is not allowed at this point")]
    NotAllowed(String),

    /// Wrong number of positional arguments.
    #[error("Function {name} takes {expected} arguments but {found} were given")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// A bound intent lacks a declared parameter.
    #[error("Missing argument {param} for {name}")]
    MissingArgument { name: String, param: String },
}

/// One declared parameter of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: &'static str,
    pub description: &'static str,
}

/// One registered capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySpec {
    pub name: &'static str,
    pub params: &'static [ParamSpec],
    pub short_description: &'static str,
    pub long_description: &'static str,
}

impl CapabilitySpec {
    /// Number of positional parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether calling this capability ends context gathering.
    pub fn is_terminal(&self) -> bool {
        self.name == WRITE_DOC
    }

    /// `name(p: str, q: str)` form used in prompts.
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.name, params)
    }

    /// Function-calling schema object.
    pub fn to_json_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .params
            .iter()
            .map(|p| {
                (
                    p.name.to_string(),
                    serde_json::json!({"type": "string", "description": p.description}),
                )
            })
            .collect();
        let required: Vec<&str> = self.params.iter().map(|p| p.name).collect();

        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": format!("{}\n{}", self.short_description, self.long_description),
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required
                }
            }
        })
    }
}

const CLASS_NAME: ParamSpec = ParamSpec {
    name: "class_name",
    ty: "str",
    description: "Name of the class to search for.",
};

const METHOD_NAME: ParamSpec = ParamSpec {
    name: "method_name",
    ty: "str",
    description: "Name of the method to search for.",
};

const FILE_PATH: ParamSpec = ParamSpec {
    name: "file_path",
    ty: "str",
    description: "Path of the file to search in, relative to the project root.",
};

const CODE_STR: ParamSpec = ParamSpec {
    name: "code_str",
    ty: "str",
    description: "The code snippet to search for.",
};

/// Every capability the model may request, in prompt order.
pub static CAPABILITIES: &[CapabilitySpec] = &[
    CapabilitySpec {
        name: "search_class",
        params: &[CLASS_NAME],
        short_description: "Search for a class in the codebase.",
        long_description: "Only the signature of the class is returned: its name, base classes and the signatures of its methods.",
    },
    CapabilitySpec {
        name: "search_class_in_file",
        params: &[CLASS_NAME, FILE_PATH],
        short_description: "Search for a class in a given file.",
        long_description: "Returns the full code of the class definition.",
    },
    CapabilitySpec {
        name: "search_method",
        params: &[METHOD_NAME],
        short_description: "Search for a method in the entire codebase.",
        long_description: "Returns the code of every method with that name.",
    },
    CapabilitySpec {
        name: "search_method_in_class",
        params: &[
            METHOD_NAME,
            ParamSpec {
                name: "class_name",
                ty: "str",
                description: "Consider only methods in this class.",
            },
        ],
        short_description: "Search for a method in a given class.",
        long_description: "Returns the code of the method.",
    },
    CapabilitySpec {
        name: "search_method_in_file",
        params: &[METHOD_NAME, FILE_PATH],
        short_description: "Search for a method in a given file.",
        long_description: "Returns the code of the method.",
    },
    CapabilitySpec {
        name: "search_code",
        params: &[CODE_STR],
        short_description: "Search for a code snippet in the entire codebase.",
        long_description: "Returns the method containing the snippet, or the surrounding lines when it is not inside a method.",
    },
    CapabilitySpec {
        name: "search_code_in_file",
        params: &[CODE_STR, FILE_PATH],
        short_description: "Search for a code snippet in a given file.",
        long_description: "Returns the method containing the snippet, or the surrounding lines when it is not inside a method.",
    },
    CapabilitySpec {
        name: "extract_fullcode",
        params: &[ParamSpec {
            name: "file_path",
            ty: "str",
            description: "The file to extract the code from.",
        }],
        short_description: "Get all the code from a file.",
        long_description: "Returns the entire content of the file.",
    },
    CapabilitySpec {
        name: WRITE_DOC,
        params: &[],
        short_description: "Ask another agent to write the documentation.",
        long_description: "Call this when the collected context is sufficient to write comprehensive documentation.",
    },
];

/// A validated request to run one capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallIntent {
    pub function_name: String,
    pub arguments: BTreeMap<String, String>,
    /// The call expression exactly as the model wrote it.
    pub call: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl ToolCallIntent {
    /// Argument bound to `param`.
    pub fn argument(&self, param: &str) -> Result<&str, DispatchError> {
        self.arguments
            .get(param)
            .map(String::as_str)
            .ok_or_else(|| DispatchError::MissingArgument {
                name: self.function_name.clone(),
                param: param.to_string(),
            })
    }
}

/// Static capability table.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityRegistry {
    specs: &'static [CapabilitySpec],
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    /// Registry over [`CAPABILITIES`].
    pub fn new() -> Self {
        Self {
            specs: CAPABILITIES,
        }
    }

    pub fn get(&self, name: &str) -> Option<&'static CapabilitySpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Every registered name.
    pub fn names(&self) -> Vec<&'static str> {
        self.specs.iter().map(|s| s.name).collect()
    }

    /// Names of the non-terminal search capabilities.
    pub fn search_tools(&self) -> Vec<&'static str> {
        self.specs
            .iter()
            .filter(|s| !s.is_terminal())
            .map(|s| s.name)
            .collect()
    }

    /// Capabilities allowed after `previous` in state-machine mode.
    ///
    /// Before any call only searches are allowed. Class lookups and full-file
    /// extraction must be followed by another search; method and snippet
    /// searches may be followed by anything; `write_doc` has no successor.
    pub fn next_tools(&self, previous: Option<&str>) -> Vec<&'static str> {
        let all = self.names();
        let searches = self.search_tools();
        match previous {
            None => searches,
            Some("search_class" | "search_class_in_file" | "extract_fullcode") => searches,
            Some(WRITE_DOC) => Vec::new(),
            Some(_) => all,
        }
    }

    /// Bind a parsed call to its declared parameter names.
    ///
    /// Fails when the name is unknown, outside `allowed`, or has the wrong
    /// number of arguments.
    pub fn bind(
        &self,
        call: &ParsedCall,
        raw: &str,
        allowed: Option<&[&str]>,
    ) -> Result<ToolCallIntent, DispatchError> {
        let spec = self
            .get(&call.name)
            .ok_or_else(|| DispatchError::UnknownFunction(call.name.clone()))?;

        if allowed.is_some_and(|names| !names.contains(&spec.name)) {
            return Err(DispatchError::NotAllowed(spec.name.to_string()));
        }

        if call.args.len() != spec.arity() {
            return Err(DispatchError::ArityMismatch {
                name: spec.name.to_string(),
                expected: spec.arity(),
                found: call.args.len(),
            });
        }

        let arguments = spec
            .params
            .iter()
            .zip(&call.args)
            .map(|(p, value)| (p.name.to_string(), value.clone()))
            .collect();

        Ok(ToolCallIntent {
            function_name: spec.name.to_string(),
            arguments,
            call: raw.trim().to_string(),
            correlation_id: Some(Uuid::new_v4()),
        })
    }

    /// Function-calling schemas for `names`, in registry order.
    pub fn to_json_schema(&self, names: &[&str]) -> Value {
        Value::Array(
            self.specs
                .iter()
                .filter(|s| names.contains(&s.name))
                .map(CapabilitySpec::to_json_schema)
                .collect(),
        )
    }

    /// One line per capability in `names`: `- signature: short description`.
    pub fn prompt_listing(&self, names: &[&str]) -> String {
        self.specs
            .iter()
            .filter(|s| names.contains(&s.name))
            .map(|s| format!("- {}: {}", s.signature(), s.short_description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Run one intent against the search backend.
///
/// Never fails: dispatch problems come back as a failed [`SearchOutput`] so
/// they can be shown to the model.
pub fn dispatch(search: &dyn CodeSearch, intent: &ToolCallIntent) -> SearchOutput {
    match try_dispatch(search, intent) {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!(call = %intent.call, error = %e, "Dispatch failed");
            SearchOutput::failure(
                e.to_string(),
                "The tool call could not be executed. Please only use the tools provided.",
            )
        }
    }
}

fn try_dispatch(
    search: &dyn CodeSearch,
    intent: &ToolCallIntent,
) -> Result<SearchOutput, DispatchError> {
    let arg = |name: &str| intent.argument(name);
    let output = match intent.function_name.as_str() {
        "search_class" => search.search_class(arg("class_name")?),
        "search_class_in_file" => {
            search.search_class_in_file(arg("class_name")?, arg("file_path")?)
        }
        "search_method" => search.search_method(arg("method_name")?),
        "search_method_in_class" => {
            search.search_method_in_class(arg("method_name")?, arg("class_name")?)
        }
        "search_method_in_file" => {
            search.search_method_in_file(arg("method_name")?, arg("file_path")?)
        }
        "search_code" => search.search_code(arg("code_str")?),
        "search_code_in_file" => search.search_code_in_file(arg("code_str")?, arg("file_path")?),
        "extract_fullcode" => search.extract_fullcode(arg("file_path")?),
        other => return Err(DispatchError::UnknownFunction(other.to_string())),
    };
    Ok(output)
}
