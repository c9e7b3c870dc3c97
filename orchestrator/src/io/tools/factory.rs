//! Role-to-tool resolution and dispatch.
//!
//! Precedence for each role: explicit CLI override, then the tool-config
//! file, then the built-in default.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use super::api::ApiTool;
use super::process::ProcessTool;
use super::{InvokeOptions, Tool, ToolKind, ToolOutput};
use crate::core::types::Role;

/// Where a role's tool assignment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentSource {
    Cli,
    ConfigFile,
    Default,
}

/// Resolved tool for every role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolAssignments {
    entries: BTreeMap<Role, (ToolKind, AssignmentSource)>,
}

impl Default for ToolAssignments {
    fn default() -> Self {
        Self {
            entries: Role::ALL
                .into_iter()
                .map(|role| (role, (ToolKind::default_for(role), AssignmentSource::Default)))
                .collect(),
        }
    }
}

impl ToolAssignments {
    /// Merge the config-file mapping and CLI overrides over the defaults.
    pub fn resolve(
        file: &BTreeMap<Role, ToolKind>,
        cli: &BTreeMap<Role, ToolKind>,
    ) -> Self {
        let mut assignments = Self::default();
        for (role, kind) in file {
            assignments
                .entries
                .insert(*role, (*kind, AssignmentSource::ConfigFile));
        }
        for (role, kind) in cli {
            assignments.entries.insert(*role, (*kind, AssignmentSource::Cli));
        }
        assignments
    }

    pub fn kind(&self, role: Role) -> ToolKind {
        self.entries
            .get(&role)
            .map_or_else(|| ToolKind::default_for(role), |(kind, _)| *kind)
    }

    pub fn source(&self, role: Role) -> AssignmentSource {
        self.entries
            .get(&role)
            .map_or(AssignmentSource::Default, |(_, source)| *source)
    }
}

/// Load a role → tool mapping. `.toml` files are parsed as TOML, anything
/// else as JSON. A missing file yields an empty mapping.
pub fn load_tool_config(path: &Path) -> Result<BTreeMap<Role, ToolKind>> {
    if !path.exists() {
        warn!(path = %path.display(), "tool config file not found, using defaults");
        return Ok(BTreeMap::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let raw: BTreeMap<String, String> = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
    } else {
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
    };
    let mut mapping = BTreeMap::new();
    for (role, tool) in raw {
        let role: Role = role
            .parse()
            .with_context(|| format!("in tool config {}", path.display()))?;
        let kind: ToolKind = tool
            .parse()
            .with_context(|| format!("tool for role {role} in {}", path.display()))?;
        mapping.insert(role, kind);
    }
    debug!(roles = mapping.len(), "tool config loaded");
    Ok(mapping)
}

/// Parse `--<role> <tool>` CLI values into a mapping, skipping unset roles.
pub fn cli_overrides<'a>(
    values: impl IntoIterator<Item = (Role, Option<&'a str>)>,
) -> Result<BTreeMap<Role, ToolKind>> {
    let mut mapping = BTreeMap::new();
    for (role, value) in values {
        if let Some(value) = value {
            let kind: ToolKind = value
                .parse()
                .with_context(|| format!("--{}", role.as_str().replace('_', "-")))?;
            mapping.insert(role, kind);
        }
    }
    Ok(mapping)
}

/// Concrete backend for one kind.
#[derive(Debug, Clone)]
pub enum ToolBackend {
    Process(ProcessTool),
    Api(ApiTool),
}

impl ToolBackend {
    pub fn for_kind(kind: ToolKind) -> Result<Self> {
        if kind.is_api() {
            Ok(ToolBackend::Api(ApiTool::from_env(kind)?))
        } else {
            Ok(ToolBackend::Process(ProcessTool::new(kind)?))
        }
    }

    fn as_tool(&self) -> &dyn Tool {
        match self {
            ToolBackend::Process(tool) => tool,
            ToolBackend::Api(tool) => tool,
        }
    }
}

impl Tool for ToolBackend {
    fn kind(&self) -> ToolKind {
        self.as_tool().kind()
    }

    fn is_available(&self) -> bool {
        self.as_tool().is_available()
    }

    fn invoke(&self, role: Role, prompt: &str, options: &InvokeOptions) -> Result<ToolOutput> {
        self.as_tool().invoke(role, prompt, options)
    }
}

/// What the pipeline needs from the tool layer: invoke the tool serving a role.
pub trait ToolSet {
    fn kind_for(&self, role: Role) -> ToolKind;

    fn invoke(&self, role: Role, prompt: &str, options: &InvokeOptions) -> Result<ToolOutput>;
}

/// Production tool set: one backend per assigned kind.
#[derive(Debug)]
pub struct ToolBox {
    assignments: ToolAssignments,
    backends: BTreeMap<Role, ToolBackend>,
}

impl ToolBox {
    pub fn new(assignments: ToolAssignments) -> Result<Self> {
        let mut backends = BTreeMap::new();
        for role in Role::ALL {
            backends.insert(role, ToolBackend::for_kind(assignments.kind(role))?);
        }
        Ok(Self {
            assignments,
            backends,
        })
    }

    /// Warnings for assigned tools that cannot be used right now.
    pub fn preflight(&self) -> Vec<String> {
        let mut checked = Vec::new();
        let mut warnings = Vec::new();
        for backend in self.backends.values() {
            let kind = backend.kind();
            if checked.contains(&kind) {
                continue;
            }
            checked.push(kind);
            if backend.is_available() {
                continue;
            }
            warnings.push(match backend {
                ToolBackend::Api(api) => format!(
                    "tool '{kind}' needs {} set in the environment",
                    api.credential_var()
                ),
                ToolBackend::Process(_) => {
                    format!("tool '{kind}' not found in PATH; install it before running")
                }
            });
        }
        warnings
    }
}

impl ToolSet for ToolBox {
    fn kind_for(&self, role: Role) -> ToolKind {
        self.assignments.kind(role)
    }

    fn invoke(&self, role: Role, prompt: &str, options: &InvokeOptions) -> Result<ToolOutput> {
        match self.backends.get(&role) {
            Some(backend) => {
                debug!(
                    role = %role,
                    tool = %backend.kind(),
                    source = ?self.assignments.source(role),
                    "dispatching to assigned tool"
                );
                backend.invoke(role, prompt, options)
            }
            None => bail!("no tool assigned to role {role}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_beats_file_beats_default() {
        let file = BTreeMap::from([
            (Role::Planner, ToolKind::Claude),
            (Role::Fixer, ToolKind::Gemini),
        ]);
        let cli = BTreeMap::from([(Role::Planner, ToolKind::OpenAi)]);
        let assignments = ToolAssignments::resolve(&file, &cli);

        assert_eq!(assignments.kind(Role::Planner), ToolKind::OpenAi);
        assert_eq!(assignments.source(Role::Planner), AssignmentSource::Cli);
        assert_eq!(assignments.kind(Role::Fixer), ToolKind::Gemini);
        assert_eq!(assignments.source(Role::Fixer), AssignmentSource::ConfigFile);
        assert_eq!(assignments.kind(Role::Brainstormer), ToolKind::Gemini);
        assert_eq!(assignments.source(Role::Brainstormer), AssignmentSource::Default);
        assert_eq!(assignments.kind(Role::Executor), ToolKind::Claude);
    }

    #[test]
    fn loads_json_and_toml_mappings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let json_path = temp.path().join("tools.json");
        fs::write(&json_path, r#"{"planner": "claude", "code_reviewer": "anthropic"}"#)
            .expect("write");
        let mapping = load_tool_config(&json_path).expect("load json");
        assert_eq!(mapping.get(&Role::Planner), Some(&ToolKind::Claude));
        assert_eq!(mapping.get(&Role::CodeReviewer), Some(&ToolKind::Anthropic));

        let toml_path = temp.path().join("tools.toml");
        fs::write(&toml_path, "fixer = \"codex\"\n").expect("write");
        let mapping = load_tool_config(&toml_path).expect("load toml");
        assert_eq!(mapping.get(&Role::Fixer), Some(&ToolKind::Codex));

        assert!(load_tool_config(&temp.path().join("missing.json")).expect("missing").is_empty());
    }

    #[test]
    fn unknown_role_or_tool_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tools.json");
        fs::write(&path, r#"{"designer": "claude"}"#).expect("write");
        assert!(load_tool_config(&path).is_err());
        fs::write(&path, r#"{"planner": "llama"}"#).expect("write");
        assert!(load_tool_config(&path).is_err());
    }

    #[test]
    fn cli_overrides_skip_unset_roles() {
        let mapping = cli_overrides([
            (Role::Executor, Some("openai")),
            (Role::Fixer, None),
        ])
        .expect("overrides");
        assert_eq!(mapping.len(), 1);
        assert!(cli_overrides([(Role::Executor, Some("nope"))]).is_err());
    }
}
