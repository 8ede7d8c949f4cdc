//! Project configuration: the deployment descriptor tying admins, engines,
//! workspaces, and mock sources together.

use crate::config::env_subst::substitute_env;
use crate::config::model::{Mock, StatefulResourceConfig};
use crate::error::{Error, Result, ValidationFailure};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Version tag a project document must carry
pub const PROJECT_VERSION: &str = "1";

/// A control-plane instance, local (port) or remote (url)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminInstance {
    /// Unique admin name
    pub name: String,
    /// Remote admin URL; set for admins this project does not start itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Listening port of a locally managed admin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// A data-plane instance serving mock traffic
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInstance {
    /// Unique engine name
    pub name: String,
    /// Name of the admin this engine reports to
    pub admin: String,
    /// Listening port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// A named grouping of mocks assigned to a subset of engines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDef {
    /// Unique workspace name
    pub name: String,
    /// Engines this workspace is served by
    #[serde(default)]
    pub engines: Vec<String>,
}

/// A mock source in a project: inline, a single file, or a glob
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MockRef {
    /// A single configuration file, relative to the project file
    File {
        /// File path
        file: String,
    },
    /// A glob over configuration files, relative to the project file
    Glob {
        /// Glob pattern
        glob: String,
    },
    /// A mock written directly into the project document
    Inline(Box<Mock>),
}

/// The project deployment descriptor (v1)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Format version; must equal [`PROJECT_VERSION`]
    pub version: String,
    /// Control-plane instances
    #[serde(default)]
    pub admins: Vec<AdminInstance>,
    /// Data-plane instances
    #[serde(default)]
    pub engines: Vec<EngineInstance>,
    /// Workspace groupings
    #[serde(default)]
    pub workspaces: Vec<WorkspaceDef>,
    /// Mock sources
    #[serde(default)]
    pub mocks: Vec<MockRef>,
    /// Stateful resources shared by every engine
    #[serde(default)]
    pub stateful_resources: Vec<StatefulResourceConfig>,
}

impl ProjectConfig {
    /// Parse a project file (JSON or YAML by extension) with environment
    /// substitution applied.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::not_found(path),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Error::Io(e),
        })?;
        if raw.is_empty() {
            return Err(Error::EmptyFile {
                path: path.to_path_buf(),
            });
        }
        let substituted = substitute_env(&raw);
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
            Some("yaml") | Some("yml")
        );
        let project: Self = if is_yaml {
            serde_yaml::from_str(&substituted)
                .map_err(|e| Error::invalid_syntax(format!("YAML parse error: {e}")))?
        } else {
            serde_json::from_str(&substituted)
                .map_err(|e| Error::invalid_syntax(format!("JSON parse error: {e}")))?
        };
        project.validate()?;
        Ok(project)
    }

    /// Check every cross-reference invariant.
    ///
    /// Unresolved references are reported together as a validation error;
    /// two services claiming one listening port is a dedicated
    /// [`Error::PortConflict`].
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.version != PROJECT_VERSION {
            errors.push(ValidationFailure::new(
                "version",
                format!("must be \"{}\", got \"{}\"", PROJECT_VERSION, self.version),
            ));
        }

        let mut admin_names = HashSet::new();
        for (index, admin) in self.admins.iter().enumerate() {
            if admin.name.is_empty() {
                errors.push(ValidationFailure::new(
                    format!("admins.{index}.name"),
                    "admin name must not be empty",
                ));
            } else if !admin_names.insert(admin.name.as_str()) {
                errors.push(ValidationFailure::new(
                    format!("admins.{index}.name"),
                    format!("duplicate admin name '{}'", admin.name),
                ));
            }
        }

        let mut engine_names = HashSet::new();
        for (index, engine) in self.engines.iter().enumerate() {
            if !engine_names.insert(engine.name.as_str()) {
                errors.push(ValidationFailure::new(
                    format!("engines.{index}.name"),
                    format!("duplicate engine name '{}'", engine.name),
                ));
            }
            if !admin_names.contains(engine.admin.as_str()) {
                errors.push(ValidationFailure::new(
                    format!("engines.{index}.admin"),
                    format!("references undeclared admin '{}'", engine.admin),
                ));
            }
        }

        let mut workspace_names = HashSet::new();
        for (index, workspace) in self.workspaces.iter().enumerate() {
            if !workspace_names.insert(workspace.name.as_str()) {
                errors.push(ValidationFailure::new(
                    format!("workspaces.{index}.name"),
                    format!("duplicate workspace name '{}'", workspace.name),
                ));
            }
            for (engine_index, engine) in workspace.engines.iter().enumerate() {
                if !engine_names.contains(engine.as_str()) {
                    errors.push(ValidationFailure::new(
                        format!("workspaces.{index}.engines.{engine_index}"),
                        format!("references undeclared engine '{engine}'"),
                    ));
                }
            }
        }

        if !workspace_names.is_empty() {
            for (index, mock_ref) in self.mocks.iter().enumerate() {
                if let MockRef::Inline(mock) = mock_ref {
                    if !mock.workspace.is_empty()
                        && !workspace_names.contains(mock.workspace.as_str())
                    {
                        errors.push(ValidationFailure::new(
                            format!("mocks.{index}.workspace"),
                            format!("references undeclared workspace '{}'", mock.workspace),
                        ));
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(Error::validation_all(errors));
        }

        // Port uniqueness across every locally listening service.
        let mut claimed: HashMap<u16, String> = HashMap::new();
        let services = self
            .admins
            .iter()
            .filter_map(|a| a.port.map(|p| (format!("admin '{}'", a.name), p)))
            .chain(
                self.engines
                    .iter()
                    .filter_map(|e| e.port.map(|p| (format!("engine '{}'", e.name), p))),
            );
        for (service, port) in services {
            if let Some(first) = claimed.get(&port) {
                return Err(Error::PortConflict {
                    port,
                    first: first.clone(),
                    second: service,
                });
            }
            claimed.insert(port, service);
        }

        Ok(())
    }

    /// Inline mocks declared directly in the project document.
    pub fn inline_mocks(&self) -> Vec<Mock> {
        self.mocks
            .iter()
            .filter_map(|r| match r {
                MockRef::Inline(mock) => Some((**mock).clone()),
                _ => None,
            })
            .collect()
    }

    /// Expand file and glob mock references into concrete paths, relative to
    /// the directory holding the project file.
    pub fn mock_source_paths(&self, base_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for mock_ref in &self.mocks {
            match mock_ref {
                MockRef::File { file } => paths.push(base_dir.join(file)),
                MockRef::Glob { glob } => {
                    let walker = globwalk::GlobWalkerBuilder::from_patterns(base_dir, &[glob])
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| {
                            Error::invalid_syntax(format!("bad mock glob '{glob}': {e}"))
                        })?;
                    for entry in walker {
                        match entry {
                            Ok(entry) if entry.file_type().is_file() => {
                                paths.push(entry.into_path());
                            }
                            Ok(_) => {}
                            Err(e) => debug!(%e, "skipping unreadable glob entry"),
                        }
                    }
                }
                MockRef::Inline(_) => {}
            }
        }
        paths.sort();
        paths.dedup();
        Ok(paths)
    }
}
