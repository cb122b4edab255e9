use crate::error::{read_source, ParseError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub site_code: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub process: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePaths {
    #[serde(default)]
    pub tosca: Vec<PathBuf>,
    #[serde(default)]
    pub bpmn: Vec<PathBuf>,
    #[serde(default)]
    pub overlay: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub sources: SourcePaths,
    #[serde(default)]
    pub output: OutputConfig,
    /// Directory relative source paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let source = read_source(path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_yaml(&source, base_dir)
    }

    pub fn from_yaml(source: &str, base_dir: impl Into<PathBuf>) -> Result<Self, ParseError> {
        let mut config = if source.trim().is_empty() {
            PipelineConfig::default()
        } else {
            serde_yaml::from_str::<Option<PipelineConfig>>(source)?.unwrap_or_default()
        };
        config.base_dir = base_dir.into();
        Ok(config)
    }

    pub fn resolve_sources(&self) -> SourcePaths {
        let resolve = |paths: &[PathBuf]| -> Vec<PathBuf> {
            paths.iter().map(|path| self.base_dir.join(path)).collect()
        };
        SourcePaths {
            tosca: resolve(&self.sources.tosca),
            bpmn: resolve(&self.sources.bpmn),
            overlay: resolve(&self.sources.overlay),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.base_dir.join(&self.output.directory)
    }
}
