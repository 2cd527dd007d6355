//! Definition sources.
//!
//! The engine does not own persistence. A [`DefinitionSource`] hands it a
//! complete configuration whenever one is needed: at startup and on reload.

use crate::config::MockServerConfig;
use crate::error::ConfigError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supplies complete mock configurations.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Load and validate the current definitions.
    async fn load(&self) -> Result<MockServerConfig, ConfigError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// YAML definitions read from a file on every load.
#[derive(Debug, Clone)]
pub struct FileDefinitionSource {
    path: PathBuf,
}

impl FileDefinitionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DefinitionSource for FileDefinitionSource {
    async fn load(&self) -> Result<MockServerConfig, ConfigError> {
        debug!(path = %self.path.display(), "Reading mock definitions");
        let content = tokio::fs::read_to_string(&self.path).await?;
        MockServerConfig::from_yaml(&content)
            .map_err(|e| e.context(self.path.display().to_string()))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// A fixed in-memory configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDefinitionSource {
    config: MockServerConfig,
}

impl StaticDefinitionSource {
    pub fn new(config: MockServerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DefinitionSource for StaticDefinitionSource {
    async fn load(&self) -> Result<MockServerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::MockRequest;
    use crate::server::{DispatchOutcome, MockServer};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const V1: &str = r#"
projects:
  - id: p
    applications:
      - id: a
        endpoints:
          - id: ping
            method: GET
            uri: /ping
            responses:
              - id: pong
                body: pong
"#;

    const V2: &str = r#"
projects:
  - id: p
    applications:
      - id: a
        endpoints:
          - id: ping
            method: GET
            uri: /ping
            responses:
              - id: pong-v2
                body: pong again
          - id: health
            method: GET
            uri: /health
            responses:
              - id: up
                body: up
"#;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_file_source_loads_yaml() {
        let file = write_temp(V1);
        let source = FileDefinitionSource::new(file.path());

        let config = tokio_test::block_on(source.load()).unwrap();
        assert_eq!(config.endpoint_count(), 1);
        assert!(source.describe().starts_with("file:"));
    }

    #[test]
    fn test_file_source_errors() {
        let missing = FileDefinitionSource::new("/definitely/not/here.yaml");
        assert!(matches!(
            tokio_test::block_on(missing.load()),
            Err(ConfigError::Io(_))
        ));

        let file = write_temp("projects: [");
        let broken = FileDefinitionSource::new(file.path());
        assert!(tokio_test::block_on(broken.load()).is_err());
    }

    #[test]
    fn test_invalid_definitions_carry_path() {
        let file = write_temp(
            r#"
projects:
  - id: p
    applications:
      - id: a
        endpoints:
          - id: bad
            method: GET
            uri: /a/*/b
"#,
        );
        let source = FileDefinitionSource::new(file.path());
        let err = tokio_test::block_on(source.load()).unwrap_err();
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[tokio::test]
    async fn test_reload_from_file_source() {
        let file = write_temp(V1);
        let source = FileDefinitionSource::new(file.path());
        let server = MockServer::from_source(&source).await.unwrap();
        let request = MockRequest::new("p", "a", "GET", "/ping");

        let response = server.dispatch(&request).await;
        assert_eq!(response.body_text(), "pong");

        std::fs::write(file.path(), V2).unwrap();
        server.reload_from(&source).await.unwrap();
        assert_eq!(server.endpoint_count(), 2);

        let response = server.dispatch(&request).await;
        assert_eq!(response.response_id.as_deref(), Some("pong-v2"));

        // A broken file leaves the current definitions serving
        std::fs::write(file.path(), "projects: [").unwrap();
        assert!(server.reload_from(&source).await.is_err());
        let health = MockRequest::new("p", "a", "GET", "/health");
        assert_eq!(server.dispatch(&health).await.outcome, DispatchOutcome::Mocked);
    }

    #[test]
    fn test_static_source() {
        let config = MockServerConfig::from_yaml(V1).unwrap();
        let source = StaticDefinitionSource::new(config);
        let loaded = tokio_test::block_on(source.load()).unwrap();
        assert_eq!(loaded.endpoint_count(), 1);
        assert_eq!(source.describe(), "static");
    }
}
