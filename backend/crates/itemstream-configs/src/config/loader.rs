use super::types::ServerConfig;
use std::fs;
use std::path::Path;

impl ServerConfig {
    /// Load configuration from a TOML file
    ///
    /// Note: Environment overrides are applied separately via `apply_env_overrides()`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ServerConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        config.validate()?;

        Ok(config)
    }

    /// Apply overrides from the process environment, then re-validate
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Recognized variables:
    /// - `ITEMSTREAM_HOST`, `ITEMSTREAM_PORT`, `ITEMSTREAM_LOG_LEVEL`
    /// - `WEBSOCKET_PUBLIC` (any value other than "", "0" or "false" enables it)
    /// - `WEBSOCKET_PATH`
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("ITEMSTREAM_HOST") {
            self.server.host = host;
        }

        if let Some(port_str) = lookup("ITEMSTREAM_PORT") {
            self.server.port = port_str
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid ITEMSTREAM_PORT value: {}", port_str))?;
        }

        if let Some(level) = lookup("ITEMSTREAM_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        if let Some(public) = lookup("WEBSOCKET_PUBLIC") {
            let flag = public.trim().to_lowercase();
            self.websocket.public = !(flag.is_empty() || flag == "0" || flag == "false");
        }

        if let Some(path) = lookup("WEBSOCKET_PATH") {
            log::debug!("WebSocket path overridden from environment: {}", path);
            self.websocket.path = path;
        }

        self.validate()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        for (target, level) in &self.logging.targets {
            if !valid_levels.contains(&level.as_str()) {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}' for target '{}'. Must be one of: {}",
                    level,
                    target,
                    valid_levels.join(", ")
                ));
            }
        }

        let valid_formats = ["compact", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        if !self.websocket.path.starts_with('/') {
            return Err(anyhow::anyhow!(
                "WebSocket path '{}' must start with '/'",
                self.websocket.path
            ));
        }

        if self.websocket.max_message_size == 0 {
            return Err(anyhow::anyhow!("max_message_size cannot be 0"));
        }

        if self.websocket.outbound_buffer == 0 {
            return Err(anyhow::anyhow!("outbound_buffer cannot be 0"));
        }

        if self.websocket.heartbeat_interval_secs == 0 {
            return Err(anyhow::anyhow!("heartbeat_interval_secs cannot be 0"));
        }

        let mut seen = std::collections::HashSet::new();
        for collection in &self.store.collections {
            if collection.name.trim().is_empty() {
                return Err(anyhow::anyhow!("Collection name cannot be empty"));
            }
            if !seen.insert(collection.name.to_lowercase()) {
                return Err(anyhow::anyhow!("Duplicate collection '{}'", collection.name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.websocket.path, "/websocket");
        assert!(!config.websocket.public);
        assert!(config.handlers.subscribe);
    }

    #[test]
    fn test_invalid_port() {
        let mut config = ServerConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = ServerConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_ws_path_rejected() {
        let mut config = ServerConfig::default();
        config.websocket.path = "websocket".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_collections_rejected() {
        let config = ServerConfig::from_toml_str(
            r#"
            [[store.collections]]
            name = "articles"

            [[store.collections]]
            name = "Articles"
            "#,
        );
        assert!(config.is_err());
    }

    #[test]
    fn test_from_file_with_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [websocket]
            public = true
            path = "/test"

            [handlers]
            delete = false

            [subscriptions]
            auto_collections = ["notices"]

            [[auth.tokens]]
            token = "secret"
            user = "editor-1"
            role = "editor"

            [[store.collections]]
            name = "articles"
            read_roles = ["editor"]
            "#
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.websocket.public);
        assert_eq!(config.websocket.path, "/test");
        assert_eq!(config.websocket.outbound_buffer, 256);
        assert!(!config.handlers.delete);
        assert!(config.handlers.get);
        assert_eq!(config.subscriptions.auto_collections, vec!["notices"]);
        assert_eq!(config.auth.tokens[0].role.as_deref(), Some("editor"));
        assert_eq!(config.store.collections[0].primary_key, "id");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("WEBSOCKET_PUBLIC", "true"),
            ("WEBSOCKET_PATH", "/ws"),
            ("ITEMSTREAM_PORT", "9000"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config
            .apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert!(config.websocket.public);
        assert_eq!(config.websocket.path, "/ws");
        assert_eq!(config.server.port, 9000);

        config.apply_overrides_from(|key| (key == "WEBSOCKET_PUBLIC").then(|| "0".to_string()))
            .unwrap();
        assert!(!config.websocket.public);
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = ServerConfig::default();
        let result =
            config.apply_overrides_from(|key| (key == "ITEMSTREAM_PORT").then(|| "abc".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_event_scope() {
        let mut config = ServerConfig::default();
        assert_eq!(config.events.scope(), vec!["items"]);

        config.events.namespaces = vec!["items".to_string(), "orders".to_string()];
        assert_eq!(config.events.scope(), vec!["items", "orders"]);

        config.events.system = true;
        let scope = config.events.scope();
        assert!(scope.contains(&"users".to_string()));
        assert_eq!(scope.first().map(String::as_str), Some("items"));
    }

    #[test]
    fn test_example_config_parses() {
        let config = ServerConfig::from_toml_str(include_str!("../../../../config.example.toml"))
            .expect("example config is valid");
        assert_eq!(config.store.collections.len(), 2);
        assert_eq!(config.auth.tokens.len(), 2);
        assert!(config.auth.tokens[1].admin);
        assert_eq!(config.logging.targets.get("itemstream_core::live::registry").map(String::as_str), Some("debug"));
        assert!(config.store.collections[1].public_read);
    }
}
