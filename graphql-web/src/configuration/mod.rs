//! Logic for loading configuration in to an object model
use std::str::FromStr;
use std::time::Duration;

use derivative::Derivative;
use displaydoc::Display;
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),
}

/// The configuration of the GraphQL transports.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with the builders.
#[derive(Clone, Derivative, Deserialize, Serialize, JsonSchema, Default)]
#[derivative(Debug)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Configuration of the HTTP endpoint.
    #[serde(default)]
    pub http: Http,

    /// Configuration of the WebSocket endpoint. Disabled when absent.
    #[serde(default)]
    pub websocket: Option<WebSocket>,

    /// Configuration of request execution.
    #[serde(default)]
    pub execution: Execution,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder(visibility = "pub")]
    fn new(http: Option<Http>, websocket: Option<WebSocket>, execution: Option<Execution>) -> Self {
        Self {
            http: http.unwrap_or_default(),
            websocket,
            execution: execution.unwrap_or_default(),
        }
    }

    /// Loads the configuration from YAML. An empty document yields the defaults.
    pub fn from_yaml(raw_yaml: &str) -> Result<Self, ConfigurationError> {
        if raw_yaml.trim().is_empty() {
            return Ok(Configuration::default());
        }
        let configuration: Configuration =
            serde_yaml::from_str(raw_yaml).map_err(ConfigurationError::DeserializeConfigError)?;
        configuration.validate()?;
        Ok(configuration)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.http.path.starts_with('/') {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid http.path",
                error: format!("'{}' must start with a slash", self.http.path),
            });
        }
        if let Some(websocket) = &self.websocket {
            if !websocket.path.starts_with('/') {
                return Err(ConfigurationError::InvalidConfiguration {
                    message: "invalid websocket.path",
                    error: format!("'{}' must start with a slash", websocket.path),
                });
            }
            if websocket.connection_init_timeout.is_zero() {
                return Err(ConfigurationError::InvalidConfiguration {
                    message: "invalid websocket.connection_init_timeout",
                    error: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Parse configuration from a YAML (or JSON) string.
impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Configuration::from_yaml(s)
    }
}

/// The JSON schema of the configuration file.
pub fn generate_config_schema() -> RootSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = false;
    });
    settings.into_generator().into_root_schema_for::<Configuration>()
}

/// Configuration options pertaining to the HTTP endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Http {
    /// The path on which GraphQL requests are served.
    /// default: "/graphql"
    #[serde(default = "default_graphql_path")]
    pub path: String,
}

#[buildstructor::buildstructor]
impl Http {
    #[builder(visibility = "pub")]
    fn new(path: Option<String>) -> Self {
        Self {
            path: path.unwrap_or_else(default_graphql_path),
        }
    }
}

impl Default for Http {
    fn default() -> Self {
        Http::builder().build()
    }
}

/// Configuration options pertaining to the WebSocket endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WebSocket {
    /// The path on which the `graphql-transport-ws` protocol is served.
    /// default: "/graphql"
    #[serde(default = "default_graphql_path")]
    pub path: String,

    /// How long a client has to send `connection_init` after connecting.
    /// default: 60s
    #[serde(
        default = "default_connection_init_timeout",
        with = "humantime_serde"
    )]
    #[schemars(with = "String")]
    pub connection_init_timeout: Duration,
}

#[buildstructor::buildstructor]
impl WebSocket {
    #[builder(visibility = "pub")]
    fn new(path: Option<String>, connection_init_timeout: Option<Duration>) -> Self {
        Self {
            path: path.unwrap_or_else(default_graphql_path),
            connection_init_timeout: connection_init_timeout
                .unwrap_or_else(default_connection_init_timeout),
        }
    }
}

impl Default for WebSocket {
    fn default() -> Self {
        WebSocket::builder().build()
    }
}

/// Configuration options pertaining to request execution.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Execution {
    /// Upper bound on the time spent resolving one field failure to GraphQL
    /// errors. Unbounded when absent.
    #[serde(default, with = "humantime_serde")]
    #[schemars(with = "String", default)]
    pub exception_resolution_timeout: Option<Duration>,
}

fn default_graphql_path() -> String {
    String::from("/graphql")
}

fn default_connection_init_timeout() -> Duration {
    Duration::from_secs(60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_is_default() {
        let configuration = Configuration::from_yaml("").unwrap();
        assert_eq!(configuration.http.path, "/graphql");
        assert!(configuration.websocket.is_none());
        assert!(configuration.execution.exception_resolution_timeout.is_none());
    }

    #[test]
    fn parses_yaml() {
        let configuration: Configuration = r#"
http:
  path: /api/graphql
websocket:
  connection_init_timeout: 5s
execution:
  exception_resolution_timeout: 250ms
"#
        .parse()
        .unwrap();
        assert_eq!(configuration.http.path, "/api/graphql");
        let websocket = configuration.websocket.unwrap();
        assert_eq!(websocket.path, "/graphql");
        assert_eq!(websocket.connection_init_timeout, Duration::from_secs(5));
        assert_eq!(
            configuration.execution.exception_resolution_timeout,
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn parses_json() {
        let configuration: Configuration =
            r#"{ "websocket": { "path": "/ws" } }"#.parse().unwrap();
        let websocket = configuration.websocket.unwrap();
        assert_eq!(websocket.path, "/ws");
        assert_eq!(websocket.connection_init_timeout, Duration::from_secs(60));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(matches!(
            Configuration::from_yaml("http:\n  listen: 0.0.0.0:4000\n"),
            Err(ConfigurationError::DeserializeConfigError(_))
        ));
    }

    #[test]
    fn rejects_relative_paths() {
        let error = Configuration::from_yaml("http:\n  path: graphql\n").unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid http.path: 'graphql' must start with a slash"
        );
    }

    #[test]
    fn builders_apply_defaults() {
        let configuration = Configuration::builder()
            .websocket(
                WebSocket::builder()
                    .connection_init_timeout(Duration::from_secs(1))
                    .build(),
            )
            .build();
        assert_eq!(configuration.http.path, "/graphql");
        assert_eq!(configuration.websocket.unwrap().path, "/graphql");
    }

    #[test]
    fn schema_lists_sections() {
        let schema = serde_json::to_value(generate_config_schema()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("http"));
        assert!(properties.contains_key("websocket"));
        assert!(properties.contains_key("execution"));
    }
}
