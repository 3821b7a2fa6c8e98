//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be loaded from disk,
//! validated, and processed with path expansion.

use scout_engine::config::Config;
use tempfile::TempDir;

#[test]
fn test_full_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let toml_content = format!(
        r#"
[core]
log_level = "warn"
data_dir = "{}"

[model]
provider = "openai"
fallback_provider = "ollama"
temperature = 0.1
max_output_tokens = 1024
call_timeout_secs = 60

[model.openai]
base_url = "https://llm.internal.example/v1"
model = "gpt-4o-mini"
api_key_env = "SCOUT_OPENAI_KEY"

[model.retry]
max_attempts = 4
base_delay_ms = 250
max_delay_ms = 4000
jitter = false

[planner]
max_steps = 4

[executor]
step_retries = 2
tool_timeout_secs = 15

[tools.web]
allowed_domains = ["www.Example.org", "gov.uk"]
search_providers = ["duckduckgo"]

[tools.documents]
chunk_size = 500
chunk_overlap = 50
"#,
        data_dir.display()
    );

    let config = Config::from_toml_str(&toml_content).unwrap();

    assert_eq!(config.core.log_level, "warn");
    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.model.fallback_provider.as_deref(), Some("ollama"));
    assert_eq!(config.model.openai.api_key_env, "SCOUT_OPENAI_KEY");
    assert_eq!(config.model.retry.max_attempts, 4);
    assert_eq!(config.planner.max_steps, 4);
    assert_eq!(config.executor.step_retries, 2);
    assert_eq!(config.executor.tool_timeout().as_secs(), 15);
    assert_eq!(
        config.tools.web.allowed_domains,
        vec!["example.org".to_string(), "gov.uk".to_string()]
    );
    assert_eq!(config.tools.documents.chunk_size, 500);

    // Validation creates the data directory and derives file paths from it
    assert!(data_dir.exists());
    assert_eq!(config.database_path(), data_dir.join("memory.db"));
    assert_eq!(config.document_index_path(), data_dir.join("documents.json"));
}

#[test]
fn test_load_or_create_at_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let created = Config::load_or_create_at(&config_path).unwrap();
    assert!(config_path.exists());

    let loaded = Config::load_or_create_at(&config_path).unwrap();
    assert_eq!(loaded.core.data_dir, created.core.data_dir);
    assert_eq!(loaded.model.provider, created.model.provider);
    assert_eq!(loaded.tools.web.search_providers, created.tools.web.search_providers);
}

#[test]
fn test_invalid_files_rejected() {
    let cases = [
        "[core]\nlog_level = \"loud\"",
        "[model]\nprovider = \"carrier-pigeon\"",
        "[tools.web]\nsearch_providers = [\"altavista\"]",
        "[executor]\ntool_timeout_secs = 0",
        "[planner]\nmax_steps = 0",
        "not toml at all [",
    ];

    for case in cases {
        assert!(
            Config::from_toml_str(case).is_err(),
            "accepted invalid config: {}",
            case
        );
    }
}
