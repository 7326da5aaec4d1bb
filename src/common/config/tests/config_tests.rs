//! Unit tests for common-config crate

use common_config::{
    BufferPoolConfig, CompilerConfig, DistributedBackendKind, ExecutionConfig, ExecutionPlatform,
    MantisConfig,
};

#[test]
fn test_mantis_config_default() {
    let config = MantisConfig::default();

    assert_eq!(config.compiler.platform, ExecutionPlatform::Hybrid);
    assert_eq!(
        config.compiler.distributed_backend,
        DistributedBackendKind::Collection
    );
    assert_eq!(config.compiler.local_memory_budget, 1024 * 1024 * 1024);
    assert_eq!(config.compiler.default_block_size, 1000);
    assert!(config.compiler.allow_jobs_in_loops);

    assert!(config.execution.strict_domain);
    assert_eq!(config.execution.max_transient_retries, 3);

    assert_eq!(config.buffer_pool.scratch_dir, "scratch_space");
    assert_eq!(config.buffer_pool.memory_budget, 0);
}

#[test]
fn test_compiler_config_builders() {
    let config = CompilerConfig::default()
        .with_platform(ExecutionPlatform::SingleNode)
        .with_local_memory_budget(4096)
        .with_backend(DistributedBackendKind::MapReduce);

    assert_eq!(config.platform, ExecutionPlatform::SingleNode);
    assert_eq!(config.local_memory_budget, 4096);
    assert_eq!(config.distributed_backend, DistributedBackendKind::MapReduce);
}

#[test]
fn test_buffer_pool_config_builders() {
    let config = BufferPoolConfig::new("/tmp/mantis").with_memory_budget(1 << 20);
    assert_eq!(config.scratch_dir, "/tmp/mantis");
    assert_eq!(config.memory_budget, 1 << 20);
}

#[test]
fn test_config_json_roundtrip() {
    let mut config = MantisConfig::default();
    config.compiler.parallelism = 16;
    config.compiler.platform = ExecutionPlatform::Distributed;
    config.execution.max_transient_retries = 7;
    config.buffer_pool.scratch_dir = "/data/scratch".to_string();

    let json = serde_json::to_string(&config).unwrap();
    let deserialized: MantisConfig = serde_json::from_str(&json).unwrap();

    assert_eq!(deserialized.compiler.parallelism, 16);
    assert_eq!(deserialized.compiler.platform, ExecutionPlatform::Distributed);
    assert_eq!(deserialized.execution.max_transient_retries, 7);
    assert_eq!(deserialized.buffer_pool.scratch_dir, "/data/scratch");
}

#[test]
fn test_config_partial_json() {
    let json = r#"{
        "compiler": {
            "platform": "SingleNode"
        },
        "buffer_pool": {}
    }"#;

    let config: MantisConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.compiler.platform, ExecutionPlatform::SingleNode);
    // Missing fields should use defaults
    assert_eq!(config.compiler.max_job_size, 64);
    assert!(config.execution.collect_stats);
    assert_eq!(config.buffer_pool.scratch_dir, "scratch_space");
}

#[test]
fn test_config_toml_serialization() {
    let config = MantisConfig::default();

    let toml_str = toml::to_string_pretty(&config).unwrap();
    assert!(toml_str.contains("[compiler]"));
    assert!(toml_str.contains("[buffer_pool]"));
    assert!(toml_str.contains("platform = \"Hybrid\""));

    let deserialized: MantisConfig = toml::from_str(&toml_str).unwrap();
    assert_eq!(deserialized.compiler.platform, ExecutionPlatform::Hybrid);
    assert!(deserialized.execution.strict_domain);
}

#[test]
fn test_config_yaml_serialization() {
    let config = MantisConfig::default();

    let yaml_str = serde_yaml::to_string(&config).unwrap();
    assert!(yaml_str.contains("compiler:"));
    assert!(yaml_str.contains("distributed_backend: Collection"));

    let deserialized: MantisConfig = serde_yaml::from_str(&yaml_str).unwrap();
    assert_eq!(
        deserialized.compiler.distributed_backend,
        DistributedBackendKind::Collection
    );
}

#[test]
fn test_invalid_platform_deserialization() {
    let json = r#"{ "compiler": { "platform": "Mainframe" } }"#;
    let result: Result<MantisConfig, _> = serde_json::from_str(json);
    assert!(result.is_err());
}

#[test]
fn test_invalid_memory_budget_deserialization() {
    // usize cannot be negative
    let json = r#"{ "buffer_pool": { "memory_budget": -100 } }"#;
    let result: Result<MantisConfig, _> = serde_json::from_str(json);
    assert!(result.is_err());
}

#[test]
fn test_execution_config_clone() {
    let config = ExecutionConfig {
        strict_domain: false,
        max_transient_retries: 0,
        collect_stats: false,
    };

    let cloned = config.clone();
    assert_eq!(cloned.strict_domain, config.strict_domain);
    assert_eq!(cloned.max_transient_retries, config.max_transient_retries);
    assert_eq!(cloned.collect_stats, config.collect_stats);
}
