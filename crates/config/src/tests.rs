use crate::{AppConfig, KafkaSettings, TelemetryConfig};
use figment::Jail;
use secrecy::{ExposeSecret, Secret};

#[test]
fn test_secret_redaction() {
    let settings = KafkaSettings {
        brokers: "localhost:9092".to_string(),
        username: "develop".to_string(),
        password: Secret::new("my_secret_password".to_string()),
        mechanisms: "PLAIN".to_string(),
        protocol: "SASL_PLAINTEXT".to_string(),
        ca_file: None,
        is_debug: false,
    };
    let debug_output = format!("{:?}", settings);
    assert!(debug_output.contains("Secret([REDACTED"));
    assert!(!debug_output.contains("my_secret_password"));
}

#[test]
fn test_telemetry_defaults() {
    let telemetry = TelemetryConfig::default();
    assert_eq!(telemetry.log_level, "info");
    assert!(!telemetry.json);
}

#[test]
fn test_load_layers() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "default.toml",
            r#"
                app_name = "mq-demo"

                [kafka]
                brokers = "127.0.0.1:9092"
                username = "develop"
                password = "secret"
                mechanisms = "PLAIN"
                protocol = "SASL_PLAINTEXT"
            "#,
        )?;
        jail.create_file(
            "production.toml",
            r#"
                app_env = "production"

                [kafka]
                brokers = "kafka-1:9092,kafka-2:9092"
            "#,
        )?;
        jail.set_env("MQ_KAFKA__IS_DEBUG", "true");
        jail.set_env("MQ_TELEMETRY__LOG_LEVEL", "debug");

        let config = AppConfig::from_figment(AppConfig::figment(".", "production"))
            .map_err(|e| e.to_string())?;

        assert_eq!(config.app_name, "mq-demo");
        assert!(config.is_production());
        assert_eq!(config.kafka.brokers, "kafka-1:9092,kafka-2:9092");
        assert_eq!(config.kafka.username, "develop");
        assert_eq!(config.kafka.password.expose_secret(), "secret");
        assert!(config.kafka.is_debug);
        assert_eq!(config.kafka.ca_file, None);
        assert_eq!(config.telemetry.log_level, "debug");
        Ok(())
    });
}

#[test]
fn test_missing_fields_default_to_empty() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "default.toml",
            r#"
                app_name = "mq-demo"

                [kafka]
                brokers = "127.0.0.1:9092"
            "#,
        )?;

        let config = AppConfig::from_figment(AppConfig::figment(".", "development"))
            .map_err(|e| e.to_string())?;

        assert!(config.is_development());
        assert!(config.kafka.username.is_empty());
        assert!(config.kafka.password.expose_secret().is_empty());
        Ok(())
    });
}
