use scaleguard::config::Config;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

const MINIMAL: &str = r#"
[elasticsearch]
url = "http://localhost:9200/"

[queue]
url = "https://sqs.us-east-1.amazonaws.com/123456789012/es-lifecycle"
"#;

fn load(contents: &str) -> anyhow::Result<Config> {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    Config::from_file(file.path().to_str().unwrap())
}

#[test]
fn test_minimal_config_gets_defaults() {
    let config = load(MINIMAL).unwrap();
    assert_eq!(config.log_level, "info");
    assert_eq!(config.dispatcher.max_concurrent, 0);
    assert_eq!(config.dispatcher.poll_interval, Duration::from_secs(10));
    assert_eq!(
        config.dispatcher.initial_visibility_timeout,
        Duration::from_secs(60)
    );
    assert_eq!(
        config.dispatcher.max_visibility_timeout,
        Duration::from_secs(900)
    );
    assert_eq!(config.lifecycle.comm_buffer, Duration::from_secs(5));
    assert_eq!(
        config.lifecycle.reenqueue_safety_margin,
        Duration::from_secs(10)
    );
    assert!(config.observer.enabled);
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.port, 9122);
}

#[test]
fn test_durations_are_humantime() {
    let contents = format!(
        "{MINIMAL}\n[dispatcher]\nmax_concurrent = 4\npoll_interval = \"30s\"\ninitial_visibility_timeout = \"2m\"\nmax_visibility_timeout = \"1h\"\n\n[observer]\ninterval = \"90s\"\n"
    );
    let config = load(&contents).unwrap();
    assert_eq!(config.dispatcher.max_concurrent, 4);
    assert_eq!(config.dispatcher.poll_interval, Duration::from_secs(30));
    assert_eq!(
        config.dispatcher.initial_visibility_timeout,
        Duration::from_secs(120)
    );
    assert_eq!(
        config.dispatcher.max_visibility_timeout,
        Duration::from_secs(3600)
    );
    assert_eq!(config.observer.interval, Duration::from_secs(90));
}

#[test]
fn test_missing_required_sections_fail() {
    assert!(load("[elasticsearch]\nurl = \"http://localhost:9200/\"\n").is_err());
    assert!(load("[queue]\nurl = \"https://example/q\"\n").is_err());
}

#[test]
fn test_comm_buffer_must_undercut_initial_visibility() {
    let contents = format!(
        "{MINIMAL}\n[dispatcher]\ninitial_visibility_timeout = \"5s\"\ncomm_buffer = \"5s\"\n"
    );
    assert!(load(&contents).is_err());
}

#[test]
fn test_initial_visibility_cannot_exceed_max() {
    let contents = format!(
        "{MINIMAL}\n[dispatcher]\ninitial_visibility_timeout = \"20m\"\nmax_visibility_timeout = \"15m\"\n"
    );
    assert!(load(&contents).is_err());
}

#[test]
fn test_empty_queue_url_is_rejected() {
    let contents = MINIMAL.replace(
        "https://sqs.us-east-1.amazonaws.com/123456789012/es-lifecycle",
        " ",
    );
    assert!(load(&contents).is_err());
}
