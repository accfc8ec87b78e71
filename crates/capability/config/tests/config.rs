use gateway_config::{
    AppConfig, ConfigError, parse_bool, parse_device_seeds, parse_protocol_ports, require_positive,
};

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("GATEWAY_HTTP_ADDR", "127.0.0.1:8083");
        std::env::set_var("GATEWAY_PROTOCOL_PORTS", "mobilogix=6001");
        std::env::set_var("GATEWAY_DEVICES", "201951132031=1, ID123=2");
        std::env::set_var("GATEWAY_CLOSE_ON_UNKNOWN_DEVICE", "true");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8083");
    assert_eq!(config.protocol_ports.get("mobilogix"), Some(&6001));
    assert_eq!(config.seed_devices.get("ID123"), Some(&2));
    assert_eq!(config.close_on_unknown_device, Some(true));
    assert!(config.database_url.is_none());
    assert_eq!(config.outbound_queue, 64);
}

#[test]
fn protocol_ports_lowercase_names() {
    let ports = parse_protocol_ports("Mobilogix=5221,other=5000,").expect("ports");
    assert_eq!(ports.len(), 2);
    assert_eq!(ports.get("mobilogix"), Some(&5221));
}

#[test]
fn protocol_ports_reject_bad_port() {
    assert!(parse_protocol_ports("mobilogix=70000").is_err());
    assert!(parse_protocol_ports("mobilogix").is_err());
}

#[test]
fn device_seeds_reject_non_numeric_id() {
    assert!(parse_device_seeds("ID123=abc").is_err());
}

#[test]
fn zero_timeouts_are_rejected() {
    assert!(matches!(
        require_positive("GATEWAY_IDLE_TIMEOUT_SECONDS", 0),
        Err(ConfigError::Invalid(key, _)) if key == "GATEWAY_IDLE_TIMEOUT_SECONDS"
    ));
    assert!(require_positive("GATEWAY_DISPATCH_TIMEOUT_MS", 0).is_err());
    assert_eq!(require_positive("GATEWAY_DISPATCH_TIMEOUT_MS", 250).expect("positive"), 250);
}

#[test]
fn switch_values_must_be_recognised() {
    assert!(parse_bool("GATEWAY_CLOSE_ON_UNKNOWN_DEVICE", "ON").expect("on"));
    assert!(!parse_bool("GATEWAY_CLOSE_ON_UNKNOWN_DEVICE", "no").expect("no"));
    assert!(!parse_bool("GATEWAY_CLOSE_ON_UNKNOWN_DEVICE", "0").expect("0"));
    assert!(matches!(
        parse_bool("GATEWAY_CLOSE_ON_UNKNOWN_DEVICE", "ture"),
        Err(ConfigError::Invalid(_, value)) if value == "ture"
    ));
}
