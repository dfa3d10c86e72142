use trellis_core::prelude::*;

// 全局订阅者每个进程只能安装一次，所以放在单独的测试二进制里
#[test]
fn build_installs_logging_from_config() {
    let quiet = ContainerConfig::from_toml_str("[logging]\ninstall = false").unwrap();
    ApplicationContext::builder().config(quiet).build().unwrap();
    assert!(!tracing::dispatcher::has_been_set());

    let config = ContainerConfig::from_toml_str("[logging]\nlevel = \"debug\"\nformat = \"full\"").unwrap();
    let context = ApplicationContext::builder().config(config).build().unwrap();
    assert!(tracing::dispatcher::has_been_set());
    assert_eq!(context.config().logging.level, LogLevel::Debug);

    // 再次构建不会失败，原订阅者保留
    ApplicationContext::builder().build().unwrap();
    assert!(matches!(
        LoggingConfig::new().init(),
        Err(ContainerError::LoggingInitFailed(_))
    ));
}
