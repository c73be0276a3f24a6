//! 可切换日志级别测试（独立进程）

#[test]
fn test_reloadable_filter() {
    let handle = q8_sdk::init_reloadable_logging("info").unwrap();

    handle.set("info").unwrap();
    assert!(!tracing::enabled!(tracing::Level::DEBUG));

    handle.set("debug").unwrap();
    assert!(tracing::enabled!(tracing::Level::DEBUG));

    assert!(handle.set("q8_driver=loud").is_err());
}
