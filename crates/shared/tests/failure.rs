#![allow(missing_docs)]

use shared::Failure;

#[test]
pub fn values_pass_through() {
    let ok: Result<u32, String> = Ok(3);
    assert_eq!(ok.or_log_and_panic("unreachable"), 3);
    assert_eq!(
        Some("config.toml").or_log_and_panic("unreachable"),
        "config.toml"
    );
}

#[test]
#[should_panic(expected = "Could not load config: missing field")]
pub fn errors_panic_with_cause() {
    let result: Result<u32, &str> = Err("missing field");
    result.or_log_and_panic("Could not load config");
}

#[test]
#[should_panic(expected = "Upload path has no file name")]
pub fn missing_values_panic() {
    let value: Option<u32> = None;
    value.or_log_and_panic("Upload path has no file name");
}
