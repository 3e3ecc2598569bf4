use super::*;

#[test]
fn locally_recoverable_kinds() {
    assert!(Error::TokenError("x".into()).is_locally_recoverable());
    let reqwest_err = match reqwest::Client::new().get("http://[").build() {
        Ok(_) => panic!("expected build error"),
        Err(e) => e,
    };
    assert!(Error::TransportError(reqwest_err).is_locally_recoverable());
    assert!(!Error::Cancelled.is_locally_recoverable());
    assert!(!Error::RedirectLoop("http://x".into()).is_locally_recoverable());
}

#[test]
fn api_error_body_preview_redacts_and_caps() {
    let err = ApiError::new(
        500,
        "GET",
        "https://api.example.com/x",
        "boom",
        "token=sk-1234567890abcdef1234567890abcdef leaked",
    );
    let preview = err.body_preview(10_000);
    assert!(!preview.contains("sk-1234567890abcdef1234567890abcdef"));
}

#[test]
fn api_error_display_includes_method_and_status() {
    let err = ApiError::new(404, "GET", "https://api.example.com/x", "not found", "");
    let s = err.to_string();
    assert!(s.contains("GET"));
    assert!(s.contains("404"));
    assert!(s.contains("not found"));
}
