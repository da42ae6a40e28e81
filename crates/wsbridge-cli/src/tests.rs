use crate::driver::*;
use std::io::Write;
use tempfile::NamedTempFile;
use wsbridge_common::config::BridgeConfig;
use wsbridge_common::protocol::DispatchOutcome;

fn create_test_script(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_parse_var() {
    assert_eq!(parse_var("PATH_INFO=/a=b").unwrap(), ("PATH_INFO".to_string(), "/a=b".to_string()));
    assert_eq!(parse_var("EMPTY=").unwrap(), ("EMPTY".to_string(), String::new()));
    assert!(parse_var("novalue").is_err());
    assert!(parse_var("=x").is_err());
}

#[test]
fn test_build_request_defaults() {
    let request = build_request(&[]);
    assert_eq!(request.var("REQUEST_METHOD"), Some(&b"GET"[..]));
    assert_eq!(request.var("PATH_INFO"), Some(&b"/"[..]));
    assert!(request.payload_len > 0);

    let request = build_request(&[("PATH_INFO".to_string(), "/x".to_string())]);
    assert_eq!(request.var("PATH_INFO"), Some(&b"/x"[..]));
    assert_eq!(request.vars.len(), 2);
}

#[test]
fn test_session_runs_streamed_response() {
    let app = create_test_script(
        "(function(env) { var i = 0; return ['200 OK', {'X-Step': 'y'}, function() { return i < 3 ? String(i++) : null; }]; })",
    );
    let mut session = Session::new(BridgeConfig::new().with_app(app.path()), true).unwrap();
    let mut request = build_request(&[]);
    assert_eq!(session.run(&mut request, 100).unwrap(), DispatchOutcome::Ok);
    assert_eq!(format_response(&session.response()), "200 OK\nX-Step: y\n\n012");
}

#[test]
fn test_session_gives_up_on_endless_stream() {
    let app = create_test_script("(function(env) { return ['200 OK', {}, function() { return '.'; }]; })");
    let mut session = Session::new(BridgeConfig::new().with_app(app.path()), true).unwrap();
    let mut request = build_request(&[]);
    assert!(session.run(&mut request, 5).is_err());
    assert_eq!(session.response().body(), b".....");
}

#[test]
fn test_apply_configurator_skips_foreign_options() {
    let script = create_test_script("({ socket: ':3031', js: 'main.js', 'js-gc-freq': 4 })");
    let mut config = BridgeConfig::new();
    let options = apply_configurator(script.path(), &mut config).unwrap();
    assert_eq!(options.len(), 3);
    assert_eq!(config.app, Some(std::path::PathBuf::from("main.js")));
    assert_eq!(config.gc_freq, 4);
}
