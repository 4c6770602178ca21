//! Configuration chain resolution through the resolver, the way verbs see it.

use runme::config::FilterType;
use runme::ErrorKind;

mod common;

use common::Workspace;

const ROOT: &str = "\
version: v1alpha1
project:
  root: \".\"
  ignore: [node_modules, build]
  filters:
    - type: FILTER_TYPE_BLOCK
      condition: \"name != ''\"
server:
  address: localhost:7998
  tls:
    enabled: true
log:
  enabled: false
";

#[test]
fn test_nested_config_merges_over_root() {
    let ws = Workspace::new();
    ws.init_git();
    ws.write("runme.yaml", ROOT);
    ws.write(
        "services/api/runme.yaml",
        "version: v1alpha1\nserver:\n  address: unix:///tmp/api.sock\n  tls:\n    enabled: false\n",
    );

    let mut resolver = ws.resolver("services/api");
    let config = resolver.config().unwrap();
    assert_eq!(config.server.address, "unix:///tmp/api.sock");
    assert!(!config.server.tls.enabled);
    assert!(config.server.tls.cert_file.is_none());
    // Untouched sections come from the root file.
    assert_eq!(config.project.ignore, vec!["node_modules", "build"]);
    assert_eq!(config.project.filters.len(), 1);

    let mut resolver = ws.resolver(".");
    let config = resolver.config().unwrap();
    assert_eq!(config.server.address, "localhost:7998");
    assert_eq!(
        config.server.tls.cert_file.as_deref(),
        Some(ws.user.path().join("runme/tls/cert.pem").as_path())
    );
}

#[test]
fn test_category_flag_appends_block_filter() {
    let ws = Workspace::new();
    ws.init_git();
    ws.write("runme.yaml", ROOT);

    let mut options = runme::ResolverOptions::new(ws.root());
    options.categories = vec!["setup".into(), "teardown".into()];
    let mut resolver = ws.resolver_with(options);

    let config = resolver.config().unwrap();
    assert_eq!(config.project.filters.len(), 2);
    let appended = &config.project.filters[1];
    assert_eq!(appended.kind, FilterType::Block);
    assert_eq!(appended.extra["categories"], serde_json::json!(["setup", "teardown"]));
}

#[test]
fn test_invalid_nested_version_fails_the_verb() {
    let ws = Workspace::new();
    ws.init_git();
    ws.write("runme.yaml", ROOT);
    ws.write("docs/runme.yaml", "version: v2\n");

    let mut resolver = ws.resolver("docs");
    let err = resolver.config().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaViolation);
}

#[test]
fn test_root_escape_is_rejected() {
    let ws = Workspace::new();
    ws.init_git();
    ws.write("runme.yaml", "version: v1alpha1\nproject:\n  root: \"../..\"\n");

    let mut resolver = ws.resolver(".");
    let err = resolver.config().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathEscape);
}

#[test]
fn test_logger_is_not_built_for_config_only_verbs() {
    let ws = Workspace::new();
    ws.init_git();
    ws.write("runme.yaml", ROOT);

    let mut resolver = ws.resolver(".");
    resolver.config().unwrap();
    assert!(!resolver.is_resolved(runme::resolver::Component::Logger));
    assert!(!resolver.is_resolved(runme::resolver::Component::Server));
}
