use apigee_cli::core::ApigeeError;
use apigee_cli::pull::{ProxyPuller, Pull, PullConfig, PullOptions};
use apigee_cli::test_utils::{FakeClient, bundle_zip, init_test_logging};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PROXY_XML: &str = r#"<APIProxy name="orders" revision="3"/>"#;

const KVM1_POLICY: &str = r#"<KeyValueMapOperations
    async="false" name="Get-Settings" mapIdentifier="kvm1">
    <Scope>environment</Scope>
</KeyValueMapOperations>
"#;

const KVM10_POLICY: &str = r#"<KeyValueMapOperations name="Get-Flags" mapIdentifier="kvm10">
    <Scope>environment</Scope>
</KeyValueMapOperations>
"#;

const PROXY_ENDPOINT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<ProxyEndpoint name="default">
    <HTTPProxyConnection>
        <BasePath>/v1/old</BasePath>
        <VirtualHost>secure</VirtualHost>
    </HTTPProxyConnection>
    <RouteRule name="default">
        <TargetEndpoint>default</TargetEndpoint>
    </RouteRule>
</ProxyEndpoint>
"#;

const TARGET_ENDPOINT: &str = r#"<TargetEndpoint name="default">
    <HTTPTargetConnection>
        <LoadBalancer>
            <Server name="ts1"/>
        </LoadBalancer>
        <Path>/v1/old/backend</Path>
    </HTTPTargetConnection>
</TargetEndpoint>
"#;

const SCRIPT: &str = "var flags = context.getVariable('kvm10.flags');\n";

struct Fixture {
    _temp: TempDir,
    work_tree: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        init_test_logging(None);
        let temp = TempDir::new().unwrap();
        let work_tree = temp.path().canonicalize().unwrap().join("repo");
        Self {
            _temp: temp,
            work_tree,
        }
    }

    fn config(&self) -> PullConfig {
        PullConfig {
            org: "acme".to_string(),
            api_name: "orders".to_string(),
            revision: 3,
            environment: "test".to_string(),
            work_tree: self.work_tree.clone(),
        }
    }

    fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.work_tree.join(relative)).unwrap()
    }
}

fn orders_bundle() -> Vec<u8> {
    bundle_zip(&[
        ("apiproxy/orders.xml", PROXY_XML),
        ("apiproxy/policies/Get-Settings.xml", KVM1_POLICY),
        ("apiproxy/policies/Get-Flags.xml", KVM10_POLICY),
        ("apiproxy/proxies/default.xml", PROXY_ENDPOINT),
        ("apiproxy/targets/default.xml", TARGET_ENDPOINT),
        ("apiproxy/resources/jsc/flags.js", SCRIPT),
    ])
}

fn orders_client() -> FakeClient {
    FakeClient::new()
        .with_bundle("orders", 3, orders_bundle())
        .with_keyvaluemap("test", "kvm1", r#"{"name":"kvm1","entry":[{"name":"a","value":"1"}]}"#)
        .with_keyvaluemap("test", "kvm10", r#"{"name":"kvm10","entry":[]}"#)
        .with_targetserver("test", "ts1", r#"{"name":"ts1","host":"orders.internal","port":443}"#)
}

fn tree_snapshot(root: &Path) -> Vec<(PathBuf, String)> {
    apigee_cli::utils::list_files(root, &[])
        .unwrap()
        .into_iter()
        .map(|file| {
            let content = fs::read_to_string(&file).unwrap();
            (file, content)
        })
        .collect()
}

#[tokio::test]
async fn test_pull_layout_matches_contract() {
    let fixture = Fixture::new();
    let pull = Pull::new(orders_client(), fixture.config()).unwrap();

    pull.pull(PullOptions::default()).await.unwrap();

    assert_eq!(
        fixture.read("keyvaluemaps/test/kvm1"),
        r#"{"name":"kvm1","entry":[{"name":"a","value":"1"}]}"#
    );
    assert_eq!(fixture.read("keyvaluemaps/test/kvm10"), r#"{"name":"kvm10","entry":[]}"#);
    assert_eq!(
        fixture.read("targetservers/test/ts1"),
        r#"{"name":"ts1","host":"orders.internal","port":443}"#
    );
    assert_eq!(fixture.read("orders/apiproxy/proxies/default.xml"), PROXY_ENDPOINT);
    assert!(!fixture.work_tree.join("orders.zip").exists());

    let mut entries: Vec<String> = fs::read_dir(&fixture.work_tree)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["keyvaluemaps", "orders", "targetservers"]);
}

#[tokio::test]
async fn test_single_keyvaluemap_lands_under_environment() {
    let fixture = Fixture::new();
    let client = FakeClient::new()
        .with_bundle(
            "orders",
            3,
            bundle_zip(&[(
                "apiproxy/policies/kvm.xml",
                r#"<KeyValueMapOperations mapIdentifier="kvm1"/>"#,
            )]),
        )
        .with_keyvaluemap("test", "kvm1", "exact body\n");
    let pull = Pull::new(client, fixture.config()).unwrap();

    let report = pull.pull(PullOptions::default()).await.unwrap();

    let exported = fs::read(fixture.work_tree.join("keyvaluemaps/test/kvm1")).unwrap();
    assert_eq!(exported, b"exact body\n");
    assert_eq!(report.keyvaluemaps[0].path, fixture.work_tree.join("keyvaluemaps/test/kvm1"));
    assert!(report.targetservers.is_empty());
    assert!(fixture.work_tree.join("targetservers/test").is_dir());
}

#[tokio::test]
async fn test_existing_proxy_dir_aborts_without_requests() {
    let fixture = Fixture::new();
    fs::create_dir_all(fixture.work_tree.join("orders/apiproxy")).unwrap();
    fs::write(fixture.work_tree.join("orders/apiproxy/orders.xml"), "local edits").unwrap();
    let pull = Pull::new(orders_client(), fixture.config()).unwrap();

    let err = pull.pull(PullOptions::default()).await.unwrap_err();

    match err.downcast_ref::<ApigeeError>() {
        Some(ApigeeError::PathExists { path }) => assert!(path.ends_with("orders")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(pull.client().total_calls(), 0);
    assert_eq!(fixture.read("orders/apiproxy/orders.xml"), "local edits");
}

#[tokio::test]
async fn test_existing_dependency_file_aborts_before_its_kind_is_fetched() {
    let fixture = Fixture::new();
    fs::create_dir_all(fixture.work_tree.join("targetservers/test")).unwrap();
    fs::write(fixture.work_tree.join("targetservers/test/ts1"), "kept").unwrap();
    let pull = Pull::new(orders_client(), fixture.config()).unwrap();

    let err = pull.pull(PullOptions::default()).await.unwrap_err();

    assert!(matches!(err.downcast_ref::<ApigeeError>(), Some(ApigeeError::PathExists { .. })));
    assert_eq!(pull.client().targetserver_calls(), 0);
    assert_eq!(fixture.read("targetservers/test/ts1"), "kept");
    // Earlier stages are not rolled back
    assert!(fixture.work_tree.join("keyvaluemaps/test/kvm1").is_file());
}

#[tokio::test]
async fn test_prefixing_is_substring_safe() {
    let fixture = Fixture::new();
    let pull = Pull::new(orders_client(), fixture.config()).unwrap();

    pull.pull(PullOptions {
        prefix: Some("test-".to_string()),
        ..PullOptions::default()
    })
    .await
    .unwrap();

    let kvm1 = fixture.read("orders/apiproxy/policies/Get-Settings.xml");
    let kvm10 = fixture.read("orders/apiproxy/policies/Get-Flags.xml");
    assert!(kvm1.contains(r#"mapIdentifier="test-kvm1""#));
    assert!(kvm10.contains(r#"mapIdentifier="test-kvm10""#));
    assert!(!kvm10.contains("test-test-"));
    assert_eq!(
        fixture.read("orders/apiproxy/orders.xml"),
        r#"<APIProxy name="test-orders" revision="3"/>"#
    );
    assert_eq!(
        fixture.read("orders/apiproxy/resources/jsc/flags.js"),
        "var flags = context.getVariable('test-kvm10.flags');\n"
    );
    let target = fixture.read("orders/apiproxy/targets/default.xml");
    assert!(target.contains(r#"<Server name="test-ts1"/>"#));
    // Exported bodies are part of the work tree too
    assert_eq!(fixture.read("keyvaluemaps/test/kvm10"), r#"{"name":"test-kvm10","entry":[]}"#);
}

#[tokio::test]
async fn test_prefixing_twice_is_idempotent() {
    let fixture = Fixture::new();
    let pull = Pull::new(orders_client(), fixture.config()).unwrap();
    pull.pull(PullOptions {
        prefix: Some("test-".to_string()),
        ..PullOptions::default()
    })
    .await
    .unwrap();
    let once = tree_snapshot(&fixture.work_tree);

    let names: Vec<String> =
        ["orders", "kvm1", "kvm10", "ts1"].iter().map(|s| (*s).to_string()).collect();
    let modified = pull.prefix_dependencies_in_work_tree(&names, "test-").unwrap();

    assert!(modified.is_empty());
    assert_eq!(tree_snapshot(&fixture.work_tree), once);
}

#[tokio::test]
async fn test_prefixing_skips_git_metadata() {
    let fixture = Fixture::new();
    fs::create_dir_all(fixture.work_tree.join(".git/refs")).unwrap();
    fs::write(fixture.work_tree.join(".git/description"), "orders uses kvm1").unwrap();
    fs::create_dir_all(fixture.work_tree.join("shared/kvm1")).unwrap();
    fs::write(fixture.work_tree.join("shared/kvm1/.git"), "gitdir: ../../.git/modules/kvm1\n")
        .unwrap();
    let pull = Pull::new(orders_client(), fixture.config()).unwrap();

    let report = pull
        .pull(PullOptions {
            prefix: Some("dev-".to_string()),
            ..PullOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(fixture.read(".git/description"), "orders uses kvm1");
    assert_eq!(fixture.read("shared/kvm1/.git"), "gitdir: ../../.git/modules/kvm1\n");
    let git_dir = fixture.work_tree.join(".git");
    assert!(report.prefixed_files.iter().all(|file| !file.starts_with(&git_dir)));
    assert!(!report.prefixed_files.contains(&fixture.work_tree.join("shared/kvm1/.git")));
}

#[tokio::test]
async fn test_extra_dependencies_join_the_prefix_pass() {
    let fixture = Fixture::new();
    let pull = Pull::new(orders_client(), fixture.config()).unwrap();

    pull.pull(PullOptions {
        dependencies: vec!["secure".to_string()],
        prefix: Some("qa-".to_string()),
        ..PullOptions::default()
    })
    .await
    .unwrap();

    let endpoint = fixture.read("orders/apiproxy/proxies/default.xml");
    assert!(endpoint.contains("<VirtualHost>qa-secure</VirtualHost>"));
}

#[tokio::test]
async fn test_basepath_rewrite_changes_only_the_element() {
    let fixture = Fixture::new();
    let pull = Pull::new(orders_client(), fixture.config()).unwrap();

    let report = pull
        .pull(PullOptions {
            basepath: Some("/v1/new".to_string()),
            ..PullOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(
        fixture.read("orders/apiproxy/proxies/default.xml"),
        PROXY_ENDPOINT.replace("<BasePath>/v1/old</BasePath>", "<BasePath>/v1/new</BasePath>")
    );
    // Same text elsewhere stays
    assert_eq!(fixture.read("orders/apiproxy/targets/default.xml"), TARGET_ENDPOINT);

    let change = report.basepath.unwrap();
    assert_eq!((change.old.as_str(), change.new.as_str()), ("/v1/old", "/v1/new"));
}

#[tokio::test]
async fn test_missing_basepath_names_the_file() {
    let fixture = Fixture::new();
    let client = FakeClient::new().with_bundle(
        "orders",
        3,
        bundle_zip(&[("apiproxy/proxies/default.xml", "<ProxyEndpoint name=\"default\"/>")]),
    );
    let pull = Pull::new(client, fixture.config()).unwrap();

    let err = pull
        .pull(PullOptions {
            basepath: Some("/v2".to_string()),
            ..PullOptions::default()
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("default.xml"), "{err}");
}

#[tokio::test]
async fn test_remote_failure_is_fatal_and_keeps_partial_output() {
    let fixture = Fixture::new();
    let client = orders_client().failing("kvm10", 500);
    let pull = Pull::new(client, fixture.config()).unwrap();

    let err = pull.pull(PullOptions::default()).await.unwrap_err();

    assert_eq!(err.downcast_ref::<ApigeeError>().and_then(ApigeeError::status), Some(500));
    assert!(fixture.work_tree.join("orders/apiproxy/orders.xml").is_file());
    assert_eq!(pull.client().targetserver_calls(), 0);
}

#[tokio::test]
async fn test_force_repulls_into_previous_tree() {
    let fixture = Fixture::new();
    let pull = Pull::new(orders_client(), fixture.config()).unwrap();
    pull.pull(PullOptions::default()).await.unwrap();
    fs::write(fixture.work_tree.join("orders/apiproxy/orders.xml"), "edited locally").unwrap();
    fs::write(fixture.work_tree.join("keyvaluemaps/test/kvm1"), "edited locally").unwrap();

    pull.pull(PullOptions {
        force: true,
        ..PullOptions::default()
    })
    .await
    .unwrap();

    assert_eq!(fixture.read("orders/apiproxy/orders.xml"), PROXY_XML);
    assert!(fixture.read("keyvaluemaps/test/kvm1").starts_with(r#"{"name":"kvm1""#));
}
