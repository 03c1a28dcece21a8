//! End-to-end tests for the graph builder.
//!
//! Each test spawns a loopback axum server that answers from a table of
//! canned JSON bodies keyed by path and query. Unknown paths answer 404, so a
//! table lists only what the scenario needs.
//!
//! | Test | Behaviour |
//! |------|-----------|
//! | `view_tree_links_children_under_parents` | basic descent |
//! | `cyclic_relations_terminate` | cycle handling |
//! | `shared_child_hangs_under_first_parent` | registry short-circuit |
//! | `tree_invariants_hold` | reachability and single parent |
//! | `category_is_fallback_for_children` | weakness then category |
//! | `failing_child_is_skipped` | partial results |
//! | `view_fetch_failure_is_fatal` | fatal root fetch |
//! | `view_with_mismatched_id_is_rejected` | root must match the request |
//! | `fetch_weakness_*`, `fetch_category_and_view` | single-entity fetch |
//! | `requests_are_paced` | rate limiting through the stack |
//! | `fetch_multiple_*` | multi-entity fetch |
//! | `fetch_with_relations_*` | single-entry descent |
//! | `cwe_tree_*` | forest assembly from an ID list |
//! | `built_tree_survives_export_and_import` | persistence |

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::IntoResponse,
    Router,
};
use cwe::{Node, Registry};
use cwe_client::{ClientConfig, ClientError, Fetcher};
use tokio::net::TcpListener;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "cwe_client=debug".into()),
            )
            .with_test_writer()
            .init();
    });
}

#[derive(Clone, Default)]
struct Mock {
    routes: Arc<HashMap<String, (StatusCode, String)>>,
    hits: Arc<Mutex<Vec<String>>>,
}

impl Mock {
    fn hits_for(&self, key: &str) -> usize {
        self.hits.lock().unwrap().iter().filter(|h| *h == key).count()
    }

    fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().len()
    }
}

async fn canned(State(mock): State<Mock>, uri: Uri) -> impl IntoResponse {
    let key = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    mock.hits.lock().unwrap().push(key.clone());
    let (status, body) = mock
        .routes
        .get(&key)
        .cloned()
        .unwrap_or((StatusCode::NOT_FOUND, String::from("{}")));
    (status, [(header::CONTENT_TYPE, "application/json")], body)
}

/// Route table under construction.
#[derive(Default)]
struct Routes(HashMap<String, (StatusCode, String)>);

impl Routes {
    fn ok(mut self, path: &str, body: impl Into<String>) -> Self {
        self.0.insert(path.to_string(), (StatusCode::OK, body.into()));
        self
    }

    fn status(mut self, path: &str, status: StatusCode) -> Self {
        self.0.insert(path.to_string(), (status, String::from("{}")));
        self
    }

    fn weakness(self, n: u32, name: &str) -> Self {
        self.ok(&format!("/cwe/weakness/{n}"), entry(n, name))
    }

    fn category(self, n: u32, name: &str) -> Self {
        self.ok(&format!("/cwe/category/{n}"), entry(n, name))
    }

    fn view(self, n: u32, name: &str) -> Self {
        self.ok(&format!("/cwe/view/{n}"), entry(n, name))
    }

    /// Children of `n` within `view`.
    fn children(self, n: u32, view: u32, ids: &[u32]) -> Self {
        let body = serde_json::to_string(&ids.iter().map(u32::to_string).collect::<Vec<_>>()).unwrap();
        self.ok(&format!("/cwe/{n}/children?view={view}"), body)
    }
}

fn entry(n: u32, name: &str) -> String {
    serde_json::json!({ "ID": n.to_string(), "Name": name }).to_string()
}

async fn spawn_with(routes: Routes, config: ClientConfig) -> (Fetcher, Mock) {
    init_tracing();
    let mock = Mock {
        routes: Arc::new(routes.0),
        hits: Arc::default(),
    };
    let app = Router::new().fallback(canned).with_state(mock.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let config = config.with_base_url(format!("http://{addr}"));
    (Fetcher::from_config(&config).unwrap(), mock)
}

fn fast_config() -> ClientConfig {
    ClientConfig::default()
        .with_rate_limit_interval(Duration::ZERO)
        .with_retry_delay(Duration::ZERO)
        .with_max_retries(0)
}

async fn spawn(routes: Routes) -> (Fetcher, Mock) {
    spawn_with(routes, fast_config()).await
}

fn child_ids(node: &Node) -> Vec<String> {
    node.children().iter().map(Node::id).collect()
}

fn parent_id(registry: &Registry, id: &str) -> Option<String> {
    registry.get_by_id(id).unwrap().parent().map(|p| p.id())
}

/// Research view 1000 → 20 → 89.
fn simple_view() -> Routes {
    Routes::default()
        .view(1000, "Research Concepts")
        .children(1000, 1000, &[20])
        .weakness(20, "Improper Input Validation")
        .children(20, 1000, &[89])
        .weakness(89, "SQL Injection")
        .children(89, 1000, &[])
}

// ---------------------------------------------------------------------------
// build_tree_with_view
// ---------------------------------------------------------------------------

#[tokio::test]
async fn view_tree_links_children_under_parents() {
    let (fetcher, _) = spawn(simple_view()).await;

    let registry = fetcher.build_tree_with_view("CWE-1000").await.unwrap();

    assert_eq!(registry.len(), 3);
    let root = registry.root().expect("root is set");
    assert_eq!(root.id(), "CWE-1000");
    assert_eq!(child_ids(&root), vec!["CWE-20"]);
    assert_eq!(parent_id(&registry, "CWE-89").as_deref(), Some("CWE-20"));
    assert_eq!(registry.get_by_id("CWE-89").unwrap().name(), "SQL Injection");
}

#[tokio::test]
async fn cyclic_relations_terminate() {
    let routes = Routes::default()
        .view(1, "A")
        .children(1, 1, &[2])
        .weakness(2, "B")
        .children(2, 1, &[3])
        .weakness(3, "C")
        .children(3, 1, &[1]);
    let (fetcher, mock) = spawn(routes).await;

    let registry = fetcher.build_tree_with_view("1").await.unwrap();

    assert_eq!(registry.len(), 3);
    let edges: usize = registry.nodes().iter().map(Node::child_count).sum();
    assert_eq!(edges, 2);
    assert_eq!(parent_id(&registry, "CWE-3").as_deref(), Some("CWE-2"));
    assert!(registry.get_by_id("CWE-1").unwrap().is_root());
    assert_eq!(mock.hits_for("/cwe/weakness/2"), 1);
    assert_eq!(mock.hits_for("/cwe/view/1"), 1);
}

#[tokio::test]
async fn shared_child_hangs_under_first_parent() {
    let routes = Routes::default()
        .view(1000, "Research Concepts")
        .children(1000, 1000, &[20, 30])
        .weakness(20, "Improper Input Validation")
        .children(20, 1000, &[89])
        .weakness(30, "Other")
        .children(30, 1000, &[89])
        .weakness(89, "SQL Injection")
        .children(89, 1000, &[]);
    let (fetcher, mock) = spawn(routes).await;

    let registry = fetcher.build_tree_with_view("CWE-1000").await.unwrap();

    assert_eq!(registry.len(), 4);
    assert_eq!(parent_id(&registry, "CWE-89").as_deref(), Some("CWE-20"));
    assert!(registry.get_by_id("CWE-30").unwrap().is_leaf());
    assert_eq!(mock.hits_for("/cwe/weakness/89"), 1);
}

#[tokio::test]
async fn tree_invariants_hold() {
    let routes = Routes::default()
        .view(1000, "Research Concepts")
        .children(1000, 1000, &[20, 30, 40])
        .weakness(20, "a")
        .children(20, 1000, &[21, 22, 30])
        .weakness(21, "b")
        .children(21, 1000, &[1000])
        .weakness(22, "c")
        .children(22, 1000, &[])
        .weakness(30, "d")
        .children(30, 1000, &[20, 31])
        .weakness(31, "e")
        .children(31, 1000, &[])
        .weakness(40, "f")
        .children(40, 1000, &[22]);
    let (fetcher, _) = spawn(routes).await;

    let registry = fetcher.build_tree_with_view("CWE-1000").await.unwrap();
    let root = registry.root().unwrap();

    assert_eq!(registry.len(), 7);
    let mut claimed: HashSet<String> = HashSet::new();
    for node in registry.nodes() {
        assert!(node.root().ptr_eq(&root), "{} is not reachable from the root", node.id());
        for child in node.children() {
            assert!(claimed.insert(child.id()), "{} has two parents", child.id());
        }
    }
    assert_eq!(claimed.len(), registry.len() - 1);
}

#[tokio::test]
async fn category_is_fallback_for_children() {
    let routes = Routes::default()
        .view(699, "Software Development")
        .children(699, 699, &[1019])
        .category(1019, "Validate Inputs")
        .children(1019, 699, &[20])
        .weakness(20, "Improper Input Validation")
        .children(20, 699, &[]);
    let (fetcher, mock) = spawn(routes).await;

    let registry = fetcher.build_tree_with_view("CWE-699").await.unwrap();

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.get_by_id("CWE-1019").unwrap().name(), "Validate Inputs");
    assert_eq!(parent_id(&registry, "CWE-20").as_deref(), Some("CWE-1019"));
    assert_eq!(mock.hits_for("/cwe/weakness/1019"), 1);
}

#[tokio::test]
async fn failing_child_is_skipped() {
    let routes = simple_view()
        .children(1000, 1000, &[20, 21])
        .status("/cwe/weakness/21", StatusCode::INTERNAL_SERVER_ERROR)
        .status("/cwe/category/21", StatusCode::INTERNAL_SERVER_ERROR)
        .status("/cwe/89/children?view=1000", StatusCode::SERVICE_UNAVAILABLE);
    let (fetcher, _) = spawn(routes).await;

    let registry = fetcher.build_tree_with_view("CWE-1000").await.unwrap();

    assert_eq!(registry.ids(), vec!["CWE-20", "CWE-89", "CWE-1000"]);
    assert!(!registry.contains("CWE-21"));
}

#[tokio::test]
async fn view_fetch_failure_is_fatal() {
    let routes = Routes::default().status("/cwe/view/1000", StatusCode::BAD_GATEWAY);
    let (fetcher, mock) = spawn(routes).await;

    let err = fetcher.build_tree_with_view("CWE-1000").await.unwrap_err();

    assert!(matches!(err, ClientError::RetriesExceeded { attempts: 1, .. }));
    assert_eq!(mock.total_hits(), 1);
}

#[tokio::test]
async fn invalid_view_id_fails_before_any_request() {
    let (fetcher, mock) = spawn(Routes::default()).await;
    let err = fetcher.build_tree_with_view("view-1000").await.unwrap_err();
    assert!(matches!(err, ClientError::Core(cwe::Error::InvalidId(_))));
    assert_eq!(mock.total_hits(), 0);
}

#[tokio::test]
async fn requests_are_paced() {
    let interval = Duration::from_millis(50);
    let (fetcher, mock) = spawn_with(simple_view(), fast_config().with_rate_limit_interval(interval)).await;

    let start = Instant::now();
    fetcher.build_tree_with_view("CWE-1000").await.unwrap();
    let elapsed = start.elapsed();

    // view, three child listings, two weaknesses
    assert_eq!(mock.total_hits(), 6);
    assert!(elapsed >= interval * 5, "six requests took only {elapsed:?}");
}

#[tokio::test]
async fn view_with_mismatched_id_is_rejected() {
    let routes = Routes::default()
        .ok("/cwe/view/1000", entry(999, "Some Other View"))
        .children(999, 1000, &[20]);
    let (fetcher, mock) = spawn(routes).await;

    let err = fetcher.build_tree_with_view("CWE-1000").await.unwrap_err();

    match err {
        ClientError::Decode { message, .. } => assert!(message.contains("CWE-999")),
        other => panic!("expected Decode, got {other:?}"),
    }
    assert_eq!(mock.total_hits(), 1);
}

// ---------------------------------------------------------------------------
// fetch_weakness / fetch_category / fetch_view
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_weakness_builds_detached_node() {
    let body = r#"{"id": "CWE-89", "name": "SQL Injection", "severity": "High",
        "description": "Improper neutralization of special elements in an SQL command.",
        "mitigations": ["Use prepared statements."]}"#;
    let (fetcher, mock) = spawn(Routes::default().ok("/cwe/weakness/89", body)).await;

    let node = fetcher.fetch_weakness("89").await.unwrap();

    assert_eq!(node.id(), "CWE-89");
    assert_eq!(node.name(), "SQL Injection");
    assert_eq!(node.severity().as_deref(), Some("High"));
    assert_eq!(node.mitigations(), vec!["Use prepared statements."]);
    assert!(node.is_root() && node.is_leaf());
    assert_eq!(mock.hits_for("/cwe/weakness/89"), 1);
}

#[tokio::test]
async fn fetch_weakness_accepts_envelope() {
    let body = r#"{"Weaknesses": [{"ID": "89", "Name": "SQL Injection",
        "LikelihoodOfExploit": "High"}]}"#;
    let (fetcher, _) = spawn(Routes::default().ok("/cwe/weakness/89", body)).await;

    let node = fetcher.fetch_weakness("CWE-089").await.unwrap();

    assert_eq!(node.id(), "CWE-89");
    assert_eq!(node.name(), "SQL Injection");
    assert_eq!(node.severity().as_deref(), Some("High"));
}

#[tokio::test]
async fn fetch_category_and_view() {
    let routes = Routes::default()
        .ok(
            "/cwe/category/1019",
            r#"{"Categories": [{"ID": 1019, "Name": "Validate Inputs"}]}"#,
        )
        .view(1000, "Research Concepts");
    let (fetcher, _) = spawn(routes).await;

    let category = fetcher.fetch_category("cwe 1019").await.unwrap();
    assert_eq!(category.id(), "CWE-1019");
    assert_eq!(category.name(), "Validate Inputs");

    let view = fetcher.fetch_view("1000").await.unwrap();
    assert_eq!(view.id(), "CWE-1000");
    assert_eq!(view.name(), "Research Concepts");
}

#[tokio::test]
async fn fetch_weakness_surfaces_errors() {
    let routes = Routes::default().ok("/cwe/weakness/89", r#"{"name": "SQL Injection"}"#);
    let (fetcher, mock) = spawn(routes).await;

    let err = fetcher.fetch_weakness("89").await.unwrap_err();
    assert!(matches!(err, ClientError::MissingField { field: "id", .. }));

    let err = fetcher.fetch_category("89").await.unwrap_err();
    assert_eq!(err.status(), Some(404));

    let err = fetcher.fetch_view("view").await.unwrap_err();
    assert!(matches!(err, ClientError::Core(cwe::Error::InvalidId(_))));
    assert_eq!(mock.total_hits(), 2);
}

// ---------------------------------------------------------------------------
// fetch_multiple
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_multiple_registers_detached_nodes() {
    let body = r#"{
        "CWE-79": {"ID": "79", "Name": "XSS"},
        "CWE-89": {"ID": "89", "Name": "SQL Injection"},
        "CWE-90": {"Name": "no id"}
    }"#;
    let (fetcher, mock) = spawn(Routes::default().ok("/cwe/79,89,90", body)).await;

    let registry = fetcher.fetch_multiple(&["CWE-79", "89", "cwe 90"]).await.unwrap();

    assert_eq!(registry.ids(), vec!["CWE-79", "CWE-89"]);
    assert!(registry.nodes().iter().all(|n| n.is_root() && n.is_leaf()));
    assert!(registry.root().is_none());
    assert_eq!(mock.total_hits(), 1);
}

#[tokio::test]
async fn fetch_multiple_rejects_empty_list() {
    let (fetcher, mock) = spawn(Routes::default()).await;
    let err = fetcher.fetch_multiple(&[]).await.unwrap_err();
    assert!(matches!(err, ClientError::Core(cwe::Error::EmptyInput(_))));
    assert_eq!(mock.total_hits(), 0);
}

#[tokio::test]
async fn fetch_multiple_rejects_invalid_id() {
    let (fetcher, mock) = spawn(Routes::default()).await;
    let err = fetcher.fetch_multiple(&["CWE-79", "XSS"]).await.unwrap_err();
    assert!(matches!(err, ClientError::Core(cwe::Error::InvalidId(_))));
    assert_eq!(mock.total_hits(), 0);
}

// ---------------------------------------------------------------------------
// fetch_with_relations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_with_relations_populates_descendants() {
    let (fetcher, _) = spawn(simple_view()).await;

    let node = fetcher.fetch_with_relations("20", "1000").await.unwrap();

    assert_eq!(node.id(), "CWE-20");
    assert_eq!(child_ids(&node), vec!["CWE-89"]);
    assert_eq!(node.descendants().len(), 1);
}

#[tokio::test]
async fn fetch_with_relations_falls_back_to_view() {
    let (fetcher, mock) = spawn(simple_view()).await;

    let node = fetcher.fetch_with_relations("CWE-1000", "CWE-1000").await.unwrap();

    assert_eq!(node.name(), "Research Concepts");
    assert_eq!(node.descendants().len(), 2);
    assert_eq!(mock.hits_for("/cwe/weakness/1000"), 1);
    assert_eq!(mock.hits_for("/cwe/category/1000"), 1);
}

#[tokio::test]
async fn fetch_with_relations_returns_node_when_children_fail() {
    let routes = Routes::default()
        .weakness(20, "Improper Input Validation")
        .status("/cwe/20/children?view=1000", StatusCode::INTERNAL_SERVER_ERROR);
    let (fetcher, _) = spawn(routes).await;

    let node = fetcher.fetch_with_relations("CWE-20", "CWE-1000").await.unwrap();

    assert_eq!(node.id(), "CWE-20");
    assert!(node.is_leaf());
}

#[tokio::test]
async fn fetch_with_relations_fails_when_nothing_matches() {
    let (fetcher, mock) = spawn(Routes::default()).await;
    let err = fetcher.fetch_with_relations("CWE-5", "CWE-1000").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(mock.total_hits(), 3);
}

#[tokio::test]
async fn populate_children_surfaces_listing_failure() {
    let routes = Routes::default().status("/cwe/20/children?view=1000", StatusCode::INTERNAL_SERVER_ERROR);
    let (fetcher, _) = spawn(routes).await;
    let node = Node::new("CWE-20", "Improper Input Validation");

    let err = fetcher.populate_children_recursive(&node, "CWE-1000").await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(node.is_leaf());
}

// ---------------------------------------------------------------------------
// build_cwe_tree
// ---------------------------------------------------------------------------

fn forest_routes() -> Routes {
    let body = serde_json::json!({
        "Weaknesses": [
            {"ID": "707", "Name": "Improper Neutralization"},
            {"ID": "20", "Name": "Improper Input Validation"},
            {"ID": "89", "Name": "SQL Injection"}
        ],
        "Views": [{"ID": "1000", "Name": "Research Concepts"}]
    })
    .to_string();
    Routes::default()
        .ok("/cwe/1000,707,20,89", body)
        .ok("/cwe/1000/children", r#"["707", "20", "664"]"#)
        .ok("/cwe/707/children", "[]")
        .ok("/cwe/20/children", r#"["89"]"#)
        .ok("/cwe/89/children", r#"["20"]"#)
}

#[tokio::test]
async fn cwe_tree_links_fetched_ids_and_sorts_children() {
    let (fetcher, _) = spawn(forest_routes()).await;

    let registry = fetcher
        .build_cwe_tree(&["CWE-1000", "707", "20", "89"], None)
        .await
        .unwrap();

    assert_eq!(registry.len(), 4);
    let root = registry.root().expect("single parentless node becomes root");
    assert_eq!(root.id(), "CWE-1000");
    assert_eq!(child_ids(&root), vec!["CWE-20", "CWE-707"]);
    assert_eq!(parent_id(&registry, "CWE-89").as_deref(), Some("CWE-20"));
    assert!(!registry.contains("CWE-664"));
    // 89 → 20 would close a cycle
    assert!(registry.get_by_id("CWE-89").unwrap().is_leaf());
}

#[tokio::test]
async fn cwe_tree_with_several_roots_leaves_root_unset() {
    let routes = Routes::default()
        .ok(
            "/cwe/79,89",
            r#"[{"ID": "79", "Name": "XSS"}, {"ID": "89", "Name": "SQL Injection"}]"#,
        )
        .ok("/cwe/79/children?view=1000", "[]")
        .ok("/cwe/89/children?view=1000", "[]");
    let (fetcher, _) = spawn(routes).await;

    let registry = fetcher.build_cwe_tree(&["79", "89"], Some("1000")).await.unwrap();

    assert_eq!(registry.len(), 2);
    assert!(registry.root().is_none());
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn built_tree_survives_export_and_import() {
    let (fetcher, _) = spawn(simple_view()).await;
    let registry = fetcher.build_tree_with_view("CWE-1000").await.unwrap();

    let json = registry.export_json().unwrap();
    let restored = Registry::new();
    restored.import_json(json.as_bytes()).unwrap();

    assert_eq!(restored.ids(), registry.ids());
    assert_eq!(parent_id(&restored, "CWE-89").as_deref(), Some("CWE-20"));
    assert_eq!(parent_id(&restored, "CWE-20").as_deref(), Some("CWE-1000"));
    assert_eq!(restored.get_by_id("CWE-89").unwrap().name(), "SQL Injection");
}
