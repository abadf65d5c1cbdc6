//! Integration tests for the wikistore backend.

use std::sync::Arc;

use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Store};
use crate::{create_router, AppState};

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some("test-api-key".to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let store = Arc::new(Store::new(pool));

        // Create config
        let config = Config {
            api_psk: psk.clone(),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
        };

        let state = AppState {
            store,
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn page_url(&self, space: &str, page: &str) -> String {
        self.url(&format!("/wikis/xwiki/spaces/{}/pages/{}", space, page))
    }

    /// Save a page with the given content, asserting success.
    async fn save_page(&self, space: &str, page: &str, content: &str) -> Value {
        let resp = self
            .client
            .put(self.page_url(space, page))
            .json(&json!({ "content": content }))
            .send()
            .await
            .unwrap();
        assert!(
            resp.status() == 201 || resp.status() == 202,
            "save failed: {}",
            resp.status()
        );
        resp.json().await.unwrap()
    }
}

// ==================== HEALTH & BASICS ====================

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_get_missing_page_returns_404() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.page_url("Main", "Nowhere"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

// ==================== PAGE LIFECYCLE ====================

#[tokio::test]
async fn test_create_page_starts_at_1_1() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .put(fixture.page_url("Main", "First"))
        .json(&json!({ "title": "First", "content": "Hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["version"], "1.1");
    assert_eq!(page["title"], "First");
    assert_eq!(page["content"], "Hello");
    assert_eq!(page["wiki"], "xwiki");
    assert_eq!(page["space"], "Main");
    assert_eq!(page["name"], "First");
    assert_eq!(page["syntax"], "xwiki/2.1");
}

#[tokio::test]
async fn test_update_page_bumps_major() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Main", "Update", "one").await;

    let resp = fixture
        .client
        .put(fixture.page_url("Main", "Update"))
        .json(&json!({ "content": "two" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["version"], "2.1");
    assert_eq!(page["content"], "two");
}

#[tokio::test]
async fn test_minor_save_bumps_minor_only() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Main", "Minor", "one").await;

    let resp = fixture
        .client
        .put(format!("{}?minor=true", fixture.page_url("Main", "Minor")))
        .json(&json!({ "content": "one." }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["version"], "1.2");
}

#[tokio::test]
async fn test_admin_save_bumps_minor_component() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Main", "Housekeeping", "one").await;

    let resp = fixture
        .client
        .put(format!(
            "{}?admin=true",
            fixture.page_url("Main", "Housekeeping")
        ))
        .json(&json!({ "content": "one (retouched)" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["version"], "1.2");
}

#[tokio::test]
async fn test_save_preserves_unspecified_fields() {
    let fixture = TestFixture::new().await;

    fixture
        .client
        .put(fixture.page_url("Main", "Partial"))
        .json(&json!({ "title": "Kept", "content": "v1", "tags": ["a", "b"] }))
        .send()
        .await
        .unwrap();

    // Patch only the content; title and tags must survive.
    fixture
        .client
        .put(fixture.page_url("Main", "Partial"))
        .json(&json!({ "content": "v2" }))
        .send()
        .await
        .unwrap();

    let page: Value = fixture
        .client
        .get(fixture.page_url("Main", "Partial"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["title"], "Kept");
    assert_eq!(page["content"], "v2");
    assert_eq!(page["tags"], json!(["a", "b"]));
}

#[tokio::test]
async fn test_put_plain_text_sets_content_only() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Main", "Plain", "old").await;

    let resp = fixture
        .client
        .put(fixture.page_url("Main", "Plain"))
        .header("content-type", "text/plain")
        .body("raw text body")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["content"], "raw text body");
}

#[tokio::test]
async fn test_put_malformed_json_returns_400() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .put(fixture.page_url("Main", "Broken"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_put_unsupported_content_type_returns_400() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .put(fixture.page_url("Main", "Xml"))
        .header("content-type", "text/xml")
        .body("<page/>")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_query_params_override_body() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .put(format!(
            "{}?title=FromQuery&tags=x|y",
            fixture.page_url("Main", "QuerySave")
        ))
        .json(&json!({ "title": "FromBody", "content": "c" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["title"], "FromQuery");
    assert_eq!(page["content"], "c");
    assert_eq!(page["tags"], json!(["x", "y"]));
}

#[tokio::test]
async fn test_delete_page() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Main", "Doomed", "bye").await;

    let resp = fixture
        .client
        .delete(fixture.page_url("Main", "Doomed"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = fixture
        .client
        .get(fixture.page_url("Main", "Doomed"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // A second delete is a 404, not idempotent success.
    let resp = fixture
        .client
        .delete(fixture.page_url("Main", "Doomed"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ==================== POST FORM OVERRIDE ====================

#[tokio::test]
async fn test_post_with_method_put_saves() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.page_url("Main", "FormSave"))
        .form(&[
            ("method", "PUT"),
            ("title", "Form Title"),
            ("content", "form content"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["title"], "Form Title");
    assert_eq!(page["content"], "form content");
    assert_eq!(page["version"], "1.1");
}

#[tokio::test]
async fn test_post_without_method_put_is_rejected() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.page_url("Main", "FormSave2"))
        .form(&[("title", "t"), ("content", "c")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .client
        .get(fixture.page_url("Main", "FormSave2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ==================== AUTH ====================

#[tokio::test]
async fn test_write_without_key_is_401() {
    let fixture = TestFixture::new().await;

    let anon = Client::new();
    let resp = anon
        .put(fixture.page_url("Main", "NoKey"))
        .json(&json!({ "content": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_wrong_key_is_401_even_for_reads() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Main", "Guarded", "x").await;

    let anon = Client::new();
    let resp = anon
        .get(fixture.page_url("Main", "Guarded"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_reads_open_without_key() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Main", "Public", "open").await;

    let anon = Client::new();
    let resp = anon
        .get(fixture.page_url("Main", "Public"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["content"], "open");
}

#[tokio::test]
async fn test_no_psk_configured_allows_writes() {
    let fixture = TestFixture::with_psk(None).await;

    let resp = fixture
        .client
        .put(fixture.page_url("Main", "DevMode"))
        .json(&json!({ "content": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

// ==================== HISTORY ====================

#[tokio::test]
async fn test_history_ascending_and_paged() {
    let fixture = TestFixture::new().await;
    for content in ["v1", "v2", "v3", "v4"] {
        fixture.save_page("Main", "Hist", content).await;
    }

    let history: Value = fixture
        .client
        .get(format!("{}/history", fixture.page_url("Main", "Hist")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let summaries = history["historySummaries"].as_array().unwrap();
    let versions: Vec<&str> = summaries
        .iter()
        .map(|s| s["version"].as_str().unwrap())
        .collect();
    assert_eq!(versions, vec!["1.1", "2.1", "3.1", "4.1"]);

    // Restart partway through the listing.
    let history: Value = fixture
        .client
        .get(format!(
            "{}/history?start=1&number=2",
            fixture.page_url("Main", "Hist")
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let summaries = history["historySummaries"].as_array().unwrap();
    let versions: Vec<&str> = summaries
        .iter()
        .map(|s| s["version"].as_str().unwrap())
        .collect();
    assert_eq!(versions, vec!["2.1", "3.1"]);
}

#[tokio::test]
async fn test_read_historical_revision() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Main", "Past", "old words").await;
    fixture.save_page("Main", "Past", "new words").await;

    let page: Value = fixture
        .client
        .get(format!("{}?rev=1.1", fixture.page_url("Main", "Past")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["version"], "1.1");
    assert_eq!(page["content"], "old words");

    let resp = fixture
        .client
        .get(format!("{}?rev=9.9", fixture.page_url("Main", "Past")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ==================== TRANSLATIONS ====================

#[tokio::test]
async fn test_translation_lifecycle() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Main", "Multi", "default content").await;

    let resp = fixture
        .client
        .put(format!(
            "{}/translations/fr",
            fixture.page_url("Main", "Multi")
        ))
        .json(&json!({ "content": "contenu" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["language"], "fr");
    assert_eq!(page["version"], "1.1");

    // The default page lists its translation variants.
    let page: Value = fixture
        .client
        .get(fixture.page_url("Main", "Multi"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let languages: Vec<&str> = page["translations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["language"].as_str().unwrap())
        .collect();
    assert_eq!(languages, vec!["fr"]);

    // Translation histories are independent revision chains.
    fixture
        .client
        .put(format!(
            "{}/translations/fr",
            fixture.page_url("Main", "Multi")
        ))
        .json(&json!({ "content": "contenu v2" }))
        .send()
        .await
        .unwrap();
    let history: Value = fixture
        .client
        .get(format!(
            "{}/translations/fr/history",
            fixture.page_url("Main", "Multi")
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["historySummaries"].as_array().unwrap().len(), 2);
    let default_history: Value = fixture
        .client
        .get(format!("{}/history", fixture.page_url("Main", "Multi")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(default_history["historySummaries"].as_array().unwrap().len(), 1);

    // A missing language is 404 even though the default exists.
    let resp = fixture
        .client
        .get(format!(
            "{}/translations/de",
            fixture.page_url("Main", "Multi")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Deleting the translation leaves the default untouched.
    let resp = fixture
        .client
        .delete(format!(
            "{}/translations/fr",
            fixture.page_url("Main", "Multi")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    let resp = fixture
        .client
        .get(fixture.page_url("Main", "Multi"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

// ==================== OBJECTS ====================

#[tokio::test]
async fn test_objects_full_replace_semantics() {
    let fixture = TestFixture::new().await;

    fixture
        .client
        .put(fixture.page_url("Main", "Tagged"))
        .json(&json!({
            "content": "c",
            "objects": [{
                "className": "XWiki.TagClass",
                "properties": [{ "name": "tags", "value": "TAG" }]
            }]
        }))
        .send()
        .await
        .unwrap();

    let page: Value = fixture
        .client
        .get(format!("{}?objects=true", fixture.page_url("Main", "Tagged")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["objects"][0]["className"], "XWiki.TagClass");
    assert_eq!(page["objects"][0]["properties"][0]["value"], "TAG");

    // A save without objects preserves them.
    fixture.save_page("Main", "Tagged", "c2").await;
    let page: Value = fixture
        .client
        .get(format!("{}?objects=true", fixture.page_url("Main", "Tagged")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["objects"].as_array().unwrap().len(), 1);

    // An explicitly empty collection clears them.
    fixture
        .client
        .put(fixture.page_url("Main", "Tagged"))
        .json(&json!({ "objects": [] }))
        .send()
        .await
        .unwrap();
    let page: Value = fixture
        .client
        .get(format!("{}?objects=true", fixture.page_url("Main", "Tagged")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["objects"].as_array().unwrap().len(), 0);
}

// ==================== CHILDREN ====================

#[tokio::test]
async fn test_children_listing() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Tree", "Parent", "root").await;

    fixture
        .client
        .put(fixture.page_url("Tree", "ChildA"))
        .json(&json!({ "content": "a", "parent": "Tree.Parent" }))
        .send()
        .await
        .unwrap();
    fixture
        .client
        .put(fixture.page_url("Tree", "ChildB"))
        .json(&json!({ "content": "b", "parent": "Tree.Parent" }))
        .send()
        .await
        .unwrap();
    fixture.save_page("Tree", "Unrelated", "x").await;

    let pages: Value = fixture
        .client
        .get(format!("{}/children", fixture.page_url("Tree", "Parent")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = pages["pageSummaries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["ChildA", "ChildB"]);
}

// ==================== COPY & MOVE ====================

#[tokio::test]
async fn test_copy_page() {
    let fixture = TestFixture::new().await;
    fixture.save_page("SpaceA", "Source", "original content").await;

    let resp = fixture
        .client
        .put(format!(
            "{}?copyFrom=xwiki:SpaceA.Source",
            fixture.page_url("SpaceB", "Copy")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["version"], "1.1");
    assert_eq!(page["content"], "original content");

    // The destination now exists; a repeat copy conflicts.
    let resp = fixture
        .client
        .put(format!(
            "{}?copyFrom=xwiki:SpaceA.Source",
            fixture.page_url("SpaceB", "Copy")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CONFLICT");

    // Deleting the copy leaves the source untouched.
    fixture
        .client
        .delete(fixture.page_url("SpaceB", "Copy"))
        .send()
        .await
        .unwrap();
    let resp = fixture
        .client
        .get(fixture.page_url("SpaceA", "Source"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_copy_missing_source_is_404() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .put(format!(
            "{}?copyFrom=xwiki:Nowhere.Nothing",
            fixture.page_url("SpaceB", "Copy404")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_move_page() {
    let fixture = TestFixture::new().await;
    fixture.save_page("SpaceA", "Mover", "moving content").await;

    let resp = fixture
        .client
        .put(format!(
            "{}?moveFrom=xwiki:SpaceA.Mover",
            fixture.page_url("SpaceB", "Moved")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["content"], "moving content");

    // The source is gone.
    let resp = fixture
        .client
        .get(fixture.page_url("SpaceA", "Mover"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_move_onto_existing_destination_conflicts_and_keeps_source() {
    let fixture = TestFixture::new().await;
    fixture.save_page("SpaceA", "Stay", "still here").await;
    fixture.save_page("SpaceB", "Taken", "occupied").await;

    let resp = fixture
        .client
        .put(format!(
            "{}?moveFrom=xwiki:SpaceA.Stay",
            fixture.page_url("SpaceB", "Taken")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // All-or-nothing: the failed move left the source intact.
    let page: Value = fixture
        .client
        .get(fixture.page_url("SpaceA", "Stay"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["content"], "still here");
    let page: Value = fixture
        .client
        .get(fixture.page_url("SpaceB", "Taken"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["content"], "occupied");
}

// ==================== ATTACHMENTS ====================

#[tokio::test]
async fn test_attachment_upload_advances_document_only_on_change() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Files", "Holder", "v1").await;

    let url = format!("{}/attachments/att.txt", fixture.page_url("Files", "Holder"));

    // First upload: attachment 1.1, document advances to 2.1.
    let resp = fixture
        .client
        .put(&url)
        .body("attachment content")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let info: Value = resp.json().await.unwrap();
    assert_eq!(info["version"], "1.1");
    assert_eq!(info["pageVersion"], "2.1");
    assert_eq!(info["contentDirty"], true);

    // Re-saving the document leaves the attachment version alone.
    fixture.save_page("Files", "Holder", "v2").await;
    let list: Value = fixture
        .client
        .get(format!("{}/attachments", fixture.page_url("Files", "Holder")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["attachments"][0]["version"], "1.1");
    assert_eq!(list["attachments"][0]["contentDirty"], false);

    // An identical re-upload changes nothing at all.
    let resp = fixture
        .client
        .put(&url)
        .body("attachment content")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let info: Value = resp.json().await.unwrap();
    assert_eq!(info["version"], "1.1");
    let history: Value = fixture
        .client
        .get(format!("{}/history", fixture.page_url("Files", "Holder")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["historySummaries"].as_array().unwrap().len(), 3);

    // Different bytes advance the attachment to 2.1 and the document again.
    let resp = fixture
        .client
        .put(&url)
        .body("changed content")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let info: Value = resp.json().await.unwrap();
    assert_eq!(info["version"], "2.1");
    assert_eq!(info["pageVersion"], "4.1");
}

#[tokio::test]
async fn test_attachment_bytes_roundtrip() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Files", "Bytes", "v1").await;

    let url = format!("{}/attachments/blob.bin", fixture.page_url("Files", "Bytes"));
    let payload: Vec<u8> = vec![0u8, 159, 146, 150, 255];
    fixture
        .client
        .put(&url)
        .body(payload.clone())
        .send()
        .await
        .unwrap();

    let resp = fixture.client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"],
        "application/octet-stream"
    );
    assert_eq!(resp.bytes().await.unwrap().to_vec(), payload);
}

#[tokio::test]
async fn test_attachment_upload_to_missing_page_is_404() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .put(format!(
            "{}/attachments/orphan.txt",
            fixture.page_url("Files", "NoPage")
        ))
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_attachment_delete_keeps_history_readable() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Files", "Keeper", "v1").await;

    let url = format!("{}/attachments/gone.txt", fixture.page_url("Files", "Keeper"));
    fixture.client.put(&url).body("old bytes").send().await.unwrap();

    let resp = fixture.client.delete(&url).send().await.unwrap();
    assert_eq!(resp.status(), 204);

    // The current read is gone, the versioned read is not.
    let resp = fixture.client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let resp = fixture
        .client
        .get(format!("{}?rev=1.1", url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "old bytes");

    // A second delete is 404.
    let resp = fixture.client.delete(&url).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_attachment_versions_never_reused_after_readd() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Files", "Cycle", "v1").await;

    let url = format!("{}/attachments/cycle.txt", fixture.page_url("Files", "Cycle"));
    fixture.client.put(&url).body("first").send().await.unwrap();
    fixture.client.delete(&url).send().await.unwrap();

    let resp = fixture.client.put(&url).body("second").send().await.unwrap();
    assert_eq!(resp.status(), 201);
    let info: Value = resp.json().await.unwrap();
    assert_eq!(info["version"], "2.1");
}

// ==================== ROLLBACK ====================

#[tokio::test]
async fn test_rollback_restores_content_as_new_revision() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Roll", "Doc", "version one").await;
    fixture.save_page("Roll", "Doc", "version two").await;
    fixture.save_page("Roll", "Doc", "version three").await;

    let resp = fixture
        .client
        .post(format!(
            "{}/rollback?rev=1.1&confirm=1",
            fixture.page_url("Roll", "Doc")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["version"], "4.1");
    assert_eq!(page["content"], "version one");
    assert_eq!(page["comment"], "Rolled back to version 1.1");

    // History keeps all four entries; nothing was rewritten.
    let history: Value = fixture
        .client
        .get(format!("{}/history", fixture.page_url("Roll", "Doc")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["historySummaries"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_rollback_requires_confirm_and_valid_target() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Roll", "Strict", "v1").await;
    fixture.save_page("Roll", "Strict", "v2").await;

    let resp = fixture
        .client
        .post(format!(
            "{}/rollback?rev=1.1",
            fixture.page_url("Roll", "Strict")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .client
        .post(format!(
            "{}/rollback?rev=7.1&confirm=1",
            fixture.page_url("Roll", "Strict")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_rollback_restores_deleted_attachment() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Roll", "WithAtt", "v1").await; // 1.1

    let url = format!("{}/attachments/file.txt", fixture.page_url("Roll", "WithAtt"));
    fixture.client.put(&url).body("payload").send().await.unwrap(); // doc 2.1, att 1.1
    fixture.save_page("Roll", "WithAtt", "v2").await; // doc 3.1
    fixture.client.delete(&url).send().await.unwrap(); // doc 4.1

    // Roll back to 3.1, where the attachment was still present.
    let resp = fixture
        .client
        .post(format!(
            "{}/rollback?rev=3.1&confirm=1",
            fixture.page_url("Roll", "WithAtt")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["version"], "5.1");
    assert_eq!(page["content"], "v2");

    // Restored bytes count as a new attachment revision, not a rewrite.
    let resp = fixture.client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "payload");
    let list: Value = fixture
        .client
        .get(format!("{}/attachments", fixture.page_url("Roll", "WithAtt")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["attachments"][0]["version"], "2.1");
}

#[tokio::test]
async fn test_rollback_after_attachment_overwrite_restores_old_bytes() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Roll", "Overwrite", "page").await; // 1.1

    let url = format!(
        "{}/attachments/a.txt",
        fixture.page_url("Roll", "Overwrite")
    );
    fixture.client.put(&url).body("v1").send().await.unwrap(); // doc 2.1, att 1.1
    fixture.client.put(&url).body("v2").send().await.unwrap(); // doc 3.1, att 2.1

    // Roll back to the document revision where the attachment was still "v1".
    let resp = fixture
        .client
        .post(format!(
            "{}/rollback?rev=2.1&confirm=1",
            fixture.page_url("Roll", "Overwrite")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture.client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "v1");

    // The restoration is a new attachment revision; both historical
    // revisions survive unmodified.
    let list: Value = fixture
        .client
        .get(format!(
            "{}/attachments",
            fixture.page_url("Roll", "Overwrite")
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["attachments"][0]["version"], "3.1");

    let resp = fixture
        .client
        .get(format!("{}?rev=1.1", url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.text().await.unwrap(), "v1");
    let resp = fixture
        .client
        .get(format!("{}?rev=2.1", url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.text().await.unwrap(), "v2");
}

#[tokio::test]
async fn test_rollback_removes_attachment_added_after_target() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Roll", "Later", "v1").await; // 1.1

    let url = format!("{}/attachments/late.txt", fixture.page_url("Roll", "Later"));
    fixture.client.put(&url).body("late bytes").send().await.unwrap(); // doc 2.1

    // At 1.1 the attachment did not exist yet.
    let resp = fixture
        .client
        .post(format!(
            "{}/rollback?rev=1.1&confirm=1",
            fixture.page_url("Roll", "Later")
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture.client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    // Its history remains reachable by explicit revision.
    let resp = fixture
        .client
        .get(format!("{}?rev=1.1", url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

// ==================== CONCURRENCY ====================

#[tokio::test]
async fn test_concurrent_saves_serialize_per_identity() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Race", "Doc", "base").await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = fixture.client.clone();
        let url = fixture.page_url("Race", "Doc");
        handles.push(tokio::spawn(async move {
            client
                .put(url)
                .json(&json!({ "content": format!("writer {}", i) }))
                .send()
                .await
                .unwrap()
                .status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 202);
    }

    // Every save landed as its own revision, strictly ascending.
    let history: Value = fixture
        .client
        .get(format!("{}/history", fixture.page_url("Race", "Doc")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let summaries = history["historySummaries"].as_array().unwrap();
    assert_eq!(summaries.len(), 9);
    let versions: Vec<&str> = summaries
        .iter()
        .map(|s| s["version"].as_str().unwrap())
        .collect();
    let mut unique = versions.clone();
    unique.dedup();
    assert_eq!(versions, unique);
}

#[tokio::test]
async fn test_concurrent_copies_one_winner() {
    let fixture = TestFixture::new().await;
    fixture.save_page("Race", "CopySource", "contested").await;

    let url = format!(
        "{}?copyFrom=xwiki:Race.CopySource",
        fixture.page_url("Race", "CopyDest")
    );
    let a = fixture.client.put(&url).send();
    let b = fixture.client.put(&url).send();
    let (a, b) = tokio::join!(a, b);

    let mut statuses = vec![a.unwrap().status().as_u16(), b.unwrap().status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, vec![201, 409]);
}
