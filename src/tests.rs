//! Integration tests for the forum backend.

use std::sync::Arc;

use reqwest::{Client, Method};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::models::CreateUserRequest;
use crate::{create_router, AppState};

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Arc<Repository>,
    pool: SqlitePool,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some("test-api-key".to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        let pool = init_database(&db_path, 4).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool.clone()));

        let config = Config {
            api_psk: psk.clone(),
            db_path,
            db_max_connections: 4,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
        };

        let state = AppState {
            repo: repo.clone(),
            config: Arc::new(config),
        };

        let app = create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

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
            repo,
            pool,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request as `caller` and return the status with the JSON body.
    async fn send(
        &self,
        method: Method,
        path: &str,
        caller: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut request = self.client.request(method, self.url(path));
        if let Some(user_id) = caller {
            request = request.header("x-user-id", user_id);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request.send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        self.send(Method::GET, path, None, None).await
    }

    /// Self-register a plain account over HTTP.
    async fn create_member(&self, name: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/users",
                None,
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(status, 200, "{}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    /// Moderators cannot self-register, so the first one goes straight into the database.
    async fn seed_moderator(&self, name: &str) -> String {
        let request = CreateUserRequest {
            name: name.to_string(),
            is_moderator: true,
        };
        self.repo.create_user(&request).await.unwrap().id
    }

    async fn create_category(&self, moderator: &str, name: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/categories",
                Some(moderator),
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(status, 200, "{}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_topic(&self, caller: &str, category: &str, name: &str, tags: &str) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/topics",
                Some(caller),
                Some(json!({
                    "name": name,
                    "description": format!("About {}", name),
                    "tagString": tags,
                    "parentCategory": category
                })),
            )
            .await;
        assert_eq!(status, 200, "{}", body);
        body["data"].clone()
    }

    /// Tag name -> ids of the topics using it.
    async fn tag_map(&self) -> Vec<(String, String, Vec<String>)> {
        let (status, body) = self.get("/api/tags").await;
        assert_eq!(status, 200);
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tag| {
                (
                    tag["name"].as_str().unwrap().to_string(),
                    tag["id"].as_str().unwrap().to_string(),
                    tag["topics"]
                        .as_array()
                        .unwrap()
                        .iter()
                        .map(|t| t.as_str().unwrap().to_string())
                        .collect(),
                )
            })
            .collect()
    }
}

/// Forum with one moderator, one regular member and one open category.
struct Forum {
    fixture: TestFixture,
    moderator: String,
    member: String,
    category: String,
}

impl Forum {
    async fn new() -> Self {
        let fixture = TestFixture::new().await;
        let moderator = fixture.seed_moderator("Mod").await;
        let member = fixture.create_member("Member").await;
        let category = fixture.create_category(&moderator, "General").await;
        Forum {
            fixture,
            moderator,
            member,
            category,
        }
    }
}

fn tag_names(topic: &Value) -> Vec<String> {
    topic["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect()
}

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
async fn test_gateway_rejects_missing_or_wrong_psk() {
    let fixture = TestFixture::new().await;
    let client = Client::new();

    let resp = client.get(fixture.url("/api/topics")).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = client
        .get(fixture.url("/api/topics"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(fixture.url("/api/topics"))
        .header("Authorization", "Bearer test-api-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_dev_mode_without_psk() {
    let fixture = TestFixture::with_psk(None).await;

    let (status, body) = fixture.get("/api/topics").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_create_topic_dedupes_tags() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let topic = fx
        .create_topic(&forum.member, &forum.category, "Rust", "a, b, a")
        .await;
    let topic_id = topic["id"].as_str().unwrap();

    assert_eq!(topic["name"], "Rust");
    assert_eq!(topic["tagString"], "a, b, a");
    assert_eq!(topic["createdBy"]["id"], forum.member.as_str());
    assert_eq!(topic["createdBy"]["name"], "Member");
    assert_eq!(topic["isArchived"], false);
    assert_eq!(topic["isSelfArchived"], false);
    assert_eq!(tag_names(&topic), vec!["a", "b"]);

    let tags = fx.tag_map().await;
    assert_eq!(tags.len(), 2);
    for (_, _, topics) in &tags {
        assert_eq!(topics, &vec![topic_id.to_string()]);
    }

    // Creator and category both list the new topic
    let user = fx.repo.get_user(&forum.member).await.unwrap().unwrap();
    assert_eq!(user.topics_created, vec![topic_id.to_string()]);

    let (_, body) = fx.get("/api/categories").await;
    assert_eq!(body["data"][0]["topics"], json!([topic_id]));
}

#[tokio::test]
async fn test_create_topic_without_tags() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let (status, body) = fx
        .send(
            Method::POST,
            "/api/topics",
            Some(&forum.member),
            Some(json!({ "name": "Plain", "parentCategory": forum.category })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["tags"], json!([]));
    assert!(fx.tag_map().await.is_empty());
}

#[tokio::test]
async fn test_list_topics_expands_creator_and_tags() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    fx.create_topic(&forum.member, &forum.category, "First", "x")
        .await;
    fx.create_topic(&forum.moderator, &forum.category, "Second", "y, x")
        .await;

    let (status, body) = fx.get("/api/topics").await;
    assert_eq!(status, 200);
    let topics = body["data"].as_array().unwrap();
    assert_eq!(topics.len(), 2);

    let second = topics.iter().find(|t| t["name"] == "Second").unwrap();
    assert_eq!(second["createdBy"]["name"], "Mod");
    assert_eq!(tag_names(second), vec!["y", "x"]);
}

#[tokio::test]
async fn test_update_reconciles_only_the_delta() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let topic = fx
        .create_topic(&forum.member, &forum.category, "Edit me", "a,b")
        .await;
    let topic_id = topic["id"].as_str().unwrap().to_string();

    let before = fx.tag_map().await;
    let b_id_before = before.iter().find(|(n, _, _)| n == "b").unwrap().1.clone();

    let (status, body) = fx
        .send(
            Method::PUT,
            &format!("/api/topics/{}", topic_id),
            Some(&forum.member),
            Some(json!({
                "name": "Edited",
                "description": "New description",
                "tagString": "b,c"
            })),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["name"], "Edited");
    assert_eq!(body["data"]["description"], "New description");
    assert_eq!(body["data"]["tagString"], "b,c");
    assert_eq!(tag_names(&body["data"]), vec!["b", "c"]);

    let after = fx.tag_map().await;
    let names: Vec<&str> = after.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(names, vec!["b", "c"]);

    let b = after.iter().find(|(n, _, _)| n == "b").unwrap();
    assert_eq!(b.1, b_id_before);
    assert_eq!(b.2, vec![topic_id.clone()]);

    let c = after.iter().find(|(n, _, _)| n == "c").unwrap();
    assert_eq!(c.2, vec![topic_id]);
}

#[tokio::test]
async fn test_update_keeps_tag_still_used_elsewhere() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let first = fx
        .create_topic(&forum.member, &forum.category, "First", "shared, solo")
        .await;
    let second = fx
        .create_topic(&forum.member, &forum.category, "Second", "shared")
        .await;
    let first_id = first["id"].as_str().unwrap();
    let second_id = second["id"].as_str().unwrap();

    let (status, _) = fx
        .send(
            Method::PUT,
            &format!("/api/topics/{}", first_id),
            Some(&forum.member),
            Some(json!({ "name": "First", "tagString": "" })),
        )
        .await;
    assert_eq!(status, 200);

    let tags = fx.tag_map().await;
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].0, "shared");
    assert_eq!(tags[0].2, vec![second_id.to_string()]);
}

#[tokio::test]
async fn test_update_requires_owner_or_moderator() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;
    let outsider = fx.create_member("Outsider").await;

    let topic = fx
        .create_topic(&forum.member, &forum.category, "Mine", "a")
        .await;
    let path = format!("/api/topics/{}", topic["id"].as_str().unwrap());
    let edit = json!({ "name": "Hijacked", "tagString": "z" });

    let (status, body) = fx
        .send(Method::PUT, &path, Some(&outsider), Some(edit.clone()))
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "NO_AUTHORIZATION");

    // Nothing changed
    let names: Vec<String> = fx.tag_map().await.into_iter().map(|(n, _, _)| n).collect();
    assert_eq!(names, vec!["a"]);

    let (status, body) = fx
        .send(Method::PUT, &path, Some(&forum.moderator), Some(edit))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["name"], "Hijacked");
    // Moderator edits do not change ownership
    assert_eq!(body["data"]["createdBy"]["id"], forum.member.as_str());
}

#[tokio::test]
async fn test_update_missing_topic() {
    let forum = Forum::new().await;

    let (status, body) = forum
        .fixture
        .send(
            Method::PUT,
            "/api/topics/does-not-exist",
            Some(&forum.member),
            Some(json!({ "name": "Ghost" })),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "TOPIC_REMOVED");
}

#[tokio::test]
async fn test_delete_topic_cascades() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let doomed = fx
        .create_topic(&forum.member, &forum.category, "Doomed", "gone, shared")
        .await;
    let survivor = fx
        .create_topic(&forum.member, &forum.category, "Survivor", "shared")
        .await;
    let doomed_id = doomed["id"].as_str().unwrap().to_string();
    let survivor_id = survivor["id"].as_str().unwrap().to_string();

    let (_, chat) = fx
        .send(
            Method::POST,
            &format!("/api/topics/{}/chats", doomed_id),
            Some(&forum.member),
            Some(json!({ "description": "hello" })),
        )
        .await;
    let message_id = chat["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = fx
        .send(
            Method::DELETE,
            &format!("/api/topics/{}", doomed_id),
            Some(&forum.member),
            None,
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["result"], "Topic deleted successfully.");

    let (status, body) = fx.get(&format!("/api/topics/{}", doomed_id)).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "TOPIC_REMOVED");

    // Orphaned tag removed, shared tag keeps the other topic
    let tags = fx.tag_map().await;
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].0, "shared");
    assert_eq!(tags[0].2, vec![survivor_id.clone()]);

    assert!(fx.repo.get_message(&message_id).await.unwrap().is_none());

    let user = fx.repo.get_user(&forum.member).await.unwrap().unwrap();
    assert_eq!(user.topics_created, vec![survivor_id.clone()]);

    let category = fx.repo.get_category(&forum.category).await.unwrap().unwrap();
    assert_eq!(category.topics, vec![survivor_id]);
}

#[tokio::test]
async fn test_delete_requires_owner_or_moderator() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;
    let outsider = fx.create_member("Outsider").await;

    let topic = fx
        .create_topic(&forum.member, &forum.category, "Mine", "")
        .await;
    let path = format!("/api/topics/{}", topic["id"].as_str().unwrap());

    let (status, _) = fx.send(Method::DELETE, &path, Some(&outsider), None).await;
    assert_eq!(status, 403);

    let (status, _) = fx
        .send(Method::DELETE, &path, Some(&forum.moderator), None)
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_delete_with_vanished_category_changes_nothing() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let topic = fx
        .create_topic(&forum.member, &forum.category, "Stranded", "lonely")
        .await;
    let topic_id = topic["id"].as_str().unwrap();

    sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(&forum.category)
        .execute(&fx.pool)
        .await
        .unwrap();

    let (status, body) = fx
        .send(
            Method::DELETE,
            &format!("/api/topics/{}", topic_id),
            Some(&forum.member),
            None,
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "CATEGORY_REMOVED");

    // Rolled back: topic and its tag are intact
    let (status, _) = fx.get(&format!("/api/topics/{}", topic_id)).await;
    assert_eq!(status, 200);
    assert_eq!(fx.tag_map().await.len(), 1);
}

#[tokio::test]
async fn test_create_topic_category_checks() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let (status, body) = fx
        .send(
            Method::POST,
            "/api/topics",
            Some(&forum.member),
            Some(json!({ "name": "Lost", "tagString": "t", "parentCategory": "nope" })),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "CATEGORY_REMOVED");

    let (status, _) = fx
        .send(
            Method::POST,
            &format!("/api/categories/{}/archive", forum.category),
            Some(&forum.moderator),
            None,
        )
        .await;
    assert_eq!(status, 200);

    let (status, body) = fx
        .send(
            Method::POST,
            "/api/topics",
            Some(&forum.member),
            Some(json!({ "name": "Late", "tagString": "t", "parentCategory": forum.category })),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "CATEGORY_ARCHIVED");

    // Failed creations leave no tags behind
    assert!(fx.tag_map().await.is_empty());
    let (_, body) = fx.get("/api/topics").await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_unauthenticated_mutations_are_rejected() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let topic = fx
        .create_topic(&forum.member, &forum.category, "Guarded", "g")
        .await;
    let topic_id = topic["id"].as_str().unwrap();

    let (status, body) = fx
        .send(
            Method::POST,
            "/api/topics",
            None,
            Some(json!({ "name": "Anon", "parentCategory": forum.category })),
        )
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

    let cases = [
        (Method::PUT, format!("/api/topics/{}", topic_id), Some(json!({ "name": "x" }))),
        (Method::DELETE, format!("/api/topics/{}", topic_id), None),
        (Method::POST, format!("/api/topics/{}/archive", topic_id), None),
        (Method::POST, format!("/api/topics/{}/unarchive", topic_id), None),
    ];
    for (method, path, body) in cases {
        let (status, resp) = fx.send(method, &path, None, body).await;
        assert_eq!(status, 401, "{}", path);
        assert_eq!(resp["error"]["code"], "UNAUTHENTICATED");
    }

    // Unknown caller ids count as signed out, even for missing topics
    let (status, _) = fx
        .send(
            Method::DELETE,
            "/api/topics/missing",
            Some("no-such-user"),
            None,
        )
        .await;
    assert_eq!(status, 401);

    let (_, body) = fx.get("/api/topics").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["name"], "Guarded");
}

#[tokio::test]
async fn test_blocked_user_cannot_mutate() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let topic = fx
        .create_topic(&forum.member, &forum.category, "Before block", "")
        .await;

    let (status, body) = fx
        .send(
            Method::PUT,
            &format!("/api/users/{}/status", forum.member),
            Some(&forum.moderator),
            Some(json!({ "isBlocked": true })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["isBlocked"], true);

    let (status, body) = fx
        .send(
            Method::POST,
            "/api/topics",
            Some(&forum.member),
            Some(json!({ "name": "After block", "parentCategory": forum.category })),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "NO_AUTHORIZATION");

    let (status, _) = fx
        .send(
            Method::POST,
            &format!("/api/topics/{}/archive", topic["id"].as_str().unwrap()),
            Some(&forum.member),
            None,
        )
        .await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_only_moderators_change_user_status() {
    let forum = Forum::new().await;

    let (status, _) = forum
        .fixture
        .send(
            Method::PUT,
            &format!("/api/users/{}/status", forum.moderator),
            Some(&forum.member),
            Some(json!({ "isRemoved": true })),
        )
        .await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_moderator_accounts_need_a_moderator() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;
    let request = json!({ "name": "Wannabe", "isModerator": true });

    let (status, body) = fx
        .send(Method::POST, "/api/users", None, Some(request.clone()))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

    let (status, body) = fx
        .send(
            Method::POST,
            "/api/users",
            Some(&forum.member),
            Some(request.clone()),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "NO_AUTHORIZATION");

    // A plain self-registered account still cannot touch other people's topics
    let topic = fx
        .create_topic(&forum.member, &forum.category, "Not yours", "keep")
        .await;
    let topic_path = format!("/api/topics/{}", topic["id"].as_str().unwrap());
    let wannabe = fx.create_member("Wannabe").await;
    let (status, _) = fx
        .send(Method::DELETE, &topic_path, Some(&wannabe), None)
        .await;
    assert_eq!(status, 403);
    let (status, _) = fx.get(&topic_path).await;
    assert_eq!(status, 200);

    let (status, body) = fx
        .send(
            Method::POST,
            "/api/users",
            Some(&forum.moderator),
            Some(request),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["isModerator"], true);
}

#[tokio::test]
async fn test_user_standing_reads_flags_only() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    fx.create_topic(&forum.member, &forum.category, "Owned", "")
        .await;

    let standing = fx
        .repo
        .get_user_standing(&forum.moderator)
        .await
        .unwrap()
        .unwrap();
    assert!(standing.is_moderator);
    assert!(!standing.is_blocked);

    let standing = fx
        .repo
        .get_user_standing(&forum.member)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(standing.id, forum.member);
    assert!(!standing.is_moderator);

    assert!(fx.repo.get_user_standing("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_topic_writes_all_succeed() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;
    const WRITERS: usize = 16;

    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let client = fx.client.clone();
        let url = fx.url("/api/topics");
        let caller = forum.member.clone();
        let body = json!({
            "name": format!("Topic {}", i),
            "tagString": format!("common, t{}", i),
            "parentCategory": forum.category
        });
        handles.push(tokio::spawn(async move {
            let resp = client
                .post(url)
                .header("x-user-id", caller)
                .json(&body)
                .send()
                .await
                .unwrap();
            let status = resp.status().as_u16();
            (status, resp.json::<Value>().await.unwrap())
        }));
    }

    let mut topic_ids = Vec::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, 200, "{}", body);
        topic_ids.push(body["data"]["id"].as_str().unwrap().to_string());
    }

    let tags = fx.tag_map().await;
    assert_eq!(tags.len(), WRITERS + 1);
    let common = tags.iter().find(|(n, _, _)| n == "common").unwrap();
    assert_eq!(common.2.len(), WRITERS);

    let mut handles = Vec::new();
    for (i, topic_id) in topic_ids.iter().enumerate() {
        let client = fx.client.clone();
        let url = fx.url(&format!("/api/topics/{}", topic_id));
        let caller = forum.member.clone();
        let body = json!({
            "name": format!("Topic {} edited", i),
            "tagString": format!("common, u{}", i)
        });
        handles.push(tokio::spawn(async move {
            let resp = client
                .put(url)
                .header("x-user-id", caller)
                .json(&body)
                .send()
                .await
                .unwrap();
            let status = resp.status().as_u16();
            (status, resp.json::<Value>().await.unwrap())
        }));
    }
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, 200, "{}", body);
    }

    let tags = fx.tag_map().await;
    assert_eq!(tags.len(), WRITERS + 1);
    assert!(tags.iter().all(|(n, _, _)| n == "common" || n.starts_with('u')));
    let common_after = tags.iter().find(|(n, _, _)| n == "common").unwrap();
    assert_eq!(common_after.1, common.1);
    assert_eq!(common_after.2.len(), WRITERS);
}

#[tokio::test]
async fn test_self_archive_and_unarchive() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let topic = fx
        .create_topic(&forum.member, &forum.category, "Toggle", "")
        .await;
    let topic_id = topic["id"].as_str().unwrap();

    let (status, body) = fx
        .send(
            Method::POST,
            &format!("/api/topics/{}/archive", topic_id),
            Some(&forum.member),
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["result"], "Topic archived successfully.");

    let (_, body) = fx.get(&format!("/api/topics/{}", topic_id)).await;
    assert_eq!(body["data"]["topic"]["isSelfArchived"], true);
    assert_eq!(body["data"]["topic"]["isArchived"], false);

    let (status, body) = fx
        .send(
            Method::POST,
            &format!("/api/topics/{}/unarchive", topic_id),
            Some(&forum.member),
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["result"], "Topic unarchived successfully.");

    let (_, body) = fx.get(&format!("/api/topics/{}", topic_id)).await;
    assert_eq!(body["data"]["topic"]["isSelfArchived"], false);
}

#[tokio::test]
async fn test_moderator_archive_locks_self_archive() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let topic = fx
        .create_topic(&forum.member, &forum.category, "Locked", "")
        .await;
    let topic_id = topic["id"].as_str().unwrap();

    // Members cannot moderate
    let (status, _) = fx
        .send(
            Method::PUT,
            &format!("/api/topics/{}/moderation", topic_id),
            Some(&forum.member),
            Some(json!({ "archived": true })),
        )
        .await;
    assert_eq!(status, 403);

    let (status, body) = fx
        .send(
            Method::PUT,
            &format!("/api/topics/{}/moderation", topic_id),
            Some(&forum.moderator),
            Some(json!({ "archived": true })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["isArchived"], true);

    for caller in [&forum.member, &forum.moderator] {
        for action in ["archive", "unarchive"] {
            let (status, body) = fx
                .send(
                    Method::POST,
                    &format!("/api/topics/{}/{}", topic_id, action),
                    Some(caller),
                    None,
                )
                .await;
            assert_eq!(status, 403);
            assert_eq!(body["error"]["code"], "NO_AUTHORIZATION");
        }
    }

    let (_, body) = fx.get(&format!("/api/topics/{}", topic_id)).await;
    assert_eq!(body["data"]["topic"]["isSelfArchived"], false);
}

#[tokio::test]
async fn test_get_topic_splits_pins_and_announcements() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let topic = fx
        .create_topic(&forum.member, &forum.category, "Detailed", "d")
        .await;
    let topic_id = topic["id"].as_str().unwrap();

    let (_, chat) = fx
        .send(
            Method::POST,
            &format!("/api/topics/{}/chats", topic_id),
            Some(&forum.moderator),
            Some(json!({ "description": "Read the rules" })),
        )
        .await;
    let message_id = chat["data"]["id"].as_str().unwrap();

    for _ in 0..2 {
        let (status, body) = fx
            .send(
                Method::POST,
                &format!("/api/topics/{}/pins", topic_id),
                Some(&forum.member),
                Some(json!({ "messageId": message_id })),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["result"], "Message pinned successfully.");
    }

    let (status, _) = fx
        .send(
            Method::POST,
            &format!("/api/topics/{}/announcements", topic_id),
            Some(&forum.member),
            Some(json!({ "description": "Meeting on Friday" })),
        )
        .await;
    assert_eq!(status, 200);

    let (status, body) = fx.get(&format!("/api/topics/{}", topic_id)).await;
    assert_eq!(status, 200);
    let data = &body["data"];
    assert_eq!(data["topic"]["id"], topic_id);
    assert_eq!(tag_names(&data["topic"]), vec!["d"]);
    assert!(data["topic"].get("pinnedMessages").is_none());
    assert!(data["topic"].get("announcements").is_none());

    let pinned = data["pinnedMessages"].as_array().unwrap();
    assert_eq!(pinned.len(), 1);
    assert_eq!(pinned[0]["description"], "Read the rules");

    let announcements = data["announcements"].as_array().unwrap();
    assert_eq!(announcements.len(), 1);
    assert_eq!(announcements[0]["description"], "Meeting on Friday");
    assert_eq!(announcements[0]["createdBy"], forum.member.as_str());
}

#[tokio::test]
async fn test_pin_rejects_foreign_message() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let here = fx.create_topic(&forum.member, &forum.category, "Here", "").await;
    let there = fx.create_topic(&forum.member, &forum.category, "There", "").await;

    let (_, chat) = fx
        .send(
            Method::POST,
            &format!("/api/topics/{}/chats", there["id"].as_str().unwrap()),
            Some(&forum.member),
            Some(json!({ "description": "elsewhere" })),
        )
        .await;

    let (status, body) = fx
        .send(
            Method::POST,
            &format!("/api/topics/{}/pins", here["id"].as_str().unwrap()),
            Some(&forum.member),
            Some(json!({ "messageId": chat["data"]["id"] })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"]["field"], "messageId");
}

#[tokio::test]
async fn test_topic_chats_carry_author() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let topic = fx
        .create_topic(&forum.member, &forum.category, "Chatty", "")
        .await;
    let topic_id = topic["id"].as_str().unwrap();

    for (caller, text) in [(&forum.member, "first"), (&forum.moderator, "second")] {
        let (status, _) = fx
            .send(
                Method::POST,
                &format!("/api/topics/{}/chats", topic_id),
                Some(caller),
                Some(json!({ "description": text })),
            )
            .await;
        assert_eq!(status, 200);
    }

    let (status, body) = fx.get(&format!("/api/topics/{}/chats", topic_id)).await;
    assert_eq!(status, 200);
    let chats = body["data"].as_array().unwrap();
    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0]["description"], "first");
    assert_eq!(chats[0]["user"], json!({ "id": forum.member, "name": "Member" }));
    assert_eq!(chats[1]["userId"], forum.moderator.as_str());
    assert_eq!(chats[1]["user"]["name"], "Mod");

    let (status, body) = fx.get("/api/topics/missing/chats").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "TOPIC_REMOVED");
}

#[tokio::test]
async fn test_topic_tasks_skip_completed_and_borrow_message() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let topic = fx
        .create_topic(&forum.member, &forum.category, "Work", "")
        .await;
    let topic_id = topic["id"].as_str().unwrap();
    let tasks_path = format!("/api/topics/{}/tasks", topic_id);

    let (_, chat) = fx
        .send(
            Method::POST,
            &format!("/api/topics/{}/chats", topic_id),
            Some(&forum.member),
            Some(json!({ "description": "Fix the login page" })),
        )
        .await;
    let message_id = chat["data"]["id"].as_str().unwrap();

    let (status, done) = fx
        .send(
            Method::POST,
            &tasks_path,
            Some(&forum.member),
            Some(json!({ "description": "Already done" })),
        )
        .await;
    assert_eq!(status, 200);
    let (status, _) = fx
        .send(
            Method::POST,
            &tasks_path,
            Some(&forum.member),
            Some(json!({ "description": "Still open" })),
        )
        .await;
    assert_eq!(status, 200);
    let (status, _) = fx
        .send(
            Method::POST,
            &tasks_path,
            Some(&forum.member),
            Some(json!({ "description": "stale text", "attachedMessage": message_id })),
        )
        .await;
    assert_eq!(status, 200);

    let (status, body) = fx
        .send(
            Method::POST,
            &format!("/api/tasks/{}/complete", done["data"]["id"].as_str().unwrap()),
            Some(&forum.member),
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["isCompleted"], true);

    let (status, body) = fx.get(&tasks_path).await;
    assert_eq!(status, 200);
    let tasks = body["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t["isCompleted"] == false));
    assert_eq!(tasks[0]["description"], "Still open");
    assert_eq!(tasks[1]["description"], "Fix the login page");
    assert_eq!(tasks[1]["parentTopic"], topic_id);
    assert_eq!(tasks[1]["attachedMessage"], message_id);
}

#[tokio::test]
async fn test_task_needs_description_or_existing_message() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let topic = fx.create_topic(&forum.member, &forum.category, "Tasks", "").await;
    let tasks_path = format!("/api/topics/{}/tasks", topic["id"].as_str().unwrap());

    let (status, _) = fx
        .send(Method::POST, &tasks_path, Some(&forum.member), Some(json!({})))
        .await;
    assert_eq!(status, 400);

    let (status, body) = fx
        .send(
            Method::POST,
            &tasks_path,
            Some(&forum.member),
            Some(json!({ "attachedMessage": "missing" })),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_validation_errors() {
    let forum = Forum::new().await;
    let fx = &forum.fixture;

    let (status, body) = fx
        .send(
            Method::POST,
            "/api/topics",
            Some(&forum.member),
            Some(json!({ "name": "  ", "parentCategory": forum.category })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"]["field"], "name");

    let (status, _) = fx
        .send(Method::POST, "/api/users", None, Some(json!({ "name": "" })))
        .await;
    assert_eq!(status, 400);

    let (status, _) = fx
        .send(
            Method::POST,
            "/api/categories",
            Some(&forum.member),
            Some(json!({ "name": "Members only" })),
        )
        .await;
    assert_eq!(status, 403);
}
