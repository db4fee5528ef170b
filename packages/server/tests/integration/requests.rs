use common::EventKind;
use futures::future::join_all;
use serde_json::json;

use crate::common::{TestApp, routes};

mod create {
    use super::*;

    #[tokio::test]
    async fn create_returns_201_and_fans_out_created_event() {
        let app = TestApp::spawn().await;

        let res = app
            .post(
                routes::REQUESTS,
                &json!({ "name": "job-1", "payload": { "priority": 3 } }),
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["success"], true);
        assert_eq!(res.data()["name"], "job-1");
        assert_eq!(res.data()["payload"], json!({ "priority": 3 }));
        assert_eq!(res.data()["status"], "pending");

        let archived = app.archived_events().await;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].kind, EventKind::Created);
        assert_eq!(archived[0].name, "job-1");
        assert_eq!(archived[0].payload, json!({ "priority": 3 }));
        assert_eq!(archived[0].status.as_deref(), Some("pending"));

        let worker = app.worker_events().await;
        assert_eq!(worker.len(), 1);
        assert_eq!(worker[0].event_id, archived[0].event_id);
    }

    #[tokio::test]
    async fn payload_and_status_are_optional() {
        let app = TestApp::spawn().await;

        let res = app.post(routes::REQUESTS, &json!({ "name": "job-1" })).await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.data()["payload"], json!({}));
        assert_eq!(res.data()["status"], "pending");
    }

    #[tokio::test]
    async fn explicit_status_is_kept() {
        let app = TestApp::spawn().await;

        let res = app
            .post(routes::REQUESTS, &json!({ "name": "job-1", "status": "queued" }))
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.data()["status"], "queued");
    }

    #[tokio::test]
    async fn duplicate_name_conflicts_without_second_event() {
        let app = TestApp::spawn().await;
        let body = json!({ "name": "job-1" });

        let first = app.post(routes::REQUESTS, &body).await;
        assert_eq!(first.status, 201, "{}", first.text);

        let second = app.post(routes::REQUESTS, &body).await;

        second.assert_failure(409);
        assert!(second.body["message"].as_str().unwrap().contains("already exists"));
        assert_eq!(app.archived_events().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creates_with_same_name_succeed_once() {
        let app = TestApp::spawn().await;
        let body = json!({ "name": "contested", "payload": { "n": 1 } });

        let results = join_all((0..8).map(|_| app.post(routes::REQUESTS, &body))).await;

        let created = results.iter().filter(|r| r.status == 201).count();
        let conflicts = results.iter().filter(|r| r.status == 409).count();
        assert_eq!(created, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(app.archived_events().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_name_is_rejected() {
        let app = TestApp::spawn().await;

        for name in ["", "has space", &"x".repeat(129)] {
            let res = app.post(routes::REQUESTS, &json!({ "name": name })).await;
            res.assert_failure(400);
        }
        assert!(app.archived_events().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app.post_raw(routes::REQUESTS, "{\"name\": ").await;

        res.assert_failure(400);
    }

    #[tokio::test]
    async fn missing_name_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app.post(routes::REQUESTS, &json!({ "payload": {} })).await;

        res.assert_failure(400);
    }

    #[tokio::test]
    async fn publish_failure_returns_503_but_keeps_record() {
        let app = TestApp::spawn().await;
        app.broker.fail_publishes(Some("channel closed")).await;

        let res = app
            .post(routes::REQUESTS, &json!({ "name": "job-1", "payload": { "a": 1 } }))
            .await;

        res.assert_failure(503);
        assert_eq!(res.data()["name"], "job-1");
        assert_eq!(res.data()["payload"], json!({ "a": 1 }));

        app.broker.fail_publishes(None).await;
        let stored = app.get(&routes::request("job-1")).await;
        assert_eq!(stored.status, 200);
        assert!(app.archived_events().await.is_empty());
    }
}

mod read {
    use super::*;

    #[tokio::test]
    async fn get_returns_created_record() {
        let app = TestApp::spawn().await;
        app.create_request("job-1", json!({ "k": "v" })).await;

        let res = app.get(&routes::request("job-1")).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["success"], true);
        assert_eq!(res.data()["payload"], json!({ "k": "v" }));
    }

    #[tokio::test]
    async fn get_unknown_name_is_not_found() {
        let app = TestApp::spawn().await;

        let res = app.get(&routes::request("nonexistent")).await;

        res.assert_failure(404);
        assert!(res.data().is_null());
    }

    #[tokio::test]
    async fn names_that_could_never_be_created_are_not_found() {
        let app = TestApp::spawn().await;

        app.get(&routes::request("never%20created"))
            .await
            .assert_failure(404);
        app.put(&routes::request("x%2Fy"), &json!({ "payload": {} }))
            .await
            .assert_failure(404);
        app.delete(&routes::request("x%2Fy")).await.assert_failure(404);
        assert!(app.archived_events().await.is_empty());
    }

    #[tokio::test]
    async fn list_is_empty_initially() {
        let app = TestApp::spawn().await;

        let res = app.get(routes::REQUESTS).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.data(), &json!([]));
    }

    #[tokio::test]
    async fn list_returns_records_in_creation_order() {
        let app = TestApp::spawn().await;
        for name in ["zeta", "alpha", "mid"] {
            app.create_request(name, json!({})).await;
        }

        let res = app.get(routes::REQUESTS).await;

        let names: Vec<&str> = res
            .data()
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn reads_publish_nothing() {
        let app = TestApp::spawn().await;
        app.create_request("job-1", json!({})).await;
        app.archived_events().await;

        app.get(&routes::request("job-1")).await;
        app.get(routes::REQUESTS).await;

        assert!(app.archived_events().await.is_empty());
    }
}

mod update {
    use super::*;

    #[tokio::test]
    async fn update_replaces_payload_and_publishes_updated_event() {
        let app = TestApp::spawn().await;
        let created = app.create_request("job-1", json!({ "a": 1 })).await;
        app.archived_events().await;

        let res = app
            .put(
                &routes::request("job-1"),
                &json!({ "payload": { "b": 2 }, "status": "running" }),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.data()["payload"], json!({ "b": 2 }));
        assert_eq!(res.data()["status"], "running");
        assert_eq!(res.data()["created_at"], created.data()["created_at"]);
        assert_ne!(res.data()["updated_at"], created.data()["updated_at"]);

        let events = app.archived_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Updated);
        assert_eq!(events[0].payload, json!({ "b": 2 }));
        assert_eq!(events[0].status.as_deref(), Some("running"));

        let stored = app.get(&routes::request("job-1")).await;
        assert_eq!(stored.data()["payload"], json!({ "b": 2 }));
    }

    #[tokio::test]
    async fn update_without_status_keeps_it() {
        let app = TestApp::spawn().await;
        app.post(routes::REQUESTS, &json!({ "name": "job-1", "status": "queued" }))
            .await;

        let res = app
            .put(&routes::request("job-1"), &json!({ "payload": [1, 2, 3] }))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.data()["status"], "queued");
        assert_eq!(res.data()["payload"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn update_unknown_name_is_not_found_without_event() {
        let app = TestApp::spawn().await;

        let res = app
            .put(&routes::request("nonexistent"), &json!({ "payload": {} }))
            .await;

        res.assert_failure(404);
        assert!(app.archived_events().await.is_empty());
    }

    #[tokio::test]
    async fn update_without_payload_is_rejected() {
        let app = TestApp::spawn().await;
        app.create_request("job-1", json!({})).await;

        let res = app
            .put(&routes::request("job-1"), &json!({ "status": "done" }))
            .await;

        res.assert_failure(400);
    }

    #[tokio::test]
    async fn update_publish_failure_returns_record_in_data() {
        let app = TestApp::spawn().await;
        app.create_request("job-1", json!({ "a": 1 })).await;
        app.broker.fail_publishes(Some("nacked")).await;

        let res = app
            .put(&routes::request("job-1"), &json!({ "payload": { "a": 2 } }))
            .await;

        res.assert_failure(503);
        assert_eq!(res.data()["payload"], json!({ "a": 2 }));
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn delete_removes_record_and_publishes_deleted_event() {
        let app = TestApp::spawn().await;
        app.create_request("job-1", json!({ "a": 1 })).await;
        app.archived_events().await;

        let res = app.delete(&routes::request("job-1")).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["success"], true);
        assert!(res.data().is_null());

        let events = app.archived_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Deleted);
        assert_eq!(events[0].name, "job-1");
        assert!(events[0].payload.is_null());

        app.get(&routes::request("job-1")).await.assert_failure(404);
    }

    #[tokio::test]
    async fn delete_unknown_name_is_not_found_without_event() {
        let app = TestApp::spawn().await;

        let res = app.delete(&routes::request("nonexistent")).await;

        res.assert_failure(404);
        assert!(app.archived_events().await.is_empty());
    }

    #[tokio::test]
    async fn second_delete_is_not_found() {
        let app = TestApp::spawn().await;
        app.create_request("job-1", json!({})).await;

        assert_eq!(app.delete(&routes::request("job-1")).await.status, 200);
        app.delete(&routes::request("job-1")).await.assert_failure(404);
    }

    #[tokio::test]
    async fn name_is_reusable_after_delete() {
        let app = TestApp::spawn().await;
        app.create_request("job-1", json!({ "v": 1 })).await;
        app.delete(&routes::request("job-1")).await;

        let res = app.create_request("job-1", json!({ "v": 2 })).await;

        assert_eq!(res.data()["payload"], json!({ "v": 2 }));
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_mutation_order() {
        let app = TestApp::spawn().await;

        app.create_request("job-1", json!({ "step": 1 })).await;
        app.put(&routes::request("job-1"), &json!({ "payload": { "step": 2 } }))
            .await;
        app.delete(&routes::request("job-1")).await;

        let kinds: Vec<EventKind> = app
            .archived_events()
            .await
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            [EventKind::Created, EventKind::Updated, EventKind::Deleted]
        );
    }
}

mod routing {
    use reqwest::Method;

    use super::*;

    #[tokio::test]
    async fn unknown_path_answers_with_envelope() {
        let app = TestApp::spawn().await;

        let res = app.get("/requests/a/b").await;

        res.assert_failure(404);
        assert!(res.body["message"].as_str().unwrap().contains("/requests/a/b"));
        assert!(res.data().is_null());
    }

    #[tokio::test]
    async fn unsupported_method_answers_with_envelope() {
        let app = TestApp::spawn().await;

        let res = app.send_method(Method::PATCH, &routes::request("a")).await;

        res.assert_failure(405);
        assert!(res.body["message"].as_str().unwrap().contains("PATCH"));
        assert!(res.data().is_null());
    }
}
