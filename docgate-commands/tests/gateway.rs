//! Command handling against a scripted backend that records every statement.

use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use mea::rwlock::RwLock;

use docgate_codec::wire;
use docgate_commands::{Gateway, GatewayConfig};
use docgate_core::{
    Document, GatewayError, GatewayResult, Value, array, backend::SqlBackend, document,
};

#[derive(Debug, Default)]
struct Script {
    statements: Vec<String>,
    rows: VecDeque<Vec<String>>,
    counts: VecDeque<u64>,
    affected: VecDeque<u64>,
    write_failures: VecDeque<String>,
}

/// Answers queries from queues filled by the test; empty queues answer with no rows, zero
/// counts and successful writes.
#[derive(Debug, Default, Clone)]
struct RecordingBackend {
    script: Arc<RwLock<Script>>,
}

impl RecordingBackend {
    async fn rows(&self, rows: &[&str]) {
        let rows = rows.iter().map(|row| row.to_string()).collect();
        self.script.write().await.rows.push_back(rows);
    }

    async fn count(&self, n: u64) {
        self.script.write().await.counts.push_back(n);
    }

    async fn affected(&self, n: u64) {
        self.script.write().await.affected.push_back(n);
    }

    async fn fail_write(&self, message: &str) {
        self.script.write().await.write_failures.push_back(message.to_string());
    }

    async fn statements(&self) -> Vec<String> {
        self.script.read().await.statements.clone()
    }
}

#[async_trait]
impl SqlBackend for RecordingBackend {
    async fn query(&self, sql: &str) -> GatewayResult<Vec<String>> {
        let mut script = self.script.write().await;
        script.statements.push(sql.to_string());
        Ok(script.rows.pop_front().unwrap_or_default())
    }

    async fn query_count(&self, sql: &str) -> GatewayResult<u64> {
        let mut script = self.script.write().await;
        script.statements.push(sql.to_string());
        Ok(script.counts.pop_front().unwrap_or_default())
    }

    async fn execute(&self, sql: &str) -> GatewayResult<u64> {
        let mut script = self.script.write().await;
        script.statements.push(sql.to_string());
        if let Some(message) = script.write_failures.pop_front() {
            return Err(GatewayError::Backend(message));
        }
        Ok(script.affected.pop_front().unwrap_or(1))
    }
}

#[derive(Debug)]
struct UnavailableBackend;

#[async_trait]
impl SqlBackend for UnavailableBackend {
    async fn query(&self, _sql: &str) -> GatewayResult<Vec<String>> {
        Err(GatewayError::Backend("connection refused".into()))
    }

    async fn query_count(&self, _sql: &str) -> GatewayResult<u64> {
        Err(GatewayError::Backend("connection refused".into()))
    }

    async fn execute(&self, _sql: &str) -> GatewayResult<u64> {
        Err(GatewayError::Backend("connection refused".into()))
    }
}

fn gateway() -> (Gateway<RecordingBackend>, RecordingBackend) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let backend = RecordingBackend::default();
    (Gateway::new(backend.clone()), backend)
}

fn batch(reply: &Document) -> Vec<Document> {
    let cursor = reply.get("cursor").unwrap().as_document().unwrap();
    cursor
        .get("firstBatch")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|doc| doc.as_document().unwrap().clone())
        .collect()
}

#[tokio::test]
async fn find_runs_filter_projection_and_window_in_the_store() {
    let (gateway, backend) = gateway();
    backend.rows(&[r#"{"_id":1,"name":"Ada"}"#]).await;

    let reply = gateway
        .handle(&document! {
            "find" => "users",
            "filter" => document! { "name" => document! { "$gte" => "A" } },
            "projection" => document! { "name" => 1 },
            "limit" => 2,
            "$db" => "app",
        })
        .await;

    assert_eq!(
        reply,
        document! {
            "cursor" => document! {
                "firstBatch" => array![document! { "_id" => 1, "name" => "Ada" }],
                "id" => Value::Int64(0),
                "ns" => "app.users",
            },
            "ok" => 1.0,
        }
    );
    assert_eq!(
        backend.statements().await,
        vec![
            r#"SELECT {"_id": "_id", "name": "name"} FROM "app"."users" WHERE ("name" >= 'A') LIMIT 2"#
                .to_string()
        ]
    );
}

#[tokio::test]
async fn find_with_sort_windows_and_projects_in_memory() {
    let (gateway, backend) = gateway();
    backend
        .rows(&[
            r#"{"_id":1,"a":2,"b":"x"}"#,
            r#"{"_id":2,"a":1,"b":"y"}"#,
            r#"{"_id":3,"a":3,"b":"z"}"#,
        ])
        .await;

    let reply = gateway
        .handle(&document! {
            "find" => "users",
            "sort" => document! { "a" => -1 },
            "skip" => 1,
            "projection" => document! { "b" => 0 },
        })
        .await;

    assert_eq!(
        batch(&reply),
        vec![document! { "_id" => 1, "a" => 2 }, document! { "_id" => 2, "a" => 1 }]
    );
    assert_eq!(backend.statements().await, vec![r#"SELECT * FROM "test"."users""#.to_string()]);
}

#[tokio::test]
async fn count_applies_skip_and_limit() {
    let (gateway, backend) = gateway();
    backend.count(3).await;

    let reply = gateway
        .handle(&document! {
            "count" => "users",
            "query" => document! { "a" => document! { "$ne" => "x" } },
            "skip" => 1,
        })
        .await;

    assert_eq!(reply, document! { "n" => 2, "ok" => 1.0 });
    assert_eq!(
        backend.statements().await,
        vec![
            r#"SELECT COUNT(*) FROM "test"."users" WHERE ("a" <> 'x' OR "a" IS NULL OR "a" IS UNSET)"#
                .to_string()
        ]
    );
}

#[tokio::test]
async fn insert_reports_duplicates_and_generates_ids() {
    let (gateway, backend) = gateway();
    backend.count(1).await;

    let reply = gateway
        .handle(&document! {
            "insert" => "users",
            "documents" => array![document! { "_id" => 1, "name" => "a" }, document! { "name" => "b" }],
            "ordered" => false,
        })
        .await;

    assert_eq!(
        reply,
        document! {
            "n" => 1,
            "writeErrors" => array![document! {
                "index" => 0,
                "code" => 11000,
                "errmsg" => "E11000 duplicate key error collection: test.users index: _id_ dup key: { _id: 1 }",
            }],
            "ok" => 1.0,
        }
    );

    let statements = backend.statements().await;
    assert_eq!(statements.len(), 3);
    assert_eq!(
        statements[0],
        r#"SELECT COUNT(*) FROM "test"."users" WHERE ("_id" = 1 OR "_id" = {"$l": 1} OR "_id" = {"tf": 1.0})"#
    );
    assert!(statements[1].starts_with(r#"SELECT COUNT(*) FROM "test"."users" WHERE ("_id" = {"oid": '"#));
    assert!(statements[2].starts_with(r#"INSERT INTO "test"."users" VALUES ('{"_id":{"oid":""#));
    assert!(statements[2].ends_with(r#""name":"b"}')"#));
}

#[tokio::test]
async fn insert_losing_a_race_reports_a_duplicate() {
    let (gateway, backend) = gateway();
    backend.count(0).await;
    backend.count(1).await;
    backend.fail_write("unique constraint violated").await;

    let reply = gateway
        .handle(&document! { "insert" => "users", "documents" => array![document! { "_id" => "u1" }] })
        .await;

    assert_eq!(
        reply,
        document! {
            "n" => 0,
            "writeErrors" => array![document! {
                "index" => 0,
                "code" => 11000,
                "errmsg" => "E11000 duplicate key error collection: test.users index: _id_ dup key: { _id: \"u1\" }",
            }],
            "ok" => 1.0,
        }
    );
    assert_eq!(
        backend.statements().await,
        vec![
            r#"SELECT COUNT(*) FROM "test"."users" WHERE ("_id" = 'u1')"#.to_string(),
            r#"INSERT INTO "test"."users" VALUES ('{"_id":"u1"}')"#.to_string(),
            r#"SELECT COUNT(*) FROM "test"."users" WHERE ("_id" = 'u1')"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn failed_insert_of_a_free_id_keeps_the_store_error() {
    let (gateway, backend) = gateway();
    backend.fail_write("disk full").await;

    let reply = gateway
        .handle(&document! { "insert" => "users", "documents" => array![document! { "_id" => "u1" }] })
        .await;

    let errors = reply.get("writeErrors").unwrap().as_array().unwrap();
    let error = errors.get(0).unwrap().as_document().unwrap();
    assert_eq!(error.get("code").unwrap(), &Value::Int32(1));
    assert_eq!(error.get("errmsg").unwrap(), &Value::from("backend error: disk full"));
}

#[tokio::test]
async fn ordered_insert_stops_at_the_first_error() {
    let (gateway, backend) = gateway();
    backend.count(1).await;

    let reply = gateway
        .handle(&document! {
            "insert" => "users",
            "documents" => array![document! { "_id" => 1 }, document! { "_id" => 2 }],
        })
        .await;

    assert_eq!(reply.get("n").unwrap(), &Value::Int32(0));
    assert_eq!(reply.get("writeErrors").unwrap().as_array().unwrap().len(), 1);
    assert_eq!(backend.statements().await.len(), 1);
}

#[tokio::test]
async fn insert_without_id_generation_rejects_documents() {
    let backend = RecordingBackend::default();
    let gateway = Gateway::builder(backend.clone()).generate_ids(false).build();

    let reply = gateway
        .handle(&document! { "insert" => "users", "documents" => array![document! { "a" => 1 }] })
        .await;

    let errors = reply.get("writeErrors").unwrap().as_array().unwrap();
    assert_eq!(errors.get(0).unwrap().as_document().unwrap().get("code").unwrap(), &Value::Int32(2));
    assert!(backend.statements().await.is_empty());
}

#[tokio::test]
async fn multi_update_counts_matched_and_modified() {
    let (gateway, backend) = gateway();
    backend.count(3).await;
    backend.affected(2).await;

    let reply = gateway
        .handle(&document! {
            "update" => "users",
            "updates" => array![document! {
                "q" => document! { "a" => "x" },
                "u" => document! { "$set" => document! { "x" => 5 } },
                "multi" => true,
            }],
        })
        .await;

    assert_eq!(reply, document! { "n" => 3, "nModified" => 2, "ok" => 1.0 });
    assert_eq!(
        backend.statements().await,
        vec![
            r#"SELECT COUNT(*) FROM "test"."users" WHERE ("a" = 'x')"#.to_string(),
            r#"UPDATE "test"."users" SET "x" = 5 WHERE (("a" = 'x')) AND ((("x" <> 5 OR "x" IS NULL OR "x" IS UNSET)))"#
                .to_string(),
        ]
    );
}

#[tokio::test]
async fn single_update_targets_the_first_match() {
    let (gateway, backend) = gateway();
    backend.count(3).await;
    backend.rows(&[r#"{"_id":7}"#]).await;
    backend.affected(0).await;

    let reply = gateway
        .handle(&document! {
            "update" => "users",
            "updates" => array![document! {
                "q" => document! { "a" => "x" },
                "u" => document! { "$unset" => document! { "b" => "" } },
            }],
        })
        .await;

    assert_eq!(reply, document! { "n" => 1, "nModified" => 0, "ok" => 1.0 });
    assert_eq!(
        backend.statements().await,
        vec![
            r#"SELECT COUNT(*) FROM "test"."users" WHERE ("a" = 'x')"#.to_string(),
            r#"SELECT {"_id": "_id"} FROM "test"."users" WHERE ("a" = 'x') LIMIT 1"#.to_string(),
            r#"UPDATE "test"."users" UNSET "b" WHERE (("_id" = 7)) AND ((("b" IS SET)))"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn upsert_inserts_the_seeded_document() {
    let (gateway, backend) = gateway();

    let reply = gateway
        .handle(&document! {
            "update" => "users",
            "updates" => array![document! {
                "q" => document! { "_id" => 9, "name" => "Ada" },
                "u" => document! { "$set" => document! { "profile.age" => 30 } },
                "upsert" => true,
            }],
        })
        .await;

    assert_eq!(
        reply,
        document! {
            "n" => 1,
            "nModified" => 0,
            "upserted" => array![document! { "index" => 0, "_id" => 9 }],
            "ok" => 1.0,
        }
    );
    assert_eq!(
        backend.statements().await,
        vec![
            r#"SELECT COUNT(*) FROM "test"."users" WHERE (("_id" = 9 OR "_id" = {"$l": 9} OR "_id" = {"tf": 9.0}) AND ("name" = 'Ada'))"#
                .to_string(),
            r#"SELECT COUNT(*) FROM "test"."users" WHERE ("_id" = 9 OR "_id" = {"$l": 9} OR "_id" = {"tf": 9.0})"#
                .to_string(),
            r#"INSERT INTO "test"."users" VALUES ('{"_id":9,"name":"Ada","profile":{"age":30}}')"#
                .to_string(),
        ]
    );
}

#[tokio::test]
async fn updating_the_id_is_a_write_error() {
    let (gateway, backend) = gateway();

    let reply = gateway
        .handle(&document! {
            "update" => "users",
            "updates" => array![document! {
                "q" => Document::new(),
                "u" => document! { "$unset" => document! { "_id" => "" } },
            }],
        })
        .await;

    let errors = reply.get("writeErrors").unwrap().as_array().unwrap();
    let error = errors.get(0).unwrap().as_document().unwrap();
    assert_eq!(error.get("code").unwrap(), &Value::Int32(66));
    assert_eq!(reply.get("n").unwrap(), &Value::Int32(0));
    assert!(backend.statements().await.is_empty());
}

#[tokio::test]
async fn delete_honors_limit() {
    let (gateway, backend) = gateway();
    backend.affected(4).await;
    backend.rows(&[r#"{"_id":"x"}"#]).await;
    backend.affected(1).await;

    let reply = gateway
        .handle(&document! {
            "delete" => "users",
            "deletes" => array![
                document! { "q" => document! { "a" => "x" }, "limit" => 0 },
                document! { "q" => Document::new(), "limit" => 1 },
            ],
        })
        .await;

    assert_eq!(reply, document! { "n" => 5, "ok" => 1.0 });
    assert_eq!(
        backend.statements().await,
        vec![
            r#"DELETE FROM "test"."users" WHERE ("a" = 'x')"#.to_string(),
            r#"SELECT {"_id": "_id"} FROM "test"."users" LIMIT 1"#.to_string(),
            r#"DELETE FROM "test"."users" WHERE ("_id" = 'x')"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn find_and_modify_returns_the_updated_document() {
    let (gateway, backend) = gateway();
    backend.rows(&[r#"{"_id":1,"a":1}"#]).await;
    backend.rows(&[r#"{"_id":1,"a":2}"#]).await;

    let reply = gateway
        .handle(&document! {
            "findAndModify" => "users",
            "query" => document! { "_id" => 1 },
            "update" => document! { "$set" => document! { "a" => 2 } },
            "new" => true,
        })
        .await;

    assert_eq!(
        reply,
        document! {
            "lastErrorObject" => document! { "n" => 1, "updatedExisting" => true },
            "value" => document! { "_id" => 1, "a" => 2 },
            "ok" => 1.0,
        }
    );
    assert_eq!(
        backend.statements().await,
        vec![
            r#"SELECT * FROM "test"."users" WHERE ("_id" = 1 OR "_id" = {"$l": 1} OR "_id" = {"tf": 1.0}) LIMIT 1"#
                .to_string(),
            r#"UPDATE "test"."users" SET "a" = 2 WHERE (("_id" = 1)) AND ((("a" <> 2 OR "a" IS NULL OR "a" IS UNSET)))"#
                .to_string(),
            r#"SELECT * FROM "test"."users" WHERE ("_id" = 1) LIMIT 1"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn find_and_modify_removes_and_projects() {
    let (gateway, backend) = gateway();
    backend.rows(&[r#"{"_id":1,"a":1,"b":2}"#]).await;

    let reply = gateway
        .handle(&document! {
            "findAndModify" => "users",
            "remove" => true,
            "fields" => document! { "b" => 0 },
        })
        .await;

    assert_eq!(
        reply,
        document! {
            "lastErrorObject" => document! { "n" => 1 },
            "value" => document! { "_id" => 1, "a" => 1 },
            "ok" => 1.0,
        }
    );
    assert_eq!(
        backend.statements().await.last().unwrap(),
        r#"DELETE FROM "test"."users" WHERE ("_id" = 1)"#
    );
}

#[tokio::test]
async fn find_and_modify_without_match_returns_null() {
    let (gateway, _backend) = gateway();

    let reply = gateway
        .handle(&document! {
            "findAndModify" => "users",
            "query" => document! { "a" => 1 },
            "update" => document! { "$set" => document! { "a" => 2 } },
        })
        .await;

    assert_eq!(
        reply,
        document! {
            "lastErrorObject" => document! { "n" => 0, "updatedExisting" => false },
            "value" => Value::Null,
            "ok" => 1.0,
        }
    );
}

#[tokio::test]
async fn invalid_commands_become_error_replies() {
    let (gateway, backend) = gateway();

    let reply = gateway.handle(&document! { "ping" => 1 }).await;
    assert_eq!(
        reply,
        document! {
            "ok" => 0.0,
            "errmsg" => "no such command: 'ping'",
            "code" => 59,
            "codeName" => "CommandNotFound",
        }
    );

    let reply = gateway
        .handle(&document! {
            "findAndModify" => "users",
            "remove" => true,
            "update" => document! { "$set" => document! { "a" => 1 } },
        })
        .await;
    assert_eq!(reply.get("code").unwrap(), &Value::Int32(2));

    let reply = gateway
        .handle(&document! {
            "find" => "users",
            "filter" => document! { "name" => document! { "$regex" => "a+" } },
        })
        .await;
    assert_eq!(reply.get("codeName").unwrap(), &Value::from("NotImplemented"));

    assert!(backend.statements().await.is_empty());
}

#[tokio::test]
async fn backend_failures_are_reported() {
    let gateway = Gateway::with_config(UnavailableBackend, GatewayConfig::default());

    let reply = gateway.handle(&document! { "count" => "users" }).await;

    assert_eq!(
        reply,
        document! {
            "ok" => 0.0,
            "errmsg" => "backend error: connection refused",
            "code" => 1,
            "codeName" => "InternalError",
        }
    );
}

#[tokio::test]
async fn wire_commands_round_trip() {
    let (gateway, backend) = gateway();
    backend.count(4).await;

    let command = wire::encode_document(&document! { "count" => "users", "$db" => "app" }).unwrap();
    let reply = wire::decode_document(&gateway.handle_wire(&command).await.unwrap()).unwrap();

    assert_eq!(reply, document! { "n" => 4, "ok" => 1.0 });
    assert_eq!(
        backend.statements().await,
        vec![r#"SELECT COUNT(*) FROM "app"."users""#.to_string()]
    );
}

#[tokio::test]
async fn truncated_wire_commands_fail_to_decode() {
    let (gateway, _backend) = gateway();

    assert!(matches!(
        gateway.handle_wire(&[5, 0, 0]).await,
        Err(GatewayError::Decode(_))
    ));
}
