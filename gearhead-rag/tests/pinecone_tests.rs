//! Pinecone REST backend tests against a mock HTTP server.

#![cfg(feature = "pinecone")]

use std::sync::Arc;

use gearhead_rag::pinecone::{PineconeConfig, PineconeIndex};
use gearhead_rag::{IndexClient, IndexSpec, Metadata, Metric, RagError, VectorIndex, VectorRecord};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

const API_KEY: &str = "test-key";
const INDEX: &str = "gearhead-docs";

fn control_config(server: &ServerGuard) -> PineconeConfig {
    PineconeConfig::new(API_KEY, INDEX).with_control_url(server.url())
}

fn data_index(server: &ServerGuard) -> PineconeIndex {
    PineconeIndex::new(control_config(server).with_host(server.url())).unwrap()
}

fn description(server: &ServerGuard, dimension: usize) -> String {
    json!({
        "name": INDEX,
        "dimension": dimension,
        "metric": "cosine",
        "host": server.url(),
        "status": {"ready": true, "state": "Ready"}
    })
    .to_string()
}

fn records(n: usize) -> Vec<VectorRecord> {
    (0..n)
        .map(|i| {
            let mut metadata = Metadata::new();
            metadata.insert("text".into(), json!(format!("chunk {i}")));
            VectorRecord { id: format!("doc_0_chunk_{i}"), values: vec![0.5, 0.5, 0.0], metadata }
        })
        .collect()
}

#[test]
fn empty_api_key_is_rejected() {
    let err = PineconeIndex::new(PineconeConfig::new("  ", INDEX)).err().unwrap();
    assert!(matches!(err, RagError::ConfigError(_)));
}

#[test]
fn config_debug_hides_the_api_key() {
    let rendered = format!("{:?}", PineconeConfig::new("super-secret", INDEX));
    assert!(!rendered.contains("super-secret"));
    assert!(rendered.contains(INDEX));
}

#[tokio::test]
async fn ensure_index_creates_a_missing_index() {
    let mut server = Server::new_async().await;
    let describe = server
        .mock("GET", "/indexes/gearhead-docs")
        .match_header("api-key", API_KEY)
        .match_header("x-pinecone-api-version", "2024-07")
        .with_status(404)
        .with_body(r#"{"error": {"code": "NOT_FOUND", "message": "Resource not found"}}"#)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/indexes")
        .match_header("api-key", API_KEY)
        .match_body(Matcher::PartialJson(json!({
            "name": INDEX,
            "dimension": 384,
            "metric": "cosine",
            "spec": {"serverless": {"cloud": "gcp", "region": "us-central1"}}
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(description(&server, 384))
        .create_async()
        .await;

    let index =
        PineconeIndex::new(control_config(&server).with_serverless("gcp", "us-central1")).unwrap();
    index.ensure_index(&IndexSpec::new(INDEX, 384, Metric::Cosine)).await.unwrap();

    describe.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn ensure_index_accepts_a_matching_index() {
    let mut server = Server::new_async().await;
    let describe = server
        .mock("GET", "/indexes/gearhead-docs")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(description(&server, 384))
        .create_async()
        .await;
    let create = server.mock("POST", "/indexes").expect(0).create_async().await;

    let index = PineconeIndex::new(control_config(&server)).unwrap();
    index.ensure_index(&IndexSpec::new(INDEX, 384, Metric::Cosine)).await.unwrap();

    describe.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn ensure_index_rejects_a_dimension_mismatch() {
    let mut server = Server::new_async().await;
    let _describe = server
        .mock("GET", "/indexes/gearhead-docs")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(description(&server, 768))
        .create_async()
        .await;

    let index = PineconeIndex::new(control_config(&server)).unwrap();
    let err = index.ensure_index(&IndexSpec::new(INDEX, 384, Metric::Cosine)).await.unwrap_err();
    assert!(matches!(err, RagError::IndexConfigError { .. }));
}

#[tokio::test]
async fn create_conflict_falls_back_to_describe() {
    let mut server = Server::new_async().await;
    let describe = server
        .mock("GET", "/indexes/gearhead-docs")
        .with_status(404)
        .expect(2)
        .create_async()
        .await;
    let conflict = server.mock("POST", "/indexes").with_status(409).create_async().await;

    let index = PineconeIndex::new(control_config(&server)).unwrap();
    index.ensure_index(&IndexSpec::new(INDEX, 3, Metric::Cosine)).await.unwrap();

    describe.assert_async().await;
    conflict.assert_async().await;
}

#[tokio::test]
async fn unauthorized_is_a_config_error() {
    let mut server = Server::new_async().await;
    let _describe = server
        .mock("GET", "/indexes/gearhead-docs")
        .with_status(401)
        .with_body(r#"{"error": {"code": "UNAUTHENTICATED", "message": "Invalid API Key"}}"#)
        .create_async()
        .await;

    let index = PineconeIndex::new(control_config(&server)).unwrap();
    let err = index.ensure_index(&IndexSpec::new(INDEX, 3, Metric::Cosine)).await.unwrap_err();
    match err {
        RagError::ConfigError(message) => assert!(message.contains("Invalid API Key")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn query_sends_camel_case_body_and_reads_matches() {
    let mut server = Server::new_async().await;
    let query = server
        .mock("POST", "/query")
        .match_header("api-key", API_KEY)
        .match_body(Matcher::PartialJson(json!({
            "vector": [1.0, 0.0, 0.0],
            "topK": 2,
            "includeMetadata": true,
            "includeValues": false,
            "filter": {"equipment_type": {"$eq": "excavator"}},
            "namespace": "manuals"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "matches": [
                    {
                        "id": "doc_0_chunk_0",
                        "score": 0.92,
                        "metadata": {
                            "text": "Check hydraulic fluid.",
                            "source": "a.pdf",
                            "page": 12.0
                        }
                    },
                    {"id": "doc_1_chunk_3", "score": 0.41}
                ],
                "namespace": "manuals"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let config = control_config(&server).with_host(server.url()).with_namespace("manuals");
    let index = PineconeIndex::new(config).unwrap();
    let filter = json!({"equipment_type": {"$eq": "excavator"}}).as_object().cloned().unwrap();
    let matches = index.query(&[1.0, 0.0, 0.0], 2, Some(&filter)).await.unwrap();

    query.assert_async().await;
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, "doc_0_chunk_0");
    assert_eq!(matches[0].text, "Check hydraulic fluid.");
    assert!((matches[0].score - 0.92).abs() < 1e-6);
    assert!(matches[1].metadata.is_empty());
    assert!(matches[1].text.is_empty());
}

#[tokio::test]
async fn query_on_missing_namespace_is_empty() {
    let mut server = Server::new_async().await;
    let _query = server.mock("POST", "/query").with_status(404).create_async().await;

    let matches = data_index(&server).query(&[1.0, 0.0, 0.0], 3, None).await.unwrap();
    assert!(matches.is_empty());
}

#[tokio::test]
async fn server_errors_degrade_through_the_client() {
    let mut server = Server::new_async().await;
    let _query = server
        .mock("POST", "/query")
        .with_status(503)
        .with_body(r#"{"message": "service unavailable"}"#)
        .create_async()
        .await;

    let index = Arc::new(data_index(&server));
    let err = index.query(&[1.0, 0.0, 0.0], 3, None).await.unwrap_err();
    assert!(err.is_unavailable());
    assert!(err.to_string().contains("service unavailable"));

    let client = IndexClient::new(index, INDEX);
    assert!(client.query(&[1.0, 0.0, 0.0], 3, None).await.is_empty());
}

#[tokio::test]
async fn host_is_resolved_once() {
    let mut server = Server::new_async().await;
    let describe = server
        .mock("GET", "/indexes/gearhead-docs")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(description(&server, 3))
        .expect(1)
        .create_async()
        .await;
    let query = server
        .mock("POST", "/query")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"matches": []}"#)
        .expect(2)
        .create_async()
        .await;

    let index = PineconeIndex::new(control_config(&server)).unwrap();
    index.query(&[1.0, 0.0, 0.0], 3, None).await.unwrap();
    index.query(&[1.0, 0.0, 0.0], 3, None).await.unwrap();

    describe.assert_async().await;
    query.assert_async().await;
}

#[tokio::test]
async fn query_against_missing_index_is_unavailable() {
    let mut server = Server::new_async().await;
    let _describe =
        server.mock("GET", "/indexes/gearhead-docs").with_status(404).create_async().await;

    let index = PineconeIndex::new(control_config(&server)).unwrap();
    let err = index.query(&[1.0, 0.0, 0.0], 3, None).await.unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn client_upserts_in_batches_of_one_hundred() {
    let mut server = Server::new_async().await;
    let upsert = server
        .mock("POST", "/vectors/upsert")
        .match_header("api-key", API_KEY)
        .match_body(Matcher::Regex(r#""id":"doc_0_chunk_\d+""#.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"upsertedCount": 100}"#)
        .expect(3)
        .create_async()
        .await;

    let client = IndexClient::new(Arc::new(data_index(&server)), INDEX).with_dimension(3);
    let written = client.upsert(&records(250)).await.unwrap();

    upsert.assert_async().await;
    assert_eq!(written, 250);
}

#[tokio::test]
async fn failed_upsert_batches_are_reported() {
    let mut server = Server::new_async().await;
    let _upsert = server
        .mock("POST", "/vectors/upsert")
        .with_status(500)
        .with_body(r#"{"message": "internal error"}"#)
        .expect(2)
        .create_async()
        .await;

    let client =
        IndexClient::new(Arc::new(data_index(&server)), INDEX).with_batch_size(2).unwrap();
    let err = client.upsert(&records(4)).await.unwrap_err();
    match err {
        RagError::UpsertError { failures, upserted } => {
            assert_eq!(upserted, 0);
            assert_eq!(failures.len(), 2);
            assert!(failures[0].message.contains("internal error"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn upsert_with_bad_request_is_a_config_error() {
    let mut server = Server::new_async().await;
    let _upsert = server
        .mock("POST", "/vectors/upsert")
        .with_status(400)
        .with_body(
            json!({"message": "Vector dimension 3 does not match the dimension of the index 384"})
                .to_string(),
        )
        .create_async()
        .await;

    let err = data_index(&server).upsert(&records(1)).await.unwrap_err();
    match err {
        RagError::IndexConfigError { message, .. } => assert!(message.contains("dimension")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn stats_and_delete_use_the_data_plane() {
    let mut server = Server::new_async().await;
    let stats = server
        .mock("POST", "/describe_index_stats")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"dimension": 384, "totalVectorCount": 1234, "namespaces": {}}"#)
        .create_async()
        .await;
    let delete = server
        .mock("POST", "/vectors/delete")
        .match_body(Matcher::PartialJson(json!({"ids": ["doc_0_chunk_0", "doc_0_chunk_1"]})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{}")
        .create_async()
        .await;

    let index = data_index(&server);
    let reported = index.stats().await.unwrap();
    assert_eq!(reported.dimension, 384);
    assert_eq!(reported.total_vector_count, 1234);

    index.delete(&["doc_0_chunk_0", "doc_0_chunk_1"]).await.unwrap();

    stats.assert_async().await;
    delete.assert_async().await;
}
