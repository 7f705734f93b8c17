// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for envbroker-process integration tests.
//!
//! Provides a file-backed SQLite store and an AVS fake served by wiremock.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use envbroker_process::operation::{Operation, OperationType, ProvisioningParameters};
use envbroker_process::persistence::SqliteStore;

pub const PARENT_EVAL_ID: i64 = 91011;

/// SQLite database in the temp directory, removed on drop.
pub struct TestDb {
    pub store: Arc<SqliteStore>,
    path: PathBuf,
}

impl TestDb {
    pub async fn new() -> Self {
        let path = std::env::temp_dir().join(format!("envbroker-test-{}.db", Uuid::new_v4()));
        let store = SqliteStore::from_path(&path)
            .await
            .expect("Failed to open test database");
        Self {
            store: Arc::new(store),
            path,
        }
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// AVS fake with a token endpoint and DELETE routes answering `status`.
pub async fn avs_server(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "token-1",
            "scope": "user",
            "token_type": "bearer",
            "expires_in": 86400
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/api/.+$"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

pub fn avs_client(server: &MockServer) -> envbroker_avs::Client {
    envbroker_avs::Client::new(&envbroker_avs::Config {
        api_endpoint: format!("{}/api", server.uri()),
        oauth_token_endpoint: format!("{}/oauth/token", server.uri()),
        oauth_client_id: "broker".to_string(),
        oauth_username: String::new(),
        oauth_password: String::new(),
        parent_id: PARENT_EVAL_ID,
        request_timeout: Duration::from_secs(5),
    })
    .expect("Failed to build AVS client")
}

/// DELETE paths the AVS fake received, in order.
pub async fn deleted_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.method.as_str() == "DELETE")
        .map(|request| request.url.path().to_string())
        .collect()
}

pub fn operation(operation_type: OperationType, plan_id: &str) -> Operation {
    Operation::new(
        operation_type,
        format!("instance-{}", Uuid::new_v4()),
        format!("runtime-{}", Uuid::new_v4()),
        ProvisioningParameters {
            plan_id: plan_id.to_string(),
            global_account_id: "ga-1".to_string(),
            subaccount_id: "sa-1".to_string(),
            runtime_version: None,
        },
    )
}
