use std::sync::Arc;

use galaxy_forge::api::routes::create_router;
use galaxy_forge::config::GenerationSettings;
use galaxy_forge::logic::GalaxyEngine;
use galaxy_forge::store::InMemoryStore;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn post(&self, path: &str, json: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
            .unwrap();
        Self::decode(response).await
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap();
        Self::decode(response).await
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .delete(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap();
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> (StatusCode, Value) {
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    /// Poll a job until it leaves the in-progress outcome.
    async fn wait_for_job(&self, job_id: &str) -> Value {
        for _ in 0..400 {
            let (status, job) = self.get(&format!("/jobs/{}", job_id)).await;
            assert_eq!(status, StatusCode::OK);
            if job["result"]["outcome"] != "in_progress" {
                return job;
            }
            sleep(Duration::from_millis(25)).await;
        }
        panic!("job {} did not finish", job_id);
    }
}

async fn spawn_server() -> TestClient {
    let engine = GalaxyEngine::new(
        Arc::new(InMemoryStore::new()),
        GenerationSettings::default(),
    );
    let app = create_router().with_state(Arc::new(engine));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestClient::new(format!("http://{}", address))
}

fn generate_body(name: &str) -> Value {
    json!({
        "name": name,
        "num_sectors": 20,
        "config": {
            "region_distribution": { "core": 50, "border": 30, "frontier": 20 },
            "connectivity": "normal",
            "seed": 7
        }
    })
}

async fn generated_galaxy(client: &TestClient, name: &str) -> String {
    let (status, ticket) = client.post("/galaxies/generate", generate_body(name)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let job = client
        .wait_for_job(ticket["job_id"].as_str().unwrap())
        .await;
    assert_eq!(job["result"]["outcome"], "success", "job: {}", job);
    assert_eq!(job["state"], "COMPLETED");

    ticket["galaxy_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let client = spawn_server().await;

    let (status, body) = client.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_generate_then_browse() {
    let client = spawn_server().await;
    let galaxy_id = generated_galaxy(&client, "Browsable").await;

    let (status, galaxy) = client.get(&format!("/galaxies/{}", galaxy_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(galaxy["generation_status"], "COMPLETE");
    assert_eq!(galaxy["statistics"]["total_sectors"], 20);

    let (status, regions) = client.get(&format!("/galaxies/{}/regions", galaxy_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(regions["total"], 3);

    let (status, page) = client
        .get(&format!("/galaxies/{}/sectors?limit=5&offset=5", galaxy_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 20);
    assert_eq!(page["items"].as_array().unwrap().len(), 5);
    assert_eq!(page["items"][0]["sector_number"], 6);

    let (status, sector) = client.get(&format!("/galaxies/{}/sectors/1", galaxy_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sector["sector_number"], 1);

    let (status, adjacent) = client
        .get(&format!("/galaxies/{}/sectors/1/adjacent", galaxy_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(adjacent["total"].as_u64().unwrap() >= 1);

    let (status, path) = client
        .get(&format!("/galaxies/{}/path?from=1&to=20", galaxy_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    let hops = path["items"].as_array().unwrap();
    assert_eq!(hops.first().unwrap()["sector_number"], 1);
    assert_eq!(hops.last().unwrap()["sector_number"], 20);

    let (status, body) = client.get(&format!("/galaxies/{}/sectors/999", galaxy_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("999"));

    let (status, jobs) = client.get(&format!("/galaxies/{}/jobs", galaxy_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs["total"], 1);
}

#[tokio::test]
async fn test_invalid_generation_lists_every_violation() {
    let client = spawn_server().await;

    let body = json!({
        "name": "",
        "num_sectors": 20,
        "config": {
            "region_distribution": { "core": 50, "border": 30, "frontier": 10 },
            "port_density": 1.5
        }
    });
    let (status, error) = client.post("/galaxies/generate", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let fields: Vec<&str> = error["violations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"region_distribution"));
    assert!(fields.contains(&"port_density"));

    let (_, galaxies) = client.get("/galaxies").await;
    assert_eq!(galaxies["total"], 0);
}

#[tokio::test]
async fn test_expand_and_clear() {
    let client = spawn_server().await;
    let galaxy_id = generated_galaxy(&client, "Growing").await;

    let (status, accepted) = client
        .post(
            &format!("/galaxies/{}/sectors", galaxy_id),
            json!({ "num_sectors": 4, "region": "frontier" }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job = client
        .wait_for_job(accepted["job_id"].as_str().unwrap())
        .await;
    assert_eq!(job["result"]["outcome"], "success", "job: {}", job);

    let (_, galaxy) = client.get(&format!("/galaxies/{}", galaxy_id)).await;
    assert_eq!(galaxy["total_sectors"], 24);

    let (status, report) = client.delete(&format!("/galaxies/{}", galaxy_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["removed"]["sectors"], 24);
    assert_eq!(report["removed"]["jobs"], 2);

    let (status, _) = client.get(&format!("/galaxies/{}", galaxy_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_job_and_tunnel_errors() {
    let client = spawn_server().await;

    let (status, _) = client.get("/jobs/not-a-job").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = client.post("/jobs/not-a-job/cancel", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let galaxy_id = generated_galaxy(&client, "Tunnelled").await;
    let (_, sector) = client.get(&format!("/galaxies/{}/sectors/1", galaxy_id)).await;
    let sector_id = sector["id"].as_str().unwrap();

    let (status, _) = client
        .post(
            &format!("/galaxies/{}/warp-tunnels", galaxy_id),
            json!({ "source_sector_id": sector_id, "target_sector_id": sector_id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
