//! Topology, inventory and health API integration tests.

mod common;

use common::{Harness, ScriptedEngine};
use serde_json::{json, Value};

fn harness() -> Harness {
    Harness::new(ScriptedEngine::default(), &[])
}

fn items(body: &Value) -> &Vec<Value> {
    body["items"].as_array().unwrap()
}

#[tokio::test]
async fn test_health_endpoints() {
    let harness = harness();

    let (status, body) = harness.request("GET", "/healthz", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, body) = harness.request("GET", "/readyz", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["components"]["store"]["status"], "ok");
    assert_eq!(body["components"]["pipeline"]["status"], "idle");

    let (status, _) = harness.request("GET", "/livez", None).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_set_scale_materializes_topology() {
    let harness = harness();

    let (status, report) = harness
        .request("PUT", "/v1/configuration/scale", Some(json!({"scale": 500})))
        .await;
    assert_eq!(status, 200, "{report}");
    assert_eq!(report["scale"], 500);
    let planned = report["vms"].as_array().unwrap().len();

    let (_, vms) = harness.request("GET", "/v1/virtual-machines", None).await;
    assert_eq!(vms["total"], planned);

    let (status, dmz) = harness
        .request("GET", "/v1/virtual-machines?tier=RKEDMZ", None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(items(&dmz).len(), 3);
    assert!(items(&dmz)
        .iter()
        .all(|vm| vm["ip"].as_str().unwrap().starts_with("10.30.0.")));

    let (_, lbs) = harness
        .request("GET", "/v1/virtual-machines?tier=lblan", None)
        .await;
    assert_eq!(items(&lbs).len(), 2);
    assert!(items(&lbs).iter().all(|vm| vm["data_disk"] == 0));

    let (_, settings) = harness.request("GET", "/v1/configuration", None).await;
    assert_eq!(settings["scale"], 500);
}

#[tokio::test]
async fn test_unknown_scale_is_rejected() {
    let harness = harness();
    harness.topology.apply_scale(100).unwrap();

    let (status, body) = harness
        .request("PUT", "/v1/configuration/scale", Some(json!({"scale": 250})))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "unknown_scale_tier");

    let (_, settings) = harness.request("GET", "/v1/configuration", None).await;
    assert_eq!(settings["scale"], 100);
}

#[tokio::test]
async fn test_invalid_tier_filter() {
    let harness = harness();
    let (status, body) = harness
        .request("GET", "/v1/virtual-machines?tier=BASTION", None)
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "invalid_tier");
}

#[tokio::test]
async fn test_sizing_listing() {
    let harness = harness();

    let (status, body) = harness.request("GET", "/v1/sizing/1000", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["total"], 13);
    let vault = items(&body)
        .iter()
        .find(|row| row["vm_type"] == "VAULT")
        .unwrap();
    assert_eq!(vault["node_count"], 1);

    let (status, _) = harness.request("GET", "/v1/sizing/7", None).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_derived_records_follow_settings() {
    let harness = harness();
    harness.topology.apply_scale(100).unwrap();

    let (_, dns) = harness.request("GET", "/v1/dns", None).await;
    assert!(items(&dns)
        .iter()
        .any(|r| r["name"] == "test-vault.example.org"));

    let (_, flows) = harness.request("GET", "/v1/flows", None).await;
    assert!(!items(&flows).is_empty());
    assert!(items(&flows).iter().all(|f| f["is_open"] == false));

    let (status, settings) = harness
        .request("PUT", "/v1/configuration", Some(json!({"env_prefix": "prod"})))
        .await;
    assert_eq!(status, 200);
    assert_eq!(settings["env_prefix"], "prod");

    let (_, dns) = harness.request("GET", "/v1/dns", None).await;
    assert!(items(&dns)
        .iter()
        .any(|r| r["name"] == "prod-vault.example.org"));
    assert!(!items(&dns)
        .iter()
        .any(|r| r["name"] == "test-vault.example.org"));
}

#[tokio::test]
async fn test_vm_reconciliation() {
    let harness = harness();
    harness.topology.apply_scale(100).unwrap();

    let (_, infra) = harness
        .request("GET", "/v1/virtual-machines?tier=LBLAN", None)
        .await;
    let first = &items(&infra)[0];
    let second = &items(&infra)[1];
    let id = first["id"].as_i64().unwrap();

    let (status, body) = harness
        .request(
            "PUT",
            &format!("/v1/virtual-machines/{id}"),
            Some(json!({"ip": second["ip"]})),
        )
        .await;
    assert_eq!(status, 409, "{body}");

    let (status, _) = harness
        .request(
            "PUT",
            &format!("/v1/virtual-machines/{id}"),
            Some(json!({"ip": "10.20.0.251"})),
        )
        .await;
    assert_eq!(status, 422);

    let (status, vm) = harness
        .request(
            "PUT",
            &format!("/v1/virtual-machines/{id}"),
            Some(json!({"ip": "10.20.0.200", "status": "created"})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(vm["ip"], "10.20.0.200");
    assert_eq!(vm["status"], "created");

    let (_, dns) = harness.request("GET", "/v1/dns", None).await;
    let rancher = items(&dns)
        .iter()
        .find(|r| r["name"] == "test-rancher.example.org")
        .unwrap();
    assert_eq!(rancher["ip"], "10.20.0.200");

    let (status, _) = harness
        .request("GET", "/v1/virtual-machines/99999", None)
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_opened_flows_survive_reconciliation() {
    let harness = harness();
    harness.topology.apply_scale(100).unwrap();

    let (_, lbs) = harness
        .request("GET", "/v1/virtual-machines?tier=LBLAN", None)
        .await;
    let lb = &items(&lbs)[0];
    let lb_id = lb["id"].as_i64().unwrap();
    let lb_ip = lb["ip"].as_str().unwrap().to_string();

    let (_, flows) = harness.request("GET", "/v1/flows", None).await;
    let untouched = items(&flows)
        .iter()
        .find(|f| f["source"] != lb_ip.as_str() && f["destination"] != lb_ip.as_str())
        .unwrap()
        .clone();
    let from_lb = items(&flows)
        .iter()
        .find(|f| f["source"] == lb_ip.as_str())
        .unwrap()
        .clone();

    for flow in [&untouched, &from_lb] {
        let id = flow["id"].as_i64().unwrap();
        let (status, body) = harness
            .request("PUT", &format!("/v1/flows/{id}"), Some(json!({"is_open": true})))
            .await;
        assert_eq!(status, 200, "{body}");
        assert_eq!(body["is_open"], true);
    }

    // Retiering a VM across zones is rejected and leaves the flows alone.
    let (status, body) = harness
        .request(
            "PUT",
            &format!("/v1/virtual-machines/{lb_id}"),
            Some(json!({"tier": "RKEAPPS_WORKER"})),
        )
        .await;
    assert_eq!(status, 422, "{body}");

    let (status, _) = harness
        .request(
            "PUT",
            &format!("/v1/virtual-machines/{lb_id}"),
            Some(json!({"ip": "10.20.0.200"})),
        )
        .await;
    assert_eq!(status, 200);

    let (_, flows) = harness.request("GET", "/v1/flows", None).await;
    let same_key = |a: &Value, b: &Value| {
        a["source"] == b["source"]
            && a["destination"] == b["destination"]
            && a["port"] == b["port"]
            && a["protocol"] == b["protocol"]
    };
    let kept = items(&flows)
        .iter()
        .find(|f| same_key(f, &untouched))
        .unwrap();
    assert_eq!(kept["is_open"], true);
    assert!(!items(&flows).iter().any(|f| same_key(f, &from_lb)));
    assert!(items(&flows)
        .iter()
        .filter(|f| f["source"] == "10.20.0.200")
        .all(|f| f["is_open"] == false));

    let (status, body) = harness
        .request("PUT", "/v1/flows/99999", Some(json!({"is_open": true})))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_zone_update_and_pool_exhaustion() {
    let harness = harness();

    let (_, zones) = harness.request("GET", "/v1/zones", None).await;
    assert_eq!(zones["total"], 3);
    let apps = items(&zones).iter().find(|z| z["name"] == "apps").unwrap();
    let id = apps["id"].as_i64().unwrap();

    let (status, zone) = harness.request("GET", &format!("/v1/zones/{id}"), None).await;
    assert_eq!(status, 200);
    assert_eq!(zone["name"], "apps");
    let (status, _) = harness.request("GET", "/v1/zones/99999", None).await;
    assert_eq!(status, 404);

    let (status, zone) = harness
        .request(
            "PUT",
            &format!("/v1/zones/{id}"),
            Some(json!({"ip_pool_start": "10.10.0.10", "ip_pool_end": "10.10.0.11"})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(zone["ip_pool_end"], "10.10.0.11");

    let (status, body) = harness
        .request("PUT", "/v1/configuration/scale", Some(json!({"scale": 100})))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["code"], "pool_exhausted");
    assert!(harness.store.list_vms(None).unwrap().is_empty());

    let (status, _) = harness
        .request(
            "PUT",
            &format!("/v1/zones/{id}"),
            Some(json!({"ip_pool_end": "10.11.0.11"})),
        )
        .await;
    assert_eq!(status, 422);
}
