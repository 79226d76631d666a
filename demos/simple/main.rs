use serde_json::json;

use growthbook::{Experiment, ExperimentResult, GrowthBookConfig};

pub fn main() {
    env_logger::init();

    let endpoint = std::env::var("GROWTHBOOK_ENDPOINT").unwrap();
    let client = GrowthBookConfig::from_endpoint(endpoint)
        .attributes(json!({"id": "test-subject"}))
        .tracking_callback(|experiment: &Experiment, result: &ExperimentResult| {
            println!("Viewed {}: variation {}", experiment.key, result.variation_id);
        })
        .to_client()
        .unwrap();

    // Block waiting for features. Until the first refresh completes, the client serves whatever
    // was cached by a previous run.
    if let Err(err) = client.refresh_blocking() {
        eprintln!("Failed to refresh features, using cached ones: {err}");
    }

    let value = client.get_feature_value("a-boolean-flag", json!(false));

    println!("Value: {:?}", value);
}
