use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
};

use serde_json::{json, Value};

use growthbook::{
    codec::{decode_feature_map, encode_features},
    Error, Experiment, ExperimentResult, FeatureCache, FeatureSource, FileCache, GrowthBook,
    GrowthBookConfig, MemoryCache, Result, FEATURE_CACHE_KEY,
};

const TEST_URL: &str = "https://host.com/api/features/4r23r324f23";

const KEY: &str = "Ns04T5n9+59rl2x3SlNHtQ==";
const ENCRYPTED: &str = "vMSg2Bj/IurObDsWVmvkUg==.L6qtQkIzKDoE2Dix6IAKDcVel8PHUnzJ7JjmLjFZFQDqidRIoCxKmvxvUj2kTuHFTQ3/NJ3D6XhxhXXv2+dsXpw5woQf0eAgqrcxHrbtFORs18tRXRZza7zqgzwvcznx";
const DECRYPTED: &str = r#"{"testfeature1":{"defaultValue":true,"rules":[{"condition":{"id":"1234"},"force":false}]}}"#;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn features_payload() -> Vec<u8> {
    std::fs::read("tests/data/features.json").expect("Failed to open tests/data/features.json")
}

fn serving(payload: Vec<u8>) -> impl Fn(&str) -> Result<Vec<u8>> + Send + Sync + 'static {
    move |_endpoint: &str| Ok(payload.clone())
}

fn offline(_endpoint: &str) -> Result<Vec<u8>> {
    Err(Error::transport(std::io::Error::other("offline")))
}

/// Build a client against a mock endpoint and wait for the initial refresh.
fn client(config: GrowthBookConfig) -> (GrowthBook, bool) {
    let (sender, receiver) = mpsc::channel();
    let gb = config
        .cache(Arc::new(MemoryCache::new()))
        .on_initial_refresh(move |ok| sender.send(ok).unwrap())
        .to_client()
        .unwrap();
    let ok = receiver.recv().unwrap();
    (gb, ok)
}

#[test]
fn initialization_defaults() {
    init();
    let (gb, _) = client(GrowthBookConfig::from_endpoint(TEST_URL).fetcher(offline));

    let context = gb.get_context();
    assert!(context.enabled);
    assert!(!context.qa_mode);
    assert_eq!(context.endpoint.as_deref(), Some(TEST_URL));
    assert_eq!(context.attributes, json!({}));
    assert_eq!(context.forced_variations, None);
}

#[test]
fn initialization_overrides() {
    init();
    let attributes = json!({"id": "user-1"});
    let (gb, _) = client(
        GrowthBookConfig::from_endpoint(TEST_URL)
            .fetcher(serving(features_payload()))
            .attributes(attributes.clone())
            .enabled(false)
            .forced_variations(HashMap::new())
            .qa_mode(true),
    );

    let context = gb.get_context();
    assert!(!context.enabled);
    assert!(context.qa_mode);
    assert_eq!(context.endpoint.as_deref(), Some(TEST_URL));
    assert_eq!(context.attributes, attributes);
    assert_eq!(context.forced_variations, Some(HashMap::new()));
}

#[test]
fn refresh_loads_features() {
    init();
    let (gb, ok) = client(GrowthBookConfig::from_endpoint(TEST_URL).fetcher(serving(features_payload())));
    assert!(ok);

    let (sender, receiver) = mpsc::channel();
    let reader = gb.clone();
    gb.refresh(move |ok| {
        let features = reader.get_features();
        sender
            .send((ok, features.contains_key("onboarding"), features.contains_key("fwrfewrfe")))
            .unwrap();
    });

    assert_eq!(receiver.recv().unwrap(), (true, true, false));
}

#[test]
fn unknown_feature_and_experiment() {
    init();
    let (gb, _) = client(GrowthBookConfig::from_endpoint(TEST_URL).fetcher(serving(features_payload())));

    let feature = gb.eval_feature("fwrfewrfe");
    assert_eq!(feature.source, FeatureSource::UnknownFeature);
    assert!(gb.is_off("fwrfewrfe"));

    let result = gb.run(&Experiment::new("fwewrwefw"));
    assert_eq!(result.variation_id, 0);
}

#[test]
fn evaluates_rules_against_attributes() {
    init();
    let (gb, _) = client(
        GrowthBookConfig::from_endpoint(TEST_URL)
            .fetcher(serving(features_payload()))
            .attributes(json!({"id": "2435245", "version": "2.3.0"})),
    );

    assert_eq!(gb.get_feature_value("onboarding", json!("none")), json!("bottom"));
    assert!(gb.is_on("editor"));
    assert_eq!(gb.get_feature_value("missing", json!("none")), json!("none"));

    gb.set_attributes(json!({"id": "1", "browser": "safari", "version": "1.0.0"}));
    assert_eq!(gb.get_feature_value("onboarding", json!("none")), json!("middle"));
    assert!(gb.is_off("editor"));

    gb.set_attributes(json!({"loggedIn": true, "company": "acme"}));
    assert_eq!(
        gb.eval_feature("qrscanpayment").value,
        json!({"scanType": "dynamic"})
    );
}

#[test]
fn experiment_rule_tracks_exposure() {
    init();
    let tracked = Arc::new(std::sync::Mutex::new(Vec::new()));
    let (gb, _) = {
        let tracked = tracked.clone();
        client(
            GrowthBookConfig::from_endpoint(TEST_URL)
                .fetcher(serving(features_payload()))
                .attributes(json!({"id": "alice"}))
                .tracking_callback(move |experiment: &Experiment, result: &ExperimentResult| {
                    tracked.lock().unwrap().push((experiment.key.clone(), result.variation_id));
                }),
        )
    };

    let result = gb.eval_feature("qrscanpayment");

    assert_eq!(result.source, FeatureSource::Experiment);
    let variation_id = result.experiment_result.unwrap().variation_id;
    assert_eq!(*tracked.lock().unwrap(), vec![("qrscan-test".to_owned(), variation_id)]);
}

#[test]
fn failed_refresh_keeps_stale_features() {
    init();
    let online = Arc::new(AtomicBool::new(true));
    let fetcher = {
        let online = online.clone();
        let payload = features_payload();
        move |endpoint: &str| {
            if online.load(Ordering::SeqCst) {
                Ok(payload.clone())
            } else {
                offline(endpoint)
            }
        }
    };
    let (gb, ok) = client(GrowthBookConfig::from_endpoint(TEST_URL).fetcher(fetcher));
    assert!(ok);
    let before = gb.get_features();

    online.store(false, Ordering::SeqCst);
    assert!(matches!(gb.refresh_blocking(), Err(Error::TransportFailure(_))));

    assert_eq!(gb.get_features(), before);
    assert_eq!(gb.get_feature_value("onboarding", json!("none")), json!("top"));
}

#[test]
fn refresh_replaces_features_wholesale() {
    init();
    let first = features_payload();
    let second = encode_features(&decode_feature_map(DECRYPTED.as_bytes()).unwrap());
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let fetcher = {
        let calls = calls.clone();
        move |_endpoint: &str| -> Result<Vec<u8>> {
            Ok(match calls.fetch_add(1, Ordering::SeqCst) {
                0 => first.clone(),
                _ => second.clone(),
            })
        }
    };
    let (gb, _) = client(GrowthBookConfig::from_endpoint(TEST_URL).fetcher(fetcher));
    assert!(gb.get_features().contains_key("onboarding"));

    gb.refresh_blocking().unwrap();

    let keys: Vec<_> = gb.get_features().keys().cloned().collect();
    assert_eq!(keys, vec!["testfeature1".to_owned()]);
}

#[test]
fn encrypted_features() {
    init();
    let (gb, _) = client(GrowthBookConfig::from_endpoint(TEST_URL).fetcher(serving(features_payload())));

    gb.install_encrypted_features(ENCRYPTED, KEY);

    let expected = decode_feature_map(DECRYPTED.as_bytes()).unwrap();
    assert_eq!(*gb.get_features(), expected);
    let rule = &gb.get_features()["testfeature1"].rules[0];
    assert_eq!(rule.condition.as_ref().unwrap().0, json!({"id": "1234"}));
    assert_eq!(rule.force, Some(json!(false)));
}

#[test]
fn encrypted_features_with_corrupted_key_are_ignored() {
    init();
    let (gb, _) = client(GrowthBookConfig::from_endpoint(TEST_URL).fetcher(serving(features_payload())));
    let before = gb.get_features();

    gb.install_encrypted_features(ENCRYPTED, "Ns04T5n9+59rl2x3SlNHtQ");
    gb.install_encrypted_features(ENCRYPTED, "Zvwv/+uhpFDznZ6SX28Yjg==");

    assert_eq!(gb.get_features(), before);
    assert!(gb.try_install_encrypted_features(ENCRYPTED, "Zvwv/+uhpFDznZ6SX28Yjg==").is_err());
}

#[test]
fn cold_start_from_disk_cache() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FileCache::new(dir.path()));

    // First run: online, the payload lands on disk.
    let (sender, receiver) = mpsc::channel();
    GrowthBookConfig::from_endpoint(TEST_URL)
        .fetcher(serving(features_payload()))
        .cache(cache.clone())
        .on_initial_refresh(move |ok| sender.send(ok).unwrap())
        .to_client()
        .unwrap();
    assert!(receiver.recv().unwrap());
    assert_eq!(cache.get(FEATURE_CACHE_KEY), Some(features_payload()));

    // Second run: offline, features come from disk right away.
    let gb = GrowthBookConfig::from_endpoint(TEST_URL)
        .fetcher(offline)
        .cache(cache)
        .to_client()
        .unwrap();
    assert_eq!(gb.get_feature_value("onboarding", Value::Null), json!("top"));
}

#[test]
fn concurrent_reads_see_whole_snapshots() {
    init();
    let (gb, _) = client(GrowthBookConfig::from_endpoint(TEST_URL).fetcher(serving(features_payload())));
    let full: Vec<String> = {
        let mut keys: Vec<_> = gb.get_features().keys().cloned().collect();
        keys.sort();
        keys
    };

    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let gb = gb.clone();
            let stop = stop.clone();
            let full = full.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let mut keys: Vec<_> = gb.get_features().keys().cloned().collect();
                    keys.sort();
                    assert!(
                        keys == full || keys == vec!["testfeature1".to_owned()],
                        "torn read: {keys:?}"
                    );
                }
            })
        })
        .collect();

    for i in 0..50 {
        if i % 2 == 0 {
            gb.install_encrypted_features(ENCRYPTED, KEY);
        } else {
            gb.refresh_blocking().unwrap();
        }
    }
    stop.store(true, Ordering::SeqCst);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(gb.get_features().len(), full.len());
}
