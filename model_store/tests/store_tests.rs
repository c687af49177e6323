use approx::assert_abs_diff_eq;
use burn::tensor::TensorData;
use core_graph::{BuildOptions, LayerRegistry, Network, OutputDims, TargetDim};
use model_store::export::keys;
use model_store::{epoch_from_file, save_network, LayerGroup, ModelStore, ModelStoreError};
use safetensors::tensor::{Dtype, TensorView};
use serde_json::{json, Map, Value};
use tempfile::tempdir;

fn build_network() -> Network {
    let options = BuildOptions {
        n_in: Some(6),
        n_out: Some(OutputDims::from([(
            "classes".to_string(),
            TargetDim::new(4, 1),
        )])),
        mask: Some("unity".to_string()),
        ..BuildOptions::default()
    };
    let topology = json!({
        "output": {"class": "softmax", "from": ["h1", "h2"]},
        "h1": {"class": "forward", "n_out": 3},
        "h2": {"class": "recurrent", "n_out": 2},
    });
    Network::from_json(&topology, &options, &LayerRegistry::with_builtin_kinds()).unwrap()
}

fn assert_same_values(left: &TensorData, right: &TensorData) {
    assert_eq!(left.shape, right.shape);
    let left = left.to_vec::<f32>().unwrap();
    let right = right.to_vec::<f32>().unwrap();
    for (a, b) in left.iter().zip(&right) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-7);
    }
}

#[test]
fn test_save_network_attributes_ct() {
    let network = build_network();
    let store = save_network(&network, 3);

    assert_eq!(store.attr(keys::EPOCH), Some(&json!(3)));
    assert_eq!(store.attr(keys::N_IN), Some(&json!(6)));
    assert_eq!(store.attr(keys::OUTPUT), Some(&json!("output")));
    assert_eq!(store.attr(keys::UPDATE_STEP), Some(&json!(0)));
    assert_eq!(
        store.attr(keys::N_OUT),
        Some(&json!({"classes": 4, "data": 6}))
    );
    assert_eq!(
        store.attr(keys::N_OUT_DIM),
        Some(&json!({"classes": 1, "data": 2}))
    );
    assert_eq!(
        store.attr(keys::JSON).and_then(Value::as_str),
        Some(network.json_content())
    );

    assert_eq!(store.groups().len(), 3);
    let output = store.group("output").unwrap();
    assert_eq!(output.attrs.get("from"), Some(&json!("h1,h2")));
    assert_eq!(output.attrs.get("class"), Some(&json!("softmax")));
    assert_eq!(output.attrs.get("mask"), Some(&json!("unity")));
    assert_eq!(output.attrs.get("loss"), Some(&json!("ce")));
    let keys: Vec<&str> = output.params.keys().map(String::as_str).collect();
    assert_eq!(keys, ["W_in_h1_output", "W_in_h2_output", "b_output"]);

    let h2 = store.group("h2").unwrap();
    assert_eq!(h2.attrs.get("from"), Some(&json!("data")));
    assert!(h2.params.contains_key("W_re_h2"));
}

#[test]
fn test_file_round_trip_ct() {
    let network = build_network();
    let store = save_network(&network, 5);
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.safetensors");

    store.save_file(&path).unwrap();
    let loaded = ModelStore::load_file(&path).unwrap();

    assert_eq!(loaded.attrs(), store.attrs());
    assert_eq!(loaded.groups().len(), store.groups().len());
    for (name, group) in store.groups() {
        let restored = loaded.group(name).unwrap();
        assert_eq!(restored.attrs, group.attrs, "атрибуты слоя '{name}'");
        assert_eq!(restored.params.len(), group.params.len());
        for (param, value) in &group.params {
            assert_same_values(&restored.params[param], value);
        }
    }
}

#[test]
fn test_epoch_from_file_ct() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("epoch.safetensors");
    save_network(&build_network(), 17).save_file(&path).unwrap();
    assert_eq!(epoch_from_file(&path).unwrap(), 17);

    let attrs = ModelStore::read_file_attrs(&path).unwrap();
    assert_eq!(attrs.get(keys::EPOCH), Some(&json!(17)));
    assert_eq!(attrs.get(keys::N_IN), Some(&json!(6)));
}

#[test]
fn test_file_without_model_attrs_ct() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.safetensors");
    let values: Vec<u8> = [1.0_f32, 2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
    let view = TensorView::new(Dtype::F32, vec![2], &values).unwrap();
    let bytes = safetensors::serialize([("w", view)], &None).unwrap();
    std::fs::write(&path, bytes).unwrap();

    match ModelStore::read_file_attrs(&path) {
        Err(ModelStoreError::MissingAttribute { key, .. }) => assert_eq!(key, "__model__"),
        other => panic!("Ожидалась MissingAttribute, получено {other:?}"),
    }
    assert!(matches!(epoch_from_file(&path), Err(ModelStoreError::MissingAttribute { .. })));
}

#[test]
fn test_group_without_params_ct() {
    let mut store = ModelStore::new();
    store.set_attr(keys::EPOCH, 1);
    let mut attrs = Map::new();
    attrs.insert("class".to_string(), json!("copy"));
    store.insert_group(
        "c",
        LayerGroup {
            attrs,
            params: Default::default(),
        },
    );

    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.safetensors");
    store.save_file(&path).unwrap();
    let loaded = ModelStore::load_file(&path).unwrap();
    assert_eq!(loaded, store);
}

#[test]
fn test_missing_file_ct() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.safetensors");
    assert!(matches!(
        ModelStore::load_file(&path),
        Err(ModelStoreError::Io { .. })
    ));
    assert!(matches!(epoch_from_file(&path), Err(ModelStoreError::Io { .. })));
}

#[test]
fn test_corrupt_file_ct() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("corrupt.safetensors");
    std::fs::write(&path, b"\x04\x00\x00\x00\x00\x00\x00\x00oops").unwrap();
    assert!(matches!(
        ModelStore::load_file(&path),
        Err(ModelStoreError::Codec { .. })
    ));
    assert!(matches!(
        ModelStore::read_file_attrs(&path),
        Err(ModelStoreError::Codec { .. })
    ));
}
