use std::rc::Rc;

use core_graph::layer::kinds::ForwardKind;
use core_graph::{
    BuildOptions, GraphError, Layer, LayerArgs, LayerKind, LayerRegistry, LayerVariant, Network, OutputDims,
    TargetDim, Tensor,
};
use serde_json::json;

/// Вид слоя, пропускающий вход без изменений.
struct IdentityKind;

impl LayerKind for IdentityKind {
    fn kind_name(&self) -> &'static str {
        "identity"
    }

    fn accepted_keys(&self) -> &'static [&'static str] {
        &["note"]
    }

    fn construct(&self, args: &LayerArgs) -> core_graph::Result<Layer> {
        let source = args
            .sources
            .first()
            .ok_or_else(|| GraphError::InvalidConfig("нет источника".to_string()))?;
        Ok(Layer::new(
            args,
            self.kind_name(),
            LayerVariant::Hidden { recurrent: false },
            source.output().clone(),
            source.n_out(),
        ))
    }
}

fn classes_dims(size: usize) -> OutputDims {
    OutputDims::from([("classes".to_string(), TargetDim::new(size, 1))])
}

#[test]
fn test_builtin_kinds_and_aliases_ct() {
    let registry = LayerRegistry::with_builtin_kinds();
    for name in ["forward", "hidden", "recurrent", "rec", "lstm", "copy", "centroid"] {
        assert!(registry.contains(name), "вид '{name}' не зарегистрирован");
    }
    assert_eq!(registry.resolve("hidden").unwrap().kind_name(), "forward");
    assert_eq!(registry.resolve("rec").unwrap().kind_name(), "recurrent");
    assert!(registry.resolve("rec").unwrap().recurrent());
    assert!(!registry.resolve("forward").unwrap().recurrent());

    let names = registry.kind_names();
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);
}

#[test]
fn test_unknown_kind_ct() {
    let registry = LayerRegistry::new();
    assert!(!registry.contains("forward"));
    match registry.resolve("mystery") {
        Err(GraphError::UnknownLayerKind(name)) => assert_eq!(name, "mystery"),
        Err(other) => panic!("Ожидалась UnknownLayerKind, получено {other:?}"),
        Ok(_) => panic!("Ожидалась ошибка для неизвестного вида"),
    }
    assert!(matches!(
        registry.accepted_keys("mystery"),
        Err(GraphError::UnknownLayerKind(_))
    ));
}

#[test]
fn test_accepted_keys_ct() {
    let registry = LayerRegistry::with_builtin_kinds();
    let recurrent = registry.accepted_keys("recurrent").unwrap();
    assert!(recurrent.contains("reverse"));
    assert!(recurrent.contains("activation"));
    assert!(recurrent.contains("from"));

    let forward = registry.accepted_keys("forward").unwrap();
    assert!(!forward.contains("reverse"));
    assert!(forward.contains("L2"));
}

#[test]
fn test_alias_to_unknown_is_ignored_ct() {
    let mut registry = LayerRegistry::new();
    registry.register_alias("dense", "forward");
    assert!(!registry.contains("dense"));

    registry.register(Rc::new(ForwardKind));
    registry.register_alias("dense", "forward");
    assert_eq!(registry.resolve("dense").unwrap().kind_name(), "forward");
}

#[test]
fn test_custom_kind_builds_network_ct() {
    let mut registry = LayerRegistry::with_builtin_kinds();
    registry.register(Rc::new(IdentityKind));
    let options = BuildOptions {
        n_in: Some(6),
        n_out: Some(classes_dims(3)),
        ..BuildOptions::default()
    };
    let topology = json!({
        "output": {"class": "softmax", "from": ["pass"]},
        "pass": {"class": "identity", "note": "x"},
    });
    let network = Network::from_json(&topology, &options, &registry).unwrap();

    let pass = network.get_layer("pass").unwrap();
    assert_eq!(pass.kind(), "identity");
    assert_eq!(pass.n_out(), 6);
    let x: &Tensor = network.x();
    assert_eq!(pass.output(), x);
    // Только веса и смещение выходного слоя.
    assert_eq!(network.num_params(), 6 * 3 + 3);
}
