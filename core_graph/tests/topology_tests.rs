use core_graph::topology::parse_json_text;
use core_graph::{DType, GraphError, RefList, Topology};
use serde_json::json;

#[test]
fn test_reflist_forms_ct() {
    let topology = Topology::from_value(&json!({
        "single": {"class": "forward", "from": "a"},
        "many": {"class": "forward", "from": ["a", "b"]},
        "empty": {"class": "forward", "from": ""},
    }))
    .unwrap();

    let names = |layer: &str| topology.get(layer).unwrap().from.clone().unwrap();
    assert_eq!(names("single").names(), ["a"]);
    assert_eq!(names("many").names(), ["a", "b"]);
    assert!(names("empty").is_empty());
}

#[test]
fn test_reflist_comma_joined_ct() {
    let refs = RefList::from_comma_joined("a,,b,");
    assert_eq!(refs.names(), ["a", "b"]);
    assert!(RefList::from_comma_joined("").is_empty());

    assert_eq!(RefList::from("c").single("copy_input", "layer").unwrap(), "c");
    assert!(matches!(
        refs.single("centroids", "layer"),
        Err(GraphError::InvalidConfig(_))
    ));
}

#[test]
fn test_layer_spec_fields_and_extra_ct() {
    let topology = Topology::from_value(&json!({
        "output": {
            "class": "softmax",
            "from": ["h"],
            "loss": "ctc",
            "dtype": "int64",
            "n_symbols": 12,
            "cost_scale": 0.5,
        },
        "h": {"class": "recurrent", "n_out": 8, "dropout": 0.1, "reverse": true},
    }))
    .unwrap();
    assert_eq!(topology.len(), 2);

    let output = topology.get("output").unwrap();
    assert_eq!(output.class, "softmax");
    assert_eq!(output.loss.as_deref(), Some("ctc"));
    assert_eq!(output.n_symbols, Some(12));
    assert_eq!(output.dtype().unwrap(), DType::Int64);
    assert_eq!(output.extra.get("cost_scale"), Some(&json!(0.5)));
    assert!(!output.extra.contains_key("loss"));

    let hidden = topology.get("h").unwrap();
    assert_eq!(hidden.n_out, Some(8));
    assert_eq!(hidden.dropout, Some(0.1));
    assert_eq!(hidden.dtype().unwrap(), DType::Int32);
    assert_eq!(hidden.extra.get("reverse"), Some(&json!(true)));
}

#[test]
fn test_topology_iterates_sorted_ct() {
    let topology = Topology::from_value(&json!({
        "zeta": {"class": "forward"},
        "alpha": {"class": "forward"},
        "output": {"class": "softmax"},
    }))
    .unwrap();
    let names: Vec<&str> = topology.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["alpha", "output", "zeta"]);
}

#[test]
fn test_network_key_unwrapped_ct() {
    let topology = Topology::from_json_str(r#"{"network": {"output": {"class": "softmax"}}}"#).unwrap();
    assert!(topology.contains("output"));
    assert!(!topology.contains("network"));

    let value = parse_json_text(r#"{"output": {"class": "softmax"}}"#).unwrap();
    assert!(value.get("output").is_some());
}

#[test]
fn test_invalid_topology_syntax_ct() {
    match Topology::from_json_str("{\"output\": ") {
        Err(GraphError::InvalidTopologySyntax { content, .. }) => {
            assert_eq!(content, "{\"output\": ");
        }
        other => panic!("Ожидалась InvalidTopologySyntax, получено {other:?}"),
    }

    assert!(matches!(
        Topology::from_value(&json!(["output"])),
        Err(GraphError::InvalidTopologySyntax { .. })
    ));
    // Нет обязательного поля class.
    assert!(matches!(
        Topology::from_value(&json!({"output": {"from": "data"}})),
        Err(GraphError::InvalidTopologySyntax { .. })
    ));
    assert!(matches!(
        Topology::from_value(&json!({"output": {"class": "softmax", "n_out": "many"}})),
        Err(GraphError::InvalidTopologySyntax { .. })
    ));
}
