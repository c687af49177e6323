use std::rc::Rc;

use core_graph::targets::{NULL_TARGET, SIZES_TARGET};
use core_graph::{DType, GraphContext, GraphError, OutputDims, TargetDim, TargetRegistry, Tensor};

fn registry() -> (TargetRegistry, Tensor, Tensor) {
    let graph = GraphContext::new_shared();
    let x = Tensor::input(&graph, "x", DType::Float32, 3);
    let i = Tensor::input(&graph, "i", DType::Int8, 2);
    (TargetRegistry::new(Rc::clone(&graph), &x, &i, 10), x, i)
}

#[test]
fn test_data_preregistered_ct() {
    let (targets, x, i) = registry();
    assert_eq!(targets.len(), 1);
    assert!(!targets.is_empty());
    assert_eq!(targets.data("data"), Some(&x));
    assert_eq!(targets.index("data"), Some(&i));
    assert_eq!(targets.get("data").unwrap().n_out, 10);
}

#[test]
fn test_use_target_registers_once_ct() {
    let (mut targets, _, _) = registry();
    let mut n_out = OutputDims::from([("classes".to_string(), TargetDim::new(5, 1))]);

    targets.use_target("classes", DType::Int32, &mut n_out).unwrap();
    let y = targets.data("classes").unwrap().clone();
    let j = targets.index("classes").unwrap().clone();
    assert_eq!(y.name(), "y_classes");
    assert_eq!(y.ndim(), 2);
    assert_eq!(y.dtype(), DType::Int32);
    assert_eq!(j.name(), "j_classes");
    assert_eq!(j.dtype(), DType::Int8);

    // Повторная регистрация не пересоздает тензоры.
    targets.use_target("classes", DType::Int64, &mut n_out).unwrap();
    assert_eq!(targets.data("classes"), Some(&y));
    assert_eq!(targets.get("classes").unwrap().dtype, DType::Int32);

    let names: Vec<&str> = targets.names().collect();
    assert_eq!(names, ["data", "classes"]);
}

#[test]
fn test_null_and_sizes_targets_ct() {
    let (mut targets, _, _) = registry();
    let mut n_out = OutputDims::new();

    targets.use_target(NULL_TARGET, DType::Int32, &mut n_out).unwrap();
    assert!(!targets.contains(NULL_TARGET));
    assert!(n_out.is_empty());

    targets.use_target(SIZES_TARGET, DType::Int32, &mut n_out).unwrap();
    assert_eq!(n_out.get(SIZES_TARGET), Some(&TargetDim::new(2, 1)));
    assert!(targets.contains(SIZES_TARGET));
}

#[test]
fn test_unknown_target_ct() {
    let (mut targets, _, _) = registry();
    let mut n_out = OutputDims::new();
    match targets.use_target("nonexistent", DType::Int32, &mut n_out) {
        Err(GraphError::UnknownTarget(name)) => assert_eq!(name, "nonexistent"),
        other => panic!("Ожидалась UnknownTarget, получено {other:?}"),
    }
    assert!(!targets.contains("nonexistent"));
}
