use std::str::FromStr;

use burn::tensor::TensorData;
use core_graph::tensor::Op;
use core_graph::{DType, GraphContext, GraphError, Tensor};

#[test]
fn test_constant_folding_ct() {
    let graph = GraphContext::new_shared();
    let zero = Tensor::constant(&graph, 0.0);
    let x = Tensor::input(&graph, "x", DType::Float32, 3);

    // Нулевое слагаемое не порождает новый узел.
    let nodes_before = graph.borrow().len();
    assert_eq!(zero.add(&x), x);
    assert_eq!(x.add(&zero), x);
    assert_eq!(x.scale(1.0), x);
    assert_eq!(graph.borrow().len(), nodes_before);

    let sum = Tensor::constant(&graph, 1.5).add(&Tensor::constant(&graph, 2.0));
    assert_eq!(sum.as_constant(), Some(3.5));
    assert_eq!(sum.scale(2.0).as_constant(), Some(7.0));
}

#[test]
fn test_add_creates_node_ct() {
    let graph = GraphContext::new_shared();
    let a = Tensor::input(&graph, "a", DType::Float32, 2);
    let b = Tensor::input(&graph, "b", DType::Float32, 2);
    let sum = a.add(&b);
    assert_eq!(sum.op(), Op::Add(a.id(), b.id()));
    assert_eq!(sum.ndim(), 2);
    assert_eq!(sum.dtype(), DType::Float32);

    let scaled = sum.scale(0.5);
    assert_eq!(scaled.op(), Op::Scale(sum.id(), 0.5));
}

#[test]
fn test_tensor_identity_equality_ct() {
    let graph = GraphContext::new_shared();
    let first = Tensor::input(&graph, "same", DType::Int8, 2);
    let second = Tensor::input(&graph, "same", DType::Int8, 2);
    assert_ne!(first, second);
    assert_eq!(first.clone(), first);
    assert_eq!(first.name(), "same");

    // Узлы с одинаковым индексом в разных графах различны.
    let other_graph = GraphContext::new_shared();
    let foreign = Tensor::input(&other_graph, "same", DType::Int8, 2);
    assert_eq!(foreign.id(), first.id());
    assert_ne!(foreign, first);
}

#[test]
fn test_parameter_value_ct() {
    let graph = GraphContext::new_shared();
    let w = Tensor::parameter(&graph, "W", TensorData::new(vec![0.0_f32; 6], vec![2, 3]));
    assert!(w.is_parameter());
    assert_eq!(w.ndim(), 2);
    assert_eq!(w.shape(), Some(vec![2, 3]));
    assert_eq!(w.num_elements(), 6);

    w.set_value(TensorData::new(vec![1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]))
        .unwrap();
    let values = w.value().unwrap().to_vec::<f32>().unwrap();
    assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn test_parameter_shape_mismatch_ct() {
    let graph = GraphContext::new_shared();
    let b = Tensor::parameter(&graph, "b", TensorData::new(vec![0.0_f32; 4], vec![4]));
    match b.set_value(TensorData::new(vec![0.0_f32; 3], vec![3])) {
        Err(GraphError::ShapeMismatch { name, expected, actual }) => {
            assert_eq!(name, "b");
            assert_eq!(expected, vec![4]);
            assert_eq!(actual, vec![3]);
        }
        other => panic!("Ожидалась ShapeMismatch, получено {other:?}"),
    }

    let x = Tensor::input(&graph, "x", DType::Float32, 1);
    assert!(!x.is_parameter());
    assert_eq!(x.num_elements(), 0);
    assert!(matches!(
        x.set_value(TensorData::new(vec![0.0_f32; 3], vec![3])),
        Err(GraphError::InvalidConfig(_))
    ));
}

#[test]
fn test_dtype_names_ct() {
    for dtype in [
        DType::Float32,
        DType::Float64,
        DType::Int8,
        DType::UInt8,
        DType::Int32,
        DType::Int64,
    ] {
        assert_eq!(DType::from_str(dtype.as_str()).unwrap(), dtype);
    }
    assert_eq!(DType::default(), DType::Int32);
    assert!(matches!(DType::from_str("complex64"), Err(GraphError::InvalidConfig(_))));
}
