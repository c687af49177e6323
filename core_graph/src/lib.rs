// core_graph/src/lib.rs

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![deny(unsafe_code, clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::module_name_repetitions)]

//! # Core Graph
//!
//! Построение вычислительного графа нейросети по декларативной топологии.
//!
//! Топология (JSON или сохраненная модель) описывает именованные слои и ссылки
//! между ними. [`resolver::Resolver`] строит слои по требованию, в порядке
//! зависимостей, а [`network::Network`] собирает из них стоимость, ограничения,
//! переопределенные градиенты и список обучаемых параметров.
//!
//! Численные операции вне крейта: граф символьный ([`tensor`]), значения есть
//! только у параметров.

pub mod accumulator;
pub mod error;
pub mod layer;
pub mod network;
pub mod registry;
pub mod resolver;
pub mod targets;
pub mod tensor;
pub mod topology;

pub use accumulator::CostAccumulator;
pub use error::{GraphError, Result};
pub use layer::{Layer, LayerArgs, LayerKind, LayerRef, LayerVariant, OutputVariant, Param};
pub use network::{BuildOptions, ClassifierOptions, Network, TrainParamArgs};
pub use registry::LayerRegistry;
pub use targets::{OutputDims, TargetDim, TargetRegistry};
pub use tensor::{DType, GraphContext, SharedGraph, Tensor};
pub use topology::{LayerSpec, RefList, Topology};
