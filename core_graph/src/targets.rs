// core_graph/src/targets.rs

//! Реестр целевых потоков сети.
//!
//! Тензоры целевых меток создаются лениво, при первой ссылке на поток,
//! и никогда не пересоздаются.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::layer::DATA_SOURCE;
use crate::tensor::{DType, SharedGraph, Tensor};

/// Имя отсутствующего целевого потока.
pub const NULL_TARGET: &str = "null";

/// Поток, размерность которого объявляется автоматически.
pub const SIZES_TARGET: &str = "sizes";

/// Размерность целевого потока.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDim {
    /// Количество классов (или размерность признаков).
    pub size: usize,
    /// Ранг потока без batch-оси.
    pub ndim: usize,
}

impl TargetDim {
    /// Новая размерность.
    #[must_use]
    pub const fn new(size: usize, ndim: usize) -> Self {
        Self { size, ndim }
    }
}

/// Размерности всех потоков сети: имя -> размерность.
pub type OutputDims = BTreeMap<String, TargetDim>;

/// Зарегистрированный целевой поток.
#[derive(Debug, Clone)]
pub struct TargetEntry {
    /// Тензор целевых меток.
    pub data: Tensor,
    /// Тип элементов меток.
    pub dtype: DType,
    /// Размерность на момент регистрации.
    pub n_out: usize,
}

/// Реестр целевых потоков.
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    graph: SharedGraph,
    y: IndexMap<String, TargetEntry>,
    j: IndexMap<String, Tensor>,
}

impl TargetRegistry {
    /// Реестр с предзарегистрированным потоком `"data"` (сырой вход и его индекс).
    #[must_use]
    pub fn new(graph: SharedGraph, x: &Tensor, i: &Tensor, n_in: usize) -> Self {
        let mut y = IndexMap::new();
        y.insert(
            DATA_SOURCE.to_string(),
            TargetEntry {
                data: x.clone(),
                dtype: x.dtype(),
                n_out: n_in,
            },
        );
        let mut j = IndexMap::new();
        j.insert(DATA_SOURCE.to_string(), i.clone());
        Self { graph, y, j }
    }

    /// Регистрирует целевой поток, если он еще не зарегистрирован.
    ///
    /// `"null"` игнорируется. `"sizes"` объявляется в `n_out` как `(2, 1)`, если
    /// его там нет. Остальные потоки должны быть объявлены в `n_out`.
    ///
    /// # Errors
    /// `UnknownTarget`, если поток не объявлен.
    pub fn use_target(&mut self, name: &str, dtype: DType, n_out: &mut OutputDims) -> Result<()> {
        if name == NULL_TARGET || self.y.contains_key(name) {
            return Ok(());
        }
        if name == SIZES_TARGET {
            n_out
                .entry(SIZES_TARGET.to_string())
                .or_insert(TargetDim::new(2, 1));
        }
        let dim = *n_out
            .get(name)
            .ok_or_else(|| GraphError::UnknownTarget(name.to_string()))?;
        let data = Tensor::input(&self.graph, &format!("y_{name}"), dtype, dim.ndim + 1);
        debug!(target_name = name, %dtype, ndim = dim.ndim + 1, "Зарегистрирован целевой поток");
        self.y.insert(
            name.to_string(),
            TargetEntry {
                data,
                dtype,
                n_out: dim.size,
            },
        );
        if !self.j.contains_key(name) {
            let index = Tensor::input(&self.graph, &format!("j_{name}"), DType::Int8, 2);
            self.j.insert(name.to_string(), index);
        }
        Ok(())
    }

    /// Зарегистрирован ли поток.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.y.contains_key(name)
    }

    /// Запись потока.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TargetEntry> {
        self.y.get(name)
    }

    /// Тензор целевых меток.
    #[must_use]
    pub fn data(&self, name: &str) -> Option<&Tensor> {
        self.y.get(name).map(|entry| &entry.data)
    }

    /// Тензор индекса потока.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&Tensor> {
        self.j.get(name)
    }

    /// Имена зарегистрированных потоков в порядке регистрации.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.y.keys().map(String::as_str)
    }

    /// Количество зарегистрированных потоков (включая `"data"`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// Пуст ли реестр. Всегда `false`: `"data"` зарегистрирован при создании.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}
