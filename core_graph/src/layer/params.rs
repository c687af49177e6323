// core_graph/src/layer/params.rs

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use burn::tensor::TensorData;
use indexmap::IndexMap;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::trace;

use crate::tensor::{SharedGraph, Tensor};

/// Таблица параметров сети: слой -> имя параметра -> тензор.
pub type ParamTable = HashMap<String, IndexMap<String, Tensor>>;

/// Параметр слоя.
///
/// Собственный параметр обучается этой сетью. Заимствованный принадлежит
/// базовой сети и в список обучаемых переменных не попадает.
#[derive(Debug, Clone)]
pub struct Param {
    tensor: Tensor,
    owned: bool,
}

impl Param {
    /// Собственный параметр.
    #[must_use]
    pub const fn owned(tensor: Tensor) -> Self {
        Self {
            tensor,
            owned: true,
        }
    }

    /// Параметр, заимствованный у базовой сети.
    #[must_use]
    pub const fn borrowed(tensor: Tensor) -> Self {
        Self {
            tensor,
            owned: false,
        }
    }

    /// Символьный тензор параметра.
    #[must_use]
    pub const fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// Обучается ли параметр этой сетью.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        self.owned
    }
}

/// Выдает параметры слоям.
///
/// Если задана таблица базовой сети, параметр сначала ищется в ней
/// (по имени слоя и имени параметра) и возвращается как заимствованный.
/// Иначе создается новый параметр с инициализацией от детерминированного генератора.
pub struct ParamFactory {
    graph: SharedGraph,
    rng: RefCell<StdRng>,
    shared: Option<Rc<ParamTable>>,
}

impl ParamFactory {
    /// Фабрика новых параметров.
    #[must_use]
    pub fn new(graph: SharedGraph, seed: u64) -> Self {
        Self {
            graph,
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
            shared: None,
        }
    }

    /// Фабрика, заимствующая параметры из таблицы базовой сети.
    #[must_use]
    pub fn sharing(graph: SharedGraph, seed: u64, table: Rc<ParamTable>) -> Self {
        Self {
            shared: Some(table),
            ..Self::new(graph, seed)
        }
    }

    /// Заимствует ли фабрика параметры.
    #[must_use]
    pub const fn is_sharing(&self) -> bool {
        self.shared.is_some()
    }

    /// Весовая матрица `rows x cols` с равномерной инициализацией Глоро.
    #[must_use]
    pub fn weight(&self, layer: &str, name: &str, rows: usize, cols: usize) -> Param {
        if let Some(tensor) = self.lookup(layer, name) {
            return Param::borrowed(tensor);
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let limit = (6.0 / (rows + cols).max(1) as f64).sqrt() as f32;
        let values: Vec<f32> = {
            let mut rng = self.rng.borrow_mut();
            (0..rows * cols)
                .map(|_| rng.random_range(-limit..=limit))
                .collect()
        };
        trace!(layer, param = name, rows, cols, "Создана весовая матрица");
        Param::owned(Tensor::parameter(
            &self.graph,
            name,
            TensorData::new(values, vec![rows, cols]),
        ))
    }

    /// Вектор смещений длины `size`, инициализированный нулями.
    #[must_use]
    pub fn bias(&self, layer: &str, name: &str, size: usize) -> Param {
        if let Some(tensor) = self.lookup(layer, name) {
            return Param::borrowed(tensor);
        }
        Param::owned(Tensor::parameter(
            &self.graph,
            name,
            TensorData::new(vec![0.0_f32; size], vec![size]),
        ))
    }

    fn lookup(&self, layer: &str, name: &str) -> Option<Tensor> {
        self.shared
            .as_ref()
            .and_then(|table| table.get(layer))
            .and_then(|params| params.get(name))
            .cloned()
    }
}
