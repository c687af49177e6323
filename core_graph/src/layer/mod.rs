// core_graph/src/layer/mod.rs

//! Экземпляры слоев и общие для всех видов слоев типы.
//!
//! Слой создается ровно один раз для каждого имени и после этого не меняется.
//! Слои разделяются через [`LayerRef`]: потребитель держит сильные ссылки на
//! свои источники, обратных ссылок нет.

pub mod kinds;
pub mod output;
pub mod params;

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use burn::tensor::TensorData;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{GraphError, Result};
use crate::tensor::{SharedGraph, Tensor};

pub use kinds::LayerKind;
pub use output::OutputVariant;
pub use params::{Param, ParamFactory, ParamTable};

/// Зарезервированное имя сырого входа сети.
pub const DATA_SOURCE: &str = "data";

/// Имя выходного слоя по умолчанию.
pub const DEFAULT_OUTPUT: &str = "output";

/// Разделяемая ссылка на построенный слой.
pub type LayerRef = Rc<Layer>;

/// Вариант слоя.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerVariant {
    /// Сырой вход сети (`"data"`).
    Source,
    /// Скрытый слой.
    Hidden {
        /// Рекуррентный ли слой.
        recurrent: bool,
    },
    /// Выходной классификатор.
    Output(OutputVariant),
}

/// Вспомогательные ссылки слоя помимо списка источников.
#[derive(Debug, Clone, Default)]
pub struct AuxRefs {
    /// Слои-кодировщики.
    pub encoder: Vec<LayerRef>,
    /// Базовые слои (могут включать сырой вход).
    pub base: Vec<LayerRef>,
    /// Слой, выход которого копируется.
    pub copy_input: Option<LayerRef>,
    /// Слой с центроидами.
    pub centroids: Option<LayerRef>,
}

/// Вклад слоя в целевую функцию.
#[derive(Debug, Clone)]
pub struct CostTerms {
    /// Скалярная стоимость.
    pub cost: Tensor,
    /// Переопределенные градиенты: переменная -> градиент.
    pub known_grads: Vec<(Tensor, Tensor)>,
    /// Априорное распределение CTC (только для последовательностных классификаторов).
    pub prior: Option<Tensor>,
}

/// Аргументы конструктора слоя, собранные резолвером.
#[derive(Clone)]
pub struct LayerArgs {
    /// Имя слоя.
    pub name: String,
    /// Разрешенные источники в порядке объявления.
    pub sources: Vec<LayerRef>,
    /// Вспомогательные ссылки.
    pub aux: AuxRefs,
    /// Тензор индекса (маски) слоя.
    pub index: Tensor,
    /// Вероятность dropout.
    pub dropout: f64,
    /// Строится ли сеть для обучения.
    pub train_flag: bool,
    /// Политика маски.
    pub mask: Option<String>,
    /// Целевой поток.
    pub target: Option<String>,
    /// Явная размерность выхода.
    pub n_out: Option<usize>,
    /// Остальные ключи описания слоя.
    pub config: Map<String, Value>,
    /// Граф, в котором создаются узлы.
    pub graph: SharedGraph,
    /// Источник параметров.
    pub params: Rc<ParamFactory>,
}

impl LayerArgs {
    /// Строковое значение ключа конфигурации.
    #[must_use]
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Числовое значение ключа конфигурации.
    #[must_use]
    pub fn config_f64(&self, key: &str) -> Option<f64> {
        self.config.get(key).and_then(Value::as_f64)
    }

    /// Логическое значение ключа конфигурации.
    #[must_use]
    pub fn config_bool(&self, key: &str) -> bool {
        self.config.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Явная размерность выхода или ошибка.
    ///
    /// # Errors
    /// `InvalidConfig`, если `n_out` не задан.
    pub fn require_n_out(&self) -> Result<usize> {
        self.n_out.ok_or_else(|| {
            GraphError::InvalidConfig(format!("слой '{}': не задан n_out", self.name))
        })
    }
}

/// Построенный слой.
pub struct Layer {
    name: String,
    kind: String,
    variant: LayerVariant,
    sources: Vec<LayerRef>,
    aux: AuxRefs,
    output: Tensor,
    index: Tensor,
    n_out: usize,
    dropout: f64,
    mask: Option<String>,
    target: Option<String>,
    params: IndexMap<String, Param>,
    constraints: Tensor,
    cost: Option<CostTerms>,
    cost_scale: f64,
    errors: Option<Tensor>,
    attrs: Map<String, Value>,
}

impl Layer {
    /// Создает слой без параметров и стоимости. Остальное добавляется через `with_*`.
    #[must_use]
    pub fn new(
        args: &LayerArgs,
        kind: &str,
        variant: LayerVariant,
        output: Tensor,
        n_out: usize,
    ) -> Self {
        Self {
            name: args.name.clone(),
            kind: kind.to_string(),
            variant,
            sources: args.sources.clone(),
            aux: args.aux.clone(),
            output,
            index: args.index.clone(),
            n_out,
            dropout: args.dropout,
            mask: args.mask.clone(),
            target: args.target.clone(),
            params: IndexMap::new(),
            constraints: Tensor::constant(&args.graph, 0.0),
            cost: None,
            cost_scale: 1.0,
            errors: None,
            attrs: Map::new(),
        }
    }

    /// Слой сырого входа `"data"`.
    #[must_use]
    pub fn source(graph: &SharedGraph, n_in: usize, x: &Tensor, i: &Tensor, sparse: bool) -> Self {
        let mut attrs = Map::new();
        if sparse {
            attrs.insert("sparse".to_string(), Value::Bool(true));
        }
        Self {
            name: DATA_SOURCE.to_string(),
            kind: "source".to_string(),
            variant: LayerVariant::Source,
            sources: Vec::new(),
            aux: AuxRefs::default(),
            output: x.clone(),
            index: i.clone(),
            n_out: n_in,
            dropout: 0.0,
            mask: None,
            target: None,
            params: IndexMap::new(),
            constraints: Tensor::constant(graph, 0.0),
            cost: None,
            cost_scale: 1.0,
            errors: None,
            attrs,
        }
    }

    /// Задает параметры слоя.
    #[must_use]
    pub fn with_params(mut self, params: IndexMap<String, Param>) -> Self {
        self.params = params;
        self
    }

    /// Задает вклад в ограничения (регуляризацию).
    #[must_use]
    pub fn with_constraints(mut self, constraints: Tensor) -> Self {
        self.constraints = constraints;
        self
    }

    /// Задает стоимость и ее масштаб.
    #[must_use]
    pub fn with_cost(mut self, cost: CostTerms, cost_scale: f64) -> Self {
        self.cost = Some(cost);
        self.cost_scale = cost_scale;
        self
    }

    /// Задает тензор ошибок классификатора.
    #[must_use]
    pub fn with_errors(mut self, errors: Tensor) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Добавляет сохраняемый атрибут.
    #[must_use]
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    /// Имя слоя.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Вид слоя (имя в реестре).
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Вариант слоя.
    #[must_use]
    pub const fn variant(&self) -> LayerVariant {
        self.variant
    }

    /// Является ли слой выходным классификатором.
    #[must_use]
    pub const fn is_output(&self) -> bool {
        matches!(self.variant, LayerVariant::Output(_))
    }

    /// Рекуррентный ли слой.
    #[must_use]
    pub const fn is_recurrent(&self) -> bool {
        matches!(self.variant, LayerVariant::Hidden { recurrent: true })
    }

    /// Источники в порядке объявления.
    #[must_use]
    pub fn sources(&self) -> &[LayerRef] {
        &self.sources
    }

    /// Вспомогательные ссылки.
    #[must_use]
    pub const fn aux(&self) -> &AuxRefs {
        &self.aux
    }

    /// Выходной тензор.
    #[must_use]
    pub const fn output(&self) -> &Tensor {
        &self.output
    }

    /// Тензор индекса.
    #[must_use]
    pub const fn index(&self) -> &Tensor {
        &self.index
    }

    /// Размерность выхода.
    #[must_use]
    pub const fn n_out(&self) -> usize {
        self.n_out
    }

    /// Вероятность dropout.
    #[must_use]
    pub const fn dropout(&self) -> f64 {
        self.dropout
    }

    /// Политика маски.
    #[must_use]
    pub fn mask(&self) -> Option<&str> {
        self.mask.as_deref()
    }

    /// Целевой поток слоя.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Все параметры слоя (собственные и заимствованные).
    #[must_use]
    pub const fn params(&self) -> &IndexMap<String, Param> {
        &self.params
    }

    /// Вклад в ограничения.
    #[must_use]
    pub const fn constraints(&self) -> &Tensor {
        &self.constraints
    }

    /// Вклад в стоимость.
    #[must_use]
    pub const fn cost_terms(&self) -> Option<&CostTerms> {
        self.cost.as_ref()
    }

    /// Масштаб стоимости.
    #[must_use]
    pub const fn cost_scale(&self) -> f64 {
        self.cost_scale
    }

    /// Тензор ошибок (только у классификаторов с целевым потоком).
    #[must_use]
    pub const fn errors(&self) -> Option<&Tensor> {
        self.errors.as_ref()
    }

    /// Сохраняемые атрибуты вида слоя (activation, loss, dtype, ...).
    #[must_use]
    pub const fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    /// Обучаемые переменные слоя, упорядоченные по имени.
    /// Заимствованные у базовой сети параметры не входят.
    #[must_use]
    pub fn params_vars(&self) -> Vec<Tensor> {
        let mut owned: Vec<(&String, &Param)> =
            self.params.iter().filter(|(_, p)| p.is_owned()).collect();
        owned.sort_by(|a, b| a.0.cmp(b.0));
        owned.into_iter().map(|(_, p)| p.tensor().clone()).collect()
    }

    /// Суммарное количество элементов во всех параметрах слоя.
    #[must_use]
    pub fn num_params(&self) -> usize {
        self.params.values().map(|p| p.tensor().num_elements()).sum()
    }

    /// Значения параметров по именам.
    #[must_use]
    pub fn params_dict(&self) -> BTreeMap<String, TensorData> {
        self.params
            .iter()
            .filter_map(|(name, p)| p.tensor().value().map(|v| (name.clone(), v)))
            .collect()
    }

    /// Загружает значения параметров по именам.
    ///
    /// # Errors
    /// `InvalidConfig`, если в словаре нет параметра слоя; `ShapeMismatch` при несовпадении формы.
    pub fn set_params_by_dict(&self, values: &BTreeMap<String, TensorData>) -> Result<()> {
        for (name, param) in &self.params {
            let value = values.get(name).ok_or_else(|| {
                GraphError::InvalidConfig(format!(
                    "слой '{}': нет значения для параметра '{name}'",
                    self.name
                ))
            })?;
            param.tensor().set_value(value.clone())?;
        }
        Ok(())
    }

    /// Описание слоя в формате топологии (ссылки списками).
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(self.record(false))
    }

    /// Атрибуты для сохранения модели (ссылки строками через запятую).
    #[must_use]
    pub fn persist_attrs(&self) -> Map<String, Value> {
        let mut record = self.record(true);
        if let Some(mask) = &self.mask {
            record.insert("mask".to_string(), Value::String(mask.clone()));
        }
        record
    }

    fn record(&self, joined: bool) -> Map<String, Value> {
        let refs = |layers: &[LayerRef]| -> Value {
            let names: Vec<String> = layers.iter().map(|l| l.name.clone()).collect();
            if joined {
                Value::String(names.join(","))
            } else {
                Value::from(names)
            }
        };
        let mut record = Map::new();
        record.insert("class".to_string(), Value::String(self.kind.clone()));
        record.insert("from".to_string(), refs(&self.sources));
        record.insert("n_out".to_string(), Value::from(self.n_out));
        if self.dropout > 0.0 {
            record.insert("dropout".to_string(), Value::from(self.dropout));
        }
        if let Some(target) = &self.target {
            record.insert("target".to_string(), Value::String(target.clone()));
        }
        if !self.aux.encoder.is_empty() {
            record.insert("encoder".to_string(), refs(&self.aux.encoder));
        }
        if !self.aux.base.is_empty() {
            record.insert("base".to_string(), refs(&self.aux.base));
        }
        if let Some(copy_input) = &self.aux.copy_input {
            record.insert("copy_input".to_string(), Value::String(copy_input.name.clone()));
        }
        if let Some(centroids) = &self.aux.centroids {
            record.insert("centroids".to_string(), Value::String(centroids.name.clone()));
        }
        for (key, value) in &self.attrs {
            record.entry(key.clone()).or_insert_with(|| value.clone());
        }
        record
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<&str> = self.sources.iter().map(|s| s.name.as_str()).collect();
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("variant", &self.variant)
            .field("n_out", &self.n_out)
            .field("sources", &sources)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
