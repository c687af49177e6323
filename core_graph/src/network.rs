// core_graph/src/network.rs

//! Контейнер сети: слои, целевые потоки, накопленная стоимость и
//! список обучаемых параметров.

use std::collections::BTreeMap;
use std::rc::Rc;

use burn::tensor::TensorData;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, info};
use utils_crate::config::{NetworkConfig, DEFAULT_TARGET};

use crate::accumulator::CostAccumulator;
use crate::error::{GraphError, Result};
use crate::layer::output::build_classifier;
use crate::layer::{AuxRefs, Layer, LayerArgs, LayerRef, ParamFactory, ParamTable, DATA_SOURCE, DEFAULT_OUTPUT};
use crate::registry::LayerRegistry;
use crate::resolver::Resolver;
use crate::targets::{OutputDims, TargetDim, TargetRegistry, NULL_TARGET};
use crate::tensor::{DType, GraphContext, SharedGraph, Tensor};
use crate::topology::{parse_json_text, Topology};

/// Зерно генератора параметров по умолчанию.
pub const DEFAULT_SEED: u64 = 42;

/// Параметры построения сети.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    /// Размерность входа; если `None`, берется из `n_out["data"]`.
    pub n_in: Option<usize>,
    /// Размерности целевых потоков.
    pub n_out: Option<OutputDims>,
    /// Политика маски, общая для всех слоев.
    pub mask: Option<String>,
    /// Разреженный вход.
    pub sparse_input: bool,
    /// Целевой поток по умолчанию.
    pub target: String,
    /// Строится ли сеть для обучения.
    pub train_flag: bool,
    /// Зерно генератора параметров.
    pub seed: u64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            n_in: None,
            n_out: None,
            mask: None,
            sparse_input: false,
            target: DEFAULT_TARGET.to_string(),
            train_flag: false,
            seed: DEFAULT_SEED,
        }
    }
}

impl BuildOptions {
    /// Параметры из конфигурации сети.
    #[must_use]
    pub fn from_config(config: &NetworkConfig) -> Self {
        let section = &config.network;
        let n_out = (!section.n_out.is_empty()).then(|| {
            section
                .n_out
                .iter()
                .map(|(name, [size, ndim])| (name.clone(), TargetDim::new(*size, *ndim)))
                .collect()
        });
        Self {
            n_in: section.n_in,
            n_out,
            mask: section.mask.clone(),
            sparse_input: section.sparse_input,
            target: section.target.clone(),
            train_flag: section.train_flag,
            seed: section.seed,
        }
    }
}

/// Выбор слоев для списка обучаемых параметров.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrainParamArgs {
    /// Скрытые слои (отсортированы).
    pub hidden_layer_selection: Vec<String>,
    /// Включать ли выходные слои.
    pub with_output: bool,
}

/// Параметры выходного классификатора помимо общих аргументов слоя.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassifierOptions {
    /// Функция потерь (по умолчанию `ce`).
    pub loss: Option<String>,
    /// Тип элементов целевого потока.
    pub dtype: DType,
    /// Количество символов.
    pub n_symbols: Option<usize>,
}

/// Построенная сеть.
pub struct Network {
    graph: SharedGraph,
    registry: LayerRegistry,
    n_in: usize,
    n_out: OutputDims,
    x: Tensor,
    i: Tensor,
    targets: TargetRegistry,
    data_source: LayerRef,
    hidden: IndexMap<String, LayerRef>,
    output: IndexMap<String, LayerRef>,
    accumulator: CostAccumulator,
    errors: IndexMap<String, Tensor>,
    train_param_args: TrainParamArgs,
    train_params_vars: Vec<Tensor>,
    recurrent: bool,
    json_content: String,
    update_step: u64,
    options: BuildOptions,
    params: Rc<ParamFactory>,
}

impl Network {
    /// Пустая сеть.
    ///
    /// `n_out` берется из базовой сети, если не задан. `n_in` берется из
    /// `n_out["data"]`, если не задан. Если `"data"` не объявлен, он добавляется
    /// как `(n_in, 2)`. С базовой сетью граф, входы и целевые потоки общие.
    ///
    /// # Errors
    /// `InvalidConfig`, если размерности не определяются или ранг `"data"` больше 2.
    pub fn new(n_in: Option<usize>, n_out: Option<OutputDims>, base: Option<&Self>) -> Result<Self> {
        let mut n_out = match (n_out, base) {
            (Some(n_out), _) => n_out,
            (None, Some(base)) => base.n_out.clone(),
            (None, None) => {
                return Err(GraphError::InvalidConfig(
                    "n_out не задан и базовой сети нет".to_string(),
                ))
            }
        };
        let n_in = match n_in {
            Some(n_in) => n_in,
            None => n_out.get(DATA_SOURCE).map(|d| d.size).ok_or_else(|| {
                GraphError::InvalidConfig("n_in не задан и n_out не содержит 'data'".to_string())
            })?,
        };
        let data_ndim = match n_out.get(DATA_SOURCE) {
            None => {
                n_out.insert(DATA_SOURCE.to_string(), TargetDim::new(n_in, 2));
                2
            }
            Some(dim) if dim.ndim <= 2 => dim.ndim,
            Some(dim) => {
                return Err(GraphError::InvalidConfig(format!(
                    "ранг потока 'data' должен быть от 0 до 2, получен {}",
                    dim.ndim
                )))
            }
        };

        let (graph, x, i, targets, registry) = match base {
            Some(base) => (
                Rc::clone(&base.graph),
                base.x.clone(),
                base.i.clone(),
                base.targets.clone(),
                base.registry.clone(),
            ),
            None => {
                let graph = GraphContext::new_shared();
                let x = Tensor::input(&graph, "x", DType::Float32, data_ndim + 1);
                let i = Tensor::input(&graph, "i", DType::Int8, 2);
                let targets = TargetRegistry::new(Rc::clone(&graph), &x, &i, n_in);
                (graph, x, i, targets, LayerRegistry::with_builtin_kinds())
            }
        };
        let options = base.map_or_else(BuildOptions::default, |b| b.options.clone());
        let data_source = Rc::new(Layer::source(&graph, n_in, &x, &i, options.sparse_input));
        let params = Rc::new(ParamFactory::new(Rc::clone(&graph), options.seed));

        Ok(Self {
            accumulator: CostAccumulator::new(&graph),
            graph,
            registry,
            n_in,
            n_out,
            x,
            i,
            targets,
            data_source,
            hidden: IndexMap::new(),
            output: IndexMap::new(),
            errors: IndexMap::new(),
            train_param_args: TrainParamArgs::default(),
            train_params_vars: Vec::new(),
            recurrent: false,
            json_content: "{}".to_string(),
            update_step: 0,
            options,
            params,
        })
    }

    /// Строит сеть по JSON-топологии.
    ///
    /// # Errors
    /// Любая ошибка построения; частично построенная сеть не возвращается.
    pub fn from_json(value: &Value, options: &BuildOptions, registry: &LayerRegistry) -> Result<Self> {
        let topology = Topology::from_value(value)?;
        let mut network = Self::new(options.n_in, options.n_out.clone(), None)?;
        network.configure(options, registry);
        network.json_content = value.to_string();
        network.build(&topology, false)?;
        Ok(network)
    }

    /// Строит сеть по тексту JSON-топологии.
    ///
    /// # Errors
    /// `InvalidTopologySyntax` при ошибке разбора, иначе как [`Self::from_json`].
    pub fn from_json_str(content: &str, options: &BuildOptions, registry: &LayerRegistry) -> Result<Self> {
        Self::from_json(&parse_json_text(content)?, options, registry)
    }

    /// Строит сеть по конфигурации: размерности, опции и топология
    /// (встроенная строкой или из файла).
    ///
    /// # Errors
    /// `InvalidConfig`, если топология не задана; `Utils`, если файл топологии не читается.
    pub fn from_config(config: &NetworkConfig, registry: &LayerRegistry) -> Result<Self> {
        let content = config.topology_text()?.ok_or_else(|| {
            GraphError::InvalidConfig(
                "в конфигурации не задана топология (topology_json или topology_file)".to_string(),
            )
        })?;
        Self::from_json_str(&content, &BuildOptions::from_config(config), registry)
    }

    /// Строит сеть по уже разобранной топологии.
    ///
    /// Слой без маски сети сохраняет собственную маску из описания.
    ///
    /// # Errors
    /// Как [`Self::from_json`].
    pub fn from_topology(topology: &Topology, options: &BuildOptions, registry: &LayerRegistry) -> Result<Self> {
        let mut network = Self::new(options.n_in, options.n_out.clone(), None)?;
        network.configure(options, registry);
        network.build(topology, true)?;
        network.json_content = network.to_json();
        Ok(network)
    }

    /// Производная сеть с той же топологией, общим графом, входами и целевыми потоками.
    ///
    /// С `share_params` каждый параметр берется у базовой сети и не обучается.
    ///
    /// # Errors
    /// `ShareParamsViolation`, если при общих параметрах появились обучаемые.
    pub fn from_base_network(base: &Self, share_params: bool) -> Result<Self> {
        let mut network = Self::new(None, None, Some(base))?;
        if share_params {
            network.params = Rc::new(ParamFactory::sharing(
                Rc::clone(&network.graph),
                network.options.seed,
                Rc::new(base.param_table()),
            ));
        }
        let content = base.to_json_content();
        network.json_content = content.to_string();
        network.build(&Topology::from_value(&content)?, false)?;
        if share_params {
            let count = network.get_all_params_vars()?.len();
            if count > 0 {
                return Err(GraphError::ShareParamsViolation { count });
            }
        }
        info!(
            "Производная сеть построена (общие параметры: {share_params}), слоев: {}",
            network.hidden.len() + network.output.len()
        );
        Ok(network)
    }

    fn configure(&mut self, options: &BuildOptions, registry: &LayerRegistry) {
        self.options = options.clone();
        self.registry = registry.clone();
        self.recurrent = false;
        self.data_source = Rc::new(Layer::source(
            &self.graph,
            self.n_in,
            &self.x,
            &self.i,
            options.sparse_input,
        ));
        self.params = Rc::new(ParamFactory::new(Rc::clone(&self.graph), options.seed));
    }

    fn build(&mut self, topology: &Topology, layer_masks: bool) -> Result<()> {
        Resolver::new(self, topology).with_layer_masks(layer_masks).build()?;
        info!(
            "Сеть построена: скрытых слоев {}, выходных {}, параметров {}",
            self.hidden.len(),
            self.output.len(),
            self.num_params()
        );
        Ok(())
    }

    /// Регистрирует целевой поток.
    ///
    /// # Errors
    /// `UnknownTarget`, если поток не объявлен.
    pub fn use_target(&mut self, name: &str, dtype: DType) -> Result<()> {
        self.targets.use_target(name, dtype, &mut self.n_out)
    }

    /// Индекс целевого потока. Для `"null"` это индекс сырого входа.
    ///
    /// # Errors
    /// `UnknownTarget`, если поток не зарегистрирован.
    pub fn target_index(&self, name: &str) -> Result<Tensor> {
        if name == NULL_TARGET {
            return Ok(self.i.clone());
        }
        self.targets
            .index(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownTarget(name.to_string()))
    }

    /// Добавляет построенный слой: `"output"` в выходные, остальные в скрытые.
    ///
    /// # Errors
    /// `MissingName` для безымянного слоя, `MultiplePriors` от накопителя.
    pub fn add_layer(&mut self, layer: Layer) -> Result<LayerRef> {
        if layer.name().is_empty() {
            return Err(GraphError::MissingName);
        }
        self.accumulator.add_layer(&layer)?;
        let layer = Rc::new(layer);
        let name = layer.name().to_string();
        debug!(layer = %name, kind = layer.kind(), n_out = layer.n_out(), "Слой добавлен");
        if name == DEFAULT_OUTPUT {
            self.output.insert(name, Rc::clone(&layer));
            self.declare_train_params(None, None)?;
        } else {
            self.hidden.insert(name, Rc::clone(&layer));
        }
        Ok(layer)
    }

    /// Строит выходной классификатор и добавляет его в сеть. Возвращает индекс слоя.
    ///
    /// Имя по умолчанию `"output"`, целевой поток `"classes"`, потери `"ce"`.
    /// Для потерь `ctc` количество классов целевого потока увеличивается на один.
    ///
    /// # Errors
    /// `UnknownTarget`, `InvalidConfig` (нет размерности выхода), `MultiplePriors`.
    pub fn make_classifier(&mut self, kind: &str, mut args: LayerArgs, options: ClassifierOptions) -> Result<Tensor> {
        if args.name.is_empty() {
            args.name = DEFAULT_OUTPUT.to_string();
        }
        let target = args.target.clone().unwrap_or_else(|| DEFAULT_TARGET.to_string());
        let loss = options.loss.unwrap_or_else(|| "ce".to_string());
        let has_target = target != NULL_TARGET;

        let y = if has_target {
            self.use_target(&target, options.dtype)?;
            self.targets.data(&target).cloned()
        } else {
            None
        };
        if loss == "ctc" {
            if let Some(dim) = self.n_out.get_mut(&target) {
                dim.size += 1;
            }
        }
        let n_out = args
            .n_out
            .or(options.n_symbols)
            .or_else(|| self.n_out.get(&target).filter(|_| has_target).map(|d| d.size))
            .ok_or_else(|| {
                GraphError::InvalidConfig(format!(
                    "классификатор '{}': не задан n_out и нет целевого потока",
                    args.name
                ))
            })?;
        args.target = Some(target);

        let layer = build_classifier(kind, &args, &loss, y.as_ref(), n_out)
            .with_attr("dtype", options.dtype.as_str());
        self.accumulator.add_layer(&layer)?;
        if let Some(errors) = layer.errors().filter(|_| has_target) {
            self.errors.insert(args.name.clone(), errors.clone());
        }
        let index = layer.index().clone();
        debug!(layer = %args.name, %loss, n_out, "Классификатор добавлен");
        self.output.insert(args.name, Rc::new(layer));
        self.declare_train_params(None, None)?;
        Ok(index)
    }

    /// Объявляет список обучаемых параметров. `None` означает все скрытые слои
    /// и включение выходных.
    ///
    /// # Errors
    /// `UndefinedLayer`, если в выборке есть неизвестный слой.
    pub fn declare_train_params(&mut self, hidden_layer_selection: Option<Vec<String>>, with_output: Option<bool>) -> Result<()> {
        let mut selection = hidden_layer_selection.unwrap_or_else(|| self.hidden.keys().cloned().collect());
        selection.sort();
        let args = TrainParamArgs {
            hidden_layer_selection: selection,
            with_output: with_output.unwrap_or(true),
        };
        self.train_params_vars = self.get_params_vars(&args.hidden_layer_selection, args.with_output)?;
        self.train_param_args = args;
        Ok(())
    }

    /// Обучаемые переменные: скрытые слои в отсортированном порядке, затем
    /// выходные в порядке добавления.
    ///
    /// # Errors
    /// `UndefinedLayer`, если в выборке есть неизвестный слой.
    pub fn get_params_vars(&self, hidden_layer_selection: &[String], with_output: bool) -> Result<Vec<Tensor>> {
        let mut selection: Vec<&String> = hidden_layer_selection.iter().collect();
        selection.sort();
        let mut params = Vec::new();
        for name in selection {
            let layer = self
                .hidden
                .get(name)
                .ok_or_else(|| GraphError::UndefinedLayer(name.clone()))?;
            params.extend(layer.params_vars());
        }
        if with_output {
            for layer in self.output.values() {
                params.extend(layer.params_vars());
            }
        }
        Ok(params)
    }

    /// Все обучаемые переменные сети.
    ///
    /// # Errors
    /// Не возвращает ошибок для согласованной сети.
    pub fn get_all_params_vars(&self) -> Result<Vec<Tensor>> {
        let hidden: Vec<String> = self.hidden.keys().cloned().collect();
        self.get_params_vars(&hidden, true)
    }

    /// Суммарное количество элементов во всех параметрах.
    #[must_use]
    pub fn num_params(&self) -> usize {
        self.hidden
            .values()
            .chain(self.output.values())
            .map(|l| l.num_params())
            .sum()
    }

    /// Значения параметров: слой -> параметр -> значение.
    #[must_use]
    pub fn get_params_dict(&self) -> BTreeMap<String, BTreeMap<String, TensorData>> {
        self.output
            .iter()
            .chain(&self.hidden)
            .map(|(name, layer)| (name.clone(), layer.params_dict()))
            .collect()
    }

    /// Загружает значения параметров всех слоев.
    ///
    /// # Errors
    /// `UndefinedLayer`, если для слоя нет записи; `ShapeMismatch` при несовпадении формы.
    pub fn set_params_by_dict(&self, params: &BTreeMap<String, BTreeMap<String, TensorData>>) -> Result<()> {
        for (name, layer) in self.output.iter().chain(&self.hidden) {
            let values = params
                .get(name)
                .ok_or_else(|| GraphError::UndefinedLayer(name.clone()))?;
            layer.set_params_by_dict(values)?;
        }
        Ok(())
    }

    /// Таблица параметров для производной сети.
    fn param_table(&self) -> ParamTable {
        self.output
            .iter()
            .chain(&self.hidden)
            .map(|(name, layer)| {
                let params = layer
                    .params()
                    .iter()
                    .map(|(p, param)| (p.clone(), param.tensor().clone()))
                    .collect();
                (name.clone(), params)
            })
            .collect()
    }

    /// Целевая функция: суммарная стоимость плюс ограничения.
    #[must_use]
    pub fn get_objective(&self) -> Tensor {
        self.accumulator.objective()
    }

    /// Топология сети: выходные, затем скрытые слои.
    #[must_use]
    pub fn to_json_content(&self) -> Value {
        let mut content = Map::new();
        for (name, layer) in self.output.iter().chain(&self.hidden) {
            content.insert(name.clone(), layer.to_json());
        }
        Value::Object(content)
    }

    /// Топология сети строкой JSON с отсортированными ключами.
    #[must_use]
    pub fn to_json(&self) -> String {
        self.to_json_content().to_string()
    }

    /// Слой по имени (скрытый или выходной).
    #[must_use]
    pub fn get_layer(&self, name: &str) -> Option<&LayerRef> {
        self.hidden.get(name).or_else(|| self.output.get(name))
    }

    pub(crate) fn mark_recurrent(&mut self) {
        self.recurrent = true;
    }

    pub(crate) fn layer_args(&self, name: &str, index: Tensor) -> LayerArgs {
        LayerArgs {
            name: name.to_string(),
            sources: Vec::new(),
            aux: AuxRefs::default(),
            index,
            dropout: 0.0,
            train_flag: self.options.train_flag,
            mask: self.options.mask.clone(),
            target: None,
            n_out: None,
            config: Map::new(),
            graph: Rc::clone(&self.graph),
            params: Rc::clone(&self.params),
        }
    }

    /// Разделяемый граф.
    #[must_use]
    pub const fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// Реестр видов слоев.
    #[must_use]
    pub const fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    /// Слой сырого входа.
    #[must_use]
    pub fn data_source(&self) -> LayerRef {
        Rc::clone(&self.data_source)
    }

    /// Размерность входа.
    #[must_use]
    pub const fn n_in(&self) -> usize {
        self.n_in
    }

    /// Размерности целевых потоков.
    #[must_use]
    pub const fn n_out(&self) -> &OutputDims {
        &self.n_out
    }

    /// Сырой вход.
    #[must_use]
    pub const fn x(&self) -> &Tensor {
        &self.x
    }

    /// Индекс сырого входа.
    #[must_use]
    pub const fn i(&self) -> &Tensor {
        &self.i
    }

    /// Реестр целевых потоков.
    #[must_use]
    pub const fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    /// Скрытые слои в порядке добавления.
    #[must_use]
    pub const fn hidden(&self) -> &IndexMap<String, LayerRef> {
        &self.hidden
    }

    /// Выходные слои в порядке добавления.
    #[must_use]
    pub const fn output(&self) -> &IndexMap<String, LayerRef> {
        &self.output
    }

    /// Накопленная стоимость и ограничения.
    #[must_use]
    pub const fn accumulator(&self) -> &CostAccumulator {
        &self.accumulator
    }

    /// Суммарная стоимость.
    #[must_use]
    pub const fn total_cost(&self) -> &Tensor {
        self.accumulator.total_cost()
    }

    /// Сумма ограничений.
    #[must_use]
    pub const fn constraints(&self) -> &Tensor {
        self.accumulator.constraints()
    }

    /// Стоимость по слоям.
    #[must_use]
    pub const fn costs(&self) -> &IndexMap<String, Tensor> {
        self.accumulator.costs()
    }

    /// Переопределенные градиенты.
    #[must_use]
    pub const fn known_grads(&self) -> &IndexMap<Tensor, Tensor> {
        self.accumulator.known_grads()
    }

    /// Априорное распределение CTC.
    #[must_use]
    pub const fn ctc_priors(&self) -> Option<&Tensor> {
        self.accumulator.ctc_priors()
    }

    /// Ошибки по выходным слоям.
    #[must_use]
    pub const fn errors(&self) -> &IndexMap<String, Tensor> {
        &self.errors
    }

    /// Последняя объявленная выборка обучаемых параметров.
    #[must_use]
    pub const fn train_param_args(&self) -> &TrainParamArgs {
        &self.train_param_args
    }

    /// Последний объявленный список обучаемых переменных.
    #[must_use]
    pub fn train_params_vars(&self) -> &[Tensor] {
        &self.train_params_vars
    }

    /// Есть ли в сети рекуррентные слои.
    #[must_use]
    pub const fn is_recurrent(&self) -> bool {
        self.recurrent
    }

    /// Исходная топология, по которой построена сеть.
    #[must_use]
    pub fn json_content(&self) -> &str {
        &self.json_content
    }

    /// Параметры построения.
    #[must_use]
    pub const fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Номер шага обновления.
    #[must_use]
    pub const fn update_step(&self) -> u64 {
        self.update_step
    }

    /// Задает номер шага обновления.
    pub fn set_update_step(&mut self, step: u64) {
        self.update_step = step;
    }

    /// Задает сохраненную топологию.
    pub fn set_json_content(&mut self, content: String) {
        self.json_content = content;
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("n_in", &self.n_in)
            .field("n_out", &self.n_out)
            .field("hidden", &self.hidden.keys().collect::<Vec<_>>())
            .field("output", &self.output.keys().collect::<Vec<_>>())
            .field("recurrent", &self.recurrent)
            .finish_non_exhaustive()
    }
}
