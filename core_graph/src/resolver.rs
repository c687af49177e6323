// core_graph/src/resolver.rs

//! Рекурсивное разрешение ссылок между слоями.
//!
//! Слои строятся по требованию: ссылка на еще не построенный слой
//! разрешается рекурсивно, построенный слой возвращается из сети.
//! Имя, повторно встреченное во время собственного разрешения, означает цикл.

use tracing::{debug, warn};

use crate::error::{GraphError, Result};
use crate::layer::{LayerRef, DATA_SOURCE, DEFAULT_OUTPUT};
use crate::network::{ClassifierOptions, Network};
use crate::targets::NULL_TARGET;
use crate::tensor::Tensor;
use crate::topology::{LayerSpec, RefList, Topology};

/// Виды, которые строятся как выходные классификаторы.
const CLASSIFIER_KINDS: &[&str] = &["softmax", "decoder"];

/// Резолвер топологии, строящий слои в сети.
pub struct Resolver<'n, 't> {
    network: &'n mut Network,
    topology: &'t Topology,
    resolving: Vec<String>,
    layer_masks: bool,
}

impl<'n, 't> Resolver<'n, 't> {
    /// Резолвер для сети и топологии.
    pub fn new(network: &'n mut Network, topology: &'t Topology) -> Self {
        Self {
            network,
            topology,
            resolving: Vec::new(),
            layer_masks: false,
        }
    }

    /// Разрешает слою собственную маску из описания, если у сети маски нет.
    /// Используется при восстановлении сохраненной модели; для JSON-топологии
    /// маска слоя всегда совпадает с маской сети.
    #[must_use]
    pub fn with_layer_masks(mut self, keep: bool) -> Self {
        self.layer_masks = keep;
        self
    }

    /// Строит все слои, достижимые из выходов.
    ///
    /// Корнями служат слой `"output"` и все слои с явным `target`. Остальные
    /// слои строятся, только если на них есть ссылка.
    ///
    /// # Errors
    /// Первая ошибка построения любого слоя.
    pub fn build(&mut self) -> Result<()> {
        let default_target = self.network.options().target.clone();
        let topology = self.topology;
        for (name, spec) in topology.iter() {
            if self.network.get_layer(name).is_some() {
                continue;
            }
            if name == DATA_SOURCE {
                warn!("Слой с именем 'data' игнорируется: имя зарезервировано");
                continue;
            }
            if name != DEFAULT_OUTPUT && spec.target.is_none() {
                continue;
            }
            let target = spec.target.clone().unwrap_or_else(|| default_target.clone());
            self.network.use_target(&target, spec.dtype()?)?;
            let index = self.network.target_index(&target)?;
            self.resolve(name, &target, &index)?;
        }
        Ok(())
    }

    /// Разрешает слой по имени и возвращает его индекс.
    ///
    /// `"data"` всегда означает сырой вход сети с индексом `i`, запись
    /// `"data"` в топологии не строится.
    ///
    /// # Errors
    /// `CyclicReference` при повторном входе в разрешаемый слой,
    /// `UndefinedLayer`, если имени нет в топологии, и любые ошибки построения.
    pub fn resolve(&mut self, name: &str, target: &str, index: &Tensor) -> Result<Tensor> {
        if name == DATA_SOURCE {
            return Ok(self.network.i().clone());
        }
        if let Some(layer) = self.network.get_layer(name) {
            return Ok(layer.index().clone());
        }
        if self.resolving.iter().any(|n| n == name) {
            let mut chain = self.resolving.clone();
            chain.push(name.to_string());
            return Err(GraphError::CyclicReference {
                layer: name.to_string(),
                chain,
            });
        }
        let topology = self.topology;
        let spec = topology
            .get(name)
            .ok_or_else(|| GraphError::UndefinedLayer(name.to_string()))?;
        self.resolving.push(name.to_string());
        let result = self.construct(name, spec, target, index);
        self.resolving.pop();
        result
    }

    fn construct(&mut self, name: &str, spec: &LayerSpec, caller_target: &str, caller_index: &Tensor) -> Result<Tensor> {
        debug!(layer = name, class = %spec.class, "Разрешение слоя");
        let target = spec.target.as_deref().unwrap_or(caller_target).to_string();
        let dtype = spec.dtype()?;
        self.network.use_target(&target, dtype)?;

        let mut index = caller_index.clone();
        let mut sources = Vec::new();
        match &spec.from {
            None => {
                sources.push(self.network.data_source());
                index = self.network.i().clone();
            }
            Some(refs) => {
                for prev in refs.names() {
                    if prev != NULL_TARGET && !prev.is_empty() {
                        index = self.resolve(prev, &target, &index)?;
                        sources.push(self.layer(prev)?);
                    }
                }
            }
        }

        let mut args = self.network.layer_args(name, index.clone());
        if let Some(refs) = &spec.encoder {
            args.aux.encoder = self.resolve_list(refs, &target, &index)?;
        }
        if let Some(refs) = &spec.base {
            args.aux.base = self.resolve_list(refs, &target, &index)?;
        }
        if let Some(refs) = &spec.copy_input {
            let prev = refs.single("copy_input", name)?;
            index = self.resolve(prev, &target, &index)?;
            args.aux.copy_input = Some(self.layer(prev)?);
        }
        if let Some(refs) = &spec.centroids {
            let prev = refs.single("centroids", name)?;
            index = self.resolve(prev, &target, &index)?;
            args.aux.centroids = Some(self.layer(prev)?);
        }
        if spec.encoder.is_some() {
            index = caller_index.clone();
        }
        if let Some(own_target) = &spec.target {
            index = self.network.target_index(own_target)?;
        }

        args.sources = sources;
        args.index = index;
        args.dropout = spec.dropout.unwrap_or(0.0);
        args.mask = match &self.network.options().mask {
            Some(mask) => Some(mask.clone()),
            None if self.layer_masks => spec.mask.clone(),
            None => None,
        };
        args.target = spec.target.clone();
        args.n_out = spec.n_out;
        args.config = spec.extra.clone();

        if CLASSIFIER_KINDS.contains(&spec.class.as_str()) {
            let is_ctc = spec.loss.as_deref() == Some("ctc");
            args.index = if is_ctc || target == NULL_TARGET {
                self.network.i().clone()
            } else {
                self.network.target_index(&target)?
            };
            args.target = Some(target);
            let options = ClassifierOptions {
                loss: spec.loss.clone(),
                dtype,
                n_symbols: spec.n_symbols,
            };
            return self.network.make_classifier(&spec.class, args, options);
        }

        let kind = self.network.registry().resolve(&spec.class)?;
        if kind.recurrent() {
            self.network.mark_recurrent();
        }
        let layer = kind.construct(&args)?;
        Ok(self.network.add_layer(layer)?.index().clone())
    }

    fn resolve_list(&mut self, refs: &RefList, target: &str, index: &Tensor) -> Result<Vec<LayerRef>> {
        let mut layers = Vec::new();
        for prev in refs.names() {
            if prev == NULL_TARGET || prev.is_empty() {
                continue;
            }
            self.resolve(prev, target, index)?;
            layers.push(self.layer(prev)?);
        }
        Ok(layers)
    }

    fn layer(&self, name: &str) -> Result<LayerRef> {
        if name == DATA_SOURCE {
            return Ok(self.network.data_source());
        }
        self.network
            .get_layer(name)
            .cloned()
            .ok_or_else(|| GraphError::UndefinedLayer(name.to_string()))
    }
}
