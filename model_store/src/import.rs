use std::path::Path;

use core_graph::registry::STRUCTURAL_KEYS;
use core_graph::targets::OutputDims;
use core_graph::{BuildOptions, LayerRegistry, LayerSpec, Network, RefList, TargetDim, Topology};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::ModelStoreError;
use crate::export::keys;
use crate::store::ModelStore;

/// Ранг потока, если `n_out/dim` отсутствует.
const LEGACY_NDIM: usize = 1;

/// Поток, к которому относится одиночное число `n_out` старых моделей.
const LEGACY_TARGET: &str = "classes";

/// Строит сеть по сохраненной модели.
///
/// Размерности берутся из модели; расхождение с `options.n_in`/`options.n_out`
/// только записывается в лог. Атрибуты каждого слоя превращаются в описание
/// слоя, после чего работает обычный резолвер топологии.
///
/// # Errors
/// `MissingAttribute`/`InvalidAttribute` для некорректной модели и `Graph` для
/// ошибок построения.
pub fn network_from_store(store: &ModelStore, options: &BuildOptions, registry: &LayerRegistry) -> Result<Network, ModelStoreError> {
    let n_in = attr_usize(store, keys::N_IN)?;
    let n_out = read_n_out(store)?;
    if let Some(requested) = options.n_in.filter(|v| *v != n_in) {
        warn!("n_in модели ({n_in}) отличается от запрошенного ({requested})");
    }
    if let Some(requested) = options.n_out.as_ref().filter(|v| **v != n_out) {
        warn!("n_out модели {n_out:?} отличается от запрошенного {requested:?}");
    }

    let target = match store.attr(keys::N_OUT_TARGET) {
        Some(value) => as_str(value, keys::N_OUT_TARGET)?.to_string(),
        None => options.target.clone(),
    };
    let dtype = store
        .attr(keys::N_OUT_DTYPE)
        .map(|v| as_str(v, keys::N_OUT_DTYPE).map(str::to_string))
        .transpose()?;

    let mut topology = Topology::new();
    for (name, group) in store.groups() {
        let mut spec = layer_spec(name, &group.attrs, options.train_flag, registry)?;
        if spec.dtype.is_none() {
            spec.dtype.clone_from(&dtype);
        }
        topology.insert(name.clone(), spec);
    }

    let build_options = BuildOptions {
        n_in: Some(n_in),
        n_out: Some(n_out),
        target,
        ..options.clone()
    };
    let mut network = Network::from_topology(&topology, &build_options, registry)?;
    if let Some(json) = store.attr(keys::JSON).and_then(Value::as_str) {
        network.set_json_content(json.to_string());
    }
    if let Some(step) = store.attr(keys::UPDATE_STEP).and_then(Value::as_u64) {
        network.set_update_step(step);
    }
    info!(
        "Сеть восстановлена из модели: скрытых слоев {}, выходных {}",
        network.hidden().len(),
        network.output().len()
    );
    Ok(network)
}

/// Загружает значения параметров из модели. Возвращает эпоху модели.
///
/// Отсутствующий в модели скрытый слой пропускается с предупреждением,
/// отсутствующий выходной слой является ошибкой.
///
/// # Errors
/// `MissingLayer`, `MissingAttribute` (нет эпохи) или `Graph` при несовпадении форм.
pub fn load_params(network: &Network, store: &ModelStore) -> Result<u64, ModelStoreError> {
    for (name, layer) in network.hidden() {
        match store.group(name) {
            Some(group) => layer.set_params_by_dict(&group.params)?,
            None => warn!("Не удалось загрузить слой '{name}': его нет в модели"),
        }
    }
    for (name, layer) in network.output() {
        let group = store
            .group(name)
            .ok_or_else(|| ModelStoreError::MissingLayer(name.clone()))?;
        layer.set_params_by_dict(&group.params)?;
    }
    epoch_from_store(store)
}

/// Последняя эпоха обучения модели.
///
/// # Errors
/// `MissingAttribute` или `InvalidAttribute`.
pub fn epoch_from_store(store: &ModelStore) -> Result<u64, ModelStoreError> {
    store
        .attr(keys::EPOCH)
        .ok_or_else(|| missing("model", keys::EPOCH))
        .and_then(|v| as_u64(v, keys::EPOCH))
}

/// Последняя эпоха обучения модели в файле. Читается только заголовок.
///
/// # Errors
/// `Io`, `Codec`, `MissingAttribute` или `InvalidAttribute`.
pub fn epoch_from_file(path: &Path) -> Result<u64, ModelStoreError> {
    let attrs = ModelStore::read_file_attrs(path)?;
    attrs
        .get(keys::EPOCH)
        .ok_or_else(|| missing(&path.display().to_string(), keys::EPOCH))
        .and_then(|v| as_u64(v, keys::EPOCH))
}

/// Размерности потоков. Старые модели хранят в `n_out` одно число:
/// оно означает поток `"classes"`.
fn read_n_out(store: &ModelStore) -> Result<OutputDims, ModelStoreError> {
    let value = store
        .attr(keys::N_OUT)
        .ok_or_else(|| missing("model", keys::N_OUT))?;
    let dims = store.attr(keys::N_OUT_DIM).and_then(Value::as_object);
    match value {
        Value::Object(sizes) => sizes
            .iter()
            .map(|(name, size)| {
                let ndim = match dims.and_then(|d| d.get(name)) {
                    Some(ndim) => usize_of(ndim, keys::N_OUT_DIM)?,
                    None => LEGACY_NDIM,
                };
                Ok((name.clone(), TargetDim::new(usize_of(size, keys::N_OUT)?, ndim)))
            })
            .collect(),
        other => {
            let size = usize_of(other, keys::N_OUT)?;
            Ok(OutputDims::from([(
                LEGACY_TARGET.to_string(),
                TargetDim::new(size, LEGACY_NDIM),
            )]))
        }
    }
}

/// Описание слоя по сохраненным атрибутам.
fn layer_spec(name: &str, attrs: &Map<String, Value>, train_flag: bool, registry: &LayerRegistry) -> Result<LayerSpec, ModelStoreError> {
    let class = attrs
        .get("class")
        .ok_or_else(|| missing(name, "class"))
        .and_then(|v| as_str(v, "class"))?;
    let mut spec = LayerSpec::of_class(class);
    let text = |key: &str| text_attr(attrs, key);

    spec.from = text("from")?.map(RefList::from_comma_joined);
    spec.encoder = text("encoder")?.map(RefList::from_comma_joined);
    spec.base = text("base")?.map(RefList::from_comma_joined);
    spec.copy_input = text("copy_input")?.map(RefList::from);
    spec.centroids = text("centroids")?.map(RefList::from);
    spec.target = text("target")?.map(str::to_string);
    spec.mask = text("mask")?.map(str::to_string);
    spec.dtype = text("dtype")?.map(str::to_string);
    spec.loss = text("loss")?.map(str::to_string);
    spec.n_out = attrs.get("n_out").map(|v| usize_of(v, "n_out")).transpose()?;
    if train_flag {
        spec.dropout = attrs.get("dropout").and_then(Value::as_f64);
    }

    let is_classifier = class == "softmax" || class == "decoder";
    let accepted = if is_classifier {
        None
    } else {
        Some(registry.accepted_keys(class)?)
    };
    for (key, value) in attrs {
        if STRUCTURAL_KEYS.contains(&key.as_str()) || key == "loss" {
            continue;
        }
        match &accepted {
            Some(allowed) if !allowed.contains(key.as_str()) => {
                debug!(layer = name, key = %key, "Атрибут не принимается видом слоя и пропущен");
            }
            _ => {
                spec.extra.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(spec)
}

fn text_attr<'a>(attrs: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>, ModelStoreError> {
    attrs.get(key).map(|v| as_str(v, key)).transpose()
}

fn attr_usize(store: &ModelStore, key: &str) -> Result<usize, ModelStoreError> {
    store
        .attr(key)
        .ok_or_else(|| missing("model", key))
        .and_then(|v| usize_of(v, key))
}

fn missing(scope: &str, key: &str) -> ModelStoreError {
    ModelStoreError::MissingAttribute {
        scope: scope.to_string(),
        key: key.to_string(),
    }
}

fn as_str<'a>(value: &'a Value, key: &str) -> Result<&'a str, ModelStoreError> {
    value.as_str().ok_or_else(|| ModelStoreError::InvalidAttribute {
        key: key.to_string(),
        message: format!("ожидалась строка, получено {value}"),
    })
}

fn as_u64(value: &Value, key: &str) -> Result<u64, ModelStoreError> {
    value.as_u64().ok_or_else(|| ModelStoreError::InvalidAttribute {
        key: key.to_string(),
        message: format!("ожидалось неотрицательное целое, получено {value}"),
    })
}

fn usize_of(value: &Value, key: &str) -> Result<usize, ModelStoreError> {
    let raw = as_u64(value, key)?;
    usize::try_from(raw).map_err(|e| ModelStoreError::InvalidAttribute {
        key: key.to_string(),
        message: e.to_string(),
    })
}
