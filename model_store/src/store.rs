//! Контейнер сохраненной модели и его файловый формат.
//!
//! Модель хранится в одном файле safetensors. Атрибуты модели записываются
//! в метаданные заголовка под ключом `__model__` (JSON), атрибуты слоя под
//! ключом `layer/<имя>`. Параметры записываются как f32-тензоры с именами
//! `<слой>/<параметр>`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use burn::tensor::TensorData;
use safetensors::tensor::{Dtype, SafeTensors, TensorView};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::ModelStoreError;

/// Ключ метаданных с атрибутами модели.
pub const MODEL_METADATA_KEY: &str = "__model__";

/// Префикс ключей метаданных с атрибутами слоев.
pub const LAYER_METADATA_PREFIX: &str = "layer/";

/// Сохраненный слой: атрибуты и значения параметров.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerGroup {
    /// Атрибуты слоя (`class`, `from`, `n_out`, ...).
    pub attrs: Map<String, Value>,
    /// Значения параметров по именам.
    pub params: BTreeMap<String, TensorData>,
}

/// Сохраненная модель: атрибуты сети и группы слоев.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelStore {
    attrs: BTreeMap<String, Value>,
    groups: BTreeMap<String, LayerGroup>,
}

impl ModelStore {
    /// Пустой контейнер.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Атрибут модели.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Все атрибуты модели.
    #[must_use]
    pub const fn attrs(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    /// Задает атрибут модели.
    pub fn set_attr(&mut self, key: &str, value: impl Into<Value>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    /// Группа слоя.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&LayerGroup> {
        self.groups.get(name)
    }

    /// Все группы в отсортированном по имени порядке.
    #[must_use]
    pub const fn groups(&self) -> &BTreeMap<String, LayerGroup> {
        &self.groups
    }

    /// Добавляет или заменяет группу слоя.
    pub fn insert_group(&mut self, name: &str, group: LayerGroup) {
        self.groups.insert(name.to_string(), group);
    }

    /// Записывает модель в файл safetensors.
    ///
    /// # Errors
    /// `Codec`, если атрибуты или тензоры не кодируются; `Io` при ошибке записи.
    pub fn save_file(&self, path: &Path) -> Result<(), ModelStoreError> {
        let mut metadata = HashMap::new();
        let model_attrs = serde_json::to_string(&self.attrs).map_err(|e| ModelStoreError::codec(path, e))?;
        metadata.insert(MODEL_METADATA_KEY.to_string(), model_attrs);

        let mut buffers: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();
        for (name, group) in &self.groups {
            let attrs = serde_json::to_string(&group.attrs).map_err(|e| ModelStoreError::codec(path, e))?;
            metadata.insert(format!("{LAYER_METADATA_PREFIX}{name}"), attrs);
            for (param, data) in &group.params {
                let key = format!("{name}/{param}");
                let values = data.to_vec::<f32>().map_err(|e| ModelStoreError::InvalidAttribute {
                    key: key.clone(),
                    message: format!("{e:?}"),
                })?;
                let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
                buffers.push((key, data.shape.clone(), bytes));
            }
        }

        let mut views = Vec::with_capacity(buffers.len());
        for (key, shape, bytes) in &buffers {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytes).map_err(|e| ModelStoreError::codec(path, e))?;
            views.push((key.as_str(), view));
        }
        let serialized = safetensors::serialize(views, &Some(metadata)).map_err(|e| ModelStoreError::codec(path, e))?;
        std::fs::write(path, serialized).map_err(|e| ModelStoreError::io(path, e))?;
        info!(
            "Модель сохранена в {}: слоев {}, тензоров {}",
            path.display(),
            self.groups.len(),
            buffers.len()
        );
        Ok(())
    }

    /// Читает модель из файла safetensors.
    ///
    /// # Errors
    /// `Io` при ошибке чтения, `Codec` при некорректном формате.
    pub fn load_file(path: &Path) -> Result<Self, ModelStoreError> {
        let buffer = std::fs::read(path).map_err(|e| ModelStoreError::io(path, e))?;
        let (_, metadata) = SafeTensors::read_metadata(&buffer).map_err(|e| ModelStoreError::codec(path, e))?;
        let tensors = SafeTensors::deserialize(&buffer).map_err(|e| ModelStoreError::codec(path, e))?;

        let mut store = Self::new();
        let entries = metadata.metadata().clone().unwrap_or_default();
        for (key, text) in &entries {
            let value: Value = serde_json::from_str(text).map_err(|e| ModelStoreError::codec(path, e))?;
            if key == MODEL_METADATA_KEY {
                if let Value::Object(attrs) = value {
                    store.attrs = attrs.into_iter().collect();
                }
            } else if let Some(name) = key.strip_prefix(LAYER_METADATA_PREFIX) {
                let group = store.groups.entry(name.to_string()).or_default();
                if let Value::Object(attrs) = value {
                    group.attrs = attrs;
                }
            }
        }

        for (key, view) in tensors.tensors() {
            let Some((layer, param)) = key.split_once('/') else {
                debug!("Тензор '{key}' без имени слоя пропущен");
                continue;
            };
            if view.dtype() != Dtype::F32 {
                return Err(ModelStoreError::InvalidAttribute {
                    key: key.clone(),
                    message: format!("ожидался тип F32, получен {:?}", view.dtype()),
                });
            }
            let values: Vec<f32> = view
                .data()
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            store
                .groups
                .entry(layer.to_string())
                .or_default()
                .params
                .insert(param.to_string(), TensorData::new(values, view.shape().to_vec()));
        }
        info!("Модель загружена из {}: слоев {}", path.display(), store.groups.len());
        Ok(store)
    }

    /// Читает только атрибуты модели из метаданных файла, тензоры не декодируются.
    ///
    /// # Errors
    /// `Io` при ошибке чтения, `Codec` при некорректном файле,
    /// `MissingAttribute`, если в метаданных нет атрибутов модели.
    pub fn read_file_attrs(path: &Path) -> Result<BTreeMap<String, Value>, ModelStoreError> {
        let buffer = std::fs::read(path).map_err(|e| ModelStoreError::io(path, e))?;
        let (_, metadata) = SafeTensors::read_metadata(&buffer).map_err(|e| ModelStoreError::codec(path, e))?;
        let model_attrs = metadata
            .metadata()
            .as_ref()
            .and_then(|entries| entries.get(MODEL_METADATA_KEY))
            .ok_or_else(|| ModelStoreError::MissingAttribute {
                scope: path.display().to_string(),
                key: MODEL_METADATA_KEY.to_string(),
            })?;
        let attrs: Map<String, Value> =
            serde_json::from_str(model_attrs).map_err(|e| ModelStoreError::codec(path, e))?;
        Ok(attrs.into_iter().collect())
    }
}
