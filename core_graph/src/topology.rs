// core_graph/src/topology.rs

//! Декларативное описание топологии: имя слоя -> [`LayerSpec`].

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::error;

use crate::error::{GraphError, Result};
use crate::tensor::DType;

/// Ссылка на слои: в JSON записывается строкой или списком строк.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefList(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRefs {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for RefList {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match RawRefs::deserialize(deserializer)? {
            RawRefs::One(name) if name.is_empty() => Self(Vec::new()),
            RawRefs::One(name) => Self(vec![name]),
            RawRefs::Many(names) => Self(names),
        })
    }
}

impl RefList {
    /// Список из имен.
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    /// Разбирает строку с именами через запятую. Пустые сегменты отбрасываются.
    #[must_use]
    pub fn from_comma_joined(joined: &str) -> Self {
        Self(
            joined
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Имена в порядке объявления.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Пуст ли список.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Единственное имя для полей, ссылающихся ровно на один слой.
    ///
    /// # Errors
    /// `InvalidConfig`, если имен не ровно одно.
    pub fn single(&self, field: &str, layer: &str) -> Result<&str> {
        match self.0.as_slice() {
            [name] => Ok(name),
            other => Err(GraphError::InvalidConfig(format!(
                "слой '{layer}': поле '{field}' должно ссылаться ровно на один слой, получено {}",
                other.len()
            ))),
        }
    }
}

impl From<&str> for RefList {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

/// Описание одного слоя.
///
/// Ссылочные поля принимают строку или список; `"data"` означает сырой вход,
/// `"null"` означает отсутствие ссылки. Остальные ключи сохраняются в `extra`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct LayerSpec {
    /// Вид слоя.
    pub class: String,
    /// Источники.
    #[serde(default)]
    pub from: Option<RefList>,
    /// Целевой поток.
    #[serde(default)]
    pub target: Option<String>,
    /// Кодировщики.
    #[serde(default)]
    pub encoder: Option<RefList>,
    /// Базовые слои.
    #[serde(default)]
    pub base: Option<RefList>,
    /// Копируемый слой.
    #[serde(default)]
    pub copy_input: Option<RefList>,
    /// Слой центроидов.
    #[serde(default)]
    pub centroids: Option<RefList>,
    /// Тип элементов целевого потока (по умолчанию `int32`).
    #[serde(default)]
    pub dtype: Option<String>,
    /// Функция потерь классификатора.
    #[serde(default)]
    pub loss: Option<String>,
    /// Размерность выхода.
    #[serde(default)]
    pub n_out: Option<usize>,
    /// Количество символов классификатора.
    #[serde(default)]
    pub n_symbols: Option<usize>,
    /// Вероятность dropout.
    #[serde(default)]
    pub dropout: Option<f64>,
    /// Политика маски слоя.
    #[serde(default)]
    pub mask: Option<String>,
    /// Остальные ключи.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LayerSpec {
    /// Описание слоя заданного вида без остальных полей.
    #[must_use]
    pub fn of_class(class: &str) -> Self {
        Self {
            class: class.to_string(),
            ..Self::default()
        }
    }

    /// Тип элементов целевого потока.
    ///
    /// # Errors
    /// `InvalidConfig` для неизвестного имени типа.
    pub fn dtype(&self) -> Result<DType> {
        self.dtype.as_deref().map_or(Ok(DType::Int32), DType::from_str)
    }
}

/// Топология: описания слоев по именам, в отсортированном порядке.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Topology {
    layers: BTreeMap<String, LayerSpec>,
}

impl Topology {
    /// Пустая топология.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Разбирает топологию из JSON-объекта.
    ///
    /// # Errors
    /// `InvalidTopologySyntax`, если значение не объект или описание слоя некорректно.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(GraphError::InvalidTopologySyntax {
                message: "топология должна быть JSON-объектом".to_string(),
                content: value.to_string(),
            });
        };
        let mut layers = BTreeMap::new();
        for (name, spec) in map {
            let spec = LayerSpec::deserialize(spec).map_err(|e| GraphError::InvalidTopologySyntax {
                message: format!("слой '{name}': {e}"),
                content: spec.to_string(),
            })?;
            layers.insert(name.clone(), spec);
        }
        Ok(Self { layers })
    }

    /// Разбирает топологию из текста JSON. Ключ верхнего уровня `"network"`
    /// разворачивается. При ошибке разбора текст выводится в лог.
    ///
    /// # Errors
    /// `InvalidTopologySyntax` при синтаксической ошибке или некорректном описании.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Self::from_value(&parse_json_text(content)?)
    }

    /// Добавляет или заменяет описание слоя.
    pub fn insert(&mut self, name: impl Into<String>, spec: LayerSpec) {
        self.layers.insert(name.into(), spec);
    }

    /// Описание слоя по имени.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LayerSpec> {
        self.layers.get(name)
    }

    /// Есть ли слой с таким именем.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    /// Описания в отсортированном по имени порядке.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &LayerSpec)> {
        self.layers.iter()
    }

    /// Количество слоев.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Пуста ли топология.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Разбирает текст топологии в JSON-значение и разворачивает ключ `"network"`.
/// При ошибке разбора текст выводится в лог.
///
/// # Errors
/// `InvalidTopologySyntax` при синтаксической ошибке.
pub fn parse_json_text(content: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(content).map_err(|e| {
        error!("Ошибка разбора топологии: {e}");
        error!("Содержимое топологии:\n--- BEGIN JSON ---\n{content}\n--- END JSON ---");
        GraphError::InvalidTopologySyntax {
            message: e.to_string(),
            content: content.to_string(),
        }
    })?;
    Ok(unwrap_network_key(value))
}

/// Разворачивает `{"network": {...}}` в `{...}`.
#[must_use]
pub fn unwrap_network_key(value: Value) -> Value {
    match value {
        Value::Object(mut map) if matches!(map.get("network"), Some(Value::Object(_))) => {
            map.remove("network").unwrap_or(Value::Object(Map::new()))
        }
        other => other,
    }
}
