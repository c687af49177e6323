// core_graph/src/registry.rs

//! Реестр видов слоев: имя `class` из топологии -> конструктор.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use tracing::debug;

use crate::error::{GraphError, Result};
use crate::layer::kinds::{CentroidKind, CopyKind, ForwardKind, LayerKind, LstmKind, RecurrentKind, COMMON_KEYS};

/// Структурные ключи описания слоя, которые резолвер разбирает сам.
pub const STRUCTURAL_KEYS: &[&str] = &[
    "class",
    "from",
    "target",
    "encoder",
    "base",
    "copy_input",
    "centroids",
    "n_out",
    "dropout",
    "mask",
    "dtype",
];

/// Реестр видов слоев.
///
/// Клонирование дешевое: виды хранятся за `Rc`.
#[derive(Clone, Default)]
pub struct LayerRegistry {
    kinds: HashMap<String, Rc<dyn LayerKind>>,
}

impl LayerRegistry {
    /// Пустой реестр.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Реестр со встроенными видами и их псевдонимами (`hidden`, `rec`).
    #[must_use]
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        registry.register(Rc::new(ForwardKind));
        registry.register(Rc::new(RecurrentKind));
        registry.register(Rc::new(LstmKind));
        registry.register(Rc::new(CopyKind));
        registry.register(Rc::new(CentroidKind));
        registry.register_alias("hidden", "forward");
        registry.register_alias("rec", "recurrent");
        registry
    }

    /// Регистрирует вид под его каноническим именем. Повторная регистрация заменяет вид.
    pub fn register(&mut self, kind: Rc<dyn LayerKind>) {
        let name = kind.kind_name();
        if self.kinds.insert(name.to_string(), kind).is_some() {
            debug!("Вид слоя '{name}' перерегистрирован");
        }
    }

    /// Регистрирует псевдоним для уже зарегистрированного вида.
    /// Неизвестная цель псевдонима игнорируется.
    pub fn register_alias(&mut self, alias: &str, target: &str) {
        if let Some(kind) = self.kinds.get(target).cloned() {
            self.kinds.insert(alias.to_string(), kind);
        }
    }

    /// Находит вид по имени.
    ///
    /// # Errors
    /// `UnknownLayerKind`, если имя не зарегистрировано.
    pub fn resolve(&self, name: &str) -> Result<Rc<dyn LayerKind>> {
        self.kinds
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownLayerKind(name.to_string()))
    }

    /// Зарегистрирован ли вид.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Ключи конфигурации, которые принимает конструктор вида:
    /// структурные, общие и специфичные для вида.
    ///
    /// # Errors
    /// `UnknownLayerKind`, если имя не зарегистрировано.
    pub fn accepted_keys(&self, name: &str) -> Result<BTreeSet<&'static str>> {
        let kind = self.resolve(name)?;
        Ok(STRUCTURAL_KEYS
            .iter()
            .chain(COMMON_KEYS)
            .chain(kind.accepted_keys())
            .copied()
            .collect())
    }

    /// Имена всех зарегистрированных видов и псевдонимов, отсортированные.
    #[must_use]
    pub fn kind_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for LayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerRegistry")
            .field("kinds", &self.kind_names())
            .finish()
    }
}
