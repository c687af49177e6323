use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::UtilsError;

/// Имя целевого потока по умолчанию.
pub const DEFAULT_TARGET: &str = "classes";

/// Конфигурация построения сети.
///
/// Все поля имеют значения по умолчанию, поэтому в TOML-файле достаточно
/// указать только то, что отличается. Поля сгруппированы в таблицу `[network]`.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct NetworkConfig {
    /// Параметры сети.
    #[serde(default)]
    pub network: NetworkSection,
}

/// Таблица `[network]` файла конфигурации.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetworkSection {
    /// Размерность входа. Если не задана, берется из `n_out["data"]`.
    #[serde(default)]
    pub n_in: Option<usize>,

    /// Размерности целевых потоков: имя -> `[число классов, ранг без batch-оси]`.
    #[serde(default)]
    pub n_out: BTreeMap<String, [usize; 2]>,

    /// Целевой поток по умолчанию.
    #[serde(default = "default_target")]
    pub target: String,

    /// Разреженный вход (индексы вместо векторов признаков).
    #[serde(default)]
    pub sparse_input: bool,

    /// Политика маски: "unity", "none", "dropout" или отсутствует.
    #[serde(default)]
    pub mask: Option<String>,

    /// Строится ли сеть для обучения (влияет на dropout).
    #[serde(default)]
    pub train_flag: bool,

    /// Зерно генератора для инициализации параметров.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Топология, встроенная строкой JSON.
    #[serde(default)]
    pub topology_json: Option<String>,

    /// Путь к JSON-файлу с топологией. Используется, если `topology_json` не задан.
    #[serde(default)]
    pub topology_file: Option<PathBuf>,
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

const fn default_seed() -> u64 {
    42
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            n_in: None,
            n_out: BTreeMap::new(),
            target: default_target(),
            sparse_input: false,
            mask: None,
            train_flag: false,
            seed: default_seed(),
            topology_json: None,
            topology_file: None,
        }
    }
}

impl NetworkConfig {
    /// Загружает конфигурацию из TOML файла.
    /// Если файл не найден, возвращается конфигурация по умолчанию.
    ///
    /// # Errors
    /// `UtilsError::Io` при ошибках чтения файла или `UtilsError::Config`
    /// при ошибках парсинга TOML.
    pub fn load_from_toml(file_path: &Path) -> Result<Self, UtilsError> {
        if !file_path.exists() {
            warn!(
                "Файл конфигурации сети не найден: {}, используется конфигурация по умолчанию.",
                file_path.display()
            );
            return Ok(Self::default());
        }
        let config_str = std::fs::read_to_string(file_path)
            .map_err(|e| UtilsError::io_with_path(e, file_path.display().to_string()))?;
        Self::from_toml_str(&config_str).map_err(|e| {
            UtilsError::Config(format!(
                "Failed to parse NetworkConfig from TOML at {}: {e}",
                file_path.display()
            ))
        })
    }

    /// Разбирает конфигурацию из строки TOML.
    ///
    /// # Errors
    /// `UtilsError::Config` при синтаксической ошибке.
    pub fn from_toml_str(content: &str) -> Result<Self, UtilsError> {
        Ok(toml::from_str(content)?)
    }

    /// Возвращает текст топологии: встроенный JSON или содержимое `topology_file`.
    /// `Ok(None)`, если топология не задана ни одним способом.
    ///
    /// # Errors
    /// `UtilsError::Io`, если файл топологии не читается.
    pub fn topology_text(&self) -> Result<Option<String>, UtilsError> {
        if let Some(json) = &self.network.topology_json {
            return Ok(Some(json.clone()));
        }
        match &self.network.topology_file {
            Some(path) => std::fs::read_to_string(path)
                .map(Some)
                .map_err(|e| UtilsError::io_with_path(e, path.display().to_string())),
            None => Ok(None),
        }
    }
}
