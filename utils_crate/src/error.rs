use thiserror::Error;

/// Общий тип ошибки для утилит `utils_crate`.
///
/// Агрегирует ошибки ввода-вывода, чтения конфигурации и инициализации логгера.
/// Остальные крейты воркспейса оборачивают его в собственные типы ошибок через `#[from]`.
#[derive(Error, Debug)]
pub enum UtilsError {
    /// Ошибка ввода-вывода (I/O).
    ///
    /// Содержит исходную ошибку `std::io::Error` и опционально путь к файлу,
    /// с которым возникла проблема.
    #[error("Ошибка ввода-вывода: {source}")]
    Io {
        /// Исходная ошибка I/O.
        #[source]
        source: std::io::Error,
        /// Опциональный путь, связанный с ошибкой I/O.
        path: Option<String>,
    },

    /// Ошибка разбора конфигурации (неверный TOML, отсутствующие поля и т.п.).
    #[error("Ошибка конфигурации: {0}")]
    Config(String),

    /// Ошибка десериализации JSON (например, встроенной топологии).
    #[error("Ошибка десериализации: {0}")]
    Deserialization(String),

    /// В утилитарную функцию был передан неверный параметр.
    #[error("Неверный параметр: {0}")]
    InvalidParameter(String),

    /// Общая ошибка утилиты для случаев, не покрытых другими вариантами.
    #[error("Произошла общая ошибка утилиты: {0}")]
    Generic(String),
}

/// Конвертация из `serde_json::Error` в `UtilsError`.
#[cfg(feature = "json_errors")]
impl From<serde_json::Error> for UtilsError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Io => Self::Io {
                source: err.into(),
                path: None,
            },
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => {
                Self::Deserialization(format!("Ошибка JSON: {err}"))
            }
        }
    }
}

impl From<std::io::Error> for UtilsError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}

impl From<toml::de::Error> for UtilsError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("Ошибка разбора TOML: {err}"))
    }
}

impl UtilsError {
    /// Вспомогательный конструктор для создания `UtilsError::Io` с указанием пути.
    pub fn io_with_path(source: std::io::Error, path: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }
}
