use std::error::Error;

use core_graph::GraphError;
use thiserror::Error;

/// Ошибки сохранения и загрузки модели.
#[derive(Error, Debug)]
pub enum ModelStoreError {
    /// Ошибка файлового ввода/вывода.
    #[error("Ошибка ввода/вывода по пути '{path}': {source}")]
    Io {
        /// Путь к файлу.
        path: String,
        /// Исходная ошибка.
        #[source]
        source: std::io::Error,
    },

    /// Файл модели не удалось закодировать или разобрать.
    #[error("Ошибка формата модели '{path}': {source}")]
    Codec {
        /// Путь к файлу.
        path: String,
        /// Исходная ошибка формата.
        #[source]
        source: Box<dyn Error + Send + Sync + 'static>,
    },

    /// Обязательный атрибут отсутствует.
    #[error("Отсутствует атрибут '{key}' в '{scope}'")]
    MissingAttribute {
        /// Модель (`"model"`) или имя слоя.
        scope: String,
        /// Имя атрибута.
        key: String,
    },

    /// Атрибут имеет неожиданный тип или значение.
    #[error("Некорректный атрибут '{key}': {message}")]
    InvalidAttribute {
        /// Имя атрибута.
        key: String,
        /// Описание проблемы.
        message: String,
    },

    /// В сохраненной модели нет выходного слоя сети.
    #[error("В сохраненной модели нет слоя '{0}'")]
    MissingLayer(String),

    /// Ошибка построения сети.
    #[error("Ошибка построения сети: {0}")]
    Graph(#[from] GraphError),
}

impl ModelStoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn codec(path: &std::path::Path, source: impl Error + Send + Sync + 'static) -> Self {
        Self::Codec {
            path: path.display().to_string(),
            source: Box::new(source),
        }
    }
}
