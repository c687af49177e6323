#![warn(
    missing_docs, // Предупреждать, если публичные элементы не документированы.
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used, // Предупреждать об использовании .unwrap()
    clippy::expect_used  // Предупреждать об использовании .expect()
)]
#![deny(unsafe_code)]

//! `utils_crate` предоставляет общие структуры данных, обработку ошибок
//! и распространенные утилиты для воркспейса построения графа сети.
//!
//! # Основные модули:
//!
//! - [`error`]: Определяет общий тип ошибки `UtilsError`.
//! - [`config`]: Предоставляет `NetworkConfig` для загрузки параметров сети
//!   (размерности входа/выходов, маска, целевой поток, топология) из TOML-файлов.
//! - [`logger`]: Утилиты для инициализации системы логирования на базе `tracing`.
//!
//! # Использование фич (Features)
//!
//! Запись логов в файл включается фичей `logger_utils_feature`:
//!
//! ```toml
//! # В Cargo.toml вашего проекта
//! # utils_crate = { path = "path/to/utils_crate", features = ["logger_utils_feature"] }
//! ```

// --- Модуль для общих ошибок ---
pub mod error;
pub use error::UtilsError; // Реэкспорт для удобства использования.

// --- Конфигурация сети ---
pub mod config;
pub use config::{NetworkConfig, DEFAULT_TARGET};

// --- Инициализация логирования ---
pub mod logger;
pub use logger::init_tracing_logger;
