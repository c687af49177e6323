//! Модуль для инициализации глобального логгера на основе `tracing`.
//!
//! Запись в файл активируется фичей `logger_utils_feature`.

use std::{io, path::Path};

use tracing::Level;
use tracing_subscriber::{
    filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::error::UtilsError;

/// Слой логирования, собираемый в вектор перед установкой подписчика.
type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Инициализирует глобальный подписчик `tracing`.
///
/// Настраивает вывод в stderr и, опционально, в файл с ежедневной ротацией.
/// Базовый фильтр берется из `RUST_LOG` (по умолчанию `info`), поверх него
/// добавляется явный уровень для `app_name`.
///
/// # Аргументы
/// * `app_name` - Имя приложения (для директивы фильтра и имени файла лога).
/// * `console_level` - Уровень для консоли.
/// * `file_level` - Уровень для файла.
/// * `log_dir` - Опциональная директория для файлов логов.
///
/// # Ошибки
/// `UtilsError::InvalidParameter`, если из `app_name` не получается директива фильтра,
/// `UtilsError::Generic`, если глобальный подписчик уже установлен.
/// Сбой создания директории логов не считается ошибкой: остается только консольный вывод.
pub fn init_tracing_logger(
    app_name: &str,
    console_level: Level,
    file_level: Level,
    log_dir: Option<&Path>,
) -> Result<(), UtilsError> {
    let base_env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // EnvFilter не принимает дефисы в именах целей.
    let sanitized_app_name = app_name.replace('-', "_");

    let console_filter = base_env_filter
        .clone()
        .add_directive(level_directive(&sanitized_app_name, console_level)?);

    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(true)
        .with_filter(console_filter);

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.push(console_layer.boxed());

    let mut file_logging = false;
    #[cfg(feature = "logger_utils_feature")]
    if let Some(dir) = log_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            // tracing еще не инициализирован, поэтому только stderr.
            eprintln!(
                "[ПРЕДУПРЕЖДЕНИЕ] Не удалось создать директорию логов {}: {e}. Логирование в файл отключено.",
                dir.display()
            );
        } else {
            let file_appender = tracing_appender::rolling::daily(dir, format!("{app_name}.log"));
            let file_filter =
                base_env_filter.add_directive(level_directive(&sanitized_app_name, file_level)?);
            let file_layer = fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(file_filter);
            layers.push(file_layer.boxed());
            file_logging = true;
        }
    }
    #[cfg(not(feature = "logger_utils_feature"))]
    let _ = file_level;

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| UtilsError::Generic(format!("Не удалось инициализировать логгер: {e}")))?;

    match log_dir {
        Some(dir) if file_logging => tracing::info!(
            "Логгер инициализирован. Уровень консоли: {console_level}. Логирование в файл: {} (уровень {file_level}).",
            dir.display()
        ),
        Some(dir) => tracing::warn!(
            "Логгер инициализирован. Уровень консоли: {console_level}. Логирование в файл в {} недоступно.",
            dir.display()
        ),
        None => tracing::info!(
            "Логгер инициализирован. Только вывод в консоль (уровень {console_level})."
        ),
    }
    Ok(())
}

fn level_directive(target: &str, level: Level) -> Result<Directive, UtilsError> {
    format!("{target}={level}").parse().map_err(|e| {
        UtilsError::InvalidParameter(format!(
            "Неверная директива уровня логирования для '{target}': {e}"
        ))
    })
}
