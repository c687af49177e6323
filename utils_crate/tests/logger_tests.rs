use std::path::Path;

use serial_test::serial;
use tempfile::tempdir;
use tracing::Level;
use utils_crate::error::UtilsError;
use utils_crate::logger::init_tracing_logger;

// Глобальный подписчик устанавливается один раз на процесс, поэтому
// повторная инициализация в соседнем тесте допустима и возвращает Generic.
fn accept_init_result(result: Result<(), UtilsError>, context: &str) {
    match result {
        Ok(()) => tracing::info!("Логгер инициализирован ({context})"),
        Err(UtilsError::Generic(msg)) => {
            assert!(msg.contains("Не удалось инициализировать логгер"), "{msg}");
            println!("[ПРЕДУПРЕЖДЕНИЕ] Логгер уже инициализирован ({context}): {msg}");
        }
        Err(e) => panic!("Неожиданная ошибка при инициализации логгера ({context}): {e:?}"),
    }
}

#[test]
#[serial]
fn test_logger_init_console_only_ct() {
    accept_init_result(
        init_tracing_logger("graph-console-test", Level::DEBUG, Level::INFO, None),
        "консоль",
    );
    tracing::debug!("Отладочное сообщение после инициализации.");
}

#[cfg(feature = "logger_utils_feature")]
#[test]
#[serial]
fn test_logger_init_with_file_ct() {
    let temp_dir = tempdir().unwrap();
    accept_init_result(
        init_tracing_logger("graph-file-test", Level::INFO, Level::DEBUG, Some(temp_dir.path())),
        "файл",
    );
    tracing::info!("Сообщение для записи в файл.");
}

#[cfg(feature = "logger_utils_feature")]
#[test]
#[serial]
fn test_logger_bad_log_dir_does_not_fail_ct() {
    // Директорию внутри обычного файла создать нельзя.
    let temp_dir = tempdir().unwrap();
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();
    let bad_dir = blocker.join("logs");

    accept_init_result(
        init_tracing_logger("graph-bad-dir-test", Level::INFO, Level::DEBUG, Some(bad_dir.as_path())),
        "ошибка директории",
    );
    assert!(!Path::new(&bad_dir).exists());
}
