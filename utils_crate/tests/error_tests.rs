use std::io;

use utils_crate::error::UtilsError;

#[test]
fn test_io_error_conversion_ct() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let path_str = "non_existent_topology.json";
    let utils_err = UtilsError::io_with_path(io_err, path_str);

    match utils_err {
        UtilsError::Io {
            source,
            path: Some(p),
        } => {
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
            assert_eq!(p, path_str);
            assert!(source.to_string().contains("file not found"));
        }
        other => panic!("Ожидался вариант UtilsError::Io с путем, получено {other:?}"),
    }

    let io_err_no_path = io::Error::new(io::ErrorKind::Other, "other io error");
    let utils_err_no_path: UtilsError = io_err_no_path.into();
    match utils_err_no_path {
        UtilsError::Io { source, path: None } => {
            assert_eq!(source.kind(), io::ErrorKind::Other);
        }
        other => panic!("Ожидался вариант UtilsError::Io без пути, получено {other:?}"),
    }
}

#[test]
fn test_config_error_formatting_ct() {
    let err = UtilsError::Config("неверный формат".to_string());
    assert_eq!(err.to_string(), "Ошибка конфигурации: неверный формат");
}

#[test]
fn test_invalid_parameter_formatting_ct() {
    let err = UtilsError::InvalidParameter("пустое имя".to_string());
    assert_eq!(err.to_string(), "Неверный параметр: пустое имя");
}

#[test]
fn test_toml_error_conversion_ct() {
    let toml_err = toml::from_str::<toml::Value>("key = ").unwrap_err();
    let err: UtilsError = toml_err.into();
    assert!(matches!(err, UtilsError::Config(ref m) if m.starts_with("Ошибка разбора TOML")));
}

#[cfg(feature = "json_errors")]
#[test]
fn test_serde_json_error_conversion_ct() {
    let json_err = serde_json::from_str::<serde_json::Value>("{\"a\": ").unwrap_err();
    let err: UtilsError = json_err.into();
    assert!(matches!(err, UtilsError::Deserialization(_)));
}
