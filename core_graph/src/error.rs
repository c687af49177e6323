// core_graph/src/error.rs

use utils_crate::error::UtilsError;

/// Перечисление всех ошибок, которые могут возникнуть при построении сети.
///
/// Все варианты фатальны: построение сети выполняется по принципу "все или ничего",
/// частично построенная сеть не возвращается.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    /// В топологии указан тип слоя, отсутствующий в реестре.
    #[error("Неизвестный тип слоя: '{0}'")]
    UnknownLayerKind(String),

    /// Целевой поток не объявлен в размерностях выходов сети.
    #[error("Неизвестный целевой поток: '{0}'")]
    UnknownTarget(String),

    /// Слой создан без имени.
    #[error("Слой не имеет имени")]
    MissingName,

    /// Второй слой в одной сети выдал априорное распределение CTC.
    #[error("Несколько ctc_priors в одной сети, второе от слоя '{layer}'")]
    MultiplePriors {
        /// Имя слоя, выдавшего второе распределение.
        layer: String,
    },

    /// Топология не является корректным описанием слоев.
    /// `content` содержит исходный текст для диагностики.
    #[error("Некорректная топология сети: {message}")]
    InvalidTopologySyntax {
        /// Описание проблемы.
        message: String,
        /// Исходное содержимое, в котором обнаружена проблема.
        content: String,
    },

    /// Производная сеть с общими параметрами создала собственные обучаемые параметры.
    #[error("Сеть с общими параметрами создала {count} новых обучаемых параметров")]
    ShareParamsViolation {
        /// Количество неожиданных обучаемых параметров.
        count: usize,
    },

    /// Слой ссылается сам на себя (напрямую или через цепочку) до завершения построения.
    #[error("Циклическая ссылка на слой '{layer}': {}", .chain.join(" -> "))]
    CyclicReference {
        /// Слой, на который пришла повторная ссылка.
        layer: String,
        /// Цепочка разрешаемых слоев, замкнувшаяся на `layer`.
        chain: Vec<String>,
    },

    /// Ссылка на слой, которого нет ни в топологии, ни в сети.
    #[error("Слой '{0}' не определен")]
    UndefinedLayer(String),

    /// Некорректные параметры сети или слоя.
    #[error("Некорректная конфигурация: {0}")]
    InvalidConfig(String),

    /// Несовместимая форма значения параметра.
    #[error("Несовместимая форма параметра '{name}': ожидалась {expected:?}, получена {actual:?}")]
    ShapeMismatch {
        /// Имя параметра.
        name: String,
        /// Ожидаемая форма.
        expected: Vec<usize>,
        /// Фактическая форма.
        actual: Vec<usize>,
    },

    /// Ошибка из `utils_crate` (чтение конфигурации или файла топологии).
    #[error("Ошибка из utils_crate: {0}")]
    Utils(#[from] UtilsError),
}

/// Псевдоним результата для операций `core_graph`.
pub type Result<T> = std::result::Result<T, GraphError>;
