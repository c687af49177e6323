// core_graph/src/tensor.rs

//! Минимальный символьный "тензорный движок".
//!
//! Численные операции, автоматическое дифференцирование и выполнение на GPU
//! находятся вне этого крейта. Здесь граф хранит только именованные узлы
//! (входы, параметры, константы, непрозрачные операции слоев) с типом элементов
//! и рангом. Узлы никогда не вычисляются; значения есть только у параметров
//! и хранятся как `burn::tensor::TensorData`.
//!
//! Все тензоры одной сети (и производных от нее сетей) живут в одном
//! [`GraphContext`], разделяемом через `Rc<RefCell<_>>`. Построение графа
//! однопоточное, поэтому `Rc` достаточно.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::str::FromStr;

use burn::tensor::TensorData;

use crate::error::{GraphError, Result};

/// Индекс узла внутри [`GraphContext`].
pub type NodeId = usize;

/// Разделяемый контекст графа.
pub type SharedGraph = Rc<RefCell<GraphContext>>;

/// Тип элементов символьного тензора.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DType {
    /// 32-битное число с плавающей точкой.
    Float32,
    /// 64-битное число с плавающей точкой.
    Float64,
    /// 8-битное знаковое целое (маски и индексы).
    Int8,
    /// 8-битное беззнаковое целое.
    UInt8,
    /// 32-битное знаковое целое (метки классов по умолчанию).
    #[default]
    Int32,
    /// 64-битное знаковое целое.
    Int64,
}

impl DType {
    /// Имя типа в том виде, в котором оно записывается в топологии.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "float32" => Ok(Self::Float32),
            "float64" => Ok(Self::Float64),
            "int8" => Ok(Self::Int8),
            "uint8" => Ok(Self::UInt8),
            "int32" => Ok(Self::Int32),
            "int64" => Ok(Self::Int64),
            other => Err(GraphError::InvalidConfig(format!(
                "неизвестный тип элементов '{other}'"
            ))),
        }
    }
}

/// Операция, порождающая узел.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Внешний вход (данные, целевые метки, маски).
    Input,
    /// Обучаемый параметр; значение хранится в контексте.
    Parameter,
    /// Скалярная константа.
    Constant(f64),
    /// Сумма двух узлов.
    Add(NodeId, NodeId),
    /// Умножение узла на скаляр.
    Scale(NodeId, f64),
    /// Непрозрачная операция слоя (например, `"linear"`, `"softmax"`, `"ce_cost"`).
    Apply {
        /// Имя операции.
        op: String,
        /// Аргументы.
        args: Vec<NodeId>,
    },
}

/// Узел графа.
#[derive(Debug, Clone)]
pub struct Node {
    /// Имя узла (для параметров совпадает с именем параметра).
    pub name: String,
    /// Операция.
    pub op: Op,
    /// Тип элементов.
    pub dtype: DType,
    /// Ранг (количество осей).
    pub ndim: usize,
}

/// Хранилище узлов графа и значений параметров.
#[derive(Debug, Default)]
pub struct GraphContext {
    nodes: Vec<Node>,
    values: HashMap<NodeId, TensorData>,
}

impl GraphContext {
    /// Создает пустой контекст, готовый к совместному использованию.
    #[must_use]
    pub fn new_shared() -> SharedGraph {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Количество узлов.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Пуст ли граф.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Узел по индексу.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

/// Символьный тензор: дескриптор узла в разделяемом [`GraphContext`].
///
/// Равенство и хеш определяются идентичностью узла, а не структурой выражения,
/// поэтому тензоры можно использовать как ключи карты переопределенных градиентов.
#[derive(Clone)]
pub struct Tensor {
    graph: SharedGraph,
    id: NodeId,
}

impl Tensor {
    fn push(graph: &SharedGraph, node: Node) -> Self {
        let id = graph.borrow_mut().push(node);
        Self {
            graph: Rc::clone(graph),
            id,
        }
    }

    /// Создает внешний вход.
    #[must_use]
    pub fn input(graph: &SharedGraph, name: &str, dtype: DType, ndim: usize) -> Self {
        Self::push(
            graph,
            Node {
                name: name.to_string(),
                op: Op::Input,
                dtype,
                ndim,
            },
        )
    }

    /// Создает параметр с начальным значением. Ранг берется из формы значения.
    #[must_use]
    pub fn parameter(graph: &SharedGraph, name: &str, value: TensorData) -> Self {
        let ndim = value.shape.len();
        let tensor = Self::push(
            graph,
            Node {
                name: name.to_string(),
                op: Op::Parameter,
                dtype: DType::Float32,
                ndim,
            },
        );
        graph.borrow_mut().values.insert(tensor.id, value);
        tensor
    }

    /// Создает скалярную константу.
    #[must_use]
    pub fn constant(graph: &SharedGraph, value: f64) -> Self {
        Self::push(
            graph,
            Node {
                name: value.to_string(),
                op: Op::Constant(value),
                dtype: DType::Float32,
                ndim: 0,
            },
        )
    }

    /// Создает непрозрачную операцию слоя над аргументами.
    #[must_use]
    pub fn apply(graph: &SharedGraph, op: &str, args: &[&Self], dtype: DType, ndim: usize) -> Self {
        let args = args.iter().map(|t| t.id).collect();
        Self::push(
            graph,
            Node {
                name: op.to_string(),
                op: Op::Apply {
                    op: op.to_string(),
                    args,
                },
                dtype,
                ndim,
            },
        )
    }

    /// Сумма. Константы сворачиваются, нулевое слагаемое опускается.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        match (self.as_constant(), other.as_constant()) {
            (Some(a), Some(b)) => Self::constant(&self.graph, a + b),
            (Some(a), None) if a == 0.0 => other.clone(),
            (None, Some(b)) if b == 0.0 => self.clone(),
            _ => {
                let (dtype, ndim) = {
                    let graph = self.graph.borrow();
                    let lhs = &graph.nodes[self.id];
                    (lhs.dtype, lhs.ndim)
                };
                Self::push(
                    &self.graph,
                    Node {
                        name: "add".to_string(),
                        op: Op::Add(self.id, other.id),
                        dtype,
                        ndim,
                    },
                )
            }
        }
    }

    /// Умножение на скаляр. Множитель 1 возвращает тот же тензор.
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        if (factor - 1.0).abs() < f64::EPSILON {
            return self.clone();
        }
        if let Some(value) = self.as_constant() {
            return Self::constant(&self.graph, value * factor);
        }
        let (dtype, ndim) = {
            let graph = self.graph.borrow();
            let node = &graph.nodes[self.id];
            (node.dtype, node.ndim)
        };
        Self::push(
            &self.graph,
            Node {
                name: "scale".to_string(),
                op: Op::Scale(self.id, factor),
                dtype,
                ndim,
            },
        )
    }

    /// Индекс узла.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Контекст, которому принадлежит узел.
    #[must_use]
    pub const fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// Имя узла.
    #[must_use]
    pub fn name(&self) -> String {
        self.graph.borrow().nodes[self.id].name.clone()
    }

    /// Тип элементов.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.graph.borrow().nodes[self.id].dtype
    }

    /// Ранг.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.graph.borrow().nodes[self.id].ndim
    }

    /// Операция, породившая узел.
    #[must_use]
    pub fn op(&self) -> Op {
        self.graph.borrow().nodes[self.id].op.clone()
    }

    /// Значение константы, если узел является константой.
    #[must_use]
    pub fn as_constant(&self) -> Option<f64> {
        match self.graph.borrow().nodes[self.id].op {
            Op::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Является ли узел параметром.
    #[must_use]
    pub fn is_parameter(&self) -> bool {
        matches!(self.graph.borrow().nodes[self.id].op, Op::Parameter)
    }

    /// Текущее значение параметра.
    #[must_use]
    pub fn value(&self) -> Option<TensorData> {
        self.graph.borrow().values.get(&self.id).cloned()
    }

    /// Форма значения параметра.
    #[must_use]
    pub fn shape(&self) -> Option<Vec<usize>> {
        self.graph
            .borrow()
            .values
            .get(&self.id)
            .map(|v| v.shape.clone())
    }

    /// Количество элементов в значении (0 для узлов без значения).
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.shape().map_or(0, |shape| shape.iter().product())
    }

    /// Заменяет значение параметра. Форма должна совпадать с текущей.
    ///
    /// # Errors
    /// `InvalidConfig`, если узел не параметр; `ShapeMismatch` при несовпадении формы.
    pub fn set_value(&self, value: TensorData) -> Result<()> {
        let mut graph = self.graph.borrow_mut();
        let name = graph.nodes[self.id].name.clone();
        let Some(current) = graph.values.get_mut(&self.id) else {
            return Err(GraphError::InvalidConfig(format!(
                "узел '{name}' не является параметром"
            )));
        };
        if current.shape != value.shape {
            return Err(GraphError::ShapeMismatch {
                name,
                expected: current.shape.clone(),
                actual: value.shape,
            });
        }
        *current = value;
        Ok(())
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.graph, &other.graph) && self.id == other.id
    }
}

impl Eq for Tensor {}

impl Hash for Tensor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.graph.try_borrow() {
            Ok(graph) => write!(f, "Tensor(#{} {})", self.id, graph.nodes[self.id].name),
            Err(_) => write!(f, "Tensor(#{})", self.id),
        }
    }
}
