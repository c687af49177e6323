// core_graph/src/layer/kinds.rs

//! Встроенные виды скрытых слоев.
//!
//! Каждый вид только порождает непрозрачные узлы графа (`"linear"`, функция
//! активации, `"recurrent_scan"`, ...). Арифметика этих узлов вне крейта.

use indexmap::IndexMap;
use tracing::debug;

use super::{Layer, LayerArgs, LayerVariant, Param};
use crate::error::{GraphError, Result};
use crate::tensor::{DType, Tensor};

/// Ключи конфигурации, которые понимает любой вид слоя.
pub const COMMON_KEYS: &[&str] = &["activation", "L1", "L2", "cost_scale"];

/// Вид слоя, зарегистрированный в [`crate::registry::LayerRegistry`].
pub trait LayerKind {
    /// Каноническое имя вида (значение `class` в топологии).
    fn kind_name(&self) -> &'static str;

    /// Рекуррентный ли вид. Сеть с хотя бы одним таким слоем помечается рекуррентной.
    fn recurrent(&self) -> bool {
        false
    }

    /// Дополнительные ключи конфигурации, специфичные для вида.
    fn accepted_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Строит слой по разрешенным аргументам.
    ///
    /// # Errors
    /// `InvalidConfig`, если аргументов недостаточно для построения.
    fn construct(&self, args: &LayerArgs) -> Result<Layer>;
}

/// Полносвязный слой.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardKind;

/// Простой рекуррентный слой.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecurrentKind;

/// LSTM-слой.
#[derive(Debug, Default, Clone, Copy)]
pub struct LstmKind;

/// Слой копирования (конкатенация источников без параметров).
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyKind;

/// Слой расстояний до центроидов.
#[derive(Debug, Default, Clone, Copy)]
pub struct CentroidKind;

impl LayerKind for ForwardKind {
    fn kind_name(&self) -> &'static str {
        "forward"
    }

    fn construct(&self, args: &LayerArgs) -> Result<Layer> {
        let n_out = args.require_n_out()?;
        let (operands, params) = input_projection(args, n_out);
        let z = linear(args, &operands);
        let activation = activation(args, "tanh");
        let output = apply_dropout(args, Tensor::apply(&args.graph, activation, &[&z], DType::Float32, 3));
        Ok(finish(args, self.kind_name(), false, output, n_out, params).with_attr("activation", activation))
    }
}

impl LayerKind for RecurrentKind {
    fn kind_name(&self) -> &'static str {
        "recurrent"
    }

    fn recurrent(&self) -> bool {
        true
    }

    fn accepted_keys(&self) -> &'static [&'static str] {
        &["reverse"]
    }

    fn construct(&self, args: &LayerArgs) -> Result<Layer> {
        let n_out = args.require_n_out()?;
        let (operands, mut params) = input_projection(args, n_out);
        let w_re_name = format!("W_re_{}", args.name);
        let w_re = args.params.weight(&args.name, &w_re_name, n_out, n_out);
        let z = linear(args, &operands);
        let activation = activation(args, "tanh");
        let reverse = args.config_bool("reverse");
        let scan = if reverse { "recurrent_scan_reverse" } else { "recurrent_scan" };
        let hidden = Tensor::apply(
            &args.graph,
            scan,
            &[&z, w_re.tensor(), &args.index],
            DType::Float32,
            3,
        );
        params.insert(w_re_name, w_re);
        let output = apply_dropout(args, Tensor::apply(&args.graph, activation, &[&hidden], DType::Float32, 3));
        let mut layer = finish(args, self.kind_name(), true, output, n_out, params)
            .with_attr("activation", activation);
        if reverse {
            layer = layer.with_attr("reverse", true);
        }
        Ok(layer)
    }
}

impl LayerKind for LstmKind {
    fn kind_name(&self) -> &'static str {
        "lstm"
    }

    fn recurrent(&self) -> bool {
        true
    }

    fn accepted_keys(&self) -> &'static [&'static str] {
        &["reverse"]
    }

    fn construct(&self, args: &LayerArgs) -> Result<Layer> {
        let n_out = args.require_n_out()?;
        // Четыре блока: вход, забывание, выход, кандидат.
        let (operands, mut params) = input_projection_wide(args, n_out, 4);
        let z = linear(args, &operands);
        let w_re_name = format!("W_re_{}", args.name);
        let w_re = args.params.weight(&args.name, &w_re_name, n_out, 4 * n_out);
        let mut scan_args = vec![z, w_re.tensor().clone(), args.index.clone()];
        params.insert(w_re_name, w_re);
        for encoder in &args.aux.encoder {
            let name = format!("W_enc_{}_{}", encoder.name(), args.name);
            let w_enc = args.params.weight(&args.name, &name, encoder.n_out(), 4 * n_out);
            scan_args.push(encoder.output().clone());
            scan_args.push(w_enc.tensor().clone());
            params.insert(name, w_enc);
        }
        let reverse = args.config_bool("reverse");
        let scan = if reverse { "lstm_scan_reverse" } else { "lstm_scan" };
        let refs: Vec<&Tensor> = scan_args.iter().collect();
        let output = apply_dropout(args, Tensor::apply(&args.graph, scan, &refs, DType::Float32, 3));
        let mut layer = finish(args, self.kind_name(), true, output, n_out, params);
        if reverse {
            layer = layer.with_attr("reverse", true);
        }
        Ok(layer)
    }
}

impl LayerKind for CopyKind {
    fn kind_name(&self) -> &'static str {
        "copy"
    }

    fn construct(&self, args: &LayerArgs) -> Result<Layer> {
        let (output, n_out) = if let Some(copy_input) = &args.aux.copy_input {
            (copy_input.output().clone(), copy_input.n_out())
        } else {
            match args.sources.as_slice() {
                [] => {
                    return Err(GraphError::InvalidConfig(format!(
                        "слой '{}': копировать нечего, нет источников",
                        args.name
                    )))
                }
                [single] => (single.output().clone(), single.n_out()),
                many => {
                    let outputs: Vec<&Tensor> = many.iter().map(|s| s.output()).collect();
                    let n_out = many.iter().map(|s| s.n_out()).sum();
                    (Tensor::apply(&args.graph, "concat", &outputs, DType::Float32, 3), n_out)
                }
            }
        };
        if let Some(explicit) = args.n_out {
            if explicit != n_out {
                debug!(
                    layer = %args.name,
                    "n_out={explicit} игнорируется, слой копирования выдает {n_out}"
                );
            }
        }
        Ok(finish(args, self.kind_name(), false, output, n_out, IndexMap::new()))
    }
}

impl LayerKind for CentroidKind {
    fn kind_name(&self) -> &'static str {
        "centroid"
    }

    fn construct(&self, args: &LayerArgs) -> Result<Layer> {
        let centroids = args.aux.centroids.as_ref().ok_or_else(|| {
            GraphError::InvalidConfig(format!("слой '{}': не задан centroids", args.name))
        })?;
        let n_out = args.n_out.unwrap_or_else(|| centroids.n_out());
        let (operands, params) = input_projection(args, n_out);
        let z = linear(args, &operands);
        let distance = Tensor::apply(
            &args.graph,
            "centroid_distance",
            &[&z, centroids.output()],
            DType::Float32,
            3,
        );
        let activation = activation(args, "softmax");
        let output = apply_dropout(args, Tensor::apply(&args.graph, activation, &[&distance], DType::Float32, 3));
        Ok(finish(args, self.kind_name(), false, output, n_out, params).with_attr("activation", activation))
    }
}

/// Имя функции активации из конфигурации или значение по умолчанию.
pub(crate) fn activation<'a>(args: &'a LayerArgs, default: &'a str) -> &'a str {
    args.config_str("activation").unwrap_or(default)
}

/// Входные веса для каждого источника и базового слоя плюс смещение.
/// Возвращает операнды для узла `"linear"` и созданные параметры.
pub(crate) fn input_projection(args: &LayerArgs, n_out: usize) -> (Vec<Tensor>, IndexMap<String, Param>) {
    input_projection_wide(args, n_out, 1)
}

fn input_projection_wide(
    args: &LayerArgs,
    n_out: usize,
    blocks: usize,
) -> (Vec<Tensor>, IndexMap<String, Param>) {
    let width = n_out * blocks;
    let mut operands = Vec::new();
    let mut params = IndexMap::new();
    let inputs = args
        .sources
        .iter()
        .map(|s| ("W_in", s))
        .chain(args.aux.base.iter().map(|b| ("W_base", b)));
    for (prefix, source) in inputs {
        let name = format!("{prefix}_{}_{}", source.name(), args.name);
        let weight = args.params.weight(&args.name, &name, source.n_out(), width);
        operands.push(source.output().clone());
        operands.push(weight.tensor().clone());
        params.insert(name, weight);
    }
    let bias_name = format!("b_{}", args.name);
    let bias = args.params.bias(&args.name, &bias_name, width);
    operands.push(bias.tensor().clone());
    params.insert(bias_name, bias);
    (operands, params)
}

/// Аффинное преобразование над операндами `input_projection`.
pub(crate) fn linear(args: &LayerArgs, operands: &[Tensor]) -> Tensor {
    let refs: Vec<&Tensor> = operands.iter().collect();
    Tensor::apply(&args.graph, "linear", &refs, DType::Float32, 3)
}

fn apply_dropout(args: &LayerArgs, output: Tensor) -> Tensor {
    if args.train_flag && args.dropout > 0.0 && args.mask.as_deref() != Some("unity") {
        Tensor::apply(&args.graph, "dropout", &[&output], DType::Float32, 3)
    } else {
        output
    }
}

/// Регуляризация L1/L2 по весовым матрицам слоя.
pub(crate) fn regularization(args: &LayerArgs, params: &IndexMap<String, Param>) -> Tensor {
    let weights: Vec<&Tensor> = params
        .values()
        .filter(|p| p.is_owned() && p.tensor().ndim() == 2)
        .map(Param::tensor)
        .collect();
    let mut total = Tensor::constant(&args.graph, 0.0);
    if weights.is_empty() {
        return total;
    }
    for (key, op) in [("L1", "l1_norm"), ("L2", "l2_norm")] {
        if let Some(factor) = args.config_f64(key).filter(|f| *f > 0.0) {
            let norm = Tensor::apply(&args.graph, op, &weights, DType::Float32, 0);
            total = total.add(&norm.scale(factor));
        }
    }
    total
}

/// Переносит общие ключи конфигурации в атрибуты и собирает скрытый слой.
fn finish(
    args: &LayerArgs,
    kind: &str,
    recurrent: bool,
    output: Tensor,
    n_out: usize,
    params: IndexMap<String, Param>,
) -> Layer {
    let constraints = regularization(args, &params);
    let mut layer = Layer::new(args, kind, LayerVariant::Hidden { recurrent }, output, n_out)
        .with_params(params)
        .with_constraints(constraints);
    for key in ["L1", "L2", "cost_scale"] {
        if let Some(value) = args.config.get(key) {
            layer = layer.with_attr(key, value.clone());
        }
    }
    layer
}
