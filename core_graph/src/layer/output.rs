// core_graph/src/layer/output.rs

//! Выходные классификаторы: покадровый, последовательностный и декодер.

use super::kinds::{input_projection, linear, regularization};
use super::{CostTerms, Layer, LayerArgs, LayerVariant};
use crate::tensor::{DType, Tensor};

/// Функции потерь, выдающие априорное распределение CTC.
const PRIOR_LOSSES: &[&str] = &["ctc", "ce_ctc", "ctc2"];

/// Функции потерь, переопределяющие градиент по активации перед softmax.
const KNOWN_GRAD_LOSSES: &[&str] = &["sprint", "sprint_smoothed"];

/// Вариант выходного слоя, выбираемый по функции потерь.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputVariant {
    /// Потери по каждому кадру (`ce` и прочие).
    Framewise,
    /// Потери по последовательности (`ctc`, `ce_ctc`, `ctc2`, `sprint`, `sprint_smoothed`).
    Sequence,
    /// Декодер (`decode`).
    Decoder,
}

impl OutputVariant {
    /// Вариант для функции потерь.
    #[must_use]
    pub fn for_loss(loss: &str) -> Self {
        match loss {
            "decode" => Self::Decoder,
            l if PRIOR_LOSSES.contains(&l) || KNOWN_GRAD_LOSSES.contains(&l) => Self::Sequence,
            _ => Self::Framewise,
        }
    }
}

/// Строит выходной слой.
///
/// `y` отсутствует для целевого потока `"null"`: тогда у слоя нет ни стоимости,
/// ни ошибок.
#[must_use]
pub fn build_classifier(
    kind: &str,
    args: &LayerArgs,
    loss: &str,
    y: Option<&Tensor>,
    n_out: usize,
) -> Layer {
    let variant = OutputVariant::for_loss(loss);
    let (operands, params) = input_projection(args, n_out);
    let z = linear(args, &operands);
    let output = match variant {
        OutputVariant::Decoder => {
            let mut inputs = vec![&z];
            inputs.extend(args.aux.encoder.iter().map(|e| e.output()));
            Tensor::apply(&args.graph, "decoder_softmax", &inputs, DType::Float32, 3)
        }
        OutputVariant::Framewise | OutputVariant::Sequence => {
            Tensor::apply(&args.graph, "softmax", &[&z], DType::Float32, 3)
        }
    };
    let constraints = regularization(args, &params);
    let cost_scale = args.config_f64("cost_scale").unwrap_or(1.0);

    let mut layer = Layer::new(args, kind, LayerVariant::Output(variant), output.clone(), n_out)
        .with_params(params)
        .with_constraints(constraints)
        .with_attr("loss", loss);
    for key in ["L1", "L2", "cost_scale"] {
        if let Some(value) = args.config.get(key) {
            layer = layer.with_attr(key, value.clone());
        }
    }

    if let Some(y) = y {
        let operands = [&z, y, &args.index];
        let cost = Tensor::apply(&args.graph, &format!("{loss}_cost"), &operands, DType::Float32, 0);
        let mut terms = CostTerms {
            cost,
            known_grads: Vec::new(),
            prior: None,
        };
        let errors = match variant {
            OutputVariant::Framewise => {
                Tensor::apply(&args.graph, "frame_errors", &[&output, y, &args.index], DType::Int32, 0)
            }
            OutputVariant::Sequence => {
                if PRIOR_LOSSES.contains(&loss) {
                    terms.prior = Some(Tensor::apply(
                        &args.graph,
                        "ctc_priors",
                        &[&output, &args.index],
                        DType::Float32,
                        1,
                    ));
                } else {
                    let grad = Tensor::apply(&args.graph, "sprint_grad", &operands, DType::Float32, 3);
                    terms.known_grads.push((z.clone(), grad));
                }
                Tensor::apply(&args.graph, "edit_distance", &[&output, y, &args.index], DType::Int32, 0)
            }
            OutputVariant::Decoder => {
                Tensor::apply(&args.graph, "decode_errors", &[&output, y, &args.index], DType::Int32, 0)
            }
        };
        layer = layer.with_cost(terms, cost_scale).with_errors(errors);
    }
    layer
}
