// core_graph/src/accumulator.rs

use indexmap::IndexMap;
use tracing::warn;

use crate::error::{GraphError, Result};
use crate::layer::Layer;
use crate::tensor::{SharedGraph, Tensor};

/// Накопитель глобального состояния обучения, заполняемый при добавлении слоев.
#[derive(Debug, Clone)]
pub struct CostAccumulator {
    total_cost: Tensor,
    constraints: Tensor,
    costs: IndexMap<String, Tensor>,
    known_grads: IndexMap<Tensor, Tensor>,
    ctc_priors: Option<Tensor>,
}

impl CostAccumulator {
    /// Пустой накопитель: нулевые стоимость и ограничения.
    #[must_use]
    pub fn new(graph: &SharedGraph) -> Self {
        Self {
            total_cost: Tensor::constant(graph, 0.0),
            constraints: Tensor::constant(graph, 0.0),
            costs: IndexMap::new(),
            known_grads: IndexMap::new(),
            ctc_priors: None,
        }
    }

    /// Учитывает вклад слоя.
    ///
    /// Стоимость умножается на масштаб слоя. Повторный ключ переопределенного
    /// градиента заменяет прежнее значение.
    ///
    /// # Errors
    /// `MultiplePriors`, если априорное распределение CTC уже получено от другого слоя.
    /// В этом случае накопитель не изменяется.
    pub fn add_layer(&mut self, layer: &Layer) -> Result<()> {
        let terms = layer.cost_terms();
        if terms.is_some_and(|t| t.prior.is_some()) && self.ctc_priors.is_some() {
            return Err(GraphError::MultiplePriors {
                layer: layer.name().to_string(),
            });
        }
        self.constraints = self.constraints.add(layer.constraints());
        let Some(terms) = terms else {
            return Ok(());
        };
        self.costs.insert(layer.name().to_string(), terms.cost.clone());
        self.total_cost = self.total_cost.add(&terms.cost.scale(layer.cost_scale()));
        for (var, grad) in &terms.known_grads {
            if self.known_grads.insert(var.clone(), grad.clone()).is_some() {
                warn!(
                    "Слой '{}' переопределил уже заданный градиент для {var:?}",
                    layer.name()
                );
            }
        }
        if let Some(prior) = &terms.prior {
            self.ctc_priors = Some(prior.clone());
        }
        Ok(())
    }

    /// Суммарная стоимость.
    #[must_use]
    pub const fn total_cost(&self) -> &Tensor {
        &self.total_cost
    }

    /// Сумма ограничений.
    #[must_use]
    pub const fn constraints(&self) -> &Tensor {
        &self.constraints
    }

    /// Стоимость по слоям (без масштаба).
    #[must_use]
    pub const fn costs(&self) -> &IndexMap<String, Tensor> {
        &self.costs
    }

    /// Переопределенные градиенты.
    #[must_use]
    pub const fn known_grads(&self) -> &IndexMap<Tensor, Tensor> {
        &self.known_grads
    }

    /// Априорное распределение CTC.
    #[must_use]
    pub const fn ctc_priors(&self) -> Option<&Tensor> {
        self.ctc_priors.as_ref()
    }

    /// Целевая функция: стоимость плюс ограничения.
    #[must_use]
    pub fn objective(&self) -> Tensor {
        self.total_cost.add(&self.constraints)
    }
}
