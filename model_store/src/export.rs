use core_graph::layer::DEFAULT_OUTPUT;
use core_graph::Network;
use serde_json::{Map, Value};
use tracing::info;

use crate::store::{LayerGroup, ModelStore};

/// Атрибуты модели, записываемые [`save_network`].
pub mod keys {
    /// Топология сети (JSON строкой).
    pub const JSON: &str = "json";
    /// Номер шага обновления.
    pub const UPDATE_STEP: &str = "update_step";
    /// Последняя эпоха обучения.
    pub const EPOCH: &str = "epoch";
    /// Имя выходного слоя.
    pub const OUTPUT: &str = "output";
    /// Размерность входа.
    pub const N_IN: &str = "n_in";
    /// Количество классов по потокам (или одно число в старых моделях).
    pub const N_OUT: &str = "n_out";
    /// Ранг потоков.
    pub const N_OUT_DIM: &str = "n_out/dim";
    /// Целевой поток по умолчанию.
    pub const N_OUT_TARGET: &str = "n_out/target";
    /// Тип элементов целевого потока по умолчанию.
    pub const N_OUT_DTYPE: &str = "n_out/dtype";
}

/// Записывает сеть в контейнер: атрибуты сети, атрибуты и параметры каждого слоя.
#[must_use]
pub fn save_network(network: &Network, epoch: u64) -> ModelStore {
    let mut store = ModelStore::new();
    store.set_attr(keys::JSON, network.json_content());
    store.set_attr(keys::UPDATE_STEP, network.update_step());
    store.set_attr(keys::EPOCH, epoch);
    store.set_attr(keys::OUTPUT, DEFAULT_OUTPUT);
    store.set_attr(keys::N_IN, network.n_in());

    let mut sizes = Map::new();
    let mut dims = Map::new();
    for (name, dim) in network.n_out() {
        sizes.insert(name.clone(), Value::from(dim.size));
        dims.insert(name.clone(), Value::from(dim.ndim));
    }
    store.set_attr(keys::N_OUT, sizes);
    store.set_attr(keys::N_OUT_DIM, dims);

    for (name, layer) in network.hidden().iter().chain(network.output()) {
        store.insert_group(
            name,
            LayerGroup {
                attrs: layer.persist_attrs(),
                params: layer.params_dict(),
            },
        );
    }
    info!(
        "Сеть записана в контейнер модели: эпоха {epoch}, слоев {}",
        store.groups().len()
    );
    store
}
