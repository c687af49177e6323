#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![deny(unsafe_code, clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::module_name_repetitions)]

//! # Model Store
//!
//! Сохранение и восстановление сетей `core_graph`.
//!
//! [`ModelStore`] это абстрактный контейнер "ключ-значение": атрибуты сети и
//! группы слоев (атрибуты плюс значения параметров). [`save_network`] заполняет
//! контейнер из сети, [`network_from_store`] строит сеть заново по сохраненным
//! атрибутам, [`load_params`] переносит значения параметров. Файловый формат
//! один: safetensors с атрибутами в метаданных заголовка.

pub mod error;
pub mod export;
pub mod import;
pub mod store;

pub use error::ModelStoreError;
pub use export::save_network;
pub use import::{epoch_from_file, epoch_from_store, load_params, network_from_store};
pub use store::{LayerGroup, ModelStore};
