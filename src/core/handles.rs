use std::{convert::Infallible, fmt::Display};

use hashbrown::HashMap;

use crate::{
    layer::Layer,
    types::{ImageBlob, LayerId},
};

/// Creates and releases renderable handles for layer images.
pub trait HandleFactory {
    type Handle;
    type Error: Display;

    fn create(&mut self, layer: &Layer) -> Result<Self::Handle, Self::Error>;
    fn release(&mut self, handle: Self::Handle);
}

/// The active layer-id → handle map for one render target.
///
/// Each [`DisplayHandles::sync`] releases the whole previous set before
/// minting a fresh one; the last set is released on teardown or drop.
pub struct DisplayHandles<F: HandleFactory> {
    factory: F,
    active: HashMap<LayerId, F::Handle>,
}

impl<F: HandleFactory> DisplayHandles<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            active: HashMap::new(),
        }
    }

    pub fn sync(&mut self, layers: &[Layer]) -> &HashMap<LayerId, F::Handle> {
        self.release_active();

        for layer in layers {
            match self.factory.create(layer) {
                Ok(handle) => {
                    if let Some(dup) = self.active.insert(layer.id, handle) {
                        self.factory.release(dup);
                    }
                }
                Err(err) => {
                    tracing::warn!(layer_id = %layer.id, error = %err, "display handle creation failed");
                }
            }
        }

        &self.active
    }

    pub fn get(&self, id: LayerId) -> Option<&F::Handle> {
        self.active.get(&id)
    }

    pub fn active(&self) -> &HashMap<LayerId, F::Handle> {
        &self.active
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn teardown(&mut self) {
        self.release_active();
    }

    fn release_active(&mut self) {
        for (_, handle) in self.active.drain() {
            self.factory.release(handle);
        }
    }
}

impl<F: HandleFactory> Drop for DisplayHandles<F> {
    fn drop(&mut self) {
        self.release_active();
    }
}

/// Object-URL style factory: each handle is a `blob:` URL resolving to the
/// layer's bytes until released.
#[derive(Debug, Default)]
pub struct ObjectUrls {
    next_serial: u64,
    live: HashMap<String, ImageBlob>,
}

impl ObjectUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, url: &str) -> Option<&ImageBlob> {
        self.live.get(url)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

impl HandleFactory for ObjectUrls {
    type Handle = String;
    type Error = Infallible;

    fn create(&mut self, layer: &Layer) -> Result<String, Infallible> {
        self.next_serial += 1;
        let url = format!("blob:pixshop/{}", self.next_serial);
        self.live.insert(url.clone(), layer.image.clone());
        Ok(url)
    }

    fn release(&mut self, handle: String) {
        if self.live.remove(&handle).is_none() {
            tracing::warn!(url = %handle, "released unknown object url");
        }
    }
}
