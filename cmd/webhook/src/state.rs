use sidecar_injector_admission::mutate::Mutator;
use sidecar_injector_admission::validate::Validator;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct WebhookState<N> {
    pub mutator: Arc<Mutator<N>>,
    pub validator: Arc<Validator>,
    ready: Arc<AtomicBool>,
}

impl<N> Clone for WebhookState<N> {
    fn clone(&self) -> Self {
        Self {
            mutator: self.mutator.clone(),
            validator: self.validator.clone(),
            ready: self.ready.clone(),
        }
    }
}

impl<N> WebhookState<N> {
    pub fn new(mutator: Mutator<N>, validator: Validator) -> Self {
        Self {
            mutator: Arc::new(mutator),
            validator: Arc::new(validator),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Report not ready from now on, so the endpoint is taken out of rotation while
    /// in-flight reviews finish.
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::Relaxed);
    }
}
