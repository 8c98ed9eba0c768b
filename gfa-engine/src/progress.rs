//! Compteur de progression partagé entre threads

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

/// Émet une ligne `info!` toutes les `every` parcelles traitées
pub struct Progress {
    stage: &'static str,
    total: usize,
    every: usize,
    done: AtomicUsize,
}

impl Progress {
    pub fn new(stage: &'static str, total: usize, every: usize) -> Self {
        Self {
            stage,
            total,
            every: every.max(1),
            done: AtomicUsize::new(0),
        }
    }

    /// Compte une parcelle traitée
    pub fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.every == 0 {
            info!(stage = self.stage, processed = done, total = self.total, "Estimation progress");
        }
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }
}
