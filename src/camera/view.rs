//! Lock-free live view shared between the tick driver and its consumers
//!
//! The tick driver is the only writer. Readers (render thread, targeting) copy a
//! [`ViewSnapshot`] out of the atomics whenever they need one. A snapshot taken
//! across a tick boundary may mix fields from two frames; each projection is a
//! best-effort approximation, so that is acceptable.

use crate::projection::{ViewSnapshot, ViewTransform};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Current camera view, updated in place every tick
#[derive(Debug)]
pub struct LiveView {
    cells: [AtomicU32; 16],
    fov: AtomicU32,
    aspect: AtomicU32,
    scoped: AtomicBool,
}

impl Default for LiveView {
    fn default() -> Self {
        Self {
            cells: std::array::from_fn(|_| AtomicU32::new(0)),
            fov: AtomicU32::new(0),
            aspect: AtomicU32::new(0),
            scoped: AtomicBool::new(false),
        }
    }
}

impl LiveView {
    /// All-zero view
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new transform
    pub fn store_transform(&self, transform: &ViewTransform) {
        for (cell, value) in self.cells.iter().zip(transform.rows.iter().flatten()) {
            cell.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    /// Field of view (degrees) and aspect ratio of the main camera
    pub fn store_lens(&self, fov: f32, aspect: f32) {
        self.fov.store(fov.to_bits(), Ordering::Relaxed);
        self.aspect.store(aspect.to_bits(), Ordering::Relaxed);
    }

    /// Whether the transform came from an optic camera
    pub fn set_scoped(&self, scoped: bool) {
        self.scoped.store(scoped, Ordering::Relaxed);
    }

    /// Current transform
    pub fn transform(&self) -> ViewTransform {
        let mut rows = [[0.0f32; 4]; 4];
        for (value, cell) in rows.iter_mut().flatten().zip(self.cells.iter()) {
            *value = f32::from_bits(cell.load(Ordering::Relaxed));
        }
        ViewTransform { rows }
    }

    /// Copy out everything a projection needs
    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            transform: self.transform(),
            scoped: self.scoped.load(Ordering::Relaxed),
            fov: f32::from_bits(self.fov.load(Ordering::Relaxed)),
            aspect: f32::from_bits(self.aspect.load(Ordering::Relaxed)),
        }
    }

    /// Zero everything
    pub fn clear(&self) {
        self.store_transform(&ViewTransform::ZERO);
        self.store_lens(0.0, 0.0);
        self.set_scoped(false);
    }
}
