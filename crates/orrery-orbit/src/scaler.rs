//! Piecewise distance compression from physical AU into render units.
//!
//! Three zones keep the inner system readable while the outer system still
//! fits in a bounded scene:
//!
//! - `r <= L1`: linear, `r * S`
//! - `L1 < r <= L2`: `V1 + ln(1 + (r - L1)) * S * K1`
//! - `r > L2`: `V2 + ln(1 + (r - L2)) * S * K2`
//!
//! `V1` and `V2` are the visual distances at the zone boundaries, so the
//! mapping is continuous.

use glam::DVec3;

/// Direction-preserving magnitude remap with precomputed boundary offsets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateScaler {
    inner_limit: f64,
    outer_limit: f64,
    scale: f64,
    mid_compression: f64,
    outer_compression: f64,
    inner_visual: f64,
    outer_visual: f64,
}

impl Default for CoordinateScaler {
    fn default() -> Self {
        Self::new(30.0, 50.0, 40.0, 1.5, 4.0)
    }
}

impl CoordinateScaler {
    /// Build a scaler with zone limits `inner_limit < outer_limit` (AU), linear
    /// `scale`, and logarithmic gains for the middle and outer zones.
    pub fn new(
        inner_limit: f64,
        outer_limit: f64,
        scale: f64,
        mid_compression: f64,
        outer_compression: f64,
    ) -> Self {
        let inner_visual = inner_limit * scale;
        let outer_visual =
            inner_visual + (1.0 + (outer_limit - inner_limit)).ln() * scale * mid_compression;
        Self {
            inner_limit,
            outer_limit,
            scale,
            mid_compression,
            outer_compression,
            inner_visual,
            outer_visual,
        }
    }

    /// Linear zone boundary, AU.
    pub fn inner_limit(&self) -> f64 {
        self.inner_limit
    }

    /// Outer zone boundary, AU.
    pub fn outer_limit(&self) -> f64 {
        self.outer_limit
    }

    /// Render units per AU inside the linear zone.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Logarithmic gain of the middle zone.
    pub fn mid_compression(&self) -> f64 {
        self.mid_compression
    }

    /// Logarithmic gain of the outer zone.
    pub fn outer_compression(&self) -> f64 {
        self.outer_compression
    }

    /// Visual distance at the inner boundary (`V1`).
    pub fn inner_visual(&self) -> f64 {
        self.inner_visual
    }

    /// Visual distance at the outer boundary (`V2`).
    pub fn outer_visual(&self) -> f64 {
        self.outer_visual
    }

    /// Visual distance for a physical distance `r` (AU, `r >= 0`).
    pub fn visual_distance(&self, r: f64) -> f64 {
        if r <= self.inner_limit {
            r * self.scale
        } else if r <= self.outer_limit {
            let excess = 1.0 + (r - self.inner_limit);
            self.inner_visual + excess.ln() * self.scale * self.mid_compression
        } else {
            let excess = 1.0 + (r - self.outer_limit);
            self.outer_visual + excess.ln() * self.scale * self.outer_compression
        }
    }

    /// Map a physical position (AU) to render space, keeping its direction.
    ///
    /// The zero vector maps to itself.
    pub fn to_visual(&self, physical: DVec3) -> DVec3 {
        let r = physical.length();
        if r == 0.0 {
            return DVec3::ZERO;
        }
        physical * (self.visual_distance(r) / r)
    }

    /// Invert [`visual_distance`](Self::visual_distance).
    ///
    /// Intended for debug readouts and reverse lookups, not per-frame work.
    pub fn to_physical_estimate(&self, visual: f64) -> f64 {
        if visual <= self.inner_visual {
            visual / self.scale
        } else if visual <= self.outer_visual {
            let k = self.scale * self.mid_compression;
            self.inner_limit + ((visual - self.inner_visual) / k).exp() - 1.0
        } else {
            let k = self.scale * self.outer_compression;
            self.outer_limit + ((visual - self.outer_visual) / k).exp() - 1.0
        }
    }
}
