//! Animation presets for common patterns
//!
//! Named spring configurations, plus pre-built entry/exit animations that
//! drive a single value node.

use drift_core::{Graph, NodeId, Result};

use crate::composite::{sequence, spring, timing, AnimationHandle};
use crate::easing::Easing;
use crate::spring::SpringConfig;
use crate::timing::TimingConfig;

impl SpringConfig {
    /// Soft and slow to settle
    pub fn gentle() -> Self {
        Self::physical(120.0, 14.0)
    }

    /// Noticeable overshoot with a few oscillations
    pub fn wobbly() -> Self {
        Self::physical(180.0, 12.0)
    }

    /// Quick with little overshoot
    pub fn stiff() -> Self {
        Self::physical(210.0, 20.0)
    }

    /// Heavily damped and unhurried
    pub fn slow() -> Self {
        Self::physical(280.0, 60.0)
    }

    /// Very responsive, for direct manipulation
    pub fn snappy() -> Self {
        Self::physical(400.0, 30.0)
    }
}

/// Pre-built animations for common patterns
pub struct AnimationPreset;

impl AnimationPreset {
    // ========================================================================
    // Fade animations
    // ========================================================================

    /// Fade `opacity` to fully opaque
    pub fn fade_in(graph: &Graph, opacity: NodeId, duration_ms: f64) -> Result<AnimationHandle> {
        timing(
            graph,
            opacity,
            TimingConfig::new(1.0)
                .duration(duration_ms)
                .easing(Easing::EaseOut),
        )
    }

    /// Fade `opacity` to fully transparent
    pub fn fade_out(graph: &Graph, opacity: NodeId, duration_ms: f64) -> Result<AnimationHandle> {
        timing(
            graph,
            opacity,
            TimingConfig::new(0.0)
                .duration(duration_ms)
                .easing(Easing::EaseIn),
        )
    }

    // ========================================================================
    // Scale animations
    // ========================================================================

    /// Spring `scale` to 1 with a slight overshoot
    pub fn pop_in(graph: &Graph, scale: NodeId) -> Result<AnimationHandle> {
        spring(graph, scale, SpringConfig::wobbly().to(1.0))
    }

    /// Scale up by `amount` and back to 1
    pub fn pulse(
        graph: &Graph,
        scale: NodeId,
        duration_ms: f64,
        amount: f64,
    ) -> Result<AnimationHandle> {
        let half = duration_ms / 2.0;
        Ok(sequence(vec![
            timing(
                graph,
                scale,
                TimingConfig::new(1.0 + amount)
                    .duration(half)
                    .easing(Easing::EaseInOut),
            )?,
            timing(
                graph,
                scale,
                TimingConfig::new(1.0)
                    .duration(half)
                    .easing(Easing::EaseInOut),
            )?,
        ]))
    }

    // ========================================================================
    // Special effect animations
    // ========================================================================

    /// Shake `offset` horizontally with decaying amplitude (for error feedback)
    pub fn shake(
        graph: &Graph,
        offset: NodeId,
        duration_ms: f64,
        intensity: f64,
    ) -> Result<AnimationHandle> {
        const KEYS: [(f64, f64); 6] = [
            (0.1, -1.0),
            (0.3, 1.0),
            (0.5, -0.8),
            (0.7, 0.6),
            (0.9, -0.3),
            (1.0, 0.0),
        ];

        let mut previous = 0.0;
        let mut steps = Vec::with_capacity(KEYS.len());
        for (at, factor) in KEYS {
            steps.push(timing(
                graph,
                offset,
                TimingConfig::new(intensity * factor)
                    .duration((at - previous) * duration_ms)
                    .easing(Easing::EaseInOut),
            )?);
            previous = at;
        }
        Ok(sequence(steps))
    }
}
