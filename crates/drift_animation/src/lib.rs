//! Drift Animation System
//!
//! Drivers, interpolation, and composition on top of the `drift_core` graph.
//!
//! # Features
//!
//! - **Timing**: Eased interpolation over a fixed duration with optional delay
//! - **Decay**: Closed-form exponential slowdown from an initial velocity
//! - **Spring Physics**: RK4-integrated springs configured by tension/friction
//!   or bounciness/speed
//! - **Interruptible**: Springs inherit position and velocity when re-targeted
//! - **Composition**: `sequence`, `parallel`, `stagger`, and `delay`
//! - **Tracking**: Animate towards another node's live value
//! - **Interpolation**: Range mapping with extrapolation, easing, and strings
//! - **Events**: Map event payloads straight into value nodes

mod driver;

pub mod composite;
pub mod decay;
pub mod easing;
pub mod event;
pub mod interpolation;
pub mod presets;
pub mod spring;
pub mod timing;

pub use composite::{
    decay, delay, parallel, sequence, spring, stagger, timing, AnimationHandle, CompositeAnimation,
    ParallelConfig, Target,
};
pub use decay::{DecayAnimation, DecayConfig, Velocity};
pub use easing::Easing;
pub use event::{EventConfig, EventListener, EventMapper, EventMapping};
pub use interpolation::{interpolate, Extrapolate, InterpolationConfig, OutputRange};
pub use presets::AnimationPreset;
pub use spring::{SpringAnimation, SpringConfig};
pub use timing::{TimingAnimation, TimingConfig};
