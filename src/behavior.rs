//! Delay and error-injection settings resolution.
//!
//! Each field is resolved independently, most specific level first:
//! chosen response source, then endpoint, then global settings.

use crate::config::{BehaviorOverrides, Endpoint, GlobalSettings, ResponseSource};
use crate::template::TemplateValue;
use rand::Rng;

/// Concrete behavior for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveBehavior<'a> {
    /// Delay before answering (ms), already sampled
    pub delay_ms: u64,
    pub error_rate: f64,
    pub error_status: u16,
    pub error_response: &'a TemplateValue,
}

/// Resolve behavior using the thread-local RNG for delay sampling.
pub fn resolve<'a>(
    settings: &'a GlobalSettings,
    endpoint: &'a Endpoint,
    chosen: ResponseSource<'a>,
) -> EffectiveBehavior<'a> {
    resolve_with_rng(settings, endpoint, chosen, &mut rand::thread_rng())
}

/// Resolve behavior, sampling a `delay` range from `rng`.
pub fn resolve_with_rng<'a, R: Rng + ?Sized>(
    settings: &'a GlobalSettings,
    endpoint: &'a Endpoint,
    chosen: ResponseSource<'a>,
    rng: &mut R,
) -> EffectiveBehavior<'a> {
    let levels: [&'a BehaviorOverrides; 2] = [chosen.behavior(), &endpoint.behavior];

    // A delay range on the chosen source beats every delayMs
    let delay_ms = match chosen.delay() {
        Some(range) => range.sample(rng),
        None => levels
            .into_iter()
            .find_map(|level| level.delay_ms)
            .unwrap_or(settings.delay_ms),
    };

    EffectiveBehavior {
        delay_ms,
        error_rate: levels
            .into_iter()
            .find_map(|level| level.error_rate)
            .unwrap_or(settings.error_rate),
        error_status: levels
            .into_iter()
            .find_map(|level| level.error_status)
            .unwrap_or(settings.error_status),
        error_response: levels
            .into_iter()
            .find_map(|level| level.error_response.as_ref())
            .unwrap_or(&settings.error_response),
    }
}

/// Draw a fault decision with the thread-local RNG.
pub fn should_fail(error_rate: f64) -> bool {
    should_fail_with(error_rate, &mut rand::thread_rng())
}

/// `rate <= 0` never fails, `rate >= 1` always fails.
pub fn should_fail_with<R: Rng + ?Sized>(error_rate: f64, rng: &mut R) -> bool {
    if error_rate <= 0.0 {
        false
    } else if error_rate >= 1.0 {
        true
    } else {
        rng.gen::<f64>() < error_rate
    }
}
