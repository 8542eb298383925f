pub mod unit;

use std::sync::Arc;

use weft_device::DeviceCapabilities;

use crate::{ConstructionContext, Environment, PlanCache, RuntimeConfig};

/// Context on the default accelerator with a private plan cache.
pub(crate) fn context() -> ConstructionContext {
    context_with(Arc::new(PlanCache::new()), DeviceCapabilities::DEFAULT)
}

pub(crate) fn context_with(plans: Arc<PlanCache>, capabilities: DeviceCapabilities) -> ConstructionContext {
    let config = RuntimeConfig { capabilities, ..RuntimeConfig::default() };
    ConstructionContext::with_environment(Environment::new(config.device().unwrap(), plans))
}
