use std::sync::Arc;

use crate::core::collector::SmapsCollector;
use crate::metrics::PrometheusSink;

/// Long lived services shared by the daemon tasks
pub struct ApplicationServices {
    pub collector: Arc<SmapsCollector>,
    pub registry: Arc<PrometheusSink>,
}
