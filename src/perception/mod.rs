//! 感知层：可达性树发现、系统状态采样、视觉关联与快照组装

pub mod backend;
pub mod collector;
pub mod correlate;
pub mod signal;
pub mod system;

pub use backend::{
    normalize_app_name, AccessibilityProvider, DiscoveryError, ElementRole, RawElement,
    SystemEventsProvider, WindowRef,
};
pub use collector::SignalCollector;
pub use correlate::{Correlation, CorrelationSet, Correlator};
pub use signal::{
    ApplicationContext, ElementLabel, PerceptionSnapshot, SystemState, UIElement, VisualAnalysis,
    VisualElement,
};
pub use system::{SysinfoProbe, SystemProbe};
