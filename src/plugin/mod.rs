mod decorator;
mod dock;
mod hosted;

pub use decorator::{CC_COUNT, PluginDecorator};
pub use dock::{PluginDock, PluginRack};
pub use hosted::{HostedPlugin, PlayHead, PluginLoader, ProcessContext};
