//! Narrow interfaces to the collaborators outside the core, each with a
//! built-in implementation so the server runs headless.

pub mod allocator;
pub mod display;
pub mod font;
pub mod settings;

pub use allocator::{PooledSurfaceAllocator, SurfaceAllocator, SurfaceHandle};
pub use display::{DisplayBackend, HeadlessDisplay, PresentCallback, PresentInfo, PresentRecord};
pub use font::{BlockFont, Font, FontEngine, GlyphRun};
pub use settings::{FileSettings, MemorySettings, SettingsStore};
