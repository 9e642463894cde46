//! CyberScape - cyberpunk particle and wireframe background engine
//!
//! A pooled particle field, rotating 3D wireframe shapes that collide and
//! explode, a proximity connection graph, and glitch post-processing, all
//! rendered in software into a [`surface::Surface`].

pub mod color;
pub mod config;
pub mod connector;
pub mod datastream;
pub mod engine;
pub mod error;
pub mod interactions;
pub mod octree;
pub mod particles;
pub mod performance;
pub mod pool;
pub mod postprocess;
pub mod scheduler;
pub mod shapes;
pub mod spatial_grid;
pub mod surface;
pub mod vector_math;

pub use config::SimulationConfig;
pub use engine::{CyberScape, EngineStats, FrameInput};
pub use error::{CyberscapeError, Result};
pub use surface::Surface;
