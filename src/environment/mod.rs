pub mod controller;
pub mod trail;

pub use controller::{Controller, ControllerBlueprint, NeuralController};
pub use trail::{Cell, Heading, Trail, TrailBlueprint, TrailFile};
