pub mod layers;
pub mod loss;
mod model;
mod sat_cnn;
mod sequential;

pub use model::{Model, TensorSpec};
pub use sat_cnn::sat_cnn;
pub use sequential::Sequential;
