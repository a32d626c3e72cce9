pub mod checkpoint;
pub mod keras;
pub mod linear;
pub mod model_trait;
pub mod pytorch;
