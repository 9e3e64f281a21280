mod dispatcher;
mod weight;

pub use dispatcher::*;
pub use weight::WeightHolder;
