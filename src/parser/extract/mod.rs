pub mod model_number;
pub mod price;
