mod handler;
mod model;

pub use handler::{monthly_schedule, quote, validate_date};
